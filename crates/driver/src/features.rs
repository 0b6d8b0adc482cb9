//! `feature_list.json` bookkeeping
//!
//! The application repository tracks acceptance features as a JSON array:
//!
//! ```json
//! [{ "category": "functional", "description": "User can edit their own review",
//!    "steps": ["Log in", "Open a product", "..."], "passes": false }]
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use crate::error::{DriverError, DriverResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub description: String,
    #[serde(default)]
    pub steps: Vec<String>,
    #[serde(default)]
    pub passes: bool,
    /// Fields this tool does not interpret, written back untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FeatureSummary {
    pub total: usize,
    pub passing: usize,
    pub failing: usize,
}

impl FeatureSummary {
    pub fn passing_percent(&self) -> f64 {
        percent(self.passing, self.total)
    }

    pub fn failing_percent(&self) -> f64 {
        percent(self.failing, self.total)
    }
}

fn percent(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

/// Case-insensitive description filter
#[derive(Debug, Clone, Default)]
pub struct FeatureQuery {
    /// Every keyword must appear
    pub all_of: Vec<String>,
    /// At least one keyword must appear (ignored when empty)
    pub any_of: Vec<String>,
    pub failing_only: bool,
}

impl FeatureQuery {
    pub fn matches(&self, feature: &Feature) -> bool {
        if self.failing_only && feature.passes {
            return false;
        }
        let description = feature.description.to_lowercase();
        let all = self
            .all_of
            .iter()
            .all(|k| description.contains(&k.to_lowercase()));
        let any = self.any_of.is_empty()
            || self
                .any_of
                .iter()
                .any(|k| description.contains(&k.to_lowercase()));
        all && any
    }
}

/// What happened to one description passed to [`FeatureList::mark_passing`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "description")]
pub enum MarkOutcome {
    Updated(String),
    AlreadyPassing(String),
    NotFound(String),
}

#[derive(Debug, Clone, Default)]
pub struct FeatureList {
    features: Vec<Feature>,
}

impl FeatureList {
    pub fn new(features: Vec<Feature>) -> Self {
        Self { features }
    }

    pub fn load(path: &Path) -> DriverResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DriverError::FeatureList(format!("cannot read {}: {}", path.display(), e))
        })?;
        let features: Vec<Feature> = serde_json::from_str(&content)?;
        Ok(Self { features })
    }

    /// Write back as pretty JSON
    pub fn save(&self, path: &Path) -> DriverResult<()> {
        let json = serde_json::to_string_pretty(&self.features)?;
        std::fs::write(path, json)?;
        info!("Updated {}", path.display());
        Ok(())
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn summary(&self) -> FeatureSummary {
        let passing = self.features.iter().filter(|f| f.passes).count();
        FeatureSummary {
            total: self.features.len(),
            passing,
            failing: self.features.len() - passing,
        }
    }

    /// Failing features in file order, at most `limit`
    pub fn failing(&self, limit: Option<usize>) -> Vec<&Feature> {
        self.features
            .iter()
            .filter(|f| !f.passes)
            .take(limit.unwrap_or(usize::MAX))
            .collect()
    }

    pub fn query(&self, query: &FeatureQuery) -> Vec<&Feature> {
        self.features.iter().filter(|f| query.matches(f)).collect()
    }

    /// Mark features with exactly these descriptions as passing.
    pub fn mark_passing<S: AsRef<str>>(&mut self, descriptions: &[S]) -> Vec<MarkOutcome> {
        descriptions
            .iter()
            .map(|d| {
                let d = d.as_ref();
                match self.features.iter_mut().find(|f| f.description == d) {
                    Some(feature) if feature.passes => MarkOutcome::AlreadyPassing(d.to_string()),
                    Some(feature) => {
                        feature.passes = true;
                        MarkOutcome::Updated(d.to_string())
                    }
                    None => MarkOutcome::NotFound(d.to_string()),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"[
  { "category": "functional", "description": "User can edit their own review",
    "steps": ["Log in", "Open review", "Click edit"], "passes": false },
  { "category": "functional", "description": "User can delete their own review",
    "steps": ["Log in", "Click delete"], "passes": false },
  { "category": "style", "description": "Sale badge shows on discounted products",
    "steps": [], "passes": true, "priority": 2 },
  { "description": "Guest users must login to access wishlist", "passes": false }
]"#;

    fn sample() -> FeatureList {
        FeatureList::new(serde_json::from_str(SAMPLE).unwrap())
    }

    #[test]
    fn test_summary() {
        let summary = sample().summary();
        assert_eq!((summary.total, summary.passing, summary.failing), (4, 1, 3));
        assert_eq!(summary.passing_percent(), 25.0);
        assert_eq!(summary.failing_percent(), 75.0);
    }

    #[test]
    fn test_failing_respects_limit_and_order() {
        let list = sample();
        let failing = list.failing(Some(2));
        assert_eq!(failing.len(), 2);
        assert_eq!(failing[0].description, "User can edit their own review");
        assert_eq!(list.failing(None).len(), 3);
    }

    #[test]
    fn test_review_edit_or_delete_query() {
        let list = sample();
        let query = FeatureQuery {
            all_of: vec!["REVIEW".into()],
            any_of: vec!["edit".into(), "delete".into()],
            failing_only: true,
        };
        let hits = list.query(&query);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[1].steps.len(), 2);
    }

    #[test]
    fn test_mark_passing_outcomes_and_roundtrip() {
        let mut list = sample();
        let outcomes = list.mark_passing(&[
            "Guest users must login to access wishlist",
            "Sale badge shows on discounted products",
            "Nonexistent feature",
        ]);
        assert!(matches!(outcomes[0], MarkOutcome::Updated(_)));
        assert!(matches!(outcomes[1], MarkOutcome::AlreadyPassing(_)));
        assert!(matches!(outcomes[2], MarkOutcome::NotFound(_)));
        assert_eq!(list.summary().passing, 2);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feature_list.json");
        list.save(&path).unwrap();
        let reloaded = FeatureList::load(&path).unwrap();
        assert_eq!(reloaded.features(), list.features());
        assert_eq!(reloaded.features()[2].extra["priority"], 2);
    }

    #[test]
    fn test_missing_file_is_feature_list_error() {
        let err = FeatureList::load(Path::new("/nonexistent/feature_list.json")).unwrap_err();
        assert!(matches!(err, DriverError::FeatureList(_)));
    }
}
