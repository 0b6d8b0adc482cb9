//! Ordered fallback selectors and their resolution against a live page

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::browser::{BrowserSession, ElementHandle};
use crate::error::{DriverError, DriverResult};

/// Delay between resolution rounds.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Ordered list of candidate selectors, most stable first.
///
/// In YAML a plain string is a single-candidate spec:
///
/// ```yaml
/// target: '[data-testid="add-to-cart"]'
/// target: ['button[aria-label="Open cart"]', '.cart-icon', '[href*="cart"]']
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SelectorSpecRepr", into = "Vec<String>")]
pub struct SelectorSpec {
    candidates: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SelectorSpecRepr {
    One(String),
    Many(Vec<String>),
}

impl TryFrom<SelectorSpecRepr> for SelectorSpec {
    type Error = DriverError;

    fn try_from(repr: SelectorSpecRepr) -> DriverResult<Self> {
        match repr {
            SelectorSpecRepr::One(s) => Self::new(vec![s]),
            SelectorSpecRepr::Many(v) => Self::new(v),
        }
    }
}

impl From<SelectorSpec> for Vec<String> {
    fn from(spec: SelectorSpec) -> Self {
        spec.candidates
    }
}

impl SelectorSpec {
    /// Build a spec; fails on an empty list or a blank candidate.
    pub fn new<I, S>(candidates: I) -> DriverResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let candidates: Vec<String> = candidates
            .into_iter()
            .map(|c| c.into().trim().to_string())
            .collect();
        if candidates.is_empty() {
            return Err(DriverError::InvalidScenario(
                "selector spec needs at least one candidate".to_string(),
            ));
        }
        if candidates.iter().any(|c| c.is_empty()) {
            return Err(DriverError::InvalidScenario(
                "selector spec contains an empty candidate".to_string(),
            ));
        }
        Ok(Self { candidates })
    }

    /// Single-candidate spec.
    pub fn single(selector: impl Into<String>) -> DriverResult<Self> {
        Self::new([selector.into()])
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    pub fn primary(&self) -> &str {
        &self.candidates[0]
    }

    /// Candidates that sit ahead of a more stable one.
    pub fn stability_warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        for (i, earlier) in self.candidates.iter().enumerate() {
            let earlier_rank = Stability::of(earlier);
            if let Some(later) = self.candidates[i + 1..]
                .iter()
                .find(|later| Stability::of(later) > earlier_rank)
            {
                warnings.push(format!(
                    "'{}' ({}) is tried before the more stable '{}' ({})",
                    earlier,
                    earlier_rank.as_str(),
                    later,
                    Stability::of(later).as_str()
                ));
            }
        }
        warnings
    }
}

impl std::fmt::Display for SelectorSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.candidates.join(" | "))
    }
}

/// How likely a selector is to survive a UI revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stability {
    /// Text scraping, class names, href fragments
    Fragile,
    /// Tags and plain attributes
    Moderate,
    /// Test ids, ARIA labels, element ids, form names
    Stable,
}

impl Stability {
    pub fn of(selector: &str) -> Self {
        let s = selector.trim();
        if s.contains("data-testid")
            || s.contains("aria-label")
            || s.contains("[name=")
            || s.starts_with("role=")
            || (s.starts_with('#') && !s.contains(' '))
        {
            Stability::Stable
        } else if s.starts_with("text=")
            || s.contains(":has-text(")
            || s.contains(":text(")
            || s.contains("*=")
            || has_class_token(s)
        {
            Stability::Fragile
        } else {
            Stability::Moderate
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stability::Fragile => "fragile",
            Stability::Moderate => "moderate",
            Stability::Stable => "stable",
        }
    }
}

/// A `.class` token anywhere outside attribute brackets, quotes and
/// pseudo-class arguments: `.cart-icon`, `button.add-to-cart`, `div .badge`.
fn has_class_token(selector: &str) -> bool {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut chars = selector.chars().peekable();
    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some(q), _) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '[' | '(') => depth += 1,
            (None, ']' | ')') => depth = depth.saturating_sub(1),
            (None, '.') if depth == 0 => {
                if chars
                    .peek()
                    .is_some_and(|n| n.is_alphabetic() || *n == '-' || *n == '_')
                {
                    return true;
                }
            }
            _ => {}
        }
    }
    false
}

/// Resolve `spec` against the current page.
///
/// Each round probes every candidate once, in order, and returns the first
/// one with at least one match. Rounds repeat every [`POLL_INTERVAL`] until
/// `budget` is spent. For an unchanging page the result is always the first
/// candidate present, whatever later candidates would match. `Ok(None)` is
/// the ordinary "not on this page" outcome.
pub async fn resolve_selector(
    session: &mut dyn BrowserSession,
    spec: &SelectorSpec,
    budget: Duration,
) -> DriverResult<Option<ElementHandle>> {
    let start = Instant::now();
    let mut rounds = 0usize;

    loop {
        rounds += 1;
        for candidate in spec.candidates() {
            let count = session.count(candidate).await?;
            if count > 0 {
                debug!(
                    "Resolved '{}' ({} match(es)) in round {}",
                    candidate, count, rounds
                );
                return Ok(Some(ElementHandle::new(candidate.clone(), 0)));
            }
        }

        if start.elapsed() + POLL_INTERVAL >= budget {
            debug!("No candidate of [{}] matched after {} round(s)", spec, rounds);
            return Ok(None);
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Number of matches for the first candidate that matches anything.
pub async fn count_matches(
    session: &mut dyn BrowserSession,
    spec: &SelectorSpec,
) -> DriverResult<usize> {
    for candidate in spec.candidates() {
        let count = session.count(candidate).await?;
        if count > 0 {
            return Ok(count);
        }
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_yaml_string_is_single_candidate() {
        let spec: SelectorSpec = serde_yaml::from_str("'#email'").unwrap();
        assert_eq!(spec.candidates(), &["#email".to_string()]);
    }

    #[test]
    fn test_yaml_list_keeps_order() {
        let spec: SelectorSpec =
            serde_yaml::from_str(r#"['button[aria-label="Open cart"]', '.cart-icon']"#).unwrap();
        assert_eq!(spec.primary(), r#"button[aria-label="Open cart"]"#);
        assert_eq!(spec.candidates().len(), 2);
    }

    #[test]
    fn test_empty_spec_rejected() {
        assert!(SelectorSpec::new(Vec::<String>::new()).is_err());
        assert!(serde_yaml::from_str::<SelectorSpec>("[]").is_err());
        assert!(SelectorSpec::new(["   "]).is_err());
    }

    #[test_case("[data-testid=cart-badge]", Stability::Stable ; "test id")]
    #[test_case(r#"button[aria-label="Open cart"]"#, Stability::Stable ; "aria label")]
    #[test_case("#email", Stability::Stable ; "element id")]
    #[test_case("button[type=submit]", Stability::Moderate ; "attribute")]
    #[test_case(".cart-icon", Stability::Fragile ; "class name")]
    #[test_case("button.add-to-cart", Stability::Fragile ; "tag with class")]
    #[test_case("div .cart-icon", Stability::Fragile ; "descendant class")]
    #[test_case(r#"a[title="v1.2"]"#, Stability::Moderate ; "dot inside attribute")]
    #[test_case("[href*=\"cart\"]", Stability::Fragile ; "href fragment")]
    #[test_case("text=Welcome back", Stability::Fragile ; "text scrape")]
    fn test_stability_rank(selector: &str, expected: Stability) {
        assert_eq!(Stability::of(selector), expected);
    }

    #[test]
    fn test_warns_when_fragile_precedes_stable() {
        let spec = SelectorSpec::new([".cart-icon", "[data-testid=cart]"]).unwrap();
        let warnings = spec.stability_warnings();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains(".cart-icon"));

        let ordered = SelectorSpec::new(["[data-testid=cart]", ".cart-icon"]).unwrap();
        assert!(ordered.stability_warnings().is_empty());
    }

    #[test]
    fn test_warns_for_tag_qualified_class_before_attribute() {
        let spec = SelectorSpec::new(["button.add-to-cart", "button[type=submit]"]).unwrap();
        let warnings = spec.stability_warnings();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("button.add-to-cart"));
    }
}
