//! Feature List Commands
//!
//! Reporting on and updating `feature_list.json`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use serde::Serialize;

use flowcheck_driver::features::{Feature, FeatureList, FeatureQuery, MarkOutcome};

use crate::output::{print_error, print_info, print_list, print_success, print_value, OutputFormat, TableDisplay};

#[derive(Args)]
pub struct FeaturesArgs {
    /// Path to the feature list
    #[arg(short, long, default_value = "feature_list.json", global = true)]
    pub file: PathBuf,

    #[command(subcommand)]
    pub command: FeatureCommands,
}

#[derive(Subcommand)]
pub enum FeatureCommands {
    /// Show passing/failing totals
    Summary,

    /// List failing features in file order
    Failing {
        /// Show at most this many
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Find features by description keywords
    Show {
        /// Keyword that must appear (repeatable)
        #[arg(long = "all")]
        all_of: Vec<String>,

        /// Keywords of which at least one must appear (repeatable)
        #[arg(long = "any")]
        any_of: Vec<String>,

        /// Only failing features
        #[arg(long)]
        failing: bool,

        /// Print each feature's steps
        #[arg(long)]
        steps: bool,
    },

    /// Mark features passing by exact description
    Mark {
        #[arg(required = true)]
        descriptions: Vec<String>,
    },
}

/// Feature row for display
#[derive(Serialize)]
struct FeatureRow<'a> {
    #[serde(flatten)]
    feature: &'a Feature,
}

impl TableDisplay for FeatureRow<'_> {
    fn headers() -> Vec<&'static str> {
        vec!["Category", "Description", "Steps", "Passes"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.feature.category.clone().unwrap_or_default(),
            self.feature.description.clone(),
            self.feature.steps.len().to_string(),
            if self.feature.passes { "✅" } else { "❌" }.to_string(),
        ]
    }
}

fn rows<'a>(features: &[&'a Feature]) -> Vec<FeatureRow<'a>> {
    features.iter().map(|f| FeatureRow { feature: *f }).collect()
}

/// Returns `false` when `mark` named a feature that does not exist.
pub fn execute(args: FeaturesArgs, format: OutputFormat) -> Result<bool> {
    let mut list = FeatureList::load(&args.file)
        .with_context(|| format!("Failed to load {}", args.file.display()))?;

    match args.command {
        FeatureCommands::Summary => {
            let summary = list.summary();
            if matches!(format, OutputFormat::Json | OutputFormat::Yaml) {
                print_value(&summary, format);
                return Ok(true);
            }
            println!("{}", "Feature Status".bold());
            println!("   Total:    {}", summary.total);
            println!(
                "   Passing:  {} ({:.1}%)",
                summary.passing.to_string().green(),
                summary.passing_percent()
            );
            println!(
                "   Failing:  {} ({:.1}%)",
                summary.failing.to_string().red(),
                summary.failing_percent()
            );
        }
        FeatureCommands::Failing { limit } => {
            let failing = list.failing(limit);
            print_list(&rows(&failing), format);
        }
        FeatureCommands::Show {
            all_of,
            any_of,
            failing,
            steps,
        } => {
            let query = FeatureQuery {
                all_of,
                any_of,
                failing_only: failing,
            };
            let hits = list.query(&query);
            if steps && format == OutputFormat::Table {
                for feature in &hits {
                    let mark = if feature.passes { "✅" } else { "❌" };
                    println!("{} {}", mark, feature.description.bold());
                    for (i, step) in feature.steps.iter().enumerate() {
                        println!("   {}. {}", i + 1, step);
                    }
                }
                print_info(&format!("{} matching feature(s)", hits.len()));
            } else {
                print_list(&rows(&hits), format);
            }
        }
        FeatureCommands::Mark { descriptions } => {
            let outcomes = list.mark_passing(descriptions.as_slice());
            let mut updated = 0;
            for outcome in &outcomes {
                match outcome {
                    MarkOutcome::Updated(d) => {
                        updated += 1;
                        print_success(&format!("Marked passing: {}", d));
                    }
                    MarkOutcome::AlreadyPassing(d) => print_info(&format!("Already passing: {}", d)),
                    MarkOutcome::NotFound(d) => print_error(&format!("Not found: {}", d)),
                }
            }
            if updated > 0 {
                list.save(&args.file)?;
            }
            let summary = list.summary();
            print_info(&format!(
                "{}/{} features passing",
                summary.passing, summary.total
            ));
            let missing = outcomes
                .iter()
                .any(|o| matches!(o, MarkOutcome::NotFound(_)));
            return Ok(!missing);
        }
    }

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEATURES: &str = r#"[
  { "category": "cart", "description": "Add to cart updates the badge", "steps": ["Click add"], "passes": false },
  { "category": "auth", "description": "Customer can log in", "steps": [], "passes": true }
]"#;

    fn mark(file: PathBuf, descriptions: &[&str]) -> FeaturesArgs {
        FeaturesArgs {
            file,
            command: FeatureCommands::Mark {
                descriptions: descriptions.iter().map(|d| d.to_string()).collect(),
            },
        }
    }

    #[test]
    fn test_mark_fails_on_unknown_description() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feature_list.json");
        std::fs::write(&path, FEATURES).unwrap();

        let ok = execute(
            mark(path.clone(), &["Add to cart updates the badge", "Checkout works"]),
            OutputFormat::Plain,
        )
        .unwrap();
        assert!(!ok);

        let list = FeatureList::load(&path).unwrap();
        assert_eq!(list.summary().passing, 2);
    }

    #[test]
    fn test_mark_known_descriptions_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feature_list.json");
        std::fs::write(&path, FEATURES).unwrap();

        assert!(execute(mark(path, &["Customer can log in"]), OutputFormat::Plain).unwrap());
    }
}
