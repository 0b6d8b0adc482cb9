//! Scenario Commands
//!
//! Listing and static checks that never open a browser.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use flowcheck_driver::Scenario;

use crate::output::{print_error, print_list, print_success, print_warning, OutputFormat, TableDisplay};

#[derive(Args)]
pub struct ListArgs {
    /// Scenario file or directory
    #[arg(default_value = "scenarios")]
    pub path: PathBuf,

    /// Only list scenarios with this tag
    #[arg(short, long)]
    pub tag: Option<String>,
}

#[derive(Args)]
pub struct ValidateArgs {
    /// Scenario file or directory
    #[arg(default_value = "scenarios")]
    pub path: PathBuf,

    /// Treat selector lint warnings as errors
    #[arg(long)]
    pub strict: bool,
}

/// Scenario information for display
#[derive(Serialize)]
pub struct ScenarioInfo {
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub steps: usize,
    pub browser: bool,
}

impl From<&Scenario> for ScenarioInfo {
    fn from(s: &Scenario) -> Self {
        Self {
            name: s.name.clone(),
            description: s.description.clone(),
            tags: s.tags.clone(),
            steps: s.steps.len(),
            browser: s.needs_browser(),
        }
    }
}

impl TableDisplay for ScenarioInfo {
    fn headers() -> Vec<&'static str> {
        vec!["Name", "Steps", "Browser", "Tags", "Description"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.steps.to_string(),
            if self.browser { "yes" } else { "no" }.to_string(),
            self.tags.join(", "),
            self.description.clone(),
        ]
    }
}

pub fn execute_list(args: ListArgs, format: OutputFormat) -> Result<()> {
    let scenarios = Scenario::load_path(&args.path)
        .with_context(|| format!("Failed to load scenarios from {}", args.path.display()))?;

    let infos: Vec<ScenarioInfo> = match &args.tag {
        Some(tag) => Scenario::filter_by_tag(&scenarios, tag)
            .into_iter()
            .map(ScenarioInfo::from)
            .collect(),
        None => scenarios.iter().map(ScenarioInfo::from).collect(),
    };
    print_list(&infos, format);
    Ok(())
}

/// Returns whether every scenario is valid.
pub fn execute_validate(args: ValidateArgs) -> Result<bool> {
    let scenarios = Scenario::load_path(&args.path)
        .with_context(|| format!("Failed to load scenarios from {}", args.path.display()))?;

    let mut ok = true;
    for scenario in &scenarios {
        if let Err(e) = scenario.validate() {
            print_error(&e.to_string());
            ok = false;
            continue;
        }

        let warnings = scenario.lint();
        for warning in &warnings {
            print_warning(&format!("{}: {}", scenario.name, warning));
        }
        if args.strict && !warnings.is_empty() {
            ok = false;
        } else {
            print_success(&format!("{} ({} steps)", scenario.name, scenario.steps.len()));
        }
    }
    Ok(ok)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_flags_fragile_selectors_in_strict_mode() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("cart.yaml"),
            "name: cart\nsteps:\n  - kind: navigate\n    payload: /\n  - kind: locate\n    target: ['.cart-icon', '[data-testid=cart]']\n",
        )
        .unwrap();

        let relaxed = ValidateArgs {
            path: dir.path().to_path_buf(),
            strict: false,
        };
        assert!(execute_validate(relaxed).unwrap());

        let strict = ValidateArgs {
            path: dir.path().to_path_buf(),
            strict: true,
        };
        assert!(!execute_validate(strict).unwrap());
    }
}
