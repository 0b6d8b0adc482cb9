//! Run Command
//!
//! Loads scenarios, runs each in its own browser session, prints a summary
//! and writes `flowcheck-results.json`.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tracing::{debug, info};

use flowcheck_driver::browser::PlaywrightLauncher;
use flowcheck_driver::config::{BrowserEngine, Credentials, DriverConfig, Viewport};
use flowcheck_driver::health::wait_all_ready;
use flowcheck_driver::{EvidenceStore, RunReport, Scenario, StepStatus, SuiteReport, UiVerificationDriver};

use crate::output::{format_value, print_info, print_warning, render_table, OutputFormat, TableDisplay};

#[derive(Args)]
pub struct RunArgs {
    /// Scenario file or directory of *.yaml files
    #[arg(default_value = "scenarios")]
    pub path: PathBuf,

    /// Only run scenarios with this tag
    #[arg(short, long)]
    pub tag: Option<String>,

    /// Only run the scenario with this name
    #[arg(short, long)]
    pub name: Option<String>,

    /// Frontend URL
    #[arg(long, env = "FLOWCHECK_BASE_URL")]
    pub base_url: Option<String>,

    /// API URL for request and login steps
    #[arg(long, env = "FLOWCHECK_API_URL")]
    pub api_url: Option<String>,

    /// Show the browser window
    #[arg(long)]
    pub headed: bool,

    /// Viewport as WIDTHxHEIGHT
    #[arg(long, value_parser = parse_viewport)]
    pub viewport: Option<Viewport>,

    /// Account email for login steps
    #[arg(long, env = "FLOWCHECK_EMAIL")]
    pub email: Option<String>,

    /// Account password for login steps
    #[arg(long, env = "FLOWCHECK_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Screenshot directory
    #[arg(long)]
    pub artifacts: Option<PathBuf>,

    /// Results directory
    #[arg(long)]
    pub results: Option<PathBuf>,

    /// Browser engine (chromium, firefox, webkit)
    #[arg(long)]
    pub browser: Option<BrowserEngine>,

    /// Node.js executable for the Playwright bridge
    #[arg(long)]
    pub node: Option<PathBuf>,

    /// Wait for the frontend and API to answer before running
    #[arg(long)]
    pub wait_ready: bool,
}

/// Per-step row of the summary table
#[derive(Serialize)]
struct StepRow {
    step: usize,
    label: String,
    status: StepStatus,
    elapsed_ms: u64,
    detail: String,
}

impl TableDisplay for StepRow {
    fn headers() -> Vec<&'static str> {
        vec!["#", "Step", "Status", "Time", "Detail"]
    }

    fn row(&self) -> Vec<String> {
        let status = match self.status {
            StepStatus::Passed => "✓ passed".green().to_string(),
            StepStatus::Failed => "✗ failed".red().to_string(),
            StepStatus::Skipped => "- skipped".yellow().to_string(),
        };
        vec![
            self.step.to_string(),
            self.label.clone(),
            status,
            format!("{} ms", self.elapsed_ms),
            self.detail.clone(),
        ]
    }
}

impl StepRow {
    fn from_report(report: &RunReport) -> Vec<Self> {
        report
            .steps
            .iter()
            .map(|s| StepRow {
                step: s.index + 1,
                label: s.label.clone(),
                status: s.status,
                elapsed_ms: s.elapsed_ms,
                detail: match (&s.failure, &s.screenshot_path) {
                    (Some(kind), _) => format!("[{}] {}", kind, s.message),
                    (None, Some(path)) => path.display().to_string(),
                    (None, None) => s.message.clone(),
                },
            })
            .collect()
    }
}

fn parse_viewport(s: &str) -> Result<Viewport, String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{}'", s))?;
    let width = w.trim().parse().map_err(|_| format!("bad width in '{}'", s))?;
    let height = h.trim().parse().map_err(|_| format!("bad height in '{}'", s))?;
    Ok(Viewport { width, height })
}

/// Merge command-line overrides into the file configuration.
fn apply_overrides(config: &mut DriverConfig, args: &RunArgs) {
    let session = &mut config.session;
    if let Some(url) = &args.base_url {
        session.base_url = url.clone();
    }
    if let Some(url) = &args.api_url {
        session.api_url = Some(url.clone());
    }
    if args.headed {
        session.headless = false;
    }
    if let Some(viewport) = args.viewport {
        session.viewport = viewport;
    }

    let existing = session.credentials.take();
    let email = args.email.clone().or_else(|| existing.as_ref().map(|c| c.email.clone()));
    let password = args
        .password
        .clone()
        .or_else(|| existing.as_ref().map(|c| c.password.clone()));
    session.credentials = match (email, password) {
        (Some(email), Some(password)) => Some(Credentials { email, password }),
        _ => existing,
    };

    if let Some(dir) = &args.artifacts {
        config.output.artifacts_dir = dir.clone();
    }
    if let Some(dir) = &args.results {
        config.output.results_dir = dir.clone();
    }
    if let Some(browser) = args.browser {
        config.bridge.browser = browser;
    }
    if let Some(node) = &args.node {
        config.bridge.node_binary = node.clone();
    }
    if args.wait_ready {
        config.readiness.enabled = true;
    }
}

fn select(scenarios: Vec<Scenario>, args: &RunArgs) -> Vec<Scenario> {
    scenarios
        .into_iter()
        .filter(|s| args.tag.as_ref().map_or(true, |t| s.tags.contains(t)))
        .filter(|s| args.name.as_ref().map_or(true, |n| &s.name == n))
        .collect()
}

/// Returns whether every scenario passed.
pub async fn execute(args: RunArgs, config_path: &Path, format: OutputFormat) -> Result<bool> {
    let mut config = DriverConfig::load(config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    apply_overrides(&mut config, &args);

    let loaded = Scenario::load_path(&args.path)
        .with_context(|| format!("Failed to load scenarios from {}", args.path.display()))?;
    let scenarios = select(loaded, &args);
    if scenarios.is_empty() {
        bail!("No scenarios matched in {}", args.path.display());
    }

    for scenario in &scenarios {
        for warning in scenario.lint() {
            print_warning(&format!("{}: {}", scenario.name, warning));
        }
    }

    if config.readiness.enabled {
        let mut urls = vec![config.session.base_url.clone()];
        if let Some(api) = &config.session.api_url {
            urls.push(api.clone());
        }
        info!("Waiting for {} to become ready", urls.join(", "));
        wait_all_ready(&urls, Duration::from_millis(config.readiness.timeout_ms)).await?;
    }

    let launcher = PlaywrightLauncher::new(config.bridge.clone());
    if scenarios.iter().any(Scenario::needs_browser) {
        launcher.check_node().await?;
    }
    debug!("Evidence root: {}", config.output.artifacts_dir.display());

    let driver = UiVerificationDriver::new(
        Arc::new(launcher),
        EvidenceStore::new(&config.output.artifacts_dir),
    );
    let suite = driver.run_all(&scenarios, &config.session).await;

    report_suite(
        &mut std::io::stdout(),
        &suite,
        &config.output.results_dir,
        format,
    )?;
    Ok(suite.all_passed())
}

/// Print the summary, then write the results file.
///
/// The summary is printed even if the results file cannot be written.
fn report_suite(
    out: &mut impl Write,
    suite: &SuiteReport,
    results_dir: &Path,
    format: OutputFormat,
) -> Result<()> {
    print_suite(out, suite, format)?;
    out.flush()?;

    let results = suite
        .write_json(results_dir)
        .with_context(|| format!("Failed to write results to {}", results_dir.display()))?;
    if format == OutputFormat::Table || format == OutputFormat::Plain {
        print_info(&format!("Results written to {}", results.display()));
    }
    Ok(())
}

/// `<status> <name>: N passed, N failed, N skipped (N ms)`
fn scenario_line(report: &RunReport) -> String {
    let counts = report.counts();
    let line = format!(
        "{} {}: {} passed, {} failed, {} skipped ({} ms)",
        report.status, report.scenario_name, counts.passed, counts.failed, counts.skipped, report.elapsed_ms
    );
    if report.passed() {
        format!("{} {}", "✓".green(), line)
    } else {
        format!("{} {}", "✗".red(), line)
    }
}

fn print_suite(out: &mut impl Write, suite: &SuiteReport, format: OutputFormat) -> std::io::Result<()> {
    match format {
        OutputFormat::Json | OutputFormat::Yaml => {
            return writeln!(out, "{}", format_value(suite, format));
        }
        OutputFormat::Table => {
            for report in &suite.runs {
                writeln!(out)?;
                writeln!(out, "{}", report.scenario_name.bold())?;
                writeln!(out, "{}", render_table(&StepRow::from_report(report)))?;
            }
        }
        OutputFormat::Plain => {
            for report in &suite.runs {
                for row in StepRow::from_report(report) {
                    writeln!(
                        out,
                        "{}\t{}\t{}\t{}",
                        report.scenario_name, row.step, row.status, row.label
                    )?;
                }
            }
        }
    }

    writeln!(out)?;
    for report in &suite.runs {
        writeln!(out, "{}", scenario_line(report))?;
    }
    for errored in &suite.errored {
        writeln!(
            out,
            "{} {}: {}",
            "✗".red(),
            errored.scenario_name,
            errored.error
        )?;
    }

    let steps = suite.step_counts();
    let line = format!(
        "{} scenario(s): {} passed, {} failed | steps: {} passed, {} failed, {} skipped ({} ms)",
        suite.total, suite.passed, suite.failed, steps.passed, steps.failed, steps.skipped, suite.elapsed_ms
    );
    if suite.all_passed() {
        writeln!(out, "{}", line.green().bold())
    } else {
        writeln!(out, "{}", line.red().bold())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use flowcheck_driver::{StepKind, StepResult};

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        run: RunArgs,
    }

    #[test]
    fn test_parse_viewport() {
        assert_eq!(
            parse_viewport("390x844").unwrap(),
            Viewport { width: 390, height: 844 }
        );
        assert!(parse_viewport("wide").is_err());
    }

    #[test]
    fn test_overrides_replace_file_values() {
        let cli = TestCli::parse_from([
            "flowcheck",
            "scenarios/cart.yaml",
            "--base-url",
            "http://localhost:4173",
            "--headed",
            "--email",
            "admin@example.com",
            "--password",
            "admin123",
            "--browser",
            "firefox",
        ]);
        let mut config = DriverConfig::default();
        apply_overrides(&mut config, &cli.run);

        assert_eq!(config.session.base_url, "http://localhost:4173");
        assert!(!config.session.headless);
        assert_eq!(
            config.session.credentials.as_ref().map(|c| c.email.as_str()),
            Some("admin@example.com")
        );
        assert_eq!(config.bridge.browser, BrowserEngine::Firefox);
        assert_eq!(cli.run.path, PathBuf::from("scenarios/cart.yaml"));
    }

    fn suite() -> SuiteReport {
        let step = |index, status| StepResult {
            index,
            label: format!("step {}", index + 1),
            kind: StepKind::Navigate,
            status,
            critical: true,
            message: String::new(),
            failure: None,
            elapsed_ms: 5,
            screenshot_path: None,
            screenshot_sha256: None,
        };
        let mut report = RunReport::begin("cart");
        report.push(step(0, StepStatus::Passed));
        report.push(step(1, StepStatus::Failed));
        report.push(step(2, StepStatus::Skipped));

        let mut suite = SuiteReport::default();
        suite.record(report.finish());
        suite.record_error("broken", "Invalid scenario: no steps");
        suite
    }

    #[test]
    fn test_summary_counts_steps_per_scenario() {
        colored::control::set_override(false);
        let mut out = Vec::new();
        print_suite(&mut out, &suite(), OutputFormat::Plain).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("✗ failed cart: 1 passed, 1 failed, 1 skipped"), "{}", text);
        assert!(text.contains("✗ broken: Invalid scenario: no steps"), "{}", text);
        assert!(
            text.contains("2 scenario(s): 0 passed, 2 failed | steps: 1 passed, 1 failed, 1 skipped"),
            "{}",
            text
        );
    }

    #[test]
    fn test_summary_printed_when_results_cannot_be_written() {
        let blocker = tempfile::NamedTempFile::new().unwrap();
        let mut out = Vec::new();

        let err = report_suite(&mut out, &suite(), blocker.path(), OutputFormat::Plain).unwrap_err();

        assert!(err.to_string().contains("Failed to write results"));
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("steps: 1 passed, 1 failed, 1 skipped"), "{}", text);
    }

    #[test]
    fn test_results_written_after_summary() {
        let dir = tempfile::tempdir().unwrap();
        let mut out = Vec::new();

        report_suite(&mut out, &suite(), dir.path(), OutputFormat::Json).unwrap();

        let written = std::fs::read_to_string(dir.path().join("flowcheck-results.json")).unwrap();
        let printed: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(printed["total"], 2);
        assert!(written.contains("\"scenario_name\": \"cart\""));
    }

    #[test]
    fn test_select_by_tag_and_name() {
        let mut a = Scenario::new("a", vec![]);
        a.tags = vec!["smoke".into()];
        let b = Scenario::new("b", vec![]);

        let cli = TestCli::parse_from(["flowcheck", "--tag", "smoke"]);
        let picked = select(vec![a.clone(), b.clone()], &cli.run);
        assert_eq!(picked.len(), 1);

        let cli = TestCli::parse_from(["flowcheck", "--name", "b"]);
        let picked = select(vec![a, b], &cli.run);
        assert_eq!(picked[0].name, "b");
    }
}
