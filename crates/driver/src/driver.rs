//! Scenario execution
//!
//! [`UiVerificationDriver::run`] executes one scenario against one fresh
//! browser session and always returns a complete [`RunReport`]: every step
//! gets exactly one result, in order. Expected failures (see
//! [`FailureKind`]) become `Failed` results; after a failed critical step the
//! remaining steps are `Skipped`. Anything else aborts the run with an error,
//! after the session has been closed.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use crate::assertion::{assert_count, assert_text};
use crate::browser::{BrowserLauncher, BrowserSession, ElementHandle};
use crate::config::{Credentials, SessionConfig};
use crate::error::{DriverError, DriverResult, FailureKind};
use crate::evidence::EvidenceStore;
use crate::http::ApiClient;
use crate::report::{RunReport, StepResult, StepStatus, SuiteReport};
use crate::scenario::{ActKind, Scenario, Step, StepKind, WaitCondition};
use crate::selector::{count_matches, resolve_selector, SelectorSpec, POLL_INTERVAL};

/// Slack on top of a step's own timeout before the step is cut off.
///
/// Polling inside a step stops short of the timeout on its own; the outer
/// limit only catches a backend call that hangs.
const STEP_GRACE: Duration = Duration::from_millis(500);

/// What a passed step leaves behind
#[derive(Debug, Default)]
struct StepOutput {
    message: String,
    screenshot: Option<PathBuf>,
}

impl StepOutput {
    fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            screenshot: None,
        }
    }
}

/// Mutable state shared by the steps of one run
struct RunContext {
    session: SessionConfig,
    api: ApiClient,
    located: Option<ElementHandle>,
}

/// Tracks a step's time budget for polling loops
struct Deadline {
    start: Instant,
    budget: Duration,
}

impl Deadline {
    fn new(budget: Duration) -> Self {
        Self {
            start: Instant::now(),
            budget,
        }
    }

    /// Whether another poll round fits in the budget
    fn can_wait(&self) -> bool {
        self.start.elapsed() + POLL_INTERVAL < self.budget
    }

    fn remaining(&self) -> Duration {
        self.budget.saturating_sub(self.start.elapsed())
    }
}

/// Runs scenarios against sessions from a [`BrowserLauncher`].
pub struct UiVerificationDriver {
    launcher: Arc<dyn BrowserLauncher>,
    evidence: EvidenceStore,
}

impl UiVerificationDriver {
    pub fn new(launcher: Arc<dyn BrowserLauncher>, evidence: EvidenceStore) -> Self {
        Self { launcher, evidence }
    }

    pub fn evidence(&self) -> &EvidenceStore {
        &self.evidence
    }

    /// Run one scenario.
    ///
    /// Returns `Err` only for invalid scenarios and unexpected errors such
    /// as a crashed browser; the session is closed in every case.
    pub async fn run(&self, scenario: &Scenario, session: &SessionConfig) -> DriverResult<RunReport> {
        scenario.validate()?;

        let session = effective_session(scenario, session);
        let mut report = RunReport::begin(&scenario.name);
        info!(
            "Running scenario '{}' ({} steps) against {}",
            scenario.name,
            scenario.steps.len(),
            session.base_url
        );

        let api = ApiClient::for_session(&session)?;
        let mut browser = if scenario.needs_browser() {
            Some(self.launcher.launch(&session).await?)
        } else {
            debug!("Scenario '{}' has no browser steps", scenario.name);
            None
        };

        // Nothing fallible between launch and close.
        let mut ctx = RunContext {
            api,
            session,
            located: None,
        };

        let outcome = self
            .execute_steps(scenario, &mut browser, &mut ctx, &mut report)
            .await;

        if let Some(page) = browser.as_mut() {
            if let Err(e) = page.close().await {
                warn!("Failed to close browser session: {}", e);
            }
        }
        outcome?;

        let report = report.finish();
        let counts = report.counts();
        if report.passed() {
            info!("✓ {} ({} ms)", report.scenario_name, report.elapsed_ms);
        } else {
            error!(
                "✗ {} - {} passed, {} failed, {} skipped",
                report.scenario_name, counts.passed, counts.failed, counts.skipped
            );
        }
        Ok(report)
    }

    /// Run scenarios one after another, each in its own session.
    pub async fn run_all(&self, scenarios: &[Scenario], session: &SessionConfig) -> SuiteReport {
        let mut suite = SuiteReport::default();
        info!("Running {} scenario(s)...", scenarios.len());

        for scenario in scenarios {
            match self.run(scenario, session).await {
                Ok(report) => suite.record(report),
                Err(e) => {
                    error!("✗ {} - {}", scenario.name, e);
                    suite.record_error(&scenario.name, e);
                }
            }
        }

        info!(
            "Scenario results: {} passed, {} failed ({} ms)",
            suite.passed, suite.failed, suite.elapsed_ms
        );
        suite
    }

    async fn execute_steps(
        &self,
        scenario: &Scenario,
        browser: &mut Option<Box<dyn BrowserSession>>,
        ctx: &mut RunContext,
        report: &mut RunReport,
    ) -> DriverResult<()> {
        let mut aborted_at: Option<usize> = None;

        for (index, step) in scenario.steps.iter().enumerate() {
            let label = step.label();

            if let Some(critical) = aborted_at {
                debug!("Skipping step {} ({})", index + 1, label);
                report.push(StepResult {
                    index,
                    label,
                    kind: step.kind,
                    status: StepStatus::Skipped,
                    critical: step.is_critical(),
                    message: format!("skipped after critical step {} failed", critical + 1),
                    failure: None,
                    elapsed_ms: 0,
                    screenshot_path: None,
                    screenshot_sha256: None,
                });
                continue;
            }

            let start = Instant::now();
            let limit = Duration::from_millis(step.timeout_ms) + STEP_GRACE;
            let outcome = match timeout(limit, self.execute_step(scenario, index, step, browser, ctx)).await {
                Ok(outcome) => outcome,
                Err(_) if step.kind == StepKind::Navigate => Err(DriverError::Navigation(format!(
                    "{} did not load within {} ms",
                    label, step.timeout_ms
                ))),
                Err(_) => Err(DriverError::Timeout {
                    what: label.clone(),
                    timeout_ms: step.timeout_ms,
                }),
            };
            let elapsed_ms = start.elapsed().as_millis() as u64;

            let result = match outcome {
                Ok(output) => {
                    debug!("✓ step {} {} ({} ms)", index + 1, label, elapsed_ms);
                    let screenshot_sha256 = match &output.screenshot {
                        Some(path) => Some(EvidenceStore::digest(path)?),
                        None => None,
                    };
                    StepResult {
                        index,
                        label,
                        kind: step.kind,
                        status: StepStatus::Passed,
                        critical: step.is_critical(),
                        message: output.message,
                        failure: None,
                        elapsed_ms,
                        screenshot_path: output.screenshot,
                        screenshot_sha256,
                    }
                }
                Err(e) => {
                    let kind = match e.failure_kind() {
                        Some(kind) => kind,
                        None => {
                            error!("Step {} ({}) aborted the run: {}", index + 1, label, e);
                            return Err(e);
                        }
                    };
                    warn!("✗ step {} {} - {}: {}", index + 1, label, kind, e);
                    if step.is_critical() {
                        aborted_at = Some(index);
                    }
                    failed_result(index, label, step, kind, &e, elapsed_ms)
                }
            };
            report.push(result);
        }

        Ok(())
    }

    async fn execute_step(
        &self,
        scenario: &Scenario,
        index: usize,
        step: &Step,
        browser: &mut Option<Box<dyn BrowserSession>>,
        ctx: &mut RunContext,
    ) -> DriverResult<StepOutput> {
        let budget = Duration::from_millis(step.timeout_ms);

        if !step.kind.uses_browser() {
            return api_step(step, ctx, budget).await;
        }
        let page: &mut dyn BrowserSession = match browser.as_deref_mut() {
            Some(page) => page,
            None => {
                return Err(DriverError::Bridge(format!(
                    "{} step has no browser session",
                    step.kind
                )))
            }
        };

        match step.kind {
            StepKind::Navigate => {
                let url = SessionConfig::resolve_url(&ctx.session.base_url, step.url()?);
                page.goto(&url, step.timeout_ms).await?;
                Ok(StepOutput::message(format!("loaded {}", url)))
            }
            StepKind::Locate => {
                let target = step.target.as_ref().ok_or_else(|| {
                    DriverError::InvalidScenario("locate step needs a target".to_string())
                })?;
                let element = find(page, target, budget).await?;
                let message = describe_match(target, &element);
                ctx.located = Some(element);
                Ok(StepOutput::message(message))
            }
            StepKind::Act(act) => {
                let element = element_for(page, step, ctx.located.as_ref(), budget).await?;
                match act {
                    ActKind::Click => page.click(&element).await?,
                    ActKind::Hover => page.hover(&element).await?,
                    ActKind::Type => {
                        let text = step.payload_str().unwrap_or_default();
                        page.type_text(&element, text).await?;
                    }
                }
                Ok(StepOutput::message(format!("{} '{}'", act_verb(act), element.selector)))
            }
            StepKind::AssertText => {
                let deadline = Deadline::new(budget);
                let element = element_for(page, step, ctx.located.as_ref(), budget).await?;
                let expected = step.payload_str().unwrap_or_default();
                loop {
                    let actual = page.text(&element).await?;
                    let outcome = assert_text(&actual, expected);
                    if outcome.passed {
                        return Ok(StepOutput::message(outcome.message));
                    }
                    if !deadline.can_wait() {
                        return Err(DriverError::AssertionFailed(outcome.message));
                    }
                    sleep(POLL_INTERVAL).await;
                }
            }
            StepKind::AssertCount => {
                let deadline = Deadline::new(budget);
                let target = step.target.as_ref().ok_or_else(|| {
                    DriverError::InvalidScenario("assert_count step needs a target".to_string())
                })?;
                let predicate = step.count_predicate()?;
                loop {
                    let count = count_matches(page, target).await?;
                    let outcome = assert_count(count, &predicate);
                    if outcome.passed {
                        return Ok(StepOutput::message(outcome.message));
                    }
                    if !deadline.can_wait() {
                        return Err(DriverError::AssertionFailed(format!(
                            "{}: {}",
                            target, outcome.message
                        )));
                    }
                    sleep(POLL_INTERVAL).await;
                }
            }
            StepKind::Screenshot => {
                let label = step.payload_str().or(step.name.as_deref());
                let path = self.evidence.screenshot_path(&scenario.name, index, label)?;
                page.screenshot(&path).await?;
                Ok(StepOutput {
                    message: format!("saved {}", path.display()),
                    screenshot: Some(path),
                })
            }
            StepKind::Wait => match step.wait_condition()? {
                WaitCondition::Visible(target) => wait_visible(page, &target, budget).await,
                WaitCondition::Text(text) => wait_text(page, &text, budget).await,
            },
            StepKind::AssertNoConsoleErrors => {
                let errors = page.console_errors().await?;
                match errors.first() {
                    None => Ok(StepOutput::message("no console errors")),
                    Some(first) => Err(DriverError::AssertionFailed(format!(
                        "{} console error(s), first: {}",
                        errors.len(),
                        first
                    ))),
                }
            }
            StepKind::Request | StepKind::Login => api_step(step, ctx, budget).await,
        }
    }
}

/// `request` and `login` steps, which only talk to the API.
async fn api_step(step: &Step, ctx: &mut RunContext, budget: Duration) -> DriverResult<StepOutput> {
    if step.kind == StepKind::Login {
        let credentials = login_credentials(step, &ctx.session)?;
        return ctx.api.login(&credentials, budget).await.map(StepOutput::message);
    }
    let spec = step.request_spec()?;
    ctx.api.execute(&spec, budget).await.map(StepOutput::message)
}

/// The step's own target, resolved now, or the last located element.
async fn element_for(
    page: &mut dyn BrowserSession,
    step: &Step,
    located: Option<&ElementHandle>,
    budget: Duration,
) -> DriverResult<ElementHandle> {
    match &step.target {
        Some(target) => find(page, target, budget).await,
        None => located.cloned().ok_or_else(|| {
            DriverError::InvalidScenario(format!(
                "{} step has no target and nothing was located",
                step.kind
            ))
        }),
    }
}

async fn find(
    page: &mut dyn BrowserSession,
    target: &SelectorSpec,
    budget: Duration,
) -> DriverResult<ElementHandle> {
    resolve_selector(page, target, budget)
        .await?
        .ok_or_else(|| DriverError::ElementNotFound {
            selectors: target.candidates().to_vec(),
            timeout_ms: budget.as_millis() as u64,
        })
}

async fn wait_visible(
    page: &mut dyn BrowserSession,
    target: &SelectorSpec,
    budget: Duration,
) -> DriverResult<StepOutput> {
    let deadline = Deadline::new(budget);
    loop {
        for candidate in target.candidates() {
            if page.count(candidate).await? == 0 {
                continue;
            }
            let element = ElementHandle::new(candidate.clone(), 0);
            if page.is_visible(&element).await? {
                return Ok(StepOutput::message(format!("'{}' is visible", candidate)));
            }
        }
        if !deadline.can_wait() {
            return Err(DriverError::Timeout {
                what: format!("[{}] to become visible", target),
                timeout_ms: budget.as_millis() as u64,
            });
        }
        sleep(POLL_INTERVAL.min(deadline.remaining())).await;
    }
}

async fn wait_text(page: &mut dyn BrowserSession, text: &str, budget: Duration) -> DriverResult<StepOutput> {
    let deadline = Deadline::new(budget);
    loop {
        if page.page_text().await?.contains(text) {
            return Ok(StepOutput::message(format!("page shows '{}'", text)));
        }
        if !deadline.can_wait() {
            return Err(DriverError::Timeout {
                what: format!("text '{}'", text),
                timeout_ms: budget.as_millis() as u64,
            });
        }
        sleep(POLL_INTERVAL.min(deadline.remaining())).await;
    }
}

/// Step payload first, then the session's default account.
fn login_credentials(step: &Step, session: &SessionConfig) -> DriverResult<Credentials> {
    let spec = step.login_spec()?;
    let fallback = session.credentials.as_ref();
    let email = spec
        .email
        .or_else(|| fallback.map(|c| c.email.clone()))
        .ok_or_else(|| DriverError::InvalidScenario("login step has no email".to_string()))?;
    let password = spec
        .password
        .or_else(|| fallback.map(|c| c.password.clone()))
        .ok_or_else(|| DriverError::InvalidScenario("login step has no password".to_string()))?;
    Ok(Credentials { email, password })
}

/// Session settings with the scenario's overrides applied
fn effective_session(scenario: &Scenario, session: &SessionConfig) -> SessionConfig {
    let mut session = session.clone();
    if let Some(base_url) = &scenario.base_url {
        session.base_url = base_url.clone();
    }
    if let Some(viewport) = scenario.viewport {
        session.viewport = viewport;
    }
    session
}

fn describe_match(target: &SelectorSpec, element: &ElementHandle) -> String {
    let position = target
        .candidates()
        .iter()
        .position(|c| *c == element.selector)
        .unwrap_or(0);
    if position == 0 {
        format!("found '{}'", element.selector)
    } else {
        format!(
            "found '{}' (fallback {} of {})",
            element.selector,
            position + 1,
            target.candidates().len()
        )
    }
}

fn act_verb(act: ActKind) -> &'static str {
    match act {
        ActKind::Click => "clicked",
        ActKind::Type => "typed into",
        ActKind::Hover => "hovered",
    }
}

fn failed_result(
    index: usize,
    label: String,
    step: &Step,
    kind: FailureKind,
    error: &DriverError,
    elapsed_ms: u64,
) -> StepResult {
    StepResult {
        index,
        label,
        kind: step.kind,
        status: StepStatus::Failed,
        critical: step.is_critical(),
        message: error.to_string(),
        failure: Some(kind),
        elapsed_ms,
        screenshot_path: None,
        screenshot_sha256: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Viewport;

    #[test]
    fn test_effective_session_applies_overrides() {
        let mut scenario = Scenario::new("s", vec![Step::navigate("/")]);
        scenario.base_url = Some("http://staging.local".into());
        scenario.viewport = Some(Viewport { width: 390, height: 844 });

        let session = effective_session(&scenario, &SessionConfig::default());
        assert_eq!(session.base_url, "http://staging.local");
        assert_eq!(session.viewport.width, 390);
        assert_eq!(session.api_url.as_deref(), Some("http://localhost:3001"));
    }

    #[test]
    fn test_login_credentials_fall_back_to_session() {
        let session = SessionConfig {
            credentials: Some(Credentials {
                email: "customer@example.com".into(),
                password: "customer123".into(),
            }),
            ..SessionConfig::default()
        };
        let step = Step::login(crate::scenario::LoginSpec {
            email: Some("admin@example.com".into()),
            password: None,
        });
        let creds = login_credentials(&step, &session).unwrap();
        assert_eq!(creds.email, "admin@example.com");
        assert_eq!(creds.password, "customer123");

        let err = login_credentials(&step, &SessionConfig::default()).unwrap_err();
        assert!(matches!(err, DriverError::InvalidScenario(_)));
    }

    #[test]
    fn test_describe_match_names_fallback() {
        let target = SelectorSpec::new(["[data-testid=cart]", ".cart-icon"]).unwrap();
        assert_eq!(
            describe_match(&target, &ElementHandle::new(".cart-icon", 0)),
            "found '.cart-icon' (fallback 2 of 2)"
        );
    }
}
