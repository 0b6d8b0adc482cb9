//! Declarative YAML scenario definitions

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::assertion::CountPredicate;
use crate::config::Viewport;
use crate::error::{DriverError, DriverResult};
use crate::selector::SelectorSpec;

/// Default per-step timeout
pub const DEFAULT_STEP_TIMEOUT_MS: u64 = 5000;

/// A named, ordered verification unit parsed from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Unique name; also names the evidence directory
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Tags for filtering scenarios
    #[serde(default)]
    pub tags: Vec<String>,

    /// Overrides the session's frontend URL
    #[serde(default)]
    pub base_url: Option<String>,

    /// Overrides the session's viewport
    #[serde(default)]
    pub viewport: Option<Viewport>,

    /// Steps to execute in order
    pub steps: Vec<Step>,
}

/// One action or assertion within a scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// Optional label used in reports
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub kind: StepKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<SelectorSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Overrides the kind's default criticality
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub critical: Option<bool>,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_STEP_TIMEOUT_MS
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActKind {
    Click,
    Type,
    Hover,
}

/// What a step does. Written in YAML as a snake_case word
/// (`navigate`, `click`, `assert_count`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum StepKind {
    Navigate,
    Locate,
    Act(ActKind),
    AssertText,
    AssertCount,
    Screenshot,
    Wait,
    Request,
    Login,
    AssertNoConsoleErrors,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Navigate => "navigate",
            StepKind::Locate => "locate",
            StepKind::Act(ActKind::Click) => "click",
            StepKind::Act(ActKind::Type) => "type",
            StepKind::Act(ActKind::Hover) => "hover",
            StepKind::AssertText => "assert_text",
            StepKind::AssertCount => "assert_count",
            StepKind::Screenshot => "screenshot",
            StepKind::Wait => "wait",
            StepKind::Request => "request",
            StepKind::Login => "login",
            StepKind::AssertNoConsoleErrors => "assert_no_console_errors",
        }
    }

    /// Failure of these kinds makes every later step meaningless.
    pub fn critical_by_default(&self) -> bool {
        matches!(self, StepKind::Navigate | StepKind::Login)
    }

    /// Whether the step needs a browser page.
    pub fn uses_browser(&self) -> bool {
        !matches!(self, StepKind::Request | StepKind::Login)
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for StepKind {
    type Error = DriverError;

    fn try_from(s: String) -> DriverResult<Self> {
        let kind = match s.as_str() {
            "navigate" => StepKind::Navigate,
            "locate" => StepKind::Locate,
            "click" => StepKind::Act(ActKind::Click),
            "type" | "fill" => StepKind::Act(ActKind::Type),
            "hover" => StepKind::Act(ActKind::Hover),
            "assert_text" => StepKind::AssertText,
            "assert_count" => StepKind::AssertCount,
            "screenshot" => StepKind::Screenshot,
            "wait" => StepKind::Wait,
            "request" => StepKind::Request,
            "login" => StepKind::Login,
            "assert_no_console_errors" => StepKind::AssertNoConsoleErrors,
            other => {
                return Err(DriverError::InvalidScenario(format!(
                    "unknown step kind '{}'",
                    other
                )))
            }
        };
        Ok(kind)
    }
}

impl From<StepKind> for String {
    fn from(kind: StepKind) -> Self {
        kind.as_str().to_string()
    }
}

/// Payload of a `request` step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestSpec {
    #[serde(default = "default_method")]
    pub method: String,

    /// Path relative to the API base URL, e.g. `/api/products`
    pub path: String,

    #[serde(default)]
    pub body: Option<Value>,

    /// Expected status; without it any 2xx passes
    #[serde(default)]
    pub status: Option<u16>,

    /// Expected length of a JSON array response
    #[serde(default)]
    pub count: Option<CountPredicate>,

    /// Response field holding the list that `count` checks
    #[serde(default)]
    pub items: Option<String>,

    /// Send the bearer token from an earlier `login` step
    #[serde(default)]
    pub auth: bool,
}

fn default_method() -> String {
    "GET".to_string()
}

/// Payload of a `login` step; missing fields come from the session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginSpec {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// What a `wait` step polls for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitCondition {
    Visible(SelectorSpec),
    Text(String),
}

impl Step {
    pub fn new(kind: StepKind) -> Self {
        Self {
            name: None,
            kind,
            target: None,
            payload: None,
            timeout_ms: DEFAULT_STEP_TIMEOUT_MS,
            critical: None,
        }
    }

    pub fn navigate(url: impl Into<String>) -> Self {
        Self::new(StepKind::Navigate).with_payload(Value::String(url.into()))
    }

    pub fn locate(target: SelectorSpec) -> Self {
        Self::new(StepKind::Locate).with_target(target)
    }

    /// Click `target`, or the last located element when `None`.
    pub fn click(target: Option<SelectorSpec>) -> Self {
        Self::act(ActKind::Click, target)
    }

    pub fn hover(target: Option<SelectorSpec>) -> Self {
        Self::act(ActKind::Hover, target)
    }

    pub fn type_text(target: Option<SelectorSpec>, text: impl Into<String>) -> Self {
        Self::act(ActKind::Type, target).with_payload(Value::String(text.into()))
    }

    fn act(kind: ActKind, target: Option<SelectorSpec>) -> Self {
        Self {
            target,
            ..Self::new(StepKind::Act(kind))
        }
    }

    pub fn assert_text(target: SelectorSpec, expected: impl Into<String>) -> Self {
        Self::new(StepKind::AssertText)
            .with_target(target)
            .with_payload(Value::String(expected.into()))
    }

    pub fn assert_count(target: SelectorSpec, predicate: impl Into<String>) -> Self {
        Self::new(StepKind::AssertCount)
            .with_target(target)
            .with_payload(Value::String(predicate.into()))
    }

    pub fn screenshot(label: Option<&str>) -> Self {
        let step = Self::new(StepKind::Screenshot);
        match label {
            Some(label) => step.with_payload(Value::String(label.to_string())),
            None => step,
        }
    }

    pub fn wait_for(target: SelectorSpec) -> Self {
        Self::new(StepKind::Wait).with_target(target)
    }

    pub fn request(spec: &RequestSpec) -> Self {
        Self::new(StepKind::Request)
            .with_payload(serde_json::to_value(spec).unwrap_or(Value::Null))
    }

    pub fn login(spec: LoginSpec) -> Self {
        Self::new(StepKind::Login).with_payload(serde_json::to_value(spec).unwrap_or(Value::Null))
    }

    pub fn with_target(mut self, target: SelectorSpec) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_critical(mut self, critical: bool) -> Self {
        self.critical = Some(critical);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn is_critical(&self) -> bool {
        self.critical.unwrap_or_else(|| self.kind.critical_by_default())
    }

    /// Short label for logs and reports
    pub fn label(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        let detail = match (&self.target, self.payload_str()) {
            (Some(target), _) => target.primary().to_string(),
            (None, Some(text)) if self.kind != StepKind::Act(ActKind::Type) => {
                text.chars().take(40).collect()
            }
            (None, _) if matches!(self.kind, StepKind::Act(_)) => "<located>".to_string(),
            (None, _) => match self.kind {
                StepKind::Request => self
                    .request_spec()
                    .map(|r| format!("{} {}", r.method, r.path))
                    .unwrap_or_default(),
                _ => String::new(),
            },
        };
        if detail.is_empty() {
            self.kind.as_str().to_string()
        } else {
            format!("{}:{}", self.kind, detail)
        }
    }

    pub fn payload_str(&self) -> Option<&str> {
        self.payload.as_ref().and_then(Value::as_str)
    }

    fn require_payload_str(&self, what: &str) -> DriverResult<&str> {
        self.payload_str().ok_or_else(|| {
            DriverError::InvalidScenario(format!("{} step needs a {} payload", self.kind, what))
        })
    }

    fn require_target(&self) -> DriverResult<&SelectorSpec> {
        self.target.as_ref().ok_or_else(|| {
            DriverError::InvalidScenario(format!("{} step needs a target", self.kind))
        })
    }

    pub fn url(&self) -> DriverResult<&str> {
        self.require_payload_str("URL")
    }

    pub fn count_predicate(&self) -> DriverResult<CountPredicate> {
        let payload = self.payload.clone().ok_or_else(|| {
            DriverError::InvalidScenario("assert_count step needs a predicate payload".to_string())
        })?;
        CountPredicate::try_from(payload)
    }

    pub fn request_spec(&self) -> DriverResult<RequestSpec> {
        let payload = self.payload.clone().ok_or_else(|| {
            DriverError::InvalidScenario("request step needs a payload".to_string())
        })?;
        let spec: RequestSpec = serde_json::from_value(payload).map_err(|e| {
            DriverError::InvalidScenario(format!("invalid request payload: {}", e))
        })?;
        match spec.method.to_ascii_uppercase().as_str() {
            "GET" | "POST" | "PUT" | "PATCH" | "DELETE" => Ok(spec),
            other => Err(DriverError::InvalidScenario(format!(
                "unsupported HTTP method '{}'",
                other
            ))),
        }
    }

    pub fn login_spec(&self) -> DriverResult<LoginSpec> {
        match &self.payload {
            None | Some(Value::Null) => Ok(LoginSpec::default()),
            Some(payload) => serde_json::from_value(payload.clone()).map_err(|e| {
                DriverError::InvalidScenario(format!("invalid login payload: {}", e))
            }),
        }
    }

    pub fn wait_condition(&self) -> DriverResult<WaitCondition> {
        if let Some(target) = &self.target {
            return Ok(WaitCondition::Visible(target.clone()));
        }
        let text = match &self.payload {
            Some(Value::String(text)) => Some(text.clone()),
            Some(Value::Object(map)) => map.get("text").and_then(Value::as_str).map(String::from),
            _ => None,
        };
        text.map(WaitCondition::Text).ok_or_else(|| {
            DriverError::InvalidScenario(
                "wait step needs a target selector or a text payload".to_string(),
            )
        })
    }

    /// Check the fields this kind requires.
    pub fn validate(&self) -> DriverResult<()> {
        if self.timeout_ms == 0 {
            return Err(DriverError::InvalidScenario(format!(
                "{} step has a zero timeout",
                self.kind
            )));
        }
        match self.kind {
            StepKind::Navigate => self.url().map(|_| ()),
            StepKind::Locate => self.require_target().map(|_| ()),
            StepKind::Act(ActKind::Type) => self.require_payload_str("text").map(|_| ()),
            StepKind::Act(_) => Ok(()),
            StepKind::AssertText => self.require_payload_str("expected text").map(|_| ()),
            StepKind::AssertCount => {
                self.require_target()?;
                self.count_predicate().map(|_| ())
            }
            StepKind::Screenshot => match &self.payload {
                None | Some(Value::String(_)) => Ok(()),
                Some(_) => Err(DriverError::InvalidScenario(
                    "screenshot label must be a string".to_string(),
                )),
            },
            StepKind::Wait => self.wait_condition().map(|_| ()),
            StepKind::Request => self.request_spec().map(|_| ()),
            StepKind::Login => self.login_spec().map(|_| ()),
            StepKind::AssertNoConsoleErrors => Ok(()),
        }
    }
}

impl Scenario {
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            tags: Vec::new(),
            base_url: None,
            viewport: None,
            steps,
        }
    }

    /// Parse a scenario from a YAML string
    pub fn from_yaml(yaml: &str) -> DriverResult<Self> {
        serde_yaml::from_str(yaml).map_err(DriverError::from)
    }

    /// Parse a scenario from a YAML file
    pub fn from_file(path: &Path) -> DriverResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Load all scenarios below a directory, ordered by path
    pub fn load_all(dir: &Path) -> DriverResult<Vec<Self>> {
        let mut paths: Vec<_> = walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
            .map(|e| e.into_path())
            .collect();
        paths.sort();

        paths.iter().map(|p| Self::from_file(p)).collect()
    }

    /// Load a single file or every scenario in a directory
    pub fn load_path(path: &Path) -> DriverResult<Vec<Self>> {
        if path.is_dir() {
            Self::load_all(path)
        } else {
            Ok(vec![Self::from_file(path)?])
        }
    }

    /// Filter scenarios by tag
    pub fn filter_by_tag<'a>(scenarios: &'a [Self], tag: &str) -> Vec<&'a Self> {
        scenarios
            .iter()
            .filter(|s| s.tags.iter().any(|t| t == tag))
            .collect()
    }

    pub fn needs_browser(&self) -> bool {
        self.steps.iter().any(|s| s.kind.uses_browser())
    }

    /// Reject scenarios the driver cannot run.
    pub fn validate(&self) -> DriverResult<()> {
        if self.name.trim().is_empty() {
            return Err(DriverError::InvalidScenario(
                "scenario name is empty".to_string(),
            ));
        }
        if self.steps.is_empty() {
            return Err(DriverError::InvalidScenario(format!(
                "scenario '{}' has no steps",
                self.name
            )));
        }
        let mut located = false;
        for (i, step) in self.steps.iter().enumerate() {
            let invalid = |msg: String| {
                DriverError::InvalidScenario(format!(
                    "scenario '{}' step {}: {}",
                    self.name,
                    i + 1,
                    msg
                ))
            };
            step.validate().map_err(|e| match e {
                DriverError::InvalidScenario(msg) => invalid(msg),
                other => other,
            })?;

            let uses_located = matches!(step.kind, StepKind::Act(_) | StepKind::AssertText);
            if uses_located && step.target.is_none() && !located {
                return Err(invalid(format!(
                    "{} step has no target and no earlier locate step",
                    step.kind
                )));
            }
            located |= step.kind == StepKind::Locate;
        }
        Ok(())
    }

    /// Selector-order warnings for every step target
    pub fn lint(&self) -> Vec<String> {
        self.steps
            .iter()
            .enumerate()
            .filter_map(|(i, step)| step.target.as_ref().map(|t| (i, t)))
            .flat_map(|(i, target)| {
                target
                    .stability_warnings()
                    .into_iter()
                    .map(move |w| format!("step {}: {}", i + 1, w))
            })
            .collect()
    }
}
