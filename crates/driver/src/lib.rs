//! FlowCheck verification driver
//!
//! Runs declarative UI scenarios (YAML) against a web application through a
//! browser capability and records a structured report per run.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  UiVerificationDriver                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  run(scenario, session) -> RunReport                        │
//! │    ├── BrowserLauncher::launch() -> BrowserSession          │
//! │    ├── resolve_selector(candidates, budget)                 │
//! │    ├── assert_text / assert_count                           │
//! │    ├── EvidenceStore::screenshot_path()                     │
//! │    ├── ApiClient (request / login steps)                    │
//! │    └── BrowserSession::close()   (always)                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Scenario (YAML)                                            │
//! │    ├── name, description, tags                              │
//! │    └── steps: [Step { kind, target, payload, timeout_ms }]  │
//! │          navigate | locate | click | type | hover           │
//! │          assert_text | assert_count | screenshot | wait     │
//! │          request | login | assert_no_console_errors         │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod assertion;
pub mod browser;
pub mod config;
pub mod driver;
pub mod error;
pub mod evidence;
pub mod features;
pub mod health;
pub mod http;
pub mod report;
pub mod scenario;
pub mod selector;

pub use assertion::{assert_count, assert_text, AssertionOutcome, Comparison, CountPredicate};
pub use browser::{BrowserLauncher, BrowserSession, ElementHandle};
pub use config::{DriverConfig, SessionConfig};
pub use driver::UiVerificationDriver;
pub use error::{DriverError, DriverResult, FailureKind};
pub use evidence::EvidenceStore;
pub use report::{RunReport, StepResult, StepStatus, SuiteReport};
pub use scenario::{Scenario, Step, StepKind};
pub use selector::{resolve_selector, SelectorSpec};
