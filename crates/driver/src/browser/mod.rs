//! Browser capability consumed by the driver
//!
//! The driver never talks to a browser engine directly. It asks a
//! [`BrowserLauncher`] for a [`BrowserSession`] at the start of a run and
//! closes it on the way out. Two launchers ship with the crate:
//!
//! - [`PlaywrightLauncher`] drives a real browser through a small Node.js
//!   bridge process.
//! - [`ScriptedLauncher`] serves an in-memory site model and is what the
//!   test suite runs against.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::SessionConfig;
use crate::error::DriverResult;

pub mod playwright;
pub mod scripted;

pub use playwright::PlaywrightLauncher;
pub use scripted::{Effect, ScriptedElement, ScriptedLauncher, ScriptedPage, ScriptedSite};

/// A resolved element: the candidate selector that matched and which match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementHandle {
    pub selector: String,
    pub index: usize,
}

impl ElementHandle {
    pub fn new(selector: impl Into<String>, index: usize) -> Self {
        Self {
            selector: selector.into(),
            index,
        }
    }
}

/// One open page, exclusively owned by a driver run.
///
/// Navigation failures are reported as [`crate::DriverError::Navigation`];
/// acting on an element that disappeared as
/// [`crate::DriverError::ElementNotFound`]. Transport problems with the
/// engine itself use [`crate::DriverError::Bridge`].
#[async_trait]
pub trait BrowserSession: Send {
    /// Load `url` and wait for the document to settle.
    async fn goto(&mut self, url: &str, timeout_ms: u64) -> DriverResult<()>;

    /// Number of elements currently matching `selector`.
    async fn count(&mut self, selector: &str) -> DriverResult<usize>;

    async fn is_visible(&mut self, element: &ElementHandle) -> DriverResult<bool>;

    async fn text(&mut self, element: &ElementHandle) -> DriverResult<String>;

    /// Visible text of the whole page.
    async fn page_text(&mut self) -> DriverResult<String>;

    async fn click(&mut self, element: &ElementHandle) -> DriverResult<()>;

    async fn type_text(&mut self, element: &ElementHandle, text: &str) -> DriverResult<()>;

    async fn hover(&mut self, element: &ElementHandle) -> DriverResult<()>;

    /// Write a PNG of the viewport to `path`.
    async fn screenshot(&mut self, path: &Path) -> DriverResult<()>;

    /// Console errors logged since the last navigation.
    async fn console_errors(&mut self) -> DriverResult<Vec<String>>;

    /// Release the session. Calling it twice is harmless.
    async fn close(&mut self) -> DriverResult<()>;
}

/// Factory for sessions.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, session: &SessionConfig) -> DriverResult<Box<dyn BrowserSession>>;
}
