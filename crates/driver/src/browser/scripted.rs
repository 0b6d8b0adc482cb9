//! In-memory browser backend
//!
//! A [`ScriptedSite`] is a fixed set of pages keyed by path. Elements match a
//! selector when the selector string is one of the element's declared
//! selectors; there is no CSS engine. Clicks can trigger [`Effect`]s, which
//! is enough to model a login form or an add-to-cart badge.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use super::{BrowserLauncher, BrowserSession, ElementHandle};
use crate::config::SessionConfig;
use crate::error::{DriverError, DriverResult};

/// 1x1 transparent PNG
const PLACEHOLDER_PNG: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
    0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0A, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00,
    0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49,
    0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
];

/// What happens when a scripted element is clicked
#[derive(Debug, Clone)]
pub enum Effect {
    /// Load another page of the site
    Navigate(String),
    /// Add an element to the current page
    Insert(ScriptedElement),
    /// Replace the text of every element matching a selector
    SetText { selector: String, text: String },
    /// Remove every element matching a selector
    Remove(String),
    /// Log a console error
    ConsoleError(String),
    /// Simulate the engine dying mid-run
    Crash,
}

#[derive(Debug, Clone)]
pub struct ScriptedElement {
    selectors: Vec<String>,
    text: String,
    visible: bool,
    appears_after: Option<Duration>,
    on_click: Vec<Effect>,
}

impl ScriptedElement {
    pub fn new<I, S>(selectors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            selectors: selectors.into_iter().map(Into::into).collect(),
            text: String::new(),
            visible: true,
            appears_after: None,
            on_click: Vec::new(),
        }
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    /// Render only once the page has been loaded for `delay`.
    pub fn appears_after(mut self, delay: Duration) -> Self {
        self.appears_after = Some(delay);
        self
    }

    pub fn on_click(mut self, effect: Effect) -> Self {
        self.on_click.push(effect);
        self
    }

    fn matches(&self, selector: &str) -> bool {
        self.selectors.iter().any(|s| s == selector)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScriptedPage {
    elements: Vec<ScriptedElement>,
    console_errors: Vec<String>,
    load_delay: Option<Duration>,
}

impl ScriptedPage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn element(mut self, element: ScriptedElement) -> Self {
        self.elements.push(element);
        self
    }

    pub fn console_error(mut self, message: impl Into<String>) -> Self {
        self.console_errors.push(message.into());
        self
    }

    /// Make navigation to this page take `delay`.
    pub fn load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = Some(delay);
        self
    }
}

/// Pages served under one origin
#[derive(Debug, Clone)]
pub struct ScriptedSite {
    origin: String,
    pages: HashMap<String, ScriptedPage>,
}

impl ScriptedSite {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into().trim_end_matches('/').to_string(),
            pages: HashMap::new(),
        }
    }

    pub fn page(mut self, path: impl Into<String>, page: ScriptedPage) -> Self {
        self.pages.insert(path.into(), page);
        self
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    fn lookup(&self, url: &str) -> DriverResult<(String, &ScriptedPage)> {
        let rest = url.strip_prefix(&self.origin).ok_or_else(|| {
            DriverError::Navigation(format!("net::ERR_CONNECTION_REFUSED at {}", url))
        })?;
        let path = rest.split(['?', '#']).next().unwrap_or("");
        let path = if path.is_empty() { "/" } else { path };
        self.pages
            .get(path)
            .map(|page| (path.to_string(), page))
            .ok_or_else(|| DriverError::Navigation(format!("HTTP 404 for {}", url)))
    }
}

/// Launches sessions against a [`ScriptedSite`] and keeps count of them.
pub struct ScriptedLauncher {
    site: Arc<ScriptedSite>,
    open: Arc<AtomicUsize>,
    launched: AtomicUsize,
    actions: Arc<Mutex<Vec<String>>>,
}

impl ScriptedLauncher {
    pub fn new(site: ScriptedSite) -> Self {
        Self {
            site: Arc::new(site),
            open: Arc::new(AtomicUsize::new(0)),
            launched: AtomicUsize::new(0),
            actions: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Sessions launched and not yet closed
    pub fn open_sessions(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    pub fn launches(&self) -> usize {
        self.launched.load(Ordering::SeqCst)
    }

    /// Every interaction performed so far, e.g. `click:#submit`
    pub fn actions(&self) -> Vec<String> {
        self.actions.lock().clone()
    }
}

#[async_trait]
impl BrowserLauncher for ScriptedLauncher {
    async fn launch(&self, session: &SessionConfig) -> DriverResult<Box<dyn BrowserSession>> {
        debug!(
            "Launching scripted session ({}x{}, headless: {})",
            session.viewport.width, session.viewport.height, session.headless
        );
        self.open.fetch_add(1, Ordering::SeqCst);
        self.launched.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSession {
            site: Arc::clone(&self.site),
            open: Arc::clone(&self.open),
            actions: Arc::clone(&self.actions),
            current: None,
            closed: false,
        }))
    }
}

struct LoadedPage {
    path: String,
    elements: Vec<ScriptedElement>,
    console_errors: Vec<String>,
    loaded_at: Instant,
}

impl LoadedPage {
    fn rendered(&self) -> impl Iterator<Item = &ScriptedElement> {
        let age = self.loaded_at.elapsed();
        self.elements
            .iter()
            .filter(move |e| e.appears_after.map(|d| age >= d).unwrap_or(true))
    }
}

struct ScriptedSession {
    site: Arc<ScriptedSite>,
    open: Arc<AtomicUsize>,
    actions: Arc<Mutex<Vec<String>>>,
    current: Option<LoadedPage>,
    closed: bool,
}

impl ScriptedSession {
    fn ensure_open(&self) -> DriverResult<()> {
        if self.closed {
            Err(DriverError::Bridge("session already closed".to_string()))
        } else {
            Ok(())
        }
    }

    fn load(&mut self, url: &str) -> DriverResult<Option<Duration>> {
        let (path, page) = self.site.lookup(url)?;
        let delay = page.load_delay;
        self.current = Some(LoadedPage {
            path,
            elements: page.elements.clone(),
            console_errors: page.console_errors.clone(),
            loaded_at: Instant::now(),
        });
        Ok(delay)
    }

    fn record(&self, action: String) {
        self.actions.lock().push(action);
    }

    fn element(&self, handle: &ElementHandle) -> DriverResult<&ScriptedElement> {
        self.current
            .as_ref()
            .and_then(|page| {
                page.rendered()
                    .filter(|e| e.matches(&handle.selector))
                    .nth(handle.index)
            })
            .ok_or_else(|| DriverError::ElementNotFound {
                selectors: vec![handle.selector.clone()],
                timeout_ms: 0,
            })
    }

    fn apply(&mut self, effect: Effect) -> DriverResult<()> {
        match effect {
            Effect::Navigate(path) => {
                let url = format!("{}{}", self.site.origin(), path);
                self.load(&url)?;
            }
            Effect::Insert(element) => {
                if let Some(page) = self.current.as_mut() {
                    page.elements.push(element);
                }
            }
            Effect::SetText { selector, text } => {
                if let Some(page) = self.current.as_mut() {
                    for element in page.elements.iter_mut().filter(|e| e.matches(&selector)) {
                        element.text = text.clone();
                    }
                }
            }
            Effect::Remove(selector) => {
                if let Some(page) = self.current.as_mut() {
                    page.elements.retain(|e| !e.matches(&selector));
                }
            }
            Effect::ConsoleError(message) => {
                if let Some(page) = self.current.as_mut() {
                    page.console_errors.push(message);
                }
            }
            Effect::Crash => {
                return Err(DriverError::Bridge("browser process exited".to_string()));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl BrowserSession for ScriptedSession {
    async fn goto(&mut self, url: &str, _timeout_ms: u64) -> DriverResult<()> {
        self.ensure_open()?;
        self.record(format!("goto:{}", url));
        if let Some(delay) = self.load(url)? {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    async fn count(&mut self, selector: &str) -> DriverResult<usize> {
        self.ensure_open()?;
        Ok(self
            .current
            .as_ref()
            .map(|page| page.rendered().filter(|e| e.matches(selector)).count())
            .unwrap_or(0))
    }

    async fn is_visible(&mut self, element: &ElementHandle) -> DriverResult<bool> {
        self.ensure_open()?;
        Ok(self.element(element)?.visible)
    }

    async fn text(&mut self, element: &ElementHandle) -> DriverResult<String> {
        self.ensure_open()?;
        Ok(self.element(element)?.text.clone())
    }

    async fn page_text(&mut self) -> DriverResult<String> {
        self.ensure_open()?;
        Ok(self
            .current
            .as_ref()
            .map(|page| {
                page.rendered()
                    .filter(|e| e.visible && !e.text.is_empty())
                    .map(|e| e.text.as_str())
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_default())
    }

    async fn click(&mut self, element: &ElementHandle) -> DriverResult<()> {
        self.ensure_open()?;
        let target = self.element(element)?;
        if !target.visible {
            return Err(DriverError::AssertionFailed(format!(
                "'{}' is not visible and cannot be clicked",
                element.selector
            )));
        }
        let effects = target.on_click.clone();
        self.record(format!("click:{}", element.selector));
        for effect in effects {
            self.apply(effect)?;
        }
        Ok(())
    }

    async fn type_text(&mut self, element: &ElementHandle, text: &str) -> DriverResult<()> {
        self.ensure_open()?;
        self.element(element)?;
        self.record(format!("type:{}={}", element.selector, text));
        Ok(())
    }

    async fn hover(&mut self, element: &ElementHandle) -> DriverResult<()> {
        self.ensure_open()?;
        self.element(element)?;
        self.record(format!("hover:{}", element.selector));
        Ok(())
    }

    async fn screenshot(&mut self, path: &Path) -> DriverResult<()> {
        self.ensure_open()?;
        let page = self
            .current
            .as_ref()
            .map(|p| p.path.clone())
            .unwrap_or_else(|| "about:blank".to_string());
        self.record(format!("screenshot:{}", page));
        tokio::fs::write(path, PLACEHOLDER_PNG).await?;
        Ok(())
    }

    async fn console_errors(&mut self) -> DriverResult<Vec<String>> {
        self.ensure_open()?;
        Ok(self
            .current
            .as_ref()
            .map(|p| p.console_errors.clone())
            .unwrap_or_default())
    }

    async fn close(&mut self) -> DriverResult<()> {
        if !self.closed {
            self.closed = true;
            self.open.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site() -> ScriptedSite {
        ScriptedSite::new("http://shop.test").page(
            "/products",
            ScriptedPage::new()
                .element(ScriptedElement::new(["[data-testid=add-to-cart]"]).on_click(
                    Effect::Insert(ScriptedElement::new(["[data-testid=cart-badge]"]).text("1")),
                ))
                .element(ScriptedElement::new([".sale-badge"]).hidden()),
        )
    }

    #[tokio::test]
    async fn test_click_effect_inserts_element() {
        let launcher = ScriptedLauncher::new(site());
        let mut session = launcher.launch(&SessionConfig::default()).await.unwrap();
        session.goto("http://shop.test/products?page=1", 1000).await.unwrap();

        assert_eq!(session.count("[data-testid=cart-badge]").await.unwrap(), 0);
        session
            .click(&ElementHandle::new("[data-testid=add-to-cart]", 0))
            .await
            .unwrap();
        assert_eq!(session.count("[data-testid=cart-badge]").await.unwrap(), 1);
        assert_eq!(session.page_text().await.unwrap(), "1");

        session.close().await.unwrap();
        session.close().await.unwrap();
        assert_eq!(launcher.open_sessions(), 0);
        assert_eq!(launcher.launches(), 1);
    }

    #[tokio::test]
    async fn test_unknown_origin_and_path_fail_navigation() {
        let launcher = ScriptedLauncher::new(site());
        let mut session = launcher.launch(&SessionConfig::default()).await.unwrap();

        let refused = session.goto("http://localhost:1/doesnotexist", 1000).await;
        assert!(matches!(refused, Err(DriverError::Navigation(_))));

        let missing = session.goto("http://shop.test/nope", 1000).await;
        assert!(matches!(missing, Err(DriverError::Navigation(_))));
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_hidden_element_cannot_be_clicked() {
        let launcher = ScriptedLauncher::new(site());
        let mut session = launcher.launch(&SessionConfig::default()).await.unwrap();
        session.goto("http://shop.test/products", 1000).await.unwrap();

        let badge = ElementHandle::new(".sale-badge", 0);
        assert!(!session.is_visible(&badge).await.unwrap());
        assert!(session.click(&badge).await.is_err());
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_closed_session_rejects_calls() {
        let launcher = ScriptedLauncher::new(site());
        let mut session = launcher.launch(&SessionConfig::default()).await.unwrap();
        session.close().await.unwrap();
        assert!(matches!(
            session.count("anything").await,
            Err(DriverError::Bridge(_))
        ));
    }
}
