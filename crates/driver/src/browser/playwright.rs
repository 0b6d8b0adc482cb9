//! Playwright browser automation over a Node.js bridge
//!
//! The launcher writes a small bridge script to a temp directory and runs it
//! with `node`. The bridge launches the browser once, then answers one JSON
//! command per stdin line with one JSON reply per stdout line:
//!
//! ```text
//! -> {"id":3,"op":"count","selector":"[data-testid=cart-badge]"}
//! <- {"id":3,"ok":true,"value":1}
//! ```

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::{BrowserLauncher, BrowserSession, ElementHandle};
use crate::config::{BridgeConfig, SessionConfig};
use crate::error::{DriverError, DriverResult};

/// Grace period for the bridge to acknowledge `close`
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Launches Playwright-backed sessions
pub struct PlaywrightLauncher {
    config: BridgeConfig,
}

impl PlaywrightLauncher {
    pub fn new(config: BridgeConfig) -> Self {
        Self { config }
    }

    /// Check that the configured node binary runs
    pub async fn check_node(&self) -> DriverResult<()> {
        let status = Command::new(&self.config.node_binary)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        match status {
            Ok(status) if status.success() => Ok(()),
            _ => Err(DriverError::NodeNotFound(
                self.config.node_binary.display().to_string(),
            )),
        }
    }

    fn node_path(&self) -> PathBuf {
        let base = self
            .config
            .working_dir
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));
        base.join("node_modules")
    }
}

#[async_trait]
impl BrowserLauncher for PlaywrightLauncher {
    async fn launch(&self, session: &SessionConfig) -> DriverResult<Box<dyn BrowserSession>> {
        self.check_node().await?;

        let script_dir = tempfile::tempdir()?;
        let script_path = script_dir.path().join("bridge.js");
        tokio::fs::write(&script_path, bridge_script(&self.config, session)).await?;

        info!(
            "Launching {} (headless: {}, viewport {}x{})",
            self.config.browser.as_str(),
            session.headless,
            session.viewport.width,
            session.viewport.height
        );

        let mut child = Command::new(&self.config.node_binary)
            .arg(&script_path)
            .env("NODE_PATH", self.node_path())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                DriverError::Bridge(format!(
                    "failed to spawn {}: {}",
                    self.config.node_binary.display(),
                    e
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| DriverError::Bridge("bridge stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DriverError::Bridge("bridge stdout unavailable".to_string()))?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!("[bridge] {}", line);
                }
            });
        }

        let mut bridge = PlaywrightSession {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            next_id: 1,
            closed: false,
            _script_dir: script_dir,
        };

        match timeout(self.config.launch_timeout(), bridge.read_reply(0)).await {
            Ok(Ok(reply)) if reply.ok => Ok(Box::new(bridge)),
            Ok(Ok(reply)) => {
                bridge.kill().await;
                let message = reply
                    .error
                    .map(|e| e.message)
                    .unwrap_or_else(|| "launch failed".to_string());
                Err(DriverError::Bridge(format!("browser launch failed: {}", message)))
            }
            Ok(Err(e)) => {
                bridge.kill().await;
                Err(e)
            }
            Err(_) => {
                bridge.kill().await;
                Err(DriverError::Bridge(format!(
                    "browser did not start within {} ms",
                    self.config.launch_timeout_ms
                )))
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct BridgeReply {
    id: u64,
    ok: bool,
    #[serde(default)]
    value: Value,
    #[serde(default)]
    error: Option<BridgeFailure>,
}

#[derive(Debug, Deserialize)]
struct BridgeFailure {
    kind: String,
    message: String,
}

impl BridgeFailure {
    fn into_error(self, selector: Option<&str>, timeout_ms: u64) -> DriverError {
        match self.kind.as_str() {
            "navigation" => DriverError::Navigation(self.message),
            "not_found" => DriverError::ElementNotFound {
                selectors: selector.map(|s| vec![s.to_string()]).unwrap_or_default(),
                timeout_ms,
            },
            "action" => DriverError::AssertionFailed(self.message),
            _ => DriverError::Bridge(self.message),
        }
    }
}

struct PlaywrightSession {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    next_id: u64,
    closed: bool,
    _script_dir: tempfile::TempDir,
}

impl PlaywrightSession {
    /// Send one command and wait for its reply.
    async fn call(&mut self, op: &str, mut args: Value, timeout_ms: u64) -> DriverResult<Value> {
        if self.closed {
            return Err(DriverError::Bridge("session already closed".to_string()));
        }
        let id = self.next_id;
        self.next_id += 1;

        args["id"] = json!(id);
        args["op"] = json!(op);
        args["timeout"] = json!(timeout_ms);
        let selector = args
            .get("selector")
            .and_then(Value::as_str)
            .map(String::from);

        let mut line = serde_json::to_string(&args)?;
        line.push('\n');
        self.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| DriverError::Bridge(format!("bridge write failed: {}", e)))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| DriverError::Bridge(format!("bridge write failed: {}", e)))?;

        let reply = self.read_reply(id).await?;
        if reply.ok {
            Ok(reply.value)
        } else {
            let failure = reply.error.unwrap_or(BridgeFailure {
                kind: "protocol".to_string(),
                message: format!("'{}' failed without detail", op),
            });
            Err(failure.into_error(selector.as_deref(), timeout_ms))
        }
    }

    /// Read lines until the reply for `id` arrives.
    ///
    /// Replies to commands abandoned by a step timeout arrive late and are
    /// dropped here.
    async fn read_reply(&mut self, id: u64) -> DriverResult<BridgeReply> {
        loop {
            let line = self
                .stdout
                .next_line()
                .await
                .map_err(|e| DriverError::Bridge(format!("bridge read failed: {}", e)))?
                .ok_or_else(|| DriverError::Bridge("browser process exited".to_string()))?;

            match serde_json::from_str::<BridgeReply>(&line) {
                Ok(reply) if reply.id == id => return Ok(reply),
                Ok(reply) if reply.id == 0 && !reply.ok => {
                    let message = reply
                        .error
                        .map(|e| e.message)
                        .unwrap_or_else(|| "browser crashed".to_string());
                    return Err(DriverError::Bridge(message));
                }
                Ok(reply) => debug!("Dropping stale bridge reply {}", reply.id),
                Err(_) => debug!("[bridge stdout] {}", line),
            }
        }
    }

    async fn kill(&mut self) {
        if let Err(e) = self.child.kill().await {
            warn!("Failed to kill browser bridge: {}", e);
        }
    }

    fn element_args(element: &ElementHandle) -> Value {
        json!({ "selector": element.selector, "index": element.index })
    }
}

#[async_trait]
impl BrowserSession for PlaywrightSession {
    async fn goto(&mut self, url: &str, timeout_ms: u64) -> DriverResult<()> {
        self.call("goto", json!({ "url": url }), timeout_ms).await?;
        Ok(())
    }

    async fn count(&mut self, selector: &str) -> DriverResult<usize> {
        let value = self.call("count", json!({ "selector": selector }), 0).await?;
        Ok(value.as_u64().unwrap_or(0) as usize)
    }

    async fn is_visible(&mut self, element: &ElementHandle) -> DriverResult<bool> {
        let value = self
            .call("visible", Self::element_args(element), 0)
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn text(&mut self, element: &ElementHandle) -> DriverResult<String> {
        let value = self.call("text", Self::element_args(element), 1000).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn page_text(&mut self) -> DriverResult<String> {
        let value = self.call("page_text", json!({}), 1000).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn click(&mut self, element: &ElementHandle) -> DriverResult<()> {
        self.call("click", Self::element_args(element), 2000).await?;
        Ok(())
    }

    async fn type_text(&mut self, element: &ElementHandle, text: &str) -> DriverResult<()> {
        let mut args = Self::element_args(element);
        args["text"] = json!(text);
        self.call("type", args, 2000).await?;
        Ok(())
    }

    async fn hover(&mut self, element: &ElementHandle) -> DriverResult<()> {
        self.call("hover", Self::element_args(element), 2000).await?;
        Ok(())
    }

    async fn screenshot(&mut self, path: &Path) -> DriverResult<()> {
        let path = path.to_string_lossy().to_string();
        self.call("screenshot", json!({ "path": path }), 10_000).await?;
        Ok(())
    }

    async fn console_errors(&mut self) -> DriverResult<Vec<String>> {
        let value = self.call("console_errors", json!({}), 0).await?;
        Ok(serde_json::from_value(value).unwrap_or_default())
    }

    async fn close(&mut self) -> DriverResult<()> {
        if self.closed {
            return Ok(());
        }
        let acknowledged = timeout(CLOSE_TIMEOUT, self.call("close", json!({}), 0)).await;
        self.closed = true;

        match acknowledged {
            Ok(Ok(_)) => {
                if timeout(CLOSE_TIMEOUT, self.child.wait()).await.is_err() {
                    self.kill().await;
                }
            }
            Ok(Err(e)) => {
                warn!("Browser bridge did not close cleanly: {}", e);
                self.kill().await;
            }
            Err(_) => {
                warn!("Browser bridge close timed out");
                self.kill().await;
            }
        }
        Ok(())
    }
}

/// Build the Node.js bridge script for one session
pub fn bridge_script(bridge: &BridgeConfig, session: &SessionConfig) -> String {
    let mut script = String::new();

    script.push_str(&format!(
        r#"
const readline = require('readline');
const playwright = require('playwright');

(async () => {{
  const browser = await playwright.{engine}.launch({{ headless: {headless} }});
  const context = await browser.newContext({{
    viewport: {{ width: {width}, height: {height} }}
  }});
  const page = await context.newPage();
"#,
        engine = bridge.browser.as_str(),
        headless = session.headless,
        width = session.viewport.width,
        height = session.viewport.height,
    ));

    script.push_str(
        r#"
  let consoleErrors = [];
  page.on('console', msg => { if (msg.type() === 'error') consoleErrors.push(msg.text()); });
  page.on('pageerror', err => consoleErrors.push(err.message));

  const reply = (msg) => process.stdout.write(JSON.stringify(msg) + '\n');
  const nth = (c) => page.locator(c.selector).nth(c.index || 0);
  const elementError = (e) => ({
    kind: e.name === 'TimeoutError' ? 'not_found' : 'action',
    message: e.message.split('\n')[0],
  });

  const handlers = {
    goto: async (c) => {
      consoleErrors = [];
      let resp;
      try {
        resp = await page.goto(c.url, { waitUntil: 'load', timeout: c.timeout || 30000 });
      } catch (e) {
        throw { kind: 'navigation', message: e.message.split('\n')[0] };
      }
      if (resp && resp.status() >= 400) {
        throw { kind: 'navigation', message: `HTTP ${resp.status()} for ${c.url}` };
      }
      return null;
    },
    count: async (c) => page.locator(c.selector).count(),
    visible: async (c) => nth(c).isVisible(),
    text: async (c) => nth(c).innerText({ timeout: c.timeout }),
    page_text: async (c) => page.innerText('body', { timeout: c.timeout }),
    click: async (c) => { await nth(c).click({ timeout: c.timeout }); return null; },
    type: async (c) => { await nth(c).fill(c.text, { timeout: c.timeout }); return null; },
    hover: async (c) => { await nth(c).hover({ timeout: c.timeout }); return null; },
    screenshot: async (c) => { await page.screenshot({ path: c.path, timeout: c.timeout }); return null; },
    console_errors: async () => consoleErrors,
    close: async () => { await browser.close(); return null; },
  };
  const elementOps = new Set(['visible', 'text', 'click', 'type', 'hover']);

  reply({ id: 0, ok: true, value: 'ready' });

  const rl = readline.createInterface({ input: process.stdin });
  for await (const line of rl) {
    let cmd;
    try { cmd = JSON.parse(line); } catch (e) { continue; }
    const handler = handlers[cmd.op];
    if (!handler) {
      reply({ id: cmd.id, ok: false, error: { kind: 'protocol', message: `unknown op ${cmd.op}` } });
      continue;
    }
    try {
      const value = await handler(cmd);
      reply({ id: cmd.id, ok: true, value });
      if (cmd.op === 'close') process.exit(0);
    } catch (e) {
      const error = e && e.kind ? e
        : elementOps.has(cmd.op) ? elementError(e)
        : { kind: 'error', message: String(e && e.message || e) };
      reply({ id: cmd.id, ok: false, error });
    }
  }
  await browser.close();
})().catch(e => {
  process.stdout.write(JSON.stringify({ id: 0, ok: false, error: { kind: 'launch', message: e.message } }) + '\n');
  process.exit(1);
});
"#,
    );

    script
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BrowserEngine, Viewport};

    #[test]
    fn test_bridge_script_carries_session_settings() {
        let bridge = BridgeConfig {
            browser: BrowserEngine::Firefox,
            ..Default::default()
        };
        let session = SessionConfig {
            headless: false,
            viewport: Viewport { width: 1200, height: 800 },
            ..Default::default()
        };
        let script = bridge_script(&bridge, &session);
        assert!(script.contains("playwright.firefox.launch({ headless: false })"));
        assert!(script.contains("viewport: { width: 1200, height: 800 }"));
        assert!(script.contains("reply({ id: 0, ok: true, value: 'ready' })"));
    }

    #[test]
    fn test_failure_kinds_map_to_taxonomy() {
        let nav = BridgeFailure {
            kind: "navigation".into(),
            message: "net::ERR_CONNECTION_REFUSED".into(),
        };
        assert!(matches!(
            nav.into_error(None, 5000),
            DriverError::Navigation(_)
        ));

        let missing = BridgeFailure {
            kind: "not_found".into(),
            message: "Timeout 2000ms exceeded".into(),
        };
        match missing.into_error(Some(".cart-icon"), 2000) {
            DriverError::ElementNotFound { selectors, timeout_ms } => {
                assert_eq!(selectors, vec![".cart-icon".to_string()]);
                assert_eq!(timeout_ms, 2000);
            }
            other => panic!("unexpected error: {}", other),
        }

        let protocol = BridgeFailure {
            kind: "protocol".into(),
            message: "unknown op".into(),
        };
        assert!(protocol.into_error(None, 0).failure_kind().is_none());
    }

    #[test]
    fn test_reply_parsing() {
        let reply: BridgeReply = serde_json::from_str(r#"{"id":4,"ok":true,"value":2}"#).unwrap();
        assert_eq!(reply.id, 4);
        assert_eq!(reply.value, json!(2));

        let reply: BridgeReply = serde_json::from_str(
            r#"{"id":5,"ok":false,"error":{"kind":"action","message":"element is not visible"}}"#,
        )
        .unwrap();
        assert!(!reply.ok);
        assert_eq!(reply.error.unwrap().kind, "action");
    }
}
