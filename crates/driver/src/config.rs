//! Driver configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::DriverResult;

/// Top-level configuration, usually read from `flowcheck.toml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Browser/API session settings
    pub session: SessionConfig,

    /// Where evidence and results go
    pub output: OutputConfig,

    /// Playwright bridge settings
    pub bridge: BridgeConfig,

    /// Pre-run readiness probe
    pub readiness: ReadinessConfig,
}

impl DriverConfig {
    /// Load configuration from file
    pub fn load(path: &Path) -> DriverResult<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> DriverResult<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Settings for one scenario session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Frontend base URL; relative navigations resolve against it
    pub base_url: String,

    /// REST API base URL (defaults to `base_url`)
    pub api_url: Option<String>,

    /// Run the browser without a window
    pub headless: bool,

    pub viewport: Viewport,

    /// Default account for `login` steps
    pub credentials: Option<Credentials>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5173".to_string(),
            api_url: Some("http://localhost:3001".to_string()),
            headless: true,
            viewport: Viewport::default(),
            credentials: None,
        }
    }
}

impl SessionConfig {
    pub fn api_base(&self) -> &str {
        self.api_url.as_deref().unwrap_or(&self.base_url)
    }

    /// Resolve a page URL against `base`.
    pub fn resolve_url(base: &str, url: &str) -> String {
        if url.contains("://") {
            url.to_string()
        } else {
            let base = base.trim_end_matches('/');
            if url.starts_with('/') {
                format!("{}{}", base, url)
            } else {
                format!("{}/{}", base, url)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self { width: 1280, height: 720 }
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"***")
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Root for screenshots
    pub artifacts_dir: PathBuf,

    /// Directory for `flowcheck-results.json`
    pub results_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            artifacts_dir: PathBuf::from("test-results/screenshots"),
            results_dir: PathBuf::from("test-results"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserEngine {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl BrowserEngine {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrowserEngine::Chromium => "chromium",
            BrowserEngine::Firefox => "firefox",
            BrowserEngine::Webkit => "webkit",
        }
    }
}

impl std::str::FromStr for BrowserEngine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "chromium" | "chrome" => Ok(BrowserEngine::Chromium),
            "firefox" => Ok(BrowserEngine::Firefox),
            "webkit" | "safari" => Ok(BrowserEngine::Webkit),
            other => Err(format!("unknown browser engine '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Node.js executable
    pub node_binary: PathBuf,

    /// Directory node resolves `playwright` from (its `node_modules` parent)
    pub working_dir: Option<PathBuf>,

    pub browser: BrowserEngine,

    /// How long to wait for the browser to come up
    pub launch_timeout_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            node_binary: PathBuf::from("node"),
            working_dir: None,
            browser: BrowserEngine::Chromium,
            launch_timeout_ms: 30_000,
        }
    }
}

impl BridgeConfig {
    pub fn launch_timeout(&self) -> Duration {
        Duration::from_millis(self.launch_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    pub enabled: bool,
    pub timeout_ms: u64,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout_ms: 30_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = DriverConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.session.base_url, "http://localhost:5173");
        assert!(config.session.headless);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flowcheck.toml");
        std::fs::write(
            &path,
            r#"
[session]
base_url = "http://localhost:5174"
headless = false

[session.credentials]
email = "customer@example.com"
password = "customer123"

[bridge]
browser = "firefox"
"#,
        )
        .unwrap();

        let config = DriverConfig::load(&path).unwrap();
        assert_eq!(config.session.base_url, "http://localhost:5174");
        assert!(!config.session.headless);
        assert_eq!(config.session.viewport, Viewport::default());
        assert_eq!(config.bridge.browser, BrowserEngine::Firefox);
        assert_eq!(
            config.session.credentials.unwrap().email,
            "customer@example.com"
        );
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/flowcheck.toml");
        let mut config = DriverConfig::default();
        config.readiness.enabled = true;
        config.save(&path).unwrap();
        assert!(DriverConfig::load(&path).unwrap().readiness.enabled);
    }

    #[test]
    fn test_resolve_url() {
        assert_eq!(
            SessionConfig::resolve_url("http://localhost:5173/", "/login"),
            "http://localhost:5173/login"
        );
        assert_eq!(
            SessionConfig::resolve_url("http://localhost:5173", "products"),
            "http://localhost:5173/products"
        );
        assert_eq!(
            SessionConfig::resolve_url("http://localhost:5173", "http://localhost:1/x"),
            "http://localhost:1/x"
        );
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let creds = Credentials {
            email: "a@b.c".into(),
            password: "hunter2".into(),
        };
        assert!(!format!("{:?}", creds).contains("hunter2"));
    }
}
