//! REST calls against the application API

use std::time::Duration;

use reqwest::{Client, Method, Url};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::assertion::assert_count;
use crate::config::{Credentials, SessionConfig};
use crate::error::{DriverError, DriverResult};
use crate::scenario::RequestSpec;

/// Response of one API call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Number of items in the response list.
    ///
    /// With `field` set, counts `body[field]`. Otherwise the body must be an
    /// array or an object with exactly one array field such as
    /// `{"products": [...], "total": 3}`.
    pub fn item_count(&self, field: Option<&str>) -> Option<usize> {
        if let Some(field) = field {
            return self.body.get(field).and_then(Value::as_array).map(Vec::len);
        }
        match &self.body {
            Value::Array(items) => Some(items.len()),
            Value::Object(map) => {
                let mut arrays = map.values().filter_map(Value::as_array);
                match (arrays.next(), arrays.next()) {
                    (Some(items), None) => Some(items.len()),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    fn error_text(&self) -> String {
        self.body
            .get("error")
            .and_then(Value::as_str)
            .map(String::from)
            .unwrap_or_else(|| self.body.to_string())
    }
}

/// HTTP client for one run; holds the bearer token after a login.
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> DriverResult<Self> {
        let base_url = base_url.into();
        Url::parse(&base_url).map_err(|e| {
            DriverError::InvalidScenario(format!("invalid API base URL '{}': {}", base_url, e))
        })?;
        let client = Client::builder().build()?;
        Ok(Self {
            client,
            base_url,
            token: None,
        })
    }

    pub fn for_session(session: &SessionConfig) -> DriverResult<Self> {
        Self::new(session.api_base())
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    fn url(&self, path: &str) -> String {
        SessionConfig::resolve_url(&self.base_url, path)
    }

    /// Send a request; any HTTP status is returned, transport errors are not.
    pub async fn send(
        &self,
        method: &str,
        path: &str,
        body: Option<&Value>,
        auth: bool,
        timeout: Duration,
    ) -> DriverResult<ApiResponse> {
        let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
            .map_err(|_| DriverError::InvalidScenario(format!("invalid HTTP method '{}'", method)))?;
        let url = self.url(path);
        debug!("{} {}", method, url);

        let mut request = self.client.request(method, &url).timeout(timeout);
        if let Some(body) = body {
            request = request.json(body);
        }
        if auth {
            let token = self.token.as_ref().ok_or_else(|| {
                DriverError::Network(format!("{} needs a token but no login succeeded", path))
            })?;
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DriverError::Network(format!("{}: {}", url, e)))?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| DriverError::Network(format!("{}: {}", url, e)))?;
        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));

        Ok(ApiResponse { status, body })
    }

    /// Run a `request` step and check its expectations.
    pub async fn execute(&self, spec: &RequestSpec, timeout: Duration) -> DriverResult<String> {
        let response = self
            .send(&spec.method, &spec.path, spec.body.as_ref(), spec.auth, timeout)
            .await?;

        match spec.status {
            Some(expected) if expected != response.status => {
                return Err(DriverError::AssertionFailed(format!(
                    "{} {} returned {}, expected {}",
                    spec.method, spec.path, response.status, expected
                )));
            }
            None if !response.is_success() => {
                return Err(DriverError::Network(format!(
                    "{} {} returned {}: {}",
                    spec.method,
                    spec.path,
                    response.status,
                    response.error_text()
                )));
            }
            _ => {}
        }

        let mut message = format!("{} {} -> {}", spec.method, spec.path, response.status);
        if let Some(predicate) = &spec.count {
            let count = response.item_count(spec.items.as_deref()).ok_or_else(|| {
                let what = match &spec.items {
                    Some(field) => format!("a '{}' list", field),
                    None => "a single list (name one with `items`)".to_string(),
                };
                DriverError::AssertionFailed(format!(
                    "{} {} did not return {}",
                    spec.method, spec.path, what
                ))
            })?;
            let outcome = assert_count(count, predicate);
            if !outcome.passed {
                return Err(DriverError::AssertionFailed(outcome.message));
            }
            message.push_str(&format!(" ({} items)", count));
        }
        Ok(message)
    }

    /// `POST /api/auth/login` and keep the returned access token.
    pub async fn login(&mut self, credentials: &Credentials, timeout: Duration) -> DriverResult<String> {
        let body = json!({ "email": credentials.email, "password": credentials.password });
        let response = self
            .send("POST", "/api/auth/login", Some(&body), false, timeout)
            .await?;

        if !response.is_success() {
            return Err(DriverError::Network(format!(
                "login as {} failed with {}: {}",
                credentials.email,
                response.status,
                response.error_text()
            )));
        }

        let token = response
            .body
            .get("accessToken")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                DriverError::Network("login response has no accessToken".to_string())
            })?;
        self.token = Some(token.to_string());

        let who = response
            .body
            .pointer("/user/email")
            .and_then(Value::as_str)
            .unwrap_or(&credentials.email);
        Ok(format!("logged in as {}", who))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_count() {
        let array = ApiResponse { status: 200, body: json!([1, 2, 3]) };
        assert_eq!(array.item_count(None), Some(3));

        let wrapped = ApiResponse {
            status: 200,
            body: json!({ "total": 2, "products": [{}, {}] }),
        };
        assert_eq!(wrapped.item_count(None), Some(2));

        let scalar = ApiResponse { status: 200, body: json!("ok") };
        assert_eq!(scalar.item_count(None), None);
    }

    #[test]
    fn test_item_count_with_several_lists() {
        let resp = ApiResponse {
            status: 200,
            body: json!({ "errors": [], "products": [{}, {}, {}] }),
        };
        assert_eq!(resp.item_count(None), None);
        assert_eq!(resp.item_count(Some("products")), Some(3));
        assert_eq!(resp.item_count(Some("errors")), Some(0));
        assert_eq!(resp.item_count(Some("missing")), None);
    }

    #[test]
    fn test_error_text_prefers_error_field() {
        let resp = ApiResponse {
            status: 401,
            body: json!({ "error": "Invalid email or password" }),
        };
        assert_eq!(resp.error_text(), "Invalid email or password");
    }

    #[tokio::test]
    async fn test_auth_without_login_is_network_error() {
        let client = ApiClient::new("http://127.0.0.1:9").unwrap();
        let err = client
            .send("GET", "/api/orders", None, true, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::Network(_)));
    }
}
