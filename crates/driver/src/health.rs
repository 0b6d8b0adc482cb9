//! Readiness probing for the application under test

use std::time::{Duration, Instant};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::{DriverError, DriverResult};

/// Poll `url` until it answers with a non-5xx status.
///
/// Connection refusals are expected while the app is starting and are not
/// logged individually.
pub async fn wait_until_ready(url: &str, timeout_duration: Duration) -> DriverResult<()> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()?;

    let start = Instant::now();
    let mut attempts = 0;

    while start.elapsed() < timeout_duration {
        attempts += 1;

        match client.get(url).send().await {
            Ok(resp) if !resp.status().is_server_error() => {
                info!("{} is ready ({})", url, resp.status());
                return Ok(());
            }
            Ok(resp) => {
                warn!("Readiness check for {} returned {}", url, resp.status());
            }
            Err(e) => {
                if attempts == 1 {
                    info!("Waiting for {} ...", url);
                }
                if !e.is_connect() {
                    warn!("Readiness check error: {}", e);
                }
            }
        }

        sleep(Duration::from_millis(100)).await;
    }

    Err(DriverError::NotReady {
        url: url.to_string(),
        attempts,
    })
}

/// Wait for every URL in turn within one shared deadline.
pub async fn wait_all_ready(urls: &[String], timeout_duration: Duration) -> DriverResult<()> {
    let start = Instant::now();
    for url in urls {
        let remaining = timeout_duration.saturating_sub(start.elapsed());
        wait_until_ready(url, remaining.max(Duration::from_millis(100))).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_url_times_out() {
        let err = wait_until_ready("http://127.0.0.1:9/", Duration::from_millis(300))
            .await
            .unwrap_err();
        match err {
            DriverError::NotReady { attempts, .. } => assert!(attempts >= 1),
            other => panic!("unexpected error: {}", other),
        }
    }
}
