// HTTP client configuration and utilities

use lull_core::{AudioError, Result};
use std::time::Duration;

/// Create a configured HTTP agent with proper timeouts and settings
pub fn create_http_agent() -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(Duration::from_secs(15))
        .timeout_read(Duration::from_secs(30))
        .timeout_write(Duration::from_secs(15))
        .user_agent("Mozilla/5.0 (compatible; LullSoundEngine/0.3)")
        .redirects(10)
        .build()
}

/// Retry a request with exponential backoff
pub fn retry_request(agent: &ureq::Agent, url: &str, max_retries: u32) -> Result<ureq::Response> {
    let mut last_error = None;

    for attempt in 0..=max_retries {
        match agent.get(url).call() {
            Ok(response) => return Ok(response),
            Err(e) => {
                last_error = Some(e);
                if attempt < max_retries {
                    let delay = Duration::from_millis(250 * 2u64.pow(attempt));
                    log::warn!(
                        "Request failed (attempt {}), retrying after {:?}",
                        attempt + 1,
                        delay
                    );
                    std::thread::sleep(delay);
                }
            }
        }
    }

    Err(AudioError::NetworkError(format!(
        "Request failed after {} retries: {}",
        max_retries,
        last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown".to_string())
    )))
}
