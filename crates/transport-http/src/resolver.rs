// Remote sound resolution: content identifier -> downloadable URL.
// The resolution service returns `{ "downloadUrl": ... }` for a known id.

use crate::client::{create_http_agent, retry_request};
use lull_core::{AudioError, Result, SourceResolver};
use once_cell::sync::Lazy;
use serde::Deserialize;

static AGENT: Lazy<ureq::Agent> = Lazy::new(create_http_agent);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResolvePayload {
    download_url: String,
}

/// `SourceResolver` backed by the remote resolution service
pub struct HttpResolver {
    endpoint: String,
    max_retries: u32,
}

impl HttpResolver {
    /// `endpoint` is the service base URL; ids are appended as a path
    /// segment.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            max_retries: 2,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    fn resolve_url(&self, remote_id: &str) -> String {
        format!(
            "{}/{}",
            self.endpoint.trim_end_matches('/'),
            remote_id
        )
    }

    fn parse_payload(body: &str) -> Result<String> {
        let payload: ResolvePayload = serde_json::from_str(body)
            .map_err(|e| AudioError::ResolutionError(format!("Bad resolver payload: {}", e)))?;
        if payload.download_url.is_empty() {
            return Err(AudioError::ResolutionError(
                "Resolver returned an empty download URL".to_string(),
            ));
        }
        Ok(payload.download_url)
    }
}

impl SourceResolver for HttpResolver {
    fn resolve(&self, remote_id: &str) -> Result<String> {
        let url = self.resolve_url(remote_id);
        log::debug!("Resolving remote sound '{}' via {}", remote_id, url);

        let response = retry_request(&AGENT, &url, self.max_retries)
            .map_err(|e| AudioError::ResolutionError(format!("{}: {}", remote_id, e)))?;

        let body = response
            .into_string()
            .map_err(|e| AudioError::ResolutionError(format!("Read failed: {}", e)))?;

        let download_url = Self::parse_payload(&body)?;
        log::info!("Resolved '{}' -> {}", remote_id, download_url);
        Ok(download_url)
    }
}
