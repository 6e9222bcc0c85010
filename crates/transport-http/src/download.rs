// Whole-clip download. Ambient loop clips are seconds long, so the clip is
// fetched into memory in one pass; there is no progressive prebuffering.

use crate::client::{create_http_agent, retry_request};
use lull_core::{AudioError, Result};
use std::io::Read;

/// Hard cap on a single clip download; anything bigger is not one of our
/// preprocessed loop assets.
const MAX_CLIP_BYTES: u64 = 64 * 1024 * 1024;

/// Download a clip from `url` into memory
pub fn download_clip(url: &str) -> Result<Vec<u8>> {
    log::info!("Downloading clip from: {}", url);

    let agent = create_http_agent();
    let response = retry_request(&agent, url, 3)?;

    let content_length = response
        .header("Content-Length")
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0);

    if content_length > MAX_CLIP_BYTES {
        return Err(AudioError::LoadError(format!(
            "Clip too large ({} bytes): {}",
            content_length, url
        )));
    }

    let mut data = Vec::with_capacity(content_length as usize);
    response
        .into_reader()
        .take(MAX_CLIP_BYTES)
        .read_to_end(&mut data)
        .map_err(|e| AudioError::NetworkError(format!("Download failed: {}", e)))?;

    if data.is_empty() {
        return Err(AudioError::LoadError(format!("Empty clip body: {}", url)));
    }

    log::info!("Downloaded {} bytes from {}", data.len(), url);
    Ok(data)
}
