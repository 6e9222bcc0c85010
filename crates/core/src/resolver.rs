// Remote source resolution seam.
// Remote catalog entries carry a content identifier, not a URL; a resolver
// turns the identifier into a downloadable URL at play time. This is a
// separate step from the download itself and fails independently.

use crate::error::Result;

/// Resolves a remote content identifier to a download URL.
pub trait SourceResolver: Send + Sync {
    /// Returns the URL the clip can be fetched from.
    /// Fails with `AudioError::ResolutionError` if the lookup fails.
    fn resolve(&self, remote_id: &str) -> Result<String>;
}
