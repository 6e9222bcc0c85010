// Audio backend adapter contract.
// The scheduler and fade controller are written against this trait only;
// platform backends (cpal desktop, mobile renderers, the in-memory mock)
// are selected at composition time.

pub mod mock;

use lull_core::Result;

/// Opaque handle to one loaded playback instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClipHandle(pub u64);

/// Resolved clip location handed to a backend. Remote catalog identifiers
/// are resolved to a URL before this point.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ClipSource {
    /// Local bundled asset path
    Path(String),
    /// Direct download URL
    Url(String),
}

impl ClipSource {
    /// Stable key for logging and bookkeeping
    pub fn key(&self) -> &str {
        match self {
            ClipSource::Path(p) => p,
            ClipSource::Url(u) => u,
        }
    }
}

/// Snapshot of one instance's backend state
#[derive(Debug, Clone, Copy)]
pub struct ClipStatus {
    pub is_loaded: bool,
    pub is_playing: bool,
    pub position_ms: u64,
    /// None while duration metadata has not arrived yet (streamed sources
    /// can report it late); callers poll with bounded retries.
    pub duration_ms: Option<u64>,
}

/// Platform audio session configuration, re-asserted on foreground because
/// some platforms silently revert it while the app is backgrounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioSessionConfig {
    /// Keep playing while the app is in the background
    pub plays_in_background: bool,
    /// Mix with audio from other applications instead of interrupting it
    pub mix_with_others: bool,
}

impl AudioSessionConfig {
    /// Full configuration requested by `initialize`
    pub fn full() -> Self {
        Self {
            plays_in_background: true,
            mix_with_others: true,
        }
    }

    /// Degraded fallback when the full configuration is rejected:
    /// foreground-only playback is still better than no playback.
    pub fn minimal() -> Self {
        Self {
            plays_in_background: false,
            mix_with_others: true,
        }
    }
}

/// Audio backend adapter.
///
/// Every `load` must be paired with an eventual `unload`; the backend owns
/// OS-level decoding resources per handle. All calls against a handle that
/// has been unloaded return `Err(AudioError::InvalidHandle)`; callers that
/// race with an instance's natural end (fade ramps, late timers) are
/// expected to swallow that error.
pub trait AudioBackend: Send + Sync {
    /// Apply the platform audio session configuration
    fn configure(&self, config: &AudioSessionConfig) -> Result<()>;

    /// Fetch/decode a clip and allocate a playback instance for it
    fn load(&self, source: &ClipSource) -> Result<ClipHandle>;

    fn play(&self, handle: ClipHandle) -> Result<()>;

    fn stop(&self, handle: ClipHandle) -> Result<()>;

    /// Release the instance's decoding resources
    fn unload(&self, handle: ClipHandle) -> Result<()>;

    /// Set instance gain, clamped to [0, 1]
    fn set_volume(&self, handle: ClipHandle, gain: f32) -> Result<()>;

    /// Native looping. The seamless loop scheduler never uses this (native
    /// wrap points click); it exists for previews and diagnostics.
    fn set_looping(&self, handle: ClipHandle, looping: bool) -> Result<()>;

    fn set_position(&self, handle: ClipHandle, position_ms: u64) -> Result<()>;

    fn status(&self, handle: ClipHandle) -> Result<ClipStatus>;
}
