// Layered ambient sound engine.
//
// Finite clips are played as seamless infinite loops by overlapping
// instances, multiple independent layers mix freely, and a keep-alive
// guardian restores loops the OS silently kills. The audio device itself
// sits behind the `AudioBackend` trait from `lull-backend-api`.

pub mod config;
mod fade;
mod guardian;
pub mod haptics;
mod registry;
mod scheduler;
pub mod session;
mod timer;

pub use config::EngineConfig;
pub use haptics::{HapticBackend, HapticIntensity, NoopHaptics};
pub use session::{AppLifecycleEvent, SoundEngine};

// Host-facing types from the lower crates
pub use lull_backend_api::{AudioBackend, AudioSessionConfig, ClipSource};
pub use lull_core::{
    AudioError, EngineCallback, EngineEvent, LayerState, PlayMode, Result, SoundCatalog,
    SoundCategory, SoundDefinition, SoundSource, SourceResolver,
};

use std::sync::Once;

static LOG_INIT: Once = Once::new();

/// Initialize env_logger once for the process. Safe to call repeatedly;
/// hosts embedding their own logger can skip it.
pub fn init_logging() {
    LOG_INIT.call_once(|| {
        let _ = env_logger::Builder::from_env(
            env_logger::Env::default().default_filter_or("info"),
        )
        .format_timestamp_millis()
        .try_init();
    });
}
