// Diagnostic event hooks for engine observers.
// Events are purely observational: nothing in the engine's control flow may
// depend on whether a callback is attached.

use parking_lot::Mutex;
use std::sync::Arc;

/// Engine event types
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A layer began playing
    LayerStarted { sound_id: String },

    /// A layer was stopped (explicitly or at natural one-shot end)
    LayerStopped { sound_id: String },

    /// The loop scheduler started a new overlap cycle for a layer
    CycleStarted { sound_id: String, cycle: u64 },

    /// The keep-alive sweep restored a layer the OS had silently killed
    DriftRepaired { sound_id: String },

    /// A non-fatal playback error was swallowed
    PlaybackError { sound_id: String, message: String },

    /// A layer's volume changed
    VolumeChanged { sound_id: String, volume: f32 },
}

/// Engine observer trait.
/// Implementations should be lightweight and non-blocking.
pub trait EngineCallback: Send + Sync {
    fn on_event(&self, event: EngineEvent);
}

/// Fan-out manager for multiple observers
pub struct CallbackManager {
    callbacks: Arc<Mutex<Vec<Arc<dyn EngineCallback>>>>,
}

impl CallbackManager {
    pub fn new() -> Self {
        Self {
            callbacks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn add_callback(&self, callback: Arc<dyn EngineCallback>) {
        self.callbacks.lock().push(callback);
    }

    pub fn clear_callbacks(&self) {
        self.callbacks.lock().clear();
    }

    pub fn dispatch_event(&self, event: EngineEvent) {
        let callbacks = self.callbacks.lock();
        for callback in callbacks.iter() {
            callback.on_event(event.clone());
        }
    }
}

impl Default for CallbackManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Recording callback for tests
#[cfg(test)]
pub struct TestCallback {
    events: Arc<Mutex<Vec<EngineEvent>>>,
}

#[cfg(test)]
impl TestCallback {
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn get_events(&self) -> Vec<EngineEvent> {
        self.events.lock().clone()
    }
}

#[cfg(test)]
impl EngineCallback for TestCallback {
    fn on_event(&self, event: EngineEvent) {
        self.events.lock().push(event);
    }
}
