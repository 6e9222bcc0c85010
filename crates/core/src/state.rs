// Per-layer playback state management

use crate::error::{AudioError, Result};
use parking_lot::RwLock;
use std::sync::Arc;

/// How a layer is being played
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayMode {
    /// Seamless looped playback via overlapping instances
    Looping,
    /// Single pass with fade-in and fade-out-before-end
    OneShot,
}

/// Externally visible state of one sound layer. Looping playback cycles
/// through overlapping sub-instances internally but is a single `Playing`
/// state from the outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerState {
    /// Nothing loaded for this layer
    Stopped,
    /// Clip is being resolved/loaded
    Loading,
    /// Layer is audible
    Playing(PlayMode),
    /// Stop requested, fade ramp running
    FadingOut,
}

/// Thread-safe layer state container
#[derive(Clone)]
pub struct LayerStateContainer {
    state: Arc<RwLock<LayerState>>,
}

impl LayerStateContainer {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(LayerState::Stopped)),
        }
    }

    pub fn get(&self) -> LayerState {
        *self.state.read()
    }

    pub fn set(&self, new_state: LayerState) {
        *self.state.write() = new_state;
        log::debug!("Layer state changed to: {:?}", new_state);
    }

    /// Validate and apply a transition. Any error during `Loading` must go
    /// back to `Stopped`, which is always a legal transition here.
    pub fn transition(&self, to: LayerState) -> Result<()> {
        let mut state = self.state.write();
        let from = *state;

        let ok = matches!(
            (from, to),
            (LayerState::Stopped, LayerState::Loading)
                | (LayerState::Loading, LayerState::Playing(_))
                | (LayerState::Loading, LayerState::Stopped)
                | (LayerState::Playing(_), LayerState::FadingOut)
                | (LayerState::Playing(_), LayerState::Stopped)
                | (LayerState::FadingOut, LayerState::Stopped)
        );

        if !ok {
            return Err(AudioError::InvalidState(format!(
                "Invalid layer transition from {:?} to {:?}",
                from, to
            )));
        }

        *state = to;
        log::debug!("Layer state changed: {:?} -> {:?}", from, to);
        Ok(())
    }
}

impl Default for LayerStateContainer {
    fn default() -> Self {
        Self::new()
    }
}
