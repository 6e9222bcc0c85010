// In-memory backend for tests and headless environments.
// Plays nothing; tracks every adapter call so scheduling behaviour can be
// asserted without an audio device.

use crate::{AudioBackend, AudioSessionConfig, ClipHandle, ClipSource, ClipStatus};
use lull_core::{AudioError, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Instant;

/// One recorded adapter call
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    Configure(AudioSessionConfig),
    Load(String),
    Play(ClipHandle),
    Stop(ClipHandle),
    Unload(ClipHandle),
    SetVolume(ClipHandle, f32),
    SetLooping(ClipHandle, bool),
    SetPosition(ClipHandle, u64),
}

#[derive(Debug, Clone)]
struct MockClip {
    source_key: String,
    playing: bool,
    gain: f32,
    looping: bool,
    started_at: Option<Instant>,
    status_polls: u32,
}

#[derive(Default)]
struct Inner {
    next_handle: u64,
    clips: HashMap<ClipHandle, MockClip>,
    calls: Vec<BackendCall>,
    /// source key -> clip duration to report
    durations: HashMap<String, u64>,
    /// source key -> number of status polls before duration metadata "arrives"
    duration_delay_polls: HashMap<String, u32>,
    /// source keys whose load is scripted to fail
    failing_loads: HashMap<String, String>,
    /// gain history per handle, kept across unload for fade assertions
    volume_history: HashMap<ClipHandle, Vec<f32>>,
    configure_failures: u32,
}

/// Scriptable recording backend
pub struct MockBackend {
    inner: Mutex<Inner>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Script the duration a clip from `source_key` reports once loaded
    pub fn set_duration(&self, source_key: &str, duration_ms: u64) {
        self.inner
            .lock()
            .durations
            .insert(source_key.to_string(), duration_ms);
    }

    /// Make duration metadata arrive only after `polls` status calls,
    /// modelling streamed sources that report it late
    pub fn delay_duration(&self, source_key: &str, polls: u32) {
        self.inner
            .lock()
            .duration_delay_polls
            .insert(source_key.to_string(), polls);
    }

    /// Script `load` for this source to fail
    pub fn fail_load(&self, source_key: &str, message: &str) {
        self.inner
            .lock()
            .failing_loads
            .insert(source_key.to_string(), message.to_string());
    }

    /// Make the next `n` configure calls fail (initialization fallback tests)
    pub fn fail_next_configures(&self, n: u32) {
        self.inner.lock().configure_failures = n;
    }

    /// Silently stop every live instance without telling anyone, the way an
    /// OS audio subsystem kills background audio
    pub fn simulate_os_pause(&self) {
        let mut inner = self.inner.lock();
        for clip in inner.clips.values_mut() {
            clip.playing = false;
        }
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.inner.lock().calls.clone()
    }

    pub fn loaded_count(&self) -> usize {
        self.inner.lock().clips.len()
    }

    /// Live handles whose source key contains `fragment`, in creation order
    pub fn live_handles_matching(&self, fragment: &str) -> Vec<ClipHandle> {
        let inner = self.inner.lock();
        let mut handles: Vec<ClipHandle> = inner
            .clips
            .iter()
            .filter(|(_, c)| c.source_key.contains(fragment))
            .map(|(h, _)| *h)
            .collect();
        handles.sort_by_key(|h| h.0);
        handles
    }

    pub fn playing_count_matching(&self, fragment: &str) -> usize {
        self.inner
            .lock()
            .clips
            .values()
            .filter(|c| c.playing && c.source_key.contains(fragment))
            .count()
    }

    pub fn gain_of(&self, handle: ClipHandle) -> Option<f32> {
        self.inner.lock().clips.get(&handle).map(|c| c.gain)
    }

    /// Every gain this handle was ever set to, including the load-time
    /// initial value; survives unload
    pub fn volume_history(&self, handle: ClipHandle) -> Vec<f32> {
        self.inner
            .lock()
            .volume_history
            .get(&handle)
            .cloned()
            .unwrap_or_default()
    }

    pub fn is_loaded(&self, handle: ClipHandle) -> bool {
        self.inner.lock().clips.contains_key(&handle)
    }

    pub fn is_playing(&self, handle: ClipHandle) -> bool {
        self.inner
            .lock()
            .clips
            .get(&handle)
            .map(|c| c.playing)
            .unwrap_or(false)
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for MockBackend {
    fn configure(&self, config: &AudioSessionConfig) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.calls.push(BackendCall::Configure(*config));
        if inner.configure_failures > 0 {
            inner.configure_failures -= 1;
            return Err(AudioError::InitializationError(
                "scripted configure failure".to_string(),
            ));
        }
        Ok(())
    }

    fn load(&self, source: &ClipSource) -> Result<ClipHandle> {
        let mut inner = self.inner.lock();
        let key = source.key().to_string();
        inner.calls.push(BackendCall::Load(key.clone()));

        if let Some(message) = inner.failing_loads.get(&key) {
            return Err(AudioError::LoadError(message.clone()));
        }

        inner.next_handle += 1;
        let handle = ClipHandle(inner.next_handle);
        inner.clips.insert(
            handle,
            MockClip {
                source_key: key,
                playing: false,
                gain: 1.0,
                looping: false,
                started_at: None,
                status_polls: 0,
            },
        );
        inner.volume_history.insert(handle, vec![1.0]);
        Ok(handle)
    }

    fn play(&self, handle: ClipHandle) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.calls.push(BackendCall::Play(handle));
        let clip = inner
            .clips
            .get_mut(&handle)
            .ok_or_else(|| AudioError::InvalidHandle(format!("play on {:?}", handle)))?;
        clip.playing = true;
        if clip.started_at.is_none() {
            clip.started_at = Some(Instant::now());
        }
        Ok(())
    }

    fn stop(&self, handle: ClipHandle) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.calls.push(BackendCall::Stop(handle));
        let clip = inner
            .clips
            .get_mut(&handle)
            .ok_or_else(|| AudioError::InvalidHandle(format!("stop on {:?}", handle)))?;
        clip.playing = false;
        Ok(())
    }

    fn unload(&self, handle: ClipHandle) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.calls.push(BackendCall::Unload(handle));
        inner
            .clips
            .remove(&handle)
            .ok_or_else(|| AudioError::InvalidHandle(format!("unload on {:?}", handle)))?;
        Ok(())
    }

    fn set_volume(&self, handle: ClipHandle, gain: f32) -> Result<()> {
        let gain = gain.clamp(0.0, 1.0);
        let mut inner = self.inner.lock();
        inner.calls.push(BackendCall::SetVolume(handle, gain));
        match inner.clips.get_mut(&handle) {
            Some(clip) => {
                clip.gain = gain;
                inner.volume_history.entry(handle).or_default().push(gain);
                Ok(())
            }
            None => Err(AudioError::InvalidHandle(format!(
                "set_volume on {:?}",
                handle
            ))),
        }
    }

    fn set_looping(&self, handle: ClipHandle, looping: bool) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.calls.push(BackendCall::SetLooping(handle, looping));
        let clip = inner
            .clips
            .get_mut(&handle)
            .ok_or_else(|| AudioError::InvalidHandle(format!("set_looping on {:?}", handle)))?;
        clip.looping = looping;
        Ok(())
    }

    fn set_position(&self, handle: ClipHandle, position_ms: u64) -> Result<()> {
        let mut inner = self.inner.lock();
        inner
            .calls
            .push(BackendCall::SetPosition(handle, position_ms));
        if !inner.clips.contains_key(&handle) {
            return Err(AudioError::InvalidHandle(format!(
                "set_position on {:?}",
                handle
            )));
        }
        Ok(())
    }

    fn status(&self, handle: ClipHandle) -> Result<ClipStatus> {
        let mut inner = self.inner.lock();
        let clip = inner
            .clips
            .get_mut(&handle)
            .ok_or_else(|| AudioError::InvalidHandle(format!("status on {:?}", handle)))?;
        clip.status_polls += 1;
        let polls = clip.status_polls;
        let key = clip.source_key.clone();
        let position_ms = clip
            .started_at
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(0);
        let playing = clip.playing;

        let delay = inner.duration_delay_polls.get(&key).copied().unwrap_or(0);
        let duration_ms = if polls > delay {
            inner.durations.get(&key).copied()
        } else {
            None
        };

        Ok(ClipStatus {
            is_loaded: true,
            is_playing: playing,
            position_ms,
            duration_ms,
        })
    }
}
