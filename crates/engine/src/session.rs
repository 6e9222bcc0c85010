// Engine facade: the public session API over the scheduler, registry,
// guardian, and backend adapter. One `SoundEngine` owns everything for one
// audio session; hosts keep a single instance for the app lifetime.

use crate::config::EngineConfig;
use crate::fade::FadeController;
use crate::guardian::{self, LifecycleGuardian};
use crate::haptics::{HapticBackend, HapticIntensity, NoopHaptics};
use crate::registry::{LayerRegistry, OneShot};
use crate::scheduler::LoopScheduler;
use crate::timer::ScheduledTask;
use lull_backend_api::{AudioBackend, AudioSessionConfig, ClipSource};
use lull_core::{
    AudioError, CallbackManager, EngineCallback, EngineEvent, LayerState, PlayMode, Result,
    SoundCatalog, SoundDefinition, SoundSource, SourceResolver,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Host application lifecycle transitions the engine reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppLifecycleEvent {
    Foreground,
    Background,
}

/// Shared engine internals. Split from the facade so the guardian thread
/// can hold them without keeping the facade itself alive.
pub(crate) struct EngineInner {
    pub(crate) backend: Arc<dyn AudioBackend>,
    pub(crate) resolver: Option<Arc<dyn SourceResolver>>,
    pub(crate) haptics: Arc<dyn HapticBackend>,
    pub(crate) catalog: SoundCatalog,
    pub(crate) config: EngineConfig,
    pub(crate) registry: Arc<LayerRegistry>,
    pub(crate) scheduler: Arc<LoopScheduler>,
    pub(crate) fader: FadeController,
    pub(crate) callbacks: Arc<CallbackManager>,
    pub(crate) initialized: AtomicBool,
    pub(crate) master_enabled: AtomicBool,
    pub(crate) haptics_enabled: AtomicBool,
}

impl EngineInner {
    /// Turn a catalog source into something the backend can load.
    /// Remote ids go through the injected resolver.
    pub(crate) fn resolve_source(&self, definition: &SoundDefinition) -> Result<ClipSource> {
        match &definition.source {
            SoundSource::Bundled(path) => Ok(ClipSource::Path(path.clone())),
            SoundSource::Remote(remote_id) => {
                let resolver = self.resolver.as_ref().ok_or_else(|| {
                    AudioError::ResolutionError(format!(
                        "'{}' is remote but no resolver is configured",
                        definition.id
                    ))
                })?;
                Ok(ClipSource::Url(resolver.resolve(remote_id)?))
            }
        }
    }

    fn pulse(&self, intensity: HapticIntensity) {
        if self.haptics_enabled.load(Ordering::SeqCst) {
            self.haptics.pulse(intensity);
        }
    }
}

/// Layered ambient sound engine
pub struct SoundEngine {
    inner: Arc<EngineInner>,
    guardian: Mutex<Option<LifecycleGuardian>>,
}

impl SoundEngine {
    pub fn new(
        backend: Arc<dyn AudioBackend>,
        catalog: SoundCatalog,
        config: EngineConfig,
    ) -> Self {
        Self::build(backend, catalog, config, None, Arc::new(NoopHaptics))
    }

    /// Engine with remote-source support
    pub fn with_resolver(
        backend: Arc<dyn AudioBackend>,
        catalog: SoundCatalog,
        config: EngineConfig,
        resolver: Arc<dyn SourceResolver>,
    ) -> Self {
        Self::build(backend, catalog, config, Some(resolver), Arc::new(NoopHaptics))
    }

    fn build(
        backend: Arc<dyn AudioBackend>,
        catalog: SoundCatalog,
        config: EngineConfig,
        resolver: Option<Arc<dyn SourceResolver>>,
        haptics: Arc<dyn HapticBackend>,
    ) -> Self {
        let registry = Arc::new(LayerRegistry::new());
        let callbacks = Arc::new(CallbackManager::new());
        let fader = FadeController::new(backend.clone(), &config);
        let scheduler = Arc::new(LoopScheduler::new(
            backend.clone(),
            registry.clone(),
            callbacks.clone(),
            config.clone(),
        ));

        Self {
            inner: Arc::new(EngineInner {
                backend,
                resolver,
                haptics,
                catalog,
                config,
                registry,
                scheduler,
                fader,
                callbacks,
                initialized: AtomicBool::new(false),
                master_enabled: AtomicBool::new(true),
                haptics_enabled: AtomicBool::new(true),
            }),
            guardian: Mutex::new(None),
        }
    }

    /// Replace the default no-op haptics. Call before `initialize`.
    pub fn set_haptic_backend(&mut self, haptics: Arc<dyn HapticBackend>) {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.haptics = haptics;
        } else {
            log::warn!("[engine] haptic backend change ignored: engine already shared");
        }
    }

    /// Configure the audio session and start the keep-alive guardian.
    /// Idempotent. A full background-capable session is attempted first;
    /// if the platform refuses it the engine falls back to a minimal
    /// session rather than failing outright.
    pub fn initialize(&self) -> Result<()> {
        if self
            .inner
            .initialized
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(());
        }

        if let Err(e) = self.inner.backend.configure(&AudioSessionConfig::full()) {
            log::warn!(
                "[engine] full session config rejected ({}); falling back to minimal",
                e
            );
            if let Err(e) = self.inner.backend.configure(&AudioSessionConfig::minimal()) {
                log::warn!("[engine] minimal session config also rejected: {}", e);
            }
        }

        let mut guardian = self.guardian.lock();
        if guardian.is_none() {
            *guardian = Some(LifecycleGuardian::start(self.inner.clone()));
        }

        log::info!("[engine] initialized ({} catalog entries)", self.inner.catalog.len());
        Ok(())
    }

    /// Start a sound layer. Looping layers play seamlessly until stopped;
    /// non-looping layers play one pass with fade-in and a fade-out before
    /// their natural end. Restarting an already-playing layer stops it
    /// first. Returns once playback has begun.
    pub fn play_sound(&self, sound_id: &str, looping: bool, volume: Option<f32>) -> Result<()> {
        self.initialize()?;

        if !self.inner.master_enabled.load(Ordering::SeqCst) {
            log::info!("[engine] sounds disabled; ignoring play of '{}'", sound_id);
            return Ok(());
        }

        let definition = self
            .inner
            .catalog
            .get(sound_id)
            .cloned()
            .ok_or_else(|| AudioError::LoadError(format!("unknown sound id '{}'", sound_id)))?;
        let volume = volume.unwrap_or(1.0).clamp(0.0, 1.0);

        // Restart semantics: tear down whatever was playing under this id
        self.stop_layer(sound_id, false);

        let state = self.inner.registry.state(sound_id);
        if state.get() != LayerState::Stopped {
            // The registry holds nothing for this id but the state machine
            // disagrees: playback was torn down behind our back. Re-sync.
            state.set(LayerState::Stopped);
        }
        state.transition(LayerState::Loading)?;

        let source = match self.inner.resolve_source(&definition) {
            Ok(source) => source,
            Err(e) => {
                let _ = state.transition(LayerState::Stopped);
                return Err(e);
            }
        };

        let result = if looping {
            self.start_looping(sound_id, &definition, source, volume)
        } else {
            self.start_one_shot(sound_id, source, volume)
        };

        match result {
            Ok(mode) => {
                let _ = state.transition(LayerState::Playing(mode));
                self.inner.callbacks.dispatch_event(EngineEvent::LayerStarted {
                    sound_id: sound_id.to_string(),
                });
                self.inner.pulse(HapticIntensity::Light);
                Ok(())
            }
            Err(e) => {
                let _ = state.transition(LayerState::Stopped);
                Err(e)
            }
        }
    }

    fn start_looping(
        &self,
        sound_id: &str,
        definition: &SoundDefinition,
        source: ClipSource,
        volume: f32,
    ) -> Result<PlayMode> {
        self.inner
            .scheduler
            .start_loop(sound_id, definition.category, source, volume)?;
        // Only a successfully started loop enters the desired set; the
        // guardian must never resurrect a sound that never played
        self.inner.registry.mark_desired(sound_id, volume);
        Ok(PlayMode::Looping)
    }

    /// Single pass: fade in, fade out before the natural end, then stop and
    /// unload shortly after the end.
    fn start_one_shot(&self, sound_id: &str, source: ClipSource, volume: f32) -> Result<PlayMode> {
        let inner = &self.inner;
        let handle = inner.backend.load(&source)?;

        // Silent until the fade-in brings it up
        let _ = inner.backend.set_volume(handle, 0.0);
        if let Err(e) = inner.backend.play(handle) {
            let _ = inner.backend.unload(handle);
            return Err(e);
        }
        let fade = inner.fader.fade_in(handle, inner.config.fade_in_ms, volume);

        // Playback does not depend on knowing the duration; only the
        // fade-before-end and unload scheduling does
        let duration_ms = match inner.scheduler.resolve_duration(handle) {
            Ok(d) => Some(d),
            Err(e) => {
                log::warn!(
                    "[engine] one-shot '{}' duration unknown; playing without end scheduling: {}",
                    sound_id,
                    e
                );
                None
            }
        };

        let mut timers = Vec::new();
        if let Some(duration_ms) = duration_ms {
            let fade_out_at = duration_ms.saturating_sub(inner.config.one_shot_fade_out_ms);
            let fade_out_ms = inner.config.one_shot_fade_out_ms.min(duration_ms);

            let fade_inner = inner.clone();
            let fade_id = sound_id.to_string();
            timers.push(ScheduledTask::schedule(
                "oneshot-fade",
                Duration::from_millis(fade_out_at),
                move || {
                    let volume = fade_inner
                        .registry
                        .with_one_shot(&fade_id, |o| o.volume)
                        .unwrap_or(0.0);
                    if let Err(e) = fade_inner
                        .registry
                        .state(&fade_id)
                        .transition(LayerState::FadingOut)
                    {
                        log::debug!("[engine] state transition ignored: {}", e);
                    }
                    let fade = fade_inner.fader.fade_to(handle, fade_out_ms, volume, 0.0);
                    fade_inner
                        .registry
                        .with_one_shot(&fade_id, |o| o.fades.push(fade));
                },
            ));

            let end_inner = inner.clone();
            let end_id = sound_id.to_string();
            timers.push(ScheduledTask::schedule(
                "oneshot-end",
                Duration::from_millis(duration_ms + inner.config.unload_grace_ms),
                move || {
                    if let Some(mut one_shot) = end_inner.registry.take_one_shot(&end_id) {
                        one_shot.cancel_all();
                        let _ = end_inner.backend.stop(one_shot.handle);
                        let _ = end_inner.backend.unload(one_shot.handle);
                        if let Err(e) = end_inner
                            .registry
                            .state(&end_id)
                            .transition(LayerState::Stopped)
                        {
                            log::debug!("[engine] state transition ignored: {}", e);
                        }
                        end_inner
                            .callbacks
                            .dispatch_event(EngineEvent::LayerStopped { sound_id: end_id.clone() });
                    }
                },
            ));
        }

        inner.registry.insert_one_shot(
            sound_id,
            OneShot {
                handle,
                volume,
                timers,
                fades: vec![fade],
            },
        );
        Ok(PlayMode::OneShot)
    }

    /// Stop one layer: cancel its scheduling, fade its live instances to
    /// silence, then stop and unload everything. Returns once the layer is
    /// fully torn down. Stopping a stopped layer is a no-op.
    pub fn stop_sound(&self, sound_id: &str) -> Result<()> {
        self.stop_layer(sound_id, true);
        Ok(())
    }

    /// Shared teardown. `faded` selects the graceful path (explicit stop)
    /// versus the immediate mute-then-stop path (restarts, force stop).
    fn stop_layer(&self, sound_id: &str, faded: bool) {
        let inner = &self.inner;
        inner.registry.clear_desired(sound_id);
        let mut stopped_something = false;

        if let Some(mut one_shot) = inner.registry.take_one_shot(sound_id) {
            one_shot.cancel_all();
            let _ = inner.backend.set_volume(one_shot.handle, 0.0);
            let _ = inner.backend.stop(one_shot.handle);
            let _ = inner.backend.unload(one_shot.handle);
            stopped_something = true;
        }

        if let Some(mut session) = inner.registry.take_session(sound_id) {
            // Flip active and cancel timers/fades before touching audio, so
            // nothing can schedule a new instance mid-teardown
            session.cancel_all();
            let volume = session.volume;

            if faded && !session.instances.is_empty() {
                if let Err(e) = inner
                    .registry
                    .state(sound_id)
                    .transition(LayerState::FadingOut)
                {
                    log::debug!("[engine] state transition ignored: {}", e);
                }
                let fader = &inner.fader;
                let stop_fade_ms = inner.config.stop_fade_ms;
                thread::scope(|scope| {
                    for handle in &session.instances {
                        let handle = *handle;
                        scope.spawn(move || {
                            fader.fade_out_blocking(handle, stop_fade_ms, volume);
                        });
                    }
                });
            }

            for handle in session.instances {
                let _ = inner.backend.set_volume(handle, 0.0);
                let _ = inner.backend.stop(handle);
                if let Err(e) = inner.backend.unload(handle) {
                    log::debug!("[engine] unload during stop ignored: {}", e);
                }
            }
            stopped_something = true;
        }

        if stopped_something {
            if let Err(e) = inner.registry.state(sound_id).transition(LayerState::Stopped) {
                log::debug!("[engine] state transition ignored: {}", e);
            }
            inner.callbacks.dispatch_event(EngineEvent::LayerStopped {
                sound_id: sound_id.to_string(),
            });
            inner.pulse(HapticIntensity::Light);
        }
    }

    /// Gracefully stop every playing layer
    pub fn stop_all(&self) -> Result<()> {
        for sound_id in self.inner.registry.tracked_ids() {
            self.stop_layer(&sound_id, true);
        }
        Ok(())
    }

    /// Emergency silence: mute then stop and unload everything immediately,
    /// no fades. Clears the desired set so the guardian restores nothing.
    pub fn force_stop_all(&self) {
        let inner = &self.inner;
        for (sound_id, _) in inner.registry.desired_snapshot() {
            inner.registry.clear_desired(&sound_id);
        }
        for sound_id in inner.registry.tracked_ids() {
            self.stop_layer(&sound_id, false);
        }
        log::info!("[engine] force stop complete");
    }

    /// Change a playing layer's volume. Applied to every live instance at
    /// once and remembered for future cycles. No-op for stopped layers.
    pub fn update_volume(&self, sound_id: &str, volume: f32) -> Result<()> {
        let volume = volume.clamp(0.0, 1.0);
        let inner = &self.inner;
        let mut touched = false;

        let instances = inner.registry.with_session(sound_id, |session| {
            session.volume = volume;
            session.instances.clone()
        });
        if let Some(instances) = instances {
            inner.registry.mark_desired(sound_id, volume);
            for handle in instances {
                let _ = inner.backend.set_volume(handle, volume);
            }
            touched = true;
        }

        let one_shot_handle = inner.registry.with_one_shot(sound_id, |one_shot| {
            one_shot.volume = volume;
            one_shot.handle
        });
        if let Some(handle) = one_shot_handle {
            let _ = inner.backend.set_volume(handle, volume);
            touched = true;
        }

        if touched {
            inner.callbacks.dispatch_event(EngineEvent::VolumeChanged {
                sound_id: sound_id.to_string(),
                volume,
            });
        }
        Ok(())
    }

    /// Master sound switch. Disabling stops everything immediately;
    /// re-enabling starts nothing by itself.
    pub fn set_master_enabled(&self, enabled: bool) {
        self.inner.master_enabled.store(enabled, Ordering::SeqCst);
        if !enabled {
            self.force_stop_all();
        }
    }

    pub fn master_enabled(&self) -> bool {
        self.inner.master_enabled.load(Ordering::SeqCst)
    }

    pub fn set_haptics_enabled(&self, enabled: bool) {
        self.inner.haptics_enabled.store(enabled, Ordering::SeqCst);
    }

    /// Fire a haptic pulse; no-op while haptics are disabled
    pub fn play_haptic(&self, intensity: HapticIntensity) {
        self.inner.pulse(intensity);
    }

    pub fn is_playing(&self, sound_id: &str) -> bool {
        self.inner.registry.is_playing(sound_id)
    }

    pub fn layer_state(&self, sound_id: &str) -> LayerState {
        self.inner.registry.state(sound_id).get()
    }

    /// Ids of everything audible right now: loops that should be playing
    /// plus live one-shots. Agrees with `is_playing` for every returned id.
    pub fn currently_playing(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .inner
            .registry
            .desired_snapshot()
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        for id in self.inner.registry.one_shot_ids() {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        ids
    }

    pub fn catalog(&self) -> &SoundCatalog {
        &self.inner.catalog
    }

    pub fn add_callback(&self, callback: Arc<dyn EngineCallback>) {
        self.inner.callbacks.add_callback(callback);
    }

    pub fn clear_callbacks(&self) {
        self.inner.callbacks.clear_callbacks();
    }

    /// React to a host lifecycle transition. On foreground the session
    /// config is re-asserted, silently paused instances are resumed, and a
    /// keep-alive sweep runs immediately instead of waiting for the next
    /// tick. Background is deliberately a no-op: playback continues under
    /// the background-capable session.
    pub fn notify_lifecycle(&self, event: AppLifecycleEvent) {
        match event {
            AppLifecycleEvent::Foreground => {
                if let Err(e) = self.inner.backend.configure(&AudioSessionConfig::full()) {
                    log::warn!("[engine] session re-assert failed: {}", e);
                }
                self.resume_paused_instances();
                guardian::sweep(&self.inner);
            }
            AppLifecycleEvent::Background => {
                log::debug!("[engine] backgrounded; playback continues");
            }
        }
    }

    /// The OS can pause instances without telling us. Any tracked instance
    /// whose backend status says it is not playing gets a play call.
    fn resume_paused_instances(&self) {
        for handle in self.inner.registry.live_handles() {
            match self.inner.backend.status(handle) {
                Ok(status) if !status.is_playing => {
                    if let Err(e) = self.inner.backend.play(handle) {
                        log::warn!("[engine] resume of {:?} failed: {}", handle, e);
                    }
                }
                _ => {}
            }
        }
    }

    /// Full teardown: stop everything, stop the guardian, detach observers.
    /// The engine can be initialized again afterwards.
    pub fn cleanup(&self) {
        self.force_stop_all();
        if let Some(guardian) = self.guardian.lock().take() {
            guardian.stop();
        }
        self.inner.callbacks.clear_callbacks();
        self.inner.initialized.store(false, Ordering::SeqCst);
        log::info!("[engine] cleaned up");
    }
}

impl Drop for SoundEngine {
    fn drop(&mut self) {
        if let Some(guardian) = self.guardian.lock().take() {
            guardian.stop();
        }
    }
}
