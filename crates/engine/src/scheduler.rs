// Seamless loop scheduling.
//
// A finite clip is made to sound infinite by overlapping playback
// instances of the same clip: before the current instance ends, a fresh
// one is created and the seam is hidden either by a crossfade
// (tonal/rhythmic categories) or by a bare overlap (dense ambient
// textures, where a fade is itself audible as a dip). A single instance is
// never wrapped natively; native looping over a variably-decoded clip
// clicks at the wrap point.
//
// The session's `active` flag is the sole cancellation mechanism. It is
// re-checked after every suspension point (load, duration polling, timer
// wakeup) and before any new instance is created.

use crate::config::EngineConfig;
use crate::fade::FadeController;
use crate::registry::{LayerRegistry, LoopSession};
use crate::timer::ScheduledTask;
use lull_backend_api::{AudioBackend, ClipHandle, ClipSource};
use lull_core::{AudioError, CallbackManager, EngineEvent, Result, SoundCategory};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub struct LoopScheduler {
    backend: Arc<dyn AudioBackend>,
    fader: FadeController,
    registry: Arc<LayerRegistry>,
    callbacks: Arc<CallbackManager>,
    config: EngineConfig,
}

impl LoopScheduler {
    pub fn new(
        backend: Arc<dyn AudioBackend>,
        registry: Arc<LayerRegistry>,
        callbacks: Arc<CallbackManager>,
        config: EngineConfig,
    ) -> Self {
        let fader = FadeController::new(backend.clone(), &config);
        Self {
            backend,
            fader,
            registry,
            callbacks,
            config,
        }
    }

    /// Begin seamless looped playback of `source` under `sound_id`.
    /// Returns once the first instance is audible; subsequent cycles run on
    /// scheduled timers. The caller must have torn down any previous
    /// session for this id.
    pub fn start_loop(
        self: &Arc<Self>,
        sound_id: &str,
        category: SoundCategory,
        source: ClipSource,
        volume: f32,
    ) -> Result<()> {
        let session = LoopSession::new(volume.clamp(0.0, 1.0));
        let active = session.active.clone();
        self.registry.insert_session(sound_id, session);

        if let Err(e) = self.run_cycle(sound_id, category, source, active, true) {
            if let Some(mut session) = self.registry.take_session(sound_id) {
                session.cancel_all();
            }
            return Err(e);
        }
        Ok(())
    }

    /// One overlap cycle: create an instance, start it at the right gain,
    /// and schedule its successor and its own retirement.
    fn run_cycle(
        self: &Arc<Self>,
        sound_id: &str,
        category: SoundCategory,
        source: ClipSource,
        active: Arc<AtomicBool>,
        first: bool,
    ) -> Result<()> {
        if !active.load(Ordering::SeqCst) {
            return Ok(());
        }

        let handle = self.backend.load(&source)?;

        // A stop may have raced the load
        if !active.load(Ordering::SeqCst) {
            let _ = self.backend.unload(handle);
            return Ok(());
        }
        if !self.registry.add_instance(sound_id, handle) {
            let _ = self.backend.unload(handle);
            return Ok(());
        }

        let (cycle, volume) = self
            .registry
            .with_session(sound_id, |s| {
                s.cycle += 1;
                (s.cycle, s.volume)
            })
            .unwrap_or((0, 1.0));

        let dense = category.is_dense_texture();
        let overlap_ms = self.config.overlap_for(category);

        if dense {
            // Dense textures jump straight to target gain, first instance
            // and successors alike; the symmetry with their unfaded end is
            // deliberate.
            let _ = self.backend.set_volume(handle, volume);
        } else {
            // Must be silent before playback starts; the fade brings it up
            let _ = self.backend.set_volume(handle, 0.0);
        }

        if let Err(e) = self.backend.play(handle) {
            self.retire_instance(sound_id, handle);
            return Err(e);
        }

        if !dense {
            let ramp_ms = if first { self.config.fade_in_ms } else { overlap_ms };
            let fade = self.fader.fade_to(handle, ramp_ms, 0.0, volume);
            self.registry.add_fade(sound_id, fade);
        }

        log::debug!(
            "[scheduler] '{}' cycle {} started ({:?})",
            sound_id,
            cycle,
            handle
        );
        self.callbacks.dispatch_event(EngineEvent::CycleStarted {
            sound_id: sound_id.to_string(),
            cycle,
        });

        let duration_ms = match self.resolve_duration(handle) {
            Ok(d) => d,
            Err(e) => {
                self.retire_instance(sound_id, handle);
                return Err(e);
            }
        };

        // Polling is a suspension point; a stop may have landed meanwhile
        if !active.load(Ordering::SeqCst) {
            return Ok(());
        }

        // Never schedule a negative delay: a clip shorter than the overlap
        // simply hands over near-immediately
        let next_delay_ms = duration_ms.saturating_sub(overlap_ms);

        let sched = Arc::clone(self);
        let id = sound_id.to_string();
        let next_source = source.clone();
        let next_active = active.clone();
        let cycle_task = ScheduledTask::schedule(
            "cycle",
            Duration::from_millis(next_delay_ms),
            move || {
                if !next_active.load(Ordering::SeqCst) {
                    return;
                }
                if let Err(e) =
                    sched.run_cycle(&id, category, next_source, next_active.clone(), false)
                {
                    // This layer's loop ends here; other sounds are
                    // unaffected and the keep-alive sweep may restore it
                    log::warn!("[scheduler] next cycle for '{}' failed: {}", id, e);
                    sched.callbacks.dispatch_event(EngineEvent::PlaybackError {
                        sound_id: id.clone(),
                        message: e.to_string(),
                    });
                    return;
                }
                if !dense {
                    let volume = sched
                        .registry
                        .with_session(&id, |s| s.volume)
                        .unwrap_or(1.0);
                    let fade = sched.fader.fade_to(handle, overlap_ms, volume, 0.0);
                    sched.registry.add_fade(&id, fade);
                }
            },
        );
        self.registry.add_timer(sound_id, cycle_task);

        let sched = Arc::clone(self);
        let id = sound_id.to_string();
        let unload_task = ScheduledTask::schedule(
            "unload",
            Duration::from_millis(duration_ms + self.config.unload_grace_ms),
            move || {
                sched.retire_instance(&id, handle);
            },
        );
        self.registry.add_timer(sound_id, unload_task);

        Ok(())
    }

    /// Stop and unload one instance and drop it from the session.
    /// Errors are expected when the instance already ended.
    fn retire_instance(&self, sound_id: &str, handle: ClipHandle) {
        self.registry.remove_instance(sound_id, handle);
        let _ = self.backend.stop(handle);
        if let Err(e) = self.backend.unload(handle) {
            log::debug!("[scheduler] retire of {:?} ignored: {}", handle, e);
        }
    }

    /// Duration metadata can arrive late for streamed sources. Poll with
    /// bounded retries; fail soft with `DurationUnresolved` so the play
    /// attempt surfaces an error instead of hanging.
    pub(crate) fn resolve_duration(&self, handle: ClipHandle) -> Result<u64> {
        for attempt in 0..self.config.duration_poll_attempts {
            let status = self
                .backend
                .status(handle)
                .map_err(|e| AudioError::DurationUnresolved(e.to_string()))?;
            if let Some(duration_ms) = status.duration_ms {
                if duration_ms > 0 {
                    return Ok(duration_ms);
                }
            }
            if attempt + 1 < self.config.duration_poll_attempts {
                thread::sleep(self.config.duration_poll_interval);
            }
        }
        Err(AudioError::DurationUnresolved(
            "duration metadata never arrived".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lull_backend_api::mock::MockBackend;

    const FOREST: &str = "nature-forest-ambience";
    const TICK: &str = "ticking-classic-clock";

    fn test_config() -> EngineConfig {
        EngineConfig {
            fade_in_ms: 60,
            fade_steps: 6,
            one_shot_fade_out_ms: 80,
            stop_fade_ms: 60,
            tonal_overlap_ms: 100,
            ambient_overlap_ms: 120,
            unload_grace_ms: 30,
            keepalive_interval: Duration::from_millis(200),
            duration_poll_attempts: 5,
            duration_poll_interval: Duration::from_millis(10),
        }
    }

    fn scheduler(backend: &Arc<MockBackend>) -> Arc<LoopScheduler> {
        Arc::new(LoopScheduler::new(
            backend.clone(),
            Arc::new(LayerRegistry::new()),
            Arc::new(CallbackManager::new()),
            test_config(),
        ))
    }

    fn scheduler_with(
        backend: &Arc<MockBackend>,
        registry: &Arc<LayerRegistry>,
    ) -> Arc<LoopScheduler> {
        Arc::new(LoopScheduler::new(
            backend.clone(),
            registry.clone(),
            Arc::new(CallbackManager::new()),
            test_config(),
        ))
    }

    #[test]
    fn nature_overlap_has_no_fade_and_retires_first_instance() {
        let backend = Arc::new(MockBackend::new());
        let source_key = "assets/forest.ogg";
        backend.set_duration(source_key, 300);

        let registry = Arc::new(LayerRegistry::new());
        let sched = scheduler_with(&backend, &registry);
        sched
            .start_loop(
                FOREST,
                SoundCategory::Nature,
                ClipSource::Path(source_key.to_string()),
                1.0,
            )
            .unwrap();

        let first = backend.live_handles_matching(source_key)[0];
        // Dense texture: full gain immediately, never a ramp from zero
        assert_eq!(backend.gain_of(first), Some(1.0));

        // Inside the overlap window (duration 300 - overlap 120 = 180):
        // both instances alive and playing
        thread::sleep(Duration::from_millis(240));
        assert_eq!(registry.instance_count(FOREST), 2);
        assert_eq!(backend.playing_count_matching(source_key), 2);
        assert!(backend.is_playing(first));

        // Past duration + grace: the first instance is gone
        thread::sleep(Duration::from_millis(120));
        assert!(!backend.is_loaded(first));

        // No fade was ever applied to the dense texture
        for gain in backend.volume_history(first) {
            assert_eq!(gain, 1.0);
        }

        if let Some(mut s) = registry.take_session(FOREST) {
            s.cancel_all();
        }
    }

    #[test]
    fn tonal_loop_fades_in_from_zero() {
        let backend = Arc::new(MockBackend::new());
        let source_key = "assets/tick.ogg";
        backend.set_duration(source_key, 400);

        let registry = Arc::new(LayerRegistry::new());
        let sched = scheduler_with(&backend, &registry);
        sched
            .start_loop(
                TICK,
                SoundCategory::Ticking,
                ClipSource::Path(source_key.to_string()),
                0.8,
            )
            .unwrap();

        let first = backend.live_handles_matching(source_key)[0];
        thread::sleep(Duration::from_millis(100));

        let history = backend.volume_history(first);
        // load-time default, then the ramp starting at zero
        assert_eq!(history[1], 0.0);
        for pair in history[1..].windows(2) {
            assert!(pair[1] >= pair[0], "fade-in not monotonic: {:?}", history);
        }
        assert!((history.last().unwrap() - 0.8).abs() < 1e-6);

        if let Some(mut s) = registry.take_session(TICK) {
            s.cancel_all();
        }
    }

    #[test]
    fn loop_is_gap_free_across_cycles() {
        let backend = Arc::new(MockBackend::new());
        let source_key = "assets/forest.ogg";
        backend.set_duration(source_key, 250);

        let registry = Arc::new(LayerRegistry::new());
        let sched = scheduler_with(&backend, &registry);
        sched
            .start_loop(
                FOREST,
                SoundCategory::Nature,
                ClipSource::Path(source_key.to_string()),
                1.0,
            )
            .unwrap();

        // Sample well past two clip durations: something must always play
        for _ in 0..30 {
            thread::sleep(Duration::from_millis(20));
            assert!(
                backend.playing_count_matching(source_key) >= 1,
                "gap in seamless loop"
            );
        }

        if let Some(mut s) = registry.take_session(FOREST) {
            s.cancel_all();
        }
    }

    #[test]
    fn flipping_active_stops_the_cycle_chain() {
        let backend = Arc::new(MockBackend::new());
        let source_key = "assets/forest.ogg";
        backend.set_duration(source_key, 200);

        let registry = Arc::new(LayerRegistry::new());
        let sched = scheduler_with(&backend, &registry);
        sched
            .start_loop(
                FOREST,
                SoundCategory::Nature,
                ClipSource::Path(source_key.to_string()),
                1.0,
            )
            .unwrap();

        let mut session = registry.take_session(FOREST).unwrap();
        session.cancel_all();
        let live_now = backend.loaded_count();

        // No new instance may appear after cancellation
        thread::sleep(Duration::from_millis(300));
        assert!(backend.loaded_count() <= live_now);
    }

    #[test]
    fn load_failure_surfaces_and_leaves_no_session() {
        let backend = Arc::new(MockBackend::new());
        backend.fail_load("assets/missing.ogg", "no such asset");

        let registry = Arc::new(LayerRegistry::new());
        let sched = scheduler_with(&backend, &registry);
        let err = sched
            .start_loop(
                TICK,
                SoundCategory::Ticking,
                ClipSource::Path("assets/missing.ogg".to_string()),
                1.0,
            )
            .unwrap_err();

        assert!(matches!(err, AudioError::LoadError(_)));
        assert!(!registry.is_playing(TICK));
        assert_eq!(backend.loaded_count(), 0);
    }

    #[test]
    fn unresolved_duration_fails_soft_and_cleans_up() {
        let backend = Arc::new(MockBackend::new());
        // Duration never scripted: polling exhausts

        let sched = scheduler(&backend);
        let err = sched
            .start_loop(
                FOREST,
                SoundCategory::Nature,
                ClipSource::Url("cdn/forest".to_string()),
                1.0,
            )
            .unwrap_err();

        assert!(matches!(err, AudioError::DurationUnresolved(_)));
        assert_eq!(backend.loaded_count(), 0);
    }

    #[test]
    fn late_duration_metadata_is_polled_for() {
        let backend = Arc::new(MockBackend::new());
        let source_key = "cdn/forest-stream";
        backend.set_duration(source_key, 300);
        backend.delay_duration(source_key, 3);

        let registry = Arc::new(LayerRegistry::new());
        let sched = scheduler_with(&backend, &registry);
        sched
            .start_loop(
                FOREST,
                SoundCategory::Nature,
                ClipSource::Url(source_key.to_string()),
                1.0,
            )
            .unwrap();

        assert_eq!(registry.instance_count(FOREST), 1);
        if let Some(mut s) = registry.take_session(FOREST) {
            s.cancel_all();
        }
    }

    #[test]
    fn clip_shorter_than_overlap_clamps_to_zero_delay() {
        let backend = Arc::new(MockBackend::new());
        let source_key = "assets/blip.ogg";
        // 50ms clip against a 120ms ambient overlap
        backend.set_duration(source_key, 50);

        let registry = Arc::new(LayerRegistry::new());
        let sched = scheduler_with(&backend, &registry);
        sched
            .start_loop(
                FOREST,
                SoundCategory::Nature,
                ClipSource::Path(source_key.to_string()),
                1.0,
            )
            .unwrap();

        // The handover fires near-immediately rather than never
        thread::sleep(Duration::from_millis(60));
        assert!(backend.playing_count_matching(source_key) >= 1);

        if let Some(mut s) = registry.take_session(FOREST) {
            s.cancel_all();
        }
    }
}
