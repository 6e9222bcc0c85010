// Stepped linear gain ramps.
// A ramp is divided into a fixed number of discrete volume steps spaced
// `duration / steps` apart. Backend errors during a ramp are expected once
// the owning instance has been unloaded and are swallowed; a fade must
// never crash or propagate past its own worker.

use crate::config::EngineConfig;
use lull_backend_api::{AudioBackend, ClipHandle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Handle to a running ramp; cancelling stops further volume writes
pub struct FadeHandle {
    cancel: Arc<AtomicBool>,
    done: Arc<AtomicBool>,
}

impl FadeHandle {
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
pub struct FadeController {
    backend: Arc<dyn AudioBackend>,
    steps: u32,
}

impl FadeController {
    pub fn new(backend: Arc<dyn AudioBackend>, config: &EngineConfig) -> Self {
        Self {
            backend,
            steps: config.fade_steps.max(1),
        }
    }

    /// Fire-and-forget ramp from `from` to `to` over `duration_ms`.
    /// The starting gain is applied before the worker spawns so the caller
    /// can begin playback at the right level immediately.
    pub fn fade_to(
        &self,
        handle: ClipHandle,
        duration_ms: u64,
        from: f32,
        to: f32,
    ) -> FadeHandle {
        let cancel = Arc::new(AtomicBool::new(false));
        let done = Arc::new(AtomicBool::new(false));

        if let Err(e) = self.backend.set_volume(handle, from) {
            // Instance already gone; nothing to ramp
            log::debug!("fade start skipped: {}", e);
            done.store(true, Ordering::SeqCst);
            return FadeHandle { cancel, done };
        }

        let backend = self.backend.clone();
        let steps = self.steps;
        let worker_cancel = cancel.clone();
        let worker_done = done.clone();

        let spawned = thread::Builder::new()
            .name("lull-fade".into())
            .spawn(move || {
                run_ramp(&*backend, handle, duration_ms, from, to, steps, &worker_cancel);
                worker_done.store(true, Ordering::SeqCst);
            });
        if spawned.is_err() {
            done.store(true, Ordering::SeqCst);
        }

        FadeHandle { cancel, done }
    }

    /// Convenience fade-in from silence
    pub fn fade_in(&self, handle: ClipHandle, duration_ms: u64, target: f32) -> FadeHandle {
        self.fade_to(handle, duration_ms, 0.0, target)
    }

    /// Ramp to silence on the caller's thread, returning once gain reaches
    /// zero. Used to sequence stop-after-fade.
    pub fn fade_out_blocking(&self, handle: ClipHandle, duration_ms: u64, from: f32) {
        let never = AtomicBool::new(false);
        run_ramp(
            &*self.backend,
            handle,
            duration_ms,
            from,
            0.0,
            self.steps,
            &never,
        );
    }
}

fn run_ramp(
    backend: &dyn AudioBackend,
    handle: ClipHandle,
    duration_ms: u64,
    from: f32,
    to: f32,
    steps: u32,
    cancel: &AtomicBool,
) {
    let step_wait = Duration::from_millis(duration_ms / steps as u64);

    for step in 1..=steps {
        if cancel.load(Ordering::SeqCst) {
            return;
        }
        thread::sleep(step_wait);
        if cancel.load(Ordering::SeqCst) {
            return;
        }

        let t = step as f32 / steps as f32;
        let gain = from + (to - from) * t;
        if let Err(e) = backend.set_volume(handle, gain) {
            // Expected when the instance's lifecycle already ended
            log::debug!("fade step dropped: {}", e);
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lull_backend_api::mock::MockBackend;
    use lull_backend_api::{AudioBackend, ClipSource};

    fn test_config() -> EngineConfig {
        EngineConfig {
            fade_steps: 10,
            ..EngineConfig::default()
        }
    }

    fn loaded_handle(backend: &MockBackend) -> ClipHandle {
        backend
            .load(&ClipSource::Path("assets/clip.ogg".to_string()))
            .unwrap()
    }

    #[test]
    fn fade_in_is_monotonic_and_exact() {
        let backend = Arc::new(MockBackend::new());
        let handle = loaded_handle(&backend);
        let fader = FadeController::new(backend.clone(), &test_config());

        let fade = fader.fade_in(handle, 100, 0.8);
        while !fade.is_done() {
            thread::sleep(Duration::from_millis(10));
        }

        let history = backend.volume_history(handle);
        // load-time 1.0, then the ramp starting at 0.0
        let ramp = &history[1..];
        assert_eq!(ramp[0], 0.0);
        for pair in ramp.windows(2) {
            assert!(pair[1] >= pair[0], "fade-in decreased: {:?}", ramp);
        }
        assert!((ramp.last().unwrap() - 0.8).abs() < 1e-6);
    }

    #[test]
    fn fade_out_blocking_reaches_zero() {
        let backend = Arc::new(MockBackend::new());
        let handle = loaded_handle(&backend);
        let fader = FadeController::new(backend.clone(), &test_config());

        fader.fade_out_blocking(handle, 80, 1.0);

        assert_eq!(backend.gain_of(handle), Some(0.0));
        let history = backend.volume_history(handle);
        for pair in history[1..].windows(2) {
            assert!(pair[1] <= pair[0], "fade-out increased: {:?}", history);
        }
    }

    #[test]
    fn cancelled_fade_stops_writing() {
        let backend = Arc::new(MockBackend::new());
        let handle = loaded_handle(&backend);
        let fader = FadeController::new(backend.clone(), &test_config());

        let fade = fader.fade_in(handle, 500, 1.0);
        thread::sleep(Duration::from_millis(60));
        fade.cancel();
        thread::sleep(Duration::from_millis(60));

        let count_at_cancel = backend.volume_history(handle).len();
        thread::sleep(Duration::from_millis(120));
        assert_eq!(backend.volume_history(handle).len(), count_at_cancel);
    }

    #[test]
    fn fade_on_unloaded_handle_is_silent() {
        let backend = Arc::new(MockBackend::new());
        let handle = loaded_handle(&backend);
        backend.unload(handle).unwrap();

        let fader = FadeController::new(backend.clone(), &test_config());
        let fade = fader.fade_in(handle, 50, 1.0);
        assert!(fade.is_done());

        // Blocking variant must also survive a dead handle
        fader.fade_out_blocking(handle, 50, 1.0);
    }

    #[test]
    fn unload_mid_fade_does_not_panic() {
        let backend = Arc::new(MockBackend::new());
        let handle = loaded_handle(&backend);
        let fader = FadeController::new(backend.clone(), &test_config());

        let fade = fader.fade_in(handle, 200, 1.0);
        thread::sleep(Duration::from_millis(50));
        backend.unload(handle).unwrap();

        while !fade.is_done() {
            thread::sleep(Duration::from_millis(10));
        }
    }
}
