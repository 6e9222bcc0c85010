// Keep-alive guardian.
// Mobile platforms silently kill background audio under memory or focus
// pressure, leaving the app convinced a sound is playing while nothing is.
// The guardian periodically compares reality (live loop sessions) against
// intent (the desired set) and restarts any loop that has drifted.

use crate::session::EngineInner;
use lull_core::{AudioError, EngineEvent, Result};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

struct Shutdown {
    stop: Mutex<bool>,
    cond: Condvar,
}

/// Periodic drift-repair worker. One per engine; lives from `initialize`
/// until `cleanup`.
pub(crate) struct LifecycleGuardian {
    shutdown: Arc<Shutdown>,
    worker: Option<JoinHandle<()>>,
}

impl LifecycleGuardian {
    pub(crate) fn start(inner: Arc<EngineInner>) -> Self {
        let shutdown = Arc::new(Shutdown {
            stop: Mutex::new(false),
            cond: Condvar::new(),
        });
        let worker_shutdown = shutdown.clone();
        let interval = inner.config.keepalive_interval;

        let spawned = thread::Builder::new()
            .name("lull-guardian".into())
            .spawn(move || loop {
                {
                    let mut stop = worker_shutdown.stop.lock();
                    if *stop {
                        return;
                    }
                    worker_shutdown.cond.wait_for(&mut stop, interval);
                    if *stop {
                        return;
                    }
                }
                sweep(&inner);
            });

        let worker = match spawned {
            Ok(handle) => Some(handle),
            Err(e) => {
                log::error!("[guardian] failed to spawn worker: {}", e);
                None
            }
        };

        Self { shutdown, worker }
    }

    /// Stop the worker and wait for it to exit. No sweep runs after this
    /// returns.
    pub(crate) fn stop(mut self) {
        *self.shutdown.stop.lock() = true;
        self.shutdown.cond.notify_all();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// One drift check over the desired set. Also called directly on
/// foreground transitions so repair does not wait for the next tick.
pub(crate) fn sweep(inner: &Arc<EngineInner>) {
    if !inner.master_enabled.load(Ordering::SeqCst) {
        return;
    }

    for (sound_id, volume) in inner.registry.desired_snapshot() {
        if inner.registry.session_live(&sound_id) {
            continue;
        }

        log::warn!("[guardian] '{}' drifted; restarting", sound_id);

        // Clear out any dead remnants before restarting
        if let Some(mut session) = inner.registry.take_session(&sound_id) {
            session.cancel_all();
            for handle in session.instances {
                let _ = inner.backend.stop(handle);
                let _ = inner.backend.unload(handle);
            }
        }

        match restore(inner, &sound_id, volume) {
            Ok(()) => {
                inner.callbacks.dispatch_event(EngineEvent::DriftRepaired {
                    sound_id: sound_id.clone(),
                });
            }
            Err(e) => {
                // Leave the id in the desired set; the next sweep retries
                log::warn!("[guardian] restart of '{}' failed: {}", sound_id, e);
                inner.callbacks.dispatch_event(EngineEvent::PlaybackError {
                    sound_id: sound_id.clone(),
                    message: e.to_string(),
                });
            }
        }
    }
}

fn restore(inner: &Arc<EngineInner>, sound_id: &str, volume: f32) -> Result<()> {
    let definition = inner
        .catalog
        .get(sound_id)
        .cloned()
        .ok_or_else(|| AudioError::LoadError(format!("unknown sound id '{}'", sound_id)))?;
    let source = inner.resolve_source(&definition)?;
    inner
        .scheduler
        .start_loop(sound_id, definition.category, source, volume)
}
