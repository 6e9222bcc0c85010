// Per-sound bookkeeping: loop sessions, one-shot instances, pending timers
// and fades, and the set of sounds that should be playing. An explicit
// object owned by the engine instance, never ambient global state, so the
// engine is testable in isolation and instantiable more than once.

use crate::fade::FadeHandle;
use crate::timer::ScheduledTask;
use lull_backend_api::ClipHandle;
use lull_core::LayerStateContainer;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Bookkeeping for one looping sound.
/// `active` is the loop's sole cancellation mechanism: the scheduler
/// re-checks it after every suspension point, and no new instance may be
/// created once it is false.
pub struct LoopSession {
    pub active: Arc<AtomicBool>,
    pub volume: f32,
    pub cycle: u64,
    /// Live instances: 0, 1, or 2 (during an overlap window)
    pub instances: Vec<ClipHandle>,
    pub timers: Vec<ScheduledTask>,
    pub fades: Vec<FadeHandle>,
}

impl LoopSession {
    pub fn new(volume: f32) -> Self {
        Self {
            active: Arc::new(AtomicBool::new(true)),
            volume,
            cycle: 0,
            instances: Vec::new(),
            timers: Vec::new(),
            fades: Vec::new(),
        }
    }

    /// Atomic stop transition: flip `active`, then cancel every pending
    /// timer and fade. All synchronous; after this returns nothing owned by
    /// the session can fire or write volume again.
    pub fn cancel_all(&mut self) {
        self.active.store(false, Ordering::SeqCst);
        for timer in &self.timers {
            timer.cancel();
        }
        for fade in &self.fades {
            fade.cancel();
        }
    }

    fn prune(&mut self) {
        self.timers.retain(|t| t.is_pending());
        self.fades.retain(|f| !f.is_done());
    }
}

/// Bookkeeping for one single-shot (preview) playback
pub struct OneShot {
    pub handle: ClipHandle,
    pub volume: f32,
    pub timers: Vec<ScheduledTask>,
    pub fades: Vec<FadeHandle>,
}

impl OneShot {
    pub fn cancel_all(&mut self) {
        for timer in &self.timers {
            timer.cancel();
        }
        for fade in &self.fades {
            fade.cancel();
        }
    }
}

/// Registry of everything live or pending, keyed by sound id
#[derive(Default)]
pub struct LayerRegistry {
    sessions: Mutex<HashMap<String, LoopSession>>,
    one_shots: Mutex<HashMap<String, OneShot>>,
    /// The ActiveSoundSet: sounds that should be playing (with their loop
    /// volume). Written only by explicit play/stop; the keep-alive sweep
    /// reads it and repairs sessions to match.
    desired: Mutex<HashMap<String, f32>>,
    states: Mutex<HashMap<String, LayerStateContainer>>,
}

impl LayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Per-sound state container, created on first touch
    pub fn state(&self, sound_id: &str) -> LayerStateContainer {
        self.states
            .lock()
            .entry(sound_id.to_string())
            .or_default()
            .clone()
    }

    // --- loop sessions ---

    pub fn insert_session(&self, sound_id: &str, session: LoopSession) {
        let old = self.sessions.lock().insert(sound_id.to_string(), session);
        if let Some(mut old) = old {
            // Replacing a session must never leak its timers
            log::warn!("[registry] replacing live session for '{}'", sound_id);
            old.cancel_all();
        }
    }

    pub fn take_session(&self, sound_id: &str) -> Option<LoopSession> {
        self.sessions.lock().remove(sound_id)
    }

    pub fn with_session<R>(
        &self,
        sound_id: &str,
        f: impl FnOnce(&mut LoopSession) -> R,
    ) -> Option<R> {
        let mut sessions = self.sessions.lock();
        let session = sessions.get_mut(sound_id)?;
        session.prune();
        Some(f(session))
    }

    /// True while the session exists, is active, and has at least one live
    /// instance: the keep-alive's definition of "not drifted"
    pub fn session_live(&self, sound_id: &str) -> bool {
        self.with_session(sound_id, |s| {
            s.active.load(Ordering::SeqCst) && !s.instances.is_empty()
        })
        .unwrap_or(false)
    }

    pub fn add_instance(&self, sound_id: &str, handle: ClipHandle) -> bool {
        self.with_session(sound_id, |s| s.instances.push(handle))
            .is_some()
    }

    pub fn remove_instance(&self, sound_id: &str, handle: ClipHandle) {
        self.with_session(sound_id, |s| s.instances.retain(|h| *h != handle));
    }

    /// Attach a timer to the session; cancelled on the spot if the session
    /// is already gone (a stop raced the caller)
    pub fn add_timer(&self, sound_id: &str, task: ScheduledTask) {
        if self
            .with_session(sound_id, |s| s.timers.push(task))
            .is_none()
        {
            // Dropping the task cancels it
        }
    }

    pub fn add_fade(&self, sound_id: &str, fade: FadeHandle) {
        let mut fade = Some(fade);
        let _ = self.with_session(sound_id, |s| {
            if let Some(fade) = fade.take() {
                s.fades.push(fade);
            }
        });
        // Session already torn down: the orphan ramp must stop writing
        if let Some(orphan) = fade {
            orphan.cancel();
        }
    }

    // --- one-shots ---

    pub fn insert_one_shot(&self, sound_id: &str, one_shot: OneShot) {
        let old = self.one_shots.lock().insert(sound_id.to_string(), one_shot);
        if let Some(mut old) = old {
            old.cancel_all();
        }
    }

    pub fn take_one_shot(&self, sound_id: &str) -> Option<OneShot> {
        self.one_shots.lock().remove(sound_id)
    }

    pub fn with_one_shot<R>(
        &self,
        sound_id: &str,
        f: impl FnOnce(&mut OneShot) -> R,
    ) -> Option<R> {
        let mut one_shots = self.one_shots.lock();
        Some(f(one_shots.get_mut(sound_id)?))
    }

    // --- ActiveSoundSet ---

    pub fn mark_desired(&self, sound_id: &str, volume: f32) {
        self.desired.lock().insert(sound_id.to_string(), volume);
    }

    pub fn clear_desired(&self, sound_id: &str) {
        self.desired.lock().remove(sound_id);
    }

    pub fn desired_snapshot(&self) -> Vec<(String, f32)> {
        self.desired
            .lock()
            .iter()
            .map(|(id, v)| (id.clone(), *v))
            .collect()
    }

    pub fn desired_is_empty(&self) -> bool {
        self.desired.lock().is_empty()
    }

    pub fn one_shot_ids(&self) -> Vec<String> {
        self.one_shots.lock().keys().cloned().collect()
    }

    // --- queries ---

    pub fn is_playing(&self, sound_id: &str) -> bool {
        if self
            .with_session(sound_id, |s| s.active.load(Ordering::SeqCst))
            .unwrap_or(false)
        {
            return true;
        }
        self.one_shots.lock().contains_key(sound_id)
    }

    pub fn tracked_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.lock().keys().cloned().collect();
        for id in self.one_shots.lock().keys() {
            if !ids.contains(id) {
                ids.push(id.clone());
            }
        }
        ids
    }

    /// Every live backend handle, loop instances and one-shots alike
    pub fn live_handles(&self) -> Vec<ClipHandle> {
        let mut handles: Vec<ClipHandle> = self
            .sessions
            .lock()
            .values()
            .flat_map(|s| s.instances.iter().copied())
            .collect();
        handles.extend(self.one_shots.lock().values().map(|o| o.handle));
        handles
    }

    pub fn instance_count(&self, sound_id: &str) -> usize {
        self.with_session(sound_id, |s| s.instances.len())
            .unwrap_or(0)
    }

    pub fn pending_timer_count(&self, sound_id: &str) -> usize {
        let from_session = self
            .with_session(sound_id, |s| {
                s.timers.iter().filter(|t| t.is_pending()).count()
            })
            .unwrap_or(0);
        let from_one_shot = self
            .with_one_shot(sound_id, |o| {
                o.timers.iter().filter(|t| t.is_pending()).count()
            })
            .unwrap_or(0);
        from_session + from_one_shot
    }

    pub fn total_instances(&self) -> usize {
        self.sessions
            .lock()
            .values()
            .map(|s| s.instances.len())
            .sum::<usize>()
            + self.one_shots.lock().len()
    }

    pub fn total_pending_timers(&self) -> usize {
        self.tracked_ids()
            .iter()
            .map(|id| self.pending_timer_count(id))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::fade::FadeController;
    use lull_backend_api::mock::MockBackend;
    use lull_backend_api::{AudioBackend, ClipSource};
    use std::time::Duration;

    #[test]
    fn session_insert_take_round_trip() {
        let registry = LayerRegistry::new();
        registry.insert_session("tick", LoopSession::new(0.7));
        assert!(registry.is_playing("tick"));

        let session = registry.take_session("tick").unwrap();
        assert_eq!(session.volume, 0.7);
        assert!(!registry.is_playing("tick"));
    }

    #[test]
    fn cancel_all_flips_active_and_cancels_timers() {
        let registry = LayerRegistry::new();
        registry.insert_session("tick", LoopSession::new(1.0));

        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        registry.add_timer(
            "tick",
            ScheduledTask::schedule("cycle", Duration::from_millis(30), move || {
                flag.store(true, Ordering::SeqCst);
            }),
        );

        let mut session = registry.take_session("tick").unwrap();
        session.cancel_all();
        assert!(!session.active.load(Ordering::SeqCst));

        std::thread::sleep(Duration::from_millis(80));
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[test]
    fn timer_for_missing_session_is_cancelled() {
        let registry = LayerRegistry::new();
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        registry.add_timer(
            "gone",
            ScheduledTask::schedule("cycle", Duration::from_millis(20), move || {
                flag.store(true, Ordering::SeqCst);
            }),
        );

        std::thread::sleep(Duration::from_millis(70));
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[test]
    fn fade_for_missing_session_is_cancelled() {
        let backend = Arc::new(MockBackend::new());
        let handle = backend
            .load(&ClipSource::Path("assets/clip.ogg".to_string()))
            .unwrap();
        let fader = FadeController::new(backend.clone(), &EngineConfig::default());

        let registry = LayerRegistry::new();
        registry.add_fade("gone", fader.fade_to(handle, 500, 0.0, 1.0));

        // No further volume writes may land after the orphan is cancelled
        let writes = backend.volume_history(handle).len();
        std::thread::sleep(Duration::from_millis(120));
        assert_eq!(backend.volume_history(handle).len(), writes);
    }

    #[test]
    fn fade_for_live_session_is_attached() {
        let backend = Arc::new(MockBackend::new());
        let handle = backend
            .load(&ClipSource::Path("assets/clip.ogg".to_string()))
            .unwrap();
        let fader = FadeController::new(backend.clone(), &EngineConfig::default());

        let registry = LayerRegistry::new();
        registry.insert_session("tick", LoopSession::new(1.0));
        registry.add_fade("tick", fader.fade_to(handle, 300, 0.0, 1.0));

        assert_eq!(registry.with_session("tick", |s| s.fades.len()), Some(1));
    }

    #[test]
    fn session_live_requires_active_and_instances() {
        let registry = LayerRegistry::new();
        registry.insert_session("forest", LoopSession::new(1.0));
        assert!(!registry.session_live("forest"));

        registry.add_instance("forest", ClipHandle(1));
        assert!(registry.session_live("forest"));

        registry.with_session("forest", |s| s.active.store(false, Ordering::SeqCst));
        assert!(!registry.session_live("forest"));
    }

    #[test]
    fn desired_set_tracks_loops() {
        let registry = LayerRegistry::new();
        registry.mark_desired("forest", 0.5);
        assert!(!registry.desired_is_empty());

        let snapshot = registry.desired_snapshot();
        assert_eq!(snapshot, vec![("forest".to_string(), 0.5)]);

        registry.clear_desired("forest");
        assert!(registry.desired_is_empty());
    }

    #[test]
    fn tracked_ids_unions_sessions_and_one_shots() {
        let registry = LayerRegistry::new();
        registry.insert_session("a", LoopSession::new(1.0));
        registry.insert_one_shot(
            "b",
            OneShot {
                handle: ClipHandle(9),
                volume: 1.0,
                timers: Vec::new(),
                fades: Vec::new(),
            },
        );

        let mut ids = registry.tracked_ids();
        ids.sort();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(registry.live_handles(), vec![ClipHandle(9)]);
    }
}
