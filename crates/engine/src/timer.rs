// Cancellable deferred execution.
// Every piece of loop scheduling runs through a ScheduledTask so that a
// stop can synchronously guarantee no pending timer will fire afterwards.
// A late timer resurrecting a stopped loop is the worst failure mode in
// this engine.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskState {
    Pending,
    Cancelled,
    Fired,
}

struct Shared {
    state: Mutex<TaskState>,
    cond: Condvar,
}

/// One scheduled callback. `cancel` takes effect immediately: once it
/// returns, the callback either already ran or never will.
pub struct ScheduledTask {
    shared: Arc<Shared>,
}

impl ScheduledTask {
    /// Run `f` after `delay` unless cancelled first
    pub fn schedule<F>(name: &str, delay: Duration, f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let shared = Arc::new(Shared {
            state: Mutex::new(TaskState::Pending),
            cond: Condvar::new(),
        });
        let thread_shared = shared.clone();
        let thread_name = format!("lull-timer-{}", name);

        let spawned = thread::Builder::new().name(thread_name).spawn(move || {
            let deadline = Instant::now() + delay;
            let mut state = thread_shared.state.lock();
            loop {
                if *state != TaskState::Pending {
                    return;
                }
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                thread_shared.cond.wait_for(&mut state, deadline - now);
            }
            *state = TaskState::Fired;
            drop(state);
            f();
        });

        if let Err(e) = spawned {
            // Could not spawn the worker; mark the task dead rather than
            // leaving a timer that silently never fires while looking alive.
            log::error!("Failed to spawn timer thread: {}", e);
            *shared.state.lock() = TaskState::Cancelled;
        }

        Self { shared }
    }

    /// Cancel if still pending. A fired task stays fired.
    pub fn cancel(&self) {
        let mut state = self.shared.state.lock();
        if *state == TaskState::Pending {
            *state = TaskState::Cancelled;
            self.shared.cond.notify_all();
        }
    }

    pub fn is_pending(&self) -> bool {
        *self.shared.state.lock() == TaskState::Pending
    }

    pub fn has_fired(&self) -> bool {
        *self.shared.state.lock() == TaskState::Fired
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn fires_after_delay() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        let task = ScheduledTask::schedule("t", Duration::from_millis(20), move || {
            flag.store(true, Ordering::SeqCst);
        });

        assert!(task.is_pending());
        thread::sleep(Duration::from_millis(80));
        assert!(fired.load(Ordering::SeqCst));
        assert!(task.has_fired());
    }

    #[test]
    fn cancelled_task_never_fires() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        let task = ScheduledTask::schedule("t", Duration::from_millis(30), move || {
            flag.store(true, Ordering::SeqCst);
        });

        task.cancel();
        thread::sleep(Duration::from_millis(80));
        assert!(!fired.load(Ordering::SeqCst));
        assert!(!task.has_fired());
    }

    #[test]
    fn cancel_after_fire_is_a_no_op() {
        let task = ScheduledTask::schedule("t", Duration::from_millis(5), || {});
        thread::sleep(Duration::from_millis(50));
        task.cancel();
        assert!(task.has_fired());
    }

    #[test]
    fn drop_cancels_pending_task() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        {
            let _task = ScheduledTask::schedule("t", Duration::from_millis(30), move || {
                flag.store(true, Ordering::SeqCst);
            });
        }
        thread::sleep(Duration::from_millis(80));
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[test]
    fn zero_delay_fires_immediately() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        let _task = ScheduledTask::schedule("t", Duration::from_millis(0), move || {
            flag.store(true, Ordering::SeqCst);
        });
        thread::sleep(Duration::from_millis(50));
        assert!(fired.load(Ordering::SeqCst));
    }
}
