// Haptic pulse seam. Vibration hardware lives with the host platform, so
// the engine only carries the trait and a silent default; hosts inject
// their own implementation.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HapticIntensity {
    Light,
    Medium,
    Heavy,
}

pub trait HapticBackend: Send + Sync {
    fn pulse(&self, intensity: HapticIntensity);
}

/// Default backend for hosts without vibration hardware
pub struct NoopHaptics;

impl HapticBackend for NoopHaptics {
    fn pulse(&self, intensity: HapticIntensity) {
        log::trace!("[haptics] pulse {:?} (no-op)", intensity);
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use parking_lot::Mutex;

    /// Recording backend for tests
    pub struct RecordingHaptics {
        pub pulses: Mutex<Vec<HapticIntensity>>,
    }

    impl RecordingHaptics {
        pub fn new() -> Self {
            Self {
                pulses: Mutex::new(Vec::new()),
            }
        }
    }

    impl HapticBackend for RecordingHaptics {
        fn pulse(&self, intensity: HapticIntensity) {
            self.pulses.lock().push(intensity);
        }
    }
}
