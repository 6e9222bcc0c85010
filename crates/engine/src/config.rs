// Engine tuning. The per-category fade and overlap values are empirical
// listening-test outcomes carried over as defaults, not derived constants;
// everything here is overridable.

use lull_core::SoundCategory;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Fade-in for tonal/rhythmic loop starts and one-shot starts
    pub fade_in_ms: u64,
    /// Discrete steps per fade ramp. 20 is the reference granularity:
    /// finer was not audibly smoother, coarser stepped audibly.
    pub fade_steps: u32,
    /// One-shot fade-out length, scheduled before the clip's natural end
    pub one_shot_fade_out_ms: u64,
    /// Fade applied to live instances by an explicit stop
    pub stop_fade_ms: u64,
    /// Overlap window for tonal/rhythmic categories (crossfaded)
    pub tonal_overlap_ms: u64,
    /// Overlap window for dense ambient textures (bare overlap, no fade;
    /// longer because there is no fade cue to hide the seam)
    pub ambient_overlap_ms: u64,
    /// Buffer past an instance's natural end before unloading it
    pub unload_grace_ms: u64,
    /// Keep-alive sweep interval
    pub keepalive_interval: Duration,
    /// Bounded duration polling for streamed clips
    pub duration_poll_attempts: u32,
    pub duration_poll_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fade_in_ms: 1000,
            fade_steps: 20,
            one_shot_fade_out_ms: 2000,
            stop_fade_ms: 1000,
            tonal_overlap_ms: 2000,
            ambient_overlap_ms: 3000,
            unload_grace_ms: 100,
            keepalive_interval: Duration::from_secs(30),
            duration_poll_attempts: 10,
            duration_poll_interval: Duration::from_millis(150),
        }
    }
}

impl EngineConfig {
    pub fn overlap_for(&self, category: SoundCategory) -> u64 {
        if category.is_dense_texture() {
            self.ambient_overlap_ms
        } else {
            self.tonal_overlap_ms
        }
    }

    /// Dense textures are never faded: the fade itself is audible as a dip
    /// in continuous broadband content.
    pub fn fades_for(&self, category: SoundCategory) -> bool {
        !category.is_dense_texture()
    }
}
