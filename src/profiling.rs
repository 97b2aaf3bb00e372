//! An explicit, optional profiling sink (spec §9: "model as an explicit, optional
//! sink ... no module-level state"), threaded through the call graph rather than kept
//! as process-wide global counters the way `original_source/main.c`'s profiler does.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Counts recoverable numerical fall-backs and accumulates per-stage timings for one
/// run. Cheap to share across `rayon` worker threads: every counter is a plain atomic,
/// so no lock is needed even though the remap's gradient reconstruction calls
/// [`Profiling::record_singular_gradient`] from inside a parallel iterator.
#[derive(Default)]
pub struct Profiling {
    singular_gradient_fallbacks: AtomicU64,
    lagrangian_nanos: AtomicU64,
    remap_nanos: AtomicU64,
}

impl Profiling {
    /// Records that a subcell's least-squares matrix was singular and the gradient
    /// fell back to zero (spec §7: "Locally recover ... counted and reported at
    /// end-of-run").
    pub fn record_singular_gradient(&self) {
        self.singular_gradient_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_lagrangian(&self, elapsed: Duration) {
        self.lagrangian_nanos
            .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
    }

    pub fn record_remap(&self, elapsed: Duration) {
        self.remap_nanos
            .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
    }

    pub fn singular_gradient_fallbacks(&self) -> u64 {
        self.singular_gradient_fallbacks.load(Ordering::Relaxed)
    }

    pub fn lagrangian_time(&self) -> Duration {
        Duration::from_nanos(self.lagrangian_nanos.load(Ordering::Relaxed))
    }

    pub fn remap_time(&self) -> Duration {
        Duration::from_nanos(self.remap_nanos.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::check;

    #[test]
    fn counters_accumulate() {
        let p = Profiling::default();
        p.record_singular_gradient();
        p.record_singular_gradient();
        check!(p.singular_gradient_fallbacks() == 2);
    }

    #[test]
    fn timings_accumulate_across_calls() {
        let p = Profiling::default();
        p.record_lagrangian(Duration::from_millis(10));
        p.record_lagrangian(Duration::from_millis(5));
        check!(p.lagrangian_time() == Duration::from_millis(15));
    }
}
