//! The CPU/GPU dirty-state machine (spec.md §3 "Dirty state", §4.3
//! "Dirty-state machine"), grounded on `skyline::gpu::texture::Texture`'s
//! `SynchronizeHost`/`SynchronizeGuest` plus `dirty_tracking.h`'s
//! read-count/wait-time demotion heuristic.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

/// One of `{Clean, CpuDirty, GpuDirty}` (spec.md §3).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DirtyState {
    Clean,
    CpuDirty,
    GpuDirty,
}

/// Reads at or above this count, with at least [`DEMOTION_WAIT`]
/// accumulated waiting on GPU completion fences, demote a texture out of
/// GPU→guest tracking entirely (spec.md §4.3 "Guest-memory trapping").
const DEMOTION_READS: u32 = 6;
const DEMOTION_WAIT: Duration = Duration::from_millis(250);

/// Owns one host texture's dirty state plus the bookkeeping needed to
/// decide when guest reads have become expensive enough to demote
/// (spec.md §4.3). A texture starts `CpuDirty` (spec.md §3): nothing has
/// been uploaded to the GPU yet, so the first bind must synchronize.
pub struct DirtyTracker {
    state: Mutex<DirtyState>,
    reads: AtomicU32,
    accumulated_wait: Mutex<Duration>,
    demoted: AtomicBool,
}

impl Default for DirtyTracker {
    fn default() -> Self {
        DirtyTracker {
            state: Mutex::new(DirtyState::CpuDirty),
            reads: AtomicU32::new(0),
            accumulated_wait: Mutex::new(Duration::ZERO),
            demoted: AtomicBool::new(false),
        }
    }
}

impl DirtyTracker {
    pub fn state(&self) -> DirtyState {
        *self.state.lock()
    }

    pub fn is_demoted(&self) -> bool {
        self.demoted.load(Ordering::Acquire)
    }

    /// Guest write trap callback: moves straight to `CpuDirty` and returns
    /// immediately, never blocking (spec.md §4.3 "the write callback moves
    /// state to CpuDirty and returns immediately").
    pub fn mark_cpu_dirty(&self) {
        *self.state.lock() = DirtyState::CpuDirty;
    }

    /// Called after the GPU renders to this texture (render-target bind),
    /// scheduling a future guest read to synchronize back down. A no-op
    /// once the texture is demoted — demotion means the manager has given
    /// up on GPU→guest tracking (spec.md §4.3).
    pub fn mark_gpu_dirty(&self) {
        if !self.is_demoted() {
            *self.state.lock() = DirtyState::GpuDirty;
        }
    }

    /// Whether a host access (GPU bind/sample) needs `sync_to_host` run
    /// first, i.e. the texture is `CpuDirty`.
    pub fn needs_sync_to_host(&self) -> bool {
        self.state() == DirtyState::CpuDirty
    }

    /// Call once the CPU→GPU staging upload for a `CpuDirty` texture has
    /// been submitted: the texture is now `Clean`.
    pub fn sync_to_host_done(&self) {
        *self.state.lock() = DirtyState::Clean;
    }

    /// Whether a guest read needs `sync_to_guest` run first. Once demoted,
    /// this is always `false`: the manager stops maintaining GPU→guest sync
    /// (spec.md §4.3).
    pub fn needs_sync_to_guest(&self) -> bool {
        !self.is_demoted() && self.state() == DirtyState::GpuDirty
    }

    /// Records that a guest read just finished waiting `wait` on the
    /// texture's completion fence as part of a GPU→guest sync, and returns
    /// `true` exactly once: the call on which the demotion threshold is
    /// first crossed (spec.md §4.3: reads ≥ 6 and accumulated wait ≥
    /// 250ms). The caller is expected to perform one final writeback on
    /// that call before the texture stops being tracked.
    pub fn record_guest_read_wait(&self, wait: Duration) -> bool {
        if self.is_demoted() {
            return false;
        }
        let reads = self.reads.fetch_add(1, Ordering::AcqRel) + 1;
        let total = {
            let mut acc = self.accumulated_wait.lock();
            *acc += wait;
            *acc
        };
        if reads >= DEMOTION_READS && total >= DEMOTION_WAIT {
            self.demoted.store(true, Ordering::Release);
            true
        } else {
            false
        }
    }

    /// Completes a GPU→guest sync: the texture is now `Clean`.
    pub fn sync_to_guest_done(&self) {
        *self.state.lock() = DirtyState::Clean;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_cpu_dirty() {
        let tracker = DirtyTracker::default();
        assert_eq!(tracker.state(), DirtyState::CpuDirty);
        assert!(tracker.needs_sync_to_host());
    }

    #[test]
    fn write_always_moves_to_cpu_dirty() {
        let tracker = DirtyTracker::default();
        tracker.sync_to_host_done();
        tracker.mark_gpu_dirty();
        assert_eq!(tracker.state(), DirtyState::GpuDirty);
        tracker.mark_cpu_dirty();
        assert_eq!(tracker.state(), DirtyState::CpuDirty);
    }

    #[test]
    fn sync_to_host_transitions_clean() {
        let tracker = DirtyTracker::default();
        assert!(tracker.needs_sync_to_host());
        tracker.sync_to_host_done();
        assert_eq!(tracker.state(), DirtyState::Clean);
        assert!(!tracker.needs_sync_to_host());
    }

    #[test]
    fn gpu_dirty_needs_sync_to_guest_until_demoted() {
        let tracker = DirtyTracker::default();
        tracker.sync_to_host_done();
        tracker.mark_gpu_dirty();
        assert!(tracker.needs_sync_to_guest());
        tracker.sync_to_guest_done();
        assert!(!tracker.needs_sync_to_guest());
    }

    #[test]
    fn demotion_requires_both_read_count_and_wait_time() {
        let tracker = DirtyTracker::default();
        for _ in 0..5 {
            assert!(!tracker.record_guest_read_wait(Duration::from_millis(60)));
        }
        assert!(!tracker.is_demoted());
        // Sixth read pushes reads to 6 and accumulated wait to 360ms.
        assert!(tracker.record_guest_read_wait(Duration::from_millis(60)));
        assert!(tracker.is_demoted());
    }

    #[test]
    fn many_short_reads_never_demote_without_enough_wait_time() {
        let tracker = DirtyTracker::default();
        for _ in 0..20 {
            tracker.record_guest_read_wait(Duration::from_millis(1));
        }
        assert!(!tracker.is_demoted());
    }

    #[test]
    fn demoted_texture_stops_needing_guest_sync() {
        let tracker = DirtyTracker::default();
        tracker.sync_to_host_done();
        tracker.mark_gpu_dirty();
        for _ in 0..6 {
            tracker.record_guest_read_wait(Duration::from_millis(250));
        }
        assert!(tracker.is_demoted());
        tracker.mark_gpu_dirty();
        assert!(!tracker.needs_sync_to_guest());
    }
}
