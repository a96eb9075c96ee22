use collaborators::{GuestProcessController, GuestThreadId, RegisterSnapshot};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use threading::GuestThreadController;

/// Execution-side bookkeeping for one guest thread, layered on top of the
/// [`threading::GuestThread`] kernel object: which native thread backs it,
/// and the rendezvous point `spawn`/`invoke_in_guest` block on until the
/// thread reports a ready-rendezvous trap (spec.md §4.1 "spawn" invariant).
pub(crate) struct ThreadRuntime {
    pub(crate) os_id: GuestThreadId,
    rendezvous: Mutex<Option<RegisterSnapshot>>,
    rendezvous_signal: Condvar,
}

impl ThreadRuntime {
    pub(crate) fn new(os_id: GuestThreadId) -> Self {
        ThreadRuntime {
            os_id,
            rendezvous: Mutex::new(None),
            rendezvous_signal: Condvar::new(),
        }
    }

    /// Called from the trap dispatcher on a `ReadyRendezvous` trap: records
    /// the thread's register snapshot and wakes whoever is waiting on it.
    pub(crate) fn signal_rendezvous(&self, regs: RegisterSnapshot) {
        *self.rendezvous.lock() = Some(regs);
        self.rendezvous_signal.notify_all();
    }

    /// Blocks the calling (host) thread until this guest thread hits its
    /// next ready-rendezvous trap, returning the registers it trapped with.
    pub(crate) fn wait_for_rendezvous(&self) -> RegisterSnapshot {
        let mut slot = self.rendezvous.lock();
        loop {
            if let Some(regs) = slot.take() {
                return regs;
            }
            self.rendezvous_signal.wait(&mut slot);
        }
    }
}

/// Backs a [`threading::GuestThread`]'s [`GuestThreadController`] with the
/// real process-wide collaborator, so that e.g. `svcExitThread`'s call to
/// `GuestThread::request_exit` actually tears down the native thread
/// (spec.md §9: explicit collaborator ports instead of a dispatch
/// singleton).
pub(crate) struct ThreadControllerShim<P: GuestProcessController> {
    pub(crate) controller: Arc<P>,
    pub(crate) os_id: GuestThreadId,
}

impl<P: GuestProcessController> GuestThreadController for ThreadControllerShim<P> {
    fn request_pause(&self) {
        self.controller.pause(self.os_id);
    }

    fn request_resume(&self) {
        self.controller.resume(self.os_id);
    }

    fn request_exit(&self) {
        self.controller.kill(self.os_id);
    }
}
