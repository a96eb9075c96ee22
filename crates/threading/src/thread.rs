use crate::ThreadPriority;
use address::GuestAddress;
use kernel_abstractions::{Handle, KernelObject};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;

/// Lifecycle state of a guest thread, generalizing
/// `KProcess::process_state_t` to apply per-thread rather than per-process.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum GuestThreadState {
    Created,
    Started,
    Paused,
    Exiting,
    Exited,
}

/// The operations a guest-execution backend must provide so the rest of the
/// kernel can control a thread's host execution without depending on
/// `guest-execute` directly (spec.md §9: explicit collaborator ports instead
/// of a global dispatch singleton).
pub trait GuestThreadController: Send + Sync {
    /// Requests that the thread stop running guest code at its next trap
    /// opportunity and block until resumed.
    fn request_pause(&self);

    /// Wakes a thread blocked by a prior `request_pause`.
    fn request_resume(&self);

    /// Requests that the thread unwind its guest execution loop and exit.
    fn request_exit(&self);
}

/// The kernel's bookkeeping for one guest thread (spec.md §4.1, grounded on
/// `KThread`). Actually running the thread's guest code is the
/// `guest-execute` crate's job; this struct is the state `kernel-abstractions`
/// objects and syscalls read and mutate.
#[derive(Debug)]
pub struct GuestThread {
    pub handle: Handle,
    pub entry_point: GuestAddress,
    pub entry_arg: u64,
    pub stack_top: GuestAddress,
    pub tls: GuestAddress,
    priority: Mutex<ThreadPriority>,
    state: Mutex<GuestThreadState>,
    state_changed: Condvar,
    controller: Mutex<Option<Arc<dyn GuestThreadController>>>,
}

impl GuestThread {
    pub fn new(
        handle: Handle,
        entry_point: GuestAddress,
        entry_arg: u64,
        stack_top: GuestAddress,
        tls: GuestAddress,
        priority: ThreadPriority,
    ) -> Self {
        GuestThread {
            handle,
            entry_point,
            entry_arg,
            stack_top,
            tls,
            priority: Mutex::new(priority),
            state: Mutex::new(GuestThreadState::Created),
            state_changed: Condvar::new(),
            controller: Mutex::new(None),
        }
    }

    /// Attaches the backend that will actually run this thread's guest code.
    /// Called once by `guest-execute` right after the host thread is spawned.
    pub fn attach_controller(&self, controller: Arc<dyn GuestThreadController>) {
        *self.controller.lock() = Some(controller);
    }

    pub fn priority(&self) -> ThreadPriority {
        *self.priority.lock()
    }

    pub fn set_priority(&self, priority: ThreadPriority) {
        *self.priority.lock() = priority;
    }

    pub fn state(&self) -> GuestThreadState {
        *self.state.lock()
    }

    pub fn mark_started(&self) {
        let mut state = self.state.lock();
        *state = GuestThreadState::Started;
        self.state_changed.notify_all();
    }

    pub fn mark_exited(&self) {
        let mut state = self.state.lock();
        *state = GuestThreadState::Exited;
        self.state_changed.notify_all();
    }

    /// Requests the backend pause this thread and blocks the calling thread
    /// (a different guest thread, typically) until it reports back paused.
    pub fn pause(&self) {
        {
            let mut state = self.state.lock();
            if *state != GuestThreadState::Started {
                return;
            }
            *state = GuestThreadState::Paused;
        }
        if let Some(controller) = self.controller.lock().as_ref() {
            controller.request_pause();
        }
    }

    pub fn resume(&self) {
        {
            let mut state = self.state.lock();
            if *state != GuestThreadState::Paused {
                return;
            }
            *state = GuestThreadState::Started;
            self.state_changed.notify_all();
        }
        if let Some(controller) = self.controller.lock().as_ref() {
            controller.request_resume();
        }
    }

    pub fn request_exit(&self) {
        {
            let mut state = self.state.lock();
            *state = GuestThreadState::Exiting;
            self.state_changed.notify_all();
        }
        if let Some(controller) = self.controller.lock().as_ref() {
            controller.request_exit();
        }
    }

    /// Blocks the calling (host) thread until this guest thread leaves the
    /// `Paused` state. Called from within the guest execution loop itself,
    /// on the thread being paused.
    pub fn wait_while_paused(&self) {
        let mut state = self.state.lock();
        while *state == GuestThreadState::Paused {
            self.state_changed.wait(&mut state);
        }
    }
}

impl KernelObject for GuestThread {
    fn type_name(&self) -> &'static str {
        "GuestThread"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(v: usize) -> GuestAddress {
        GuestAddress::new(v)
    }

    #[test]
    fn new_thread_starts_created() {
        let thread = GuestThread::new(
            Handle::from_raw(1),
            addr(0x8000_0000),
            0,
            addr(0x7000_0000),
            addr(0x7100_0000),
            ThreadPriority::default(),
        );
        assert_eq!(thread.state(), GuestThreadState::Created);
    }

    #[test]
    fn pause_without_controller_still_updates_state() {
        let thread = GuestThread::new(
            Handle::from_raw(1),
            addr(0x8000_0000),
            0,
            addr(0x7000_0000),
            addr(0x7100_0000),
            ThreadPriority::default(),
        );
        thread.mark_started();
        thread.pause();
        assert_eq!(thread.state(), GuestThreadState::Paused);
        thread.resume();
        assert_eq!(thread.state(), GuestThreadState::Started);
    }

    #[test]
    fn priority_roundtrip() {
        let thread = GuestThread::new(
            Handle::from_raw(1),
            addr(0),
            0,
            addr(0),
            addr(0),
            ThreadPriority::default(),
        );
        thread.set_priority(ThreadPriority::new(5));
        assert_eq!(thread.priority().raw(), 5);
    }
}
