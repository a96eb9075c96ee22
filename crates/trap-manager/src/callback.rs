use crate::TrapProtection;
use std::sync::Arc;

/// Invoked by the manager when a read or write callback reports it would
/// block; acquires whatever resource lock the callback needs so the retry
/// can make progress, without the manager's own mutex held (spec.md §4.2
/// "Ordering & reentry").
pub type LockCallback = Arc<dyn Fn() + Send + Sync>;

/// A read or write notification. Returns `true` if it completed without
/// blocking; `false` ("would block") tells the manager to invoke the
/// group's [`LockCallback`] and restart the fault-handling pass.
pub type TrapCallback = Arc<dyn Fn() -> bool + Send + Sync>;

/// The callback triple plus current protection level owned by one trap
/// group (spec.md §3 "Trap group", grounded on `skyline::CallbackEntry`).
#[derive(Clone)]
pub struct CallbackEntry {
    pub(crate) protection: TrapProtection,
    pub(crate) lock: LockCallback,
    pub(crate) on_read: TrapCallback,
    pub(crate) on_write: TrapCallback,
}

impl CallbackEntry {
    pub fn new(lock: LockCallback, on_read: TrapCallback, on_write: TrapCallback) -> Self {
        CallbackEntry {
            protection: TrapProtection::None,
            lock,
            on_read,
            on_write,
        }
    }

    pub fn protection(&self) -> TrapProtection {
        self.protection
    }
}
