//! Guest-memory trap manager (spec.md §4.2): a page-protection-based,
//! interval-indexed registry mapping guest address ranges to callback sets,
//! converting host page-fault notifications into precise read/write
//! callbacks with a lock-callback escape hatch so the manager's own mutex
//! is never held across a foreign lock acquisition.
//!
//! Grounded on `skyline::TrapManager` / `skyline::common::trap_manager.cpp`;
//! the aligned-recursive-range traversal itself lives in `interval-map` and
//! is reused as-is.

mod callback;
mod manager;
mod protection;

pub use callback::{CallbackEntry, LockCallback, TrapCallback};
pub use manager::{PageProtector, TrapError, TrapHandle, TrapManager};
pub use protection::{HostPageProtection, TrapProtection};

#[cfg(test)]
mod tests {
    use super::*;
    use address::{GuestAddress, GuestAddressRange};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct RecordingProtector {
        calls: Arc<Mutex<Vec<(GuestAddressRange, HostPageProtection)>>>,
    }

    impl RecordingProtector {
        fn new() -> Self {
            RecordingProtector { calls: Arc::new(Mutex::new(Vec::new())) }
        }

        fn calls_handle(&self) -> Arc<Mutex<Vec<(GuestAddressRange, HostPageProtection)>>> {
            self.calls.clone()
        }
    }

    impl PageProtector for RecordingProtector {
        fn protect(&self, range: GuestAddressRange, protection: HostPageProtection) {
            self.calls.lock().push((range, protection));
        }
    }

    fn addr(v: usize) -> GuestAddress {
        GuestAddress::new(v)
    }

    fn no_op_lock() -> LockCallback {
        Arc::new(|| {})
    }

    fn always_true() -> TrapCallback {
        Arc::new(|| true)
    }

    #[test]
    fn write_fault_invokes_on_write_once_and_demotes_to_none() {
        let manager = TrapManager::new(addr(0), RecordingProtector::new());
        let write_calls = Arc::new(AtomicU32::new(0));
        let write_calls2 = write_calls.clone();

        let handle = manager
            .create_trap(
                &[GuestAddressRange::from_start_end(addr(0x10000), addr(0x11000))],
                no_op_lock(),
                always_true(),
                Arc::new(move || {
                    write_calls2.fetch_add(1, Ordering::SeqCst);
                    true
                }),
            )
            .unwrap();
        manager.arm(handle, false).unwrap();

        let handled = manager.handle_fault(addr(0x10500), true).unwrap();
        assert!(handled);
        assert_eq!(write_calls.load(Ordering::SeqCst), 1);

        // A second write fault on the same page sees the group already
        // demoted to `None` and does not invoke the callback again.
        manager.handle_fault(addr(0x10600), true).unwrap();
        assert_eq!(write_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn read_fault_demotes_to_write_only() {
        let protector = RecordingProtector::new();
        let calls = protector.calls_handle();
        let manager = TrapManager::new(addr(0), protector);
        let read_calls = Arc::new(AtomicU32::new(0));
        let read_calls2 = read_calls.clone();

        let handle = manager
            .create_trap(
                &[GuestAddressRange::from_start_end(addr(0x20000), addr(0x21000))],
                no_op_lock(),
                Arc::new(move || {
                    read_calls2.fetch_add(1, Ordering::SeqCst);
                    true
                }),
                always_true(),
            )
            .unwrap();
        manager.arm(handle, false).unwrap();

        manager.handle_fault(addr(0x20000), false).unwrap();
        assert_eq!(read_calls.load(Ordering::SeqCst), 1);

        // The group is now `WriteOnly`: the page must still forbid writes so
        // the next guest write faults and marks the texture dirty, not get
        // upgraded to full read+write just because this one group read clean.
        let (_, permission) = *calls.lock().last().unwrap();
        assert_eq!(permission, HostPageProtection::READ_EXEC);
    }

    #[test]
    fn untracked_address_is_not_handled() {
        let manager = TrapManager::new(addr(0), RecordingProtector::new());
        assert!(!manager.handle_fault(addr(0x99999000), true).unwrap());
    }

    #[test]
    fn region_below_base_is_rejected() {
        let manager = TrapManager::new(addr(0x10000), RecordingProtector::new());
        let result = manager.create_trap(
            &[GuestAddressRange::from_start_end(addr(0x1000), addr(0x2000))],
            no_op_lock(),
            always_true(),
            always_true(),
        );
        assert!(matches!(result, Err(TrapError::BelowManagedBase(_))));
    }

    #[test]
    fn would_block_write_retries_via_lock_callback() {
        let manager = TrapManager::new(addr(0), RecordingProtector::new());
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts2 = attempts.clone();
        let lock_invocations = Arc::new(AtomicU32::new(0));
        let lock_invocations2 = lock_invocations.clone();

        let handle = manager
            .create_trap(
                &[GuestAddressRange::from_start_end(addr(0x30000), addr(0x31000))],
                Arc::new(move || {
                    lock_invocations2.fetch_add(1, Ordering::SeqCst);
                }),
                always_true(),
                Arc::new(move || attempts2.fetch_add(1, Ordering::SeqCst) >= 1),
            )
            .unwrap();
        manager.arm(handle, false).unwrap();

        let handled = manager.handle_fault(addr(0x30000), true).unwrap();
        assert!(handled);
        assert_eq!(lock_invocations.load(Ordering::SeqCst), 1);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn delete_trap_removes_group() {
        let manager = TrapManager::new(addr(0), RecordingProtector::new());
        let handle = manager
            .create_trap(
                &[GuestAddressRange::from_start_end(addr(0x40000), addr(0x41000))],
                no_op_lock(),
                always_true(),
                always_true(),
            )
            .unwrap();
        manager.arm(handle, true).unwrap();
        manager.delete_trap(handle).unwrap();
        assert!(!manager.handle_fault(addr(0x40000), true).unwrap());
    }
}
