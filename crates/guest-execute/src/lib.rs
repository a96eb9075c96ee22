//! Guest execution: runs guest threads and dispatches the traps they raise
//! (spec.md §4.1, grounded on `kernel::trap::user_trap_handler_async`'s
//! decode-dispatch-writeback shape, adapted from an async per-task handler
//! to a synchronous process-wide dispatcher since this core has no
//! scheduler of its own to yield back to).

mod error;
mod executor;
mod opcode;
mod runtime;

pub use error::FatalTrapError;
pub use executor::GuestExecutor;
pub use opcode::{decode, TrapKind};

#[cfg(test)]
mod tests {
    use super::*;
    use address::GuestAddress;
    use collaborators::{GuestAddressSpace, GuestProcessController, GuestThreadId, IpcRouter, RegisterSnapshot};
    use kernel_abstractions::Handle;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use syscalls::SyscallContext;
    use threading::{GuestThread, ThreadPriority};

    struct FakeController {
        next_id: AtomicU64,
        regs: Mutex<HashMap<GuestThreadId, RegisterSnapshot>>,
        next_imm: Mutex<u16>,
        killed: Mutex<Vec<GuestThreadId>>,
    }

    impl FakeController {
        fn new() -> Self {
            FakeController {
                next_id: AtomicU64::new(1),
                regs: Mutex::new(HashMap::new()),
                next_imm: Mutex::new(0xff),
                killed: Mutex::new(Vec::new()),
            }
        }

        fn set_next_imm(&self, imm: u16) {
            *self.next_imm.lock() = imm;
        }
    }

    impl GuestProcessController for FakeController {
        fn spawn(&self, _entry: GuestAddress, _stack_top: GuestAddress, _priority: u8) -> GuestThreadId {
            GuestThreadId(self.next_id.fetch_add(1, Ordering::SeqCst))
        }

        fn kill(&self, tid: GuestThreadId) {
            self.killed.lock().push(tid);
        }

        fn pause(&self, _tid: GuestThreadId) {}
        fn resume(&self, _tid: GuestThreadId) {}

        fn read_regs(&self, tid: GuestThreadId) -> RegisterSnapshot {
            self.regs.lock().get(&tid).copied().unwrap_or_default()
        }

        fn write_regs(&self, tid: GuestThreadId, regs: &RegisterSnapshot) {
            self.regs.lock().insert(tid, *regs);
        }

        fn read_break_imm(&self, _pc: GuestAddress) -> u16 {
            *self.next_imm.lock()
        }
    }

    struct FakeAddressSpace;
    impl GuestAddressSpace for FakeAddressSpace {
        fn set_heap_size(&self, _size: usize) -> GuestAddress {
            GuestAddress::new(0x8000_0000)
        }
    }

    struct FakeIpcRouter;
    impl IpcRouter for FakeIpcRouter {
        fn handle_request(&self, request: &[u8]) -> Vec<u8> {
            request.to_vec()
        }
    }

    fn test_executor() -> GuestExecutor<FakeController> {
        let ctx = Arc::new(SyscallContext::new(
            Handle::NULL,
            Arc::new(FakeAddressSpace),
            Arc::new(FakeIpcRouter),
        ));
        GuestExecutor::new(Arc::new(FakeController::new()), ctx)
    }

    fn registered_thread(executor: &GuestExecutor<FakeController>, tls: GuestAddress) -> Handle {
        let thread = Arc::new(GuestThread::new(
            Handle::NULL,
            GuestAddress::new(0x8000_0000),
            0,
            GuestAddress::new(0x7000_0000),
            tls,
            ThreadPriority::default(),
        ));
        executor.register_for_test(thread, GuestThreadId(99))
    }

    #[test]
    fn tls_register_read_trap_writes_tls_address_and_advances_pc() {
        let executor = test_executor();
        let tls = GuestAddress::new(0x6000_0000);
        let handle = registered_thread(&executor, tls);

        let mut regs = RegisterSnapshot::zeroed();
        regs.pc = 0x8000_0000;
        executor.write_regs(handle, &regs).unwrap();

        executor.controller_for_test().set_next_imm(0x80);
        executor.handle_trap(handle).unwrap();

        let after = executor.read_regs(handle).unwrap();
        assert_eq!(after.x[0], tls.as_usize() as u64);
        assert_eq!(after.pc, 0x8000_0004);
    }

    #[test]
    fn fatal_opcode_returns_error_without_panicking() {
        let executor = test_executor();
        let handle = registered_thread(&executor, GuestAddress::new(0x6000_0000));

        executor.controller_for_test().set_next_imm(0xaa);
        let result = executor.handle_trap(handle);
        assert!(matches!(result, Err(FatalTrapError::UnclassifiedOpcode { imm: 0xaa, .. })));
    }

    #[test]
    fn unknown_thread_is_reported_not_panicked() {
        let executor = test_executor();
        let result = executor.handle_trap(Handle::from_raw(0xdead));
        assert!(matches!(result, Err(FatalTrapError::UnknownThread(_))));
    }

    #[test]
    fn svc_id_with_no_table_entry_is_fatal() {
        let executor = test_executor();
        let handle = registered_thread(&executor, GuestAddress::new(0x6000_0000));

        executor.controller_for_test().set_next_imm(0x02);
        let result = executor.handle_trap(handle);
        assert!(matches!(result, Err(FatalTrapError::UnknownSyscall { id: 0x02, .. })));
    }
}
