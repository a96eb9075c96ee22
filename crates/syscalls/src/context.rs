//! Per-process syscall state (spec.md §4.1, grounded on `KProcess`): the
//! handle table, current heap mapping, and the collaborators syscall
//! handlers call out to. `guest-execute` owns one of these per guest
//! process and hands it to [`crate::table::SyscallTable::dispatch`] on every
//! trap.

use address::GuestAddress;
use collaborators::{GuestAddressSpace, IpcRouter};
use kernel_abstractions::{Handle, HandleTable};
use parking_lot::Mutex;
use std::sync::Arc;

use crate::objects::SyscallObject;

struct HeapState {
    base: GuestAddress,
    size: usize,
}

/// Everything a syscall handler needs: the handle table it allocates
/// objects into, the current thread's own handle (so e.g.
/// `svcGetThreadPriority(0)` can mean "this thread"), and the collaborators
/// that actually perform host-side work.
pub struct SyscallContext {
    pub current_thread: Handle,
    handles: Mutex<HandleTable<SyscallObject>>,
    heap: Mutex<HeapState>,
    address_space: Arc<dyn GuestAddressSpace>,
    ipc_router: Arc<dyn IpcRouter>,
}

impl SyscallContext {
    pub fn new(
        current_thread: Handle,
        address_space: Arc<dyn GuestAddressSpace>,
        ipc_router: Arc<dyn IpcRouter>,
    ) -> Self {
        SyscallContext {
            current_thread,
            handles: Mutex::new(HandleTable::new()),
            heap: Mutex::new(HeapState { base: GuestAddress::NULL, size: 0 }),
            address_space,
            ipc_router,
        }
    }

    pub fn handles(&self) -> parking_lot::MutexGuard<'_, HandleTable<SyscallObject>> {
        self.handles.lock()
    }

    pub fn heap_base(&self) -> GuestAddress {
        self.heap.lock().base
    }

    pub fn heap_size(&self) -> usize {
        self.heap.lock().size
    }

    /// Backs `svcSetHeapSize` (spec.md §8 Scenario E): asks the
    /// [`GuestAddressSpace`] collaborator to (re-)map the heap and records
    /// the resulting base for subsequent `svcGetInfo` queries.
    pub fn set_heap_size(&self, size: usize) -> GuestAddress {
        let base = self.address_space.set_heap_size(size);
        let mut heap = self.heap.lock();
        heap.base = base;
        heap.size = size;
        base
    }

    pub fn ipc_router(&self) -> &Arc<dyn IpcRouter> {
        &self.ipc_router
    }
}
