//! The concrete kernel object kinds a guest process's handle table can hold
//! (spec.md §4.1, grounded on `KObjectType` / the `KProcess`/`KThread`
//! hierarchy). The original dispatches on a runtime type tag; here the same
//! idea is an enum, since every kind this core actually implements is known
//! up front and `kernel-abstractions::KernelObject` only asks for a name.

use kernel_abstractions::KernelObject;
use std::sync::Arc;
use threading::GuestThread;

/// Everything that can be registered in a guest process's handle table.
/// Sessions and ports are opaque u64 session ids handed to the
/// [`collaborators::IpcRouter`](collaborators::IpcRouter); this core does
/// not itself implement any service (spec.md §1).
#[derive(Debug, Clone)]
pub enum SyscallObject {
    Thread(Arc<GuestThread>),
    Session { session_id: u64 },
    Port { name: String },
}

impl KernelObject for SyscallObject {
    fn type_name(&self) -> &'static str {
        match self {
            SyscallObject::Thread(_) => "Thread",
            SyscallObject::Session { .. } => "Session",
            SyscallObject::Port { .. } => "Port",
        }
    }
}

impl SyscallObject {
    pub fn as_thread(&self) -> Option<&Arc<GuestThread>> {
        match self {
            SyscallObject::Thread(thread) => Some(thread),
            _ => None,
        }
    }
}
