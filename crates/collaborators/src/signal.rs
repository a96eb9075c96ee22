use address::GuestAddress;
use std::sync::Arc;

/// A host page-fault notification: `true` if the fault is already handled
/// and the faulting instruction should be retried, `false` if it should
/// propagate as fatal (spec.md §6 "Signal installer").
pub type FaultHandler = Arc<dyn Fn(GuestAddress, bool) -> bool + Send + Sync>;

/// Installs a single global handler that the host's SIGSEGV (or equivalent)
/// handler calls for every guest-region page fault. Exactly one handler may
/// be installed at a time; re-installing replaces it.
///
/// This is the one deliberately-global seam spec.md §9 calls out ("the OS
/// signal table requires it") — everywhere else in this workspace avoids a
/// static mutable singleton in favor of an explicit collaborator parameter.
pub trait SignalInstaller: Send + Sync {
    fn install(&self, handler: FaultHandler);
}
