use kernel_abstractions::Handle;
use thiserror::Error;

/// Failures that are fatal to the whole guest process (spec.md §4.1
/// "Failure semantics": unclassified trap opcodes, unknown syscall ids, and
/// trap-read failures all terminate the process rather than returning a
/// guest-visible error code).
#[derive(Debug, Error)]
pub enum FatalTrapError {
    #[error("unclassified trap opcode immediate {imm:#x} on thread {handle:?}")]
    UnclassifiedOpcode { handle: Handle, imm: u16 },

    #[error("syscall id {id:#x} has no handler in the dispatch table (thread {handle:?})")]
    UnknownSyscall { handle: Handle, id: u16 },

    #[error("thread {0:?} is not registered with this executor")]
    UnknownThread(Handle),
}
