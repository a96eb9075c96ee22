/// The IPC service router (spec.md §6): synchronously turns a guest TLS
/// command buffer into a response command buffer. Every concrete service
/// (filesystem, audio, HID, ...) is a thin syscall-shaped stub behind this
/// one seam — none of them are in scope here (spec.md §1 "Deliberately
/// excluded").
pub trait IpcRouter: Send + Sync {
    fn handle_request(&self, request: &[u8]) -> Vec<u8>;
}
