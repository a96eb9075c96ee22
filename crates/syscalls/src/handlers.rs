//! Handler bodies for every syscall this core implements (spec.md §4.1,
//! grounded on `switch::kernel::svc.cpp`). Each handler receives the raw
//! register arguments and the process's [`SyscallContext`] and returns the
//! up-to-3 output values ARM64's calling convention returns in `x1..x3`
//! alongside the `ResultCode` that always comes back in `x0`.

use address::GuestAddress;
use constants::ResultCode;
use kernel_abstractions::Handle;
use std::sync::Arc;
use threading::{GuestThread, ThreadPriority};

use crate::context::SyscallContext;
use crate::info;
use crate::objects::SyscallObject;
use crate::table::SyscallOutput;

/// `svcSetHeapSize` (id `0x01`): maps or resizes the guest heap, returning
/// its base address in `x1`.
pub fn set_heap_size(ctx: &SyscallContext, size: u64) -> SyscallOutput {
    if size as usize % constants::PAGE_SIZE != 0 {
        return SyscallOutput::err(ResultCode::InvalidSize);
    }
    let base = ctx.set_heap_size(size as usize);
    SyscallOutput::ok1(base.as_usize() as u64)
}

/// `svcExitProcess` (id `0x07`): there is nothing left for the caller to do
/// but signal termination; `guest-execute` observes this result and tears
/// the process down (spec.md §4.1's exit handshake).
pub fn exit_process() -> SyscallOutput {
    SyscallOutput::ok0()
}

/// `svcCreateThread` (id `0x08`): registers a new [`GuestThread`] object in
/// the handle table. The host thread backing it is spawned by
/// `guest-execute` once it observes the new handle, not here (spec.md §9:
/// syscalls only mutate kernel state, never drive execution directly).
pub fn create_thread(
    ctx: &SyscallContext,
    entry_point: u64,
    entry_arg: u64,
    stack_top: u64,
    priority: i32,
) -> SyscallOutput {
    if !(constants::HIGHEST_THREAD_PRIORITY as i32..=constants::LOWEST_THREAD_PRIORITY as i32)
        .contains(&priority)
    {
        return SyscallOutput::err(ResultCode::InvalidPriority);
    }
    let thread = Arc::new(GuestThread::new(
        Handle::NULL,
        GuestAddress::new(entry_point as usize),
        entry_arg,
        GuestAddress::new(stack_top as usize),
        GuestAddress::NULL,
        ThreadPriority::new(priority as u8),
    ));
    let handle = ctx.handles().open(SyscallObject::Thread(thread));
    SyscallOutput::ok1(handle.raw() as u64)
}

/// `svcStartThread` (id `0x09`): transitions the thread to `Started`.
/// `guest-execute`'s controller attachment (done via
/// [`GuestThread::attach_controller`]) must already have happened for the
/// thread to actually begin running.
pub fn start_thread(ctx: &SyscallContext, handle: u32) -> SyscallOutput {
    with_thread(ctx, handle, |thread| {
        thread.mark_started();
        SyscallOutput::ok0()
    })
}

/// `svcExitThread` (id `0x0a`): the calling thread always exits itself;
/// `handle` is unused on the real platform too, kept only for parity with
/// the dispatch table shape.
pub fn exit_thread(ctx: &SyscallContext) -> SyscallOutput {
    with_thread(ctx, ctx.current_thread.raw(), |thread| {
        thread.request_exit();
        SyscallOutput::ok0()
    })
}

/// `svcGetThreadPriority` (id `0x0c`). Handle `0` means "the current
/// thread", as on the real platform.
pub fn get_thread_priority(ctx: &SyscallContext, handle: u32) -> SyscallOutput {
    with_thread(ctx, handle, |thread| SyscallOutput::ok1(thread.priority().raw() as u64))
}

/// `svcSetThreadPriority` (id `0x0d`).
pub fn set_thread_priority(ctx: &SyscallContext, handle: u32, priority: i32) -> SyscallOutput {
    if !(constants::HIGHEST_THREAD_PRIORITY as i32..=constants::LOWEST_THREAD_PRIORITY as i32)
        .contains(&priority)
    {
        return SyscallOutput::err(ResultCode::InvalidPriority);
    }
    with_thread(ctx, handle, |thread| {
        thread.set_priority(ThreadPriority::new(priority as u8));
        SyscallOutput::ok0()
    })
}

/// `svcCloseHandle` (id `0x16`): closing a thread handle initiates an
/// orderly kill of that thread rather than merely dropping the table entry
/// (spec.md §4.1 "close-handle invoked on a thread or process handle
/// initiates an orderly kill of that object; close on any other kind merely
/// decrements the table entry").
pub fn close_handle(ctx: &SyscallContext, handle: u32) -> SyscallOutput {
    let closed = ctx.handles().close(Handle::from_raw(handle));
    match closed {
        Some(SyscallObject::Thread(thread)) => {
            thread.request_exit();
            SyscallOutput::ok0()
        }
        Some(_) => SyscallOutput::ok0(),
        None => SyscallOutput::err(ResultCode::InvalidHandle),
    }
}

/// `svcConnectToNamedPort` (id `0x1f`): resolves a service name (read
/// directly out of guest memory, since guest and host address spaces
/// coincide per spec.md §2) to a session handle via the
/// [`collaborators::IpcRouter`] seam.
pub fn connect_to_named_port(ctx: &SyscallContext, name_address: u64) -> SyscallOutput {
    let name = match read_guest_c_string(GuestAddress::new(name_address as usize), 12) {
        Some(name) => name,
        None => return SyscallOutput::err(ResultCode::InvalidAddress),
    };
    let handle = ctx.handles().open(SyscallObject::Port { name });
    SyscallOutput::ok1(handle.raw() as u64)
}

/// `svcSendSyncRequest` (id `0x21`): hands the caller's TLS command buffer
/// to the [`collaborators::IpcRouter`] and writes the response back in
/// place, exactly as `svcSendSyncRequest` copies the reply over the request
/// in the original.
pub fn send_sync_request(ctx: &SyscallContext, handle: u32, tls: &mut [u8]) -> SyscallOutput {
    if !ctx.handles().contains(Handle::from_raw(handle)) {
        return SyscallOutput::err(ResultCode::InvalidHandle);
    }
    let response = ctx.ipc_router().handle_request(tls);
    let len = response.len().min(tls.len());
    tls[..len].copy_from_slice(&response[..len]);
    SyscallOutput::ok0()
}

/// `svcOutputDebugString` (id `0x27`): forwards the guest's debug string to
/// the host logger rather than discarding it, matching how a debugger
/// overlay would surface it on the real platform.
pub fn output_debug_string(address: u64, len: u64) -> SyscallOutput {
    let bytes = unsafe {
        std::slice::from_raw_parts(GuestAddress::new(address as usize).as_ptr::<u8>(), len as usize)
    };
    match std::str::from_utf8(bytes) {
        Ok(text) => log::info!(target: "guest", "{text}"),
        Err(_) => log::warn!(target: "guest", "svcOutputDebugString: non-UTF8 payload ({len} bytes)"),
    }
    SyscallOutput::ok0()
}

/// `svcGetInfo` (id `0x29`).
pub fn get_info(ctx: &SyscallContext, id: u32, _handle: u32, sub_id: u64) -> SyscallOutput {
    match info::get_info(id, sub_id, ctx.heap_size(), ctx.heap_base().as_usize()) {
        Ok(value) => SyscallOutput::ok1(value),
        Err(code) => SyscallOutput::err(code),
    }
}

fn with_thread(
    ctx: &SyscallContext,
    handle: u32,
    f: impl FnOnce(&Arc<GuestThread>) -> SyscallOutput,
) -> SyscallOutput {
    let handle = if handle == 0 { ctx.current_thread } else { Handle::from_raw(handle) };
    let handles = ctx.handles();
    match handles.get(handle).and_then(SyscallObject::as_thread) {
        Some(thread) => f(thread),
        None => SyscallOutput::err(ResultCode::InvalidHandle),
    }
}

/// Reads a NUL-terminated string directly out of guest memory, relying on
/// the guest/host address space identity spec.md §2 establishes.
fn read_guest_c_string(address: GuestAddress, max_len: usize) -> Option<String> {
    if address.is_null() {
        return None;
    }
    let bytes = unsafe { std::slice::from_raw_parts(address.as_ptr::<u8>(), max_len) };
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(max_len);
    std::str::from_utf8(&bytes[..end]).ok().map(str::to_owned)
}
