//! The syscall dispatch table (spec.md §4.1, grounded on
//! `switch::kernel::svc.h`'s `svcTable`): maps the trap opcode's 16-bit
//! immediate to a handler. Real SVC ids from the source platform are kept
//! verbatim so a guest binary's `svc` instructions need no translation.

use constants::ResultCode;

use crate::context::SyscallContext;
use crate::handlers;

pub const SVC_SET_HEAP_SIZE: u16 = 0x01;
pub const SVC_EXIT_PROCESS: u16 = 0x07;
pub const SVC_CREATE_THREAD: u16 = 0x08;
pub const SVC_START_THREAD: u16 = 0x09;
pub const SVC_EXIT_THREAD: u16 = 0x0a;
pub const SVC_GET_THREAD_PRIORITY: u16 = 0x0c;
pub const SVC_SET_THREAD_PRIORITY: u16 = 0x0d;
pub const SVC_CLOSE_HANDLE: u16 = 0x16;
pub const SVC_CONNECT_TO_NAMED_PORT: u16 = 0x1f;
pub const SVC_SEND_SYNC_REQUEST: u16 = 0x21;
pub const SVC_OUTPUT_DEBUG_STRING: u16 = 0x27;
pub const SVC_GET_INFO: u16 = 0x29;

/// The `x0..x3` a syscall handler hands back to the guest: a [`ResultCode`]
/// always in `x0`, and up to three further output registers.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct SyscallOutput {
    pub result: ResultCode,
    pub values: [u64; 3],
}

impl SyscallOutput {
    pub fn ok0() -> Self {
        SyscallOutput { result: ResultCode::SUCCESS, values: [0; 3] }
    }

    pub fn ok1(v0: u64) -> Self {
        SyscallOutput { result: ResultCode::SUCCESS, values: [v0, 0, 0] }
    }

    pub fn err(result: ResultCode) -> Self {
        SyscallOutput { result, values: [0; 3] }
    }
}

/// The raw `x0..x7` argument registers a trapped `svc` instruction's
/// dispatcher hands to [`dispatch`], in the ARM64 syscall calling
/// convention's order.
#[derive(Clone, Copy, Default, Debug)]
pub struct SyscallArgs(pub [u64; 8]);

/// Looks up and invokes the handler for `svc_id` against `ctx`, decoding
/// `args` the way each individual handler's real signature expects.
/// `tls` is the caller's command-buffer scratch space, needed only by
/// `svcSendSyncRequest`.
///
/// Returns `Err(svc_id)` for any id this dense table has no entry for —
/// spec.md §4.1 "Syscall table": "A missing handler is a fatal error
/// carrying the id", distinct from `svcGetInfo`'s own guest-visible
/// "unimplemented" result code for an unknown *query* id.
pub fn dispatch(svc_id: u16, args: SyscallArgs, ctx: &SyscallContext, tls: &mut [u8]) -> Result<SyscallOutput, u16> {
    let a = args.0;
    Ok(match svc_id {
        SVC_SET_HEAP_SIZE => handlers::set_heap_size(ctx, a[0]),
        SVC_EXIT_PROCESS => handlers::exit_process(),
        SVC_CREATE_THREAD => {
            handlers::create_thread(ctx, a[0], a[1], a[2], a[3] as i32)
        }
        SVC_START_THREAD => handlers::start_thread(ctx, a[0] as u32),
        SVC_EXIT_THREAD => handlers::exit_thread(ctx),
        SVC_GET_THREAD_PRIORITY => handlers::get_thread_priority(ctx, a[0] as u32),
        SVC_SET_THREAD_PRIORITY => handlers::set_thread_priority(ctx, a[0] as u32, a[1] as i32),
        SVC_CLOSE_HANDLE => handlers::close_handle(ctx, a[0] as u32),
        SVC_CONNECT_TO_NAMED_PORT => handlers::connect_to_named_port(ctx, a[0]),
        SVC_SEND_SYNC_REQUEST => handlers::send_sync_request(ctx, a[0] as u32, tls),
        SVC_OUTPUT_DEBUG_STRING => handlers::output_debug_string(a[0], a[1]),
        SVC_GET_INFO => handlers::get_info(ctx, a[0] as u32, a[1] as u32, a[2]),
        _ => return Err(svc_id),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::SyscallObject;
    use crate::tests_support::{test_context, test_handle};

    #[test]
    fn unknown_svc_is_a_fatal_missing_handler() {
        let ctx = test_context();
        let err = dispatch(0x7f, SyscallArgs::default(), &ctx, &mut []).unwrap_err();
        assert_eq!(err, 0x7f);
    }

    #[test]
    fn set_heap_size_then_get_info_roundtrip() {
        let ctx = test_context();
        let mut args = SyscallArgs::default();
        args.0[0] = 0x2000;
        let set = dispatch(SVC_SET_HEAP_SIZE, args, &ctx, &mut []).unwrap();
        assert_eq!(set.result, ResultCode::SUCCESS);

        let mut info_args = SyscallArgs::default();
        info_args.0[0] = crate::info::InfoId::HeapRegionSize as u64;
        let info_out = dispatch(SVC_GET_INFO, info_args, &ctx, &mut []).unwrap();
        assert_eq!(info_out.values[0], 0x2000);
    }

    #[test]
    fn create_start_get_priority_roundtrip() {
        let ctx = test_context();
        let mut create_args = SyscallArgs::default();
        create_args.0[3] = 10;
        let created = dispatch(SVC_CREATE_THREAD, create_args, &ctx, &mut []).unwrap();
        assert_eq!(created.result, ResultCode::SUCCESS);
        let handle = created.values[0] as u32;

        let mut start_args = SyscallArgs::default();
        start_args.0[0] = handle as u64;
        let started = dispatch(SVC_START_THREAD, start_args, &ctx, &mut []).unwrap();
        assert_eq!(started.result, ResultCode::SUCCESS);

        let mut prio_args = SyscallArgs::default();
        prio_args.0[0] = handle as u64;
        let prio = dispatch(SVC_GET_THREAD_PRIORITY, prio_args, &ctx, &mut []).unwrap();
        assert_eq!(prio.values[0], 10);
    }

    #[test]
    fn close_unknown_handle_is_invalid() {
        let ctx = test_context();
        let mut args = SyscallArgs::default();
        args.0[0] = test_handle(&ctx, SyscallObject::Port { name: "dummy".into() }).raw() as u64 + 1;
        let out = dispatch(SVC_CLOSE_HANDLE, args, &ctx, &mut []).unwrap();
        assert_eq!(out.result, ResultCode::InvalidHandle);
    }

    #[test]
    fn close_handle_on_a_thread_initiates_an_orderly_kill() {
        use threading::GuestThreadState;

        let ctx = test_context();
        let mut create_args = SyscallArgs::default();
        create_args.0[3] = 10;
        let created = dispatch(SVC_CREATE_THREAD, create_args, &ctx, &mut []).unwrap();
        let handle = created.values[0] as u32;

        let thread = match ctx.handles().get(kernel_abstractions::Handle::from_raw(handle)) {
            Some(SyscallObject::Thread(thread)) => thread.clone(),
            _ => panic!("expected a thread object"),
        };
        thread.mark_started();

        let mut close_args = SyscallArgs::default();
        close_args.0[0] = handle as u64;
        let out = dispatch(SVC_CLOSE_HANDLE, close_args, &ctx, &mut []).unwrap();
        assert_eq!(out.result, ResultCode::SUCCESS);
        assert_eq!(thread.state(), GuestThreadState::Exiting);
    }
}
