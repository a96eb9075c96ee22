//! Guest syscall dispatch (spec.md §4.1): decodes the HIPC wire format
//! carried in a guest thread's TLS command buffer, and implements the
//! subset of the source platform's SVC table this core emulates. Grounded
//! throughout on `switch::kernel::svc.{h,cpp}` and `switch::kernel::ipc.h`.

mod context;
mod handlers;
mod info;
mod objects;
mod table;
mod tls;

pub use context::SyscallContext;
pub use info::{get_info, InfoId};
pub use objects::SyscallObject;
pub use table::{
    dispatch, SyscallArgs, SyscallOutput, SVC_EXIT_PROCESS, SVC_EXIT_THREAD,
};
pub use tls::{
    BufferDescriptorAbw, BufferDescriptorC, BufferDescriptorX, CommandHeader, HandleDescriptor,
    PayloadHeader, TlsCommandBuffer, PAYLOAD_MAGIC_IN, PAYLOAD_MAGIC_OUT,
};


#[cfg(test)]
mod tests {
    use super::tests_support::test_context;
    use crate::table::{dispatch, SyscallArgs, SVC_CONNECT_TO_NAMED_PORT, SVC_SEND_SYNC_REQUEST};
    use crate::tls::{CommandHeader, PayloadHeader, PAYLOAD_MAGIC_IN};
    use constants::{ResultCode, TLS_COMMAND_BUFFER_SIZE};

    #[test]
    fn connect_to_named_port_reads_guest_string() {
        let ctx = test_context();
        let name = b"fsp-srv\0\0\0\0\0";
        let mut args = SyscallArgs::default();
        args.0[0] = name.as_ptr() as u64;
        let out = dispatch(SVC_CONNECT_TO_NAMED_PORT, args, &ctx, &mut []).unwrap();
        assert_eq!(out.result, ResultCode::SUCCESS);
        assert_ne!(out.values[0], 0);
    }

    #[test]
    fn send_sync_request_round_trips_through_router() {
        let ctx = test_context();
        let port_handle = {
            let mut handles = ctx.handles();
            handles.open(crate::objects::SyscallObject::Port { name: "test".into() })
        };

        let mut tls = [0u8; TLS_COMMAND_BUFFER_SIZE];
        let header = CommandHeader {
            command_type: 4,
            pointer_count: 0,
            send_count: 0,
            receive_count: 0,
            exchange_count: 0,
            raw_data_words: 4,
            buffer_c_flag: 0,
            has_handle_descriptor: false,
        };
        header.write(&mut tls);
        let payload = PayloadHeader { magic: PAYLOAD_MAGIC_IN, version: 0, value: 99, token: 0 };
        payload.write(&mut tls[CommandHeader::SIZE..]);

        let mut args = SyscallArgs::default();
        args.0[0] = port_handle.raw() as u64;
        let out = dispatch(SVC_SEND_SYNC_REQUEST, args, &ctx, &mut tls).unwrap();
        assert_eq!(out.result, ResultCode::SUCCESS);

        let echoed = PayloadHeader::parse(&tls[CommandHeader::SIZE..]);
        assert_eq!(echoed.value, 99);
    }
}
