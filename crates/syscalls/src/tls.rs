//! The TLS command buffer (spec.md §6): a fixed-size region at the start of
//! a guest thread's TLS slot that `send-sync-request` reads and the IPC
//! router's response is written back into. Bit layout is carried exactly
//! from the source platform's IPC marshalling convention (grounded on
//! `switch::kernel::ipc.h`), since spec.md §6 requires the bit layout be
//! preserved exactly even though the functional behavior of each service is
//! out of scope (spec.md §1).

use constants::TLS_COMMAND_BUFFER_SIZE;

/// The fixed magic value every data payload begins with, read big-endian as
/// ASCII `SFCI` for requests / `SFCO` for responses.
pub const PAYLOAD_MAGIC_IN: u32 = 0x4943_4653;
pub const PAYLOAD_MAGIC_OUT: u32 = 0x4f43_4653;

/// The 8-byte command header at the start of every TLS command buffer
/// (`switch::kernel::ipc::CommandHeader`): command type, buffer descriptor
/// counts for each of the four buffer kinds, the raw data word count, the
/// inline-buffer flag nibble, and whether a handle descriptor follows.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct CommandHeader {
    pub command_type: u16,
    pub pointer_count: u8,
    pub send_count: u8,
    pub receive_count: u8,
    pub exchange_count: u8,
    pub raw_data_words: u16,
    pub buffer_c_flag: u8,
    pub has_handle_descriptor: bool,
}

impl CommandHeader {
    pub const SIZE: usize = 8;

    pub fn parse(bytes: &[u8]) -> Self {
        let raw = u64::from_le_bytes(bytes[0..8].try_into().unwrap());
        CommandHeader {
            command_type: (raw & 0xffff) as u16,
            pointer_count: ((raw >> 16) & 0xf) as u8,
            send_count: ((raw >> 20) & 0xf) as u8,
            receive_count: ((raw >> 24) & 0xf) as u8,
            exchange_count: ((raw >> 28) & 0xf) as u8,
            raw_data_words: ((raw >> 32) & 0x3ff) as u16,
            buffer_c_flag: ((raw >> 42) & 0xf) as u8,
            has_handle_descriptor: (raw >> 63) & 1 != 0,
        }
    }

    pub fn write(&self, bytes: &mut [u8]) {
        let mut raw: u64 = self.command_type as u64;
        raw |= (self.pointer_count as u64 & 0xf) << 16;
        raw |= (self.send_count as u64 & 0xf) << 20;
        raw |= (self.receive_count as u64 & 0xf) << 24;
        raw |= (self.exchange_count as u64 & 0xf) << 28;
        raw |= (self.raw_data_words as u64 & 0x3ff) << 32;
        raw |= (self.buffer_c_flag as u64 & 0xf) << 42;
        raw |= (self.has_handle_descriptor as u64) << 63;
        bytes[0..8].copy_from_slice(&raw.to_le_bytes());
    }
}

/// The optional handle descriptor (`switch::kernel::ipc::HandleDescriptor`):
/// whether the sender's PID is attached, followed by counts of handles to
/// copy and handles to move into the receiver's process.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct HandleDescriptor {
    pub send_pid: bool,
    pub copy_count: u8,
    pub move_count: u8,
}

impl HandleDescriptor {
    pub const SIZE: usize = 4;

    pub fn parse(bytes: &[u8]) -> Self {
        let raw = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        HandleDescriptor {
            send_pid: raw & 1 != 0,
            copy_count: ((raw >> 1) & 0xf) as u8,
            move_count: ((raw >> 5) & 0xf) as u8,
        }
    }

    pub fn write(&self, bytes: &mut [u8]) {
        let mut raw: u32 = self.send_pid as u32;
        raw |= (self.copy_count as u32 & 0xf) << 1;
        raw |= (self.move_count as u32 & 0xf) << 5;
        bytes[0..4].copy_from_slice(&raw.to_le_bytes());
    }
}

/// A "Send"/"Receive"/"Exchange" (A/B/W) buffer descriptor: a guest address
/// and size split across non-contiguous bit fields
/// (`switch::kernel::ipc::BufferDescriptorABW`).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct BufferDescriptorAbw {
    pub address: u64,
    pub size: u64,
    pub flags: u8,
}

impl BufferDescriptorAbw {
    pub const SIZE: usize = 12;

    pub fn parse(bytes: &[u8]) -> Self {
        let w0 = u32::from_le_bytes(bytes[0..4].try_into().unwrap()) as u64;
        let w1 = u32::from_le_bytes(bytes[4..8].try_into().unwrap()) as u64;
        let w2 = u32::from_le_bytes(bytes[8..12].try_into().unwrap());

        let flags = (w2 & 0x3) as u8;
        let address_36_38 = ((w2 >> 2) & 0x7) as u64;
        let size_32_35 = ((w2 >> 24) & 0xf) as u64;
        let address_32_35 = ((w2 >> 28) & 0xf) as u64;

        BufferDescriptorAbw {
            address: w0 | (address_32_35 << 32) | (address_36_38 << 36),
            size: w1 | (size_32_35 << 32),
            flags,
        }
    }

    pub fn write(&self, bytes: &mut [u8]) {
        bytes[0..4].copy_from_slice(&(self.address as u32).to_le_bytes());
        bytes[4..8].copy_from_slice(&(self.size as u32).to_le_bytes());

        let address_32_35 = (self.address >> 32) & 0xf;
        let address_36_38 = (self.address >> 36) & 0x7;
        let size_32_35 = (self.size >> 32) & 0xf;

        let mut w2: u32 = self.flags as u32 & 0x3;
        w2 |= (address_36_38 as u32) << 2;
        w2 |= (size_32_35 as u32) << 24;
        w2 |= (address_32_35 as u32) << 28;
        bytes[8..12].copy_from_slice(&w2.to_le_bytes());
    }
}

/// A "Pointer" (X) buffer descriptor: used for small, statically-sized
/// receive buffers (`switch::kernel::ipc::BufferDescriptorX`).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct BufferDescriptorX {
    pub address: u64,
    pub counter: u16,
    pub size: u16,
}

impl BufferDescriptorX {
    pub const SIZE: usize = 8;

    pub fn parse(bytes: &[u8]) -> Self {
        let w0 = u16::from_le_bytes(bytes[0..2].try_into().unwrap()) as u64;
        let size = u16::from_le_bytes(bytes[2..4].try_into().unwrap());
        let address_0_31 = u32::from_le_bytes(bytes[4..8].try_into().unwrap()) as u64;

        let counter_0_5 = w0 & 0x3f;
        let address_36_38 = (w0 >> 6) & 0x7;
        let counter_9_11 = (w0 >> 9) & 0x7;
        let address_32_35 = (w0 >> 12) & 0xf;

        BufferDescriptorX {
            address: address_0_31 | (address_32_35 << 32) | (address_36_38 << 36),
            counter: (counter_0_5 | (counter_9_11 << 9)) as u16,
            size,
        }
    }

    pub fn write(&self, bytes: &mut [u8]) {
        let address_32_35 = (self.address >> 32) & 0xf;
        let address_36_38 = (self.address >> 36) & 0x7;
        let counter_0_5 = self.counter as u64 & 0x3f;
        let counter_9_11 = (self.counter as u64 >> 9) & 0x7;

        let mut w0: u16 = counter_0_5 as u16;
        w0 |= (address_36_38 as u16) << 6;
        w0 |= (counter_9_11 as u16) << 9;
        w0 |= (address_32_35 as u16) << 12;

        bytes[0..2].copy_from_slice(&w0.to_le_bytes());
        bytes[2..4].copy_from_slice(&self.size.to_le_bytes());
        bytes[4..8].copy_from_slice(&(self.address as u32).to_le_bytes());
    }
}

/// A "ReceiveList" (C) buffer descriptor: a flat address+size pair used for
/// the trailing receive-list entries (`switch::kernel::ipc::BufferDescriptorC`).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct BufferDescriptorC {
    pub address: u64,
    pub size: u16,
}

impl BufferDescriptorC {
    pub const SIZE: usize = 8;

    pub fn parse(bytes: &[u8]) -> Self {
        let address_0_31 = u32::from_le_bytes(bytes[0..4].try_into().unwrap()) as u64;
        let address_32_48 = u16::from_le_bytes(bytes[4..6].try_into().unwrap()) as u64;
        let size = u16::from_le_bytes(bytes[6..8].try_into().unwrap());
        BufferDescriptorC {
            address: address_0_31 | (address_32_48 << 32),
            size,
        }
    }

    pub fn write(&self, bytes: &mut [u8]) {
        bytes[0..4].copy_from_slice(&(self.address as u32).to_le_bytes());
        bytes[4..6].copy_from_slice(&((self.address >> 32) as u16).to_le_bytes());
        bytes[6..8].copy_from_slice(&self.size.to_le_bytes());
    }
}

/// The payload header (`switch::kernel::ipc::PayloadHeader`): a fixed magic
/// identifying request vs. response, a version, a service-specific command
/// value, and a token.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct PayloadHeader {
    pub magic: u32,
    pub version: u32,
    pub value: u32,
    pub token: u32,
}

impl PayloadHeader {
    pub const SIZE: usize = 16;

    pub fn parse(bytes: &[u8]) -> Self {
        PayloadHeader {
            magic: u32::from_le_bytes(bytes[0..4].try_into().unwrap()),
            version: u32::from_le_bytes(bytes[4..8].try_into().unwrap()),
            value: u32::from_le_bytes(bytes[8..12].try_into().unwrap()),
            token: u32::from_le_bytes(bytes[12..16].try_into().unwrap()),
        }
    }

    pub fn write(&self, bytes: &mut [u8]) {
        bytes[0..4].copy_from_slice(&self.magic.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.version.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.value.to_le_bytes());
        bytes[12..16].copy_from_slice(&self.token.to_le_bytes());
    }
}

/// A parsed view over a guest TLS command buffer (spec.md §6 "TLS
/// command-buffer layout"): the header, an optional handle descriptor, the
/// X/A/B/W/C buffer descriptors it declares, and the 16-byte-aligned
/// payload.
#[derive(Clone, Debug)]
pub struct TlsCommandBuffer {
    pub header: CommandHeader,
    pub handle_descriptor: Option<HandleDescriptor>,
    pub pointer_buffers: Vec<BufferDescriptorX>,
    pub send_buffers: Vec<BufferDescriptorAbw>,
    pub receive_buffers: Vec<BufferDescriptorAbw>,
    pub exchange_buffers: Vec<BufferDescriptorAbw>,
    pub payload: PayloadHeader,
    pub raw_data: Vec<u8>,
}

impl TlsCommandBuffer {
    /// Parses a full [`TLS_COMMAND_BUFFER_SIZE`]-byte command buffer
    /// exactly as `svcSendSyncRequest` would, walking the header's declared
    /// descriptor counts.
    pub fn parse(bytes: &[u8; TLS_COMMAND_BUFFER_SIZE]) -> Self {
        let header = CommandHeader::parse(bytes);
        let mut offset = CommandHeader::SIZE;

        let handle_descriptor = if header.has_handle_descriptor {
            let descriptor = HandleDescriptor::parse(&bytes[offset..]);
            offset += HandleDescriptor::SIZE
                + descriptor.copy_count as usize * 4
                + descriptor.move_count as usize * 4;
            Some(descriptor)
        } else {
            None
        };

        let mut pointer_buffers = Vec::with_capacity(header.pointer_count as usize);
        for _ in 0..header.pointer_count {
            pointer_buffers.push(BufferDescriptorX::parse(&bytes[offset..]));
            offset += BufferDescriptorX::SIZE;
        }

        let mut send_buffers = Vec::with_capacity(header.send_count as usize);
        for _ in 0..header.send_count {
            send_buffers.push(BufferDescriptorAbw::parse(&bytes[offset..]));
            offset += BufferDescriptorAbw::SIZE;
        }

        let mut receive_buffers = Vec::with_capacity(header.receive_count as usize);
        for _ in 0..header.receive_count {
            receive_buffers.push(BufferDescriptorAbw::parse(&bytes[offset..]));
            offset += BufferDescriptorAbw::SIZE;
        }

        let mut exchange_buffers = Vec::with_capacity(header.exchange_count as usize);
        for _ in 0..header.exchange_count {
            exchange_buffers.push(BufferDescriptorAbw::parse(&bytes[offset..]));
            offset += BufferDescriptorAbw::SIZE;
        }

        let payload_offset = abstractions::align_up(offset, 16);
        let payload = PayloadHeader::parse(&bytes[payload_offset..]);
        let raw_data_len = (header.raw_data_words as usize).saturating_sub(4) * 4;
        let raw_data_start = payload_offset + PayloadHeader::SIZE;
        let raw_data = bytes
            .get(raw_data_start..raw_data_start + raw_data_len)
            .map(|s| s.to_vec())
            .unwrap_or_default();

        TlsCommandBuffer {
            header,
            handle_descriptor,
            pointer_buffers,
            send_buffers,
            receive_buffers,
            exchange_buffers,
            payload,
            raw_data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_header_roundtrip() {
        let header = CommandHeader {
            command_type: 4,
            pointer_count: 1,
            send_count: 2,
            receive_count: 0,
            exchange_count: 0,
            raw_data_words: 6,
            buffer_c_flag: 0,
            has_handle_descriptor: true,
        };
        let mut bytes = [0u8; 8];
        header.write(&mut bytes);
        assert_eq!(CommandHeader::parse(&bytes), header);
    }

    #[test]
    fn handle_descriptor_roundtrip() {
        let descriptor = HandleDescriptor {
            send_pid: true,
            copy_count: 3,
            move_count: 2,
        };
        let mut bytes = [0u8; 4];
        descriptor.write(&mut bytes);
        assert_eq!(HandleDescriptor::parse(&bytes), descriptor);
    }

    #[test]
    fn buffer_descriptor_abw_roundtrip() {
        let descriptor = BufferDescriptorAbw {
            address: 0x7f00_1234_5678,
            size: 0x1234,
            flags: 0b01,
        };
        let mut bytes = [0u8; 12];
        descriptor.write(&mut bytes);
        assert_eq!(BufferDescriptorAbw::parse(&bytes), descriptor);
    }

    #[test]
    fn buffer_descriptor_x_roundtrip() {
        let descriptor = BufferDescriptorX {
            address: 0x7f00_8000_0000,
            counter: 0x123,
            size: 0x40,
        };
        let mut bytes = [0u8; 8];
        descriptor.write(&mut bytes);
        assert_eq!(BufferDescriptorX::parse(&bytes), descriptor);
    }

    #[test]
    fn buffer_descriptor_c_roundtrip() {
        let descriptor = BufferDescriptorC {
            address: 0x7f00_9000_0000,
            size: 0x200,
        };
        let mut bytes = [0u8; 8];
        descriptor.write(&mut bytes);
        assert_eq!(BufferDescriptorC::parse(&bytes), descriptor);
    }

    #[test]
    fn payload_header_roundtrip() {
        let header = PayloadHeader {
            magic: PAYLOAD_MAGIC_IN,
            version: 0,
            value: 42,
            token: 0,
        };
        let mut bytes = [0u8; 16];
        header.write(&mut bytes);
        assert_eq!(PayloadHeader::parse(&bytes), header);
    }

    #[test]
    fn parses_minimal_command_buffer() {
        let mut buf = [0u8; TLS_COMMAND_BUFFER_SIZE];
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
        header.write(&mut buf);
        let payload = PayloadHeader {
            magic: PAYLOAD_MAGIC_IN,
            version: 0,
            value: 7,
            token: 0,
        };
        payload.write(&mut buf[CommandHeader::SIZE..]);

        let parsed = TlsCommandBuffer::parse(&buf);
        assert_eq!(parsed.header, header);
        assert_eq!(parsed.payload, payload);
        assert!(parsed.handle_descriptor.is_none());
    }
}
