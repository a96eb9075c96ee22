//! The `svcGetInfo` info-id table (spec.md §4.1, grounded on
//! `switch::kernel::svc.h`'s `infoState` constants). Only the ids this core
//! can answer without a full memory manager are implemented; the rest
//! return `NotImplemented` rather than inventing a value (spec.md §7 "An
//! unhandled syscall ID returns `NotImplemented`, never panics").

use constants::ResultCode;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u32)]
pub enum InfoId {
    AllowedCpuIdBitmask = 0x0,
    AllowedThreadPriorityMask = 0x1,
    MapRegionBaseAddr = 0x2,
    MapRegionSize = 0x3,
    HeapRegionBaseAddr = 0x4,
    HeapRegionSize = 0x5,
    TotalMemorySize = 0x6,
    UsedMemorySize = 0x7,
    DebuggerAttached = 0x8,
    ResourceLimit = 0x9,
    IdleTickCount = 0xa,
    RandomEntropy = 0xb,
    AslrRegionBaseAddr = 0xc,
    AslrRegionSize = 0xd,
    StackRegionBaseAddr = 0xe,
    StackRegionSize = 0xf,
    TotalSystemResourceSize = 0x10,
    UsedSystemResourceSize = 0x11,
    ProgramId = 0x12,
    InitialProcessIdRange = 0x13,
    UserExceptionContextAddr = 0x14,
    TotalMemorySizeWithoutMmHeap = 0x15,
    UsedMemorySizeWithoutMmHeap = 0x16,
}

impl InfoId {
    pub fn from_raw(raw: u32) -> Option<InfoId> {
        use InfoId::*;
        Some(match raw {
            0x0 => AllowedCpuIdBitmask,
            0x1 => AllowedThreadPriorityMask,
            0x2 => MapRegionBaseAddr,
            0x3 => MapRegionSize,
            0x4 => HeapRegionBaseAddr,
            0x5 => HeapRegionSize,
            0x6 => TotalMemorySize,
            0x7 => UsedMemorySize,
            0x8 => DebuggerAttached,
            0x9 => ResourceLimit,
            0xa => IdleTickCount,
            0xb => RandomEntropy,
            0xc => AslrRegionBaseAddr,
            0xd => AslrRegionSize,
            0xe => StackRegionBaseAddr,
            0xf => StackRegionSize,
            0x10 => TotalSystemResourceSize,
            0x11 => UsedSystemResourceSize,
            0x12 => ProgramId,
            0x13 => InitialProcessIdRange,
            0x14 => UserExceptionContextAddr,
            0x15 => TotalMemorySizeWithoutMmHeap,
            0x16 => UsedMemorySizeWithoutMmHeap,
            _ => return None,
        })
    }
}

/// Answers a `svcGetInfo` query against the process-wide facts this core
/// actually tracks. `handle` is the target thread/process handle, unused by
/// every id implemented so far but kept for parity with the real syscall
/// signature.
pub fn get_info(id: u32, sub_id: u64, heap_size: usize, heap_base: usize) -> Result<u64, ResultCode> {
    let _ = sub_id;
    let info = InfoId::from_raw(id).ok_or(ResultCode::InvalidEnumValue)?;
    match info {
        InfoId::HeapRegionBaseAddr => Ok(heap_base as u64),
        InfoId::HeapRegionSize | InfoId::UsedMemorySize => Ok(heap_size as u64),
        InfoId::AllowedThreadPriorityMask => Ok(u64::MAX),
        InfoId::DebuggerAttached => Ok(0),
        _ => Err(ResultCode::NotImplemented),
    }
}
