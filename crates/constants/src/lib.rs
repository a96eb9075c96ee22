mod result_code;

pub use result_code::*;

/// The guest MMU page size. The platform this core targets uses 4KiB pages.
pub const PAGE_SIZE: usize = 0x1000;

/// Default size of a thread-local-storage slot (spec.md §6).
pub const TLS_SLOT_SIZE: usize = 0x200;

/// Size of the TLS command-buffer region carved out of a TLS slot (spec.md §6).
pub const TLS_COMMAND_BUFFER_SIZE: usize = 0x100;

/// Maximum number of entries in the syscall dispatch table (spec.md §4.1).
pub const MAX_SYSCALL_COUNT: usize = 0x80;

/// Guest thread priorities range `0..=63`, lower numerically is higher priority.
pub const LOWEST_THREAD_PRIORITY: u8 = 63;
pub const HIGHEST_THREAD_PRIORITY: u8 = 0;
