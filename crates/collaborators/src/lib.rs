//! Trait ports for every external collaborator the core consumes but does
//! not implement (spec.md §6): the signal installer, guest-process
//! controller, GPU scheduler, Vulkan memory allocator, and IPC router. Each
//! trait is the contract summarized in spec.md's table, not a concrete
//! implementation — platform glue (JNI, shared-memory fds), the real
//! Vulkan driver, and the IPC service bodies are out of scope (spec.md §1).

mod address_space;
mod allocator;
mod gpu;
mod ipc;
mod process;
mod signal;

pub use address_space::GuestAddressSpace;
pub use allocator::{ImageAllocation, ImageAllocationDesc, StagingAllocation, VulkanMemoryAllocator};
pub use gpu::{Fence, FenceHandle, GpuScheduler};
pub use ipc::IpcRouter;
pub use process::{GuestProcessController, GuestThreadId, RegisterSnapshot};
pub use signal::{FaultHandler, SignalInstaller};
