use ash::vk;
use std::sync::Arc;

/// A one-shot synchronization object signaled after all GPU work submitted
/// alongside it completes (spec.md §3 "Fence cycle"). Holding a clone keeps
/// whatever staging/image resources were attached alive until it signals.
pub trait Fence: Send + Sync {
    fn is_signaled(&self) -> bool;

    /// Blocks the calling (host) thread until the fence signals or
    /// `timeout` elapses. Returns `false` on timeout.
    fn wait(&self, timeout: std::time::Duration) -> bool;
}

pub type FenceHandle = Arc<dyn Fence>;

/// The GPU command queue, exclusive to the rendering thread; other
/// subsystems post work to it rather than recording commands directly
/// (spec.md §5 "Shared resources", §6 "GPU scheduler").
pub trait GpuScheduler: Send + Sync {
    /// Runs `work` on the GPU thread with a command buffer open for
    /// recording, returning a fence signaled once the GPU has executed it.
    fn submit(&self, work: Box<dyn FnOnce(vk::CommandBuffer) + Send>) -> FenceHandle;
}
