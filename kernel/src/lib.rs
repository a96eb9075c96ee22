//! The facade wiring guest execution, syscall dispatch, and the texture
//! manager into one API (spec.md §2 "System overview"): an [`Hle`] owns one
//! guest process's worth of state and is the only type a host embedding
//! this core needs to hold.

mod error;

pub use error::{HleError, HLE_MODULE};

use address::GuestAddress;
use collaborators::{
    GpuScheduler, GuestAddressSpace, GuestProcessController, IpcRouter, SignalInstaller,
    VulkanMemoryAllocator,
};
use guest_execute::GuestExecutor;
use kernel_abstractions::Handle;
use std::sync::Arc;
use syscalls::SyscallContext;
use texture_manager::{GuestTextureDescriptor, TextureManager, TextureView};
use threading::ThreadPriority;
use trap_manager::PageProtector;

/// The external collaborators one guest process needs (spec.md §6): the
/// seams this core calls through rather than implements itself.
pub struct HleCollaborators<PC, PP, A, G, AS, IR, SI>
where
    PC: GuestProcessController + 'static,
    PP: PageProtector + 'static,
    A: VulkanMemoryAllocator + 'static,
    G: GpuScheduler + 'static,
    AS: GuestAddressSpace + 'static,
    IR: IpcRouter + 'static,
    SI: SignalInstaller,
{
    pub process_controller: Arc<PC>,
    pub page_protector: PP,
    pub allocator: Arc<A>,
    pub gpu: Arc<G>,
    pub address_space: Arc<AS>,
    pub ipc_router: Arc<IR>,
    pub signal_installer: SI,
    /// Lowest guest address the texture manager's trap manager tracks
    /// (spec.md §4.2: must be page-aligned, matching the guest address
    /// space's mapping base).
    pub texture_trap_base: GuestAddress,
}

/// One guest process's worth of core state: the guest execution dispatcher
/// and the texture manager, wired to their collaborators and to each
/// other's shared guest-memory fault path (spec.md §2, §6).
pub struct Hle<PC, PP, A, G>
where
    PC: GuestProcessController + 'static,
    PP: PageProtector + 'static,
    A: VulkanMemoryAllocator + 'static,
    G: GpuScheduler + 'static,
{
    executor: Arc<GuestExecutor<PC>>,
    textures: Arc<TextureManager<PP, A, G>>,
}

impl<PC, PP, A, G> Hle<PC, PP, A, G>
where
    PC: GuestProcessController + 'static,
    PP: PageProtector + 'static,
    A: VulkanMemoryAllocator + 'static,
    G: GpuScheduler + 'static,
{
    /// Builds the facade and installs the guest-memory fault handler that
    /// routes every page fault the texture manager tracks back into it
    /// (spec.md §6 "Signal installer": "handler invoked on every
    /// guest-region page fault").
    pub fn new<AS, IR, SI>(
        kernel_process: Handle,
        collaborators: HleCollaborators<PC, PP, A, G, AS, IR, SI>,
    ) -> Self
    where
        AS: GuestAddressSpace + 'static,
        IR: IpcRouter + 'static,
        SI: SignalInstaller,
    {
        let ctx = Arc::new(SyscallContext::new(
            kernel_process,
            collaborators.address_space,
            collaborators.ipc_router,
        ));
        let executor = Arc::new(GuestExecutor::new(collaborators.process_controller, ctx));
        let textures = Arc::new(TextureManager::new(
            collaborators.texture_trap_base,
            collaborators.page_protector,
            collaborators.allocator,
            collaborators.gpu,
        ));

        let fault_textures = Arc::clone(&textures);
        collaborators
            .signal_installer
            .install(Arc::new(move |address, is_write| fault_textures.handle_fault(address, is_write)));

        Hle { executor, textures }
    }

    /// Spawns a new guest thread (spec.md §4.1 "spawn"); see
    /// [`GuestExecutor::spawn`].
    pub fn spawn_thread(
        &self,
        entry: GuestAddress,
        stack_top: GuestAddress,
        tls: GuestAddress,
        priority: ThreadPriority,
    ) -> Handle {
        self.executor.spawn(entry, stack_top, tls, priority)
    }

    /// Runs the dispatcher callback for a trapped guest thread (spec.md
    /// §4.1 "Concurrency contract": at most one runs at a time per
    /// process); see [`GuestExecutor::handle_trap`].
    pub fn handle_trap(&self, thread: Handle) -> Result<(), HleError> {
        self.executor.handle_trap(thread).map_err(HleError::Execution)
    }

    pub fn pause_thread(&self, thread: Handle) -> Result<(), HleError> {
        self.executor.pause(thread).map_err(HleError::Execution)
    }

    pub fn resume_thread(&self, thread: Handle) -> Result<(), HleError> {
        self.executor.resume(thread).map_err(HleError::Execution)
    }

    pub fn kill_thread(&self, thread: Handle) -> Result<(), HleError> {
        self.executor.kill(thread).map_err(HleError::Execution)
    }

    /// Resolves a guest texture descriptor to its host backing (spec.md
    /// §4.3 "Lookup algorithm"); see [`TextureManager::find_or_create`].
    pub fn find_or_create_texture(&self, descriptor: &GuestTextureDescriptor) -> TextureView {
        self.textures.find_or_create(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use address::GuestAddressRange;
    use ash::vk;
    use collaborators::{
        Fence, FenceHandle, FaultHandler, GuestThreadId, ImageAllocation, ImageAllocationDesc,
        RegisterSnapshot, StagingAllocation,
    };
    use constants::ResultCode;
    use guest_execute::FatalTrapError;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;
    use test_utilities as _;
    use texture_manager::{Mapping, Tiling, ViewType};
    use texture_format::R8G8B8A8_UNORM;
    use trap_manager::HostPageProtection;

    struct FakeController {
        next_id: AtomicU64,
        regs: Mutex<std::collections::HashMap<GuestThreadId, RegisterSnapshot>>,
        next_imm: Mutex<u16>,
    }

    impl FakeController {
        fn new() -> Self {
            FakeController {
                next_id: AtomicU64::new(1),
                regs: Mutex::new(std::collections::HashMap::new()),
                next_imm: Mutex::new(0xff),
            }
        }
    }

    impl GuestProcessController for FakeController {
        fn spawn(&self, _entry: GuestAddress, _stack_top: GuestAddress, _priority: u8) -> GuestThreadId {
            GuestThreadId(self.next_id.fetch_add(1, Ordering::SeqCst))
        }
        fn kill(&self, _tid: GuestThreadId) {}
        fn pause(&self, _tid: GuestThreadId) {}
        fn resume(&self, _tid: GuestThreadId) {}
        fn read_regs(&self, tid: GuestThreadId) -> RegisterSnapshot {
            self.regs.lock().get(&tid).copied().unwrap_or_default()
        }
        fn write_regs(&self, tid: GuestThreadId, regs: &RegisterSnapshot) {
            self.regs.lock().insert(tid, *regs);
        }
        fn read_break_imm(&self, _pc: GuestAddress) -> u16 {
            *self.next_imm.lock()
        }
    }

    struct NullProtector;
    impl PageProtector for NullProtector {
        fn protect(&self, _range: GuestAddressRange, _protection: HostPageProtection) {}
    }

    struct AlwaysSignaledFence;
    impl Fence for AlwaysSignaledFence {
        fn is_signaled(&self) -> bool {
            true
        }
        fn wait(&self, _timeout: Duration) -> bool {
            true
        }
    }

    struct ImmediateScheduler;
    impl GpuScheduler for ImmediateScheduler {
        fn submit(&self, work: Box<dyn FnOnce(vk::CommandBuffer) + Send>) -> FenceHandle {
            work(vk::CommandBuffer::null());
            Arc::new(AlwaysSignaledFence)
        }
    }

    struct LeakingAllocator;
    impl VulkanMemoryAllocator for LeakingAllocator {
        fn allocate_staging(&self, size: usize) -> StagingAllocation {
            let backing = vec![0u8; size].into_boxed_slice();
            let ptr = Box::leak(backing).as_mut_ptr();
            StagingAllocation { buffer: vk::Buffer::null(), mapped_ptr: ptr as usize, size }
        }
        fn allocate_image(&self, _desc: ImageAllocationDesc) -> ImageAllocation {
            ImageAllocation { image: vk::Image::null() }
        }
    }

    struct FakeAddressSpace;
    impl GuestAddressSpace for FakeAddressSpace {
        fn set_heap_size(&self, _size: usize) -> GuestAddress {
            GuestAddress::new(0x8000_0000)
        }
    }

    struct FakeIpcRouter;
    impl IpcRouter for FakeIpcRouter {
        fn handle_request(&self, request: &[u8]) -> Vec<u8> {
            request.to_vec()
        }
    }

    #[derive(Clone)]
    struct RecordingSignalInstaller {
        installed: Arc<Mutex<Option<FaultHandler>>>,
    }
    impl RecordingSignalInstaller {
        fn new() -> Self {
            RecordingSignalInstaller { installed: Arc::new(Mutex::new(None)) }
        }
    }
    impl SignalInstaller for RecordingSignalInstaller {
        fn install(&self, handler: FaultHandler) {
            *self.installed.lock() = Some(handler);
        }
    }

    fn make_hle() -> (Hle<FakeController, NullProtector, LeakingAllocator, ImmediateScheduler>, RecordingSignalInstaller) {
        let signal_installer = RecordingSignalInstaller::new();
        let hle = Hle::new(
            Handle::from_raw(1),
            HleCollaborators {
                process_controller: Arc::new(FakeController::new()),
                page_protector: NullProtector,
                allocator: Arc::new(LeakingAllocator),
                gpu: Arc::new(ImmediateScheduler),
                address_space: Arc::new(FakeAddressSpace),
                ipc_router: Arc::new(FakeIpcRouter),
                signal_installer: signal_installer.clone(),
                texture_trap_base: GuestAddress::new(0),
            },
        );
        (hle, signal_installer)
    }

    #[test]
    fn trap_on_unregistered_handle_reports_unknown_thread() {
        let (hle, _installer) = make_hle();
        let err = hle.handle_trap(Handle::from_raw(0xdead)).unwrap_err();
        assert!(matches!(err, HleError::Execution(FatalTrapError::UnknownThread(_))));
        assert_eq!(err.result_code(), ResultCode::InvalidHandle);
    }

    #[test]
    fn texture_lookup_is_wired_through_the_facade() {
        let (hle, _installer) = make_hle();
        let descriptor = GuestTextureDescriptor::new(
            vec![Mapping { address: GuestAddress::new(0x1000), size: 64 * 64 * 4 }],
            64,
            64,
            1,
            R8G8B8A8_UNORM,
            Tiling::PitchLinear { pitch: 64 * 4 },
            ViewType::Texture2D,
        );
        let view1 = hle.find_or_create_texture(&descriptor);
        let view2 = hle.find_or_create_texture(&descriptor);
        assert!(Arc::ptr_eq(&view1.texture, &view2.texture));
    }

    #[test]
    fn constructing_installs_a_fault_handler() {
        let (_hle, installer) = make_hle();
        assert!(installer.installed.lock().is_some());
    }
}
