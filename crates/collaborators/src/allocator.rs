use ash::vk;

/// A host-visible staging allocation the texture manager de-swizzles into
/// (CPU→GPU) or swizzles out of (GPU→CPU). `mapped_ptr` is the host virtual
/// address of the persistently-mapped allocation, stored as a `usize`
/// rather than a raw pointer so this type stays `Send`.
#[derive(Clone, Copy, Debug)]
pub struct StagingAllocation {
    pub buffer: vk::Buffer,
    pub mapped_ptr: usize,
    pub size: usize,
}

impl StagingAllocation {
    /// # Safety
    /// The caller must ensure the allocation is still live and that no
    /// other code is concurrently writing the same bytes.
    pub unsafe fn as_slice(&self) -> &[u8] {
        std::slice::from_raw_parts(self.mapped_ptr as *const u8, self.size)
    }

    /// # Safety
    /// The caller must ensure the allocation is still live and exclusively
    /// held for the duration of the write.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn as_mut_slice(&self) -> &mut [u8] {
        std::slice::from_raw_parts_mut(self.mapped_ptr as *mut u8, self.size)
    }
}

/// A device-local image allocation backing one host texture.
#[derive(Clone, Copy, Debug)]
pub struct ImageAllocation {
    pub image: vk::Image,
}

/// What the texture manager needs to describe a host image it wants backed
/// (spec.md §4.3 "Host texture").
#[derive(Clone, Copy, Debug)]
pub struct ImageAllocationDesc {
    pub format: vk::Format,
    pub extent: vk::Extent3D,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub usage: vk::ImageUsageFlags,
}

/// The Vulkan memory allocator collaborator (spec.md §6): allocates
/// host-visible staging buffers and device-local images. The workspace
/// never calls a real Vulkan loader; this trait is the boundary a real
/// allocator (e.g. `gpu-allocator`) would implement.
pub trait VulkanMemoryAllocator: Send + Sync {
    fn allocate_staging(&self, size: usize) -> StagingAllocation;
    fn allocate_image(&self, desc: ImageAllocationDesc) -> ImageAllocation;
}
