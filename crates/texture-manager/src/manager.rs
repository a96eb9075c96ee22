//! The Find-Or-Create resolver (spec.md §4.3 "Lookup algorithm"), grounded
//! on `skyline::gpu::texture::TextureCache::FindOrCreate`. Keeps a
//! sorted-by-end-address list of live host textures, classifies every new
//! guest descriptor against the candidates it overlaps, and registers one
//! guest-memory trap group per host texture so the trap manager can keep
//! its dirty state honest.

use crate::descriptor::{GuestTextureDescriptor, Tiling};
use crate::host_texture::{HostTexture, HostTextureBuilder};
use crate::view::TextureView;
use address::{GuestAddress, GuestAddressRange};
use collaborators::{GpuScheduler, VulkanMemoryAllocator};
use parking_lot::Mutex;
use std::sync::Arc;
use trap_manager::{PageProtector, TrapHandle, TrapManager};

struct Entry {
    cpu_span: GuestAddressRange,
    texture: Arc<HostTexture>,
    trap_handle: TrapHandle,
}

/// Resolves guest texture descriptors to host Vulkan backings, aliasing
/// overlapping guest memory onto a single host texture wherever the two
/// descriptors are layout-compatible (spec.md §4.3 "Responsibility").
pub struct TextureManager<PP, A, G>
where
    PP: PageProtector + 'static,
    A: VulkanMemoryAllocator + 'static,
    G: GpuScheduler + 'static,
{
    entries: Mutex<Vec<Entry>>,
    traps: TrapManager<PP>,
    allocator: Arc<A>,
    gpu: Arc<G>,
}

impl<PP, A, G> TextureManager<PP, A, G>
where
    PP: PageProtector + 'static,
    A: VulkanMemoryAllocator + 'static,
    G: GpuScheduler + 'static,
{
    pub fn new(base: GuestAddress, protector: PP, allocator: Arc<A>, gpu: Arc<G>) -> Self {
        TextureManager {
            entries: Mutex::new(Vec::new()),
            traps: TrapManager::new(base, protector),
            allocator,
            gpu,
        }
    }

    /// Resolves `descriptor` to a host view, creating a new host texture
    /// only when nothing already live can be reused (spec.md §4.3
    /// "Lookup algorithm" steps 1-4).
    pub fn find_or_create(&self, descriptor: &GuestTextureDescriptor) -> TextureView {
        let enclosing = descriptor.enclosing_range();
        let mut entries = self.entries.lock();

        // Step 1: binary-search for the first triple whose end exceeds the
        // descriptor's first mapping start — every candidate that could
        // possibly overlap `enclosing` lives at or after this index, since
        // the list is sorted by end-address.
        let start_idx = entries.partition_point(|e| e.cpu_span.end() <= enclosing.start());

        // Step 2: walk the remaining candidates while mappings still
        // overlap, classifying each live (non-replaced) one.
        let mut full_match: Option<usize> = None;
        let mut layer_mip_match: Option<(usize, u32, u32)> = None;
        let mut overlapping: Vec<usize> = Vec::new();

        for idx in start_idx..entries.len() {
            if entries[idx].texture.is_replaced() {
                continue;
            }
            if !entries[idx].cpu_span.intersects(&enclosing) {
                continue;
            }

            let texture = &entries[idx].texture;
            if let Some((layer, level)) = find_layer_mip_match(texture, descriptor) {
                layer_mip_match = Some((idx, layer, level));
            } else if is_full_match(texture, descriptor) {
                full_match.get_or_insert(idx);
            } else {
                overlapping.push(idx);
            }
        }

        // Step 3: layer-mip match beats full match.
        if let Some((idx, layer, level)) = layer_mip_match {
            if let Some(full_idx) = full_match {
                entries[full_idx].texture.mark_replaced();
            }
            let texture = Arc::clone(&entries[idx].texture);
            drop(entries);
            texture.sync_to_host(&*self.allocator, &*self.gpu);
            return TextureView::new(texture, layer, level, descriptor.layer_count.max(1), descriptor.mip_count.max(1));
        }
        if let Some(idx) = full_match {
            let texture = Arc::clone(&entries[idx].texture);
            drop(entries);
            texture.sync_to_host(&*self.allocator, &*self.gpu);
            return TextureView::new(
                texture,
                descriptor.base_layer,
                descriptor.base_mip,
                descriptor.layer_count.max(1),
                descriptor.mip_count.max(1),
            );
        }

        // Step 4: no reusable candidate — force every overlapping candidate
        // to write back to guest memory before it is superseded, then build
        // a fresh host texture over the new descriptor.
        for idx in &overlapping {
            let texture = &entries[*idx].texture;
            texture.mark_gpu_dirty();
            for range in texture.guest_ranges() {
                if let Err(err) = texture.sync_to_guest(&*self.allocator, &*self.gpu, range) {
                    log::error!("writeback before texture replacement failed: {err}");
                }
            }
            texture.mark_replaced();
            self.traps.delete_trap(entries[*idx].trap_handle).ok();
        }

        let texture = Arc::new(
            HostTextureBuilder::build(
                &*self.allocator,
                descriptor.mappings.clone(),
                descriptor.width,
                descriptor.height,
                descriptor.depth,
                descriptor.layer_count.max(1),
                descriptor.mip_count.max(1),
                descriptor.format,
                descriptor.tiling,
                descriptor.view_type,
            )
            .expect("unsupported tiling configuration"),
        );

        let trap_handle = self.register_trap(&texture);

        let pos = entries.partition_point(|e| e.cpu_span.end() <= enclosing.end());
        entries.insert(pos, Entry { cpu_span: enclosing, texture: Arc::clone(&texture), trap_handle });
        drop(entries);

        // A freshly built texture starts `CpuDirty` (spec.md §3); the
        // manager's contract is to hand back a view that already reflects
        // current guest memory before the caller's first sampling (spec.md
        // §4.3 "Responsibility"), so synchronize it here rather than leaving
        // that to whichever caller binds it first.
        texture.sync_to_host(&*self.allocator, &*self.gpu);

        TextureView::new(texture, descriptor.base_layer, descriptor.base_mip, descriptor.layer_count.max(1), descriptor.mip_count.max(1))
    }

    /// Routes a host page-fault notification to the underlying trap manager
    /// (spec.md §6 "Signal installer"): the seam a [`collaborators::SignalInstaller`]
    /// handler calls into. Returns `false` for an address this manager never
    /// armed a trap group over, so the caller can fall through to whatever
    /// else might claim the fault.
    pub fn handle_fault(&self, address: GuestAddress, is_write: bool) -> bool {
        match self.traps.handle_fault(address, is_write) {
            Ok(handled) => handled,
            Err(err) => {
                log::error!("trap fault handling failed at {address:?}: {err}");
                false
            }
        }
    }

    /// Registers one trap group over a freshly built texture's guest spans
    /// (spec.md §4.3 "Guest-memory trapping"): the read callback walks the
    /// texture back to clean before the guest is allowed to see it, the
    /// write callback moves it to `CpuDirty` and returns without blocking.
    fn register_trap(&self, texture: &Arc<HostTexture>) -> TrapHandle {
        let ranges = texture.guest_ranges();
        let first_range = ranges[0];

        let texture_for_read = Arc::clone(texture);
        let allocator_for_read = Arc::clone(&self.allocator);
        let gpu_for_read = Arc::clone(&self.gpu);
        let on_read = Arc::new(move || {
            if let Err(err) = texture_for_read.sync_to_guest(&*allocator_for_read, &*gpu_for_read, first_range) {
                log::error!("guest-read sync_to_guest failed: {err}");
            }
            true
        });

        let texture_for_write = Arc::clone(texture);
        let on_write = Arc::new(move || {
            texture_for_write.mark_cpu_dirty();
            true
        });

        let lock = Arc::new(|| {});

        let handle = self
            .traps
            .create_trap(&ranges, lock, on_read, on_write)
            .expect("texture guest span rejected by trap manager");
        self.traps.arm(handle, false).expect("arming a freshly created trap group cannot fail");
        handle
    }
}

/// Declares a **full match** (spec.md §4.3 step 2): every mapping's address
/// lines up (interior mappings must also agree on size; the first/last may
/// differ, covering a descriptor that only partially spans its candidate's
/// edge mip/layer), the format is bit-compatible, the tiling configuration
/// is identical, and the candidate's dimensions cover the descriptor's.
fn is_full_match(candidate: &HostTexture, descriptor: &GuestTextureDescriptor) -> bool {
    if !descriptor.format.is_compatible(&candidate.format) {
        return false;
    }
    if descriptor.tiling != candidate.tiling {
        return false;
    }
    if descriptor.mappings.len() != candidate.mappings.len() {
        return false;
    }

    let last = descriptor.mappings.len() - 1;
    for (i, (d, c)) in descriptor.mappings.iter().zip(candidate.mappings.iter()).enumerate() {
        if d.address != c.address {
            return false;
        }
        if i != 0 && i != last && d.size != c.size {
            return false;
        }
    }

    let dims_match = descriptor.width == candidate.width && descriptor.height == candidate.height && descriptor.depth <= candidate.depth;
    let descriptor_total_size: usize = descriptor.mappings.iter().map(|m| m.size).sum();
    let candidate_total_layer_size: usize = (0..candidate.levels.len() as u32)
        .map(|level| candidate.guest_layer_size(level) * candidate.layer_count as usize)
        .sum();

    dims_match || descriptor_total_size == candidate_total_layer_size
}

/// Declares a **layer-mip match** (spec.md §4.3 step 2): the descriptor's
/// single offset and size line up exactly with one (layer, mip) of an
/// otherwise format/tiling-compatible candidate.
fn find_layer_mip_match(candidate: &HostTexture, descriptor: &GuestTextureDescriptor) -> Option<(u32, u32)> {
    if !descriptor.format.is_compatible(&candidate.format) {
        return None;
    }
    if descriptor.tiling != candidate.tiling {
        return None;
    }

    let target_addr = descriptor.first_address();
    let target_size: usize = descriptor.mappings.iter().map(|m| m.size).sum();

    for level in 0..candidate.levels.len() as u32 {
        for layer in 0..candidate.layer_count {
            let range = candidate.mapping_for(layer, level);
            if range.start() == target_addr && range.len() == target_size {
                return Some((layer, level));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{Mapping, ViewType};
    use ash::vk;
    use collaborators::{Fence, FenceHandle, ImageAllocation, ImageAllocationDesc, StagingAllocation};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use texture_format::R8G8B8A8_UNORM;
    use trap_manager::HostPageProtection;

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

    struct LeakingAllocator {
        next_buffer: AtomicUsize,
    }
    impl LeakingAllocator {
        fn new() -> Self {
            LeakingAllocator { next_buffer: AtomicUsize::new(1) }
        }
    }
    impl VulkanMemoryAllocator for LeakingAllocator {
        fn allocate_staging(&self, size: usize) -> StagingAllocation {
            let backing = vec![0u8; size].into_boxed_slice();
            let ptr = Box::leak(backing).as_mut_ptr();
            self.next_buffer.fetch_add(1, Ordering::SeqCst);
            StagingAllocation { buffer: vk::Buffer::null(), mapped_ptr: ptr as usize, size }
        }
        fn allocate_image(&self, _desc: ImageAllocationDesc) -> ImageAllocation {
            ImageAllocation { image: vk::Image::null() }
        }
    }

    fn make_manager() -> TextureManager<NullProtector, LeakingAllocator, ImmediateScheduler> {
        TextureManager::new(
            GuestAddress::new(0),
            NullProtector,
            Arc::new(LeakingAllocator::new()),
            Arc::new(ImmediateScheduler),
        )
    }

    // `sync_to_host` dereferences a descriptor's mapping addresses as real
    // guest memory, so every test descriptor below must point at an actual
    // backing allocation rather than an arbitrary literal.
    fn leaked_backing(size: usize) -> GuestAddress {
        let backing = vec![0u8; size].into_boxed_slice();
        GuestAddress::from_ptr(Box::leak(backing).as_ptr())
    }

    fn linear_descriptor(addr: GuestAddress) -> GuestTextureDescriptor {
        GuestTextureDescriptor::new(
            vec![Mapping { address: addr, size: 64 * 64 * 4 }],
            64,
            64,
            1,
            R8G8B8A8_UNORM,
            Tiling::PitchLinear { pitch: 64 * 4 },
            ViewType::Texture2D,
        )
    }

    #[test]
    fn identical_overlapping_descriptors_resolve_to_one_texture() {
        let manager = make_manager();
        let addr = leaked_backing(64 * 64 * 4);
        let t1 = linear_descriptor(addr);
        let t2 = linear_descriptor(addr);

        let view1 = manager.find_or_create(&t1);
        let view2 = manager.find_or_create(&t2);

        assert!(Arc::ptr_eq(&view1.texture, &view2.texture));
    }

    #[test]
    fn layer_mip_match_resolves_to_sub_range_of_existing_texture() {
        let manager = make_manager();

        // A single-mip, 4-layer block-linear array: one mapping spans every
        // layer of its one mip level (spec.md §3: "one mapping per mip
        // level").
        let base = GuestTextureDescriptor::new(
            vec![Mapping { address: leaked_backing(256 * 256 * 4 * 4), size: 256 * 256 * 4 * 4 }],
            256,
            256,
            1,
            R8G8B8A8_UNORM,
            Tiling::BlockLinear { block_height_gobs: 4, block_depth_gobs: 1 },
            ViewType::Texture2DArray,
        )
        .with_sub_range(0, 0, 4, 1);

        let base_view = manager.find_or_create(&base);
        let target_level = 0u32;
        let target_layer = 1u32;
        let range = base_view.texture.mapping_for(target_layer, target_level);

        let sub = GuestTextureDescriptor::new(
            vec![Mapping { address: range.start(), size: range.len() }],
            base_view.texture.levels[target_level as usize].width,
            base_view.texture.levels[target_level as usize].height,
            1,
            R8G8B8A8_UNORM,
            Tiling::BlockLinear { block_height_gobs: 4, block_depth_gobs: 1 },
            ViewType::Texture2D,
        );

        let sub_view = manager.find_or_create(&sub);
        assert!(Arc::ptr_eq(&sub_view.texture, &base_view.texture));
        assert_eq!(sub_view.base_layer, target_layer);
        assert_eq!(sub_view.base_mip, target_level);
    }

    #[test]
    fn non_overlapping_descriptors_get_distinct_textures() {
        let manager = make_manager();
        let t1 = linear_descriptor(leaked_backing(64 * 64 * 4));
        let t2 = linear_descriptor(leaked_backing(64 * 64 * 4));

        let view1 = manager.find_or_create(&t1);
        let view2 = manager.find_or_create(&t2);

        assert!(!Arc::ptr_eq(&view1.texture, &view2.texture));
    }
}
