//! What the guest asked for when it bound a texture (spec.md §3 "Guest
//! texture descriptor"), grounded on `skyline::gpu::texture::
//! TextureInfo`/`GuestTexture`. A descriptor is a value the caller builds
//! fresh on every bind; [`crate::TextureManager::find_or_create`] is the
//! only thing that turns one into a live host resource.

use address::{GuestAddress, GuestAddressRange};
use texture_format::PixelFormat;

/// One contiguous guest-memory span a texture (or one of its mip levels)
/// occupies. A descriptor with more than one mapping describes a tiled
/// surface whose levels are not contiguous in guest memory (spec.md §3:
/// "spans are contiguous in guest address space" per-span, not overall).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Mapping {
    pub address: GuestAddress,
    pub size: usize,
}

impl Mapping {
    pub fn range(&self) -> GuestAddressRange {
        GuestAddressRange::from_start_len(self.address, self.size)
    }
}

/// The guest GPU's tiling mode for a surface (spec.md §4.3 "Layout engine").
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Tiling {
    /// Z-order block-linear tiling. `block_height_gobs`/`block_depth_gobs`
    /// are the block's extent in GOBs along Y and Z.
    BlockLinear { block_height_gobs: u32, block_depth_gobs: u32 },
    /// Row-padded linear tiling. `pitch` is the byte stride between rows.
    PitchLinear { pitch: u32 },
}

impl Tiling {
    pub fn is_block_linear(&self) -> bool {
        matches!(self, Tiling::BlockLinear { .. })
    }
}

/// How a texture's dimensions are interpreted for binding purposes
/// (spec.md §3 "view type"). This core doesn't render, so the only thing
/// that matters about a view type is how layer/mip counts combine with
/// depth in the Find-Or-Create dimension check.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ViewType {
    Texture1D,
    Texture2D,
    Texture3D,
    TextureCube,
    Texture2DArray,
}

/// What the guest bound: one or more guest-memory spans, dimensions,
/// format, tiling, and the (layer, mip) sub-range of a possibly larger
/// resource this descriptor refers to (spec.md §3 "Guest texture
/// descriptor").
#[derive(Clone, Debug)]
pub struct GuestTextureDescriptor {
    /// One mapping per mip level this descriptor's resource spans, ordered
    /// mip-major (spec.md §4.3 Find-Or-Create step 2: "first/last may
    /// differ in offset").
    pub mappings: Vec<Mapping>,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub format: PixelFormat,
    pub tiling: Tiling,
    pub view_type: ViewType,
    pub base_layer: u32,
    pub base_mip: u32,
    pub layer_count: u32,
    pub mip_count: u32,
}

impl GuestTextureDescriptor {
    /// # Panics
    /// Panics if any dimension is zero or `mappings` is empty (spec.md §3
    /// "Dimensions > 0").
    pub fn new(
        mappings: Vec<Mapping>,
        width: u32,
        height: u32,
        depth: u32,
        format: PixelFormat,
        tiling: Tiling,
        view_type: ViewType,
    ) -> Self {
        assert!(!mappings.is_empty(), "a texture descriptor needs at least one guest mapping");
        assert!(width > 0 && height > 0 && depth > 0, "texture dimensions must be > 0");
        GuestTextureDescriptor {
            mappings,
            width,
            height,
            depth,
            format,
            tiling,
            view_type,
            base_layer: 0,
            base_mip: 0,
            layer_count: 1,
            mip_count: 1,
        }
    }

    pub fn with_sub_range(mut self, base_layer: u32, base_mip: u32, layer_count: u32, mip_count: u32) -> Self {
        self.base_layer = base_layer;
        self.base_mip = base_mip;
        self.layer_count = layer_count;
        self.mip_count = mip_count;
        self
    }

    /// The lowest guest address any of this descriptor's mappings starts at.
    pub fn first_address(&self) -> GuestAddress {
        self.mappings.iter().map(|m| m.address).min().expect("mappings non-empty")
    }

    /// The spanning `[min start, max end)` guest range across every mapping.
    pub fn enclosing_range(&self) -> GuestAddressRange {
        let start = self.first_address();
        let end = self
            .mappings
            .iter()
            .map(|m| m.range().end())
            .max()
            .expect("mappings non-empty");
        GuestAddressRange::from_start_end(start, end)
    }
}
