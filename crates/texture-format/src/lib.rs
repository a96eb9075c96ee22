//! The pixel-format table (spec.md §4.2 "Image format", grounded on
//! `skyline::gpu::texture::Format`): each supported format is characterized
//! by its block size in bytes, the Vulkan-equivalent enum, the image aspect
//! it occupies, its compressed block dimensions, its component swizzle, and
//! whether stencil comes first in a combined depth/stencil format.

use ash::vk;
use bitflags::bitflags;

bitflags! {
    /// Mirrors `vk::ImageAspectFlags` structurally; kept as our own type so
    /// this crate does not need a Vulkan loader, only `ash`'s vocabulary
    /// types (spec.md §6, grounded in `other_examples/manifests/
    /// cwfitzgerald-wgpu`).
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct AspectMask: u32 {
        const COLOR = 0b001;
        const DEPTH = 0b010;
        const STENCIL = 0b100;
    }
}

/// A component remapping, applied on top of whatever swizzle the guest
/// itself requested, exactly as `skyline::gpu::texture::Format::swizzle`
/// does for formats whose channel order differs between guest and host.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ComponentSwizzle {
    pub r: vk::ComponentSwizzle,
    pub g: vk::ComponentSwizzle,
    pub b: vk::ComponentSwizzle,
    pub a: vk::ComponentSwizzle,
}

impl ComponentSwizzle {
    pub const IDENTITY: ComponentSwizzle = ComponentSwizzle {
        r: vk::ComponentSwizzle::IDENTITY,
        g: vk::ComponentSwizzle::IDENTITY,
        b: vk::ComponentSwizzle::IDENTITY,
        a: vk::ComponentSwizzle::IDENTITY,
    };
}

/// One supported guest pixel format.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct PixelFormat {
    pub name: &'static str,
    /// Bytes per block: for uncompressed formats, a block is one texel.
    pub bpb: u32,
    pub vk_format: vk::Format,
    pub aspect: AspectMask,
    pub block_width: u32,
    pub block_height: u32,
    pub swizzle: ComponentSwizzle,
    /// True for combined depth/stencil formats whose stencil byte is stored
    /// before the depth bytes (e.g. `D24_UNORM_S8_UINT`'s host layout).
    pub stencil_first: bool,
}

impl PixelFormat {
    /// The size in bytes of a `width x height` region of this format,
    /// rounding up to whole compressed blocks (`skyline::gpu::texture::
    /// Format::GetSize`).
    pub fn get_size(&self, width: u32, height: u32) -> usize {
        let blocks_x = abstractions_divide_ceil(width, self.block_width);
        let blocks_y = abstractions_divide_ceil(height, self.block_height);
        blocks_x as usize * blocks_y as usize * self.bpb as usize
    }

    /// Two formats are compatible for texture aliasing purposes if they
    /// share the same block footprint in bytes (`Format::IsCompatible`):
    /// that is the only thing that matters for a byte-for-byte Find-Or-
    /// Create reuse, not whether the channel layout matches.
    pub fn is_compatible(&self, other: &PixelFormat) -> bool {
        self.bpb == other.bpb
            && self.block_width == other.block_width
            && self.block_height == other.block_height
            && self.aspect == other.aspect
    }

    pub fn is_compressed(&self) -> bool {
        self.block_width > 1 || self.block_height > 1
    }
}

fn abstractions_divide_ceil(value: u32, divisor: u32) -> u32 {
    (value + divisor - 1) / divisor
}

pub const R8G8B8A8_UNORM: PixelFormat = PixelFormat {
    name: "R8G8B8A8_UNORM",
    bpb: 4,
    vk_format: vk::Format::R8G8B8A8_UNORM,
    aspect: AspectMask::COLOR,
    block_width: 1,
    block_height: 1,
    swizzle: ComponentSwizzle::IDENTITY,
    stencil_first: false,
};

pub const B8G8R8A8_UNORM: PixelFormat = PixelFormat {
    name: "B8G8R8A8_UNORM",
    bpb: 4,
    vk_format: vk::Format::B8G8R8A8_UNORM,
    aspect: AspectMask::COLOR,
    block_width: 1,
    block_height: 1,
    swizzle: ComponentSwizzle::IDENTITY,
    stencil_first: false,
};

pub const R5G6B5_UNORM: PixelFormat = PixelFormat {
    name: "R5G6B5_UNORM",
    bpb: 2,
    vk_format: vk::Format::R5G6B5_UNORM_PACK16,
    aspect: AspectMask::COLOR,
    block_width: 1,
    block_height: 1,
    swizzle: ComponentSwizzle::IDENTITY,
    stencil_first: false,
};

pub const BC1_RGBA_UNORM: PixelFormat = PixelFormat {
    name: "BC1_RGBA_UNORM",
    bpb: 8,
    vk_format: vk::Format::BC1_RGBA_UNORM_BLOCK,
    aspect: AspectMask::COLOR,
    block_width: 4,
    block_height: 4,
    swizzle: ComponentSwizzle::IDENTITY,
    stencil_first: false,
};

pub const BC3_UNORM: PixelFormat = PixelFormat {
    name: "BC3_UNORM",
    bpb: 16,
    vk_format: vk::Format::BC3_UNORM_BLOCK,
    aspect: AspectMask::COLOR,
    block_width: 4,
    block_height: 4,
    swizzle: ComponentSwizzle::IDENTITY,
    stencil_first: false,
};

pub const D32_SFLOAT: PixelFormat = PixelFormat {
    name: "D32_SFLOAT",
    bpb: 4,
    vk_format: vk::Format::D32_SFLOAT,
    aspect: AspectMask::DEPTH,
    block_width: 1,
    block_height: 1,
    swizzle: ComponentSwizzle::IDENTITY,
    stencil_first: false,
};

pub const D24_UNORM_S8_UINT: PixelFormat = PixelFormat {
    name: "D24_UNORM_S8_UINT",
    bpb: 4,
    vk_format: vk::Format::D24_UNORM_S8_UINT,
    aspect: AspectMask::from_bits_truncate(AspectMask::DEPTH.bits() | AspectMask::STENCIL.bits()),
    block_width: 1,
    block_height: 1,
    swizzle: ComponentSwizzle::IDENTITY,
    stencil_first: true,
};
