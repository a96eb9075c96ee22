//! Per-mip-level size bookkeeping computed once at host-texture creation
//! (spec.md §3 "Mip-level layout", §4.3 "Size computation"), grounded on
//! `skyline::gpu::texture::Texture::GetLayerSize`/`layout.cpp`'s
//! `GetBlockLinearLayerSize`.

use crate::descriptor::Tiling;
use texture_format::PixelFormat;
use texture_layout::{BlockLinearSurface, GOB_HEIGHT, GOB_WIDTH};

/// The immutable per-level geometry of one mip of a host texture. Computed
/// once when the texture is created and never recomputed afterwards
/// (spec.md §3 invariant).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct MipLevelLayout {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    /// Size of one layer in the guest (source) format, row-major, no tiling
    /// padding: `ceil(W/bw) * ceil(H/bh) * bpb` (spec.md §4.3 "Size
    /// computation").
    pub linear_size: usize,
    /// Size of one layer once copied to the host-format linear buffer; this
    /// core performs no pixel format conversion, only tiling conversion, so
    /// it is always equal to `linear_size` (every supported format maps to
    /// a same-size-per-texel Vulkan equivalent, see `texture-format`).
    pub target_linear_size: usize,
    /// Size of one layer in block-linear guest storage; `None` for
    /// pitch-linear surfaces, which have no block-linear representation.
    pub block_linear_size: Option<usize>,
    pub block_height_gobs: u32,
    pub block_depth_gobs: u32,
}

impl MipLevelLayout {
    /// Computes the layout of mip level `level` of a `base_width x
    /// base_height x base_depth` texture, halving each dimension (floor,
    /// minimum 1) per level, matching `Texture::GetMipDimensions`.
    pub fn for_level(
        level: u32,
        base_width: u32,
        base_height: u32,
        base_depth: u32,
        format: &PixelFormat,
        tiling: &Tiling,
    ) -> Self {
        let width = (base_width >> level).max(1);
        let height = (base_height >> level).max(1);
        let depth = (base_depth >> level).max(1);

        let linear_size = format.get_size(width, height) * depth as usize;

        match *tiling {
            Tiling::BlockLinear { block_height_gobs, block_depth_gobs } => {
                // Mip levels below a GOB-aligned height shrink their block
                // height to the next power of two that still covers them,
                // exactly as the guest GPU's mip-chain block-height
                // reduction does, so small mips don't carry huge padding.
                let reduced_block_height = reduce_block_height(height, format.block_height, block_height_gobs);

                let block_linear_size = blocklinear_layer_size(
                    width,
                    height,
                    format.block_width,
                    format.block_height,
                    format.bpb,
                    reduced_block_height,
                    block_depth_gobs,
                ) * depth as usize;

                MipLevelLayout {
                    width,
                    height,
                    depth,
                    linear_size,
                    target_linear_size: linear_size,
                    block_linear_size: Some(block_linear_size),
                    block_height_gobs: reduced_block_height,
                    block_depth_gobs,
                }
            }
            Tiling::PitchLinear { .. } => MipLevelLayout {
                width,
                height,
                depth,
                linear_size,
                target_linear_size: linear_size,
                block_linear_size: None,
                block_height_gobs: 1,
                block_depth_gobs: 1,
            },
        }
    }

    /// A [`BlockLinearSurface`] for de/swizzling one depth slice of this
    /// level, or `None` if this level is pitch-linear.
    pub fn block_linear_surface(&self, format: &PixelFormat) -> Option<BlockLinearSurface> {
        self.block_linear_size?;
        Some(BlockLinearSurface {
            width: self.width,
            height: self.height,
            bpb: format.bpb,
            format_block_width: format.block_width,
            format_block_height: format.block_height,
            block_height_gobs: self.block_height_gobs,
        })
    }
}

/// `blocklinear_layer_size` from spec.md §4.3: the size in bytes of one
/// layer of a block-linear surface, before multiplying by depth.
pub fn blocklinear_layer_size(
    width: u32,
    height: u32,
    fmt_bw: u32,
    fmt_bh: u32,
    bpb: u32,
    gob_bh: u32,
    gob_bd: u32,
) -> usize {
    let row_bytes = abstractions::divide_ceil(width as usize, fmt_bw as usize) * bpb as usize;
    let rob_width_bytes = abstractions::align_up(row_bytes, GOB_WIDTH as usize);
    let rob_height = (gob_bh * GOB_HEIGHT) as usize;
    let surface_height = abstractions::divide_ceil(height as usize, fmt_bh as usize);
    let surface_height_robs = abstractions::divide_ceil(surface_height, rob_height);

    rob_width_bytes * rob_height * surface_height_robs * abstractions::align_up(1, gob_bd as usize).max(1)
}

/// Shrinks a mip level's block height to the smallest power-of-two GOB
/// count that still covers the level's full (format-divided) height,
/// capped at `max_block_height_gobs` — the guest GPU does this so deep mip
/// chains don't carry a block height taller than the level itself.
fn reduce_block_height(height: u32, format_block_height: u32, max_block_height_gobs: u32) -> u32 {
    let rows = abstractions::divide_ceil(height as usize, format_block_height as usize).max(1) as u32;
    let rows_in_gobs = abstractions::divide_ceil(rows as usize, GOB_HEIGHT as usize).max(1) as u32;
    let mut reduced = 1u32;
    while reduced < max_block_height_gobs && reduced < rows_in_gobs {
        reduced <<= 1;
    }
    reduced.min(max_block_height_gobs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use texture_format::R8G8B8A8_UNORM;

    #[test]
    fn level_zero_matches_base_dimensions() {
        let layout = MipLevelLayout::for_level(
            0,
            256,
            256,
            1,
            &R8G8B8A8_UNORM,
            &Tiling::BlockLinear { block_height_gobs: 4, block_depth_gobs: 1 },
        );
        assert_eq!(layout.width, 256);
        assert_eq!(layout.height, 256);
        assert_eq!(layout.linear_size, 256 * 256 * 4);
        assert!(layout.block_linear_size.unwrap() >= layout.linear_size);
    }

    #[test]
    fn deeper_mips_halve_and_floor_at_one() {
        let layout = MipLevelLayout::for_level(
            8,
            256,
            256,
            1,
            &R8G8B8A8_UNORM,
            &Tiling::PitchLinear { pitch: 4 },
        );
        assert_eq!(layout.width, 1);
        assert_eq!(layout.height, 1);
    }

    #[test]
    fn pitch_linear_has_no_block_linear_size() {
        let layout = MipLevelLayout::for_level(0, 64, 64, 1, &R8G8B8A8_UNORM, &Tiling::PitchLinear { pitch: 256 });
        assert!(layout.block_linear_size.is_none());
    }
}
