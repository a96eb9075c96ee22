//! A non-owning (layer, mip) sub-range of a [`HostTexture`] (spec.md §9
//! "Cyclic references between texture views and textures": views hold a
//! strong reference down to the texture, never the reverse, so a texture
//! with no live views is free to drop).

use crate::host_texture::HostTexture;
use std::sync::Arc;

/// What [`crate::TextureManager::find_or_create`] hands back: a strong
/// reference to the backing [`HostTexture`] plus the (layer, mip) sub-range
/// this particular guest descriptor resolved to.
#[derive(Clone)]
pub struct TextureView {
    pub texture: Arc<HostTexture>,
    pub base_layer: u32,
    pub base_mip: u32,
    pub layer_count: u32,
    pub mip_count: u32,
}

impl TextureView {
    pub fn new(texture: Arc<HostTexture>, base_layer: u32, base_mip: u32, layer_count: u32, mip_count: u32) -> Self {
        TextureView { texture, base_layer, base_mip, layer_count, mip_count }
    }

    /// Whether this view's backing texture has since been superseded by a
    /// later Find-Or-Create (spec.md §4.3 step 3/4: "mark any weaker
    /// alternative as replaced"). A caller holding a stale view should
    /// re-resolve rather than keep sampling it.
    pub fn is_stale(&self) -> bool {
        self.texture.is_replaced()
    }
}
