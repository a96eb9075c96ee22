//! Resolves guest texture descriptors to host Vulkan image backings
//! (spec.md §4.3), grounded on `skyline::gpu::texture::TextureCache`: the
//! guest GPU addresses textures as tiled regions of guest memory; this
//! crate finds or builds the Vulkan image that backs a given region, keeps
//! it synchronized across CPU/GPU writes via [`trap_manager`]'s
//! guest-memory traps, and reconciles aliasing guest descriptors onto a
//! single host texture wherever their layouts agree.

mod context_lock;
mod descriptor;
mod dirty;
mod error;
mod host_texture;
mod layout;
mod manager;
mod view;

pub use context_lock::{ContextGuard, ContextLock};
pub use descriptor::{GuestTextureDescriptor, Mapping, Tiling, ViewType};
pub use dirty::{DirtyState, DirtyTracker};
pub use error::TextureError;
pub use host_texture::{HostTexture, HostTextureBuilder, TextureRole, FENCE_TIMEOUT};
pub use layout::MipLevelLayout;
pub use manager::TextureManager;
pub use view::TextureView;
