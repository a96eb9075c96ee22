//! Failure modes of the texture manager (spec.md §4.3 "Failure semantics",
//! §7). Everything here is fatal: a texture manager call that can fail
//! gracefully (overlap resolution, view reuse) never returns `Result` — it
//! always produces *some* valid texture, silently replacing what it can't
//! reconcile (spec.md §4.3, §9 Open Question).

use address::GuestAddressRange;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TextureError {
    #[error("tiling {tiling:?} is not supported for a host backing over {range:?}")]
    UnsupportedTiling { range: GuestAddressRange, tiling: &'static str },

    #[error("fence cycle for texture over {range:?} did not complete within {timeout_ms}ms")]
    FenceTimeout { range: GuestAddressRange, timeout_ms: u64 },
}
