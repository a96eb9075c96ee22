use constants::ResultCode;
use guest_execute::FatalTrapError;
use texture_manager::TextureError;
use thiserror::Error;

/// Module id this facade's own aggregated errors report under (spec.md §7:
/// "a 9-bit module + 12-bit code pair"). Subsystem errors that already carry
/// a guest-visible [`ResultCode`] (bad handle, unsupported info query) keep
/// reporting under their own encoding rather than being renumbered here.
pub const HLE_MODULE: u16 = 2;

/// Aggregates every subsystem error that can reach a caller of [`crate::Hle`]
/// (spec.md §7's four error kinds, excluding the environmental-fatal ones
/// that terminate the process before they could be returned at all).
#[derive(Debug, Error)]
pub enum HleError {
    #[error("guest execution: {0}")]
    Execution(#[from] FatalTrapError),

    #[error("texture manager: {0}")]
    Texture(#[from] TextureError),
}

impl HleError {
    /// The guest-visible result code for this error, preserving the
    /// source-platform module+code encoding where a subsystem already
    /// defines one (spec.md §7).
    pub fn result_code(&self) -> ResultCode {
        match self {
            HleError::Execution(FatalTrapError::UnknownThread(_)) => ResultCode::InvalidHandle,
            HleError::Execution(_) => ResultCode::new(HLE_MODULE, 1),
            HleError::Texture(_) => ResultCode::new(HLE_MODULE, 2),
        }
    }
}
