// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
use crate::bindings::visible_to::ResourceType;
use crate::coherence::Direction;
use crate::device::DeviceError;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The device-local resource could not be created.  No managed resource exists.
    #[error("could not create device-local {kind}: {source}")]
    Creation {
        kind: ResourceType,
        #[source]
        source: DeviceError,
    },
    /// CPU access was requested but the mirror could not be allocated.
    #[error("mirror is unavailable")]
    InvalidState,
    /// A push or pull failed.  The dirty flag was restored so the next pass retries.
    #[error("{direction} transfer failed: {source}")]
    Transfer {
        direction: Direction,
        #[source]
        source: DeviceError,
    },
    #[error("level {level} is out of range ({levels} levels)")]
    InvalidLevel { level: u32, levels: u32 },
    /// The texture was not created with auto-generated mipmaps.
    #[error("texture does not support auto-generated mipmaps")]
    AutoGenUnsupported,
    #[error(transparent)]
    Device(#[from] DeviceError),
}
