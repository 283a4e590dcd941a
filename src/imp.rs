// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Graphics device backends.
//!
//! Managed resources are generic over [`crate::device::GraphicsDevice`], so a hosting
//! application can plug in its own device.  The backends here ship with the crate.

#[cfg(feature = "backend_software")]
pub mod software;
