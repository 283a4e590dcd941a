// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Resource usage and placement declarations.
//!
//! When creating a managed resource the caller declares how it will be used.  The
//! declared [`Usage`] is retained for the resource's whole lifetime because some
//! coherence policy depends on it (a texture created with [`Usage::AUTOGEN_MIPMAP`]
//! regenerates its mip chain after every push).
//!
//! [`Placement`] is the hint passed to the graphics device.  A managed resource is
//! always created twice over its lifetime:
//!
//! - once with [`Placement::DeviceLocal`], eagerly, which is the copy the GPU renders from
//! - once with [`Placement::CpuAccessible`], lazily, which is the mirror the CPU reads and writes
//!
//! # Examples
//!
//! ```
//! use managed_pool::bindings::visible_to::Usage;
//!
//! let usage = Usage::AUTOGEN_MIPMAP | Usage::WRITE_ONLY;
//! assert!(usage.contains(Usage::AUTOGEN_MIPMAP));
//! ```

bitflags::bitflags! {
    /// How the caller intends to use a resource.
    ///
    /// Bit values follow the conventional D3D9 usage bits so that hosting code can pass
    /// them through unchanged.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Usage: u32 {
        /// The resource is a render target.
        const RENDER_TARGET = 0x0000_0001;
        /// The resource is a depth/stencil target.
        const DEPTH_STENCIL = 0x0000_0002;
        /// The CPU only writes to the resource.
        const WRITE_ONLY = 0x0000_0008;
        /// The resource is rewritten often.  Device-local dynamic textures may be locked directly.
        const DYNAMIC = 0x0000_0200;
        /// The device regenerates sub-levels from level 0.
        const AUTOGEN_MIPMAP = 0x0000_0400;
    }
}

/// Where the graphics device should place a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Placement {
    /// GPU-local memory.  Fast to render from, not CPU accessible on backends without a managed pool.
    DeviceLocal,
    /// CPU-accessible memory, used for mirrors.
    CpuAccessible,
}

/// The kind of a device resource, as reported by [`crate::device::DeviceResource::resource_type`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    Surface,
    Texture,
    VertexBuffer,
    IndexBuffer,
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceType::Surface => write!(f, "surface"),
            ResourceType::Texture => write!(f, "texture"),
            ResourceType::VertexBuffer => write!(f, "vertex buffer"),
            ResourceType::IndexBuffer => write!(f, "index buffer"),
        }
    }
}

/// Filter used by the device when regenerating mip sub-levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureFilter {
    None,
    Point,
    #[default]
    Linear,
    Anisotropic,
}
