// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! The graphics device boundary.
//!
//! Managed resources never talk to a GPU API directly.  Everything they need from the
//! backend is expressed by [`GraphicsDevice`]:
//!
//! - creating a resource in a given [`Placement`] (device-local for rendering, CPU-accessible for mirrors)
//! - bulk transfers between two textures ([`GraphicsDevice::update_texture`], [`GraphicsDevice::update_texture_level`])
//! - locking a texture level, a surface, or a byte range of a buffer for CPU access
//! - regenerating a mip chain on the device
//! - binding a resource for rendering
//!
//! Handles returned by the device are owned values.  Dropping a handle releases the
//! underlying resource.
//!
//! Operations that are not part of CPU/GPU coherence (priority, private data, preload,
//! type queries) live on [`DeviceResource`], which every handle implements.  Managed
//! resources expose their device-local handle so those calls go straight to the device.

use crate::bindings::buffer_access::LockFlags;
use crate::bindings::coordinates::Rect;
use crate::bindings::visible_to::{Placement, ResourceType, TextureFilter, Usage};
use crate::pixel_formats::{IndexFormat, PixelFormat};
use std::ptr::NonNull;

/// Errors reported by a [`GraphicsDevice`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    #[error("device is out of memory")]
    OutOfMemory,
    #[error("invalid call: {0}")]
    InvalidCall(String),
    #[error("resource cannot be locked in its placement")]
    NotLockable,
    #[error("resource is already locked")]
    AlreadyLocked,
    #[error("resource is not locked")]
    NotLocked,
    #[error("level {level} is out of range")]
    LevelOutOfRange { level: u32 },
    #[error("private data not found")]
    NotFound,
    #[error("injected fault: {0}")]
    Injected(&'static str),
}

/// Identifies a private data entry attached to a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Guid(pub u128);

/// Opaque device context handed out by [`GraphicsDevice::get_dc`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceContext(pub u64);

/// Describes a texture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureDescriptor {
    pub width: u32,
    pub height: u32,
    /// Number of mip levels.  `0` requests the full chain down to 1x1.
    pub levels: u32,
    pub usage: Usage,
    pub format: PixelFormat,
    pub debug_name: String,
}

impl TextureDescriptor {
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        TextureDescriptor {
            width,
            height,
            levels: 1,
            usage: Usage::empty(),
            format,
            debug_name: String::new(),
        }
    }

    /// Length of the full mip chain for this size.
    pub fn full_chain_length(&self) -> u32 {
        let largest = self.width.max(self.height).max(1);
        u32::BITS - largest.leading_zeros()
    }

    /// The level count after resolving `0` to the full chain.
    pub fn resolved_levels(&self) -> u32 {
        if self.levels == 0 {
            self.full_chain_length()
        } else {
            self.levels
        }
    }

    /// Width and height of `level`.
    pub fn level_extent(&self, level: u32) -> (u32, u32) {
        ((self.width >> level).max(1), (self.height >> level).max(1))
    }
}

/// What a buffer holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    /// Vertex data in the given flexible vertex format (`0` for declaration-based layouts).
    Vertex { fvf: u32 },
    Index { format: IndexFormat },
}

/// Describes a vertex or index buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferDescriptor {
    pub length: usize,
    pub usage: Usage,
    pub kind: BufferKind,
    pub debug_name: String,
}

impl BufferDescriptor {
    pub fn resource_type(&self) -> ResourceType {
        match self.kind {
            BufferKind::Vertex { .. } => ResourceType::VertexBuffer,
            BufferKind::Index { .. } => ResourceType::IndexBuffer,
        }
    }
}

/// Describes one level of a texture, or a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceDesc {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub usage: Usage,
    pub placement: Placement,
}

/**
CPU-visible memory returned by a lock call.

The region starts at the first locked byte.  For texture locks, consecutive rows are
`pitch` bytes apart; for buffer locks `pitch` equals `len`.
*/
#[derive(Debug)]
pub struct MappedRegion {
    ptr: NonNull<u8>,
    len: usize,
    pitch: usize,
}

//the pointer is only a view of memory the device keeps alive until unlock
unsafe impl Send for MappedRegion {}
unsafe impl Sync for MappedRegion {}

impl MappedRegion {
    /**
    # Safety

    `ptr` must be valid for reads and writes of `len` bytes until the resource it was
    locked from is unlocked, and no other lock may hand out overlapping writable memory
    in the meantime.
    */
    pub unsafe fn new(ptr: NonNull<u8>, len: usize, pitch: usize) -> Self {
        MappedRegion { ptr, len, pitch }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn pitch(&self) -> usize {
        self.pitch
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /**
    # Safety

    The region must still be locked for the whole lifetime `'a`.
    */
    pub(crate) unsafe fn as_slice<'a>(&self) -> &'a [u8] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /**
    # Safety

    The region must still be locked for the whole lifetime `'a`, and the caller must be
    the only one writing through it.
    */
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn as_mut_slice<'a>(&self) -> &'a mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

/**
Operations forwarded unchanged to a device resource.

These are not part of CPU/GPU coherence; managed resources expose their device-local
handle and callers use these methods on it directly.
*/
pub trait DeviceResource {
    fn resource_type(&self) -> ResourceType;
    /// Sets the eviction priority, returning the previous one.
    fn set_priority(&self, priority: u32) -> u32;
    fn priority(&self) -> u32;
    /// Hints that the resource is about to be used.
    fn preload(&self);
    fn set_private_data(&self, guid: Guid, data: &[u8]) -> Result<(), DeviceError>;
    fn private_data(&self, guid: Guid) -> Result<Vec<u8>, DeviceError>;
    fn free_private_data(&self, guid: Guid) -> Result<(), DeviceError>;
}

/**
A graphics device that can create device-local and CPU-accessible resources, and move
data between them.

# Safety

Every [`MappedRegion`] returned by a lock method must point to memory that stays valid
for reads and writes of its length until the matching unlock call, and writable regions
handed out by concurrent locks must not overlap.
*/
pub unsafe trait GraphicsDevice: Send + Sync + 'static {
    type Texture: DeviceResource + Send + Sync + 'static;
    type Buffer: DeviceResource + Send + Sync + 'static;
    /// A handle to one level of a texture.
    type Surface: DeviceResource + Send + Sync + 'static;

    fn create_texture(
        &self,
        descriptor: &TextureDescriptor,
        placement: Placement,
    ) -> Result<Self::Texture, DeviceError>;

    fn create_buffer(
        &self,
        descriptor: &BufferDescriptor,
        placement: Placement,
    ) -> Result<Self::Buffer, DeviceError>;

    /// Copies every level of `src` into `dst`.
    fn update_texture(&self, src: &Self::Texture, dst: &Self::Texture) -> Result<(), DeviceError>;

    /// Copies one level of `src` into the same level of `dst`.  Either side may be device-local.
    fn update_texture_level(
        &self,
        src: &Self::Texture,
        dst: &Self::Texture,
        level: u32,
    ) -> Result<(), DeviceError>;

    /// Regenerates levels `1..` of `texture` from level 0.
    fn regenerate_mip_chain(&self, texture: &Self::Texture) -> Result<(), DeviceError>;

    fn lock_texture_level(
        &self,
        texture: &Self::Texture,
        level: u32,
        rect: Option<Rect>,
        flags: LockFlags,
    ) -> Result<MappedRegion, DeviceError>;

    fn unlock_texture_level(&self, texture: &Self::Texture, level: u32)
    -> Result<(), DeviceError>;

    /// Locks `size` bytes at `offset`.  A `size` of 0 locks through the end of the buffer.
    fn lock_buffer(
        &self,
        buffer: &Self::Buffer,
        offset: usize,
        size: usize,
        flags: LockFlags,
    ) -> Result<MappedRegion, DeviceError>;

    fn unlock_buffer(&self, buffer: &Self::Buffer) -> Result<(), DeviceError>;

    fn level_count(&self, texture: &Self::Texture) -> u32;
    fn level_desc(&self, texture: &Self::Texture, level: u32) -> Result<SurfaceDesc, DeviceError>;
    /// Sets the most detailed level the sampler may use, returning the previous one.
    fn set_lod(&self, texture: &Self::Texture, lod: u32) -> u32;
    fn lod(&self, texture: &Self::Texture) -> u32;
    fn set_autogen_filter(
        &self,
        texture: &Self::Texture,
        filter: TextureFilter,
    ) -> Result<(), DeviceError>;
    fn autogen_filter(&self, texture: &Self::Texture) -> TextureFilter;

    fn buffer_desc(&self, buffer: &Self::Buffer) -> BufferDescriptor;

    /// Returns a handle to `level` of `texture`.
    fn surface_level(&self, texture: &Self::Texture, level: u32)
    -> Result<Self::Surface, DeviceError>;
    fn surface_desc(&self, surface: &Self::Surface) -> SurfaceDesc;
    fn lock_surface(
        &self,
        surface: &Self::Surface,
        rect: Option<Rect>,
        flags: LockFlags,
    ) -> Result<MappedRegion, DeviceError>;
    fn unlock_surface(&self, surface: &Self::Surface) -> Result<(), DeviceError>;
    fn get_dc(&self, surface: &Self::Surface) -> Result<DeviceContext, DeviceError>;
    fn release_dc(&self, surface: &Self::Surface, dc: DeviceContext) -> Result<(), DeviceError>;

    fn set_texture(&self, stage: u32, texture: &Self::Texture) -> Result<(), DeviceError>;
    fn set_stream_source(
        &self,
        stream: u32,
        buffer: &Self::Buffer,
        offset: usize,
        stride: usize,
    ) -> Result<(), DeviceError>;
    fn set_indices(&self, buffer: &Self::Buffer) -> Result<(), DeviceError>;
}
