// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Managed vertex and index buffers.

Both are a [`Buffer`] with a role marker, [`Vertex`] or [`Index`].  The role decides how the
buffer is bound and which usage bits reach the device-local buffer.

Buffers have no bulk update primitive, so a sync pass locks both sides and copies the
bytes.  It follows the same locking discipline as textures, see [`crate::coherence`].
*/

use crate::bindings::buffer_access::LockFlags;
use crate::bindings::dirty_tracking::DirtySnapshot;
use crate::bindings::visible_to::{Placement, ResourceType, Usage};
use crate::coherence::{BufferTransfer, CoherentResource, SyncOutcome};
use crate::device::{BufferDescriptor, BufferKind, DeviceError, GraphicsDevice, MappedRegion};
use crate::error::Error;
use std::fmt::{Debug, Formatter};
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

mod sealed {
    pub trait Role {}
}

/// Marks a [`Buffer`] as a vertex buffer or an index buffer.
pub trait BufferRole: sealed::Role + Send + Sync + 'static {
    const RESOURCE_TYPE: ResourceType;

    /// Whether a descriptor of this kind fits the role.
    fn accepts(kind: &BufferKind) -> bool;

    /// The usage passed to the device for the device-local buffer.
    fn device_usage(requested: Usage) -> Usage;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Vertex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Index;

impl sealed::Role for Vertex {}
impl sealed::Role for Index {}

impl BufferRole for Vertex {
    const RESOURCE_TYPE: ResourceType = ResourceType::VertexBuffer;

    fn accepts(kind: &BufferKind) -> bool {
        matches!(kind, BufferKind::Vertex { .. })
    }

    //the device-local side is only written by pushes, never rewritten in place
    fn device_usage(requested: Usage) -> Usage {
        requested - Usage::DYNAMIC
    }
}

impl BufferRole for Index {
    const RESOURCE_TYPE: ResourceType = ResourceType::IndexBuffer;

    fn accepts(kind: &BufferKind) -> bool {
        matches!(kind, BufferKind::Index { .. })
    }

    fn device_usage(requested: Usage) -> Usage {
        requested
    }
}

/// A managed buffer.  See the module documentation.
pub struct Buffer<D: GraphicsDevice, R: BufferRole> {
    core: CoherentResource<D, BufferTransfer>,
    //as requested
    descriptor: BufferDescriptor,
    role: PhantomData<R>,
}

pub type VertexBuffer<D> = Buffer<D, Vertex>;
pub type IndexBuffer<D> = Buffer<D, Index>;

impl<D: GraphicsDevice, R: BufferRole> Debug for Buffer<D, R> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("descriptor", &self.descriptor)
            .field("core", &self.core)
            .finish()
    }
}

impl<D: GraphicsDevice, R: BufferRole> Buffer<D, R> {
    /// Creates the device-local buffer.  The mirror is not allocated until the first CPU access.
    pub fn new(device: Arc<D>, descriptor: BufferDescriptor) -> Result<Arc<Self>, Error> {
        if !R::accepts(&descriptor.kind) {
            return Err(Error::Creation {
                kind: R::RESOURCE_TYPE,
                source: DeviceError::InvalidCall(format!(
                    "{:?} does not describe a {}",
                    descriptor.kind,
                    R::RESOURCE_TYPE
                )),
            });
        }
        let mut device_descriptor = descriptor.clone();
        device_descriptor.usage = R::device_usage(descriptor.usage);
        let device_side = device
            .create_buffer(&device_descriptor, Placement::DeviceLocal)
            .map_err(|source| Error::Creation {
                kind: R::RESOURCE_TYPE,
                source,
            })?;
        logwise::info_sync!(
            "created managed {kind} {name}, {length} bytes",
            kind = logwise::privacy::LogIt(&R::RESOURCE_TYPE),
            name = logwise::privacy::LogIt(&descriptor.debug_name),
            length = descriptor.length
        );
        let core = CoherentResource::new(
            device,
            device_side,
            BufferTransfer::new(&descriptor),
            descriptor.debug_name.clone(),
        );
        Ok(Arc::new(Buffer {
            core,
            descriptor,
            role: PhantomData,
        }))
    }

    /**
    Locks `size` bytes at `offset` for CPU access.  A `size` of 0 locks through the end.

    Allocates the mirror on first use and pulls device-local changes into it.  Unless
    `flags` contains [`LockFlags::READ_ONLY`], releasing the lock marks the mirror dirty.
    */
    pub fn lock(
        &self,
        offset: usize,
        size: usize,
        flags: LockFlags,
    ) -> Result<BufferLock<'_, D, R>, Error> {
        let mirror = self.core.ensure_mirror()?;
        self.core.pull_if_dirty()?;
        let region = self.core.device().lock_buffer(&mirror, offset, size, flags)?;
        Ok(BufferLock {
            buffer: self,
            mirror,
            region,
            read_only: flags.is_read_only(),
            released: false,
        })
    }

    /// The device-local buffer's descriptor.
    pub fn desc(&self) -> BufferDescriptor {
        self.core.device().buffer_desc(self.core.device_side())
    }

    /// The usage the buffer was created with.
    pub fn usage(&self) -> Usage {
        self.descriptor.usage
    }

    pub fn len(&self) -> usize {
        self.descriptor.length
    }

    pub fn is_empty(&self) -> bool {
        self.descriptor.length == 0
    }

    pub fn ensure_mirror(&self) -> Result<(), Error> {
        self.core.ensure_mirror().map(|_| ())
    }

    pub fn sync_if_needed(&self) -> Result<SyncOutcome, Error> {
        self.core.sync_if_needed()
    }

    pub fn mark_cpu_dirty(&self) {
        self.core.dirty().mark_cpu_dirty();
    }

    /// Records that the device-local buffer was written, e.g. by stream output.
    pub fn mark_gpu_dirty(&self) {
        self.core.dirty().mark_gpu_dirty();
    }

    pub fn is_cpu_dirty(&self) -> bool {
        self.core.dirty().is_cpu_dirty()
    }

    pub fn is_gpu_dirty(&self) -> bool {
        self.core.dirty().is_gpu_dirty()
    }

    pub fn dirty_state(&self) -> DirtySnapshot {
        self.core.dirty().snapshot()
    }

    pub fn has_mirror(&self) -> bool {
        self.core.mirror().is_some()
    }

    /// The device-local buffer.  Use it for operations that do not involve coherence.
    pub fn device_side(&self) -> &D::Buffer {
        self.core.device_side()
    }

    pub fn mirror_side(&self) -> Option<Arc<D::Buffer>> {
        self.core.mirror()
    }

    pub fn device(&self) -> &Arc<D> {
        self.core.device()
    }
}

impl<D: GraphicsDevice> Buffer<D, Vertex> {
    /// Pushes pending CPU writes, then binds the device-local buffer to `stream`.
    pub fn bind(&self, stream: u32, offset: usize, stride: usize) -> Result<(), Error> {
        self.core.push_if_dirty()?;
        self.core
            .device()
            .set_stream_source(stream, self.core.device_side(), offset, stride)?;
        Ok(())
    }
}

impl<D: GraphicsDevice> Buffer<D, Index> {
    /// Pushes pending CPU writes, then binds the device-local buffer as the index source.
    pub fn bind(&self) -> Result<(), Error> {
        self.core.push_if_dirty()?;
        self.core.device().set_indices(self.core.device_side())?;
        Ok(())
    }
}

/// CPU access to a byte range of a [`Buffer`]'s mirror.  Derefs to the locked bytes.
pub struct BufferLock<'a, D: GraphicsDevice, R: BufferRole> {
    buffer: &'a Buffer<D, R>,
    mirror: Arc<D::Buffer>,
    region: MappedRegion,
    read_only: bool,
    released: bool,
}

impl<D: GraphicsDevice, R: BufferRole> Debug for BufferLock<'_, D, R> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferLock")
            .field("region", &self.region)
            .field("read_only", &self.read_only)
            .finish()
    }
}

impl<D: GraphicsDevice, R: BufferRole> BufferLock<'_, D, R> {
    pub fn unlock(mut self) -> Result<(), Error> {
        self.release()
    }

    fn release(&mut self) -> Result<(), Error> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        //marked before unlocking, so a racing pull sees the write and skips
        if !self.read_only {
            self.buffer.core.dirty().mark_cpu_dirty();
        }
        Ok(self.buffer.core.device().unlock_buffer(&self.mirror)?)
    }
}

impl<D: GraphicsDevice, R: BufferRole> Deref for BufferLock<'_, D, R> {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        //Safety: the region stays locked until release, which needs &mut self
        unsafe { self.region.as_slice() }
    }
}

impl<D: GraphicsDevice, R: BufferRole> DerefMut for BufferLock<'_, D, R> {
    fn deref_mut(&mut self) -> &mut [u8] {
        //Safety: as above, and &mut self makes this the only writer
        unsafe { self.region.as_mut_slice() }
    }
}

impl<D: GraphicsDevice, R: BufferRole> Drop for BufferLock<'_, D, R> {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            logwise::warn_sync!(
                "unlocking buffer failed: {e}",
                e = logwise::privacy::LogIt(&e)
            );
        }
    }
}

#[cfg(all(test, feature = "backend_software"))]
mod tests {
    use super::{IndexBuffer, VertexBuffer};
    use crate::bindings::buffer_access::LockFlags;
    use crate::bindings::visible_to::Usage;
    use crate::device::{BufferDescriptor, BufferKind};
    use crate::error::Error;
    use crate::imp::software::SoftwareDevice;
    use crate::pixel_formats::IndexFormat;
    use std::sync::Arc;

    fn vertex_descriptor(usage: Usage) -> BufferDescriptor {
        BufferDescriptor {
            length: 64,
            usage,
            kind: BufferKind::Vertex { fvf: 0x002 },
            debug_name: "vertices".to_string(),
        }
    }

    #[test]
    fn vertex_buffers_drop_dynamic_on_the_device() {
        let device = Arc::new(SoftwareDevice::new());
        let buffer =
            VertexBuffer::new(device, vertex_descriptor(Usage::DYNAMIC | Usage::WRITE_ONLY)).unwrap();
        assert_eq!(buffer.desc().usage, Usage::WRITE_ONLY);
        assert_eq!(buffer.usage(), Usage::DYNAMIC | Usage::WRITE_ONLY);
    }

    #[test]
    fn index_buffers_keep_their_usage() {
        let device = Arc::new(SoftwareDevice::new());
        let descriptor = BufferDescriptor {
            length: 12,
            usage: Usage::DYNAMIC,
            kind: BufferKind::Index {
                format: IndexFormat::Index16,
            },
            debug_name: "indices".to_string(),
        };
        let buffer = IndexBuffer::new(device, descriptor).unwrap();
        assert_eq!(buffer.desc().usage, Usage::DYNAMIC);
    }

    #[test]
    fn role_must_match_kind() {
        let device = Arc::new(SoftwareDevice::new());
        assert!(matches!(
            IndexBuffer::new(device, vertex_descriptor(Usage::empty())),
            Err(Error::Creation { .. })
        ));
    }

    #[test]
    fn partial_lock_covers_the_range() {
        let device = Arc::new(SoftwareDevice::new());
        let buffer = VertexBuffer::new(device.clone(), vertex_descriptor(Usage::empty())).unwrap();
        let mut lock = buffer.lock(60, 0, LockFlags::empty()).unwrap();
        assert_eq!(lock.len(), 4);
        lock.copy_from_slice(&[1, 2, 3, 4]);
        drop(lock);
        assert!(buffer.is_cpu_dirty());
        let mirror = buffer.mirror_side().unwrap();
        assert_eq!(&device.read_buffer(&mirror).unwrap()[60..], &[1, 2, 3, 4]);
    }
}
