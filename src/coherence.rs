// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
CPU/GPU coherence for one managed resource.

A managed resource is a pair:

1.  A device-local resource the GPU renders from.  The backend does not let the CPU map it.
2.  A CPU-accessible mirror, allocated the first time the CPU asks for the contents.

Writes land on whichever side the caller touches, and [`DirtyState`] records which side is
ahead.  This module moves the data:

* push (CPU to GPU), when the mirror was written.  Runs before the resource is bound.
* pull (GPU to CPU), when the device-local resource was written.  Runs before a CPU lock.

When both sides are dirty the push runs and the pull does not.  CPU writes win.

# Locking

Every transfer starts the same way: under the resource's exclusive lock we ensure the
mirror exists, check the flag again, and clear it.  The two directions then differ.

* A push releases the lock and reads the mirror through an `Arc`.  Nobody waits on the
  device-local side, so other threads may reach the mirror while the copy runs.
* A pull writes the mirror, so it keeps the exclusive lock until the copy is done.  A CPU
  lock that finds `gpu` clear first waits on the shared lock, which means a clear flag
  always comes with a filled mirror.

The flags are read without the lock, so two threads may both see a flag set and both
queue for the transfer.  The second one finds the flag clear under the lock and does
nothing.

# Failure

If a transfer fails the flag we cleared is set again, so the next pass retries, and the
failure is returned as [`Error::Transfer`].
*/

use crate::bindings::buffer_access::LockFlags;
use crate::bindings::dirty_tracking::DirtyState;
use crate::bindings::resource_tracking::{ExclusiveSlot, MirrorSlot};
use crate::bindings::visible_to::Placement;
use crate::device::{BufferDescriptor, DeviceError, GraphicsDevice, TextureDescriptor};
use crate::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;

/// Direction of a transfer between the mirror and the device-local resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Mirror to device-local resource.
    Push,
    /// Device-local resource to mirror.
    Pull,
}

impl Display for Direction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Push => f.write_str("push (CPU to GPU)"),
            Direction::Pull => f.write_str("pull (GPU to CPU)"),
        }
    }
}

/// What a sync pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncOutcome {
    /// Nothing was dirty, or there was nothing to move.
    Clean,
    Pushed,
    Pulled,
}

pub(crate) mod sealed {
    use crate::device::{DeviceError, GraphicsDevice};

    /// What a push left behind.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum PushEffect {
        Complete,
        /// The device rewrote part of the resource after the copy (e.g. mip regeneration).
        MirrorStale,
    }

    /**
    How one resource kind creates its mirror and moves data.

    Textures use the device's bulk update primitives.  Buffers have none, so they lock both
    sides and copy bytes.
    */
    pub trait MirrorTransfer<D: GraphicsDevice> {
        type Handle: Send + Sync + 'static;

        fn create_mirror(&self, device: &D) -> Result<Self::Handle, DeviceError>;

        fn push(
            &self,
            device: &D,
            mirror: &Self::Handle,
            device_side: &Self::Handle,
        ) -> Result<PushEffect, DeviceError>;

        fn pull(
            &self,
            device: &D,
            device_side: &Self::Handle,
            mirror: &Self::Handle,
        ) -> Result<(), DeviceError>;
    }
}

use sealed::{MirrorTransfer, PushEffect};

/// Moves texture data with the device's bulk update primitives.
#[derive(Debug, Clone)]
pub(crate) struct TextureTransfer {
    mirror_descriptor: TextureDescriptor,
    autogen: bool,
}

impl TextureTransfer {
    /**
    `descriptor` describes the device-local texture, with its level count already resolved.
    The mirror gets the same extent, levels and format, and no usage flags.
    */
    pub fn new(descriptor: &TextureDescriptor, autogen: bool) -> Self {
        let mut mirror_descriptor = descriptor.clone();
        mirror_descriptor.usage = crate::bindings::visible_to::Usage::empty();
        mirror_descriptor.debug_name = format!("{} (mirror)", descriptor.debug_name);
        TextureTransfer {
            mirror_descriptor,
            autogen,
        }
    }
}

impl<D: GraphicsDevice> MirrorTransfer<D> for TextureTransfer {
    type Handle = D::Texture;

    fn create_mirror(&self, device: &D) -> Result<D::Texture, DeviceError> {
        device.create_texture(&self.mirror_descriptor, Placement::CpuAccessible)
    }

    fn push(
        &self,
        device: &D,
        mirror: &D::Texture,
        device_side: &D::Texture,
    ) -> Result<PushEffect, DeviceError> {
        device.update_texture(mirror, device_side)?;
        if !self.autogen {
            return Ok(PushEffect::Complete);
        }
        let _regen = logwise::perfwarn_begin!("regenerate mip chain after push");
        match device.regenerate_mip_chain(device_side) {
            Ok(()) => Ok(PushEffect::MirrorStale),
            Err(e) => {
                //level 0 made it across, only the sublevels are behind
                logwise::warn_sync!(
                    "mip regeneration after push failed: {e}",
                    e = logwise::privacy::LogIt(&e)
                );
                Ok(PushEffect::Complete)
            }
        }
    }

    fn pull(
        &self,
        device: &D,
        device_side: &D::Texture,
        mirror: &D::Texture,
    ) -> Result<(), DeviceError> {
        for level in 0..self.mirror_descriptor.levels {
            device.update_texture_level(device_side, mirror, level)?;
        }
        Ok(())
    }
}

/// Moves buffer data by locking both sides and copying bytes.
#[derive(Debug, Clone)]
pub(crate) struct BufferTransfer {
    mirror_descriptor: BufferDescriptor,
}

impl BufferTransfer {
    pub fn new(descriptor: &BufferDescriptor) -> Self {
        let mut mirror_descriptor = descriptor.clone();
        mirror_descriptor.usage = crate::bindings::visible_to::Usage::empty();
        mirror_descriptor.debug_name = format!("{} (mirror)", descriptor.debug_name);
        BufferTransfer { mirror_descriptor }
    }

    fn copy<D: GraphicsDevice>(
        &self,
        device: &D,
        src: &D::Buffer,
        dst: &D::Buffer,
    ) -> Result<(), DeviceError> {
        let src_region = device.lock_buffer(src, 0, 0, LockFlags::READ_ONLY)?;
        let dst_region = match device.lock_buffer(dst, 0, 0, LockFlags::empty()) {
            Ok(region) => region,
            Err(e) => {
                let _ = device.unlock_buffer(src);
                return Err(e);
            }
        };
        let len = self
            .mirror_descriptor
            .length
            .min(src_region.len())
            .min(dst_region.len());
        //Safety: both regions stay locked until the unlocks below, and they belong to distinct buffers
        unsafe {
            std::ptr::copy_nonoverlapping(src_region.as_ptr(), dst_region.as_ptr(), len);
        }
        let dst_unlock = device.unlock_buffer(dst);
        let src_unlock = device.unlock_buffer(src);
        dst_unlock.and(src_unlock)
    }
}

impl<D: GraphicsDevice> MirrorTransfer<D> for BufferTransfer {
    type Handle = D::Buffer;

    fn create_mirror(&self, device: &D) -> Result<D::Buffer, DeviceError> {
        device.create_buffer(&self.mirror_descriptor, Placement::CpuAccessible)
    }

    fn push(
        &self,
        device: &D,
        mirror: &D::Buffer,
        device_side: &D::Buffer,
    ) -> Result<PushEffect, DeviceError> {
        self.copy(device, mirror, device_side)?;
        Ok(PushEffect::Complete)
    }

    fn pull(
        &self,
        device: &D,
        device_side: &D::Buffer,
        mirror: &D::Buffer,
    ) -> Result<(), DeviceError> {
        self.copy(device, device_side, mirror)
    }
}

/**
The coherence state shared by every managed resource kind.

Owns the device-local handle for its whole life and the mirror once allocated.  Both are
released when this is dropped.
*/
pub(crate) struct CoherentResource<D, T>
where
    D: GraphicsDevice,
    T: MirrorTransfer<D>,
{
    device: Arc<D>,
    device_side: T::Handle,
    mirror: MirrorSlot<T::Handle>,
    dirty: DirtyState,
    transfer: T,
    debug_name: String,
}

impl<D, T> Debug for CoherentResource<D, T>
where
    D: GraphicsDevice,
    T: MirrorTransfer<D>,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoherentResource")
            .field("debug_name", &self.debug_name)
            .field("mirror", &self.mirror)
            .field("dirty", &self.dirty)
            .finish()
    }
}

impl<D, T> CoherentResource<D, T>
where
    D: GraphicsDevice,
    T: MirrorTransfer<D>,
{
    pub fn new(device: Arc<D>, device_side: T::Handle, transfer: T, debug_name: String) -> Self {
        CoherentResource {
            device,
            device_side,
            mirror: MirrorSlot::new(),
            dirty: DirtyState::new(),
            transfer,
            debug_name,
        }
    }

    pub fn device(&self) -> &Arc<D> {
        &self.device
    }

    pub fn device_side(&self) -> &T::Handle {
        &self.device_side
    }

    pub fn mirror(&self) -> Option<Arc<T::Handle>> {
        self.mirror.get()
    }

    pub fn dirty(&self) -> &DirtyState {
        &self.dirty
    }

    fn create_mirror(&self) -> Result<T::Handle, DeviceError> {
        let mirror = self.transfer.create_mirror(&self.device)?;
        self.dirty.mirror_allocated();
        logwise::info_sync!(
            "allocated mirror for {name}",
            name = logwise::privacy::LogIt(&self.debug_name)
        );
        Ok(mirror)
    }

    fn mirror_unavailable(&self, e: DeviceError) -> Error {
        logwise::warn_sync!(
            "could not allocate mirror for {name}: {e}",
            name = logwise::privacy::LogIt(&self.debug_name),
            e = logwise::privacy::LogIt(&e)
        );
        Error::InvalidState
    }

    /**
    Returns the mirror, allocating it on first use.

    If the device cannot create it the mirror stays absent and this fails with
    [`Error::InvalidState`].  A later call tries again.
    */
    pub fn ensure_mirror(&self) -> Result<Arc<T::Handle>, Error> {
        self.mirror
            .ensure(|| self.create_mirror())
            .map_err(|e| self.mirror_unavailable(e))
    }

    fn ensure_mirror_locked(
        &self,
        slot: &mut ExclusiveSlot<'_, T::Handle>,
    ) -> Result<Arc<T::Handle>, Error> {
        slot.ensure(|| self.create_mirror())
            .map_err(|e| self.mirror_unavailable(e))
    }

    /// Pushes if the mirror is dirty, otherwise pulls if the device-local side is dirty.
    pub fn sync_if_needed(&self) -> Result<SyncOutcome, Error> {
        if self.dirty.is_cpu_dirty() {
            return self.push();
        }
        if self.dirty.is_gpu_dirty() {
            return self.pull();
        }
        logwise::trace_sync!("{name} is clean", name = logwise::privacy::LogIt(&self.debug_name));
        Ok(SyncOutcome::Clean)
    }

    pub fn push_if_dirty(&self) -> Result<SyncOutcome, Error> {
        if self.dirty.is_cpu_dirty() {
            self.push()
        } else {
            Ok(SyncOutcome::Clean)
        }
    }

    /**
    Pulls if the device-local side is dirty and the mirror is not.

    Returns once the mirror holds the device-local contents, including when another
    thread's pull is still copying.
    */
    pub fn pull_if_dirty(&self) -> Result<SyncOutcome, Error> {
        if !self.dirty.is_cpu_dirty() && self.dirty.is_gpu_dirty() {
            return self.pull();
        }
        self.mirror.wait_for_writer();
        Ok(SyncOutcome::Clean)
    }

    fn push(&self) -> Result<SyncOutcome, Error> {
        let mirror = {
            let mut slot = self.mirror.write();
            if !slot.is_allocated() {
                //a mirror allocated here holds no CPU writes, so there is nothing to push
                self.ensure_mirror_locked(&mut slot)?;
                return Ok(SyncOutcome::Clean);
            }
            let mirror = self.ensure_mirror_locked(&mut slot)?;
            if !self.dirty.is_cpu_dirty() {
                //pushed by another thread while we waited
                return Ok(SyncOutcome::Clean);
            }
            self.dirty.clear_cpu();
            mirror
        };
        let _push = logwise::perfwarn_begin!("managed resource push");
        match self.transfer.push(&self.device, &mirror, &self.device_side) {
            Ok(PushEffect::Complete) => Ok(SyncOutcome::Pushed),
            Ok(PushEffect::MirrorStale) => {
                self.dirty.mark_gpu_dirty();
                Ok(SyncOutcome::Pushed)
            }
            Err(e) => {
                self.dirty.mark_cpu_dirty();
                Err(self.transfer_failed(Direction::Push, e))
            }
        }
    }

    fn pull(&self) -> Result<SyncOutcome, Error> {
        let mut slot = self.mirror.write();
        self.pull_locked(&mut slot)
    }

    /// Pulls while the caller holds the exclusive lock, which stays held until the copy is done.
    fn pull_locked(&self, slot: &mut ExclusiveSlot<'_, T::Handle>) -> Result<SyncOutcome, Error> {
        let mirror = self.ensure_mirror_locked(slot)?;
        if !self.dirty.is_gpu_dirty() {
            //pulled by another thread while we waited
            return Ok(SyncOutcome::Clean);
        }
        self.dirty.clear_gpu();
        let _pull = logwise::perfwarn_begin!("managed resource pull");
        match self.transfer.pull(&self.device, &self.device_side, &mirror) {
            Ok(()) => Ok(SyncOutcome::Pulled),
            Err(e) => {
                self.dirty.mark_gpu_dirty();
                Err(self.transfer_failed(Direction::Pull, e))
            }
        }
    }

    fn transfer_failed(&self, direction: Direction, source: DeviceError) -> Error {
        logwise::warn_sync!(
            "{direction} of {name} failed, it will be retried: {source}",
            direction = logwise::privacy::LogIt(&direction),
            name = logwise::privacy::LogIt(&self.debug_name),
            source = logwise::privacy::LogIt(&source)
        );
        Error::Transfer { direction, source }
    }
}

impl<D: GraphicsDevice> CoherentResource<D, TextureTransfer> {
    /**
    Refreshes one level of the mirror from the device-local texture.

    This runs regardless of `gpu`, since the device-local level may have been written by
    rendering the dirty flags never saw.  It does not clear `gpu`, with two exceptions:

    * while `cpu` is set the mirror holds writes the device has not seen, so nothing is pulled
    * while `gpu` is set every level of the mirror is stale, so the whole texture is pulled
      and `gpu` is cleared

    The copy runs under the exclusive lock, like every pull.
    */
    pub fn pull_level(&self, level: u32) -> Result<SyncOutcome, Error> {
        let mut slot = self.mirror.write();
        let mirror = self.ensure_mirror_locked(&mut slot)?;
        if self.dirty.is_cpu_dirty() {
            logwise::trace_sync!(
                "{name} has CPU writes, skipping pull of level {level}",
                name = logwise::privacy::LogIt(&self.debug_name),
                level = level
            );
            return Ok(SyncOutcome::Clean);
        }
        if self.dirty.is_gpu_dirty() {
            return self.pull_locked(&mut slot);
        }
        let _pull = logwise::perfwarn_begin!("managed resource level pull");
        self.device
            .update_texture_level(&self.device_side, &mirror, level)
            .map_err(|e| self.transfer_failed(Direction::Pull, e))?;
        Ok(SyncOutcome::Pulled)
    }
}

impl<D, T> Drop for CoherentResource<D, T>
where
    D: GraphicsDevice,
    T: MirrorTransfer<D>,
{
    fn drop(&mut self) {
        logwise::info_sync!(
            "releasing {name} (mirror allocated: {mirror})",
            name = logwise::privacy::LogIt(&self.debug_name),
            mirror = logwise::privacy::LogIt(&self.mirror.is_allocated())
        );
    }
}
