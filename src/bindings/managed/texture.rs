// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Managed textures.

use crate::bindings::buffer_access::LockFlags;
use crate::bindings::coordinates::Rect;
use crate::bindings::dirty_tracking::DirtySnapshot;
use crate::bindings::managed::surface::Surface;
use crate::bindings::visible_to::{Placement, ResourceType, TextureFilter, Usage};
use crate::coherence::{CoherentResource, SyncOutcome, TextureTransfer};
use crate::device::{GraphicsDevice, MappedRegion, SurfaceDesc, TextureDescriptor};
use crate::error::Error;
use std::fmt::{Debug, Formatter};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/**
A texture the CPU can lock even though the GPU copy lives in device-local memory.

Locks go to the mirror.  Binding pushes the mirror to the device-local texture first if
it was written.
*/
pub struct Texture<D: GraphicsDevice> {
    core: CoherentResource<D, TextureTransfer>,
    //as requested, with the level count the device resolved
    descriptor: TextureDescriptor,
}

impl<D: GraphicsDevice> Debug for Texture<D> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("descriptor", &self.descriptor)
            .field("core", &self.core)
            .finish()
    }
}

impl<D: GraphicsDevice> Texture<D> {
    /**
    Creates the device-local texture.  The mirror is not allocated until the first CPU access.

    A `levels` of 0 requests the full mip chain.
    */
    pub fn new(device: Arc<D>, descriptor: TextureDescriptor) -> Result<Arc<Self>, Error> {
        let device_side = device
            .create_texture(&descriptor, Placement::DeviceLocal)
            .map_err(|source| Error::Creation {
                kind: ResourceType::Texture,
                source,
            })?;
        let mut descriptor = descriptor;
        descriptor.levels = device.level_count(&device_side);
        logwise::info_sync!(
            "created managed texture {name} {width}x{height}, {levels} levels",
            name = logwise::privacy::LogIt(&descriptor.debug_name),
            width = descriptor.width,
            height = descriptor.height,
            levels = descriptor.levels
        );
        let autogen = descriptor.usage.contains(Usage::AUTOGEN_MIPMAP);
        let transfer = TextureTransfer::new(&descriptor, autogen);
        let core = CoherentResource::new(
            device,
            device_side,
            transfer,
            descriptor.debug_name.clone(),
        );
        Ok(Arc::new(Texture { core, descriptor }))
    }

    pub(crate) fn core(&self) -> &CoherentResource<D, TextureTransfer> {
        &self.core
    }

    pub fn descriptor(&self) -> &TextureDescriptor {
        &self.descriptor
    }

    /// The usage the texture was created with.
    pub fn usage(&self) -> Usage {
        self.descriptor.usage
    }

    fn supports_autogen(&self) -> bool {
        self.descriptor.usage.contains(Usage::AUTOGEN_MIPMAP)
    }

    pub(crate) fn check_level(&self, level: u32) -> Result<(), Error> {
        if level >= self.descriptor.levels {
            return Err(Error::InvalidLevel {
                level,
                levels: self.descriptor.levels,
            });
        }
        Ok(())
    }

    /**
    Locks `rect` of `level` for CPU access, or the whole level if `rect` is `None`.

    Allocates the mirror on first use and pulls device-local changes into it.  Unless
    `flags` contains [`LockFlags::READ_ONLY`], releasing the lock marks the mirror dirty.
    */
    pub fn lock_rect(
        &self,
        level: u32,
        rect: Option<Rect>,
        flags: LockFlags,
    ) -> Result<TextureLock<'_, D>, Error> {
        self.check_level(level)?;
        let mirror = self.core.ensure_mirror()?;
        self.core.pull_if_dirty()?;
        let region = self
            .core
            .device()
            .lock_texture_level(&mirror, level, rect, flags)?;
        Ok(TextureLock {
            texture: self,
            mirror,
            level,
            region,
            read_only: flags.is_read_only(),
            released: false,
        })
    }

    /**
    Marks the mirror dirty without locking it.

    The dirty region is not tracked, the next bind pushes every level.  Fails with
    [`Error::InvalidState`] if the mirror was never allocated.
    */
    pub fn add_dirty_rect(&self, rect: Option<Rect>) -> Result<(), Error> {
        if self.core.mirror().is_none() {
            return Err(Error::InvalidState);
        }
        logwise::trace_sync!(
            "add_dirty_rect {rect}",
            rect = logwise::privacy::LogIt(&rect)
        );
        self.core.dirty().mark_cpu_dirty();
        Ok(())
    }

    /// Pushes pending CPU writes, then binds the device-local texture to `stage`.
    pub fn bind(&self, stage: u32) -> Result<(), Error> {
        self.core.push_if_dirty()?;
        self.core
            .device()
            .set_texture(stage, self.core.device_side())?;
        Ok(())
    }

    /**
    Regenerates the device-local sub-levels from level 0.

    The mirror's sub-levels are stale afterwards and are pulled on the next lock.
    */
    pub fn generate_mip_sublevels(&self) -> Result<(), Error> {
        if !self.supports_autogen() {
            return Err(Error::AutoGenUnsupported);
        }
        let _regen = logwise::perfwarn_begin!("generate_mip_sublevels");
        self.core
            .device()
            .regenerate_mip_chain(self.core.device_side())?;
        self.core.dirty().mark_gpu_dirty();
        Ok(())
    }

    /// A view of `level`.  The view does not keep this texture alive.
    pub fn surface_level(self: &Arc<Self>, level: u32) -> Result<Surface<D>, Error> {
        self.check_level(level)?;
        let device_side = self
            .core
            .device()
            .surface_level(self.core.device_side(), level)?;
        Ok(Surface::attached(self, level, device_side))
    }

    pub fn level_count(&self) -> u32 {
        self.core.device().level_count(self.core.device_side())
    }

    pub fn level_desc(&self, level: u32) -> Result<SurfaceDesc, Error> {
        Ok(self
            .core
            .device()
            .level_desc(self.core.device_side(), level)?)
    }

    /// Sets the most detailed level used for sampling, returning the previous one.
    pub fn set_lod(&self, lod: u32) -> u32 {
        self.core.device().set_lod(self.core.device_side(), lod)
    }

    pub fn lod(&self) -> u32 {
        self.core.device().lod(self.core.device_side())
    }

    pub fn set_autogen_filter(&self, filter: TextureFilter) -> Result<(), Error> {
        if !self.supports_autogen() {
            return Err(Error::AutoGenUnsupported);
        }
        Ok(self
            .core
            .device()
            .set_autogen_filter(self.core.device_side(), filter)?)
    }

    /// [`TextureFilter::None`] unless the texture was created with [`Usage::AUTOGEN_MIPMAP`].
    pub fn autogen_filter(&self) -> TextureFilter {
        if !self.supports_autogen() {
            return TextureFilter::None;
        }
        self.core.device().autogen_filter(self.core.device_side())
    }

    /// Allocates the mirror if it is not allocated yet.
    pub fn ensure_mirror(&self) -> Result<(), Error> {
        self.core.ensure_mirror().map(|_| ())
    }

    /// Runs one sync pass: push if the mirror is dirty, otherwise pull if the device-local side is.
    pub fn sync_if_needed(&self) -> Result<SyncOutcome, Error> {
        self.core.sync_if_needed()
    }

    pub fn mark_cpu_dirty(&self) {
        self.core.dirty().mark_cpu_dirty();
    }

    /// Records that the device-local texture was written, e.g. by rendering into it.
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

    /// The device-local texture.  Use it for operations that do not involve coherence.
    pub fn device_side(&self) -> &D::Texture {
        self.core.device_side()
    }

    pub fn mirror_side(&self) -> Option<Arc<D::Texture>> {
        self.core.mirror()
    }

    pub fn device(&self) -> &Arc<D> {
        self.core.device()
    }
}

/**
CPU access to one level of a [`Texture`]'s mirror.

Derefs to the locked bytes.  Rows are [`TextureLock::pitch`] bytes apart.  Dropping the
lock releases it; use [`TextureLock::unlock`] to see the result.
*/
pub struct TextureLock<'a, D: GraphicsDevice> {
    texture: &'a Texture<D>,
    mirror: Arc<D::Texture>,
    level: u32,
    region: MappedRegion,
    read_only: bool,
    released: bool,
}

impl<D: GraphicsDevice> Debug for TextureLock<'_, D> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextureLock")
            .field("level", &self.level)
            .field("region", &self.region)
            .field("read_only", &self.read_only)
            .finish()
    }
}

impl<D: GraphicsDevice> TextureLock<'_, D> {
    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn pitch(&self) -> usize {
        self.region.pitch()
    }

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
            self.texture.core.dirty().mark_cpu_dirty();
        }
        Ok(self
            .texture
            .core
            .device()
            .unlock_texture_level(&self.mirror, self.level)?)
    }
}

impl<D: GraphicsDevice> Deref for TextureLock<'_, D> {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        //Safety: the region stays locked until release, which needs &mut self
        unsafe { self.region.as_slice() }
    }
}

impl<D: GraphicsDevice> DerefMut for TextureLock<'_, D> {
    fn deref_mut(&mut self) -> &mut [u8] {
        //Safety: as above, and &mut self makes this the only writer
        unsafe { self.region.as_mut_slice() }
    }
}

impl<D: GraphicsDevice> Drop for TextureLock<'_, D> {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            logwise::warn_sync!(
                "unlocking level {level} failed: {e}",
                level = self.level,
                e = logwise::privacy::LogIt(&e)
            );
        }
    }
}

#[cfg(all(test, feature = "backend_software"))]
mod tests {
    use super::Texture;
    use crate::bindings::buffer_access::LockFlags;
    use crate::bindings::coordinates::Rect;
    use crate::bindings::visible_to::{TextureFilter, Usage};
    use crate::device::TextureDescriptor;
    use crate::error::Error;
    use crate::imp::software::SoftwareDevice;
    use crate::pixel_formats::PixelFormat;
    use std::sync::Arc;

    fn descriptor(usage: Usage) -> TextureDescriptor {
        let mut descriptor = TextureDescriptor::new(4, 4, PixelFormat::A8R8G8B8);
        descriptor.levels = 0;
        descriptor.usage = usage;
        descriptor.debug_name = "texture test".to_string();
        descriptor
    }

    #[test]
    fn rect_lock_writes_only_the_rect() {
        let device = Arc::new(SoftwareDevice::new());
        let texture = Texture::new(device.clone(), descriptor(Usage::empty())).unwrap();
        let mut lock = texture
            .lock_rect(0, Some(Rect::new(1, 1, 3, 2)), LockFlags::empty())
            .unwrap();
        assert_eq!(lock.pitch(), 16);
        //one row of two texels
        assert_eq!(lock.len(), 8);
        lock.fill(0xAB);
        lock.unlock().unwrap();
        assert!(texture.is_cpu_dirty());
        let mirror = texture.mirror_side().unwrap();
        let level = device.read_level(&mirror, 0).unwrap();
        assert!(level[16..20].iter().all(|b| *b == 0));
        assert!(level[20..28].iter().all(|b| *b == 0xAB));
        assert!(level[28..].iter().all(|b| *b == 0));
    }

    #[test]
    fn out_of_range_level_is_rejected() {
        let device = Arc::new(SoftwareDevice::new());
        let texture = Texture::new(device, descriptor(Usage::empty())).unwrap();
        assert!(matches!(
            texture.lock_rect(3, None, LockFlags::empty()),
            Err(Error::InvalidLevel { level: 3, levels: 3 })
        ));
        //a rejected level never allocates the mirror
        assert!(!texture.has_mirror());
    }

    #[test]
    fn add_dirty_rect_needs_a_mirror() {
        let device = Arc::new(SoftwareDevice::new());
        let texture = Texture::new(device, descriptor(Usage::empty())).unwrap();
        assert!(matches!(texture.add_dirty_rect(None), Err(Error::InvalidState)));
        texture.ensure_mirror().unwrap();
        texture.add_dirty_rect(Some(Rect::full(2, 2))).unwrap();
        assert!(texture.is_cpu_dirty());
    }

    #[test]
    fn autogen_operations_need_autogen_usage() {
        let device = Arc::new(SoftwareDevice::new());
        let plain = Texture::new(device.clone(), descriptor(Usage::empty())).unwrap();
        assert!(matches!(plain.generate_mip_sublevels(), Err(Error::AutoGenUnsupported)));
        assert!(matches!(
            plain.set_autogen_filter(TextureFilter::Point),
            Err(Error::AutoGenUnsupported)
        ));
        assert_eq!(plain.autogen_filter(), TextureFilter::None);

        let autogen = Texture::new(device, descriptor(Usage::AUTOGEN_MIPMAP)).unwrap();
        autogen.set_autogen_filter(TextureFilter::Point).unwrap();
        assert_eq!(autogen.autogen_filter(), TextureFilter::Point);
        autogen.generate_mip_sublevels().unwrap();
        assert!(autogen.is_gpu_dirty());
    }

    #[test]
    fn lod_is_forwarded() {
        let device = Arc::new(SoftwareDevice::new());
        let texture = Texture::new(device, descriptor(Usage::empty())).unwrap();
        assert_eq!(texture.set_lod(2), 0);
        assert_eq!(texture.lod(), 2);
        assert_eq!(texture.level_count(), 3);
        assert_eq!(texture.level_desc(1).unwrap().width, 2);
    }
}
