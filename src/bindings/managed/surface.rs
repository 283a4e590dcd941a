// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Surfaces, views of one level of a managed texture.

A surface owns no storage.  While its texture is alive every CPU access resolves to the
texture's mirror at the surface's level, and writes mark the texture dirty.

The two kinds of CPU access synchronize differently:

* [`Surface::lock_rect`] refreshes just this level of the mirror, which keeps single-level
  traffic cheap.
* [`Surface::get_dc`] runs the texture's full sync pass first.

A surface holds only a weak reference to its texture.  Once the texture is dropped the
surface is *detached*: calls go straight to the device-local level it was created from,
with no mirror and no dirty tracking.
*/

use crate::bindings::buffer_access::LockFlags;
use crate::bindings::coordinates::Rect;
use crate::bindings::managed::texture::Texture;
use crate::device::{DeviceContext, GraphicsDevice, MappedRegion, SurfaceDesc};
use crate::error::Error;
use std::fmt::{Debug, Formatter};
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Weak};

pub struct Surface<D: GraphicsDevice> {
    parent: Weak<Texture<D>>,
    level: u32,
    //the device-local level, used for queries and once detached
    device_side: D::Surface,
    device: Arc<D>,
}

impl<D: GraphicsDevice> Debug for Surface<D> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Surface")
            .field("level", &self.level)
            .field("detached", &self.is_detached())
            .finish()
    }
}

/// Where a lock or device context was taken.
enum Target<D: GraphicsDevice> {
    /// The parent's mirror at our level.  Holding the parent keeps it alive until release.
    Mirror {
        parent: Arc<Texture<D>>,
        surface: D::Surface,
    },
    Detached,
}

impl<D: GraphicsDevice> Surface<D> {
    pub(crate) fn attached(parent: &Arc<Texture<D>>, level: u32, device_side: D::Surface) -> Self {
        Surface {
            parent: Arc::downgrade(parent),
            level,
            device_side,
            device: parent.device().clone(),
        }
    }

    /// The texture this is a level of, if it is still alive.
    pub fn container(&self) -> Option<Arc<Texture<D>>> {
        self.parent.upgrade()
    }

    pub fn is_detached(&self) -> bool {
        self.parent.strong_count() == 0
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn desc(&self) -> SurfaceDesc {
        self.device.surface_desc(&self.device_side)
    }

    /// The device-local level.  Use it for operations that do not involve coherence.
    pub fn device_side(&self) -> &D::Surface {
        &self.device_side
    }

    fn target_surface<'s>(&'s self, target: &'s Target<D>) -> &'s D::Surface {
        match target {
            Target::Mirror { surface, .. } => surface,
            Target::Detached => &self.device_side,
        }
    }

    /**
    Locks `rect` of this level for CPU access, or the whole level if `rect` is `None`.

    Refreshes this level of the parent's mirror first, unless the mirror holds writes the
    device has not seen.  Unless `flags` contains [`LockFlags::READ_ONLY`], releasing the
    lock marks the parent dirty.
    */
    pub fn lock_rect(&self, rect: Option<Rect>, flags: LockFlags) -> Result<SurfaceLock<'_, D>, Error> {
        let target = match self.parent.upgrade() {
            Some(parent) => {
                let mirror = parent.core().ensure_mirror()?;
                parent.core().pull_level(self.level)?;
                let surface = self.device.surface_level(&mirror, self.level)?;
                Target::Mirror { parent, surface }
            }
            None => {
                logwise::trace_sync!("lock_rect on detached surface, level {level}", level = self.level);
                Target::Detached
            }
        };
        let region = self
            .device
            .lock_surface(self.target_surface(&target), rect, flags)?;
        Ok(SurfaceLock {
            surface: self,
            target,
            region,
            read_only: flags.is_read_only(),
            released: false,
        })
    }

    /**
    Hands out a device context for this level.

    Runs the parent's full sync pass first.  Releasing the context marks the parent dirty.
    */
    pub fn get_dc(&self) -> Result<SurfaceDc<'_, D>, Error> {
        let target = match self.parent.upgrade() {
            Some(parent) => {
                let mirror = parent.core().ensure_mirror()?;
                parent.core().sync_if_needed()?;
                let surface = self.device.surface_level(&mirror, self.level)?;
                Target::Mirror { parent, surface }
            }
            None => Target::Detached,
        };
        let dc = self.device.get_dc(self.target_surface(&target))?;
        Ok(SurfaceDc {
            surface: self,
            target,
            dc,
            released: false,
        })
    }
}

/// CPU access to one level through a [`Surface`].  Derefs to the locked bytes.
pub struct SurfaceLock<'a, D: GraphicsDevice> {
    surface: &'a Surface<D>,
    target: Target<D>,
    region: MappedRegion,
    read_only: bool,
    released: bool,
}

impl<D: GraphicsDevice> Debug for SurfaceLock<'_, D> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SurfaceLock")
            .field("level", &self.surface.level)
            .field("region", &self.region)
            .field("read_only", &self.read_only)
            .finish()
    }
}

impl<D: GraphicsDevice> SurfaceLock<'_, D> {
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
        if let Target::Mirror { parent, .. } = &self.target
            && !self.read_only
        {
            parent.mark_cpu_dirty();
        }
        Ok(self
            .surface
            .device
            .unlock_surface(self.surface.target_surface(&self.target))?)
    }
}

impl<D: GraphicsDevice> Deref for SurfaceLock<'_, D> {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        //Safety: the region stays locked until release, which needs &mut self
        unsafe { self.region.as_slice() }
    }
}

impl<D: GraphicsDevice> DerefMut for SurfaceLock<'_, D> {
    fn deref_mut(&mut self) -> &mut [u8] {
        //Safety: as above, and &mut self makes this the only writer
        unsafe { self.region.as_mut_slice() }
    }
}

impl<D: GraphicsDevice> Drop for SurfaceLock<'_, D> {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            logwise::warn_sync!(
                "unlocking surface level {level} failed: {e}",
                level = self.surface.level,
                e = logwise::privacy::LogIt(&e)
            );
        }
    }
}

/// A device context handed out by [`Surface::get_dc`].  Dropping it releases the context.
pub struct SurfaceDc<'a, D: GraphicsDevice> {
    surface: &'a Surface<D>,
    target: Target<D>,
    dc: DeviceContext,
    released: bool,
}

impl<D: GraphicsDevice> Debug for SurfaceDc<'_, D> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SurfaceDc")
            .field("level", &self.surface.level)
            .field("dc", &self.dc)
            .finish()
    }
}

impl<D: GraphicsDevice> SurfaceDc<'_, D> {
    pub fn dc(&self) -> DeviceContext {
        self.dc
    }

    pub fn release(mut self) -> Result<(), Error> {
        self.release_inner()
    }

    fn release_inner(&mut self) -> Result<(), Error> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        if let Target::Mirror { parent, .. } = &self.target {
            parent.mark_cpu_dirty();
        }
        Ok(self
            .surface
            .device
            .release_dc(self.surface.target_surface(&self.target), self.dc)?)
    }
}

impl<D: GraphicsDevice> Drop for SurfaceDc<'_, D> {
    fn drop(&mut self) {
        if let Err(e) = self.release_inner() {
            logwise::warn_sync!(
                "releasing device context failed: {e}",
                e = logwise::privacy::LogIt(&e)
            );
        }
    }
}
