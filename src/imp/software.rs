// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
A graphics device that keeps every resource in ordinary memory.

It enforces the restriction that managed resources exist to work around: a texture in
[`Placement::DeviceLocal`] cannot be locked for CPU access unless it was created
[`Usage::DYNAMIC`].  Everything else behaves like a small, strict GPU API:

* transfers between resources of different shapes are rejected
* a locked region cannot be touched by device copies until it is unlocked
* binding a CPU-accessible resource for rendering is rejected

It also counts the calls the coherence layer makes ([`SoftwareDevice::stats`]) and can be
told to fail specific calls ([`SoftwareDevice::inject_fault`]).  Tests that care about
ordering can watch unlocks with [`SoftwareDevice::on_unlock`].
*/

mod storage;

use crate::bindings::buffer_access::LockFlags;
use crate::bindings::coordinates::Rect;
use crate::bindings::visible_to::{Placement, ResourceType, TextureFilter};
use crate::device::{
    BufferDescriptor, DeviceContext, DeviceError, DeviceResource, GraphicsDevice, Guid,
    MappedRegion, SurfaceDesc, TextureDescriptor,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use storage::{BufferStorage, Common, TextureStorage};

/// A call the device can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    CreateDeviceLocal,
    CreateMirror,
    UpdateTexture,
    UpdateTextureLevel,
    RegenerateMipChain,
    /// Fails a buffer lock after letting `skip` of them succeed.
    LockBuffer { skip: u32 },
}

impl Fault {
    fn name(self) -> &'static str {
        match self {
            Fault::CreateDeviceLocal => "create device-local resource",
            Fault::CreateMirror => "create mirror",
            Fault::UpdateTexture => "update texture",
            Fault::UpdateTextureLevel => "update texture level",
            Fault::RegenerateMipChain => "regenerate mip chain",
            Fault::LockBuffer { .. } => "lock buffer",
        }
    }

    fn same_call(self, other: Fault) -> bool {
        std::mem::discriminant(&self) == std::mem::discriminant(&other)
    }
}

/// How often each device call was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceStats {
    pub device_resources_created: usize,
    pub mirrors_created: usize,
    pub resources_released: usize,
    pub texture_updates: usize,
    pub level_updates: usize,
    pub mip_regenerations: usize,
    pub texture_locks: usize,
    pub buffer_locks: usize,
    pub binds: usize,
}

#[derive(Debug, Default)]
struct Counters {
    device_resources_created: AtomicUsize,
    mirrors_created: AtomicUsize,
    texture_updates: AtomicUsize,
    level_updates: AtomicUsize,
    mip_regenerations: AtomicUsize,
    texture_locks: AtomicUsize,
    buffer_locks: AtomicUsize,
    binds: AtomicUsize,
}

fn bump(counter: &AtomicUsize) {
    counter.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug, Default)]
struct Bindings {
    textures: HashMap<u32, u64>,
    streams: HashMap<u32, (u64, usize, usize)>,
    indices: Option<u64>,
}

type UnlockHook = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Observers {
    unlock: Option<UnlockHook>,
}

impl std::fmt::Debug for Observers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observers")
            .field("unlock", &self.unlock.is_some())
            .finish()
    }
}

/// The software device.  See the module documentation.
#[derive(Debug, Default)]
pub struct SoftwareDevice {
    next_id: AtomicU64,
    counters: Counters,
    released: Arc<AtomicUsize>,
    faults: Mutex<Vec<Fault>>,
    bindings: Mutex<Bindings>,
    observers: Mutex<Observers>,
}

#[derive(Debug, Clone)]
pub struct SoftwareTexture {
    storage: Arc<TextureStorage>,
}

#[derive(Debug, Clone)]
pub struct SoftwareBuffer {
    storage: Arc<BufferStorage>,
}

/// One level of a [`SoftwareTexture`].  Keeps the texture storage alive.
#[derive(Debug, Clone)]
pub struct SoftwareSurface {
    texture: Arc<TextureStorage>,
    level: u32,
}

impl SoftwareTexture {
    /// Identifies the underlying storage.  Clones share an id.
    pub fn id(&self) -> u64 {
        self.storage.common.id
    }

    pub fn placement(&self) -> Placement {
        self.storage.common.placement
    }
}

impl SoftwareBuffer {
    pub fn id(&self) -> u64 {
        self.storage.common.id
    }

    pub fn placement(&self) -> Placement {
        self.storage.common.placement
    }
}

impl SoftwareSurface {
    pub fn level(&self) -> u32 {
        self.level
    }

    /// Id of the texture this is a level of.
    pub fn texture_id(&self) -> u64 {
        self.texture.common.id
    }
}

impl DeviceResource for SoftwareTexture {
    fn resource_type(&self) -> ResourceType {
        ResourceType::Texture
    }
    fn set_priority(&self, priority: u32) -> u32 {
        self.storage.common.set_priority(priority)
    }
    fn priority(&self) -> u32 {
        self.storage.common.priority()
    }
    fn preload(&self) {
        logwise::trace_sync!("preload texture {id}", id = self.id());
    }
    fn set_private_data(&self, guid: Guid, data: &[u8]) -> Result<(), DeviceError> {
        self.storage.common.set_private_data(guid, data);
        Ok(())
    }
    fn private_data(&self, guid: Guid) -> Result<Vec<u8>, DeviceError> {
        self.storage.common.get_private_data(guid)
    }
    fn free_private_data(&self, guid: Guid) -> Result<(), DeviceError> {
        self.storage.common.free_private_data(guid)
    }
}

impl DeviceResource for SoftwareBuffer {
    fn resource_type(&self) -> ResourceType {
        self.storage.resource_type()
    }
    fn set_priority(&self, priority: u32) -> u32 {
        self.storage.common.set_priority(priority)
    }
    fn priority(&self) -> u32 {
        self.storage.common.priority()
    }
    fn preload(&self) {
        logwise::trace_sync!("preload buffer {id}", id = self.id());
    }
    fn set_private_data(&self, guid: Guid, data: &[u8]) -> Result<(), DeviceError> {
        self.storage.common.set_private_data(guid, data);
        Ok(())
    }
    fn private_data(&self, guid: Guid) -> Result<Vec<u8>, DeviceError> {
        self.storage.common.get_private_data(guid)
    }
    fn free_private_data(&self, guid: Guid) -> Result<(), DeviceError> {
        self.storage.common.free_private_data(guid)
    }
}

//a surface shares priority and private data with its texture
impl DeviceResource for SoftwareSurface {
    fn resource_type(&self) -> ResourceType {
        ResourceType::Surface
    }
    fn set_priority(&self, priority: u32) -> u32 {
        self.texture.common.set_priority(priority)
    }
    fn priority(&self) -> u32 {
        self.texture.common.priority()
    }
    fn preload(&self) {}
    fn set_private_data(&self, guid: Guid, data: &[u8]) -> Result<(), DeviceError> {
        self.texture.common.set_private_data(guid, data);
        Ok(())
    }
    fn private_data(&self, guid: Guid) -> Result<Vec<u8>, DeviceError> {
        self.texture.common.get_private_data(guid)
    }
    fn free_private_data(&self, guid: Guid) -> Result<(), DeviceError> {
        self.texture.common.free_private_data(guid)
    }
}

impl SoftwareDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /**
    Makes the next matching call fail with [`DeviceError::Injected`].

    Each injected fault fires once.  Faults for different calls are independent.
    */
    pub fn inject_fault(&self, fault: Fault) {
        logwise::info_sync!(
            "injecting fault: {fault}",
            fault = logwise::privacy::LogIt(&fault)
        );
        self.faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(fault);
    }

    fn check_fault(&self, call: Fault) -> Result<(), DeviceError> {
        let mut faults = self.faults.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(index) = faults.iter().position(|f| f.same_call(call)) else {
            return Ok(());
        };
        if let Fault::LockBuffer { skip } = &mut faults[index] {
            if *skip > 0 {
                *skip -= 1;
                return Ok(());
            }
        }
        let fault = faults.remove(index);
        Err(DeviceError::Injected(fault.name()))
    }

    /**
    Runs `hook` after every successful CPU unlock: texture levels, buffers, surfaces and
    device contexts.

    The hook runs on the unlocking thread once the region is unlocked, before the unlock
    call returns.  Installing a hook replaces the previous one.
    */
    pub fn on_unlock(&self, hook: impl Fn() + Send + Sync + 'static) {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .unlock = Some(Arc::new(hook));
    }

    fn unlocked(&self) {
        //cloned out so the hook may call back into the device
        let hook = self
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .unlock
            .clone();
        if let Some(hook) = hook {
            hook();
        }
    }

    pub fn stats(&self) -> DeviceStats {
        let c = &self.counters;
        let load = |a: &AtomicUsize| a.load(Ordering::Relaxed);
        DeviceStats {
            device_resources_created: load(&c.device_resources_created),
            mirrors_created: load(&c.mirrors_created),
            resources_released: load(&self.released),
            texture_updates: load(&c.texture_updates),
            level_updates: load(&c.level_updates),
            mip_regenerations: load(&c.mip_regenerations),
            texture_locks: load(&c.texture_locks),
            buffer_locks: load(&c.buffer_locks),
            binds: load(&c.binds),
        }
    }

    fn common(&self, placement: Placement) -> Result<Common, DeviceError> {
        match placement {
            Placement::DeviceLocal => {
                self.check_fault(Fault::CreateDeviceLocal)?;
                bump(&self.counters.device_resources_created);
            }
            Placement::CpuAccessible => {
                self.check_fault(Fault::CreateMirror)?;
                bump(&self.counters.mirrors_created);
            }
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        Ok(Common::new(id, placement, self.released.clone()))
    }

    /// Contents of one level, ignoring placement.  Fails while the level is locked for writing.
    pub fn read_level(&self, texture: &SoftwareTexture, level: u32) -> Result<Vec<u8>, DeviceError> {
        texture.storage.level(level)?.read()
    }

    /**
    Overwrites one level, ignoring placement.

    This stands in for the GPU writing a texture, e.g. rendering into it.  Nothing marks
    the managed resource dirty.
    */
    pub fn write_level(
        &self,
        texture: &SoftwareTexture,
        level: u32,
        data: &[u8],
    ) -> Result<(), DeviceError> {
        texture.storage.level(level)?.write(0, data)
    }

    pub fn is_level_locked(&self, texture: &SoftwareTexture, level: u32) -> bool {
        texture
            .storage
            .level(level)
            .map(|region| region.is_locked())
            .unwrap_or(false)
    }

    pub fn read_buffer(&self, buffer: &SoftwareBuffer) -> Result<Vec<u8>, DeviceError> {
        buffer.storage.region.read()
    }

    pub fn write_buffer(
        &self,
        buffer: &SoftwareBuffer,
        offset: usize,
        data: &[u8],
    ) -> Result<(), DeviceError> {
        buffer.storage.region.write(offset, data)
    }

    pub fn is_buffer_locked(&self, buffer: &SoftwareBuffer) -> bool {
        buffer.storage.region.is_locked()
    }

    fn bindings(&self) -> std::sync::MutexGuard<'_, Bindings> {
        self.bindings.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Id of the texture bound to `stage`.
    pub fn bound_texture(&self, stage: u32) -> Option<u64> {
        self.bindings().textures.get(&stage).copied()
    }

    /// Id, offset and stride of the buffer bound to `stream`.
    pub fn bound_stream(&self, stream: u32) -> Option<(u64, usize, usize)> {
        self.bindings().streams.get(&stream).copied()
    }

    pub fn bound_indices(&self) -> Option<u64> {
        self.bindings().indices
    }

    fn copy_level(
        &self,
        src: &TextureStorage,
        dst: &TextureStorage,
        level: u32,
    ) -> Result<(), DeviceError> {
        if src.common.id == dst.common.id {
            return Err(DeviceError::InvalidCall(
                "source and destination are the same texture".to_string(),
            ));
        }
        if src.descriptor.level_extent(level) != dst.descriptor.level_extent(level)
            || src.descriptor.format != dst.descriptor.format
        {
            return Err(DeviceError::InvalidCall(format!(
                "level {level} differs between source and destination"
            )));
        }
        //copy out first so only one level's mutex is held at a time
        let bytes = src.level(level)?.read()?;
        dst.level(level)?.write(0, &bytes)
    }

    fn require_device_local(&self, placement: Placement, what: &str) -> Result<(), DeviceError> {
        if placement != Placement::DeviceLocal {
            return Err(DeviceError::InvalidCall(format!(
                "{what} must be device-local to bind"
            )));
        }
        Ok(())
    }
}

unsafe impl GraphicsDevice for SoftwareDevice {
    type Texture = SoftwareTexture;
    type Buffer = SoftwareBuffer;
    type Surface = SoftwareSurface;

    fn create_texture(
        &self,
        descriptor: &TextureDescriptor,
        placement: Placement,
    ) -> Result<SoftwareTexture, DeviceError> {
        if descriptor.width == 0 || descriptor.height == 0 {
            return Err(DeviceError::InvalidCall("texture has no area".to_string()));
        }
        let levels = descriptor.resolved_levels();
        if levels > descriptor.full_chain_length() {
            return Err(DeviceError::InvalidCall(format!(
                "{levels} levels requested, {}x{} has at most {}",
                descriptor.width,
                descriptor.height,
                descriptor.full_chain_length()
            )));
        }
        let common = self.common(placement)?;
        let mut descriptor = descriptor.clone();
        descriptor.levels = levels;
        logwise::trace_sync!(
            "software texture {id} {placement}",
            id = common.id,
            placement = logwise::privacy::LogIt(&placement)
        );
        Ok(SoftwareTexture {
            storage: Arc::new(TextureStorage::new(common, descriptor)),
        })
    }

    fn create_buffer(
        &self,
        descriptor: &BufferDescriptor,
        placement: Placement,
    ) -> Result<SoftwareBuffer, DeviceError> {
        if descriptor.length == 0 {
            return Err(DeviceError::InvalidCall("buffer is empty".to_string()));
        }
        let common = self.common(placement)?;
        Ok(SoftwareBuffer {
            storage: Arc::new(BufferStorage::new(common, descriptor.clone())),
        })
    }

    fn update_texture(&self, src: &SoftwareTexture, dst: &SoftwareTexture) -> Result<(), DeviceError> {
        self.check_fault(Fault::UpdateTexture)?;
        if src.placement() != Placement::CpuAccessible || dst.placement() != Placement::DeviceLocal {
            return Err(DeviceError::InvalidCall(
                "update_texture copies a CPU-accessible texture into a device-local one".to_string(),
            ));
        }
        if src.storage.descriptor.levels != dst.storage.descriptor.levels {
            return Err(DeviceError::InvalidCall("level counts differ".to_string()));
        }
        bump(&self.counters.texture_updates);
        for level in 0..src.storage.descriptor.levels {
            self.copy_level(&src.storage, &dst.storage, level)?;
        }
        Ok(())
    }

    fn update_texture_level(
        &self,
        src: &SoftwareTexture,
        dst: &SoftwareTexture,
        level: u32,
    ) -> Result<(), DeviceError> {
        self.check_fault(Fault::UpdateTextureLevel)?;
        bump(&self.counters.level_updates);
        self.copy_level(&src.storage, &dst.storage, level)
    }

    fn regenerate_mip_chain(&self, texture: &SoftwareTexture) -> Result<(), DeviceError> {
        self.check_fault(Fault::RegenerateMipChain)?;
        bump(&self.counters.mip_regenerations);
        let _regen = logwise::perfwarn_begin!("software regenerate_mip_chain");
        for level in 1..texture.storage.descriptor.levels {
            texture.storage.downsample_into(level)?;
        }
        Ok(())
    }

    fn lock_texture_level(
        &self,
        texture: &SoftwareTexture,
        level: u32,
        rect: Option<Rect>,
        flags: LockFlags,
    ) -> Result<MappedRegion, DeviceError> {
        bump(&self.counters.texture_locks);
        texture.storage.lock_level(level, rect, flags)
    }

    fn unlock_texture_level(&self, texture: &SoftwareTexture, level: u32) -> Result<(), DeviceError> {
        texture.storage.level(level)?.unlock()?;
        self.unlocked();
        Ok(())
    }

    fn lock_buffer(
        &self,
        buffer: &SoftwareBuffer,
        offset: usize,
        size: usize,
        flags: LockFlags,
    ) -> Result<MappedRegion, DeviceError> {
        self.check_fault(Fault::LockBuffer { skip: 0 })?;
        bump(&self.counters.buffer_locks);
        buffer.storage.lock(offset, size, flags)
    }

    fn unlock_buffer(&self, buffer: &SoftwareBuffer) -> Result<(), DeviceError> {
        buffer.storage.region.unlock()?;
        self.unlocked();
        Ok(())
    }

    fn level_count(&self, texture: &SoftwareTexture) -> u32 {
        texture.storage.descriptor.levels
    }

    fn level_desc(&self, texture: &SoftwareTexture, level: u32) -> Result<SurfaceDesc, DeviceError> {
        texture.storage.level_desc(level)
    }

    fn set_lod(&self, texture: &SoftwareTexture, lod: u32) -> u32 {
        texture.storage.set_lod(lod)
    }

    fn lod(&self, texture: &SoftwareTexture) -> u32 {
        texture.storage.lod()
    }

    fn set_autogen_filter(
        &self,
        texture: &SoftwareTexture,
        filter: TextureFilter,
    ) -> Result<(), DeviceError> {
        if filter == TextureFilter::None {
            return Err(DeviceError::InvalidCall(
                "mip generation needs a filter".to_string(),
            ));
        }
        texture.storage.set_filter(filter);
        Ok(())
    }

    fn autogen_filter(&self, texture: &SoftwareTexture) -> TextureFilter {
        texture.storage.filter()
    }

    fn buffer_desc(&self, buffer: &SoftwareBuffer) -> BufferDescriptor {
        buffer.storage.descriptor.clone()
    }

    fn surface_level(
        &self,
        texture: &SoftwareTexture,
        level: u32,
    ) -> Result<SoftwareSurface, DeviceError> {
        texture.storage.level(level)?;
        Ok(SoftwareSurface {
            texture: texture.storage.clone(),
            level,
        })
    }

    fn surface_desc(&self, surface: &SoftwareSurface) -> SurfaceDesc {
        //the level was checked when the surface was handed out
        let (width, height) = surface.texture.descriptor.level_extent(surface.level);
        SurfaceDesc {
            width,
            height,
            format: surface.texture.descriptor.format,
            usage: surface.texture.descriptor.usage,
            placement: surface.texture.common.placement,
        }
    }

    fn lock_surface(
        &self,
        surface: &SoftwareSurface,
        rect: Option<Rect>,
        flags: LockFlags,
    ) -> Result<MappedRegion, DeviceError> {
        bump(&self.counters.texture_locks);
        surface.texture.lock_level(surface.level, rect, flags)
    }

    fn unlock_surface(&self, surface: &SoftwareSurface) -> Result<(), DeviceError> {
        surface.texture.level(surface.level)?.unlock()?;
        self.unlocked();
        Ok(())
    }

    fn get_dc(&self, surface: &SoftwareSurface) -> Result<DeviceContext, DeviceError> {
        let dc = self.next_id.fetch_add(1, Ordering::Relaxed);
        surface.texture.get_dc(surface.level, dc)?;
        Ok(DeviceContext(dc))
    }

    fn release_dc(&self, surface: &SoftwareSurface, dc: DeviceContext) -> Result<(), DeviceError> {
        surface.texture.release_dc(surface.level, dc.0)?;
        self.unlocked();
        Ok(())
    }

    fn set_texture(&self, stage: u32, texture: &SoftwareTexture) -> Result<(), DeviceError> {
        self.require_device_local(texture.placement(), "texture")?;
        bump(&self.counters.binds);
        self.bindings().textures.insert(stage, texture.id());
        Ok(())
    }

    fn set_stream_source(
        &self,
        stream: u32,
        buffer: &SoftwareBuffer,
        offset: usize,
        stride: usize,
    ) -> Result<(), DeviceError> {
        self.require_device_local(buffer.placement(), "vertex buffer")?;
        if offset >= buffer.storage.descriptor.length {
            return Err(DeviceError::InvalidCall(format!(
                "stream offset {offset} is past the end of the buffer"
            )));
        }
        bump(&self.counters.binds);
        self.bindings()
            .streams
            .insert(stream, (buffer.id(), offset, stride));
        Ok(())
    }

    fn set_indices(&self, buffer: &SoftwareBuffer) -> Result<(), DeviceError> {
        self.require_device_local(buffer.placement(), "index buffer")?;
        bump(&self.counters.binds);
        self.bindings().indices = Some(buffer.id());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Fault, SoftwareDevice};
    use crate::bindings::buffer_access::LockFlags;
    use crate::bindings::visible_to::{Placement, Usage};
    use crate::device::{DeviceError, GraphicsDevice, TextureDescriptor};
    use crate::pixel_formats::PixelFormat;

    fn descriptor(usage: Usage) -> TextureDescriptor {
        let mut descriptor = TextureDescriptor::new(4, 4, PixelFormat::L8);
        descriptor.levels = 0;
        descriptor.usage = usage;
        descriptor
    }

    #[test]
    fn device_local_textures_refuse_locks() {
        let device = SoftwareDevice::new();
        let texture = device
            .create_texture(&descriptor(Usage::empty()), Placement::DeviceLocal)
            .unwrap();
        assert_eq!(
            device
                .lock_texture_level(&texture, 0, None, LockFlags::empty())
                .unwrap_err(),
            DeviceError::NotLockable
        );
        let dynamic = device
            .create_texture(&descriptor(Usage::DYNAMIC), Placement::DeviceLocal)
            .unwrap();
        device
            .lock_texture_level(&dynamic, 0, None, LockFlags::empty())
            .unwrap();
        device.unlock_texture_level(&dynamic, 0).unwrap();
    }

    #[test]
    fn full_chain_is_resolved() {
        let device = SoftwareDevice::new();
        let texture = device
            .create_texture(&descriptor(Usage::empty()), Placement::CpuAccessible)
            .unwrap();
        assert_eq!(device.level_count(&texture), 3);
        assert_eq!(device.level_desc(&texture, 2).unwrap().width, 1);
        assert_eq!(
            device.level_desc(&texture, 3).unwrap_err(),
            DeviceError::LevelOutOfRange { level: 3 }
        );
    }

    #[test]
    fn regeneration_box_filters_each_level() {
        let device = SoftwareDevice::new();
        let texture = device
            .create_texture(&descriptor(Usage::AUTOGEN_MIPMAP), Placement::DeviceLocal)
            .unwrap();
        let level0: Vec<u8> = (0..16).map(|i| i * 10).collect();
        device.write_level(&texture, 0, &level0).unwrap();
        device.regenerate_mip_chain(&texture).unwrap();
        //top-left quad is 0, 10, 40, 50
        assert_eq!(device.read_level(&texture, 1).unwrap(), vec![25, 45, 105, 125]);
        assert_eq!(device.read_level(&texture, 2).unwrap(), vec![75]);
    }

    #[test]
    fn update_texture_requires_cpu_to_device() {
        let device = SoftwareDevice::new();
        let mirror = device
            .create_texture(&descriptor(Usage::empty()), Placement::CpuAccessible)
            .unwrap();
        let gpu = device
            .create_texture(&descriptor(Usage::empty()), Placement::DeviceLocal)
            .unwrap();
        assert!(matches!(
            device.update_texture(&gpu, &mirror),
            Err(DeviceError::InvalidCall(_))
        ));
        device.write_level(&mirror, 1, &[1, 2, 3, 4]).unwrap();
        device.update_texture(&mirror, &gpu).unwrap();
        assert_eq!(device.read_level(&gpu, 1).unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn faults_fire_once() {
        let device = SoftwareDevice::new();
        device.inject_fault(Fault::CreateMirror);
        let d = descriptor(Usage::empty());
        assert_eq!(
            device.create_texture(&d, Placement::CpuAccessible).unwrap_err(),
            DeviceError::Injected("create mirror")
        );
        //device-local creation is a different call
        device.create_texture(&d, Placement::DeviceLocal).unwrap();
        device.create_texture(&d, Placement::CpuAccessible).unwrap();
        assert_eq!(device.stats().mirrors_created, 1);
        assert_eq!(device.stats().device_resources_created, 1);
    }

    #[test]
    fn dropping_handles_releases_storage() {
        let device = SoftwareDevice::new();
        let texture = device
            .create_texture(&descriptor(Usage::empty()), Placement::DeviceLocal)
            .unwrap();
        let surface = device.surface_level(&texture, 1).unwrap();
        drop(texture);
        //the surface still holds the storage
        assert_eq!(device.stats().resources_released, 0);
        assert_eq!(device.surface_desc(&surface).width, 2);
        drop(surface);
        assert_eq!(device.stats().resources_released, 1);
    }

    #[test]
    fn device_context_holds_the_level() {
        let device = SoftwareDevice::new();
        let texture = device
            .create_texture(&descriptor(Usage::empty()), Placement::CpuAccessible)
            .unwrap();
        let surface = device.surface_level(&texture, 0).unwrap();
        let dc = device.get_dc(&surface).unwrap();
        assert!(device.is_level_locked(&texture, 0));
        assert_eq!(
            device
                .lock_surface(&surface, None, LockFlags::READ_ONLY)
                .unwrap_err(),
            DeviceError::AlreadyLocked
        );
        device.release_dc(&surface, dc).unwrap();
        assert!(!device.is_level_locked(&texture, 0));
    }
}
