// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! In-memory storage behind software device handles.

use crate::bindings::buffer_access::LockFlags;
use crate::bindings::coordinates::Rect;
use crate::bindings::visible_to::{Placement, ResourceType, TextureFilter, Usage};
use crate::device::{
    BufferDescriptor, DeviceError, Guid, MappedRegion, SurfaceDesc, TextureDescriptor,
};
use std::collections::HashMap;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LockState {
    Unlocked,
    Read(u32),
    Write,
}

#[derive(Debug)]
struct RegionState {
    bytes: Box<[u8]>,
    lock: LockState,
}

/**
A lockable run of bytes.

While a region is locked the CPU reaches its bytes through a raw pointer, outside the
mutex.  The lock state keeps device-side copies away from it until it is unlocked: a
region locked for writing can be neither read nor written by the device, and a region
locked for reading can only be read.
*/
#[derive(Debug)]
pub(super) struct Region {
    state: Mutex<RegionState>,
}

impl Region {
    pub fn new(len: usize) -> Self {
        Region {
            state: Mutex::new(RegionState {
                bytes: vec![0; len].into_boxed_slice(),
                lock: LockState::Unlocked,
            }),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, RegionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_locked(&self) -> bool {
        self.state().lock != LockState::Unlocked
    }

    pub fn lock(
        &self,
        offset: usize,
        len: usize,
        pitch: usize,
        flags: LockFlags,
    ) -> Result<MappedRegion, DeviceError> {
        let mut state = self.state();
        let end = offset
            .checked_add(len)
            .ok_or_else(|| DeviceError::InvalidCall("lock range overflows".to_string()))?;
        if end > state.bytes.len() {
            return Err(DeviceError::InvalidCall(format!(
                "lock range {offset}..{end} exceeds {} bytes",
                state.bytes.len()
            )));
        }
        state.lock = match (state.lock, flags.is_read_only()) {
            (LockState::Unlocked, true) => LockState::Read(1),
            (LockState::Read(n), true) => LockState::Read(n + 1),
            (LockState::Unlocked, false) => LockState::Write,
            _ => return Err(DeviceError::AlreadyLocked),
        };
        //Box<[u8]> never moves its heap allocation, so the pointer outlives the guard
        let ptr = NonNull::new(state.bytes[offset..].as_mut_ptr())
            .ok_or_else(|| DeviceError::InvalidCall("null region".to_string()))?;
        //Safety: the lock state keeps device copies off these bytes until unlock
        Ok(unsafe { MappedRegion::new(ptr, len, pitch) })
    }

    pub fn unlock(&self) -> Result<(), DeviceError> {
        let mut state = self.state();
        state.lock = match state.lock {
            LockState::Unlocked => return Err(DeviceError::NotLocked),
            LockState::Read(1) | LockState::Write => LockState::Unlocked,
            LockState::Read(n) => LockState::Read(n - 1),
        };
        Ok(())
    }

    /// Copies the bytes out.  Fails while locked for writing.
    pub fn read(&self) -> Result<Vec<u8>, DeviceError> {
        let state = self.state();
        if state.lock == LockState::Write {
            return Err(DeviceError::AlreadyLocked);
        }
        Ok(state.bytes.to_vec())
    }

    /// Writes `data` at `offset`.  Fails while locked.
    pub fn write(&self, offset: usize, data: &[u8]) -> Result<(), DeviceError> {
        let mut state = self.state();
        if state.lock != LockState::Unlocked {
            return Err(DeviceError::AlreadyLocked);
        }
        let end = offset + data.len();
        if end > state.bytes.len() {
            return Err(DeviceError::InvalidCall(format!(
                "write {offset}..{end} exceeds {} bytes",
                state.bytes.len()
            )));
        }
        state.bytes[offset..end].copy_from_slice(data);
        Ok(())
    }
}

/// Bookkeeping every software resource carries.
#[derive(Debug)]
pub(super) struct Common {
    pub id: u64,
    pub placement: Placement,
    priority: AtomicU32,
    private_data: Mutex<HashMap<Guid, Vec<u8>>>,
    released: Arc<AtomicUsize>,
}

impl Common {
    pub fn new(id: u64, placement: Placement, released: Arc<AtomicUsize>) -> Self {
        Common {
            id,
            placement,
            priority: AtomicU32::new(0),
            private_data: Mutex::new(HashMap::new()),
            released,
        }
    }

    pub fn set_priority(&self, priority: u32) -> u32 {
        self.priority.swap(priority, Ordering::Relaxed)
    }

    pub fn priority(&self) -> u32 {
        self.priority.load(Ordering::Relaxed)
    }

    fn private_data(&self) -> std::sync::MutexGuard<'_, HashMap<Guid, Vec<u8>>> {
        self.private_data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_private_data(&self, guid: Guid, data: &[u8]) {
        self.private_data().insert(guid, data.to_vec());
    }

    pub fn get_private_data(&self, guid: Guid) -> Result<Vec<u8>, DeviceError> {
        self.private_data()
            .get(&guid)
            .cloned()
            .ok_or(DeviceError::NotFound)
    }

    pub fn free_private_data(&self, guid: Guid) -> Result<(), DeviceError> {
        self.private_data()
            .remove(&guid)
            .map(|_| ())
            .ok_or(DeviceError::NotFound)
    }
}

impl Drop for Common {
    fn drop(&mut self) {
        self.released.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug)]
pub(super) struct TextureStorage {
    pub common: Common,
    /// Level count is resolved.
    pub descriptor: TextureDescriptor,
    pub levels: Vec<Region>,
    lod: AtomicU32,
    filter: Mutex<TextureFilter>,
    //outstanding device contexts, by level
    dcs: Mutex<HashMap<u32, u64>>,
}

impl TextureStorage {
    pub fn new(common: Common, descriptor: TextureDescriptor) -> Self {
        let levels = (0..descriptor.levels)
            .map(|level| {
                let (w, h) = descriptor.level_extent(level);
                Region::new(descriptor.format.row_bytes(w) * h as usize)
            })
            .collect();
        TextureStorage {
            common,
            descriptor,
            levels,
            lod: AtomicU32::new(0),
            filter: Mutex::new(TextureFilter::default()),
            dcs: Mutex::new(HashMap::new()),
        }
    }

    pub fn level(&self, level: u32) -> Result<&Region, DeviceError> {
        self.levels
            .get(level as usize)
            .ok_or(DeviceError::LevelOutOfRange { level })
    }

    pub fn pitch(&self, level: u32) -> usize {
        let (w, _) = self.descriptor.level_extent(level);
        self.descriptor.format.row_bytes(w)
    }

    /// The device-local placement cannot be mapped unless the texture is dynamic.
    pub fn check_lockable(&self) -> Result<(), DeviceError> {
        if self.common.placement == Placement::DeviceLocal
            && !self.descriptor.usage.contains(Usage::DYNAMIC)
        {
            return Err(DeviceError::NotLockable);
        }
        Ok(())
    }

    pub fn lock_level(
        &self,
        level: u32,
        rect: Option<Rect>,
        flags: LockFlags,
    ) -> Result<MappedRegion, DeviceError> {
        self.check_lockable()?;
        let region = self.level(level)?;
        let (w, h) = self.descriptor.level_extent(level);
        let rect = rect.unwrap_or_else(|| Rect::full(w, h));
        if rect.is_empty() || !rect.fits_within(w, h) {
            return Err(DeviceError::InvalidCall(format!(
                "rect {rect:?} does not fit level {level} ({w}x{h})"
            )));
        }
        let pitch = self.pitch(level);
        let bpt = self.descriptor.format.bytes_per_texel() as usize;
        let offset = rect.top as usize * pitch + rect.left as usize * bpt;
        let len = (rect.height() as usize - 1) * pitch + rect.width() as usize * bpt;
        region.lock(offset, len, pitch, flags)
    }

    pub fn level_desc(&self, level: u32) -> Result<SurfaceDesc, DeviceError> {
        self.level(level)?;
        let (width, height) = self.descriptor.level_extent(level);
        Ok(SurfaceDesc {
            width,
            height,
            format: self.descriptor.format,
            usage: self.descriptor.usage,
            placement: self.common.placement,
        })
    }

    pub fn set_lod(&self, lod: u32) -> u32 {
        self.lod.swap(lod, Ordering::Relaxed)
    }

    pub fn lod(&self) -> u32 {
        self.lod.load(Ordering::Relaxed)
    }

    pub fn set_filter(&self, filter: TextureFilter) {
        *self.filter.lock().unwrap_or_else(PoisonError::into_inner) = filter;
    }

    pub fn filter(&self) -> TextureFilter {
        *self.filter.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get_dc(&self, level: u32, dc: u64) -> Result<(), DeviceError> {
        //a device context holds the whole level for writing
        self.lock_level(level, None, LockFlags::empty())?;
        self.dcs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(level, dc);
        Ok(())
    }

    pub fn release_dc(&self, level: u32, dc: u64) -> Result<(), DeviceError> {
        let mut dcs = self.dcs.lock().unwrap_or_else(PoisonError::into_inner);
        match dcs.get(&level) {
            Some(outstanding) if *outstanding == dc => {
                dcs.remove(&level);
                self.level(level)?.unlock()
            }
            _ => Err(DeviceError::InvalidCall(format!(
                "device context {dc} was not handed out for level {level}"
            ))),
        }
    }

    /**
    Rebuilds `level` from the level above it with a 2x2 box filter.

    Odd extents clamp to the last row and column, so the edge texels are weighted twice.
    */
    pub fn downsample_into(&self, level: u32) -> Result<(), DeviceError> {
        let format = self.descriptor.format;
        let bpt = format.bytes_per_texel() as usize;
        let source = self.level(level - 1)?.read()?;
        let (sw, sh) = self.descriptor.level_extent(level - 1);
        let (w, h) = self.descriptor.level_extent(level);
        let source_pitch = self.pitch(level - 1);
        let texel = |x: u32, y: u32| {
            let x = x.min(sw - 1) as usize;
            let y = y.min(sh - 1) as usize;
            let start = y * source_pitch + x * bpt;
            &source[start..start + bpt]
        };
        let mut out = vec![0_u8; format.row_bytes(w) * h as usize];
        for y in 0..h {
            for x in 0..w {
                let quad = [
                    texel(2 * x, 2 * y),
                    texel(2 * x + 1, 2 * y),
                    texel(2 * x, 2 * y + 1),
                    texel(2 * x + 1, 2 * y + 1),
                ];
                let start = y as usize * format.row_bytes(w) + x as usize * bpt;
                format.average_texels(&quad, &mut out[start..start + bpt]);
            }
        }
        self.level(level)?.write(0, &out)
    }
}

#[derive(Debug)]
pub(super) struct BufferStorage {
    pub common: Common,
    pub descriptor: BufferDescriptor,
    pub region: Region,
}

impl BufferStorage {
    pub fn new(common: Common, descriptor: BufferDescriptor) -> Self {
        let region = Region::new(descriptor.length);
        BufferStorage {
            common,
            descriptor,
            region,
        }
    }

    pub fn lock(
        &self,
        offset: usize,
        size: usize,
        flags: LockFlags,
    ) -> Result<MappedRegion, DeviceError> {
        let len = if size == 0 {
            self.descriptor.length.saturating_sub(offset)
        } else {
            size
        };
        self.region.lock(offset, len, len, flags)
    }

    pub fn resource_type(&self) -> ResourceType {
        self.descriptor.resource_type()
    }
}
