#![cfg(feature = "backend_software")]

use managed_pool::bindings::buffer_access::LockFlags;
use managed_pool::bindings::coordinates::Rect;
use managed_pool::bindings::texture_builder::TextureBuilder;
use managed_pool::bindings::visible_to::{ResourceType, Usage};
use managed_pool::device::{DeviceError, DeviceResource};
use managed_pool::imp::software::SoftwareDevice;
use managed_pool::pixel_formats::PixelFormat;
use managed_pool::{Error, Texture};
use std::sync::{Arc, Barrier, Mutex};

fn mipped(device: &Arc<SoftwareDevice>, usage: Usage) -> Arc<Texture<SoftwareDevice>> {
    TextureBuilder::new(device, 8, 8, PixelFormat::L8, "mipped")
        .with_mipmaps(true)
        .with_usage(usage)
        .build()
        .unwrap()
}

#[test]
fn writes_through_a_view_land_in_one_level() {
    logwise::info_sync!("=== view delegation ===");
    let device = Arc::new(SoftwareDevice::new());
    let texture = mipped(&device, Usage::empty());
    let surface = texture.surface_level(1).unwrap();
    assert_eq!(surface.device_side().resource_type(), ResourceType::Surface);

    let mut lock = surface.lock_rect(None, LockFlags::empty()).unwrap();
    assert_eq!(lock.len(), 16);
    lock.fill(0x42);
    lock.unlock().unwrap();
    assert!(texture.is_cpu_dirty());

    let level1 = texture.lock_rect(1, None, LockFlags::READ_ONLY).unwrap();
    assert!(level1.iter().all(|b| *b == 0x42));
    drop(level1);
    for other in [0, 2, 3] {
        let lock = texture.lock_rect(other, None, LockFlags::READ_ONLY).unwrap();
        assert!(lock.iter().all(|b| *b == 0), "level {other} changed");
    }

    //the next bind carries the view's write to the device
    texture.bind(0).unwrap();
    assert_eq!(device.read_level(texture.device_side(), 1).unwrap(), vec![0x42; 16]);
    assert!(device.read_level(texture.device_side(), 0).unwrap().iter().all(|b| *b == 0));
}

#[test]
fn rect_lock_refreshes_its_level() {
    let device = Arc::new(SoftwareDevice::new());
    let texture = mipped(&device, Usage::empty());
    texture.ensure_mirror().unwrap();
    texture.sync_if_needed().unwrap();

    //rendering writes level 2 without telling anyone
    device
        .write_level(texture.device_side(), 2, &[1, 2, 3, 4])
        .unwrap();
    let surface = texture.surface_level(2).unwrap();
    let lock = surface
        .lock_rect(Some(Rect::new(1, 0, 2, 2)), LockFlags::READ_ONLY)
        .unwrap();
    assert_eq!(lock.pitch(), 2);
    //rows 0 and 1 of column 1
    assert_eq!(lock[0], 2);
    assert_eq!(lock[lock.pitch()], 4);
    drop(lock);
    assert!(!texture.is_gpu_dirty());
    assert!(!texture.is_cpu_dirty());
}

#[test]
fn rect_lock_keeps_pending_cpu_writes() {
    let device = Arc::new(SoftwareDevice::new());
    let texture = mipped(&device, Usage::empty());
    let mut lock = texture.lock_rect(3, None, LockFlags::empty()).unwrap();
    lock[0] = 9;
    lock.unlock().unwrap();

    device.write_level(texture.device_side(), 3, &[1]).unwrap();
    let surface = texture.surface_level(3).unwrap();
    let lock = surface.lock_rect(None, LockFlags::READ_ONLY).unwrap();
    assert_eq!(&lock[..], &[9]);
}

#[test]
fn device_context_syncs_the_whole_texture() {
    let device = Arc::new(SoftwareDevice::new());
    let texture = mipped(&device, Usage::empty());
    let mut lock = texture.lock_rect(0, None, LockFlags::empty()).unwrap();
    lock.fill(5);
    lock.unlock().unwrap();

    let surface = texture.surface_level(0).unwrap();
    let dc = surface.get_dc().unwrap();
    //the pending write was pushed before the context was handed out
    assert_eq!(device.stats().texture_updates, 1);
    assert!(!texture.is_cpu_dirty());
    assert!(device.read_level(texture.device_side(), 0).unwrap().iter().all(|b| *b == 5));
    dc.release().unwrap();
    assert!(texture.is_cpu_dirty());
}

#[test]
fn views_do_not_keep_the_texture_alive() {
    let device = Arc::new(SoftwareDevice::new());
    let texture = mipped(&device, Usage::empty());
    let surface = texture.surface_level(0).unwrap();
    assert!(!surface.is_detached());
    drop(texture);
    assert!(surface.is_detached());
    assert!(surface.container().is_none());
    //the device-local level is still there for queries
    assert_eq!(surface.desc().width, 8);
    assert!(matches!(
        surface.get_dc(),
        Err(Error::Device(DeviceError::NotLockable))
    ));
}

#[test]
fn lock_keeps_the_texture_alive_until_released() {
    let device = Arc::new(SoftwareDevice::new());
    let texture = mipped(&device, Usage::empty());
    let surface = texture.surface_level(1).unwrap();
    let mut lock = surface.lock_rect(None, LockFlags::empty()).unwrap();
    drop(texture);
    assert!(!surface.is_detached());
    lock.fill(1);
    lock.unlock().unwrap();
    assert!(surface.is_detached());
    //the mirror is gone, the surface still holds the device-local level
    assert_eq!(device.stats().resources_released, 1);
}

#[test]
fn concurrent_first_view_locks_see_their_levels() {
    let device = Arc::new(SoftwareDevice::new());
    let texture = TextureBuilder::new(&device, 64, 64, PixelFormat::L8, "contended views")
        .with_mipmaps(true)
        .build()
        .unwrap();
    let levels = texture.level_count();
    for level in 0..levels {
        let side = (64 >> level) as usize;
        device
            .write_level(texture.device_side(), level, &vec![level as u8 + 1; side * side])
            .unwrap();
    }
    let surfaces: Vec<_> = (0..levels)
        .map(|level| texture.surface_level(level).unwrap())
        .collect();

    let barrier = Barrier::new(surfaces.len());
    std::thread::scope(|scope| {
        for surface in &surfaces {
            let barrier = &barrier;
            scope.spawn(move || {
                barrier.wait();
                let lock = surface.lock_rect(None, LockFlags::READ_ONLY).unwrap();
                let expected = surface.level() as u8 + 1;
                assert!(
                    lock.iter().all(|b| *b == expected),
                    "level {} saw stale texels",
                    surface.level()
                );
            });
        }
    });
    assert_eq!(device.stats().mirrors_created, 1);
    assert!(!texture.is_gpu_dirty());
}

#[test]
fn view_write_marks_before_unlocking() {
    let device = Arc::new(SoftwareDevice::new());
    let texture = mipped(&device, Usage::empty());
    let surface = texture.surface_level(2).unwrap();
    let mut lock = surface.lock_rect(None, LockFlags::empty()).unwrap();
    lock.fill(3);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let (watched, log) = (Arc::downgrade(&texture), seen.clone());
    device.on_unlock(move || {
        let dirty = watched.upgrade().is_some_and(|t| t.is_cpu_dirty());
        log.lock().unwrap().push(dirty);
    });
    lock.unlock().unwrap();
    let dc = surface.get_dc().unwrap();
    //the full sync before the context pushed the write
    assert!(!texture.is_cpu_dirty());
    dc.release().unwrap();
    assert_eq!(*seen.lock().unwrap(), vec![true, true]);
}
