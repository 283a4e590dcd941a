// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*! managed_pool emulates a managed memory pool on graphics backends that do not have one.

Some GPU APIs let the application lock a texture or buffer and read or write it from the
CPU, while the driver keeps a device-local copy for rendering and moves data between the
two behind the scenes.  Newer backends dropped that pool: device-local resources cannot be
mapped, and the application has to shuttle data through staging resources itself.

managed_pool puts the pool back.  Each managed resource pairs a device-local resource with
a CPU-accessible mirror and keeps the two coherent:

| Event                      | What happens                                                    |
|----------------------------|-----------------------------------------------------------------|
| first CPU lock             | the mirror is allocated (exactly once, even under contention)   |
| CPU lock                   | device-local changes are pulled into the mirror                 |
| CPU unlock                 | the mirror is marked dirty                                      |
| bind for rendering         | mirror changes are pushed to the device-local resource          |
| GPU-side mutation          | the device-local side is marked dirty                           |

If both sides are dirty, CPU writes win: the push runs and the pull waits for the next pass.

# Resource kinds

| Type                                         | Device-local resource | Transfer                       |
|----------------------------------------------|-----------------------|--------------------------------|
| [`bindings::managed::Texture`]               | texture with mips     | device bulk update, per level  |
| [`bindings::managed::VertexBuffer`]          | vertex buffer         | lock, copy, unlock             |
| [`bindings::managed::IndexBuffer`]           | index buffer          | lock, copy, unlock             |
| [`bindings::managed::Surface`]               | none, a view          | through the parent texture     |

# Backends

Managed resources are generic over [`device::GraphicsDevice`].  Implement it for your GPU
API, or use the in-memory [`imp::software::SoftwareDevice`] (feature `backend_software`,
on by default), which refuses CPU locks on device-local textures just like the backends
this crate exists for.

```
# #[cfg(feature = "backend_software")] {
use std::sync::Arc;
use managed_pool::bindings::buffer_access::LockFlags;
use managed_pool::bindings::texture_builder::TextureBuilder;
use managed_pool::imp::software::SoftwareDevice;
use managed_pool::pixel_formats::PixelFormat;

let device = Arc::new(SoftwareDevice::new());
let texture = TextureBuilder::new(&device, 4, 4, PixelFormat::L8, "checker").build().unwrap();
let mut lock = texture.lock_rect(0, None, LockFlags::empty()).unwrap();
lock.fill(0xFF);
lock.unlock().unwrap();
texture.bind(0).unwrap();
assert_eq!(device.read_level(texture.device_side(), 0).unwrap(), vec![0xFF; 16]);
# }
```
*/

pub mod bindings;
pub mod coherence;
pub mod device;
pub mod error;
pub mod imp;
pub mod pixel_formats;

pub use bindings::managed::{IndexBuffer, Surface, Texture, VertexBuffer};
pub use coherence::{Direction, SyncOutcome};
pub use device::{DeviceError, GraphicsDevice};
pub use error::Error;
