// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Managed resources.

Each managed resource owns a device-local resource and, once the CPU has asked for its
contents, a CPU-accessible mirror.  The resource decides when the two are synchronized:

| Operation | Synchronization |
|-----------|-----------------|
| CPU lock (`lock_rect`, `lock`) | allocate the mirror, then pull if the device-local side is dirty |
| CPU unlock | mark the mirror dirty, unless the lock was read-only |
| bind for rendering | push if the mirror is dirty |
| device-side mutation (`generate_mip_sublevels`) | mark the device-local side dirty |

A [`Surface`] is a view of one level of a [`Texture`] and has no storage of its own.

Managed resources are shared as `Arc`s.  Dropping the last one releases the device-local
resource and the mirror.  A surface does not keep its texture alive.

Operations that have nothing to do with coherence (priority, private data, preload) are
made directly on the device-local handle, see [`crate::device::DeviceResource`].
*/

pub mod buffer;
pub mod surface;
pub mod texture;

pub use buffer::{Buffer, BufferLock, BufferRole, Index, IndexBuffer, Vertex, VertexBuffer};
pub use surface::{Surface, SurfaceDc, SurfaceLock};
pub use texture::{Texture, TextureLock};
