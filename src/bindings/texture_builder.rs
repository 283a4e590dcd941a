// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Builder pattern for managed texture and buffer creation.

use crate::bindings::managed::buffer::{Buffer, BufferRole, Index, Vertex};
use crate::bindings::managed::texture::Texture;
use crate::bindings::visible_to::Usage;
use crate::device::{BufferDescriptor, BufferKind, DeviceError, GraphicsDevice, TextureDescriptor};
use crate::error::Error;
use crate::pixel_formats::{IndexFormat, PixelFormat};
use std::marker::PhantomData;
use std::sync::Arc;

/**
Builder for [`Texture`].

```
# #[cfg(feature = "backend_software")] {
use std::sync::Arc;
use managed_pool::bindings::texture_builder::TextureBuilder;
use managed_pool::imp::software::SoftwareDevice;
use managed_pool::pixel_formats::PixelFormat;

let device = Arc::new(SoftwareDevice::new());
let texture = TextureBuilder::new(&device, 64, 64, PixelFormat::A8R8G8B8, "sprite")
    .with_mipmaps(true)
    .build()
    .unwrap();
assert_eq!(texture.level_count(), 7);
assert!(!texture.has_mirror());
# }
```
*/
#[derive(Debug)]
pub struct TextureBuilder<'a, D> {
    device: &'a Arc<D>,
    width: u32,
    height: u32,
    format: PixelFormat,
    debug_name: &'a str,
    levels: u32,
    usage: Usage,
}

impl<'a, D: GraphicsDevice> TextureBuilder<'a, D> {
    /// A single-level texture with no usage flags.
    pub fn new(
        device: &'a Arc<D>,
        width: u32,
        height: u32,
        format: PixelFormat,
        debug_name: &'a str,
    ) -> Self {
        Self {
            device,
            width,
            height,
            format,
            debug_name,
            levels: 1,
            usage: Usage::empty(),
        }
    }

    /// Set the number of mip levels.  0 requests the full chain.
    pub fn with_levels(mut self, levels: u32) -> Self {
        self.levels = levels;
        self
    }

    /// Request the full mip chain, or a single level.
    pub fn with_mipmaps(mut self, mipmaps: bool) -> Self {
        self.levels = if mipmaps { 0 } else { 1 };
        self
    }

    /// Add usage flags.
    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage |= usage;
        self
    }

    /// Have the device regenerate sub-levels after every push.  Implies the full mip chain.
    pub fn with_autogen_mipmaps(mut self) -> Self {
        self.usage |= Usage::AUTOGEN_MIPMAP;
        self.levels = 0;
        self
    }

    pub fn descriptor(&self) -> TextureDescriptor {
        TextureDescriptor {
            width: self.width,
            height: self.height,
            levels: self.levels,
            usage: self.usage,
            format: self.format,
            debug_name: self.debug_name.to_string(),
        }
    }

    pub fn build(self) -> Result<Arc<Texture<D>>, Error> {
        Texture::new(self.device.clone(), self.descriptor())
    }
}

/// Builder for [`Buffer`].  Start from [`BufferBuilder::vertex`] or [`BufferBuilder::index`].
#[derive(Debug)]
pub struct BufferBuilder<'a, D, R> {
    device: &'a Arc<D>,
    length: usize,
    kind: BufferKind,
    debug_name: &'a str,
    usage: Usage,
    //an index count whose byte length does not fit in usize, reported by build
    overflowed_count: Option<usize>,
    role: PhantomData<R>,
}

impl<'a, D: GraphicsDevice> BufferBuilder<'a, D, Vertex> {
    /// A vertex buffer of `length` bytes with a declaration-based layout.
    pub fn vertex(device: &'a Arc<D>, length: usize, debug_name: &'a str) -> Self {
        Self {
            device,
            length,
            kind: BufferKind::Vertex { fvf: 0 },
            debug_name,
            usage: Usage::empty(),
            overflowed_count: None,
            role: PhantomData,
        }
    }

    /// Set the flexible vertex format.
    pub fn with_fvf(mut self, fvf: u32) -> Self {
        self.kind = BufferKind::Vertex { fvf };
        self
    }
}

impl<'a, D: GraphicsDevice> BufferBuilder<'a, D, Index> {
    /// An index buffer of `length` bytes.
    pub fn index(device: &'a Arc<D>, length: usize, format: IndexFormat, debug_name: &'a str) -> Self {
        Self {
            device,
            length,
            kind: BufferKind::Index { format },
            debug_name,
            usage: Usage::empty(),
            overflowed_count: None,
            role: PhantomData,
        }
    }

    /**
    An index buffer holding `count` indices of `format`.

    If the byte length overflows `usize`, [`BufferBuilder::build`] fails.
    */
    pub fn with_count(mut self, count: usize) -> Self {
        if let BufferKind::Index { format } = self.kind {
            match count.checked_mul(format.bytes_per_index() as usize) {
                Some(length) => {
                    self.length = length;
                    self.overflowed_count = None;
                }
                None => self.overflowed_count = Some(count),
            }
        }
        self
    }
}

impl<D: GraphicsDevice, R: BufferRole> BufferBuilder<'_, D, R> {
    /// Add usage flags.
    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage |= usage;
        self
    }

    pub fn descriptor(&self) -> BufferDescriptor {
        BufferDescriptor {
            length: self.length,
            usage: self.usage,
            kind: self.kind,
            debug_name: self.debug_name.to_string(),
        }
    }

    pub fn build(self) -> Result<Arc<Buffer<D, R>>, Error> {
        if let Some(count) = self.overflowed_count {
            return Err(Error::Creation {
                kind: R::RESOURCE_TYPE,
                source: DeviceError::InvalidCall(format!(
                    "{count} indices do not fit in a buffer"
                )),
            });
        }
        Buffer::new(self.device.clone(), self.descriptor())
    }
}

#[cfg(all(test, feature = "backend_software"))]
mod tests {
    use super::{BufferBuilder, TextureBuilder};
    use crate::bindings::visible_to::{ResourceType, Usage};
    use crate::device::{BufferKind, DeviceError};
    use crate::error::Error;
    use crate::imp::software::SoftwareDevice;
    use crate::pixel_formats::{IndexFormat, PixelFormat};
    use std::sync::Arc;

    #[test]
    fn autogen_implies_full_chain() {
        let device = Arc::new(SoftwareDevice::new());
        let builder = TextureBuilder::new(&device, 16, 8, PixelFormat::R5G6B5, "autogen")
            .with_levels(1)
            .with_autogen_mipmaps();
        let descriptor = builder.descriptor();
        assert_eq!(descriptor.levels, 0);
        assert!(descriptor.usage.contains(Usage::AUTOGEN_MIPMAP));
        let texture = builder.build().unwrap();
        assert_eq!(texture.level_count(), 5);
    }

    #[test]
    fn index_count_sets_length() {
        let device = Arc::new(SoftwareDevice::new());
        let buffer = BufferBuilder::index(&device, 0, IndexFormat::Index32, "quads")
            .with_count(6)
            .build()
            .unwrap();
        assert_eq!(buffer.len(), 24);
        assert_eq!(
            buffer.desc().kind,
            BufferKind::Index {
                format: IndexFormat::Index32
            }
        );
    }

    #[test]
    fn huge_index_count_fails_to_build() {
        let device = Arc::new(SoftwareDevice::new());
        let err = BufferBuilder::index(&device, 0, IndexFormat::Index32, "huge")
            .with_count(usize::MAX / 2)
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Creation {
                kind: ResourceType::IndexBuffer,
                source: DeviceError::InvalidCall(_),
            }
        ));
        //nothing reached the device
        assert_eq!(device.stats().device_resources_created, 0);
    }

    #[test]
    fn vertex_builder_carries_fvf() {
        let device = Arc::new(SoftwareDevice::new());
        let buffer = BufferBuilder::vertex(&device, 32, "tri")
            .with_fvf(0x142)
            .with_usage(Usage::WRITE_ONLY)
            .build()
            .unwrap();
        assert_eq!(buffer.desc().kind, BufferKind::Vertex { fvf: 0x142 });
        assert_eq!(buffer.usage(), Usage::WRITE_ONLY);
    }
}
