// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Pixel and index formats for managed resources.
//!
//! A managed resource and its mirror must agree byte-for-byte, so the format is carried
//! as a runtime value on every descriptor and passed unchanged to the graphics device for
//! both the device-local resource and the mirror.
//!
//! Each format encodes:
//!
//! - Number of bytes per texel
//! - Channel layout (8-bit unorm, 16-bit unorm, packed 5:6:5, 16/32-bit float)
//!
//! The channel layout is only needed by backends that regenerate mip chains in
//! software (see [`PixelFormat::average_texels`]).
//!
//! # Available Formats
//!
//! ## Single Channel
//! - [`PixelFormat::A8`], [`PixelFormat::L8`] - 8-bit normalized
//! - [`PixelFormat::R16F`] - 16-bit half-precision float
//! - [`PixelFormat::R32F`] - 32-bit single-precision float
//!
//! ## Multi-Channel
//! - [`PixelFormat::R5G6B5`] - packed 16-bit color
//! - [`PixelFormat::A8R8G8B8`], [`PixelFormat::X8R8G8B8`], [`PixelFormat::A8B8G8R8`] - 4-channel 8-bit normalized
//! - [`PixelFormat::G16R16F`] - 2-channel 16-bit float
//! - [`PixelFormat::A16B16G16R16`] - 4-channel 16-bit normalized
//! - [`PixelFormat::A16B16G16R16F`] - 4-channel 16-bit float
//! - [`PixelFormat::A32B32G32R32F`] - 4-channel 32-bit float
//!
//! # Examples
//!
//! ```
//! use managed_pool::pixel_formats::PixelFormat;
//!
//! assert_eq!(PixelFormat::A8R8G8B8.bytes_per_texel(), 4);
//! assert_eq!(PixelFormat::A8R8G8B8.row_bytes(64), 256);
//! ```

pub use half::f16;

/// Texel format of a texture and its mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum PixelFormat {
    A8,
    L8,
    R5G6B5,
    A8R8G8B8,
    X8R8G8B8,
    A8B8G8R8,
    R16F,
    G16R16F,
    A16B16G16R16,
    A16B16G16R16F,
    R32F,
    A32B32G32R32F,
}

/// How the bytes of one channel are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Channels {
    Unorm8(usize),
    Unorm16(usize),
    Float16(usize),
    Float32(usize),
    Packed565,
}

impl PixelFormat {
    /// Number of bytes per texel for this format.
    pub const fn bytes_per_texel(self) -> u8 {
        match self {
            PixelFormat::A8 | PixelFormat::L8 => 1,
            PixelFormat::R5G6B5 | PixelFormat::R16F => 2,
            PixelFormat::A8R8G8B8
            | PixelFormat::X8R8G8B8
            | PixelFormat::A8B8G8R8
            | PixelFormat::G16R16F
            | PixelFormat::R32F => 4,
            PixelFormat::A16B16G16R16 | PixelFormat::A16B16G16R16F => 8,
            PixelFormat::A32B32G32R32F => 16,
        }
    }

    /// Tightly packed bytes per row of a level `width` texels wide.
    pub const fn row_bytes(self, width: u32) -> usize {
        width as usize * self.bytes_per_texel() as usize
    }

    const fn channels(self) -> Channels {
        match self {
            PixelFormat::A8 | PixelFormat::L8 => Channels::Unorm8(1),
            PixelFormat::A8R8G8B8 | PixelFormat::X8R8G8B8 | PixelFormat::A8B8G8R8 => {
                Channels::Unorm8(4)
            }
            PixelFormat::R5G6B5 => Channels::Packed565,
            PixelFormat::A16B16G16R16 => Channels::Unorm16(4),
            PixelFormat::R16F => Channels::Float16(1),
            PixelFormat::G16R16F => Channels::Float16(2),
            PixelFormat::A16B16G16R16F => Channels::Float16(4),
            PixelFormat::R32F => Channels::Float32(1),
            PixelFormat::A32B32G32R32F => Channels::Float32(4),
        }
    }

    /**
    Compute the average of several texels, channel by channel, into `out`.

    Used for mipmap generation: a texel of level `n + 1` is the average of up to four
    texels of level `n`.  Every slice in `texels` and `out` must be exactly
    [`Self::bytes_per_texel`] long.  Integer channels round down.
    */
    pub fn average_texels(self, texels: &[&[u8]], out: &mut [u8]) {
        let bpt = self.bytes_per_texel() as usize;
        assert_eq!(out.len(), bpt, "output slice is not one texel");
        assert!(!texels.is_empty(), "cannot average zero texels");
        debug_assert!(texels.iter().all(|t| t.len() == bpt));
        let count = texels.len();
        match self.channels() {
            Channels::Unorm8(c) => {
                for ch in 0..c {
                    let sum: u32 = texels.iter().map(|t| t[ch] as u32).sum();
                    out[ch] = (sum / count as u32) as u8;
                }
            }
            Channels::Unorm16(c) => {
                for ch in 0..c {
                    let sum: u32 = texels.iter().map(|t| read_u16(t, ch) as u32).sum();
                    write_u16(out, ch, (sum / count as u32) as u16);
                }
            }
            Channels::Float16(c) => {
                for ch in 0..c {
                    let sum: f32 = texels
                        .iter()
                        .map(|t| f16::from_bits(read_u16(t, ch)).to_f32())
                        .sum();
                    write_u16(out, ch, f16::from_f32(sum / count as f32).to_bits());
                }
            }
            Channels::Float32(c) => {
                for ch in 0..c {
                    let sum: f32 = texels
                        .iter()
                        .map(|t| {
                            let b = &t[ch * 4..ch * 4 + 4];
                            f32::from_le_bytes([b[0], b[1], b[2], b[3]])
                        })
                        .sum();
                    out[ch * 4..ch * 4 + 4].copy_from_slice(&(sum / count as f32).to_le_bytes());
                }
            }
            Channels::Packed565 => {
                let mut sum = (0_u32, 0_u32, 0_u32);
                for t in texels {
                    let packed = read_u16(t, 0) as u32;
                    sum.0 += packed >> 11;
                    sum.1 += (packed >> 5) & 0x3F;
                    sum.2 += packed & 0x1F;
                }
                let c = count as u32;
                let packed = ((sum.0 / c) << 11) | ((sum.1 / c) << 5) | (sum.2 / c);
                write_u16(out, 0, packed as u16);
            }
        }
    }
}

fn read_u16(texel: &[u8], channel: usize) -> u16 {
    u16::from_le_bytes([texel[channel * 2], texel[channel * 2 + 1]])
}

fn write_u16(texel: &mut [u8], channel: usize, value: u16) {
    texel[channel * 2..channel * 2 + 2].copy_from_slice(&value.to_le_bytes());
}

/// Element format of an index buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexFormat {
    Index16,
    Index32,
}

impl IndexFormat {
    pub const fn bytes_per_index(self) -> u8 {
        match self {
            IndexFormat::Index16 => 2,
            IndexFormat::Index32 => 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{PixelFormat, f16};

    #[test]
    fn unorm8_average_rounds_down() {
        let a = [10_u8, 20, 30, 255];
        let b = [11_u8, 20, 31, 0];
        let mut out = [0_u8; 4];
        PixelFormat::A8R8G8B8.average_texels(&[&a[..], &b[..]], &mut out);
        assert_eq!(out, [10, 20, 30, 127]);
    }

    #[test]
    fn half_average() {
        let a = f16::from_f32(1.0).to_bits().to_le_bytes();
        let b = f16::from_f32(2.0).to_bits().to_le_bytes();
        let mut out = [0_u8; 2];
        PixelFormat::R16F.average_texels(&[&a[..], &b[..]], &mut out);
        assert_eq!(f16::from_bits(u16::from_le_bytes(out)).to_f32(), 1.5);
    }

    #[test]
    fn packed_565_average() {
        //pure red and pure blue average to half red, half blue
        let red = 0xF800_u16.to_le_bytes();
        let blue = 0x001F_u16.to_le_bytes();
        let mut out = [0_u8; 2];
        PixelFormat::R5G6B5.average_texels(&[&red[..], &blue[..]], &mut out);
        assert_eq!(u16::from_le_bytes(out), (15 << 11) | 15);
    }

    #[test]
    fn float32_average() {
        let a: Vec<u8> = [1.0_f32, 0.0, 4.0, 1.0].iter().flat_map(|f| f.to_le_bytes()).collect();
        let b: Vec<u8> = [3.0_f32, 2.0, 0.0, 1.0].iter().flat_map(|f| f.to_le_bytes()).collect();
        let mut out = [0_u8; 16];
        PixelFormat::A32B32G32R32F.average_texels(&[&a[..], &b[..]], &mut out);
        let floats: Vec<f32> = out
            .chunks(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        assert_eq!(floats, vec![2.0, 1.0, 2.0, 1.0]);
    }
}
