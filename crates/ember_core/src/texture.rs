//! Mip-mapped textures for material albedo lookups.
//!
//! Decoding and mip generation happen once at scene build; the shading
//! kernels only ever sample. File I/O lives outside the core - textures
//! arrive as raw pixel data.

use ember_math::Vec3;

/// A single mip level: RGB float pixels in linear space.
#[derive(Clone, Debug)]
struct MipLevel {
    width: u32,
    height: u32,
    pixels: Vec<Vec3>,
}

impl MipLevel {
    fn get(&self, x: u32, y: u32) -> Vec3 {
        self.pixels[(y * self.width + x) as usize]
    }

    /// Bilinear sample with wrap addressing. UVs in [0, 1), v up.
    fn sample(&self, u: f32, v: f32) -> Vec3 {
        let u = u.rem_euclid(1.0);
        let v = v.rem_euclid(1.0);

        let x = u * (self.width as f32 - 1.0);
        let y = (1.0 - v) * (self.height as f32 - 1.0);

        let x0 = x.floor() as u32;
        let y0 = y.floor() as u32;
        let x1 = (x0 + 1).min(self.width - 1);
        let y1 = (y0 + 1).min(self.height - 1);

        let fx = x.fract();
        let fy = y.fract();

        let top = self.get(x0, y0).lerp(self.get(x1, y0), fx);
        let bottom = self.get(x0, y1).lerp(self.get(x1, y1), fx);
        top.lerp(bottom, fy)
    }
}

/// A texture with a box-filtered mip chain.
#[derive(Clone, Debug)]
pub struct Texture {
    levels: Vec<MipLevel>,
}

impl Texture {
    /// Build from linear RGB float pixels, generating mips down to 1x1.
    pub fn from_linear(width: u32, height: u32, pixels: Vec<Vec3>) -> Self {
        assert_eq!(pixels.len(), (width * height) as usize);

        let mut levels = vec![MipLevel {
            width,
            height,
            pixels,
        }];

        while levels.last().unwrap().width > 1 || levels.last().unwrap().height > 1 {
            levels.push(downsample(levels.last().unwrap()));
        }

        log::debug!(
            "built texture {}x{} with {} mip levels",
            width,
            height,
            levels.len()
        );

        Self { levels }
    }

    /// Build from 8-bit RGBA data, decoding sRGB when flagged.
    ///
    /// Mirrors the sampler setup of the scene loaders that feed us: color
    /// maps are sRGB-encoded, data maps are linear.
    pub fn from_rgba8(width: u32, height: u32, data: &[u8], srgb: bool) -> Self {
        assert_eq!(data.len(), (width * height * 4) as usize);

        let pixels = data
            .chunks_exact(4)
            .map(|p| {
                if srgb {
                    Vec3::new(
                        srgb_to_linear(p[0]),
                        srgb_to_linear(p[1]),
                        srgb_to_linear(p[2]),
                    )
                } else {
                    Vec3::new(
                        p[0] as f32 / 255.0,
                        p[1] as f32 / 255.0,
                        p[2] as f32 / 255.0,
                    )
                }
            })
            .collect();

        Self::from_linear(width, height, pixels)
    }

    /// Create a solid color texture (1x1).
    pub fn solid_color(color: Vec3) -> Self {
        Self::from_linear(1, 1, vec![color])
    }

    pub fn width(&self) -> u32 {
        self.levels[0].width
    }

    pub fn height(&self) -> u32 {
        self.levels[0].height
    }

    /// Sample the base level.
    pub fn sample(&self, u: f32, v: f32) -> Vec3 {
        self.levels[0].sample(u, v)
    }

    /// Sample at a mip level chosen from the ray footprint.
    ///
    /// `lod` 0 is the base level; fractional LODs round to the nearer mip.
    pub fn sample_lod(&self, u: f32, v: f32, lod: f32) -> Vec3 {
        let level = (lod + 0.5).floor().clamp(0.0, (self.levels.len() - 1) as f32) as usize;
        self.levels[level].sample(u, v)
    }

    /// Number of mip levels.
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }
}

/// Halve a level in each dimension with a box filter.
fn downsample(src: &MipLevel) -> MipLevel {
    let width = (src.width / 2).max(1);
    let height = (src.height / 2).max(1);

    let mut pixels = Vec::with_capacity((width * height) as usize);
    for y in 0..height {
        for x in 0..width {
            let x0 = (x * 2).min(src.width - 1);
            let y0 = (y * 2).min(src.height - 1);
            let x1 = (x * 2 + 1).min(src.width - 1);
            let y1 = (y * 2 + 1).min(src.height - 1);

            let sum = src.get(x0, y0) + src.get(x1, y0) + src.get(x0, y1) + src.get(x1, y1);
            pixels.push(sum * 0.25);
        }
    }

    MipLevel {
        width,
        height,
        pixels,
    }
}

/// Convert an sRGB byte value to linear float.
fn srgb_to_linear(value: u8) -> f32 {
    let v = value as f32 / 255.0;
    if v <= 0.04045 {
        v / 12.92
    } else {
        ((v + 0.055) / 1.055).powf(2.4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solid_color_texture() {
        let tex = Texture::solid_color(Vec3::new(1.0, 0.5, 0.0));
        assert_eq!(tex.width(), 1);
        assert_eq!(tex.level_count(), 1);

        let sample = tex.sample(0.5, 0.5);
        assert!((sample.x - 1.0).abs() < 0.001);
        assert!((sample.y - 0.5).abs() < 0.001);
        assert!((sample.z - 0.0).abs() < 0.001);
    }

    #[test]
    fn test_mip_chain_depth() {
        let tex = Texture::from_linear(8, 8, vec![Vec3::ONE; 64]);
        // 8x8 -> 4x4 -> 2x2 -> 1x1
        assert_eq!(tex.level_count(), 4);
    }

    #[test]
    fn test_mip_average_preserved() {
        // Half black, half white: every mip must average to 0.5
        let mut pixels = vec![Vec3::ZERO; 32];
        pixels.extend(vec![Vec3::ONE; 32]);
        let tex = Texture::from_linear(8, 8, pixels);

        let coarsest = tex.sample_lod(0.5, 0.5, 10.0);
        assert!((coarsest.x - 0.5).abs() < 0.001);
    }

    #[test]
    fn test_srgb_to_linear() {
        assert!((srgb_to_linear(0) - 0.0).abs() < 0.001);
        assert!((srgb_to_linear(255) - 1.0).abs() < 0.001);

        // Mid-gray is darker in linear
        let mid = srgb_to_linear(128);
        assert!(mid < 0.5);
        assert!(mid > 0.1);
    }

    #[test]
    fn test_lod_clamps_to_available_levels() {
        let tex = Texture::solid_color(Vec3::ONE);
        let s = tex.sample_lod(0.0, 0.0, 12.0);
        assert_eq!(s, Vec3::ONE);
    }
}
