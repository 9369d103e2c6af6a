//! Sky environment sampled on path misses.

use ember_math::Vec3;
use std::f32::consts::PI;

/// A square equirectangular sky panorama.
///
/// Loading from disk is an external concern; the core receives the decoded
/// radiance data directly.
#[derive(Clone, Debug)]
pub struct Sky {
    pub size: u32,
    pub data: Vec<Vec3>,
}

impl Sky {
    /// Build from raw panorama data. `data` holds `size * size` texels.
    pub fn new(size: u32, data: Vec<Vec3>) -> Self {
        assert_eq!(data.len(), (size * size) as usize);
        Self { size, data }
    }

    /// A uniform sky, used for tests and scenes without an environment map.
    pub fn constant(color: Vec3) -> Self {
        Self {
            size: 1,
            data: vec![color],
        }
    }

    /// Sample the sky along a unit direction.
    pub fn sample(&self, direction: Vec3) -> Vec3 {
        if self.size == 1 {
            return self.data[0];
        }

        // Equirectangular mapping: phi around Y, theta from the pole
        let phi = direction.z.atan2(direction.x);
        let theta = direction.y.clamp(-1.0, 1.0).acos();

        let u = (phi + PI) / (2.0 * PI);
        let v = theta / PI;

        let x = ((u * self.size as f32) as u32).min(self.size - 1);
        let y = ((v * self.size as f32) as u32).min(self.size - 1);

        self.data[(y * self.size + x) as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_sky() {
        let sky = Sky::constant(Vec3::new(0.5, 0.7, 1.0));
        let s = sky.sample(Vec3::new(0.0, 1.0, 0.0));
        assert_eq!(s, Vec3::new(0.5, 0.7, 1.0));
    }

    #[test]
    fn test_panorama_poles() {
        // 2x2 panorama: top row red, bottom row blue
        let sky = Sky::new(
            2,
            vec![Vec3::X, Vec3::X, Vec3::Z, Vec3::Z],
        );

        let up = sky.sample(Vec3::new(0.0, 1.0, 0.0));
        assert_eq!(up, Vec3::X);

        let down = sky.sample(Vec3::new(0.0, -1.0, 0.0));
        assert_eq!(down, Vec3::Z);
    }
}
