//! Per-slot RNG construction and sampling helpers.
//!
//! Wavefront kernels run with no ordering between slots, so every slot
//! derives its own generator from (pixel, frame, stage). This keeps frames
//! deterministic under any thread schedule.

use ember_math::{Vec2, Vec3};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use std::f32::consts::PI;

/// Stage salts; each kernel that draws random numbers gets its own stream.
pub mod salt {
    pub const GENERATE: u32 = 0x01;
    pub const SORT: u32 = 0x02;
    pub const DIFFUSE: u32 = 0x03;
    pub const DIELECTRIC: u32 = 0x04;
    pub const GLOSSY: u32 = 0x05;
}

/// Build the generator for one kernel invocation on one path.
pub fn kernel_rng(pixel_index: u32, frame: u32, stage_salt: u32, bounce: u32) -> SmallRng {
    let key = (pixel_index as u64)
        ^ ((frame as u64) << 24)
        ^ ((stage_salt as u64) << 48)
        ^ ((bounce as u64) << 56);
    SmallRng::seed_from_u64(split_mix(key))
}

/// One round of splitmix64; decorrelates nearby keys.
fn split_mix(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D049BB133111EB);
    x ^ (x >> 31)
}

/// Build an orthonormal tangent/bitangent pair from a unit normal.
pub fn tangent_frame(n: Vec3) -> (Vec3, Vec3) {
    let sign = if n.z >= 0.0 { 1.0 } else { -1.0 };
    let a = -1.0 / (sign + n.z);
    let b = n.x * n.y * a;

    let tangent = Vec3::new(1.0 + sign * n.x * n.x * a, sign * b, -sign * n.x);
    let bitangent = Vec3::new(b, sign + n.y * n.y * a, -n.y);

    (tangent, bitangent)
}

/// Cosine-weighted direction in the hemisphere around a normal.
///
/// Malley's method: sample the unit disk, project up. PDF = cos(theta) / pi.
pub fn cosine_weighted_direction(normal: Vec3, r1: f32, r2: f32) -> Vec3 {
    let sqrt_r1 = r1.sqrt();
    let theta = 2.0 * PI * r2;
    let x = sqrt_r1 * theta.cos();
    let y = sqrt_r1 * theta.sin();
    let z = (1.0 - r1).sqrt();

    let (tangent, bitangent) = tangent_frame(normal);
    x * tangent + y * bitangent + z * normal
}

/// Map a local direction (z up) into the frame of a unit normal.
pub fn local_to_world(local: Vec3, normal: Vec3) -> Vec3 {
    let (tangent, bitangent) = tangent_frame(normal);
    local.x * tangent + local.y * bitangent + local.z * normal
}

/// Uniform barycentric sample on a triangle.
pub fn uniform_triangle(r1: f32, r2: f32) -> Vec2 {
    let sqrt_r1 = r1.sqrt();
    Vec2::new(1.0 - sqrt_r1, r2 * sqrt_r1)
}

/// Mirror reflection of `v` about unit normal `n`.
#[inline]
pub fn reflect(v: Vec3, n: Vec3) -> Vec3 {
    v - 2.0 * v.dot(n) * n
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_tangent_frame_orthonormal() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..100 {
            let n = Vec3::new(
                rng.gen::<f32>() * 2.0 - 1.0,
                rng.gen::<f32>() * 2.0 - 1.0,
                rng.gen::<f32>() * 2.0 - 1.0,
            )
            .normalize();

            let (t, b) = tangent_frame(n);
            assert!((t.length() - 1.0).abs() < 1e-4);
            assert!((b.length() - 1.0).abs() < 1e-4);
            assert!(t.dot(n).abs() < 1e-4);
            assert!(b.dot(n).abs() < 1e-4);
            assert!(t.dot(b).abs() < 1e-4);
        }
    }

    #[test]
    fn test_cosine_direction_in_hemisphere() {
        let mut rng = StdRng::seed_from_u64(7);
        let normal = Vec3::new(0.0, 1.0, 0.0);
        for _ in 0..200 {
            let dir = cosine_weighted_direction(normal, rng.gen(), rng.gen());
            assert!((dir.length() - 1.0).abs() < 1e-3);
            assert!(dir.dot(normal) >= 0.0);
        }
    }

    #[test]
    fn test_uniform_triangle_in_domain() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..200 {
            let uv = uniform_triangle(rng.gen(), rng.gen());
            assert!(uv.x >= 0.0);
            assert!(uv.y >= 0.0);
            assert!(uv.x + uv.y <= 1.0 + 1e-5);
        }
    }

    #[test]
    fn test_reflect() {
        let v = Vec3::new(1.0, -1.0, 0.0).normalize();
        let n = Vec3::Y;
        let r = reflect(v, n);
        assert!((r - Vec3::new(1.0, 1.0, 0.0).normalize()).length() < 1e-5);
    }

    #[test]
    fn test_kernel_rng_deterministic() {
        let mut a = kernel_rng(17, 3, salt::DIFFUSE, 1);
        let mut b = kernel_rng(17, 3, salt::DIFFUSE, 1);
        assert_eq!(a.gen::<u32>(), b.gen::<u32>());

        // Different stage decorrelates
        let mut c = kernel_rng(17, 3, salt::GLOSSY, 1);
        assert_ne!(a.gen::<u32>(), c.gen::<u32>());
    }
}
