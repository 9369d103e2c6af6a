//! Per-pixel frame buffers, reconstruction filtering and accumulation.
//!
//! Shadow splats and reconstruction can land several contributions on one
//! pixel from different threads, so the working buffers are built from
//! compare-exchange float atomics. Contributions are always added, never
//! overwritten; summation order does not matter.

use std::sync::atomic::{AtomicU32, Ordering};

use ember_core::settings::ReconstructionFilter;
use ember_core::{Screen, Settings};
use ember_math::{Vec2, Vec3, Vec4};
use rayon::prelude::*;

use crate::slots::Slots;

/// Component divisor floor for albedo demodulation.
const DEMOD_EPSILON: f32 = 1e-4;

/// An f32 with lock-free add, stored as its bit pattern.
pub struct AtomicF32(AtomicU32);

impl AtomicF32 {
    pub fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    pub fn add(&self, value: f32) {
        let mut current = self.0.load(Ordering::Relaxed);
        loop {
            let next = (f32::from_bits(current) + value).to_bits();
            match self
                .0
                .compare_exchange_weak(current, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return,
                Err(observed) => current = observed,
            }
        }
    }

    pub fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    pub fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

/// RGB plus a weight channel, all atomically addable.
pub struct Rgbw {
    r: AtomicF32,
    g: AtomicF32,
    b: AtomicF32,
    w: AtomicF32,
}

impl Rgbw {
    fn zero() -> Self {
        Self {
            r: AtomicF32::new(0.0),
            g: AtomicF32::new(0.0),
            b: AtomicF32::new(0.0),
            w: AtomicF32::new(0.0),
        }
    }

    pub fn add_rgb(&self, c: Vec3) {
        self.r.add(c.x);
        self.g.add(c.y);
        self.b.add(c.z);
    }

    pub fn add(&self, c: Vec3, weight: f32) {
        self.add_rgb(c);
        self.w.add(weight);
    }

    pub fn rgb(&self) -> Vec3 {
        Vec3::new(self.r.load(), self.g.load(), self.b.load())
    }

    pub fn weight(&self) -> f32 {
        self.w.load()
    }

    pub fn clear(&self) {
        self.r.store(0.0);
        self.g.store(0.0);
        self.b.store(0.0);
        self.w.store(0.0);
    }
}

/// All per-pixel buffers owned by the pipeline.
pub struct FrameBuffers {
    pub albedo: Vec<Rgbw>,
    pub direct: Vec<Rgbw>,
    pub indirect: Vec<Rgbw>,
    pub reconstruction: Vec<Rgbw>,
    /// Sub-pixel sample location recorded by primary generation.
    pub sample_xy: Slots<Vec2>,
    /// The progressive display surface, RGBA32F.
    pub accumulator: Vec<Vec4>,
}

impl FrameBuffers {
    pub fn new(buffer_len: usize) -> Self {
        Self {
            albedo: (0..buffer_len).map(|_| Rgbw::zero()).collect(),
            direct: (0..buffer_len).map(|_| Rgbw::zero()).collect(),
            indirect: (0..buffer_len).map(|_| Rgbw::zero()).collect(),
            reconstruction: (0..buffer_len).map(|_| Rgbw::zero()).collect(),
            sample_xy: Slots::new(buffer_len),
            accumulator: vec![Vec4::ZERO; buffer_len],
        }
    }

    /// Route an emission or sky contribution: the first two path segments
    /// count as direct lighting, deeper ones as indirect.
    #[inline]
    pub fn add_emission(&self, bounce: usize, pixel: u32, c: Vec3) {
        if bounce < 2 {
            self.direct[pixel as usize].add_rgb(c);
        } else {
            self.indirect[pixel as usize].add_rgb(c);
        }
    }

    /// Route a shadow-ray contribution: next-event estimation from the
    /// primary hit is direct, everything later indirect.
    #[inline]
    pub fn add_illumination(&self, bounce: usize, pixel: u32, c: Vec3) {
        if bounce == 0 {
            self.direct[pixel as usize].add_rgb(c);
        } else {
            self.indirect[pixel as usize].add_rgb(c);
        }
    }

    #[inline]
    pub fn add_albedo(&self, pixel: u32, c: Vec3) {
        self.albedo[pixel as usize].add_rgb(c);
    }

    /// Per-sample color before reconstruction or accumulation.
    fn sample_color(&self, pixel: usize, demodulate: bool) -> Vec3 {
        let c = self.direct[pixel].rgb() + self.indirect[pixel].rgb();
        if demodulate {
            c / self.albedo[pixel].rgb().max(Vec3::splat(DEMOD_EPSILON))
        } else {
            c
        }
    }

    /// Splat every pixel's sample through the reconstruction filter.
    pub fn reconstruct(&self, screen: Screen, settings: &Settings) {
        let filter = settings.reconstruction_filter;
        debug_assert!(filter != ReconstructionFilter::Box);

        (0..screen.height).into_par_iter().for_each(|y| {
            for x in 0..screen.width {
                let pixel = (y * screen.pitch + x) as usize;
                let color = self.sample_color(pixel, settings.demodulate_albedo);
                let sample = self.sample_xy.get(pixel);

                for dy in -1i32..=1 {
                    let ty = y as i32 + dy;
                    if ty < 0 || ty >= screen.height as i32 {
                        continue;
                    }
                    let weight_y = filter_weight(filter, dy as f32 + 0.5 - sample.y);

                    for dx in -1i32..=1 {
                        let tx = x as i32 + dx;
                        if tx < 0 || tx >= screen.width as i32 {
                            continue;
                        }
                        let weight = weight_y * filter_weight(filter, dx as f32 + 0.5 - sample.x);
                        if weight == 0.0 {
                            continue;
                        }

                        let target = (ty as u32 * screen.pitch + tx as u32) as usize;
                        self.reconstruction[target].add(color * weight, weight);
                    }
                }
            }
        });
    }

    /// Fold this frame into the progressive average and clear the per-frame
    /// scratch buffers.
    ///
    /// `frames_accumulated` counts frames including this one; 0 overwrites.
    pub fn accumulate(&mut self, screen: Screen, settings: &Settings, frames_accumulated: u32) {
        let use_reconstruction = settings.reconstruction_filter != ReconstructionFilter::Box;
        let demodulate = settings.demodulate_albedo;
        let n = frames_accumulated;

        let albedo = &self.albedo;
        let direct = &self.direct;
        let indirect = &self.indirect;
        let reconstruction = &self.reconstruction;

        self.accumulator
            .par_chunks_mut(screen.pitch as usize)
            .take(screen.height as usize)
            .enumerate()
            .for_each(|(y, row)| {
                for x in 0..screen.width as usize {
                    let pixel = y * screen.pitch as usize + x;

                    let color = if use_reconstruction {
                        let splat = &reconstruction[pixel];
                        let weight = splat.weight();
                        let c = if weight > 0.0 {
                            splat.rgb() / weight
                        } else {
                            Vec3::ZERO
                        };
                        // Lazy clear: the splat buffer dies right after the
                        // division
                        splat.clear();
                        c
                    } else {
                        let c = direct[pixel].rgb() + indirect[pixel].rgb();
                        if demodulate {
                            c / albedo[pixel].rgb().max(Vec3::splat(DEMOD_EPSILON))
                        } else {
                            c
                        }
                    };

                    let colour = Vec4::new(color.x, color.y, color.z, 1.0);
                    row[x] = if n <= 1 {
                        colour
                    } else {
                        (row[x] * (n - 1) as f32 + colour) / n as f32
                    };

                    direct[pixel].clear();
                    indirect[pixel].clear();
                    if demodulate || settings.enable_svgf {
                        albedo[pixel].clear();
                    }
                }
            });
    }
}

/// 1D reconstruction filter weight at signed distance `x` from the sample.
fn filter_weight(filter: ReconstructionFilter, x: f32) -> f32 {
    match filter {
        ReconstructionFilter::Box => 1.0,
        ReconstructionFilter::MitchellNetravali => mitchell_netravali(x),
        ReconstructionFilter::Gaussian => gaussian(x),
    }
}

/// Mitchell-Netravali cubic with the canonical B = C = 1/3.
fn mitchell_netravali(x: f32) -> f32 {
    const B: f32 = 1.0 / 3.0;
    const C: f32 = 1.0 / 3.0;

    let x = x.abs();
    let x2 = x * x;
    let x3 = x2 * x;

    if x < 1.0 {
        ((12.0 - 9.0 * B - 6.0 * C) * x3
            + (-18.0 + 12.0 * B + 6.0 * C) * x2
            + (6.0 - 2.0 * B))
            / 6.0
    } else if x < 2.0 {
        ((-B - 6.0 * C) * x3
            + (6.0 * B + 30.0 * C) * x2
            + (-12.0 * B - 48.0 * C) * x
            + (8.0 * B + 24.0 * C))
            / 6.0
    } else {
        0.0
    }
}

/// Gaussian with falloff 0.5 and radius 1, offset so the weight reaches
/// exactly zero at the radius.
fn gaussian(x: f32) -> f32 {
    const FALLOFF: f32 = 0.5;
    const RADIUS: f32 = 1.0;

    let tail = (-FALLOFF * RADIUS * RADIUS).exp();
    ((-FALLOFF * x * x).exp() - tail).max(0.0)
}
