//! Primary generation: the two mutually exclusive entry points that feed
//! bounce 0.
//!
//! The ray-traced path writes camera rays into the trace queue with their
//! direction left unnormalized, so the footprint of a pixel survives into
//! the bounce-0 LOD math. The rasterized path replays a G-buffer straight
//! into the material queues, skipping the first traversal entirely.

use ember_core::MaterialTag;
use ember_math::{Vec2, Vec3};
use rand::Rng;
use rayon::prelude::*;

use crate::lod;
use crate::pipeline::PathTracer;
use crate::queues::{HitRecord, QueueCounters};
use crate::sampler::{kernel_rng, salt};

/// Rasterized primary visibility, one entry per frame-buffer slot
/// (`y * pitch + x` indexing, matching `pixel_index`).
///
/// `triangle_id` holds flattened triangle slots, -1 where the raster pass
/// saw nothing. UVs are barycentric; the gradients are per-pixel screen
/// derivatives used for sub-pixel jitter and texture footprints.
pub struct GBuffer {
    pub triangle_id: Vec<i32>,
    pub mesh_id: Vec<u32>,
    pub uv: Vec<Vec2>,
    pub uv_gradient_x: Vec<Vec2>,
    pub uv_gradient_y: Vec<Vec2>,
    /// Screen-position deltas for the temporal passes; carried, not read.
    pub screen_delta: Vec<Vec2>,
}

impl GBuffer {
    /// An empty G-buffer covering `buffer_len` slots.
    pub fn new(buffer_len: usize) -> Self {
        Self {
            triangle_id: vec![-1; buffer_len],
            mesh_id: vec![0; buffer_len],
            uv: vec![Vec2::ZERO; buffer_len],
            uv_gradient_x: vec![Vec2::ZERO; buffer_len],
            uv_gradient_y: vec![Vec2::ZERO; buffer_len],
            screen_delta: vec![Vec2::ZERO; buffer_len],
        }
    }
}

/// Ray-traced primary generation: one camera ray per pixel into trace[0].
pub(crate) fn generate_primary(pt: &PathTracer) {
    let screen = pt.screen;
    let queue = pt.trace_queue(0);

    (0..screen.height).into_par_iter().for_each(|y| {
        for x in 0..screen.width {
            let pixel = y * screen.pitch + x;
            let mut rng = kernel_rng(pixel, pt.frame, salt::GENERATE, 0);

            let jitter = if pt.settings.jitter_primary {
                Vec2::new(rng.gen(), rng.gen())
            } else {
                Vec2::splat(0.5)
            };

            let direction = pt
                .camera
                .ray_direction(x as f32 + jitter.x, y as f32 + jitter.y);

            let slot = QueueCounters::reserve(&pt.counters.trace[0]);
            queue.origin.set(slot, pt.camera.position);
            queue.direction.set(slot, direction);
            queue.cone_width.set(slot, 0.0);
            queue.pixel_index.set(slot, pixel);
            queue.throughput.set(slot, Vec3::ONE);
            // Dielectric tag: bounce-0 light hits deposit full emission
            queue.last_material.set(slot, MaterialTag::default());
            queue.last_pdf.set(slot, 1.0);
            queue.hit.set(slot, HitRecord::default());

            pt.film.sample_xy.set(pixel as usize, jitter);
        }
    });
}

/// Rasterized primary visibility: dispatch G-buffer pixels straight into
/// the material queues; misses and light hits settle immediately.
pub(crate) fn replay_gbuffer(pt: &PathTracer, gbuffer: &GBuffer) {
    let screen = pt.screen;
    let wants_albedo = pt.settings.wants_albedo();

    (0..screen.height).into_par_iter().for_each(|y| {
        for x in 0..screen.width {
            let pixel = y * screen.pitch + x;
            let index = pixel as usize;
            let mut rng = kernel_rng(pixel, pt.frame, salt::GENERATE, 0);

            let jitter = if pt.settings.jitter_primary {
                Vec2::new(rng.gen(), rng.gen())
            } else {
                Vec2::splat(0.5)
            };
            pt.film.sample_xy.set(index, jitter);

            let direction = pt
                .camera
                .ray_direction(x as f32 + jitter.x, y as f32 + jitter.y);

            let id = gbuffer.triangle_id[index];
            if id < 0 {
                let sky = pt.accel.sky.sample(direction.normalize());
                pt.film.add_emission(0, pixel, sky);
                if wants_albedo {
                    pt.film.add_albedo(pixel, Vec3::ONE);
                }
                continue;
            }

            let triangle = id as usize;
            let material = pt.accel.material_of(triangle);
            if material.is_light() {
                pt.film.add_emission(0, pixel, material.emission());
                if wants_albedo {
                    pt.film.add_albedo(pixel, Vec3::ONE);
                }
                continue;
            }

            // Jitter the barycentric through the screen-space gradients;
            // fall back to the raster center when it leaves the triangle
            let mut uv = gbuffer.uv[index];
            if pt.settings.jitter_primary {
                let offset = jitter - 0.5;
                let jittered = uv
                    + offset.x * gbuffer.uv_gradient_x[index]
                    + offset.y * gbuffer.uv_gradient_y[index];
                if jittered.x >= 0.0 && jittered.y >= 0.0 && jittered.x + jittered.y <= 1.0 {
                    uv = jittered;
                }
            }

            // Recover the hit distance in unnormalized-direction units so
            // the shade kernels treat both primary paths identically
            let point = pt.accel.tables.point(triangle, uv.x, uv.y);
            let t = (point - pt.camera.position).length() / direction.length();
            let hit = HitRecord::new(gbuffer.mesh_id[index], id, t, uv.x, uv.y);

            let normal = pt.accel.tables.geometric_normal(triangle);
            let cos_theta = normal.dot(direction.normalize());
            let cone_width = lod::gradient_cone_width(
                &pt.accel.tables,
                triangle,
                gbuffer.uv_gradient_x[index],
                gbuffer.uv_gradient_y[index],
                cos_theta,
            );

            let Some(tag) = material.tag() else {
                continue;
            };
            let (queue, counter) = pt.material_queue(tag, 0);
            let slot = QueueCounters::reserve(counter);
            queue.direction.set(slot, direction);
            queue.cone_width.set(slot, cone_width);
            queue.hit.set(slot, hit);
            queue.pixel_index.set(slot, pixel);
            queue.throughput.set(slot, Vec3::ONE);
        }
    });
}
