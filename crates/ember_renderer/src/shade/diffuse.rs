//! Lambertian shading kernel.

use ember_core::{Material, MaterialTag};
use rand::Rng;
use rayon::prelude::*;
use std::f32::consts::PI;

use super::{enqueue_continuation, enqueue_shadow, resolve_surface, sample_light};
use crate::lod;
use crate::pipeline::PathTracer;
use crate::queues::QueueCounters;
use crate::sampler::{cosine_weighted_direction, kernel_rng, salt};

pub(crate) fn run(pt: &PathTracer, bounce: usize, last_bounce: bool) {
    let n = QueueCounters::count(&pt.counters.diffuse[bounce]);
    let queue = &pt.diffuse_queue;

    (0..n).into_par_iter().for_each(|slot| {
        let hit = queue.hit.get(slot);
        let pixel = queue.pixel_index.get(slot);
        let mut throughput = queue.throughput.get(slot);

        let surface = resolve_surface(&pt.accel, &hit, queue.direction.get(slot), bounce);

        let Material::Diffuse { albedo, texture } = pt.accel.material_of(surface.triangle) else {
            debug_assert!(false, "non-diffuse material in diffuse queue");
            return;
        };

        let cone_width = lod::width_at_hit(
            bounce,
            queue.cone_width.get(slot),
            pt.camera.pixel_spread_angle,
            surface.t,
        );

        let mut albedo = *albedo;
        if let Some(texture_id) = texture {
            let texture = &pt.accel.textures[*texture_id as usize];
            let level = lod::cone_lod(
                texture,
                &pt.accel.tables,
                surface.triangle,
                cone_width,
                surface.direction.dot(surface.normal),
            );
            albedo *= texture.sample_lod(surface.tex_coord.x, surface.tex_coord.y, level);
        }

        if bounce == 0 && pt.settings.wants_albedo() {
            pt.film.add_albedo(pixel, albedo);
        }
        throughput *= albedo;

        let mut rng = kernel_rng(pixel, pt.frame, salt::DIFFUSE, bounce as u32);

        // Next-event estimation toward one sampled light
        if pt.settings.enable_next_event_estimation {
            if let Some(light) =
                sample_light(&pt.accel, &pt.settings, surface.point, surface.normal, &mut rng)
            {
                let brdf = light.cos_i / PI;
                let brdf_pdf = light.cos_i / PI;
                let mis_pdf = if pt.settings.enable_multiple_importance_sampling {
                    brdf_pdf + light.pdf
                } else {
                    light.pdf
                };

                let illumination = throughput * brdf * light.emission / mis_pdf;
                enqueue_shadow(pt, bounce, surface.point, &light, pixel, illumination);
            }
        }

        if last_bounce {
            return;
        }

        // Cosine-weighted continuation
        let out_direction = cosine_weighted_direction(surface.normal, rng.gen(), rng.gen());
        let pdf = surface.normal.dot(out_direction).max(0.0) / PI;

        enqueue_continuation(
            pt,
            bounce,
            surface.point,
            out_direction,
            cone_width,
            pixel,
            throughput,
            MaterialTag::Diffuse,
            pdf,
        );
    });
}
