//! Post-trace dispatch: terminate misses against the sky, settle light
//! hits (with multiple importance sampling when applicable), apply Russian
//! roulette, and bucket the survivors into the per-material shade queues.

use ember_core::constants::ROUGHNESS_CUTOFF;
use ember_core::{Material, MaterialTag};
use rand::Rng;
use rayon::prelude::*;

use crate::pipeline::PathTracer;
use crate::queues::QueueCounters;
use crate::sampler::{kernel_rng, salt};

pub(crate) fn run(pt: &PathTracer, bounce: usize) {
    let n = QueueCounters::count(&pt.counters.trace[bounce]);
    let queue = pt.trace_queue(bounce);
    let wants_albedo = pt.settings.wants_albedo();

    (0..n).into_par_iter().for_each(|slot| {
        let hit = queue.hit.get(slot);
        let pixel = queue.pixel_index.get(slot);
        let direction = queue.direction.get(slot);
        let mut throughput = queue.throughput.get(slot);

        // Miss: the path escapes into the sky
        if hit.is_miss() {
            let sky = pt.accel.sky.sample(direction.normalize());
            pt.film.add_emission(bounce, pixel, throughput * sky);
            if bounce == 0 && wants_albedo {
                pt.film.add_albedo(pixel, ember_math::Vec3::ONE);
            }
            return;
        }

        let triangle = hit.triangle_id as usize;
        let material = pt.accel.material_of(triangle);

        // Light hit: terminate, weighting against next-event estimation
        // when the previous event could have sampled this light
        if let Material::Light { emission } = material {
            let last_material = queue.last_material.get(slot);
            let specular_event = match last_material {
                MaterialTag::Dielectric => true,
                MaterialTag::Glossy { roughness } => roughness < ROUGHNESS_CUTOFF,
                MaterialTag::Diffuse => false,
            };

            if specular_event || !pt.settings.enable_next_event_estimation {
                pt.film.add_emission(bounce, pixel, throughput * *emission);
            } else if pt.settings.enable_multiple_importance_sampling {
                // Direction is unit length here: bounce 0 always takes the
                // specular branch above, and secondary rays are normalized
                let distance_squared = hit.t * hit.t;
                let cos_o = (-direction).dot(pt.accel.tables.geometric_normal(triangle));
                let area = pt.accel.tables.area(triangle);

                if cos_o.abs() > 1e-6 && area > 0.0 {
                    let select_pdf = pt
                        .accel
                        .lights
                        .selection_pdf(pt.settings.light_selection, area);
                    let light_pdf = select_pdf * distance_squared / (cos_o.abs() * area);
                    let brdf_pdf = queue.last_pdf.get(slot);
                    let weight = brdf_pdf / (brdf_pdf + light_pdf);
                    pt.film.add_emission(bounce, pixel, throughput * *emission * weight);
                }
            }
            // NEE without MIS: the shadow rays already own this light

            if bounce == 0 && wants_albedo {
                pt.film.add_albedo(pixel, ember_math::Vec3::ONE);
            }
            return;
        }

        // Russian roulette on the surviving path
        let p = throughput.max_element().clamp(0.0, 1.0);
        if p <= 0.0 {
            return;
        }
        let mut rng = kernel_rng(pixel, pt.frame, salt::SORT, bounce as u32);
        if rng.gen::<f32>() > p {
            return;
        }
        throughput /= p;

        let Some(tag) = material.tag() else {
            return;
        };
        let (material_queue, counter) = pt.material_queue(tag, bounce);
        let out = QueueCounters::reserve(counter);
        material_queue.direction.set(out, direction);
        material_queue.cone_width.set(out, queue.cone_width.get(slot));
        material_queue.hit.set(out, hit);
        material_queue.pixel_index.set(out, pixel);
        material_queue.throughput.set(out, throughput);
    });
}
