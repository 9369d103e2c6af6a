//! Beckmann microfacet shading kernel.
//!
//! Continuations sample the Beckmann distribution by inversion (Walter
//! 2007), with the roughness widened at grazing view angles for stability.
//! Next-event estimation only runs above the roughness cutoff; smoother
//! lobes behave like mirrors and rely on BSDF sampling alone.

use ember_core::constants::ROUGHNESS_CUTOFF;
use ember_core::{Material, MaterialTag};
use ember_math::Vec3;
use rand::Rng;
use rayon::prelude::*;
use std::f32::consts::PI;

use super::{enqueue_continuation, enqueue_shadow, resolve_surface, sample_light, schlick};
use crate::lod;
use crate::pipeline::PathTracer;
use crate::queues::QueueCounters;
use crate::sampler::{kernel_rng, local_to_world, reflect, salt};

pub(crate) fn run(pt: &PathTracer, bounce: usize, last_bounce: bool) {
    let n = QueueCounters::count(&pt.counters.glossy[bounce]);
    let queue = &pt.glossy_queue;

    (0..n).into_par_iter().for_each(|slot| {
        let hit = queue.hit.get(slot);
        let pixel = queue.pixel_index.get(slot);
        let mut throughput = queue.throughput.get(slot);

        let surface = resolve_surface(&pt.accel, &hit, queue.direction.get(slot), bounce);

        let Material::Glossy {
            albedo,
            ior,
            roughness,
            texture,
        } = pt.accel.material_of(surface.triangle)
        else {
            debug_assert!(false, "non-glossy material in glossy queue");
            return;
        };

        // Direction toward the viewer
        let direction_in = -surface.direction;
        let normal = surface.normal;
        let cos_view = direction_in.dot(normal).max(1e-4);

        // Widened roughness keeps grazing-angle sampling stable
        let alpha = ((1.2 - 0.2 * cos_view.sqrt()) * roughness).max(1e-4);

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
                cos_view,
            );
            albedo *= texture.sample_lod(surface.tex_coord.x, surface.tex_coord.y, level);
        }

        if bounce == 0 && pt.settings.wants_albedo() {
            pt.film.add_albedo(pixel, albedo);
        }
        throughput *= albedo;

        let mut rng = kernel_rng(pixel, pt.frame, salt::GLOSSY, bounce as u32);

        // Next-event estimation, only when the lobe is wide enough for a
        // light sample to land inside it
        if pt.settings.enable_next_event_estimation && *roughness >= ROUGHNESS_CUTOFF {
            if let Some(light) =
                sample_light(&pt.accel, &pt.settings, surface.point, normal, &mut rng)
            {
                let half = (light.direction + direction_in).normalize();
                let cos_half = half.dot(normal);
                let cos_half_view = half.dot(direction_in);

                if cos_half > 0.0 && cos_half_view > 0.0 {
                    // Fresnel deliberately takes the macro-surface cosine
                    let fresnel = schlick(cos_view, 1.0 / ior);
                    let distribution = beckmann(cos_half, alpha);
                    let shadowing = smith_g(cos_view, light.cos_i, alpha);

                    let brdf = fresnel * shadowing * distribution / (4.0 * cos_view);
                    let brdf_pdf =
                        fresnel * distribution * cos_half / (4.0 * cos_half_view);

                    let mis_pdf = if pt.settings.enable_multiple_importance_sampling {
                        brdf_pdf + light.pdf
                    } else {
                        light.pdf
                    };

                    let illumination = throughput * brdf * light.emission / mis_pdf;
                    enqueue_shadow(pt, bounce, surface.point, &light, pixel, illumination);
                }
            }
        }

        if last_bounce {
            return;
        }

        // Beckmann inversion: sample a microfacet normal, reflect about it
        let xi0 = rng.gen::<f32>();
        let xi1 = rng.gen::<f32>();
        let theta = (-(alpha * alpha) * (xi0 + 1e-6).ln()).sqrt().atan();
        let phi = 2.0 * PI * xi1;

        let (sin_theta, cos_theta) = theta.sin_cos();
        let micro_local = Vec3::new(
            sin_theta * phi.cos(),
            sin_theta * phi.sin(),
            cos_theta,
        );
        let micro = local_to_world(micro_local, normal);

        let out_direction = reflect(surface.direction, micro);
        let cos_out = out_direction.dot(normal);
        if cos_out <= 0.0 {
            // Sampled below the horizon; the path dies here
            return;
        }

        let cos_micro = micro.dot(normal).max(1e-6);
        let cos_view_micro = direction_in.dot(micro).abs().max(1e-6);

        let fresnel = schlick(cos_view_micro, 1.0 / ior);
        let shadowing = smith_g(cos_view, cos_out, alpha);
        let weight = cos_view_micro * fresnel * shadowing / (cos_view * cos_micro);
        throughput *= weight;

        let distribution = beckmann(cos_micro, alpha);
        let pdf = distribution * cos_micro / (4.0 * out_direction.dot(micro).abs().max(1e-6));

        enqueue_continuation(
            pt,
            bounce,
            surface.point,
            out_direction,
            cone_width,
            pixel,
            throughput,
            MaterialTag::Glossy {
                roughness: *roughness,
            },
            pdf,
        );
    });
}

/// Beckmann normal distribution at half-vector cosine `cos_m`.
fn beckmann(cos_m: f32, alpha: f32) -> f32 {
    if cos_m <= 0.0 {
        return 0.0;
    }
    let cos2 = cos_m * cos_m;
    let tan2 = (1.0 - cos2) / cos2;
    let alpha2 = alpha * alpha;
    (-tan2 / alpha2).exp() / (PI * alpha2 * cos2 * cos2)
}

/// Smith shadowing-masking as the product of two one-sided terms, using
/// Walter's rational fit.
fn smith_g(cos_view: f32, cos_light: f32, alpha: f32) -> f32 {
    smith_g1(cos_view, alpha) * smith_g1(cos_light, alpha)
}

fn smith_g1(cos_v: f32, alpha: f32) -> f32 {
    if cos_v <= 0.0 {
        return 0.0;
    }
    let cos2 = (cos_v * cos_v).min(1.0);
    let sin_v = (1.0 - cos2).sqrt();
    if sin_v <= 1e-6 {
        return 1.0;
    }

    let a = cos_v / (alpha * sin_v);
    if a < 1.6 {
        (3.535 * a + 2.181 * a * a) / (1.0 + 2.276 * a + 2.577 * a * a)
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_beckmann_peaks_at_normal() {
        let smooth = beckmann(1.0, 0.1);
        let tilted = beckmann(0.8, 0.1);
        assert!(smooth > tilted);
        assert_eq!(beckmann(-0.1, 0.1), 0.0);
    }

    #[test]
    fn test_beckmann_widens_with_roughness() {
        // At a tilted angle, a rougher lobe carries more density
        let narrow = beckmann(0.7, 0.05);
        let wide = beckmann(0.7, 0.5);
        assert!(wide > narrow);
    }

    #[test]
    fn test_smith_g_bounds() {
        for &alpha in &[0.05, 0.2, 0.8] {
            for &c in &[0.1, 0.5, 0.9, 1.0] {
                let g = smith_g1(c, alpha);
                assert!((0.0..=1.0).contains(&g), "g1({c}, {alpha}) = {g}");
            }
        }
        // Facing straight on, nothing is shadowed
        assert!((smith_g1(1.0, 0.3) - 1.0).abs() < 1e-6);
    }
}
