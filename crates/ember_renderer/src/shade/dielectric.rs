//! Smooth dielectric shading kernel.
//!
//! The BSDF is a Dirac delta, so no shadow ray is ever emitted; the path
//! either reflects or refracts, chosen by a Fresnel coin flip. Absorption
//! follows Beer-Lambert over the distance travelled inside the medium.
//! Nested media are not tracked: absorption always uses the material being
//! exited, even if the ray entered through a different one.

use ember_core::{Material, MaterialTag};
use ember_math::Vec3;
use rand::Rng;
use rayon::prelude::*;

use super::{enqueue_continuation, resolve_surface, schlick};
use crate::lod;
use crate::pipeline::PathTracer;
use crate::queues::QueueCounters;
use crate::sampler::{kernel_rng, reflect, salt};

pub(crate) fn run(pt: &PathTracer, bounce: usize, last_bounce: bool) {
    let n = QueueCounters::count(&pt.counters.dielectric[bounce]);
    let queue = &pt.dielectric_queue;

    (0..n).into_par_iter().for_each(|slot| {
        let hit = queue.hit.get(slot);
        let pixel = queue.pixel_index.get(slot);
        let mut throughput = queue.throughput.get(slot);

        let surface = resolve_surface(&pt.accel, &hit, queue.direction.get(slot), bounce);

        let Material::Dielectric { ior, absorption } = pt.accel.material_of(surface.triangle)
        else {
            debug_assert!(false, "non-dielectric material in dielectric queue");
            return;
        };

        if bounce == 0 && pt.settings.wants_albedo() {
            pt.film.add_albedo(pixel, Vec3::ONE);
        }

        let entering = surface.front_face;
        if !entering {
            // Leaving the medium: attenuate by the path length inside it
            throughput *= Vec3::new(
                (-absorption.x * surface.t).exp(),
                (-absorption.y * surface.t).exp(),
                (-absorption.z * surface.t).exp(),
            );
        }

        if last_bounce {
            return;
        }

        let eta = if entering { 1.0 / ior } else { *ior };
        let mut rng = kernel_rng(pixel, pt.frame, salt::DIELECTRIC, bounce as u32);
        let out_direction = scatter(surface.direction, surface.normal, eta, rng.gen());

        let cone_width = lod::width_at_hit(
            bounce,
            queue.cone_width.get(slot),
            pt.camera.pixel_spread_angle,
            surface.t,
        );

        enqueue_continuation(
            pt,
            bounce,
            surface.point,
            out_direction,
            cone_width,
            pixel,
            throughput,
            MaterialTag::Dielectric,
            1.0,
        );
    });
}

/// Outgoing direction at a smooth interface with relative IOR `eta`.
///
/// `direction` points into the surface, `normal` against it. Snell without
/// a real solution reflects totally; otherwise the Fresnel term decides
/// between reflection and refraction via the uniform draw `xi`.
fn scatter(direction: Vec3, normal: Vec3, eta: f32, xi: f32) -> Vec3 {
    let cos_theta = (-direction).dot(normal).min(1.0);
    let k = 1.0 - eta * eta * (1.0 - cos_theta * cos_theta);

    if k < 0.0 || xi < schlick(cos_theta, eta) {
        reflect(direction, normal)
    } else {
        eta * direction + (eta * cos_theta - k.sqrt()) * normal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matched_ior_passes_through() {
        // Equal media head-on: Fresnel is ~0, the ray continues unchanged
        let direction = Vec3::new(0.0, 0.0, -1.0);
        let normal = Vec3::Z;
        let out = scatter(direction, normal, 1.0, 0.5);
        assert!((out - direction).length() < 1e-5);
    }

    #[test]
    fn test_total_internal_reflection_at_grazing() {
        // Dense-to-thin at a grazing angle: Snell has no solution and the
        // direction must be the mirror reflection regardless of the draw
        let direction = Vec3::new(0.9, 0.0, -(1.0f32 - 0.81).sqrt()).normalize();
        let normal = Vec3::Z;
        let eta = 1.5; // leaving glass into air

        let out = scatter(direction, normal, eta, 0.99);
        let reflected = reflect(direction, normal);
        assert!((out - reflected).length() < 1e-5);
        // Still heading away from the interface on the incoming side
        assert!(out.z > 0.0);
    }

    #[test]
    fn test_refraction_bends_toward_normal_entering_glass() {
        // Air into glass at 45 degrees: the refracted ray is closer to the
        // normal than the incident one
        let direction = Vec3::new(1.0, 0.0, -1.0).normalize();
        let normal = Vec3::Z;
        let out = scatter(direction, normal, 1.0 / 1.5, 1.0);

        assert!(out.z < 0.0);
        let incident_sine = direction.x.abs();
        let refracted_sine = out.x.abs() / out.length();
        assert!(refracted_sine < incident_sine);
    }
}
