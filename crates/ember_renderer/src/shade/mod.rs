//! Material shading kernels and the machinery they share: surface
//! reconstruction from packed hits, next-event estimation, and continuation
//! enqueueing.

pub(crate) mod dielectric;
pub(crate) mod diffuse;
pub(crate) mod glossy;

use ember_core::settings::Settings;
use ember_core::MaterialTag;
use ember_math::{Vec2, Vec3};
use rand::rngs::SmallRng;
use rand::Rng;

use crate::accel::SceneAccel;
use crate::pipeline::PathTracer;
use crate::queues::{HitRecord, QueueCounters};
use crate::sampler::uniform_triangle;

/// Hit geometry resolved from the packed record.
pub(crate) struct Surface {
    pub point: Vec3,
    /// Shading normal, flipped to face the incoming ray.
    pub normal: Vec3,
    pub tex_coord: Vec2,
    pub triangle: usize,
    /// Unit incoming direction.
    pub direction: Vec3,
    /// Hit distance in world units.
    pub t: f32,
    /// True when the ray arrived from the geometric front side.
    pub front_face: bool,
}

/// Reconstruct the surface point from the triangle's base + edges scaled by
/// the packed barycentrics.
///
/// Bounce-0 directions arrive unnormalized (the camera preserves pixel
/// footprint in their length); normalize here and rescale `t` to world
/// units so every later formula sees unit directions.
pub(crate) fn resolve_surface(
    accel: &SceneAccel,
    hit: &HitRecord,
    direction: Vec3,
    bounce: usize,
) -> Surface {
    debug_assert!(!hit.is_miss());
    let triangle = hit.triangle_id as usize;
    let u = hit.u.to_f32();
    let v = hit.v.to_f32();

    let (direction, t) = if bounce == 0 {
        let length = direction.length();
        (direction / length, hit.t * length)
    } else {
        (direction, hit.t)
    };

    let point = accel.tables.point(triangle, u, v);
    let mut normal = accel.tables.normal(triangle, u, v);
    let front_face = accel.tables.geometric_normal(triangle).dot(direction) < 0.0;
    if normal.dot(direction) > 0.0 {
        normal = -normal;
    }

    Surface {
        point,
        normal,
        tex_coord: accel.tables.tex_coord(triangle, u, v),
        triangle,
        direction,
        t,
        front_face,
    }
}

/// One light sample for next-event estimation.
pub(crate) struct LightSample {
    /// Unit direction from the surface to the light point.
    pub direction: Vec3,
    pub distance: f32,
    /// Surface cosine toward the light.
    pub cos_i: f32,
    pub emission: Vec3,
    /// Area-measure selection+position pdf converted to solid angle.
    pub pdf: f32,
}

/// Sample a point on a scene light. Returns `None` when the draw lands
/// behind the surface or behind the light.
pub(crate) fn sample_light(
    accel: &SceneAccel,
    settings: &Settings,
    point: Vec3,
    normal: Vec3,
    rng: &mut SmallRng,
) -> Option<LightSample> {
    if accel.lights.is_empty() {
        return None;
    }

    let (slot, area, select_pdf) = accel
        .lights
        .select(settings.light_selection, rng.gen::<f32>());
    let bary = uniform_triangle(rng.gen(), rng.gen());
    let light_point = accel.tables.point(slot as usize, bary.x, bary.y);

    let to_light = light_point - point;
    let distance_squared = to_light.length_squared();
    if distance_squared <= 1e-12 {
        return None;
    }
    let distance = distance_squared.sqrt();
    let direction = to_light / distance;

    let cos_i = normal.dot(direction);
    let cos_o = -direction.dot(accel.tables.geometric_normal(slot as usize));
    if cos_i <= 0.0 || cos_o <= 0.0 {
        return None;
    }

    let emission = accel.material_of(slot as usize).emission();
    let pdf = select_pdf * distance_squared / (cos_o * area);

    Some(LightSample {
        direction,
        distance,
        cos_i,
        emission,
        pdf,
    })
}

/// Push a shadow ray carrying its contingent contribution.
pub(crate) fn enqueue_shadow(
    pt: &PathTracer,
    bounce: usize,
    origin: Vec3,
    light: &LightSample,
    pixel: u32,
    illumination: Vec3,
) {
    let slot = QueueCounters::reserve(&pt.counters.shadow[bounce]);
    let queue = &pt.shadow_queue;
    queue.origin.set(slot, origin);
    queue.direction.set(slot, light.direction);
    queue.max_distance.set(slot, light.distance);
    queue.pixel_index.set(slot, pixel);
    queue.illumination.set(slot, illumination);
}

/// Push the path's next segment into the following bounce's trace queue.
#[allow(clippy::too_many_arguments)]
pub(crate) fn enqueue_continuation(
    pt: &PathTracer,
    bounce: usize,
    origin: Vec3,
    direction: Vec3,
    cone_width: f32,
    pixel: u32,
    throughput: Vec3,
    tag: MaterialTag,
    pdf: f32,
) {
    let next = bounce + 1;
    let slot = QueueCounters::reserve(&pt.counters.trace[next]);
    let queue = pt.trace_queue(next);
    queue.origin.set(slot, origin);
    queue.direction.set(slot, direction);
    queue.cone_width.set(slot, cone_width);
    queue.pixel_index.set(slot, pixel);
    queue.throughput.set(slot, throughput);
    queue.last_material.set(slot, tag);
    queue.last_pdf.set(slot, pdf);
    queue.hit.set(slot, HitRecord::default());
}

/// Schlick's approximation of the Fresnel reflectance.
pub(crate) fn schlick(cosine: f32, ior_ratio: f32) -> f32 {
    let r0 = ((1.0 - ior_ratio) / (1.0 + ior_ratio)).powi(2);
    r0 + (1.0 - r0) * (1.0 - cosine).powi(5)
}
