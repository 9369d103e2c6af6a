//! Texture LOD from ray cones and primary-ray footprints.
//!
//! A path carries a cone width that grows by the pixel spread angle times
//! the distance of each segment. At a hit the cone is projected onto the
//! surface and related to the triangle's UV density to pick a mip level.
//! The rasterized-primary path has no traced segment; its G-buffer UV
//! gradients are converted into an equivalent cone width so both entry
//! points feed the same machinery.

use ember_core::{Texture, TriangleTables};
use ember_math::Vec2;

/// Cone width when the current segment lands, `t` world units out.
///
/// Bounce 0 seeds the cone from the pixel spread; the rasterized path may
/// already carry a gradient-derived width, whichever is larger wins.
#[inline]
pub fn width_at_hit(bounce: usize, cone_width: f32, pixel_spread_angle: f32, t: f32) -> f32 {
    if bounce == 0 {
        cone_width.max(pixel_spread_angle * t)
    } else {
        cone_width + pixel_spread_angle * t
    }
}

/// Mip level for a cone of width `width` hitting a triangle at incidence
/// cosine `cos_theta`.
///
/// The triangle term converts world-space footprint into texel count:
/// sqrt(w * h * uv_area / world_area) texels per world unit.
pub fn cone_lod(
    texture: &Texture,
    tables: &TriangleTables,
    triangle: usize,
    width: f32,
    cos_theta: f32,
) -> f32 {
    let world_area = tables.area(triangle);
    if world_area <= 0.0 || width <= 0.0 {
        return 0.0;
    }

    let uv_area = uv_area(tables, triangle);
    if uv_area <= 0.0 {
        return 0.0;
    }

    let texel_density =
        (texture.width() as f32 * texture.height() as f32 * uv_area / world_area).sqrt();
    let footprint = width / cos_theta.abs().max(1e-4);

    (footprint * texel_density).max(1e-8).log2().max(0.0)
}

/// Convert screen-space barycentric gradients into the world-space cone
/// width of one pixel on the triangle.
///
/// The cosine is folded back in because the cone projection divides it out
/// again at the hit.
pub fn gradient_cone_width(
    tables: &TriangleTables,
    triangle: usize,
    grad_x: Vec2,
    grad_y: Vec2,
    cos_theta: f32,
) -> f32 {
    // Barycentric area covered by one pixel times the parallelogram area
    // gives the world-space area under the pixel
    let bary_area = cross_2d(grad_x, grad_y).abs();
    let world_footprint_sq = bary_area * 2.0 * tables.area(triangle);
    world_footprint_sq.sqrt() * cos_theta.abs()
}

/// UV-space area of a triangle slot.
fn uv_area(tables: &TriangleTables, triangle: usize) -> f32 {
    0.5 * cross_2d(
        tables.tex_coord_edge1[triangle],
        tables.tex_coord_edge2[triangle],
    )
    .abs()
}

#[inline]
fn cross_2d(a: Vec2, b: Vec2) -> f32 {
    a.x * b.y - a.y * b.x
}
