//! MBVH traversal: nearest-hit queries for the trace pass and any-hit
//! queries for shadow rays.

use ember_core::constants::EPSILON;
use ember_core::TriangleTables;
use ember_math::Ray;

use crate::bvh::{Mbvh, EMPTY_SLOT, MBVH_WIDTH};
use crate::queues::HitRecord;

const STACK_DEPTH: usize = 64;

/// Nearest intersection along `ray` within `t_max`, or a miss record.
pub fn intersect(mbvh: &Mbvh, tables: &TriangleTables, ray: &Ray, t_max: f32) -> HitRecord {
    let mut hit = HitRecord::default();
    if mbvh.is_empty() {
        return hit;
    }

    let mut nearest = t_max;
    let mut stack = [0u32; STACK_DEPTH];
    let mut top = 1usize;

    while top > 0 {
        top -= 1;
        let node = &mbvh.nodes[stack[top] as usize];

        for i in 0..MBVH_WIDTH {
            match node.count[i] {
                EMPTY_SLOT => {}
                0 => {
                    if node.aabb[i].hit(ray, EPSILON, nearest) {
                        debug_assert!(top < STACK_DEPTH);
                        stack[top] = node.index[i];
                        top += 1;
                    }
                }
                count => {
                    if !node.aabb[i].hit(ray, EPSILON, nearest) {
                        continue;
                    }
                    for slot in node.index[i]..node.index[i] + count {
                        if let Some((t, u, v)) =
                            intersect_triangle(tables, slot as usize, ray, EPSILON, nearest)
                        {
                            nearest = t;
                            hit = HitRecord::new(
                                tables.mesh_id[slot as usize],
                                slot as i32,
                                t,
                                u,
                                v,
                            );
                        }
                    }
                }
            }
        }
    }

    hit
}

/// True when anything blocks `ray` before `t_max`.
pub fn occluded(mbvh: &Mbvh, tables: &TriangleTables, ray: &Ray, t_max: f32) -> bool {
    if mbvh.is_empty() {
        return false;
    }

    let mut stack = [0u32; STACK_DEPTH];
    let mut top = 1usize;

    while top > 0 {
        top -= 1;
        let node = &mbvh.nodes[stack[top] as usize];

        for i in 0..MBVH_WIDTH {
            match node.count[i] {
                EMPTY_SLOT => {}
                0 => {
                    if node.aabb[i].hit(ray, EPSILON, t_max) {
                        debug_assert!(top < STACK_DEPTH);
                        stack[top] = node.index[i];
                        top += 1;
                    }
                }
                count => {
                    if !node.aabb[i].hit(ray, EPSILON, t_max) {
                        continue;
                    }
                    for slot in node.index[i]..node.index[i] + count {
                        if intersect_triangle(tables, slot as usize, ray, EPSILON, t_max).is_some()
                        {
                            return true;
                        }
                    }
                }
            }
        }
    }

    false
}

/// Möller-Trumbore against the edge-form triangle tables.
#[inline]
fn intersect_triangle(
    tables: &TriangleTables,
    slot: usize,
    ray: &Ray,
    t_min: f32,
    t_max: f32,
) -> Option<(f32, f32, f32)> {
    let edge1 = tables.position_edge1[slot];
    let edge2 = tables.position_edge2[slot];

    let h = ray.direction.cross(edge2);
    let a = edge1.dot(h);

    // Ray parallel to the triangle plane
    if a.abs() < 1e-8 {
        return None;
    }

    let f = 1.0 / a;
    let s = ray.origin - tables.position0[slot];
    let u = f * s.dot(h);
    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let q = s.cross(edge1);
    let v = f * ray.direction.dot(q);
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = f * edge2.dot(q);
    if t <= t_min || t >= t_max {
        return None;
    }

    Some((t, u, v))
}
