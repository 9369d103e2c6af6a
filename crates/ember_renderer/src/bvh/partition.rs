//! SAH partition search for the SBVH builder.
//!
//! Object splits sweep the three presorted centroid orders; spatial splits
//! bin clipped references into `SBVH_BIN_COUNT` slabs per axis. Both return
//! enough state for the builder to replay the chosen partition.

use ember_core::constants::SBVH_BIN_COUNT;
use ember_core::Triangle;
use ember_math::{Aabb, Vec3};

/// Result of the object-split search.
#[derive(Debug, Clone, Copy)]
pub struct ObjectSplit {
    pub dimension: usize,
    /// Global position in the sorted index array of `dimension`; everything
    /// before it goes left.
    pub index: usize,
    pub cost: f32,
    pub aabb_left: Aabb,
    pub aabb_right: Aabb,
}

/// Result of the spatial-split search.
#[derive(Debug, Clone, Copy)]
pub struct SpatialSplit {
    pub dimension: usize,
    /// References whose first bin is below this index go left, those whose
    /// last bin reaches it go right.
    pub bin_index: usize,
    pub cost: f32,
    pub aabb_left: Aabb,
    pub aabb_right: Aabb,
    pub count_left: usize,
    pub count_right: usize,
    /// Binning frame along `dimension`, needed to replay classification.
    pub bounds_min: f32,
    pub inv_bounds_delta: f32,
}

/// Bounds of a reference range in one sorted index array.
pub fn calculate_bounds(triangles: &[Triangle], indices: &[u32], first: usize, count: usize) -> Aabb {
    let mut aabb = Aabb::EMPTY;
    for &index in &indices[first..first + count] {
        aabb.expand(&triangles[index as usize].aabb);
    }
    aabb
}

/// Full-sweep SAH over all three sorted dimensions.
///
/// `sah` is caller-owned scratch of at least `count` floats; it holds the
/// suffix surface areas during each sweep.
pub fn partition_object(
    triangles: &[Triangle],
    indices: &[Vec<u32>; 3],
    first: usize,
    count: usize,
    sah: &mut [f32],
) -> ObjectSplit {
    debug_assert!(count >= 2);

    let mut best = ObjectSplit {
        dimension: 0,
        index: 0,
        cost: f32::INFINITY,
        aabb_left: Aabb::EMPTY,
        aabb_right: Aabb::EMPTY,
    };

    for dimension in 0..3 {
        let idx = &indices[dimension][first..first + count];

        // Suffix pass: sah[i] = surface area of references [i, count)
        let mut aabb = Aabb::EMPTY;
        for i in (1..count).rev() {
            aabb.expand(&triangles[idx[i] as usize].aabb);
            sah[i] = aabb.surface_area();
        }

        // Prefix pass evaluates every split position
        let mut aabb_left = Aabb::EMPTY;
        for i in 1..count {
            aabb_left.expand(&triangles[idx[i - 1] as usize].aabb);

            let cost = aabb_left.surface_area() * i as f32 + sah[i] * (count - i) as f32;
            if cost < best.cost {
                best.dimension = dimension;
                best.index = first + i;
                best.cost = cost;
                best.aabb_left = aabb_left;
            }
        }
    }

    // Rebuild the right bounds of the winning split
    let idx = &indices[best.dimension];
    let mut aabb_right = Aabb::EMPTY;
    for &index in &idx[best.index..first + count] {
        aabb_right.expand(&triangles[index as usize].aabb);
    }
    best.aabb_right = aabb_right;

    best
}

#[derive(Clone, Copy)]
struct Bin {
    aabb: Aabb,
    entries: u32,
    exits: u32,
}

impl Default for Bin {
    fn default() -> Self {
        Self {
            aabb: Aabb::EMPTY,
            entries: 0,
            exits: 0,
        }
    }
}

/// Binned spatial-split search over all three dimensions.
///
/// Every reference is clipped to the node bounds; straddling references
/// contribute clipped polygon bounds to each bin they span and are counted
/// once entering and once leaving. Returns `None` when no axis admits a
/// valid split.
pub fn partition_spatial(
    triangles: &[Triangle],
    indices: &[Vec<u32>; 3],
    first: usize,
    count: usize,
    node_aabb: &Aabb,
) -> Option<SpatialSplit> {
    let mut best: Option<SpatialSplit> = None;

    for dimension in 0..3 {
        let bounds_min = node_aabb.min[dimension] - 0.001;
        let bounds_max = node_aabb.max[dimension] + 0.001;
        let bounds_delta = bounds_max - bounds_min;
        if bounds_delta <= 0.0 {
            continue;
        }
        let inv_bounds_delta = 1.0 / bounds_delta;
        let step = bounds_delta / SBVH_BIN_COUNT as f32;

        let mut bins = vec![Bin::default(); SBVH_BIN_COUNT];

        for &index in &indices[dimension][first..first + count] {
            let triangle = &triangles[index as usize];
            let clipped = Aabb::overlap(&triangle.aabb, node_aabb);

            let bin_min = bin_of(clipped.min[dimension], bounds_min, inv_bounds_delta);
            let bin_max = bin_of(clipped.max[dimension], bounds_min, inv_bounds_delta);

            bins[bin_min].entries += 1;
            bins[bin_max].exits += 1;

            if bin_min == bin_max {
                bins[bin_min].aabb.expand(&clipped);
            } else {
                // Chop the triangle against every slab it spans so each bin
                // only grows by the geometry actually inside it
                let vertices = [
                    triangle.position0,
                    triangle.position1,
                    triangle.position2,
                ];
                for bin in bin_min..=bin_max {
                    let slab_min = bounds_min + bin as f32 * step;
                    let slab_max = slab_min + step;

                    let polygon = clip_to_slab(&vertices, dimension, slab_min, slab_max);
                    if polygon.is_empty() {
                        continue;
                    }
                    let piece = Aabb::overlap(&Aabb::from_points(&polygon), &clipped);
                    if piece.is_valid() {
                        bins[bin].aabb.expand(&piece);
                    }
                }
            }
        }

        // Suffix pass over bins: bounds and exit counts of [bin, end)
        let mut right_aabbs = vec![Aabb::EMPTY; SBVH_BIN_COUNT];
        let mut right_counts = vec![0usize; SBVH_BIN_COUNT];
        let mut aabb = Aabb::EMPTY;
        let mut exits = 0usize;
        for bin in (0..SBVH_BIN_COUNT).rev() {
            aabb.expand(&bins[bin].aabb);
            exits += bins[bin].exits as usize;
            right_aabbs[bin] = aabb;
            right_counts[bin] = exits;
        }

        // Prefix sweep over candidate planes
        let mut left_aabb = Aabb::EMPTY;
        let mut left_count = 0usize;
        for split in 1..SBVH_BIN_COUNT {
            left_aabb.expand(&bins[split - 1].aabb);
            left_count += bins[split - 1].entries as usize;

            let right_count = right_counts[split];
            if left_count == 0 || right_count == 0 {
                continue;
            }

            let cost = left_aabb.surface_area() * left_count as f32
                + right_aabbs[split].surface_area() * right_count as f32;

            if best.map_or(true, |b| cost < b.cost) {
                best = Some(SpatialSplit {
                    dimension,
                    bin_index: split,
                    cost,
                    aabb_left: left_aabb,
                    aabb_right: right_aabbs[split],
                    count_left: left_count,
                    count_right: right_count,
                    bounds_min,
                    inv_bounds_delta,
                });
            }
        }
    }

    best
}

/// Bin index of a coordinate within the binning frame.
#[inline]
pub fn bin_of(coordinate: f32, bounds_min: f32, inv_bounds_delta: f32) -> usize {
    let bin = (SBVH_BIN_COUNT as f32 * ((coordinate - bounds_min) * inv_bounds_delta)) as i32;
    bin.clamp(0, SBVH_BIN_COUNT as i32 - 1) as usize
}

/// Sutherland-Hodgman clip of a polygon against one axis-aligned slab.
fn clip_to_slab(vertices: &[Vec3], dimension: usize, slab_min: f32, slab_max: f32) -> Vec<Vec3> {
    let lower = clip_against_plane(vertices, |p| p[dimension] - slab_min);
    clip_against_plane(&lower, |p| slab_max - p[dimension])
}

/// Keep the polygon region where `distance(p) >= 0`.
fn clip_against_plane(polygon: &[Vec3], distance: impl Fn(Vec3) -> f32) -> Vec<Vec3> {
    let mut out = Vec::with_capacity(polygon.len() + 1);
    for i in 0..polygon.len() {
        let a = polygon[i];
        let b = polygon[(i + 1) % polygon.len()];
        let da = distance(a);
        let db = distance(b);

        if da >= 0.0 {
            out.push(a);
            if db < 0.0 {
                out.push(a.lerp(b, da / (da - db)));
            }
        } else if db >= 0.0 {
            out.push(a.lerp(b, da / (da - db)));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_math::Vec3;

    fn strip(n: usize) -> Vec<Triangle> {
        // A row of unit triangles along X
        (0..n)
            .map(|i| {
                let x = i as f32;
                Triangle::flat(
                    [
                        Vec3::new(x, 0.0, 0.0),
                        Vec3::new(x + 1.0, 0.0, 0.0),
                        Vec3::new(x + 0.5, 1.0, 0.0),
                    ],
                    0,
                )
            })
            .collect()
    }

    fn sorted_indices(triangles: &[Triangle]) -> [Vec<u32>; 3] {
        std::array::from_fn(|dim| {
            let mut idx: Vec<u32> = (0..triangles.len() as u32).collect();
            idx.sort_by(|&a, &b| {
                triangles[a as usize].center()[dim]
                    .partial_cmp(&triangles[b as usize].center()[dim])
                    .unwrap()
            });
            idx
        })
    }

    #[test]
    fn test_calculate_bounds() {
        let triangles = strip(4);
        let indices: Vec<u32> = (0..4).collect();
        let aabb = calculate_bounds(&triangles, &indices, 0, 4);

        assert!((aabb.min.x - 0.0).abs() < 1e-6);
        assert!((aabb.max.x - 4.0).abs() < 1e-6);
    }

    #[test]
    fn test_object_split_balances_strip() {
        let triangles = strip(8);
        let indices = sorted_indices(&triangles);
        let mut sah = vec![0.0; 8];

        let split = partition_object(&triangles, &indices, 0, 8, &mut sah);

        // A uniform strip splits down the middle along X
        assert_eq!(split.dimension, 0);
        assert_eq!(split.index, 4);
        assert!(split.cost.is_finite());
        assert!(split.aabb_left.max.x <= split.aabb_right.max.x);
    }

    #[test]
    fn test_spatial_split_finds_plane() {
        let triangles = strip(4);
        let indices = sorted_indices(&triangles);
        let node_aabb = calculate_bounds(&triangles, &indices[0], 0, 4);

        let split = partition_spatial(&triangles, &indices, 0, 4, &node_aabb)
            .expect("strip admits a spatial split");

        assert_eq!(split.dimension, 0);
        assert!(split.count_left >= 1);
        assert!(split.count_right >= 1);
        assert!(split.aabb_left.is_valid());
        assert!(split.aabb_right.is_valid());
        // The chosen plane separates the node bounds
        assert!(split.aabb_left.min.x < split.aabb_right.max.x);
    }

    #[test]
    fn test_clip_to_slab() {
        let vertices = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(2.0, 0.0, 0.0),
            Vec3::new(1.0, 2.0, 0.0),
        ];

        // Slab covering the middle third in X
        let polygon = clip_to_slab(&vertices, 0, 0.5, 1.5);
        assert!(polygon.len() >= 3);
        for p in &polygon {
            assert!(p.x >= 0.5 - 1e-5);
            assert!(p.x <= 1.5 + 1e-5);
        }

        // Slab entirely outside
        let polygon = clip_to_slab(&vertices, 0, 5.0, 6.0);
        assert!(polygon.is_empty());
    }
}
