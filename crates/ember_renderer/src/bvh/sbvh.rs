//! Spatial-split BVH construction.
//!
//! Every node considers the best object partition (a full SAH sweep over
//! three presorted centroid orders) and, when the object children overlap
//! enough, the best spatial partition (binned, with references clipped to
//! bins). Straddling references may be duplicated into both children or
//! unsplit to one side when that is cheaper.

use ember_core::constants::{MAX_PRIMITIVES_IN_LEAF, SBVH_OVERALLOCATION};
use ember_core::{RenderError, RenderResult, Triangle};
use ember_math::Aabb;

use super::partition::{self, ObjectSplit, SpatialSplit};
use super::BvhNode;

/// Overlap ratio above which a spatial split is considered.
/// 1 would reproduce a plain BVH, 0 a full SBVH.
const ALPHA: f32 = 1e-5;

/// A built spatial-split BVH.
///
/// `indices` holds the flattened leaf references in depth-first order;
/// spatial splits can make it longer than the input triangle count.
pub struct Sbvh {
    pub nodes: Vec<BvhNode>,
    pub indices: Vec<u32>,
}

impl Sbvh {
    /// Build over a triangle soup. Fails only when the node budget
    /// (`SBVH_OVERALLOCATION` nodes per triangle) is exceeded.
    pub fn build(triangles: &[Triangle]) -> RenderResult<Self> {
        let n = triangles.len();
        if n == 0 {
            return Ok(Self {
                nodes: Vec::new(),
                indices: Vec::new(),
            });
        }

        // Presort the reference indices by centroid along each axis
        let indices: [Vec<u32>; 3] = std::array::from_fn(|dim| {
            let mut idx: Vec<u32> = (0..n as u32).collect();
            idx.sort_by(|&a, &b| {
                triangles[a as usize].center()[dim]
                    .partial_cmp(&triangles[b as usize].center()[dim])
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            idx
        });

        let root_aabb = partition::calculate_bounds(triangles, &indices[0], 0, n);
        let capacity = (SBVH_OVERALLOCATION * n).max(4);

        let mut builder = Builder {
            triangles,
            nodes: vec![BvhNode::default(); capacity],
            indices,
            sah: vec![0.0; n],
            going_left: vec![false; n],
            going_right: vec![false; n],
            node_index: 2,
            inv_root_surface_area: 1.0 / root_aabb.surface_area(),
        };
        builder.nodes[0].aabb = root_aabb;

        let index_count = builder.build_node(0, 0, n)?;

        log::info!(
            "SBVH: {} nodes, {} references over {} triangles",
            builder.node_index,
            index_count,
            n
        );

        let mut nodes = builder.nodes;
        nodes.truncate(builder.node_index);
        let [mut flat, _, _] = builder.indices;
        flat.truncate(index_count);

        Ok(Self {
            nodes,
            indices: flat,
        })
    }

    /// Number of leaf references.
    pub fn reference_count(&self) -> usize {
        self.indices.len()
    }
}

struct Builder<'a> {
    triangles: &'a [Triangle],
    nodes: Vec<BvhNode>,
    indices: [Vec<u32>; 3],
    /// Suffix-area scratch for the object sweep.
    sah: Vec<f32>,
    /// Routing bitmaps indexed by original triangle id; a reference appears
    /// at most once per node so ids are unambiguous.
    going_left: Vec<bool>,
    going_right: Vec<bool>,
    node_index: usize,
    inv_root_surface_area: f32,
}

impl<'a> Builder<'a> {
    fn build_node(&mut self, node: usize, first: usize, count: usize) -> RenderResult<usize> {
        if count == 1 {
            self.nodes[node].make_leaf(first, 1);
            return Ok(1);
        }

        let node_aabb = self.nodes[node].aabb;

        let object = partition::partition_object(
            self.triangles,
            &self.indices,
            first,
            count,
            &mut self.sah,
        );

        // Only pay for the spatial search when the object children overlap
        // a meaningful fraction of the root surface area
        let overlap = Aabb::overlap(&object.aabb_left, &object.aabb_right);
        let ratio = if overlap.is_valid() {
            overlap.surface_area() * self.inv_root_surface_area
        } else {
            0.0
        };
        let spatial = if ratio > ALPHA {
            partition::partition_spatial(self.triangles, &self.indices, first, count, &node_aabb)
        } else {
            None
        };
        let spatial_cost = spatial.as_ref().map_or(f32::INFINITY, |s| s.cost);

        if count <= MAX_PRIMITIVES_IN_LEAF {
            let parent_cost = node_aabb.surface_area() * count as f32;
            if parent_cost <= object.cost && parent_cost <= spatial_cost {
                self.nodes[node].make_leaf(first, count);
                return Ok(count);
            }
        }

        let left = self.alloc_children()?;
        let mut children_right: [Vec<u32>; 3] = std::array::from_fn(|_| Vec::with_capacity(count));

        let (n_left, n_right, aabb_left, aabb_right, axis) = if object.cost <= spatial_cost {
            let (l, r) = self.route_object(&object, first, count, &mut children_right);
            (l, r, object.aabb_left, object.aabb_right, object.dimension)
        } else {
            let split = spatial.unwrap();
            let (l, r, al, ar) =
                self.route_spatial(&split, &node_aabb, first, count, &mut children_right);
            (l, r, al, ar, split.dimension)
        };

        debug_assert!(n_left >= 1 && n_right >= 1);
        debug_assert!(n_left + n_right >= count);

        self.nodes[left].aabb = aabb_left;
        self.nodes[left + 1].aabb = aabb_right;
        self.nodes[node].make_inner(left, axis);

        // Depth first into the left subtree; its reference count tells us
        // where the right subtree's references start
        let leaves_left = self.build_node(left, first, n_left)?;

        let dst = first + leaves_left;
        if dst + n_right > self.indices[0].len() {
            for idx in &mut self.indices {
                idx.resize(dst + n_right, 0);
            }
        }
        for dimension in 0..3 {
            self.indices[dimension][dst..dst + n_right]
                .copy_from_slice(&children_right[dimension]);
        }

        let leaves_right = self.build_node(left + 1, dst, n_right)?;

        Ok(leaves_left + leaves_right)
    }

    fn alloc_children(&mut self) -> RenderResult<usize> {
        let left = self.node_index;
        self.node_index += 2;
        if self.node_index > self.nodes.len() {
            return Err(RenderError::BvhOverflow {
                nodes: self.node_index,
                triangles: self.triangles.len(),
                limit: self.nodes.len(),
            });
        }
        Ok(left)
    }

    /// Replay the object split in all three dimensions.
    ///
    /// Left references are compacted in place (every write lands at or
    /// before the slot just read); right references go to scratch until the
    /// left recursion finishes.
    fn route_object(
        &mut self,
        split: &ObjectSplit,
        first: usize,
        count: usize,
        children_right: &mut [Vec<u32>; 3],
    ) -> (usize, usize) {
        let od = split.dimension;
        let plane = self.triangles[self.indices[od][split.index] as usize].center()[od];

        let mut left_counts = [0usize; 3];
        for dimension in 0..3 {
            let mut lc = 0;
            for i in first..first + count {
                let index = self.indices[dimension][i];
                let center = self.triangles[index as usize].center()[od];

                let mut goes_left = center < plane;
                if center == plane {
                    // Ambiguous centroid: the reference goes left exactly
                    // when it sits left of the split position in the split
                    // dimension's order, keeping all three counts equal
                    let mut j = split.index;
                    while j > first {
                        j -= 1;
                        let other = self.indices[od][j];
                        if self.triangles[other as usize].center()[od] != plane {
                            break;
                        }
                        if other == index {
                            goes_left = true;
                            break;
                        }
                    }
                }

                if goes_left {
                    self.indices[dimension][first + lc] = index;
                    lc += 1;
                } else {
                    children_right[dimension].push(index);
                }
            }
            left_counts[dimension] = lc;
        }

        debug_assert!(left_counts[0] == left_counts[1] && left_counts[1] == left_counts[2]);
        debug_assert_eq!(first + left_counts[0], split.index);
        debug_assert_eq!(left_counts[0] + children_right[0].len(), count);

        (left_counts[0], children_right[0].len())
    }

    /// Classify every reference against the spatial plane, unsplit
    /// straddlers when cheaper, then replay the routing in all three
    /// dimensions through the id-indexed bitmaps.
    fn route_spatial(
        &mut self,
        split: &SpatialSplit,
        node_aabb: &Aabb,
        first: usize,
        count: usize,
        children_right: &mut [Vec<u32>; 3],
    ) -> (usize, usize, Aabb, Aabb) {
        let dim = split.dimension;
        let mut aabb_left = split.aabb_left;
        let mut aabb_right = split.aabb_right;
        let mut n_left = split.count_left as f32;
        let mut n_right = split.count_right as f32;

        // Serial pass: straddler decisions see the boxes grown by earlier
        // ones
        for i in first..first + count {
            let index = self.indices[dim][i] as usize;
            let clipped = Aabb::overlap(&self.triangles[index].aabb, node_aabb);

            let bin_min = partition::bin_of(clipped.min[dim], split.bounds_min, split.inv_bounds_delta);
            let bin_max = partition::bin_of(clipped.max[dim], split.bounds_min, split.inv_bounds_delta);

            let mut goes_left = bin_min < split.bin_index;
            let mut goes_right = bin_max >= split.bin_index;

            // A plane can place a reference on a side whose box its clip
            // never touches; reject that side
            if goes_left && !Aabb::overlap(&clipped, &aabb_left).is_valid() {
                goes_left = false;
            }
            if goes_right && !Aabb::overlap(&clipped, &aabb_right).is_valid() {
                goes_right = false;
            }

            if goes_left && goes_right {
                // Reference unsplitting: compare duplicating against pulling
                // the whole reference to one side
                let mut grown_left = aabb_left;
                grown_left.expand(&clipped);
                let mut grown_right = aabb_right;
                grown_right.expand(&clipped);

                let sa_left = aabb_left.surface_area();
                let sa_right = aabb_right.surface_area();

                let cost_split = sa_left * n_left + sa_right * n_right;
                // A side may only give up a reference while it keeps at
                // least one
                let cost_left_only = if n_right > 1.0 {
                    grown_left.surface_area() * n_left + sa_right * (n_right - 1.0)
                } else {
                    f32::INFINITY
                };
                let cost_right_only = if n_left > 1.0 {
                    sa_left * (n_left - 1.0) + grown_right.surface_area() * n_right
                } else {
                    f32::INFINITY
                };

                if cost_left_only < cost_split {
                    if cost_right_only < cost_left_only {
                        goes_left = false;
                        n_left -= 1.0;
                        aabb_right = grown_right;
                    } else {
                        goes_right = false;
                        n_right -= 1.0;
                        aabb_left = grown_left;
                    }
                } else if cost_right_only < cost_split {
                    goes_left = false;
                    n_left -= 1.0;
                    aabb_right = grown_right;
                }
            }

            if !goes_left && !goes_right {
                // Degenerate clip rejected by both children; keep it left
                goes_left = true;
                aabb_left.expand(&clipped);
            }

            self.going_left[index] = goes_left;
            self.going_right[index] = goes_right;
        }

        // Replay in every dimension so each order stays sorted
        let mut left_counts = [0usize; 3];
        for dimension in 0..3 {
            let mut lc = 0;
            for i in first..first + count {
                let index = self.indices[dimension][i];
                if self.going_left[index as usize] {
                    self.indices[dimension][first + lc] = index;
                    lc += 1;
                }
                if self.going_right[index as usize] {
                    children_right[dimension].push(index);
                }
            }
            left_counts[dimension] = lc;
        }

        debug_assert!(left_counts[0] == left_counts[1] && left_counts[1] == left_counts[2]);

        (
            left_counts[0],
            children_right[0].len(),
            aabb_left,
            aabb_right,
        )
    }
}
