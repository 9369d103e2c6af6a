//! Collapse of the binary SBVH into wide nodes for traversal.
//!
//! Each MBVH node tests up to four child boxes at once. Collapsing greedily
//! expands the inner child with the largest surface area until the node is
//! full, so the expensive boxes sit as high in the tree as possible.

use ember_math::Aabb;

use super::sbvh::Sbvh;

pub const MBVH_WIDTH: usize = 4;

/// Marks an unused child slot.
pub const EMPTY_SLOT: u32 = u32::MAX;

/// A 4-wide node.
///
/// Per slot: `count == EMPTY_SLOT` means unused, `count == 0` an inner child
/// at node `index`, otherwise a run of `count` flattened triangle slots
/// starting at `index`.
#[derive(Debug, Clone)]
pub struct MbvhNode {
    pub aabb: [Aabb; MBVH_WIDTH],
    pub index: [u32; MBVH_WIDTH],
    pub count: [u32; MBVH_WIDTH],
}

impl Default for MbvhNode {
    fn default() -> Self {
        Self {
            aabb: [Aabb::EMPTY; MBVH_WIDTH],
            index: [0; MBVH_WIDTH],
            count: [EMPTY_SLOT; MBVH_WIDTH],
        }
    }
}

/// The traversal-ready acceleration structure.
pub struct Mbvh {
    pub nodes: Vec<MbvhNode>,
}

impl Mbvh {
    /// An MBVH with no geometry; every traversal misses.
    pub fn empty() -> Self {
        Self { nodes: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn from_sbvh(sbvh: &Sbvh) -> Self {
        if sbvh.nodes.is_empty() {
            return Self::empty();
        }

        let mut nodes = Vec::new();

        if sbvh.nodes[0].is_leaf() {
            // Single-leaf tree: one node with one occupied slot
            let mut node = MbvhNode::default();
            node.aabb[0] = sbvh.nodes[0].aabb;
            node.index[0] = sbvh.nodes[0].first() as u32;
            node.count[0] = sbvh.nodes[0].prim_count() as u32;
            nodes.push(node);
        } else {
            collapse(sbvh, 0, &mut nodes);
        }

        log::debug!(
            "MBVH: {} wide nodes from {} binary nodes",
            nodes.len(),
            sbvh.nodes.len()
        );

        Self { nodes }
    }
}

/// Build the wide node for binary inner node `binary`; returns its index.
fn collapse(sbvh: &Sbvh, binary: usize, nodes: &mut Vec<MbvhNode>) -> u32 {
    let slot = nodes.len();
    nodes.push(MbvhNode::default());

    // Start from the binary children and keep opening the widest inner
    // candidate until the node is full
    let node = &sbvh.nodes[binary];
    let mut children = vec![node.left(), node.left() + 1];

    while children.len() < MBVH_WIDTH {
        let widest = children
            .iter()
            .enumerate()
            .filter(|(_, &c)| !sbvh.nodes[c].is_leaf())
            .max_by(|(_, &a), (_, &b)| {
                sbvh.nodes[a]
                    .aabb
                    .surface_area()
                    .partial_cmp(&sbvh.nodes[b].aabb.surface_area())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(i, _)| i);

        let Some(position) = widest else {
            break;
        };

        let opened = children.swap_remove(position);
        children.push(sbvh.nodes[opened].left());
        children.push(sbvh.nodes[opened].left() + 1);
    }

    for (i, &child_idx) in children.iter().enumerate() {
        let child = &sbvh.nodes[child_idx];
        nodes[slot].aabb[i] = child.aabb;
        if child.is_leaf() {
            nodes[slot].index[i] = child.first() as u32;
            nodes[slot].count[i] = child.prim_count() as u32;
        } else {
            let wide_child = collapse(sbvh, child_idx, nodes);
            nodes[slot].index[i] = wide_child;
            nodes[slot].count[i] = 0;
        }
    }

    slot as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_core::Triangle;
    use ember_math::Vec3;

    fn grid(n: usize) -> Vec<Triangle> {
        let mut triangles = Vec::new();
        for y in 0..n {
            for x in 0..n {
                let o = Vec3::new(x as f32, y as f32, 0.0);
                triangles.push(Triangle::flat(
                    [o, o + Vec3::new(0.9, 0.0, 0.0), o + Vec3::new(0.0, 0.9, 0.0)],
                    0,
                ));
            }
        }
        triangles
    }

    #[test]
    fn test_empty_mbvh() {
        let sbvh = Sbvh::build(&[]).unwrap();
        let mbvh = Mbvh::from_sbvh(&sbvh);
        assert!(mbvh.is_empty());
    }

    #[test]
    fn test_single_leaf_root() {
        let triangles = vec![Triangle::flat([Vec3::ZERO, Vec3::X, Vec3::Y], 0)];
        let sbvh = Sbvh::build(&triangles).unwrap();
        let mbvh = Mbvh::from_sbvh(&sbvh);

        assert_eq!(mbvh.nodes.len(), 1);
        assert_eq!(mbvh.nodes[0].count[0], 1);
        assert_eq!(mbvh.nodes[0].count[1], EMPTY_SLOT);
    }

    #[test]
    fn test_collapse_covers_all_references() {
        let triangles = grid(6);
        let sbvh = Sbvh::build(&triangles).unwrap();
        let mbvh = Mbvh::from_sbvh(&sbvh);

        // Gather every leaf run reachable from the root
        let mut covered = vec![false; sbvh.indices.len()];
        let mut stack = vec![0u32];
        while let Some(node_idx) = stack.pop() {
            let node = &mbvh.nodes[node_idx as usize];
            for i in 0..MBVH_WIDTH {
                match node.count[i] {
                    EMPTY_SLOT => {}
                    0 => stack.push(node.index[i]),
                    count => {
                        for slot in node.index[i]..node.index[i] + count {
                            covered[slot as usize] = true;
                        }
                    }
                }
            }
        }

        assert!(covered.iter().all(|&c| c));
    }

    #[test]
    fn test_nodes_have_at_least_two_children() {
        let triangles = grid(6);
        let sbvh = Sbvh::build(&triangles).unwrap();
        let mbvh = Mbvh::from_sbvh(&sbvh);

        for node in &mbvh.nodes {
            let used = node.count.iter().filter(|&&c| c != EMPTY_SLOT).count();
            assert!(used >= 2);
        }
    }
}
