//! Bounding Volume Hierarchy (BVH) acceleration structure.
//!
//! Nodes live in one flat array; a leaf addresses a run of the primitive
//! index array and a branch stores the index of its first child, the
//! second child following it. The hierarchy only knows primitive boxes,
//! so the same structure serves triangles, custom primitives and
//! instances.

use mbrt_math::{Aabb, Interval, Ray, Vec3};
use serde::{Deserialize, Serialize};

/// Maximum primitives per leaf node before splitting.
const LEAF_MAX_SIZE: usize = 4;

/// Bins per axis for the surface area heuristic.
const SAH_BINS: usize = 16;

/// Entries in the fixed traversal stack.
pub const TRAVERSAL_STACK_SIZE: usize = 64;

/// Build depth limit. Near-first traversal keeps at most one pending
/// sibling per level, so the stack can never overflow.
const MAX_DEPTH: usize = TRAVERSAL_STACK_SIZE - 2;

/// Trade-off between build time and traversal speed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildQuality {
    /// Median split on the longest centroid axis.
    #[default]
    PreferFastBuild,
    /// Binned surface area heuristic.
    PreferHighQuality,
}

#[derive(Debug, Clone, Copy)]
struct BvhNode {
    bbox: Aabb,
    /// First child for a branch, first primitive slot for a leaf.
    left_first: u32,
    /// Primitive count; zero marks a branch.
    count: u32,
}

impl BvhNode {
    fn is_leaf(&self) -> bool {
        self.count > 0
    }
}

/// A flat BVH over primitive bounding boxes.
#[derive(Debug, Clone, Default)]
pub struct Bvh {
    nodes: Vec<BvhNode>,
    prim_indices: Vec<u32>,
}

impl Bvh {
    /// Build a hierarchy over `boxes`; primitive `i` is `boxes[i]`.
    pub fn build(boxes: &[Aabb], quality: BuildQuality) -> Self {
        if boxes.is_empty() {
            return Self::default();
        }

        let mut builder = Builder {
            boxes,
            centroids: boxes.iter().map(|b| b.centroid()).collect(),
            prims: (0..boxes.len() as u32).collect(),
            nodes: Vec::with_capacity(2 * boxes.len() / LEAF_MAX_SIZE + 1),
            quality,
        };
        builder.nodes.push(BvhNode {
            bbox: builder.bounds_of(0, boxes.len()),
            left_first: 0,
            count: boxes.len() as u32,
        });
        builder.subdivide(0, 0);

        log::debug!(
            "Built BVH ({:?}): {} primitives, {} nodes",
            quality,
            boxes.len(),
            builder.nodes.len()
        );

        Self {
            nodes: builder.nodes,
            prim_indices: builder.prims,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn bounds(&self) -> Aabb {
        self.nodes.first().map_or(Aabb::EMPTY, |root| root.bbox)
    }

    /// Depth of the deepest leaf, the root counting as 1.
    pub fn depth(&self) -> usize {
        fn walk(nodes: &[BvhNode], index: usize) -> usize {
            let node = &nodes[index];
            if node.is_leaf() {
                return 1;
            }
            let left = node.left_first as usize;
            1 + walk(nodes, left).max(walk(nodes, left + 1))
        }
        if self.nodes.is_empty() {
            0
        } else {
            walk(&self.nodes, 0)
        }
    }

    /// Visit every primitive whose box the ray overlaps.
    ///
    /// `visit(prim, ray_t)` returns the distance of an accepted hit. In
    /// closest mode the interval shrinks to each accepted hit; with
    /// `first_hit` traversal stops at the first one. Returns whether any
    /// hit was accepted.
    pub fn traverse<F>(&self, ray: &Ray, mut ray_t: Interval, first_hit: bool, mut visit: F) -> bool
    where
        F: FnMut(u32, Interval) -> Option<f32>,
    {
        if self.nodes.is_empty() || self.nodes[0].bbox.hit(ray, ray_t).is_none() {
            return false;
        }

        let mut stack = [0u32; TRAVERSAL_STACK_SIZE];
        let mut top = 1;
        let mut hit_anything = false;

        while top > 0 {
            top -= 1;
            let node = &self.nodes[stack[top] as usize];
            if node.bbox.hit(ray, ray_t).is_none() {
                continue;
            }

            if node.is_leaf() {
                let first = node.left_first as usize;
                for &prim in &self.prim_indices[first..first + node.count as usize] {
                    if let Some(t) = visit(prim, ray_t) {
                        hit_anything = true;
                        if first_hit {
                            return true;
                        }
                        ray_t.max = t;
                    }
                }
                continue;
            }

            // Push the far child first so the near one is popped next
            let left = node.left_first;
            let right = left + 1;
            let near_left = self.nodes[left as usize].bbox.hit(ray, ray_t);
            let near_right = self.nodes[right as usize].bbox.hit(ray, ray_t);
            match (near_left, near_right) {
                (Some(tl), Some(tr)) => {
                    let (near, far) = if tl <= tr { (left, right) } else { (right, left) };
                    stack[top] = far;
                    stack[top + 1] = near;
                    top += 2;
                }
                (Some(_), None) => {
                    stack[top] = left;
                    top += 1;
                }
                (None, Some(_)) => {
                    stack[top] = right;
                    top += 1;
                }
                (None, None) => {}
            }
        }

        hit_anything
    }
}

struct Builder<'a> {
    boxes: &'a [Aabb],
    centroids: Vec<Vec3>,
    prims: Vec<u32>,
    nodes: Vec<BvhNode>,
    quality: BuildQuality,
}

impl Builder<'_> {
    fn bounds_of(&self, first: usize, count: usize) -> Aabb {
        self.prims[first..first + count]
            .iter()
            .fold(Aabb::EMPTY, |acc, &p| Aabb::surrounding(&acc, &self.boxes[p as usize]))
    }

    fn centroid_bounds(&self, first: usize, count: usize) -> Aabb {
        self.prims[first..first + count]
            .iter()
            .fold(Aabb::EMPTY, |acc, &p| acc.include_point(self.centroids[p as usize]))
    }

    fn subdivide(&mut self, node_index: usize, depth: usize) {
        let node = self.nodes[node_index];
        let first = node.left_first as usize;
        let count = node.count as usize;
        if count <= LEAF_MAX_SIZE || depth >= MAX_DEPTH {
            return;
        }

        let left_count = match self.quality {
            BuildQuality::PreferFastBuild => self.median_split(first, count),
            BuildQuality::PreferHighQuality => self
                .sah_split(first, count)
                .unwrap_or_else(|| self.median_split(first, count)),
        };
        if left_count == 0 || left_count == count {
            return;
        }

        let left_index = self.nodes.len();
        self.nodes.push(BvhNode {
            bbox: self.bounds_of(first, left_count),
            left_first: first as u32,
            count: left_count as u32,
        });
        self.nodes.push(BvhNode {
            bbox: self.bounds_of(first + left_count, count - left_count),
            left_first: (first + left_count) as u32,
            count: (count - left_count) as u32,
        });
        self.nodes[node_index].left_first = left_index as u32;
        self.nodes[node_index].count = 0;

        self.subdivide(left_index, depth + 1);
        self.subdivide(left_index + 1, depth + 1);
    }

    /// Sort by centroid on the longest centroid axis and split in half.
    fn median_split(&mut self, first: usize, count: usize) -> usize {
        let axis = self.centroid_bounds(first, count).longest_axis();
        let centroids = &self.centroids;
        self.prims[first..first + count].sort_unstable_by(|&a, &b| {
            centroids[a as usize][axis]
                .partial_cmp(&centroids[b as usize][axis])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        count / 2
    }

    /// Partition at the cheapest bin boundary, or `None` when the
    /// centroids cannot be separated.
    fn sah_split(&mut self, first: usize, count: usize) -> Option<usize> {
        let centroid_bounds = self.centroid_bounds(first, count);
        let axis = centroid_bounds.longest_axis();
        let extent = centroid_bounds.axis_interval(axis);
        if extent.size() < 1e-6 {
            return None;
        }

        let scale = SAH_BINS as f32 / extent.size();
        let bin_of = |c: Vec3| (((c[axis] - extent.min) * scale) as usize).min(SAH_BINS - 1);

        let mut bin_bounds = [Aabb::EMPTY; SAH_BINS];
        let mut bin_counts = [0usize; SAH_BINS];
        for &p in &self.prims[first..first + count] {
            let bin = bin_of(self.centroids[p as usize]);
            bin_counts[bin] += 1;
            bin_bounds[bin] = Aabb::surrounding(&bin_bounds[bin], &self.boxes[p as usize]);
        }

        // Cost of splitting after bin i: left area * left count + right area * right count
        let mut left_area = [0.0f32; SAH_BINS];
        let mut left_count = [0usize; SAH_BINS];
        let (mut acc_box, mut acc_count) = (Aabb::EMPTY, 0);
        for i in 0..SAH_BINS {
            acc_box = Aabb::surrounding(&acc_box, &bin_bounds[i]);
            acc_count += bin_counts[i];
            left_area[i] = acc_box.surface_area();
            left_count[i] = acc_count;
        }

        let mut best: Option<(usize, f32)> = None;
        let (mut acc_box, mut acc_count) = (Aabb::EMPTY, 0);
        for i in (1..SAH_BINS).rev() {
            acc_box = Aabb::surrounding(&acc_box, &bin_bounds[i]);
            acc_count += bin_counts[i];
            let split = i - 1;
            if left_count[split] == 0 || acc_count == 0 {
                continue;
            }
            let cost = left_area[split] * left_count[split] as f32 + acc_box.surface_area() * acc_count as f32;
            if best.map_or(true, |(_, c)| cost < c) {
                best = Some((split, cost));
            }
        }
        let (split, _) = best?;

        let centroids = &self.centroids;
        let (left, right): (Vec<u32>, Vec<u32>) = self.prims[first..first + count]
            .iter()
            .copied()
            .partition(|&p| bin_of(centroids[p as usize]) <= split);
        let left_len = left.len();
        self.prims[first..first + left_len].copy_from_slice(&left);
        self.prims[first + left_len..first + count].copy_from_slice(&right);
        Some(left_len)
    }
}
