use super::vec2::{Vec2, vec2};

const QUADTREE_LEAF_CAPACITY: usize = 12;
const QUADTREE_MAX_DEPTH: usize = 16;

#[derive(Clone, Copy, Debug)]
pub(super) struct QuadBounds {
    pub(super) center: Vec2,
    pub(super) half_extent: f64,
}

impl QuadBounds {
    fn from_points(points: &[Vec2]) -> Option<Self> {
        let mut min = vec2(f64::INFINITY, f64::INFINITY);
        let mut max = vec2(f64::NEG_INFINITY, f64::NEG_INFINITY);

        for point in points {
            if !point.is_finite() {
                return None;
            }
            min.x = min.x.min(point.x);
            min.y = min.y.min(point.y);
            max.x = max.x.max(point.x);
            max.y = max.y.max(point.y);
        }

        if points.is_empty() {
            return None;
        }

        let center = (min + max) * 0.5;
        let span_x = (max.x - min.x).max(1.0);
        let span_y = (max.y - min.y).max(1.0);
        let half_extent = (span_x.max(span_y) * 0.5) + 1.0;

        Some(Self {
            center,
            half_extent,
        })
    }

    pub(super) fn contains(self, point: Vec2) -> bool {
        (point.x - self.center.x).abs() <= self.half_extent
            && (point.y - self.center.y).abs() <= self.half_extent
    }

    /// True when no point of the cell lies within `reach` of `point` on
    /// either axis.
    pub(super) fn outside_reach(self, point: Vec2, reach: f64) -> bool {
        let limit = self.half_extent + reach;
        (point.x - self.center.x).abs() > limit || (point.y - self.center.y).abs() > limit
    }

    fn child(self, quadrant: usize) -> Self {
        let quarter = self.half_extent * 0.5;
        let offset = match quadrant {
            0 => vec2(-quarter, -quarter),
            1 => vec2(quarter, -quarter),
            2 => vec2(-quarter, quarter),
            _ => vec2(quarter, quarter),
        };

        Self {
            center: self.center + offset,
            half_extent: quarter,
        }
    }

    fn quadrant_for(self, point: Vec2) -> usize {
        let right = point.x >= self.center.x;
        let lower = point.y >= self.center.y;
        match (right, lower) {
            (false, false) => 0,
            (true, false) => 1,
            (false, true) => 2,
            (true, true) => 3,
        }
    }

    pub(super) fn side_length(self) -> f64 {
        self.half_extent * 2.0
    }
}

/// Region quadtree over node positions. Each cell aggregates a per-node
/// weight: charge strength for repulsion, collision radius for overlap tests.
#[derive(Debug)]
pub(super) struct QuadNode {
    pub(super) bounds: QuadBounds,
    /// Centre of the cell's points, weighted by `|weight|`.
    pub(super) center: Vec2,
    pub(super) weight_sum: f64,
    pub(super) weight_max: f64,
    pub(super) indices: Vec<usize>,
    pub(super) children: [Option<Box<QuadNode>>; 4],
}

impl QuadNode {
    pub(super) fn build(positions: &[Vec2], weights: &[f64]) -> Option<Self> {
        let bounds = QuadBounds::from_points(positions)?;
        let indices = (0..positions.len()).collect::<Vec<_>>();
        Some(Self::build_node(bounds, indices, positions, weights, 0))
    }

    fn build_node(
        bounds: QuadBounds,
        indices: Vec<usize>,
        positions: &[Vec2],
        weights: &[f64],
        depth: usize,
    ) -> Self {
        let mut weighted_center = Vec2::ZERO;
        let mut plain_center = Vec2::ZERO;
        let mut magnitude = 0.0;
        let mut weight_sum = 0.0;
        let mut weight_max = 0.0_f64;
        for &index in &indices {
            let weight = weights[index];
            weighted_center += positions[index] * weight.abs();
            plain_center += positions[index];
            magnitude += weight.abs();
            weight_sum += weight;
            weight_max = weight_max.max(weight.abs());
        }

        let center = if magnitude > 0.0 {
            weighted_center / magnitude
        } else if !indices.is_empty() {
            plain_center / indices.len() as f64
        } else {
            bounds.center
        };

        let mut node = Self {
            bounds,
            center,
            weight_sum,
            weight_max,
            indices,
            children: std::array::from_fn(|_| None),
        };

        if depth >= QUADTREE_MAX_DEPTH || node.indices.len() <= QUADTREE_LEAF_CAPACITY {
            return node;
        }

        let mut buckets = std::array::from_fn::<_, 4, _>(|_| Vec::new());
        for &index in &node.indices {
            let quadrant = bounds.quadrant_for(positions[index]);
            buckets[quadrant].push(index);
        }

        let non_empty = buckets.iter().filter(|bucket| !bucket.is_empty()).count();
        if non_empty <= 1 {
            // Coincident points; splitting further never separates them.
            let all_same = node
                .indices
                .windows(2)
                .all(|pair| positions[pair[0]] == positions[pair[1]]);
            if all_same {
                return node;
            }
        }

        for (quadrant, bucket) in buckets.into_iter().enumerate() {
            if bucket.is_empty() {
                continue;
            }

            let child_bounds = bounds.child(quadrant);
            node.children[quadrant] = Some(Box::new(Self::build_node(
                child_bounds,
                bucket,
                positions,
                weights,
                depth + 1,
            )));
        }
        node.indices.clear();
        node
    }

    pub(super) fn is_leaf(&self) -> bool {
        self.children.iter().all(|child| child.is_none())
    }

    #[cfg(test)]
    fn point_count(&self) -> usize {
        self.indices.len()
            + self
                .children
                .iter()
                .flatten()
                .map(|child| child.point_count())
                .sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tree_keeps_every_point_and_aggregates_weights() {
        let positions = (0..100)
            .map(|index| vec2((index % 10) as f64 * 13.0, (index / 10) as f64 * 7.0))
            .collect::<Vec<_>>();
        let weights = vec![-2.0; positions.len()];
        let tree = QuadNode::build(&positions, &weights).unwrap();

        assert_eq!(tree.point_count(), 100);
        assert!(!tree.is_leaf());
        assert!((tree.weight_sum + 200.0).abs() < 1e-9);
        assert_eq!(tree.weight_max, 2.0);
        assert!((tree.center.x - 58.5).abs() < 1e-9);
        assert!((tree.center.y - 31.5).abs() < 1e-9);
        assert!(positions.iter().all(|point| tree.bounds.contains(*point)));
    }

    #[test]
    fn coincident_points_stay_in_one_leaf() {
        let positions = vec![vec2(5.0, 5.0); 40];
        let weights = vec![1.0; 40];
        let tree = QuadNode::build(&positions, &weights).unwrap();
        assert!(tree.is_leaf());
        assert_eq!(tree.indices.len(), 40);
    }

    #[test]
    fn non_finite_positions_build_nothing() {
        let positions = vec![vec2(f64::NAN, 0.0), vec2(1.0, 1.0)];
        assert!(QuadNode::build(&positions, &[1.0, 1.0]).is_none());
    }
}
