use crate::graph::Node;
use crate::util::fallback_direction;

use super::quadtree::QuadNode;
use super::vec2::{Vec2, vec2};

const JIGGLE: f64 = 1e-6;
const DISTANCE_MIN_SQ: f64 = 1.0;

/// Nudges zero components apart so coincident nodes get a direction.
fn unstick(mut delta: Vec2, a: usize, b: usize) -> Vec2 {
    if delta.x == 0.0 || delta.y == 0.0 {
        let (jx, jy) = fallback_direction(a, b);
        if delta.x == 0.0 {
            delta.x = jx * JIGGLE;
        }
        if delta.y == 0.0 {
            delta.y = jy * JIGGLE;
        }
    }
    delta
}

fn predicted(node: &Node) -> Vec2 {
    vec2(node.x + node.vx, node.y + node.vy)
}

#[derive(Clone, Copy, Debug)]
pub(super) struct Spring {
    pub(super) source: usize,
    pub(super) target: usize,
    pub(super) strength: f64,
    /// Share of the correction taken by the target; the better-connected
    /// end moves less.
    pub(super) bias: f64,
}

pub(super) fn apply_springs(nodes: &mut [Node], springs: &[Spring], distance: f64, alpha: f64) {
    for spring in springs {
        let (source, target) = (spring.source, spring.target);
        if source == target {
            continue;
        }

        let delta = unstick(predicted(&nodes[target]) - predicted(&nodes[source]), source, target);
        let length = delta.length();
        let correction = delta * ((length - distance) / length * alpha * spring.strength);

        nodes[target].vx -= correction.x * spring.bias;
        nodes[target].vy -= correction.y * spring.bias;
        nodes[source].vx += correction.x * (1.0 - spring.bias);
        nodes[source].vy += correction.y * (1.0 - spring.bias);
    }
}

#[derive(Clone, Copy, Debug)]
pub(super) struct ChargeParams {
    pub(super) theta_sq: f64,
    pub(super) distance_max_sq: f64,
    pub(super) alpha: f64,
}

fn accumulate_charge(
    cell: &QuadNode,
    index: usize,
    positions: &[Vec2],
    charges: &[f64],
    params: ChargeParams,
    velocity: &mut Vec2,
) {
    if cell.weight_sum == 0.0 {
        return;
    }

    let point = positions[index];

    if !cell.is_leaf() {
        let delta = cell.center - point;
        let mut distance_sq = delta.length_sq();
        let width = cell.bounds.side_length();
        let can_approximate =
            !cell.bounds.contains(point) && (width * width / params.theta_sq) < distance_sq;

        if can_approximate {
            if distance_sq < params.distance_max_sq {
                if distance_sq < DISTANCE_MIN_SQ {
                    distance_sq = (DISTANCE_MIN_SQ * distance_sq).sqrt();
                }
                *velocity += delta * (cell.weight_sum * params.alpha / distance_sq);
            }
            return;
        }

        for child in cell.children.iter().flatten() {
            accumulate_charge(child, index, positions, charges, params, velocity);
        }
        return;
    }

    for &other in &cell.indices {
        if other == index {
            continue;
        }

        let delta = unstick(positions[other] - point, index, other);
        let mut distance_sq = delta.length_sq();
        if distance_sq >= params.distance_max_sq {
            continue;
        }
        if distance_sq < DISTANCE_MIN_SQ {
            distance_sq = (DISTANCE_MIN_SQ * distance_sq).sqrt();
        }
        *velocity += delta * (charges[other] * params.alpha / distance_sq);
    }
}

/// Barnes-Hut many-body force. Negative charges repel.
pub(super) fn apply_charge(
    nodes: &mut [Node],
    positions: &[Vec2],
    charges: &[f64],
    tree: &QuadNode,
    params: ChargeParams,
) {
    for (index, node) in nodes.iter_mut().enumerate() {
        let mut velocity = Vec2::ZERO;
        accumulate_charge(tree, index, positions, charges, params, &mut velocity);
        node.vx += velocity.x;
        node.vy += velocity.y;
    }
}

fn resolve_overlaps(
    cell: &QuadNode,
    index: usize,
    point: Vec2,
    radii: &[f64],
    strength: f64,
    nodes: &mut [Node],
) {
    let own_radius = radii[index];
    if cell.bounds.outside_reach(point, own_radius + cell.weight_max) {
        return;
    }

    if !cell.is_leaf() {
        for child in cell.children.iter().flatten() {
            resolve_overlaps(child, index, point, radii, strength, nodes);
        }
        return;
    }

    let own_sq = own_radius * own_radius;
    for &other in &cell.indices {
        if other <= index {
            continue;
        }

        let other_radius = radii[other];
        let reach = own_radius + other_radius;
        let delta = point - predicted(&nodes[other]);
        if delta.length_sq() >= reach * reach {
            continue;
        }

        let delta = unstick(delta, index, other);
        let length = delta.length();
        let push = delta * ((reach - length) / length * strength);
        let other_sq = other_radius * other_radius;
        let share = other_sq / (own_sq + other_sq);

        nodes[index].vx += push.x * share;
        nodes[index].vy += push.y * share;
        nodes[other].vx -= push.x * (1.0 - share);
        nodes[other].vy -= push.y * (1.0 - share);
    }
}

/// Pushes overlapping discs apart, relaxing `iterations` times on predicted
/// positions. Approximate by construction; residual overlap is expected.
pub(super) fn apply_collision(
    nodes: &mut [Node],
    radii: &[f64],
    strength: f64,
    iterations: usize,
    positions: &mut Vec<Vec2>,
) {
    for _ in 0..iterations {
        positions.clear();
        positions.extend(nodes.iter().map(predicted));

        let Some(tree) = QuadNode::build(positions, radii) else {
            return;
        };

        for index in 0..nodes.len() {
            let point = predicted(&nodes[index]);
            resolve_overlaps(&tree, index, point, radii, strength, nodes);
        }
    }
}

pub(super) fn apply_centering(nodes: &mut [Node], center: Vec2, strength: f64, alpha: f64) {
    let scale = strength * alpha;
    for node in nodes {
        node.vx += (center.x - node.x) * scale;
        node.vy += (center.y - node.y) * scale;
    }
}

/// Pulls every node toward its own ring around `center`.
pub(super) fn apply_radial(
    nodes: &mut [Node],
    rings: &[f64],
    center: Vec2,
    strength: f64,
    alpha: f64,
) {
    for (node, ring) in nodes.iter_mut().zip(rings) {
        let mut dx = node.x - center.x;
        if dx == 0.0 {
            dx = JIGGLE;
        }
        let mut dy = node.y - center.y;
        if dy == 0.0 {
            dy = JIGGLE;
        }
        let radius = (dx * dx + dy * dy).sqrt();
        let k = (ring - radius) * strength * alpha / radius;
        node.vx += dx * k;
        node.vy += dy * k;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node_at(id: &str, x: f64, y: f64) -> Node {
        let mut node = Node::new(id, id);
        node.x = x;
        node.y = y;
        node
    }

    #[test]
    fn spring_pulls_distant_pair_together() {
        let mut nodes = vec![node_at("a", 0.0, 0.0), node_at("b", 100.0, 0.0)];
        let springs = [Spring {
            source: 0,
            target: 1,
            strength: 0.5,
            bias: 0.5,
        }];
        apply_springs(&mut nodes, &springs, 10.0, 1.0);
        assert!(nodes[0].vx > 0.0);
        assert!(nodes[1].vx < 0.0);
        assert!((nodes[0].vx + nodes[1].vx).abs() < 1e-9);
    }

    #[test]
    fn negative_charge_repels() {
        let mut nodes = vec![node_at("a", 0.0, 0.0), node_at("b", 10.0, 0.0)];
        let positions = nodes.iter().map(|node| vec2(node.x, node.y)).collect::<Vec<_>>();
        let charges = vec![-30.0, -30.0];
        let tree = QuadNode::build(&positions, &charges).unwrap();
        apply_charge(
            &mut nodes,
            &positions,
            &charges,
            &tree,
            ChargeParams {
                theta_sq: 0.25,
                distance_max_sq: f64::INFINITY,
                alpha: 1.0,
            },
        );
        assert!((nodes[0].vx + 3.0).abs() < 1e-9);
        assert!((nodes[1].vx - 3.0).abs() < 1e-9);
    }

    #[test]
    fn charge_ignores_pairs_beyond_distance_max() {
        let mut nodes = vec![node_at("a", 0.0, 0.0), node_at("b", 500.0, 0.0)];
        let positions = nodes.iter().map(|node| vec2(node.x, node.y)).collect::<Vec<_>>();
        let charges = vec![-30.0, -30.0];
        let tree = QuadNode::build(&positions, &charges).unwrap();
        apply_charge(
            &mut nodes,
            &positions,
            &charges,
            &tree,
            ChargeParams {
                theta_sq: 0.25,
                distance_max_sq: 100.0 * 100.0,
                alpha: 1.0,
            },
        );
        assert_eq!(nodes[0].vx, 0.0);
        assert_eq!(nodes[1].vx, 0.0);
    }

    #[test]
    fn collision_separates_overlapping_discs() {
        let mut nodes = vec![node_at("a", 0.0, 0.0), node_at("b", 4.0, 0.0)];
        let mut scratch = Vec::new();
        apply_collision(&mut nodes, &[5.0, 5.0], 1.0, 1, &mut scratch);
        assert!(nodes[0].vx < 0.0);
        assert!(nodes[1].vx > 0.0);
        let gap = (nodes[1].x + nodes[1].vx) - (nodes[0].x + nodes[0].vx);
        assert!((gap - 10.0).abs() < 1e-9);
    }

    #[test]
    fn radial_pulls_outward_toward_ring() {
        let mut nodes = vec![node_at("a", 10.0, 0.0)];
        apply_radial(&mut nodes, &[100.0], Vec2::ZERO, 0.1, 1.0);
        assert!((nodes[0].vx - 9.0).abs() < 1e-9);
        assert!(nodes[0].vy.abs() < 1e-9);
    }

    #[test]
    fn radial_moves_a_centred_node_on_both_axes() {
        let mut nodes = vec![node_at("a", 0.0, 0.0)];
        apply_radial(&mut nodes, &[100.0], Vec2::ZERO, 0.1, 1.0);
        assert!(nodes[0].vx != 0.0);
        assert!(nodes[0].vy != 0.0);
    }
}
