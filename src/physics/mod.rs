//! Force simulation: link springs, Barnes-Hut charge, collision, centring and
//! a degree-dependent radial ring, integrated with velocity decay.

mod forces;
mod quadtree;
mod vec2;

use thiserror::Error;

use crate::graph::{Dimensions, Node};
use forces::{
    ChargeParams, Spring, apply_centering, apply_charge, apply_collision, apply_radial,
    apply_springs,
};
use quadtree::QuadNode;
pub use vec2::{Vec2, vec2};

/// Radius every charge is scaled against.
pub const BASE_RADIUS: f64 = 12.0;
const BARNES_HUT_THETA: f64 = 0.5;
const DEFAULT_LINK_STRENGTH: f64 = 0.05;
const COLLISION_STRENGTH: f64 = 1.0;
const COLLISION_ITERATIONS: usize = 8;
const CENTER_SCALE: f64 = 0.8;
const RADIAL_STRENGTH: f64 = 0.1;
const RADIAL_SPREAD: f64 = 0.4;
const RADIAL_PER_DEGREE: f64 = 10.0;

/// Visual and collision size for a node with `degree` incident links.
pub fn radius_for_degree(degree: usize) -> f64 {
    BASE_RADIUS + ((degree + 1) as f64).sqrt() * 1.5
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ForceParams {
    pub charge_strength: f64,
    pub link_distance: f64,
    pub collision_padding: f64,
    pub center_strength: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Cooling {
    pub alpha: f64,
    pub alpha_min: f64,
    pub alpha_decay: f64,
    pub alpha_target: f64,
    pub velocity_decay: f64,
}

impl Default for Cooling {
    fn default() -> Self {
        Self {
            alpha: 0.9,
            alpha_min: 0.0005,
            alpha_decay: 0.0025,
            alpha_target: 0.0,
            velocity_decay: 0.06,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Error)]
#[error("node {id:?} reached a non-finite position")]
pub struct Diverged {
    pub index: usize,
    pub id: String,
}

#[derive(Default)]
struct Scratch {
    positions: Vec<Vec2>,
}

pub struct Simulation {
    nodes: Vec<Node>,
    springs: Vec<Spring>,
    charges: Vec<f64>,
    collision_radii: Vec<f64>,
    rings: Vec<f64>,
    params: ForceParams,
    center: Vec2,
    charge_distance_max_sq: f64,
    cooling: Cooling,
    scratch: Scratch,
}

impl Simulation {
    /// Builds a simulation over nodes whose `degree` and `radius` are already
    /// derived. `edges` index into `nodes`; `link_strengths` is parallel to
    /// `edges`.
    pub fn new(
        nodes: Vec<Node>,
        edges: &[(usize, usize)],
        link_strengths: &[Option<f64>],
        dimensions: Dimensions,
        params: ForceParams,
        cooling: Cooling,
    ) -> Self {
        let mut link_counts = vec![0usize; nodes.len()];
        for &(source, target) in edges {
            link_counts[source] += 1;
            link_counts[target] += 1;
        }

        let springs = edges
            .iter()
            .enumerate()
            .map(|(index, &(source, target))| {
                let source_count = link_counts[source] as f64;
                let target_count = link_counts[target] as f64;
                Spring {
                    source,
                    target,
                    strength: link_strengths
                        .get(index)
                        .copied()
                        .flatten()
                        .unwrap_or(DEFAULT_LINK_STRENGTH),
                    bias: source_count / (source_count + target_count),
                }
            })
            .collect();

        let charges = nodes
            .iter()
            .map(|node| params.charge_strength * (node.radius / BASE_RADIUS).powf(1.5))
            .collect();
        let collision_radii = nodes
            .iter()
            .map(|node| node.radius + params.collision_padding)
            .collect();
        let ring_base = dimensions.min_side() * RADIAL_SPREAD;
        let rings = nodes
            .iter()
            .map(|node| ring_base + node.degree as f64 * RADIAL_PER_DEGREE)
            .collect();

        let (center_x, center_y) = dimensions.center();
        let charge_distance_max = dimensions.max_side() * 3.0;

        Self {
            nodes,
            springs,
            charges,
            collision_radii,
            rings,
            params,
            center: vec2(center_x, center_y),
            charge_distance_max_sq: charge_distance_max * charge_distance_max,
            cooling,
            scratch: Scratch::default(),
        }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn alpha(&self) -> f64 {
        self.cooling.alpha
    }

    pub fn set_alpha(&mut self, alpha: f64) {
        self.cooling.alpha = alpha;
    }

    pub fn alpha_decay(&self) -> f64 {
        self.cooling.alpha_decay
    }

    pub fn set_alpha_decay(&mut self, alpha_decay: f64) {
        self.cooling.alpha_decay = alpha_decay;
    }

    /// Energy has dropped below the floor.
    pub fn is_settled(&self) -> bool {
        self.cooling.alpha < self.cooling.alpha_min
    }

    /// Puts back a snapshot taken from [`nodes`](Self::nodes). Snapshots of a
    /// different graph are ignored.
    pub fn restore(&mut self, nodes: Vec<Node>) {
        if nodes.len() == self.nodes.len() {
            self.nodes = nodes;
        }
    }

    pub fn node_mut(&mut self, index: usize) -> Option<&mut Node> {
        self.nodes.get_mut(index)
    }

    /// Advances one step: cools alpha, applies every force to velocities, then
    /// moves unpinned nodes. Pinned axes snap to their pin with zero velocity.
    pub fn tick(&mut self) -> Result<(), Diverged> {
        let cooling = &mut self.cooling;
        cooling.alpha += (cooling.alpha_target - cooling.alpha) * cooling.alpha_decay;
        let alpha = cooling.alpha;

        if self.nodes.is_empty() {
            return Ok(());
        }

        apply_springs(&mut self.nodes, &self.springs, self.params.link_distance, alpha);

        self.scratch.positions.clear();
        self.scratch
            .positions
            .extend(self.nodes.iter().map(|node| vec2(node.x, node.y)));
        if let Some(tree) = QuadNode::build(&self.scratch.positions, &self.charges) {
            apply_charge(
                &mut self.nodes,
                &self.scratch.positions,
                &self.charges,
                &tree,
                ChargeParams {
                    theta_sq: BARNES_HUT_THETA * BARNES_HUT_THETA,
                    distance_max_sq: self.charge_distance_max_sq,
                    alpha,
                },
            );
        }

        apply_collision(
            &mut self.nodes,
            &self.collision_radii,
            COLLISION_STRENGTH,
            COLLISION_ITERATIONS,
            &mut self.scratch.positions,
        );
        apply_centering(
            &mut self.nodes,
            self.center,
            self.params.center_strength * CENTER_SCALE,
            alpha,
        );
        apply_radial(
            &mut self.nodes,
            &self.rings,
            self.center,
            RADIAL_STRENGTH,
            alpha,
        );

        let retain = 1.0 - self.cooling.velocity_decay;
        for node in &mut self.nodes {
            match node.fx {
                Some(fx) => {
                    node.x = fx;
                    node.vx = 0.0;
                }
                None => {
                    node.vx *= retain;
                    node.x += node.vx;
                }
            }
            match node.fy {
                Some(fy) => {
                    node.y = fy;
                    node.vy = 0.0;
                }
                None => {
                    node.vy *= retain;
                    node.y += node.vy;
                }
            }
        }

        match self
            .nodes
            .iter()
            .position(|node| !node.has_finite_position())
        {
            Some(index) => Err(Diverged {
                index,
                id: self.nodes[index].id.clone(),
            }),
            None => Ok(()),
        }
    }
}
