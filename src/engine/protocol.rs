use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::graph::{Dimensions, Link, Node};
use crate::physics::{Cooling, ForceParams};

/// Alpha decay used once a run completes, so later reheats settle quickly.
pub const INTERACTIVE_ALPHA_DECAY: f64 = 0.02;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ForceConfig {
    pub charge_strength: f64,
    pub link_distance: f64,
    pub collision_padding: f64,
    pub alpha_decay: f64,
    pub velocity_decay: f64,
    pub center_strength: f64,
    pub iterations: usize,
}

impl Default for ForceConfig {
    fn default() -> Self {
        Self {
            charge_strength: -50_000.0,
            link_distance: 800.0,
            collision_padding: 150.0,
            alpha_decay: 0.0025,
            velocity_decay: 0.06,
            center_strength: 0.005,
            iterations: 800,
        }
    }
}

impl ForceConfig {
    /// Overwrites every field the patch sets.
    pub fn apply(&mut self, patch: &ForceConfigPatch) {
        let ForceConfigPatch {
            charge_strength,
            link_distance,
            collision_padding,
            alpha_decay,
            velocity_decay,
            center_strength,
            iterations,
        } = *patch;
        self.charge_strength = charge_strength.unwrap_or(self.charge_strength);
        self.link_distance = link_distance.unwrap_or(self.link_distance);
        self.collision_padding = collision_padding.unwrap_or(self.collision_padding);
        self.alpha_decay = alpha_decay.unwrap_or(self.alpha_decay);
        self.velocity_decay = velocity_decay.unwrap_or(self.velocity_decay);
        self.center_strength = center_strength.unwrap_or(self.center_strength);
        self.iterations = iterations.unwrap_or(self.iterations);
    }

    pub fn force_params(&self) -> ForceParams {
        ForceParams {
            charge_strength: self.charge_strength,
            link_distance: self.link_distance,
            collision_padding: self.collision_padding,
            center_strength: self.center_strength,
        }
    }

    pub fn cooling(&self) -> Cooling {
        Cooling {
            alpha_decay: self.alpha_decay,
            velocity_decay: self.velocity_decay,
            ..Cooling::default()
        }
    }
}

/// Partial [`ForceConfig`]; unset fields keep the engine's current value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForceConfigPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charge_strength: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_distance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collision_padding: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alpha_decay: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub velocity_decay: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub center_strength: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iterations: Option<usize>,
}

/// Constraint for one node. Set axes are pinned, unset axes are left alone;
/// `release` clears both pins before the set axes are applied.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PinUpdate {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fx: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fy: Option<f64>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub release: bool,
}

impl PinUpdate {
    pub fn pin(id: impl Into<String>, fx: f64, fy: f64) -> Self {
        Self {
            id: id.into(),
            fx: Some(fx),
            fy: Some(fy),
            release: false,
        }
    }

    pub fn release(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fx: None,
            fy: None,
            release: true,
        }
    }

    pub fn is_noop(&self) -> bool {
        !self.release && self.fx.is_none() && self.fy.is_none()
    }
}

/// Run generation. Commands that start or change a run carry one, and the
/// engine stamps it on every event it emits until the next such command.
pub type RunId = u64;

/// Messages accepted by a layout engine, processed in send order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Command {
    Initialize {
        #[serde(default)]
        run: RunId,
        nodes: Vec<Node>,
        links: Vec<Link>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        dimensions: Option<Dimensions>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        config: Option<ForceConfigPatch>,
    },
    Tick,
    Reheat {
        #[serde(default)]
        run: RunId,
    },
    Update {
        #[serde(default)]
        run: RunId,
        nodes: Vec<PinUpdate>,
    },
    /// Halts batched ticking after the batch in flight.
    Stop,
}

impl Command {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Initialize { .. } => "initialize",
            Self::Tick => "tick",
            Self::Reheat { .. } => "reheat",
            Self::Update { .. } => "update",
            Self::Stop => "stop",
        }
    }
}

/// Reasons an engine reports instead of positions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Error)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum EngineFailure {
    #[error("invalid graph: {message}")]
    Validation { message: String },
    #[error("node {id:?} left the finite plane at iteration {iteration}")]
    Diverged { id: String, iteration: usize },
}

/// Messages emitted by a layout engine. Node lists are full copies.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Event {
    Positions {
        run: RunId,
        nodes: Vec<Node>,
    },
    Progress {
        run: RunId,
        progress: f64,
        nodes: Vec<Node>,
    },
    Complete {
        run: RunId,
        nodes: Vec<Node>,
    },
    Error {
        run: RunId,
        error: EngineFailure,
    },
}

impl Event {
    pub fn run(&self) -> RunId {
        match self {
            Self::Positions { run, .. }
            | Self::Progress { run, .. }
            | Self::Complete { run, .. }
            | Self::Error { run, .. } => *run,
        }
    }

    pub fn nodes(&self) -> Option<&[Node]> {
        match self {
            Self::Positions { nodes, .. }
            | Self::Progress { nodes, .. }
            | Self::Complete { nodes, .. } => Some(nodes),
            Self::Error { .. } => None,
        }
    }
}
