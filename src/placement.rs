//! Starting coordinates computed before the physics simulation runs.

use std::collections::HashMap;
use std::f64::consts::TAU;

use crate::graph::{Dimensions, Node};
use crate::util::stable_pair;

const UNKNOWN_COMMUNITY: &str = "unknown";
const SPREAD_SCALE: f64 = 0.9;
const SECTOR_RAY: f64 = 0.8;
const TIMELINE_WEIGHT: f64 = 0.7;

pub const DEFAULT_ERA_ORDER: [&str; 6] = [
    "Ancient",
    "Medieval",
    "Renaissance",
    "Early Modern",
    "Modern",
    "Contemporary",
];

/// Ordinal range mapped onto the vertical extent of the layout.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimelineDomain {
    pub start: f64,
    pub end: f64,
}

impl Default for TimelineDomain {
    fn default() -> Self {
        Self {
            start: -600.0,
            end: 2000.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlacementOptions {
    /// Largest offset added on each axis. Zero makes placement purely
    /// structural.
    pub jitter: f64,
    pub timeline: TimelineDomain,
}

impl Default for PlacementOptions {
    fn default() -> Self {
        Self {
            jitter: 50.0,
            timeline: TimelineDomain::default(),
        }
    }
}

impl PlacementOptions {
    pub fn without_jitter() -> Self {
        Self {
            jitter: 0.0,
            ..Self::default()
        }
    }
}

/// Canonical array-index keys (`"0"`, `"17"`, but not `"07"`) sort ahead of
/// every other community key, numerically.
fn array_index(key: &str) -> Option<u32> {
    if key.is_empty() || (key.len() > 1 && key.starts_with('0')) {
        return None;
    }
    if !key.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    key.parse::<u32>().ok().filter(|value| *value < u32::MAX)
}

/// Groups node indices by community label, in the order sectors are handed
/// out.
fn community_buckets(nodes: &[Node]) -> Vec<Vec<usize>> {
    let mut slot_by_key: HashMap<String, usize> = HashMap::new();
    let mut keys: Vec<String> = Vec::new();
    let mut buckets: Vec<Vec<usize>> = Vec::new();

    for (index, node) in nodes.iter().enumerate() {
        let key = node
            .community
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| UNKNOWN_COMMUNITY.to_owned());
        let slot = *slot_by_key.entry(key.clone()).or_insert_with(|| {
            keys.push(key);
            buckets.push(Vec::new());
            buckets.len() - 1
        });
        buckets[slot].push(index);
    }

    let mut order = (0..buckets.len()).collect::<Vec<_>>();
    order.sort_by_key(|&slot| match array_index(&keys[slot]) {
        Some(value) => (0, value, 0),
        None => (1, 0, slot),
    });

    let mut buckets = buckets.into_iter().map(Some).collect::<Vec<_>>();
    order
        .into_iter()
        .filter_map(|slot| buckets[slot].take())
        .collect()
}

/// Places every community on its own ray of the circle, pushed outward by
/// degree, and pulls nodes with a birth year toward a top-to-bottom timeline.
///
/// Resets `vx`/`vy`. The result depends only on the node order and contents.
pub fn place_in_spread(nodes: &mut [Node], dimensions: Dimensions, options: PlacementOptions) {
    if nodes.is_empty() {
        return;
    }

    let (center_x, center_y) = dimensions.center();
    let radius = dimensions.min_side() * SPREAD_SCALE;
    let buckets = community_buckets(nodes);
    let sector_width = TAU / buckets.len() as f64;
    let timeline_span = options.timeline.end - options.timeline.start;

    for (community_index, bucket) in buckets.iter().enumerate() {
        let sector_start = community_index as f64 * sector_width;
        // Every member shares one ray; the wedge comes from jitter and degree.
        let angle = sector_start + sector_width * SECTOR_RAY;

        for &index in bucket {
            let node = &mut nodes[index];
            let distance = radius * ((node.degree + 1) as f64).sqrt() * SPREAD_SCALE;

            let (jx, jy) = stable_pair(&node.id);
            node.x = center_x + distance * angle.cos() + jx * options.jitter;
            node.y = center_y + distance * angle.sin() + jy * options.jitter;
            node.vx = 0.0;
            node.vy = 0.0;

            if let Some(year) = node.birth_year
                && timeline_span != 0.0
            {
                let timeline_y = center_y
                    + (year - options.timeline.start) / timeline_span * dimensions.height * 0.8
                    - dimensions.height * 0.4;
                node.y = node.y * (1.0 - TIMELINE_WEIGHT) + timeline_y * TIMELINE_WEIGHT;
            }
        }
    }
}

/// Pins nodes evenly around one circle, ordered by era. Nodes whose era is not
/// in `era_order` come first, then each era in turn; input order is kept
/// within a group.
pub fn place_radial_by_era(nodes: &mut [Node], dimensions: Dimensions, era_order: &[&str]) {
    if nodes.is_empty() {
        return;
    }

    let rank = |node: &Node| {
        node.era
            .as_deref()
            .and_then(|era| era_order.iter().position(|known| *known == era))
            .map_or(0, |position| position + 1)
    };

    let mut order = (0..nodes.len()).collect::<Vec<_>>();
    order.sort_by_key(|&index| rank(&nodes[index]));

    let (center_x, center_y) = dimensions.center();
    let radius = dimensions.min_side() / 2.5;
    let angle_step = TAU / nodes.len() as f64;

    for (slot, index) in order.into_iter().enumerate() {
        let angle = angle_step * slot as f64;
        let node = &mut nodes[index];
        let x = center_x + radius * angle.cos();
        let y = center_y + radius * angle.sin();
        node.x = x;
        node.y = y;
        node.fx = Some(x);
        node.fy = Some(y);
        node.vx = 0.0;
        node.vy = 0.0;
    }
}
