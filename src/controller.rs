//! UI-side owner of a layout engine: turns user intents into commands and
//! folds the engine's events into a status and a position snapshot that is
//! always safe to draw.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::analytics::CategoryKey;
use crate::engine::{
    EngineError, EngineFailure, EngineOptions, Event, ForceConfigPatch, LayoutEngine, PinUpdate,
    RunId,
};
use crate::graph::{Dimensions, GraphData, Node};

pub const DEFAULT_STALL_TIMEOUT: Duration = Duration::from_secs(5);
const UNAVAILABLE: &str = "layout engine unavailable";

#[derive(Clone, Debug, PartialEq)]
pub enum LayoutStatus {
    Idle,
    Converging { progress: f64 },
    Settled,
    Failed { reason: String },
}

impl LayoutStatus {
    pub fn is_converging(&self) -> bool {
        matches!(self, Self::Converging { .. })
    }
}

/// Keeps nodes whose `key` attribute equals `value`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeFilter {
    pub key: CategoryKey,
    pub value: String,
}

impl NodeFilter {
    pub fn new(key: CategoryKey, value: impl Into<String>) -> Self {
        Self {
            key,
            value: value.into(),
        }
    }

    pub fn matches(&self, node: &Node) -> bool {
        self.key
            .value_of(node)
            .is_some_and(|value| value == self.value)
    }

    /// Subgraph of `data` with the matching nodes and the links between them.
    pub fn apply(&self, data: &GraphData) -> GraphData {
        let nodes = data
            .nodes
            .iter()
            .filter(|node| self.matches(node))
            .cloned()
            .collect::<Vec<_>>();
        let kept = nodes
            .iter()
            .map(|node| node.id.as_str())
            .collect::<HashSet<_>>();
        let links = data
            .links
            .iter()
            .filter(|link| {
                kept.contains(link.source_id().as_ref()) && kept.contains(link.target_id().as_ref())
            })
            .cloned()
            .collect();
        GraphData { nodes, links }
    }
}

pub struct Controller {
    engine: LayoutEngine,
    options: EngineOptions,
    dataset: Option<GraphData>,
    filter: Option<NodeFilter>,
    view: GraphData,
    dimensions: Dimensions,
    config: ForceConfigPatch,
    positions: Vec<Node>,
    status: LayoutStatus,
    failure: Option<EngineFailure>,
    run: RunId,
    stall_timeout: Duration,
    last_event: Instant,
}

impl Controller {
    pub fn new(options: EngineOptions, stall_timeout: Duration) -> Result<Self, EngineError> {
        Ok(Self {
            engine: LayoutEngine::spawn_with(options)?,
            options,
            dataset: None,
            filter: None,
            view: GraphData::default(),
            dimensions: Dimensions::default(),
            config: ForceConfigPatch::default(),
            positions: Vec::new(),
            status: LayoutStatus::Idle,
            failure: None,
            run: 0,
            stall_timeout,
            last_event: Instant::now(),
        })
    }

    pub fn status(&self) -> &LayoutStatus {
        &self.status
    }

    /// Last accepted snapshot. Never contains non-finite coordinates.
    pub fn positions(&self) -> &[Node] {
        &self.positions
    }

    /// The graph currently handed to the engine, after filtering.
    pub fn view(&self) -> &GraphData {
        &self.view
    }

    pub fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// Replaces the dataset and starts a fresh layout of all of it.
    pub fn load(
        &mut self,
        data: GraphData,
        dimensions: Dimensions,
        config: ForceConfigPatch,
    ) -> Result<(), EngineError> {
        info!(
            "loading dataset: {} nodes, {} links",
            data.nodes.len(),
            data.links.len()
        );
        self.view = data.clone();
        self.dataset = Some(data);
        self.filter = None;
        self.dimensions = dimensions;
        self.config = config;
        self.start_view()
    }

    pub fn resize(&mut self, dimensions: Dimensions) -> Result<(), EngineError> {
        if self.dimensions == dimensions {
            return Ok(());
        }
        self.dimensions = dimensions;
        if self.dataset.is_none() {
            return Ok(());
        }
        self.start_view()
    }

    pub fn pin(&mut self, id: &str, x: f64, y: f64) -> Result<(), EngineError> {
        self.ensure_loaded()?;
        if let Some(node) = self.positions.iter_mut().find(|node| node.id == id) {
            node.x = x;
            node.y = y;
            node.fx = Some(x);
            node.fy = Some(y);
        }
        let sent = self.engine.update(vec![PinUpdate::pin(id, x, y)]);
        self.run = self.track(sent)?;
        Ok(())
    }

    pub fn release(&mut self, id: &str) -> Result<(), EngineError> {
        self.ensure_loaded()?;
        if let Some(node) = self.positions.iter_mut().find(|node| node.id == id) {
            node.fx = None;
            node.fy = None;
        }
        let sent = self.engine.update(vec![PinUpdate::release(id)]);
        self.run = self.track(sent)?;
        Ok(())
    }

    /// Lays out only the nodes matching `filter`.
    pub fn filter(&mut self, filter: NodeFilter) -> Result<(), EngineError> {
        let Some(dataset) = self.dataset.as_ref() else {
            return Err(EngineError::NotInitialized);
        };
        self.view = filter.apply(dataset);
        debug!(
            "filter {}={} keeps {} of {} nodes",
            filter.key.label(),
            filter.value,
            self.view.nodes.len(),
            dataset.nodes.len()
        );
        self.filter = Some(filter);
        self.start_view()
    }

    pub fn clear_filter(&mut self) -> Result<(), EngineError> {
        let Some(dataset) = self.dataset.as_ref() else {
            return Err(EngineError::NotInitialized);
        };
        if self.filter.take().is_none() {
            return Ok(());
        }
        self.view = dataset.clone();
        self.start_view()
    }

    pub fn active_filter(&self) -> Option<&NodeFilter> {
        self.filter.as_ref()
    }

    pub fn reheat(&mut self) -> Result<(), EngineError> {
        self.ensure_loaded()?;
        let sent = self.engine.reheat();
        let run = self.track(sent)?;
        self.begin_run(run);
        Ok(())
    }

    pub fn stop(&mut self) -> Result<(), EngineError> {
        self.ensure_loaded()?;
        let sent = self.engine.stop();
        self.track(sent)?;
        if self.status.is_converging() {
            self.status = LayoutStatus::Settled;
        }
        Ok(())
    }

    /// Starts a new engine and lays out the current view again.
    pub fn retry(&mut self) -> Result<(), EngineError> {
        self.ensure_loaded()?;
        warn!("restarting layout engine");
        self.engine = LayoutEngine::spawn_with(self.options)?;
        self.start_view()
    }

    /// Applies every event already waiting and checks for a stalled engine.
    /// Returns how many events were applied.
    pub fn poll(&mut self) -> usize {
        let mut applied = 0;
        loop {
            match self.engine.try_recv() {
                Ok(Some(event)) => {
                    self.apply(event);
                    applied += 1;
                }
                Ok(None) => break,
                Err(_) => {
                    self.mark_unavailable();
                    return applied;
                }
            }
        }
        if self.status.is_converging() && self.last_event.elapsed() > self.stall_timeout {
            self.mark_unavailable();
        }
        applied
    }

    /// Blocks until the current run settles or fails, calling `on_progress`
    /// whenever the reported progress changes.
    pub fn wait_until_settled(
        &mut self,
        mut on_progress: impl FnMut(f64),
    ) -> Result<&[Node], EngineError> {
        let mut reported = None;
        loop {
            match &self.status {
                LayoutStatus::Idle => return Err(EngineError::NotInitialized),
                LayoutStatus::Settled => return Ok(&self.positions),
                LayoutStatus::Failed { .. } => {
                    return Err(self
                        .failure
                        .clone()
                        .map_or(EngineError::Disconnected, EngineError::from));
                }
                LayoutStatus::Converging { progress } => {
                    if reported != Some(*progress) {
                        reported = Some(*progress);
                        on_progress(*progress);
                    }
                }
            }

            match self.engine.recv_timeout(self.stall_timeout) {
                Ok(Some(event)) => self.apply(event),
                Ok(None) | Err(_) => self.mark_unavailable(),
            }
        }
    }

    fn ensure_loaded(&self) -> Result<(), EngineError> {
        if self.dataset.is_some() {
            Ok(())
        } else {
            Err(EngineError::NotInitialized)
        }
    }

    fn start_view(&mut self) -> Result<(), EngineError> {
        self.positions.clear();
        let sent = self.engine.initialize(
            &self.view.nodes,
            &self.view.links,
            Some(self.dimensions),
            Some(self.config),
        );
        match sent {
            Ok(run) => {
                self.begin_run(run);
                Ok(())
            }
            Err(EngineError::Validation(error)) => {
                warn!("graph rejected: {error}");
                self.status = LayoutStatus::Idle;
                Err(EngineError::Validation(error))
            }
            Err(error) => self.track(Err(error)),
        }
    }

    fn begin_run(&mut self, run: RunId) {
        self.run = run;
        self.status = LayoutStatus::Converging { progress: 0.0 };
        self.failure = None;
        self.last_event = Instant::now();
    }

    fn track<T>(&mut self, sent: Result<T, EngineError>) -> Result<T, EngineError> {
        if matches!(sent, Err(EngineError::Disconnected)) {
            self.mark_unavailable();
        }
        sent
    }

    fn mark_unavailable(&mut self) {
        if !matches!(self.status, LayoutStatus::Failed { .. }) {
            warn!("{UNAVAILABLE}");
        }
        self.status = LayoutStatus::Failed {
            reason: UNAVAILABLE.to_owned(),
        };
    }

    fn accept_snapshot(&mut self, nodes: Vec<Node>) -> bool {
        if !nodes.iter().all(Node::has_finite_position) {
            warn!("dropping snapshot with non-finite coordinates");
            return false;
        }
        self.positions = nodes;
        true
    }

    /// Events still queued from an earlier run are dropped; they only count
    /// as a sign of life.
    fn apply(&mut self, event: Event) {
        self.last_event = Instant::now();
        if event.run() != self.run {
            debug!("dropping event from run {} during run {}", event.run(), self.run);
            return;
        }
        match event {
            Event::Positions { nodes, .. } => {
                self.accept_snapshot(nodes);
            }
            Event::Progress {
                progress, nodes, ..
            } => {
                let LayoutStatus::Converging { progress: current } = self.status else {
                    debug!("ignoring progress {progress} outside a run");
                    return;
                };
                if self.accept_snapshot(nodes) {
                    self.status = LayoutStatus::Converging {
                        progress: current.max(progress),
                    };
                }
            }
            Event::Complete { nodes, .. } => {
                if self.accept_snapshot(nodes) && self.status.is_converging() {
                    info!("layout settled");
                    self.status = LayoutStatus::Settled;
                }
            }
            Event::Error { error, .. } => {
                warn!("layout failed: {error}");
                self.status = LayoutStatus::Failed {
                    reason: error.to_string(),
                };
                self.failure = Some(error);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::graph::{Community, Link};
    use crate::placement::PlacementOptions;

    fn dataset() -> GraphData {
        GraphData {
            nodes: vec![
                Node::new("a", "A").with_era("Ancient"),
                Node::new("b", "B").with_era("Ancient"),
                Node::new("c", "C")
                    .with_era("Modern")
                    .with_community(Community::Index(2)),
            ],
            links: vec![Link::new("a", "b"), Link::new("b", "c")],
        }
    }

    fn quick() -> ForceConfigPatch {
        ForceConfigPatch {
            iterations: Some(30),
            ..ForceConfigPatch::default()
        }
    }

    fn controller() -> Controller {
        let options = EngineOptions {
            placement: PlacementOptions::without_jitter(),
            ..EngineOptions::default()
        };
        Controller::new(options, Duration::from_secs(10)).unwrap()
    }

    fn snapshot(data: &GraphData) -> Vec<Node> {
        data.nodes
            .iter()
            .enumerate()
            .map(|(index, node)| {
                let mut node = node.clone();
                node.x = index as f64;
                node.y = index as f64;
                node
            })
            .collect()
    }

    #[test]
    fn load_runs_to_settled() {
        let mut controller = controller();
        controller
            .load(dataset(), Dimensions::new(600.0, 400.0), quick())
            .unwrap();
        let mut seen = Vec::new();
        let nodes = controller
            .wait_until_settled(|progress| seen.push(progress))
            .unwrap();
        assert_eq!(nodes.len(), 3);
        assert!(seen.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(controller.status(), &LayoutStatus::Settled);
    }

    #[test]
    fn intents_before_load_are_rejected() {
        let mut controller = controller();
        assert!(matches!(controller.reheat(), Err(EngineError::NotInitialized)));
        assert!(matches!(
            controller.pin("a", 0.0, 0.0),
            Err(EngineError::NotInitialized)
        ));
        assert!(matches!(
            controller.wait_until_settled(|_| {}),
            Err(EngineError::NotInitialized)
        ));
    }

    #[test]
    fn invalid_graph_keeps_controller_idle() {
        let mut controller = controller();
        let data = GraphData {
            nodes: vec![Node::new("a", "A")],
            links: vec![Link::new("a", "z")],
        };
        let error = controller
            .load(data, Dimensions::default(), quick())
            .unwrap_err();
        assert!(error.to_string().contains("\"z\""));
        assert_eq!(controller.status(), &LayoutStatus::Idle);
    }

    #[test]
    fn progress_never_goes_backwards() {
        let mut controller = controller();
        controller.view = dataset();
        controller.begin_run(1);
        let nodes = snapshot(&controller.view);

        controller.apply(Event::Progress {
            run: 1,
            progress: 0.5,
            nodes: nodes.clone(),
        });
        controller.apply(Event::Progress {
            run: 1,
            progress: 0.2,
            nodes,
        });
        assert_eq!(
            controller.status(),
            &LayoutStatus::Converging { progress: 0.5 }
        );
    }

    #[test]
    fn non_finite_snapshots_are_not_exposed() {
        let mut controller = controller();
        controller.view = dataset();
        controller.begin_run(1);
        let good = snapshot(&controller.view);
        controller.apply(Event::Progress {
            run: 1,
            progress: 0.1,
            nodes: good.clone(),
        });

        let mut bad = good.clone();
        bad[1].x = f64::NAN;
        controller.apply(Event::Progress {
            run: 1,
            progress: 0.2,
            nodes: bad,
        });
        assert_eq!(controller.positions(), &good[..]);
        assert!(controller.positions().iter().all(Node::has_finite_position));
    }

    #[test]
    fn stale_progress_after_settling_is_ignored() {
        let mut controller = controller();
        controller.view = dataset();
        controller.begin_run(1);
        let nodes = snapshot(&controller.view);
        controller.apply(Event::Complete {
            run: 1,
            nodes: nodes.clone(),
        });
        controller.apply(Event::Progress {
            run: 1,
            progress: 0.4,
            nodes,
        });
        assert_eq!(controller.status(), &LayoutStatus::Settled);
    }

    #[test]
    fn silent_engine_is_reported_unavailable() {
        let mut controller = controller();
        controller.view = dataset();
        controller.begin_run(1);
        controller.stall_timeout = Duration::from_millis(1);
        if let Some(earlier) = Instant::now().checked_sub(Duration::from_secs(1)) {
            controller.last_event = earlier;
        }
        controller.poll();
        assert_eq!(
            controller.status(),
            &LayoutStatus::Failed {
                reason: "layout engine unavailable".into(),
            }
        );
    }

    #[test]
    fn divergence_surfaces_as_error() {
        let mut controller = controller();
        controller.dataset = Some(dataset());
        controller.view = dataset();
        controller.begin_run(1);
        controller.apply(Event::Error {
            run: 1,
            error: EngineFailure::Diverged {
                id: "b".into(),
                iteration: 12,
            },
        });
        let error = controller.wait_until_settled(|_| {}).unwrap_err();
        assert!(matches!(
            error,
            EngineError::NonFiniteCoordinates { ref id, iteration: 12 } if id == "b"
        ));
    }

    #[test]
    fn filter_lays_out_a_subgraph() {
        let mut controller = controller();
        controller
            .load(dataset(), Dimensions::default(), quick())
            .unwrap();
        controller
            .filter(NodeFilter::new(CategoryKey::Era, "Ancient"))
            .unwrap();
        assert_eq!(controller.view().nodes.len(), 2);
        assert_eq!(controller.view().links.len(), 1);

        let nodes = controller.wait_until_settled(|_| {}).unwrap();
        let ids = nodes.iter().map(|node| node.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["a", "b"]);

        controller.clear_filter().unwrap();
        assert_eq!(controller.view().nodes.len(), 3);
        assert_eq!(controller.wait_until_settled(|_| {}).unwrap().len(), 3);
    }

    #[test]
    fn pin_holds_after_relaxing() {
        let mut controller = controller();
        controller
            .load(dataset(), Dimensions::default(), quick())
            .unwrap();
        controller.wait_until_settled(|_| {}).unwrap();
        controller.pin("c", 42.0, 24.0).unwrap();
        let pinned = controller
            .positions()
            .iter()
            .find(|node| node.id == "c")
            .cloned()
            .unwrap();
        assert_eq!((pinned.x, pinned.y), (42.0, 24.0));

        controller.reheat().unwrap();
        let nodes = controller.wait_until_settled(|_| {}).unwrap();
        let node = nodes.iter().find(|node| node.id == "c").unwrap();
        assert_eq!((node.x, node.y), (42.0, 24.0));
    }

    #[test]
    fn events_from_an_earlier_run_are_dropped() {
        let mut controller = controller();
        controller.view = dataset();
        controller.begin_run(2);
        let nodes = snapshot(&controller.view);

        controller.apply(Event::Complete {
            run: 1,
            nodes: nodes.clone(),
        });
        controller.apply(Event::Progress {
            run: 1,
            progress: 0.9,
            nodes: nodes.clone(),
        });
        assert_eq!(
            controller.status(),
            &LayoutStatus::Converging { progress: 0.0 }
        );
        assert!(controller.positions().is_empty());

        controller.apply(Event::Progress {
            run: 2,
            progress: 0.3,
            nodes,
        });
        assert_eq!(
            controller.status(),
            &LayoutStatus::Converging { progress: 0.3 }
        );
    }

    fn settled_run_left_in_the_queue() -> Controller {
        let mut controller = controller();
        controller
            .load(
                dataset(),
                Dimensions::default(),
                ForceConfigPatch {
                    iterations: Some(200),
                    ..ForceConfigPatch::default()
                },
            )
            .unwrap();
        // Let the first run finish while nobody drains its events.
        thread::sleep(Duration::from_millis(300));
        controller
    }

    fn assert_nothing_left(controller: &Controller) {
        assert!(
            controller
                .engine
                .recv_timeout(Duration::from_millis(200))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn reheat_waits_for_its_own_run() {
        let mut controller = settled_run_left_in_the_queue();
        controller.reheat().unwrap();
        controller.wait_until_settled(|_| {}).unwrap();
        assert_nothing_left(&controller);
    }

    #[test]
    fn resize_waits_for_its_own_run() {
        let mut controller = settled_run_left_in_the_queue();
        controller.resize(Dimensions::new(100.0, 100.0)).unwrap();
        let nodes = controller.wait_until_settled(|_| {}).unwrap().to_vec();
        assert_eq!(nodes.len(), 3);
        assert_nothing_left(&controller);
        assert_eq!(controller.positions(), &nodes[..]);
    }
}
