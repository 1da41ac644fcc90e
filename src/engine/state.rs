use std::collections::HashMap;

use log::{debug, error, info, warn};

use crate::graph::{Dimensions, GraphError, Link, Node, degrees, resolve};
use crate::physics::{Simulation, radius_for_degree};
use crate::placement::{PlacementOptions, place_in_spread};

use super::protocol::{
    Command, EngineFailure, Event, ForceConfig, ForceConfigPatch, INTERACTIVE_ALPHA_DECAY,
    PinUpdate, RunId,
};
use super::scheduler::{BatchScheduler, DEFAULT_BATCH_SIZE, RunMode};

const REHEAT_ALPHA: f64 = 1.0;
const CONSTRAINT_ALPHA: f64 = 0.3;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EngineOptions {
    pub batch_size: usize,
    pub placement: PlacementOptions,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            placement: PlacementOptions::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Running,
    Relaxing,
    Settled,
    Stopped,
    Failed,
}

/// Everything one engine instance knows about its graph. Owned by the worker
/// thread; several engines never share one.
pub struct EngineState {
    dimensions: Dimensions,
    config: ForceConfig,
    placement: PlacementOptions,
    simulation: Option<Simulation>,
    index_by_id: HashMap<String, usize>,
    scheduler: BatchScheduler,
    phase: Phase,
    run: RunId,
}

impl EngineState {
    pub fn new(options: EngineOptions) -> Self {
        Self {
            dimensions: Dimensions::default(),
            config: ForceConfig::default(),
            placement: options.placement,
            simulation: None,
            index_by_id: HashMap::new(),
            scheduler: BatchScheduler::new(options.batch_size),
            phase: Phase::Idle,
            run: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn config(&self) -> &ForceConfig {
        &self.config
    }

    pub fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// Generation stamped on outgoing events.
    pub fn run(&self) -> RunId {
        self.run
    }

    pub fn iterations(&self) -> usize {
        self.scheduler.iterations()
    }

    pub fn nodes(&self) -> &[Node] {
        self.simulation
            .as_ref()
            .map_or(&[][..], |simulation| simulation.nodes())
    }

    /// Whether the worker should run another batch before blocking.
    pub fn has_pending_batches(&self) -> bool {
        matches!(self.phase, Phase::Running | Phase::Relaxing) && self.scheduler.is_active()
    }

    /// Applies one command and returns the events it produces directly.
    /// Batched progress is produced separately by [`run_batch`](Self::run_batch).
    pub fn handle(&mut self, command: Command) -> Vec<Event> {
        debug!("engine received {}", command.kind());
        match command {
            Command::Initialize {
                run,
                nodes,
                links,
                dimensions,
                config,
            } => {
                self.run = run;
                self.initialize(nodes, &links, dimensions, config)
            }
            Command::Tick => self.tick_once(),
            Command::Reheat { run } => {
                self.reheat(run);
                Vec::new()
            }
            Command::Update { run, nodes } => {
                self.apply_pins(run, &nodes);
                Vec::new()
            }
            Command::Stop => {
                if self.has_pending_batches() {
                    info!(
                        "stopping layout after {} iterations",
                        self.scheduler.iterations()
                    );
                    self.scheduler.halt();
                    self.phase = Phase::Stopped;
                }
                Vec::new()
            }
        }
    }

    fn initialize(
        &mut self,
        mut nodes: Vec<Node>,
        links: &[Link],
        dimensions: Option<Dimensions>,
        config: Option<ForceConfigPatch>,
    ) -> Vec<Event> {
        if let Some(dimensions) = dimensions {
            self.dimensions = dimensions;
        }
        if let Some(patch) = config {
            self.config.apply(&patch);
        }

        let resolved = match resolve(&nodes, links) {
            Ok(resolved) => resolved,
            Err(error) => return self.reject(error),
        };

        let node_degrees = degrees(nodes.len(), &resolved.edges);
        for (node, degree) in nodes.iter_mut().zip(node_degrees) {
            node.degree = degree;
            node.radius = radius_for_degree(degree);
            // Only pins set through `update` survive into the simulation.
            node.fx = None;
            node.fy = None;
        }
        place_in_spread(&mut nodes, self.dimensions, self.placement);

        let strengths = links.iter().map(|link| link.strength).collect::<Vec<_>>();
        info!(
            "initializing layout: {} nodes, {} links, {} iterations",
            nodes.len(),
            links.len(),
            self.config.iterations
        );

        self.simulation = Some(Simulation::new(
            nodes,
            &resolved.edges,
            &strengths,
            self.dimensions,
            self.config.force_params(),
            self.config.cooling(),
        ));
        self.index_by_id = resolved.index_by_id;
        self.scheduler.start(self.config.iterations, RunMode::Converge);
        self.phase = Phase::Running;
        Vec::new()
    }

    fn reject(&mut self, error: GraphError) -> Vec<Event> {
        warn!("rejecting initialize: {error}");
        self.simulation = None;
        self.index_by_id.clear();
        self.scheduler.halt();
        self.phase = Phase::Idle;
        vec![Event::Error {
            run: self.run,
            error: EngineFailure::Validation {
                message: error.to_string(),
            },
        }]
    }

    fn tick_once(&mut self) -> Vec<Event> {
        let Some(simulation) = self.simulation.as_mut() else {
            warn!("tick ignored: no graph initialized");
            return Vec::new();
        };

        let checkpoint = simulation.nodes().to_vec();
        match simulation.tick() {
            Ok(()) => vec![Event::Positions {
                run: self.run,
                nodes: simulation.nodes().to_vec(),
            }],
            Err(diverged) => {
                let iteration = self.scheduler.iterations();
                self.fail(checkpoint, diverged.id, iteration)
            }
        }
    }

    fn reheat(&mut self, run: RunId) {
        let Some(simulation) = self.simulation.as_mut() else {
            warn!("reheat ignored: no graph initialized");
            return;
        };
        self.run = run;
        simulation.set_alpha(REHEAT_ALPHA);
        self.scheduler.start(self.config.iterations, RunMode::Converge);
        self.phase = Phase::Running;
        debug!("reheated, alpha decay {}", simulation.alpha_decay());
    }

    fn apply_pins(&mut self, run: RunId, pins: &[PinUpdate]) {
        let Some(simulation) = self.simulation.as_mut() else {
            warn!("update ignored: no graph initialized");
            return;
        };
        self.run = run;

        for pin in pins {
            if pin.is_noop() {
                continue;
            }
            let Some(&index) = self.index_by_id.get(&pin.id) else {
                debug!("update skipped unknown node {:?}", pin.id);
                continue;
            };
            let Some(node) = simulation.node_mut(index) else {
                continue;
            };
            if pin.release {
                node.fx = None;
                node.fy = None;
            }
            if let Some(fx) = pin.fx {
                node.fx = Some(fx);
            }
            if let Some(fy) = pin.fy {
                node.fy = Some(fy);
            }
        }

        simulation.set_alpha(CONSTRAINT_ALPHA);
        match self.phase {
            Phase::Settled | Phase::Stopped => {
                self.scheduler.start(self.config.iterations, RunMode::Relax);
                self.phase = Phase::Relaxing;
            }
            Phase::Running | Phase::Relaxing | Phase::Idle | Phase::Failed => {}
        }
    }

    /// Runs the next batch and returns its events. Does nothing when no run
    /// is pending.
    pub fn run_batch(&mut self) -> Vec<Event> {
        if !self.has_pending_batches() {
            return Vec::new();
        }
        let Some(simulation) = self.simulation.as_mut() else {
            self.phase = Phase::Idle;
            return Vec::new();
        };

        let checkpoint = simulation.nodes().to_vec();
        let node_count = simulation.node_count();
        let mode = self.scheduler.mode();
        let outcome = match mode {
            RunMode::Converge => self.scheduler.step(node_count, || simulation.tick()),
            RunMode::Relax => {
                let mut settled = false;
                let report = self.scheduler.step(node_count, || {
                    if settled {
                        return Ok(());
                    }
                    simulation.tick()?;
                    settled = simulation.is_settled();
                    Ok(())
                });
                if settled {
                    self.scheduler.halt();
                }
                report
            }
        };

        let report = match outcome {
            Ok(report) => report,
            Err(diverged) => {
                let iteration = self.scheduler.iterations() + 1;
                return self.fail(checkpoint, diverged.id, iteration);
            }
        };

        let nodes = simulation.nodes().to_vec();
        match mode {
            RunMode::Converge => {
                let mut events = vec![Event::Progress {
                    run: self.run,
                    progress: report.progress,
                    nodes: nodes.clone(),
                }];
                if report.finished {
                    simulation.set_alpha_decay(INTERACTIVE_ALPHA_DECAY);
                    self.phase = Phase::Settled;
                    info!(
                        "layout complete after {} iterations",
                        self.scheduler.iterations()
                    );
                    events.push(Event::Complete {
                        run: self.run,
                        nodes,
                    });
                }
                events
            }
            RunMode::Relax => {
                if !self.scheduler.is_active() {
                    self.phase = Phase::Settled;
                    debug!("relaxation settled");
                }
                vec![Event::Positions {
                    run: self.run,
                    nodes,
                }]
            }
        }
    }

    fn fail(&mut self, checkpoint: Vec<Node>, id: String, iteration: usize) -> Vec<Event> {
        let failure = EngineFailure::Diverged { id, iteration };
        error!("layout halted: {failure}");
        let progress = self.scheduler.progress();
        if let Some(simulation) = self.simulation.as_mut() {
            simulation.restore(checkpoint.clone());
        }
        self.scheduler.halt();
        self.phase = Phase::Failed;
        vec![
            Event::Progress {
                run: self.run,
                progress,
                nodes: checkpoint,
            },
            Event::Error {
                run: self.run,
                error: failure,
            },
        ]
    }
}
