//! Layout engine running on its own thread, driven by [`Command`]s and
//! reporting through [`Event`]s.

mod protocol;
mod scheduler;
mod state;

use std::cell::Cell;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, info};
use thiserror::Error;

use crate::graph::{Dimensions, GraphError, Link, Node, resolve};

pub use protocol::{
    Command, EngineFailure, Event, ForceConfig, ForceConfigPatch, INTERACTIVE_ALPHA_DECAY,
    PinUpdate, RunId,
};
pub use scheduler::{BatchReport, BatchScheduler, DEFAULT_BATCH_SIZE, RunMode};
pub use state::{EngineOptions, EngineState, Phase};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] GraphError),
    #[error("engine rejected graph: {message}")]
    Rejected { message: String },
    #[error("node {id:?} reached non-finite coordinates at iteration {iteration}")]
    NonFiniteCoordinates { id: String, iteration: usize },
    #[error("no graph loaded")]
    NotInitialized,
    #[error("layout engine unavailable")]
    Disconnected,
    #[error("failed to start layout worker")]
    Spawn(#[source] std::io::Error),
}

impl From<EngineFailure> for EngineError {
    fn from(failure: EngineFailure) -> Self {
        match failure {
            EngineFailure::Validation { message } => Self::Rejected { message },
            EngineFailure::Diverged { id, iteration } => Self::NonFiniteCoordinates { id, iteration },
        }
    }
}

/// Handle to one background layout worker. Dropping it closes the command
/// channel and the worker exits after its current batch.
///
/// `initialize`, `reheat` and `update` each open a new run and return its id;
/// events still queued from earlier runs carry older ids.
pub struct LayoutEngine {
    commands: Sender<Command>,
    events: Receiver<Event>,
    last_run: Cell<RunId>,
    _worker: JoinHandle<()>,
}

impl LayoutEngine {
    pub fn spawn() -> Result<Self, EngineError> {
        Self::spawn_with(EngineOptions::default())
    }

    pub fn spawn_with(options: EngineOptions) -> Result<Self, EngineError> {
        let (command_tx, command_rx) = mpsc::channel();
        let (event_tx, event_rx) = mpsc::channel();

        let worker = thread::Builder::new()
            .name("layout-engine".to_owned())
            .spawn(move || run_worker(EngineState::new(options), command_rx, event_tx))
            .map_err(EngineError::Spawn)?;

        Ok(Self {
            commands: command_tx,
            events: event_rx,
            last_run: Cell::new(0),
            _worker: worker,
        })
    }

    /// Validates the graph on the calling thread, then hands a copy to the
    /// worker. Nothing is sent when validation fails.
    pub fn initialize(
        &self,
        nodes: &[Node],
        links: &[Link],
        dimensions: Option<Dimensions>,
        config: Option<ForceConfigPatch>,
    ) -> Result<RunId, EngineError> {
        resolve(nodes, links)?;
        let run = self.next_run();
        self.send(Command::Initialize {
            run,
            nodes: nodes.to_vec(),
            links: links.to_vec(),
            dimensions,
            config,
        })?;
        Ok(run)
    }

    pub fn tick(&self) -> Result<(), EngineError> {
        self.send(Command::Tick)
    }

    pub fn reheat(&self) -> Result<RunId, EngineError> {
        let run = self.next_run();
        self.send(Command::Reheat { run })?;
        Ok(run)
    }

    pub fn update(&self, pins: Vec<PinUpdate>) -> Result<RunId, EngineError> {
        let run = self.next_run();
        self.send(Command::Update { run, nodes: pins })?;
        Ok(run)
    }

    /// Id of the most recent run opened through this handle.
    pub fn last_run(&self) -> RunId {
        self.last_run.get()
    }

    pub fn stop(&self) -> Result<(), EngineError> {
        self.send(Command::Stop)
    }

    pub fn send(&self, command: Command) -> Result<(), EngineError> {
        self.commands
            .send(command)
            .map_err(|_| EngineError::Disconnected)
    }

    /// Next event if one is already waiting.
    pub fn try_recv(&self) -> Result<Option<Event>, EngineError> {
        match self.events.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(EngineError::Disconnected),
        }
    }

    /// Waits up to `timeout` for the next event; `None` on timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<Event>, EngineError> {
        match self.events.recv_timeout(timeout) {
            Ok(event) => Ok(Some(event)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(EngineError::Disconnected),
        }
    }

    fn next_run(&self) -> RunId {
        let run = self.last_run.get() + 1;
        self.last_run.set(run);
        run
    }
}

fn dispatch(state: &mut EngineState, command: Command, events: &Sender<Event>) -> bool {
    state
        .handle(command)
        .into_iter()
        .all(|event| events.send(event).is_ok())
}

/// Worker loop. Blocks for commands while idle; while a run is pending it
/// drains queued commands between batches so they never land mid-batch.
fn run_worker(mut state: EngineState, commands: Receiver<Command>, events: Sender<Event>) {
    debug!("layout worker started");
    loop {
        if state.has_pending_batches() {
            loop {
                match commands.try_recv() {
                    Ok(command) => {
                        if !dispatch(&mut state, command, &events) {
                            return;
                        }
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        info!("layout controller went away; worker exiting");
                        return;
                    }
                }
            }
        } else {
            match commands.recv() {
                Ok(command) => {
                    if !dispatch(&mut state, command, &events) {
                        return;
                    }
                }
                Err(_) => {
                    debug!("layout worker shutting down");
                    return;
                }
            }
            continue;
        }

        for event in state.run_batch() {
            if events.send(event).is_err() {
                info!("layout event receiver dropped; worker exiting");
                return;
            }
        }
        thread::yield_now();
    }
}
