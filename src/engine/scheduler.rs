pub const DEFAULT_BATCH_SIZE: usize = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunMode {
    /// Counts toward the iteration cap and reports progress.
    Converge,
    /// Follow-up relaxation after a constraint change on a settled layout.
    Relax,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BatchReport {
    pub mode: RunMode,
    pub ticks: usize,
    pub progress: f64,
    pub finished: bool,
}

/// Slices a run of `max_iterations` ticks into fixed-size batches. The caller
/// drives it one [`step`](Self::step) at a time and is free to do other work
/// between steps; the scheduler only remembers how far the run has come.
#[derive(Clone, Debug)]
pub struct BatchScheduler {
    batch_size: usize,
    max_iterations: usize,
    iterations: usize,
    mode: RunMode,
    active: bool,
}

impl BatchScheduler {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            max_iterations: 0,
            iterations: 0,
            mode: RunMode::Converge,
            active: false,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn start(&mut self, max_iterations: usize, mode: RunMode) {
        self.max_iterations = max_iterations;
        self.iterations = 0;
        self.mode = mode;
        self.active = true;
    }

    pub fn halt(&mut self) {
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn progress(&self) -> f64 {
        if self.max_iterations == 0 {
            1.0
        } else {
            (self.iterations as f64 / self.max_iterations as f64).min(1.0)
        }
    }

    /// Runs one batch through `tick`. An empty graph or a zero cap finishes
    /// on the spot with full progress. A failing tick stops the run and its
    /// error is returned unchanged.
    pub fn step<E>(
        &mut self,
        node_count: usize,
        mut tick: impl FnMut() -> Result<(), E>,
    ) -> Result<BatchReport, E> {
        if node_count == 0 || self.max_iterations == 0 {
            self.iterations = self.max_iterations;
            self.active = false;
            return Ok(BatchReport {
                mode: self.mode,
                ticks: 0,
                progress: 1.0,
                finished: true,
            });
        }

        let batch = self
            .batch_size
            .min(self.max_iterations.saturating_sub(self.iterations));
        for _ in 0..batch {
            if let Err(error) = tick() {
                self.active = false;
                return Err(error);
            }
            self.iterations += 1;
        }

        let finished = self.iterations >= self.max_iterations;
        if finished {
            self.active = false;
        }

        Ok(BatchReport {
            mode: self.mode,
            ticks: batch,
            progress: self.progress(),
            finished,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_to_end(scheduler: &mut BatchScheduler, node_count: usize) -> (usize, usize) {
        let mut batches = 0;
        let mut ticks = 0;
        while scheduler.is_active() {
            let report = scheduler
                .step(node_count, || {
                    ticks += 1;
                    Ok::<_, ()>(())
                })
                .unwrap();
            batches += 1;
            assert!(report.progress <= 1.0);
        }
        (batches, ticks)
    }

    #[test]
    fn batch_count_is_ceil_of_iterations() {
        for iterations in [1, 9, 10, 11, 95, 800] {
            let mut scheduler = BatchScheduler::new(10);
            scheduler.start(iterations, RunMode::Converge);
            let (batches, ticks) = run_to_end(&mut scheduler, 3);
            assert_eq!(batches, iterations.div_ceil(10), "iterations {iterations}");
            assert_eq!(ticks, iterations);
        }
    }

    #[test]
    fn empty_graph_finishes_in_one_step() {
        let mut scheduler = BatchScheduler::new(10);
        scheduler.start(800, RunMode::Converge);
        let report = scheduler.step(0, || Ok::<_, ()>(())).unwrap();
        assert_eq!(report.progress, 1.0);
        assert!(report.finished);
        assert_eq!(report.ticks, 0);
        assert!(!scheduler.is_active());
    }

    #[test]
    fn failing_tick_stops_the_run() {
        let mut scheduler = BatchScheduler::new(10);
        scheduler.start(100, RunMode::Converge);
        let mut calls = 0;
        let result = scheduler.step(2, || {
            calls += 1;
            if calls == 4 { Err("boom") } else { Ok(()) }
        });
        assert_eq!(result, Err("boom"));
        assert_eq!(scheduler.iterations(), 3);
        assert!(!scheduler.is_active());
    }
}
