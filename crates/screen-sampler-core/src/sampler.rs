use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::graph::WindowGraph;
use crate::model::{ScreeningModel, TimeWindow};
use crate::rounding::{round_window, CapacityLedger, RoundingStats};
use crate::strategy::{MarginalStrategy, PureStrategy, WindowAssignment};
use crate::{SamplerError, SamplerOptions};

const WINDOW_SEED_MIX: u64 = 0x9E37_79B9_7F4A_7C15;

#[derive(Debug, Clone)]
pub struct SampleReport {
    pub strategy: PureStrategy,
    pub stats: BTreeMap<TimeWindow, RoundingStats>,
}

impl SampleReport {
    pub fn total_iterations(&self) -> usize {
        self.stats.values().map(|s| s.iterations).sum()
    }
}

/// Draws pure strategies whose expectation is a fixed marginal strategy.
#[derive(Debug, Clone)]
pub struct PureStrategySampler<'a> {
    model: &'a ScreeningModel,
    marginal: &'a MarginalStrategy,
    options: SamplerOptions,
}

impl<'a> PureStrategySampler<'a> {
    /// Checks the marginal against the model once: references, group sums and
    /// resource capacities of every window.
    pub fn new(
        model: &'a ScreeningModel,
        marginal: &'a MarginalStrategy,
        options: SamplerOptions,
    ) -> Result<Self, SamplerError> {
        if !(options.tolerance > 0.0 && options.tolerance < 0.5) {
            return Err(SamplerError::InvalidInput(format!(
                "tolerance {} outside (0, 0.5)",
                options.tolerance
            )));
        }
        if !(options.saturation_tolerance >= 0.0) {
            return Err(SamplerError::InvalidInput(format!(
                "saturation tolerance {}",
                options.saturation_tolerance
            )));
        }
        marginal.validate(model, options.tolerance)?;
        for window in model.time_windows() {
            let window_graph = WindowGraph::build(model, window, marginal)?;
            CapacityLedger::recompute(&window_graph, model)
                .check_feasible(&window_graph, options.tolerance)?;
        }
        Ok(Self {
            model,
            marginal,
            options,
        })
    }

    pub fn options(&self) -> &SamplerOptions {
        &self.options
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<PureStrategy, SamplerError> {
        self.sample_with_report(rng).map(|report| report.strategy)
    }

    pub fn sample_with_report<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
    ) -> Result<SampleReport, SamplerError> {
        let mut strategy = PureStrategy::new();
        let mut stats = BTreeMap::new();
        for window in self.model.time_windows() {
            let (assignment, window_stats) = self.round(window, rng)?;
            strategy.insert_window(window, assignment);
            stats.insert(window, window_stats);
        }
        tracing::debug!(
            windows = stats.len(),
            iterations = stats.values().map(|s: &RoundingStats| s.iterations).sum::<usize>(),
            "sampled pure strategy"
        );
        Ok(SampleReport { strategy, stats })
    }

    pub fn sample_window<R: Rng + ?Sized>(
        &self,
        window: TimeWindow,
        rng: &mut R,
    ) -> Result<WindowAssignment<u32>, SamplerError> {
        self.round(window, rng).map(|(assignment, _)| assignment)
    }

    pub fn sample_many<R: Rng + ?Sized>(
        &self,
        count: usize,
        rng: &mut R,
    ) -> Result<Vec<PureStrategy>, SamplerError> {
        (0..count).map(|_| self.sample(rng)).collect()
    }

    /// Samples every window on a rayon pool. Each window draws from its own
    /// generator derived from `seed`, so the result does not depend on the
    /// number of threads.
    pub fn sample_parallel(&self, seed: u64) -> Result<SampleReport, SamplerError> {
        let windows: Vec<TimeWindow> = self.model.time_windows().collect();
        let run = || {
            windows
                .par_iter()
                .map(|&window| {
                    let mut rng = StdRng::seed_from_u64(window_seed(seed, window));
                    self.round(window, &mut rng)
                        .map(|(assignment, stats)| (window, assignment, stats))
                })
                .collect::<Result<Vec<_>, SamplerError>>()
        };
        let rounded = if self.options.threads == 1 {
            run()?
        } else {
            rayon::ThreadPoolBuilder::new()
                .num_threads(self.options.threads)
                .build()
                .map_err(|err| SamplerError::Pool(err.to_string()))?
                .install(run)?
        };

        let mut strategy = PureStrategy::new();
        let mut stats = BTreeMap::new();
        for (window, assignment, window_stats) in rounded {
            strategy.insert_window(window, assignment);
            stats.insert(window, window_stats);
        }
        Ok(SampleReport { strategy, stats })
    }

    /// One sample drawn from `options.seed`.
    pub fn sample_seeded(&self) -> Result<PureStrategy, SamplerError> {
        let mut rng = StdRng::seed_from_u64(self.options.seed);
        self.sample(&mut rng)
    }

    fn round<R: Rng + ?Sized>(
        &self,
        window: TimeWindow,
        rng: &mut R,
    ) -> Result<(WindowAssignment<u32>, RoundingStats), SamplerError> {
        let mut window_graph = WindowGraph::build(self.model, window, self.marginal)?;
        let stats = round_window(&mut window_graph, self.model, &self.options, rng)?;
        Ok((window_graph.extract(self.options.tolerance), stats))
    }
}

fn window_seed(seed: u64, window: TimeWindow) -> u64 {
    seed ^ (window.0 as u64 + 1).wrapping_mul(WINDOW_SEED_MIX)
}

/// Draws one pure strategy for `marginal` with default options.
pub fn sample<R: Rng + ?Sized>(
    model: &ScreeningModel,
    marginal: &MarginalStrategy,
    rng: &mut R,
) -> Result<PureStrategy, SamplerError> {
    PureStrategySampler::new(model, marginal, SamplerOptions::default())?.sample(rng)
}
