use rand::Rng;

use crate::graph::WindowGraph;
use crate::model::ScreeningModel;
use crate::{SamplerError, SamplerOptions};

pub mod adjust;
pub mod capacity;
pub mod cycle;

pub use adjust::{apply_step, StepBounds};
pub use capacity::CapacityLedger;
pub use cycle::{CycleFinder, CycleMove};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RoundingStats {
    pub iterations: usize,
    pub initial_fractional_edges: usize,
    pub combined_moves: usize,
    pub search_expansions: usize,
}

/// Rounds every junction of `window_graph` to an integer, one move at a
/// time. Each step either settles a junction or fills a resource, and neither
/// is ever undone, so the loop ends after at most one step per fractional
/// junction plus one per resource.
#[tracing::instrument(skip_all, fields(window = %window_graph.window))]
pub fn round_window<R: Rng + ?Sized>(
    window_graph: &mut WindowGraph,
    model: &ScreeningModel,
    options: &SamplerOptions,
    rng: &mut R,
) -> Result<RoundingStats, SamplerError> {
    let tolerance = options.tolerance;
    let mut ledger = CapacityLedger::recompute(window_graph, model);
    ledger.check_feasible(window_graph, tolerance)?;

    let mut stats = RoundingStats {
        initial_fractional_edges: window_graph.fractional_edge_count(tolerance),
        ..RoundingStats::default()
    };
    let step_limit =
        window_graph.fractional_junctions(tolerance).len() + model.resource_count() + 1;

    loop {
        let remaining = window_graph.fractional_junctions(tolerance).len();
        if remaining == 0 {
            break;
        }
        let found = if stats.iterations < step_limit {
            CycleFinder::new(window_graph, &ledger, options).find(rng, &mut stats)
        } else {
            None
        };
        let Some(mv) = found else {
            let fractional_edges = window_graph.fractional_edge_count(tolerance);
            tracing::warn!(
                fractional_edges,
                iterations = stats.iterations,
                "no admissible rounding cycle"
            );
            return Err(SamplerError::RoundingStuck {
                window: window_graph.window,
                fractional_edges,
            });
        };

        let bounds = StepBounds::compute(&mv, window_graph, &ledger);
        let step = bounds.sample(rng);
        apply_step(window_graph, &mv, step, tolerance);
        ledger = CapacityLedger::recompute(window_graph, model);
        stats.iterations += 1;
        tracing::trace!(
            iteration = stats.iterations,
            cycle_junctions = mv.junctions.len(),
            alpha = bounds.alpha,
            beta = bounds.beta,
            step,
            remaining,
            "applied rounding step"
        );
    }

    tracing::debug!(
        iterations = stats.iterations,
        initial_fractional_edges = stats.initial_fractional_edges,
        combined_moves = stats.combined_moves,
        "window rounded"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CategoryId, FlightId, GroupKey, OperationId, ResourceId, TimeWindow};
    use crate::strategy::MarginalStrategy;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn integral_window_needs_no_iterations() {
        let mut model = ScreeningModel::new();
        let lane = model.add_resource("lane", 5, 1);
        model.add_operation("lane", &[lane]).unwrap();
        model.add_operation("free", &[]).unwrap();
        model.add_category("c");
        model.add_flight("f");
        model
            .set_passengers(TimeWindow(0), FlightId(0), CategoryId(0), 4)
            .unwrap();
        let group = GroupKey::new(FlightId(0), CategoryId(0));
        let mut marginal = MarginalStrategy::new();
        marginal.insert(TimeWindow(0), group, OperationId(0), 3.0);
        marginal.insert(TimeWindow(0), group, OperationId(1), 1.0);
        let mut wg = WindowGraph::build(&model, TimeWindow(0), &marginal).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        let stats = round_window(&mut wg, &model, &SamplerOptions::default(), &mut rng).unwrap();
        assert_eq!(stats, RoundingStats::default());
    }

    #[test]
    fn rounds_two_groups_sharing_a_tight_lane() {
        let mut model = ScreeningModel::new();
        let lane = model.add_resource("lane", 3, 1);
        model.add_operation("lane", &[lane]).unwrap();
        model.add_operation("free", &[]).unwrap();
        model.add_category("low");
        model.add_category("high");
        model.add_flight("f");
        let t = TimeWindow(0);
        model.set_passengers(t, FlightId(0), CategoryId(0), 3).unwrap();
        model.set_passengers(t, FlightId(0), CategoryId(1), 2).unwrap();
        let low = GroupKey::new(FlightId(0), CategoryId(0));
        let high = GroupKey::new(FlightId(0), CategoryId(1));
        let mut marginal = MarginalStrategy::new();
        marginal.insert(t, low, OperationId(0), 1.5);
        marginal.insert(t, low, OperationId(1), 1.5);
        marginal.insert(t, high, OperationId(0), 1.5);
        marginal.insert(t, high, OperationId(1), 0.5);

        for seed in 0..50 {
            let mut wg = WindowGraph::build(&model, t, &marginal).unwrap();
            let mut rng = StdRng::seed_from_u64(seed);
            let stats =
                round_window(&mut wg, &model, &SamplerOptions::default(), &mut rng).unwrap();
            assert!(stats.iterations <= stats.initial_fractional_edges);
            assert!(wg.fractional_junctions(1e-4).is_empty());
            assert!(wg.load(ResourceId(0)) <= 3.0 + 1e-9);
            let out = wg.extract(1e-4);
            assert_eq!(out[&low].values().sum::<u32>(), 3);
            assert_eq!(out[&high].values().sum::<u32>(), 2);
        }
    }

    #[test]
    fn overloaded_window_fails_before_rounding() {
        let mut model = ScreeningModel::new();
        let lane = model.add_resource("lane", 1, 1);
        model.add_operation("lane", &[lane]).unwrap();
        model.add_category("c");
        model.add_flight("f");
        model
            .set_passengers(TimeWindow(0), FlightId(0), CategoryId(0), 2)
            .unwrap();
        let group = GroupKey::new(FlightId(0), CategoryId(0));
        let mut marginal = MarginalStrategy::new();
        marginal.insert(TimeWindow(0), group, OperationId(0), 2.0);
        let mut wg = WindowGraph::build(&model, TimeWindow(0), &marginal).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        let err = round_window(&mut wg, &model, &SamplerOptions::default(), &mut rng).unwrap_err();
        assert!(matches!(err, SamplerError::CapacityExceeded { .. }));
    }
}
