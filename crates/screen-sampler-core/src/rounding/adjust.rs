use rand::Rng;

use crate::graph::WindowGraph;
use crate::model::ResourceId;
use crate::numerics::{slack_down, slack_up, snap};
use crate::rounding::capacity::CapacityLedger;
use crate::rounding::cycle::{CycleMove, MOVE_TOLERANCE};

/// Largest steps along a cycle move: `alpha` in its own direction, `beta`
/// against it. Junction weights stay between their current floor and ceiling
/// and resource loads stay within capacity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepBounds {
    pub alpha: f64,
    pub beta: f64,
}

impl StepBounds {
    pub fn compute(mv: &CycleMove, window_graph: &WindowGraph, ledger: &CapacityLedger) -> Self {
        let mut alpha = f64::INFINITY;
        let mut beta = f64::INFINITY;
        for &(j, delta) in &mv.junctions {
            let weight = window_graph.junction_weight(j);
            let scale = delta.abs();
            let (up, down) = (slack_up(weight) / scale, slack_down(weight) / scale);
            if delta > 0.0 {
                alpha = alpha.min(up);
                beta = beta.min(down);
            } else {
                alpha = alpha.min(down);
                beta = beta.min(up);
            }
        }
        for (r, &delta) in mv.resources.iter().enumerate() {
            if delta.abs() <= MOVE_TOLERANCE {
                continue;
            }
            let residual = ledger.resource_residual(ResourceId(r)).max(0.0);
            let step = residual / delta.abs();
            if delta > 0.0 {
                alpha = alpha.min(step);
            } else {
                beta = beta.min(step);
            }
        }
        Self { alpha, beta }
    }

    /// Probability of stepping `alpha` along the move. Chosen so every
    /// junction weight keeps its expectation.
    pub fn forward_probability(&self) -> f64 {
        let total = self.alpha + self.beta;
        if total > 0.0 {
            (self.beta / total).clamp(0.0, 1.0)
        } else {
            0.5
        }
    }

    /// Signed step: `+alpha` with probability `beta / (alpha + beta)`,
    /// otherwise `-beta`.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        if rng.gen::<f64>() < self.forward_probability() {
            self.alpha
        } else {
            -self.beta
        }
    }
}

/// Shifts every junction of the move by `step` times its direction, snaps
/// weights that land on an integer and re-derives the bundle edges.
pub fn apply_step(window_graph: &mut WindowGraph, mv: &CycleMove, step: f64, tolerance: f64) {
    for &(j, delta) in &mv.junctions {
        let weight = window_graph.junction_weight(j) + step * delta;
        window_graph.set_junction_weight(j, snap(weight, tolerance).max(0.0));
    }
    window_graph.refresh_aggregates();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::WindowGraph;
    use crate::model::{CategoryId, FlightId, GroupKey, OperationId, ScreeningModel, TimeWindow};
    use crate::strategy::MarginalStrategy;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn two_lanes(capacity: u32, x0: f64, x1: f64) -> (ScreeningModel, WindowGraph) {
        let mut model = ScreeningModel::new();
        let a = model.add_resource("a", capacity, 1);
        let b = model.add_resource("b", 10, 1);
        model.add_operation("a", &[a]).unwrap();
        model.add_operation("b", &[b]).unwrap();
        model.add_category("c");
        model.add_flight("f");
        model
            .set_passengers(TimeWindow(0), FlightId(0), CategoryId(0), (x0 + x1) as u32)
            .unwrap();
        let group = GroupKey::new(FlightId(0), CategoryId(0));
        let mut marginal = MarginalStrategy::new();
        marginal.insert(TimeWindow(0), group, OperationId(0), x0);
        marginal.insert(TimeWindow(0), group, OperationId(1), x1);
        let wg = WindowGraph::build(&model, TimeWindow(0), &marginal).unwrap();
        (model, wg)
    }

    fn shift_a_to_b() -> CycleMove {
        CycleMove {
            junctions: vec![(0, 1.0), (1, -1.0)],
            operations: vec![1.0, -1.0],
            resources: vec![1.0, -1.0],
        }
    }

    #[test]
    fn bounds_use_integer_slack_of_junctions() {
        let (model, wg) = two_lanes(10, 1.25, 0.75);
        let ledger = CapacityLedger::recompute(&wg, &model);
        let bounds = StepBounds::compute(&shift_a_to_b(), &wg, &ledger);
        assert!((bounds.alpha - 0.75).abs() < 1e-12);
        assert!((bounds.beta - 0.25).abs() < 1e-12);
        assert!((bounds.forward_probability() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn bounds_respect_resource_residual() {
        // A second group leaves lane a with 0.25 to spare.
        let mut model = ScreeningModel::new();
        let a = model.add_resource("a", 2, 1);
        let b = model.add_resource("b", 10, 1);
        for (name, lane) in [("a0", a), ("b0", b), ("a1", a), ("b1", b)] {
            model.add_operation(name, &[lane]).unwrap();
        }
        model.add_category("c");
        model.add_flight("f0");
        model.add_flight("f1");
        let t = TimeWindow(0);
        model.set_passengers(t, FlightId(0), CategoryId(0), 2).unwrap();
        model.set_passengers(t, FlightId(1), CategoryId(0), 1).unwrap();
        let first = GroupKey::new(FlightId(0), CategoryId(0));
        let second = GroupKey::new(FlightId(1), CategoryId(0));
        let mut marginal = MarginalStrategy::new();
        marginal.insert(t, first, OperationId(0), 1.5);
        marginal.insert(t, first, OperationId(1), 0.5);
        marginal.insert(t, second, OperationId(2), 0.25);
        marginal.insert(t, second, OperationId(3), 0.75);
        let wg = WindowGraph::build(&model, t, &marginal).unwrap();
        let ledger = CapacityLedger::recompute(&wg, &model);
        let mv = CycleMove {
            junctions: vec![(0, 1.0), (1, -1.0)],
            operations: vec![1.0, -1.0, 0.0, 0.0],
            resources: vec![1.0, -1.0],
        };
        let bounds = StepBounds::compute(&mv, &wg, &ledger);
        assert!((bounds.alpha - 0.25).abs() < 1e-12);
        assert!((bounds.beta - 0.5).abs() < 1e-12);
        assert!((bounds.forward_probability() - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn apply_keeps_group_total_and_settles_one_junction() {
        let (model, mut wg) = two_lanes(10, 1.25, 0.75);
        let ledger = CapacityLedger::recompute(&wg, &model);
        let mv = shift_a_to_b();
        let bounds = StepBounds::compute(&mv, &wg, &ledger);
        let mut rng = StdRng::seed_from_u64(9);
        let step = bounds.sample(&mut rng);
        apply_step(&mut wg, &mv, step, 1e-4);
        let x0 = wg.junction_weight(0);
        let x1 = wg.junction_weight(1);
        assert!((x0 + x1 - 2.0).abs() < 1e-12);
        assert!(x0 == 1.0 || x0 == 2.0, "x0 = {x0}");
        assert!((wg.load(ResourceId(0)) - x0).abs() < 1e-12);
        assert!(wg.graph.mirror_violations().is_empty());
    }

    #[test]
    fn bounds_scale_with_fractional_deltas() {
        let (model, wg) = two_lanes(10, 1.25, 0.75);
        let ledger = CapacityLedger::recompute(&wg, &model);
        let mv = CycleMove::from_junctions(&wg, vec![(0, 0.5), (1, -0.5)]);
        assert_eq!(mv.resources, vec![0.5, -0.5]);
        let bounds = StepBounds::compute(&mv, &wg, &ledger);
        assert!((bounds.alpha - 1.5).abs() < 1e-12);
        assert!((bounds.beta - 0.5).abs() < 1e-12);

        let mut wg = wg;
        apply_step(&mut wg, &mv, bounds.alpha, 1e-4);
        assert_eq!(wg.junction_weight(0), 2.0);
        assert_eq!(wg.junction_weight(1), 0.0);
    }

    #[test]
    fn direction_frequency_matches_bounds() {
        let bounds = StepBounds {
            alpha: 0.25,
            beta: 0.75,
        };
        let mut rng = StdRng::seed_from_u64(11);
        let n = 20_000;
        let forward = (0..n).filter(|_| bounds.sample(&mut rng) > 0.0).count();
        let freq = forward as f64 / n as f64;
        assert!((freq - 0.75).abs() < 0.02, "freq = {freq}");
    }
}
