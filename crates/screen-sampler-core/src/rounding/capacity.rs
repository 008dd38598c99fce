use crate::graph::{PairRole, WindowGraph};
use crate::model::{OperationId, ResourceId, ScreeningModel};
use crate::SamplerError;

/// Residual capacities of one window graph.
#[derive(Debug, Clone)]
pub struct CapacityLedger {
    capacity: Vec<f64>,
    resource_residual: Vec<f64>,
    operation_residual: Vec<f64>,
}

impl CapacityLedger {
    pub fn recompute(window_graph: &WindowGraph, model: &ScreeningModel) -> Self {
        let capacity: Vec<f64> = model
            .resource_ids()
            .map(|r| model.resource_capacity(r).unwrap_or(0) as f64)
            .collect();
        let mut load = vec![0.0_f64; capacity.len()];
        for &(role, pair) in window_graph.operation_pairs.iter().flatten() {
            if let PairRole::OperationResource(_, resource) = role {
                load[resource.0] += window_graph.graph.pair_weight(pair);
            }
        }
        let resource_residual: Vec<f64> = capacity
            .iter()
            .zip(load.iter())
            .map(|(cap, used)| cap - used)
            .collect();
        let operation_residual = model
            .operation_ids()
            .map(|op| {
                model
                    .operation_resources(op)
                    .iter()
                    .map(|r| resource_residual[r.0])
                    .fold(f64::INFINITY, f64::min)
            })
            .collect();
        Self {
            capacity,
            resource_residual,
            operation_residual,
        }
    }

    pub fn resource_residual(&self, resource: ResourceId) -> f64 {
        self.resource_residual
            .get(resource.0)
            .copied()
            .unwrap_or(0.0)
    }

    /// Minimum residual over the operation's resources; infinite when it uses none.
    pub fn operation_residual(&self, operation: OperationId) -> f64 {
        self.operation_residual
            .get(operation.0)
            .copied()
            .unwrap_or(f64::INFINITY)
    }

    pub fn is_saturated(&self, resource: ResourceId, tolerance: f64) -> bool {
        self.resource_residual(resource) <= tolerance
    }

    pub fn saturated_resources(&self, tolerance: f64) -> Vec<ResourceId> {
        self.resource_residual
            .iter()
            .enumerate()
            .filter(|(_, &residual)| residual <= tolerance)
            .map(|(idx, _)| ResourceId(idx))
            .collect()
    }

    /// Fails on the first resource loaded past its capacity by more than
    /// `tolerance`.
    pub fn check_feasible(
        &self,
        window_graph: &WindowGraph,
        tolerance: f64,
    ) -> Result<(), SamplerError> {
        for (idx, &residual) in self.resource_residual.iter().enumerate() {
            if residual < -tolerance {
                return Err(SamplerError::CapacityExceeded {
                    window: window_graph.window,
                    resource: ResourceId(idx),
                    load: self.capacity[idx] - residual,
                    capacity: self.capacity[idx] as u64,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CategoryId, FlightId, GroupKey, TimeWindow};
    use crate::strategy::MarginalStrategy;

    fn model_with_load(weights: [f64; 3]) -> (ScreeningModel, MarginalStrategy) {
        let mut model = ScreeningModel::new();
        let a = model.add_resource("a", 2, 2);
        let b = model.add_resource("b", 3, 1);
        model.add_operation("a", &[a]).unwrap();
        model.add_operation("ab", &[a, b]).unwrap();
        model.add_operation("free", &[]).unwrap();
        model.add_category("c");
        model.add_flight("f");
        let total: f64 = weights.iter().sum();
        model
            .set_passengers(TimeWindow(0), FlightId(0), CategoryId(0), total as u32)
            .unwrap();
        let group = GroupKey::new(FlightId(0), CategoryId(0));
        let mut marginal = MarginalStrategy::new();
        for (op, &w) in weights.iter().enumerate() {
            marginal.insert(TimeWindow(0), group, OperationId(op), w);
        }
        (model, marginal)
    }

    #[test]
    fn operation_residual_is_min_over_resources() {
        let (model, marginal) = model_with_load([1.5, 2.5, 1.0]);
        let wg = WindowGraph::build(&model, TimeWindow(0), &marginal).unwrap();
        let ledger = CapacityLedger::recompute(&wg, &model);
        assert!((ledger.resource_residual(ResourceId(0)) - 0.0).abs() < 1e-12);
        assert!((ledger.resource_residual(ResourceId(1)) - 0.5).abs() < 1e-12);
        assert!(ledger.operation_residual(OperationId(1)).abs() < 1e-12);
        assert!(ledger.operation_residual(OperationId(2)).is_infinite());
        assert_eq!(ledger.saturated_resources(1e-6), vec![ResourceId(0)]);
        ledger.check_feasible(&wg, 1e-4).unwrap();
    }

    #[test]
    fn overload_fails_fast() {
        let (model, marginal) = model_with_load([3.0, 2.0, 0.0]);
        let wg = WindowGraph::build(&model, TimeWindow(0), &marginal).unwrap();
        let ledger = CapacityLedger::recompute(&wg, &model);
        let err = ledger.check_feasible(&wg, 1e-4).unwrap_err();
        assert_eq!(
            err,
            SamplerError::CapacityExceeded {
                window: TimeWindow(0),
                resource: ResourceId(0),
                load: 5.0,
                capacity: 4,
            }
        );
    }
}
