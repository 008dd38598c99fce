use rand::seq::SliceRandom;
use rand::Rng;

use crate::model::{OperationId, ScreeningModel};
use crate::strategy::PureStrategy;
use crate::SamplerError;

/// Random feasible pure strategies: every passenger above the lower bounds
/// goes to an operation drawn uniformly among those whose resources still
/// have room.
#[derive(Debug, Clone)]
pub struct RandomStrategyGenerator<'a> {
    model: &'a ScreeningModel,
    lower_bounds: PureStrategy,
}

impl<'a> RandomStrategyGenerator<'a> {
    pub fn new(model: &'a ScreeningModel) -> Self {
        Self {
            model,
            lower_bounds: PureStrategy::new(),
        }
    }

    /// Starts every strategy from `lower_bounds`, which must fit the group
    /// totals and the resource capacities of `model`.
    pub fn with_lower_bounds(
        model: &'a ScreeningModel,
        lower_bounds: PureStrategy,
    ) -> Result<Self, SamplerError> {
        for ((window, group), missing) in lower_bounds.unassigned_passengers(model) {
            if missing < 0 {
                return Err(SamplerError::InvalidInput(format!(
                    "lower bounds place {} extra passengers of group {group} in window {window}",
                    -missing
                )));
            }
        }
        for window in lower_bounds.windows() {
            if !model.has_window(window) {
                return Err(SamplerError::UnknownReference {
                    window,
                    kind: "window",
                    id: window.0 as usize,
                });
            }
            let usage = lower_bounds.resource_usage(model, window);
            for (resource, &load) in model.resource_ids().zip(usage.iter()) {
                let capacity = model.resource_capacity(resource).unwrap_or(0);
                if load > capacity {
                    return Err(SamplerError::CapacityExceeded {
                        window,
                        resource,
                        load: load as f64,
                        capacity,
                    });
                }
            }
        }
        Ok(Self {
            model,
            lower_bounds,
        })
    }

    /// Draws `count` strategies and keeps the distinct ones.
    pub fn generate<R: Rng + ?Sized>(
        &self,
        count: usize,
        rng: &mut R,
    ) -> Result<Vec<PureStrategy>, SamplerError> {
        let mut strategies: Vec<PureStrategy> = Vec::with_capacity(count);
        for _ in 0..count {
            let candidate = self.generate_one(rng)?;
            if strategies.contains(&candidate) {
                tracing::debug!("dropping duplicate pure strategy");
                continue;
            }
            strategies.push(candidate);
        }
        tracing::debug!(
            requested = count,
            distinct = strategies.len(),
            "generated pure strategies"
        );
        Ok(strategies)
    }

    fn generate_one<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<PureStrategy, SamplerError> {
        let model = self.model;
        let mut strategy = self.lower_bounds.clone();
        for window in model.time_windows() {
            let mut spare: Vec<u64> = model
                .resource_ids()
                .zip(self.lower_bounds.resource_usage(model, window))
                .map(|(r, used)| model.resource_capacity(r).unwrap_or(0).saturating_sub(used))
                .collect();
            for group in model.groups(window) {
                let passengers = model.passengers(window, group).unwrap_or(0);
                let fixed = self.lower_bounds.group_total(window, group) as u32;
                for _ in fixed..passengers {
                    let open: Vec<OperationId> = model
                        .operation_ids()
                        .filter(|&op| model.operation_resources(op).iter().all(|r| spare[r.0] > 0))
                        .collect();
                    let &operation = open
                        .choose(rng)
                        .ok_or(SamplerError::NoFeasibleOperation { window, group })?;
                    for resource in model.operation_resources(operation) {
                        spare[resource.0] -= 1;
                    }
                    let assigned = strategy.get(window, group, operation).unwrap_or(0);
                    strategy.insert(window, group, operation, assigned + 1);
                }
            }
        }
        Ok(strategy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CategoryId, FlightId, GroupKey, TimeWindow};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn model(capacity: u32) -> ScreeningModel {
        let mut model = ScreeningModel::new();
        let lane = model.add_resource("lane", capacity, 1);
        let ait = model.add_resource("ait", 1, 1);
        model.add_operation("lane", &[lane]).unwrap();
        model.add_operation("lane+ait", &[lane, ait]).unwrap();
        model.add_category("c");
        model.add_flight("f");
        model
            .set_passengers(TimeWindow(0), FlightId(0), CategoryId(0), 3)
            .unwrap();
        model
    }

    #[test]
    fn generated_strategies_are_feasible_and_distinct() {
        let model = model(3);
        let generator = RandomStrategyGenerator::new(&model);
        let mut rng = StdRng::seed_from_u64(4);
        let strategies = generator.generate(20, &mut rng).unwrap();
        assert!(!strategies.is_empty());
        assert!(strategies.len() <= 2);
        for (i, s) in strategies.iter().enumerate() {
            s.validate(&model).unwrap();
            assert!(strategies[i + 1..].iter().all(|other| other != s));
        }
    }

    #[test]
    fn lower_bounds_are_kept() {
        let model = model(3);
        let group = GroupKey::new(FlightId(0), CategoryId(0));
        let mut lower = PureStrategy::new();
        lower.insert(TimeWindow(0), group, OperationId(1), 1);
        let generator = RandomStrategyGenerator::with_lower_bounds(&model, lower).unwrap();
        let mut rng = StdRng::seed_from_u64(8);
        for s in generator.generate(5, &mut rng).unwrap() {
            assert_eq!(s.get(TimeWindow(0), group, OperationId(1)), Some(1));
            assert_eq!(s.get(TimeWindow(0), group, OperationId(0)), Some(2));
        }
    }

    #[test]
    fn reports_passengers_without_capacity() {
        let model = model(2);
        let generator = RandomStrategyGenerator::new(&model);
        let mut rng = StdRng::seed_from_u64(0);
        let err = generator.generate(1, &mut rng).unwrap_err();
        assert!(matches!(err, SamplerError::NoFeasibleOperation { .. }));
    }

    #[test]
    fn rejects_oversized_lower_bounds() {
        let model = model(3);
        let group = GroupKey::new(FlightId(0), CategoryId(0));
        let mut lower = PureStrategy::new();
        lower.insert(TimeWindow(0), group, OperationId(1), 2);
        let err = RandomStrategyGenerator::with_lower_bounds(&model, lower).unwrap_err();
        assert!(matches!(err, SamplerError::CapacityExceeded { .. }));
    }
}
