use std::collections::BTreeMap;

use crate::model::{GroupKey, OperationId, ScreeningModel, TimeWindow};
use crate::SamplerError;

const MIXTURE_EPS: f64 = 1e-9;

/// Per-window view of an assignment: group → operation → value.
pub type WindowAssignment<T> = BTreeMap<GroupKey, BTreeMap<OperationId, T>>;

/// Passengers of every (window, flight, category) group spread over operations.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment<T> {
    windows: BTreeMap<TimeWindow, WindowAssignment<T>>,
}

/// Expected passenger counts; a mixture over pure strategies.
pub type MarginalStrategy = Assignment<f64>;

/// Integral passenger counts that can be implemented directly.
pub type PureStrategy = Assignment<u32>;

impl<T> Default for Assignment<T> {
    fn default() -> Self {
        Self {
            windows: BTreeMap::new(),
        }
    }
}

impl<T: Copy> Assignment<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        window: TimeWindow,
        group: GroupKey,
        operation: OperationId,
        value: T,
    ) -> Option<T> {
        self.windows
            .entry(window)
            .or_default()
            .entry(group)
            .or_default()
            .insert(operation, value)
    }

    pub fn insert_window(&mut self, window: TimeWindow, assignment: WindowAssignment<T>) {
        self.windows.insert(window, assignment);
    }

    pub fn get(&self, window: TimeWindow, group: GroupKey, operation: OperationId) -> Option<T> {
        self.group(window, group)
            .and_then(|ops| ops.get(&operation).copied())
    }

    pub fn group(&self, window: TimeWindow, group: GroupKey) -> Option<&BTreeMap<OperationId, T>> {
        self.windows.get(&window).and_then(|groups| groups.get(&group))
    }

    pub fn window(&self, window: TimeWindow) -> Option<&WindowAssignment<T>> {
        self.windows.get(&window)
    }

    pub fn windows(&self) -> impl Iterator<Item = TimeWindow> + '_ {
        self.windows.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TimeWindow, GroupKey, OperationId, T)> + '_ {
        self.windows.iter().flat_map(|(&window, groups)| {
            groups.iter().flat_map(move |(&group, ops)| {
                ops.iter()
                    .map(move |(&operation, &value)| (window, group, operation, value))
            })
        })
    }

    pub fn map<U: Copy>(&self, mut f: impl FnMut(T) -> U) -> Assignment<U> {
        let mut out = Assignment::new();
        for (window, group, operation, value) in self.iter() {
            out.insert(window, group, operation, f(value));
        }
        out
    }
}

impl<T: Copy + Into<f64>> Assignment<T> {
    /// Sum over operations of the group's values; zero for an absent group.
    pub fn group_total(&self, window: TimeWindow, group: GroupKey) -> f64 {
        self.group(window, group)
            .map(|ops| ops.values().map(|&v| v.into()).sum())
            .unwrap_or(0.0)
    }
}

fn check_references<T>(
    model: &ScreeningModel,
    window: TimeWindow,
    group: GroupKey,
    ops: &BTreeMap<OperationId, T>,
) -> Result<(), SamplerError> {
    if model.passengers(window, group).is_none() {
        let (kind, id) = if model.category(group.category).is_none() {
            ("category", group.category.0)
        } else {
            ("flight", group.flight.0)
        };
        return Err(SamplerError::UnknownReference { window, kind, id });
    }
    if let Some(op) = ops.keys().find(|op| model.operation(**op).is_none()) {
        return Err(SamplerError::UnknownReference {
            window,
            kind: "operation",
            id: op.0,
        });
    }
    Ok(())
}

impl MarginalStrategy {
    /// Rejects a marginal that references ids outside `model`, carries
    /// negative or non-finite weights, or whose group weights do not add up to
    /// the group's passenger count.
    pub fn validate(&self, model: &ScreeningModel, tolerance: f64) -> Result<(), SamplerError> {
        for (&window, groups) in &self.windows {
            if !model.has_window(window) {
                return Err(SamplerError::UnknownReference {
                    window,
                    kind: "window",
                    id: window.0 as usize,
                });
            }
            for (&group, ops) in groups {
                check_references(model, window, group, ops)?;
                for (&op, &weight) in ops {
                    if !weight.is_finite() || weight < -tolerance {
                        return Err(SamplerError::InvalidInput(format!(
                            "weight {weight} of group {group} on {op} in window {window}"
                        )));
                    }
                }
            }
        }
        for window in model.time_windows() {
            for group in model.groups(window) {
                let expected = model.passengers(window, group).unwrap_or(0);
                let actual = self.group_total(window, group);
                if (actual - expected as f64).abs() > tolerance {
                    return Err(SamplerError::GroupSumMismatch {
                        window,
                        group,
                        expected,
                        actual,
                    });
                }
            }
        }
        Ok(())
    }

    /// Marginal of an explicit mixture of pure strategies.
    pub fn mixture(components: &[(f64, PureStrategy)]) -> Result<Self, SamplerError> {
        if components.is_empty() {
            return Err(SamplerError::InvalidInput("empty mixture".to_string()));
        }
        let mut total = 0.0;
        for (probability, _) in components {
            if !probability.is_finite() || *probability < 0.0 {
                return Err(SamplerError::InvalidInput(format!(
                    "mixture probability {probability}"
                )));
            }
            total += probability;
        }
        if (total - 1.0).abs() > MIXTURE_EPS {
            return Err(SamplerError::InvalidInput(format!(
                "mixture probabilities sum to {total}"
            )));
        }
        let mut out = MarginalStrategy::new();
        for (probability, pure) in components {
            for (window, group, operation, count) in pure.iter() {
                let slot = out
                    .windows
                    .entry(window)
                    .or_default()
                    .entry(group)
                    .or_default()
                    .entry(operation)
                    .or_insert(0.0);
                *slot += probability * count as f64;
            }
        }
        Ok(out)
    }

    /// Empirical mean of equally weighted samples.
    pub fn mean_of(samples: &[PureStrategy]) -> Result<Self, SamplerError> {
        if samples.is_empty() {
            return Err(SamplerError::InvalidInput("no samples to average".to_string()));
        }
        let mut sums = MarginalStrategy::new();
        for pure in samples {
            for (window, group, operation, count) in pure.iter() {
                let value = sums.get(window, group, operation).unwrap_or(0.0);
                sums.insert(window, group, operation, value + count as f64);
            }
        }
        let n = samples.len() as f64;
        Ok(sums.map(|total| total / n))
    }
}

impl PureStrategy {
    /// Load placed on every resource of `model` in `window`, indexed by
    /// resource id.
    pub fn resource_usage(&self, model: &ScreeningModel, window: TimeWindow) -> Vec<u64> {
        let mut usage = vec![0_u64; model.resource_count()];
        if let Some(groups) = self.window(window) {
            for ops in groups.values() {
                for (&op, &count) in ops {
                    for resource in model.operation_resources(op) {
                        usage[resource.0] += count as u64;
                    }
                }
            }
        }
        usage
    }

    /// Group total minus assigned passengers, for every group of `model`.
    pub fn unassigned_passengers(
        &self,
        model: &ScreeningModel,
    ) -> BTreeMap<(TimeWindow, GroupKey), i64> {
        let mut out = BTreeMap::new();
        for window in model.time_windows() {
            for group in model.groups(window) {
                let expected = model.passengers(window, group).unwrap_or(0) as i64;
                let assigned: i64 = self
                    .group(window, group)
                    .map(|ops| ops.values().map(|&c| c as i64).sum())
                    .unwrap_or(0);
                out.insert((window, group), expected - assigned);
            }
        }
        out
    }

    /// Exact group sums and resource capacities.
    pub fn validate(&self, model: &ScreeningModel) -> Result<(), SamplerError> {
        for (&window, groups) in &self.windows {
            if !model.has_window(window) {
                return Err(SamplerError::UnknownReference {
                    window,
                    kind: "window",
                    id: window.0 as usize,
                });
            }
            for (&group, ops) in groups {
                check_references(model, window, group, ops)?;
            }
        }
        for ((window, group), missing) in self.unassigned_passengers(model) {
            if missing != 0 {
                let expected = model.passengers(window, group).unwrap_or(0);
                return Err(SamplerError::GroupSumMismatch {
                    window,
                    group,
                    expected,
                    actual: self.group_total(window, group),
                });
            }
        }
        for window in model.time_windows() {
            let usage = self.resource_usage(model, window);
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
        Ok(())
    }

    pub fn to_marginal(&self) -> MarginalStrategy {
        self.map(|count| count as f64)
    }
}
