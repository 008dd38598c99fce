pub mod generator;
pub mod graph;
pub mod model;
pub mod numerics;
pub mod rounding;
pub mod sampler;
pub mod strategy;

pub use generator::RandomStrategyGenerator;
pub use model::{
    CategoryId, Flight, FlightId, GroupKey, OperationId, ResourceId, RiskCategory,
    ScreeningModel, ScreeningOperation, ScreeningResource, TimeWindow,
};
pub use rounding::RoundingStats;
pub use sampler::{sample, PureStrategySampler, SampleReport};
pub use strategy::{Assignment, MarginalStrategy, PureStrategy, WindowAssignment};

use crate::numerics::{INTEGRALITY_TOLERANCE, SATURATION_TOLERANCE};

#[derive(Debug, Clone)]
pub struct SamplerOptions {
    /// Seed used by [`PureStrategySampler::sample_seeded`] and as the base of
    /// the per-window seeds in [`PureStrategySampler::sample_parallel`].
    pub seed: u64,
    /// Distance from the nearest integer below which an edge weight is integral.
    pub tolerance: f64,
    /// Residual capacity at or below which an operation is treated as full.
    pub saturation_tolerance: f64,
    pub shuffle_start_edges: bool,
    pub threads: usize,
}

impl Default for SamplerOptions {
    fn default() -> Self {
        Self {
            seed: 0,
            tolerance: INTEGRALITY_TOLERANCE,
            saturation_tolerance: SATURATION_TOLERANCE,
            shuffle_start_edges: true,
            threads: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SamplerError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("unknown {kind} {id} referenced in window {window}")]
    UnknownReference {
        window: TimeWindow,
        kind: &'static str,
        id: usize,
    },
    #[error("group {group} in window {window} assigns {actual} passengers, expected {expected}")]
    GroupSumMismatch {
        window: TimeWindow,
        group: GroupKey,
        expected: u32,
        actual: f64,
    },
    #[error("resource {resource} in window {window} carries {load} but its capacity is {capacity}")]
    CapacityExceeded {
        window: TimeWindow,
        resource: ResourceId,
        load: f64,
        capacity: u64,
    },
    #[error("rounding stuck in window {window}: {fractional_edges} fractional edges but no admissible move")]
    RoundingStuck {
        window: TimeWindow,
        fractional_edges: usize,
    },
    #[error("no operation has capacity left for a passenger of group {group} in window {window}")]
    NoFeasibleOperation { window: TimeWindow, group: GroupKey },
    #[error("thread pool: {0}")]
    Pool(String),
}
