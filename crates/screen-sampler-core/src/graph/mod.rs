mod builder;
mod core;

pub use builder::{Junction, PairRole, WindowGraph};
pub use self::core::{Edge, EdgeId, EdgePair, FlowGraph, PairId, Vertex, VertexId, VertexKind};
