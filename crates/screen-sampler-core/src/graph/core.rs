use crate::model::{GroupKey, OperationId, ResourceId};
use crate::SamplerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VertexId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EdgeId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PairId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexKind {
    Sink,
    Resource(ResourceId),
    Operation(OperationId),
    Group(GroupKey),
    Junction {
        group: GroupKey,
        operation: OperationId,
    },
}

#[derive(Debug, Clone)]
pub struct Vertex {
    pub kind: VertexKind,
    pub is_operation: bool,
}

impl Vertex {
    /// Sink and resource vertices: the capacity side of an operation.
    pub fn is_aggregate(&self) -> bool {
        matches!(self.kind, VertexKind::Sink | VertexKind::Resource(_))
    }
}

#[derive(Debug, Clone)]
pub struct Edge {
    pub source: VertexId,
    pub target: VertexId,
    pub weight: f64,
    pub forward: bool,
    pub pair: PairId,
}

#[derive(Debug, Clone, Copy)]
pub struct EdgePair {
    pub forward: EdgeId,
    pub backward: EdgeId,
}

/// Arena of vertices and mirrored edge pairs. Weights are only written
/// through pair-level setters so both edges of a pair always agree.
#[derive(Debug, Clone, Default)]
pub struct FlowGraph {
    vertices: Vec<Vertex>,
    edges: Vec<Edge>,
    pairs: Vec<EdgePair>,
    outgoing: Vec<Vec<EdgeId>>,
    incoming: Vec<Vec<EdgeId>>,
}

impl FlowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn pair_count(&self) -> usize {
        self.pairs.len()
    }

    pub fn add_vertex(&mut self, kind: VertexKind) -> VertexId {
        let id = VertexId(self.vertices.len());
        self.vertices.push(Vertex {
            kind,
            is_operation: matches!(kind, VertexKind::Operation(_)),
        });
        self.outgoing.push(Vec::new());
        self.incoming.push(Vec::new());
        id
    }

    fn push_edge(
        &mut self,
        source: VertexId,
        target: VertexId,
        weight: f64,
        forward: bool,
        pair: PairId,
    ) -> EdgeId {
        let id = EdgeId(self.edges.len());
        self.edges.push(Edge {
            source,
            target,
            weight,
            forward,
            pair,
        });
        self.outgoing[source.0].push(id);
        self.incoming[target.0].push(id);
        id
    }

    /// Adds `source → target` together with its mirror `target → source`.
    pub fn add_pair(
        &mut self,
        source: VertexId,
        target: VertexId,
        weight: f64,
    ) -> Result<PairId, SamplerError> {
        if source.0 >= self.vertices.len() || target.0 >= self.vertices.len() {
            return Err(SamplerError::InvalidInput(
                "edge endpoint outside vertex range".to_string(),
            ));
        }
        if source == target {
            return Err(SamplerError::InvalidInput("self loop".to_string()));
        }
        let pair = PairId(self.pairs.len());
        let forward = self.push_edge(source, target, weight, true, pair);
        let backward = self.push_edge(target, source, weight, false, pair);
        self.pairs.push(EdgePair { forward, backward });
        Ok(pair)
    }

    pub fn vertex(&self, id: VertexId) -> Option<&Vertex> {
        self.vertices.get(id.0)
    }

    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(id.0)
    }

    pub fn pair(&self, id: PairId) -> Option<&EdgePair> {
        self.pairs.get(id.0)
    }

    pub fn pair_weight(&self, id: PairId) -> f64 {
        self.pairs
            .get(id.0)
            .map(|pair| self.edges[pair.forward.0].weight)
            .unwrap_or(0.0)
    }

    pub fn set_pair_weight(&mut self, id: PairId, weight: f64) {
        if let Some(&EdgePair { forward, backward }) = self.pairs.get(id.0) {
            self.edges[forward.0].weight = weight;
            self.edges[backward.0].weight = weight;
        }
    }

    pub fn shift_pair(&mut self, id: PairId, delta: f64) {
        let weight = self.pair_weight(id) + delta;
        self.set_pair_weight(id, weight);
    }

    pub fn outgoing_edges(&self, vertex: VertexId) -> &[EdgeId] {
        self.outgoing
            .get(vertex.0)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn incoming_edges(&self, vertex: VertexId) -> &[EdgeId] {
        self.incoming
            .get(vertex.0)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn pairs(&self) -> impl Iterator<Item = (PairId, &EdgePair)> {
        self.pairs
            .iter()
            .enumerate()
            .map(|(idx, pair)| (PairId(idx), pair))
    }

    /// Pairs whose two edges disagree on the weight.
    pub fn mirror_violations(&self) -> Vec<PairId> {
        self.pairs()
            .filter(|(_, pair)| {
                self.edges[pair.forward.0].weight.to_bits()
                    != self.edges[pair.backward.0].weight.to_bits()
            })
            .map(|(id, _)| id)
            .collect()
    }

    /// Net forward weight leaving `vertex`.
    pub fn net_outflow(&self, vertex: VertexId) -> f64 {
        let out: f64 = self
            .outgoing_edges(vertex)
            .iter()
            .map(|&e| &self.edges[e.0])
            .filter(|edge| edge.forward)
            .map(|edge| edge.weight)
            .sum();
        let inflow: f64 = self
            .incoming_edges(vertex)
            .iter()
            .map(|&e| &self.edges[e.0])
            .filter(|edge| edge.forward)
            .map(|edge| edge.weight)
            .sum();
        out - inflow
    }
}
