use std::collections::BTreeMap;

use crate::graph::core::{FlowGraph, PairId, VertexId, VertexKind};
use crate::model::{GroupKey, OperationId, ResourceId, ScreeningModel, TimeWindow};
use crate::numerics::{is_fractional, settle};
use crate::strategy::{MarginalStrategy, WindowAssignment};
use crate::SamplerError;

/// What a mirrored pair stands for in the window graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairRole {
    GroupJunction(usize),
    JunctionOperation(usize),
    OperationResource(OperationId, ResourceId),
    /// Link of an operation that consumes no resource.
    OperationSink(OperationId),
    ResourceSink(ResourceId),
}

/// One (flight, category, operation) junction and its two pairs. Both pairs
/// carry the junction weight: the passengers of `group` routed through
/// `operation`.
#[derive(Debug, Clone)]
pub struct Junction {
    pub group: GroupKey,
    pub operation: OperationId,
    pub vertex: VertexId,
    pub group_pair: PairId,
    pub operation_pair: PairId,
    /// Whether the marginal lists this operation for the group.
    pub listed: bool,
}

#[derive(Debug, Clone)]
pub struct WindowGraph {
    pub window: TimeWindow,
    pub graph: FlowGraph,
    pub sink: VertexId,
    pub resource_vertices: Vec<VertexId>,
    pub operation_vertices: Vec<VertexId>,
    pub group_vertices: BTreeMap<GroupKey, VertexId>,
    pub junctions: Vec<Junction>,
    /// Aggregate pairs of each operation, indexed by operation id.
    pub operation_pairs: Vec<Vec<(PairRole, PairId)>>,
    pub resource_sink_pairs: Vec<PairId>,
    operation_junctions: Vec<Vec<usize>>,
    resource_operations: Vec<Vec<OperationId>>,
    roles: Vec<PairRole>,
    junction_of_vertex: Vec<Option<usize>>,
}

impl WindowGraph {
    /// Builds the mirrored flow graph of one window: sink, resources,
    /// operations, groups and junctions carrying the marginal weights, then
    /// derives the aggregate pairs so flow is conserved at every inner vertex.
    pub fn build(
        model: &ScreeningModel,
        window: TimeWindow,
        marginal: &MarginalStrategy,
    ) -> Result<Self, SamplerError> {
        if !model.has_window(window) {
            return Err(SamplerError::UnknownReference {
                window,
                kind: "window",
                id: window.0 as usize,
            });
        }
        let mut graph = FlowGraph::new();
        let mut roles = Vec::new();

        let sink = graph.add_vertex(VertexKind::Sink);
        let mut resource_vertices = Vec::with_capacity(model.resource_count());
        let mut resource_sink_pairs = Vec::with_capacity(model.resource_count());
        for resource in model.resource_ids() {
            let vertex = graph.add_vertex(VertexKind::Resource(resource));
            let pair = graph.add_pair(vertex, sink, 0.0)?;
            roles.push(PairRole::ResourceSink(resource));
            resource_vertices.push(vertex);
            resource_sink_pairs.push(pair);
        }

        let mut operation_vertices = Vec::with_capacity(model.operation_count());
        let mut operation_pairs = Vec::with_capacity(model.operation_count());
        let mut resource_operations = vec![Vec::new(); model.resource_count()];
        for operation in model.operation_ids() {
            let vertex = graph.add_vertex(VertexKind::Operation(operation));
            let resources = model.operation_resources(operation);
            let mut pairs = Vec::with_capacity(resources.len().max(1));
            if resources.is_empty() {
                let pair = graph.add_pair(vertex, sink, 0.0)?;
                let role = PairRole::OperationSink(operation);
                roles.push(role);
                pairs.push((role, pair));
            }
            for &resource in resources {
                let pair = graph.add_pair(vertex, resource_vertices[resource.0], 0.0)?;
                let role = PairRole::OperationResource(operation, resource);
                roles.push(role);
                pairs.push((role, pair));
                resource_operations[resource.0].push(operation);
            }
            operation_vertices.push(vertex);
            operation_pairs.push(pairs);
        }

        let mut group_vertices = BTreeMap::new();
        let mut junctions = Vec::new();
        let mut operation_junctions = vec![Vec::new(); model.operation_count()];
        for group in model.groups(window) {
            let group_vertex = graph.add_vertex(VertexKind::Group(group));
            group_vertices.insert(group, group_vertex);
            let weights = marginal.group(window, group);
            for operation in model.operation_ids() {
                let listed = weights.map_or(false, |ops| ops.contains_key(&operation));
                let weight = weights
                    .and_then(|ops| ops.get(&operation).copied())
                    .unwrap_or(0.0)
                    .max(0.0);
                let vertex = graph.add_vertex(VertexKind::Junction { group, operation });
                let index = junctions.len();
                let group_pair = graph.add_pair(group_vertex, vertex, weight)?;
                roles.push(PairRole::GroupJunction(index));
                let operation_pair =
                    graph.add_pair(vertex, operation_vertices[operation.0], weight)?;
                roles.push(PairRole::JunctionOperation(index));
                operation_junctions[operation.0].push(index);
                junctions.push(Junction {
                    group,
                    operation,
                    vertex,
                    group_pair,
                    operation_pair,
                    listed,
                });
            }
        }

        let mut junction_of_vertex = vec![None; graph.vertex_count()];
        for (index, junction) in junctions.iter().enumerate() {
            junction_of_vertex[junction.vertex.0] = Some(index);
        }

        let mut built = Self {
            window,
            graph,
            sink,
            resource_vertices,
            operation_vertices,
            group_vertices,
            junctions,
            operation_pairs,
            resource_sink_pairs,
            operation_junctions,
            resource_operations,
            roles,
            junction_of_vertex,
        };
        built.refresh_aggregates();
        Ok(built)
    }

    /// Sets every operation pair to the operation's inflow and every
    /// resource → sink pair to the resource's inflow.
    pub fn refresh_aggregates(&mut self) {
        let throughputs: Vec<f64> = (0..self.operation_vertices.len())
            .map(|op| self.throughput(OperationId(op)))
            .collect();
        for (pairs, &throughput) in self.operation_pairs.iter().zip(throughputs.iter()) {
            for &(_, pair) in pairs {
                self.graph.set_pair_weight(pair, throughput);
            }
        }
        for (resource, operations) in self.resource_operations.iter().enumerate() {
            let load: f64 = operations.iter().map(|op| throughputs[op.0]).sum();
            self.graph
                .set_pair_weight(self.resource_sink_pairs[resource], load);
        }
    }

    pub fn role(&self, pair: PairId) -> Option<PairRole> {
        self.roles.get(pair.0).copied()
    }

    pub fn junction_at(&self, vertex: VertexId) -> Option<usize> {
        self.junction_of_vertex.get(vertex.0).copied().flatten()
    }

    pub fn junction_weight(&self, index: usize) -> f64 {
        self.graph.pair_weight(self.junctions[index].group_pair)
    }

    pub fn set_junction_weight(&mut self, index: usize, weight: f64) {
        let Junction {
            group_pair,
            operation_pair,
            ..
        } = self.junctions[index];
        self.graph.set_pair_weight(group_pair, weight);
        self.graph.set_pair_weight(operation_pair, weight);
    }

    /// Passengers routed through `operation`: the sum of its junction weights.
    pub fn throughput(&self, operation: OperationId) -> f64 {
        self.operation_junctions
            .get(operation.0)
            .map(|indices| indices.iter().map(|&j| self.junction_weight(j)).sum())
            .unwrap_or(0.0)
    }

    /// Forward weight of the operation → resource pairs entering `resource`.
    pub fn load(&self, resource: ResourceId) -> f64 {
        self.operation_pairs
            .iter()
            .flatten()
            .filter(|(role, _)| matches!(role, PairRole::OperationResource(_, r) if *r == resource))
            .map(|&(_, pair)| self.graph.pair_weight(pair))
            .sum()
    }

    pub fn resource_operations(&self, resource: ResourceId) -> &[OperationId] {
        self.resource_operations
            .get(resource.0)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_junction_fractional(&self, index: usize, tolerance: f64) -> bool {
        is_fractional(self.junction_weight(index), tolerance)
    }

    pub fn fractional_junctions(&self, tolerance: f64) -> Vec<usize> {
        (0..self.junctions.len())
            .filter(|&j| self.is_junction_fractional(j, tolerance))
            .collect()
    }

    /// Logical edges, one per mirrored pair, whose weight is not integral.
    pub fn fractional_edge_count(&self, tolerance: f64) -> usize {
        self.graph
            .pairs()
            .filter(|(id, _)| is_fractional(self.graph.pair_weight(*id), tolerance))
            .count()
    }

    /// Reads the junction weights off as integral passenger counts.
    pub fn extract(&self, tolerance: f64) -> WindowAssignment<u32> {
        let mut out = WindowAssignment::new();
        for (index, junction) in self.junctions.iter().enumerate() {
            let count = settle(self.junction_weight(index), tolerance);
            if count == 0 && !junction.listed {
                continue;
            }
            out.entry(junction.group)
                .or_insert_with(BTreeMap::new)
                .insert(junction.operation, count);
        }
        out
    }
}
