use std::collections::{BTreeMap, HashSet};

use rand::seq::SliceRandom;
use rand::Rng;

use crate::graph::{Edge, EdgeId, PairRole, VertexId, VertexKind, WindowGraph};
use crate::model::{GroupKey, OperationId, ResourceId};
use crate::numerics::{kernel_vector, row_reduce};
use crate::rounding::capacity::CapacityLedger;
use crate::rounding::RoundingStats;
use crate::SamplerOptions;

/// Deltas at or below this size count as no change.
pub const MOVE_TOLERANCE: f64 = 1e-9;

/// Direction of a rounding step. Junctions on the move shift by their delta;
/// every operation's bundle and every resource load follow from them.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleMove {
    pub junctions: Vec<(usize, f64)>,
    pub operations: Vec<f64>,
    pub resources: Vec<f64>,
}

impl CycleMove {
    /// Move of a closed walk: each group → junction edge on it moves its
    /// junction by one, in the edge's direction.
    pub fn from_edges(window_graph: &WindowGraph, edges: &[EdgeId]) -> Self {
        let junctions = edges
            .iter()
            .filter_map(|&edge_id| window_graph.graph.edge(edge_id))
            .filter_map(|edge| match window_graph.role(edge.pair) {
                Some(PairRole::GroupJunction(j)) => {
                    Some((j, if edge.forward { 1.0 } else { -1.0 }))
                }
                _ => None,
            })
            .collect();
        Self::from_junctions(window_graph, junctions)
    }

    pub fn from_junctions(window_graph: &WindowGraph, junctions: Vec<(usize, f64)>) -> Self {
        let mut operations = vec![0.0; window_graph.operation_vertices.len()];
        for &(j, delta) in &junctions {
            operations[window_graph.junctions[j].operation.0] += delta;
        }
        let resources = (0..window_graph.resource_vertices.len())
            .map(|r| {
                window_graph
                    .resource_operations(ResourceId(r))
                    .iter()
                    .map(|op| operations[op.0])
                    .sum()
            })
            .collect();
        Self {
            junctions,
            operations,
            resources,
        }
    }

    pub fn operation_delta(&self, operation: OperationId) -> f64 {
        self.operations.get(operation.0).copied().unwrap_or(0.0)
    }

    pub fn resource_delta(&self, resource: ResourceId) -> f64 {
        self.resources.get(resource.0).copied().unwrap_or(0.0)
    }

    /// True when no saturated resource would see its load change.
    pub fn preserves_saturated(&self, ledger: &CapacityLedger, tolerance: f64) -> bool {
        self.resources.iter().enumerate().all(|(r, &delta)| {
            delta.abs() <= MOVE_TOLERANCE || !ledger.is_saturated(ResourceId(r), tolerance)
        })
    }

    pub fn is_trivial(&self) -> bool {
        self.junctions.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Approach {
    Junction,
    Aggregate,
}

struct Frame {
    vertex: VertexId,
    via: EdgeId,
    next: usize,
}

/// Finds rounding moves through fractional junctions: simple cycles first,
/// then combinations of group swaps that keep every full resource full.
pub struct CycleFinder<'a> {
    window_graph: &'a WindowGraph,
    ledger: &'a CapacityLedger,
    options: &'a SamplerOptions,
}

impl<'a> CycleFinder<'a> {
    pub fn new(
        window_graph: &'a WindowGraph,
        ledger: &'a CapacityLedger,
        options: &'a SamplerOptions,
    ) -> Self {
        Self {
            window_graph,
            ledger,
            options,
        }
    }

    /// Group → junction edges of every fractional junction. Any cycle through
    /// a fractional junction uses its group edge.
    pub fn start_edges<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<EdgeId> {
        let mut starts: Vec<EdgeId> = self
            .window_graph
            .fractional_junctions(self.options.tolerance)
            .into_iter()
            .filter_map(|j| {
                self.window_graph
                    .graph
                    .pair(self.window_graph.junctions[j].group_pair)
                    .map(|pair| pair.forward)
            })
            .collect();
        if self.options.shuffle_start_edges {
            starts.shuffle(rng);
        }
        starts
    }

    /// Depth-first cycle search from every start edge, then the combined
    /// group-swap move when no simple cycle is admissible.
    pub fn find<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        stats: &mut RoundingStats,
    ) -> Option<CycleMove> {
        let starts = self.start_edges(rng);
        if starts.is_empty() {
            return None;
        }
        let mut expansions = 0_usize;
        for &start in &starts {
            if let Some(found) = self.search(start, &mut expansions) {
                stats.search_expansions += expansions;
                return Some(found);
            }
        }
        stats.search_expansions += expansions;

        tracing::debug!(
            window = %self.window_graph.window,
            starts = starts.len(),
            "no simple rounding cycle, combining group swaps"
        );
        let combined = self.combine_swaps(rng);
        if combined.is_some() {
            stats.combined_moves += 1;
        }
        combined
    }

    /// Pairs each group's first fractional junction with each of its other
    /// fractional junctions. Moving one passenger along a pair keeps the group
    /// total, and these swaps span every move that does.
    pub fn group_swaps(&self) -> Vec<(usize, usize)> {
        let mut by_group: BTreeMap<GroupKey, Vec<usize>> = BTreeMap::new();
        for j in self
            .window_graph
            .fractional_junctions(self.options.tolerance)
        {
            by_group
                .entry(self.window_graph.junctions[j].group)
                .or_default()
                .push(j);
        }
        by_group
            .values()
            .flat_map(|js| js[1..].iter().map(move |&other| (js[0], other)))
            .collect()
    }

    /// Weighs the group swaps so that their combined load change on every
    /// saturated resource is zero. A swap combination may revisit a group, so
    /// this reaches moves no simple cycle expresses. `None` when the saturated
    /// loads pin every combination.
    fn combine_swaps<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<CycleMove> {
        let swaps = self.group_swaps();
        if swaps.is_empty() {
            return None;
        }
        let swap_moves: Vec<CycleMove> = swaps
            .iter()
            .map(|&(up, down)| {
                CycleMove::from_junctions(self.window_graph, vec![(up, 1.0), (down, -1.0)])
            })
            .collect();
        let mut rows: Vec<Vec<f64>> = self
            .ledger
            .saturated_resources(self.options.saturation_tolerance)
            .into_iter()
            .map(|r| swap_moves.iter().map(|mv| mv.resource_delta(r)).collect())
            .filter(|row: &Vec<f64>| row.iter().any(|&v| v != 0.0))
            .collect();
        let pivots = row_reduce(&mut rows, swaps.len(), MOVE_TOLERANCE);
        let free: Vec<usize> = (0..swaps.len()).filter(|c| !pivots.contains(c)).collect();
        let &column = free.choose(rng)?;
        let weights = kernel_vector(&rows, &pivots, swaps.len(), column);

        let mut deltas: BTreeMap<usize, f64> = BTreeMap::new();
        for (&(up, down), &weight) in swaps.iter().zip(weights.iter()) {
            if weight == 0.0 {
                continue;
            }
            *deltas.entry(up).or_insert(0.0) += weight;
            *deltas.entry(down).or_insert(0.0) -= weight;
        }
        let junctions = deltas
            .into_iter()
            .filter(|(_, delta)| delta.abs() > MOVE_TOLERANCE)
            .collect();
        let combined = CycleMove::from_junctions(self.window_graph, junctions);
        let admissible = !combined.is_trivial()
            && combined.preserves_saturated(self.ledger, self.options.saturation_tolerance);
        admissible.then_some(combined)
    }

    fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.window_graph.graph.edge(id)
    }

    fn is_aggregate(&self, vertex: VertexId) -> bool {
        self.window_graph
            .graph
            .vertex(vertex)
            .map_or(false, |v| v.is_aggregate())
    }

    fn traversable(&self, edge: &Edge) -> bool {
        match self.window_graph.role(edge.pair) {
            Some(PairRole::GroupJunction(j)) | Some(PairRole::JunctionOperation(j)) => self
                .window_graph
                .is_junction_fractional(j, self.options.tolerance),
            Some(_) => true,
            None => false,
        }
    }

    /// Whether a walk may arrive at `vertex` over `via` and leave over `next`.
    /// Only operations restrict transit: their bundle cannot move in two
    /// directions at once, and a throughput change needs spare capacity.
    fn transit_allowed(&self, vertex: VertexId, via: &Edge, next: &Edge) -> bool {
        let Some(VertexKind::Operation(operation)) =
            self.window_graph.graph.vertex(vertex).map(|v| v.kind)
        else {
            return true;
        };
        match (self.is_aggregate(via.source), self.is_aggregate(next.target)) {
            (true, true) => false,
            (false, false) => true,
            _ => self.ledger.operation_residual(operation) > self.options.saturation_tolerance,
        }
    }

    fn approach(&self, edge: &Edge) -> Approach {
        if self.is_aggregate(edge.source) {
            Approach::Aggregate
        } else {
            Approach::Junction
        }
    }

    fn search(&self, start: EdgeId, expansions: &mut usize) -> Option<CycleMove> {
        let graph = &self.window_graph.graph;
        let first = self.edge(start)?;
        let origin = first.source;
        let mut on_path = vec![false; graph.vertex_count()];
        let mut visited: HashSet<(VertexId, Approach)> = HashSet::new();
        on_path[origin.0] = true;
        on_path[first.target.0] = true;
        let mut stack = vec![Frame {
            vertex: first.target,
            via: start,
            next: 0,
        }];

        while let Some(frame) = stack.last_mut() {
            let vertex = frame.vertex;
            let via_id = frame.via;
            let outgoing = graph.outgoing_edges(vertex);
            let Some(&next_id) = outgoing.get(frame.next) else {
                on_path[vertex.0] = false;
                stack.pop();
                continue;
            };
            frame.next += 1;

            *expansions += 1;
            let (Some(via), Some(next)) = (self.edge(via_id), self.edge(next_id)) else {
                continue;
            };
            if next.pair == via.pair
                || !self.traversable(next)
                || !self.transit_allowed(vertex, via, next)
            {
                continue;
            }

            let target = next.target;
            if target == origin {
                if !self.transit_allowed(origin, next, first) {
                    continue;
                }
                let mut edges: Vec<EdgeId> = stack.iter().map(|f| f.via).collect();
                edges.push(next_id);
                let candidate = CycleMove::from_edges(self.window_graph, &edges);
                if candidate.is_trivial() {
                    continue;
                }
                return Some(candidate);
            }
            if on_path[target.0] || !visited.insert((target, self.approach(next))) {
                continue;
            }
            on_path[target.0] = true;
            stack.push(Frame {
                vertex: target,
                via: next_id,
                next: 0,
            });
        }
        None
    }
}
