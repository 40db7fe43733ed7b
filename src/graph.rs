//! Bounded neighborhood extraction over the link graph.
//!
//! [`GraphBuilder::build`] walks breadth-first rings out from a center node
//! over the union of forward links and backlinks, truncates
//! deterministically when the node budget runs out, and returns a
//! self-contained [`GraphView`]. Pure reads; the same store, index and query
//! always produce the same view.

use enumset::EnumSet;
use petgraph::graph::{NodeIndex, UnGraph};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::{
    config::{DEFAULT_GRAPH_DEPTH, DEFAULT_GRAPH_MAX_NODES},
    error::RamifyError,
    index::LinkGraphIndex,
    properties::{LinkKind, Nid, NodeType},
    store::BlockStore,
};

/// Ceiling on requested traversal depth. Rings beyond this add noise, not
/// context, and the cap bounds the walk even for adversarial queries.
pub const MAX_TRAVERSAL_DEPTH: usize = 32;

/// Shape of one neighborhood request.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct GraphQuery {
    /// How many rings to walk out from the center. Zero is legal and yields
    /// the center alone; anything past [`MAX_TRAVERSAL_DEPTH`] is rejected.
    pub depth: usize,
    /// Hard ceiling on nodes pulled in beyond the center. Must be nonzero.
    pub max_nodes: usize,
    /// Edge kinds the walk may traverse and the view may contain.
    pub kinds: EnumSet<LinkKind>,
}

impl Default for GraphQuery {
    fn default() -> Self {
        GraphQuery {
            depth: DEFAULT_GRAPH_DEPTH,
            max_nodes: DEFAULT_GRAPH_MAX_NODES,
            kinds: EnumSet::all(),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct GraphNode {
    pub id: Nid,
    pub node_type: NodeType,
    /// Degree within this view, normalized against the view's busiest node.
    /// Zero when the view has no edges at all.
    pub importance: f32,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct GraphEdge {
    pub source: Nid,
    pub target: Nid,
    pub kind: LinkKind,
    pub strength: f32,
}

/// A self-contained subgraph around one center node. Nodes are listed center
/// first, then ring by ring in rank order; edges are sorted by
/// `(source, target, kind)`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct GraphView {
    pub center: Nid,
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

pub struct GraphBuilder;

impl GraphBuilder {
    /// Extract the neighborhood of `center` under `query`.
    ///
    /// When a ring would overflow `max_nodes`, candidates are ranked by the
    /// strongest edge that discovered them (descending), ties broken by id,
    /// and the ring is cut at the budget. The rest of the ring and
    /// everything beyond it is dropped.
    pub fn build(
        store: &BlockStore,
        index: &LinkGraphIndex,
        center: Nid,
        query: &GraphQuery,
    ) -> Result<GraphView, RamifyError> {
        if query.max_nodes == 0 {
            return Err(RamifyError::Validation(
                "graph query allows zero nodes".to_string(),
            ));
        }
        if query.depth > MAX_TRAVERSAL_DEPTH {
            return Err(RamifyError::Validation(format!(
                "graph depth {} exceeds the traversal guard {MAX_TRAVERSAL_DEPTH}",
                query.depth
            )));
        }
        if !store.contains(center) && index.stub(center).is_none() {
            return Err(RamifyError::NotFound(format!("graph center {center}")));
        }

        let mut included: BTreeSet<Nid> = BTreeSet::from([center]);
        let mut order: Vec<Nid> = vec![center];
        let mut frontier: Vec<Nid> = vec![center];
        for _ in 0..query.depth {
            if order.len() - 1 >= query.max_nodes {
                break;
            }
            // strongest edge that reaches each candidate from this ring
            let mut reach: BTreeMap<Nid, f32> = BTreeMap::new();
            for node in &frontier {
                for edge in Self::touching(index, *node, query.kinds) {
                    let other = if edge.0 == *node { edge.1 } else { edge.0 };
                    if included.contains(&other) {
                        continue;
                    }
                    let best = reach.entry(other).or_insert(0.0);
                    if edge.2 > *best {
                        *best = edge.2;
                    }
                }
            }
            if reach.is_empty() {
                break;
            }
            let mut ranked: Vec<(Nid, f32)> = reach.into_iter().collect();
            ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
            ranked.truncate(query.max_nodes - (order.len() - 1));
            frontier = ranked.iter().map(|(id, _)| *id).collect();
            included.extend(frontier.iter().copied());
            order.extend(frontier.iter().copied());
        }

        let mut edges: Vec<GraphEdge> = Vec::new();
        for node in &order {
            for edge in index.forward_links(*node) {
                if query.kinds.contains(edge.kind) && included.contains(&edge.target) {
                    edges.push(GraphEdge {
                        source: edge.source,
                        target: edge.target,
                        kind: edge.kind,
                        strength: edge.strength,
                    });
                }
            }
        }
        edges.sort_by(|a, b| {
            (a.source, a.target, a.kind).cmp(&(b.source, b.target, b.kind))
        });

        let importance = Self::degrees(&order, &edges);
        let nodes = order
            .iter()
            .map(|id| GraphNode {
                id: *id,
                node_type: Self::classify(store, index, *id),
                importance: importance.get(id).copied().unwrap_or(0.0),
            })
            .collect();
        Ok(GraphView {
            center,
            nodes,
            edges,
        })
    }

    /// `(source, target, strength)` for every edge touching `id` in either
    /// direction, kind-filtered.
    fn touching(
        index: &LinkGraphIndex,
        id: Nid,
        kinds: EnumSet<LinkKind>,
    ) -> Vec<(Nid, Nid, f32)> {
        index
            .forward_links(id)
            .into_iter()
            .chain(index.backlinks(id))
            .filter(|e| kinds.contains(e.kind))
            .map(|e| (e.source, e.target, e.strength))
            .collect()
    }

    fn classify(store: &BlockStore, index: &LinkGraphIndex, id: Nid) -> NodeType {
        store
            .node_type(id)
            .or_else(|| index.stub(id).map(|s| s.node_type))
            .unwrap_or_default()
    }

    /// Normalized degree per node over the view's undirected structure.
    fn degrees(order: &[Nid], edges: &[GraphEdge]) -> BTreeMap<Nid, f32> {
        let mut graph: UnGraph<Nid, ()> = UnGraph::new_undirected();
        let mut indices: BTreeMap<Nid, NodeIndex> = BTreeMap::new();
        for id in order {
            indices.insert(*id, graph.add_node(*id));
        }
        for edge in edges {
            if let (Some(a), Some(b)) = (indices.get(&edge.source), indices.get(&edge.target)) {
                graph.add_edge(*a, *b, ());
            }
        }
        let max_degree = indices
            .values()
            .map(|ix| graph.edges(*ix).count())
            .max()
            .unwrap_or(0);
        if max_degree == 0 {
            return BTreeMap::new();
        }
        indices
            .into_iter()
            .map(|(id, ix)| (id, graph.edges(ix).count() as f32 / max_degree as f32))
            .collect()
    }
}
