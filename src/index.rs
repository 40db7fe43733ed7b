//! The bidirectional link-graph index.
//!
//! [`LinkGraphIndex`] mirrors every derived [`LinkEdge`] in two maps, keyed
//! by source and by target, so backlink queries cost one lookup. The maps
//! are maintained delta-only: re-resolving one block's content touches only
//! that block's edges. Targets that resolve to nothing become [`StubTarget`]
//! rows with deterministic ids, discarded when their last referring edge
//! goes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::{
    event::OutlineEvent,
    parser::{normalize_page_name, parse},
    properties::{edge_strength, LinkEdge, LinkKind, Nid, NodeType},
    store::BlockStore,
};

/// Placeholder row for a link target that does not exist yet. Page stubs get
/// [`Nid::for_name`] ids so every reference to one unknown name lands on one
/// node; block stubs reuse the referenced id itself.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct StubTarget {
    pub id: Nid,
    /// Normalized page name, or the referenced block id rendered as text.
    pub name: String,
    pub node_type: NodeType,
    pub created_at: DateTime<Utc>,
}

impl StubTarget {
    pub fn for_page(name: impl Into<String>) -> Self {
        let name = name.into();
        StubTarget {
            id: Nid::for_name(&name),
            name,
            node_type: NodeType::Page,
            created_at: Utc::now(),
        }
    }

    pub fn for_block(id: Nid) -> Self {
        StubTarget {
            id,
            name: format!("{id}"),
            node_type: NodeType::Block,
            created_at: Utc::now(),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LinkGraphIndex {
    /// Source id -> edges leaving it.
    forward: BTreeMap<Nid, BTreeSet<LinkEdge>>,
    /// Target id -> edges arriving at it. Exact inverse of `forward`.
    backlinks: BTreeMap<Nid, BTreeSet<LinkEdge>>,
    stubs: BTreeMap<Nid, StubTarget>,
}

/// One resolved reference: target id and type, plus the stub row to register
/// when nothing with that identity exists yet.
struct Resolution {
    target: Nid,
    target_type: NodeType,
    stub: Option<StubTarget>,
}

impl LinkGraphIndex {
    pub fn new() -> Self {
        LinkGraphIndex::default()
    }

    // ------------------------------------------------------------------
    // Queries

    /// Edges arriving at `id`, in identity order.
    pub fn backlinks(&self, id: Nid) -> Vec<LinkEdge> {
        self.backlinks
            .get(&id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Edges leaving `id`, in identity order.
    pub fn forward_links(&self, id: Nid) -> Vec<LinkEdge> {
        self.forward
            .get(&id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn backlink_count(&self, id: Nid) -> usize {
        self.backlinks.get(&id).map_or(0, BTreeSet::len)
    }

    /// Distinct source ids with at least one edge into `target`. Feeds the
    /// re-resolution pass when a stub is promoted to a real page.
    pub fn sources_referencing(&self, target: Nid) -> Vec<Nid> {
        self.backlinks
            .get(&target)
            .map(|set| {
                set.iter()
                    .map(|e| e.source)
                    .collect::<BTreeSet<Nid>>()
                    .into_iter()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn stub(&self, id: Nid) -> Option<&StubTarget> {
        self.stubs.get(&id)
    }

    pub fn stubs(&self) -> impl Iterator<Item = &StubTarget> {
        self.stubs.values()
    }

    pub fn stub_count(&self) -> usize {
        self.stubs.len()
    }

    pub fn edge_count(&self) -> usize {
        self.forward.values().map(BTreeSet::len).sum()
    }

    /// Every edge in the index, in identity order. Snapshot feed.
    pub fn all_edges(&self) -> Vec<LinkEdge> {
        self.forward.values().flat_map(|set| set.iter().cloned()).collect()
    }

    // ------------------------------------------------------------------
    // Maintenance

    /// Re-derive the outgoing edges of one block from its current content
    /// and reconcile the maps against what was indexed before. Only changed
    /// edges move: surviving identities keep their `discovered_at`, and a
    /// pure payload change (occurrence count) re-announces the edge rather
    /// than dropping and re-adding it.
    pub fn update_block_links(
        &mut self,
        store: &BlockStore,
        source: Nid,
        content: &str,
    ) -> Vec<OutlineEvent> {
        let mut desired: BTreeMap<(Nid, LinkKind), (NodeType, u32, Option<StubTarget>)> =
            BTreeMap::new();
        for raw in parse(content) {
            let kind = raw.kind.link_kind();
            let Some(res) = Self::resolve(store, raw.kind.targets_block(), &raw.raw) else {
                continue;
            };
            desired
                .entry((res.target, kind))
                .and_modify(|(_, occurrences, _)| *occurrences += 1)
                .or_insert((res.target_type, 1, res.stub));
        }

        let current = self.forward.get(&source).cloned().unwrap_or_default();
        let mut events = Vec::new();
        for edge in &current {
            if !desired.contains_key(&(edge.target, edge.kind)) {
                self.drop_edge(edge.clone(), &mut events);
            }
        }
        for ((target, kind), (target_type, occurrences, stub)) in desired {
            let existing = current.iter().find(|e| e.target == target && e.kind == kind);
            if let Some(existing) = existing {
                if existing.occurrences == occurrences {
                    continue;
                }
            }
            let mut edge = LinkEdge::new(
                source,
                NodeType::Block,
                target,
                target_type,
                kind,
                occurrences,
            );
            if let Some(existing) = existing {
                edge.discovered_at = existing.discovered_at;
            } else if let Some(stub) = stub {
                tracing::trace!("stub target {} '{}'", stub.id, stub.name);
                self.stubs.entry(stub.id).or_insert(stub);
            }
            self.put_edge(edge.clone());
            events.push(OutlineEvent::LinkAdded(edge));
        }
        events
    }

    /// Drop every edge touching `id`, in both directions, plus its stub row
    /// if it was one. Called when a block or page leaves the store.
    pub fn remove_entity(&mut self, id: Nid) -> Vec<OutlineEvent> {
        let mut events = Vec::new();
        for edge in self.forward.remove(&id).unwrap_or_default() {
            Self::detach(&mut self.backlinks, edge.target, &edge);
            self.discard_freed_stub(edge.target);
            events.push(OutlineEvent::LinkRemoved(edge));
        }
        for edge in self.backlinks.remove(&id).unwrap_or_default() {
            if edge.source == id {
                // self edge, already reported by the forward pass
                continue;
            }
            Self::detach(&mut self.forward, edge.source, &edge);
            events.push(OutlineEvent::LinkRemoved(edge));
        }
        self.stubs.remove(&id);
        events
    }

    pub fn clear(&mut self) {
        self.forward.clear();
        self.backlinks.clear();
        self.stubs.clear();
    }

    /// Load a persisted edge set wholesale, replacing current state. The
    /// caller audits afterwards and falls back to a rebuild when the
    /// snapshot disagrees with the store.
    pub fn install_snapshot(&mut self, edges: Vec<LinkEdge>, stubs: Vec<StubTarget>) {
        self.clear();
        for edge in edges {
            self.put_edge(edge);
        }
        for stub in stubs {
            self.stubs.insert(stub.id, stub);
        }
    }

    fn resolve(store: &BlockStore, targets_block: bool, raw: &str) -> Option<Resolution> {
        if targets_block {
            // malformed id text is not a reference
            let id = Nid::try_from(raw.trim()).ok()?;
            let stub = store.block(id).is_none().then(|| StubTarget::for_block(id));
            return Some(Resolution {
                target: id,
                target_type: NodeType::Block,
                stub,
            });
        }
        let name = normalize_page_name(raw);
        if name.is_empty() {
            return None;
        }
        match store.page_by_name(&name) {
            Some(page) => Some(Resolution {
                target: page.id,
                target_type: NodeType::Page,
                stub: None,
            }),
            None => {
                let stub = StubTarget::for_page(name);
                Some(Resolution {
                    target: stub.id,
                    target_type: NodeType::Page,
                    stub: Some(stub),
                })
            }
        }
    }

    /// File an edge under both maps. `replace` so a payload refresh of an
    /// existing identity wins over the stale copy.
    fn put_edge(&mut self, edge: LinkEdge) {
        self.backlinks.entry(edge.target).or_default().replace(edge.clone());
        self.forward.entry(edge.source).or_default().replace(edge);
    }

    fn drop_edge(&mut self, edge: LinkEdge, events: &mut Vec<OutlineEvent>) {
        Self::detach(&mut self.forward, edge.source, &edge);
        Self::detach(&mut self.backlinks, edge.target, &edge);
        self.discard_freed_stub(edge.target);
        events.push(OutlineEvent::LinkRemoved(edge));
    }

    fn detach(map: &mut BTreeMap<Nid, BTreeSet<LinkEdge>>, key: Nid, edge: &LinkEdge) {
        if let Some(set) = map.get_mut(&key) {
            set.remove(edge);
            if set.is_empty() {
                map.remove(&key);
            }
        }
    }

    fn discard_freed_stub(&mut self, target: Nid) {
        if !self.backlinks.contains_key(&target) {
            if let Some(stub) = self.stubs.remove(&target) {
                tracing::trace!("discarding unreferenced stub {} '{}'", stub.id, stub.name);
            }
        }
    }

    // ------------------------------------------------------------------
    // Audit

    /// Invariant sweep over the two maps: every edge present in exactly both
    /// directions with matching payload, every stub referenced and carrying
    /// its deterministic id. Empty when the index is sound.
    pub fn audit(&self) -> Vec<String> {
        let mut findings = Vec::new();
        for (source, edges) in &self.forward {
            for edge in edges {
                if edge.source != *source {
                    findings.push(format!("edge {edge} filed under foreign source {source}"));
                }
                if edge.occurrences == 0 {
                    findings.push(format!("edge {edge} has zero occurrences"));
                }
                if edge.strength != edge_strength(edge.kind, edge.occurrences) {
                    findings.push(format!("edge {edge} carries a stale strength"));
                }
                match self.backlinks.get(&edge.target).and_then(|set| set.get(edge)) {
                    None => findings.push(format!("edge {edge} has no backlink mirror")),
                    Some(mirror) if mirror.occurrences != edge.occurrences => {
                        findings.push(format!("edge {edge} disagrees with its mirror on payload"))
                    }
                    _ => {}
                }
            }
        }
        for (target, edges) in &self.backlinks {
            for edge in edges {
                if edge.target != *target {
                    findings.push(format!("edge {edge} filed under foreign target {target}"));
                }
                if self.forward.get(&edge.source).map_or(true, |set| !set.contains(edge)) {
                    findings.push(format!("edge {edge} has no forward mirror"));
                }
            }
        }
        for (id, stub) in &self.stubs {
            if *id != stub.id {
                findings.push(format!("stub '{}' filed under foreign id {id}", stub.name));
            }
            if stub.node_type == NodeType::Page && stub.id != Nid::for_name(&stub.name) {
                findings.push(format!(
                    "stub '{}' does not carry its deterministic id",
                    stub.name
                ));
            }
            if self.backlink_count(*id) == 0 {
                findings.push(format!("stub '{}' has no referring edges", stub.name));
            }
        }
        findings
    }

    /// Test support: file an edge on the forward side only, so the audit has
    /// something to find.
    #[cfg(test)]
    pub(crate) fn force_forward_only(&mut self, edge: LinkEdge) {
        self.forward.entry(edge.source).or_default().replace(edge);
    }
}
