//! The engine facade: one workspace, one writer, many readers.
//!
//! [`Workspace`] owns the block tree, the link index and the navigator
//! behind a single `Arc<RwLock>`: every mutation runs inside one writer
//! section so multi-structure operations (tree pointers, order keys, both
//! edge maps) appear atomic to readers, and reads clone out small values
//! without ever blocking behind another reader. Events broadcast after the
//! guard drops; persistence rows stream out fire-and-forget over an
//! unbounded channel. Bulk work (restore, import, index rebuild) is chunked
//! and yields between chunks so the writer section is never held for
//! unbounded time, and it checks a [`CancelToken`] at every chunk boundary.

use parking_lot::RwLock;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::sync::{broadcast, mpsc::UnboundedSender};

use crate::{
    config::WorkspaceConfig,
    error::RamifyError,
    event::{EventBus, OutlineEvent, EVENT_CHANNEL_CAPACITY},
    graph::{GraphBuilder, GraphQuery, GraphView},
    index::{LinkGraphIndex, StubTarget},
    navigator::{paste_subtree, BlockNavigator, ClipSubtree, NavOutcome, Selection},
    parser::normalize_page_name,
    properties::{Block, DeletePolicy, LinkEdge, Nid, Page},
    storage::{EdgeSnapshot, StoreDelta},
    store::{BlockStore, TreeDelta},
};

pub type SharedLock<T> = Arc<RwLock<T>>;

/// Cooperative cancellation flag for bulk operations, checked at chunk
/// boundaries only, so cancelling never leaves a chunk half-applied.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug)]
struct WorkspaceState {
    store: BlockStore,
    index: LinkGraphIndex,
    nav: BlockNavigator,
    ops_since_audit: u64,
    rebuild_needed: bool,
}

/// A single outline workspace: block tree, link index, selection, event bus.
///
/// Cloning yields another handle onto the same workspace; independent
/// workspaces in one process each carry their own bus, so they never
/// cross-talk.
#[derive(Clone)]
pub struct Workspace {
    state: SharedLock<WorkspaceState>,
    events: EventBus,
    persist: Option<UnboundedSender<StoreDelta>>,
    config: WorkspaceConfig,
}

impl Default for Workspace {
    fn default() -> Self {
        Workspace::new(WorkspaceConfig::default())
    }
}

impl Workspace {
    pub fn new(config: WorkspaceConfig) -> Self {
        let config = config.sanitized();
        Workspace {
            state: Arc::new(RwLock::new(WorkspaceState {
                store: BlockStore::new(config.max_depth),
                index: LinkGraphIndex::new(),
                nav: BlockNavigator::new(Nid::nil()),
                ops_since_audit: 0,
                rebuild_needed: false,
            })),
            events: EventBus::new(EVENT_CHANNEL_CAPACITY),
            persist: None,
            config,
        }
    }

    /// Attach the storage collaborator's intake. Every later mutation
    /// streams its delta rows here; a dropped receiver is tolerated and
    /// merely stops the stream.
    pub fn with_persistence(mut self, tx: UnboundedSender<StoreDelta>) -> Self {
        self.persist = Some(tx);
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OutlineEvent> {
        self.events.subscribe()
    }

    pub fn config(&self) -> &WorkspaceConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Pages

    pub fn create_page(&self, name: &str) -> Result<Page, RamifyError> {
        let mut events = Vec::new();
        let page = {
            let mut guard = self.state.write();
            let state = &mut *guard;
            let page = state.store.create_page(name)?;
            self.feed(StoreDelta::UpsertPage(page.clone()));
            // a stub with this name now resolves; re-derive its referrers
            let stub_id = Nid::for_name(&normalize_page_name(name));
            if state.index.stub(stub_id).is_some() {
                events.extend(reresolve(state, stub_id));
            }
            Self::bump_audit(state, self.config.audit_cadence);
            page
        };
        self.events.emit_all(events);
        Ok(page)
    }

    pub fn rename_page(&self, id: Nid, name: &str) -> Result<Page, RamifyError> {
        let mut events = Vec::new();
        let page = {
            let mut guard = self.state.write();
            let state = &mut *guard;
            let page = state.store.rename_page(id, name)?;
            self.feed(StoreDelta::UpsertPage(page.clone()));
            // referrers of the page itself may now miss; referrers of the
            // new name's stub may now hit
            events.extend(reresolve(state, id));
            let stub_id = Nid::for_name(&normalize_page_name(name));
            if state.index.stub(stub_id).is_some() {
                events.extend(reresolve(state, stub_id));
            }
            Self::bump_audit(state, self.config.audit_cadence);
            page
        };
        self.events.emit_all(events);
        Ok(page)
    }

    pub fn delete_page(&self, id: Nid) -> Result<Vec<Nid>, RamifyError> {
        let mut events = Vec::new();
        let removed = {
            let mut guard = self.state.write();
            let state = &mut *guard;
            let (removed, _page) = state.store.delete_page(id)?;
            let mut link_events = state.index.remove_entity(id);
            for rid in &removed {
                link_events.extend(state.index.remove_entity(*rid));
            }
            if state.nav.page() == id {
                state.nav.set_page(Nid::nil());
            } else {
                state.nav.prune_deleted(&state.store);
            }
            self.feed(StoreDelta::RemoveBlocks(removed.clone()));
            self.feed(StoreDelta::RemovePage(id));
            events.push(OutlineEvent::BlocksDeleted(removed.clone(), id));
            events.extend(link_events);
            Self::bump_audit(state, self.config.audit_cadence);
            removed
        };
        self.events.emit_all(events);
        Ok(removed)
    }

    // ------------------------------------------------------------------
    // Blocks

    /// Insert a block under `parent` (a block id, or a page id for a root
    /// insert) at sibling position `index`, deriving link edges from its
    /// content in the same writer section.
    pub fn create_block(
        &self,
        parent: Nid,
        index: usize,
        content: &str,
    ) -> Result<Block, RamifyError> {
        let mut events = Vec::new();
        let block = {
            let mut guard = self.state.write();
            let state = &mut *guard;
            let (block, delta) = state.store.create_block(parent, index, content)?;
            let link_events = state.index.update_block_links(&state.store, block.id, content);
            self.feed_delta(state, &delta);
            events.push(OutlineEvent::BlocksCreated(vec![block.id], block.page));
            events.extend(link_events);
            Self::bump_audit(state, self.config.audit_cadence);
            block
        };
        self.events.emit_all(events);
        Ok(block)
    }

    /// Replace a block's content and reconcile its derived edges. Identical
    /// content changes nothing and emits nothing.
    pub fn update_content(&self, id: Nid, content: &str) -> Result<Block, RamifyError> {
        let mut events = Vec::new();
        let block = {
            let mut guard = self.state.write();
            let state = &mut *guard;
            let (block, delta) = state.store.update_content(id, content)?;
            if delta.is_empty() {
                return Ok(block);
            }
            let link_events = state.index.update_block_links(&state.store, id, content);
            self.feed_delta(state, &delta);
            events.push(OutlineEvent::BlockUpdated(id, content.to_string()));
            events.extend(link_events);
            Self::bump_audit(state, self.config.audit_cadence);
            block
        };
        self.events.emit_all(events);
        Ok(block)
    }

    /// Reparent a block. `Ok(false)` means the block already sat there.
    pub fn move_block(
        &self,
        id: Nid,
        new_parent: Nid,
        new_index: usize,
    ) -> Result<bool, RamifyError> {
        let mut events = Vec::new();
        let moved = {
            let mut guard = self.state.write();
            let state = &mut *guard;
            match state.store.move_block(id, new_parent, new_index)? {
                Some(delta) => {
                    let page = state.store.page_of(id).unwrap_or_else(Nid::nil);
                    self.feed_delta(state, &delta);
                    events.push(OutlineEvent::BlocksMoved(vec![id], page));
                    Self::bump_audit(state, self.config.audit_cadence);
                    true
                }
                None => false,
            }
        };
        self.events.emit_all(events);
        Ok(moved)
    }

    /// Delete a block under an explicit policy, retracting every edge that
    /// touched the removed rows.
    pub fn delete_block(&self, id: Nid, policy: DeletePolicy) -> Result<Vec<Nid>, RamifyError> {
        let mut events = Vec::new();
        let removed = {
            let mut guard = self.state.write();
            let state = &mut *guard;
            let page = state
                .store
                .page_of(id)
                .ok_or_else(|| RamifyError::NotFound(format!("block {id}")))?;
            let (removed, delta) = state.store.delete_block(id, policy)?;
            let mut link_events = Vec::new();
            for rid in &removed {
                link_events.extend(state.index.remove_entity(*rid));
            }
            state.nav.prune_deleted(&state.store);
            self.feed_delta(state, &delta);
            events.push(OutlineEvent::BlocksDeleted(removed.clone(), page));
            events.extend(link_events);
            Self::bump_audit(state, self.config.audit_cadence);
            removed
        };
        self.events.emit_all(events);
        Ok(removed)
    }

    /// Fold or unfold a block. A view-state change only: no event, but the
    /// row is re-persisted so the fold survives a reload.
    pub fn set_collapsed(&self, id: Nid, collapsed: bool) -> Result<bool, RamifyError> {
        let mut guard = self.state.write();
        let state = &mut *guard;
        let (changed, delta) = state.store.set_collapsed(id, collapsed)?;
        if changed {
            self.feed_delta(state, &delta);
            Self::bump_audit(state, self.config.audit_cadence);
        }
        Ok(changed)
    }

    // ------------------------------------------------------------------
    // Reads

    pub fn page(&self, id: Nid) -> Option<Page> {
        self.state.read().store.page(id).cloned()
    }

    pub fn page_by_name(&self, name: &str) -> Option<Page> {
        self.state.read().store.page_by_name(name).cloned()
    }

    pub fn pages(&self) -> Vec<Page> {
        self.state.read().store.pages().cloned().collect()
    }

    pub fn block(&self, id: Nid) -> Option<Block> {
        self.state.read().store.block(id).cloned()
    }

    pub fn block_count(&self) -> usize {
        self.state.read().store.block_count()
    }

    pub fn get_children(&self, id: Nid) -> Result<Vec<Nid>, RamifyError> {
        Ok(self.state.read().store.get_children(id)?.to_vec())
    }

    pub fn get_path(&self, id: Nid) -> Result<Vec<Nid>, RamifyError> {
        self.state.read().store.get_path(id)
    }

    pub fn visible_order(&self, page: Nid) -> Result<Vec<Nid>, RamifyError> {
        self.state.read().store.visible_order(page)
    }

    pub fn backlinks(&self, id: Nid) -> Vec<LinkEdge> {
        self.state.read().index.backlinks(id)
    }

    pub fn forward_links(&self, id: Nid) -> Vec<LinkEdge> {
        self.state.read().index.forward_links(id)
    }

    pub fn stub(&self, id: Nid) -> Option<StubTarget> {
        self.state.read().index.stub(id).cloned()
    }

    pub fn edge_count(&self) -> usize {
        self.state.read().index.edge_count()
    }

    pub fn selection(&self) -> Selection {
        self.state.read().nav.selection().clone()
    }

    pub fn focused_page(&self) -> Nid {
        self.state.read().nav.page()
    }

    pub fn clipboard_len(&self) -> usize {
        self.state.read().nav.clipboard_len()
    }

    pub fn rebuild_needed(&self) -> bool {
        self.state.read().rebuild_needed
    }

    // ------------------------------------------------------------------
    // Selection and navigation

    pub fn focus_page(&self, page: Nid) -> Result<(), RamifyError> {
        let mut guard = self.state.write();
        let state = &mut *guard;
        if state.store.page(page).is_none() {
            return Err(RamifyError::NotFound(format!("page {page}")));
        }
        state.nav.set_page(page);
        Ok(())
    }

    pub fn select_block(&self, id: Nid, extend: bool) -> Result<(), RamifyError> {
        self.selection_op(|nav, store| nav.select_block(store, id, extend))
    }

    pub fn toggle_block(&self, id: Nid) -> Result<(), RamifyError> {
        self.selection_op(|nav, store| nav.toggle_block(store, id))
    }

    pub fn clear_selection(&self) -> Result<(), RamifyError> {
        self.selection_op(|nav, _| Ok(nav.clear_selection()))
    }

    pub fn select_first(&self) -> Result<(), RamifyError> {
        self.selection_op(|nav, store| nav.select_first(store))
    }

    pub fn select_last(&self) -> Result<(), RamifyError> {
        self.selection_op(|nav, store| nav.select_last(store))
    }

    pub fn select_next(&self) -> Result<(), RamifyError> {
        self.selection_op(|nav, store| nav.select_next(store))
    }

    pub fn select_previous(&self) -> Result<(), RamifyError> {
        self.selection_op(|nav, store| nav.select_previous(store))
    }

    fn selection_op<F>(&self, op: F) -> Result<(), RamifyError>
    where
        F: FnOnce(&mut BlockNavigator, &BlockStore) -> Result<bool, RamifyError>,
    {
        let mut event = None;
        {
            let mut guard = self.state.write();
            let state = &mut *guard;
            if op(&mut state.nav, &state.store)? {
                let selection = state.nav.selection();
                event = Some(OutlineEvent::SelectionChanged(
                    selection.mode,
                    selection.ids.clone(),
                ));
            }
        }
        if let Some(event) = event {
            self.events.emit(event);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Structural gestures

    /// Indent the selection. One `block:moved` event for the whole gesture;
    /// an impossible gesture affects nothing and emits nothing.
    pub fn indent(&self) -> Result<usize, RamifyError> {
        self.moving_gesture(BlockNavigator::indent)
    }

    pub fn outdent(&self) -> Result<usize, RamifyError> {
        self.moving_gesture(BlockNavigator::outdent)
    }

    pub fn move_up(&self) -> Result<usize, RamifyError> {
        self.moving_gesture(BlockNavigator::move_up)
    }

    pub fn move_down(&self) -> Result<usize, RamifyError> {
        self.moving_gesture(BlockNavigator::move_down)
    }

    fn moving_gesture<F>(&self, gesture: F) -> Result<usize, RamifyError>
    where
        F: FnOnce(&mut BlockNavigator, &mut BlockStore) -> Result<NavOutcome, RamifyError>,
    {
        let mut events = Vec::new();
        let affected = {
            let mut guard = self.state.write();
            let state = &mut *guard;
            let outcome = gesture(&mut state.nav, &mut state.store)?;
            if !outcome.is_noop() {
                self.feed_outcome(state, &outcome);
                events.push(OutlineEvent::BlocksMoved(
                    outcome.affected.clone(),
                    state.nav.page(),
                ));
                Self::bump_audit(state, self.config.audit_cadence);
            }
            outcome.affected.len()
        };
        self.events.emit_all(events);
        Ok(affected)
    }

    /// Deep-clone the selected subtrees, re-deriving link edges for every
    /// clone from its own content.
    pub fn duplicate(&self) -> Result<Vec<Nid>, RamifyError> {
        self.creating_gesture(BlockNavigator::duplicate)
    }

    /// Clone the clipboard after the focused block. Empty clipboard is a
    /// validation error; empty selection is a quiet no-op.
    pub fn paste(&self) -> Result<Vec<Nid>, RamifyError> {
        self.creating_gesture(BlockNavigator::paste)
    }

    fn creating_gesture<F>(&self, gesture: F) -> Result<Vec<Nid>, RamifyError>
    where
        F: FnOnce(&mut BlockNavigator, &mut BlockStore) -> Result<NavOutcome, RamifyError>,
    {
        let mut events = Vec::new();
        let created = {
            let mut guard = self.state.write();
            let state = &mut *guard;
            let outcome = gesture(&mut state.nav, &mut state.store)?;
            if !outcome.is_noop() {
                events.push(OutlineEvent::BlocksCreated(
                    outcome.created.clone(),
                    state.nav.page(),
                ));
                for id in &outcome.created {
                    if let Some(content) = state.store.block(*id).map(|b| b.content.clone()) {
                        events.extend(state.index.update_block_links(&state.store, *id, &content));
                    }
                }
                self.feed_outcome(state, &outcome);
                Self::bump_audit(state, self.config.audit_cadence);
            }
            outcome.created
        };
        self.events.emit_all(events);
        Ok(created)
    }

    /// Cascade-delete the selection.
    pub fn delete_selection(&self) -> Result<Vec<Nid>, RamifyError> {
        let mut events = Vec::new();
        let removed = {
            let mut guard = self.state.write();
            let state = &mut *guard;
            let outcome = state.nav.delete_selection(&mut state.store)?;
            if !outcome.is_noop() {
                events.push(OutlineEvent::BlocksDeleted(
                    outcome.removed.clone(),
                    state.nav.page(),
                ));
                for id in &outcome.removed {
                    events.extend(state.index.remove_entity(*id));
                }
                self.feed_outcome(state, &outcome);
                Self::bump_audit(state, self.config.audit_cadence);
            }
            outcome.removed
        };
        self.events.emit_all(events);
        Ok(removed)
    }

    /// Snapshot the selection onto the clipboard. Pure read plus an internal
    /// buffer swap; emits nothing.
    pub fn copy(&self) -> Result<usize, RamifyError> {
        let mut guard = self.state.write();
        let state = &mut *guard;
        state.nav.copy(&state.store)
    }

    /// Backspace on an empty focused block: delete it, promote any children,
    /// focus the previous visible block.
    pub fn backspace_merge(&self) -> Result<usize, RamifyError> {
        let mut events = Vec::new();
        let affected = {
            let mut guard = self.state.write();
            let state = &mut *guard;
            let outcome = state.nav.backspace_merge(&mut state.store)?;
            if !outcome.is_noop() {
                events.push(OutlineEvent::BlocksDeleted(
                    outcome.removed.clone(),
                    state.nav.page(),
                ));
                for id in &outcome.removed {
                    events.extend(state.index.remove_entity(*id));
                }
                self.feed_outcome(state, &outcome);
                Self::bump_audit(state, self.config.audit_cadence);
            }
            outcome.affected.len()
        };
        self.events.emit_all(events);
        Ok(affected)
    }

    // ------------------------------------------------------------------
    // Graph

    /// Extract a bounded neighborhood view around `center`, all edge kinds.
    pub fn build_graph(
        &self,
        center: Nid,
        depth: usize,
        max_nodes: usize,
    ) -> Result<GraphView, RamifyError> {
        self.build_graph_with(
            center,
            &GraphQuery {
                depth,
                max_nodes,
                ..Default::default()
            },
        )
    }

    /// The workspace's configured default graph bounds, for callers that
    /// want `build_graph_with` without inventing their own query.
    pub fn graph_query(&self) -> GraphQuery {
        GraphQuery {
            depth: self.config.graph.depth,
            max_nodes: self.config.graph.max_nodes,
            ..Default::default()
        }
    }

    pub fn build_graph_with(
        &self,
        center: Nid,
        query: &GraphQuery,
    ) -> Result<GraphView, RamifyError> {
        let view = {
            let guard = self.state.read();
            GraphBuilder::build(&guard.store, &guard.index, center, query)?
        };
        self.events.emit(OutlineEvent::GraphBuilt(
            center,
            view.nodes.len(),
            view.edges.len(),
        ));
        Ok(view)
    }

    // ------------------------------------------------------------------
    // Audit and rebuild

    /// Run the structural and index invariant sweeps now. Findings mark the
    /// workspace for rebuild and come back as a consistency error.
    pub fn audit(&self) -> Result<(), RamifyError> {
        let mut guard = self.state.write();
        let state = &mut *guard;
        state.ops_since_audit = 0;
        let findings = Self::sweep(state);
        if findings.is_empty() {
            return Ok(());
        }
        state.rebuild_needed = true;
        Err(RamifyError::Consistency(findings.join("; ")))
    }

    fn sweep(state: &WorkspaceState) -> Vec<String> {
        let mut findings = state.store.self_check();
        findings.extend(state.index.audit());
        for finding in &findings {
            tracing::error!("workspace audit: {finding}");
        }
        findings
    }

    fn bump_audit(state: &mut WorkspaceState, cadence: u64) {
        state.ops_since_audit += 1;
        if state.ops_since_audit < cadence {
            return;
        }
        state.ops_since_audit = 0;
        if !Self::sweep(state).is_empty() {
            state.rebuild_needed = true;
        }
    }

    /// Throw away the link index and re-derive it from block content,
    /// chunk by chunk. Yields between chunks and honors `cancel` at chunk
    /// boundaries; a cancelled rebuild leaves whole chunks applied and the
    /// rebuild flag still set. Each chunk re-reads its rows from the store,
    /// so an edit landing between chunks is indexed from its new text.
    /// Re-derivation emits no link events: the bus would drown, and
    /// subscribers treat a rebuild as a fresh world anyway.
    pub async fn rebuild_index(&self, cancel: &CancelToken) -> Result<usize, RamifyError> {
        let ids: Vec<Nid> = {
            let guard = self.state.read();
            guard.store.blocks().map(|b| b.id).collect()
        };
        {
            let mut guard = self.state.write();
            guard.index.clear();
        }
        tracing::info!("rebuilding link index over {} blocks", ids.len());
        let mut indexed = 0;
        for chunk in ids.chunks(self.config.chunk_size) {
            if cancel.is_cancelled() {
                tracing::warn!("index rebuild cancelled after {indexed} blocks");
                return Err(RamifyError::OperationCancelled);
            }
            {
                let mut guard = self.state.write();
                let state = &mut *guard;
                for id in chunk {
                    // current text, not the pre-clear listing; rows deleted
                    // since the listing was taken simply skip
                    if let Some(content) = state.store.block(*id).map(|b| b.content.clone()) {
                        let _ = state.index.update_block_links(&state.store, *id, &content);
                    }
                }
            }
            indexed += chunk.len();
            tokio::task::yield_now().await;
        }
        self.state.write().rebuild_needed = false;
        Ok(indexed)
    }

    /// Bulk-insert an outline forest under a page's root level, appending
    /// after any existing roots. Chunked by whole subtrees; emits one
    /// `block:created` per chunk instead of per block, and derives link
    /// edges quietly like a rebuild.
    pub async fn import_outline(
        &self,
        page: Nid,
        forest: Vec<ClipSubtree>,
        cancel: &CancelToken,
    ) -> Result<Vec<Nid>, RamifyError> {
        if self.state.read().store.page(page).is_none() {
            return Err(RamifyError::NotFound(format!("page {page}")));
        }
        let mut created = Vec::new();
        let per_chunk = self.config.chunk_size;
        let mut pending = forest.as_slice();
        while !pending.is_empty() {
            if cancel.is_cancelled() {
                tracing::warn!("import cancelled after {} blocks", created.len());
                return Err(RamifyError::OperationCancelled);
            }
            // take whole subtrees up to roughly a chunk of blocks
            let mut take = 0;
            let mut budget = 0;
            for clip in pending {
                take += 1;
                budget += clip.block_count();
                if budget >= per_chunk {
                    break;
                }
            }
            let (batch, rest) = pending.split_at(take);
            pending = rest;
            let chunk_created = {
                let mut guard = self.state.write();
                let state = &mut *guard;
                let mut outcome = NavOutcome::default();
                for clip in batch {
                    let at = state.store.get_children(page)?.len();
                    paste_subtree(&mut state.store, clip, page, at, &mut outcome)?;
                }
                for id in &outcome.created {
                    if let Some(content) = state.store.block(*id).map(|b| b.content.clone()) {
                        let _ = state.index.update_block_links(&state.store, *id, &content);
                    }
                }
                self.feed_outcome(state, &outcome);
                outcome.created
            };
            self.events
                .emit(OutlineEvent::BlocksCreated(chunk_created.clone(), page));
            created.extend(chunk_created);
            tokio::task::yield_now().await;
        }
        Ok(created)
    }

    /// Bootstrap a workspace from persisted rows. Blocks must arrive
    /// parents-before-children per page, the order the storage collaborator
    /// saves them in. With a healthy snapshot the index installs wholesale;
    /// a missing or unsound snapshot falls back to a full rebuild, since
    /// content is the record of truth and the snapshot only a cache.
    pub async fn restore(
        &self,
        pages: Vec<Page>,
        blocks: Vec<Block>,
        snapshot: Option<EdgeSnapshot>,
        cancel: &CancelToken,
    ) -> Result<(), RamifyError> {
        {
            let mut guard = self.state.write();
            for page in pages {
                guard.store.insert_restored_page(page)?;
            }
        }
        for chunk in blocks.chunks(self.config.chunk_size) {
            if cancel.is_cancelled() {
                return Err(RamifyError::OperationCancelled);
            }
            {
                let mut guard = self.state.write();
                for block in chunk {
                    guard.store.insert_restored(block.clone())?;
                }
            }
            tokio::task::yield_now().await;
        }
        let installed = match snapshot {
            Some(snapshot) => {
                let mut guard = self.state.write();
                let state = &mut *guard;
                state.index.install_snapshot(snapshot.edges, snapshot.stubs);
                let findings = state.index.audit();
                if findings.is_empty() {
                    true
                } else {
                    tracing::warn!(
                        "edge snapshot failed its audit ({} findings), rebuilding",
                        findings.len()
                    );
                    state.index.clear();
                    false
                }
            }
            None => false,
        };
        if !installed {
            self.rebuild_index(cancel).await?;
        }
        Ok(())
    }

    /// Capture the link index for the storage collaborator's snapshot slot.
    pub fn edge_snapshot(&self) -> EdgeSnapshot {
        EdgeSnapshot::capture(&self.state.read().index)
    }

    // ------------------------------------------------------------------
    // Persistence feed

    fn feed(&self, delta: StoreDelta) {
        if let Some(tx) = &self.persist {
            if let Err(err) = tx.send(delta) {
                tracing::warn!("persistence receiver is gone, dropping {}", err.0);
            }
        }
    }

    fn feed_delta(&self, state: &WorkspaceState, delta: &TreeDelta) {
        if self.persist.is_none() || delta.is_empty() {
            return;
        }
        for id in &delta.touched {
            if let Some(block) = state.store.block(*id) {
                self.feed(StoreDelta::UpsertBlock(block.clone()));
            }
        }
        if !delta.removed.is_empty() {
            self.feed(StoreDelta::RemoveBlocks(delta.removed.clone()));
        }
    }

    fn feed_outcome(&self, state: &WorkspaceState, outcome: &NavOutcome) {
        if self.persist.is_none() {
            return;
        }
        for id in outcome.touched.iter().chain(&outcome.created) {
            if let Some(block) = state.store.block(*id) {
                self.feed(StoreDelta::UpsertBlock(block.clone()));
            }
        }
        if !outcome.removed.is_empty() {
            self.feed(StoreDelta::RemoveBlocks(outcome.removed.clone()));
        }
    }
}

fn reresolve(state: &mut WorkspaceState, target: Nid) -> Vec<OutlineEvent> {
    let mut events = Vec::new();
    for source in state.index.sources_referencing(target) {
        if let Some(content) = state.store.block(source).map(|b| b.content.clone()) {
            events.extend(state.index.update_block_links(&state.store, source, &content));
        }
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn ops_since_audit(ws: &Workspace) -> u64 {
        ws.state.read().ops_since_audit
    }

    #[test]
    fn test_fold_counts_toward_audit_cadence() {
        let ws = Workspace::new(WorkspaceConfig {
            audit_cadence: 3,
            ..WorkspaceConfig::default()
        });
        let page = ws.create_page("Notes").unwrap();
        let block = ws.create_block(page.id, 0, "fold me").unwrap();
        assert_eq!(ops_since_audit(&ws), 2);

        // a real fold is the third mutation and completes the cadence
        assert!(ws.set_collapsed(block.id, true).unwrap());
        assert_eq!(ops_since_audit(&ws), 0);
        assert!(!ws.rebuild_needed());

        // folding an already folded block changes nothing and counts nothing
        assert!(!ws.set_collapsed(block.id, true).unwrap());
        assert_eq!(ops_since_audit(&ws), 0);

        assert!(ws.set_collapsed(block.id, false).unwrap());
        assert_eq!(ops_since_audit(&ws), 1);
    }
}
