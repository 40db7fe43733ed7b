use petgraph::{algo::kosaraju_scc, graph::NodeIndex, Graph};
use std::collections::{BTreeMap, BTreeSet};

use crate::{
    config::DEFAULT_MAX_DEPTH,
    error::RamifyError,
    parser::normalize_page_name,
    properties::{Block, DeletePolicy, Nid, NodeType, OrderKey, Page},
    store::order::{insertion_key, rebalanced_keys, spread_keys},
};

/// Rows changed by one tree mutation: `touched` rows need re-persisting,
/// `removed` rows are gone. Collected so the engine can forward exact deltas
/// to its storage collaborator without re-reading the tree.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TreeDelta {
    pub touched: BTreeSet<Nid>,
    /// Deleted block ids in pre-order.
    pub removed: Vec<Nid>,
}

impl TreeDelta {
    pub fn touch(&mut self, id: Nid) {
        self.touched.insert(id);
    }

    pub fn merge(&mut self, other: TreeDelta) {
        self.touched.extend(other.touched);
        self.removed.extend(other.removed);
    }

    pub fn is_empty(&self) -> bool {
        self.touched.is_empty() && self.removed.is_empty()
    }
}

/// The canonical block tree of one workspace: an arena of blocks addressed
/// by stable ids, ordered sibling lists, and the page registry.
///
/// The children map is keyed by the parent id, which names either a block or
/// a page; a page key holds that page's root blocks. Sibling vectors are
/// kept sorted by order key at all times. The store emits no events and
/// holds no locks; serialization of writers is the engine's job.
#[derive(Debug, Clone)]
pub struct BlockStore {
    pages: BTreeMap<Nid, Page>,
    /// Normalized page name -> page id.
    names: BTreeMap<String, Nid>,
    blocks: BTreeMap<Nid, Block>,
    children: BTreeMap<Nid, Vec<Nid>>,
    max_depth: usize,
}

impl Default for BlockStore {
    fn default() -> Self {
        BlockStore::new(DEFAULT_MAX_DEPTH)
    }
}

impl BlockStore {
    pub fn new(max_depth: usize) -> Self {
        BlockStore {
            pages: BTreeMap::new(),
            names: BTreeMap::new(),
            blocks: BTreeMap::new(),
            children: BTreeMap::new(),
            max_depth: max_depth.max(1),
        }
    }

    // ------------------------------------------------------------------
    // Page registry

    /// Register a page. The display name is kept as entered (trimmed);
    /// lookups go through the normalized form, so names that differ only in
    /// case or whitespace collide.
    pub fn create_page(&mut self, name: &str) -> Result<Page, RamifyError> {
        let display_name = name.trim();
        let key = normalize_page_name(display_name);
        if key.is_empty() {
            return Err(RamifyError::Validation("page name is empty".to_string()));
        }
        if self.names.contains_key(&key) {
            return Err(RamifyError::Validation(format!(
                "page '{display_name}' already exists"
            )));
        }
        let page = Page::new(display_name);
        tracing::debug!("create_page {} '{display_name}'", page.id);
        self.names.insert(key, page.id);
        self.pages.insert(page.id, page.clone());
        Ok(page)
    }

    pub fn rename_page(&mut self, id: Nid, name: &str) -> Result<Page, RamifyError> {
        let display = name.trim();
        let new_key = normalize_page_name(display);
        if new_key.is_empty() {
            return Err(RamifyError::Validation("page name is empty".to_string()));
        }
        let page = self
            .pages
            .get_mut(&id)
            .ok_or_else(|| RamifyError::NotFound(format!("page {id}")))?;
        if let Some(holder) = self.names.get(&new_key) {
            if *holder != id {
                return Err(RamifyError::Validation(format!(
                    "page '{display}' already exists"
                )));
            }
        }
        self.names.remove(&normalize_page_name(&page.name));
        self.names.insert(new_key, id);
        page.name = display.to_string();
        page.updated_at = chrono::Utc::now();
        Ok(page.clone())
    }

    /// Remove a page and every block in its tree. Returns the removed block
    /// ids in pre-order plus the page row.
    pub fn delete_page(&mut self, id: Nid) -> Result<(Vec<Nid>, Page), RamifyError> {
        let page = self
            .pages
            .get(&id)
            .cloned()
            .ok_or_else(|| RamifyError::NotFound(format!("page {id}")))?;
        let removed = self.subtree(id)?;
        for rid in &removed {
            self.blocks.remove(rid);
            self.children.remove(rid);
        }
        self.children.remove(&id);
        self.names.remove(&normalize_page_name(&page.name));
        self.pages.remove(&id);
        tracing::debug!("delete_page {id} removed {} blocks", removed.len());
        Ok((removed, page))
    }

    pub fn page(&self, id: Nid) -> Option<&Page> {
        self.pages.get(&id)
    }

    pub fn page_by_name(&self, name: &str) -> Option<&Page> {
        self.names
            .get(&normalize_page_name(name))
            .and_then(|id| self.pages.get(id))
    }

    pub fn pages(&self) -> impl Iterator<Item = &Page> {
        self.pages.values()
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    // ------------------------------------------------------------------
    // Reads

    pub fn contains(&self, id: Nid) -> bool {
        self.blocks.contains_key(&id) || self.pages.contains_key(&id)
    }

    pub fn node_type(&self, id: Nid) -> Option<NodeType> {
        if self.blocks.contains_key(&id) {
            Some(NodeType::Block)
        } else if self.pages.contains_key(&id) {
            Some(NodeType::Page)
        } else {
            None
        }
    }

    pub fn block(&self, id: Nid) -> Option<&Block> {
        self.blocks.get(&id)
    }

    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks.values()
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// The page an id belongs to: itself for a page id, the owning page for
    /// a block id.
    pub fn page_of(&self, id: Nid) -> Option<Nid> {
        if self.pages.contains_key(&id) {
            Some(id)
        } else {
            self.blocks.get(&id).map(|b| b.page)
        }
    }

    fn require_block(&self, id: Nid) -> Result<&Block, RamifyError> {
        self.blocks
            .get(&id)
            .ok_or_else(|| RamifyError::NotFound(format!("block {id}")))
    }

    /// Children-map key a block files under: its parent block, or its page
    /// for roots.
    fn parent_key(block: &Block) -> Nid {
        block.parent.unwrap_or(block.page)
    }

    /// Ordered direct children of a block or page id.
    pub fn get_children(&self, id: Nid) -> Result<&[Nid], RamifyError> {
        if !self.contains(id) {
            return Err(RamifyError::NotFound(format!("node {id}")));
        }
        Ok(self.children.get(&id).map(Vec::as_slice).unwrap_or(&[]))
    }

    /// Position of a block within its sibling list: (children-map key,
    /// index).
    pub fn sibling_position(&self, id: Nid) -> Result<(Nid, usize), RamifyError> {
        let block = self.require_block(id)?;
        let key = Self::parent_key(block);
        let siblings = self.children.get(&key).map(Vec::as_slice).unwrap_or(&[]);
        let index = siblings.iter().position(|c| *c == id).ok_or_else(|| {
            RamifyError::Consistency(format!("block {id} missing from its sibling list"))
        })?;
        Ok((key, index))
    }

    /// Ancestor chain of a block, root first, ending with the block itself.
    /// A walk past the depth guard reports the tree as inconsistent rather
    /// than looping.
    pub fn get_path(&self, id: Nid) -> Result<Vec<Nid>, RamifyError> {
        let mut block = self.require_block(id)?;
        let mut path = vec![id];
        while let Some(parent) = block.parent {
            if path.len() > self.max_depth {
                return Err(RamifyError::Consistency(format!(
                    "ancestor chain of {id} exceeds depth bound {}",
                    self.max_depth
                )));
            }
            block = self.blocks.get(&parent).ok_or_else(|| {
                RamifyError::Consistency(format!("block {} has dangling parent {parent}", block.id))
            })?;
            path.push(parent);
        }
        path.reverse();
        Ok(path)
    }

    /// Pre-order id list of the subtree under a block or page id, including
    /// the id itself for blocks. Collapse flags are ignored; this is the
    /// structural subtree.
    pub fn subtree(&self, id: Nid) -> Result<Vec<Nid>, RamifyError> {
        if !self.contains(id) {
            return Err(RamifyError::NotFound(format!("node {id}")));
        }
        let mut out = Vec::new();
        let mut stack: Vec<Nid> = if self.blocks.contains_key(&id) {
            vec![id]
        } else {
            // page: start from its roots
            let roots = self.children.get(&id).map(Vec::as_slice).unwrap_or(&[]);
            roots.iter().rev().copied().collect()
        };
        while let Some(next) = stack.pop() {
            out.push(next);
            if let Some(kids) = self.children.get(&next) {
                stack.extend(kids.iter().rev());
            }
        }
        Ok(out)
    }

    /// Flattened visible order of a page: pre-order traversal skipping the
    /// descendants of collapsed blocks. Basis for navigation and range
    /// selection.
    pub fn visible_order(&self, page: Nid) -> Result<Vec<Nid>, RamifyError> {
        if !self.pages.contains_key(&page) {
            return Err(RamifyError::NotFound(format!("page {page}")));
        }
        let mut out = Vec::new();
        let roots = self.children.get(&page).map(Vec::as_slice).unwrap_or(&[]);
        let mut stack: Vec<Nid> = roots.iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            let collapsed = self.blocks.get(&next).map(|b| b.collapsed).unwrap_or(true);
            if !collapsed {
                if let Some(kids) = self.children.get(&next) {
                    stack.extend(kids.iter().rev());
                }
            }
        }
        Ok(out)
    }

    // ------------------------------------------------------------------
    // Mutations

    /// Insert a fresh block under `parent` (a block id, or a page id for a
    /// root insert) at sibling position `index`. An index past the end
    /// appends. Only the new block's key is computed; existing siblings keep
    /// theirs unless precision forces a rebalance.
    pub fn create_block(
        &mut self,
        parent: Nid,
        index: usize,
        content: impl Into<String>,
    ) -> Result<(Block, TreeDelta), RamifyError> {
        let page = self
            .page_of(parent)
            .ok_or_else(|| RamifyError::NotFound(format!("parent {parent}")))?;
        let parent_opt = (parent != page).then_some(parent);
        let mut delta = TreeDelta::default();
        let index = index.min(self.children.get(&parent).map_or(0, Vec::len));
        let order = self.place(parent, index, &mut delta)?;
        let block = Block::new(page, parent_opt, order, content);
        self.children.entry(parent).or_default().insert(index, block.id);
        self.blocks.insert(block.id, block.clone());
        if let Some(pb) = parent_opt {
            if let Some(row) = self.blocks.get_mut(&pb) {
                row.child_count += 1;
            }
            delta.touch(pb);
        }
        delta.touch(block.id);
        Ok((block, delta))
    }

    /// Replace a block's content text. Identical content is reported as an
    /// empty delta so no change event fires.
    pub fn update_content(
        &mut self,
        id: Nid,
        content: impl Into<String>,
    ) -> Result<(Block, TreeDelta), RamifyError> {
        let content = content.into();
        let block = self
            .blocks
            .get_mut(&id)
            .ok_or_else(|| RamifyError::NotFound(format!("block {id}")))?;
        let mut delta = TreeDelta::default();
        if block.content != content {
            block.content = content;
            block.updated_at = chrono::Utc::now();
            delta.touch(id);
        }
        Ok((block.clone(), delta))
    }

    /// Toggle the collapsed flag. Returns whether the flag actually changed.
    pub fn set_collapsed(
        &mut self,
        id: Nid,
        collapsed: bool,
    ) -> Result<(bool, TreeDelta), RamifyError> {
        let block = self
            .blocks
            .get_mut(&id)
            .ok_or_else(|| RamifyError::NotFound(format!("block {id}")))?;
        let mut delta = TreeDelta::default();
        let changed = block.collapsed != collapsed;
        if changed {
            block.collapsed = collapsed;
            block.updated_at = chrono::Utc::now();
            delta.touch(id);
        }
        Ok((changed, delta))
    }

    /// Reparent a block to sibling position `index` under `new_parent` (a
    /// block, or a page id for root level). Fails without mutating when the
    /// destination is the block itself or any of its descendants, or lies in
    /// another page. `Ok(None)` means the block already sat at the requested
    /// position.
    pub fn move_block(
        &mut self,
        id: Nid,
        new_parent: Nid,
        index: usize,
    ) -> Result<Option<TreeDelta>, RamifyError> {
        let block = self.require_block(id)?.clone();
        let target_page = self
            .page_of(new_parent)
            .ok_or_else(|| RamifyError::NotFound(format!("parent {new_parent}")))?;
        if target_page != block.page {
            return Err(RamifyError::Validation(format!(
                "cannot move block {id} across pages"
            )));
        }
        if new_parent == id {
            return Err(RamifyError::Validation(format!(
                "cannot nest block {id} under itself"
            )));
        }
        // ancestor walk: the destination may not live inside the moved subtree
        if self.blocks.contains_key(&new_parent) {
            let mut cursor = new_parent;
            let mut depth = 0usize;
            loop {
                if cursor == id {
                    return Err(RamifyError::Validation(format!(
                        "moving {id} under {new_parent} would create a cycle"
                    )));
                }
                depth += 1;
                if depth > self.max_depth {
                    return Err(RamifyError::Consistency(format!(
                        "ancestor chain of {new_parent} exceeds depth bound {}",
                        self.max_depth
                    )));
                }
                match self.blocks.get(&cursor).and_then(|b| b.parent) {
                    Some(next) => cursor = next,
                    None => break,
                }
            }
        }

        let (old_key, old_index) = self.sibling_position(id)?;
        let new_parent_opt = (new_parent != target_page).then_some(new_parent);

        // detach, then place into the destination list
        self.children
            .get_mut(&old_key)
            .expect("Sibling list exists since sibling_position just searched it")
            .remove(old_index);
        let dest_len = self.children.get(&new_parent).map_or(0, Vec::len);
        let index = index.min(dest_len);
        if old_key == new_parent && index == old_index {
            // no-op: restore and report no movement
            self.children
                .get_mut(&old_key)
                .expect("List still present from the detach above")
                .insert(old_index, id);
            return Ok(None);
        }

        let mut delta = TreeDelta::default();
        let order = self.place(new_parent, index, &mut delta)?;
        self.children.entry(new_parent).or_default().insert(index, id);
        {
            let row = self
                .blocks
                .get_mut(&id)
                .expect("Moved block row exists since require_block found it");
            row.parent = new_parent_opt;
            row.order = order;
            row.updated_at = chrono::Utc::now();
        }
        if old_key != new_parent {
            if let Some(row) = self.blocks.get_mut(&old_key) {
                row.child_count = row.child_count.saturating_sub(1);
                delta.touch(old_key);
            }
            if let Some(row) = self.blocks.get_mut(&new_parent) {
                row.child_count += 1;
                delta.touch(new_parent);
            }
        }
        delta.touch(id);
        Ok(Some(delta))
    }

    /// Swap the order keys (and positions) of two blocks under one parent.
    /// The sibling-only move up/down gestures build on this.
    pub fn swap_siblings(&mut self, a: Nid, b: Nid) -> Result<TreeDelta, RamifyError> {
        let (key_a, idx_a) = self.sibling_position(a)?;
        let (key_b, idx_b) = self.sibling_position(b)?;
        if key_a != key_b {
            return Err(RamifyError::Validation(format!(
                "{a} and {b} are not siblings"
            )));
        }
        let order_a = self.blocks[&a].order;
        let order_b = self.blocks[&b].order;
        {
            let row = self
                .blocks
                .get_mut(&a)
                .expect("Row exists since sibling_position found it");
            row.order = order_b;
            row.updated_at = chrono::Utc::now();
        }
        {
            let row = self
                .blocks
                .get_mut(&b)
                .expect("Row exists since sibling_position found it");
            row.order = order_a;
            row.updated_at = chrono::Utc::now();
        }
        let list = self
            .children
            .get_mut(&key_a)
            .expect("Both blocks are filed under this list");
        list.swap(idx_a, idx_b);
        let mut delta = TreeDelta::default();
        delta.touch(a);
        delta.touch(b);
        Ok(delta)
    }

    /// Remove a block under an explicit subtree policy. Cascade removes the
    /// whole subtree; promote reparents direct children into the deleted
    /// block's former slot, preserving their relative order. Returns the
    /// removed ids in pre-order.
    pub fn delete_block(
        &mut self,
        id: Nid,
        policy: DeletePolicy,
    ) -> Result<(Vec<Nid>, TreeDelta), RamifyError> {
        let block = self.require_block(id)?.clone();
        let parent_key = Self::parent_key(&block);
        let (_, position) = self.sibling_position(id)?;
        let mut delta = TreeDelta::default();
        let removed = match policy {
            DeletePolicy::Cascade => {
                let removed = self.subtree(id)?;
                for rid in &removed {
                    self.blocks.remove(rid);
                    self.children.remove(rid);
                }
                self.children
                    .get_mut(&parent_key)
                    .expect("Sibling list exists since sibling_position found the block")
                    .remove(position);
                removed
            }
            DeletePolicy::Promote => {
                let kids = self.children.remove(&id).unwrap_or_default();
                self.blocks.remove(&id);
                {
                    let list = self
                        .children
                        .get_mut(&parent_key)
                        .expect("Sibling list exists since sibling_position found the block");
                    list.remove(position);
                    list.splice(position..position, kids.iter().copied());
                }
                self.respace(parent_key, position, kids.len(), &mut delta)?;
                for kid in &kids {
                    let row = self.blocks.get_mut(kid).ok_or_else(|| {
                        RamifyError::Consistency(format!("child {kid} of {id} has no row"))
                    })?;
                    row.parent = block.parent;
                    row.updated_at = chrono::Utc::now();
                    delta.touch(*kid);
                }
                vec![id]
            }
        };
        if let Some(pb) = block.parent {
            if let Some(row) = self.blocks.get_mut(&pb) {
                row.child_count = row.child_count.saturating_sub(1);
                if policy == DeletePolicy::Promote {
                    row.child_count += block.child_count;
                }
                delta.touch(pb);
            }
        }
        delta.removed = removed.clone();
        delta.touched.retain(|t| !removed.contains(t));
        tracing::debug!("delete_block {id} policy={policy} removed={}", removed.len());
        Ok((removed, delta))
    }

    /// Re-register a page row exactly as persisted, keeping its id.
    pub fn insert_restored_page(&mut self, page: Page) -> Result<(), RamifyError> {
        if self.pages.contains_key(&page.id) {
            return Err(RamifyError::Validation(format!(
                "page {} already present",
                page.id
            )));
        }
        let key = normalize_page_name(&page.name);
        if key.is_empty() || self.names.contains_key(&key) {
            return Err(RamifyError::Validation(format!(
                "page name '{}' is empty or taken",
                page.name
            )));
        }
        self.names.insert(key, page.id);
        self.pages.insert(page.id, page);
        Ok(())
    }

    /// Re-insert a block row exactly as persisted, preserving id, order key
    /// and flags. Rows must arrive parents-before-children per page.
    pub fn insert_restored(&mut self, block: Block) -> Result<(), RamifyError> {
        if self.blocks.contains_key(&block.id) {
            return Err(RamifyError::Validation(format!(
                "block {} already present",
                block.id
            )));
        }
        if !self.pages.contains_key(&block.page) {
            return Err(RamifyError::Validation(format!(
                "block {} references unknown page {}",
                block.id, block.page
            )));
        }
        if let Some(parent) = block.parent {
            if !self.blocks.contains_key(&parent) {
                return Err(RamifyError::Validation(format!(
                    "block {} arrived before its parent {parent}",
                    block.id
                )));
            }
        }
        let key = Self::parent_key(&block);
        let list = self.children.entry(key).or_default();
        let position = {
            let blocks = &self.blocks;
            list.partition_point(|sib| {
                blocks.get(sib).map(|b| b.order < block.order).unwrap_or(false)
            })
        };
        if let Some(neighbor) = list.get(position) {
            if self.blocks.get(neighbor).map(|b| b.order) == Some(block.order) {
                return Err(RamifyError::Consistency(format!(
                    "duplicate sibling order key {} under {key}",
                    block.order
                )));
            }
        }
        list.insert(position, block.id);
        self.blocks.insert(block.id, block);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Placement internals

    /// Order key for inserting at `index` under `parent`, renumbering the
    /// sibling range first when midpoint precision is exhausted. This is the
    /// only path on which more than one sibling's key changes.
    fn place(
        &mut self,
        parent: Nid,
        index: usize,
        delta: &mut TreeDelta,
    ) -> Result<OrderKey, RamifyError> {
        let keys = self.sibling_keys(parent)?;
        if let Some(key) = insertion_key(&keys, index) {
            return Ok(key);
        }
        self.rebalance(parent, delta)?;
        let keys = self.sibling_keys(parent)?;
        insertion_key(&keys, index).ok_or_else(|| {
            RamifyError::Consistency(format!(
                "no insertion key at index {index} under {parent} after rebalance"
            ))
        })
    }

    fn sibling_keys(&self, parent: Nid) -> Result<Vec<OrderKey>, RamifyError> {
        self.children
            .get(&parent)
            .map(Vec::as_slice)
            .unwrap_or(&[])
            .iter()
            .map(|id| {
                self.blocks.get(id).map(|b| b.order).ok_or_else(|| {
                    RamifyError::Consistency(format!("child {id} of {parent} has no row"))
                })
            })
            .collect()
    }

    /// Renumber every child of `parent` with evenly spaced keys.
    fn rebalance(&mut self, parent: Nid, delta: &mut TreeDelta) -> Result<(), RamifyError> {
        let list = self.children.get(&parent).cloned().unwrap_or_default();
        tracing::debug!("rebalancing {} siblings under {parent}", list.len());
        for (id, key) in list.iter().zip(rebalanced_keys(list.len())) {
            let row = self.blocks.get_mut(id).ok_or_else(|| {
                RamifyError::Consistency(format!("child {id} of {parent} has no row"))
            })?;
            row.order = key;
            delta.touch(*id);
        }
        Ok(())
    }

    /// Give `count` freshly spliced children at `position` under `parent`
    /// keys that fit between their new neighbors, falling back to a full
    /// rebalance when the gap is too tight.
    fn respace(
        &mut self,
        parent: Nid,
        position: usize,
        count: usize,
        delta: &mut TreeDelta,
    ) -> Result<(), RamifyError> {
        if count == 0 {
            return Ok(());
        }
        let list = self.children.get(&parent).cloned().unwrap_or_default();
        let prev = position
            .checked_sub(1)
            .and_then(|i| list.get(i))
            .and_then(|id| self.blocks.get(id))
            .map(|b| b.order);
        let next = list
            .get(position + count)
            .and_then(|id| self.blocks.get(id))
            .map(|b| b.order);
        match spread_keys(prev, next, count) {
            Some(keys) => {
                for (id, key) in list[position..position + count].iter().zip(keys) {
                    let row = self.blocks.get_mut(id).ok_or_else(|| {
                        RamifyError::Consistency(format!("child {id} of {parent} has no row"))
                    })?;
                    row.order = key;
                    delta.touch(*id);
                }
                Ok(())
            }
            None => self.rebalance(parent, delta),
        }
    }

    // ------------------------------------------------------------------
    // Self check

    /// Structural invariant sweep in the style of a built-in test: returns
    /// one finding per violation, empty when the tree is sound.
    pub fn self_check(&self) -> Vec<String> {
        let mut findings = Vec::new();
        for (id, block) in &self.blocks {
            if !self.pages.contains_key(&block.page) {
                findings.push(format!("block {id} references unknown page {}", block.page));
            }
            if let Some(parent) = block.parent {
                if parent == *id {
                    findings.push(format!("block {id} is its own parent"));
                }
                match self.blocks.get(&parent) {
                    None => findings.push(format!("block {id} has dangling parent {parent}")),
                    Some(pb) if pb.page != block.page => {
                        findings.push(format!("block {id} and parent {parent} disagree on page"))
                    }
                    _ => {}
                }
            }
            let key = Self::parent_key(block);
            let membership = self
                .children
                .get(&key)
                .map(|list| list.iter().filter(|c| **c == *id).count())
                .unwrap_or(0);
            if membership != 1 {
                findings.push(format!(
                    "block {id} appears {membership} times in the sibling list of {key}"
                ));
            }
            let kid_count = self.children.get(id).map_or(0, Vec::len);
            if block.child_count != kid_count {
                findings.push(format!(
                    "block {id} caches child_count {} but has {kid_count} children",
                    block.child_count
                ));
            }
        }
        for (parent, kids) in &self.children {
            if !self.contains(*parent) {
                findings.push(format!("children entry for unknown node {parent}"));
                continue;
            }
            for kid in kids {
                if !self.blocks.contains_key(kid) {
                    findings.push(format!("sibling list of {parent} names unknown block {kid}"));
                }
            }
            for pair in kids.windows(2) {
                let (a, b) = (self.blocks.get(&pair[0]), self.blocks.get(&pair[1]));
                if let (Some(a), Some(b)) = (a, b) {
                    if a.order >= b.order {
                        findings.push(format!(
                            "order keys not strictly increasing under {parent}: {} then {}",
                            a.order, b.order
                        ));
                    }
                }
            }
        }
        for (key, pid) in &self.names {
            match self.pages.get(pid) {
                None => findings.push(format!("name '{key}' maps to unknown page {pid}")),
                Some(page) if &normalize_page_name(&page.name) != key => findings.push(format!(
                    "name '{key}' disagrees with page {pid} display name '{}'",
                    page.name
                )),
                _ => {}
            }
        }
        for (pid, page) in &self.pages {
            if self.names.get(&normalize_page_name(&page.name)) != Some(pid) {
                findings.push(format!("page {pid} '{}' missing from name registry", page.name));
            }
        }
        findings.extend(self.cycle_findings());
        findings
    }

    /// Test support: rewrite a parent pointer without going through
    /// [`BlockStore::move_block`], so invariant sweeps have something to
    /// find.
    #[cfg(test)]
    pub(crate) fn force_parent(&mut self, id: Nid, parent: Option<Nid>) {
        if let Some(row) = self.blocks.get_mut(&id) {
            row.parent = parent;
        }
    }

    /// Strongly-connected-component sweep over the parent relation. Any
    /// component larger than one block is a parent cycle.
    fn cycle_findings(&self) -> Vec<String> {
        let mut graph = Graph::<Nid, ()>::new();
        let mut indices: BTreeMap<Nid, NodeIndex> = BTreeMap::new();
        for id in self.blocks.keys() {
            indices.insert(*id, graph.add_node(*id));
        }
        for (id, block) in &self.blocks {
            if let Some(parent) = block.parent {
                if let (Some(a), Some(b)) = (indices.get(id), indices.get(&parent)) {
                    graph.add_edge(*a, *b, ());
                }
            }
        }
        kosaraju_scc(&graph)
            .into_iter()
            .filter(|component| component.len() > 1)
            .map(|component| {
                let members: Vec<String> = component
                    .iter()
                    .map(|ix| format!("{}", graph[*ix]))
                    .collect();
                format!("parent cycle: {}", members.join(" -> "))
            })
            .collect()
    }
}
