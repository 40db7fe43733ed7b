//! Selection state machine and structural gestures over one page.
//!
//! [`BlockNavigator`] holds the selection and clipboard for a focused page
//! and turns user gestures (indent, outdent, move, duplicate, delete, copy,
//! paste, backspace merge) into [`BlockStore`] mutation sequences. Gestures
//! never throw for invalid positions: anything structurally impossible is
//! skipped and the returned [`NavOutcome`] simply shrinks, down to an empty
//! outcome that the caller maps to no event at all. Multi-block selections
//! process top to bottom in document order so sibling relationships stay
//! correct mid-gesture.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};

use crate::{
    error::RamifyError,
    properties::{DeletePolicy, Nid},
    store::{BlockStore, TreeDelta},
};

#[derive(
    Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub enum SelectionMode {
    #[default]
    None,
    Single,
    Range,
    Multi,
}

impl Display for SelectionMode {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            SelectionMode::None => write!(f, "none"),
            SelectionMode::Single => write!(f, "single"),
            SelectionMode::Range => write!(f, "range"),
            SelectionMode::Multi => write!(f, "multi"),
        }
    }
}

/// Current selection. `ids` is kept in flattened visible order regardless of
/// how the selection was built; `focus` is the active end the next gesture
/// works relative to.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Selection {
    pub mode: SelectionMode,
    pub anchor: Option<Nid>,
    pub focus: Option<Nid>,
    pub ids: Vec<Nid>,
}

impl Selection {
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: Nid) -> bool {
        self.ids.contains(&id)
    }
}

/// One block of clipboard content: text plus relative structure, no ids.
/// Pasting mints fresh ids, which is what keeps paste repeatable.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ClipSubtree {
    pub content: String,
    pub collapsed: bool,
    pub children: Vec<ClipSubtree>,
}

impl ClipSubtree {
    /// Blocks in this subtree, itself included.
    pub fn block_count(&self) -> usize {
        1 + self.children.iter().map(ClipSubtree::block_count).sum::<usize>()
    }
}

/// What one gesture did: which selected blocks it acted on, which rows a
/// storage layer should re-persist, and which rows appeared or vanished.
/// An empty `affected` means the gesture was a no-op end to end.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NavOutcome {
    pub affected: Vec<Nid>,
    pub touched: BTreeSet<Nid>,
    pub created: Vec<Nid>,
    pub removed: Vec<Nid>,
}

impl NavOutcome {
    pub fn is_noop(&self) -> bool {
        self.affected.is_empty()
    }

    fn absorb(&mut self, delta: TreeDelta) {
        self.touched.extend(delta.touched);
        self.removed.extend(delta.removed);
    }
}

/// Selection and gesture engine for one focused page.
#[derive(Clone, Debug, Default)]
pub struct BlockNavigator {
    page: Nid,
    selection: Selection,
    clipboard: Vec<ClipSubtree>,
}

impl BlockNavigator {
    pub fn new(page: Nid) -> Self {
        BlockNavigator {
            page,
            ..Default::default()
        }
    }

    pub fn page(&self) -> Nid {
        self.page
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// Blocks currently on the clipboard, over all snapshot roots.
    pub fn clipboard_len(&self) -> usize {
        self.clipboard.iter().map(ClipSubtree::block_count).sum()
    }

    /// Refocus the navigator on another page. Selection resets; the
    /// clipboard survives, so copy on one page can paste on another.
    pub fn set_page(&mut self, page: Nid) {
        if self.page != page {
            self.page = page;
            self.selection = Selection::default();
        }
    }

    // ------------------------------------------------------------------
    // Selection machine

    /// Plain click or extend click. Plain always yields a single selection
    /// anchored at `id`; extend from a non-empty selection yields the
    /// contiguous visible-order range between the anchor and `id`.
    pub fn select_block(
        &mut self,
        store: &BlockStore,
        id: Nid,
        extend: bool,
    ) -> Result<bool, RamifyError> {
        self.require_on_page(store, id)?;
        let before = self.selection.clone();
        if !extend || self.selection.is_empty() {
            self.set_single(id);
            return Ok(self.selection != before);
        }
        let anchor = self.selection.anchor.unwrap_or(id);
        let visible = store.visible_order(self.page)?;
        match (position_of(&visible, anchor), position_of(&visible, id)) {
            (Some(a), Some(b)) => {
                let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
                self.selection = Selection {
                    mode: SelectionMode::Range,
                    anchor: Some(anchor),
                    focus: Some(id),
                    ids: visible[lo..=hi].to_vec(),
                };
            }
            // an end is hidden inside a collapsed subtree; fall back to a
            // plain selection of the clicked block
            _ => self.set_single(id),
        }
        Ok(self.selection != before)
    }

    /// Toggle click. Adds or removes one block from a multi selection,
    /// entering multi mode from whatever the selection was before and
    /// degenerating back to single or none as members drop out.
    pub fn toggle_block(&mut self, store: &BlockStore, id: Nid) -> Result<bool, RamifyError> {
        self.require_on_page(store, id)?;
        let before = self.selection.clone();
        let mut members: BTreeSet<Nid> = self.selection.ids.iter().copied().collect();
        if !members.insert(id) {
            members.remove(&id);
        }
        if members.is_empty() {
            self.selection = Selection::default();
            return Ok(self.selection != before);
        }
        let ordered = self.document_order(store, &members)?;
        // anchor and focus always name selected blocks
        let focus = if members.contains(&id) {
            Some(id)
        } else {
            ordered.last().copied()
        };
        let anchor = self
            .selection
            .anchor
            .filter(|a| members.contains(a))
            .or_else(|| ordered.first().copied());
        self.selection = Selection {
            mode: if ordered.len() == 1 {
                SelectionMode::Single
            } else {
                SelectionMode::Multi
            },
            anchor,
            focus,
            ids: ordered,
        };
        Ok(self.selection != before)
    }

    pub fn clear_selection(&mut self) -> bool {
        let had = !self.selection.is_empty() || self.selection.mode != SelectionMode::None;
        self.selection = Selection::default();
        had
    }

    pub fn select_first(&mut self, store: &BlockStore) -> Result<bool, RamifyError> {
        let visible = store.visible_order(self.page)?;
        match visible.first() {
            Some(id) => self.select_block(store, *id, false),
            None => Ok(false),
        }
    }

    pub fn select_last(&mut self, store: &BlockStore) -> Result<bool, RamifyError> {
        let visible = store.visible_order(self.page)?;
        match visible.last() {
            Some(id) => self.select_block(store, *id, false),
            None => Ok(false),
        }
    }

    /// Step the selection to the next visible block, clamped at the end.
    pub fn select_next(&mut self, store: &BlockStore) -> Result<bool, RamifyError> {
        self.step(store, 1)
    }

    /// Step the selection to the previous visible block, clamped at the
    /// start.
    pub fn select_previous(&mut self, store: &BlockStore) -> Result<bool, RamifyError> {
        self.step(store, -1)
    }

    fn step(&mut self, store: &BlockStore, direction: isize) -> Result<bool, RamifyError> {
        let visible = store.visible_order(self.page)?;
        if visible.is_empty() {
            return Ok(false);
        }
        let next = match self.selection.focus.and_then(|f| position_of(&visible, f)) {
            None => {
                if direction >= 0 {
                    0
                } else {
                    visible.len() - 1
                }
            }
            Some(pos) => pos
                .saturating_add_signed(direction)
                .min(visible.len() - 1),
        };
        self.select_block(store, visible[next], false)
    }

    /// Drop ids that no longer exist from the selection, demoting the mode
    /// to match what is left. Returns whether anything changed.
    pub fn prune_deleted(&mut self, store: &BlockStore) -> bool {
        let before = self.selection.clone();
        self.selection.ids.retain(|id| store.contains(*id));
        let ids = &self.selection.ids;
        self.selection.mode = match ids.len() {
            0 => SelectionMode::None,
            1 => SelectionMode::Single,
            _ => self.selection.mode,
        };
        if self.selection.anchor.map_or(false, |a| !store.contains(a)) {
            self.selection.anchor = ids.first().copied();
        }
        if self.selection.focus.map_or(false, |f| !store.contains(f)) {
            self.selection.focus = ids.last().copied();
        }
        self.selection != before
    }

    fn set_single(&mut self, id: Nid) {
        self.selection = Selection {
            mode: SelectionMode::Single,
            anchor: Some(id),
            focus: Some(id),
            ids: vec![id],
        };
    }

    fn require_on_page(&self, store: &BlockStore, id: Nid) -> Result<(), RamifyError> {
        let block = store
            .block(id)
            .ok_or_else(|| RamifyError::NotFound(format!("block {id}")))?;
        if block.page != self.page {
            return Err(RamifyError::Validation(format!(
                "block {id} is not on the focused page"
            )));
        }
        Ok(())
    }

    /// Members of `set` in document order, including blocks hidden inside
    /// collapsed subtrees. Gestures walk this, not the raw selection vector,
    /// so stale ordering from before a structure change cannot leak in.
    fn document_order(
        &self,
        store: &BlockStore,
        set: &BTreeSet<Nid>,
    ) -> Result<Vec<Nid>, RamifyError> {
        Ok(store
            .subtree(self.page)?
            .into_iter()
            .filter(|id| set.contains(id))
            .collect())
    }

    fn gesture_ids(&self, store: &BlockStore) -> Result<Vec<Nid>, RamifyError> {
        let members: BTreeSet<Nid> = self.selection.ids.iter().copied().collect();
        self.document_order(store, &members)
    }

    /// Selected ids whose ancestors are all unselected, in document order.
    /// Subtree gestures (duplicate, delete, copy) act on these so a nested
    /// selection is not processed twice.
    fn top_level_ids(&self, store: &BlockStore) -> Result<Vec<Nid>, RamifyError> {
        let members: BTreeSet<Nid> = self.selection.ids.iter().copied().collect();
        let mut out = Vec::new();
        for id in self.document_order(store, &members)? {
            let path = store.get_path(id)?;
            if !path[..path.len() - 1].iter().any(|p| members.contains(p)) {
                out.push(id);
            }
        }
        Ok(out)
    }

    // ------------------------------------------------------------------
    // Structural gestures

    /// Reparent each selected block under its immediately preceding sibling,
    /// as that sibling's last child. First children have no such sibling and
    /// stay put.
    pub fn indent(&mut self, store: &mut BlockStore) -> Result<NavOutcome, RamifyError> {
        let mut outcome = NavOutcome::default();
        for id in self.gesture_ids(store)? {
            let (parent_key, pos) = store.sibling_position(id)?;
            if pos == 0 {
                continue;
            }
            let prev = store.get_children(parent_key)?[pos - 1];
            let last = store.get_children(prev)?.len();
            if let Some(delta) = store.move_block(id, prev, last)? {
                outcome.affected.push(id);
                outcome.absorb(delta);
            }
        }
        Ok(outcome)
    }

    /// Move each selected block to immediately after its former parent, at
    /// the parent's sibling level (root level when the parent was a root).
    /// Blocks already at root level stay put. When several children of one
    /// parent outdent together, an insertion cursor per former parent keeps
    /// their relative order.
    pub fn outdent(&mut self, store: &mut BlockStore) -> Result<NavOutcome, RamifyError> {
        let mut outcome = NavOutcome::default();
        let mut cursors: BTreeMap<Nid, usize> = BTreeMap::new();
        for id in self.gesture_ids(store)? {
            let Some(parent) = store.block(id).and_then(|b| b.parent) else {
                continue;
            };
            // page id when the parent is a root block
            let (grand_key, parent_pos) = store.sibling_position(parent)?;
            let offset = cursors.entry(parent).or_insert(1);
            if let Some(delta) = store.move_block(id, grand_key, parent_pos + *offset)? {
                *offset += 1;
                outcome.affected.push(id);
                outcome.absorb(delta);
            }
        }
        Ok(outcome)
    }

    /// Swap each selected block with its previous sibling. Crossing a tree
    /// level is a no-op, and a block whose previous sibling is itself a
    /// stuck selected block stays put so the selected band never reorders
    /// internally.
    pub fn move_up(&mut self, store: &mut BlockStore) -> Result<NavOutcome, RamifyError> {
        let ids = self.gesture_ids(store)?;
        let members: BTreeSet<Nid> = ids.iter().copied().collect();
        let mut stuck: BTreeSet<Nid> = BTreeSet::new();
        let mut outcome = NavOutcome::default();
        for id in ids {
            let (parent_key, pos) = store.sibling_position(id)?;
            let Some(prev_pos) = pos.checked_sub(1) else {
                stuck.insert(id);
                continue;
            };
            let prev = store.get_children(parent_key)?[prev_pos];
            if members.contains(&prev) && stuck.contains(&prev) {
                stuck.insert(id);
                continue;
            }
            outcome.absorb(store.swap_siblings(id, prev)?);
            outcome.affected.push(id);
        }
        Ok(outcome)
    }

    /// Swap each selected block with its next sibling, processing bottom to
    /// top so a selected band moves as one.
    pub fn move_down(&mut self, store: &mut BlockStore) -> Result<NavOutcome, RamifyError> {
        let ids = self.gesture_ids(store)?;
        let members: BTreeSet<Nid> = ids.iter().copied().collect();
        let mut stuck: BTreeSet<Nid> = BTreeSet::new();
        let mut outcome = NavOutcome::default();
        for id in ids.into_iter().rev() {
            let (parent_key, pos) = store.sibling_position(id)?;
            let siblings = store.get_children(parent_key)?;
            let Some(next) = siblings.get(pos + 1).copied() else {
                stuck.insert(id);
                continue;
            };
            if members.contains(&next) && stuck.contains(&next) {
                stuck.insert(id);
                continue;
            }
            outcome.absorb(store.swap_siblings(id, next)?);
            outcome.affected.push(id);
        }
        Ok(outcome)
    }

    /// Deep-clone each top-level selected subtree immediately after its
    /// source. Clones carry fresh ids and byte-identical content; the caller
    /// re-derives their link edges, so no edge ever aliases a source edge by
    /// a clone id.
    pub fn duplicate(&mut self, store: &mut BlockStore) -> Result<NavOutcome, RamifyError> {
        let mut outcome = NavOutcome::default();
        for id in self.top_level_ids(store)? {
            let (parent_key, pos) = store.sibling_position(id)?;
            clone_subtree(store, id, parent_key, pos + 1, &mut outcome)?;
            outcome.affected.push(id);
        }
        Ok(outcome)
    }

    /// Cascade-delete every top-level selected subtree and clear the
    /// selection.
    pub fn delete_selection(&mut self, store: &mut BlockStore) -> Result<NavOutcome, RamifyError> {
        let mut outcome = NavOutcome::default();
        for id in self.top_level_ids(store)? {
            let (removed, delta) = store.delete_block(id, DeletePolicy::Cascade)?;
            outcome.affected.push(id);
            outcome.touched.extend(delta.touched);
            outcome.removed.extend(removed);
        }
        if !outcome.is_noop() {
            self.selection = Selection::default();
        }
        Ok(outcome)
    }

    /// Snapshot the top-level selected subtrees onto the clipboard,
    /// replacing its previous contents. Returns how many blocks were
    /// captured; zero means the selection was empty and the clipboard is
    /// untouched.
    pub fn copy(&mut self, store: &BlockStore) -> Result<usize, RamifyError> {
        let roots = self.top_level_ids(store)?;
        if roots.is_empty() {
            return Ok(0);
        }
        let mut buffer = Vec::with_capacity(roots.len());
        for id in &roots {
            buffer.push(snapshot_subtree(store, *id)?);
        }
        self.clipboard = buffer;
        Ok(self.clipboard_len())
    }

    /// Clone the clipboard forest to immediately after the focused block,
    /// minting fresh ids. The clipboard is left as is, so paste repeats.
    /// An empty clipboard is a caller mistake and reports as such; an empty
    /// selection is the usual gesture no-op.
    pub fn paste(&mut self, store: &mut BlockStore) -> Result<NavOutcome, RamifyError> {
        if self.clipboard.is_empty() {
            return Err(RamifyError::Validation("clipboard is empty".to_string()));
        }
        let Some(focus) = self.selection.focus else {
            return Ok(NavOutcome::default());
        };
        if store.block(focus).is_none() {
            return Ok(NavOutcome::default());
        }
        let (parent_key, pos) = store.sibling_position(focus)?;
        let clips = self.clipboard.clone();
        let mut outcome = NavOutcome::default();
        for (offset, clip) in clips.iter().enumerate() {
            paste_subtree(store, clip, parent_key, pos + 1 + offset, &mut outcome)?;
        }
        outcome.affected = outcome.created.clone();
        Ok(outcome)
    }

    /// Backspace at the start of an empty block: delete it, promoting any
    /// children, and move the focus to the previous block in visible order,
    /// whatever depth that block is at.
    pub fn backspace_merge(&mut self, store: &mut BlockStore) -> Result<NavOutcome, RamifyError> {
        let Some(focus) = self.selection.focus else {
            return Ok(NavOutcome::default());
        };
        let Some(row) = store.block(focus) else {
            return Ok(NavOutcome::default());
        };
        if !row.content.is_empty() {
            return Ok(NavOutcome::default());
        }
        let visible = store.visible_order(self.page)?;
        let previous = position_of(&visible, focus)
            .and_then(|pos| pos.checked_sub(1))
            .map(|pos| visible[pos]);
        let (removed, delta) = store.delete_block(focus, DeletePolicy::Promote)?;
        match previous {
            Some(prev) => self.set_single(prev),
            None => self.selection = Selection::default(),
        }
        let mut outcome = NavOutcome {
            affected: vec![focus],
            removed,
            ..Default::default()
        };
        outcome.touched.extend(delta.touched);
        Ok(outcome)
    }
}

fn position_of(visible: &[Nid], id: Nid) -> Option<usize> {
    visible.iter().position(|v| *v == id)
}

fn clone_subtree(
    store: &mut BlockStore,
    src: Nid,
    parent_key: Nid,
    index: usize,
    outcome: &mut NavOutcome,
) -> Result<Nid, RamifyError> {
    let row = store
        .block(src)
        .cloned()
        .ok_or_else(|| RamifyError::NotFound(format!("block {src}")))?;
    let (copy, delta) = store.create_block(parent_key, index, row.content)?;
    outcome.created.push(copy.id);
    outcome.touched.extend(delta.touched);
    if row.collapsed {
        let (_, delta) = store.set_collapsed(copy.id, true)?;
        outcome.touched.extend(delta.touched);
    }
    let kids = store.get_children(src)?.to_vec();
    for (i, kid) in kids.into_iter().enumerate() {
        clone_subtree(store, kid, copy.id, i, outcome)?;
    }
    Ok(copy.id)
}

fn snapshot_subtree(store: &BlockStore, id: Nid) -> Result<ClipSubtree, RamifyError> {
    let row = store
        .block(id)
        .ok_or_else(|| RamifyError::NotFound(format!("block {id}")))?;
    let mut children = Vec::new();
    for kid in store.get_children(id)? {
        children.push(snapshot_subtree(store, *kid)?);
    }
    Ok(ClipSubtree {
        content: row.content.clone(),
        collapsed: row.collapsed,
        children,
    })
}

pub(crate) fn paste_subtree(
    store: &mut BlockStore,
    clip: &ClipSubtree,
    parent_key: Nid,
    index: usize,
    outcome: &mut NavOutcome,
) -> Result<(), RamifyError> {
    let (copy, delta) = store.create_block(parent_key, index, clip.content.clone())?;
    outcome.created.push(copy.id);
    outcome.touched.extend(delta.touched);
    if clip.collapsed {
        let (_, delta) = store.set_collapsed(copy.id, true)?;
        outcome.touched.extend(delta.touched);
    }
    for (i, child) in clip.children.iter().enumerate() {
        paste_subtree(store, child, copy.id, i, outcome)?;
    }
    Ok(())
}
