//! Tests for the block tree: placement math, structural mutations, and the
//! invariant sweep.

use super::order::{insertion_key, rebalanced_keys, spread_keys};
use super::*;
use crate::error::RamifyError;
use crate::properties::{Block, DeletePolicy, Nid, OrderKey, ORDER_STEP};
use test_log::test;

fn store_with_roots(n: usize) -> (BlockStore, Nid, Vec<Nid>) {
    let mut store = BlockStore::default();
    let page = store.create_page("Scratch").expect("Fresh store accepts any page name");
    let mut roots = Vec::new();
    for i in 0..n {
        let (block, _) = store
            .create_block(page.id, usize::MAX, format!("root {i}"))
            .expect("Append under an existing page succeeds");
        roots.push(block.id);
    }
    (store, page.id, roots)
}

fn child_ids(store: &BlockStore, id: Nid) -> Vec<Nid> {
    store.get_children(id).expect("node exists").to_vec()
}

fn keys_of(store: &BlockStore, ids: &[Nid]) -> Vec<OrderKey> {
    ids.iter()
        .map(|id| store.block(*id).expect("row exists").order)
        .collect()
}

fn assert_ascending(keys: &[OrderKey], context: &str) {
    for pair in keys.windows(2) {
        assert!(
            pair[0] < pair[1],
            "sibling keys must be strictly ascending ({context}): {} then {}",
            pair[0],
            pair[1]
        );
    }
}

#[test]
fn test_insertion_key_around_neighbors() {
    assert_eq!(
        insertion_key(&[], 0),
        Some(OrderKey::zero()),
        "first block of a list gets the zero key"
    );
    let keys = rebalanced_keys(3);
    let front = insertion_key(&keys, 0).expect("room before the first key");
    assert!(front < keys[0], "front insert sorts before the old first block");
    let back = insertion_key(&keys, 3).expect("room after the last key");
    assert!(back > keys[2], "append sorts after the old last block");
    let mid = insertion_key(&keys, 1).expect("gap between evenly spaced keys");
    assert!(keys[0] < mid && mid < keys[1], "middle insert lands in the gap");
}

#[test]
fn test_spread_keys_validates_the_gap() {
    let wide = spread_keys(Some(OrderKey::zero()), Some(OrderKey::new(ORDER_STEP)), 3)
        .expect("a full step hosts three keys");
    assert_eq!(wide.len(), 3, "one key per landing block");
    assert!(
        wide[0] > OrderKey::zero() && wide[2] < OrderKey::new(ORDER_STEP),
        "spread keys stay inside the gap"
    );
    assert_ascending(&wide, "spread in wide gap");

    let tight = spread_keys(
        Some(OrderKey::new(1.0)),
        Some(OrderKey::new(1.0 + f64::EPSILON)),
        2,
    );
    assert_eq!(tight, None, "a one-ulp gap cannot host two distinct keys");
}

#[test]
fn test_create_block_orders_siblings() {
    let (mut store, page, roots) = store_with_roots(3);
    assert_eq!(child_ids(&store, page), roots, "appends keep arrival order");
    assert_ascending(&keys_of(&store, &roots), "after appends");

    let (front, _) = store
        .create_block(page, 0, "front")
        .expect("front insert succeeds");
    let (middle, _) = store
        .create_block(page, 2, "middle")
        .expect("middle insert succeeds");
    let order = child_ids(&store, page);
    assert_eq!(
        order,
        vec![front.id, roots[0], middle.id, roots[1], roots[2]],
        "inserts land at the requested sibling position"
    );
    assert_ascending(&keys_of(&store, &order), "after positional inserts");
    assert!(store.self_check().is_empty(), "tree stays sound: {:?}", store.self_check());
}

#[test]
fn test_create_block_clamps_index_and_counts_children() {
    let (mut store, page, roots) = store_with_roots(1);
    let (child, _) = store
        .create_block(roots[0], 99, "nested")
        .expect("index past the end appends");
    assert_eq!(child_ids(&store, roots[0]), vec![child.id], "filed under the block");
    assert_eq!(child.parent, Some(roots[0]), "nested block records its parent");
    assert_eq!(child.page, store.page_of(page).expect("page id maps to itself"));
    assert_eq!(
        store.block(roots[0]).expect("parent row").child_count,
        1,
        "parent child_count follows the insert"
    );
}

#[test]
fn test_midpoint_exhaustion_rebalances_transparently() {
    let (mut store, page, _) = store_with_roots(2);
    let mut widest_touch = 0usize;
    for i in 0..1200 {
        let (_, delta) = store
            .create_block(page, 1, format!("wedge {i}"))
            .expect("insert between the first two siblings always succeeds");
        widest_touch = widest_touch.max(delta.touched.len());
    }
    let order = child_ids(&store, page);
    assert_eq!(order.len(), 1202, "every insert landed");
    assert_ascending(&keys_of(&store, &order), "after precision exhaustion");
    assert!(
        widest_touch > 2,
        "at least one insert renumbered the sibling range (widest delta {widest_touch})"
    );
    assert!(store.self_check().is_empty(), "tree stays sound after rebalances");
}

#[test]
fn test_move_block_reorders_within_parent() {
    let (mut store, page, roots) = store_with_roots(3);
    let delta = store
        .move_block(roots[2], page, 0)
        .expect("reorder is legal")
        .expect("position changed");
    assert_eq!(
        child_ids(&store, page),
        vec![roots[2], roots[0], roots[1]],
        "block moved to the front"
    );
    assert!(delta.touched.contains(&roots[2]), "moved row is in the delta");
    assert_ascending(&keys_of(&store, &child_ids(&store, page)), "after reorder");
    assert!(store.self_check().is_empty(), "tree stays sound after reorder");
}

#[test]
fn test_move_block_reparents_and_updates_counts() {
    let (mut store, _, roots) = store_with_roots(2);
    let (child, _) = store
        .create_block(roots[0], 0, "migrant")
        .expect("nested insert");
    store
        .move_block(child.id, roots[1], 0)
        .expect("reparent is legal")
        .expect("position changed");
    assert!(child_ids(&store, roots[0]).is_empty(), "old parent lost the child");
    assert_eq!(child_ids(&store, roots[1]), vec![child.id], "new parent gained it");
    assert_eq!(
        store.block(child.id).expect("row").parent,
        Some(roots[1]),
        "parent pointer follows the move"
    );
    assert_eq!(store.block(roots[0]).expect("row").child_count, 0);
    assert_eq!(store.block(roots[1]).expect("row").child_count, 1);
    assert!(store.self_check().is_empty(), "tree stays sound after reparent");
}

#[test]
fn test_move_block_rejects_self_and_descendants() {
    let (mut store, page, roots) = store_with_roots(1);
    let (child, _) = store.create_block(roots[0], 0, "child").expect("nested insert");
    let (grandchild, _) = store.create_block(child.id, 0, "grandchild").expect("nested insert");

    let onto_self = store.move_block(roots[0], roots[0], 0);
    assert!(
        matches!(onto_self, Err(RamifyError::Validation(_))),
        "nesting a block under itself is rejected: {onto_self:?}"
    );
    let into_subtree = store.move_block(roots[0], grandchild.id, 0);
    assert!(
        matches!(into_subtree, Err(RamifyError::Validation(_))),
        "nesting a block under its own descendant is rejected: {into_subtree:?}"
    );
    assert_eq!(child_ids(&store, page), roots, "failed moves leave the tree unchanged");
    assert_eq!(child_ids(&store, roots[0]), vec![child.id]);
    assert!(store.self_check().is_empty(), "tree stays sound after rejections");
}

#[test]
fn test_move_block_same_position_is_a_noop() {
    let (mut store, page, roots) = store_with_roots(3);
    let before = keys_of(&store, &roots);
    let outcome = store.move_block(roots[1], page, 1).expect("legal move");
    assert_eq!(outcome, None, "moving to the current position reports no movement");
    assert_eq!(child_ids(&store, page), roots, "order unchanged");
    assert_eq!(keys_of(&store, &roots), before, "keys unchanged");
}

#[test]
fn test_move_block_across_pages_is_rejected() {
    let (mut store, _, roots) = store_with_roots(1);
    let other = store.create_page("Elsewhere").expect("second page");
    let err = store.move_block(roots[0], other.id, 0);
    assert!(
        matches!(err, Err(RamifyError::Validation(_))),
        "cross-page moves are rejected: {err:?}"
    );
}

#[test]
fn test_delete_cascade_removes_subtree_in_preorder() {
    let (mut store, page, roots) = store_with_roots(1);
    let (b, _) = store.create_block(roots[0], 0, "b").expect("insert");
    let (c, _) = store.create_block(roots[0], 1, "c").expect("insert");
    let (d, _) = store.create_block(b.id, 0, "d").expect("insert");

    let (removed, delta) = store
        .delete_block(roots[0], DeletePolicy::Cascade)
        .expect("cascade delete");
    assert_eq!(
        removed,
        vec![roots[0], b.id, d.id, c.id],
        "removal reports the subtree in pre-order"
    );
    assert_eq!(delta.removed, removed, "delta carries the same rows");
    assert!(child_ids(&store, page).is_empty(), "page has no roots left");
    assert_eq!(store.block_count(), 0, "no rows survive the cascade");
    assert!(store.self_check().is_empty(), "tree stays sound after cascade");
}

#[test]
fn test_delete_promote_splices_children_in_place() {
    let (mut store, page, roots) = store_with_roots(3);
    let (k1, _) = store.create_block(roots[1], 0, "k1").expect("insert");
    let (k2, _) = store.create_block(roots[1], 1, "k2").expect("insert");

    let (removed, _) = store
        .delete_block(roots[1], DeletePolicy::Promote)
        .expect("promote delete");
    assert_eq!(removed, vec![roots[1]], "promote removes only the block itself");
    let order = child_ids(&store, page);
    assert_eq!(
        order,
        vec![roots[0], k1.id, k2.id, roots[2]],
        "children splice into the deleted block's slot"
    );
    assert_ascending(&keys_of(&store, &order), "after promote");
    assert_eq!(store.block(k1.id).expect("row").parent, None, "promoted to root level");
    assert!(store.self_check().is_empty(), "tree stays sound after promote");
}

#[test]
fn test_delete_promote_keeps_nested_counts() {
    let (mut store, _, roots) = store_with_roots(1);
    let (mid, _) = store.create_block(roots[0], 0, "mid").expect("insert");
    let (leaf, _) = store.create_block(mid.id, 0, "leaf").expect("insert");

    store
        .delete_block(mid.id, DeletePolicy::Promote)
        .expect("promote delete");
    assert_eq!(child_ids(&store, roots[0]), vec![leaf.id], "leaf took mid's slot");
    assert_eq!(
        store.block(leaf.id).expect("row").parent,
        Some(roots[0]),
        "leaf reparented to its grandparent"
    );
    assert_eq!(
        store.block(roots[0]).expect("row").child_count,
        1,
        "grandparent count swapped one child for another"
    );
    assert!(store.self_check().is_empty(), "tree stays sound after nested promote");
}

#[test]
fn test_get_path_is_root_first() {
    let (mut store, _, roots) = store_with_roots(1);
    let (mid, _) = store.create_block(roots[0], 0, "mid").expect("insert");
    let (leaf, _) = store.create_block(mid.id, 0, "leaf").expect("insert");
    assert_eq!(
        store.get_path(leaf.id).expect("path exists"),
        vec![roots[0], mid.id, leaf.id],
        "path runs root to block"
    );
    assert_eq!(
        store.get_path(roots[0]).expect("path exists"),
        vec![roots[0]],
        "a root's path is itself"
    );
}

#[test]
fn test_visible_order_skips_collapsed_descendants() {
    let (mut store, page, roots) = store_with_roots(2);
    let (hidden, _) = store.create_block(roots[0], 0, "hidden").expect("insert");
    let (shown, _) = store.create_block(roots[1], 0, "shown").expect("insert");

    let expanded = store.visible_order(page).expect("page exists");
    assert_eq!(
        expanded,
        vec![roots[0], hidden.id, roots[1], shown.id],
        "everything visible while expanded"
    );

    store.set_collapsed(roots[0], true).expect("flag flip");
    let collapsed = store.visible_order(page).expect("page exists");
    assert_eq!(
        collapsed,
        vec![roots[0], roots[1], shown.id],
        "collapsed block stays visible, its subtree does not"
    );
    assert_eq!(
        store.subtree(roots[0]).expect("subtree"),
        vec![roots[0], hidden.id],
        "structural subtree ignores the collapse flag"
    );
}

#[test]
fn test_update_content_identical_text_is_empty_delta() {
    let (mut store, _, roots) = store_with_roots(1);
    let (_, delta) = store.update_content(roots[0], "changed").expect("row exists");
    assert!(!delta.is_empty(), "new text touches the row");
    let (_, delta) = store.update_content(roots[0], "changed").expect("row exists");
    assert!(delta.is_empty(), "identical text is a no-op");
}

#[test]
fn test_set_collapsed_reports_actual_changes() {
    let (mut store, _, roots) = store_with_roots(1);
    let (changed, _) = store.set_collapsed(roots[0], true).expect("row exists");
    assert!(changed, "first flip changes the flag");
    let (changed, delta) = store.set_collapsed(roots[0], true).expect("row exists");
    assert!(!changed, "repeated flip is a no-op");
    assert!(delta.is_empty(), "no-op flip touches nothing");
}

#[test]
fn test_page_names_normalize_and_collide() {
    let mut store = BlockStore::default();
    let alpha = store.create_page("Alpha").expect("fresh name");
    store.create_page("Beta").expect("fresh name");

    let dup = store.create_page("  ALPHA  ");
    assert!(
        matches!(dup, Err(RamifyError::Validation(_))),
        "names differing only in case and whitespace collide: {dup:?}"
    );
    let beta_id = store.page_by_name("beta").expect("normalized lookup").id;
    let clash = store.rename_page(beta_id, "alpha");
    assert!(
        matches!(clash, Err(RamifyError::Validation(_))),
        "rename onto a taken name is rejected: {clash:?}"
    );
    let recased = store.rename_page(alpha.id, "ALPHA").expect("recasing my own name");
    assert_eq!(recased.name, "ALPHA", "display name keeps the entered casing");
    assert_eq!(
        store.page_by_name("alpha").expect("still registered").id,
        alpha.id,
        "normalized lookup survives the recase"
    );
}

#[test]
fn test_delete_page_removes_every_block() {
    let (mut store, page, roots) = store_with_roots(2);
    let (nested, _) = store.create_block(roots[0], 0, "nested").expect("insert");

    let (removed, gone) = store.delete_page(page).expect("page exists");
    assert_eq!(
        removed,
        vec![roots[0], nested.id, roots[1]],
        "page deletion reports its blocks in pre-order"
    );
    assert_eq!(gone.id, page, "returned row names the deleted page");
    assert_eq!(store.block_count(), 0, "no rows survive");
    assert_eq!(store.page_count(), 0, "registry is empty");
    assert!(store.page_by_name("Scratch").is_none(), "name mapping removed");
}

#[test]
fn test_insert_restored_orders_by_key() {
    let mut store = BlockStore::default();
    let page = store.create_page("Restored").expect("fresh name");
    let first = Block::new(page.id, None, OrderKey::zero(), "first");
    let third = Block::new(page.id, None, OrderKey::new(2.0 * ORDER_STEP), "third");
    let second = Block::new(page.id, None, OrderKey::new(ORDER_STEP), "second");

    store.insert_restored(third.clone()).expect("restore accepts any arrival order");
    store.insert_restored(first.clone()).expect("restore accepts any arrival order");
    store.insert_restored(second.clone()).expect("restore accepts any arrival order");
    assert_eq!(
        child_ids(&store, page.id),
        vec![first.id, second.id, third.id],
        "restored rows sort by their persisted keys"
    );

    let twice = store.insert_restored(first);
    assert!(
        matches!(twice, Err(RamifyError::Validation(_))),
        "restoring a present id is rejected: {twice:?}"
    );
    let clash = store.insert_restored(Block::new(page.id, None, OrderKey::zero(), "imposter"));
    assert!(
        matches!(clash, Err(RamifyError::Consistency(_))),
        "a duplicate sibling key is a consistency fault: {clash:?}"
    );
}

#[test]
fn test_swap_siblings_exchanges_keys_and_positions() {
    let (mut store, page, roots) = store_with_roots(3);
    let before = keys_of(&store, &child_ids(&store, page));
    store.swap_siblings(roots[0], roots[1]).expect("siblings swap");
    assert_eq!(
        child_ids(&store, page),
        vec![roots[1], roots[0], roots[2]],
        "positions exchanged"
    );
    assert_eq!(
        keys_of(&store, &child_ids(&store, page)),
        before,
        "the key ladder itself is unchanged"
    );

    let (nested, _) = store.create_block(roots[0], 0, "nested").expect("insert");
    let not_siblings = store.swap_siblings(nested.id, roots[1]);
    assert!(
        matches!(not_siblings, Err(RamifyError::Validation(_))),
        "blocks under different parents cannot swap: {not_siblings:?}"
    );
}

#[test]
fn test_self_check_reports_forced_damage() {
    let (mut store, _, roots) = store_with_roots(2);
    assert!(store.self_check().is_empty(), "healthy store has no findings");

    store.force_parent(roots[0], Some(roots[1]));
    store.force_parent(roots[1], Some(roots[0]));
    let findings = store.self_check();
    assert!(
        findings.iter().any(|f| f.contains("parent cycle")),
        "mutual parents surface as a cycle: {findings:?}"
    );
    assert!(
        findings.iter().any(|f| f.contains("sibling list")),
        "damaged rows also fail the membership sweep: {findings:?}"
    );
}
