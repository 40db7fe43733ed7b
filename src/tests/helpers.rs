//! Shared test utilities for outline testing

use crate::{
    navigator::BlockNavigator,
    properties::{Nid, OrderKey},
    store::BlockStore,
};

/// Initialize logging for tests
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// A store holding one page with the outline used across the navigation
/// suite:
///
/// ```text
/// a
///   a1
///   a2
/// b
/// c
/// ```
///
/// Returned ids are `[page, a, a1, a2, b, c]`.
pub fn create_test_outline() -> (BlockStore, [Nid; 6]) {
    init_logging();
    let mut store = BlockStore::default();
    let page = store.create_page("Test Page").expect("fresh page").id;
    let (a, _) = store.create_block(page, 0, "a").expect("root insert");
    let (a1, _) = store.create_block(a.id, 0, "a1").expect("child insert");
    let (a2, _) = store.create_block(a.id, 1, "a2").expect("child insert");
    let (b, _) = store.create_block(page, 1, "b").expect("root insert");
    let (c, _) = store.create_block(page, 2, "c").expect("root insert");
    (store, [page, a.id, a1.id, a2.id, b.id, c.id])
}

/// The standard outline plus a navigator already focused on its page.
pub fn outline_with_nav() -> (BlockStore, BlockNavigator, [Nid; 6]) {
    let (store, ids) = create_test_outline();
    let nav = BlockNavigator::new(ids[0]);
    (store, nav, ids)
}

pub fn child_ids(store: &BlockStore, id: Nid) -> Vec<Nid> {
    store.get_children(id).expect("node exists").to_vec()
}

pub fn contents(store: &BlockStore, ids: &[Nid]) -> Vec<String> {
    ids.iter()
        .map(|id| store.block(*id).expect("row exists").content.clone())
        .collect()
}

/// Assert that every sibling list under `page` carries strictly ascending
/// order keys and that the structural sweep stays clean.
pub fn assert_tree_sound(store: &BlockStore, page: Nid) {
    let findings = store.self_check();
    assert!(
        findings.is_empty(),
        "structural sweep found problems:\n{}",
        findings.join("\n")
    );
    let mut stack = vec![page];
    while let Some(key) = stack.pop() {
        let kids = store.get_children(key).expect("node exists");
        let keys: Vec<OrderKey> = kids
            .iter()
            .map(|id| store.block(*id).expect("row exists").order)
            .collect();
        for pair in keys.windows(2) {
            assert!(
                pair[0] < pair[1],
                "sibling keys under {key} must be strictly ascending: {} then {}",
                pair[0],
                pair[1]
            );
        }
        stack.extend(kids.iter().copied());
    }
}
