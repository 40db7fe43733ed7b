//! Shared test utilities for integration tests.
//!
//! Import from integration test files as:
//! ```ignore
//! mod common;
//! ```

use ramify_core::{
    config::WorkspaceConfig,
    event::OutlineEvent,
    properties::{Block, Nid},
    workspace::Workspace,
};
use tokio::sync::broadcast;

/// Initialize tracing for tests, respecting RUST_LOG env var.
///
/// Safe to call multiple times; subsequent calls are no-ops.
#[allow(dead_code)]
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// Handles into the outline built by [`seeded_workspace`].
#[allow(dead_code)]
pub struct Seeded {
    pub workspace: Workspace,
    pub home: Nid,
    pub projects: Nid,
    pub overview: Nid,
    pub tasks: Nid,
    pub child: Nid,
}

/// A workspace holding two pages and the links used across the
/// integration suite:
///
/// ```text
/// Home
///   overview of [[Projects]]
///   open #tasks
///     ship the graph view
/// Projects
/// ```
///
/// Seed state indexes two edges: a page reference onto `Projects` and a
/// tag edge onto the `tasks` stub.
#[allow(dead_code)]
pub fn seeded_workspace() -> Seeded {
    init_logging();
    let workspace = Workspace::new(WorkspaceConfig::default());
    let home = workspace.create_page("Home").expect("fresh page").id;
    let projects = workspace.create_page("Projects").expect("fresh page").id;
    let overview = workspace
        .create_block(home, 0, "overview of [[Projects]]")
        .expect("root insert")
        .id;
    let tasks = workspace
        .create_block(home, 1, "open #tasks")
        .expect("root insert")
        .id;
    let child = workspace
        .create_block(tasks, 0, "ship the graph view")
        .expect("child insert")
        .id;
    Seeded {
        workspace,
        home,
        projects,
        overview,
        tasks,
        child,
    }
}

/// Pull everything currently sitting in an event receiver.
#[allow(dead_code)]
pub fn drain_events(rx: &mut broadcast::Receiver<OutlineEvent>) -> Vec<OutlineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Flatten one page's tree into rows, parents before children, the shape
/// [`Workspace::restore`] expects back.
#[allow(dead_code)]
pub fn collect_rows(workspace: &Workspace, page: Nid) -> Vec<Block> {
    let mut rows = Vec::new();
    let mut stack: Vec<Nid> = workspace
        .get_children(page)
        .expect("page exists")
        .into_iter()
        .rev()
        .collect();
    while let Some(id) = stack.pop() {
        rows.push(workspace.block(id).expect("listed child exists"));
        let children = workspace.get_children(id).expect("listed child exists");
        stack.extend(children.into_iter().rev());
    }
    rows
}
