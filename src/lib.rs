//! # ramify-core
//!
//! A Rust library for hierarchical block outlining with a bidirectional link graph derived
//! from block content.
//!
//! The name comes from "ramify" - to branch out, the way an outline does.
//!
//! ## Overview
//!
//! ramify-core is the engine behind an outliner-style knowledge tool. Every page is a tree
//! of blocks; block text carries wiki-style references (`[[Page]]`, `((block-id))`, `#tag`,
//! `{{embed ...}}`) which the engine parses into a **bidirectional link index**. The index
//! is a cache over content: block text is the record of truth, and every edge in the graph
//! can be re-derived from it at any time.
//!
//! ### Key Features
//!
//! - **Arena block tree**: Blocks live in id-addressed maps with parent pointers and
//!   fractional order keys, so sibling insertion never renumbers the whole list
//! - **Stable identifiers**: Every page and block carries a [`properties::Nid`] that
//!   survives moves, renames and restores
//! - **Derived link graph**: Forward links and backlinks stay exact inverses; content
//!   edits reconcile edges by delta, never by rebuild
//! - **Stub targets**: References to pages or blocks that do not exist yet resolve to
//!   deterministic placeholders, promoted in place once the target appears
//! - **Outliner gestures**: Selection, indent/outdent, move, duplicate, copy/paste and
//!   backspace-merge operating on whole selections with single-event semantics
//! - **Bounded graph views**: Deterministic breadth-first neighborhood extraction with
//!   strength-ranked truncation for rendering
//! - **Event streaming**: Every successful mutation broadcasts a minimal-delta
//!   [`event::OutlineEvent`] for search, persistence and UI subscribers
//! - **Cancellable bulk work**: Imports, restores and index rebuilds run chunked, yield
//!   between chunks and honor cooperative cancellation at chunk boundaries
//!
//! ## Architecture
//!
//! The library is organized around several key components:
//!
//! - **[`store`]**: The block tree ([`store::BlockStore`]) - pages, blocks, order keys,
//!   structural operations and the structural self check
//! - **[`parser`]**: Reference extraction from block content ([`parser::parse`])
//! - **[`index`]**: The bidirectional link graph ([`index::LinkGraphIndex`]) and stub
//!   target registry
//! - **[`navigator`]**: Selection state and structural gestures
//!   ([`navigator::BlockNavigator`])
//! - **[`graph`]**: Bounded neighborhood extraction ([`graph::GraphBuilder`])
//! - **[`workspace`]**: The single-writer facade tying the pieces together under one
//!   lock ([`workspace::Workspace`])
//! - **[`properties`]**: Identifiers, link kinds, order keys and the core records
//! - **[`event`]**: Event types and the broadcast bus
//! - **[`storage`]**: Persistence rows ([`storage::StoreDelta`]) and the edge snapshot
//!   cache
//!
//! ## Quick Start
//!
//! ### Pages, blocks and links
//!
//! ```rust
//! use ramify_core::{config::WorkspaceConfig, workspace::Workspace};
//!
//! fn main() -> Result<(), ramify_core::RamifyError> {
//!     let workspace = Workspace::new(WorkspaceConfig::default());
//!
//!     let home = workspace.create_page("Home")?;
//!     let intro = workspace.create_block(home.id, 0, "Welcome to [[Projects]]")?;
//!     workspace.create_block(intro.id, 0, "a nested child block")?;
//!
//!     // [[Projects]] pointed at a stub until the page appeared; creating it
//!     // promotes the stub and rewires the edge in place.
//!     let projects = workspace.create_page("Projects")?;
//!     assert_eq!(workspace.backlinks(projects.id).len(), 1);
//!
//!     Ok(())
//! }
//! ```
//!
//! ### Navigation gestures
//!
//! ```rust
//! use ramify_core::{config::WorkspaceConfig, workspace::Workspace};
//!
//! fn main() -> Result<(), ramify_core::RamifyError> {
//!     let workspace = Workspace::new(WorkspaceConfig::default());
//!     let page = workspace.create_page("Inbox")?;
//!     let first = workspace.create_block(page.id, 0, "first")?;
//!     workspace.create_block(page.id, 1, "second")?;
//!
//!     workspace.focus_page(page.id)?;
//!     workspace.select_block(first.id, false)?;
//!     workspace.select_next()?;
//!     let moved = workspace.move_up()?;
//!     assert_eq!(moved, 1, "the second block swapped above the first");
//!
//!     Ok(())
//! }
//! ```
//!
//! ### Bulk import and graph extraction
//!
//! ```rust
//! use ramify_core::{
//!     config::WorkspaceConfig,
//!     navigator::ClipSubtree,
//!     workspace::{CancelToken, Workspace},
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), ramify_core::RamifyError> {
//!     let workspace = Workspace::new(WorkspaceConfig::default());
//!     let page = workspace.create_page("Import")?;
//!
//!     let forest = vec![ClipSubtree {
//!         content: "links to [[Import]]".to_string(),
//!         collapsed: false,
//!         children: Vec::new(),
//!     }];
//!     let created = workspace
//!         .import_outline(page.id, forest, &CancelToken::new())
//!         .await?;
//!     assert_eq!(created.len(), 1);
//!
//!     let view = workspace.build_graph(page.id, 1, 16)?;
//!     assert_eq!(view.center, page.id);
//!     Ok(())
//! }
//! ```
//!
//! ## Core Concepts
//!
//! ### Edges are cache, content is truth
//!
//! No API mutates an edge directly. Edges change only when block content changes, through
//! a parse-and-diff path in [`index::LinkGraphIndex::update_block_links`]. A crash before
//! an edge snapshot persists loses nothing: [`workspace::Workspace::rebuild_index`]
//! re-derives the whole graph from saved content.
//!
//! ### Fractional order keys
//!
//! Sibling order is a [`properties::OrderKey`] per block. Inserting between two siblings
//! takes their midpoint; only when the midpoint collapses into a neighbor does the engine
//! rewrite that one sibling list with evenly spaced keys. See [`properties`] for the
//! representation and [`store`] for the rebalance rules.
//!
//! ### Stub targets
//!
//! A reference to a page that does not exist yet is a feature, not an error. The index
//! registers a deterministic placeholder (same name, same id, on every workspace) so
//! backlinks accumulate before the page is created; creating or renaming the page adopts
//! them. Stubs with no remaining referrers are discarded automatically.
//!
//! ### Single writer, many readers
//!
//! All mutation funnels through one writer section per workspace; reads share a lock and
//! never block each other. Events are broadcast only after the writer section ends, so a
//! subscriber reacting to an event always observes the completed state.
//!
//! ## Module Guide
//!
//! Start with [`workspace::Workspace`] for the full engine, or use [`store::BlockStore`]
//! and [`index::LinkGraphIndex`] directly for headless tree-plus-graph processing. See
//! [`properties`] for the identifier and record types everything else shares.

pub mod config;
pub mod error;
pub mod event;
pub mod graph;
pub mod index;
pub mod navigator;
pub mod parser;
pub mod properties;
pub mod storage;
pub mod store;
#[cfg(test)]
mod tests;
pub mod workspace;

pub use error::*;
