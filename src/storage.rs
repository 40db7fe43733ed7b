//! Types crossing the boundary to a storage collaborator.
//!
//! The engine never talks to disk. Mutations stream out as [`StoreDelta`]
//! rows over a channel, fire and forget; whoever sits on the other end owns
//! durability, retries and backoff. [`EdgeSnapshot`] is the optional cached
//! form of the link index. It is never the record of truth: block content
//! is, and a snapshot that fails its audit on load is discarded and rebuilt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

use crate::{
    error::RamifyError,
    index::{LinkGraphIndex, StubTarget},
    properties::{Block, LinkEdge, Nid, Page},
};

/// One row of persistence work. Upserts carry the full row so the storage
/// side needs no read-back; removals carry ids only.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum StoreDelta {
    UpsertPage(Page),
    RemovePage(Nid),
    UpsertBlock(Block),
    RemoveBlocks(Vec<Nid>),
}

impl Display for StoreDelta {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            StoreDelta::UpsertPage(page) => write!(f, "upsert page {}", page.id),
            StoreDelta::RemovePage(id) => write!(f, "remove page {id}"),
            StoreDelta::UpsertBlock(block) => write!(f, "upsert block {}", block.id),
            StoreDelta::RemoveBlocks(ids) => write!(f, "remove {} blocks", ids.len()),
        }
    }
}

/// Serialized form of the link index at one point in time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EdgeSnapshot {
    pub edges: Vec<LinkEdge>,
    pub stubs: Vec<StubTarget>,
    pub saved_at: DateTime<Utc>,
}

impl EdgeSnapshot {
    pub fn capture(index: &LinkGraphIndex) -> Self {
        EdgeSnapshot {
            edges: index.all_edges(),
            stubs: index.stubs().cloned().collect(),
            saved_at: Utc::now(),
        }
    }

    pub fn to_json(&self) -> Result<String, RamifyError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self, RamifyError> {
        Ok(serde_json::from_str(raw)?)
    }
}
