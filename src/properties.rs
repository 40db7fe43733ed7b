//! Basic building blocks for assembling and manipulating outlines: node ids,
//! pages, blocks, link edges, and the value types shared across the crate.

pub use enumset::EnumSet;
use enumset::EnumSetType;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    cmp::Ordering,
    fmt::{Display, Formatter},
    hash::{Hash, Hasher},
};

pub use uuid::Uuid;

use crate::error::RamifyError;

/// The ramify workspace namespace UUID. Anchors the id namespace chain: page
/// ids are minted in this namespace, block ids in their page's namespace.
pub const UUID_NAMESPACE_RAMIFY: Uuid = Uuid::from_bytes([
    0x84, 0x5c, 0x9e, 0x12, 0x7b, 0x3a, 0x4f, 0x08, 0xb1, 0x6d, 0x2e, 0x91, 0xc4, 0x57, 0xaa, 0x19,
]);

/// The stub namespace UUID. Stub ids are [Uuid::new_v5] digests of a
/// normalized target name in this namespace, so every forward reference to
/// the same name lands on the same placeholder id.
pub const UUID_NAMESPACE_STUB: Uuid = Uuid::from_bytes([
    0x3f, 0xd0, 0x44, 0xa7, 0x15, 0x88, 0x4c, 0xe2, 0x9b, 0x02, 0x6f, 0xec, 0x31, 0x78, 0x5d, 0xb6,
]);

pub const NID_NAMESPACE_NIL: [u8; 6] = [0; 6];

/// Create a [Uuid::new_v5] from an input UUID mixed with
/// [UUID_NAMESPACE_RAMIFY]. The least significant 48 bits (octets 10-15) are
/// used by node ids to associate a node with its generating scope. See [Nid].
pub fn generate_namespace<U: AsRef<Uuid>>(node: U) -> Nid {
    Nid(Uuid::new_v5(
        &UUID_NAMESPACE_RAMIFY,
        node.as_ref().as_bytes(),
    ))
}

/// Node ID
///
/// A v6 UUID whose node-id field is derived from a scope id (the workspace
/// for pages, the owning page for blocks) by folding the scope through
/// [UUID_NAMESPACE_RAMIFY] with [Uuid::new_v5]. Because the timestamp fields
/// lead, `Nid`s are `Ord` first chronologically within the generating
/// process, then by scope namespace.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Nid(Uuid);

impl Nid {
    pub fn new<U: AsRef<Nid>>(scope: U) -> Self {
        Nid(Uuid::now_v6(&scope.as_ref().namespace_bytes()))
    }

    /// The workspace anchor id, scope for freshly minted page ids.
    pub fn workspace() -> Self {
        Nid(UUID_NAMESPACE_RAMIFY)
    }

    /// Deterministic placeholder id for a target known only by name. Two
    /// references to the same normalized name share one id.
    pub fn for_name(name: &str) -> Self {
        Nid(Uuid::new_v5(&UUID_NAMESPACE_STUB, name.as_bytes()))
    }

    /// Use a [Nid::nil] when generating temporary ids in order to identify
    /// that the item has no known scope yet.
    pub fn nil() -> Self {
        Nid(Uuid::nil())
    }

    pub fn initialized(&self) -> bool {
        self.scope_namespace_bytes() != NID_NAMESPACE_NIL
    }

    /// The least significant 6 bytes of the id buffer. Per the v6 layout and
    /// [Nid::new], these bytes key the identity of the generating scope.
    pub fn scope_namespace_bytes(&self) -> [u8; 6] {
        // UUIDs always carry 16 bytes
        self.0.as_bytes()[10..16].try_into().unwrap()
    }

    /// The namespace this id stamps onto ids minted under it.
    pub fn namespace_bytes(&self) -> [u8; 6] {
        generate_namespace(self).scope_namespace_bytes()
    }

    /// Filter function matching ids whose [Nid::scope_namespace_bytes] were
    /// minted under this id.
    pub fn is_scope_filter<U>(&self) -> impl Fn(&U) -> bool
    where
        U: AsRef<Nid>,
    {
        let namespace = self.namespace_bytes();
        move |id: &U| id.as_ref().scope_namespace_bytes() == namespace
    }
}

impl Default for Nid {
    fn default() -> Self {
        Nid::new(Nid::nil())
    }
}

impl AsRef<Uuid> for Nid {
    fn as_ref(&self) -> &Uuid {
        &self.0
    }
}

impl AsRef<Nid> for Nid {
    fn as_ref(&self) -> &Nid {
        self
    }
}

impl From<Uuid> for Nid {
    fn from(id: Uuid) -> Self {
        Nid(id)
    }
}

impl TryFrom<&str> for Nid {
    type Error = RamifyError;

    fn try_from(string: &str) -> Result<Self, Self::Error> {
        Ok(Nid(Uuid::parse_str(string)?))
    }
}

impl TryFrom<&[u8]> for Nid {
    type Error = RamifyError;

    fn try_from(blob: &[u8]) -> Result<Self, Self::Error> {
        Ok(Nid(Uuid::from_slice(blob)?))
    }
}

impl Display for Nid {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            self.0.hyphenated().encode_lower(&mut Uuid::encode_buffer())
        )
    }
}

impl From<&Nid> for String {
    fn from(val: &Nid) -> Self {
        format!("{val}")
    }
}

impl From<Nid> for String {
    fn from(val: Nid) -> Self {
        format!("{val}")
    }
}

/// Discriminates the two entity classes an edge endpoint can name.
#[derive(
    Clone, Copy, Debug, Default, Serialize, Deserialize, Hash, PartialEq, Eq, PartialOrd, Ord,
)]
pub enum NodeType {
    #[default]
    Block,
    Page,
}

impl Display for NodeType {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            NodeType::Block => write!(f, "block"),
            NodeType::Page => write!(f, "page"),
        }
    }
}

/// [LinkKind] enumerates the reference classes a content scan can produce.
/// Graph queries filter by an [EnumSet] of these options.
#[derive(Debug, Default, Serialize, Deserialize, PartialOrd, Ord, Hash, EnumSetType)]
#[enumset(repr = "u32")]
pub enum LinkKind {
    /// `[[Name]]` or `[[Name|Alias]]`, resolved by page name.
    #[default]
    PageRef,
    /// `((id))`, resolved by exact block id.
    BlockRef,
    /// `#tag` or `@mention`, resolved as a page name.
    Tag,
    /// `{{embed ...}}` wrapping a page or block reference.
    Embed,
}

impl LinkKind {
    pub fn base_strength(&self) -> f32 {
        match self {
            LinkKind::PageRef | LinkKind::BlockRef => 1.0,
            LinkKind::Tag => 0.75,
            LinkKind::Embed => 1.5,
        }
    }
}

impl Display for LinkKind {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Ceiling for derived edge strength.
pub const STRENGTH_CAP: f32 = 3.0;

/// Strength added per repeat reference beyond the first between one
/// source/target pair.
pub const STRENGTH_REPEAT_STEP: f32 = 0.5;

/// Derived edge weight: link-kind base plus a repeat-reference bonus, capped
/// at [STRENGTH_CAP]. `occurrences` is at least 1.
pub fn edge_strength(kind: LinkKind, occurrences: u32) -> f32 {
    let repeats = occurrences.saturating_sub(1) as f32;
    (kind.base_strength() + STRENGTH_REPEAT_STEP * repeats).min(STRENGTH_CAP)
}

/// Subtree removal policy for block deletion. Callers choose explicitly;
/// there is no implicit default.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum DeletePolicy {
    /// Remove the block and its entire subtree.
    Cascade,
    /// Remove only the named block; its direct children take its place under
    /// its former parent, preserving their relative order.
    Promote,
}

impl Display for DeletePolicy {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            DeletePolicy::Cascade => write!(f, "cascade"),
            DeletePolicy::Promote => write!(f, "promote"),
        }
    }
}

/// Spacing between appended sibling order keys. Wide gaps keep midpoint
/// insertion cheap before a rebalance becomes necessary.
pub const ORDER_STEP: f64 = 64.0;

/// Fractional sibling position. Strictly increasing and unique among the
/// children of one parent; compared by [f64::total_cmp] so the type can key
/// ordered collections.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct OrderKey(f64);

impl OrderKey {
    pub const fn new(value: f64) -> Self {
        OrderKey(value)
    }

    pub const fn zero() -> Self {
        OrderKey(0.0)
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    /// Key one step past this one, for appending after the last sibling.
    pub fn after(&self) -> OrderKey {
        OrderKey(self.0 + ORDER_STEP)
    }

    /// Key one step before this one, for prepending before the first sibling.
    pub fn before(&self) -> OrderKey {
        OrderKey(self.0 - ORDER_STEP)
    }

    /// Key strictly between two neighbors, or `None` once f64 precision is
    /// exhausted between them and the sibling range must be renumbered.
    pub fn midpoint(lo: OrderKey, hi: OrderKey) -> Option<OrderKey> {
        if lo.0 >= hi.0 {
            return None;
        }
        let mid = lo.0 + (hi.0 - lo.0) / 2.0;
        if mid > lo.0 && mid < hi.0 {
            Some(OrderKey(mid))
        } else {
            None
        }
    }
}

impl PartialEq for OrderKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0) == Ordering::Equal
    }
}

impl Eq for OrderKey {}

impl PartialOrd for OrderKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl Hash for OrderKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl Display for OrderKey {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A named container of one block tree; also a valid link target.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Page {
    pub id: Nid,
    /// Display name as entered, trimmed. Registry lookups go through the
    /// normalized form, not this field.
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Page {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Page {
            id: Nid::new(Nid::workspace()),
            name: name.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// A single outline content unit, one node in a page's tree.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Block {
    pub id: Nid,
    /// Owning page. Never changes over the block's lifetime.
    pub page: Nid,
    /// `None` for roots directly under the page.
    pub parent: Option<Nid>,
    pub order: OrderKey,
    pub content: String,
    pub collapsed: bool,
    /// Cached count of direct children, maintained by the store.
    pub child_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Block {
    pub fn new(page: Nid, parent: Option<Nid>, order: OrderKey, content: impl Into<String>) -> Self {
        let now = Utc::now();
        Block {
            id: Nid::new(page),
            page,
            parent,
            order,
            content: content.into(),
            collapsed: false,
            child_count: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A derived, directed reference from a source entity to a target entity.
///
/// Identity is the `(source, target, kind)` triple; `occurrences`,
/// `strength` and `discovered_at` are payload and do not participate in
/// equality or ordering, so an edge set replaces an edge when only its
/// payload shifted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LinkEdge {
    pub source: Nid,
    pub source_type: NodeType,
    pub target: Nid,
    pub target_type: NodeType,
    pub kind: LinkKind,
    /// How many times the source content references this target with this
    /// kind. At least 1.
    pub occurrences: u32,
    pub strength: f32,
    pub discovered_at: DateTime<Utc>,
}

impl LinkEdge {
    pub fn new(
        source: Nid,
        source_type: NodeType,
        target: Nid,
        target_type: NodeType,
        kind: LinkKind,
        occurrences: u32,
    ) -> Self {
        LinkEdge {
            source,
            source_type,
            target,
            target_type,
            kind,
            occurrences,
            strength: edge_strength(kind, occurrences),
            discovered_at: Utc::now(),
        }
    }

    pub fn identity(&self) -> (Nid, Nid, LinkKind) {
        (self.source, self.target, self.kind)
    }
}

impl PartialEq for LinkEdge {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for LinkEdge {}

impl PartialOrd for LinkEdge {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LinkEdge {
    fn cmp(&self, other: &Self) -> Ordering {
        self.identity().cmp(&other.identity())
    }
}

impl Hash for LinkEdge {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

impl Display for LinkEdge {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "{} -[{} x{}]-> {}",
            self.source, self.kind, self.occurrences, self.target
        )
    }
}
