//! The canonical block tree.
//!
//! [`BlockStore`] owns every page and block of a workspace: an id-addressed
//! arena plus ordered sibling lists. Sibling order lives in fractional
//! [`crate::properties::OrderKey`]s so an insert normally touches one row;
//! the placement math for that lives in [`order`]. Mutations report a
//! [`TreeDelta`] naming exactly the rows a storage layer would need to
//! re-persist.

mod base;
pub(crate) mod order;
#[cfg(test)]
mod tests;

pub use base::{BlockStore, TreeDelta};
