//! Hierarchical visibility engine for the models tree
//!
//! [`VisibilityEngine`] computes the [`VisibilityStatus`] of any tree node by
//! combining hierarchy facts from a [`HierarchyCache`] with the display state
//! of a [`Viewport`], and applies visibility changes back to that viewport in
//! batched calls. [`ChangeCoalescer`] folds the viewport's change signals into
//! a single "visibility changed" notification per tick.
//!
//! [`VisibilityStatus`]: arbor_core::VisibilityStatus
//! [`HierarchyCache`]: arbor_hierarchy::HierarchyCache

pub mod coalescer;
pub mod engine;
pub mod error;
pub mod filter;
pub mod node;
pub mod viewport;

#[cfg(test)]
pub mod tests;

pub use coalescer::{ChangeCoalescer, VisibilityChanged};
pub use engine::VisibilityEngine;
pub use error::VisibilityError;
pub use filter::{FilteredHierarchy, FilteredNode};
pub use node::{NodeTarget, classify};
pub use viewport::{ViewState, Viewport, ViewportSignal};
