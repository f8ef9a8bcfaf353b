//! Lazy, memoized discovery of the Subject → Model → Category → Element hierarchy
//!
//! A [`HierarchyQueryProvider`] executes primitive queries against a scene
//! data source. [`HierarchyCache`] builds one shared index from them per
//! generation and memoizes grouping-node and element-family resolutions
//! until it is invalidated.

pub mod cache;
pub mod family;
pub mod index;
pub mod memo;
pub mod provider;
pub mod scene_provider;


pub use cache::{CacheStats, ElementAncestry, GroupedElements, HierarchyCache};
pub use family::ElementScope;
pub use index::HierarchyIndex;
pub use memo::SharedCell;
pub use provider::{HierarchyQueryProvider, QueryKind, RowStream, collect_rows};
pub use scene_provider::{QueryStats, SceneProvider};
