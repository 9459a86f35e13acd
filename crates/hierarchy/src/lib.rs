//! Organizational hierarchy domain module.
//!
//! Units form a tree (adjacency list). Every node caches its root-to-node
//! `path` so subtree lookups are a string prefix test instead of a recursive
//! query. This crate keeps that cache correct: it is pure domain logic (no IO,
//! no HTTP, no storage); stores persist whatever the forest computes.

pub mod forest;
pub mod node;
pub mod path;
pub mod query;

pub use forest::{HierarchyForest, HierarchyTree};
pub use node::{Hierarchy, HierarchyPatch, HierarchyType, NewHierarchy};
pub use path::{PATH_SEPARATOR, compose_path, is_within};
pub use query::{HierarchyQuery, HierarchySort};
