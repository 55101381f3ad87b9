//! In-memory page document substrate.
//!
//! # Responsibility
//! - Model the host page as an owned element/text arena with layout
//!   geometry and a scrollable viewport.
//! - Provide the traversal, attachment and mutation primitives the
//!   anchoring engine builds on.
//!
//! # Invariants
//! - Node handles stay valid for the document lifetime; detached subtrees
//!   remain allocated but unreachable from the root.
//! - `is_attached` is the only validity oracle engine code may rely on.

pub mod geometry;
pub mod tree;

pub use geometry::{Point, Rect, Viewport};
pub use tree::{ElementData, NodeData, NodeId, PageDocument};
