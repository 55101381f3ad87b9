//! Anchor generation and re-resolution.
//!
//! # Responsibility
//! - Turn live elements into durable selector pairs and selector pairs
//!   back into live elements.
//! - Relocate selection text inside a resolved container.
//!
//! # Invariants
//! - Generated selectors are validated by identity against the element
//!   they were built from before being trusted.
//! - Resolution failures are non-fatal; a lost anchor never deletes the
//!   note that held it.

pub mod locator;
pub mod resolver;
pub mod selector;

pub use locator::locate_selection;
pub use resolver::ElementResolver;
pub use selector::{generate_anchor, SelectorError};
