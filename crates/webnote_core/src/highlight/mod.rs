//! Text-span highlighting.
//!
//! # Responsibility
//! - Wrap and unwrap located selection spans in styled marker elements.
//! - Sanitize untrusted stored color data before it reaches a style
//!   declaration.
//!
//! # Invariants
//! - At most one live highlight per note id; creation always removes any
//!   predecessor first.
//! - Removal restores the surrounding text byte-identically, merging the
//!   split text nodes back together.

pub mod color;
pub mod manager;

pub use color::sanitize_color;
pub use manager::{HighlightManager, HighlightRecord, HIGHLIGHT_CLASS};
