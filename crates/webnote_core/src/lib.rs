//! DOM anchoring and positioning engine for page-overlay notes.
//! This crate is the single source of truth for anchor and placement
//! invariants.

pub mod anchor;
pub mod db;
pub mod dom;
pub mod drag;
pub mod highlight;
pub mod logging;
pub mod model;
pub mod position;
pub mod render;
pub mod repo;
pub mod service;

pub use anchor::locator::locate_selection;
pub use anchor::resolver::ElementResolver;
pub use anchor::selector::generate_anchor;
pub use dom::{NodeId, PageDocument, Point, Rect, Viewport};
pub use drag::{DragController, DragEnd, DragOutcome, PointerInput};
pub use highlight::{sanitize_color, HighlightManager};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::note::{
    Anchor, NoteId, NotePatch, NotePlacement, NoteRecord, Offset, SelectionContext,
};
pub use position::{compute_position, ensure_visible, NoteAnchorState};
pub use render::{derive_note_preview, InlineMarkdownRenderer, MarkdownRenderer};
pub use repo::note_repo::{NoteStore, SqliteNoteStore, StoreError, StoreResult};
pub use service::overlay_service::{LoadReport, OverlayError, OverlayService};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
