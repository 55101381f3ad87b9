//! Note position computation and viewport clamping.
//!
//! # Responsibility
//! - Derive a note's document-absolute coordinates from its placement.
//! - Keep displayed notes fully inside the viewport margin band.
//!
//! # Invariants
//! - Anchored positions are anchor top-left plus stored offset; a failed
//!   resolve yields `None`, never a guessed position.
//! - `ensure_visible` does not touch a note already inside the band, and
//!   clamps each axis independently so a note is never pushed off-screen
//!   on one axis to fix the other.

use crate::anchor::resolver::ElementResolver;
use crate::dom::{NodeId, PageDocument, Point};
use crate::model::note::{NoteId, NotePatch, NotePlacement, NoteRecord, Offset, SelectionContext};
use log::debug;

/// Margin the viewport clamp keeps between a note and every edge.
pub const VIEWPORT_MARGIN: f64 = 10.0;

/// Engine-owned placement state derived from an external note record.
///
/// Exactly one placement variant is authoritative at any time; switching
/// is an explicit transition performed by drag handling or anchor-loss
/// fallback.
#[derive(Debug, Clone)]
pub struct NoteAnchorState {
    pub note_id: NoteId,
    pub placement: NotePlacement,
    pub selection: Option<SelectionContext>,
}

impl NoteAnchorState {
    pub fn from_record(record: &NoteRecord) -> Self {
        Self {
            note_id: record.id,
            placement: record.placement.clone(),
            selection: record.selection.clone(),
        }
    }
}

/// Computes the note's document-absolute top-left.
///
/// Anchored notes resolve their anchor first; `None` means the anchor is
/// currently lost and the caller keeps the prior position or hides the
/// note. Free notes use their stored coordinates directly.
pub fn compute_position(
    doc: &PageDocument,
    resolver: &mut ElementResolver,
    state: &NoteAnchorState,
) -> Option<Point> {
    match &state.placement {
        NotePlacement::Anchored { anchor, offset } => {
            let element = resolver.resolve(doc, anchor)?;
            let rect = doc.rect(element)?;
            Some(Point::new(rect.x + offset.x, rect.y + offset.y))
        }
        NotePlacement::Free { x, y } => Some(Point::new(*x, *y)),
    }
}

/// Clamps `note_el` into the viewport margin band.
///
/// Returns a placement patch only when the clamp moved an anchored note:
/// the offset is back-computed against the anchor so future placements
/// start from the corrected position instead of re-clamping every time.
pub fn ensure_visible(
    doc: &mut PageDocument,
    resolver: &mut ElementResolver,
    note_el: NodeId,
    state: &mut NoteAnchorState,
) -> Option<NotePatch> {
    let rect = doc.rect(note_el)?;
    let viewport = *doc.viewport();

    let vp_x = rect.x - viewport.scroll_x;
    let vp_y = rect.y - viewport.scroll_y;
    let clamped_x = clamp_axis(vp_x, rect.width, viewport.width);
    let clamped_y = clamp_axis(vp_y, rect.height, viewport.height);

    if clamped_x == vp_x && clamped_y == vp_y {
        return None;
    }

    let new_x = clamped_x + viewport.scroll_x;
    let new_y = clamped_y + viewport.scroll_y;
    doc.move_to(note_el, new_x, new_y);
    debug!(
        "event=ensure_visible module=position status=clamped note_id={} x={new_x} y={new_y}",
        state.note_id
    );

    // Only anchored notes get a corrected offset proposed back to the
    // store; a free note's clamp is visual and reapplied on demand.
    match &state.placement {
        NotePlacement::Anchored { anchor, .. } => {
            let anchor_el = resolver.resolve(doc, anchor)?;
            let anchor_rect = doc.rect(anchor_el)?;
            let corrected = Offset::new(new_x - anchor_rect.x, new_y - anchor_rect.y);
            let placement = NotePlacement::Anchored {
                anchor: anchor.clone(),
                offset: corrected,
            };
            state.placement = placement.clone();
            Some(NotePatch::with_placement(placement))
        }
        NotePlacement::Free { .. } => None,
    }
}

/// Clamps one axis into `[margin, extent - margin - size]`, preferring
/// the leading edge when the note is larger than the band.
fn clamp_axis(position: f64, size: f64, extent: f64) -> f64 {
    let min = VIEWPORT_MARGIN;
    let max = extent - VIEWPORT_MARGIN - size;
    if max < min {
        return min;
    }
    position.clamp(min, max)
}
