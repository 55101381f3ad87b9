//! Pointer-drag state machine for note repositioning and re-anchoring.
//!
//! # Responsibility
//! - Turn pointer-down/move/up sequences into live note movement,
//!   edge auto-scroll and a terminal placement outcome.
//! - Evaluate hovered elements against the anchorable predicate and mark
//!   the current drop candidate.
//!
//! # Invariants
//! - Movement strictly below the pixel threshold never leaves `Armed`,
//!   preserving click-through; movement at or beyond it always does.
//! - The session is destroyed unconditionally on pointer-up or cancel.
//! - A failed anchor generation on release degrades to an offset or
//!   absolute update; the position change is never silently dropped.

use crate::anchor::selector::generate_anchor;
use crate::dom::{NodeId, PageDocument, Point};
use crate::highlight::manager::HIGHLIGHT_CLASS;
use crate::model::note::{Anchor, NoteId, Offset};
use log::debug;

/// Class carried by every note overlay element.
pub const NOTE_CLASS: &str = "webnote-note";

/// Class marking the current drop candidate while dragging.
pub const DROP_TARGET_CLASS: &str = "webnote-drop-target";

/// Pixel movement required before a press becomes a drag.
pub const DRAG_THRESHOLD_PX: f64 = 5.0;

/// Distance from a viewport edge that triggers auto-scroll.
const EDGE_SCROLL_BAND: f64 = 40.0;

/// Scroll applied per pointer-move while inside the edge band.
const EDGE_SCROLL_STEP: f64 = 20.0;

/// Minimum width/height for an element to accept an anchor.
const MIN_ANCHORABLE_SIZE: f64 = 10.0;

/// Pointer position in viewport-relative coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerInput {
    pub x: f64,
    pub y: f64,
}

impl PointerInput {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Terminal placement change produced by a completed drag.
#[derive(Debug, Clone, PartialEq)]
pub enum DragOutcome {
    /// The note re-anchored to a new element.
    Reanchored { anchor: Anchor, offset: Offset },
    /// The note kept its anchor with a recomputed offset.
    OffsetUpdated { offset: Offset },
    /// The note became (or stayed) free-floating at these coordinates.
    MovedFree { x: f64, y: f64 },
}

/// Result of a pointer-up delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum DragEnd {
    /// No session was active.
    Idle,
    /// The threshold was never exceeded; treat as a plain click.
    Click,
    /// A drag completed with a placement outcome.
    Completed { note_id: NoteId, outcome: DragOutcome },
}

#[derive(Debug)]
struct DragSession {
    note_id: NoteId,
    note_el: NodeId,
    /// Pointer position at press, viewport coordinates.
    press_pointer: PointerInput,
    /// Pointer-to-note-origin distance, document coordinates. Constant
    /// for the whole session so the note tracks the pointer exactly.
    grab_offset: Point,
    /// Note origin at press, for cancel restoration.
    press_origin: Point,
    /// Element the note was anchored to when the session started.
    original_anchor_el: Option<NodeId>,
    original_style: Option<String>,
    candidate: Option<NodeId>,
}

#[derive(Debug)]
enum Phase {
    Idle,
    Armed(DragSession),
    Dragging(DragSession),
}

/// Engine-owned drag state machine; one session at a time.
pub struct DragController {
    phase: Phase,
    threshold: f64,
}

impl Default for DragController {
    fn default() -> Self {
        Self::new()
    }
}

impl DragController {
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            threshold: DRAG_THRESHOLD_PX,
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self.phase, Phase::Idle)
    }

    /// Note owning the current session, if any.
    pub fn active_note(&self) -> Option<NoteId> {
        match &self.phase {
            Phase::Idle => None,
            Phase::Armed(session) | Phase::Dragging(session) => Some(session.note_id),
        }
    }

    /// Arms a session for `note_el`. Any prior session is canceled first
    /// (exit-then-enter, never nested).
    pub fn pointer_down(
        &mut self,
        doc: &mut PageDocument,
        note_id: NoteId,
        note_el: NodeId,
        original_anchor_el: Option<NodeId>,
        pointer: PointerInput,
    ) {
        if self.is_active() {
            self.cancel(doc);
        }
        let Some(rect) = doc.rect(note_el) else {
            return;
        };
        let pointer_doc = doc
            .viewport()
            .to_document(Point::new(pointer.x, pointer.y));
        self.phase = Phase::Armed(DragSession {
            note_id,
            note_el,
            press_pointer: pointer,
            grab_offset: Point::new(pointer_doc.x - rect.x, pointer_doc.y - rect.y),
            press_origin: rect.origin(),
            original_anchor_el,
            original_style: doc.style(note_el).map(|s| s.to_string()),
            candidate: None,
        });
    }

    /// Delivers a pointer move. Returns `true` while a drag is live.
    pub fn pointer_move(&mut self, doc: &mut PageDocument, pointer: PointerInput) -> bool {
        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Idle => false,
            Phase::Armed(session) => {
                let dx = pointer.x - session.press_pointer.x;
                let dy = pointer.y - session.press_pointer.y;
                if (dx * dx + dy * dy).sqrt() < self.threshold {
                    self.phase = Phase::Armed(session);
                    return false;
                }
                apply_drag_feedback(doc, session.note_el, session.original_style.as_deref());
                debug!(
                    "event=drag_start module=drag status=ok note_id={}",
                    session.note_id
                );
                self.phase = Phase::Dragging(session);
                self.track_pointer(doc, pointer);
                true
            }
            Phase::Dragging(session) => {
                self.phase = Phase::Dragging(session);
                self.track_pointer(doc, pointer);
                true
            }
        }
    }

    /// Completes the session.
    pub fn pointer_up(&mut self, doc: &mut PageDocument, pointer: PointerInput) -> DragEnd {
        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Idle => DragEnd::Idle,
            Phase::Armed(_) => DragEnd::Click,
            Phase::Dragging(session) => {
                // One last tracking step so the outcome sees the final
                // pointer position.
                self.phase = Phase::Dragging(session);
                self.track_pointer(doc, pointer);
                let Phase::Dragging(session) = std::mem::replace(&mut self.phase, Phase::Idle)
                else {
                    return DragEnd::Idle;
                };
                clear_drag_feedback(doc, &session);

                let outcome = terminal_outcome(doc, &session);
                debug!(
                    "event=drag_end module=drag status=ok note_id={} outcome={}",
                    session.note_id,
                    outcome_name(&outcome)
                );
                DragEnd::Completed {
                    note_id: session.note_id,
                    outcome,
                }
            }
        }
    }

    /// Discards the session without persisting, restoring the note to
    /// its press-time position. Returns whether a session existed.
    pub fn cancel(&mut self, doc: &mut PageDocument) -> bool {
        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Idle => false,
            Phase::Armed(session) => {
                clear_drag_feedback(doc, &session);
                true
            }
            Phase::Dragging(session) => {
                doc.move_to(session.note_el, session.press_origin.x, session.press_origin.y);
                clear_drag_feedback(doc, &session);
                debug!(
                    "event=drag_cancel module=drag status=ok note_id={}",
                    session.note_id
                );
                true
            }
        }
    }

    fn track_pointer(&mut self, doc: &mut PageDocument, pointer: PointerInput) {
        let Phase::Dragging(session) = &mut self.phase else {
            return;
        };

        // Near-edge auto-scroll; the note position is derived from the
        // document-space pointer afterwards, so it tracks the pointer
        // through the scroll.
        let viewport = *doc.viewport();
        let mut dx = 0.0;
        let mut dy = 0.0;
        if pointer.x < EDGE_SCROLL_BAND {
            dx = -EDGE_SCROLL_STEP;
        } else if pointer.x > viewport.width - EDGE_SCROLL_BAND {
            dx = EDGE_SCROLL_STEP;
        }
        if pointer.y < EDGE_SCROLL_BAND {
            dy = -EDGE_SCROLL_STEP;
        } else if pointer.y > viewport.height - EDGE_SCROLL_BAND {
            dy = EDGE_SCROLL_STEP;
        }
        if dx != 0.0 || dy != 0.0 {
            doc.viewport_mut().scroll_by(dx, dy);
        }

        let pointer_doc = doc
            .viewport()
            .to_document(Point::new(pointer.x, pointer.y));
        doc.move_to(
            session.note_el,
            pointer_doc.x - session.grab_offset.x,
            pointer_doc.y - session.grab_offset.y,
        );

        let hovered = doc
            .element_at_point(pointer_doc, Some(session.note_el))
            .filter(|&el| is_anchorable(doc, el));
        if hovered != session.candidate {
            if let Some(previous) = session.candidate {
                doc.remove_class(previous, DROP_TARGET_CLASS);
            }
            if let Some(next) = hovered {
                doc.add_class(next, DROP_TARGET_CLASS);
            }
            session.candidate = hovered;
        }
    }
}

/// Whether an element may receive an anchor: attached, visibly sized,
/// and not part of the overlay itself.
pub fn is_anchorable(doc: &PageDocument, element: NodeId) -> bool {
    if !doc.is_attached(element) || element == doc.root() {
        return false;
    }
    let Some(rect) = doc.rect(element) else {
        return false;
    };
    if rect.width < MIN_ANCHORABLE_SIZE || rect.height < MIN_ANCHORABLE_SIZE {
        return false;
    }
    !doc.has_class(element, NOTE_CLASS) && !doc.has_class(element, HIGHLIGHT_CLASS)
}

fn terminal_outcome(doc: &PageDocument, session: &DragSession) -> DragOutcome {
    let origin = doc
        .rect(session.note_el)
        .map(|r| r.origin())
        .unwrap_or(session.press_origin);

    if let Some(candidate) = session.candidate {
        if Some(candidate) != session.original_anchor_el {
            let anchor = generate_anchor(doc, candidate);
            if anchor.is_resolvable() {
                if let Some(rect) = doc.rect(candidate) {
                    return DragOutcome::Reanchored {
                        anchor,
                        offset: Offset::new(origin.x - rect.x, origin.y - rect.y),
                    };
                }
            }
            debug!(
                "event=drag_end module=drag status=reanchor_failed note_id={}",
                session.note_id
            );
        }
    }

    if let Some(anchor_el) = session.original_anchor_el {
        if doc.is_attached(anchor_el) {
            if let Some(rect) = doc.rect(anchor_el) {
                return DragOutcome::OffsetUpdated {
                    offset: Offset::new(origin.x - rect.x, origin.y - rect.y),
                };
            }
        }
    }

    DragOutcome::MovedFree {
        x: origin.x,
        y: origin.y,
    }
}

fn apply_drag_feedback(doc: &mut PageDocument, note_el: NodeId, original_style: Option<&str>) {
    let base = original_style.unwrap_or("");
    doc.set_style(note_el, &format!("{base} opacity: 0.85; z-index: 2147483647;"));
}

fn clear_drag_feedback(doc: &mut PageDocument, session: &DragSession) {
    match &session.original_style {
        Some(style) => doc.set_style(session.note_el, style),
        None => doc.set_style(session.note_el, ""),
    }
    if let Some(candidate) = session.candidate {
        doc.remove_class(candidate, DROP_TARGET_CLASS);
    }
}

fn outcome_name(outcome: &DragOutcome) -> &'static str {
    match outcome {
        DragOutcome::Reanchored { .. } => "reanchored",
        DragOutcome::OffsetUpdated { .. } => "offset_updated",
        DragOutcome::MovedFree { .. } => "moved_free",
    }
}
