//! Highlight wrapper lifecycle.
//!
//! # Responsibility
//! - Create and remove the styled wrapper marking a note's selection span.
//! - Track one live record per note and cap total tracked highlights.
//!
//! # Invariants
//! - `create` removes any existing highlight for the note first, so
//!   repeated creation never stacks wrappers.
//! - `remove` merges the split text nodes back, leaving the container's
//!   text content byte-identical to the pre-highlight state.
//! - Above the hard cap, oldest-inserted records are force-removed; this
//!   is a safety valve, not an LRU policy.

use crate::anchor::locator::locate_selection;
use crate::dom::{NodeId, PageDocument};
use crate::highlight::color::sanitize_color;
use crate::model::note::{NoteId, SelectionContext};
use log::{debug, warn};
use std::collections::HashMap;
use std::collections::VecDeque;

/// Class marking highlight wrapper elements; the drag controller uses it
/// to exclude highlights from anchor candidates.
pub const HIGHLIGHT_CLASS: &str = "webnote-highlight";

/// Hard cap on simultaneously tracked highlights per page.
const MAX_TRACKED_HIGHLIGHTS: usize = 100;

/// Live highlight bookkeeping for one note.
#[derive(Debug, Clone)]
pub struct HighlightRecord {
    pub note_id: NoteId,
    pub wrapper: NodeId,
    /// Container element the selection was located in at creation time.
    pub anchor_element: NodeId,
    /// Exact wrapped text, kept for restoration checks.
    pub original_text: String,
}

/// Engine-owned highlight registry.
#[derive(Default)]
pub struct HighlightManager {
    records: HashMap<NoteId, HighlightRecord>,
    insertion_order: VecDeque<NoteId>,
}

impl HighlightManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps the note's selection span inside `container`.
    ///
    /// Returns `false` when the selection text cannot be located; the
    /// note itself still displays in that case.
    pub fn create(
        &mut self,
        doc: &mut PageDocument,
        note_id: NoteId,
        ctx: &SelectionContext,
        container: NodeId,
        color: &str,
    ) -> bool {
        self.remove(doc, note_id);

        let Some((text_node, offset)) = locate_selection(doc, container, ctx) else {
            debug!("event=highlight_create module=highlight status=text_not_found note_id={note_id}");
            return false;
        };

        // First split isolates the span start, second the span end. The
        // locator matched the exact bytes, so both offsets sit on char
        // boundaries.
        let target = if offset > 0 {
            match doc.split_text(text_node, offset) {
                Some(tail) => tail,
                None => return false,
            }
        } else {
            text_node
        };
        let span_len = ctx.text.len();
        let target_len = doc.text(target).map(|t| t.len()).unwrap_or(0);
        if span_len < target_len && doc.split_text(target, span_len).is_none() {
            return false;
        }

        let wrapper = doc.create_element("span");
        doc.add_class(wrapper, HIGHLIGHT_CLASS);
        doc.set_style(
            wrapper,
            &format!("background-color: {};", sanitize_color(color)),
        );
        doc.set_rect(wrapper, ctx.rect);

        let Some(parent) = doc.parent(target) else {
            return false;
        };
        doc.insert_before(parent, wrapper, target);
        doc.append_child(wrapper, target);

        self.records.insert(
            note_id,
            HighlightRecord {
                note_id,
                wrapper,
                anchor_element: container,
                original_text: ctx.text.clone(),
            },
        );
        self.insertion_order.push_back(note_id);
        debug!("event=highlight_create module=highlight status=ok note_id={note_id}");

        self.enforce_cap(doc);
        true
    }

    /// Unwraps the note's highlight and merges the text back together.
    /// Returns `false` when no record exists.
    pub fn remove(&mut self, doc: &mut PageDocument, note_id: NoteId) -> bool {
        let Some(record) = self.records.remove(&note_id) else {
            return false;
        };
        self.insertion_order.retain(|&id| id != note_id);

        if let Some(parent) = doc.parent(record.wrapper) {
            let text = doc.text_content(record.wrapper);
            let replacement = doc.create_text(&text);
            doc.replace_child(record.wrapper, replacement);
            doc.normalize(parent);
        }
        debug!("event=highlight_remove module=highlight status=ok note_id={note_id}");
        true
    }

    /// Removes every tracked highlight; called on navigation teardown.
    pub fn clear(&mut self, doc: &mut PageDocument) {
        let ids: Vec<NoteId> = self.insertion_order.iter().copied().collect();
        for id in ids {
            self.remove(doc, id);
        }
    }

    pub fn record(&self, note_id: NoteId) -> Option<&HighlightRecord> {
        self.records.get(&note_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn enforce_cap(&mut self, doc: &mut PageDocument) {
        while self.records.len() > MAX_TRACKED_HIGHLIGHTS {
            let Some(oldest) = self.insertion_order.front().copied() else {
                break;
            };
            warn!(
                "event=highlight_cap module=highlight status=evicted note_id={oldest} tracked={}",
                self.records.len()
            );
            self.remove(doc, oldest);
        }
    }
}
