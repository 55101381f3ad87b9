//! Note record, placement union and selection context.
//!
//! # Responsibility
//! - Model externally persisted note state consumed by the engine.
//! - Validate records at the store boundary so engine internals can rely
//!   on well-formed data.
//!
//! # Invariants
//! - An `Anchored` placement always carries at least one selector.
//! - `SelectionContext` is immutable once captured and its text length
//!   is bounded.
//! - The engine never mutates a `NoteRecord` in place; changes travel as
//!   `NotePatch` proposals.

use crate::dom::geometry::Rect;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier for a note.
pub type NoteId = Uuid;

/// Upper bound for captured selection text, in characters.
pub const MAX_SELECTION_TEXT_CHARS: usize = 512;

/// Upper bound for each context snippet, in characters.
pub const MAX_CONTEXT_SNIPPET_CHARS: usize = 50;

/// Default sticky-note background, used when stored color input fails
/// sanitization.
pub const DEFAULT_NOTE_COLOR: &str = "#fff9c4";

/// Validation failures raised at the store boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoteValidationError {
    /// Note content is empty after trimming.
    EmptyContent,
    /// Captured selection text exceeds `MAX_SELECTION_TEXT_CHARS`.
    SelectionTextTooLong { chars: usize, max: usize },
    /// Selection text is empty.
    EmptySelectionText,
    /// Anchored placement carries no selector at all.
    AnchorWithoutSelectors,
    /// Free placement coordinates are not finite numbers.
    NonFiniteCoordinates,
}

impl Display for NoteValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyContent => write!(f, "note content must not be empty"),
            Self::SelectionTextTooLong { chars, max } => {
                write!(f, "selection text has {chars} chars, maximum is {max}")
            }
            Self::EmptySelectionText => write!(f, "selection text must not be empty"),
            Self::AnchorWithoutSelectors => {
                write!(f, "anchored placement requires at least one selector")
            }
            Self::NonFiniteCoordinates => write!(f, "placement coordinates must be finite"),
        }
    }
}

impl Error for NoteValidationError {}

/// Selector pair identifying the page content a note is attached to.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Anchor {
    /// Structural selector (id/class/nth chains), tried first.
    pub primary_selector: Option<String>,
    /// Positional path expression, tried when the primary fails.
    pub fallback_selector: Option<String>,
}

impl Anchor {
    pub fn new(primary: Option<String>, fallback: Option<String>) -> Self {
        Self {
            primary_selector: primary,
            fallback_selector: fallback,
        }
    }

    /// Whether any selector is present at all.
    pub fn is_resolvable(&self) -> bool {
        self.primary_selector.is_some() || self.fallback_selector.is_some()
    }
}

/// Offset from an anchor element's top-left to the note's top-left.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Offset {
    pub x: f64,
    pub y: f64,
}

impl Offset {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Text selection snapshot captured at note creation or re-anchor time.
///
/// Immutable thereafter; the locator uses the context snippets to
/// disambiguate repeated occurrences of `text`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionContext {
    pub text: String,
    pub context_before: String,
    pub context_after: String,
    /// Bounding rectangle of the selection at capture time.
    pub rect: Rect,
}

impl SelectionContext {
    /// Captures a selection, rejecting oversized text and trimming the
    /// context snippets to their documented bound.
    pub fn capture(
        text: impl Into<String>,
        context_before: &str,
        context_after: &str,
        rect: Rect,
    ) -> Result<Self, NoteValidationError> {
        let text = text.into();
        if text.is_empty() {
            return Err(NoteValidationError::EmptySelectionText);
        }
        let chars = text.chars().count();
        if chars > MAX_SELECTION_TEXT_CHARS {
            return Err(NoteValidationError::SelectionTextTooLong {
                chars,
                max: MAX_SELECTION_TEXT_CHARS,
            });
        }
        Ok(Self {
            text,
            context_before: tail_snippet(context_before),
            context_after: head_snippet(context_after),
            rect,
        })
    }
}

/// Keeps the last `MAX_CONTEXT_SNIPPET_CHARS` chars, the part adjacent to
/// the selection.
fn tail_snippet(value: &str) -> String {
    let chars = value.chars().count();
    if chars <= MAX_CONTEXT_SNIPPET_CHARS {
        return value.to_string();
    }
    value
        .chars()
        .skip(chars - MAX_CONTEXT_SNIPPET_CHARS)
        .collect()
}

fn head_snippet(value: &str) -> String {
    value.chars().take(MAX_CONTEXT_SNIPPET_CHARS).collect()
}

/// Authoritative placement state, exactly one variant at a time.
///
/// Switching between the variants is an explicit transition performed by
/// the drag controller or anchor-loss handling, never an implicit field
/// update.
#[derive(Debug, Clone, PartialEq)]
pub enum NotePlacement {
    /// Attached to page content through a selector pair plus offset.
    Anchored { anchor: Anchor, offset: Offset },
    /// Free-floating at absolute document coordinates.
    Free { x: f64, y: f64 },
}

impl NotePlacement {
    pub fn is_anchored(&self) -> bool {
        matches!(self, Self::Anchored { .. })
    }

    fn validate(&self) -> Result<(), NoteValidationError> {
        match self {
            Self::Anchored { anchor, .. } => {
                if !anchor.is_resolvable() {
                    return Err(NoteValidationError::AnchorWithoutSelectors);
                }
                Ok(())
            }
            Self::Free { x, y } => {
                if !x.is_finite() || !y.is_finite() {
                    return Err(NoteValidationError::NonFiniteCoordinates);
                }
                Ok(())
            }
        }
    }
}

/// Externally owned note record, the engine's source of truth.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteRecord {
    pub id: NoteId,
    /// Markdown body.
    pub content: String,
    /// Raw stored color; sanitized before any display use.
    pub background_color: String,
    pub placement: NotePlacement,
    pub selection: Option<SelectionContext>,
    /// Soft visibility flag; inactive notes are listed but not displayed.
    pub is_active: bool,
}

impl NoteRecord {
    /// Creates an anchored note with a generated id.
    pub fn new_anchored(
        content: impl Into<String>,
        anchor: Anchor,
        offset: Offset,
    ) -> Result<Self, NoteValidationError> {
        Self::build(
            content,
            NotePlacement::Anchored { anchor, offset },
            None,
        )
    }

    /// Creates a free-floating note with a generated id.
    pub fn new_free(
        content: impl Into<String>,
        x: f64,
        y: f64,
    ) -> Result<Self, NoteValidationError> {
        Self::build(content, NotePlacement::Free { x, y }, None)
    }

    fn build(
        content: impl Into<String>,
        placement: NotePlacement,
        selection: Option<SelectionContext>,
    ) -> Result<Self, NoteValidationError> {
        let record = Self {
            id: Uuid::new_v4(),
            content: content.into(),
            background_color: DEFAULT_NOTE_COLOR.to_string(),
            placement,
            selection,
            is_active: true,
        };
        record.validate()?;
        Ok(record)
    }

    /// Validates record invariants; the store calls this on every write
    /// and on read-back of persisted rows.
    pub fn validate(&self) -> Result<(), NoteValidationError> {
        if self.content.trim().is_empty() {
            return Err(NoteValidationError::EmptyContent);
        }
        self.placement.validate()?;
        if let Some(selection) = &self.selection {
            if selection.text.is_empty() {
                return Err(NoteValidationError::EmptySelectionText);
            }
            let chars = selection.text.chars().count();
            if chars > MAX_SELECTION_TEXT_CHARS {
                return Err(NoteValidationError::SelectionTextTooLong {
                    chars,
                    max: MAX_SELECTION_TEXT_CHARS,
                });
            }
        }
        Ok(())
    }
}

/// Typed partial update proposed to the external store.
///
/// A `Some(placement)` with the `Free` arm explicitly clears persisted
/// anchor fields; the `Anchored` arm clears absolute coordinates.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NotePatch {
    pub content: Option<String>,
    pub background_color: Option<String>,
    pub placement: Option<NotePlacement>,
    pub is_active: Option<bool>,
}

impl NotePatch {
    pub fn is_empty(&self) -> bool {
        self.content.is_none()
            && self.background_color.is_none()
            && self.placement.is_none()
            && self.is_active.is_none()
    }

    pub fn with_content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    pub fn with_placement(placement: NotePlacement) -> Self {
        Self {
            placement: Some(placement),
            ..Self::default()
        }
    }
}
