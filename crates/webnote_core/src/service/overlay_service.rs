//! Page overlay orchestration.
//!
//! # Responsibility
//! - Drive note discovery, display, highlighting, repositioning, drag
//!   handling, editing and deletion for one page at a time.
//! - Propose every persistent change to the external store; never mutate
//!   stored records directly.
//!
//! # Invariants
//! - Batch operations process notes independently; one failing note is
//!   logged and skipped, never aborting the batch.
//! - A lost anchor hides the note until a later resolve succeeds; it
//!   never deletes the note.
//! - Drag and edit sessions follow exit-then-enter: starting a new one
//!   terminates the prior session first.
//! - Navigation tears down all engine-owned state wholesale and re-runs
//!   discovery; there is no incremental reconciliation.

use crate::anchor::resolver::ElementResolver;
use crate::anchor::selector::generate_anchor;
use crate::dom::{NodeId, PageDocument, Rect};
use crate::drag::{DragController, DragEnd, DragOutcome, PointerInput, NOTE_CLASS};
use crate::highlight::color::sanitize_color;
use crate::highlight::manager::HighlightManager;
use crate::model::note::{
    NoteId, NotePatch, NotePlacement, NoteRecord, NoteValidationError, Offset, SelectionContext,
};
use crate::position::{compute_position, ensure_visible, NoteAnchorState};
use crate::render::{derive_note_preview, MarkdownRenderer, NotePreview};
use crate::repo::note_repo::{NoteStore, StoreError};
use crate::service::autosave::{AutosaveScheduler, PendingSave};
use crate::service::collaborators::{ConfirmationPrompt, UserMessenger};
use log::{debug, error, info, warn};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{Duration, Instant};

/// Default note element size when no layout information exists yet.
const NOTE_DEFAULT_WIDTH: f64 = 200.0;
const NOTE_DEFAULT_HEIGHT: f64 = 150.0;

/// Debounce for window-resize repositioning bursts.
const RESIZE_DEBOUNCE: Duration = Duration::from_millis(150);

/// Errors surfaced by overlay operations.
#[derive(Debug)]
pub enum OverlayError {
    /// Page key was blank at initialization; contract violation.
    InvalidPageKey,
    /// Persistence-layer failure.
    Store(StoreError),
    /// Record-level validation failure.
    Validation(NoteValidationError),
    /// Operation targeted a note the overlay does not track.
    NoteNotDisplayed(NoteId),
}

impl Display for OverlayError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidPageKey => write!(f, "page key must not be blank"),
            Self::Store(err) => write!(f, "{err}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::NoteNotDisplayed(id) => write!(f, "note is not displayed: {id}"),
        }
    }
}

impl Error for OverlayError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::Validation(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for OverlayError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<NoteValidationError> for OverlayError {
    fn from(value: NoteValidationError) -> Self {
        Self::Validation(value)
    }
}

/// Outcome counters for one discovery pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Notes rendered on the page.
    pub displayed: usize,
    /// Notes listed but not rendered (inactive or anchor currently lost).
    pub hidden: usize,
    /// Notes skipped because processing them failed.
    pub skipped: usize,
}

/// Engine bookkeeping for one tracked note.
#[derive(Debug)]
struct DisplayedNote {
    /// Overlay element; `None` while the anchor is lost.
    element: Option<NodeId>,
    /// Text node carrying the rendered body, for live re-render on edit.
    content_text: Option<NodeId>,
    state: NoteAnchorState,
    record: NoteRecord,
}

/// Overlay engine facade over the store and UI collaborators.
pub struct OverlayService<S, R, C, M> {
    store: S,
    renderer: R,
    confirm: C,
    messenger: M,
    page_key: String,
    resolver: ElementResolver,
    highlights: HighlightManager,
    drag: DragController,
    autosave: AutosaveScheduler,
    displayed: BTreeMap<NoteId, DisplayedNote>,
    editing: Option<NoteId>,
    resize_deadline: Option<Instant>,
}

impl<S, R, C, M> OverlayService<S, R, C, M>
where
    S: NoteStore,
    R: MarkdownRenderer,
    C: ConfirmationPrompt,
    M: UserMessenger,
{
    /// Creates the overlay for one page.
    ///
    /// # Errors
    /// - `InvalidPageKey` when `page_key` is blank; callers treat this as
    ///   an initialization contract violation and retry later.
    pub fn new(
        page_key: impl Into<String>,
        store: S,
        renderer: R,
        confirm: C,
        messenger: M,
    ) -> Result<Self, OverlayError> {
        let page_key = page_key.into();
        if page_key.trim().is_empty() {
            return Err(OverlayError::InvalidPageKey);
        }
        Ok(Self {
            store,
            renderer,
            confirm,
            messenger,
            page_key,
            resolver: ElementResolver::new(),
            highlights: HighlightManager::new(),
            drag: DragController::new(),
            autosave: AutosaveScheduler::new(),
            displayed: BTreeMap::new(),
            editing: None,
            resize_deadline: None,
        })
    }

    pub fn page_key(&self) -> &str {
        &self.page_key
    }

    pub fn displayed_count(&self) -> usize {
        self.displayed
            .values()
            .filter(|entry| entry.element.is_some())
            .count()
    }

    pub fn note_element(&self, note_id: NoteId) -> Option<NodeId> {
        self.displayed.get(&note_id).and_then(|entry| entry.element)
    }

    /// Current placement the engine tracks for a note.
    pub fn note_placement(&self, note_id: NoteId) -> Option<NotePlacement> {
        self.displayed
            .get(&note_id)
            .map(|entry| entry.state.placement.clone())
    }

    // ---- discovery ---------------------------------------------------------

    /// Loads and displays every note stored for the current page.
    ///
    /// Each note is processed independently: a failure is logged and
    /// counted as skipped without touching the rest of the batch.
    pub fn load_notes(&mut self, doc: &mut PageDocument) -> LoadReport {
        let records = match self.store.list_notes(&self.page_key) {
            Ok(records) => records,
            Err(err) => {
                error!("event=notes_load module=service status=error error={err}");
                self.messenger.notify_error("Failed to load notes");
                return LoadReport::default();
            }
        };

        let mut report = LoadReport::default();
        for record in records {
            let note_id = record.id;
            match self.display_note(doc, record) {
                Ok(true) => report.displayed += 1,
                Ok(false) => report.hidden += 1,
                Err(err) => {
                    error!(
                        "event=note_display module=service status=error note_id={note_id} error={err}"
                    );
                    report.skipped += 1;
                }
            }
        }
        info!(
            "event=notes_load module=service status=ok page_key={} displayed={} hidden={} skipped={}",
            self.page_key, report.displayed, report.hidden, report.skipped
        );
        report
    }

    /// Displays one record, tracking it even when it cannot be rendered
    /// yet. Returns whether the note ended up visible.
    fn display_note(
        &mut self,
        doc: &mut PageDocument,
        record: NoteRecord,
    ) -> Result<bool, OverlayError> {
        if !record.is_active {
            debug!(
                "event=note_display module=service status=inactive note_id={}",
                record.id
            );
            return Ok(false);
        }

        // Exit-then-enter: a redisplay fully replaces the prior element.
        self.remove_display(doc, record.id);

        let mut state = NoteAnchorState::from_record(&record);

        // Highlight before the overlay element exists so the text search
        // cannot run into the note's own rendered body.
        if let Some(ctx) = &state.selection {
            let container = match &state.placement {
                NotePlacement::Anchored { anchor, .. } => self
                    .resolver
                    .resolve(doc, anchor)
                    .unwrap_or_else(|| doc.root()),
                NotePlacement::Free { .. } => doc.root(),
            };
            self.highlights
                .create(doc, record.id, ctx, container, &record.background_color);
        }

        let position = compute_position(doc, &mut self.resolver, &state);
        let (element, content_text) = match position {
            Some(point) => {
                let body = self.renderer.render(&record.content);
                let (el, text) = build_note_element(doc, &record, point, &body);
                (Some(el), Some(text))
            }
            None => {
                info!(
                    "event=note_display module=service status=anchor_lost note_id={}",
                    record.id
                );
                (None, None)
            }
        };

        let mut entry = DisplayedNote {
            element,
            content_text,
            state,
            record,
        };
        if let Some(el) = entry.element {
            if let Some(patch) = ensure_visible(doc, &mut self.resolver, el, &mut entry.state) {
                entry.record.placement = entry.state.placement.clone();
                let note_id = entry.record.id;
                self.persist_patch(note_id, &patch);
            }
        }
        let visible = entry.element.is_some();
        self.displayed.insert(entry.record.id, entry);
        Ok(visible)
    }

    /// Recomputes every tracked note's position, retrying notes whose
    /// anchor was lost and hiding notes whose anchor got lost since.
    pub fn reposition_all(&mut self, doc: &mut PageDocument) {
        let ids: Vec<NoteId> = self.displayed.keys().copied().collect();
        let mut patches: Vec<(NoteId, NotePatch)> = Vec::new();
        let mut retries: Vec<NoteRecord> = Vec::new();

        for id in ids {
            let Some(entry) = self.displayed.get_mut(&id) else {
                continue;
            };
            let Some(el) = entry.element else {
                retries.push(entry.record.clone());
                continue;
            };
            match compute_position(doc, &mut self.resolver, &entry.state) {
                Some(point) => {
                    doc.move_to(el, point.x, point.y);
                    if let Some(patch) =
                        ensure_visible(doc, &mut self.resolver, el, &mut entry.state)
                    {
                        entry.record.placement = entry.state.placement.clone();
                        patches.push((id, patch));
                    }
                }
                None => {
                    info!(
                        "event=reposition module=service status=anchor_lost note_id={id}"
                    );
                    doc.detach(el);
                    entry.element = None;
                    entry.content_text = None;
                }
            }
        }

        for record in retries {
            let note_id = record.id;
            if let Err(err) = self.display_note(doc, record) {
                error!(
                    "event=reposition module=service status=error note_id={note_id} error={err}"
                );
            }
        }
        for (id, patch) in patches {
            self.persist_patch(id, &patch);
        }
    }

    // ---- creation ----------------------------------------------------------

    /// Creates a note anchored to `target` with the given offset.
    ///
    /// When selector generation yields nothing resolvable, the note is
    /// stored free-floating at the equivalent absolute position instead
    /// of being dropped.
    pub fn create_anchored_note(
        &mut self,
        doc: &mut PageDocument,
        target: NodeId,
        content: impl Into<String>,
        color: &str,
        offset: Offset,
        selection: Option<SelectionContext>,
    ) -> Result<NoteId, OverlayError> {
        let content = content.into();
        let anchor = generate_anchor(doc, target);
        let mut record = if anchor.is_resolvable() {
            NoteRecord::new_anchored(content, anchor, offset)?
        } else {
            warn!("event=note_create module=service status=anchor_generation_failed");
            let rect = doc.rect(target).unwrap_or_default();
            NoteRecord::new_free(content, rect.x + offset.x, rect.y + offset.y)?
        };
        record.background_color = color.to_string();
        record.selection = selection;
        record.validate()?;

        self.persist_new(doc, record)
    }

    /// Creates a free-floating note at absolute document coordinates.
    pub fn create_free_note(
        &mut self,
        doc: &mut PageDocument,
        x: f64,
        y: f64,
        content: impl Into<String>,
        color: &str,
    ) -> Result<NoteId, OverlayError> {
        let mut record = NoteRecord::new_free(content, x, y)?;
        record.background_color = color.to_string();
        self.persist_new(doc, record)
    }

    fn persist_new(
        &mut self,
        doc: &mut PageDocument,
        record: NoteRecord,
    ) -> Result<NoteId, OverlayError> {
        let note_id = record.id;
        if let Err(err) = self.store.create_note(&self.page_key, &record) {
            error!("event=note_create module=service status=error note_id={note_id} error={err}");
            self.messenger.notify_error("Failed to save note");
            return Err(err.into());
        }
        self.display_note(doc, record)?;
        info!("event=note_create module=service status=ok note_id={note_id}");
        Ok(note_id)
    }

    // ---- editing and auto-save ---------------------------------------------

    /// Starts an edit session, terminating any prior session first.
    pub fn begin_edit(&mut self, note_id: NoteId) -> Result<(), OverlayError> {
        if !self.displayed.contains_key(&note_id) {
            return Err(OverlayError::NoteNotDisplayed(note_id));
        }
        if let Some(current) = self.editing.take() {
            self.finish_edit_for(current);
        }
        self.editing = Some(note_id);
        Ok(())
    }

    /// Applies an in-progress edit: re-renders the displayed body and
    /// schedules a debounced save, replacing any pending one.
    pub fn edit_content(
        &mut self,
        doc: &mut PageDocument,
        note_id: NoteId,
        content: &str,
        now: Instant,
    ) -> Result<(), OverlayError> {
        let entry = self
            .displayed
            .get_mut(&note_id)
            .ok_or(OverlayError::NoteNotDisplayed(note_id))?;
        if let Some(text_node) = entry.content_text {
            let body = self.renderer.render(content);
            doc.set_text(text_node, &body);
        }
        self.autosave.schedule(note_id, content, now);
        Ok(())
    }

    /// Ends the active edit session, flushing its pending save.
    pub fn end_edit(&mut self) {
        if let Some(note_id) = self.editing.take() {
            self.finish_edit_for(note_id);
        }
    }

    pub fn editing_note(&self) -> Option<NoteId> {
        self.editing
    }

    fn finish_edit_for(&mut self, note_id: NoteId) {
        if let Some(save) = self.autosave.take_for(note_id) {
            self.apply_save(save);
        }
    }

    /// Clock pump: persists due auto-saves and runs a debounced
    /// reposition after resize bursts.
    pub fn tick(&mut self, doc: &mut PageDocument, now: Instant) {
        for save in self.autosave.take_due(now) {
            self.apply_save(save);
        }
        if let Some(deadline) = self.resize_deadline {
            if deadline <= now {
                self.resize_deadline = None;
                self.reposition_all(doc);
            }
        }
    }

    /// Notes a window resize; repositioning runs after the burst settles.
    pub fn notify_resized(&mut self, now: Instant) {
        self.resize_deadline = Some(now + RESIZE_DEBOUNCE);
    }

    fn apply_save(&mut self, save: PendingSave) {
        if let Some(entry) = self.displayed.get_mut(&save.note_id) {
            entry.record.content = save.content.clone();
        }
        let patch = NotePatch::with_content(save.content);
        self.persist_patch(save.note_id, &patch);
    }

    // ---- drag --------------------------------------------------------------

    /// Pointer press on a note. Ignored while the note is being edited
    /// or when the press landed on an interactive sub-control.
    pub fn pointer_down(
        &mut self,
        doc: &mut PageDocument,
        note_id: NoteId,
        pointer: PointerInput,
        on_interactive_control: bool,
    ) {
        if on_interactive_control || self.editing == Some(note_id) {
            return;
        }
        let Some(entry) = self.displayed.get(&note_id) else {
            return;
        };
        let Some(element) = entry.element else {
            return;
        };
        let original_anchor_el = match &entry.state.placement {
            NotePlacement::Anchored { anchor, .. } => self.resolver.resolve(doc, anchor),
            NotePlacement::Free { .. } => None,
        };
        self.drag
            .pointer_down(doc, note_id, element, original_anchor_el, pointer);
    }

    pub fn pointer_move(&mut self, doc: &mut PageDocument, pointer: PointerInput) -> bool {
        self.drag.pointer_move(doc, pointer)
    }

    /// Pointer release: applies the drag outcome, persists the placement
    /// change and runs one final visibility pass.
    pub fn pointer_up(&mut self, doc: &mut PageDocument, pointer: PointerInput) {
        let DragEnd::Completed { note_id, outcome } = self.drag.pointer_up(doc, pointer) else {
            return;
        };

        let placement = {
            let Some(entry) = self.displayed.get(&note_id) else {
                return;
            };
            match outcome {
                DragOutcome::Reanchored { anchor, offset } => {
                    NotePlacement::Anchored { anchor, offset }
                }
                DragOutcome::OffsetUpdated { offset } => match &entry.state.placement {
                    NotePlacement::Anchored { anchor, .. } => NotePlacement::Anchored {
                        anchor: anchor.clone(),
                        offset,
                    },
                    // Offset without an anchor cannot happen mid-session;
                    // degrade to the element's absolute position.
                    NotePlacement::Free { .. } => {
                        let rect = entry
                            .element
                            .and_then(|el| doc.rect(el))
                            .unwrap_or_default();
                        NotePlacement::Free {
                            x: rect.x,
                            y: rect.y,
                        }
                    }
                },
                DragOutcome::MovedFree { x, y } => NotePlacement::Free { x, y },
            }
        };

        if let Some(entry) = self.displayed.get_mut(&note_id) {
            entry.state.placement = placement.clone();
            entry.record.placement = placement.clone();
        }
        self.persist_patch(note_id, &NotePatch::with_placement(placement));

        if let Some(entry) = self.displayed.get_mut(&note_id) {
            if let Some(el) = entry.element {
                if let Some(patch) = ensure_visible(doc, &mut self.resolver, el, &mut entry.state)
                {
                    entry.record.placement = entry.state.placement.clone();
                    persist_patch_via(&self.store, &self.messenger, &self.page_key, note_id, &patch);
                }
            }
        }
    }

    /// Escape key: cancels any drag wholesale and ends the edit session,
    /// flushing its pending save as the best-effort final write.
    pub fn handle_escape(&mut self, doc: &mut PageDocument) {
        self.drag.cancel(doc);
        self.end_edit();
    }

    // ---- deletion ----------------------------------------------------------

    /// Deletes a note after external confirmation.
    ///
    /// The overlay is removed optimistically; when the store rejects the
    /// delete, the note is re-displayed and a failure notice is surfaced.
    pub fn delete_note(
        &mut self,
        doc: &mut PageDocument,
        note_id: NoteId,
    ) -> Result<bool, OverlayError> {
        let record = {
            let entry = self
                .displayed
                .get(&note_id)
                .ok_or(OverlayError::NoteNotDisplayed(note_id))?;
            entry.record.clone()
        };
        if !self.confirm.confirm("Delete this note?") {
            return Ok(false);
        }

        self.autosave.cancel(note_id);
        self.remove_display(doc, note_id);

        match self.store.delete_note(&self.page_key, note_id) {
            Ok(()) => {
                info!("event=note_delete module=service status=ok note_id={note_id}");
                self.messenger.notify("Note deleted");
                Ok(true)
            }
            Err(err) => {
                error!(
                    "event=note_delete module=service status=error note_id={note_id} error={err}"
                );
                self.messenger.notify_error("Failed to delete note");
                // Revert the optimistic removal.
                let _ = self.display_note(doc, record);
                Err(err.into())
            }
        }
    }

    // ---- lifecycle ---------------------------------------------------------

    /// Navigation response: flush pending saves, tear everything down,
    /// then re-run discovery against the new page identity.
    pub fn handle_url_changed(
        &mut self,
        doc: &mut PageDocument,
        new_page_key: &str,
    ) -> LoadReport {
        info!(
            "event=url_changed module=service status=ok from={} to={new_page_key}",
            self.page_key
        );
        self.flush_saves();
        self.teardown(doc);
        if !new_page_key.trim().is_empty() {
            self.page_key = new_page_key.to_string();
        }
        self.load_notes(doc)
    }

    /// Page hidden: best-effort final save without tearing down.
    pub fn handle_page_hidden(&mut self, doc: &mut PageDocument) {
        self.drag.cancel(doc);
        self.end_edit();
        self.flush_saves();
    }

    /// Unload/shutdown: final save plus full teardown.
    pub fn shutdown(&mut self, doc: &mut PageDocument) {
        self.flush_saves();
        self.teardown(doc);
        info!("event=shutdown module=service status=ok page_key={}", self.page_key);
    }

    fn flush_saves(&mut self) {
        for save in self.autosave.flush_all() {
            self.apply_save(save);
        }
    }

    fn teardown(&mut self, doc: &mut PageDocument) {
        self.drag.cancel(doc);
        self.highlights.clear(doc);
        let ids: Vec<NoteId> = self.displayed.keys().copied().collect();
        for id in ids {
            if let Some(entry) = self.displayed.get(&id) {
                if let Some(el) = entry.element {
                    doc.detach(el);
                }
            }
        }
        self.displayed.clear();
        self.resolver.clear();
        self.editing = None;
        self.resize_deadline = None;
    }

    fn remove_display(&mut self, doc: &mut PageDocument, note_id: NoteId) {
        self.highlights.remove(doc, note_id);
        if let Some(entry) = self.displayed.remove(&note_id) {
            if let Some(el) = entry.element {
                doc.detach(el);
            }
        }
    }

    // ---- list projections --------------------------------------------------

    /// Plain-text previews of every stored note on this page, for list
    /// surfaces outside the overlay.
    pub fn note_previews(&self) -> Result<Vec<(NoteId, NotePreview)>, OverlayError> {
        let records = self.store.list_notes(&self.page_key)?;
        Ok(records
            .iter()
            .map(|record| (record.id, derive_note_preview(&record.content)))
            .collect())
    }

    fn persist_patch(&mut self, note_id: NoteId, patch: &NotePatch) {
        persist_patch_via(&self.store, &self.messenger, &self.page_key, note_id, patch);
    }
}

/// Shared persistence path for placement/content patches; failures are
/// logged and surfaced but never abort the calling operation.
fn persist_patch_via<S: NoteStore, M: UserMessenger>(
    store: &S,
    messenger: &M,
    page_key: &str,
    note_id: NoteId,
    patch: &NotePatch,
) {
    if let Err(err) = store.update_note(page_key, note_id, patch) {
        error!("event=note_update module=service status=error note_id={note_id} error={err}");
        messenger.notify_error("Failed to save note changes");
    } else {
        debug!("event=note_update module=service status=ok note_id={note_id}");
    }
}

/// Builds the overlay element pair for one note, returning the element
/// and the text node carrying the rendered body.
fn build_note_element(
    doc: &mut PageDocument,
    record: &NoteRecord,
    position: crate::dom::Point,
    rendered_body: &str,
) -> (NodeId, NodeId) {
    let root = doc.root();
    let note_el = doc.append_element(root, "div");
    doc.add_class(note_el, NOTE_CLASS);
    doc.set_style(
        note_el,
        &format!(
            "background-color: {};",
            sanitize_color(&record.background_color)
        ),
    );
    doc.set_rect(
        note_el,
        Rect::new(position.x, position.y, NOTE_DEFAULT_WIDTH, NOTE_DEFAULT_HEIGHT),
    );

    let content_el = doc.append_element(note_el, "div");
    doc.add_class(content_el, "webnote-note-content");
    let text = doc.append_text(content_el, rendered_body);
    (note_el, text)
}
