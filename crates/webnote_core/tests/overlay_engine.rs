use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::{Duration, Instant};
use webnote_core::db::open_db_in_memory;
use webnote_core::service::collaborators::{ConfirmationPrompt, UserMessenger};
use webnote_core::{
    InlineMarkdownRenderer, NodeId, NotePatch, NotePlacement, NoteRecord, NoteStore, Offset,
    OverlayService, PageDocument, PointerInput, Rect, SelectionContext, SqliteNoteStore,
    StoreError, StoreResult, Viewport,
};

const PAGE: &str = "example.com/page";

#[derive(Clone, Default)]
struct Messages(Rc<RefCell<Vec<String>>>);

impl Messages {
    fn errors(&self) -> usize {
        self.0
            .borrow()
            .iter()
            .filter(|m| m.starts_with("error:"))
            .count()
    }
}

struct TestMessenger(Messages);

impl UserMessenger for TestMessenger {
    fn notify(&self, message: &str) {
        self.0 .0.borrow_mut().push(format!("info:{message}"));
    }

    fn notify_error(&self, message: &str) {
        self.0 .0.borrow_mut().push(format!("error:{message}"));
    }
}

struct Decide(bool);

impl ConfirmationPrompt for Decide {
    fn confirm(&self, _message: &str) -> bool {
        self.0
    }
}

/// Store wrapper that can be told to fail deletes, for revert testing.
struct FailingDeleteStore<'c> {
    inner: SqliteNoteStore<'c>,
    fail_delete: Rc<Cell<bool>>,
}

impl NoteStore for FailingDeleteStore<'_> {
    fn list_notes(&self, page_key: &str) -> StoreResult<Vec<NoteRecord>> {
        self.inner.list_notes(page_key)
    }

    fn create_note(&self, page_key: &str, record: &NoteRecord) -> StoreResult<webnote_core::NoteId> {
        self.inner.create_note(page_key, record)
    }

    fn update_note(
        &self,
        page_key: &str,
        id: webnote_core::NoteId,
        patch: &NotePatch,
    ) -> StoreResult<()> {
        self.inner.update_note(page_key, id, patch)
    }

    fn delete_note(&self, page_key: &str, id: webnote_core::NoteId) -> StoreResult<()> {
        if self.fail_delete.get() {
            return Err(StoreError::InvalidData("injected delete failure".to_string()));
        }
        self.inner.delete_note(page_key, id)
    }
}

fn page_doc() -> (PageDocument, NodeId, NodeId) {
    let mut doc = PageDocument::new(Viewport::new(1024.0, 768.0));
    let body = doc.append_element(doc.root(), "body");
    doc.set_rect(body, Rect::new(0.0, 0.0, 1024.0, 3000.0));
    let p = doc.append_element(body, "p");
    doc.set_id(p, "target");
    doc.set_rect(p, Rect::new(100.0, 200.0, 400.0, 60.0));
    doc.append_text(p, "say hello world today");
    (doc, body, p)
}

fn service<'c>(
    conn: &'c rusqlite::Connection,
    messages: Messages,
    confirm: bool,
) -> OverlayService<SqliteNoteStore<'c>, InlineMarkdownRenderer, Decide, TestMessenger> {
    OverlayService::new(
        PAGE,
        SqliteNoteStore::new(conn),
        InlineMarkdownRenderer,
        Decide(confirm),
        TestMessenger(messages),
    )
    .expect("valid page key")
}

#[test]
fn reload_renders_note_at_anchor_plus_offset() {
    let conn = open_db_in_memory().expect("open store");
    let (mut doc, _body, p) = page_doc();
    let messages = Messages::default();

    let mut first = service(&conn, messages.clone(), true);
    let ctx = SelectionContext::capture("hello world", "say ", " today", Rect::default())
        .expect("valid capture");
    let note_id = first
        .create_anchored_note(&mut doc, p, "body text", "#fff9c4", Offset::new(10.0, 10.0), Some(ctx))
        .expect("create");
    first.shutdown(&mut doc);
    assert_eq!(doc.text_content(p), "say hello world today");

    // Reload against the unchanged DOM.
    let mut second = service(&conn, messages.clone(), true);
    let report = second.load_notes(&mut doc);
    assert_eq!(report.displayed, 1);
    assert_eq!(report.skipped, 0);

    let el = second.note_element(note_id).expect("note element");
    let rect = doc.rect(el).expect("note rect");
    assert_eq!(rect.x, 110.0);
    assert_eq!(rect.y, 210.0);

    // The selection highlight is rebuilt around the exact span.
    assert_eq!(doc.text_content(p), "say hello world today");
    assert_eq!(doc.children(p).len(), 3);
    assert_eq!(messages.errors(), 0);
}

#[test]
fn lost_anchor_hides_one_note_without_breaking_the_batch() {
    let conn = open_db_in_memory().expect("open store");
    let (mut doc, body, p) = page_doc();
    let messages = Messages::default();

    let mut first = service(&conn, messages.clone(), true);
    let doomed_target = doc.append_element(body, "blockquote");
    doc.set_rect(doomed_target, Rect::new(100.0, 500.0, 300.0, 100.0));
    let doomed = first
        .create_anchored_note(&mut doc, doomed_target, "will lose anchor", "#fff", Offset::default(), None)
        .expect("create");
    let healthy = first
        .create_anchored_note(&mut doc, p, "healthy", "#fff", Offset::new(10.0, 10.0), None)
        .expect("create");
    first.shutdown(&mut doc);

    // The page mutates: the doomed target disappears entirely.
    doc.detach(doomed_target);

    let mut second = service(&conn, messages.clone(), true);
    let report = second.load_notes(&mut doc);
    assert_eq!(report.displayed, 1);
    assert_eq!(report.hidden, 1);
    assert_eq!(report.skipped, 0);
    assert!(second.note_element(doomed).is_none());
    assert!(second.note_element(healthy).is_some());
}

#[test]
fn drag_to_paragraph_reanchors_and_clears_absolute_fields() {
    let conn = open_db_in_memory().expect("open store");
    let (mut doc, _body, p) = page_doc();
    doc.set_rect(p, Rect::new(400.0, 300.0, 300.0, 80.0));
    let messages = Messages::default();

    let mut svc = service(&conn, messages.clone(), true);
    let note_id = svc
        .create_free_note(&mut doc, 100.0, 100.0, "floating", "#fff")
        .expect("create");
    assert!(matches!(
        svc.note_placement(note_id),
        Some(NotePlacement::Free { .. })
    ));

    svc.pointer_down(&mut doc, note_id, PointerInput::new(110.0, 110.0), false);
    assert!(svc.pointer_move(&mut doc, PointerInput::new(450.0, 320.0)));
    svc.pointer_up(&mut doc, PointerInput::new(450.0, 320.0));

    match svc.note_placement(note_id).expect("placement") {
        NotePlacement::Anchored { anchor, .. } => assert!(anchor.is_resolvable()),
        other => panic!("expected anchored placement, got {other:?}"),
    }

    // Stored row: anchor data set, absolute coordinates explicitly cleared.
    let (x, y, anchor_data): (Option<f64>, Option<f64>, Option<String>) = conn
        .query_row(
            "SELECT position_x, position_y, anchor_data FROM notes WHERE id = ?1;",
            [note_id.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .expect("raw row");
    assert_eq!(x, None);
    assert_eq!(y, None);
    assert!(anchor_data.expect("anchor data").contains("selector"));
}

#[test]
fn sub_threshold_press_never_moves_or_persists() {
    let conn = open_db_in_memory().expect("open store");
    let (mut doc, _body, _p) = page_doc();
    let messages = Messages::default();

    let mut svc = service(&conn, messages.clone(), true);
    let note_id = svc
        .create_free_note(&mut doc, 100.0, 100.0, "still", "#fff")
        .expect("create");

    svc.pointer_down(&mut doc, note_id, PointerInput::new(110.0, 110.0), false);
    assert!(!svc.pointer_move(&mut doc, PointerInput::new(113.0, 112.0)));
    svc.pointer_up(&mut doc, PointerInput::new(113.0, 112.0));

    let el = svc.note_element(note_id).expect("element");
    assert_eq!(doc.rect(el).expect("rect").origin(), webnote_core::Point::new(100.0, 100.0));
    assert!(matches!(
        svc.note_placement(note_id),
        Some(NotePlacement::Free { x, y }) if x == 100.0 && y == 100.0
    ));
}

#[test]
fn escape_cancels_a_drag_without_persisting() {
    let conn = open_db_in_memory().expect("open store");
    let (mut doc, _body, _p) = page_doc();
    let messages = Messages::default();

    let mut svc = service(&conn, messages.clone(), true);
    let note_id = svc
        .create_free_note(&mut doc, 100.0, 100.0, "escape me", "#fff")
        .expect("create");

    svc.pointer_down(&mut doc, note_id, PointerInput::new(110.0, 110.0), false);
    assert!(svc.pointer_move(&mut doc, PointerInput::new(300.0, 300.0)));
    svc.handle_escape(&mut doc);

    let el = svc.note_element(note_id).expect("element");
    assert_eq!(doc.rect(el).expect("rect").x, 100.0);

    let store = SqliteNoteStore::new(&conn);
    let listed = store.list_notes(PAGE).expect("list");
    assert_eq!(listed[0].placement, NotePlacement::Free { x: 100.0, y: 100.0 });
}

#[test]
fn autosave_debounces_and_last_write_wins() {
    let conn = open_db_in_memory().expect("open store");
    let (mut doc, _body, _p) = page_doc();
    let messages = Messages::default();

    let mut svc = service(&conn, messages.clone(), true);
    let note_id = svc
        .create_free_note(&mut doc, 100.0, 100.0, "draft", "#fff")
        .expect("create");

    let t0 = Instant::now();
    svc.begin_edit(note_id).expect("edit");
    svc.edit_content(&mut doc, note_id, "first revision", t0)
        .expect("edit");
    svc.edit_content(&mut doc, note_id, "second revision", t0 + Duration::from_millis(400))
        .expect("edit");

    // Before the (rescheduled) deadline nothing is persisted.
    svc.tick(&mut doc, t0 + Duration::from_millis(700));
    let store = SqliteNoteStore::new(&conn);
    assert_eq!(store.list_notes(PAGE).expect("list")[0].content, "draft");

    // After it, only the last write lands.
    svc.tick(&mut doc, t0 + Duration::from_millis(1300));
    assert_eq!(
        store.list_notes(PAGE).expect("list")[0].content,
        "second revision"
    );
}

#[test]
fn page_hidden_flushes_the_pending_save() {
    let conn = open_db_in_memory().expect("open store");
    let (mut doc, _body, _p) = page_doc();
    let messages = Messages::default();

    let mut svc = service(&conn, messages.clone(), true);
    let note_id = svc
        .create_free_note(&mut doc, 100.0, 100.0, "draft", "#fff")
        .expect("create");

    svc.begin_edit(note_id).expect("edit");
    svc.edit_content(&mut doc, note_id, "unsaved edit", Instant::now())
        .expect("edit");
    svc.handle_page_hidden(&mut doc);

    let store = SqliteNoteStore::new(&conn);
    assert_eq!(store.list_notes(PAGE).expect("list")[0].content, "unsaved edit");
}

#[test]
fn declined_confirmation_keeps_the_note() {
    let conn = open_db_in_memory().expect("open store");
    let (mut doc, _body, _p) = page_doc();
    let messages = Messages::default();

    let mut svc = service(&conn, messages.clone(), false);
    let note_id = svc
        .create_free_note(&mut doc, 100.0, 100.0, "keep me", "#fff")
        .expect("create");

    let deleted = svc.delete_note(&mut doc, note_id).expect("delete flow");
    assert!(!deleted);
    assert!(svc.note_element(note_id).is_some());
    assert_eq!(SqliteNoteStore::new(&conn).list_notes(PAGE).expect("list").len(), 1);
}

#[test]
fn failed_delete_reverts_the_optimistic_removal() {
    let conn = open_db_in_memory().expect("open store");
    let (mut doc, _body, _p) = page_doc();
    let messages = Messages::default();
    let fail_delete = Rc::new(Cell::new(true));

    let store = FailingDeleteStore {
        inner: SqliteNoteStore::new(&conn),
        fail_delete: fail_delete.clone(),
    };
    let mut svc = OverlayService::new(
        PAGE,
        store,
        InlineMarkdownRenderer,
        Decide(true),
        TestMessenger(messages.clone()),
    )
    .expect("valid page key");

    let note_id = svc
        .create_free_note(&mut doc, 100.0, 100.0, "sturdy", "#fff")
        .expect("create");

    assert!(svc.delete_note(&mut doc, note_id).is_err());
    // The note is re-displayed and the failure was surfaced.
    assert!(svc.note_element(note_id).is_some());
    assert!(messages.errors() > 0);
    assert_eq!(SqliteNoteStore::new(&conn).list_notes(PAGE).expect("list").len(), 1);

    // Once the store recovers the delete goes through.
    fail_delete.set(false);
    assert!(svc.delete_note(&mut doc, note_id).expect("delete"));
    assert!(svc.note_element(note_id).is_none());
    assert!(SqliteNoteStore::new(&conn).list_notes(PAGE).expect("list").is_empty());
}

#[test]
fn url_change_tears_down_and_rediscovers() {
    let conn = open_db_in_memory().expect("open store");
    let (mut doc, _body, p) = page_doc();
    let messages = Messages::default();

    let mut svc = service(&conn, messages.clone(), true);
    let note_id = svc
        .create_anchored_note(&mut doc, p, "page one note", "#fff", Offset::new(10.0, 10.0), None)
        .expect("create");
    assert_eq!(svc.displayed_count(), 1);

    let report = svc.handle_url_changed(&mut doc, "example.com/other");
    assert_eq!(report.displayed, 0);
    assert_eq!(svc.displayed_count(), 0);
    assert!(svc.note_element(note_id).is_none());

    // Navigating back re-runs discovery from the store.
    let report = svc.handle_url_changed(&mut doc, PAGE);
    assert_eq!(report.displayed, 1);
    assert!(svc.note_element(note_id).is_some());
}

#[test]
fn resize_reposition_is_debounced() {
    let conn = open_db_in_memory().expect("open store");
    let (mut doc, _body, p) = page_doc();
    let messages = Messages::default();

    let mut svc = service(&conn, messages.clone(), true);
    let note_id = svc
        .create_anchored_note(&mut doc, p, "tracks target", "#fff", Offset::new(10.0, 10.0), None)
        .expect("create");

    // The anchor disappears; nothing is noticed until the debounced
    // reposition runs.
    doc.detach(p);
    let t0 = Instant::now();
    svc.notify_resized(t0);
    svc.tick(&mut doc, t0 + Duration::from_millis(100));
    assert!(svc.note_element(note_id).is_some());

    svc.tick(&mut doc, t0 + Duration::from_millis(200));
    assert!(svc.note_element(note_id).is_none(), "anchor loss hides the note");
}

#[test]
fn inactive_notes_are_listed_but_not_displayed() {
    let conn = open_db_in_memory().expect("open store");
    let (mut doc, _body, _p) = page_doc();
    let messages = Messages::default();

    let mut dormant = NoteRecord::new_free("dormant", 50.0, 50.0).expect("valid record");
    dormant.is_active = false;
    SqliteNoteStore::new(&conn)
        .create_note(PAGE, &dormant)
        .expect("create");

    let mut svc = service(&conn, messages, true);
    let report = svc.load_notes(&mut doc);
    assert_eq!(report.displayed, 0);
    assert_eq!(report.hidden, 1);
    assert!(svc.note_element(dormant.id).is_none());
}

#[test]
fn note_previews_project_stored_markdown() {
    let conn = open_db_in_memory().expect("open store");
    let (mut doc, _body, _p) = page_doc();
    let messages = Messages::default();

    let mut svc = service(&conn, messages, true);
    let note_id = svc
        .create_free_note(&mut doc, 10.0, 10.0, "# heading\n**key** point", "#fff")
        .expect("create");

    let previews = svc.note_previews().expect("previews");
    assert_eq!(previews.len(), 1);
    assert_eq!(previews[0].0, note_id);
    let text = previews[0].1.preview_text.as_deref().expect("preview text");
    assert!(text.contains("key"));
    assert!(!text.contains('#'));
}

#[test]
fn blank_page_key_is_a_contract_violation() {
    let conn = open_db_in_memory().expect("open store");
    let messages = Messages::default();
    let result = OverlayService::new(
        "  ",
        SqliteNoteStore::new(&conn),
        InlineMarkdownRenderer,
        Decide(true),
        TestMessenger(messages),
    );
    assert!(result.is_err());
}
