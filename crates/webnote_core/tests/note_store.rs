use webnote_core::db::migrations::latest_version;
use webnote_core::db::{open_db, open_db_in_memory};
use webnote_core::{
    Anchor, NotePatch, NotePlacement, NoteRecord, NoteStore, Offset, Rect, SelectionContext,
    SqliteNoteStore, StoreError,
};

const PAGE: &str = "example.com/articles/42";

fn anchored_record() -> NoteRecord {
    let anchor = Anchor::new(
        Some("div#content > p".to_string()),
        Some("/html[1]/body[1]/div[1]/p[1]".to_string()),
    );
    NoteRecord::new_anchored("anchored body", anchor, Offset::new(10.0, 10.0))
        .expect("valid record")
}

#[test]
fn create_and_list_round_trips_both_placements() {
    let conn = open_db_in_memory().expect("open store");
    let store = SqliteNoteStore::new(&conn);

    let mut anchored = anchored_record();
    anchored.selection = Some(
        SelectionContext::capture("hello world", "say ", " today", Rect::new(1.0, 2.0, 3.0, 4.0))
            .expect("valid capture"),
    );
    let free = NoteRecord::new_free("free body", 100.0, 100.0).expect("valid record");

    store.create_note(PAGE, &anchored).expect("create anchored");
    store.create_note(PAGE, &free).expect("create free");

    let listed = store.list_notes(PAGE).expect("list");
    assert_eq!(listed.len(), 2);

    let loaded_anchored = listed
        .iter()
        .find(|n| n.id == anchored.id)
        .expect("anchored present");
    assert_eq!(loaded_anchored.placement, anchored.placement);
    assert_eq!(loaded_anchored.selection, anchored.selection);
    assert_eq!(loaded_anchored.content, "anchored body");

    let loaded_free = listed.iter().find(|n| n.id == free.id).expect("free present");
    assert_eq!(loaded_free.placement, NotePlacement::Free { x: 100.0, y: 100.0 });
    assert!(loaded_free.selection.is_none());
}

#[test]
fn listing_is_scoped_to_the_page_key() {
    let conn = open_db_in_memory().expect("open store");
    let store = SqliteNoteStore::new(&conn);

    let here = NoteRecord::new_free("here", 0.0, 0.0).expect("valid record");
    let elsewhere = NoteRecord::new_free("elsewhere", 0.0, 0.0).expect("valid record");
    store.create_note(PAGE, &here).expect("create");
    store
        .create_note("other.example/page", &elsewhere)
        .expect("create");

    let listed = store.list_notes(PAGE).expect("list");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, here.id);
}

#[test]
fn placement_update_to_anchored_clears_absolute_fields() {
    let conn = open_db_in_memory().expect("open store");
    let store = SqliteNoteStore::new(&conn);

    let free = NoteRecord::new_free("starts free", 100.0, 100.0).expect("valid record");
    store.create_note(PAGE, &free).expect("create");

    let anchor = Anchor::new(Some("p".to_string()), None);
    let patch = NotePatch::with_placement(NotePlacement::Anchored {
        anchor: anchor.clone(),
        offset: Offset::new(40.0, 10.0),
    });
    store.update_note(PAGE, free.id, &patch).expect("update");

    let listed = store.list_notes(PAGE).expect("list");
    assert_eq!(
        listed[0].placement,
        NotePlacement::Anchored {
            anchor,
            offset: Offset::new(40.0, 10.0),
        }
    );

    // Raw column check: absolute coordinates are gone, not just shadowed.
    let (x, y): (Option<f64>, Option<f64>) = conn
        .query_row(
            "SELECT position_x, position_y FROM notes WHERE id = ?1;",
            [free.id.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .expect("raw row");
    assert_eq!(x, None);
    assert_eq!(y, None);
}

#[test]
fn placement_update_to_free_clears_anchor_data() {
    let conn = open_db_in_memory().expect("open store");
    let store = SqliteNoteStore::new(&conn);

    let anchored = anchored_record();
    store.create_note(PAGE, &anchored).expect("create");

    let patch = NotePatch::with_placement(NotePlacement::Free { x: 5.0, y: 6.0 });
    store.update_note(PAGE, anchored.id, &patch).expect("update");

    let anchor_data: Option<String> = conn
        .query_row(
            "SELECT anchor_data FROM notes WHERE id = ?1;",
            [anchored.id.to_string()],
            |row| row.get(0),
        )
        .expect("raw row");
    assert_eq!(anchor_data, None);

    let listed = store.list_notes(PAGE).expect("list");
    assert_eq!(listed[0].placement, NotePlacement::Free { x: 5.0, y: 6.0 });
}

#[test]
fn content_patch_updates_only_content() {
    let conn = open_db_in_memory().expect("open store");
    let store = SqliteNoteStore::new(&conn);

    let record = anchored_record();
    store.create_note(PAGE, &record).expect("create");
    store
        .update_note(PAGE, record.id, &NotePatch::with_content("edited"))
        .expect("update");

    let listed = store.list_notes(PAGE).expect("list");
    assert_eq!(listed[0].content, "edited");
    assert_eq!(listed[0].placement, record.placement);
}

#[test]
fn update_and_delete_report_not_found() {
    let conn = open_db_in_memory().expect("open store");
    let store = SqliteNoteStore::new(&conn);

    let ghost = NoteRecord::new_free("ghost", 0.0, 0.0).expect("valid record");
    let err = store
        .update_note(PAGE, ghost.id, &NotePatch::with_content("x"))
        .expect_err("missing note");
    assert!(matches!(err, StoreError::NotFound(id) if id == ghost.id));

    let err = store.delete_note(PAGE, ghost.id).expect_err("missing note");
    assert!(matches!(err, StoreError::NotFound(id) if id == ghost.id));
}

#[test]
fn delete_removes_the_row() {
    let conn = open_db_in_memory().expect("open store");
    let store = SqliteNoteStore::new(&conn);

    let record = NoteRecord::new_free("to delete", 1.0, 2.0).expect("valid record");
    store.create_note(PAGE, &record).expect("create");
    store.delete_note(PAGE, record.id).expect("delete");
    assert!(store.list_notes(PAGE).expect("list").is_empty());
}

#[test]
fn validation_runs_before_any_write() {
    let conn = open_db_in_memory().expect("open store");
    let store = SqliteNoteStore::new(&conn);

    let mut record = NoteRecord::new_free("valid", 0.0, 0.0).expect("valid record");
    record.content = "   ".to_string();
    let err = store.create_note(PAGE, &record).expect_err("blank content");
    assert!(matches!(err, StoreError::Validation(_)));
    assert!(store.list_notes(PAGE).expect("list").is_empty());
}

#[test]
fn file_backed_store_persists_across_reopen() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("notes.db");

    let record = anchored_record();
    {
        let conn = open_db(&path).expect("open store");
        let store = SqliteNoteStore::new(&conn);
        store.create_note(PAGE, &record).expect("create");
    }

    let conn = open_db(&path).expect("reopen store");
    let version: u32 = conn
        .query_row("PRAGMA user_version;", [], |row| row.get(0))
        .expect("user_version");
    assert_eq!(version, latest_version());

    let store = SqliteNoteStore::new(&conn);
    let listed = store.list_notes(PAGE).expect("list");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, record.id);
}

#[test]
fn newer_schema_versions_are_rejected() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("notes.db");
    {
        let conn = open_db(&path).expect("open store");
        conn.execute_batch("PRAGMA user_version = 999;")
            .expect("bump version");
    }
    assert!(open_db(&path).is_err());
}
