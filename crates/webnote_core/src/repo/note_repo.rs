//! Note store contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide page-scoped CRUD over persisted note records.
//! - Encode the placement union into storage columns: anchored notes
//!   keep their selector pair and offset in the `anchor_data` JSON
//!   column with NULL positions; free notes keep coordinates with NULL
//!   anchor data. A placement update always writes all four columns so
//!   stale fields cannot survive a transition.
//!
//! # Invariants
//! - Write paths call `NoteRecord::validate()` before SQL mutations.
//! - Read paths reject rows that decode into an impossible placement.

use crate::db::DbError;
use crate::model::note::{
    Anchor, NoteId, NotePatch, NotePlacement, NoteRecord, NoteValidationError, Offset,
    SelectionContext,
};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const NOTE_SELECT_SQL: &str = "SELECT
    id,
    content,
    background_color,
    position_x,
    position_y,
    anchor_data,
    selection_data,
    is_active
FROM notes";

pub type StoreResult<T> = Result<T, StoreError>;

/// Store error for note persistence and query operations.
#[derive(Debug)]
pub enum StoreError {
    Validation(NoteValidationError),
    Db(DbError),
    NotFound(NoteId),
    InvalidData(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "note not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted note data: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::NotFound(_) => None,
            Self::InvalidData(_) => None,
        }
    }
}

impl From<NoteValidationError> for StoreError {
    fn from(value: NoteValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Narrow persistence contract the engine proposes changes through.
pub trait NoteStore {
    fn list_notes(&self, page_key: &str) -> StoreResult<Vec<NoteRecord>>;
    fn create_note(&self, page_key: &str, record: &NoteRecord) -> StoreResult<NoteId>;
    fn update_note(&self, page_key: &str, id: NoteId, patch: &NotePatch) -> StoreResult<()>;
    fn delete_note(&self, page_key: &str, id: NoteId) -> StoreResult<()>;
}

/// Storage shape of the `anchor_data` JSON column.
#[derive(Debug, Serialize, Deserialize)]
struct StoredAnchor {
    primary_selector: Option<String>,
    fallback_selector: Option<String>,
    #[serde(default)]
    offset_x: f64,
    #[serde(default)]
    offset_y: f64,
}

/// SQLite-backed note store.
pub struct SqliteNoteStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteNoteStore<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl NoteStore for SqliteNoteStore<'_> {
    fn list_notes(&self, page_key: &str) -> StoreResult<Vec<NoteRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "{NOTE_SELECT_SQL}
             WHERE page_key = ?1
             ORDER BY created_at ASC, id ASC;"
        ))?;
        let mut rows = stmt.query(params![page_key])?;
        let mut notes = Vec::new();
        while let Some(row) = rows.next()? {
            notes.push(parse_note_row(row)?);
        }
        Ok(notes)
    }

    fn create_note(&self, page_key: &str, record: &NoteRecord) -> StoreResult<NoteId> {
        record.validate()?;
        let (position_x, position_y, anchor_data) = encode_placement(&record.placement)?;
        let selection_data = encode_selection(record.selection.as_ref())?;

        self.conn.execute(
            "INSERT INTO notes (
                id,
                page_key,
                content,
                background_color,
                position_x,
                position_y,
                anchor_data,
                selection_data,
                is_active
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9);",
            params![
                record.id.to_string(),
                page_key,
                record.content.as_str(),
                record.background_color.as_str(),
                position_x,
                position_y,
                anchor_data,
                selection_data,
                i64::from(record.is_active),
            ],
        )?;

        Ok(record.id)
    }

    fn update_note(&self, page_key: &str, id: NoteId, patch: &NotePatch) -> StoreResult<()> {
        if patch.is_empty() {
            return Ok(());
        }

        let mut assignments: Vec<&'static str> = Vec::new();
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(content) = &patch.content {
            assignments.push("content = ?");
            bind_values.push(Value::Text(content.clone()));
        }
        if let Some(color) = &patch.background_color {
            assignments.push("background_color = ?");
            bind_values.push(Value::Text(color.clone()));
        }
        if let Some(placement) = &patch.placement {
            let (position_x, position_y, anchor_data) = encode_placement(placement)?;
            assignments.push("position_x = ?");
            bind_values.push(position_x.map_or(Value::Null, Value::Real));
            assignments.push("position_y = ?");
            bind_values.push(position_y.map_or(Value::Null, Value::Real));
            assignments.push("anchor_data = ?");
            bind_values.push(anchor_data.map_or(Value::Null, Value::Text));
        }
        if let Some(is_active) = patch.is_active {
            assignments.push("is_active = ?");
            bind_values.push(Value::Integer(i64::from(is_active)));
        }

        let sql = format!(
            "UPDATE notes
             SET {},
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ? AND page_key = ?;",
            assignments.join(", ")
        );
        bind_values.push(Value::Text(id.to_string()));
        bind_values.push(Value::Text(page_key.to_string()));

        let changed = self.conn.execute(&sql, params_from_iter(bind_values))?;
        if changed == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    fn delete_note(&self, page_key: &str, id: NoteId) -> StoreResult<()> {
        let changed = self.conn.execute(
            "DELETE FROM notes WHERE id = ?1 AND page_key = ?2;",
            params![id.to_string(), page_key],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }
}

fn encode_placement(
    placement: &NotePlacement,
) -> StoreResult<(Option<f64>, Option<f64>, Option<String>)> {
    match placement {
        NotePlacement::Anchored { anchor, offset } => {
            let stored = StoredAnchor {
                primary_selector: anchor.primary_selector.clone(),
                fallback_selector: anchor.fallback_selector.clone(),
                offset_x: offset.x,
                offset_y: offset.y,
            };
            let json = serde_json::to_string(&stored).map_err(|err| {
                StoreError::InvalidData(format!("cannot encode anchor data: {err}"))
            })?;
            Ok((None, None, Some(json)))
        }
        NotePlacement::Free { x, y } => Ok((Some(*x), Some(*y), None)),
    }
}

fn encode_selection(selection: Option<&SelectionContext>) -> StoreResult<Option<String>> {
    match selection {
        Some(ctx) => serde_json::to_string(ctx)
            .map(Some)
            .map_err(|err| StoreError::InvalidData(format!("cannot encode selection: {err}"))),
        None => Ok(None),
    }
}

fn parse_note_row(row: &Row<'_>) -> StoreResult<NoteRecord> {
    let id_text: String = row.get("id")?;
    let id = Uuid::parse_str(&id_text)
        .map_err(|_| StoreError::InvalidData(format!("invalid uuid `{id_text}` in notes.id")))?;

    let position_x: Option<f64> = row.get("position_x")?;
    let position_y: Option<f64> = row.get("position_y")?;
    let anchor_json: Option<String> = row.get("anchor_data")?;

    let placement = match anchor_json {
        Some(json) => {
            let stored: StoredAnchor = serde_json::from_str(&json).map_err(|err| {
                StoreError::InvalidData(format!("invalid anchor_data for note {id}: {err}"))
            })?;
            let anchor = Anchor::new(stored.primary_selector, stored.fallback_selector);
            if !anchor.is_resolvable() {
                return Err(StoreError::InvalidData(format!(
                    "anchor_data for note {id} carries no selector"
                )));
            }
            NotePlacement::Anchored {
                anchor,
                offset: Offset::new(stored.offset_x, stored.offset_y),
            }
        }
        None => match (position_x, position_y) {
            (Some(x), Some(y)) => NotePlacement::Free { x, y },
            _ => {
                return Err(StoreError::InvalidData(format!(
                    "note {id} has neither anchor_data nor absolute coordinates"
                )));
            }
        },
    };

    let selection = match row.get::<_, Option<String>>("selection_data")? {
        Some(json) => Some(serde_json::from_str(&json).map_err(|err| {
            StoreError::InvalidData(format!("invalid selection_data for note {id}: {err}"))
        })?),
        None => None,
    };

    let is_active = match row.get::<_, i64>("is_active")? {
        0 => false,
        1 => true,
        other => {
            return Err(StoreError::InvalidData(format!(
                "invalid is_active value `{other}` for note {id}"
            )));
        }
    };

    let record = NoteRecord {
        id,
        content: row.get("content")?,
        background_color: row.get("background_color")?,
        placement,
        selection,
        is_active,
    };
    record.validate()?;
    Ok(record)
}
