//! Canonical note domain model.
//!
//! # Responsibility
//! - Define the note record shape shared by the engine and the store.
//! - Enforce placement and selection invariants at construction time.
//!
//! # Invariants
//! - Every note is identified by a stable `NoteId`.
//! - Placement is a tagged union; code never branches on field presence.

pub mod note;
