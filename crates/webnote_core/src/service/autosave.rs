//! Debounced per-note auto-save timers.
//!
//! # Responsibility
//! - Hold one pending save per note with an explicit deadline.
//! - Provide cancel-and-reschedule on every edit and a synchronous
//!   flush for teardown paths.
//!
//! # Invariants
//! - Last write wins per note: scheduling replaces any pending content
//!   and restarts the delay.
//! - Note pipelines are independent; no cross-note ordering exists.
//! - Flush drains every pending save exactly once, never dropping one.

use crate::model::note::NoteId;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Delay between the last edit and its persisted save.
pub const AUTOSAVE_DEBOUNCE: Duration = Duration::from_millis(800);

/// A save ready to be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSave {
    pub note_id: NoteId,
    pub content: String,
}

#[derive(Debug)]
struct Entry {
    deadline: Instant,
    content: String,
}

/// Explicit timer table driven by the caller's clock; no threads.
#[derive(Debug)]
pub struct AutosaveScheduler {
    delay: Duration,
    pending: HashMap<NoteId, Entry>,
}

impl Default for AutosaveScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl AutosaveScheduler {
    pub fn new() -> Self {
        Self::with_delay(AUTOSAVE_DEBOUNCE)
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            pending: HashMap::new(),
        }
    }

    /// Schedules a save, replacing any pending one for the same note and
    /// restarting its delay.
    pub fn schedule(&mut self, note_id: NoteId, content: impl Into<String>, now: Instant) {
        self.pending.insert(
            note_id,
            Entry {
                deadline: now + self.delay,
                content: content.into(),
            },
        );
    }

    /// Drops a pending save without persisting it.
    pub fn cancel(&mut self, note_id: NoteId) -> bool {
        self.pending.remove(&note_id).is_some()
    }

    /// Removes and returns every save whose deadline has passed.
    pub fn take_due(&mut self, now: Instant) -> Vec<PendingSave> {
        let due_ids: Vec<NoteId> = self
            .pending
            .iter()
            .filter(|(_, entry)| entry.deadline <= now)
            .map(|(&id, _)| id)
            .collect();
        due_ids
            .into_iter()
            .filter_map(|id| {
                self.pending.remove(&id).map(|entry| PendingSave {
                    note_id: id,
                    content: entry.content,
                })
            })
            .collect()
    }

    /// Removes and returns a single note's pending save regardless of
    /// its deadline.
    pub fn take_for(&mut self, note_id: NoteId) -> Option<PendingSave> {
        self.pending.remove(&note_id).map(|entry| PendingSave {
            note_id,
            content: entry.content,
        })
    }

    /// Drains every pending save regardless of deadline; used by
    /// teardown paths as the best-effort final save.
    pub fn flush_all(&mut self) -> Vec<PendingSave> {
        let mut saves: Vec<PendingSave> = self
            .pending
            .drain()
            .map(|(id, entry)| PendingSave {
                note_id: id,
                content: entry.content,
            })
            .collect();
        saves.sort_by_key(|save| save.note_id);
        saves
    }

    pub fn has_pending(&self, note_id: NoteId) -> bool {
        self.pending.contains_key(&note_id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::AutosaveScheduler;
    use std::time::{Duration, Instant};
    use uuid::Uuid;

    #[test]
    fn reschedule_replaces_content_and_restarts_the_delay() {
        let mut scheduler = AutosaveScheduler::with_delay(Duration::from_millis(100));
        let note = Uuid::new_v4();
        let start = Instant::now();

        scheduler.schedule(note, "first", start);
        scheduler.schedule(note, "second", start + Duration::from_millis(90));

        // The original deadline has passed, but rescheduling moved it.
        assert!(scheduler
            .take_due(start + Duration::from_millis(120))
            .is_empty());

        let due = scheduler.take_due(start + Duration::from_millis(190));
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].content, "second");
        assert!(scheduler.is_empty());
    }

    #[test]
    fn pipelines_are_independent_per_note() {
        let mut scheduler = AutosaveScheduler::with_delay(Duration::from_millis(100));
        let early = Uuid::new_v4();
        let late = Uuid::new_v4();
        let start = Instant::now();

        scheduler.schedule(early, "a", start);
        scheduler.schedule(late, "b", start + Duration::from_millis(50));

        let due = scheduler.take_due(start + Duration::from_millis(110));
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].note_id, early);
        assert!(scheduler.has_pending(late));
    }

    #[test]
    fn flush_drains_everything_immediately() {
        let mut scheduler = AutosaveScheduler::new();
        let start = Instant::now();
        scheduler.schedule(Uuid::new_v4(), "a", start);
        scheduler.schedule(Uuid::new_v4(), "b", start);

        let flushed = scheduler.flush_all();
        assert_eq!(flushed.len(), 2);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn cancel_discards_without_persisting() {
        let mut scheduler = AutosaveScheduler::new();
        let note = Uuid::new_v4();
        scheduler.schedule(note, "draft", Instant::now());
        assert!(scheduler.cancel(note));
        assert!(!scheduler.cancel(note));
        assert!(scheduler.flush_all().is_empty());
    }
}
