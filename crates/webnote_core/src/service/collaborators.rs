//! User-facing collaborator contracts.
//!
//! The engine never implements chrome itself: confirmation dialogs and
//! toasts are delegated through these traits, and the shell decides how
//! they look.

/// Yes/no confirmation gate; destructive operations go through it first.
pub trait ConfirmationPrompt {
    fn confirm(&self, message: &str) -> bool;
}

/// Success/failure notice sink.
pub trait UserMessenger {
    fn notify(&self, message: &str);
    fn notify_error(&self, message: &str);
}
