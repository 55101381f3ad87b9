//! Engine orchestration services.
//!
//! # Responsibility
//! - Tie the anchoring, highlighting, positioning and drag components
//!   into page-level operations behind collaborator contracts.
//! - Keep UI shells decoupled from engine internals.

pub mod autosave;
pub mod collaborators;
pub mod overlay_service;
