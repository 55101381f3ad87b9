//! Selection text relocation inside a resolved container.
//!
//! # Responsibility
//! - Find the text node and byte offset holding a captured selection,
//!   tolerating drift in the surrounding page text.
//!
//! # Invariants
//! - Context-qualified matching is attempted on every text node before
//!   any bare-text fallback is accepted.
//! - The bare-text fallback takes the first occurrence in document
//!   order. That tie-break is deliberate: on pages repeating the same
//!   text it may pick a different occurrence than the one originally
//!   selected, and callers must not assume "nearest to original".

use crate::dom::{NodeId, PageDocument};
use crate::model::note::SelectionContext;
use log::debug;

/// Locates `ctx.text` inside `container`.
///
/// Returns the owning text node plus the byte offset of the selection
/// start, or `None` when neither the context-qualified nor the bare text
/// can be found.
pub fn locate_selection(
    doc: &PageDocument,
    container: NodeId,
    ctx: &SelectionContext,
) -> Option<(NodeId, usize)> {
    let text_nodes = doc.text_nodes_within(container);

    let qualified = format!("{}{}{}", ctx.context_before, ctx.text, ctx.context_after);
    for &node in &text_nodes {
        let content = doc.text(node)?;
        if let Some(index) = content.find(&qualified) {
            return Some((node, index + ctx.context_before.len()));
        }
    }

    for &node in &text_nodes {
        let content = doc.text(node)?;
        if let Some(index) = content.find(&ctx.text) {
            debug!("event=text_locate module=anchor status=bare_fallback");
            return Some((node, index));
        }
    }

    debug!("event=text_locate module=anchor status=not_found");
    None
}
