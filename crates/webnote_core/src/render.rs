//! Markdown rendering collaborator contract and default implementation.
//!
//! # Responsibility
//! - Define the pure `render` contract the engine displays note bodies
//!   through.
//! - Derive plain-text previews for note list surfaces.
//!
//! # Invariants
//! - `render` output is sanitized markup: source HTML is always escaped
//!   and only engine-generated tags survive.
//! - The engine never renders text itself; it passes `render` output
//!   into a content container verbatim.

use once_cell::sync::Lazy;
use regex::Regex;

static MARKDOWN_IMAGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"!\[[^\]]*]\(([^)]+)\)").expect("valid image regex"));
static MARKDOWN_LINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([^\]]+)\]\(([^)]+)\)").expect("valid link regex"));
static MARKDOWN_SYMBOL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[\*_`#>~\-\[\]\(\)!]+"#).expect("valid markdown symbol regex"));
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid ws regex"));

static BOLD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\*\*([^*]+)\*\*").expect("valid bold regex"));
static ITALIC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\*([^*]+)\*").expect("valid italic regex"));
static CODE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"`([^`]+)`").expect("valid code regex"));

/// Maximum characters kept in a derived preview.
const PREVIEW_TEXT_CHARS: usize = 100;

/// Rendering contract; implementations must be pure.
pub trait MarkdownRenderer {
    fn render(&self, source: &str) -> String;
}

/// Plain-text projection of a note body for list surfaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotePreview {
    /// Sanitized summary text.
    pub preview_text: Option<String>,
    /// First markdown image path, if any.
    pub preview_image: Option<String>,
}

/// Regex-based default renderer covering the inline subset notes use.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineMarkdownRenderer;

impl MarkdownRenderer for InlineMarkdownRenderer {
    fn render(&self, source: &str) -> String {
        let escaped = escape_html(source);
        let with_code = CODE_RE.replace_all(&escaped, "<code>$1</code>");
        let with_links = MARKDOWN_LINK_RE.replace_all(&with_code, |caps: &regex::Captures<'_>| {
            let label = &caps[1];
            let href = caps[2].trim();
            if href.starts_with("http://") || href.starts_with("https://") {
                format!("<a href=\"{href}\">{label}</a>")
            } else {
                label.to_string()
            }
        });
        let with_bold = BOLD_RE.replace_all(&with_links, "<strong>$1</strong>");
        let with_italic = ITALIC_RE.replace_all(&with_bold, "<em>$1</em>");
        with_italic.replace('\n', "<br>")
    }
}

fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Derives note preview fields from markdown content.
///
/// Rules:
/// - `preview_image`: first markdown image path matched by regex.
/// - `preview_text`: markdown symbols removed, whitespace normalized,
///   first `PREVIEW_TEXT_CHARS` chars retained.
pub fn derive_note_preview(content: &str) -> NotePreview {
    let preview_image = MARKDOWN_IMAGE_RE
        .captures(content)
        .and_then(|caps| caps.get(1).map(|m| m.as_str().trim().to_string()))
        .filter(|value| !value.is_empty());

    let without_images = MARKDOWN_IMAGE_RE.replace_all(content, " ");
    let without_links = MARKDOWN_LINK_RE.replace_all(&without_images, "$1");
    let without_symbols = MARKDOWN_SYMBOL_RE.replace_all(&without_links, " ");
    let normalized = WHITESPACE_RE.replace_all(&without_symbols, " ");
    let trimmed = normalized.trim();
    let preview_text = if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.chars().take(PREVIEW_TEXT_CHARS).collect())
    };

    NotePreview {
        preview_text,
        preview_image,
    }
}

#[cfg(test)]
mod tests {
    use super::{derive_note_preview, InlineMarkdownRenderer, MarkdownRenderer};

    #[test]
    fn render_escapes_source_html() {
        let renderer = InlineMarkdownRenderer;
        let markup = renderer.render("<script>alert(1)</script>");
        assert!(!markup.contains("<script>"));
        assert!(markup.contains("&lt;script&gt;"));
    }

    #[test]
    fn render_handles_inline_markdown() {
        let renderer = InlineMarkdownRenderer;
        let markup = renderer.render("**bold** and *em* and `code`");
        assert_eq!(
            markup,
            "<strong>bold</strong> and <em>em</em> and <code>code</code>"
        );
    }

    #[test]
    fn render_drops_non_http_links() {
        let renderer = InlineMarkdownRenderer;
        let markup = renderer.render("[ok](https://example.com) [bad](javascript:alert(1))");
        assert!(markup.contains("<a href=\"https://example.com\">ok</a>"));
        assert!(!markup.contains("javascript:"));
        assert!(markup.contains("bad"));
    }

    #[test]
    fn preview_extracts_first_image_and_strips_symbols() {
        let preview = derive_note_preview("# head\n![a](one.png) **rest** text");
        assert_eq!(preview.preview_image.as_deref(), Some("one.png"));
        let text = preview.preview_text.expect("preview text");
        assert!(!text.contains('#'));
        assert!(!text.contains('*'));
        assert!(text.contains("rest"));
    }
}
