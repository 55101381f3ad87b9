//! Selector generation and structural query evaluation.
//!
//! # Responsibility
//! - Build the primary structural selector and the positional fallback
//!   path for a live element.
//! - Execute both selector forms against the current document.
//!
//! # Invariants
//! - A candidate selector is only promoted to primary after re-querying
//!   the document yields a unique match identical to the source element.
//! - Generation is deterministic for an unchanged document.
//! - The document root itself is never a valid anchor target.

use crate::dom::{NodeId, PageDocument};
use crate::model::note::Anchor;
use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Maximum class tokens carried per path segment.
const MAX_CLASS_TOKENS: usize = 3;

/// Maximum length of one sanitized class token.
const MAX_CLASS_TOKEN_CHARS: usize = 50;

static SEGMENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^([a-zA-Z][a-zA-Z0-9-]*)(?:#([A-Za-z][A-Za-z0-9_-]*))?((?:\.[A-Za-z0-9_-]+)*)(?::nth-(of-type|child)\((\d+)\))?$",
    )
    .expect("valid segment regex")
});

static PATH_STEP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([a-zA-Z][a-zA-Z0-9-]*)\[(\d+)\]$").expect("valid path step regex"));

static CLASS_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("valid class token regex"));

static USABLE_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_-]*$").expect("valid id regex"));

/// Structural query failure; the resolver treats this as a cache miss.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectorError {
    Malformed { selector: String },
}

impl Display for SelectorError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed { selector } => write!(f, "malformed selector `{selector}`"),
        }
    }
}

impl Error for SelectorError {}

/// Whether a stored selector uses the positional path-expression form.
pub fn is_path_expression(selector: &str) -> bool {
    selector.starts_with('/')
}

/// Generates a selector pair for `element`, best-effort.
///
/// Candidates are attempted in order (id-anchored path, class+position
/// path, structural nth-child chain); the first one whose unique re-query
/// match is identity-equal to `element` becomes the primary selector.
/// The positional path expression is always computed as the fallback.
/// When nothing validates the computed values are still returned so
/// callers can keep a partially usable anchor; both fields are `None`
/// only for the document root.
pub fn generate_anchor(doc: &PageDocument, element: NodeId) -> Anchor {
    if element == doc.root() || !doc.is_element(element) {
        return Anchor::default();
    }

    let candidates = [
        build_id_path(doc, element),
        Some(build_class_path(doc, element)),
        Some(build_structural_path(doc, element)),
    ];

    let mut primary = None;
    for candidate in candidates.iter().flatten() {
        if validates(doc, candidate, element) {
            primary = Some(candidate.clone());
            break;
        }
    }
    if primary.is_none() {
        // Best-effort: keep the strongest computed candidate anyway.
        primary = candidates.iter().flatten().next().cloned();
        warn!(
            "event=anchor_generate module=anchor status=unvalidated selector={}",
            primary.as_deref().unwrap_or("-")
        );
    }

    let fallback = build_positional_path(doc, element);
    if evaluate_path(doc, &fallback) != Some(element) {
        warn!(
            "event=anchor_generate module=anchor status=fallback_unvalidated path={}",
            fallback
        );
    }

    debug!(
        "event=anchor_generate module=anchor status=ok primary={} fallback={}",
        primary.as_deref().unwrap_or("-"),
        fallback
    );
    Anchor::new(primary, Some(fallback))
}

/// Executes a structural selector, returning every match in document
/// order. Segments are separated by ` > ` (child combinator only).
pub fn query_all(doc: &PageDocument, selector: &str) -> Result<Vec<NodeId>, SelectorError> {
    let segments: Vec<Segment> = selector
        .split(" > ")
        .map(|raw| parse_segment(raw.trim()))
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| SelectorError::Malformed {
            selector: selector.to_string(),
        })?;
    if segments.is_empty() {
        return Err(SelectorError::Malformed {
            selector: selector.to_string(),
        });
    }

    let mut current: Vec<NodeId> = doc
        .descendants(doc.root())
        .into_iter()
        .filter(|&n| segment_matches(doc, n, &segments[0]))
        .collect();

    for segment in &segments[1..] {
        let mut next = Vec::new();
        for &node in &current {
            for &child in doc.children(node) {
                if segment_matches(doc, child, segment) {
                    next.push(child);
                }
            }
        }
        current = next;
    }
    Ok(current)
}

/// Evaluates a root-relative positional path (`/html[1]/body[1]/div[2]`).
/// Returns `None` for malformed paths or steps without a matching child.
pub fn evaluate_path(doc: &PageDocument, path: &str) -> Option<NodeId> {
    let rest = path.strip_prefix('/')?;
    let mut steps = rest.split('/');

    let first = parse_path_step(steps.next()?)?;
    let root = doc.root();
    if doc.tag(root) != Some(first.0.as_str()) || first.1 != 1 {
        return None;
    }

    let mut current = root;
    for raw in steps {
        let (tag, index) = parse_path_step(raw)?;
        let mut seen = 0usize;
        let mut found = None;
        for &child in doc.children(current) {
            if doc.tag(child) == Some(tag.as_str()) {
                seen += 1;
                if seen == index {
                    found = Some(child);
                    break;
                }
            }
        }
        current = found?;
    }
    Some(current)
}

fn parse_path_step(raw: &str) -> Option<(String, usize)> {
    let caps = PATH_STEP_RE.captures(raw)?;
    let tag = caps.get(1)?.as_str().to_string();
    let index: usize = caps.get(2)?.as_str().parse().ok()?;
    if index == 0 {
        return None;
    }
    Some((tag, index))
}

#[derive(Debug)]
struct Segment {
    tag: String,
    id: Option<String>,
    classes: Vec<String>,
    nth_of_type: Option<usize>,
    nth_child: Option<usize>,
}

fn parse_segment(raw: &str) -> Option<Segment> {
    let caps = SEGMENT_RE.captures(raw)?;
    let tag = caps.get(1)?.as_str().to_string();
    let id = caps.get(2).map(|m| m.as_str().to_string());
    let classes: Vec<String> = caps
        .get(3)
        .map(|m| {
            m.as_str()
                .split('.')
                .filter(|token| !token.is_empty())
                .map(|token| token.to_string())
                .collect()
        })
        .unwrap_or_default();
    let index: Option<usize> = caps.get(5).and_then(|m| m.as_str().parse().ok());
    let (nth_of_type, nth_child) = match (caps.get(4).map(|m| m.as_str()), index) {
        (Some("of-type"), Some(i)) if i > 0 => (Some(i), None),
        (Some("child"), Some(i)) if i > 0 => (None, Some(i)),
        (None, _) => (None, None),
        _ => return None,
    };
    Some(Segment {
        tag,
        id,
        classes,
        nth_of_type,
        nth_child,
    })
}

fn segment_matches(doc: &PageDocument, node: NodeId, segment: &Segment) -> bool {
    let Some(data) = doc.element(node) else {
        return false;
    };
    if data.tag != segment.tag {
        return false;
    }
    if let Some(id) = &segment.id {
        if data.id.as_deref() != Some(id.as_str()) {
            return false;
        }
    }
    for class in &segment.classes {
        if !data.classes.iter().any(|c| c == class) {
            return false;
        }
    }
    if let Some(index) = segment.nth_of_type {
        if doc.nth_of_type_index(node) != Some(index) {
            return false;
        }
    }
    if let Some(index) = segment.nth_child {
        if doc.nth_child_index(node) != Some(index) {
            return false;
        }
    }
    true
}

/// Unique-match identity validation against the live document.
fn validates(doc: &PageDocument, selector: &str, element: NodeId) -> bool {
    match query_all(doc, selector) {
        Ok(matches) => matches.len() == 1 && matches[0] == element,
        Err(_) => false,
    }
}

/// Path anchored at the nearest ancestor with a document-unique usable
/// id; `None` when no such ancestor exists.
fn build_id_path(doc: &PageDocument, element: NodeId) -> Option<String> {
    let chain = ancestor_chain(doc, element);
    let head = chain
        .iter()
        .rposition(|&node| usable_unique_id(doc, node).is_some())?;

    let mut segments = Vec::new();
    for (position, &node) in chain.iter().enumerate().skip(head) {
        if position == head {
            let id = usable_unique_id(doc, node).unwrap_or_default();
            let tag = doc.tag(node).unwrap_or_default();
            segments.push(format!("{tag}#{id}"));
        } else {
            segments.push(class_segment(doc, node));
        }
    }
    Some(segments.join(" > "))
}

/// Full root-to-element chain of class+position segments.
fn build_class_path(doc: &PageDocument, element: NodeId) -> String {
    ancestor_chain(doc, element)
        .iter()
        .map(|&node| class_segment(doc, node))
        .collect::<Vec<_>>()
        .join(" > ")
}

/// Full root-to-element chain of `tag:nth-child(i)` segments, relying on
/// sibling order alone.
fn build_structural_path(doc: &PageDocument, element: NodeId) -> String {
    ancestor_chain(doc, element)
        .iter()
        .map(|&node| {
            let tag = doc.tag(node).unwrap_or_default().to_string();
            match doc.nth_child_index(node) {
                Some(index) => format!("{tag}:nth-child({index})"),
                None => tag,
            }
        })
        .collect::<Vec<_>>()
        .join(" > ")
}

/// Root-relative positional path, indexed by tag occurrence per level.
fn build_positional_path(doc: &PageDocument, element: NodeId) -> String {
    let mut out = String::new();
    for node in ancestor_chain(doc, element) {
        let tag = doc.tag(node).unwrap_or_default();
        let index = doc.nth_of_type_index(node).unwrap_or(1);
        out.push('/');
        out.push_str(tag);
        out.push('[');
        out.push_str(&index.to_string());
        out.push(']');
    }
    out
}

/// Root-first chain of elements ending at `element`.
fn ancestor_chain(doc: &PageDocument, element: NodeId) -> Vec<NodeId> {
    let mut chain = Vec::new();
    let mut current = Some(element);
    while let Some(node) = current {
        chain.push(node);
        current = doc.parent(node);
    }
    chain.reverse();
    chain
}

fn class_segment(doc: &PageDocument, node: NodeId) -> String {
    let tag = doc.tag(node).unwrap_or_default().to_string();
    let mut segment = tag;
    if let Some(data) = doc.element(node) {
        for class in sanitized_classes(&data.classes) {
            segment.push('.');
            segment.push_str(&class);
        }
    }
    if doc.same_tag_sibling_count(node) > 1 {
        if let Some(index) = doc.nth_of_type_index(node) {
            segment.push_str(&format!(":nth-of-type({index})"));
        }
    }
    segment
}

fn sanitized_classes(classes: &[String]) -> Vec<String> {
    classes
        .iter()
        .filter(|class| {
            class.chars().count() <= MAX_CLASS_TOKEN_CHARS && CLASS_TOKEN_RE.is_match(class)
        })
        .take(MAX_CLASS_TOKENS)
        .cloned()
        .collect()
}

fn usable_unique_id(doc: &PageDocument, node: NodeId) -> Option<String> {
    let id = doc.element(node)?.id.clone()?;
    if !USABLE_ID_RE.is_match(&id) {
        return None;
    }
    if doc.elements_with_id(&id).len() != 1 {
        return None;
    }
    Some(id)
}
