//! Arena-backed page document tree.
//!
//! # Responsibility
//! - Own every element and text node of the modeled page.
//! - Expose document-order traversal, sibling indexing, hit testing and
//!   the text-node split/merge mutations used by highlighting.
//!
//! # Invariants
//! - `NodeId` values are never reused within one document.
//! - The root element exists for the document lifetime and cannot be
//!   detached.
//! - Children lists contain no duplicates and mirror `parent` links.

use crate::dom::geometry::{Point, Rect, Viewport};

/// Handle to a node in one `PageDocument` arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Element payload: identity, class list, inline style and laid-out
/// geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementData {
    pub tag: String,
    pub id: Option<String>,
    pub classes: Vec<String>,
    /// Inline style declaration text, if any.
    pub style: Option<String>,
    /// Document-absolute layout rectangle.
    pub rect: Rect,
}

/// Node payload variants.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeData {
    Element(ElementData),
    Text(String),
}

#[derive(Debug)]
struct Node {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    data: NodeData,
}

/// Owned in-memory document with a scrollable viewport.
#[derive(Debug)]
pub struct PageDocument {
    nodes: Vec<Node>,
    viewport: Viewport,
}

impl PageDocument {
    /// Creates a document holding only the root element (`html`).
    pub fn new(viewport: Viewport) -> Self {
        let root = Node {
            parent: None,
            children: Vec::new(),
            data: NodeData::Element(ElementData {
                tag: "html".to_string(),
                id: None,
                classes: Vec::new(),
                style: None,
                rect: Rect::new(0.0, 0.0, viewport.width, viewport.height),
            }),
        };
        Self {
            nodes: vec![root],
            viewport,
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn viewport_mut(&mut self) -> &mut Viewport {
        &mut self.viewport
    }

    // ---- construction ----------------------------------------------------

    /// Creates a detached element node.
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.push(NodeData::Element(ElementData {
            tag: tag.to_string(),
            id: None,
            classes: Vec::new(),
            style: None,
            rect: Rect::default(),
        }))
    }

    /// Creates a detached text node.
    pub fn create_text(&mut self, content: &str) -> NodeId {
        self.push(NodeData::Text(content.to_string()))
    }

    /// Creates an element and appends it to `parent` in one step.
    pub fn append_element(&mut self, parent: NodeId, tag: &str) -> NodeId {
        let node = self.create_element(tag);
        self.append_child(parent, node);
        node
    }

    /// Creates a text node and appends it to `parent` in one step.
    pub fn append_text(&mut self, parent: NodeId, content: &str) -> NodeId {
        let node = self.create_text(content);
        self.append_child(parent, node);
        node
    }

    fn push(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            parent: None,
            children: Vec::new(),
            data,
        });
        id
    }

    // ---- structure -------------------------------------------------------

    /// Appends `child` as the last child of `parent`, detaching it from any
    /// previous parent first.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[parent.0].children.push(child);
        self.nodes[child.0].parent = Some(parent);
    }

    /// Inserts `node` into `parent`'s child list directly before
    /// `reference`. Appends when `reference` is not a child of `parent`.
    pub fn insert_before(&mut self, parent: NodeId, node: NodeId, reference: NodeId) {
        self.detach(node);
        let position = self.nodes[parent.0]
            .children
            .iter()
            .position(|&c| c == reference);
        match position {
            Some(index) => self.nodes[parent.0].children.insert(index, node),
            None => self.nodes[parent.0].children.push(node),
        }
        self.nodes[node.0].parent = Some(parent);
    }

    /// Removes `node` from its parent's child list. The subtree stays in
    /// the arena but becomes unreachable from the root. Root is a no-op.
    pub fn detach(&mut self, node: NodeId) {
        if node == self.root() {
            return;
        }
        if let Some(parent) = self.nodes[node.0].parent.take() {
            self.nodes[parent.0].children.retain(|&c| c != node);
        }
    }

    /// Whether `node` is still reachable from the document root.
    pub fn is_attached(&self, node: NodeId) -> bool {
        let mut current = node;
        loop {
            if current == self.root() {
                return true;
            }
            match self.nodes[current.0].parent {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    /// Whether `node` is `ancestor` or lies inside its subtree.
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(c) = current {
            if c == ancestor {
                return true;
            }
            current = self.nodes[c.0].parent;
        }
        false
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0].parent
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.nodes[node.0].children
    }

    // ---- data access -----------------------------------------------------

    pub fn data(&self, node: NodeId) -> &NodeData {
        &self.nodes[node.0].data
    }

    pub fn element(&self, node: NodeId) -> Option<&ElementData> {
        match &self.nodes[node.0].data {
            NodeData::Element(data) => Some(data),
            NodeData::Text(_) => None,
        }
    }

    pub fn is_element(&self, node: NodeId) -> bool {
        matches!(self.nodes[node.0].data, NodeData::Element(_))
    }

    pub fn tag(&self, node: NodeId) -> Option<&str> {
        self.element(node).map(|data| data.tag.as_str())
    }

    pub fn text(&self, node: NodeId) -> Option<&str> {
        match &self.nodes[node.0].data {
            NodeData::Text(content) => Some(content.as_str()),
            NodeData::Element(_) => None,
        }
    }

    pub fn set_text(&mut self, node: NodeId, content: &str) {
        if let NodeData::Text(existing) = &mut self.nodes[node.0].data {
            *existing = content.to_string();
        }
    }

    pub fn set_id(&mut self, node: NodeId, id: &str) {
        if let NodeData::Element(data) = &mut self.nodes[node.0].data {
            data.id = Some(id.to_string());
        }
    }

    pub fn add_class(&mut self, node: NodeId, class: &str) {
        if let NodeData::Element(data) = &mut self.nodes[node.0].data {
            if !data.classes.iter().any(|c| c == class) {
                data.classes.push(class.to_string());
            }
        }
    }

    pub fn remove_class(&mut self, node: NodeId, class: &str) {
        if let NodeData::Element(data) = &mut self.nodes[node.0].data {
            data.classes.retain(|c| c != class);
        }
    }

    pub fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.element(node)
            .map(|data| data.classes.iter().any(|c| c == class))
            .unwrap_or(false)
    }

    pub fn set_style(&mut self, node: NodeId, style: &str) {
        if let NodeData::Element(data) = &mut self.nodes[node.0].data {
            data.style = Some(style.to_string());
        }
    }

    pub fn style(&self, node: NodeId) -> Option<&str> {
        self.element(node).and_then(|data| data.style.as_deref())
    }

    pub fn set_rect(&mut self, node: NodeId, rect: Rect) {
        if let NodeData::Element(data) = &mut self.nodes[node.0].data {
            data.rect = rect;
        }
    }

    pub fn rect(&self, node: NodeId) -> Option<Rect> {
        self.element(node).map(|data| data.rect)
    }

    /// Moves an element's rectangle to a new top-left, keeping its size.
    pub fn move_to(&mut self, node: NodeId, x: f64, y: f64) {
        if let NodeData::Element(data) = &mut self.nodes[node.0].data {
            data.rect.x = x;
            data.rect.y = y;
        }
    }

    // ---- traversal and queries -------------------------------------------

    /// Pre-order document traversal of the subtree rooted at `node`,
    /// including `node` itself.
    pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            out.push(current);
            for &child in self.nodes[current.0].children.iter().rev() {
                stack.push(child);
            }
        }
        out
    }

    /// Text nodes of the subtree in document order.
    pub fn text_nodes_within(&self, node: NodeId) -> Vec<NodeId> {
        self.descendants(node)
            .into_iter()
            .filter(|&n| self.text(n).is_some())
            .collect()
    }

    /// Concatenated text of the subtree in document order.
    pub fn text_content(&self, node: NodeId) -> String {
        self.text_nodes_within(node)
            .into_iter()
            .filter_map(|n| self.text(n))
            .collect()
    }

    /// All attached elements carrying the given id, in document order.
    pub fn elements_with_id(&self, id: &str) -> Vec<NodeId> {
        self.descendants(self.root())
            .into_iter()
            .filter(|&n| {
                self.element(n)
                    .and_then(|data| data.id.as_deref())
                    .map(|value| value == id)
                    .unwrap_or(false)
            })
            .collect()
    }

    /// 1-based position of `node` among its element siblings.
    pub fn nth_child_index(&self, node: NodeId) -> Option<usize> {
        let parent = self.parent(node)?;
        self.children(parent)
            .iter()
            .filter(|&&c| self.is_element(c))
            .position(|&c| c == node)
            .map(|i| i + 1)
    }

    /// 1-based position of `node` among same-tag element siblings.
    pub fn nth_of_type_index(&self, node: NodeId) -> Option<usize> {
        let tag = self.tag(node)?.to_string();
        let parent = self.parent(node)?;
        self.children(parent)
            .iter()
            .filter(|&&c| self.tag(c) == Some(tag.as_str()))
            .position(|&c| c == node)
            .map(|i| i + 1)
    }

    /// Number of element siblings sharing `node`'s tag, including itself.
    pub fn same_tag_sibling_count(&self, node: NodeId) -> usize {
        let Some(tag) = self.tag(node) else {
            return 0;
        };
        let tag = tag.to_string();
        let Some(parent) = self.parent(node) else {
            return 1;
        };
        self.children(parent)
            .iter()
            .filter(|&&c| self.tag(c) == Some(tag.as_str()))
            .count()
    }

    /// Deepest attached element whose rectangle contains the document
    /// point, skipping the `exclude` subtree. Later siblings win ties,
    /// matching paint order.
    pub fn element_at_point(&self, point: Point, exclude: Option<NodeId>) -> Option<NodeId> {
        self.hit_test(self.root(), point, exclude)
    }

    fn hit_test(&self, node: NodeId, point: Point, exclude: Option<NodeId>) -> Option<NodeId> {
        if Some(node) == exclude {
            return None;
        }
        let data = self.element(node)?;
        if node != self.root() && !data.rect.contains(point) {
            return None;
        }
        for &child in self.nodes[node.0].children.iter().rev() {
            if let Some(hit) = self.hit_test(child, point, exclude) {
                return Some(hit);
            }
        }
        if node == self.root() {
            None
        } else {
            Some(node)
        }
    }

    // ---- text mutations used by highlighting ------------------------------

    /// Splits `text_node` at `offset` (byte index on a char boundary) and
    /// returns the new trailing node inserted right after it. Returns
    /// `None` when the offset is out of range or not a char boundary.
    pub fn split_text(&mut self, text_node: NodeId, offset: usize) -> Option<NodeId> {
        let content = self.text(text_node)?.to_string();
        if offset > content.len() || !content.is_char_boundary(offset) {
            return None;
        }
        let parent = self.parent(text_node)?;
        let (head, tail) = content.split_at(offset);
        let head = head.to_string();
        let tail_node = self.create_text(tail);
        self.set_text(text_node, &head);

        let siblings = &self.nodes[parent.0].children;
        let next = siblings
            .iter()
            .position(|&c| c == text_node)
            .and_then(|i| siblings.get(i + 1))
            .copied();
        match next {
            Some(reference) => self.insert_before(parent, tail_node, reference),
            None => self.append_child(parent, tail_node),
        }
        Some(tail_node)
    }

    /// Replaces `node` with `replacement` in the parent's child list.
    pub fn replace_child(&mut self, node: NodeId, replacement: NodeId) {
        let Some(parent) = self.parent(node) else {
            return;
        };
        self.insert_before(parent, replacement, node);
        self.detach(node);
    }

    /// Merges runs of adjacent text children of `parent` into single
    /// nodes, the `Node.normalize()` analogue. Empty text nodes are
    /// dropped.
    pub fn normalize(&mut self, parent: NodeId) {
        let children = self.nodes[parent.0].children.clone();
        let mut merged_into: Option<NodeId> = None;
        for child in children {
            match self.text(child).map(|t| t.to_string()) {
                Some(content) => {
                    if content.is_empty() {
                        self.detach(child);
                        continue;
                    }
                    match merged_into {
                        Some(target) => {
                            let mut combined = self
                                .text(target)
                                .map(|t| t.to_string())
                                .unwrap_or_default();
                            combined.push_str(&content);
                            self.set_text(target, &combined);
                            self.detach(child);
                        }
                        None => merged_into = Some(child),
                    }
                }
                None => merged_into = None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::PageDocument;
    use crate::dom::geometry::{Point, Rect, Viewport};

    fn doc() -> PageDocument {
        PageDocument::new(Viewport::new(1024.0, 768.0))
    }

    #[test]
    fn detached_subtree_is_not_attached() {
        let mut doc = doc();
        let body = doc.append_element(doc.root(), "body");
        let div = doc.append_element(body, "div");
        let p = doc.append_element(div, "p");
        assert!(doc.is_attached(p));

        doc.detach(div);
        assert!(!doc.is_attached(div));
        assert!(!doc.is_attached(p));
        assert!(doc.is_attached(body));
    }

    #[test]
    fn text_content_concatenates_in_document_order() {
        let mut doc = doc();
        let body = doc.append_element(doc.root(), "body");
        let p = doc.append_element(body, "p");
        doc.append_text(p, "say ");
        let em = doc.append_element(p, "em");
        doc.append_text(em, "hello");
        doc.append_text(p, " today");
        assert_eq!(doc.text_content(p), "say hello today");
    }

    #[test]
    fn nth_of_type_ignores_other_tags() {
        let mut doc = doc();
        let body = doc.append_element(doc.root(), "body");
        doc.append_element(body, "div");
        let p1 = doc.append_element(body, "p");
        doc.append_element(body, "div");
        let p2 = doc.append_element(body, "p");
        assert_eq!(doc.nth_of_type_index(p1), Some(1));
        assert_eq!(doc.nth_of_type_index(p2), Some(2));
        assert_eq!(doc.nth_child_index(p2), Some(4));
        assert_eq!(doc.same_tag_sibling_count(p1), 2);
    }

    #[test]
    fn split_text_keeps_document_text_intact() {
        let mut doc = doc();
        let body = doc.append_element(doc.root(), "body");
        let p = doc.append_element(body, "p");
        let node = doc.append_text(p, "hello world");
        let tail = doc.split_text(node, 5).expect("split at char boundary");
        assert_eq!(doc.text(node), Some("hello"));
        assert_eq!(doc.text(tail), Some(" world"));
        assert_eq!(doc.text_content(p), "hello world");
    }

    #[test]
    fn split_text_rejects_non_boundary_offsets() {
        let mut doc = doc();
        let body = doc.append_element(doc.root(), "body");
        let p = doc.append_element(body, "p");
        let node = doc.append_text(p, "héllo");
        // Index 2 lands inside the two-byte 'é'.
        assert!(doc.split_text(node, 2).is_none());
        assert!(doc.split_text(node, 99).is_none());
    }

    #[test]
    fn normalize_merges_adjacent_text_runs() {
        let mut doc = doc();
        let body = doc.append_element(doc.root(), "body");
        let p = doc.append_element(body, "p");
        doc.append_text(p, "a");
        doc.append_text(p, "");
        doc.append_text(p, "b");
        doc.append_element(p, "br");
        doc.append_text(p, "c");
        doc.append_text(p, "d");
        doc.normalize(p);

        let children = doc.children(p).to_vec();
        assert_eq!(children.len(), 3);
        assert_eq!(doc.text(children[0]), Some("ab"));
        assert!(doc.is_element(children[1]));
        assert_eq!(doc.text(children[2]), Some("cd"));
    }

    #[test]
    fn hit_test_prefers_deepest_and_later_siblings() {
        let mut doc = doc();
        let body = doc.append_element(doc.root(), "body");
        doc.set_rect(body, Rect::new(0.0, 0.0, 1024.0, 768.0));
        let below = doc.append_element(body, "div");
        doc.set_rect(below, Rect::new(0.0, 0.0, 200.0, 200.0));
        let above = doc.append_element(body, "div");
        doc.set_rect(above, Rect::new(0.0, 0.0, 200.0, 200.0));
        let inner = doc.append_element(above, "span");
        doc.set_rect(inner, Rect::new(10.0, 10.0, 50.0, 50.0));

        let hit = doc.element_at_point(Point::new(20.0, 20.0), None);
        assert_eq!(hit, Some(inner));

        let hit = doc.element_at_point(Point::new(20.0, 20.0), Some(above));
        assert_eq!(hit, Some(below));
    }
}
