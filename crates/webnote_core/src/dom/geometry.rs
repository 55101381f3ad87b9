//! Document-space geometry primitives.
//!
//! All coordinates are document-absolute (scroll included) unless a name
//! says otherwise. The viewport converts between document and on-screen
//! space via its scroll offsets.

use serde::{Deserialize, Serialize};

/// A point in document coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// An axis-aligned rectangle in document coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Top-left corner.
    pub fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Whether the rectangle has no renderable area.
    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x && point.x < self.right() && point.y >= self.y && point.y < self.bottom()
    }
}

/// Scrollable window onto the document.
///
/// `scroll_x`/`scroll_y` are the document coordinates of the viewport's
/// top-left corner and never go negative.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
    pub scroll_x: f64,
    pub scroll_y: f64,
}

impl Viewport {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            scroll_x: 0.0,
            scroll_y: 0.0,
        }
    }

    /// Scrolls by the given deltas, clamping at the document origin.
    ///
    /// Returns the actually applied deltas, which differ from the request
    /// when clamping kicks in.
    pub fn scroll_by(&mut self, dx: f64, dy: f64) -> (f64, f64) {
        let new_x = (self.scroll_x + dx).max(0.0);
        let new_y = (self.scroll_y + dy).max(0.0);
        let applied = (new_x - self.scroll_x, new_y - self.scroll_y);
        self.scroll_x = new_x;
        self.scroll_y = new_y;
        applied
    }

    /// Converts a document-absolute point to viewport-relative coordinates.
    pub fn to_viewport(&self, point: Point) -> Point {
        Point::new(point.x - self.scroll_x, point.y - self.scroll_y)
    }

    /// Converts a viewport-relative point to document-absolute coordinates.
    pub fn to_document(&self, point: Point) -> Point {
        Point::new(point.x + self.scroll_x, point.y + self.scroll_y)
    }
}
