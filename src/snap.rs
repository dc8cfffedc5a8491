//! # Snap Engine
//!
//! Grid- and neighbor-aware position adjustment for a dragged element.
//!
//! Two independent passes run against the element's *raw* position:
//!
//! 1. **Grid**: each axis rounds to the nearest multiple of `grid_size`.
//! 2. **Elements**: each anchor of the target (start, center, end) is
//!    compared with each anchor of every candidate, per axis. A comparison
//!    within `grid_size` moves the target so the two anchors coincide and
//!    emits a guide line at the candidate's coordinate.
//!
//! Within one candidate the comparison with the smallest distance is used
//! (the first in start/center/end order on a tie). When the element pass
//! fires on an axis it overrides the grid result for that axis. Candidates
//! are scanned in caller order, so the *last* matching candidate on an axis
//! wins. A result that would not be finite leaves that axis at its raw
//! coordinate.
//!
//! ```
//! use easel::document::{Element, ElementType};
//! use easel::snap::{snap, SnapOptions};
//!
//! let mut neighbor = Element::editor_default(ElementType::Text, "a");
//! neighbor.x = 100.0;
//! let mut dragged = Element::editor_default(ElementType::Text, "b");
//! dragged.x = 104.0;
//! dragged.y = 300.0;
//!
//! let result = snap(&dragged, &[neighbor], &SnapOptions::default());
//! assert_eq!(result.position.x, 100.0);
//! ```

use serde::Serialize;

use crate::config::DEFAULT_GRID_SIZE;
use crate::document::Element;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnapOptions {
    /// Grid pitch, and the element-snap threshold.
    pub grid_size: f64,
    pub grid_enabled: bool,
    pub element_snap_enabled: bool,
}

impl Default for SnapOptions {
    fn default() -> Self {
        Self {
            grid_size: DEFAULT_GRID_SIZE,
            grid_enabled: true,
            element_snap_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// Orientation of a guide line. A vertical line marks an x coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Vertical,
    Horizontal,
}

/// Which part of the candidate the guide marks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapLineKind {
    Edge,
    Center,
}

/// A visual alignment guide.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapLine {
    pub orientation: Orientation,
    /// Canvas coordinate of the line on the axis it marks.
    pub position: f64,
    pub kind: SnapLineKind,
    /// Element the target aligned with.
    pub element_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapResult {
    pub position: Point,
    pub guide_lines: Vec<SnapLine>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Anchor {
    Start,
    Center,
    End,
}

impl Anchor {
    const ORDER: [Anchor; 3] = [Anchor::Start, Anchor::Center, Anchor::End];

    /// Distance of this anchor from the span's start.
    fn offset(self, len: f64) -> f64 {
        match self {
            Anchor::Start => 0.0,
            Anchor::Center => len / 2.0,
            Anchor::End => len,
        }
    }

    fn kind(self) -> SnapLineKind {
        match self {
            Anchor::Center => SnapLineKind::Center,
            Anchor::Start | Anchor::End => SnapLineKind::Edge,
        }
    }
}

/// One axis of an element: where it starts and how long it is.
#[derive(Debug, Clone, Copy)]
struct Span {
    start: f64,
    len: f64,
}

impl Span {
    fn at(self, anchor: Anchor) -> f64 {
        self.start + anchor.offset(self.len)
    }
}

/// Round to the nearest multiple of `size`.
pub fn snap_to_grid(value: f64, size: f64) -> f64 {
    (value / size).round() * size
}

/// Align `target` against the span of one candidate on one axis.
///
/// Returns the new start of the closest comparison within `threshold`,
/// paired with the guide it produces.
fn axis_match(target: Span, candidate: Span, threshold: f64) -> Option<(f64, f64, SnapLineKind)> {
    let mut best: Option<(f64, (f64, f64, SnapLineKind))> = None;
    for t in Anchor::ORDER {
        for c in Anchor::ORDER {
            let line = candidate.at(c);
            let distance = (target.at(t) - line).abs();
            let start = line - t.offset(target.len);
            if distance <= threshold
                && start.is_finite()
                && best.is_none_or(|(d, _)| distance < d)
            {
                best = Some((distance, (start, line, c.kind())));
            }
        }
    }
    best.map(|(_, found)| found)
}

fn finite_or(value: f64, raw: f64) -> f64 {
    if value.is_finite() { value } else { raw }
}

/// Compute the snapped position of `target` among `candidates`.
///
/// `target` itself (matched by id) is skipped if present in `candidates`.
/// Missing width/height fall back to the default element dimensions.
pub fn snap(target: &Element, candidates: &[Element], options: &SnapOptions) -> SnapResult {
    let threshold = if options.grid_size.is_finite() && options.grid_size > 0.0 {
        options.grid_size
    } else {
        0.0
    };

    let mut position = Point {
        x: target.x,
        y: target.y,
    };
    if options.grid_enabled && threshold > 0.0 {
        position.x = finite_or(snap_to_grid(target.x, threshold), target.x);
        position.y = finite_or(snap_to_grid(target.y, threshold), target.y);
    }

    let mut guide_lines: Vec<SnapLine> = Vec::new();
    if !options.element_snap_enabled {
        return SnapResult {
            position,
            guide_lines,
        };
    }

    let tx = Span {
        start: target.x,
        len: target.effective_width(),
    };
    let ty = Span {
        start: target.y,
        len: target.effective_height(),
    };

    for candidate in candidates.iter().filter(|c| c.id != target.id) {
        let cx = Span {
            start: candidate.x,
            len: candidate.effective_width(),
        };
        let cy = Span {
            start: candidate.y,
            len: candidate.effective_height(),
        };

        if let Some((start, line, kind)) = axis_match(tx, cx, threshold) {
            position.x = start;
            push_unique(
                &mut guide_lines,
                SnapLine {
                    orientation: Orientation::Vertical,
                    position: line,
                    kind,
                    element_id: candidate.id.clone(),
                },
            );
        }
        if let Some((start, line, kind)) = axis_match(ty, cy, threshold) {
            position.y = start;
            push_unique(
                &mut guide_lines,
                SnapLine {
                    orientation: Orientation::Horizontal,
                    position: line,
                    kind,
                    element_id: candidate.id.clone(),
                },
            );
        }
    }

    SnapResult {
        position,
        guide_lines,
    }
}

fn push_unique(lines: &mut Vec<SnapLine>, line: SnapLine) {
    if !lines.contains(&line) {
        lines.push(line);
    }
}
