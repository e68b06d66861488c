//! Annotation data model
//!
//! Annotations are pure editor-layer state in page-local document
//! coordinates (origin bottom-left, y up, points); they do not touch the
//! document's bytes until an explicit export bakes them onto page content.
//! Every kind is a separate variant carrying only its own fields.

use crate::coords::PagePoint;
use crate::font_metrics::{aligned_origin_x, measure_text, FontFamily, TextAlign};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Unique identifier for an annotation
///
/// Stable across the editor session, persists in auto-save snapshots.
pub type AnnotationId = uuid::Uuid;

/// Identifier for an annotation group
pub type GroupId = uuid::Uuid;

/// RGBA color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const BLACK: Color = Color { r: 0, g: 0, b: 0, a: 255 };
    pub const WHITE: Color = Color { r: 255, g: 255, b: 255, a: 255 };
    pub const RED: Color = Color { r: 255, g: 0, b: 0, a: 255 };
    pub const YELLOW: Color = Color { r: 255, g: 255, b: 0, a: 255 };

    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Parse a `#rrggbb` hex color; malformed input yields black
    pub fn from_hex(hex: &str) -> Self {
        let hex = hex.trim_start_matches('#');
        if hex.len() != 6 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Color::BLACK;
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).unwrap_or(0);
        Color::rgb(channel(0), channel(2), channel(4))
    }

    /// Normalized RGB channels (0.0 to 1.0)
    pub fn to_normalized(&self) -> (f32, f32, f32) {
        (
            self.r as f32 / 255.0,
            self.g as f32 / 255.0,
            self.b as f32 / 255.0,
        )
    }
}

/// Axis-aligned rectangle in page coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle spanning two corner points
    pub fn from_corners(a: PagePoint, b: PagePoint) -> Self {
        Self {
            x: a.x.min(b.x),
            y: a.y.min(b.y),
            width: (a.x - b.x).abs(),
            height: (a.y - b.y).abs(),
        }
    }

    pub fn contains(&self, point: &PagePoint, tolerance: f32) -> bool {
        point.x >= self.x - tolerance
            && point.x <= self.x + self.width + tolerance
            && point.y >= self.y - tolerance
            && point.y <= self.y + self.height + tolerance
    }
}

/// Unit for measurement annotations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MeasureUnit {
    #[default]
    Px,
    Mm,
    Cm,
    In,
}

/// Kind of interactive form field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FormFieldKind {
    #[default]
    Text,
    Checkbox,
    Dropdown,
    Signature,
}

/// One annotation variant per tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum AnnotationKind {
    Text {
        position: PagePoint,
        text: String,
        font_size: f32,
        font_family: String,
        bold: bool,
        italic: bool,
        align: TextAlign,
        color: Color,
    },
    Highlight {
        rect: Rect,
        color: Color,
    },
    Rectangle {
        rect: Rect,
        stroke: Color,
        fill: Option<Color>,
        stroke_width: f32,
    },
    Circle {
        rect: Rect,
        stroke: Color,
        fill: Option<Color>,
        stroke_width: f32,
    },
    Line {
        start: PagePoint,
        end: PagePoint,
        stroke: Color,
        stroke_width: f32,
    },
    Arrow {
        start: PagePoint,
        end: PagePoint,
        stroke: Color,
        stroke_width: f32,
    },
    Freehand {
        points: Vec<PagePoint>,
        stroke: Color,
        stroke_width: f32,
    },
    Polygon {
        points: Vec<PagePoint>,
        stroke: Color,
        fill: Option<Color>,
    },
    Callout {
        points: Vec<PagePoint>,
        text: String,
        stroke: Color,
    },
    Note {
        rect: Rect,
        comment: String,
        fill: Color,
        stroke: Color,
    },
    Link {
        rect: Rect,
        url: String,
    },
    Stamp {
        rect: Rect,
        text: String,
        color: Color,
        font_size: f32,
    },
    Signature {
        rect: Rect,
        strokes: Vec<Vec<PagePoint>>,
    },
    Watermark {
        position: PagePoint,
        text: String,
        font_size: f32,
        opacity: f32,
    },
    Redaction {
        rect: Rect,
    },
    Ruler {
        start: PagePoint,
        end: PagePoint,
        distance: f32,
        unit: MeasureUnit,
    },
    Measure {
        start: PagePoint,
        end: PagePoint,
        distance: f32,
        unit: MeasureUnit,
    },
    FormField {
        rect: Rect,
        field: FormFieldKind,
        name: String,
        required: bool,
        options: Vec<String>,
    },
    Image {
        rect: Rect,
        data: String,
    },
}

/// An annotation with its editor-layer bookkeeping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: AnnotationId,
    pub page: u32,
    /// Stacking order; higher draws later. Initially insertion order.
    pub z_order: i32,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub hidden: bool,
    #[serde(flatten)]
    pub kind: AnnotationKind,
}

impl Annotation {
    pub fn new(page: u32, kind: AnnotationKind) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            page,
            z_order: 0,
            locked: false,
            hidden: false,
            kind,
        }
    }

    /// Bounding box as (min_x, min_y, max_x, max_y)
    ///
    /// Text-bearing kinds measure their actual glyph-run extent via the
    /// same metrics path the text editor uses, honoring alignment.
    pub fn bounding_box(&self) -> (f32, f32, f32, f32) {
        match &self.kind {
            AnnotationKind::Text {
                position,
                text,
                font_size,
                font_family,
                align,
                ..
            } => {
                let family = FontFamily::from_name(font_family);
                let width = measure_text(text, *font_size, family);
                let min_x = aligned_origin_x(position.x, width, *align);
                (min_x, position.y, min_x + width, position.y + font_size)
            }
            AnnotationKind::Watermark {
                position,
                text,
                font_size,
                ..
            } => {
                let width = measure_text(text, *font_size, FontFamily::Helvetica);
                (position.x, position.y, position.x + width, position.y + font_size)
            }
            AnnotationKind::Highlight { rect, .. }
            | AnnotationKind::Rectangle { rect, .. }
            | AnnotationKind::Circle { rect, .. }
            | AnnotationKind::Note { rect, .. }
            | AnnotationKind::Link { rect, .. }
            | AnnotationKind::Stamp { rect, .. }
            | AnnotationKind::Signature { rect, .. }
            | AnnotationKind::Redaction { rect }
            | AnnotationKind::FormField { rect, .. }
            | AnnotationKind::Image { rect, .. } => {
                (rect.x, rect.y, rect.x + rect.width, rect.y + rect.height)
            }
            AnnotationKind::Line { start, end, .. }
            | AnnotationKind::Arrow { start, end, .. }
            | AnnotationKind::Ruler { start, end, .. }
            | AnnotationKind::Measure { start, end, .. } => (
                start.x.min(end.x),
                start.y.min(end.y),
                start.x.max(end.x),
                start.y.max(end.y),
            ),
            AnnotationKind::Freehand { points, .. }
            | AnnotationKind::Polygon { points, .. }
            | AnnotationKind::Callout { points, .. } => points_bounds(points),
        }
    }

    /// Whether a point hits this annotation
    ///
    /// Line-like kinds test distance to their segments; everything else
    /// tests the bounding box.
    pub fn hit_test(&self, point: &PagePoint, tolerance: f32) -> bool {
        match &self.kind {
            AnnotationKind::Line { start, end, .. }
            | AnnotationKind::Arrow { start, end, .. }
            | AnnotationKind::Ruler { start, end, .. }
            | AnnotationKind::Measure { start, end, .. } => {
                point_near_line_segment(point, start, end, tolerance)
            }
            AnnotationKind::Freehand { points, .. } => {
                points.windows(2).any(|pair| {
                    point_near_line_segment(point, &pair[0], &pair[1], tolerance)
                })
            }
            AnnotationKind::Polygon { points, .. } => {
                if points.len() < 2 {
                    return false;
                }
                (0..points.len()).any(|i| {
                    let next = (i + 1) % points.len();
                    point_near_line_segment(point, &points[i], &points[next], tolerance)
                })
            }
            _ => {
                let (min_x, min_y, max_x, max_y) = self.bounding_box();
                point.x >= min_x - tolerance
                    && point.x <= max_x + tolerance
                    && point.y >= min_y - tolerance
                    && point.y <= max_y + tolerance
            }
        }
    }
}

fn points_bounds(points: &[PagePoint]) -> (f32, f32, f32, f32) {
    let Some(first) = points.first() else {
        return (0.0, 0.0, 0.0, 0.0);
    };
    let mut bounds = (first.x, first.y, first.x, first.y);
    for point in &points[1..] {
        bounds.0 = bounds.0.min(point.x);
        bounds.1 = bounds.1.min(point.y);
        bounds.2 = bounds.2.max(point.x);
        bounds.3 = bounds.3.max(point.y);
    }
    bounds
}

/// Distance check from a point to a line segment
fn point_near_line_segment(
    point: &PagePoint,
    start: &PagePoint,
    end: &PagePoint,
    tolerance: f32,
) -> bool {
    let dx = end.x - start.x;
    let dy = end.y - start.y;
    let length_sq = dx * dx + dy * dy;

    if length_sq < 1e-6 {
        return point.distance_to(start) <= tolerance;
    }

    let t = ((point.x - start.x) * dx + (point.y - start.y) * dy) / length_sq;
    let t = t.clamp(0.0, 1.0);

    let closest = PagePoint::new(start.x + t * dx, start.y + t * dy);
    point.distance_to(&closest) <= tolerance
}

/// All annotations of a document plus grouping and selection state
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct AnnotationCollection {
    annotations: Vec<Annotation>,
    groups: HashMap<GroupId, HashSet<AnnotationId>>,
    next_z: i32,
    #[serde(skip)]
    selected: Option<AnnotationId>,
}

impl AnnotationCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a committed annotation, assigning its stacking position
    pub fn add(&mut self, mut annotation: Annotation) -> AnnotationId {
        annotation.z_order = self.next_z;
        self.next_z += 1;
        let id = annotation.id;
        self.annotations.push(annotation);
        id
    }

    pub fn remove(&mut self, id: AnnotationId) -> bool {
        let before = self.annotations.len();
        self.annotations.retain(|a| a.id != id);
        for members in self.groups.values_mut() {
            members.remove(&id);
        }
        self.groups.retain(|_, members| !members.is_empty());
        if self.selected == Some(id) {
            self.selected = None;
        }
        self.annotations.len() != before
    }

    pub fn get(&self, id: AnnotationId) -> Option<&Annotation> {
        self.annotations.iter().find(|a| a.id == id)
    }

    pub fn get_mut(&mut self, id: AnnotationId) -> Option<&mut Annotation> {
        self.annotations.iter_mut().find(|a| a.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Annotation> {
        self.annotations.iter()
    }

    /// Annotations on a page in draw order (lowest z first)
    pub fn for_page(&self, page: u32) -> Vec<&Annotation> {
        let mut result: Vec<&Annotation> =
            self.annotations.iter().filter(|a| a.page == page).collect();
        result.sort_by_key(|a| a.z_order);
        result
    }

    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }

    pub fn clear(&mut self) {
        self.annotations.clear();
        self.groups.clear();
        self.selected = None;
        self.next_z = 0;
    }

    /// Replace the whole collection (snapshot restore)
    pub fn restore(&mut self, annotations: Vec<Annotation>) {
        self.next_z = annotations
            .iter()
            .map(|a| a.z_order + 1)
            .max()
            .unwrap_or(0);
        self.annotations = annotations;
        self.groups.clear();
        self.selected = None;
    }

    /// Topmost visible, unlocked annotation at a point
    ///
    /// Locked and hidden annotations are skipped: they stay rendered but
    /// cannot be picked or dragged.
    pub fn hit_test(&self, page: u32, point: &PagePoint, tolerance: f32) -> Option<&Annotation> {
        self.annotations
            .iter()
            .filter(|a| a.page == page && !a.locked && !a.hidden)
            .filter(|a| a.hit_test(point, tolerance))
            .max_by_key(|a| a.z_order)
    }

    /// Swap stacking position with the next annotation above on the page
    pub fn bring_forward(&mut self, id: AnnotationId) -> bool {
        self.swap_z(id, true)
    }

    /// Swap stacking position with the next annotation below on the page
    pub fn send_backward(&mut self, id: AnnotationId) -> bool {
        self.swap_z(id, false)
    }

    fn swap_z(&mut self, id: AnnotationId, forward: bool) -> bool {
        let Some(current) = self.get(id).map(|a| (a.page, a.z_order)) else {
            return false;
        };

        let neighbor = self
            .annotations
            .iter()
            .filter(|a| a.page == current.0 && a.id != id)
            .filter(|a| {
                if forward {
                    a.z_order > current.1
                } else {
                    a.z_order < current.1
                }
            })
            .min_by_key(|a| (a.z_order - current.1).abs())
            .map(|a| a.id);

        let Some(neighbor_id) = neighbor else {
            return false;
        };
        let neighbor_z = self.get(neighbor_id).map(|a| a.z_order).unwrap_or(0);

        if let Some(a) = self.get_mut(id) {
            a.z_order = neighbor_z;
        }
        if let Some(b) = self.get_mut(neighbor_id) {
            b.z_order = current.1;
        }
        true
    }

    pub fn select(&mut self, id: AnnotationId) -> bool {
        if self.get(id).is_some() {
            self.selected = Some(id);
            true
        } else {
            false
        }
    }

    pub fn selected(&self) -> Option<AnnotationId> {
        self.selected
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    pub fn set_locked(&mut self, id: AnnotationId, locked: bool) -> bool {
        match self.get_mut(id) {
            Some(annotation) => {
                annotation.locked = locked;
                true
            }
            None => false,
        }
    }

    /// Group annotations; membership is by id only
    pub fn group(&mut self, ids: &[AnnotationId]) -> Option<GroupId> {
        let members: HashSet<AnnotationId> = ids
            .iter()
            .copied()
            .filter(|id| self.get(*id).is_some())
            .collect();
        if members.len() < 2 {
            return None;
        }
        let group_id = uuid::Uuid::new_v4();
        self.groups.insert(group_id, members);
        Some(group_id)
    }

    /// Dissolve a group without touching member geometry
    pub fn ungroup(&mut self, group_id: GroupId) -> bool {
        self.groups.remove(&group_id).is_some()
    }

    pub fn group_members(&self, group_id: GroupId) -> Option<&HashSet<AnnotationId>> {
        self.groups.get(&group_id)
    }

    pub fn groups_of(&self, id: AnnotationId) -> Vec<GroupId> {
        self.groups
            .iter()
            .filter(|(_, members)| members.contains(&id))
            .map(|(group_id, _)| *group_id)
            .collect()
    }
}

/// Box-drag tools that share the drag/minimum-size drafting flow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoxTool {
    Highlight,
    Rectangle,
    Circle,
    Link,
    Signature,
    Redaction,
    FormField,
}

impl BoxTool {
    /// Minimum committed size; smaller drags are accidental clicks
    fn min_size(self) -> (f32, f32) {
        match self {
            BoxTool::Link | BoxTool::Signature => (10.0, 10.0),
            BoxTool::FormField => (50.0, 20.0),
            _ => (5.0, 5.0),
        }
    }
}

/// Multi-click tools that accumulate discrete points
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolyTool {
    Polygon,
    Callout,
}

/// Style inputs for committing a draft
#[derive(Debug, Clone)]
pub struct DraftStyle {
    pub stroke: Color,
    pub fill: Option<Color>,
    pub stroke_width: f32,
    pub highlight: Color,
}

impl Default for DraftStyle {
    fn default() -> Self {
        Self {
            stroke: Color::BLACK,
            fill: None,
            stroke_width: 2.0,
            highlight: Color::YELLOW,
        }
    }
}

/// In-progress annotation being drawn
///
/// Box tools track a drag; freehand accumulates a point per pointer move;
/// polygon and callout accumulate a point per click and commit on a
/// closing click.
#[derive(Debug, Clone, PartialEq)]
pub enum Draft {
    Box {
        tool: BoxTool,
        start: PagePoint,
        current: PagePoint,
    },
    Freehand {
        points: Vec<PagePoint>,
    },
    Points {
        tool: PolyTool,
        points: Vec<PagePoint>,
    },
}

impl Draft {
    pub fn begin_box(tool: BoxTool, start: PagePoint) -> Self {
        Draft::Box {
            tool,
            start,
            current: start,
        }
    }

    pub fn begin_freehand(start: PagePoint) -> Self {
        Draft::Freehand {
            points: vec![start],
        }
    }

    pub fn begin_points(tool: PolyTool, first: PagePoint) -> Self {
        Draft::Points {
            tool,
            points: vec![first],
        }
    }

    /// Pointer moved while drafting
    pub fn update(&mut self, point: PagePoint) {
        match self {
            Draft::Box { current, .. } => *current = point,
            Draft::Freehand { points } => points.push(point),
            Draft::Points { .. } => {}
        }
    }

    /// Discrete click for point-sequence tools
    pub fn add_point(&mut self, point: PagePoint) {
        if let Draft::Points { points, .. } = self {
            points.push(point);
        }
    }

    /// Finish the draft
    ///
    /// Returns `None` when the draft is below its minimum size (an
    /// accidental click) or has too few points.
    pub fn commit(self, style: &DraftStyle) -> Option<AnnotationKind> {
        match self {
            Draft::Box {
                tool,
                start,
                current,
            } => {
                let rect = Rect::from_corners(start, current);
                let (min_w, min_h) = tool.min_size();
                if rect.width <= min_w || rect.height <= min_h {
                    return None;
                }
                Some(match tool {
                    BoxTool::Highlight => AnnotationKind::Highlight {
                        rect,
                        color: style.highlight,
                    },
                    BoxTool::Rectangle => AnnotationKind::Rectangle {
                        rect,
                        stroke: style.stroke,
                        fill: style.fill,
                        stroke_width: style.stroke_width,
                    },
                    BoxTool::Circle => AnnotationKind::Circle {
                        rect,
                        stroke: style.stroke,
                        fill: style.fill,
                        stroke_width: style.stroke_width,
                    },
                    BoxTool::Link => AnnotationKind::Link {
                        rect,
                        url: String::new(),
                    },
                    BoxTool::Signature => AnnotationKind::Signature {
                        rect,
                        strokes: Vec::new(),
                    },
                    BoxTool::Redaction => AnnotationKind::Redaction { rect },
                    BoxTool::FormField => AnnotationKind::FormField {
                        rect,
                        field: FormFieldKind::Text,
                        name: String::new(),
                        required: false,
                        options: Vec::new(),
                    },
                })
            }
            Draft::Freehand { points } => {
                if points.len() < 2 {
                    return None;
                }
                Some(AnnotationKind::Freehand {
                    points,
                    stroke: style.stroke,
                    stroke_width: style.stroke_width,
                })
            }
            Draft::Points { tool, points } => {
                if points.len() < 3 {
                    return None;
                }
                Some(match tool {
                    PolyTool::Polygon => AnnotationKind::Polygon {
                        points,
                        stroke: style.stroke,
                        fill: style.fill,
                    },
                    PolyTool::Callout => AnnotationKind::Callout {
                        points,
                        text: String::new(),
                        stroke: style.stroke,
                    },
                })
            }
        }
    }
}
