//! Baking annotations onto page content
//!
//! Export renders annotations into the page's content stream so they
//! survive outside the editor. Geometry is already in document space, so
//! operators are emitted directly; text-bearing kinds need a font
//! resource name registered on the page beforehand.

use crate::annotation::{Annotation, AnnotationKind, Color};
use crate::coords::PagePoint;
use pdf_studio_engine::content::{escape_string, format_number};

/// Bezier circle constant
const KAPPA: f32 = 0.5523;

fn num(value: f32) -> String {
    format_number(value as f64)
}

fn rgb(color: Color) -> String {
    let (r, g, b) = color.to_normalized();
    format!("{} {} {}", num(r), num(g), num(b))
}

/// Content operators drawing one annotation
///
/// `font_resource` is the page's registered text font (Helvetica); kinds
/// that draw no text ignore it. Hidden annotations produce nothing.
pub fn annotation_operators(annotation: &Annotation, font_resource: &str) -> Option<String> {
    if annotation.hidden {
        return None;
    }

    let mut ops = String::from("q\n");
    match &annotation.kind {
        AnnotationKind::Text {
            position,
            text,
            font_size,
            color,
            ..
        } => {
            push_text(&mut ops, font_resource, text, *font_size, *color, position);
        }
        AnnotationKind::Highlight { rect, color } => {
            ops.push_str(&format!(
                "{} rg {} {} {} {} re f\n",
                rgb(*color),
                num(rect.x),
                num(rect.y),
                num(rect.width),
                num(rect.height),
            ));
        }
        AnnotationKind::Rectangle {
            rect,
            stroke,
            fill,
            stroke_width,
        } => {
            ops.push_str(&format!("{} w {} RG ", num(*stroke_width), rgb(*stroke)));
            if let Some(fill) = fill {
                ops.push_str(&format!("{} rg ", rgb(*fill)));
            }
            ops.push_str(&format!(
                "{} {} {} {} re {}\n",
                num(rect.x),
                num(rect.y),
                num(rect.width),
                num(rect.height),
                if fill.is_some() { "B" } else { "S" },
            ));
        }
        AnnotationKind::Circle {
            rect,
            stroke,
            fill,
            stroke_width,
        } => {
            ops.push_str(&format!("{} w {} RG ", num(*stroke_width), rgb(*stroke)));
            if let Some(fill) = fill {
                ops.push_str(&format!("{} rg ", rgb(*fill)));
            }
            push_ellipse(&mut ops, rect.x, rect.y, rect.width, rect.height);
            ops.push_str(if fill.is_some() { "B\n" } else { "S\n" });
        }
        AnnotationKind::Line {
            start,
            end,
            stroke,
            stroke_width,
        } => {
            push_stroked_path(&mut ops, &[*start, *end], *stroke, *stroke_width, false);
        }
        AnnotationKind::Arrow {
            start,
            end,
            stroke,
            stroke_width,
        } => {
            push_stroked_path(&mut ops, &[*start, *end], *stroke, *stroke_width, false);
            push_arrow_head(&mut ops, start, end);
        }
        AnnotationKind::Freehand {
            points,
            stroke,
            stroke_width,
        } => {
            if points.len() < 2 {
                return None;
            }
            push_stroked_path(&mut ops, points, *stroke, *stroke_width, false);
        }
        AnnotationKind::Polygon { points, stroke, .. } => {
            if points.len() < 3 {
                return None;
            }
            push_stroked_path(&mut ops, points, *stroke, 1.0, true);
        }
        AnnotationKind::Callout { points, text, stroke } => {
            if points.len() < 2 {
                return None;
            }
            push_stroked_path(&mut ops, points, *stroke, 1.0, false);
            if !text.is_empty() {
                if let Some(anchor) = points.last() {
                    push_text(&mut ops, font_resource, text, 12.0, *stroke, anchor);
                }
            }
        }
        AnnotationKind::Note {
            rect,
            comment,
            fill,
            stroke,
        } => {
            ops.push_str(&format!(
                "{} rg {} RG {} {} {} {} re B\n",
                rgb(*fill),
                rgb(*stroke),
                num(rect.x),
                num(rect.y),
                num(rect.width),
                num(rect.height),
            ));
            if !comment.is_empty() {
                let anchor = PagePoint::new(rect.x + 4.0, rect.y + rect.height - 14.0);
                push_text(&mut ops, font_resource, comment, 10.0, Color::BLACK, &anchor);
            }
        }
        AnnotationKind::Stamp {
            rect,
            text,
            color,
            font_size,
        } => {
            ops.push_str(&format!(
                "2 w {} RG {} {} {} {} re S\n",
                rgb(*color),
                num(rect.x),
                num(rect.y),
                num(rect.width),
                num(rect.height),
            ));
            let anchor = PagePoint::new(rect.x + 4.0, rect.y + rect.height / 2.0);
            push_text(&mut ops, font_resource, text, *font_size, *color, &anchor);
        }
        AnnotationKind::Watermark {
            position,
            text,
            font_size,
            opacity: _,
        } => {
            let grey = Color::rgb(204, 204, 204);
            push_text(&mut ops, font_resource, text, *font_size, grey, position);
        }
        AnnotationKind::Redaction { rect } => {
            ops.push_str(&format!(
                "0 0 0 rg {} {} {} {} re f\n",
                num(rect.x),
                num(rect.y),
                num(rect.width),
                num(rect.height),
            ));
        }
        AnnotationKind::Signature { rect, strokes } => {
            ops.push_str(&format!(
                "1 w 0 0 0 RG {} {} {} {} re S\n",
                num(rect.x),
                num(rect.y),
                num(rect.width),
                num(rect.height),
            ));
            for stroke in strokes {
                if stroke.len() >= 2 {
                    push_stroked_path(&mut ops, stroke, Color::BLACK, 1.0, false);
                }
            }
        }
        AnnotationKind::Ruler {
            start,
            end,
            distance,
            ..
        }
        | AnnotationKind::Measure {
            start,
            end,
            distance,
            ..
        } => {
            push_stroked_path(&mut ops, &[*start, *end], Color::BLACK, 1.0, false);
            let label = format!("{:.1}", distance);
            let anchor = PagePoint::new((start.x + end.x) / 2.0, (start.y + end.y) / 2.0 + 4.0);
            push_text(&mut ops, font_resource, &label, 9.0, Color::BLACK, &anchor);
        }
        AnnotationKind::Link { rect, .. } | AnnotationKind::FormField { rect, .. } => {
            ops.push_str(&format!(
                "1 w 0.23 0.51 0.96 RG {} {} {} {} re S\n",
                num(rect.x),
                num(rect.y),
                num(rect.width),
                num(rect.height),
            ));
        }
        // Raster payloads need an image XObject pipeline; the editor keeps
        // them on-surface only.
        AnnotationKind::Image { .. } => return None,
    }
    ops.push_str("Q\n");
    Some(ops)
}

fn push_text(
    ops: &mut String,
    font_resource: &str,
    text: &str,
    font_size: f32,
    color: Color,
    anchor: &PagePoint,
) {
    ops.push_str(&format!(
        "BT /{} {} Tf {} rg {} {} Td ({}) Tj ET\n",
        font_resource,
        num(font_size),
        rgb(color),
        num(anchor.x),
        num(anchor.y),
        escape_string(text),
    ));
}

fn push_stroked_path(
    ops: &mut String,
    points: &[PagePoint],
    stroke: Color,
    stroke_width: f32,
    close: bool,
) {
    ops.push_str(&format!("{} w {} RG ", num(stroke_width), rgb(stroke)));
    for (i, point) in points.iter().enumerate() {
        let op = if i == 0 { "m" } else { "l" };
        ops.push_str(&format!("{} {} {} ", num(point.x), num(point.y), op));
    }
    if close {
        ops.push_str("h ");
    }
    ops.push_str("S\n");
}

fn push_arrow_head(ops: &mut String, start: &PagePoint, end: &PagePoint) {
    let dx = end.x - start.x;
    let dy = end.y - start.y;
    let length = (dx * dx + dy * dy).sqrt();
    if length < 1e-3 {
        return;
    }

    let head = 8.0_f32.min(length / 2.0);
    let (ux, uy) = (dx / length, dy / length);
    // Two barbs at 30 degrees off the shaft.
    let (cos, sin) = (0.866_f32, 0.5_f32);
    let left = PagePoint::new(
        end.x - head * (ux * cos - uy * sin),
        end.y - head * (uy * cos + ux * sin),
    );
    let right = PagePoint::new(
        end.x - head * (ux * cos + uy * sin),
        end.y - head * (uy * cos - ux * sin),
    );

    ops.push_str(&format!(
        "{} {} m {} {} l {} {} l S\n",
        num(left.x),
        num(left.y),
        num(end.x),
        num(end.y),
        num(right.x),
        num(right.y),
    ));
}

/// Ellipse inscribed in a rectangle, as four Bezier arcs
fn push_ellipse(ops: &mut String, x: f32, y: f32, width: f32, height: f32) {
    let (cx, cy) = (x + width / 2.0, y + height / 2.0);
    let (rx, ry) = (width / 2.0, height / 2.0);
    let (ox, oy) = (rx * KAPPA, ry * KAPPA);

    ops.push_str(&format!("{} {} m ", num(cx - rx), num(cy)));
    ops.push_str(&format!(
        "{} {} {} {} {} {} c ",
        num(cx - rx),
        num(cy + oy),
        num(cx - ox),
        num(cy + ry),
        num(cx),
        num(cy + ry),
    ));
    ops.push_str(&format!(
        "{} {} {} {} {} {} c ",
        num(cx + ox),
        num(cy + ry),
        num(cx + rx),
        num(cy + oy),
        num(cx + rx),
        num(cy),
    ));
    ops.push_str(&format!(
        "{} {} {} {} {} {} c ",
        num(cx + rx),
        num(cy - oy),
        num(cx + ox),
        num(cy - ry),
        num(cx),
        num(cy - ry),
    ));
    ops.push_str(&format!(
        "{} {} {} {} {} {} c ",
        num(cx - ox),
        num(cy - ry),
        num(cx - rx),
        num(cy - oy),
        num(cx - rx),
        num(cy),
    ));
}
