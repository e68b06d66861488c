//! Coordinate transforms between surface and document space
//!
//! Document space is PDF-native: origin at the bottom-left of the page,
//! y up, units in points. Surface space is the drawing surface: origin at
//! the top-left, y down, device pixels. The vertical flip between the two
//! happens here and nowhere else.

use serde::{Deserialize, Serialize};

/// Current mapping between a document page and its on-screen size
///
/// `width`/`height` are the surface size in CSS pixels, i.e. the page size
/// in points multiplied by `scale`. Recomputed on zoom or resize.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
    pub scale: f32,
}

impl Viewport {
    pub fn new(width: f32, height: f32, scale: f32) -> Self {
        Self {
            width,
            height,
            scale,
        }
    }

    /// Viewport for a page of the given size in points
    pub fn for_page(page_width: f32, page_height: f32, scale: f32) -> Self {
        Self {
            width: page_width * scale,
            height: page_height * scale,
            scale,
        }
    }

    /// Page size in points implied by this viewport
    pub fn page_size(&self) -> (f32, f32) {
        (self.width / self.scale, self.height / self.scale)
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 612.0,
            height: 792.0,
            scale: 1.0,
        }
    }
}

/// A point on the drawing surface, in device pixels, origin top-left
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfacePoint {
    pub x: f32,
    pub y: f32,
}

impl SurfacePoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// A point in document page space, in points, origin bottom-left
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PagePoint {
    pub x: f32,
    pub y: f32,
}

impl PagePoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &PagePoint) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Map a pointer position to document coordinates
///
/// `device_pixel_ratio` converts device pixels to CSS pixels before the
/// viewport scale is unapplied; the y axis flips from top-down to
/// bottom-up.
pub fn surface_to_document(
    point: SurfacePoint,
    viewport: &Viewport,
    device_pixel_ratio: f32,
) -> PagePoint {
    let css_x = point.x / device_pixel_ratio;
    let css_y = point.y / device_pixel_ratio;
    PagePoint {
        x: css_x / viewport.scale,
        y: (viewport.height - css_y) / viewport.scale,
    }
}

/// Map a document coordinate to the drawing surface
pub fn document_to_surface(
    point: PagePoint,
    viewport: &Viewport,
    device_pixel_ratio: f32,
) -> SurfacePoint {
    let css_x = point.x * viewport.scale;
    let css_y = viewport.height - point.y * viewport.scale;
    SurfacePoint {
        x: css_x * device_pixel_ratio,
        y: css_y * device_pixel_ratio,
    }
}
