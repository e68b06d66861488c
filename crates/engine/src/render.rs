//! Page renderer seam
//!
//! Rasterization is an external collaborator: the editor core only needs a
//! bitmap for a page at a scale. `BlankRenderer` stands in for a real
//! backend so the pipeline and tests run without one.

use crate::store::{media_box_size, page_object_ids};
use image::{ImageBuffer, Rgba};
use lopdf::Document;

pub type RgbaImage = ImageBuffer<Rgba<u8>, Vec<u8>>;

/// Parameters for one page rasterization
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderRequest {
    /// 1-based page number
    pub page_number: u32,
    pub scale: f32,
}

impl Default for RenderRequest {
    fn default() -> Self {
        Self {
            page_number: 1,
            scale: 1.0,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("PDF parse error: {0}")]
    Parse(#[from] lopdf::Error),
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },
    #[error("backend error: {0}")]
    Backend(String),
}

/// External rasterizer interface
pub trait PageRenderer {
    fn render_page(&self, document: &[u8], request: RenderRequest)
        -> Result<RgbaImage, RenderError>;
}

/// Placeholder backend: a white page with a grey border
#[derive(Debug, Default)]
pub struct BlankRenderer;

impl BlankRenderer {
    pub fn new() -> Self {
        Self
    }
}

impl PageRenderer for BlankRenderer {
    fn render_page(
        &self,
        document: &[u8],
        request: RenderRequest,
    ) -> Result<RgbaImage, RenderError> {
        let doc = Document::load_mem(document)?;
        let pages = page_object_ids(&doc);
        let page_count = pages.len() as u32;
        if request.page_number == 0 || request.page_number > page_count {
            return Err(RenderError::PageOutOfRange {
                page: request.page_number,
                page_count,
            });
        }

        let oid = pages[(request.page_number - 1) as usize];
        let dict = doc
            .get_dictionary(oid)
            .map_err(|err| RenderError::Backend(err.to_string()))?;
        let (width_pt, height_pt) = media_box_size(&doc, dict);

        let scale = if request.scale <= 0.0 { 1.0 } else { request.scale };
        let width = (width_pt * scale).round().max(1.0) as u32;
        let height = (height_pt * scale).round().max(1.0) as u32;

        let mut image = RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]));

        if width >= 4 && height >= 4 {
            for x in 0..width {
                image.put_pixel(x, 0, Rgba([220, 220, 220, 255]));
                image.put_pixel(x, height - 1, Rgba([220, 220, 220, 255]));
            }
            for y in 0..height {
                image.put_pixel(0, y, Rgba([220, 220, 220, 255]));
                image.put_pixel(width - 1, y, Rgba([220, 220, 220, 255]));
            }
        }

        Ok(image)
    }
}
