//! In-place text editing
//!
//! PDFs have no "replace this span" operation, so edits are simulated:
//! an opaque rectangle is painted over the old glyphs and the replacement
//! is drawn at the run's baseline with a matched standard font. Deleting a
//! run is the same procedure with an empty replacement. Callers must drop
//! any cached text index for the touched page afterwards — the index does
//! not correct itself.

use crate::font_metrics::{
    aligned_origin_x, measure_text, standard_font_name, FontFamily, TextAlign,
};
use crate::text_index::TextRun;
use pdf_studio_engine::content::{escape_string, format_number};
use pdf_studio_engine::{DocumentHandle, DocumentStore, EngineError};
use serde::{Deserialize, Serialize};

/// Padding around the erase rectangle, in points
///
/// The rectangle extends slightly past the run's box so no glyph fringe
/// survives anti-aliased rendering.
const ERASE_PADDING: f32 = 3.0;

/// Formatting for a replacement run
///
/// Unset fields inherit from the run being replaced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextFormat {
    pub font_family: Option<String>,
    pub font_size: Option<f32>,
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub italic: bool,
    /// RGB fill color, each channel 0.0 to 1.0
    pub color: Option<[f32; 3]>,
    #[serde(default)]
    pub align: TextAlign,
}

#[derive(Debug, thiserror::Error)]
pub enum EditError {
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Replace one run's text in place
///
/// Paints the erase rectangle over the run, registers the resolved
/// standard font on the page, and draws `new_text` at the run's baseline
/// honoring the requested alignment. An empty `new_text` erases only.
pub fn replace_run_text(
    store: &mut DocumentStore,
    handle: DocumentHandle,
    run: &TextRun,
    new_text: &str,
    format: &TextFormat,
) -> Result<(), EditError> {
    let page_id = store.page_id_at(handle, run.page)?;

    let family_name = format
        .font_family
        .clone()
        .unwrap_or_else(|| run.font_name.clone());
    let family = FontFamily::from_name(&family_name);
    let lower = family_name.to_lowercase();
    let bold = format.bold || lower.contains("bold");
    let italic = format.italic || lower.contains("italic") || lower.contains("oblique");
    let font_size = format.font_size.unwrap_or(run.font_size);

    let text_width = measure_text(new_text, font_size, family);

    let mut ops = String::new();
    push_erase_rect(&mut ops, run, text_width);

    if !new_text.is_empty() {
        let base_font = standard_font_name(family, bold, italic);
        let resource = store.ensure_font_resource(handle, page_id, base_font)?;
        let color = format.color.unwrap_or([0.0, 0.0, 0.0]);
        let origin_x = aligned_origin_x(run.x, text_width, format.align);

        ops.push_str(&format!(
            "BT /{} {} Tf {} {} {} rg {} {} Td ({}) Tj ET\n",
            resource,
            num(font_size),
            num(color[0]),
            num(color[1]),
            num(color[2]),
            num(origin_x),
            num(run.y),
            escape_string(new_text),
        ));
    }

    store.append_page_content(handle, page_id, ops.as_bytes())?;
    log::debug!(
        "replaced run {} on page {} ({} -> {} chars)",
        run.id,
        run.page,
        run.text.len(),
        new_text.len()
    );
    Ok(())
}

/// Erase a run without drawing a replacement
pub fn delete_run(
    store: &mut DocumentStore,
    handle: DocumentHandle,
    run: &TextRun,
) -> Result<(), EditError> {
    replace_run_text(store, handle, run, "", &TextFormat::default())
}

/// Apply a batch of replacements to runs of one page
pub fn replace_many(
    store: &mut DocumentStore,
    handle: DocumentHandle,
    edits: &[(TextRun, String)],
    format: &TextFormat,
) -> Result<(), EditError> {
    for (run, new_text) in edits {
        replace_run_text(store, handle, run, new_text, format)?;
    }
    Ok(())
}

/// White rectangle covering the run plus padding
///
/// The box is widened to the replacement width when the new text is longer
/// than the old run.
fn push_erase_rect(ops: &mut String, run: &TextRun, text_width: f32) {
    let width = run.width.max(text_width) + ERASE_PADDING * 2.0;
    let height = run.height + ERASE_PADDING * 2.0;
    ops.push_str(&format!(
        "q 1 1 1 rg {} {} {} {} re f Q\n",
        num(run.x - ERASE_PADDING),
        num(run.y - ERASE_PADDING),
        num(width),
        num(height),
    ));
}

fn num(value: f32) -> String {
    format_number(value as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text_index::RunId;
    use pdf_studio_engine::content;

    fn sample_run() -> TextRun {
        TextRun {
            id: RunId { page: 1, ordinal: 0 },
            page: 1,
            text: "Hello".to_string(),
            x: 72.0,
            y: 700.0,
            width: 50.0,
            height: 12.0,
            font_name: "Helvetica".to_string(),
            font_size: 12.0,
        }
    }

    fn store_with_page() -> (DocumentStore, DocumentHandle) {
        let mut store = DocumentStore::new();
        let handle = store.create(&[(612.0, 792.0)]).expect("create should succeed");
        (store, handle)
    }

    fn page_text(store: &DocumentStore, handle: DocumentHandle) -> String {
        let page = store.page_id_at(handle, 1).unwrap();
        String::from_utf8_lossy(&store.page_content(handle, page).unwrap()).into_owned()
    }

    #[test]
    fn test_replace_draws_rect_and_text() {
        let (mut store, handle) = store_with_page();
        let run = sample_run();

        replace_run_text(&mut store, handle, &run, "Goodbye", &TextFormat::default()).unwrap();

        let text = page_text(&store, handle);
        assert!(text.contains("1 1 1 rg"));
        assert!(text.contains("re f"));
        assert!(text.contains("(Goodbye) Tj"));
        // Drawn at the run baseline.
        assert!(text.contains("72 700 Td"));
    }

    #[test]
    fn test_erase_rect_covers_run_with_padding() {
        let (mut store, handle) = store_with_page();
        let run = sample_run();

        delete_run(&mut store, handle, &run).unwrap();

        let text = page_text(&store, handle);
        assert!(text.contains("69 697 56 18 re f"));
        // Deletion draws no replacement text.
        assert!(!text.contains("BT"));
    }

    #[test]
    fn test_font_resolution_uses_format_over_run() {
        let (mut store, handle) = store_with_page();
        let run = sample_run();
        let format = TextFormat {
            font_family: Some("Times".to_string()),
            bold: true,
            ..Default::default()
        };

        replace_run_text(&mut store, handle, &run, "x", &format).unwrap();

        // The resolved standard variant is registered on the page; drawing
        // it again reuses the same resource.
        let page = store.page_id_at(handle, 1).unwrap();
        let reused = store
            .ensure_font_resource(handle, page, "Times-Bold")
            .unwrap();
        let text = page_text(&store, handle);
        assert!(text.contains(&format!("/{reused} 12 Tf")));
    }

    #[test]
    fn test_bold_italic_detected_from_run_font_name() {
        let (mut store, handle) = store_with_page();
        let mut run = sample_run();
        run.font_name = "Helvetica-BoldOblique".to_string();

        replace_run_text(&mut store, handle, &run, "x", &TextFormat::default()).unwrap();

        let page = store.page_id_at(handle, 1).unwrap();
        let existing = store
            .ensure_font_resource(handle, page, "Helvetica-BoldOblique")
            .unwrap();
        assert_eq!(existing, "FS0");
    }

    #[test]
    fn test_alignment_shifts_draw_origin() {
        let (mut store, handle) = store_with_page();
        let run = sample_run();
        let format = TextFormat {
            align: TextAlign::Right,
            ..Default::default()
        };

        // "ab" at size 12 in Helvetica measures 13.2; right-aligned the
        // origin lands left of the anchor.
        replace_run_text(&mut store, handle, &run, "ab", &format).unwrap();

        let text = page_text(&store, handle);
        assert!(text.contains("58.8 700 Td"));
    }

    #[test]
    fn test_replacement_color_is_emitted() {
        let (mut store, handle) = store_with_page();
        let run = sample_run();
        let format = TextFormat {
            color: Some([1.0, 0.0, 0.5]),
            ..Default::default()
        };

        replace_run_text(&mut store, handle, &run, "x", &format).unwrap();
        assert!(page_text(&store, handle).contains("1 0 0.5 rg"));
    }

    #[test]
    fn test_special_characters_escaped() {
        let (mut store, handle) = store_with_page();
        let run = sample_run();

        replace_run_text(&mut store, handle, &run, "a(b)c", &TextFormat::default()).unwrap();
        assert!(page_text(&store, handle).contains("(a\\(b\\)c) Tj"));
    }

    #[test]
    fn test_batch_applies_all_edits() {
        let (mut store, handle) = store_with_page();
        let mut second = sample_run();
        second.id = RunId { page: 1, ordinal: 1 };
        second.y = 650.0;

        let edits = vec![
            (sample_run(), "first".to_string()),
            (second, "second".to_string()),
        ];
        replace_many(&mut store, handle, &edits, &TextFormat::default()).unwrap();

        let text = page_text(&store, handle);
        assert!(text.contains("(first) Tj"));
        assert!(text.contains("(second) Tj"));
    }

    #[test]
    fn test_edit_bumps_revision() {
        let (mut store, handle) = store_with_page();
        let before = store.revision(handle).unwrap();

        replace_run_text(&mut store, handle, &sample_run(), "x", &TextFormat::default()).unwrap();

        assert!(store.revision(handle).unwrap() > before);
    }

    #[test]
    fn test_rebuilt_stream_reflects_edit() {
        // The appended operators are themselves parseable by the analyzer.
        let (mut store, handle) = store_with_page();
        replace_run_text(&mut store, handle, &sample_run(), "New", &TextFormat::default())
            .unwrap();

        let page = store.page_id_at(handle, 1).unwrap();
        let ops = content::parse_stream(&store.page_content(handle, page).unwrap());
        let text_ops = content::extract_text_operators(&ops);

        assert_eq!(text_ops.len(), 1);
        assert_eq!(text_ops[0].text, "New");
    }
}
