//! Text layout index
//!
//! Groups per-glyph position records into logical line runs and answers
//! hit-test queries at both run and single-glyph granularity. Runs are
//! derived state: they are rebuilt from the page content, never persisted
//! as document truth, and must be dropped whenever the page's content
//! stream changes.
//!
//! All coordinates are document space (origin bottom-left, y up, points);
//! a run's `y` is its baseline.

use pdf_studio_cache::ByteSized;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One positioned glyph record from the content stream
#[derive(Debug, Clone, PartialEq)]
pub struct GlyphItem {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub font_name: String,
    pub font_size: f32,
}

/// Deterministic identifier for a derived text run
///
/// Stable for a given page content: the ordinal is the run's position in
/// stream order. Ids become stale as soon as the page is rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId {
    pub page: u32,
    pub ordinal: u32,
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run-{}-{}", self.page, self.ordinal)
    }
}

impl FromStr for RunId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix("run-")
            .ok_or_else(|| format!("invalid run id: {s}"))?;
        let (page, ordinal) = rest
            .split_once('-')
            .ok_or_else(|| format!("invalid run id: {s}"))?;
        Ok(RunId {
            page: page.parse().map_err(|_| format!("invalid run id: {s}"))?,
            ordinal: ordinal.parse().map_err(|_| format!("invalid run id: {s}"))?,
        })
    }
}

/// A contiguous logical line reconstructed from glyph records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRun {
    pub id: RunId,
    pub page: u32,
    pub text: String,
    /// Left edge of the first glyph
    pub x: f32,
    /// Baseline of the first glyph
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub font_name: String,
    pub font_size: f32,
}

impl TextRun {
    /// Bounding box as (min_x, min_y, max_x, max_y)
    pub fn bounds(&self) -> (f32, f32, f32, f32) {
        (self.x, self.y, self.x + self.width, self.y + self.height)
    }

    pub fn contains(&self, x: f32, y: f32) -> bool {
        box_contains(self.bounds(), x, y, 0.0)
    }

    fn centroid(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

impl ByteSized for TextRun {
    fn byte_size(&self) -> usize {
        std::mem::size_of::<TextRun>() + self.text.len() + self.font_name.len()
    }
}

/// A single glyph box, remembering which run it belongs to
#[derive(Debug, Clone, PartialEq)]
struct IndexedGlyph {
    x: f32,
    y: f32,
    width: f32,
    height: f32,
    /// Estimated width of one character in this item
    char_width: f32,
    run: usize,
}

impl IndexedGlyph {
    fn bounds(&self) -> (f32, f32, f32, f32) {
        (self.x, self.y, self.x + self.width, self.y + self.height)
    }

    fn centroid(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// Per-page index of text runs with two hit-test granularities
#[derive(Debug, Clone, Default)]
pub struct TextIndex {
    page: u32,
    runs: Vec<TextRun>,
    glyphs: Vec<IndexedGlyph>,
}

impl ByteSized for TextIndex {
    fn byte_size(&self) -> usize {
        self.runs.byte_size() + self.glyphs.len() * std::mem::size_of::<IndexedGlyph>()
    }
}

impl TextIndex {
    /// Vertical distance (document units) within which glyphs stay on the
    /// same line.
    pub const LINE_THRESHOLD: f32 = 5.0;

    /// Build the index for a page with the default line threshold
    pub fn build(items: &[GlyphItem], page: u32) -> Self {
        Self::build_with_threshold(items, page, Self::LINE_THRESHOLD)
    }

    /// Build the index, grouping glyphs whose baselines are within
    /// `line_threshold` of the current run's anchor
    ///
    /// Whitespace-only glyphs are skipped but do not terminate a run.
    pub fn build_with_threshold(items: &[GlyphItem], page: u32, line_threshold: f32) -> Self {
        let mut index = TextIndex {
            page,
            runs: Vec::new(),
            glyphs: Vec::new(),
        };

        let mut current: Vec<&GlyphItem> = Vec::new();
        let mut current_y: Option<f32> = None;

        for item in items {
            if item.text.trim().is_empty() {
                continue;
            }

            let new_line = match current_y {
                None => true,
                Some(anchor) => (item.y - anchor).abs() > line_threshold,
            };

            if new_line {
                index.flush_run(&current);
                current.clear();
                current_y = Some(item.y);
            }
            current.push(item);
        }
        index.flush_run(&current);

        index
    }

    fn flush_run(&mut self, items: &[&GlyphItem]) {
        let (Some(first), Some(last)) = (items.first(), items.last()) else {
            return;
        };

        let run_index = self.runs.len();
        for item in items {
            let chars = item.text.chars().count().max(1);
            self.glyphs.push(IndexedGlyph {
                x: item.x,
                y: item.y,
                width: item.width,
                height: item.height,
                char_width: item.width / chars as f32,
                run: run_index,
            });
        }

        let text: String = items.iter().map(|item| item.text.as_str()).collect();
        self.runs.push(TextRun {
            id: RunId {
                page: self.page,
                ordinal: run_index as u32,
            },
            page: self.page,
            text,
            x: first.x,
            y: first.y,
            width: last.x + last.width - first.x,
            height: first.height,
            font_name: first.font_name.clone(),
            font_size: first.font_size,
        });
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn runs(&self) -> &[TextRun] {
        &self.runs
    }

    pub fn run(&self, id: RunId) -> Option<&TextRun> {
        self.runs.iter().find(|run| run.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Three-tier hit test
    ///
    /// Tier 1: exact bounding-box containment. Tier 2: boxes expanded by
    /// `tolerance`. Tier 3: character-scale proximity — a Euclidean reach
    /// of twice the median per-character width, so large text stays
    /// clickable even under a tight tolerance. Within a tier the closest
    /// candidate by centroid distance wins, and single-glyph boxes
    /// (resolved to their parent run) beat whole-run boxes.
    pub fn find_run_at(&self, x: f32, y: f32, tolerance: f32) -> Option<&TextRun> {
        if let Some(run) = self.closest_match(x, y, 0.0) {
            return Some(run);
        }
        if let Some(run) = self.closest_match(x, y, tolerance) {
            return Some(run);
        }

        let reach = self.median_char_width() * 2.0;
        if reach > 0.0 {
            return self.closest_by_proximity(x, y, reach);
        }
        None
    }

    /// Best candidate whose (expanded) box contains the point
    fn closest_match(&self, x: f32, y: f32, expand: f32) -> Option<&TextRun> {
        let glyph_hit = self
            .glyphs
            .iter()
            .filter(|glyph| box_contains(glyph.bounds(), x, y, expand))
            .map(|glyph| (centroid_distance(glyph.centroid(), x, y), glyph.run))
            .min_by(|a, b| a.0.total_cmp(&b.0));

        if let Some((_, run)) = glyph_hit {
            return self.runs.get(run);
        }

        self.runs
            .iter()
            .filter(|run| box_contains(run.bounds(), x, y, expand))
            .map(|run| (centroid_distance(run.centroid(), x, y), run))
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, run)| run)
    }

    /// Best candidate within `reach` of its box edge
    fn closest_by_proximity(&self, x: f32, y: f32, reach: f32) -> Option<&TextRun> {
        let glyph_hit = self
            .glyphs
            .iter()
            .filter(|glyph| box_distance(glyph.bounds(), x, y) <= reach)
            .map(|glyph| (centroid_distance(glyph.centroid(), x, y), glyph.run))
            .min_by(|a, b| a.0.total_cmp(&b.0));

        if let Some((_, run)) = glyph_hit {
            return self.runs.get(run);
        }

        self.runs
            .iter()
            .filter(|run| box_distance(run.bounds(), x, y) <= reach)
            .map(|run| (centroid_distance(run.centroid(), x, y), run))
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, run)| run)
    }

    /// Update a run in place after an overlay edit
    ///
    /// Overlay edits leave the old glyphs in the content stream (painted
    /// over), so re-extraction would resurrect stale text; the cached
    /// index is patched instead.
    pub fn patch_run(&mut self, id: RunId, text: String, width: f32) -> bool {
        match self.runs.iter_mut().find(|run| run.id == id) {
            Some(run) => {
                run.text = text;
                run.width = width;
                true
            }
            None => false,
        }
    }

    /// Remove a run (and its glyph boxes) after a deletion edit
    pub fn remove_run(&mut self, id: RunId) -> bool {
        let Some(position) = self.runs.iter().position(|run| run.id == id) else {
            return false;
        };
        self.runs.remove(position);
        self.glyphs.retain(|glyph| glyph.run != position);
        for glyph in &mut self.glyphs {
            if glyph.run > position {
                glyph.run -= 1;
            }
        }
        true
    }

    fn median_char_width(&self) -> f32 {
        if self.glyphs.is_empty() {
            return 0.0;
        }
        let mut widths: Vec<f32> = self.glyphs.iter().map(|glyph| glyph.char_width).collect();
        widths.sort_by(|a, b| a.total_cmp(b));
        widths[widths.len() / 2]
    }
}

fn box_contains(bounds: (f32, f32, f32, f32), x: f32, y: f32, expand: f32) -> bool {
    let (min_x, min_y, max_x, max_y) = bounds;
    x >= min_x - expand && x <= max_x + expand && y >= min_y - expand && y <= max_y + expand
}

/// Euclidean distance from a point to a box edge (0 when inside)
fn box_distance(bounds: (f32, f32, f32, f32), x: f32, y: f32) -> f32 {
    let (min_x, min_y, max_x, max_y) = bounds;
    let dx = (min_x - x).max(0.0).max(x - max_x);
    let dy = (min_y - y).max(0.0).max(y - max_y);
    (dx * dx + dy * dy).sqrt()
}

fn centroid_distance(centroid: (f32, f32), x: f32, y: f32) -> f32 {
    let dx = centroid.0 - x;
    let dy = centroid.1 - y;
    (dx * dx + dy * dy).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn glyph(text: &str, x: f32, y: f32, width: f32) -> GlyphItem {
        GlyphItem {
            text: text.to_string(),
            x,
            y,
            width,
            height: 12.0,
            font_name: "Helvetica".to_string(),
            font_size: 12.0,
        }
    }

    #[test]
    fn test_groups_same_line_into_one_run() {
        let items = vec![
            glyph("Hello", 0.0, 100.0, 40.0),
            glyph("World", 40.0, 100.0, 40.0),
            glyph("Next", 0.0, 80.0, 30.0),
        ];

        let index = TextIndex::build(&items, 1);
        let runs = index.runs();

        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].text, "HelloWorld");
        assert_eq!(runs[0].y, 100.0);
        assert_eq!(runs[0].width, 80.0);
        assert_eq!(runs[1].text, "Next");
        assert_eq!(runs[1].y, 80.0);
    }

    #[test]
    fn test_threshold_keeps_slightly_offset_glyphs_together() {
        let items = vec![
            glyph("a", 0.0, 100.0, 5.0),
            glyph("b", 5.0, 103.0, 5.0),
            glyph("c", 10.0, 106.5, 5.0),
        ];

        // "b" is within the threshold of the anchor, "c" is not: the anchor
        // stays at the run's first glyph.
        let index = TextIndex::build(&items, 1);
        assert_eq!(index.runs().len(), 2);
        assert_eq!(index.runs()[0].text, "ab");
        assert_eq!(index.runs()[1].text, "c");
    }

    #[test]
    fn test_whitespace_items_skipped_without_breaking_run() {
        let items = vec![
            glyph("Hello", 0.0, 100.0, 40.0),
            glyph("   ", 40.0, 100.0, 10.0),
            glyph("World", 50.0, 100.0, 40.0),
        ];

        let index = TextIndex::build(&items, 1);
        assert_eq!(index.runs().len(), 1);
        assert_eq!(index.runs()[0].text, "HelloWorld");
    }

    #[test]
    fn test_empty_input() {
        let index = TextIndex::build(&[], 1);
        assert!(index.is_empty());
        assert!(index.find_run_at(10.0, 10.0, 50.0).is_none());
    }

    #[test]
    fn test_run_ids_are_deterministic() {
        let items = vec![glyph("a", 0.0, 100.0, 5.0), glyph("b", 0.0, 80.0, 5.0)];
        let index = TextIndex::build(&items, 3);

        assert_eq!(index.runs()[0].id, RunId { page: 3, ordinal: 0 });
        assert_eq!(index.runs()[1].id, RunId { page: 3, ordinal: 1 });
        assert!(index.run(RunId { page: 3, ordinal: 1 }).is_some());
        assert!(index.run(RunId { page: 3, ordinal: 9 }).is_none());
    }

    #[test]
    fn test_run_id_round_trips_through_display() {
        let id = RunId { page: 7, ordinal: 42 };
        let parsed: RunId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("run-x-1".parse::<RunId>().is_err());
        assert!("7-42".parse::<RunId>().is_err());
    }

    #[test]
    fn test_hit_on_top_left_corner() {
        let items = vec![glyph("Hello", 10.0, 100.0, 50.0)];
        let index = TextIndex::build(&items, 1);

        // Top-left corner of the run box in document space.
        let run = index.find_run_at(10.0, 112.0, 5.0);
        assert_eq!(run.unwrap().text, "Hello");
    }

    #[test]
    fn test_miss_far_outside_tolerance() {
        let items = vec![glyph("Hello", 10.0, 100.0, 50.0)];
        let index = TextIndex::build(&items, 1);

        assert!(index.find_run_at(500.0, 500.0, 20.0).is_none());
    }

    #[test]
    fn test_expanded_tolerance_hit() {
        let items = vec![glyph("Hello", 10.0, 100.0, 50.0)];
        let index = TextIndex::build(&items, 1);

        // Just outside the box, inside the tolerance band.
        assert!(index.find_run_at(5.0, 100.0, 8.0).is_some());
        // Beyond both the tolerance band and the character-scale reach
        // ("Hello" is 10 units per character, so tier 3 reaches 20).
        assert!(index.find_run_at(-35.0, 100.0, 1.0).is_none());
    }

    #[test]
    fn test_exact_hit_prefers_glyph_owner() {
        // Two runs stacked close together; the point sits inside a glyph of
        // the lower run but also inside the upper run's expanded box.
        let items = vec![
            glyph("Upper", 0.0, 120.0, 50.0),
            glyph("Lower", 0.0, 100.0, 50.0),
        ];
        let index = TextIndex::build(&items, 1);

        let run = index.find_run_at(25.0, 104.0, 30.0).unwrap();
        assert_eq!(run.text, "Lower");
    }

    #[test]
    fn test_closest_run_wins_between_two_matches() {
        let items = vec![
            glyph("Left", 0.0, 100.0, 40.0),
            glyph("Right", 100.0, 100.0, 40.0),
        ];
        let index = TextIndex::build(&items, 1);

        // Between the two runs, nearer to the right one; both expanded
        // boxes contain the point.
        let run = index.find_run_at(85.0, 106.0, 50.0).unwrap();
        assert_eq!(run.text, "Right");
    }

    #[test]
    fn test_patch_run_updates_text_and_width() {
        let items = vec![glyph("Hello", 0.0, 100.0, 40.0)];
        let mut index = TextIndex::build(&items, 1);
        let id = index.runs()[0].id;

        assert!(index.patch_run(id, "Goodbye".to_string(), 60.0));

        let run = index.run(id).unwrap();
        assert_eq!(run.text, "Goodbye");
        assert_eq!(run.width, 60.0);
        assert!(!index.patch_run(RunId { page: 1, ordinal: 9 }, String::new(), 0.0));
    }

    #[test]
    fn test_remove_run_drops_glyphs() {
        let items = vec![
            glyph("First", 0.0, 100.0, 40.0),
            glyph("Second", 0.0, 80.0, 40.0),
        ];
        let mut index = TextIndex::build(&items, 1);
        let first = index.runs()[0].id;
        let second = index.runs()[1].id;

        assert!(index.remove_run(first));
        assert_eq!(index.runs().len(), 1);
        assert!(index.run(first).is_none());

        // The surviving run is still hit-testable through its glyphs.
        let hit = index.find_run_at(20.0, 86.0, 2.0).unwrap();
        assert_eq!(hit.id, second);
    }

    #[test]
    fn test_proximity_reach_is_character_scale() {
        // Large characters: "Big" is 10 units per character, so tier 3
        // reaches 20 beyond the box even though the tolerance is only 2.
        let items = vec![glyph("Big", 0.0, 100.0, 30.0)];
        let index = TextIndex::build(&items, 1);

        assert!(index.find_run_at(45.0, 106.0, 2.0).is_some());
        assert!(index.find_run_at(200.0, 106.0, 2.0).is_none());
    }
}
