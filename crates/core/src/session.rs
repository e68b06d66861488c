//! Editor session aggregate
//!
//! One mutable object owns the whole interaction loop: the document
//! store, the active handle, viewport state, annotations with their
//! drafting state, and the revision-keyed caches of derived text indices
//! and rendered pages. UI event handlers call methods here instead of
//! threading setters around. The worker pool is handed in at
//! construction; nothing is a global.

use crate::annotation::{
    Annotation, AnnotationCollection, AnnotationId, AnnotationKind, Draft, DraftStyle,
};
use crate::bake::annotation_operators;
use crate::coords::{surface_to_document, PagePoint, SurfacePoint, Viewport};
use crate::font_metrics::{measure_text, FontFamily};
use crate::persist::{PersistError, Snapshot, SnapshotStore};
use crate::text_edit::{self, EditError, TextFormat};
use crate::text_index::{GlyphItem, RunId, TextIndex, TextRun};
use pdf_studio_cache::{ByteSized, LruCache, TtlCache};
use pdf_studio_engine::content;
use pdf_studio_engine::{
    DocumentHandle, DocumentStore, EngineError, PageDescriptor, PageRenderer, RenderError,
    RenderRequest, RgbaImage,
};
use pdf_studio_scheduler::TaskPool;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Default pointer hit tolerance in document units
pub const HIT_TOLERANCE: f32 = 10.0;

const INDEX_CACHE_ENTRIES: usize = 64;
const INDEX_CACHE_BYTES: usize = 8 * 1024 * 1024;
const RENDER_CACHE_ENTRIES: usize = 16;
const RENDER_CACHE_BYTES: usize = 64 * 1024 * 1024;
const RENDER_SNAPSHOT_TTL: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("no document is open")]
    NoDocument,
    #[error("unknown text run {0}")]
    UnknownRun(RunId),
    #[error("invalid search pattern: {0}")]
    InvalidPattern(String),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Edit(#[from] EditError),
    #[error(transparent)]
    Persist(#[from] PersistError),
    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Cache key: (handle, document revision, page number)
type IndexKey = (u64, u64, u32);

/// Cache key: (handle, revision, page, scale bits)
type RenderKey = (u64, u64, u32, u32);

#[derive(Debug, Clone)]
struct CachedBitmap {
    pixels: Vec<u8>,
    width: u32,
    height: u32,
}

impl ByteSized for CachedBitmap {
    fn byte_size(&self) -> usize {
        self.pixels.len()
    }
}

pub struct EditorSession {
    store: DocumentStore,
    pool: Arc<TaskPool>,
    active: Option<DocumentHandle>,
    source_name: Option<String>,
    viewport: Viewport,
    device_pixel_ratio: f32,
    current_page: u32,
    annotations: AnnotationCollection,
    draft: Option<Draft>,
    draft_style: DraftStyle,
    index_cache: LruCache<IndexKey, TextIndex>,
    render_cache: TtlCache<RenderKey, CachedBitmap>,
}

impl EditorSession {
    pub fn new(pool: Arc<TaskPool>) -> Self {
        Self {
            store: DocumentStore::new(),
            pool,
            active: None,
            source_name: None,
            viewport: Viewport::default(),
            device_pixel_ratio: 1.0,
            current_page: 1,
            annotations: AnnotationCollection::new(),
            draft: None,
            draft_style: DraftStyle::default(),
            index_cache: LruCache::new(INDEX_CACHE_ENTRIES, INDEX_CACHE_BYTES),
            render_cache: TtlCache::new(
                RENDER_CACHE_ENTRIES,
                RENDER_CACHE_BYTES,
                RENDER_SNAPSHOT_TTL,
            ),
        }
    }

    /// Open a document from bytes, replacing any previous one
    pub fn open_bytes(
        &mut self,
        bytes: &[u8],
        source_name: &str,
    ) -> Result<DocumentHandle, SessionError> {
        if let Some(previous) = self.active.take() {
            let _ = self.store.release(previous);
        }

        let handle = self.store.load(bytes)?;
        self.active = Some(handle);
        self.source_name = Some(source_name.to_string());
        self.current_page = 1;
        self.annotations.clear();
        self.draft = None;
        self.index_cache.clear();
        self.render_cache.clear();
        log::debug!("opened {source_name} ({} bytes)", bytes.len());
        Ok(handle)
    }

    pub fn active(&self) -> Option<DocumentHandle> {
        self.active
    }

    fn active_handle(&self) -> Result<DocumentHandle, SessionError> {
        self.active.ok_or(SessionError::NoDocument)
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut DocumentStore {
        &mut self.store
    }

    pub fn close(&mut self) -> Result<(), SessionError> {
        let handle = self.active_handle()?;
        self.store.release(handle)?;
        self.active = None;
        self.source_name = None;
        self.annotations.clear();
        self.draft = None;
        self.index_cache.clear();
        self.render_cache.clear();
        Ok(())
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    pub fn set_device_pixel_ratio(&mut self, ratio: f32) {
        self.device_pixel_ratio = if ratio > 0.0 { ratio } else { 1.0 };
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    /// Switch pages, discarding any in-progress draft
    pub fn set_current_page(&mut self, page_number: u32) -> Result<(), SessionError> {
        let handle = self.active_handle()?;
        self.store.page_id_at(handle, page_number)?;
        self.current_page = page_number;
        self.draft = None;
        Ok(())
    }

    /// Map a pointer position to document coordinates
    pub fn pointer_to_page(&self, point: SurfacePoint) -> PagePoint {
        surface_to_document(point, &self.viewport, self.device_pixel_ratio)
    }

    pub fn page_descriptors(&self) -> Result<Vec<PageDescriptor>, SessionError> {
        Ok(self.store.page_descriptors(self.active_handle()?)?)
    }

    /// The text layout index for a page, built on demand
    ///
    /// Content parsing runs on the worker pool; results are cached keyed
    /// by document revision, so any structural or content mutation makes
    /// the next call rebuild.
    pub fn text_index(&mut self, page_number: u32) -> Result<TextIndex, SessionError> {
        let handle = self.active_handle()?;
        let revision = self.store.revision(handle)?;
        let key = (handle.raw(), revision, page_number);

        if let Some(index) = self.index_cache.get(&key) {
            return Ok(index);
        }

        let page_id = self.store.page_id_at(handle, page_number)?;
        let bytes = self.store.page_content(handle, page_id)?;
        let operators = self
            .pool
            .submit(Arc::new(move || content::parse_stream(&bytes)));
        let text_ops = content::extract_text_operators(&operators);

        let glyphs: Vec<GlyphItem> = text_ops
            .into_iter()
            .map(|op| GlyphItem {
                text: op.text,
                x: op.x as f32,
                y: op.y as f32,
                width: op.width as f32,
                height: op.height as f32,
                font_name: op.font,
                font_size: op.font_size as f32,
            })
            .collect();

        let index = TextIndex::build(&glyphs, page_number);
        self.index_cache.insert(key, index.clone());
        Ok(index)
    }

    pub fn text_runs(&mut self, page_number: u32) -> Result<Vec<TextRun>, SessionError> {
        Ok(self.text_index(page_number)?.runs().to_vec())
    }

    /// Hit-test text runs at a document-space point
    pub fn find_run_at(
        &mut self,
        page_number: u32,
        point: PagePoint,
        tolerance: f32,
    ) -> Result<Option<TextRun>, SessionError> {
        let index = self.text_index(page_number)?;
        Ok(index.find_run_at(point.x, point.y, tolerance).cloned())
    }

    /// Replace the text of runs on one page
    ///
    /// The cached index is patched in place under the new revision: the
    /// old glyphs stay in the content stream (painted over), so a plain
    /// re-extraction would resurrect them.
    pub fn replace_text_runs(
        &mut self,
        page_number: u32,
        edits: &[(RunId, String)],
        format: &TextFormat,
    ) -> Result<(), SessionError> {
        let handle = self.active_handle()?;
        let mut index = self.text_index(page_number)?;

        for (run_id, new_text) in edits {
            let run = index
                .run(*run_id)
                .cloned()
                .ok_or(SessionError::UnknownRun(*run_id))?;

            text_edit::replace_run_text(&mut self.store, handle, &run, new_text, format)?;

            if new_text.is_empty() {
                index.remove_run(*run_id);
            } else {
                let family_name = format
                    .font_family
                    .clone()
                    .unwrap_or_else(|| run.font_name.clone());
                let family = FontFamily::from_name(&family_name);
                let size = format.font_size.unwrap_or(run.font_size);
                let width = measure_text(new_text, size, family);
                index.patch_run(*run_id, new_text.clone(), width);
            }
        }

        let revision = self.store.revision(handle)?;
        self.index_cache
            .insert((handle.raw(), revision, page_number), index);
        Ok(())
    }

    /// Re-style runs without changing their text
    ///
    /// Redraws each run over itself with the new format applied.
    pub fn format_text_runs(
        &mut self,
        page_number: u32,
        run_ids: &[RunId],
        format: &TextFormat,
    ) -> Result<(), SessionError> {
        let index = self.text_index(page_number)?;
        let mut edits = Vec::with_capacity(run_ids.len());
        for run_id in run_ids {
            let run = index
                .run(*run_id)
                .ok_or(SessionError::UnknownRun(*run_id))?;
            edits.push((*run_id, run.text.clone()));
        }
        self.replace_text_runs(page_number, &edits, format)
    }

    /// Erase runs without replacements
    pub fn delete_text_runs(
        &mut self,
        page_number: u32,
        run_ids: &[RunId],
    ) -> Result<(), SessionError> {
        let edits: Vec<(RunId, String)> =
            run_ids.iter().map(|id| (*id, String::new())).collect();
        self.replace_text_runs(page_number, &edits, &TextFormat::default())
    }

    /// Find runs matching a regex across every page
    pub fn search_runs(&mut self, pattern: &str) -> Result<Vec<TextRun>, SessionError> {
        let regex =
            Regex::new(pattern).map_err(|err| SessionError::InvalidPattern(err.to_string()))?;
        let handle = self.active_handle()?;
        let page_count = self.store.page_count(handle)?;

        let mut matches = Vec::new();
        for page_number in 1..=page_count {
            let index = self.text_index(page_number)?;
            matches.extend(
                index
                    .runs()
                    .iter()
                    .filter(|run| regex.is_match(&run.text))
                    .cloned(),
            );
        }
        Ok(matches)
    }

    /// Rewrite every matching text operator across the whole document
    ///
    /// Unlike overlay edits this splices the content streams themselves
    /// (via the analyzer's rebuild), so every page's index is re-extracted
    /// afterwards — content offsets shift on a multi-page rewrite.
    pub fn replace_all(
        &mut self,
        pattern: &str,
        replacement: &str,
    ) -> Result<usize, SessionError> {
        let regex =
            Regex::new(pattern).map_err(|err| SessionError::InvalidPattern(err.to_string()))?;
        let handle = self.active_handle()?;
        let page_count = self.store.page_count(handle)?;

        let mut replaced = 0;
        for page_number in 1..=page_count {
            let page_id = self.store.page_id_at(handle, page_number)?;
            let bytes = self.store.page_content(handle, page_id)?;
            let operators = content::parse_stream(&bytes);

            let mut replacements = HashMap::new();
            for op in content::extract_text_operators(&operators) {
                if regex.is_match(&op.text) {
                    let new_text = regex.replace_all(&op.text, replacement).into_owned();
                    replacements.insert(op.text, new_text);
                }
            }
            if replacements.is_empty() {
                continue;
            }

            replaced += replacements.len();
            let rebuilt = content::rebuild(&operators, &replacements);
            self.store.replace_page_content(handle, page_id, rebuilt)?;
        }

        if replaced > 0 {
            // Derived indices for every page are stale now.
            let raw = handle.raw();
            self.index_cache.retain(|key| key.0 != raw);
        }
        Ok(replaced)
    }

    pub fn annotations(&self) -> &AnnotationCollection {
        &self.annotations
    }

    pub fn annotations_mut(&mut self) -> &mut AnnotationCollection {
        &mut self.annotations
    }

    /// Add a committed annotation to the current page
    pub fn add_annotation(&mut self, page: u32, kind: AnnotationKind) -> AnnotationId {
        self.annotations.add(Annotation::new(page, kind))
    }

    /// Topmost annotation at a document-space point on a page
    pub fn annotation_at(
        &self,
        page: u32,
        point: PagePoint,
        tolerance: f32,
    ) -> Option<AnnotationId> {
        self.annotations
            .hit_test(page, &point, tolerance)
            .map(|a| a.id)
    }

    pub fn set_draft_style(&mut self, style: DraftStyle) {
        self.draft_style = style;
    }

    pub fn begin_draft(&mut self, draft: Draft) {
        self.draft = Some(draft);
    }

    pub fn draft(&self) -> Option<&Draft> {
        self.draft.as_ref()
    }

    /// Pointer moved while drafting
    pub fn draft_pointer_moved(&mut self, point: PagePoint) {
        if let Some(draft) = &mut self.draft {
            draft.update(point);
        }
    }

    /// Discrete click for point-sequence tools
    pub fn draft_add_point(&mut self, point: PagePoint) {
        if let Some(draft) = &mut self.draft {
            draft.add_point(point);
        }
    }

    pub fn cancel_draft(&mut self) {
        self.draft = None;
    }

    /// Commit the in-progress draft to the current page
    ///
    /// Returns `None` for sub-threshold drafts (accidental clicks).
    pub fn commit_draft(&mut self) -> Option<AnnotationId> {
        let draft = self.draft.take()?;
        let kind = draft.commit(&self.draft_style)?;
        Some(self.add_annotation(self.current_page, kind))
    }

    /// Render a page through the external renderer, memoizing the bitmap
    ///
    /// Rendered snapshots live in the TTL cache: they expire on their own
    /// and are also invalidated by any document mutation (revision key).
    pub fn render_page(
        &mut self,
        renderer: &dyn PageRenderer,
        page_number: u32,
    ) -> Result<RgbaImage, SessionError> {
        let handle = self.active_handle()?;
        let revision = self.store.revision(handle)?;
        let key = (
            handle.raw(),
            revision,
            page_number,
            self.viewport.scale.to_bits(),
        );

        if let Some(cached) = self.render_cache.get(&key) {
            if let Some(image) =
                RgbaImage::from_raw(cached.width, cached.height, cached.pixels)
            {
                return Ok(image);
            }
        }

        let bytes = self.store.serialize(handle)?;
        let image = renderer.render_page(
            &bytes,
            RenderRequest {
                page_number,
                scale: self.viewport.scale,
            },
        )?;

        self.render_cache.insert(
            key,
            CachedBitmap {
                pixels: image.as_raw().clone(),
                width: image.width(),
                height: image.height(),
            },
        );
        Ok(image)
    }

    /// Capture an auto-save snapshot for the open document
    pub fn save_snapshot(&mut self, store: &SnapshotStore) -> Result<(), SessionError> {
        let handle = self.active_handle()?;
        let source = self
            .source_name
            .clone()
            .ok_or(SessionError::NoDocument)?;
        let page_count = self.store.page_count(handle)?;

        let mut text_runs = HashMap::new();
        for page_number in 1..=page_count {
            let runs = self.text_runs(page_number)?;
            if !runs.is_empty() {
                text_runs.insert(page_number, runs);
            }
        }

        let snapshot = Snapshot::new(
            self.annotations.iter().cloned().collect(),
            self.current_page,
            text_runs,
        );
        store.save(&source, &snapshot)?;
        Ok(())
    }

    /// Restore editor state from a previous snapshot of this source file
    ///
    /// Returns false when no snapshot exists.
    pub fn try_restore(&mut self, store: &SnapshotStore) -> Result<bool, SessionError> {
        let source = self
            .source_name
            .clone()
            .ok_or(SessionError::NoDocument)?;
        let Some(snapshot) = store.load(&source)? else {
            return Ok(false);
        };

        self.annotations.restore(snapshot.annotations);
        if self.set_current_page(snapshot.page_number).is_err() {
            self.current_page = 1;
        }
        Ok(true)
    }

    /// Serialize the document, optionally baking annotations onto a copy
    ///
    /// The open document is never mutated by an export: annotations are
    /// rendered onto a scratch copy that is released afterwards.
    pub fn export_pdf(&mut self, include_annotations: bool) -> Result<Vec<u8>, SessionError> {
        let handle = self.active_handle()?;
        let bytes = self.store.serialize(handle)?;

        if !include_annotations || self.annotations.is_empty() {
            return Ok(bytes);
        }

        let scratch = self.store.load(&bytes)?;
        let page_count = self.store.page_count(scratch)?;

        for page_number in 1..=page_count {
            let on_page = self.annotations.for_page(page_number);
            if on_page.is_empty() {
                continue;
            }

            let page_id = self.store.page_id_at(scratch, page_number)?;
            let font = self
                .store
                .ensure_font_resource(scratch, page_id, "Helvetica")?;

            let mut ops = String::new();
            for annotation in on_page {
                if let Some(drawn) = annotation_operators(annotation, &font) {
                    ops.push_str(&drawn);
                }
            }
            if !ops.is_empty() {
                self.store
                    .append_page_content(scratch, page_id, ops.as_bytes())?;
            }
        }

        let result = self.store.serialize(scratch)?;
        self.store.release(scratch)?;
        Ok(result)
    }

    /// Produce compressed document bytes on the worker pool
    ///
    /// The task operates on a byte copy in its own store; if compression
    /// fails for any reason the uncompressed bytes are returned instead.
    pub fn compress_to_bytes(&mut self) -> Result<Vec<u8>, SessionError> {
        let handle = self.active_handle()?;
        let bytes = self.store.serialize(handle)?;

        let input = bytes.clone();
        let compressed: Option<Vec<u8>> = self.pool.submit(Arc::new(move || {
            let mut scratch = DocumentStore::new();
            let handle = scratch.load(&input).ok()?;
            scratch.compress(handle).ok()?;
            scratch.serialize(handle).ok()
        }));

        match compressed {
            Some(compressed) => Ok(compressed),
            None => {
                log::warn!("compression task failed; exporting uncompressed bytes");
                Ok(bytes)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{BoxTool, Rect};
    use pdf_studio_engine::BlankRenderer;
    use pdf_studio_scheduler::TaskPoolConfig;

    fn session() -> EditorSession {
        EditorSession::new(Arc::new(TaskPool::new(TaskPoolConfig::with_workers(2))))
    }

    /// One-page document with two text lines
    fn sample_bytes() -> Vec<u8> {
        let mut store = DocumentStore::new();
        let handle = store.create(&[(612.0, 792.0)]).unwrap();
        let page = store.page_id_at(handle, 1).unwrap();
        store
            .replace_page_content(
                handle,
                page,
                b"BT /F1 12 Tf 1 0 0 1 72 700 Tm (Hello) Tj 1 0 0 1 72 650 Tm (World) Tj ET"
                    .to_vec(),
            )
            .unwrap();
        store.serialize(handle).unwrap()
    }

    #[test]
    fn test_open_and_extract_runs() {
        let mut session = session();
        session.open_bytes(&sample_bytes(), "sample.pdf").unwrap();

        let runs = session.text_runs(1).unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].text, "Hello");
        assert_eq!(runs[0].y, 700.0);
        assert_eq!(runs[1].text, "World");
    }

    #[test]
    fn test_no_document_errors() {
        let mut session = session();
        assert!(matches!(
            session.text_runs(1).unwrap_err(),
            SessionError::NoDocument
        ));
    }

    #[test]
    fn test_index_is_cached_until_mutation() {
        let mut session = session();
        session.open_bytes(&sample_bytes(), "sample.pdf").unwrap();

        session.text_runs(1).unwrap();
        session.text_runs(1).unwrap();
        assert_eq!(session.index_cache.stats().hits, 1);
    }

    #[test]
    fn test_find_run_at_document_point() {
        let mut session = session();
        session.open_bytes(&sample_bytes(), "sample.pdf").unwrap();

        let hit = session
            .find_run_at(1, PagePoint::new(80.0, 704.0), HIT_TOLERANCE)
            .unwrap();
        assert_eq!(hit.unwrap().text, "Hello");

        let miss = session
            .find_run_at(1, PagePoint::new(500.0, 100.0), HIT_TOLERANCE)
            .unwrap();
        assert!(miss.is_none());
    }

    #[test]
    fn test_replace_run_patches_index() {
        let mut session = session();
        session.open_bytes(&sample_bytes(), "sample.pdf").unwrap();

        let id = session.text_runs(1).unwrap()[0].id;
        session
            .replace_text_runs(1, &[(id, "Goodbye".to_string())], &TextFormat::default())
            .unwrap();

        let runs = session.text_runs(1).unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].text, "Goodbye");
        // The overlay leaves old glyphs in the stream but the index must
        // not resurrect them.
        assert!(!runs.iter().any(|run| run.text == "Hello"));
    }

    #[test]
    fn test_delete_run_removes_from_index() {
        let mut session = session();
        session.open_bytes(&sample_bytes(), "sample.pdf").unwrap();

        let id = session.text_runs(1).unwrap()[0].id;
        session.delete_text_runs(1, &[id]).unwrap();

        let runs = session.text_runs(1).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].text, "World");
    }

    #[test]
    fn test_format_runs_keeps_text() {
        let mut session = session();
        session.open_bytes(&sample_bytes(), "sample.pdf").unwrap();

        let id = session.text_runs(1).unwrap()[0].id;
        let format = TextFormat {
            bold: true,
            color: Some([1.0, 0.0, 0.0]),
            ..Default::default()
        };
        session.format_text_runs(1, &[id], &format).unwrap();

        let runs = session.text_runs(1).unwrap();
        assert_eq!(runs[0].text, "Hello");

        // The redraw used the bold variant and the requested color.
        let handle = session.active().unwrap();
        let page = session.store().page_id_at(handle, 1).unwrap();
        let content = session.store().page_content(handle, page).unwrap();
        let text = String::from_utf8_lossy(&content);
        assert!(text.contains("1 0 0 rg"));
    }

    #[test]
    fn test_replace_unknown_run_fails() {
        let mut session = session();
        session.open_bytes(&sample_bytes(), "sample.pdf").unwrap();

        let missing = RunId { page: 1, ordinal: 99 };
        let err = session
            .replace_text_runs(1, &[(missing, "x".to_string())], &TextFormat::default())
            .unwrap_err();
        assert!(matches!(err, SessionError::UnknownRun(_)));
    }

    #[test]
    fn test_search_runs() {
        let mut session = session();
        session.open_bytes(&sample_bytes(), "sample.pdf").unwrap();

        let matches = session.search_runs("^Hel").unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].text, "Hello");
    }

    #[test]
    fn test_invalid_pattern_is_validation_error() {
        let mut session = session();
        session.open_bytes(&sample_bytes(), "sample.pdf").unwrap();

        let err = session.search_runs("[unclosed").unwrap_err();
        assert!(matches!(err, SessionError::InvalidPattern(_)));
    }

    #[test]
    fn test_replace_all_rewrites_stream() {
        let mut session = session();
        session.open_bytes(&sample_bytes(), "sample.pdf").unwrap();

        let replaced = session.replace_all("Hello", "Howdy").unwrap();
        assert_eq!(replaced, 1);

        // The stream itself was rewritten: re-extraction sees the new text
        // and the old text is gone from the content bytes.
        let runs = session.text_runs(1).unwrap();
        assert!(runs.iter().any(|run| run.text == "Howdy"));
        assert!(!runs.iter().any(|run| run.text == "Hello"));

        let handle = session.active().unwrap();
        let page = session.store().page_id_at(handle, 1).unwrap();
        let content = session.store().page_content(handle, page).unwrap();
        assert!(!String::from_utf8_lossy(&content).contains("Hello"));
    }

    #[test]
    fn test_pointer_to_page_flips_y() {
        let mut session = session();
        session.set_viewport(Viewport::for_page(612.0, 792.0, 1.0));

        let point = session.pointer_to_page(SurfacePoint::new(10.0, 792.0));
        assert_eq!(point.y, 0.0);
    }

    #[test]
    fn test_draft_commit_adds_annotation_to_current_page() {
        let mut session = session();
        session.open_bytes(&sample_bytes(), "sample.pdf").unwrap();

        session.begin_draft(Draft::begin_box(
            BoxTool::Rectangle,
            PagePoint::new(10.0, 10.0),
        ));
        session.draft_pointer_moved(PagePoint::new(60.0, 40.0));
        let id = session.commit_draft().unwrap();

        let annotation = session.annotations().get(id).unwrap();
        assert_eq!(annotation.page, 1);
        assert!(session
            .annotation_at(1, PagePoint::new(30.0, 20.0), 2.0)
            .is_some());
    }

    #[test]
    fn test_sub_threshold_draft_discarded() {
        let mut session = session();
        session.open_bytes(&sample_bytes(), "sample.pdf").unwrap();

        session.begin_draft(Draft::begin_box(
            BoxTool::Rectangle,
            PagePoint::new(10.0, 10.0),
        ));
        session.draft_pointer_moved(PagePoint::new(12.0, 12.0));

        assert!(session.commit_draft().is_none());
        assert!(session.annotations().is_empty());
    }

    #[test]
    fn test_page_switch_discards_draft() {
        let mut store = DocumentStore::new();
        let handle = store.create(&[(612.0, 792.0), (612.0, 792.0)]).unwrap();
        let bytes = store.serialize(handle).unwrap();

        let mut session = session();
        session.open_bytes(&bytes, "two.pdf").unwrap();
        session.begin_draft(Draft::begin_freehand(PagePoint::new(0.0, 0.0)));

        session.set_current_page(2).unwrap();
        assert!(session.draft().is_none());

        assert!(session.set_current_page(9).is_err());
    }

    #[test]
    fn test_snapshot_save_and_restore() {
        let temp = tempfile::tempdir().unwrap();
        let snapshots = SnapshotStore::with_root(temp.path());

        let bytes = sample_bytes();
        let mut session = session();
        session.open_bytes(&bytes, "sample.pdf").unwrap();
        session.add_annotation(
            1,
            AnnotationKind::Redaction {
                rect: Rect::new(10.0, 10.0, 40.0, 12.0),
            },
        );
        session.save_snapshot(&snapshots).unwrap();

        // A fresh session over the same source recovers the state.
        let mut restored = self::session();
        restored.open_bytes(&bytes, "sample.pdf").unwrap();
        assert!(restored.try_restore(&snapshots).unwrap());
        assert_eq!(restored.annotations().len(), 1);

        // A different source has nothing to restore.
        let mut other = self::session();
        other.open_bytes(&bytes, "other.pdf").unwrap();
        assert!(!other.try_restore(&snapshots).unwrap());
    }

    #[test]
    fn test_export_with_annotations_leaves_document_untouched() {
        let mut session = session();
        session.open_bytes(&sample_bytes(), "sample.pdf").unwrap();
        session.add_annotation(
            1,
            AnnotationKind::Highlight {
                rect: Rect::new(70.0, 695.0, 60.0, 16.0),
                color: crate::annotation::Color::YELLOW,
            },
        );

        let handle = session.active().unwrap();
        let revision_before = session.store().revision(handle).unwrap();

        let plain = session.export_pdf(false).unwrap();
        let baked = session.export_pdf(true).unwrap();

        assert_ne!(plain, baked);
        assert_eq!(session.store().revision(handle).unwrap(), revision_before);

        // The baked copy carries the highlight operators.
        let mut verify = DocumentStore::new();
        let check = verify.load(&baked).unwrap();
        let page = verify.page_id_at(check, 1).unwrap();
        let content = verify.page_content(check, page).unwrap();
        assert!(String::from_utf8_lossy(&content).contains("re f"));
    }

    #[test]
    fn test_render_page_uses_snapshot_cache() {
        let mut session = session();
        session.open_bytes(&sample_bytes(), "sample.pdf").unwrap();
        session.set_viewport(Viewport::for_page(612.0, 792.0, 1.0));

        let renderer = BlankRenderer::new();
        let first = session.render_page(&renderer, 1).unwrap();
        assert_eq!(first.width(), 612);

        session.render_page(&renderer, 1).unwrap();
        assert_eq!(session.render_cache.stats().hits, 1);
    }

    #[test]
    fn test_compress_to_bytes_round_trips() {
        let mut session = session();
        session.open_bytes(&sample_bytes(), "sample.pdf").unwrap();

        let compressed = session.compress_to_bytes().unwrap();

        let mut verify = DocumentStore::new();
        let handle = verify.load(&compressed).unwrap();
        assert_eq!(verify.page_count(handle).unwrap(), 1);
    }
}
