//! Document store and page-level mutation
//!
//! Loaded documents are owned by the store and addressed through opaque
//! handles. Every structural mutation bumps the document's revision and
//! invalidates its memoized serialization; a failed operation validates
//! before touching anything, so the document is left exactly as it was.

use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Opaque identifier for a loaded document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentHandle(u64);

impl DocumentHandle {
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Stable identifier for a page within one document lifetime
///
/// Wraps the page object's id, so it keeps addressing the same page across
/// reorders. Ids from one document are meaningless in another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageId(pub u32, pub u16);

impl PageId {
    fn object_id(self) -> ObjectId {
        (self.0, self.1)
    }
}

impl From<ObjectId> for PageId {
    fn from((num, gen): ObjectId) -> Self {
        Self(num, gen)
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.0, self.1)
    }
}

/// Absolute page rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum Rotation {
    R0,
    R90,
    R180,
    R270,
}

impl Rotation {
    pub fn degrees(self) -> i64 {
        match self {
            Rotation::R0 => 0,
            Rotation::R90 => 90,
            Rotation::R180 => 180,
            Rotation::R270 => 270,
        }
    }

    /// Normalize an angle in degrees to one of the four legal rotations
    pub fn from_degrees(angle: i64) -> Result<Self, EngineError> {
        match angle.rem_euclid(360) {
            0 => Ok(Rotation::R0),
            90 => Ok(Rotation::R90),
            180 => Ok(Rotation::R180),
            270 => Ok(Rotation::R270),
            _ => Err(EngineError::InvalidRotation(angle)),
        }
    }
}

impl From<Rotation> for i64 {
    fn from(rotation: Rotation) -> Self {
        rotation.degrees()
    }
}

impl TryFrom<i64> for Rotation {
    type Error = String;

    fn try_from(angle: i64) -> Result<Self, Self::Error> {
        Rotation::from_degrees(angle).map_err(|err| err.to_string())
    }
}

/// Snapshot of one page's identity and geometry
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageDescriptor {
    pub id: PageId,
    /// Zero-based position in the current page order
    pub index: u32,
    /// Width in points
    pub width: f32,
    /// Height in points
    pub height: f32,
    pub rotation: Rotation,
}

/// Document information read from the Info dictionary
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub page_count: u32,
}

/// Errors from document engine operations
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt document: {0}")]
    CorruptDocument(String),
    #[error("encrypted document could not be opened, even ignoring encryption")]
    EncryptedDocument,
    #[error("invalid handle {0}")]
    InvalidHandle(u64),
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },
    #[error("unknown page id {0}")]
    UnknownPage(PageId),
    #[error("none of the requested pages exist in the document")]
    NoMatchingPages,
    #[error("cannot delete all pages from a document")]
    CannotDeleteAllPages,
    #[error("merge requires at least one document")]
    EmptyMerge,
    #[error("document must contain at least one page")]
    EmptyDocument,
    #[error("invalid rotation {0} (expected 0, 90, 180 or 270)")]
    InvalidRotation(i64),
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),
}

#[derive(Debug)]
struct DocumentRecord {
    doc: Document,
    revision: u64,
    serialized: Option<Vec<u8>>,
    encrypted: bool,
}

impl DocumentRecord {
    fn mark_dirty(&mut self) {
        self.revision += 1;
        self.serialized = None;
    }
}

/// Owner of all loaded documents
///
/// Mutating operations keep the input handle valid and bump its revision;
/// `merge_documents` and `extract_pages` mint new handles. Callers key
/// derived caches on `(handle, revision)`.
#[derive(Debug, Default)]
pub struct DocumentStore {
    next_handle: u64,
    docs: HashMap<DocumentHandle, DocumentRecord>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a document from bytes
    ///
    /// A parse failure on bytes carrying an `/Encrypt` marker is reported as
    /// `EncryptedDocument`; an encrypted document whose structure still
    /// parses is accepted in permissive mode (text and streams may be
    /// unreadable) with a warning.
    pub fn load(&mut self, bytes: &[u8]) -> Result<DocumentHandle, EngineError> {
        let has_encrypt_marker = bytes
            .windows(b"/Encrypt".len())
            .any(|window| window == b"/Encrypt");

        let mut doc = match Document::load_mem(bytes) {
            Ok(doc) => doc,
            Err(_) if has_encrypt_marker => return Err(EngineError::EncryptedDocument),
            Err(err) => return Err(EngineError::CorruptDocument(err.to_string())),
        };

        let encrypted = doc.trailer.get(b"Encrypt").is_ok();
        if encrypted {
            log::warn!("document is encrypted; continuing with structure-only access");
        }

        if doc.get_pages().is_empty() {
            return Err(EngineError::CorruptDocument("document has no pages".into()));
        }

        normalize_page_tree(&mut doc)?;
        Ok(self.register(doc, encrypted))
    }

    /// Create a new document with the given blank page sizes (in points)
    pub fn create(&mut self, page_sizes: &[(f32, f32)]) -> Result<DocumentHandle, EngineError> {
        if page_sizes.is_empty() {
            return Err(EngineError::EmptyDocument);
        }

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let mut kids = Vec::with_capacity(page_sizes.len());
        for &(width, height) in page_sizes {
            let content_id = doc.add_object(Stream::new(Dictionary::new(), Vec::new()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => Object::Reference(pages_id),
                "MediaBox" => vec![
                    0.into(),
                    0.into(),
                    Object::Real(width),
                    Object::Real(height),
                ],
                "Contents" => Object::Reference(content_id),
                "Resources" => Object::Dictionary(Dictionary::new()),
            });
            kids.push(Object::Reference(page_id));
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference(pages_id),
        });
        doc.trailer.set("Root", Object::Reference(catalog_id));

        Ok(self.register(doc, false))
    }

    /// Concatenate pages of the given documents, in handle order
    pub fn merge_documents(
        &mut self,
        handles: &[DocumentHandle],
    ) -> Result<DocumentHandle, EngineError> {
        if handles.is_empty() {
            return Err(EngineError::EmptyMerge);
        }
        for handle in handles {
            self.record(*handle)?;
        }

        let mut dest = Document::with_version("1.5");
        let mut page_ids = Vec::new();

        for handle in handles {
            let src = self.record(*handle)?.doc.clone();
            page_ids.extend(absorb_document(&mut dest, src));
        }

        assemble_catalog(&mut dest, &page_ids);
        Ok(self.register(dest, false))
    }

    /// Put pages into the requested order
    ///
    /// Pages not named in `order` are appended afterwards in their original
    /// relative order; nothing is ever dropped. Duplicate ids are applied
    /// once, at their first occurrence.
    pub fn reorder_pages(
        &mut self,
        handle: DocumentHandle,
        order: &[PageId],
    ) -> Result<DocumentHandle, EngineError> {
        let record = self.record_mut(handle)?;
        let current = page_object_ids(&record.doc);
        let current_set: HashSet<ObjectId> = current.iter().copied().collect();

        let mut new_order: Vec<ObjectId> = Vec::with_capacity(current.len());
        for id in order {
            let oid = id.object_id();
            if current_set.contains(&oid) && !new_order.contains(&oid) {
                new_order.push(oid);
            }
        }
        if new_order.is_empty() {
            return Err(EngineError::NoMatchingPages);
        }
        for oid in &current {
            if !new_order.contains(oid) {
                new_order.push(*oid);
            }
        }

        rebuild_page_tree(&mut record.doc, &new_order)?;
        record.mark_dirty();
        log::debug!("reordered {} pages", new_order.len());
        Ok(handle)
    }

    /// Remove the named pages
    pub fn delete_pages(
        &mut self,
        handle: DocumentHandle,
        page_ids: &[PageId],
    ) -> Result<DocumentHandle, EngineError> {
        let record = self.record_mut(handle)?;
        let current = page_object_ids(&record.doc);
        let doomed: HashSet<ObjectId> = page_ids
            .iter()
            .map(|id| id.object_id())
            .filter(|oid| current.contains(oid))
            .collect();

        if doomed.is_empty() {
            return Err(EngineError::NoMatchingPages);
        }
        let remaining: Vec<ObjectId> = current
            .iter()
            .copied()
            .filter(|oid| !doomed.contains(oid))
            .collect();
        if remaining.is_empty() {
            return Err(EngineError::CannotDeleteAllPages);
        }

        rebuild_page_tree(&mut record.doc, &remaining)?;
        for oid in &doomed {
            record.doc.objects.remove(oid);
        }
        record.mark_dirty();
        log::debug!("deleted {} pages", doomed.len());
        Ok(handle)
    }

    /// Produce an independent document containing only the named pages, in
    /// the order given
    pub fn extract_pages(
        &mut self,
        handle: DocumentHandle,
        page_ids: &[PageId],
    ) -> Result<DocumentHandle, EngineError> {
        let record = self.record(handle)?;
        let current = page_object_ids(&record.doc);
        let current_set: HashSet<ObjectId> = current.iter().copied().collect();

        let mut selected: Vec<ObjectId> = Vec::new();
        for id in page_ids {
            let oid = id.object_id();
            if current_set.contains(&oid) && !selected.contains(&oid) {
                selected.push(oid);
            }
        }
        if selected.is_empty() {
            return Err(EngineError::NoMatchingPages);
        }

        let mut doc = record.doc.clone();
        rebuild_page_tree(&mut doc, &selected)?;
        for oid in &current {
            if !selected.contains(oid) {
                doc.objects.remove(oid);
            }
        }

        let encrypted = record.encrypted;
        Ok(self.register(doc, encrypted))
    }

    /// Set the absolute rotation of one page
    pub fn rotate_page(
        &mut self,
        handle: DocumentHandle,
        page_id: PageId,
        rotation: Rotation,
    ) -> Result<DocumentHandle, EngineError> {
        let record = self.record_mut(handle)?;
        let oid = page_id.object_id();
        if !page_object_ids(&record.doc).contains(&oid) {
            return Err(EngineError::UnknownPage(page_id));
        }

        record
            .doc
            .get_object_mut(oid)?
            .as_dict_mut()?
            .set("Rotate", rotation.degrees());
        record.mark_dirty();
        Ok(handle)
    }

    /// Serialize the document, reusing the memoized bytes when clean
    pub fn serialize(&mut self, handle: DocumentHandle) -> Result<Vec<u8>, EngineError> {
        let record = self.record_mut(handle)?;
        if record.serialized.is_none() {
            let mut buffer = Vec::new();
            record.doc.save_to(&mut buffer)?;
            record.serialized = Some(buffer);
        }
        Ok(record.serialized.clone().unwrap_or_default())
    }

    /// Compress the document's streams (worker-pool task payload)
    pub fn compress(&mut self, handle: DocumentHandle) -> Result<(), EngineError> {
        let record = self.record_mut(handle)?;
        record.doc.compress();
        record.mark_dirty();
        Ok(())
    }

    /// Drop a document from the store
    pub fn release(&mut self, handle: DocumentHandle) -> Result<(), EngineError> {
        self.docs
            .remove(&handle)
            .map(|_| ())
            .ok_or(EngineError::InvalidHandle(handle.raw()))
    }

    pub fn is_open(&self, handle: DocumentHandle) -> bool {
        self.docs.contains_key(&handle)
    }

    pub fn open_documents(&self) -> Vec<DocumentHandle> {
        self.docs.keys().copied().collect()
    }

    /// Monotonic revision, bumped by every mutation
    pub fn revision(&self, handle: DocumentHandle) -> Result<u64, EngineError> {
        Ok(self.record(handle)?.revision)
    }

    pub fn is_encrypted(&self, handle: DocumentHandle) -> Result<bool, EngineError> {
        Ok(self.record(handle)?.encrypted)
    }

    pub fn page_count(&self, handle: DocumentHandle) -> Result<u32, EngineError> {
        Ok(page_object_ids(&self.record(handle)?.doc).len() as u32)
    }

    /// Snapshot of every page's id, order, size and rotation
    pub fn page_descriptors(
        &self,
        handle: DocumentHandle,
    ) -> Result<Vec<PageDescriptor>, EngineError> {
        let doc = &self.record(handle)?.doc;
        let mut descriptors = Vec::new();

        for (index, oid) in page_object_ids(doc).into_iter().enumerate() {
            let dict = doc.get_dictionary(oid)?;
            let (width, height) = media_box_size(doc, dict);
            let rotation = dict
                .get(b"Rotate")
                .ok()
                .and_then(|obj| resolve(doc, obj).as_i64().ok())
                .and_then(|angle| Rotation::from_degrees(angle).ok())
                .unwrap_or(Rotation::R0);

            descriptors.push(PageDescriptor {
                id: oid.into(),
                index: index as u32,
                width,
                height,
                rotation,
            });
        }

        Ok(descriptors)
    }

    /// Resolve a 1-based page number to its stable id
    pub fn page_id_at(
        &self,
        handle: DocumentHandle,
        page_number: u32,
    ) -> Result<PageId, EngineError> {
        let pages = page_object_ids(&self.record(handle)?.doc);
        let page_count = pages.len() as u32;
        if page_number == 0 || page_number > page_count {
            return Err(EngineError::PageOutOfRange {
                page: page_number,
                page_count,
            });
        }
        Ok(pages[(page_number - 1) as usize].into())
    }

    /// Document information from the Info dictionary
    pub fn metadata(&self, handle: DocumentHandle) -> Result<DocumentMetadata, EngineError> {
        let record = self.record(handle)?;
        let doc = &record.doc;
        let mut metadata = DocumentMetadata {
            page_count: page_object_ids(doc).len() as u32,
            ..Default::default()
        };

        if let Some(info) = doc
            .trailer
            .get(b"Info")
            .ok()
            .and_then(|obj| obj.as_reference().ok())
            .and_then(|oid| doc.get_dictionary(oid).ok())
        {
            metadata.title = info_string(info, b"Title");
            metadata.author = info_string(info, b"Author");
            metadata.subject = info_string(info, b"Subject");
            metadata.creator = info_string(info, b"Creator");
            metadata.producer = info_string(info, b"Producer");
        }

        Ok(metadata)
    }

    /// Raw content stream bytes of a page
    pub fn page_content(
        &self,
        handle: DocumentHandle,
        page_id: PageId,
    ) -> Result<Vec<u8>, EngineError> {
        let doc = &self.record(handle)?.doc;
        let oid = page_id.object_id();
        if !page_object_ids(doc).contains(&oid) {
            return Err(EngineError::UnknownPage(page_id));
        }
        Ok(doc.get_page_content(oid)?)
    }

    /// Append drawing operators after the page's existing content
    ///
    /// The original content is wrapped in `q`/`Q` so its final graphics
    /// state cannot leak into the appended operators.
    pub fn append_page_content(
        &mut self,
        handle: DocumentHandle,
        page_id: PageId,
        operators: &[u8],
    ) -> Result<(), EngineError> {
        let record = self.record_mut(handle)?;
        let oid = page_id.object_id();
        if !page_object_ids(&record.doc).contains(&oid) {
            return Err(EngineError::UnknownPage(page_id));
        }

        let original = record.doc.get_page_content(oid)?;
        let mut content = Vec::with_capacity(original.len() + operators.len() + 8);
        content.extend_from_slice(b"q\n");
        content.extend_from_slice(&original);
        content.extend_from_slice(b"\nQ\n");
        content.extend_from_slice(operators);

        record.doc.change_page_content(oid, content)?;
        record.mark_dirty();
        Ok(())
    }

    /// Replace a page's content stream wholesale
    pub fn replace_page_content(
        &mut self,
        handle: DocumentHandle,
        page_id: PageId,
        content: Vec<u8>,
    ) -> Result<(), EngineError> {
        let record = self.record_mut(handle)?;
        let oid = page_id.object_id();
        if !page_object_ids(&record.doc).contains(&oid) {
            return Err(EngineError::UnknownPage(page_id));
        }

        record.doc.change_page_content(oid, content)?;
        record.mark_dirty();
        Ok(())
    }

    /// Register a Type1 base font in the page's resources, returning the
    /// resource name usable in a `Tf` operator
    ///
    /// Reuses an existing entry with the same base font when present.
    pub fn ensure_font_resource(
        &mut self,
        handle: DocumentHandle,
        page_id: PageId,
        base_font: &str,
    ) -> Result<String, EngineError> {
        let record = self.record_mut(handle)?;
        let oid = page_id.object_id();
        if !page_object_ids(&record.doc).contains(&oid) {
            return Err(EngineError::UnknownPage(page_id));
        }

        let mut existing_keys: Vec<Vec<u8>> = Vec::new();
        {
            let doc = &record.doc;
            let page_dict = doc.get_dictionary(oid)?;
            if let Some(fonts) = page_dict
                .get(b"Resources")
                .ok()
                .map(|obj| resolve(doc, obj))
                .and_then(|obj| obj.as_dict().ok())
                .and_then(|res| res.get(b"Font").ok())
                .map(|obj| resolve(doc, obj))
                .and_then(|obj| obj.as_dict().ok())
            {
                for (key, value) in fonts.iter() {
                    existing_keys.push(key.clone());
                    let font_dict = match resolve(doc, value).as_dict() {
                        Ok(dict) => dict,
                        Err(_) => continue,
                    };
                    if let Ok(name) = font_dict.get(b"BaseFont").and_then(Object::as_name) {
                        if name == base_font.as_bytes() {
                            return Ok(String::from_utf8_lossy(key).into_owned());
                        }
                    }
                }
            }
        }

        let mut n = existing_keys.len();
        let key = loop {
            let candidate = format!("FS{n}");
            if !existing_keys.iter().any(|k| k == candidate.as_bytes()) {
                break candidate;
            }
            n += 1;
        };

        let font_id = record.doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => base_font,
        });

        let page_dict = record.doc.get_object_mut(oid)?.as_dict_mut()?;
        if page_dict.get(b"Resources").is_err() {
            page_dict.set("Resources", Object::Dictionary(Dictionary::new()));
        }
        let resources = page_dict.get_mut(b"Resources")?.as_dict_mut()?;
        if resources.get(b"Font").is_err() {
            resources.set("Font", Object::Dictionary(Dictionary::new()));
        }
        resources
            .get_mut(b"Font")?
            .as_dict_mut()?
            .set(key.as_bytes(), Object::Reference(font_id));

        record.mark_dirty();
        Ok(key)
    }

    fn register(&mut self, doc: Document, encrypted: bool) -> DocumentHandle {
        self.next_handle += 1;
        let handle = DocumentHandle(self.next_handle);
        self.docs.insert(
            handle,
            DocumentRecord {
                doc,
                revision: 0,
                serialized: None,
                encrypted,
            },
        );
        handle
    }

    fn record(&self, handle: DocumentHandle) -> Result<&DocumentRecord, EngineError> {
        self.docs
            .get(&handle)
            .ok_or(EngineError::InvalidHandle(handle.raw()))
    }

    fn record_mut(&mut self, handle: DocumentHandle) -> Result<&mut DocumentRecord, EngineError> {
        self.docs
            .get_mut(&handle)
            .ok_or(EngineError::InvalidHandle(handle.raw()))
    }
}

/// Page object ids in current page order
pub(crate) fn page_object_ids(doc: &Document) -> Vec<ObjectId> {
    doc.get_pages().into_values().collect()
}

/// Follow a reference to its object; non-references pass through
pub(crate) fn resolve<'a>(doc: &'a Document, object: &'a Object) -> &'a Object {
    match object.as_reference() {
        Ok(oid) => doc.get_object(oid).unwrap_or(object),
        Err(_) => object,
    }
}

fn info_string(dict: &Dictionary, key: &[u8]) -> Option<String> {
    match dict.get(key) {
        Ok(Object::String(bytes, _)) => Some(String::from_utf8_lossy(bytes).into_owned()),
        _ => None,
    }
}

/// Page size from MediaBox, defaulting to US Letter when absent/malformed
pub(crate) fn media_box_size(doc: &Document, page_dict: &Dictionary) -> (f32, f32) {
    page_dict
        .get(b"MediaBox")
        .ok()
        .map(|obj| resolve(doc, obj))
        .and_then(|obj| obj.as_array().ok())
        .and_then(|array| {
            if array.len() != 4 {
                return None;
            }
            let x0 = array[0].as_float().ok()?;
            let y0 = array[1].as_float().ok()?;
            let x1 = array[2].as_float().ok()?;
            let y1 = array[3].as_float().ok()?;
            Some(((x1 - x0).abs(), (y1 - y0).abs()))
        })
        .unwrap_or((612.0, 792.0))
}

const INHERITABLE_PAGE_KEYS: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Flatten the page tree to a single Pages node
///
/// Inheritable attributes are copied down onto each page first, so nothing
/// is lost when intermediate nodes disappear. After this, pages can be
/// reordered by rewriting one Kids array.
fn normalize_page_tree(doc: &mut Document) -> Result<(), EngineError> {
    let pages = page_object_ids(doc);

    let mut pending: Vec<(ObjectId, Vec<u8>, Object)> = Vec::new();
    for &oid in &pages {
        let dict = doc.get_dictionary(oid)?;
        for key in INHERITABLE_PAGE_KEYS {
            if dict.get(key).is_ok() {
                // Inline a referenced Resources dict so later font
                // registration can mutate it in place.
                if key == b"Resources" {
                    if let Ok(obj) = dict.get(key) {
                        if obj.as_reference().is_ok() {
                            pending.push((oid, key.to_vec(), resolve(doc, obj).clone()));
                        }
                    }
                }
                continue;
            }
            if let Some(value) = inherited_value(doc, dict, key) {
                pending.push((oid, key.to_vec(), value));
            }
        }
    }

    for (oid, key, value) in pending {
        doc.get_object_mut(oid)?.as_dict_mut()?.set(key, value);
    }

    rebuild_page_tree(doc, &pages)
}

/// Walk the Parent chain looking for an inherited attribute
fn inherited_value(doc: &Document, page_dict: &Dictionary, key: &[u8]) -> Option<Object> {
    let mut dict = page_dict;
    for _ in 0..32 {
        let parent_id = dict.get(b"Parent").ok()?.as_reference().ok()?;
        dict = doc.get_dictionary(parent_id).ok()?;
        if let Ok(value) = dict.get(key) {
            return Some(resolve(doc, value).clone());
        }
    }
    None
}

/// Point the catalog's Pages node at exactly the given pages, in order
fn rebuild_page_tree(doc: &mut Document, page_ids: &[ObjectId]) -> Result<(), EngineError> {
    let root_id = doc.trailer.get(b"Root")?.as_reference()?;
    let pages_id = doc
        .get_dictionary(root_id)?
        .get(b"Pages")?
        .as_reference()?;

    for &oid in page_ids {
        doc.get_object_mut(oid)?
            .as_dict_mut()?
            .set("Parent", Object::Reference(pages_id));
    }

    let kids: Vec<Object> = page_ids.iter().map(|&id| Object::Reference(id)).collect();
    let count = page_ids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );

    Ok(())
}

/// Move a source document's objects into `dest`, returning its page ids
/// (renumbered) in page order
fn absorb_document(dest: &mut Document, mut src: Document) -> Vec<ObjectId> {
    src.renumber_objects_with(dest.max_id + 1);
    let page_ids = page_object_ids(&src);
    dest.max_id = src.max_id;
    dest.objects.extend(src.objects);
    page_ids
}

/// Build a fresh Pages/Catalog pair over the collected pages
fn assemble_catalog(dest: &mut Document, page_ids: &[ObjectId]) {
    let pages_id = dest.new_object_id();

    for &oid in page_ids {
        if let Ok(dict) = dest
            .get_object_mut(oid)
            .and_then(|object| object.as_dict_mut())
        {
            dict.set("Parent", Object::Reference(pages_id));
        }
    }

    let kids: Vec<Object> = page_ids.iter().map(|&id| Object::Reference(id)).collect();
    let count = page_ids.len() as i64;
    dest.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );

    let catalog_id = dest.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => Object::Reference(pages_id),
    });
    dest.trailer.set("Root", Object::Reference(catalog_id));
    dest.prune_objects();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_pages(sizes: &[(f32, f32)]) -> (DocumentStore, DocumentHandle) {
        let mut store = DocumentStore::new();
        let handle = store.create(sizes).expect("create should succeed");
        (store, handle)
    }

    fn letter_pages(n: usize) -> Vec<(f32, f32)> {
        vec![(612.0, 792.0); n]
    }

    #[test]
    fn test_create_and_page_count() {
        let (store, handle) = store_with_pages(&letter_pages(3));
        assert_eq!(store.page_count(handle).unwrap(), 3);
    }

    #[test]
    fn test_load_round_trip_preserves_geometry() {
        let (mut store, handle) = store_with_pages(&[(612.0, 792.0), (200.0, 400.0)]);
        let page2 = store.page_id_at(handle, 2).unwrap();
        store.rotate_page(handle, page2, Rotation::R90).unwrap();

        let bytes = store.serialize(handle).unwrap();
        let reloaded = store.load(&bytes).expect("reload should succeed");

        let descriptors = store.page_descriptors(reloaded).unwrap();
        assert_eq!(descriptors.len(), 2);
        assert_eq!(descriptors[0].width, 612.0);
        assert_eq!(descriptors[0].height, 792.0);
        assert_eq!(descriptors[0].rotation, Rotation::R0);
        assert_eq!(descriptors[1].width, 200.0);
        assert_eq!(descriptors[1].height, 400.0);
        assert_eq!(descriptors[1].rotation, Rotation::R90);
    }

    #[test]
    fn test_load_rejects_garbage() {
        let mut store = DocumentStore::new();
        let err = store.load(b"not a pdf at all").unwrap_err();
        assert!(matches!(err, EngineError::CorruptDocument(_)));
    }

    #[test]
    fn test_load_classifies_encrypted_garbage() {
        let mut store = DocumentStore::new();
        let err = store.load(b"%PDF-1.5 /Encrypt garbage").unwrap_err();
        assert!(matches!(err, EngineError::EncryptedDocument));
    }

    #[test]
    fn test_reorder_is_a_bijection() {
        let (mut store, handle) = store_with_pages(&letter_pages(4));
        let ids: Vec<PageId> = store
            .page_descriptors(handle)
            .unwrap()
            .iter()
            .map(|d| d.id)
            .collect();

        // Name only two pages; the other two must be appended in their
        // original relative order.
        store
            .reorder_pages(handle, &[ids[2], ids[0]])
            .expect("reorder should succeed");

        let after: Vec<PageId> = store
            .page_descriptors(handle)
            .unwrap()
            .iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(after, vec![ids[2], ids[0], ids[1], ids[3]]);
    }

    #[test]
    fn test_reorder_unknown_ids_fails() {
        let (mut store, handle) = store_with_pages(&letter_pages(2));
        let err = store
            .reorder_pages(handle, &[PageId(9999, 0)])
            .unwrap_err();
        assert!(matches!(err, EngineError::NoMatchingPages));
    }

    #[test]
    fn test_delete_pages() {
        let (mut store, handle) = store_with_pages(&letter_pages(3));
        let ids: Vec<PageId> = store
            .page_descriptors(handle)
            .unwrap()
            .iter()
            .map(|d| d.id)
            .collect();

        store.delete_pages(handle, &[ids[1]]).unwrap();

        let after: Vec<PageId> = store
            .page_descriptors(handle)
            .unwrap()
            .iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(after, vec![ids[0], ids[2]]);
    }

    #[test]
    fn test_delete_all_pages_fails_and_leaves_bytes_identical() {
        let (mut store, handle) = store_with_pages(&letter_pages(2));
        let ids: Vec<PageId> = store
            .page_descriptors(handle)
            .unwrap()
            .iter()
            .map(|d| d.id)
            .collect();

        let before = store.serialize(handle).unwrap();
        let err = store.delete_pages(handle, &ids).unwrap_err();
        assert!(matches!(err, EngineError::CannotDeleteAllPages));

        let after = store.serialize(handle).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_extract_pages_in_given_order() {
        let (mut store, handle) = store_with_pages(&[(100.0, 100.0), (200.0, 200.0), (300.0, 300.0)]);
        let ids: Vec<PageId> = store
            .page_descriptors(handle)
            .unwrap()
            .iter()
            .map(|d| d.id)
            .collect();

        let extracted = store.extract_pages(handle, &[ids[2], ids[0]]).unwrap();

        let descriptors = store.page_descriptors(extracted).unwrap();
        assert_eq!(descriptors.len(), 2);
        assert_eq!(descriptors[0].width, 300.0);
        assert_eq!(descriptors[1].width, 100.0);

        // The source document is untouched.
        assert_eq!(store.page_count(handle).unwrap(), 3);
    }

    #[test]
    fn test_rotation_is_absolute_not_cumulative() {
        let (mut store, handle) = store_with_pages(&letter_pages(1));
        let page = store.page_id_at(handle, 1).unwrap();

        store.rotate_page(handle, page, Rotation::R90).unwrap();
        store.rotate_page(handle, page, Rotation::R90).unwrap();
        store.rotate_page(handle, page, Rotation::R180).unwrap();
        store.rotate_page(handle, page, Rotation::R0).unwrap();

        let descriptors = store.page_descriptors(handle).unwrap();
        assert_eq!(descriptors[0].rotation, Rotation::R0);
    }

    #[test]
    fn test_rotate_unknown_page_fails() {
        let (mut store, handle) = store_with_pages(&letter_pages(1));
        let err = store
            .rotate_page(handle, PageId(12345, 0), Rotation::R90)
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownPage(_)));
    }

    #[test]
    fn test_merge_concatenates_in_handle_order() {
        let mut store = DocumentStore::new();
        let a = store.create(&[(100.0, 100.0), (110.0, 110.0)]).unwrap();
        let b = store.create(&[(200.0, 200.0)]).unwrap();

        let merged = store.merge_documents(&[b, a]).unwrap();

        let descriptors = store.page_descriptors(merged).unwrap();
        assert_eq!(descriptors.len(), 3);
        assert_eq!(descriptors[0].width, 200.0);
        assert_eq!(descriptors[1].width, 100.0);
        assert_eq!(descriptors[2].width, 110.0);
    }

    #[test]
    fn test_merge_preserves_rotation() {
        let mut store = DocumentStore::new();
        let a = store.create(&letter_pages(1)).unwrap();
        let page = store.page_id_at(a, 1).unwrap();
        store.rotate_page(a, page, Rotation::R270).unwrap();

        let merged = store.merge_documents(&[a]).unwrap();
        let descriptors = store.page_descriptors(merged).unwrap();
        assert_eq!(descriptors[0].rotation, Rotation::R270);
    }

    #[test]
    fn test_merge_survives_round_trip() {
        let mut store = DocumentStore::new();
        let a = store.create(&[(100.0, 100.0)]).unwrap();
        let b = store.create(&[(200.0, 200.0)]).unwrap();
        let merged = store.merge_documents(&[a, b]).unwrap();

        let bytes = store.serialize(merged).unwrap();
        let reloaded = store.load(&bytes).unwrap();
        assert_eq!(store.page_count(reloaded).unwrap(), 2);
    }

    #[test]
    fn test_merge_requires_documents() {
        let mut store = DocumentStore::new();
        let err = store.merge_documents(&[]).unwrap_err();
        assert!(matches!(err, EngineError::EmptyMerge));
    }

    #[test]
    fn test_serialize_is_memoized_until_mutation() {
        let (mut store, handle) = store_with_pages(&letter_pages(1));

        let rev0 = store.revision(handle).unwrap();
        let first = store.serialize(handle).unwrap();
        let second = store.serialize(handle).unwrap();
        assert_eq!(first, second);
        assert_eq!(store.revision(handle).unwrap(), rev0);

        let page = store.page_id_at(handle, 1).unwrap();
        store.rotate_page(handle, page, Rotation::R90).unwrap();
        assert!(store.revision(handle).unwrap() > rev0);
    }

    #[test]
    fn test_page_id_at_out_of_range() {
        let (store, handle) = store_with_pages(&letter_pages(2));
        let err = store.page_id_at(handle, 3).unwrap_err();
        assert!(matches!(
            err,
            EngineError::PageOutOfRange {
                page: 3,
                page_count: 2
            }
        ));
        assert!(store.page_id_at(handle, 0).is_err());
    }

    #[test]
    fn test_release_invalidates_handle() {
        let (mut store, handle) = store_with_pages(&letter_pages(1));
        store.release(handle).unwrap();

        assert!(!store.is_open(handle));
        let err = store.page_count(handle).unwrap_err();
        assert!(matches!(err, EngineError::InvalidHandle(_)));
        assert!(store.release(handle).is_err());
    }

    #[test]
    fn test_append_page_content_preserves_original() {
        let (mut store, handle) = store_with_pages(&letter_pages(1));
        let page = store.page_id_at(handle, 1).unwrap();

        store
            .replace_page_content(handle, page, b"BT /F1 12 Tf (old) Tj ET".to_vec())
            .unwrap();
        store
            .append_page_content(handle, page, b"1 1 1 rg 10 10 50 20 re f")
            .unwrap();

        let content = store.page_content(handle, page).unwrap();
        let text = String::from_utf8_lossy(&content);
        assert!(text.contains("(old) Tj"));
        assert!(text.contains("re f"));
        // Appended operators come after the protected original.
        assert!(text.find("Tj").unwrap() < text.find("re f").unwrap());
    }

    #[test]
    fn test_ensure_font_resource_registers_once() {
        let (mut store, handle) = store_with_pages(&letter_pages(1));
        let page = store.page_id_at(handle, 1).unwrap();

        let first = store
            .ensure_font_resource(handle, page, "Helvetica-Bold")
            .unwrap();
        let second = store
            .ensure_font_resource(handle, page, "Helvetica-Bold")
            .unwrap();
        assert_eq!(first, second);

        let other = store
            .ensure_font_resource(handle, page, "Courier")
            .unwrap();
        assert_ne!(first, other);
    }

    #[test]
    fn test_metadata_reports_page_count() {
        let (store, handle) = store_with_pages(&letter_pages(5));
        let metadata = store.metadata(handle).unwrap();
        assert_eq!(metadata.page_count, 5);
        assert!(metadata.title.is_none());
    }

    #[test]
    fn test_rotation_normalization() {
        assert_eq!(Rotation::from_degrees(450).unwrap(), Rotation::R90);
        assert_eq!(Rotation::from_degrees(-90).unwrap(), Rotation::R270);
        assert!(Rotation::from_degrees(45).is_err());
    }
}
