//! Document engine
//!
//! Owns loaded PDF documents and exposes page-level mutation (merge,
//! reorder, delete, extract, rotate), lazy memoized serialization, and
//! byte-level access to page content streams. The `content` module parses
//! and rewrites the raw drawing-operator streams; the `render` module is
//! the seam to an external rasterizer.

pub mod content;
pub mod render;
pub mod store;

pub use content::{Operand, Operator, TextOp};
pub use render::{BlankRenderer, PageRenderer, RenderError, RenderRequest, RgbaImage};
pub use store::{
    DocumentHandle, DocumentMetadata, DocumentStore, EngineError, PageDescriptor, PageId, Rotation,
};
