//! Editor core
//!
//! Document-space state and logic for the visual PDF editor: coordinate
//! transforms, the text layout index, in-place text editing, the
//! annotation model, the editor session aggregate, and auto-save
//! persistence.

pub mod annotation;
pub mod bake;
pub mod coords;
pub mod font_metrics;
pub mod persist;
pub mod session;
pub mod text_edit;
pub mod text_index;

pub use annotation::{
    Annotation, AnnotationCollection, AnnotationId, AnnotationKind, Color, Draft, GroupId,
};
pub use coords::{document_to_surface, surface_to_document, PagePoint, SurfacePoint, Viewport};
pub use font_metrics::{measure_text, standard_font_name, FontFamily, TextAlign};
pub use persist::{PersistError, Snapshot, SnapshotStore};
pub use session::{EditorSession, SessionError};
pub use text_edit::{EditError, TextFormat};
pub use text_index::{GlyphItem, RunId, TextIndex, TextRun};
