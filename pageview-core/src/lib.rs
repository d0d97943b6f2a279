//! Layout, coordinate mapping, page caching and overlay editing for a
//! scrollable, zoomable view over a paginated document.

pub mod cache;
pub mod config;
pub mod document;
pub mod geometry;
pub mod interaction;
pub mod layout;
pub mod overlay;
pub mod paint;
pub mod range;
pub mod state;
pub mod view;
pub mod viewport;

#[cfg(test)]
mod test_support;

use thiserror::Error;

pub use config::{InteractionConfig, LayoutConfig, RenderConfig, ScrollbarMetrics, Theme, ViewerConfig};
pub use document::{
    document_id_for_path, DocumentId, DocumentInfo, DocumentMetadata, DocumentProvider,
    DocumentSource, LinkAction, OutlineItem, PageLink, RenderFlags, RenderImage, RenderRequest,
};
pub use geometry::{Insets, Point, PointF, Rect, RectF, Rotation, Size, SizeF};
pub use interaction::{CursorGlyph, EdgeMask, InteractionMode, PointerButton, PointerState};
pub use layout::ZoomMode;
pub use overlay::{FieldContent, FieldId, ImagePayload, Marker, StampManifest, StampPlacement};
pub use paint::{LineStyle, PaintReport, Rgba, Stroke, Surface};
pub use range::PageRangeSource;
pub use state::{FileStateStore, MemoryStateStore, PersistedViewState, StateStore};
pub use view::{PageView, ViewCommand, ViewEvent};
pub use viewport::{DocumentPoint, DocumentRect};

#[derive(Debug, Error)]
pub enum ViewerError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("failed to render page {page}")]
    RenderFailure {
        page: usize,
        #[source]
        source: anyhow::Error,
    },
}

impl ViewerError {
    pub fn invalid(message: impl Into<String>) -> Self {
        ViewerError::InvalidArgument(message.into())
    }

    pub fn page_out_of_range(page: usize, page_count: usize) -> Self {
        ViewerError::InvalidArgument(format!(
            "page {page} out of range (document has {page_count} pages)"
        ))
    }
}

pub type ViewerResult<T> = std::result::Result<T, ViewerError>;
