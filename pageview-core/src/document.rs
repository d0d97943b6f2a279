//! The document-source capability the viewport consumes. Decoding,
//! rasterization and link extraction live behind [`DocumentSource`].

use std::path::{Path, PathBuf};

use anyhow::Result;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geometry::{PointF, RectF, Rotation, Size, SizeF};

pub type DocumentId = Uuid;

static DOCUMENT_NAMESPACE: Lazy<Uuid> = Lazy::new(|| {
    Uuid::parse_str("3f6d0c7e-2b1a-5e49-9d8c-6a41f0b2c7d3").expect("valid namespace UUID")
});

/// Stable id for a document path, used to key persisted view state.
pub fn document_id_for_path(path: &Path) -> DocumentId {
    let resolved = path
        .canonicalize()
        .or_else(|_| {
            if path.is_absolute() {
                Ok(path.to_path_buf())
            } else {
                std::env::current_dir().map(|cwd| cwd.join(path))
            }
        })
        .unwrap_or_else(|_| path.to_path_buf());
    Uuid::new_v5(&*DOCUMENT_NAMESPACE, resolved.to_string_lossy().as_bytes())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DocumentInfo {
    pub id: DocumentId,
    pub path: PathBuf,
    pub page_count: usize,
    pub metadata: DocumentMetadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderFlags {
    pub annotations: bool,
    pub dark_mode: bool,
}

impl Default for RenderFlags {
    fn default() -> Self {
        Self {
            annotations: true,
            dark_mode: false,
        }
    }
}

/// Rasterize one page into a `width`×`height` pixel box. The box is already
/// oriented for `rotation`.
#[derive(Debug, Clone, Copy)]
pub struct RenderRequest {
    pub page_index: usize,
    pub width: u32,
    pub height: u32,
    pub dpi_x: f32,
    pub dpi_y: f32,
    pub rotation: Rotation,
    pub flags: RenderFlags,
}

/// RGBA8 bitmap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl RenderImage {
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let mut pixels = Vec::with_capacity(width as usize * height as usize * 4);
        for _ in 0..(width as usize * height as usize) {
            pixels.extend_from_slice(&rgba);
        }
        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * 4;
        self.pixels
            .get(idx..idx + 4)
            .map(|p| [p[0], p[1], p[2], p[3]])
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkAction {
    GoTo { page: usize },
    Uri { uri: String },
}

/// A clickable region as reported by the source, in native document space.
#[derive(Debug, Clone, PartialEq)]
pub struct PageLink {
    pub bounds: RectF,
    pub action: LinkAction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutlineItem {
    pub title: String,
    pub page_index: usize,
    pub depth: usize,
}

/// A decoded, paginated document.
///
/// "Device space" below is a page's unrotated top-left-origin space in
/// document units; "document space" is whatever native space the source
/// uses for persisted coordinates.
pub trait DocumentSource: Send + Sync {
    fn info(&self) -> &DocumentInfo;

    fn page_count(&self) -> usize {
        self.info().page_count
    }

    /// Intrinsic page sizes in document units, one per page.
    fn page_sizes(&self) -> &[SizeF];

    fn render_page(&self, request: &RenderRequest) -> Result<RenderImage>;

    fn point_to_document(&self, page: usize, point: PointF) -> PointF;
    fn point_from_document(&self, page: usize, point: PointF) -> PointF;
    fn rect_to_document(&self, page: usize, rect: RectF) -> RectF;
    fn rect_from_document(&self, page: usize, rect: RectF) -> RectF;

    fn page_links(&self, page: usize, pixel_size: Size) -> Result<Vec<PageLink>>;

    fn outline(&self) -> Result<Vec<OutlineItem>> {
        Ok(Vec::new())
    }
}

#[async_trait::async_trait]
pub trait DocumentProvider: Send + Sync {
    async fn open(&self, path: &Path) -> Result<Box<dyn DocumentSource>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn document_id_is_stable_for_same_path() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("sample.pdf");
        std::fs::write(&file_path, b"dummy").unwrap();

        assert_eq!(
            document_id_for_path(&file_path),
            document_id_for_path(&file_path)
        );
        assert_ne!(
            document_id_for_path(&file_path),
            document_id_for_path(&dir.path().join("other.pdf"))
        );
    }

    #[test]
    fn filled_image_reports_pixels() {
        let image = RenderImage::filled(2, 3, [1, 2, 3, 4]);
        assert_eq!(image.pixels.len(), 24);
        assert_eq!(image.pixel(1, 2), Some([1, 2, 3, 4]));
        assert_eq!(image.pixel(2, 0), None);
    }
}
