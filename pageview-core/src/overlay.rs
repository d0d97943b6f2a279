//! Page-anchored overlay fields, read-only markers, and the placements
//! handed to a stamper.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::document::RenderImage;
use crate::geometry::{Rect, RectF};
use crate::paint::Rgba;
use crate::state::write_json_atomic;
use crate::viewport::Viewport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldId(pub usize);

#[derive(Debug, Clone)]
pub struct ImagePayload {
    pub image: Arc<RenderImage>,
    /// File the image was loaded from, if any.
    pub origin: Option<PathBuf>,
}

impl ImagePayload {
    pub fn new(image: RenderImage) -> Self {
        Self {
            image: Arc::new(image),
            origin: None,
        }
    }

    pub fn with_origin(mut self, origin: impl Into<PathBuf>) -> Self {
        self.origin = Some(origin.into());
        self
    }
}

#[derive(Debug, Clone, Default)]
pub enum FieldContent {
    #[default]
    Empty,
    Image(ImagePayload),
}

impl FieldContent {
    pub fn image(&self) -> Option<&ImagePayload> {
        match self {
            FieldContent::Image(payload) => Some(payload),
            FieldContent::Empty => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OverlayField {
    pub page: usize,
    /// Authoritative position, page-local native document space.
    pub document_rect: RectF,
    /// Derived from `document_rect`; layout space.
    pub layout_rect: Rect,
    /// What a document→layout→document round trip adds to `document_rect`.
    pub drift: RectF,
    pub content: FieldContent,
    pub hovered: bool,
    pub deleted: bool,
}

/// A filled field ready for stamping. `rect.y` is the top edge in native
/// document space with the vertical axis increasing upward.
#[derive(Debug, Clone)]
pub struct StampPlacement {
    pub page: usize,
    pub rect: RectF,
    pub image: Arc<RenderImage>,
    pub origin: Option<PathBuf>,
}

impl StampPlacement {
    pub fn bottom(&self) -> f32 {
        self.rect.y - self.rect.height
    }
}

/// Fields in insertion order. Ids are indices and stay valid for the life
/// of the store; deletion only flags a field.
#[derive(Debug, Default)]
pub struct FieldStore {
    fields: Vec<OverlayField>,
}

impl FieldStore {
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, id: FieldId) -> Option<&OverlayField> {
        self.fields.get(id.0)
    }

    /// Every field, deleted ones included.
    pub fn fields(&self) -> impl Iterator<Item = (FieldId, &OverlayField)> {
        self.fields
            .iter()
            .enumerate()
            .map(|(index, field)| (FieldId(index), field))
    }

    pub fn active_fields(&self) -> impl Iterator<Item = (FieldId, &OverlayField)> {
        self.fields().filter(|(_, field)| !field.deleted)
    }

    pub fn clear(&mut self) {
        self.fields.clear();
    }

    /// Adds a field from a page-local document rectangle.
    pub fn insert(
        &mut self,
        viewport: &Viewport,
        page: usize,
        document_rect: RectF,
        content: FieldContent,
    ) -> Option<FieldId> {
        let mut field = OverlayField {
            page,
            document_rect,
            layout_rect: Rect::default(),
            drift: RectF::default(),
            content,
            hovered: false,
            deleted: false,
        };
        derive(viewport, &mut field)?;
        self.fields.push(field);
        Some(FieldId(self.fields.len() - 1))
    }

    /// Adds a field from a layout-space rectangle on `page`.
    pub fn insert_from_layout(
        &mut self,
        viewport: &Viewport,
        page: usize,
        layout_rect: Rect,
        content: FieldContent,
    ) -> Option<FieldId> {
        let document_rect = viewport.layout_rect_to_document(page, layout_rect.normalized())?;
        self.insert(viewport, page, document_rect, content)
    }

    /// Re-derives every field's layout rectangle and drift after the page
    /// bounds changed.
    pub fn rebuild(&mut self, viewport: &Viewport) {
        for field in &mut self.fields {
            if derive(viewport, field).is_none() {
                field.layout_rect = Rect::default();
            }
        }
    }

    /// Stores a new layout rectangle for `id`, compensating for drift.
    pub fn commit_layout_rect(&mut self, viewport: &Viewport, id: FieldId, layout_rect: Rect) -> bool {
        let Some(field) = self.fields.get_mut(id.0) else {
            return false;
        };
        let Some(converted) = viewport.layout_rect_to_document(field.page, layout_rect) else {
            return false;
        };
        field.document_rect = converted.minus(&field.drift);
        derive(viewport, field).is_some()
    }

    pub fn clear_hover(&mut self) {
        for field in &mut self.fields {
            field.hovered = false;
        }
    }

    pub fn set_hovered(&mut self, id: FieldId) {
        if let Some(field) = self.fields.get_mut(id.0) {
            field.hovered = true;
        }
    }

    pub fn hovered(&self) -> Option<FieldId> {
        self.active_fields()
            .find(|(_, field)| field.hovered)
            .map(|(id, _)| id)
    }

    pub fn mark_deleted(&mut self, id: FieldId) -> bool {
        match self.fields.get_mut(id.0) {
            Some(field) if !field.deleted => {
                field.deleted = true;
                field.hovered = false;
                debug!(field = id.0, page = field.page, "field deleted");
                true
            }
            _ => false,
        }
    }

    /// Non-deleted fields carrying an image.
    pub fn placements(&self) -> Vec<StampPlacement> {
        self.active_fields()
            .filter_map(|(_, field)| {
                let payload = field.content.image()?;
                let rect = field.document_rect;
                Some(StampPlacement {
                    page: field.page,
                    rect: RectF::new(rect.x, rect.y + rect.height, rect.width, rect.height),
                    image: Arc::clone(&payload.image),
                    origin: payload.origin.clone(),
                })
            })
            .collect()
    }
}

fn derive(viewport: &Viewport, field: &mut OverlayField) -> Option<()> {
    let layout = viewport.layout_rect_from_document(field.page, field.document_rect)?;
    let round_trip = viewport.layout_rect_to_document(field.page, layout)?;
    field.layout_rect = layout;
    field.drift = round_trip.delta(&field.document_rect);
    Some(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub page: usize,
    pub x: f32,
    /// Top edge.
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub image: Option<PathBuf>,
}

/// Placements in a form an external stamper can consume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StampManifest {
    pub document: PathBuf,
    pub placements: Vec<ManifestEntry>,
}

impl StampManifest {
    pub fn new(document: impl Into<PathBuf>, placements: &[StampPlacement]) -> Self {
        Self {
            document: document.into(),
            placements: placements
                .iter()
                .map(|placement| ManifestEntry {
                    page: placement.page,
                    x: placement.rect.x,
                    y: placement.rect.y,
                    width: placement.rect.width,
                    height: placement.rect.height,
                    image: placement.origin.clone(),
                })
                .collect(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("failed to encode stamp manifest")
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, self).context("failed to write stamp manifest")
    }

    pub fn read_from(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read manifest {:?}", path))?;
        serde_json::from_str(&raw).with_context(|| format!("failed to decode manifest {:?}", path))
    }
}

/// Read-only highlight rectangle, such as a search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub page: usize,
    /// Native document space.
    pub rect: RectF,
    pub color: Rgba,
    pub fill: Option<Rgba>,
    pub border_width: i32,
}

/// Markers plus a per-page index. The index is only refreshed by
/// [`MarkerStore::rebuild`].
#[derive(Debug, Default)]
pub struct MarkerStore {
    markers: Vec<Marker>,
    buckets: Vec<Vec<usize>>,
    stale: bool,
}

impl MarkerStore {
    pub fn add(&mut self, marker: Marker) {
        self.markers.push(marker);
        self.stale = true;
    }

    pub fn extend(&mut self, markers: impl IntoIterator<Item = Marker>) {
        self.markers.extend(markers);
        self.stale = true;
    }

    pub fn remove(&mut self, index: usize) -> Option<Marker> {
        if index >= self.markers.len() {
            return None;
        }
        self.stale = true;
        Some(self.markers.remove(index))
    }

    pub fn clear(&mut self) {
        self.markers.clear();
        self.stale = true;
    }

    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Re-buckets markers by page. Markers on pages outside `0..page_count`
    /// are kept but never drawn.
    pub fn rebuild(&mut self, page_count: usize) {
        self.buckets = vec![Vec::new(); page_count];
        for (index, marker) in self.markers.iter().enumerate() {
            if let Some(bucket) = self.buckets.get_mut(marker.page) {
                bucket.push(index);
            }
        }
        self.stale = false;
    }

    pub fn on_page(&self, page: usize) -> impl Iterator<Item = &Marker> {
        self.buckets
            .get(page)
            .map(Vec::as_slice)
            .unwrap_or(&[])
            .iter()
            .filter_map(|index| self.markers.get(*index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LayoutConfig, RenderConfig, ScrollbarMetrics};
    use crate::geometry::{Rotation, Size};
    use crate::layout::ZoomMode;
    use crate::test_support::FakeSource;
    use tempfile::tempdir;

    fn viewport() -> Viewport {
        let config = LayoutConfig {
            scrollbars: ScrollbarMetrics::NONE,
            ..LayoutConfig::default()
        };
        let mut viewport = Viewport::new(config, RenderConfig::default(), Size::new(400, 400));
        viewport
            .load(Box::new(FakeSource::uniform(2, 300.0, 400.0)))
            .unwrap();
        viewport.set_zoom_mode(ZoomMode::Explicit).unwrap();
        viewport
    }

    fn payload() -> FieldContent {
        FieldContent::Image(ImagePayload::new(RenderImage::filled(2, 2, [0, 0, 0, 255])).with_origin("/tmp/sig.png"))
    }

    #[test]
    fn layout_rect_follows_rotation() {
        let mut viewport = viewport();
        let mut store = FieldStore::default();
        let id = store
            .insert(&viewport, 0, RectF::new(10.0, 20.0, 100.0, 50.0), FieldContent::Empty)
            .unwrap();
        let upright = store.get(id).unwrap().layout_rect;
        assert_eq!(upright.size(), Size::new(100, 50));

        viewport.set_rotation(Rotation::Rotate90).unwrap();
        store.rebuild(&viewport);
        let turned = store.get(id).unwrap();
        assert_eq!(turned.layout_rect.size(), Size::new(50, 100));
        assert_eq!(turned.document_rect, RectF::new(10.0, 20.0, 100.0, 50.0));
    }

    #[test]
    fn commit_subtracts_drift() {
        let viewport = viewport();
        let mut store = FieldStore::default();
        let id = store
            .insert(&viewport, 0, RectF::new(10.3, 20.6, 99.5, 50.2), FieldContent::Empty)
            .unwrap();
        let field = store.get(id).unwrap().clone();
        assert!(store.commit_layout_rect(&viewport, id, field.layout_rect));
        let committed = store.get(id).unwrap();
        assert!((committed.document_rect.x - field.document_rect.x).abs() < 1e-3);
        assert!((committed.document_rect.width - field.document_rect.width).abs() < 1e-3);
        assert_eq!(committed.layout_rect, field.layout_rect);
    }

    #[test]
    fn deleted_fields_stay_in_store_but_leave_output() {
        let viewport = viewport();
        let mut store = FieldStore::default();
        let kept = store
            .insert(&viewport, 0, RectF::new(0.0, 0.0, 50.0, 20.0), payload())
            .unwrap();
        let dropped = store
            .insert(&viewport, 1, RectF::new(5.0, 5.0, 50.0, 20.0), payload())
            .unwrap();
        store
            .insert(&viewport, 1, RectF::new(5.0, 50.0, 50.0, 20.0), FieldContent::Empty)
            .unwrap();

        assert!(store.mark_deleted(dropped));
        assert!(!store.mark_deleted(dropped));
        assert_eq!(store.len(), 3);
        assert_eq!(store.active_fields().count(), 2);
        assert!(store.fields().any(|(id, field)| id == dropped && field.deleted));

        let placements = store.placements();
        assert_eq!(placements.len(), 1);
        assert_eq!(placements[0].page, store.get(kept).unwrap().page);
        assert_eq!(placements[0].rect.y, 20.0);
        assert_eq!(placements[0].bottom(), 0.0);
    }

    #[test]
    fn manifest_is_written_atomically() {
        let viewport = viewport();
        let mut store = FieldStore::default();
        store
            .insert(&viewport, 1, RectF::new(1.0, 2.0, 30.0, 40.0), payload())
            .unwrap();
        let manifest = StampManifest::new("/docs/contract.pdf", &store.placements());

        let dir = tempdir().unwrap();
        let path = dir.path().join("stamps.json");
        manifest.write_to(&path).unwrap();
        assert!(!dir.path().join("stamps.json.tmp").exists());

        let decoded = StampManifest::read_from(&path).unwrap();
        assert_eq!(decoded, manifest);
        assert_eq!(decoded.placements[0].y, 42.0);
        assert_eq!(decoded.placements[0].image.as_deref(), Some(Path::new("/tmp/sig.png")));
    }

    fn marker(page: usize) -> Marker {
        Marker {
            page,
            rect: RectF::new(0.0, 0.0, 10.0, 10.0),
            color: Rgba::opaque(255, 0, 0),
            fill: None,
            border_width: 1,
        }
    }

    #[test]
    fn markers_are_bucketed_after_rebuild() {
        let mut store = MarkerStore::default();
        store.extend([marker(0), marker(2), marker(2), marker(7)]);
        assert!(store.is_stale());
        assert_eq!(store.on_page(2).count(), 0);

        store.rebuild(3);
        assert!(!store.is_stale());
        assert_eq!(store.on_page(0).count(), 1);
        assert_eq!(store.on_page(1).count(), 0);
        assert_eq!(store.on_page(2).count(), 2);
        assert_eq!(store.on_page(7).count(), 0);
        assert_eq!(store.len(), 4);
    }

    #[test]
    fn removal_marks_index_stale() {
        let mut store = MarkerStore::default();
        store.add(marker(1));
        store.rebuild(2);
        assert_eq!(store.remove(0).map(|m| m.page), Some(1));
        assert!(store.remove(0).is_none());
        store.rebuild(2);
        assert_eq!(store.on_page(1).count(), 0);
    }
}
