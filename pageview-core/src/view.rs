//! The single mutable entry point over viewport, overlays and markers.

use std::path::Path;

use anyhow::Result;
use tracing::{debug, info, instrument};

use crate::config::ViewerConfig;
use crate::document::{DocumentId, DocumentInfo, DocumentProvider, DocumentSource, LinkAction, OutlineItem};
use crate::ViewerResult;
use crate::geometry::{Point, Rect, Size};
use crate::interaction::{CursorGlyph, InteractionMode, PointerButton, PointerMachine, PointerResponse};
use crate::layout::ZoomMode;
use crate::overlay::{
    FieldId, FieldStore, ImagePayload, Marker, MarkerStore, StampManifest, StampPlacement,
};
use crate::paint::{Overlays, PaintReport, RenderDispatcher, Surface};
use crate::state::{PersistedViewState, StateStore};
use crate::viewport::Viewport;

pub const MIN_ZOOM: f64 = 0.1;
pub const MAX_ZOOM: f64 = 10.0;

#[derive(Debug, Clone, PartialEq)]
pub enum ViewCommand {
    ScrollBy { dx: i32, dy: i32 },
    NextPage { count: usize },
    PrevPage { count: usize },
    GotoPage { page: usize },
    LastPage,
    ZoomBy { factor: f64 },
    SetZoom { zoom: f64 },
    SetZoomMode { mode: ZoomMode },
    RotateLeft,
    RotateRight,
    Resize { size: Size },
    ToggleAddOverlay,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewEvent {
    DocumentLoaded(DocumentId),
    RedrawNeeded,
    PageChanged(usize),
    CursorChanged(CursorGlyph),
    ModeChanged { adding: bool },
    FieldCreated(FieldId),
    FieldDeleted(FieldId),
    /// A link whose target is outside the document.
    LinkActivated(LinkAction),
}

pub struct PageView {
    viewport: Viewport,
    fields: FieldStore,
    markers: MarkerStore,
    pointer: PointerMachine,
    dispatcher: RenderDispatcher,
    staged: Option<ImagePayload>,
    events: Vec<ViewEvent>,
    redraw_deferred: bool,
}

impl PageView {
    pub fn new(config: &ViewerConfig, size: Size) -> Self {
        Self {
            viewport: Viewport::new(config.layout, config.render, size),
            fields: FieldStore::default(),
            markers: MarkerStore::default(),
            pointer: PointerMachine::new(config.interaction),
            dispatcher: RenderDispatcher::new(config.theme, config.layout.shade),
            staged: None,
            events: Vec::new(),
            redraw_deferred: false,
        }
    }

    #[instrument(skip(self, provider))]
    pub async fn open_with<P: DocumentProvider + ?Sized>(&mut self, provider: &P, path: &Path) -> Result<()> {
        let source = provider.open(path).await?;
        self.load(source)?;
        Ok(())
    }

    /// Replaces the document. Fields and markers belong to the old document
    /// and are dropped.
    pub fn load(&mut self, source: Box<dyn DocumentSource>) -> ViewerResult<()> {
        let id = source.info().id;
        let pages = source.page_count();
        self.viewport.load(source)?;
        self.fields.clear();
        self.markers.clear();
        self.markers.rebuild(pages);
        self.pointer.set_mode(InteractionMode::Browse);
        info!(%id, pages, "document loaded");
        self.events.push(ViewEvent::DocumentLoaded(id));
        self.request_redraw();
        Ok(())
    }

    pub fn document_info(&self) -> Option<&DocumentInfo> {
        self.viewport.source().map(|source| source.info())
    }

    pub fn outline(&self) -> Result<Vec<OutlineItem>> {
        match self.viewport.source() {
            Some(source) => source.outline(),
            None => Ok(Vec::new()),
        }
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn fields(&self) -> &FieldStore {
        &self.fields
    }

    pub fn markers(&self) -> &MarkerStore {
        &self.markers
    }

    pub fn pointer(&self) -> &PointerMachine {
        &self.pointer
    }

    pub fn current_page(&self) -> usize {
        self.viewport.current_page()
    }

    pub fn take_events(&mut self) -> Vec<ViewEvent> {
        std::mem::take(&mut self.events)
    }

    /// Runs `f` with painting suspended; at most one redraw is requested
    /// when the outermost batch ends.
    pub fn batch<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        self.viewport.suspend_paint();
        let result = f(self);
        if self.viewport.resume_paint() && self.redraw_deferred {
            self.redraw_deferred = false;
            self.events.push(ViewEvent::RedrawNeeded);
        }
        result
    }

    fn request_redraw(&mut self) {
        if self.viewport.is_paint_suspended() {
            self.redraw_deferred = true;
        } else if self.events.last() != Some(&ViewEvent::RedrawNeeded) {
            self.events.push(ViewEvent::RedrawNeeded);
        }
    }

    /// Re-derives everything that depends on page bounds.
    fn geometry_changed(&mut self, page_before: usize) {
        self.fields.rebuild(&self.viewport);
        let page = self.viewport.current_page();
        if page != page_before {
            self.events.push(ViewEvent::PageChanged(page));
        }
        self.request_redraw();
    }

    pub fn apply(&mut self, command: ViewCommand) -> ViewerResult<()> {
        if !self.viewport.is_loaded() {
            if let ViewCommand::Resize { size } = command {
                self.viewport.resize(size)?;
            }
            return Ok(());
        }
        let page_before = self.viewport.current_page();
        let last_page = self.viewport.page_count().saturating_sub(1);
        match command {
            ViewCommand::ScrollBy { dx, dy } => self.viewport.scroll_by(Point::new(dx, dy)),
            ViewCommand::NextPage { count } => self
                .viewport
                .set_current_page(page_before.saturating_add(count).min(last_page)),
            ViewCommand::PrevPage { count } => self
                .viewport
                .set_current_page(page_before.saturating_sub(count)),
            ViewCommand::GotoPage { page } => self.viewport.set_current_page(page),
            ViewCommand::LastPage => self.viewport.set_current_page(last_page),
            ViewCommand::ZoomBy { factor } => {
                let zoom = (self.viewport.zoom() * factor).clamp(MIN_ZOOM, MAX_ZOOM);
                self.viewport.set_zoom(zoom, None)?;
            }
            ViewCommand::SetZoom { zoom } => self.viewport.set_zoom(zoom, None)?,
            ViewCommand::SetZoomMode { mode } => self.viewport.set_zoom_mode(mode)?,
            ViewCommand::RotateLeft => self.viewport.rotate_left()?,
            ViewCommand::RotateRight => self.viewport.rotate_right()?,
            ViewCommand::Resize { size } => self.viewport.resize(size)?,
            ViewCommand::ToggleAddOverlay => {
                self.toggle_add_overlay();
                return Ok(());
            }
        }
        self.geometry_changed(page_before);
        Ok(())
    }

    /// Zooms around a viewport point, e.g. under the mouse.
    pub fn zoom_at(&mut self, factor: f64, focus: Point) -> ViewerResult<()> {
        let page_before = self.viewport.current_page();
        let zoom = (self.viewport.zoom() * factor).clamp(MIN_ZOOM, MAX_ZOOM);
        self.viewport.set_zoom(zoom, Some(focus))?;
        self.geometry_changed(page_before);
        Ok(())
    }

    /// Layout pixels per document unit currently in effect. In the fit modes
    /// the zoom factor multiplies the fitted scale.
    pub fn effective_zoom(&self) -> f64 {
        self.viewport
            .layout()
            .map_or(self.viewport.zoom(), |layout| layout.scale)
    }

    /// Image placed into fields drawn from now on.
    pub fn stage_payload(&mut self, payload: Option<ImagePayload>) {
        self.staged = payload;
        if let InteractionMode::AddOverlay { .. } = self.pointer.mode() {
            self.pointer.set_mode(InteractionMode::AddOverlay {
                staged: self.staged.clone(),
            });
        }
    }

    pub fn is_adding(&self) -> bool {
        matches!(self.pointer.mode(), InteractionMode::AddOverlay { .. })
    }

    fn toggle_add_overlay(&mut self) {
        let adding = !self.is_adding();
        let mode = if adding {
            InteractionMode::AddOverlay {
                staged: self.staged.clone(),
            }
        } else {
            InteractionMode::Browse
        };
        self.pointer.set_mode(mode);
        self.events.push(ViewEvent::ModeChanged { adding });
        self.request_redraw();
    }

    pub fn pointer_down(&mut self, button: PointerButton, point: Point) {
        let cursor_before = self.pointer.cursor();
        let response = self
            .pointer
            .pointer_down(&mut self.viewport, &mut self.fields, button, point);
        self.handle_response(cursor_before, response);
    }

    pub fn pointer_move(&mut self, point: Point) {
        let cursor_before = self.pointer.cursor();
        let response = self
            .pointer
            .pointer_move(&mut self.viewport, &mut self.fields, point);
        self.handle_response(cursor_before, response);
    }

    pub fn pointer_up(&mut self, button: PointerButton, point: Point) {
        let cursor_before = self.pointer.cursor();
        let response = self
            .pointer
            .pointer_up(&mut self.viewport, &mut self.fields, button, point);
        self.handle_response(cursor_before, response);
    }

    fn handle_response(&mut self, cursor_before: CursorGlyph, response: PointerResponse) {
        if cursor_before != response.cursor {
            self.events.push(ViewEvent::CursorChanged(response.cursor));
        }
        if let Some(id) = response.created {
            self.events.push(ViewEvent::FieldCreated(id));
        }
        match response.activated {
            Some(LinkAction::GoTo { page }) => {
                let page_before = self.viewport.current_page();
                debug!(page, "following link");
                self.viewport.set_current_page(page);
                self.geometry_changed(page_before);
            }
            Some(action @ LinkAction::Uri { .. }) => {
                self.events.push(ViewEvent::LinkActivated(action));
            }
            None => {}
        }
        if response.redraw {
            self.request_redraw();
        }
    }

    pub fn hovered_field(&self) -> Option<FieldId> {
        self.fields.hovered()
    }

    /// Deletes the hovered field when `confirm` agrees.
    pub fn delete_hovered(&mut self, confirm: impl FnOnce(FieldId) -> bool) -> Option<FieldId> {
        let cursor_before = self.pointer.cursor();
        let id = self.pointer.delete_hovered(&mut self.fields, confirm)?;
        self.events.push(ViewEvent::FieldDeleted(id));
        if self.pointer.cursor() != cursor_before {
            self.events.push(ViewEvent::CursorChanged(self.pointer.cursor()));
        }
        self.request_redraw();
        Some(id)
    }

    pub fn add_marker(&mut self, marker: Marker) {
        self.markers.add(marker);
        self.markers.rebuild(self.viewport.page_count());
        self.request_redraw();
    }

    pub fn set_markers(&mut self, markers: impl IntoIterator<Item = Marker>) {
        self.markers.clear();
        self.markers.extend(markers);
        self.markers.rebuild(self.viewport.page_count());
        self.request_redraw();
    }

    pub fn clear_markers(&mut self) {
        self.markers.clear();
        self.markers.rebuild(self.viewport.page_count());
        self.request_redraw();
    }

    pub fn paint<S: Surface + ?Sized>(&mut self, surface: &mut S, clip: Rect) -> ViewerResult<PaintReport> {
        self.dispatcher.paint(
            &mut self.viewport,
            Overlays {
                fields: &self.fields,
                markers: &self.markers,
                drawing: self.pointer.drawing_rect(),
            },
            surface,
            clip,
        )
    }

    pub fn placements(&self) -> Vec<StampPlacement> {
        self.fields.placements()
    }

    pub fn manifest(&self) -> Option<StampManifest> {
        let info = self.document_info()?;
        Some(StampManifest::new(&info.path, &self.placements()))
    }

    pub fn view_state(&self) -> PersistedViewState {
        PersistedViewState {
            page: self.viewport.current_page(),
            zoom: self.viewport.zoom(),
            zoom_mode: self.viewport.zoom_mode(),
            rotation: self.viewport.rotation(),
        }
    }

    /// Applies what `store` remembers for the loaded document. Returns
    /// whether anything was restored.
    pub fn restore_from(&mut self, store: &dyn StateStore) -> Result<bool> {
        let Some(info) = self.document_info() else {
            return Ok(false);
        };
        let Some(state) = store.load(info)? else {
            return Ok(false);
        };
        self.restore(&state)?;
        Ok(true)
    }

    pub fn save_to(&self, store: &dyn StateStore) -> Result<()> {
        match self.document_info() {
            Some(info) => store.save(info, &self.view_state()),
            None => Ok(()),
        }
    }

    pub fn restore(&mut self, state: &PersistedViewState) -> ViewerResult<()> {
        self.batch(|view| {
            let page_before = view.viewport.current_page();
            view.viewport.set_rotation(state.rotation)?;
            view.viewport.set_zoom_mode(state.zoom_mode)?;
            view.viewport.set_zoom(state.zoom.clamp(MIN_ZOOM, MAX_ZOOM), None)?;
            view.viewport.set_current_page(state.page);
            view.geometry_changed(page_before);
            Ok(())
        })
    }
}
