//! Scroll, zoom and rotation state over a laid-out document, plus every
//! conversion between viewport, layout and document space.

use std::ops::RangeInclusive;

use tracing::{debug, instrument, warn};

use crate::cache::{PageCache, PageLinkRegion};
use crate::config::{LayoutConfig, RenderConfig};
use crate::document::{DocumentSource, RenderRequest};
use crate::{ViewerError, ViewerResult};
use crate::geometry::{self, Point, PointF, Rect, RectF, Rotation, Size, SizeF};
use crate::layout::{compute_layout, DocumentLayout, LayoutInput, ZoomMode};

/// Slack, in pixels, when deciding which page the viewport is scrolled to.
const CURRENT_PAGE_SLACK: i32 = 10;

/// A point on a specific page, in the source's native document space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DocumentPoint {
    pub page: usize,
    pub location: PointF,
}

/// A rectangle on a specific page, in the source's native document space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DocumentRect {
    pub page: usize,
    pub rect: RectF,
}

pub struct Viewport {
    source: Option<Box<dyn DocumentSource>>,
    config: LayoutConfig,
    render: RenderConfig,
    size: Size,
    zoom: f64,
    zoom_mode: ZoomMode,
    rotation: Rotation,
    /// Layout-space position of the client area's top-left corner.
    scroll: Point,
    layout: Option<DocumentLayout>,
    cache: PageCache,
    suspend_paint: u32,
}

impl Viewport {
    pub fn new(config: LayoutConfig, render: RenderConfig, size: Size) -> Self {
        Self {
            source: None,
            config,
            render,
            size,
            zoom: 1.0,
            zoom_mode: ZoomMode::default(),
            rotation: Rotation::default(),
            scroll: Point::default(),
            layout: None,
            cache: PageCache::new(),
            suspend_paint: 0,
        }
    }

    /// Replaces the current document. The previous source is dropped, or
    /// kept with its layout when the new one cannot be laid out.
    #[instrument(skip(self, source), fields(path = ?source.info().path))]
    pub fn load(&mut self, source: Box<dyn DocumentSource>) -> ViewerResult<()> {
        let page_count = source.page_count();
        if page_count == 0 || source.page_sizes().is_empty() {
            return Err(ViewerError::invalid("document does not contain any pages"));
        }
        if source.page_sizes().len() != page_count {
            return Err(ViewerError::invalid(format!(
                "document reports {page_count} pages but {} page sizes",
                source.page_sizes().len()
            )));
        }
        let previous = self.source.replace(source);
        let scroll = std::mem::take(&mut self.scroll);
        if let Err(err) = self.relayout() {
            self.source = previous;
            self.scroll = scroll;
            if let Err(restore) = self.relayout() {
                warn!(error = %restore, "previous document could not be laid out again");
            }
            return Err(err);
        }
        Ok(())
    }

    /// Releases the document and every cached bitmap.
    pub fn unload(&mut self) -> Option<Box<dyn DocumentSource>> {
        self.layout = None;
        self.cache.invalidate();
        self.scroll = Point::default();
        self.source.take()
    }

    pub fn is_loaded(&self) -> bool {
        self.source.is_some()
    }

    pub fn source(&self) -> Option<&dyn DocumentSource> {
        self.source.as_deref()
    }

    pub fn page_count(&self) -> usize {
        self.source.as_ref().map_or(0, |source| source.page_count())
    }

    pub fn page_size(&self, page: usize) -> Option<SizeF> {
        self.source
            .as_ref()
            .and_then(|source| source.page_sizes().get(page).copied())
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    pub fn zoom_mode(&self) -> ZoomMode {
        self.zoom_mode
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    pub fn scroll(&self) -> Point {
        self.scroll
    }

    pub fn layout(&self) -> Option<&DocumentLayout> {
        self.layout.as_ref()
    }

    pub fn layout_config(&self) -> &LayoutConfig {
        &self.config
    }

    pub fn render_config(&self) -> &RenderConfig {
        &self.render
    }

    pub fn cache(&self) -> &PageCache {
        &self.cache
    }

    pub fn suspend_paint(&mut self) {
        self.suspend_paint += 1;
    }

    /// Returns true once the counter is back to zero.
    pub fn resume_paint(&mut self) -> bool {
        self.suspend_paint = self.suspend_paint.saturating_sub(1);
        self.suspend_paint == 0
    }

    pub fn is_paint_suspended(&self) -> bool {
        self.suspend_paint > 0
    }

    /// Recomputes the layout and starts a new cache epoch.
    #[instrument(skip(self), fields(zoom = self.zoom, mode = %self.zoom_mode, rotation = self.rotation.degrees()))]
    pub fn relayout(&mut self) -> ViewerResult<()> {
        let computed = {
            let Some(source) = self.source.as_ref() else {
                self.layout = None;
                self.cache.invalidate();
                return Ok(());
            };
            if self.size.width <= 0 || self.size.height <= 0 {
                Err(ViewerError::invalid(format!(
                    "viewport must have a positive size (got {}x{})",
                    self.size.width, self.size.height
                )))
            } else {
                compute_layout(
                    &LayoutInput {
                        page_sizes: source.page_sizes(),
                        viewport: self.size,
                        zoom_mode: self.zoom_mode,
                        zoom: self.zoom,
                        rotation: self.rotation,
                    },
                    &self.config,
                )
            }
        };

        self.suspend_paint();
        self.cache.invalidate();
        let result = match computed {
            Ok(layout) => {
                self.cache.rebuild(&layout);
                debug!(
                    scale = layout.scale,
                    content = ?layout.content_size,
                    "layout recomputed"
                );
                self.layout = Some(layout);
                Ok(())
            }
            Err(err) => {
                self.layout = None;
                Err(err)
            }
        };
        self.scroll = self.clamp_scroll(self.scroll);
        self.resume_paint();
        result
    }

    /// Client area left after scrollbars.
    pub fn client_size(&self) -> Size {
        self.layout
            .as_ref()
            .map_or(self.size, |layout| layout.client_size)
    }

    pub fn content_size(&self) -> Size {
        self.layout
            .as_ref()
            .map_or(Size::default(), |layout| layout.content_size)
    }

    pub fn max_scroll(&self) -> Point {
        let content = self.content_size();
        let client = self.client_size();
        Point::new(
            (content.width - client.width).max(0),
            (content.height - client.height).max(0),
        )
    }

    fn clamp_scroll(&self, scroll: Point) -> Point {
        let max = self.max_scroll();
        Point::new(scroll.x.clamp(0, max.x), scroll.y.clamp(0, max.y))
    }

    /// Translation from layout space into viewport space. Content narrower or
    /// shorter than the client area is centered on that axis.
    pub fn scroll_offset(&self) -> Point {
        let content = self.content_size();
        let client = self.client_size();
        let x = if content.width < client.width {
            (client.width - content.width) / 2
        } else {
            -self.scroll.x
        };
        let y = if content.height < client.height {
            (client.height - content.height) / 2
        } else {
            -self.scroll.y
        };
        Point::new(x, y)
    }

    pub fn to_layout(&self, point: Point) -> Point {
        point - self.scroll_offset()
    }

    pub fn to_viewport(&self, point: Point) -> Point {
        point + self.scroll_offset()
    }

    /// Page whose content contains the viewport point.
    pub fn page_at(&self, point: Point) -> Option<usize> {
        self.cache.page_at(self.to_layout(point))
    }

    /// Layout-space content bounds of `page`.
    pub fn page_bounds(&self, page: usize) -> Option<Rect> {
        self.cache.bounds(page)
    }

    /// Viewport-space content bounds of `page`.
    pub fn page_bounds_in_viewport(&self, page: usize) -> Option<Rect> {
        self.cache
            .bounds(page)
            .map(|bounds| bounds.offset(self.scroll_offset()))
    }

    pub fn point_to_document(&self, point: Point) -> Option<DocumentPoint> {
        let page = self.page_at(point)?;
        let bounds = self.cache.bounds(page)?;
        let local = self.to_layout(point) - bounds.location();
        let device = geometry::point_to_document(
            self.rotation,
            bounds.size(),
            self.page_size(page)?,
            local,
        );
        Some(DocumentPoint {
            page,
            location: self.source()?.point_to_document(page, device),
        })
    }

    pub fn point_from_document(&self, point: DocumentPoint) -> Option<Point> {
        let bounds = self.cache.bounds(point.page)?;
        let device = self.source()?.point_from_document(point.page, point.location);
        let local = geometry::point_from_document(
            self.rotation,
            bounds.size(),
            self.page_size(point.page)?,
            device,
        );
        Some(self.to_viewport(local + bounds.location()))
    }

    /// Converts a viewport rectangle to the page under its top-left corner.
    pub fn bounds_to_document(&self, rect: Rect) -> Option<DocumentRect> {
        let rect = rect.normalized();
        let page = self.page_at(rect.location())?;
        let layout = rect.offset(Point::default() - self.scroll_offset());
        Some(DocumentRect {
            page,
            rect: self.layout_rect_to_document(page, layout)?,
        })
    }

    /// Converts a document rectangle to layout space, or to viewport space
    /// when `translate_offset` is set.
    pub fn bounds_from_document(&self, rect: DocumentRect, translate_offset: bool) -> Option<Rect> {
        let layout = self.layout_rect_from_document(rect.page, rect.rect)?;
        Some(if translate_offset {
            layout.offset(self.scroll_offset())
        } else {
            layout
        })
    }

    /// `rect` is relative to the page's content origin in layout space.
    pub fn page_rect_to_document(&self, page: usize, rect: Rect) -> Option<RectF> {
        let bounds = self.cache.bounds(page)?;
        let device = geometry::rect_to_document(
            self.rotation,
            bounds.size(),
            self.page_size(page)?,
            rect.normalized(),
        );
        Some(self.source()?.rect_to_document(page, device))
    }

    /// Result is relative to the page's content origin in layout space.
    pub fn page_rect_from_document(&self, page: usize, rect: RectF) -> Option<Rect> {
        let bounds = self.cache.bounds(page)?;
        let device = self.source()?.rect_from_document(page, rect);
        Some(geometry::rect_from_document(
            self.rotation,
            bounds.size(),
            self.page_size(page)?,
            device,
        ))
    }

    /// `rect` is in layout space.
    pub fn layout_rect_to_document(&self, page: usize, rect: Rect) -> Option<RectF> {
        let bounds = self.cache.bounds(page)?;
        self.page_rect_to_document(page, rect.offset(Point::default() - bounds.location()))
    }

    /// Result is in layout space.
    pub fn layout_rect_from_document(&self, page: usize, rect: RectF) -> Option<Rect> {
        let bounds = self.cache.bounds(page)?;
        Some(self.page_rect_from_document(page, rect)?.offset(bounds.location()))
    }

    /// The page the viewport is scrolled to. A page that starts below the
    /// top of the client area and is more than half hidden under its bottom
    /// yields the one before it.
    pub fn current_page(&self) -> usize {
        if !self.cache.is_valid() {
            return 0;
        }
        let top = -self.scroll_offset().y;
        let bottom = top + self.client_size().height;
        for (page, entry) in self.cache.entries().enumerate() {
            let outer = entry.outer_bounds;
            if top - CURRENT_PAGE_SLACK < outer.top() {
                let hidden = outer.bottom() - bottom;
                let mostly_hidden =
                    hidden > 0 && outer.height > 0 && hidden as f64 / outer.height as f64 > 0.5;
                if outer.top() > top && mostly_hidden && page > 0 {
                    return page - 1;
                }
                return page;
            }
        }
        self.page_count().saturating_sub(1)
    }

    /// Scrolls so the page's outer top edge is at the top of the client
    /// area. Out-of-range pages are clamped.
    pub fn set_current_page(&mut self, page: usize) {
        if self.page_count() == 0 {
            self.scroll = Point::default();
            return;
        }
        let page = page.min(self.page_count() - 1);
        if let Some(outer) = self.cache.outer_bounds(page) {
            self.scroll_to(Point::new(self.scroll.x, outer.top()));
        }
    }

    pub fn scroll_to(&mut self, position: Point) {
        self.scroll = self.clamp_scroll(position);
    }

    pub fn scroll_by(&mut self, delta: Point) {
        self.scroll_to(self.scroll.saturating_add(delta));
    }

    /// Scrolls vertically so a viewport rectangle that is partly outside the
    /// client area ends up centered.
    pub fn scroll_into_view(&mut self, rect: Rect) {
        let client = self.client_size();
        if rect.top() < 0 || rect.bottom() > client.height {
            let center = self.to_layout(Point::new(0, rect.top() + rect.height / 2)).y;
            self.scroll_to(Point::new(self.scroll.x, center - client.height / 2));
        }
    }

    /// Changes the zoom factor, keeping `focus` (a viewport point) over the
    /// same content. Without a focus the current page's origin is kept.
    pub fn set_zoom(&mut self, zoom: f64, focus: Option<Point>) -> ViewerResult<()> {
        if !zoom.is_finite() || zoom <= 0.0 {
            return Err(ViewerError::invalid(format!(
                "zoom must be a positive number (got {zoom})"
            )));
        }
        let anchor = match focus {
            Some(point) => self.to_layout(point),
            None => self
                .cache
                .bounds(self.current_page())
                .map_or(Point::default(), |bounds| bounds.location()),
        };
        let old_scale = self.layout.as_ref().map_or(1.0, |layout| layout.scale);

        let previous = self.zoom;
        self.zoom = zoom;
        if let Err(err) = self.relayout() {
            self.zoom = previous;
            if let Err(restore) = self.relayout() {
                warn!(error = %restore, "layout could not be restored after failed zoom");
            }
            return Err(err);
        }

        let new_scale = self.layout.as_ref().map_or(1.0, |layout| layout.scale);
        if old_scale > 0.0 {
            let ratio = new_scale / old_scale;
            let moved = Point::new(
                (anchor.x as f64 * ratio) as i32,
                (anchor.y as f64 * ratio) as i32,
            );
            self.scroll_by(moved - anchor);
        }
        Ok(())
    }

    pub fn set_zoom_mode(&mut self, mode: ZoomMode) -> ViewerResult<()> {
        if mode == self.zoom_mode {
            return Ok(());
        }
        self.zoom_mode = mode;
        self.relayout()
    }

    /// Changes rotation, keeping the scroll position at the same fraction of
    /// the content size.
    pub fn set_rotation(&mut self, rotation: Rotation) -> ViewerResult<()> {
        if rotation == self.rotation {
            return Ok(());
        }
        let content = self.content_size();
        let fraction = |scroll: i32, extent: i32| {
            if extent > 0 {
                scroll as f64 / extent as f64
            } else {
                0.0
            }
        };
        let fx = fraction(self.scroll.x, content.width);
        let fy = fraction(self.scroll.y, content.height);

        self.rotation = rotation;
        self.relayout()?;

        let content = self.content_size();
        self.scroll_to(Point::new(
            (content.width as f64 * fx) as i32,
            (content.height as f64 * fy) as i32,
        ));
        Ok(())
    }

    pub fn rotate_right(&mut self) -> ViewerResult<()> {
        self.set_rotation(self.rotation.rotate_right())
    }

    pub fn rotate_left(&mut self) -> ViewerResult<()> {
        self.set_rotation(self.rotation.rotate_left())
    }

    pub fn resize(&mut self, size: Size) -> ViewerResult<()> {
        if size.width <= 0 || size.height <= 0 {
            return Err(ViewerError::invalid(format!(
                "viewport must have a positive size (got {}x{})",
                size.width, size.height
            )));
        }
        if size == self.size {
            return Ok(());
        }
        self.size = size;
        self.relayout()
    }

    /// Inclusive range of pages whose outer bounds fall in the client area.
    pub fn visible_band(&self) -> Option<RangeInclusive<usize>> {
        if !self.cache.is_valid() || self.cache.is_empty() {
            return None;
        }
        let offset = self.scroll_offset();
        let height = self.client_size().height;
        let mut start = None;
        let mut end = None;
        for (page, entry) in self.cache.entries().enumerate() {
            let outer = entry.outer_bounds.offset(offset);
            if start.is_none() && outer.bottom() >= 0 {
                start = Some(page);
            }
            if end.is_none() && outer.top() > height {
                end = Some(page.saturating_sub(1));
            }
        }
        let start = start.unwrap_or(0);
        let end = end.unwrap_or(self.cache.len() - 1).max(start);
        Some(start..=end)
    }

    /// Rasterizes `page` unless its bitmap is current. Returns whether a
    /// render happened.
    #[instrument(skip(self))]
    pub fn ensure_page_image(&mut self, page: usize) -> ViewerResult<bool> {
        if self.cache.has_image(page) {
            return Ok(false);
        }
        let bounds = self
            .cache
            .bounds(page)
            .ok_or_else(|| ViewerError::page_out_of_range(page, self.page_count()))?;
        let source = self
            .source
            .as_ref()
            .ok_or_else(|| ViewerError::invalid("no document loaded"))?;
        let request = RenderRequest {
            page_index: page,
            width: bounds.width.max(1) as u32,
            height: bounds.height.max(1) as u32,
            dpi_x: self.render.dpi_x,
            dpi_y: self.render.dpi_y,
            rotation: self.rotation,
            flags: self.render.flags(),
        };
        let image = source
            .render_page(&request)
            .map_err(|source| ViewerError::RenderFailure { page, source })?;
        self.cache.store_image(page, image);
        Ok(true)
    }

    pub fn evict_page_image(&mut self, page: usize) -> bool {
        self.cache.evict_image(page)
    }

    /// Clickable regions of `page` in layout space, extracted on first use
    /// in each epoch. Extraction failures yield no links.
    pub fn page_links(&mut self, page: usize) -> &[PageLinkRegion] {
        if self.cache.links(page).is_none() {
            let regions = self.extract_links(page);
            self.cache.store_links(page, regions);
        }
        self.cache.links(page).unwrap_or(&[])
    }

    fn extract_links(&self, page: usize) -> Vec<PageLinkRegion> {
        let (Some(source), Some(bounds)) = (self.source(), self.cache.bounds(page)) else {
            return Vec::new();
        };
        let links = match source.page_links(page, bounds.size()) {
            Ok(links) => links,
            Err(err) => {
                warn!(page, error = %err, "failed to extract page links");
                return Vec::new();
            }
        };
        links
            .into_iter()
            .filter_map(|link| {
                let bounds = self.layout_rect_from_document(page, link.bounds)?;
                Some(PageLinkRegion {
                    bounds,
                    action: link.action,
                })
            })
            .collect()
    }

    /// The link under a viewport point, if any.
    pub fn link_at(&mut self, point: Point) -> Option<PageLinkRegion> {
        let page = self.page_at(point)?;
        let layout = self.to_layout(point);
        self.page_links(page)
            .iter()
            .find(|link| link.bounds.contains_point(layout))
            .cloned()
    }
}
