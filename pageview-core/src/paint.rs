//! Drawing the visible part of a document onto a [`Surface`].

use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use tracing::{debug, instrument, trace};

use crate::config::Theme;
use crate::document::RenderImage;
use crate::ViewerResult;
use crate::geometry::{Insets, Point, Rect, Size};
use crate::overlay::{FieldContent, FieldStore, MarkerStore};
use crate::viewport::{DocumentRect, Viewport};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 0xff)
    }

    pub fn to_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

impl fmt::Display for Rgba {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{:02x}{:02x}{:02x}{:02x}",
            self.r, self.g, self.b, self.a
        )
    }
}

/// Accepts `#rrggbb` and `#rrggbbaa`.
impl FromStr for Rgba {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s
            .strip_prefix('#')
            .ok_or_else(|| format!("colour {s:?} must start with '#'"))?;
        if !(hex.len() == 6 || hex.len() == 8) || !hex.is_ascii() {
            return Err(format!("colour {s:?} must be #rrggbb or #rrggbbaa"));
        }
        let channel = |index: usize| {
            u8::from_str_radix(&hex[index * 2..index * 2 + 2], 16)
                .map_err(|_| format!("colour {s:?} has a non-hex channel"))
        };
        let alpha = if hex.len() == 8 { channel(3)? } else { 0xff };
        Ok(Rgba::new(channel(0)?, channel(1)?, channel(2)?, alpha))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineStyle {
    Solid,
    Dashed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stroke {
    pub color: Rgba,
    pub width: i32,
    pub style: LineStyle,
}

impl Stroke {
    pub const fn solid(color: Rgba, width: i32) -> Self {
        Self {
            color,
            width,
            style: LineStyle::Solid,
        }
    }

    pub const fn dashed(color: Rgba, width: i32) -> Self {
        Self {
            color,
            width,
            style: LineStyle::Dashed,
        }
    }
}

/// A pixel target in viewport space. Implementations clip to their own
/// extent.
pub trait Surface {
    fn size(&self) -> Size;
    fn fill_rect(&mut self, rect: Rect, color: Rgba);
    /// Draws the outline of `rect`, inside its bounds.
    fn stroke_rect(&mut self, rect: Rect, stroke: Stroke);
    /// Copies `image` unscaled with its top-left corner at `origin`.
    fn blit(&mut self, origin: Point, image: &RenderImage);
    /// Draws `image` scaled to fill `rect`.
    fn draw_image(&mut self, rect: Rect, image: &RenderImage);
}

/// What one paint pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaintReport {
    pub band: Option<RangeInclusive<usize>>,
    /// Pages rasterized during this pass.
    pub rendered: Vec<usize>,
    /// Pages whose bitmap was dropped because they left the band.
    pub evicted: Vec<usize>,
    /// Pages drawn onto the surface.
    pub painted: Vec<usize>,
    pub skipped: bool,
}

impl PaintReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

/// Everything drawn on top of the pages.
#[derive(Clone, Copy)]
pub struct Overlays<'a> {
    pub fields: &'a FieldStore,
    pub markers: &'a MarkerStore,
    /// In-progress drawing rectangle, in viewport space.
    pub drawing: Option<Rect>,
}

#[derive(Debug, Clone)]
pub struct RenderDispatcher {
    theme: Theme,
    shade: Insets,
}

impl RenderDispatcher {
    pub fn new(theme: Theme, shade: Insets) -> Self {
        Self { theme, shade }
    }

    pub fn theme(&self) -> &Theme {
        &self.theme
    }

    #[instrument(skip_all, fields(clip = %clip))]
    pub fn paint<S: Surface + ?Sized>(
        &self,
        viewport: &mut Viewport,
        overlays: Overlays<'_>,
        surface: &mut S,
        clip: Rect,
    ) -> ViewerResult<PaintReport> {
        if viewport.is_paint_suspended() || !viewport.cache().is_valid() {
            trace!("paint skipped");
            return Ok(PaintReport::skipped());
        }
        let Some(band) = viewport.visible_band() else {
            return Ok(PaintReport::skipped());
        };

        surface.fill_rect(clip, self.theme.background);

        let mut report = PaintReport {
            band: Some(band.clone()),
            ..PaintReport::default()
        };
        for page in 0..viewport.cache().len() {
            if !band.contains(&page) && viewport.evict_page_image(page) {
                report.evicted.push(page);
            }
        }
        if !report.evicted.is_empty() {
            debug!(pages = ?report.evicted, "evicted page bitmaps");
        }

        let offset = viewport.scroll_offset();
        for page in band {
            let (Some(outer), Some(bounds)) = (
                viewport.cache().outer_bounds(page),
                viewport.cache().bounds(page),
            ) else {
                continue;
            };
            if !outer.offset(offset).intersects(&clip) {
                continue;
            }
            let bounds = bounds.offset(offset);

            surface.fill_rect(bounds, self.theme.page);
            if viewport.ensure_page_image(page)? {
                report.rendered.push(page);
            }
            if let Some(image) = viewport.cache().image(page) {
                surface.blit(bounds.location(), image);
            }
            self.draw_shade(surface, bounds);
            self.draw_markers(viewport, overlays.markers, surface, page);
            report.painted.push(page);
        }

        self.draw_fields(overlays.fields, surface, offset);
        if let Some(rect) = overlays.drawing {
            surface.stroke_rect(
                rect.normalized(),
                Stroke::solid(self.theme.drawing_outline, 1),
            );
        }
        Ok(report)
    }

    fn draw_shade<S: Surface + ?Sized>(&self, surface: &mut S, bounds: Rect) {
        let outer = bounds.expand(self.shade);
        let strips = [
            Rect::new(outer.x, outer.y, outer.width, self.shade.top),
            Rect::new(outer.x, bounds.bottom(), outer.width, self.shade.bottom),
            Rect::new(outer.x, bounds.y, self.shade.left, bounds.height),
            Rect::new(bounds.right(), bounds.y, self.shade.right, bounds.height),
        ];
        for strip in strips.into_iter().filter(|strip| !strip.is_empty()) {
            surface.fill_rect(strip, self.theme.shade);
        }
    }

    fn draw_markers<S: Surface + ?Sized>(
        &self,
        viewport: &Viewport,
        markers: &MarkerStore,
        surface: &mut S,
        page: usize,
    ) {
        for marker in markers.on_page(page) {
            let Some(rect) = viewport.bounds_from_document(
                DocumentRect {
                    page,
                    rect: marker.rect,
                },
                true,
            ) else {
                continue;
            };
            if let Some(fill) = marker.fill {
                surface.fill_rect(rect, fill);
            }
            if marker.border_width > 0 {
                surface.stroke_rect(rect, Stroke::solid(marker.color, marker.border_width));
            }
        }
    }

    fn draw_fields<S: Surface + ?Sized>(&self, fields: &FieldStore, surface: &mut S, offset: Point) {
        for (_, field) in fields.active_fields() {
            let rect = field.layout_rect.offset(offset);
            match &field.content {
                FieldContent::Empty => {
                    let color = if field.hovered {
                        self.theme.field_hover
                    } else {
                        self.theme.field_outline
                    };
                    surface.stroke_rect(rect, Stroke::solid(color, 1));
                }
                FieldContent::Image(payload) => {
                    surface.draw_image(rect, &payload.image);
                    if field.hovered {
                        surface.stroke_rect(rect, Stroke::dashed(self.theme.field_hover, 1));
                    }
                }
            }
        }
    }
}
