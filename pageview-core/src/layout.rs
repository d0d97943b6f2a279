//! Scale resolution and vertical page stacking.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::LayoutConfig;
use crate::{ViewerError, ViewerResult};
use crate::geometry::{Rect, Rotation, Size, SizeF};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ZoomMode {
    FitWidth,
    FitHeight,
    #[default]
    FitBest,
    /// Zoom factor is layout pixels per document unit.
    Explicit,
}

impl fmt::Display for ZoomMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ZoomMode::FitWidth => "fit-width",
            ZoomMode::FitHeight => "fit-height",
            ZoomMode::FitBest => "fit-best",
            ZoomMode::Explicit => "explicit",
        };
        f.write_str(label)
    }
}

impl FromStr for ZoomMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fit-width" => Ok(ZoomMode::FitWidth),
            "fit-height" => Ok(ZoomMode::FitHeight),
            "fit-best" => Ok(ZoomMode::FitBest),
            "explicit" => Ok(ZoomMode::Explicit),
            other => Err(format!("unknown zoom mode {other:?}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLayout {
    /// Page content, excluding shade and margin.
    pub bounds: Rect,
    pub outer_bounds: Rect,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScrollbarState {
    pub horizontal: bool,
    pub vertical: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentLayout {
    pub scale: f64,
    /// The zoom mode after fit-best resolution.
    pub resolved_mode: ZoomMode,
    pub max_oriented: SizeF,
    pub content_size: Size,
    /// Viewport area left after scrollbars.
    pub client_size: Size,
    pub scrollbars: ScrollbarState,
    pub pages: Vec<PageLayout>,
}

#[derive(Debug, Clone, Copy)]
pub struct LayoutInput<'a> {
    pub page_sizes: &'a [SizeF],
    pub viewport: Size,
    pub zoom_mode: ZoomMode,
    pub zoom: f64,
    pub rotation: Rotation,
}

pub fn compute_layout(input: &LayoutInput<'_>, config: &LayoutConfig) -> ViewerResult<DocumentLayout> {
    if input.page_sizes.is_empty() {
        return Err(ViewerError::invalid("document does not contain any pages"));
    }
    if !input.zoom.is_finite() || input.zoom <= 0.0 {
        return Err(ViewerError::invalid(format!(
            "zoom must be a positive number (got {})",
            input.zoom
        )));
    }

    let max_oriented = input
        .page_sizes
        .iter()
        .map(|size| input.rotation.orient(*size))
        .fold(SizeF::default(), |acc, size| {
            SizeF::new(acc.width.max(size.width), acc.height.max(size.height))
        });

    let mut scrollbars = ScrollbarState::default();
    let mut client = input.viewport;
    let (mut mode, mut scale) = resolve_scale(input, max_oriented, client, config);

    // A bar on one axis narrows the other, so a second pass can add the
    // remaining bar. Bars are never removed once shown.
    for _ in 0..2 {
        let (_, content) = stack_pages(input, max_oriented, scale, config);
        let needed = ScrollbarState {
            horizontal: scrollbars.horizontal || content.width > client.width,
            vertical: scrollbars.vertical || content.height > client.height,
        };
        if needed == scrollbars {
            break;
        }
        scrollbars = needed;
        client = client_area(input.viewport, scrollbars, config);
        (mode, scale) = resolve_scale(input, max_oriented, client, config);
    }

    let (pages, content_size) = stack_pages(input, max_oriented, scale, config);
    Ok(DocumentLayout {
        scale,
        resolved_mode: mode,
        max_oriented,
        content_size,
        client_size: client,
        scrollbars,
        pages,
    })
}

fn client_area(viewport: Size, scrollbars: ScrollbarState, config: &LayoutConfig) -> Size {
    let metrics = config.scrollbars;
    Size::new(
        if scrollbars.vertical {
            (viewport.width - metrics.vertical_width).max(0)
        } else {
            viewport.width
        },
        if scrollbars.horizontal {
            (viewport.height - metrics.horizontal_height).max(0)
        } else {
            viewport.height
        },
    )
}

fn resolve_mode(mode: ZoomMode, max_oriented: SizeF, client: Size) -> ZoomMode {
    if mode != ZoomMode::FitBest {
        return mode;
    }
    let document_aspect = if max_oriented.height > 0.0 {
        max_oriented.width as f64 / max_oriented.height as f64
    } else {
        0.0
    };
    let client_aspect = if client.height > 0 {
        client.width as f64 / client.height as f64
    } else {
        f64::INFINITY
    };
    if client_aspect >= document_aspect {
        ZoomMode::FitHeight
    } else {
        ZoomMode::FitWidth
    }
}

fn resolve_scale(
    input: &LayoutInput<'_>,
    max_oriented: SizeF,
    client: Size,
    config: &LayoutConfig,
) -> (ZoomMode, f64) {
    let insets = config.page_insets();
    let mode = resolve_mode(input.zoom_mode, max_oriented, client);
    let fit = |available: i32, extent: f32| {
        if extent <= 0.0 {
            return 0.0;
        }
        (available.max(0) as f64 / extent as f64) * input.zoom
    };
    let scale = match mode {
        ZoomMode::FitHeight => fit(client.height - insets.vertical(), max_oriented.height),
        ZoomMode::FitWidth | ZoomMode::FitBest => {
            fit(client.width - insets.horizontal(), max_oriented.width)
        }
        ZoomMode::Explicit => input.zoom,
    };
    (mode, scale)
}

fn stack_pages(
    input: &LayoutInput<'_>,
    max_oriented: SizeF,
    scale: f64,
    config: &LayoutConfig,
) -> (Vec<PageLayout>, Size) {
    let insets = config.page_insets();
    let max_full_width = (max_oriented.width as f64 * scale) as i32 + insets.horizontal();
    let mut top = 0;
    let mut pages = Vec::with_capacity(input.page_sizes.len());

    for size in input.page_sizes {
        let oriented = input.rotation.orient(*size);
        let width = (oriented.width as f64 * scale) as i32;
        let height = (oriented.height as f64 * scale) as i32;
        let full_width = width + insets.horizontal();
        let full_height = height + insets.vertical();
        let left = (max_full_width - full_width) / 2;

        pages.push(PageLayout {
            bounds: Rect::new(left + insets.left, top + insets.top, width, height),
            outer_bounds: Rect::new(left, top, full_width, full_height),
        });
        top += full_height;
    }

    (pages, Size::new(max_full_width, top))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScrollbarMetrics;

    fn no_scrollbars() -> LayoutConfig {
        LayoutConfig {
            scrollbars: ScrollbarMetrics::NONE,
            ..LayoutConfig::default()
        }
    }

    fn layout(
        sizes: &[SizeF],
        viewport: Size,
        zoom_mode: ZoomMode,
        zoom: f64,
        rotation: Rotation,
        config: &LayoutConfig,
    ) -> DocumentLayout {
        compute_layout(
            &LayoutInput {
                page_sizes: sizes,
                viewport,
                zoom_mode,
                zoom,
                rotation,
            },
            config,
        )
        .unwrap()
    }

    #[test]
    fn empty_document_is_rejected() {
        let err = compute_layout(
            &LayoutInput {
                page_sizes: &[],
                viewport: Size::new(100, 100),
                zoom_mode: ZoomMode::FitWidth,
                zoom: 1.0,
                rotation: Rotation::Rotate0,
            },
            &LayoutConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ViewerError::InvalidArgument(_)));
    }

    #[test]
    fn quarter_turn_swaps_oriented_size() {
        let sizes = vec![SizeF::new(600.0, 800.0); 3];
        let config = no_scrollbars();
        let viewport = Size::new(812, 812);

        let upright = layout(&sizes, viewport, ZoomMode::FitBest, 1.0, Rotation::Rotate0, &config);
        let turned = layout(&sizes, viewport, ZoomMode::FitBest, 1.0, Rotation::Rotate90, &config);

        assert_eq!(turned.max_oriented, SizeF::new(800.0, 600.0));
        assert_eq!(upright.resolved_mode, ZoomMode::FitHeight);
        assert_eq!(turned.resolved_mode, ZoomMode::FitWidth);
        assert_eq!(turned.pages[0].bounds.height, upright.pages[0].bounds.width);

        let upright = layout(&sizes, viewport, ZoomMode::Explicit, 0.5, Rotation::Rotate0, &config);
        let turned = layout(&sizes, viewport, ZoomMode::Explicit, 0.5, Rotation::Rotate90, &config);
        assert_eq!(turned.pages[0].bounds.height, upright.pages[0].bounds.width);
        assert_eq!(turned.pages[0].bounds.width, upright.pages[0].bounds.height);
    }

    #[test]
    fn page_width_scales_linearly_with_zoom() {
        let sizes = vec![SizeF::new(612.0, 792.0); 2];
        let config = no_scrollbars();
        let base = layout(
            &sizes,
            Size::new(1000, 700),
            ZoomMode::FitWidth,
            1.0,
            Rotation::Rotate0,
            &config,
        );
        for zoom in [0.25, 0.5, 1.5, 2.0, 3.75] {
            let zoomed = layout(
                &sizes,
                Size::new(1000, 700),
                ZoomMode::FitWidth,
                zoom,
                Rotation::Rotate0,
                &config,
            );
            let expected = base.pages[0].bounds.width as f64 * zoom;
            let actual = zoomed.pages[0].bounds.width as f64;
            assert!(
                (actual - expected).abs() <= zoom + 1.0,
                "zoom {zoom}: expected ~{expected}, got {actual}"
            );
        }
    }

    #[test]
    fn pages_stack_and_center_within_widest_page() {
        let sizes = vec![SizeF::new(600.0, 800.0), SizeF::new(300.0, 400.0)];
        let config = no_scrollbars();
        let result = layout(
            &sizes,
            Size::new(1000, 1000),
            ZoomMode::Explicit,
            1.0,
            Rotation::Rotate0,
            &config,
        );
        let insets = config.page_insets();
        let first = result.pages[0];
        let second = result.pages[1];

        assert_eq!(first.outer_bounds.top(), 0);
        assert_eq!(second.outer_bounds.top(), first.outer_bounds.bottom());
        assert_eq!(first.bounds.top(), insets.top);
        assert_eq!(second.bounds.size(), Size::new(300, 400));
        assert_eq!(
            second.outer_bounds.left(),
            (first.outer_bounds.width - second.outer_bounds.width) / 2
        );
        assert_eq!(
            result.content_size,
            Size::new(600 + insets.horizontal(), 1200 + 2 * insets.vertical())
        );
    }

    #[test]
    fn overflowing_content_takes_room_for_scrollbar() {
        let sizes = vec![SizeF::new(600.0, 800.0); 5];
        let config = LayoutConfig::default();
        let result = layout(
            &sizes,
            Size::new(500, 400),
            ZoomMode::FitWidth,
            1.0,
            Rotation::Rotate0,
            &config,
        );

        assert!(result.scrollbars.vertical);
        assert!(!result.scrollbars.horizontal);
        assert_eq!(result.client_size.width, 500 - config.scrollbars.vertical_width);
        assert!(result.content_size.width <= result.client_size.width);
        let expected_scale =
            (result.client_size.width - config.page_insets().horizontal()) as f64 / 600.0;
        assert!((result.scale - expected_scale).abs() < 1e-9);
    }

    #[test]
    fn vertical_bar_can_force_horizontal_bar() {
        let config = LayoutConfig::default();
        let insets = config.page_insets();
        // exactly as wide as the viewport until the vertical bar takes its room
        let sizes = vec![SizeF::new((500 - insets.horizontal()) as f32, 800.0)];
        let result = layout(
            &sizes,
            Size::new(500, 400),
            ZoomMode::Explicit,
            1.0,
            Rotation::Rotate0,
            &config,
        );

        assert_eq!(result.content_size.width, 500);
        assert_eq!(
            result.scrollbars,
            ScrollbarState {
                horizontal: true,
                vertical: true,
            }
        );
        assert_eq!(
            result.client_size,
            Size::new(
                500 - config.scrollbars.vertical_width,
                400 - config.scrollbars.horizontal_height
            )
        );
    }

    #[test]
    fn fitting_content_shows_no_scrollbar() {
        let sizes = vec![SizeF::new(600.0, 800.0)];
        let result = layout(
            &sizes,
            Size::new(500, 900),
            ZoomMode::FitBest,
            1.0,
            Rotation::Rotate0,
            &LayoutConfig::default(),
        );
        assert_eq!(result.scrollbars, ScrollbarState::default());
        assert_eq!(result.client_size, Size::new(500, 900));
    }

    #[test]
    fn zoom_mode_parses_from_kebab_case() {
        assert_eq!("fit-height".parse::<ZoomMode>(), Ok(ZoomMode::FitHeight));
        assert_eq!(ZoomMode::FitBest.to_string(), "fit-best");
        assert!("fit".parse::<ZoomMode>().is_err());
    }
}
