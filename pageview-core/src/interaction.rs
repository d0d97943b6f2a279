//! Pointer-driven drawing, moving and resizing of overlay fields.

use std::ops::BitOr;

use tracing::{debug, trace};

use crate::cache::PageLinkRegion;
use crate::config::InteractionConfig;
use crate::document::LinkAction;
use crate::geometry::{Point, Rect};
use crate::overlay::{FieldContent, FieldId, FieldStore, ImagePayload};
use crate::viewport::Viewport;

/// Which parts of a field the pointer is over.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct EdgeMask(u8);

impl EdgeMask {
    pub const NONE: EdgeMask = EdgeMask(0);
    pub const CENTER: EdgeMask = EdgeMask(1);
    pub const LEFT: EdgeMask = EdgeMask(2);
    pub const TOP: EdgeMask = EdgeMask(4);
    pub const RIGHT: EdgeMask = EdgeMask(8);
    pub const BOTTOM: EdgeMask = EdgeMask(16);

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, other: EdgeMask) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn cursor(self) -> CursorGlyph {
        let left_or_right = self.contains(Self::LEFT) || self.contains(Self::RIGHT);
        let top_or_bottom = self.contains(Self::TOP) || self.contains(Self::BOTTOM);
        match (left_or_right, top_or_bottom) {
            (true, true) => {
                let nw_se = (self.contains(Self::LEFT) && self.contains(Self::TOP))
                    || (self.contains(Self::RIGHT) && self.contains(Self::BOTTOM));
                if nw_se {
                    CursorGlyph::ResizeNwSe
                } else {
                    CursorGlyph::ResizeNeSw
                }
            }
            (true, false) => CursorGlyph::ResizeHorizontal,
            (false, true) => CursorGlyph::ResizeVertical,
            (false, false) if self.contains(Self::CENTER) => CursorGlyph::Move,
            (false, false) => CursorGlyph::Arrow,
        }
    }
}

impl BitOr for EdgeMask {
    type Output = EdgeMask;

    fn bitor(self, rhs: EdgeMask) -> EdgeMask {
        EdgeMask(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CursorGlyph {
    #[default]
    Arrow,
    Cross,
    Move,
    Link,
    ResizeHorizontal,
    ResizeVertical,
    ResizeNwSe,
    ResizeNeSw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Left,
    Right,
    Middle,
}

#[derive(Debug, Clone, Default)]
pub enum InteractionMode {
    #[default]
    Browse,
    /// Drawing new fields; the staged payload fills each one.
    AddOverlay { staged: Option<ImagePayload> },
}

/// Points are in viewport space.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PointerState {
    #[default]
    Idle,
    Drawing {
        start: Point,
        current: Point,
    },
    Dragging {
        field: FieldId,
        last: Point,
    },
    Resizing {
        field: FieldId,
        edges: EdgeMask,
        last: Point,
    },
}

/// What the caller should do after a pointer event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointerResponse {
    pub cursor: CursorGlyph,
    pub redraw: bool,
    pub created: Option<FieldId>,
    pub activated: Option<LinkAction>,
}

#[derive(Debug, Clone)]
struct LinkPress {
    link: PageLinkRegion,
    origin: Point,
}

#[derive(Debug, Default)]
pub struct PointerMachine {
    config: InteractionConfig,
    mode: InteractionMode,
    state: PointerState,
    hover_edges: EdgeMask,
    cursor: CursorGlyph,
    link_press: Option<LinkPress>,
}

impl PointerMachine {
    pub fn new(config: InteractionConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn mode(&self) -> &InteractionMode {
        &self.mode
    }

    /// Switching modes abandons any gesture in progress.
    pub fn set_mode(&mut self, mode: InteractionMode) {
        self.mode = mode;
        self.state = PointerState::Idle;
        self.link_press = None;
    }

    pub fn state(&self) -> PointerState {
        self.state
    }

    pub fn cursor(&self) -> CursorGlyph {
        self.cursor
    }

    /// The rectangle being drawn, in viewport space.
    pub fn drawing_rect(&self) -> Option<Rect> {
        match self.state {
            PointerState::Drawing { start, current } => Some(Rect::from_corners(start, current)),
            _ => None,
        }
    }

    fn respond(&mut self, cursor: CursorGlyph, redraw: bool) -> PointerResponse {
        self.cursor = cursor;
        PointerResponse {
            cursor,
            redraw,
            ..PointerResponse::default()
        }
    }

    pub fn pointer_down(
        &mut self,
        viewport: &mut Viewport,
        fields: &mut FieldStore,
        button: PointerButton,
        point: Point,
    ) -> PointerResponse {
        if button != PointerButton::Left || self.state != PointerState::Idle {
            return self.respond(self.cursor, false);
        }

        if let InteractionMode::AddOverlay { .. } = self.mode {
            if viewport.page_at(point).is_some() {
                self.state = PointerState::Drawing {
                    start: point,
                    current: point,
                };
                return self.respond(CursorGlyph::Cross, true);
            }
            return self.respond(CursorGlyph::Arrow, false);
        }

        self.update_hover(viewport, fields, point);
        if let Some(field) = fields.hovered() {
            let edges = self.hover_edges;
            self.state = if edges == EdgeMask::CENTER {
                PointerState::Dragging { field, last: point }
            } else {
                PointerState::Resizing {
                    field,
                    edges,
                    last: point,
                }
            };
            trace!(field = field.0, edges = edges.bits(), "gesture started");
            return self.respond(edges.cursor(), false);
        }

        self.link_press = viewport.link_at(point).map(|link| LinkPress {
            link,
            origin: point,
        });
        let cursor = if self.link_press.is_some() {
            CursorGlyph::Link
        } else {
            CursorGlyph::Arrow
        };
        self.respond(cursor, false)
    }

    pub fn pointer_move(
        &mut self,
        viewport: &mut Viewport,
        fields: &mut FieldStore,
        point: Point,
    ) -> PointerResponse {
        match self.state {
            PointerState::Idle => match self.mode {
                InteractionMode::AddOverlay { .. } => {
                    let cursor = if viewport.page_at(point).is_some() {
                        CursorGlyph::Cross
                    } else {
                        CursorGlyph::Arrow
                    };
                    self.respond(cursor, false)
                }
                InteractionMode::Browse => {
                    let changed = self.update_hover(viewport, fields, point);
                    let cursor = if fields.hovered().is_some() {
                        self.hover_edges.cursor()
                    } else if viewport.link_at(point).is_some() {
                        CursorGlyph::Link
                    } else {
                        CursorGlyph::Arrow
                    };
                    self.respond(cursor, changed)
                }
            },
            PointerState::Drawing { start, .. } => {
                self.state = PointerState::Drawing {
                    start,
                    current: point,
                };
                self.respond(CursorGlyph::Cross, true)
            }
            PointerState::Dragging { field, last } => {
                let Some(current) = fields.get(field).map(|f| f.layout_rect) else {
                    return self.respond(CursorGlyph::Arrow, false);
                };
                let moved = current.offset(point - last);
                let accepted = self.try_apply(viewport, fields, field, moved);
                if accepted {
                    self.state = PointerState::Dragging { field, last: point };
                }
                self.respond(CursorGlyph::Move, accepted)
            }
            PointerState::Resizing { field, edges, last } => {
                let Some(current) = fields.get(field).map(|f| f.layout_rect) else {
                    return self.respond(CursorGlyph::Arrow, false);
                };
                let resized = resize_edges(current, edges, point - last);
                let accepted = self.try_apply(viewport, fields, field, resized);
                if accepted {
                    self.state = PointerState::Resizing {
                        field,
                        edges,
                        last: point,
                    };
                }
                self.respond(edges.cursor(), accepted)
            }
        }
    }

    pub fn pointer_up(
        &mut self,
        viewport: &mut Viewport,
        fields: &mut FieldStore,
        button: PointerButton,
        point: Point,
    ) -> PointerResponse {
        if button != PointerButton::Left {
            return self.respond(self.cursor, false);
        }
        let state = std::mem::take(&mut self.state);
        match state {
            PointerState::Drawing { start, .. } => {
                let created = self.finish_drawing(viewport, fields, start, point);
                let mut response = self.respond(CursorGlyph::Cross, true);
                response.created = created;
                response
            }
            PointerState::Dragging { .. } | PointerState::Resizing { .. } => {
                self.respond(self.cursor, true)
            }
            PointerState::Idle => {
                let activated = self.link_press.take().and_then(|press| {
                    let moved = point - press.origin;
                    let threshold = self.config.link_drag_threshold;
                    (moved.x.abs() <= threshold && moved.y.abs() <= threshold)
                        .then_some(press.link.action)
                });
                let mut response = self.respond(self.cursor, false);
                response.activated = activated;
                response
            }
        }
    }

    /// Deletes the hovered field once `confirm` agrees.
    pub fn delete_hovered(
        &mut self,
        fields: &mut FieldStore,
        confirm: impl FnOnce(FieldId) -> bool,
    ) -> Option<FieldId> {
        if self.state != PointerState::Idle {
            return None;
        }
        let id = fields.hovered()?;
        if !confirm(id) {
            return None;
        }
        fields.mark_deleted(id).then(|| {
            self.cursor = CursorGlyph::Arrow;
            id
        })
    }

    fn finish_drawing(
        &self,
        viewport: &Viewport,
        fields: &mut FieldStore,
        start: Point,
        end: Point,
    ) -> Option<FieldId> {
        let drawn = Rect::from_corners(start, end);
        let page = viewport.page_at(drawn.location())?;
        let bounds = viewport.page_bounds(page)?;
        let layout = drawn.offset(Point::default() - viewport.scroll_offset());
        let clipped = layout.intersection(&bounds)?;
        let content = match &self.mode {
            InteractionMode::AddOverlay {
                staged: Some(payload),
            } => FieldContent::Image(payload.clone()),
            _ => FieldContent::Empty,
        };
        let id = fields.insert_from_layout(viewport, page, clipped, content)?;
        debug!(field = id.0, page, rect = %clipped, "field created");
        Some(id)
    }

    /// Commits `candidate` (layout space) when it keeps a usable size and
    /// stays on the field's page.
    fn try_apply(
        &self,
        viewport: &Viewport,
        fields: &mut FieldStore,
        id: FieldId,
        candidate: Rect,
    ) -> bool {
        let Some(page) = fields.get(id).map(|field| field.page) else {
            return false;
        };
        let Some(bounds) = viewport.page_bounds(page) else {
            return false;
        };
        let candidate = candidate.normalized();
        let ratio = self.config.min_size_ratio;
        if (candidate.width as f64) < bounds.width as f64 * ratio
            || (candidate.height as f64) < bounds.height as f64 * ratio
        {
            debug!(field = id.0, rect = %candidate, "rejected: below minimum size");
            return false;
        }
        if !bounds.contains_rect(&candidate) {
            debug!(field = id.0, rect = %candidate, "rejected: leaves page");
            return false;
        }
        fields.commit_layout_rect(viewport, id, candidate)
    }

    /// Recomputes hover flags. Returns whether the hovered field changed.
    fn update_hover(&mut self, viewport: &Viewport, fields: &mut FieldStore, point: Point) -> bool {
        let before = fields.hovered();
        fields.clear_hover();
        self.hover_edges = EdgeMask::NONE;

        let layout = viewport.to_layout(point);
        let tolerance = self.config.hit_tolerance;
        let hit = fields.active_fields().find_map(|(id, field)| {
            let rect = field.layout_rect.normalized();
            rect.inflate(tolerance)
                .contains_point(layout)
                .then(|| (id, edges_at(rect, layout, tolerance)))
        });
        if let Some((id, edges)) = hit {
            fields.set_hovered(id);
            self.hover_edges = edges;
        }
        before != fields.hovered()
    }
}

fn edges_at(rect: Rect, point: Point, tolerance: i32) -> EdgeMask {
    let pick = |near: i32, far: i32, near_edge: EdgeMask, far_edge: EdgeMask| {
        match (near <= tolerance, far <= tolerance) {
            (true, true) if near <= far => near_edge,
            (true, true) => far_edge,
            (true, false) => near_edge,
            (false, true) => far_edge,
            (false, false) => EdgeMask::NONE,
        }
    };
    let horizontal = pick(
        (point.x - rect.left()).abs(),
        (point.x - rect.right()).abs(),
        EdgeMask::LEFT,
        EdgeMask::RIGHT,
    );
    let vertical = pick(
        (point.y - rect.top()).abs(),
        (point.y - rect.bottom()).abs(),
        EdgeMask::TOP,
        EdgeMask::BOTTOM,
    );
    let edges = horizontal | vertical;
    if edges.is_empty() {
        EdgeMask::CENTER
    } else {
        edges
    }
}

fn resize_edges(rect: Rect, edges: EdgeMask, delta: Point) -> Rect {
    let (mut left, mut top, mut right, mut bottom) =
        (rect.left(), rect.top(), rect.right(), rect.bottom());
    if edges.contains(EdgeMask::LEFT) {
        left += delta.x;
    }
    if edges.contains(EdgeMask::RIGHT) {
        right += delta.x;
    }
    if edges.contains(EdgeMask::TOP) {
        top += delta.y;
    }
    if edges.contains(EdgeMask::BOTTOM) {
        bottom += delta.y;
    }
    Rect::from_corners(Point::new(left, top), Point::new(right, bottom))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LayoutConfig, RenderConfig, ScrollbarMetrics};
    use crate::document::{PageLink, RenderImage};
    use crate::geometry::{RectF, Size};
    use crate::layout::ZoomMode;
    use crate::test_support::FakeSource;

    struct Rig {
        viewport: Viewport,
        fields: FieldStore,
        machine: PointerMachine,
    }

    impl Rig {
        fn new(source: FakeSource) -> Self {
            let config = LayoutConfig {
                scrollbars: ScrollbarMetrics::NONE,
                ..LayoutConfig::default()
            };
            let mut viewport = Viewport::new(config, RenderConfig::default(), Size::new(400, 400));
            viewport.load(Box::new(source)).unwrap();
            viewport.set_zoom_mode(ZoomMode::Explicit).unwrap();
            Self {
                viewport,
                fields: FieldStore::default(),
                machine: PointerMachine::new(InteractionConfig::default()),
            }
        }

        fn with_field(source: FakeSource, rect: RectF) -> (Self, FieldId) {
            let mut rig = Self::new(source);
            let id = rig
                .fields
                .insert(&rig.viewport, 0, rect, FieldContent::Empty)
                .unwrap();
            (rig, id)
        }

        /// Viewport-space rectangle of a field.
        fn on_screen(&self, id: FieldId) -> Rect {
            self.fields
                .get(id)
                .unwrap()
                .layout_rect
                .offset(self.viewport.scroll_offset())
        }

        fn down(&mut self, point: Point) -> PointerResponse {
            self.machine
                .pointer_down(&mut self.viewport, &mut self.fields, PointerButton::Left, point)
        }

        fn move_to(&mut self, point: Point) -> PointerResponse {
            self.machine
                .pointer_move(&mut self.viewport, &mut self.fields, point)
        }

        fn up(&mut self, point: Point) -> PointerResponse {
            self.machine
                .pointer_up(&mut self.viewport, &mut self.fields, PointerButton::Left, point)
        }
    }

    fn page() -> FakeSource {
        FakeSource::uniform(2, 300.0, 400.0)
    }

    fn assert_near(actual: RectF, expected: RectF) {
        let close = (actual.x - expected.x).abs() < 1e-3
            && (actual.y - expected.y).abs() < 1e-3
            && (actual.width - expected.width).abs() < 1e-3
            && (actual.height - expected.height).abs() < 1e-3;
        assert!(close, "expected {expected:?}, got {actual:?}");
    }

    #[test]
    fn hover_classifies_edges_and_cursor() {
        let (mut rig, id) = Rig::with_field(page(), RectF::new(50.0, 50.0, 100.0, 60.0));
        let rect = rig.on_screen(id);
        let center = Point::new(rect.x + rect.width / 2, rect.y + rect.height / 2);

        assert_eq!(rig.move_to(center).cursor, CursorGlyph::Move);
        assert!(rig.fields.get(id).unwrap().hovered);

        let left = Point::new(rect.left() + 3, center.y);
        assert_eq!(rig.move_to(left).cursor, CursorGlyph::ResizeHorizontal);
        let bottom = Point::new(center.x, rect.bottom() + 4);
        assert_eq!(rig.move_to(bottom).cursor, CursorGlyph::ResizeVertical);
        let top_left = Point::new(rect.left() - 2, rect.top() + 2);
        assert_eq!(rig.move_to(top_left).cursor, CursorGlyph::ResizeNwSe);
        let top_right = Point::new(rect.right() + 2, rect.top() - 2);
        assert_eq!(rig.move_to(top_right).cursor, CursorGlyph::ResizeNeSw);

        let away = Point::new(rect.right() + 40, center.y);
        let response = rig.move_to(away);
        assert_eq!(response.cursor, CursorGlyph::Arrow);
        assert!(response.redraw);
        assert!(rig.fields.hovered().is_none());
    }

    #[test]
    fn closer_edge_wins_on_narrow_field() {
        assert_eq!(
            edges_at(Rect::new(0, 0, 8, 100), Point::new(6, 50), 10),
            EdgeMask::RIGHT
        );
        assert_eq!(
            edges_at(Rect::new(0, 0, 8, 100), Point::new(2, 50), 10),
            EdgeMask::LEFT
        );
        assert_eq!(EdgeMask::LEFT | EdgeMask::BOTTOM, EdgeMask(18));
        assert_eq!((EdgeMask::LEFT | EdgeMask::BOTTOM).cursor(), CursorGlyph::ResizeNeSw);
    }

    #[test]
    fn dragging_moves_document_rect() {
        let (mut rig, id) = Rig::with_field(page(), RectF::new(50.0, 50.0, 100.0, 60.0));
        let rect = rig.on_screen(id);
        let grab = Point::new(rect.x + 50, rect.y + 30);
        rig.move_to(grab);
        rig.down(grab);
        assert!(matches!(rig.machine.state(), PointerState::Dragging { .. }));

        let response = rig.move_to(Point::new(grab.x + 10, grab.y + 5));
        assert!(response.redraw);
        let moved = rig.fields.get(id).unwrap().document_rect;
        assert_near(moved, RectF::new(60.0, 55.0, 100.0, 60.0));

        rig.up(Point::new(grab.x + 10, grab.y + 5));
        assert_eq!(rig.machine.state(), PointerState::Idle);
    }

    #[test]
    fn drag_off_the_page_is_rejected() {
        let (mut rig, id) = Rig::with_field(page(), RectF::new(10.0, 10.0, 100.0, 60.0));
        let rect = rig.on_screen(id);
        let grab = Point::new(rect.x + 50, rect.y + 30);
        rig.move_to(grab);
        rig.down(grab);

        let response = rig.move_to(Point::new(grab.x, grab.y - 50));
        assert!(!response.redraw);
        let field = rig.fields.get(id).unwrap();
        assert_eq!(field.document_rect, RectF::new(10.0, 10.0, 100.0, 60.0));
        assert_eq!(field.page, 0);

        // The delta is measured from the last accepted sample.
        rig.move_to(Point::new(grab.x + 5, grab.y));
        assert_near(
            rig.fields.get(id).unwrap().document_rect,
            RectF::new(15.0, 10.0, 100.0, 60.0),
        );
    }

    #[test]
    fn resize_below_minimum_is_rejected() {
        let (mut rig, id) = Rig::with_field(page(), RectF::new(50.0, 50.0, 100.0, 60.0));
        let rect = rig.on_screen(id);
        let grab = Point::new(rect.right() - 1, rect.y + 30);
        rig.move_to(grab);
        rig.down(grab);
        assert!(matches!(
            rig.machine.state(),
            PointerState::Resizing { edges, .. } if edges == EdgeMask::RIGHT
        ));

        // Page is 300 wide, so anything under 3 pixels is too small.
        rig.move_to(Point::new(grab.x - 98, grab.y));
        assert_eq!(
            rig.fields.get(id).unwrap().document_rect,
            RectF::new(50.0, 50.0, 100.0, 60.0)
        );

        rig.move_to(Point::new(grab.x - 40, grab.y));
        assert_near(
            rig.fields.get(id).unwrap().document_rect,
            RectF::new(50.0, 50.0, 60.0, 60.0),
        );
    }

    #[test]
    fn drawing_creates_field_with_staged_payload() {
        let mut rig = Rig::new(page());
        let payload = ImagePayload::new(RenderImage::filled(1, 1, [9, 9, 9, 255]));
        rig.machine.set_mode(InteractionMode::AddOverlay {
            staged: Some(payload),
        });
        let bounds = rig.viewport.page_bounds_in_viewport(0).unwrap();
        let start = Point::new(bounds.x + 20, bounds.y + 20);
        let end = Point::new(bounds.x + 80, bounds.y + 60);

        assert_eq!(rig.move_to(start).cursor, CursorGlyph::Cross);
        rig.down(start);
        rig.move_to(end);
        assert_eq!(rig.machine.drawing_rect(), Some(Rect::from_corners(start, end)));
        let response = rig.up(end);
        let id = response.created.unwrap();
        let field = rig.fields.get(id).unwrap();
        assert_near(field.document_rect, RectF::new(20.0, 20.0, 60.0, 40.0));
        assert!(field.content.image().is_some());
        assert!(rig.machine.drawing_rect().is_none());
    }

    #[test]
    fn drawing_is_clipped_to_the_page() {
        let mut rig = Rig::new(page());
        rig.machine
            .set_mode(InteractionMode::AddOverlay { staged: None });
        let bounds = rig.viewport.page_bounds_in_viewport(0).unwrap();
        let start = Point::new(bounds.right() - 20, bounds.y + 20);
        rig.down(start);
        let response = rig.up(Point::new(bounds.right() + 30, bounds.y + 50));
        let field = rig.fields.get(response.created.unwrap()).unwrap();
        assert_near(field.document_rect, RectF::new(280.0, 20.0, 20.0, 30.0));
    }

    #[test]
    fn other_buttons_are_ignored() {
        let (mut rig, id) = Rig::with_field(page(), RectF::new(50.0, 50.0, 100.0, 60.0));
        let rect = rig.on_screen(id);
        let grab = Point::new(rect.x + 50, rect.y + 30);
        rig.move_to(grab);
        rig.machine.pointer_down(
            &mut rig.viewport,
            &mut rig.fields,
            PointerButton::Right,
            grab,
        );
        assert_eq!(rig.machine.state(), PointerState::Idle);
    }

    #[test]
    fn link_activates_only_without_drag() {
        let source = page().with_link(
            0,
            PageLink {
                bounds: RectF::new(10.0, 10.0, 50.0, 20.0),
                action: LinkAction::GoTo { page: 1 },
            },
        );
        let mut rig = Rig::new(source);
        let bounds = rig.viewport.page_bounds_in_viewport(0).unwrap();
        let on_link = Point::new(bounds.x + 20, bounds.y + 15);

        assert_eq!(rig.move_to(on_link).cursor, CursorGlyph::Link);
        rig.down(on_link);
        let response = rig.up(Point::new(on_link.x + 2, on_link.y + 1));
        assert_eq!(response.activated, Some(LinkAction::GoTo { page: 1 }));

        rig.down(on_link);
        let response = rig.up(Point::new(on_link.x + 30, on_link.y));
        assert_eq!(response.activated, None);
    }

    #[test]
    fn delete_requires_confirmation() {
        let (mut rig, id) = Rig::with_field(page(), RectF::new(50.0, 50.0, 100.0, 60.0));
        let rect = rig.on_screen(id);
        rig.move_to(Point::new(rect.x + 50, rect.y + 30));

        assert_eq!(rig.machine.delete_hovered(&mut rig.fields, |_| false), None);
        assert!(!rig.fields.get(id).unwrap().deleted);
        assert_eq!(rig.machine.delete_hovered(&mut rig.fields, |_| true), Some(id));
        assert!(rig.fields.get(id).unwrap().deleted);
        assert_eq!(rig.fields.active_fields().count(), 0);
    }
}
