//! Integer layout geometry, floating point document geometry, and the
//! rotation-aware transforms between a page's layout rectangle and its
//! document space.

use std::fmt;
use std::ops::{Add, Sub};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn saturating_add(self, rhs: Point) -> Point {
        Point::new(self.x.saturating_add(rhs.x), self.y.saturating_add(rhs.y))
    }
}

impl Add for Point {
    type Output = Point;

    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point {
    type Output = Point;

    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

impl Size {
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }
}

/// Axis-aligned rectangle in pixel units. `right`/`bottom` are exclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Builds the rectangle spanned by two arbitrary corners.
    pub fn from_corners(a: Point, b: Point) -> Self {
        let left = a.x.min(b.x);
        let top = a.y.min(b.y);
        Self::new(left, top, (a.x - b.x).abs(), (a.y - b.y).abs())
    }

    pub fn from_origin_size(origin: Point, size: Size) -> Self {
        Self::new(origin.x, origin.y, size.width, size.height)
    }

    pub fn left(&self) -> i32 {
        self.x
    }

    pub fn top(&self) -> i32 {
        self.y
    }

    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub fn location(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Same area with non-negative width and height.
    pub fn normalized(&self) -> Self {
        Self::from_corners(
            Point::new(self.left(), self.top()),
            Point::new(self.right(), self.bottom()),
        )
    }

    pub fn contains_point(&self, point: Point) -> bool {
        point.x >= self.left()
            && point.x < self.right()
            && point.y >= self.top()
            && point.y < self.bottom()
    }

    pub fn contains_rect(&self, other: &Rect) -> bool {
        self.left() <= other.left()
            && other.right() <= self.right()
            && self.top() <= other.top()
            && other.bottom() <= self.bottom()
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        other.left() < self.right()
            && self.left() < other.right()
            && other.top() < self.bottom()
            && self.top() < other.bottom()
    }

    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let left = self.left().max(other.left());
        let top = self.top().max(other.top());
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if right <= left || bottom <= top {
            return None;
        }
        Some(Rect::new(left, top, right - left, bottom - top))
    }

    pub fn offset(&self, delta: Point) -> Self {
        Self::new(self.x + delta.x, self.y + delta.y, self.width, self.height)
    }

    /// Grows the rectangle outward by `insets` on each side.
    pub fn expand(&self, insets: Insets) -> Self {
        Self::new(
            self.x - insets.left,
            self.y - insets.top,
            self.width + insets.horizontal(),
            self.height + insets.vertical(),
        )
    }

    pub fn inflate(&self, amount: i32) -> Self {
        self.expand(Insets::uniform(amount))
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PointF {
    pub x: f32,
    pub y: f32,
}

impl PointF {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SizeF {
    pub width: f32,
    pub height: f32,
}

impl SizeF {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// Rectangle in document units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RectF {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl RectF {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn from_corners(a: PointF, b: PointF) -> Self {
        let left = a.x.min(b.x);
        let top = a.y.min(b.y);
        Self::new(left, top, (a.x - b.x).abs(), (a.y - b.y).abs())
    }

    pub fn left(&self) -> f32 {
        self.x
    }

    pub fn top(&self) -> f32 {
        self.y
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// Component-wise difference on origin and size.
    pub fn delta(&self, base: &RectF) -> RectF {
        RectF::new(
            self.x - base.x,
            self.y - base.y,
            self.width - base.width,
            self.height - base.height,
        )
    }

    /// Inverse of [`RectF::delta`].
    pub fn minus(&self, delta: &RectF) -> RectF {
        RectF::new(
            self.x - delta.x,
            self.y - delta.y,
            self.width - delta.width,
            self.height - delta.height,
        )
    }
}

/// Per-side insets, used for page shading and margins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Insets {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Insets {
    pub const fn uniform(value: i32) -> Self {
        Self {
            left: value,
            top: value,
            right: value,
            bottom: value,
        }
    }

    pub fn horizontal(&self) -> i32 {
        self.left + self.right
    }

    pub fn vertical(&self) -> i32 {
        self.top + self.bottom
    }
}

impl Add for Insets {
    type Output = Insets;

    fn add(self, rhs: Insets) -> Insets {
        Insets {
            left: self.left + rhs.left,
            top: self.top + rhs.top,
            right: self.right + rhs.right,
            bottom: self.bottom + rhs.bottom,
        }
    }
}

/// Clockwise page rotation in quarter turns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum Rotation {
    #[default]
    Rotate0,
    Rotate90,
    Rotate180,
    Rotate270,
}

impl Rotation {
    pub fn degrees(self) -> u16 {
        match self {
            Rotation::Rotate0 => 0,
            Rotation::Rotate90 => 90,
            Rotation::Rotate180 => 180,
            Rotation::Rotate270 => 270,
        }
    }

    fn quarter_turns(self) -> u8 {
        (self.degrees() / 90) as u8
    }

    fn from_quarter_turns(turns: u8) -> Self {
        match turns % 4 {
            0 => Rotation::Rotate0,
            1 => Rotation::Rotate90,
            2 => Rotation::Rotate180,
            _ => Rotation::Rotate270,
        }
    }

    pub fn rotate_right(self) -> Self {
        Self::from_quarter_turns(self.quarter_turns() + 1)
    }

    pub fn rotate_left(self) -> Self {
        Self::from_quarter_turns(self.quarter_turns() + 3)
    }

    pub fn swaps_axes(self) -> bool {
        matches!(self, Rotation::Rotate90 | Rotation::Rotate270)
    }

    /// Size of a page of intrinsic `size` once rotated.
    pub fn orient(self, size: SizeF) -> SizeF {
        if self.swaps_axes() {
            SizeF::new(size.height, size.width)
        } else {
            size
        }
    }
}

impl TryFrom<u16> for Rotation {
    type Error = String;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Rotation::Rotate0),
            90 => Ok(Rotation::Rotate90),
            180 => Ok(Rotation::Rotate180),
            270 => Ok(Rotation::Rotate270),
            other => Err(format!("rotation must be 0, 90, 180 or 270 (got {other})")),
        }
    }
}

impl From<Rotation> for u16 {
    fn from(rotation: Rotation) -> Self {
        rotation.degrees()
    }
}

fn ratio(value: f32, extent: f32) -> f32 {
    if extent > 0.0 {
        value / extent
    } else {
        0.0
    }
}

/// Maps a page-relative layout point into the page's unrotated device space,
/// expressed in document units.
pub fn point_to_document(
    rotation: Rotation,
    layout_size: Size,
    page_size: SizeF,
    point: Point,
) -> PointF {
    let (x, y) = (point.x as f32, point.y as f32);
    let (w, h) = (layout_size.width as f32, layout_size.height as f32);
    let (x, y, w, h) = match rotation {
        Rotation::Rotate0 => (x, y, w, h),
        Rotation::Rotate90 => (y, w - x, h, w),
        Rotation::Rotate180 => (w - x, h - y, w, h),
        Rotation::Rotate270 => (h - y, x, h, w),
    };
    PointF::new(
        ratio(x, w) * page_size.width,
        ratio(y, h) * page_size.height,
    )
}

/// Inverse of [`point_to_document`], rounded to the nearest pixel.
pub fn point_from_document(
    rotation: Rotation,
    layout_size: Size,
    page_size: SizeF,
    point: PointF,
) -> Point {
    let (w, h) = (page_size.width, page_size.height);
    let (x, y, w, h) = match rotation {
        Rotation::Rotate0 => (point.x, point.y, w, h),
        Rotation::Rotate90 => (h - point.y, point.x, h, w),
        Rotation::Rotate180 => (w - point.x, h - point.y, w, h),
        Rotation::Rotate270 => (point.y, w - point.x, h, w),
    };
    Point::new(
        (ratio(x, w) * layout_size.width as f32).round() as i32,
        (ratio(y, h) * layout_size.height as f32).round() as i32,
    )
}

pub fn rect_to_document(rotation: Rotation, layout_size: Size, page_size: SizeF, rect: Rect) -> RectF {
    let a = point_to_document(rotation, layout_size, page_size, rect.location());
    let b = point_to_document(
        rotation,
        layout_size,
        page_size,
        Point::new(rect.right(), rect.bottom()),
    );
    RectF::from_corners(a, b)
}

pub fn rect_from_document(
    rotation: Rotation,
    layout_size: Size,
    page_size: SizeF,
    rect: RectF,
) -> Rect {
    let a = point_from_document(
        rotation,
        layout_size,
        page_size,
        PointF::new(rect.left(), rect.top()),
    );
    let b = point_from_document(
        rotation,
        layout_size,
        page_size,
        PointF::new(rect.right(), rect.bottom()),
    );
    Rect::from_corners(a, b)
}
