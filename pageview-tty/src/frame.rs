use pageview_core::{LineStyle, Point, Rect, RenderImage, Rgba, Size, Stroke, Surface};

const DASH: i32 = 4;

/// RGBA8 pixel buffer the view paints into before it is sent to the
/// terminal. Everything drawn is clipped to the buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBuffer {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl FrameBuffer {
    pub fn new(size: Size) -> Self {
        let width = size.width.max(0) as u32;
        let height = size.height.max(0) as u32;
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize * 4],
        }
    }

    pub fn resize(&mut self, size: Size) {
        if self.size() != size {
            *self = Self::new(size);
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixel(&self, x: i32, y: i32) -> Option<[u8; 4]> {
        let idx = self.index(x, y)?;
        Some([
            self.pixels[idx],
            self.pixels[idx + 1],
            self.pixels[idx + 2],
            self.pixels[idx + 3],
        ])
    }

    /// Smallest rectangle covering every pixel that differs from `other`.
    /// A buffer of another size differs everywhere.
    pub fn diff_bounds(&self, other: &FrameBuffer) -> Option<Rect> {
        if self.size() != other.size() {
            return Some(self.bounds()).filter(|bounds| !bounds.is_empty());
        }
        let stride = self.width as usize * 4;
        if stride == 0 {
            return None;
        }
        let mut changed: Option<(i32, i32, i32, i32)> = None;
        let rows = self.pixels.chunks(stride).zip(other.pixels.chunks(stride));
        for (y, (row, old)) in rows.enumerate() {
            if row == old {
                continue;
            }
            let differs = |(a, b): (&[u8], &[u8])| a != b;
            let pairs = || row.chunks(4).zip(old.chunks(4));
            let first = pairs().position(differs).unwrap_or(0) as i32;
            let last = pairs().rposition(differs).unwrap_or(0) as i32;
            let y = y as i32;
            changed = Some(match changed {
                None => (first, y, last, y),
                Some((left, top, right, _)) => (left.min(first), top, right.max(last), y),
            });
        }
        changed.map(|(left, top, right, bottom)| {
            Rect::new(left, top, right - left + 1, bottom - top + 1)
        })
    }

    /// Copies the part of the buffer under `rect`.
    pub fn crop(&self, rect: Rect) -> Option<FrameBuffer> {
        let area = self.clip(rect)?;
        let mut cropped = FrameBuffer::new(area.size());
        let row_bytes = area.width as usize * 4;
        for (row, y) in (area.top()..area.bottom()).enumerate() {
            let start = self.index(area.left(), y)?;
            let target = row * row_bytes;
            cropped.pixels[target..target + row_bytes]
                .copy_from_slice(&self.pixels[start..start + row_bytes]);
        }
        Some(cropped)
    }

    fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width as i32, self.height as i32)
    }

    fn index(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x as u32 >= self.width || y as u32 >= self.height {
            return None;
        }
        Some((y as usize * self.width as usize + x as usize) * 4)
    }

    /// Source-over blend of one pixel.
    fn blend(&mut self, x: i32, y: i32, src: [u8; 4]) {
        let Some(idx) = self.index(x, y) else {
            return;
        };
        let alpha = src[3] as u32;
        let dst = &mut self.pixels[idx..idx + 4];
        match alpha {
            0 => {}
            255 => dst.copy_from_slice(&src),
            _ => {
                let inverse = 255 - alpha;
                for channel in 0..3 {
                    dst[channel] =
                        ((src[channel] as u32 * alpha + dst[channel] as u32 * inverse) / 255) as u8;
                }
                dst[3] = (alpha + dst[3] as u32 * inverse / 255) as u8;
            }
        }
    }

    fn clip(&self, rect: Rect) -> Option<Rect> {
        rect.normalized().intersection(&self.bounds())
    }
}

impl Surface for FrameBuffer {
    fn size(&self) -> Size {
        Size::new(self.width as i32, self.height as i32)
    }

    fn fill_rect(&mut self, rect: Rect, color: Rgba) {
        let Some(area) = self.clip(rect) else {
            return;
        };
        let color = color.to_array();
        for y in area.top()..area.bottom() {
            for x in area.left()..area.right() {
                self.blend(x, y, color);
            }
        }
    }

    fn stroke_rect(&mut self, rect: Rect, stroke: Stroke) {
        let rect = rect.normalized();
        if rect.is_empty() {
            return;
        }
        let width = stroke.width.max(1);
        if rect.width <= 2 * width || rect.height <= 2 * width {
            self.fill_rect(rect, stroke.color);
            return;
        }

        let inner_height = rect.height - 2 * width;
        let bands = [
            (Rect::new(rect.x, rect.y, rect.width, width), true),
            (Rect::new(rect.x, rect.bottom() - width, rect.width, width), true),
            (Rect::new(rect.x, rect.y + width, width, inner_height), false),
            (
                Rect::new(rect.right() - width, rect.y + width, width, inner_height),
                false,
            ),
        ];
        let color = stroke.color.to_array();
        for (band, horizontal) in bands {
            let Some(area) = self.clip(band) else {
                continue;
            };
            for y in area.top()..area.bottom() {
                for x in area.left()..area.right() {
                    if stroke.style == LineStyle::Dashed {
                        let along = if horizontal { x - rect.x } else { y - rect.y };
                        if (along / DASH) % 2 == 1 {
                            continue;
                        }
                    }
                    self.blend(x, y, color);
                }
            }
        }
    }

    fn blit(&mut self, origin: Point, image: &RenderImage) {
        let target = Rect::new(origin.x, origin.y, image.width as i32, image.height as i32);
        let Some(area) = self.clip(target) else {
            return;
        };
        for y in area.top()..area.bottom() {
            for x in area.left()..area.right() {
                let source = image.pixel((x - origin.x) as u32, (y - origin.y) as u32);
                if let Some(source) = source {
                    self.blend(x, y, source);
                }
            }
        }
    }

    fn draw_image(&mut self, rect: Rect, image: &RenderImage) {
        let rect = rect.normalized();
        if rect.is_empty() || image.width == 0 || image.height == 0 {
            return;
        }
        let Some(area) = self.clip(rect) else {
            return;
        };
        // nearest neighbour
        for y in area.top()..area.bottom() {
            let sy = ((y - rect.y) as u64 * image.height as u64 / rect.height as u64) as u32;
            for x in area.left()..area.right() {
                let sx = ((x - rect.x) as u64 * image.width as u64 / rect.width as u64) as u32;
                if let Some(source) = image.pixel(sx, sy) {
                    self.blend(x, y, source);
                }
            }
        }
    }
}
