use pageview_core::{PointF, RectF};

/// PDF user space for one page: origin bottom-left, y growing upward.
/// Device space has the same units with the origin top-left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PdfPageSpace {
    height: f32,
}

impl PdfPageSpace {
    pub fn new(height: f32) -> Self {
        Self { height }
    }

    pub fn point_to_document(&self, point: PointF) -> PointF {
        PointF::new(point.x, self.height - point.y)
    }

    pub fn point_from_document(&self, point: PointF) -> PointF {
        // the flip is its own inverse
        self.point_to_document(point)
    }

    pub fn rect_to_document(&self, rect: RectF) -> RectF {
        RectF::from_corners(
            self.point_to_document(PointF::new(rect.left(), rect.top())),
            self.point_to_document(PointF::new(rect.right(), rect.bottom())),
        )
    }

    pub fn rect_from_document(&self, rect: RectF) -> RectF {
        self.rect_to_document(rect)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_top_maps_to_document_top() {
        let space = PdfPageSpace::new(792.0);
        assert_eq!(
            space.point_to_document(PointF::new(10.0, 0.0)),
            PointF::new(10.0, 792.0)
        );
        assert_eq!(
            space.point_from_document(PointF::new(10.0, 692.0)),
            PointF::new(10.0, 100.0)
        );
    }

    #[test]
    fn rects_keep_extent_and_flip_origin() {
        let space = PdfPageSpace::new(800.0);
        let device = RectF::new(50.0, 100.0, 200.0, 150.0);
        let document = space.rect_to_document(device);
        assert_eq!(document, RectF::new(50.0, 550.0, 200.0, 150.0));
        assert_eq!(space.rect_from_document(document), device);
    }
}
