use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use parking_lot::Mutex;

use crate::document::{
    document_id_for_path, DocumentInfo, DocumentMetadata, DocumentSource, OutlineItem, PageLink,
    RenderImage, RenderRequest,
};
use crate::geometry::{PointF, RectF, Size, SizeF};

/// In-memory source with identity device/document mapping.
pub(crate) struct FakeSource {
    info: DocumentInfo,
    sizes: Vec<SizeF>,
    links: Vec<Vec<PageLink>>,
    outline: Vec<OutlineItem>,
    renders: Arc<AtomicUsize>,
    rendered_pages: Arc<Mutex<Vec<usize>>>,
    fail_page: Option<usize>,
}

impl FakeSource {
    pub(crate) fn new(sizes: Vec<SizeF>) -> Self {
        let path = PathBuf::from("/tmp/fake.pdf");
        let page_count = sizes.len();
        Self {
            info: DocumentInfo {
                id: document_id_for_path(&path),
                path,
                page_count,
                metadata: DocumentMetadata::default(),
            },
            links: vec![Vec::new(); page_count],
            sizes,
            outline: Vec::new(),
            renders: Arc::new(AtomicUsize::new(0)),
            rendered_pages: Arc::new(Mutex::new(Vec::new())),
            fail_page: None,
        }
    }

    pub(crate) fn uniform(count: usize, width: f32, height: f32) -> Self {
        Self::new(vec![SizeF::new(width, height); count])
    }

    pub(crate) fn with_link(mut self, page: usize, link: PageLink) -> Self {
        self.links[page].push(link);
        self
    }

    pub(crate) fn with_outline(mut self, outline: Vec<OutlineItem>) -> Self {
        self.outline = outline;
        self
    }

    pub(crate) fn failing_on(mut self, page: usize) -> Self {
        self.fail_page = Some(page);
        self
    }

    pub(crate) fn render_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.renders)
    }

    pub(crate) fn rendered_pages(&self) -> Arc<Mutex<Vec<usize>>> {
        Arc::clone(&self.rendered_pages)
    }
}

impl DocumentSource for FakeSource {
    fn info(&self) -> &DocumentInfo {
        &self.info
    }

    fn page_sizes(&self) -> &[SizeF] {
        &self.sizes
    }

    fn render_page(&self, request: &RenderRequest) -> Result<RenderImage> {
        if self.fail_page == Some(request.page_index) {
            return Err(anyhow!("synthetic failure on page {}", request.page_index));
        }
        self.renders.fetch_add(1, Ordering::SeqCst);
        self.rendered_pages.lock().push(request.page_index);
        let shade = (request.page_index % 200) as u8;
        Ok(RenderImage::filled(
            request.width,
            request.height,
            [shade, shade, shade, 255],
        ))
    }

    fn point_to_document(&self, _page: usize, point: PointF) -> PointF {
        point
    }

    fn point_from_document(&self, _page: usize, point: PointF) -> PointF {
        point
    }

    fn rect_to_document(&self, _page: usize, rect: RectF) -> RectF {
        rect
    }

    fn rect_from_document(&self, _page: usize, rect: RectF) -> RectF {
        rect
    }

    fn page_links(&self, page: usize, _pixel_size: Size) -> Result<Vec<PageLink>> {
        Ok(self.links.get(page).cloned().unwrap_or_default())
    }

    fn outline(&self) -> Result<Vec<OutlineItem>> {
        Ok(self.outline.clone())
    }
}
