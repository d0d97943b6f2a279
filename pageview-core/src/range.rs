//! Exposes a contiguous page range of another source as a document.

use std::sync::Arc;

use anyhow::Result;
use uuid::Uuid;

use crate::document::{
    DocumentInfo, DocumentSource, LinkAction, OutlineItem, PageLink, RenderImage, RenderRequest,
};
use crate::{ViewerError, ViewerResult};
use crate::geometry::{PointF, RectF, Size, SizeF};

pub struct PageRangeSource {
    inner: Arc<dyn DocumentSource>,
    info: DocumentInfo,
    start: usize,
    end: usize,
}

impl PageRangeSource {
    /// Pages `start..=end` of `inner`.
    pub fn new(inner: Arc<dyn DocumentSource>, start: usize, end: usize) -> ViewerResult<Self> {
        let count = inner.page_count();
        if end >= count {
            return Err(ViewerError::page_out_of_range(end, count));
        }
        if start > end {
            return Err(ViewerError::invalid(format!(
                "page range {start}..={end} is empty"
            )));
        }
        let parent = inner.info();
        let info = DocumentInfo {
            id: Uuid::new_v5(&parent.id, format!("{start}-{end}").as_bytes()),
            path: parent.path.clone(),
            page_count: end - start + 1,
            metadata: parent.metadata.clone(),
        };
        Ok(Self {
            inner,
            info,
            start,
            end,
        })
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    fn outer(&self, page: usize) -> usize {
        page + self.start
    }

    fn inner_to_local(&self, page: usize) -> Option<usize> {
        (self.start..=self.end)
            .contains(&page)
            .then(|| page - self.start)
    }
}

impl DocumentSource for PageRangeSource {
    fn info(&self) -> &DocumentInfo {
        &self.info
    }

    fn page_sizes(&self) -> &[SizeF] {
        &self.inner.page_sizes()[self.start..=self.end]
    }

    fn render_page(&self, request: &RenderRequest) -> Result<RenderImage> {
        let mut translated = *request;
        translated.page_index = self.outer(request.page_index);
        self.inner.render_page(&translated)
    }

    fn point_to_document(&self, page: usize, point: PointF) -> PointF {
        self.inner.point_to_document(self.outer(page), point)
    }

    fn point_from_document(&self, page: usize, point: PointF) -> PointF {
        self.inner.point_from_document(self.outer(page), point)
    }

    fn rect_to_document(&self, page: usize, rect: RectF) -> RectF {
        self.inner.rect_to_document(self.outer(page), rect)
    }

    fn rect_from_document(&self, page: usize, rect: RectF) -> RectF {
        self.inner.rect_from_document(self.outer(page), rect)
    }

    /// Page targets are shifted into the range; targets outside it are
    /// dropped.
    fn page_links(&self, page: usize, pixel_size: Size) -> Result<Vec<PageLink>> {
        let links = self.inner.page_links(self.outer(page), pixel_size)?;
        Ok(links
            .into_iter()
            .filter_map(|link| match link.action {
                LinkAction::GoTo { page } => self.inner_to_local(page).map(|page| PageLink {
                    bounds: link.bounds,
                    action: LinkAction::GoTo { page },
                }),
                LinkAction::Uri { .. } => Some(link),
            })
            .collect())
    }

    /// Entries outside the range are dropped along with their children.
    fn outline(&self) -> Result<Vec<OutlineItem>> {
        let mut result = Vec::new();
        let mut pruned_below: Option<usize> = None;
        for item in self.inner.outline()? {
            if let Some(depth) = pruned_below {
                if item.depth > depth {
                    continue;
                }
                pruned_below = None;
            }
            match self.inner_to_local(item.page_index) {
                Some(page_index) => result.push(OutlineItem {
                    page_index,
                    ..item
                }),
                None => pruned_below = Some(item.depth),
            }
        }
        Ok(result)
    }
}
