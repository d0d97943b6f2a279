//! Per-page layout bounds plus lazily produced bitmaps and link regions.
//!
//! Lazy members carry the epoch they were produced in; a value from an older
//! epoch is treated as absent.

use tracing::trace;

use crate::document::{LinkAction, RenderImage};
use crate::geometry::{Point, Rect};
use crate::layout::DocumentLayout;

/// A link's clickable area in layout space.
#[derive(Debug, Clone, PartialEq)]
pub struct PageLinkRegion {
    pub bounds: Rect,
    pub action: LinkAction,
}

#[derive(Debug)]
struct Stamped<T> {
    epoch: u64,
    value: T,
}

#[derive(Debug, Default)]
pub struct PageCacheEntry {
    pub bounds: Rect,
    pub outer_bounds: Rect,
    image: Option<Stamped<RenderImage>>,
    links: Option<Stamped<Vec<PageLinkRegion>>>,
}

#[derive(Debug, Default)]
pub struct PageCache {
    entries: Vec<PageCacheEntry>,
    epoch: u64,
    valid: bool,
}

impl PageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Starts a new epoch with bounds taken from `layout`. Every bitmap and
    /// link list from the previous epoch is dropped.
    pub fn rebuild(&mut self, layout: &DocumentLayout) {
        self.epoch += 1;
        self.entries
            .resize_with(layout.pages.len(), PageCacheEntry::default);
        for (entry, page) in self.entries.iter_mut().zip(&layout.pages) {
            entry.bounds = page.bounds;
            entry.outer_bounds = page.outer_bounds;
            entry.image = None;
            entry.links = None;
        }
        self.valid = true;
        trace!(epoch = self.epoch, pages = self.entries.len(), "page cache rebuilt");
    }

    /// Drops everything; the cache stays unusable until the next rebuild.
    pub fn invalidate(&mut self) {
        self.epoch += 1;
        self.entries.clear();
        self.valid = false;
    }

    pub fn entry(&self, page: usize) -> Option<&PageCacheEntry> {
        if !self.valid {
            return None;
        }
        self.entries.get(page)
    }

    pub fn entries(&self) -> impl Iterator<Item = &PageCacheEntry> {
        let live: &[PageCacheEntry] = if self.valid { &self.entries } else { &[] };
        live.iter()
    }

    pub fn bounds(&self, page: usize) -> Option<Rect> {
        self.entry(page).map(|entry| entry.bounds)
    }

    pub fn outer_bounds(&self, page: usize) -> Option<Rect> {
        self.entry(page).map(|entry| entry.outer_bounds)
    }

    /// First page whose content bounds contain `point` (layout space).
    pub fn page_at(&self, point: Point) -> Option<usize> {
        self.entries()
            .position(|entry| entry.bounds.contains_point(point))
    }

    /// First page whose outer bounds contain `point` (layout space).
    pub fn page_at_outer(&self, point: Point) -> Option<usize> {
        self.entries()
            .position(|entry| entry.outer_bounds.contains_point(point))
    }

    pub fn image(&self, page: usize) -> Option<&RenderImage> {
        let entry = self.entry(page)?;
        entry
            .image
            .as_ref()
            .filter(|stamped| stamped.epoch == self.epoch)
            .map(|stamped| &stamped.value)
    }

    pub fn has_image(&self, page: usize) -> bool {
        self.image(page).is_some()
    }

    pub fn store_image(&mut self, page: usize, image: RenderImage) {
        let epoch = self.epoch;
        if let Some(entry) = self.entries.get_mut(page) {
            entry.image = Some(Stamped {
                epoch,
                value: image,
            });
        }
    }

    /// Drops a page's bitmap. Returns whether one was held.
    pub fn evict_image(&mut self, page: usize) -> bool {
        self.entries
            .get_mut(page)
            .and_then(|entry| entry.image.take())
            .is_some()
    }

    pub fn cached_image_count(&self) -> usize {
        (0..self.entries.len())
            .filter(|page| self.has_image(*page))
            .count()
    }

    pub fn links(&self, page: usize) -> Option<&[PageLinkRegion]> {
        let entry = self.entry(page)?;
        entry
            .links
            .as_ref()
            .filter(|stamped| stamped.epoch == self.epoch)
            .map(|stamped| stamped.value.as_slice())
    }

    pub fn store_links(&mut self, page: usize, links: Vec<PageLinkRegion>) {
        let epoch = self.epoch;
        if let Some(entry) = self.entries.get_mut(page) {
            entry.links = Some(Stamped {
                epoch,
                value: links,
            });
        }
    }
}
