use std::mem;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use image::{imageops, RgbaImage};
use parking_lot::Mutex;
use pdfium_render::prelude::*;
use pageview_core::{
    document_id_for_path, DocumentInfo, DocumentMetadata, DocumentProvider, DocumentSource,
    LinkAction, OutlineItem, PageLink, PointF, RectF, RenderImage, RenderRequest, Rotation, Size,
    SizeF,
};
use tracing::{debug, instrument, warn};

use crate::space::PdfPageSpace;

const LIBRARY_ENV: &str = "PAGEVIEW_PDFIUM_LIBRARY";

/// Opens PDF files through a shared pdfium binding.
pub struct PdfiumProvider {
    pdfium: Arc<Pdfium>,
}

impl PdfiumProvider {
    /// Binds pdfium from `$PAGEVIEW_PDFIUM_LIBRARY`, then the working
    /// directory, then the system library path.
    pub fn new() -> Result<Self> {
        let pdfium = match bind_from_env() {
            Some(pdfium) => pdfium,
            None => bind_default()?,
        };
        Ok(Self {
            pdfium: Arc::new(pdfium),
        })
    }
}

#[async_trait]
impl DocumentProvider for PdfiumProvider {
    #[instrument(skip(self))]
    async fn open(&self, path: &Path) -> Result<Box<dyn DocumentSource>> {
        let absolute = path
            .canonicalize()
            .with_context(|| format!("failed to resolve path for {:?}", path))?;
        let source = PdfiumSource::open(Arc::clone(&self.pdfium), absolute)?;
        Ok(Box::new(source))
    }
}

pub struct PdfiumSource {
    // Declared before the bindings so it is dropped first.
    document: Mutex<PdfDocument<'static>>,
    _bindings: Arc<Pdfium>,
    info: DocumentInfo,
    sizes: Vec<SizeF>,
    outline_cache: Mutex<Option<Vec<OutlineItem>>>,
}

impl PdfiumSource {
    fn open(pdfium: Arc<Pdfium>, path: PathBuf) -> Result<Self> {
        let document = pdfium
            .load_pdf_from_file(&path, None)
            .with_context(|| format!("failed to open {:?}", path))?;
        // SAFETY: the document borrows the bindings inside `pdfium`. The
        // struct keeps its own `Arc` to them and drops `document` first, so
        // the borrow never outlives the bindings.
        let document =
            unsafe { mem::transmute::<PdfDocument<'_>, PdfDocument<'static>>(document) };

        let sizes: Vec<SizeF> = document
            .pages()
            .iter()
            .map(|page| SizeF::new(page.width().value, page.height().value))
            .collect();
        let metadata = document.metadata();
        let title = metadata
            .get(PdfDocumentMetadataTagType::Title)
            .map(|t| t.value().to_owned());
        let author = metadata
            .get(PdfDocumentMetadataTagType::Author)
            .map(|t| t.value().to_owned());

        let info = DocumentInfo {
            id: document_id_for_path(&path),
            page_count: sizes.len(),
            path,
            metadata: DocumentMetadata { title, author },
        };
        debug!(pages = info.page_count, path = %info.path.display(), "opened pdf");

        Ok(Self {
            document: Mutex::new(document),
            _bindings: pdfium,
            info,
            sizes,
            outline_cache: Mutex::new(None),
        })
    }

    fn space(&self, page: usize) -> PdfPageSpace {
        PdfPageSpace::new(self.sizes.get(page).map_or(0.0, |size| size.height))
    }

    fn with_page<R, F>(&self, page: usize, f: F) -> Result<R>
    where
        F: FnOnce(&PdfPage<'_>) -> Result<R>,
    {
        let index: PdfPageIndex = page
            .try_into()
            .map_err(|_| anyhow!("page {} is out of supported range", page))?;
        let document = self.document.lock();
        let pdf_page = document
            .pages()
            .get(index)
            .with_context(|| format!("page {} out of range", page))?;
        f(&pdf_page)
    }

    fn link_action(link: &PdfLink<'_>) -> Option<LinkAction> {
        if let Some(action) = link.action() {
            match action.action_type() {
                PdfActionType::GoToDestinationInSameDocument => {
                    let page = action
                        .as_local_destination_action()
                        .and_then(|local| local.destination().ok())
                        .and_then(|destination| destination.page_index().ok());
                    if let Some(page) = page {
                        return Some(LinkAction::GoTo {
                            page: page as usize,
                        });
                    }
                }
                PdfActionType::Uri => {
                    let uri = action
                        .as_uri_action()
                        .and_then(|uri_action| uri_action.uri().ok())
                        .filter(|uri| !uri.is_empty());
                    if let Some(uri) = uri {
                        return Some(LinkAction::Uri { uri });
                    }
                }
                _ => {}
            }
        }

        link.destination()
            .and_then(|destination| destination.page_index().ok())
            .map(|page| LinkAction::GoTo {
                page: page as usize,
            })
    }
}

impl DocumentSource for PdfiumSource {
    fn info(&self) -> &DocumentInfo {
        &self.info
    }

    fn page_sizes(&self) -> &[SizeF] {
        &self.sizes
    }

    #[instrument(skip(self), fields(page = request.page_index))]
    fn render_page(&self, request: &RenderRequest) -> Result<RenderImage> {
        // pdfium renders upright; rotation is applied to the bitmap after.
        let (width, height) = if request.rotation.swaps_axes() {
            (request.height, request.width)
        } else {
            (request.width, request.height)
        };
        let config = PdfRenderConfig::new()
            .set_target_size(width.max(1) as Pixels, height.max(1) as Pixels)
            .render_annotations(request.flags.annotations);

        let upright = self.with_page(request.page_index, |page| {
            let bitmap = page
                .render_with_config(&config)
                .with_context(|| format!("failed to render page {}", request.page_index))?;
            Ok(bitmap.as_image().to_rgba8())
        })?;

        let oriented = orient(upright, request.rotation);
        let (width, height) = oriented.dimensions();
        let mut pixels = oriented.into_raw();
        if request.flags.dark_mode {
            invert_pixels(&mut pixels);
        }

        Ok(RenderImage {
            width,
            height,
            pixels,
        })
    }

    fn point_to_document(&self, page: usize, point: PointF) -> PointF {
        self.space(page).point_to_document(point)
    }

    fn point_from_document(&self, page: usize, point: PointF) -> PointF {
        self.space(page).point_from_document(point)
    }

    fn rect_to_document(&self, page: usize, rect: RectF) -> RectF {
        self.space(page).rect_to_document(rect)
    }

    fn rect_from_document(&self, page: usize, rect: RectF) -> RectF {
        self.space(page).rect_from_document(rect)
    }

    fn page_links(&self, page: usize, _pixel_size: Size) -> Result<Vec<PageLink>> {
        self.with_page(page, |pdf_page| {
            let mut links = Vec::new();
            for link in pdf_page.links().iter() {
                let rect = match link.rect() {
                    Ok(rect) => rect,
                    Err(err) => {
                        warn!(
                            ?err,
                            page,
                            path = %self.info.path.display(),
                            "failed to resolve link rectangle"
                        );
                        continue;
                    }
                };
                let bounds = RectF::from_corners(
                    PointF::new(rect.left().value, rect.bottom().value),
                    PointF::new(rect.right().value, rect.top().value),
                );
                if bounds.width <= 0.0 || bounds.height <= 0.0 {
                    continue;
                }
                let Some(action) = Self::link_action(&link) else {
                    continue;
                };
                links.push(PageLink { bounds, action });
            }
            Ok(links)
        })
    }

    fn outline(&self) -> Result<Vec<OutlineItem>> {
        if let Some(cached) = self.outline_cache.lock().as_ref() {
            return Ok(cached.clone());
        }

        let outline = {
            let document = self.document.lock();
            let mut outline = Vec::new();
            if let Some(root) = document.bookmarks().root() {
                walk_bookmarks(root, 0, &mut outline);
            }
            outline
        };

        *self.outline_cache.lock() = Some(outline.clone());
        Ok(outline)
    }
}

fn walk_bookmarks(first: PdfBookmark<'_>, depth: usize, out: &mut Vec<OutlineItem>) {
    let mut next = Some(first);
    while let Some(bookmark) = next {
        let target = bookmark
            .destination()
            .and_then(|destination| destination.page_index().ok());
        if let (Some(title), Some(page)) = (bookmark.title(), target) {
            out.push(OutlineItem {
                title,
                page_index: page as usize,
                depth,
            });
        }
        if let Some(child) = bookmark.first_child() {
            walk_bookmarks(child, depth + 1, out);
        }
        next = bookmark.next_sibling();
    }
}

fn orient(image: RgbaImage, rotation: Rotation) -> RgbaImage {
    match rotation {
        Rotation::Rotate0 => image,
        Rotation::Rotate90 => imageops::rotate90(&image),
        Rotation::Rotate180 => imageops::rotate180(&image),
        Rotation::Rotate270 => imageops::rotate270(&image),
    }
}

fn invert_pixels(pixels: &mut [u8]) {
    for chunk in pixels.chunks_exact_mut(4) {
        for channel in &mut chunk[..3] {
            *channel = 255 - *channel;
        }
    }
}

fn bind_from_env() -> Option<Pdfium> {
    let path = std::env::var(LIBRARY_ENV).ok().filter(|p| !p.is_empty())?;
    match Pdfium::bind_to_library(&path) {
        Ok(bindings) => Some(Pdfium::new(bindings)),
        Err(err) => {
            warn!("failed to load pdfium from ${LIBRARY_ENV}={}: {}", path, err);
            None
        }
    }
}

fn bind_default() -> Result<Pdfium> {
    let mut errors = Vec::new();

    let cwd_path = Pdfium::pdfium_platform_library_name_at_path("./");
    match Pdfium::bind_to_library(&cwd_path) {
        Ok(bindings) => return Ok(Pdfium::new(bindings)),
        Err(err) => errors.push(format!("{}: {}", cwd_path.display(), err)),
    }

    match Pdfium::bind_to_system_library() {
        Ok(bindings) => Ok(Pdfium::new(bindings)),
        Err(err) => {
            errors.push(format!("system: {err}"));
            Err(anyhow!(
                "failed to bind to a pdfium library; set ${LIBRARY_ENV} or install it ({})",
                errors.join(", ")
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orient_swaps_dimensions_for_quarter_turns() {
        let mut image = RgbaImage::new(4, 2);
        image.put_pixel(0, 0, image::Rgba([255, 0, 0, 255]));

        let turned = orient(image.clone(), Rotation::Rotate90);
        assert_eq!(turned.dimensions(), (2, 4));
        // top-left moves to top-right under a clockwise turn
        assert_eq!(turned.get_pixel(1, 0).0, [255, 0, 0, 255]);

        let flipped = orient(image, Rotation::Rotate180);
        assert_eq!(flipped.dimensions(), (4, 2));
        assert_eq!(flipped.get_pixel(3, 1).0, [255, 0, 0, 255]);
    }

    #[test]
    fn dark_mode_inverts_colour_but_not_alpha() {
        let mut pixels = vec![0, 128, 255, 200];
        invert_pixels(&mut pixels);
        assert_eq!(pixels, vec![255, 127, 0, 200]);
    }
}
