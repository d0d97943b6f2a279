//! Document sources backed by pdfium, plus stamp image loading.

#[cfg(feature = "pdf")]
mod pdfium;
mod space;
mod stamp;

#[cfg(feature = "pdf")]
pub use pdfium::{PdfiumProvider, PdfiumSource};
pub use space::PdfPageSpace;
pub use stamp::load_stamp_image;
