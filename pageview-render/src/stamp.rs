use std::path::Path;

use anyhow::{Context, Result};
use pageview_core::RenderImage;
use tracing::instrument;

/// Decodes an image file into the RGBA bitmap carried by overlay fields.
#[instrument]
pub fn load_stamp_image(path: &Path) -> Result<RenderImage> {
    let decoded = image::open(path)
        .with_context(|| format!("failed to decode stamp image {:?}", path))?
        .to_rgba8();
    let (width, height) = decoded.dimensions();
    Ok(RenderImage {
        width,
        height,
        pixels: decoded.into_raw(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn png_stamp_decodes_to_rgba() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stamp.png");
        let mut source = image::RgbaImage::new(3, 2);
        source.put_pixel(2, 1, image::Rgba([10, 20, 30, 255]));
        source.save(&path).unwrap();

        let stamp = load_stamp_image(&path).unwrap();
        assert_eq!((stamp.width, stamp.height), (3, 2));
        assert_eq!(stamp.pixel(2, 1), Some([10, 20, 30, 255]));
        assert_eq!(stamp.pixel(0, 0), Some([0, 0, 0, 0]));
    }

    #[test]
    fn missing_stamp_reports_path() {
        let err = load_stamp_image(Path::new("/nonexistent/stamp.png")).unwrap_err();
        assert!(format!("{err:#}").contains("stamp.png"));
    }
}
