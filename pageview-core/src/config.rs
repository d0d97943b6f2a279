use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};

use crate::document::RenderFlags;
use crate::geometry::Insets;
use crate::paint::Rgba;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub layout: LayoutConfig,
    pub interaction: InteractionConfig,
    pub render: RenderConfig,
    pub theme: Theme,
}

impl ViewerConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("failed to parse viewer config")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {:?}", path))?;
        Self::from_toml_str(&raw).with_context(|| format!("in config file {:?}", path))
    }

    /// Missing files yield the defaults; malformed files are still errors.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("failed to encode viewer config")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Drop-shadow border drawn around each page.
    pub shade: Insets,
    /// Gap between a page's shade and its neighbours.
    pub page_margin: Insets,
    pub scrollbars: ScrollbarMetrics,
}

impl LayoutConfig {
    pub fn page_insets(&self) -> Insets {
        self.shade + self.page_margin
    }
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            shade: Insets {
                left: 1,
                top: 1,
                right: 3,
                bottom: 3,
            },
            page_margin: Insets::uniform(4),
            scrollbars: ScrollbarMetrics::default(),
        }
    }
}

/// Space taken from the client area when a scrollbar is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrollbarMetrics {
    pub vertical_width: i32,
    pub horizontal_height: i32,
}

impl ScrollbarMetrics {
    pub const NONE: ScrollbarMetrics = ScrollbarMetrics {
        vertical_width: 0,
        horizontal_height: 0,
    };
}

impl Default for ScrollbarMetrics {
    fn default() -> Self {
        Self {
            vertical_width: 17,
            horizontal_height: 17,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionConfig {
    /// Distance in pixels within which a field edge is grabbed.
    pub hit_tolerance: i32,
    /// Smallest field extent, as a fraction of the page's layout extent.
    pub min_size_ratio: f64,
    /// A link press that moves further than this is a drag, not a click.
    pub link_drag_threshold: i32,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            hit_tolerance: 10,
            min_size_ratio: 0.01,
            link_drag_threshold: 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub dpi_x: f32,
    pub dpi_y: f32,
    pub annotations: bool,
    pub dark_mode: bool,
}

impl RenderConfig {
    pub fn flags(&self) -> RenderFlags {
        RenderFlags {
            annotations: self.annotations,
            dark_mode: self.dark_mode,
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            dpi_x: 96.0,
            dpi_y: 96.0,
            annotations: true,
            dark_mode: false,
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Theme {
    #[serde_as(as = "DisplayFromStr")]
    pub background: Rgba,
    #[serde_as(as = "DisplayFromStr")]
    pub page: Rgba,
    #[serde_as(as = "DisplayFromStr")]
    pub shade: Rgba,
    #[serde_as(as = "DisplayFromStr")]
    pub field_outline: Rgba,
    #[serde_as(as = "DisplayFromStr")]
    pub field_hover: Rgba,
    #[serde_as(as = "DisplayFromStr")]
    pub drawing_outline: Rgba,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            background: Rgba::new(0x80, 0x80, 0x80, 0xff),
            page: Rgba::new(0xff, 0xff, 0xff, 0xff),
            shade: Rgba::new(0x40, 0x40, 0x40, 0xff),
            field_outline: Rgba::new(0x00, 0x00, 0xff, 0xff),
            field_hover: Rgba::new(0x9a, 0xcd, 0x32, 0xff),
            drawing_outline: Rgba::new(0x00, 0x00, 0xff, 0xff),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn partial_config_keeps_defaults() {
        let config = ViewerConfig::from_toml_str(
            r##"
            [interaction]
            hit_tolerance = 6

            [theme]
            field_outline = "#ff000080"
            "##,
        )
        .unwrap();

        assert_eq!(config.interaction.hit_tolerance, 6);
        assert_eq!(config.interaction.min_size_ratio, 0.01);
        assert_eq!(config.theme.field_outline, Rgba::new(0xff, 0, 0, 0x80));
        assert_eq!(config.layout, LayoutConfig::default());
    }

    #[test]
    fn config_survives_toml_round_trip() {
        let mut config = ViewerConfig::default();
        config.layout.scrollbars = ScrollbarMetrics::NONE;
        config.render.dark_mode = true;
        let encoded = config.to_toml_string().unwrap();
        let decoded = ViewerConfig::from_toml_str(&encoded).unwrap();
        assert_eq!(decoded, config);
    }

    #[test]
    fn missing_file_yields_default_but_bad_file_errors() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("config.toml");
        assert_eq!(
            ViewerConfig::load_or_default(&missing).unwrap(),
            ViewerConfig::default()
        );

        std::fs::write(&missing, "[theme]\npage = \"white\"\n").unwrap();
        assert!(ViewerConfig::load_or_default(&missing).is_err());
    }
}
