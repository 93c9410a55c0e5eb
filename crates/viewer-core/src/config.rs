//! Scroller configuration
//!
//! Settings can be loaded from a TOML file, overridden from environment
//! variables, or built programmatically with the `with_*` methods.

use crate::geometry::{
    FitMode, GeometryOptions, LayoutPolicy, DEFAULT_HORIZONTAL_PADDING, DEFAULT_PAGE_GAP,
    DEFAULT_VERTICAL_PADDING,
};
use crate::viewport::{DEFAULT_BUFFER_PAGES, DEFAULT_CURRENT_PAGE_FRACTION};
use crate::zoom::{MAX_ZOOM, MIN_ZOOM};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Configuration for a [`crate::VirtualScroller`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrollerConfig {
    /// Vertical gap between pages, and above the first page
    pub page_gap: f64,
    /// Pages kept alive above and below the visible range
    pub buffer_pages: u32,
    /// Width reserved beside pages in fit modes
    pub horizontal_padding: f64,
    /// Height reserved around pages in fit modes
    pub vertical_padding: f64,
    /// Position of the reading line as a fraction of viewport height
    pub current_page_fraction: f64,
    /// Space left above a page when jumping to it
    pub scroll_margin: f64,
    /// Renders allowed in flight at once
    pub max_concurrent_renders: usize,
    /// Pages per published batch while dimensions load in the background
    pub dimension_batch_size: usize,
    /// Physical pixels per layout pixel
    pub device_pixel_ratio: f64,
    /// Fetch page text after each render
    pub text_layer: bool,
    /// Initial fit mode
    pub fit_mode: FitMode,
    /// Initial zoom, used when `fit_mode` is fixed
    pub scale: f64,
}

impl Default for ScrollerConfig {
    fn default() -> Self {
        Self {
            page_gap: DEFAULT_PAGE_GAP,
            buffer_pages: DEFAULT_BUFFER_PAGES,
            horizontal_padding: DEFAULT_HORIZONTAL_PADDING,
            vertical_padding: DEFAULT_VERTICAL_PADDING,
            current_page_fraction: DEFAULT_CURRENT_PAGE_FRACTION,
            scroll_margin: 8.0,
            max_concurrent_renders: 1,
            dimension_batch_size: 64,
            device_pixel_ratio: 1.0,
            text_layer: false,
            fit_mode: FitMode::FitWidth,
            scale: 1.0,
        }
    }
}

impl ScrollerConfig {
    pub fn with_page_gap(mut self, gap: f64) -> Self {
        self.page_gap = gap;
        self
    }

    pub fn with_buffer_pages(mut self, pages: u32) -> Self {
        self.buffer_pages = pages;
        self
    }

    pub fn with_padding(mut self, horizontal: f64, vertical: f64) -> Self {
        self.horizontal_padding = horizontal;
        self.vertical_padding = vertical;
        self
    }

    pub fn with_max_concurrent_renders(mut self, renders: usize) -> Self {
        self.max_concurrent_renders = renders;
        self
    }

    pub fn with_dimension_batch_size(mut self, pages: usize) -> Self {
        self.dimension_batch_size = pages;
        self
    }

    pub fn with_device_pixel_ratio(mut self, ratio: f64) -> Self {
        self.device_pixel_ratio = ratio;
        self
    }

    pub fn with_text_layer(mut self, enabled: bool) -> Self {
        self.text_layer = enabled;
        self
    }

    pub fn with_policy(mut self, policy: LayoutPolicy) -> Self {
        self.fit_mode = policy.mode;
        self.scale = policy.scale;
        self
    }

    pub fn policy(&self) -> LayoutPolicy {
        LayoutPolicy { mode: self.fit_mode, scale: self.scale }
    }

    pub fn geometry_options(&self) -> GeometryOptions {
        GeometryOptions {
            page_gap: self.page_gap,
            horizontal_padding: self.horizontal_padding,
            vertical_padding: self.vertical_padding,
        }
    }

    /// Returns the default configuration file location.
    ///
    /// - Linux: ~/.config/folio/scroller.toml
    /// - macOS: ~/Library/Application Support/folio/scroller.toml
    /// - Windows: %APPDATA%\folio\scroller.toml
    pub fn default_config_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("folio").join("scroller.toml")
        } else {
            PathBuf::from("folio.toml")
        }
    }

    /// Loads configuration from environment variables on top of the defaults.
    ///
    /// Environment variables:
    /// - `FOLIO_PAGE_GAP`, `FOLIO_BUFFER_PAGES`
    /// - `FOLIO_HORIZONTAL_PADDING`, `FOLIO_VERTICAL_PADDING`
    /// - `FOLIO_CURRENT_PAGE_FRACTION`, `FOLIO_SCROLL_MARGIN`
    /// - `FOLIO_MAX_CONCURRENT_RENDERS`, `FOLIO_DIMENSION_BATCH_SIZE`
    /// - `FOLIO_DEVICE_PIXEL_RATIO`, `FOLIO_TEXT_LAYER`
    /// - `FOLIO_FIT_MODE` (`fixed`, `fit-width`, `fit-height`, `fit-page`), `FOLIO_SCALE`
    ///
    /// # Errors
    /// Returns an error if any variable holds a value that does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides()
    }

    /// Applies any `FOLIO_*` environment variables to this configuration.
    ///
    /// # Errors
    /// Returns an error if any variable holds a value that does not parse.
    pub fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        override_from_env(&mut self.page_gap, "FOLIO_PAGE_GAP")?;
        override_from_env(&mut self.buffer_pages, "FOLIO_BUFFER_PAGES")?;
        override_from_env(&mut self.horizontal_padding, "FOLIO_HORIZONTAL_PADDING")?;
        override_from_env(&mut self.vertical_padding, "FOLIO_VERTICAL_PADDING")?;
        override_from_env(&mut self.current_page_fraction, "FOLIO_CURRENT_PAGE_FRACTION")?;
        override_from_env(&mut self.scroll_margin, "FOLIO_SCROLL_MARGIN")?;
        override_from_env(&mut self.max_concurrent_renders, "FOLIO_MAX_CONCURRENT_RENDERS")?;
        override_from_env(&mut self.dimension_batch_size, "FOLIO_DIMENSION_BATCH_SIZE")?;
        override_from_env(&mut self.device_pixel_ratio, "FOLIO_DEVICE_PIXEL_RATIO")?;
        override_from_env(&mut self.text_layer, "FOLIO_TEXT_LAYER")?;
        override_from_env(&mut self.fit_mode, "FOLIO_FIT_MODE")?;
        override_from_env(&mut self.scale, "FOLIO_SCALE")?;
        Ok(self)
    }

    /// Loads configuration from a TOML file.
    ///
    /// Missing keys keep their defaults:
    /// ```toml
    /// page_gap = 12.0
    /// buffer_pages = 3
    /// fit_mode = "fit-width"
    /// ```
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Saves configuration to a TOML file, creating parent directories.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    /// Checks that every value is usable.
    ///
    /// # Errors
    /// Returns the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let non_negative = [
            ("page_gap", self.page_gap),
            ("horizontal_padding", self.horizontal_padding),
            ("vertical_padding", self.vertical_padding),
            ("scroll_margin", self.scroll_margin),
        ];
        for (key, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::OutOfRange { key, reason: "must be a non-negative number" });
            }
        }

        if !(0.0..=1.0).contains(&self.current_page_fraction) {
            return Err(ConfigError::OutOfRange {
                key: "current_page_fraction",
                reason: "must be between 0 and 1",
            });
        }
        if self.max_concurrent_renders == 0 {
            return Err(ConfigError::OutOfRange {
                key: "max_concurrent_renders",
                reason: "must be at least 1",
            });
        }
        if self.dimension_batch_size == 0 {
            return Err(ConfigError::OutOfRange {
                key: "dimension_batch_size",
                reason: "must be at least 1",
            });
        }
        if !self.device_pixel_ratio.is_finite() || self.device_pixel_ratio <= 0.0 {
            return Err(ConfigError::OutOfRange {
                key: "device_pixel_ratio",
                reason: "must be a positive number",
            });
        }
        if !(MIN_ZOOM..=MAX_ZOOM).contains(&self.scale) {
            return Err(ConfigError::OutOfRange { key: "scale", reason: "must be between 0.25 and 4" });
        }

        Ok(())
    }
}

fn override_from_env<T: FromStr>(target: &mut T, key: &'static str) -> Result<(), ConfigError> {
    if let Ok(value) = std::env::var(key) {
        *target = value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value: value.clone() })?;
    }
    Ok(())
}

/// Errors that can occur during configuration operations.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
    #[error("{key} {reason}")]
    OutOfRange { key: &'static str, reason: &'static str },
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}
