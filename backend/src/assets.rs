//! Logo lookup for PDF rendering
//!
//! Candidates are probed in order and the first one that loads wins. When no
//! image can be used the resolver hands back placeholder text instead, so
//! callers always get something they can draw.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::AppConfig;
use crate::error::{Error, Result};

/// Last resort when even the styled placeholder cannot be built.
pub const FALLBACK_LOGO_TEXT: &str = "LOGISTICS\nDelivery Services";

const POINTS_PER_INCH: f32 = 72.0;

/// A length in PDF points (1/72 inch).
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct Length(f32);

impl Length {
    pub fn inches(value: f32) -> Self {
        Self(value * POINTS_PER_INCH)
    }

    pub fn as_points(self) -> f32 {
        self.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    Left,
}

/// An image placed at a fixed size on the page.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LogoImage {
    pub path: PathBuf,
    pub width: Length,
    pub height: Length,
    pub align: Alignment,
    /// Intrinsic size of the source file in pixels
    pub pixel_size: (u32, u32),
}

/// Two lines of text standing in for the logo; the first is the headline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TextBlock {
    pub headline: String,
    pub subline: String,
}

impl TextBlock {
    pub fn new(headline: impl Into<String>, subline: impl Into<String>) -> Result<Self> {
        let headline = headline.into();
        let subline = subline.into();

        for line in [&headline, &subline] {
            if line.trim().is_empty() {
                return Err(Error::invalid_text("placeholder lines must not be blank"));
            }
            if line.chars().any(char::is_control) {
                return Err(Error::invalid_text(format!(
                    "placeholder line contains control characters: {:?}",
                    line
                )));
            }
        }

        Ok(Self { headline, subline })
    }

    pub fn render(&self) -> String {
        format!("{}\n{}", self.headline, self.subline)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Logo {
    Image(LogoImage),
    Text(TextBlock),
    Literal { text: &'static str },
}

impl Logo {
    pub fn is_placeholder(&self) -> bool {
        !matches!(self, Logo::Image(_))
    }

    /// Plain text of a placeholder, `None` for images.
    pub fn placeholder_text(&self) -> Option<String> {
        match self {
            Logo::Image(_) => None,
            Logo::Text(block) => Some(block.render()),
            Logo::Literal { text } => Some((*text).to_string()),
        }
    }
}

/// Turns a file on disk into a placed image.
pub trait ImageLoader: Send + Sync {
    fn load(&self, path: &Path, width: Length, height: Length) -> Result<LogoImage>;
}

/// Reads the file header with the `image` crate to confirm it is a decodable
/// image and to learn its pixel size.
#[derive(Clone, Copy, Debug, Default)]
pub struct FsImageLoader;

impl ImageLoader for FsImageLoader {
    fn load(&self, path: &Path, width: Length, height: Length) -> Result<LogoImage> {
        let pixel_size = image::ImageReader::open(path)?
            .with_guessed_format()?
            .into_dimensions()?;

        Ok(LogoImage {
            path: path.to_path_buf(),
            width,
            height,
            align: Alignment::Left,
            pixel_size,
        })
    }
}

pub struct LogoResolver<L = FsImageLoader> {
    candidates: Vec<PathBuf>,
    base_dir: Option<PathBuf>,
    headline: String,
    subline: String,
    loader: L,
}

impl LogoResolver<FsImageLoader> {
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.logo_search_paths.clone(),
            config.brand_name.clone(),
            config.brand_tagline.clone(),
            FsImageLoader,
        )
        .with_base_dir(config.asset_base_dir.clone())
    }
}

impl<L: ImageLoader> LogoResolver<L> {
    pub const HEADER_WIDTH: f32 = 2.0;
    pub const HEADER_HEIGHT: f32 = 1.0;
    pub const TABLE_WIDTH: f32 = 1.5;
    pub const TABLE_HEIGHT: f32 = 0.75;

    pub fn new(
        candidates: Vec<PathBuf>,
        headline: impl Into<String>,
        subline: impl Into<String>,
        loader: L,
    ) -> Self {
        Self {
            candidates,
            base_dir: None,
            headline: headline.into(),
            subline: subline.into(),
            loader,
        }
    }

    /// Relative candidates are looked up under `base_dir` instead of the
    /// working directory.
    pub fn with_base_dir(mut self, base_dir: Option<PathBuf>) -> Self {
        self.base_dir = base_dir;
        self
    }

    pub fn candidates(&self) -> impl Iterator<Item = PathBuf> + '_ {
        self.candidates
            .iter()
            .map(|candidate| match &self.base_dir {
                Some(base) if candidate.is_relative() => base.join(candidate),
                _ => candidate.clone(),
            })
    }

    /// Returns the first candidate that loads at `width × height`, or a
    /// placeholder when none does.
    pub fn resolve(&self, width: Length, height: Length) -> Logo {
        for path in self.candidates() {
            if !path.exists() {
                continue;
            }

            match self.loader.load(&path, width, height) {
                Ok(image) => {
                    tracing::debug!(path = %path.display(), "resolved logo image");
                    return Logo::Image(image);
                }
                Err(err) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to load logo candidate; trying next",
                    );
                }
            }
        }

        self.placeholder()
    }

    pub fn resolve_header(&self) -> Logo {
        self.resolve(
            Length::inches(Self::HEADER_WIDTH),
            Length::inches(Self::HEADER_HEIGHT),
        )
    }

    /// Smaller variant for tabular layouts.
    pub fn resolve_for_table(&self) -> Logo {
        self.resolve(
            Length::inches(Self::TABLE_WIDTH),
            Length::inches(Self::TABLE_HEIGHT),
        )
    }

    fn placeholder(&self) -> Logo {
        match TextBlock::new(self.headline.as_str(), self.subline.as_str()) {
            Ok(block) => {
                tracing::info!("no logo image found; using text placeholder");
                Logo::Text(block)
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to build text placeholder");
                Logo::Literal {
                    text: FALLBACK_LOGO_TEXT,
                }
            }
        }
    }
}
