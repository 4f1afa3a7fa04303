//! Thumbnail fitting and placeholder covers
//!
//! The platform rejects cover thumbnails over 64 KB. [`ThumbnailFitter`]
//! normalizes any decodable image to RGB, bounds it to 400×400, and sweeps
//! JPEG quality from 85 down in steps of 10 until the encoding fits. If the
//! sweep bottoms out it retries at 300×300, and if that still misses it
//! returns the smallest encoding it produced rather than failing.
//!
//! Decoding, resizing and encoding are CPU-bound, so the async entry points
//! ([`ThumbnailFitter::fit_async`], [`PlaceholderCover::render_async`]) run
//! them on tokio's blocking pool.

use std::io::Write;
use std::path::{Path, PathBuf};

use ab_glyph::{Font, FontArc, FontVec, PxScale};
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_text_mut, text_size};
use tempfile::NamedTempFile;

use crate::error::{MediaError, Result};

/// Hard ceiling the platform enforces on thumbnail payloads
pub const THUMB_MAX_BYTES: usize = 64 * 1024;

const PRIMARY_BOUND: u32 = 400;
const FALLBACK_BOUND: u32 = 300;
const START_QUALITY: u8 = 85;
const QUALITY_STEP: u8 = 10;
const MIN_QUALITY: u8 = 10;

const PLACEHOLDER_SIZE: u32 = 400;
const PLACEHOLDER_QUALITY: u8 = 85;
const LABEL_SCALE: f32 = 28.0;
const LABEL_PADDING: u32 = 12;
const PLATE_COLOR: Rgb<u8> = Rgb([51, 51, 51]);
const LABEL_COLOR: Rgb<u8> = Rgb([250, 250, 250]);

/// Label drawn on the placeholder cover when none is configured
pub const DEFAULT_PLACEHOLDER_LABEL: &str = "文颜书评";

/// Fonts tried, in order, when no label font is configured
const SYSTEM_FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc",
    "/usr/share/fonts/noto-cjk/NotoSansCJK-Regular.ttc",
    "/usr/share/fonts/google-noto-cjk/NotoSansCJK-Regular.ttc",
    "/usr/share/fonts/truetype/wqy/wqy-microhei.ttc",
    "/usr/share/fonts/wenquanyi/wqy-microhei/wqy-microhei.ttc",
    "/System/Library/Fonts/PingFang.ttc",
    "/System/Library/Fonts/STHeiti Medium.ttc",
    "C:\\Windows\\Fonts\\msyh.ttc",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
];

/// A JPEG produced by the fitter.
#[derive(Debug, Clone)]
pub struct FittedThumbnail {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub quality: u8,
}

impl FittedThumbnail {
    pub fn within(&self, max_bytes: usize) -> bool {
        self.bytes.len() <= max_bytes
    }
}

/// Fits cover images under the thumbnail ceiling.
#[derive(Debug, Clone)]
pub struct ThumbnailFitter {
    max_bytes: usize,
    scratch_dir: Option<PathBuf>,
}

impl Default for ThumbnailFitter {
    fn default() -> Self {
        Self {
            max_bytes: THUMB_MAX_BYTES,
            scratch_dir: None,
        }
    }
}

impl ThumbnailFitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Directory for working files; the system temp dir when unset.
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    /// [`fit`](Self::fit) on the blocking pool.
    pub async fn fit_async(&self, source: Bytes) -> Result<FittedThumbnail> {
        let fitter = self.clone();
        tokio::task::spawn_blocking(move || fitter.fit(&source))
            .await
            .map_err(|e| MediaError::Worker(e.to_string()))?
    }

    /// Decode `source` and re-encode it under the ceiling when possible.
    ///
    /// # Errors
    ///
    /// `MediaError::Image` if the source cannot be decoded or encoded. Missing
    /// the ceiling is not an error.
    pub fn fit(&self, source: &[u8]) -> Result<FittedThumbnail> {
        let decoded = image::load_from_memory(source).map_err(MediaError::from)?;
        let rgb = decoded.to_rgb8();
        let (width, height) = rgb.dimensions();

        let primary = bound(&rgb, PRIMARY_BOUND);
        let mut best = self.sweep(&primary)?;
        if best.within(self.max_bytes) {
            return Ok(best);
        }

        if width > FALLBACK_BOUND || height > FALLBACK_BOUND {
            tracing::debug!(
                bytes = best.bytes.len(),
                "Thumbnail still over ceiling at minimum quality, retrying at {}px",
                FALLBACK_BOUND
            );
            let fallback = bound(&rgb, FALLBACK_BOUND);
            let retry = self.sweep(&fallback)?;
            if retry.bytes.len() < best.bytes.len() {
                best = retry;
            }
        }

        if !best.within(self.max_bytes) {
            tracing::warn!(
                bytes = best.bytes.len(),
                limit = self.max_bytes,
                "Thumbnail exceeds size ceiling, submitting best effort"
            );
        }
        Ok(best)
    }

    /// Quality sweep at a fixed size; returns the first fitting encoding or
    /// the smallest one produced.
    fn sweep(&self, image: &RgbImage) -> Result<FittedThumbnail> {
        let mut qualities =
            std::iter::successors(Some(START_QUALITY), |q| q.checked_sub(QUALITY_STEP))
                .take_while(|q| *q > MIN_QUALITY);

        let mut best = encode_thumbnail(image, qualities.next().unwrap_or(START_QUALITY))?;
        for quality in qualities {
            if best.within(self.max_bytes) {
                break;
            }
            let candidate = encode_thumbnail(image, quality)?;
            if candidate.bytes.len() < best.bytes.len() {
                best = candidate;
            }
        }
        Ok(best)
    }

    /// Write bytes to a scoped scratch file; the file is removed when the
    /// returned handle drops.
    pub fn write_scratch(&self, bytes: &[u8], suffix: &str) -> Result<NamedTempFile> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("wxpub-thumb-").suffix(suffix);

        let mut file = match &self.scratch_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(MediaError::Scratch)?;

        file.write_all(bytes).map_err(MediaError::Scratch)?;
        file.flush().map_err(MediaError::Scratch)?;
        Ok(file)
    }
}

/// Downscale proportionally so neither side exceeds `max_side`.
fn bound(image: &RgbImage, max_side: u32) -> RgbImage {
    let (width, height) = image.dimensions();
    if width <= max_side && height <= max_side {
        return image.clone();
    }
    let ratio = f64::min(
        max_side as f64 / width as f64,
        max_side as f64 / height as f64,
    );
    let new_width = ((width as f64 * ratio) as u32).max(1);
    let new_height = ((height as f64 * ratio) as u32).max(1);
    imageops::resize(image, new_width, new_height, FilterType::Lanczos3)
}

fn encode_thumbnail(image: &RgbImage, quality: u8) -> Result<FittedThumbnail> {
    let (width, height) = image.dimensions();
    Ok(FittedThumbnail {
        bytes: encode_jpeg(image, quality)?,
        width,
        height,
        quality,
    })
}

fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, quality)
        .encode_image(image)
        .map_err(MediaError::from)?;
    Ok(bytes)
}

/// The fallback cover: a light vertical gradient with a dark centered
/// plate carrying a text label.
#[derive(Clone)]
pub struct PlaceholderCover {
    label: String,
    font: Option<FontArc>,
}

impl std::fmt::Debug for PlaceholderCover {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaceholderCover")
            .field("label", &self.label)
            .field("has_font", &self.font.is_some())
            .finish()
    }
}

impl Default for PlaceholderCover {
    fn default() -> Self {
        Self::new(DEFAULT_PLACEHOLDER_LABEL)
    }
}

impl PlaceholderCover {
    /// A placeholder without a font; the plate is drawn blank.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            font: None,
        }
    }

    pub fn with_font(mut self, font: FontArc) -> Self {
        self.font = Some(font);
        self
    }

    /// Resolve a font for `label`: the configured file when it loads and
    /// covers every character, else the first system font that does.
    pub fn discover(label: impl Into<String>, font_path: Option<&Path>) -> Self {
        let label = label.into();
        let font = font_path
            .into_iter()
            .chain(SYSTEM_FONT_CANDIDATES.iter().map(|p| Path::new(*p)))
            .filter_map(|path| load_font(path).map(|font| (path, font)))
            .find(|(_, font)| covers(font, &label));

        match font {
            Some((path, font)) => {
                tracing::debug!(font = %path.display(), "Placeholder label font loaded");
                Self::new(label).with_font(font)
            }
            None => {
                tracing::debug!("No font covers the placeholder label, drawing a blank plate");
                Self::new(label)
            }
        }
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Render as JPEG.
    pub fn render(&self) -> Result<Vec<u8>> {
        let size = PLACEHOLDER_SIZE;
        let mut image = RgbImage::from_fn(size, size, |_, y| {
            let shade = (240.0 - (y as f64 / size as f64) * 50.0) as u8;
            Rgb([shade, shade, shade.saturating_add(20)])
        });

        let plate_width = size / 2;
        let plate_height = size / 10;
        let left = (size - plate_width) / 2;
        let top = (size - plate_height) / 2;
        for y in top..top + plate_height {
            for x in left..left + plate_width {
                image.put_pixel(x, y, PLATE_COLOR);
            }
        }

        if let Some(font) = &self.font {
            let label = self.label.trim();
            if !label.is_empty() {
                let mut scale = PxScale::from(LABEL_SCALE);
                let (mut width, mut height) = text_size(scale, font, label);
                let room = plate_width - LABEL_PADDING;
                if width > room {
                    let shrink = room as f32 / width as f32;
                    scale = PxScale::from(LABEL_SCALE * shrink);
                    (width, height) = text_size(scale, font, label);
                }
                let x = left as i32 + (plate_width as i32 - width as i32) / 2;
                let y = top as i32 + (plate_height as i32 - height as i32) / 2;
                draw_text_mut(&mut image, LABEL_COLOR, x, y, scale, font, label);
            }
        }

        encode_jpeg(&image, PLACEHOLDER_QUALITY)
    }

    /// [`render`](Self::render) on the blocking pool.
    pub async fn render_async(&self) -> Result<Vec<u8>> {
        let placeholder = self.clone();
        tokio::task::spawn_blocking(move || placeholder.render())
            .await
            .map_err(|e| MediaError::Worker(e.to_string()))?
    }
}

/// Load a TrueType/OpenType font or the first face of a collection.
pub fn load_font(path: &Path) -> Option<FontArc> {
    let data = std::fs::read(path).ok()?;
    match FontVec::try_from_vec_and_index(data, 0) {
        Ok(font) => Some(FontArc::new(font)),
        Err(e) => {
            tracing::debug!(font = %path.display(), error = %e, "Unusable font file");
            None
        }
    }
}

fn covers(font: &FontArc, text: &str) -> bool {
    text.chars()
        .filter(|c| !c.is_whitespace())
        .all(|c| font.glyph_id(c).0 != 0)
}
