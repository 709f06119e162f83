//! Output canvas and snapshot compositing.

use crate::error::{CaptureError, Result};
use crate::zoom::ScaleFactor;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use image::imageops::{self, FilterType};
use image::{ImageFormat, RgbaImage};
use std::io::Cursor;
use std::path::Path;

/// Region of one snapshot to composite, in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileSource {
    /// Left edge of the container's client box in the viewport.
    pub left: f64,
    /// Top edge of the container's client box in the viewport.
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

/// The growing output image of a session.
pub struct Canvas {
    image: RgbaImage,
    scale: ScaleFactor,
}

impl Canvas {
    /// Allocates `width × scale` by `height × scale` pixels for a container of the given CSS size.
    pub fn new(width: u32, height: u32, scale: ScaleFactor) -> Result<Self> {
        let (w, h) = (
            scale.to_output(f64::from(width)),
            scale.to_output(f64::from(height)),
        );
        if w == 0 || h == 0 {
            return Err(CaptureError::EmptyContainer);
        }
        Ok(Self {
            image: RgbaImage::new(w, h),
            scale,
        })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Decodes a base64 PNG snapshot and draws `source` at scroll offset `cursor`.
    ///
    /// The tile spans output rows `[cursor × scale, (cursor + height) × scale)`, so
    /// consecutive tiles meet without gaps and the last one ends on the canvas edge.
    /// Rows already drawn are overwritten.
    pub fn draw_snapshot(&mut self, encoded: &str, source: TileSource, cursor: f64) -> Result<()> {
        let bytes = BASE64.decode(encoded.trim())?;
        let snapshot = image::load_from_memory_with_format(&bytes, ImageFormat::Png)?.to_rgba8();
        self.draw_image(&snapshot, source, cursor)
    }

    /// Only the part of the container inside the snapshot is drawn. Rows clipped at
    /// the top shift the tile down by the same amount, so every drawn row still
    /// lands at `(cursor + row) × scale`.
    pub(crate) fn draw_image(
        &mut self,
        snapshot: &RgbaImage,
        source: TileSource,
        cursor: f64,
    ) -> Result<()> {
        let scale = self.scale;
        let (shot_w, shot_h) = (
            f64::from(snapshot.width()) / scale.zoom(),
            f64::from(snapshot.height()) / scale.zoom(),
        );

        // Visible part of the container, in CSS pixels of the viewport.
        let left = source.left.max(0.0);
        let top = source.top.max(0.0);
        let right = (source.left + source.width).min(shot_w);
        let bottom = (source.top + source.height).min(shot_h);
        if right <= left || bottom <= top {
            return Err(CaptureError::RenderError(format!(
                "container at ({}, {}) lies outside the {}x{} snapshot",
                source.left,
                source.top,
                snapshot.width(),
                snapshot.height()
            )));
        }

        let src_x = scale.to_snapshot(left);
        let src_y = scale.to_snapshot(top);
        let src_w = scale.to_snapshot(right).min(snapshot.width()).saturating_sub(src_x);
        let src_h = scale.to_snapshot(bottom).min(snapshot.height()).saturating_sub(src_y);

        // Anything overhanging the canvas is clipped by `replace`, not squeezed.
        let dest_x = scale.to_output(left - source.left);
        let dest_y = scale.to_output(cursor + (top - source.top));
        let dest_w = scale.to_output(right - source.left).saturating_sub(dest_x);
        let dest_h = scale
            .to_output(cursor + (bottom - source.top))
            .saturating_sub(dest_y);
        if src_w == 0 || src_h == 0 || dest_w == 0 || dest_h == 0 || dest_y >= self.height() {
            return Ok(());
        }

        let tile = imageops::crop_imm(snapshot, src_x, src_y, src_w, src_h).to_image();
        let tile = if tile.dimensions() == (dest_w, dest_h) {
            tile
        } else {
            imageops::resize(&tile, dest_w, dest_h, FilterType::Triangle)
        };
        imageops::replace(&mut self.image, &tile, i64::from(dest_x), i64::from(dest_y));
        Ok(())
    }

    /// Encodes the canvas as PNG.
    pub fn finish(self) -> Result<StitchedImage> {
        let (width, height) = self.image.dimensions();
        let mut data = Vec::new();
        self.image
            .write_to(&mut Cursor::new(&mut data), ImageFormat::Png)?;
        Ok(StitchedImage {
            width,
            height,
            data,
        })
    }
}

/// Final PNG of a capture session.
#[derive(Debug, Clone)]
pub struct StitchedImage {
    pub width: u32,
    pub height: u32,
    /// PNG bytes.
    pub data: Vec<u8>,
}

impl StitchedImage {
    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.data)
    }

    /// `data:` URL, handy for handing the image to a page.
    pub fn to_data_url(&self) -> String {
        format!("data:image/png;base64,{}", self.to_base64())
    }

    /// File name of the form `scrollcap_20240102T030405123Z.png`.
    pub fn default_file_name() -> String {
        format!(
            "scrollcap_{}.png",
            chrono::Utc::now().format("%Y%m%dT%H%M%S%3fZ")
        )
    }

    pub fn save(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        std::fs::write(path, &self.data)
    }
}
