//! Frame annotation: boxes, labels and the live statistics overlay.
//!
//! Rendering always works on a copy of the source frame so the original stays
//! available to other consumers.

use std::collections::HashMap;
use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use anyhow::{anyhow, Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;

use crate::detect::{ClassCounts, Detection, VehicleClass};

const BOX_THICKNESS: i32 = 2;
const LABEL_PADDING: i32 = 10;
const LABEL_SCALE: f32 = 20.0;
const OVERLAY_TITLE_SCALE: f32 = 24.0;
const OVERLAY_LINE_SCALE: f32 = 20.0;
const OVERLAY_LINE_STEP: i32 = 30;

const TEXT_COLOR: Rgb<u8> = Rgb([0, 0, 0]);
const OVERLAY_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
pub const DEFAULT_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

/// DejaVu Sans, shipped so labels and the overlay render without any setup.
const BUNDLED_FONT: &[u8] = include_bytes!("../assets/fonts/DejaVuSans.ttf");

/// Per-class box colors. Classes missing from the table use the fallback color.
#[derive(Clone, Debug)]
pub struct Palette {
    colors: HashMap<VehicleClass, Rgb<u8>>,
    fallback: Rgb<u8>,
}

impl Palette {
    pub fn new(entries: impl IntoIterator<Item = (VehicleClass, Rgb<u8>)>) -> Self {
        Self {
            colors: entries.into_iter().collect(),
            fallback: DEFAULT_COLOR,
        }
    }

    pub fn color(&self, class: VehicleClass) -> Rgb<u8> {
        self.colors.get(&class).copied().unwrap_or(self.fallback)
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self::new([
            (VehicleClass::Car, Rgb([0, 255, 0])),
            (VehicleClass::Motorcycle, Rgb([255, 255, 0])),
            (VehicleClass::Bus, Rgb([255, 0, 0])),
            (VehicleClass::Truck, Rgb([255, 0, 255])),
        ])
    }
}

/// `"<class>: <confidence to 2 decimals>"`.
pub fn label_text(detection: &Detection) -> String {
    format!(
        "{}: {:.2}",
        detection.vehicle_class().name(),
        detection.confidence()
    )
}

/// Stateless renderer. Uses the bundled font unless another one is supplied.
/// Only if no font can be parsed are label texts and the overlay skipped.
pub struct Annotator {
    palette: Palette,
    font: Option<FontArc>,
}

impl Annotator {
    pub fn new() -> Self {
        let font = FontArc::try_from_slice(BUNDLED_FONT)
            .map_err(|err| log::warn!("bundled label font unusable: {}", err))
            .ok();
        Self {
            palette: Palette::default(),
            font,
        }
    }

    pub fn with_palette(mut self, palette: Palette) -> Self {
        self.palette = palette;
        self
    }

    pub fn with_font_bytes(mut self, bytes: Vec<u8>) -> Result<Self> {
        let font = FontArc::try_from_vec(bytes).map_err(|_| anyhow!("invalid font data"))?;
        self.font = Some(font);
        Ok(self)
    }

    pub fn with_font_file(self, path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read font file {}", path.display()))?;
        self.with_font_bytes(bytes)
            .with_context(|| format!("failed to parse font file {}", path.display()))
    }

    /// Build from an optional configured font, keeping the bundled one when
    /// the configured file cannot be used.
    pub fn from_font_path(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Annotator::new();
        };
        match Annotator::new().with_font_file(path) {
            Ok(annotator) => annotator,
            Err(err) => {
                log::warn!("label font unavailable, using bundled font: {:#}", err);
                Annotator::new()
            }
        }
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    /// Returns an annotated copy of `frame`.
    pub fn render(&self, frame: &RgbImage, detections: &[Detection]) -> RgbImage {
        let mut out = frame.clone();
        for detection in detections {
            self.draw_detection(&mut out, detection);
        }
        out
    }

    /// Draw the cumulative per-class counters in the top-left corner.
    pub fn draw_stats_overlay(&self, image: &mut RgbImage, counts: &ClassCounts) {
        let Some(font) = self.font.as_ref() else {
            return;
        };
        let mut y = 10;
        draw_text_mut(
            image,
            OVERLAY_COLOR,
            10,
            y,
            PxScale::from(OVERLAY_TITLE_SCALE),
            font,
            "Vehicle Detection Statistics:",
        );
        for (class, count) in counts.non_zero() {
            y += OVERLAY_LINE_STEP;
            draw_text_mut(
                image,
                OVERLAY_COLOR,
                10,
                y,
                PxScale::from(OVERLAY_LINE_SCALE),
                font,
                &format!("{}: {}", class.title(), count),
            );
        }
    }

    fn draw_detection(&self, image: &mut RgbImage, detection: &Detection) {
        let (img_w, img_h) = (image.width() as i32, image.height() as i32);
        if img_w == 0 || img_h == 0 {
            return;
        }
        let color = self.palette.color(detection.vehicle_class());
        let b = detection.bbox();
        let x1 = (b.x1.round() as i32).clamp(0, img_w - 1);
        let y1 = (b.y1.round() as i32).clamp(0, img_h - 1);
        let x2 = (b.x2.round() as i32).clamp(0, img_w);
        let y2 = (b.y2.round() as i32).clamp(0, img_h);

        for t in 0..BOX_THICKNESS {
            let w = x2 - x1 - 2 * t;
            let h = y2 - y1 - 2 * t;
            if w <= 0 || h <= 0 {
                break;
            }
            draw_hollow_rect_mut(
                image,
                Rect::at(x1 + t, y1 + t).of_size(w as u32, h as u32),
                color,
            );
        }

        let label = label_text(detection);
        let (text_w, text_h) = self.text_extent(&label);
        let bg_h = text_h + LABEL_PADDING;
        // Keep the label inside the frame when the box touches the top edge.
        let top = (y1 - bg_h).max(0);
        let bg_w = text_w.min(img_w - x1).max(1);
        let bg_h = bg_h.min(img_h - top).max(1);
        draw_filled_rect_mut(
            image,
            Rect::at(x1, top).of_size(bg_w as u32, bg_h as u32),
            color,
        );

        if let Some(font) = self.font.as_ref() {
            draw_text_mut(
                image,
                TEXT_COLOR,
                x1,
                top + LABEL_PADDING / 2,
                PxScale::from(LABEL_SCALE),
                font,
                &label,
            );
        }
    }

    fn text_extent(&self, text: &str) -> (i32, i32) {
        match self.font.as_ref() {
            Some(font) => {
                let (w, h) = text_size(PxScale::from(LABEL_SCALE), font, text);
                (w as i32, h as i32)
            }
            // Rough glyph box when no font could be loaded.
            None => (
                (text.chars().count() as f32 * LABEL_SCALE * 0.5).ceil() as i32,
                (LABEL_SCALE * 0.7).ceil() as i32,
            ),
        }
    }
}

impl Default for Annotator {
    fn default() -> Self {
        Self::new()
    }
}
