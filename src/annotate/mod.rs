use crate::error::Error;
use crate::inference::PixelBox;
use ab_glyph::{FontVec, PxScale};
use anyhow::Result;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use std::path::Path;

const BOX_COLOR: Rgb<u8> = Rgb([255, 255, 0]);
const LABEL_SCALE: f32 = 14.0;
const OUTLINE_WIDTH: u32 = 2;

/// Draws detection boxes and their labels onto event images
pub struct Annotator {
    font: Option<FontVec>,
    scale: PxScale,
}

impl Annotator {
    /// Load the label font from a TrueType/OpenType file
    pub fn load(font_path: &Path) -> Result<Self> {
        let bytes = std::fs::read(font_path)
            .map_err(|e| Error::Io(format!("Failed to read font {:?}: {}", font_path, e)))?;
        let font = FontVec::try_from_vec(bytes)
            .map_err(|e| Error::Config(format!("Invalid font {:?}: {}", font_path, e)))?;

        Ok(Self {
            font: Some(font),
            scale: PxScale::from(LABEL_SCALE),
        })
    }

    /// Annotator that draws outlines but no label text
    pub fn outline_only() -> Self {
        Self {
            font: None,
            scale: PxScale::from(LABEL_SCALE),
        }
    }

    pub fn draws_labels(&self) -> bool {
        self.font.is_some()
    }

    /// Draw every box, then its label just above it
    pub fn annotate(&self, image: &mut RgbImage, boxes: &[PixelBox]) {
        for pixel_box in boxes {
            if pixel_box.width == 0 || pixel_box.height == 0 {
                continue;
            }

            for inset in 0..OUTLINE_WIDTH {
                let width = pixel_box.width.saturating_sub(2 * inset);
                let height = pixel_box.height.saturating_sub(2 * inset);
                if width == 0 || height == 0 {
                    break;
                }
                let rect = Rect::at((pixel_box.x + inset) as i32, (pixel_box.y + inset) as i32)
                    .of_size(width, height);
                draw_hollow_rect_mut(image, rect, BOX_COLOR);
            }

            if let Some(font) = &self.font {
                let text = label_text(pixel_box);
                let (_, text_height) = text_size(self.scale, font, &text);
                let y = (pixel_box.y as i32 - text_height as i32 - 1).max(0);
                draw_text_mut(image, BOX_COLOR, pixel_box.x as i32, y, self.scale, font, &text);
            }
        }
    }
}

/// `"{label}: {score}"` with the score to two decimals
pub fn label_text(pixel_box: &PixelBox) -> String {
    format!("{}: {:.2}", pixel_box.label, pixel_box.score)
}
