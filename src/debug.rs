//! Annotated copies of the winning monitor image for visual inspection.

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;
use std::path::{Path, PathBuf};

use crate::error::{LocateError, Result};
use crate::screen::{MatchLocation, MonitorCapture};

const GREEN: Rgb<u8> = Rgb([0, 255, 0]);
const THICKNESS: i32 = 3;
const GLYPH_SCALE: i32 = 3;

/// Draws the matched region and a `M<id>: <confidence>%` label onto a copy of the capture.
pub fn annotate(capture: &MonitorCapture, location: &MatchLocation, confidence: f64) -> RgbImage {
    let mut canvas = capture.image.to_rgb8();
    let origin = location.local_top_left();

    for inset in 0..THICKNESS {
        let (w, h) = (
            location.width as i32 - 2 * inset,
            location.height as i32 - 2 * inset,
        );
        if w <= 0 || h <= 0 {
            break;
        }
        draw_hollow_rect_mut(
            &mut canvas,
            Rect::at(origin.x + inset, origin.y + inset).of_size(w as u32, h as u32),
            GREEN,
        );
    }

    let label = format!("M{}: {:.2}%", location.monitor_id, confidence * 100.0);
    let label_height = 5 * GLYPH_SCALE;
    let label_y = (origin.y - 10 - label_height).max(0);
    draw_label(&mut canvas, &label, origin.x.max(0), label_y);
    canvas
}

/// Writes the artifact as `debug_match_<HHMMSS>.png` inside `dir`.
pub fn save(dir: &Path, image: &RgbImage) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!(
        "debug_match_{}.png",
        chrono::Local::now().format("%H%M%S")
    ));
    image
        .save(&path)
        .map_err(|e| LocateError::Debug(format!("{}: {e}", path.display())))?;
    Ok(path)
}

fn draw_label(canvas: &mut RgbImage, text: &str, x: i32, y: i32) {
    let mut cursor = x;
    for ch in text.chars() {
        if let Some(rows) = glyph(ch) {
            for (row, bits) in rows.iter().enumerate() {
                for col in 0..3 {
                    if bits & (0b100 >> col) != 0 {
                        draw_filled_rect_mut(
                            canvas,
                            Rect::at(cursor + col * GLYPH_SCALE, y + row as i32 * GLYPH_SCALE)
                                .of_size(GLYPH_SCALE as u32, GLYPH_SCALE as u32),
                            GREEN,
                        );
                    }
                }
            }
        }
        cursor += 4 * GLYPH_SCALE;
    }
}

/// 3×5 bitmaps, one row per entry, most significant bit on the left.
fn glyph(ch: char) -> Option<[u8; 5]> {
    Some(match ch {
        '0' => [0b111, 0b101, 0b101, 0b101, 0b111],
        '1' => [0b010, 0b110, 0b010, 0b010, 0b111],
        '2' => [0b111, 0b001, 0b111, 0b100, 0b111],
        '3' => [0b111, 0b001, 0b111, 0b001, 0b111],
        '4' => [0b101, 0b101, 0b111, 0b001, 0b001],
        '5' => [0b111, 0b100, 0b111, 0b001, 0b111],
        '6' => [0b111, 0b100, 0b111, 0b101, 0b111],
        '7' => [0b111, 0b001, 0b010, 0b010, 0b010],
        '8' => [0b111, 0b101, 0b111, 0b101, 0b111],
        '9' => [0b111, 0b101, 0b111, 0b001, 0b111],
        '.' => [0b000, 0b000, 0b000, 0b000, 0b010],
        ':' => [0b000, 0b010, 0b000, 0b010, 0b000],
        '%' => [0b101, 0b001, 0b010, 0b100, 0b101],
        'M' => [0b101, 0b111, 0b111, 0b101, 0b101],
        _ => return None,
    })
}
