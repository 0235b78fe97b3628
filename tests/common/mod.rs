use image::{DynamicImage, GenericImage, GrayImage, Luma};
use std::cell::Cell;
use std::path::PathBuf;
use ui_locator::{CaptureProvider, MonitorCapture, Result};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn noise(width: u32, height: u32, seed: u64) -> GrayImage {
    let mut state = seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1;
    GrayImage::from_fn(width, height, |_, _| {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        Luma([(state >> 56) as u8])
    })
}

pub fn monitor(id: u32, image: GrayImage, offset: (i32, i32)) -> MonitorCapture {
    MonitorCapture::new(id, DynamicImage::ImageLuma8(image), offset)
}

/// Noise screen with `patch` pasted at `(x, y)`.
pub fn screen_with(patch: &GrayImage, x: u32, y: u32, seed: u64) -> GrayImage {
    let mut screen = noise(640, 360, seed);
    screen.copy_from(patch, x, y).unwrap();
    screen
}

/// A fresh, empty directory under the system temp dir.
pub fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("ui_locator_{name}_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// Hands out fixed captures and counts how often it was asked.
pub struct CountingProvider {
    pub captures: Vec<MonitorCapture>,
    pub calls: Cell<usize>,
}

impl CountingProvider {
    pub fn new(captures: Vec<MonitorCapture>) -> Self {
        Self {
            captures,
            calls: Cell::new(0),
        }
    }
}

impl CaptureProvider for CountingProvider {
    fn capture_all(&self) -> Result<Vec<MonitorCapture>> {
        self.calls.set(self.calls.get() + 1);
        Ok(self.captures.clone())
    }
}
