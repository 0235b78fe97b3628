//! Deterministic synthetic images for unit tests.

use image::{GenericImage, GrayImage, Luma};

use crate::types::Point;

fn xorshift(state: &mut u64) -> u64 {
    *state ^= *state << 13;
    *state ^= *state >> 7;
    *state ^= *state << 17;
    *state
}

fn seeded(seed: u64) -> u64 {
    seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1
}

/// Per-pixel uniform noise.
pub fn noise(width: u32, height: u32, seed: u64) -> GrayImage {
    let mut state = seeded(seed);
    GrayImage::from_fn(width, height, |_, _| Luma([(xorshift(&mut state) >> 56) as u8]))
}

/// Uniform noise held constant over `block`×`block` cells.
pub fn blocks(width: u32, height: u32, block: u32, seed: u64) -> GrayImage {
    let cells = noise(width.div_ceil(block), height.div_ceil(block), seed);
    GrayImage::from_fn(width, height, |x, y| *cells.get_pixel(x / block, y / block))
}

pub fn crop(image: &GrayImage, x: u32, y: u32, width: u32, height: u32) -> GrayImage {
    image::imageops::crop_imm(image, x, y, width, height).to_image()
}

pub fn paste(onto: &mut GrayImage, patch: &GrayImage, at: Point) {
    onto.copy_from(patch, at.x as u32, at.y as u32)
        .expect("patch must fit inside the target image");
}
