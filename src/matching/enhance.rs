//! Contrast enhancement and grayscale conversion applied before matching.
//!
//! Enhancement equalizes local contrast of the lightness channel (CIE L*a*b*) with
//! contrast-limited adaptive histogram equalization, leaving chroma untouched, so a
//! template captured under one brightness/gamma setting still matches a live screen
//! captured under another.

use image::{DynamicImage, GrayImage, Luma, RgbImage, RgbaImage};

use crate::types::Matrix;

const CLIP_LIMIT: f32 = 2.0;
const TILE_GRID: u32 = 8;
const BINS: usize = 256;

/// Best-effort local contrast equalization.
///
/// 8-bit RGB, RGBA and gray images keep their layout. Every other layout is first
/// normalized to 8-bit RGB (or RGBA when it carries alpha), so the same pixels score
/// the same whatever bit depth the file was stored with.
pub fn enhance(image: &DynamicImage) -> DynamicImage {
    match image {
        DynamicImage::ImageRgb8(rgb) => DynamicImage::ImageRgb8(enhance_rgb(rgb)),
        DynamicImage::ImageRgba8(rgba) => DynamicImage::ImageRgba8(enhance_rgba(rgba)),
        DynamicImage::ImageLuma8(gray) => DynamicImage::ImageLuma8(clahe(gray)),
        other if other.color().has_alpha() => {
            log::debug!("Normalizing {:?} to 8-bit RGBA before enhancement", other.color());
            DynamicImage::ImageRgba8(enhance_rgba(&other.to_rgba8()))
        }
        other => {
            log::debug!("Normalizing {:?} to 8-bit RGB before enhancement", other.color());
            DynamicImage::ImageRgb8(enhance_rgb(&other.to_rgb8()))
        }
    }
}

/// Luma with BT.601 weights, in the fixed-point form common to image libraries.
pub fn grayscale(image: &DynamicImage) -> GrayImage {
    if let DynamicImage::ImageLuma8(gray) = image {
        return gray.clone();
    }
    let rgb = image.to_rgb8();
    GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        let [r, g, b] = rgb.get_pixel(x, y).0;
        let luma = (r as u32 * 4899 + g as u32 * 9617 + b as u32 * 1868 + 8192) >> 14;
        Luma([luma as u8])
    })
}

fn enhance_rgb(rgb: &RgbImage) -> RgbImage {
    let lab = LabPlanes::from_pixels(rgb.width(), rgb.height(), rgb.pixels().map(|p| p.0));
    let lightness = clahe(&lab.lightness);

    let mut out = rgb.clone();
    for (i, pixel) in out.pixels_mut().enumerate() {
        pixel.0 = lab.to_rgb(i, lightness.as_raw()[i]);
    }
    out
}

fn enhance_rgba(rgba: &RgbaImage) -> RgbaImage {
    let lab = LabPlanes::from_pixels(
        rgba.width(),
        rgba.height(),
        rgba.pixels().map(|p| [p.0[0], p.0[1], p.0[2]]),
    );
    let lightness = clahe(&lab.lightness);

    let mut out = rgba.clone();
    for (i, pixel) in out.pixels_mut().enumerate() {
        let [r, g, b] = lab.to_rgb(i, lightness.as_raw()[i]);
        pixel.0 = [r, g, b, pixel.0[3]];
    }
    out
}

/// Quantized lightness plus the untouched chroma of every pixel.
struct LabPlanes {
    lightness: GrayImage,
    chroma: Vec<(f32, f32)>,
}

impl LabPlanes {
    fn from_pixels(width: u32, height: u32, pixels: impl Iterator<Item = [u8; 3]>) -> Self {
        let mut lightness = Vec::with_capacity((width * height) as usize);
        let mut chroma = Vec::with_capacity((width * height) as usize);
        for rgb in pixels {
            let (l, a, b) = rgb_to_lab(rgb);
            lightness.push((l * 255.0 / 100.0).round().clamp(0.0, 255.0) as u8);
            chroma.push((a, b));
        }
        let lightness = GrayImage::from_raw(width, height, lightness)
            .unwrap_or_else(|| GrayImage::new(width, height));
        Self { lightness, chroma }
    }

    fn to_rgb(&self, index: usize, lightness: u8) -> [u8; 3] {
        let (a, b) = self.chroma[index];
        lab_to_rgb(lightness as f32 * 100.0 / 255.0, a, b)
    }
}

// D65 white point.
const XN: f32 = 0.950456;
const ZN: f32 = 1.088754;

fn srgb_to_linear(v: u8) -> f32 {
    let v = v as f32 / 255.0;
    if v <= 0.04045 {
        v / 12.92
    } else {
        ((v + 0.055) / 1.055).powf(2.4)
    }
}

fn linear_to_srgb(v: f32) -> u8 {
    let v = v.clamp(0.0, 1.0);
    let v = if v <= 0.0031308 {
        v * 12.92
    } else {
        1.055 * v.powf(1.0 / 2.4) - 0.055
    };
    (v * 255.0).round().clamp(0.0, 255.0) as u8
}

fn lab_f(t: f32) -> f32 {
    if t > 0.008856 {
        t.cbrt()
    } else {
        7.787 * t + 16.0 / 116.0
    }
}

fn lab_f_inv(t: f32) -> f32 {
    let cube = t * t * t;
    if cube > 0.008856 {
        cube
    } else {
        (t - 16.0 / 116.0) / 7.787
    }
}

fn rgb_to_lab([r, g, b]: [u8; 3]) -> (f32, f32, f32) {
    let (r, g, b) = (srgb_to_linear(r), srgb_to_linear(g), srgb_to_linear(b));
    let x = (0.412453 * r + 0.357580 * g + 0.180423 * b) / XN;
    let y = 0.212671 * r + 0.715160 * g + 0.072169 * b;
    let z = (0.019334 * r + 0.119193 * g + 0.950227 * b) / ZN;

    let (fx, fy, fz) = (lab_f(x), lab_f(y), lab_f(z));
    let l = if y > 0.008856 {
        116.0 * fy - 16.0
    } else {
        903.3 * y
    };
    (l, 500.0 * (fx - fy), 200.0 * (fy - fz))
}

fn lab_to_rgb(l: f32, a: f32, b: f32) -> [u8; 3] {
    let fy = (l + 16.0) / 116.0;
    let y = if l > 903.3 * 0.008856 {
        fy * fy * fy
    } else {
        l / 903.3
    };
    let fy = lab_f(y);
    let x = lab_f_inv(fy + a / 500.0) * XN;
    let z = lab_f_inv(fy - b / 200.0) * ZN;

    let r = 3.240479 * x - 1.537150 * y - 0.498535 * z;
    let g = -0.969256 * x + 1.875991 * y + 0.041556 * z;
    let b = 0.055648 * x - 0.204043 * y + 1.057311 * z;
    [linear_to_srgb(r), linear_to_srgb(g), linear_to_srgb(b)]
}

/// Contrast-limited adaptive histogram equalization over an 8×8 tile grid.
fn clahe(gray: &GrayImage) -> GrayImage {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return gray.clone();
    }

    let (luts, tile_w, tile_h) = tile_luts(gray);
    let tiles = TILE_GRID as usize;

    // Each pixel blends the lookup tables of the four nearest tile centers.
    GrayImage::from_fn(width, height, |x, y| {
        let value = gray.get_pixel(x, y).0[0] as usize;
        let (tx1, tx2, xa) = neighbours(x, tile_w, tiles);
        let (ty1, ty2, ya) = neighbours(y, tile_h, tiles);

        let top = luts[(ty1, tx1)][value] as f32 * (1.0 - xa) + luts[(ty1, tx2)][value] as f32 * xa;
        let bottom =
            luts[(ty2, tx1)][value] as f32 * (1.0 - xa) + luts[(ty2, tx2)][value] as f32 * xa;
        Luma([(top * (1.0 - ya) + bottom * ya).round().clamp(0.0, 255.0) as u8])
    })
}

/// One lookup table per tile of the fixed grid, plus the tile width and height.
///
/// Sides that the grid does not divide are padded up to the next multiple by mirroring
/// without repeating the edge pixel, so every tile covers the same area.
fn tile_luts(gray: &GrayImage) -> (Matrix<[u8; BINS]>, u32, u32) {
    let (width, height) = gray.dimensions();
    let tile_w = width.div_ceil(TILE_GRID);
    let tile_h = height.div_ceil(TILE_GRID);
    let grid = TILE_GRID as usize;

    let mut luts = Matrix::new(grid, grid, [0u8; BINS]);
    for ty in 0..grid {
        for tx in 0..grid {
            let (x0, y0) = (tx as u32 * tile_w, ty as u32 * tile_h);

            let mut histogram = [0u32; BINS];
            for y in y0..y0 + tile_h {
                let sy = reflect101(y, height);
                for x in x0..x0 + tile_w {
                    histogram[gray.get_pixel(reflect101(x, width), sy).0[0] as usize] += 1;
                }
            }
            luts[(ty, tx)] = tile_lut(&mut histogram, tile_w * tile_h);
        }
    }
    (luts, tile_w, tile_h)
}

/// Mirrors `pos` back into `0..len` as `dcb|abcd|cba`.
fn reflect101(pos: u32, len: u32) -> u32 {
    if len == 1 {
        return 0;
    }
    let period = 2 * (len - 1);
    let folded = pos % period;
    if folded < len {
        folded
    } else {
        period - folded
    }
}

/// Clips the histogram, spreads the excess evenly and returns the equalizing lookup table.
fn tile_lut(histogram: &mut [u32; BINS], area: u32) -> [u8; BINS] {
    let limit = ((CLIP_LIMIT * area as f32 / BINS as f32) as u32).max(1);

    let mut clipped = 0;
    for count in histogram.iter_mut() {
        if *count > limit {
            clipped += *count - limit;
            *count = limit;
        }
    }

    let batch = clipped / BINS as u32;
    let residual = (clipped % BINS as u32) as usize;
    for count in histogram.iter_mut() {
        *count += batch;
    }
    if residual != 0 {
        let step = (BINS / residual).max(1);
        for i in (0..BINS).step_by(step).take(residual) {
            histogram[i] += 1;
        }
    }

    let scale = 255.0 / area as f32;
    let mut lut = [0u8; BINS];
    let mut cumulative = 0u32;
    for (i, count) in histogram.iter().enumerate() {
        cumulative += count;
        lut[i] = (cumulative as f32 * scale).round().clamp(0.0, 255.0) as u8;
    }
    lut
}

/// The two tiles whose centers bracket `pos` along one axis and the weight of the second.
fn neighbours(pos: u32, tile: u32, tiles: usize) -> (usize, usize, f32) {
    let f = pos as f32 / tile as f32 - 0.5;
    let first = f.floor();
    let weight = f - first;
    let last = tiles as isize - 1;
    let t1 = (first as isize).clamp(0, last) as usize;
    let t2 = (first as isize + 1).clamp(0, last) as usize;
    (t1, t2, weight)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::noise;
    use image::{Rgb, Rgba};

    #[test]
    fn keeps_dimensions_and_layout() {
        let rgb = DynamicImage::ImageRgb8(RgbImage::from_pixel(33, 17, Rgb([40, 90, 200])));
        let out = enhance(&rgb);
        assert_eq!((out.width(), out.height()), (33, 17));
        assert!(matches!(out, DynamicImage::ImageRgb8(_)));

        let rgba = DynamicImage::ImageRgba8(RgbaImage::from_pixel(9, 4, Rgba([1, 2, 3, 77])));
        let out = enhance(&rgba);
        assert!(matches!(&out, DynamicImage::ImageRgba8(img) if img.get_pixel(8, 3).0[3] == 77));
    }

    #[test]
    fn other_layouts_enhance_like_their_8bit_form() {
        let gray = DynamicImage::ImageLuma8(noise(24, 18, 3));
        let rgb = DynamicImage::ImageRgb8(gray.to_rgb8());

        let deep = DynamicImage::ImageRgb16(rgb.to_rgb16());
        assert_eq!(enhance(&deep), enhance(&rgb));

        let gray_alpha = DynamicImage::ImageLumaA8(gray.to_luma_alpha8());
        let enhanced = enhance(&gray_alpha);
        assert!(matches!(enhanced, DynamicImage::ImageRgba8(_)));
        assert_eq!(grayscale(&enhanced), grayscale(&enhance(&rgb)));
    }

    #[test]
    fn grid_stays_eight_by_eight_for_uneven_sides() {
        let (luts, tile_w, tile_h) = tile_luts(&noise(20, 13, 6));
        assert_eq!(luts.dims(), (8, 8));
        assert_eq!((tile_w, tile_h), (3, 2));

        let (luts, tile_w, tile_h) = tile_luts(&noise(3, 1, 6));
        assert_eq!(luts.dims(), (8, 8));
        assert_eq!((tile_w, tile_h), (1, 1));
    }

    #[test]
    fn padding_mirrors_without_repeating_the_edge() {
        let folded: Vec<u32> = (0..9).map(|p| reflect101(p, 5)).collect();
        assert_eq!(folded, vec![0, 1, 2, 3, 4, 3, 2, 1, 0]);
        assert_eq!(reflect101(6, 1), 0);
        assert_eq!(reflect101(7, 2), 1);
    }

    #[test]
    fn stretches_low_contrast_gray() {
        let dim = GrayImage::from_fn(64, 64, |x, _| Luma([100 + (x % 8) as u8]));
        let DynamicImage::ImageLuma8(out) = enhance(&DynamicImage::ImageLuma8(dim)) else {
            panic!("layout changed");
        };
        let (min, max) = out
            .pixels()
            .fold((255u8, 0u8), |(lo, hi), p| (lo.min(p.0[0]), hi.max(p.0[0])));
        assert!(max - min > 7, "range {min}..{max} was not stretched");
    }

    #[test]
    fn lab_round_trip_is_close() {
        for rgb in [[0, 0, 0], [255, 255, 255], [12, 200, 77], [250, 3, 128]] {
            let (l, a, b) = rgb_to_lab(rgb);
            let back = lab_to_rgb(l, a, b);
            for (x, y) in rgb.iter().zip(back) {
                assert!((*x as i16 - y as i16).abs() <= 1, "{rgb:?} -> {back:?}");
            }
        }
    }

    #[test]
    fn grayscale_uses_bt601_weights() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(1, 1, Rgb([255, 0, 0])));
        assert_eq!(grayscale(&img).get_pixel(0, 0).0[0], 76);
        let gray = noise(5, 5, 9);
        assert_eq!(grayscale(&DynamicImage::ImageLuma8(gray.clone())), gray);
    }

    #[test]
    fn tiny_images_survive() {
        let one = DynamicImage::ImageLuma8(GrayImage::from_pixel(1, 3, Luma([9])));
        assert_eq!(enhance(&one).height(), 3);
        let empty = DynamicImage::ImageRgb8(RgbImage::new(0, 0));
        assert_eq!(enhance(&empty), empty);
    }
}
