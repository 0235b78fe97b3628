//! Normalized template correlation.
//!
//! All three score maps share the same ingredients: the cross term `Σ T·I` for every
//! placement of the template, and the sum / sum of squares of the image window under
//! it. The cross term is computed directly for small inputs and through a 2D FFT for
//! large ones; window statistics come from summed-area tables.

use image::GrayImage;
use rayon::prelude::*;
use rustfft::{num_complex::Complex, FftDirection, FftPlanner};

use super::{MatchMethod, Peak, SearchError};
use crate::types::{Matrix, Point, Size};

/// Above this many multiply-adds the cross term goes through the FFT.
const DIRECT_LIMIT: u64 = 1 << 24;

/// Everything needed to score one (image, template) pair under any method.
pub struct Correlation {
    cross: Matrix<f64>,
    windows: SummedArea,
    template: Size,
    template_sum: f64,
    template_squares: f64,
}

impl Correlation {
    pub fn new(image: &GrayImage, template: &GrayImage) -> Result<Self, SearchError> {
        let (image_size, template_size) = (Size::of(image), Size::of(template));
        if image_size.is_empty() || template_size.is_empty() {
            return Err(SearchError::EmptyImage);
        }
        if !template_size.fits_in(image_size) {
            return Err(SearchError::TemplateLargerThanImage {
                template: template_size,
                image: image_size,
            });
        }

        let (template_sum, template_squares) = template.pixels().fold((0.0, 0.0), |acc, p| {
            let v = p.0[0] as f64;
            (acc.0 + v, acc.1 + v * v)
        });

        Ok(Self {
            cross: cross_correlation(image, template),
            windows: SummedArea::new(image),
            template: template_size,
            template_sum,
            template_squares,
        })
    }

    fn area(&self) -> f64 {
        self.template.width as f64 * self.template.height as f64
    }

    /// Norm of the mean-subtracted template.
    fn template_centered_norm(&self) -> f64 {
        (self.template_squares - self.template_sum * self.template_sum / self.area())
            .max(0.0)
            .sqrt()
    }

    /// Raw scores for every placement, `(image - template + 1)` in each dimension.
    pub fn score_map(&self, method: MatchMethod) -> Matrix<f64> {
        let (rows, cols) = self.cross.dims();

        // A flat template correlates equally well everywhere.
        if method == MatchMethod::CcoeffNormed && self.template_centered_norm() < f64::EPSILON {
            return Matrix::new(rows, cols, 1.0);
        }

        let mut scores = Matrix::new(rows, cols, 0.0);
        scores.par_enumerate_rows_mut().for_each(|(y, row)| {
            for (x, score) in row.iter_mut().enumerate() {
                *score = self.score_at(method, x, y);
            }
        });
        scores
    }

    fn score_at(&self, method: MatchMethod, x: usize, y: usize) -> f64 {
        let cross = self.cross[(y, x)];
        let (sum, squares) = self.windows.window(
            x,
            y,
            self.template.width as usize,
            self.template.height as usize,
        );

        match method {
            MatchMethod::CcorrNormed => {
                normalize(method, cross, (squares * self.template_squares).sqrt())
            }
            MatchMethod::SqdiffNormed => normalize(
                method,
                (self.template_squares - 2.0 * cross + squares).max(0.0),
                (squares * self.template_squares).sqrt(),
            ),
            MatchMethod::CcoeffNormed => {
                let area = self.area();
                let numerator = cross - sum * self.template_sum / area;
                let window_norm = (squares - sum * sum / area).max(0.0).sqrt();
                normalize(
                    method,
                    numerator,
                    window_norm * self.template_centered_norm(),
                )
            }
        }
    }

    pub fn peak(&self, method: MatchMethod) -> Peak {
        let worst = if method.lower_is_better() { 1.0 } else { 0.0 };
        find_peak(&self.score_map(method), method.lower_is_better()).unwrap_or(Peak {
            raw: worst,
            location: Point::default(),
        })
    }
}

/// Divides by the normalization term, saturating when the term is (numerically) zero.
fn normalize(method: MatchMethod, numerator: f64, denominator: f64) -> f64 {
    if numerator.abs() < denominator {
        numerator / denominator
    } else if numerator.abs() < denominator * 1.125 {
        numerator.signum()
    } else if method.lower_is_better() {
        1.0
    } else {
        0.0
    }
}

/// Locates the best score in row-major order. The first of several equal scores wins.
pub fn find_peak(scores: &Matrix<f64>, lower_is_better: bool) -> Option<Peak> {
    let mut best: Option<Peak> = None;
    for (row, col, &raw) in scores.indexed_iter() {
        if raw.is_nan() {
            continue;
        }
        let better = match best {
            None => true,
            Some(peak) if lower_is_better => raw < peak.raw,
            Some(peak) => raw > peak.raw,
        };
        if better {
            best = Some(Peak {
                raw,
                location: Point::new(col as i32, row as i32),
            });
        }
    }
    best
}

/// `Σ T·I` for every placement of the template inside the image.
pub fn cross_correlation(image: &GrayImage, template: &GrayImage) -> Matrix<f64> {
    let (iw, ih) = image.dimensions();
    let (tw, th) = template.dimensions();
    let placements = (iw - tw + 1) as u64 * (ih - th + 1) as u64;

    if placements * (tw as u64 * th as u64) <= DIRECT_LIMIT {
        cross_direct(image, template)
    } else {
        cross_fft(image, template)
    }
}

pub(crate) fn cross_direct(image: &GrayImage, template: &GrayImage) -> Matrix<f64> {
    let (iw, ih) = (image.width() as usize, image.height() as usize);
    let (tw, th) = (template.width() as usize, template.height() as usize);
    let (pixels, kernel) = (image.as_raw(), template.as_raw());

    let mut cross = Matrix::new(ih - th + 1, iw - tw + 1, 0.0);
    cross.par_enumerate_rows_mut().for_each(|(y, row)| {
        for (x, value) in row.iter_mut().enumerate() {
            let mut acc = 0u64;
            for dy in 0..th {
                let start = (y + dy) * iw + x;
                let window = &pixels[start..start + tw];
                let taps = &kernel[dy * tw..(dy + 1) * tw];
                acc += window
                    .iter()
                    .zip(taps)
                    .map(|(&a, &b)| a as u64 * b as u64)
                    .sum::<u64>();
            }
            *value = acc as f64;
        }
    });
    cross
}

pub(crate) fn cross_fft(image: &GrayImage, template: &GrayImage) -> Matrix<f64> {
    let (iw, ih) = (image.width() as usize, image.height() as usize);
    let (tw, th) = (template.width() as usize, template.height() as usize);
    let (rows, cols) = (fft_len(ih), fft_len(iw));

    // Both operands are zero padded to the same shape, so the circular correlation
    // never wraps for placements that keep the template inside the image.
    let (mut spectrum, kernel) = rayon::join(
        || fft2d(to_complex(image, rows, cols), FftDirection::Forward),
        || fft2d(to_complex(template, rows, cols), FftDirection::Forward),
    );

    spectrum
        .as_mut()
        .par_iter_mut()
        .zip(kernel.as_ref().par_iter())
        .for_each(|(a, b)| *a *= b.conj());

    let correlation = fft2d(spectrum, FftDirection::Inverse);
    let scale = (rows * cols) as f64;

    let mut cross = Matrix::new(ih - th + 1, iw - tw + 1, 0.0);
    cross.par_enumerate_rows_mut().for_each(|(y, row)| {
        let source = correlation.row(y);
        for (x, value) in row.iter_mut().enumerate() {
            *value = source[x].re / scale;
        }
    });
    cross
}

fn to_complex(image: &GrayImage, rows: usize, cols: usize) -> Matrix<Complex<f64>> {
    let mut matrix = Matrix::new(rows, cols, Complex::new(0.0, 0.0));
    for (x, y, pixel) in image.enumerate_pixels() {
        matrix[(y as usize, x as usize)] = Complex::new(pixel.0[0] as f64, 0.0);
    }
    matrix
}

/// Unnormalized 2D transform: rows first, then columns through a transpose.
fn fft2d(matrix: Matrix<Complex<f64>>, direction: FftDirection) -> Matrix<Complex<f64>> {
    let (rows, cols) = matrix.dims();
    let mut planner = FftPlanner::new();
    let row_fft = planner.plan_fft(cols, direction);
    let col_fft = planner.plan_fft(rows, direction);

    let mut matrix = matrix;
    matrix.par_iter_rows_mut().for_each(|row| row_fft.process(row));

    let mut transposed = matrix.transposed();
    transposed
        .par_iter_rows_mut()
        .for_each(|col| col_fft.process(col));

    transposed.transposed()
}

/// Smallest length `>= n` whose prime factors are all 2, 3 or 5.
pub(crate) fn fft_len(n: usize) -> usize {
    let mut candidate = n.max(1);
    loop {
        let mut rest = candidate;
        for p in [2, 3, 5] {
            while rest % p == 0 {
                rest /= p;
            }
        }
        if rest == 1 {
            return candidate;
        }
        candidate += 1;
    }
}

/// Inclusive prefix sums of pixel values and squared pixel values, padded by one row and column.
struct SummedArea {
    sums: Matrix<f64>,
    squares: Matrix<f64>,
}

impl SummedArea {
    fn new(image: &GrayImage) -> Self {
        let (w, h) = (image.width() as usize, image.height() as usize);
        let mut sums = Matrix::new(h + 1, w + 1, 0.0);
        let mut squares = Matrix::new(h + 1, w + 1, 0.0);

        for y in 0..h {
            let (mut row_sum, mut row_squares) = (0.0, 0.0);
            for x in 0..w {
                let v = image.get_pixel(x as u32, y as u32).0[0] as f64;
                row_sum += v;
                row_squares += v * v;
                sums[(y + 1, x + 1)] = sums[(y, x + 1)] + row_sum;
                squares[(y + 1, x + 1)] = squares[(y, x + 1)] + row_squares;
            }
        }

        Self { sums, squares }
    }

    /// Sum and sum of squares over the `w`×`h` window whose top-left corner is `(x, y)`.
    fn window(&self, x: usize, y: usize, w: usize, h: usize) -> (f64, f64) {
        let area = |table: &Matrix<f64>| {
            table[(y + h, x + w)] - table[(y, x + w)] - table[(y + h, x)] + table[(y, x)]
        };
        (area(&self.sums), area(&self.squares))
    }
}
