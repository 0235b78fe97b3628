use image::GrayImage;
use opencv::core::{min_max_loc, no_array, Point, Scalar, CV_32FC1, CV_8UC1};
use opencv::imgproc::{self, match_template};
use opencv::prelude::*;

use super::{MatchMethod, Peak, SearchError};
use crate::types::{self, Size};

/// Borrows the pixels of `img` as a single-channel `Mat`. The image must outlive the `Mat`.
fn gray_to_mat(img: &GrayImage) -> opencv::Result<Mat> {
    unsafe {
        Mat::new_rows_cols_with_data_unsafe(
            img.height() as i32,
            img.width() as i32,
            CV_8UC1,
            img.as_ptr() as *mut std::ffi::c_void,
            opencv::core::Mat_AUTO_STEP,
        )
    }
}

fn cv_method(method: MatchMethod) -> i32 {
    match method {
        MatchMethod::CcoeffNormed => imgproc::TM_CCOEFF_NORMED,
        MatchMethod::CcorrNormed => imgproc::TM_CCORR_NORMED,
        MatchMethod::SqdiffNormed => imgproc::TM_SQDIFF_NORMED,
    }
}

/// Runs OpenCV's `matchTemplate` for one method and returns the best raw score.
pub fn find_peak(
    haystack_img: &GrayImage,
    needle_img: &GrayImage,
    method: MatchMethod,
) -> Result<Peak, SearchError> {
    let (image, template) = (Size::of(haystack_img), Size::of(needle_img));
    if image.is_empty() || template.is_empty() {
        return Err(SearchError::EmptyImage);
    }
    if !template.fits_in(image) {
        return Err(SearchError::TemplateLargerThanImage { template, image });
    }

    let haystack = gray_to_mat(haystack_img)?;
    let needle = gray_to_mat(needle_img)?;

    let result_cols = haystack.cols() - needle.cols() + 1;
    let result_rows = haystack.rows() - needle.rows() + 1;
    let mut result =
        Mat::new_rows_cols_with_default(result_rows, result_cols, CV_32FC1, Scalar::all(0.0))?;

    match_template(&haystack, &needle, &mut result, cv_method(method), &no_array())?;

    let (mut min_val, mut max_val) = (0.0, 0.0);
    let (mut min_loc, mut max_loc) = (Point::new(0, 0), Point::new(0, 0));
    min_max_loc(
        &result,
        Some(&mut min_val),
        Some(&mut max_val),
        Some(&mut min_loc),
        Some(&mut max_loc),
        &no_array(),
    )?;

    let (raw, loc) = if method.lower_is_better() {
        (min_val, min_loc)
    } else {
        (max_val, max_loc)
    };
    Ok(Peak {
        raw,
        location: types::Point::new(loc.x, loc.y),
    })
}
