pub mod correlate;
pub mod enhance;
pub mod multiscale;
#[cfg(feature = "opencv")]
pub(crate) mod opencv;
pub mod single;

use image::GrayImage;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

use crate::types::{Point, Size};

pub use enhance::{enhance, grayscale};
pub use multiscale::{match_multi_scale, MultiScaleMatch};
pub use single::{match_all_methods, SingleScaleMatch};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SearchError {
    #[error("template {template} does not fit inside image {image}")]
    TemplateLargerThanImage { template: Size, image: Size },
    #[error("cannot match an empty image")]
    EmptyImage,
    #[cfg(feature = "opencv")]
    #[error("opencv: {0}")]
    OpenCV(String),
}

#[cfg(feature = "opencv")]
impl From<::opencv::Error> for SearchError {
    fn from(value: ::opencv::Error) -> Self {
        SearchError::OpenCV(value.to_string())
    }
}

/// The comparison families tried on every monitor, in tie-break order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display,
)]
pub enum MatchMethod {
    /// Correlation after mean subtraction. Insensitive to uniform brightness shifts.
    #[serde(rename = "TM_CCOEFF_NORMED")]
    #[display(fmt = "TM_CCOEFF_NORMED")]
    CcoeffNormed,
    /// Raw correlation. Cheap, but brightness sensitive.
    #[serde(rename = "TM_CCORR_NORMED")]
    #[display(fmt = "TM_CCORR_NORMED")]
    CcorrNormed,
    /// Pixel-wise distance, lower raw scores are better.
    #[serde(rename = "TM_SQDIFF_NORMED")]
    #[display(fmt = "TM_SQDIFF_NORMED")]
    SqdiffNormed,
}

impl MatchMethod {
    pub const ALL: [MatchMethod; 3] = [
        MatchMethod::CcoeffNormed,
        MatchMethod::CcorrNormed,
        MatchMethod::SqdiffNormed,
    ];

    pub fn lower_is_better(self) -> bool {
        matches!(self, MatchMethod::SqdiffNormed)
    }

    /// Maps a raw score onto the shared higher-is-better confidence scale.
    pub fn confidence(self, raw: f64) -> f64 {
        match self {
            MatchMethod::SqdiffNormed => 1.0 - raw.clamp(0.0, 1.0),
            _ => raw,
        }
    }
}

/// Best raw score of one score map and where it sits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    pub raw: f64,
    pub location: Point,
}

/// Outcome of one comparison method on one image pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MethodResult {
    Matched {
        method: MatchMethod,
        confidence: f64,
        location: Point,
    },
    Failed {
        method: MatchMethod,
        #[serde(rename = "error")]
        reason: String,
    },
}

impl MethodResult {
    pub fn method(&self) -> MatchMethod {
        match self {
            MethodResult::Matched { method, .. } | MethodResult::Failed { method, .. } => *method,
        }
    }

    pub fn confidence(&self) -> Option<f64> {
        match self {
            MethodResult::Matched { confidence, .. } => Some(*confidence),
            MethodResult::Failed { .. } => None,
        }
    }
}

/// Outcome of the correlation-coefficient method at one resampled template size.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ScaleResult {
    Matched {
        scale: f64,
        confidence: f64,
        location: Point,
    },
    Failed {
        scale: f64,
        #[serde(rename = "error")]
        reason: String,
    },
}

impl ScaleResult {
    pub fn scale(&self) -> f64 {
        match self {
            ScaleResult::Matched { scale, .. } | ScaleResult::Failed { scale, .. } => *scale,
        }
    }

    pub fn confidence(&self) -> Option<f64> {
        match self {
            ScaleResult::Matched { confidence, .. } => Some(*confidence),
            ScaleResult::Failed { .. } => None,
        }
    }
}

/// Names what produced a candidate: a method at native size or a resampled template.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MatchLabel {
    Method(MatchMethod),
    Scaled { scale: f64 },
}

impl fmt::Display for MatchLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchLabel::Method(method) => write!(f, "{method}"),
            MatchLabel::Scaled { scale } => write!(f, "Multi-scale ({scale}x)"),
        }
    }
}

impl Serialize for MatchLabel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A located region inside one searched image, before any monitor offset is applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub location: Point,
    pub confidence: f64,
    pub label: MatchLabel,
    /// Size of the template that produced the match.
    pub size: Size,
}

/// Which implementation computes score maps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Backend {
    /// Pure Rust correlation, spatial for small inputs and FFT based for large ones.
    #[default]
    Native,
    #[cfg(feature = "opencv")]
    OpenCV,
}

impl Backend {
    /// Runs every method in `methods` against one image pair, keeping each outcome separate.
    pub fn peaks(
        &self,
        image: &GrayImage,
        template: &GrayImage,
        methods: &[MatchMethod],
    ) -> Vec<(MatchMethod, Result<Peak, SearchError>)> {
        match self {
            Backend::Native => match correlate::Correlation::new(image, template) {
                Ok(correlation) => methods
                    .iter()
                    .map(|&method| (method, Ok(correlation.peak(method))))
                    .collect(),
                Err(err) => methods.iter().map(|&m| (m, Err(err.clone()))).collect(),
            },
            #[cfg(feature = "opencv")]
            Backend::OpenCV => methods
                .iter()
                .map(|&method| (method, opencv::find_peak(image, template, method)))
                .collect(),
        }
    }

    pub fn peak(
        &self,
        image: &GrayImage,
        template: &GrayImage,
        method: MatchMethod,
    ) -> Result<Peak, SearchError> {
        self.peaks(image, template, &[method])
            .pop()
            .map(|(_, peak)| peak)
            .unwrap_or(Err(SearchError::EmptyImage))
    }
}
