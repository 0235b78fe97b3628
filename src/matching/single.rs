use image::GrayImage;

use super::{Backend, Candidate, MatchLabel, MatchMethod, MethodResult};
use crate::types::Size;

/// Every method's outcome at native template size, plus the winner if any method scored above zero.
#[derive(Debug, Clone, PartialEq)]
pub struct SingleScaleMatch {
    pub best: Option<Candidate>,
    pub results: Vec<MethodResult>,
}

impl SingleScaleMatch {
    pub fn confidence(&self) -> f64 {
        self.best.map_or(0.0, |c| c.confidence)
    }
}

/// Tries each method in order and keeps the strictly highest confidence.
///
/// Ties go to the method listed first. A method that fails is recorded in `results`
/// and never wins; the remaining methods still run.
pub fn match_all_methods(
    backend: &Backend,
    screen: &GrayImage,
    template: &GrayImage,
    methods: &[MatchMethod],
) -> SingleScaleMatch {
    let size = Size::of(template);
    let mut best: Option<Candidate> = None;
    let mut results = Vec::with_capacity(methods.len());

    for (method, peak) in backend.peaks(screen, template, methods) {
        let peak = match peak {
            Ok(peak) => peak,
            Err(err) => {
                log::warn!("{method} failed: {err}");
                results.push(MethodResult::Failed {
                    method,
                    reason: err.to_string(),
                });
                continue;
            }
        };

        let confidence = method.confidence(peak.raw);
        log::debug!("{method}: {confidence:.4} at {}", peak.location);
        results.push(MethodResult::Matched {
            method,
            confidence,
            location: peak.location,
        });

        if confidence > best.map_or(0.0, |b| b.confidence) {
            best = Some(Candidate {
                location: peak.location,
                confidence,
                label: MatchLabel::Method(method),
                size,
            });
        }
    }

    SingleScaleMatch { best, results }
}
