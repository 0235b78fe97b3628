use image::imageops::{self, FilterType};
use image::GrayImage;

use super::{Backend, Candidate, MatchLabel, MatchMethod, ScaleResult};
use crate::config::SearchPlan;
use crate::types::Size;

/// Multi-scale search runs this single method at every scale to bound its cost.
pub const SCALE_METHOD: MatchMethod = MatchMethod::CcoeffNormed;

#[derive(Debug, Clone, PartialEq)]
pub struct MultiScaleMatch {
    /// Set only when some scale beat the confidence the search started from.
    pub best: Option<Candidate>,
    /// The resampled template behind `best`.
    pub template: Option<GrayImage>,
    /// One entry per attempted scale. Scales that produce unusable sizes are absent.
    pub attempts: Vec<ScaleResult>,
}

/// Resamples the template by each factor of the plan and keeps a scale only if it beats
/// both every earlier scale and `base_confidence`.
pub fn match_multi_scale(
    backend: &Backend,
    screen: &GrayImage,
    template: &GrayImage,
    base_confidence: f64,
    plan: &SearchPlan,
) -> MultiScaleMatch {
    let screen_size = Size::of(screen);
    let mut outcome = MultiScaleMatch {
        best: None,
        template: None,
        attempts: Vec::new(),
    };
    let mut running = base_confidence;

    for &scale in &plan.scales {
        let Some(size) = plan.scaled_size(Size::of(template), scale) else {
            log::debug!("Skipping scale {scale}x: degenerate size");
            continue;
        };
        if !size.fits_in(screen_size) {
            log::debug!("Skipping scale {scale}x: {size} exceeds {screen_size}");
            continue;
        }

        let scaled = imageops::resize(template, size.width, size.height, FilterType::Triangle);
        match backend.peak(screen, &scaled, SCALE_METHOD) {
            Ok(peak) => {
                let confidence = SCALE_METHOD.confidence(peak.raw);
                log::debug!("Scale {scale}x: {confidence:.4} at {}", peak.location);
                outcome.attempts.push(ScaleResult::Matched {
                    scale,
                    confidence,
                    location: peak.location,
                });

                if confidence > running {
                    running = confidence;
                    outcome.best = Some(Candidate {
                        location: peak.location,
                        confidence,
                        label: MatchLabel::Scaled { scale },
                        size,
                    });
                    outcome.template = Some(scaled);
                }
            }
            Err(err) => {
                log::warn!("Scale {scale}x failed: {err}");
                outcome.attempts.push(ScaleResult::Failed {
                    scale,
                    reason: err.to_string(),
                });
            }
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{blocks, paste};
    use crate::types::Point;

    fn scene(scale: f64) -> (GrayImage, GrayImage, Point) {
        let template = blocks(40, 40, 6, 17);
        let side = (40.0 * scale) as u32;
        let shown = imageops::resize(&template, side, side, FilterType::Triangle);
        let mut screen = blocks(200, 150, 5, 3);
        let at = Point::new(71, 38);
        paste(&mut screen, &shown, at);
        (screen, template, at)
    }

    #[test]
    fn finds_enlarged_target() {
        let (screen, template, at) = scene(1.2);
        let outcome = match_multi_scale(
            &Backend::Native,
            &screen,
            &template,
            0.6,
            &SearchPlan::default(),
        );

        let best = outcome.best.unwrap();
        assert_eq!(best.label, MatchLabel::Scaled { scale: 1.2 });
        assert_eq!(best.location, at);
        assert_eq!(best.size, Size::new(48, 48));
        assert!(best.confidence > 0.99);
        assert_eq!(outcome.template.map(|t| t.dimensions()), Some((48, 48)));
        assert_eq!(outcome.attempts.len(), 6);
    }

    #[test]
    fn base_confidence_must_be_beaten() {
        let (screen, template, _) = scene(0.8);
        let outcome = match_multi_scale(
            &Backend::Native,
            &screen,
            &template,
            1.0,
            &SearchPlan::default(),
        );

        assert!(outcome.best.is_none());
        assert!(outcome.template.is_none());
        assert!(!outcome.attempts.is_empty());
    }

    #[test]
    fn unusable_sizes_are_not_attempted() {
        // 14px * 0.7 = 9px falls under the floor; 1.2 and 1.3 outgrow a 15px screen.
        let template = blocks(14, 14, 2, 1);
        let screen = blocks(15, 15, 2, 2);
        let outcome = match_multi_scale(
            &Backend::Native,
            &screen,
            &template,
            0.0,
            &SearchPlan::default(),
        );

        let scales: Vec<f64> = outcome.attempts.iter().map(|a| a.scale()).collect();
        assert_eq!(scales, vec![0.8, 0.9, 1.1]);
    }
}
