//! Cross-monitor search: runs the matchers over every capture and keeps one global best.

use image::{DynamicImage, GrayImage};
use std::path::Path;

use super::mapping::{map_to_global, MatchLocation};
use super::{CaptureProvider, MonitorCapture};
use crate::config::MatchConfig;
use crate::debug;
use crate::error::{LocateError, Result};
use crate::matching::{
    enhance, grayscale, match_all_methods, match_multi_scale, Backend, Candidate,
};
use crate::report::{MatchReport, MonitorMatchReport};
use crate::types::Size;

/// Outcome of one locate request. Not finding the template is a normal verdict, not an error.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    /// Set only when the best confidence reached the threshold
    pub location: Option<MatchLocation>,
    /// Best confidence seen anywhere, found or not
    pub confidence: f64,
    pub report: MatchReport,
    refine_floor: f64,
}

impl Verdict {
    pub fn found(&self) -> bool {
        self.location.is_some()
    }

    /// A lower threshold that would have accepted this search's best candidate.
    ///
    /// Only offered for misses whose best confidence was plausible at all; rounds down to 0.05.
    pub fn suggested_threshold(&self) -> Option<f64> {
        (!self.found() && self.confidence > self.refine_floor)
            .then(|| (self.confidence * 20.0).floor() / 20.0)
    }
}

/// Searches monitor captures for a template.
#[derive(Debug, Clone, Default)]
pub struct Locator {
    config: MatchConfig,
    backend: Backend,
}

impl Locator {
    pub fn new(config: MatchConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            backend: Backend::default(),
        })
    }

    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Decodes the template at `path`, then searches `captures`.
    ///
    /// A template that cannot be decoded fails before any capture is touched.
    pub fn locate_path(
        &self,
        path: impl AsRef<Path>,
        captures: &[MonitorCapture],
    ) -> Result<Verdict> {
        let template = load_template(path.as_ref())?;
        self.locate(&template, captures)
    }

    /// Decodes the template, then asks `provider` for fresh captures and searches them.
    pub fn locate_on_screen<P>(&self, path: impl AsRef<Path>, provider: &P) -> Result<Verdict>
    where
        P: CaptureProvider + ?Sized,
    {
        let template = load_template(path.as_ref())?;
        let captures = provider.capture_all()?;
        self.locate(&template, &captures)
    }

    /// Searches `captures` for `template`. Misses, including a requested monitor that
    /// was not captured, come back as a verdict without a location.
    pub fn locate(&self, template: &DynamicImage, captures: &[MonitorCapture]) -> Result<Verdict> {
        let monitors = self.select(captures);
        let template_size = Size::of(template);
        let template = self.prepare(template);
        let mut report = MatchReport::new(template_size, monitors.len());

        log::debug!(
            "Searching {} monitor(s) for a {template_size} template",
            monitors.len()
        );

        let mut global: Option<(&MonitorCapture, Candidate)> = None;
        for capture in monitors {
            let (best, monitor_report) = self.scan(capture, &template);
            report.monitor_results.push(monitor_report);

            if let Some(candidate) = best {
                if candidate.confidence > global.map_or(0.0, |(_, g)| g.confidence) {
                    global = Some((capture, candidate));
                }
            }
        }

        report.best_confidence = global.map_or(0.0, |(_, g)| g.confidence);
        report.best_method = global.map(|(_, g)| g.label);

        let accepted = global.filter(|(_, g)| g.confidence >= self.config.confidence_threshold);
        let location = accepted.map(|(capture, candidate)| {
            let location = map_to_global(candidate.location, candidate.size, capture);
            if self.config.enable_debug {
                report.debug_image = self.write_debug(capture, &location, candidate.confidence);
            }
            location
        });

        match (&location, global) {
            (Some(location), Some((_, best))) => log::info!(
                "Found template on monitor {} at ({}, {}) with {:.2}% confidence using {}",
                location.monitor_id,
                location.x,
                location.y,
                best.confidence * 100.0,
                best.label
            ),
            _ => log::info!(
                "Template not found, best confidence {:.2}% (threshold {:.2}%)",
                report.best_confidence * 100.0,
                self.config.confidence_threshold * 100.0
            ),
        }

        Ok(Verdict {
            location,
            confidence: report.best_confidence,
            report,
            refine_floor: self.config.plan.refine_floor,
        })
    }

    fn select<'a>(&self, captures: &'a [MonitorCapture]) -> Vec<&'a MonitorCapture> {
        let Some(id) = self.config.monitor_id else {
            return captures.iter().collect();
        };
        let selected: Vec<_> = captures.iter().filter(|c| c.monitor_id == id).take(1).collect();
        if selected.is_empty() {
            log::warn!("Monitor {id} requested but not captured");
        }
        selected
    }

    fn prepare(&self, image: &DynamicImage) -> GrayImage {
        if self.config.enhance {
            grayscale(&enhance(image))
        } else {
            grayscale(image)
        }
    }

    /// Single-scale pass on one monitor, refined across scales when the result is inconclusive.
    fn scan(
        &self,
        capture: &MonitorCapture,
        template: &GrayImage,
    ) -> (Option<Candidate>, MonitorMatchReport) {
        let plan = &self.config.plan;
        let screen = self.prepare(&capture.image);

        let single = match_all_methods(&self.backend, &screen, template, &plan.methods);
        let mut best = single.best;
        let mut scale_attempts = None;

        if self.config.wants_refinement(single.confidence()) {
            log::debug!(
                "Monitor {}: {:.4} is inconclusive, trying other scales",
                capture.monitor_id,
                single.confidence()
            );
            let scaled =
                match_multi_scale(&self.backend, &screen, template, single.confidence(), plan);
            if scaled.best.is_some() {
                best = scaled.best;
            }
            scale_attempts = Some(scaled.attempts);
        }

        let report = MonitorMatchReport {
            monitor_id: capture.monitor_id,
            monitor_size: capture.size(),
            offset: capture.offset,
            methods_tried: single.results,
            scale_attempts,
            best_confidence: best.map_or(0.0, |c| c.confidence),
            best_method: best.map(|c| c.label),
        };
        (best, report)
    }

    fn write_debug(
        &self,
        capture: &MonitorCapture,
        location: &MatchLocation,
        confidence: f64,
    ) -> Option<std::path::PathBuf> {
        let annotated = debug::annotate(capture, location, confidence);
        match debug::save(&self.config.debug_dir, &annotated) {
            Ok(path) => {
                log::info!("Debug image saved: {}", path.display());
                Some(path)
            }
            Err(err) => {
                log::warn!("Could not save debug image: {err}");
                None
            }
        }
    }
}

fn load_template(path: &Path) -> Result<DynamicImage> {
    image::open(path).map_err(|source| LocateError::TemplateLoad {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::{MatchLabel, MatchMethod};
    use crate::test_support::{blocks, crop, noise, paste};
    use crate::types::Point;
    use image::imageops::{self, FilterType};

    fn capture(id: u32, image: GrayImage, offset: (i32, i32)) -> MonitorCapture {
        MonitorCapture::new(id, DynamicImage::ImageLuma8(image), offset)
    }

    fn plain() -> MatchConfig {
        MatchConfig::default().with_enhance(false)
    }

    #[test]
    fn finds_exact_crop_on_single_monitor() {
        let screen = noise(160, 120, 7);
        let template = crop(&screen, 40, 30, 24, 16);
        let locator = Locator::new(plain()).unwrap();

        let verdict = locator
            .locate(&DynamicImage::ImageLuma8(template), &[capture(1, screen, (0, 0))])
            .unwrap();

        assert!(verdict.found());
        assert!(verdict.confidence > 0.99);
        let location = verdict.location.unwrap();
        assert_eq!(location.center(), Point::new(52, 38));
        assert_eq!(location.monitor_id, 1);
        assert_eq!(verdict.report.monitors_searched, 1);
        assert_eq!(verdict.report.template_size, Size::new(24, 16));
        assert!(verdict.report.monitor_results[0].scale_attempts.is_none());
        assert_eq!(verdict.suggested_threshold(), None);
    }

    #[test]
    fn unrelated_template_is_not_found_but_reported() {
        // Raw correlation of unrelated positive textures still sits well above zero.
        let locator = Locator::new(plain().with_threshold(0.95)).unwrap();
        let verdict = locator
            .locate(
                &DynamicImage::ImageLuma8(noise(30, 30, 5)),
                &[capture(1, noise(90, 70, 6), (0, 0)), capture(2, noise(90, 70, 8), (90, 0))],
            )
            .unwrap();

        assert!(!verdict.found());
        assert!(verdict.confidence < 0.95);
        assert_eq!(verdict.report.monitor_results.len(), 2);
        assert!(verdict
            .report
            .monitor_results
            .iter()
            .all(|m| m.methods_tried.len() == MatchMethod::ALL.len()));
        assert!(verdict.suggested_threshold().is_some_and(|t| t < 0.95));
    }

    #[test]
    fn inconclusive_result_is_refined_across_scales() {
        let template = blocks(40, 40, 6, 17);
        let shown = imageops::resize(&template, 44, 44, FilterType::Triangle);
        let mut screen = blocks(220, 160, 5, 3);
        paste(&mut screen, &shown, Point::new(90, 60));

        let locator = Locator::new(plain().with_threshold(0.99)).unwrap();
        let verdict = locator
            .locate(&DynamicImage::ImageLuma8(template), &[capture(3, screen, (-220, 0))])
            .unwrap();

        let monitor = verdict.report.monitor(3).unwrap();
        let single = monitor
            .methods_tried
            .iter()
            .filter_map(|r| r.confidence())
            .fold(0.0, f64::max);
        assert!(single > 0.5 && single < 0.99, "single-scale {single}");
        assert!(monitor.scale_attempts.is_some());

        assert_eq!(verdict.report.best_method, Some(MatchLabel::Scaled { scale: 1.1 }));
        let location = verdict.location.unwrap();
        assert_eq!((location.width, location.height), (44, 44));
        assert_eq!(location.top_left, Point::new(-130, 60));
    }

    #[test]
    fn equal_monitors_keep_the_first() {
        let screen = noise(80, 60, 12);
        let template = crop(&screen, 10, 10, 16, 16);
        let locator = Locator::new(plain()).unwrap();

        let verdict = locator
            .locate(
                &DynamicImage::ImageLuma8(template),
                &[capture(5, screen.clone(), (0, 0)), capture(6, screen, (80, 0))],
            )
            .unwrap();

        assert_eq!(verdict.location.unwrap().monitor_id, 5);
    }

    #[test]
    fn monitor_restriction_skips_other_captures() {
        let first = noise(80, 60, 1);
        let second = noise(80, 60, 2);
        let template = crop(&first, 20, 20, 16, 16);
        let captures = [capture(1, first, (0, 0)), capture(2, second, (80, 0))];

        let restricted = Locator::new(plain().with_threshold(0.99).with_monitor(2)).unwrap();
        let verdict = restricted
            .locate(&DynamicImage::ImageLuma8(template.clone()), &captures)
            .unwrap();
        assert_eq!(verdict.report.monitors_searched, 1);
        assert_eq!(verdict.report.monitor_results[0].monitor_id, 2);
        assert!(!verdict.found());

    }

    #[test]
    fn unknown_monitor_is_a_miss_not_an_error() {
        let screen = noise(80, 60, 1);
        let template = crop(&screen, 20, 20, 16, 16);
        let captures = [capture(1, screen, (0, 0))];

        let verdict = Locator::new(plain().with_monitor(9))
            .unwrap()
            .locate(&DynamicImage::ImageLuma8(template), &captures)
            .unwrap();

        assert!(!verdict.found());
        assert_eq!(verdict.confidence, 0.0);
        assert_eq!(verdict.report.monitors_searched, 0);
        assert!(verdict.report.monitor_results.is_empty());
        assert_eq!(verdict.report.best_method, None);
    }

    #[test]
    fn enhanced_search_still_lands_on_target() {
        let screen = blocks(200, 140, 4, 31);
        let template = crop(&screen, 120, 70, 40, 30);
        let locator = Locator::new(MatchConfig::default().with_threshold(0.5)).unwrap();

        let verdict = locator
            .locate(&DynamicImage::ImageLuma8(template), &[capture(1, screen, (0, 0))])
            .unwrap();

        let location = verdict.location.unwrap();
        assert!((location.x - 140).abs() <= 4 && (location.y - 85).abs() <= 4, "{location:?}");
    }

    #[test]
    fn no_captures_is_a_plain_miss() {
        let verdict = Locator::default()
            .locate(&DynamicImage::ImageLuma8(noise(12, 12, 1)), &[])
            .unwrap();
        assert!(!verdict.found());
        assert_eq!(verdict.confidence, 0.0);
        assert_eq!(verdict.report.monitors_searched, 0);
    }

    #[test]
    fn suggests_lower_threshold_for_plausible_miss() {
        let verdict = Verdict {
            location: None,
            confidence: 0.734,
            report: MatchReport::new(Size::new(1, 1), 0),
            refine_floor: 0.5,
        };
        assert_eq!(verdict.suggested_threshold(), Some(0.7));
    }

    #[test]
    fn rejects_invalid_config() {
        assert!(matches!(
            Locator::new(MatchConfig::default().with_threshold(-0.1)),
            Err(LocateError::Config(_))
        ));
    }
}
