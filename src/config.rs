//! Search configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{LocateError, Result};
use crate::matching::MatchMethod;
use crate::types::Size;

/// Options for one locate request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Minimum confidence (0.0 - 1.0) for a match to be reported as found
    pub confidence_threshold: f64,
    /// Save an annotated copy of the winning monitor image
    pub enable_debug: bool,
    /// Search only this monitor instead of all of them
    pub monitor_id: Option<u32>,
    /// Where debug artifacts are written
    pub debug_dir: PathBuf,
    /// Equalize local contrast of template and captures before matching
    pub enhance: bool,
    pub plan: SearchPlan,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.8,
            enable_debug: false,
            monitor_id: None,
            debug_dir: PathBuf::from("debug"),
            enhance: true,
            plan: SearchPlan::default(),
        }
    }
}

impl MatchConfig {
    /// Load a configuration from a TOML file. Missing keys keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    pub fn with_debug(mut self, dir: impl Into<PathBuf>) -> Self {
        self.enable_debug = true;
        self.debug_dir = dir.into();
        self
    }

    pub fn with_monitor(mut self, monitor_id: u32) -> Self {
        self.monitor_id = Some(monitor_id);
        self
    }

    pub fn with_enhance(mut self, enhance: bool) -> Self {
        self.enhance = enhance;
        self
    }

    pub fn with_plan(mut self, plan: SearchPlan) -> Self {
        self.plan = plan;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(LocateError::Config(format!(
                "confidence_threshold must be within 0..=1, got {}",
                self.confidence_threshold
            )));
        }
        self.plan.validate()
    }

    /// Whether a single-scale confidence is promising enough, yet short of acceptance, to refine.
    pub fn wants_refinement(&self, confidence: f64) -> bool {
        confidence > self.plan.refine_floor && confidence < self.confidence_threshold
    }
}

/// The fixed method and scale lists read by the matchers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchPlan {
    /// Methods tried at native size; earlier entries win ties
    pub methods: Vec<MatchMethod>,
    /// Template resampling factors tried during refinement
    pub scales: Vec<f64>,
    /// Single-scale confidences at or below this are not worth refining
    pub refine_floor: f64,
    /// Resampled templates narrower or shorter than this are skipped
    pub min_template_side: u32,
}

impl Default for SearchPlan {
    fn default() -> Self {
        Self {
            methods: MatchMethod::ALL.to_vec(),
            // 1.0 is already covered by the single-scale pass
            scales: vec![0.7, 0.8, 0.9, 1.1, 1.2, 1.3],
            refine_floor: 0.5,
            min_template_side: 10,
        }
    }
}

impl SearchPlan {
    pub fn validate(&self) -> Result<()> {
        if self.methods.is_empty() {
            return Err(LocateError::Config("at least one method is required".into()));
        }
        if let Some(scale) = self.scales.iter().find(|s| !(s.is_finite() && **s > 0.0)) {
            return Err(LocateError::Config(format!("invalid scale factor {scale}")));
        }
        if self.min_template_side == 0 {
            return Err(LocateError::Config("min_template_side must be positive".into()));
        }
        Ok(())
    }

    /// Template size after resampling by `scale`, or `None` if a side drops under the floor.
    pub fn scaled_size(&self, template: Size, scale: f64) -> Option<Size> {
        let width = (template.width as f64 * scale) as u32;
        let height = (template.height as f64 * scale) as u32;
        (width >= self.min_template_side && height >= self.min_template_side)
            .then_some(Size::new(width, height))
    }
}
