//! Diagnostics gathered during a search, shaped for JSON telemetry.

use serde::{Serialize, Serializer};
use std::fmt::Display;
use std::path::PathBuf;

use crate::matching::{MatchLabel, MethodResult, ScaleResult};
use crate::types::{Point, Size};

fn as_display<T: Display, S: Serializer>(value: &T, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

/// Everything tried on one monitor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitorMatchReport {
    pub monitor_id: u32,
    #[serde(serialize_with = "as_display")]
    pub monitor_size: Size,
    #[serde(serialize_with = "as_display")]
    pub offset: Point,
    pub methods_tried: Vec<MethodResult>,
    /// Present only when multi-scale refinement ran on this monitor
    #[serde(rename = "multi_scale_tried", skip_serializing_if = "Option::is_none")]
    pub scale_attempts: Option<Vec<ScaleResult>>,
    pub best_confidence: f64,
    pub best_method: Option<MatchLabel>,
}

/// The full diagnostic artifact returned with every verdict.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchReport {
    #[serde(serialize_with = "as_display")]
    pub template_size: Size,
    pub monitors_searched: usize,
    pub monitor_results: Vec<MonitorMatchReport>,
    pub best_confidence: f64,
    pub best_method: Option<MatchLabel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_image: Option<PathBuf>,
}

impl MatchReport {
    pub fn new(template_size: Size, monitors_searched: usize) -> Self {
        Self {
            template_size,
            monitors_searched,
            monitor_results: Vec::with_capacity(monitors_searched),
            best_confidence: 0.0,
            best_method: None,
            debug_image: None,
        }
    }

    pub fn monitor(&self, monitor_id: u32) -> Option<&MonitorMatchReport> {
        self.monitor_results.iter().find(|m| m.monitor_id == monitor_id)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
