//! Finds a reference image on any connected monitor and reports the global pixel to click.
//!
//! ```no_run
//! use ui_locator::{Locator, MatchConfig, XcapProvider};
//!
//! let locator = Locator::new(MatchConfig::default().with_threshold(0.85))?;
//! let verdict = locator.locate_on_screen("button.png", &XcapProvider::default())?;
//! if let Some(location) = verdict.location {
//!     println!("click at ({}, {})", location.x, location.y);
//! }
//! # Ok::<(), ui_locator::LocateError>(())
//! ```

pub mod config;
pub mod debug;
pub mod error;
pub mod matching;
pub mod report;
pub mod screen;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::{MatchConfig, SearchPlan};
pub use error::{LocateError, Result};
pub use matching::{Backend, MatchLabel, MatchMethod, MethodResult, ScaleResult};
pub use report::{MatchReport, MonitorMatchReport};
pub use screen::{
    CaptureProvider, Locator, MatchLocation, MonitorCapture, Screen, ScreenControls, ScreenSelect,
    Verdict, XcapProvider,
};
pub use types::{Point, Size};
