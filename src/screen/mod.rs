pub mod mapping;
pub mod search;

use derive_more::{Deref, DerefMut};
use image::{DynamicImage, RgbaImage};
use xcap::Monitor;

use crate::error::{LocateError, Result};
use crate::types::{Point, Size};

pub use mapping::{map_to_global, MatchLocation};
pub use search::{Locator, Verdict};

/// One monitor's pixels and where that monitor sits in the global virtual screen.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorCapture {
    pub monitor_id: u32,
    pub image: DynamicImage,
    /// Origin of this monitor inside the virtual screen
    pub offset: Point,
    pub width: u32,
    pub height: u32,
}

impl MonitorCapture {
    /// Monitor size is taken from the image.
    pub fn new(monitor_id: u32, image: DynamicImage, offset: impl Into<Point>) -> Self {
        Self {
            monitor_id,
            width: image.width(),
            height: image.height(),
            image,
            offset: offset.into(),
        }
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    /// Whether the global point `(x, y)` lies on this monitor.
    pub fn contains(&self, x: i32, y: i32) -> bool {
        let (dx, dy) = (x as i64 - self.offset.x as i64, y as i64 - self.offset.y as i64);
        (0..self.width as i64).contains(&dx) && (0..self.height as i64).contains(&dy)
    }
}

/// Supplies fresh captures of every monitor on demand.
pub trait CaptureProvider {
    fn capture_all(&self) -> Result<Vec<MonitorCapture>>;
}

impl CaptureProvider for Vec<MonitorCapture> {
    fn capture_all(&self) -> Result<Vec<MonitorCapture>> {
        Ok(self.clone())
    }
}

pub trait ScreenControls {
    /// Returns the width and height of the screen.
    fn size(&self) -> (u32, u32);

    /// Origin of the screen inside the virtual desktop.
    fn offset(&self) -> Point;

    /// Takes an image of the screen, tagged with its position.
    fn screenshot(&self) -> Result<MonitorCapture>;

    /// Looks for `template` on this screen only.
    fn find_target(&self, locator: &Locator, template: &DynamicImage) -> Result<Verdict> {
        locator.locate(template, &[self.screenshot()?])
    }
}

#[derive(Debug, Deref, DerefMut, derive_more::From)]
pub struct Screen(xcap::Monitor);

impl Screen {
    pub fn new(id: u32) -> Result<Self> {
        ScreenSelect::Id(id)
            .get()?
            .pop()
            .map(Self)
            .ok_or(LocateError::MonitorNotFound(id))
    }

    pub fn new_primary() -> Result<Self> {
        ScreenSelect::Primary
            .get()?
            .pop()
            .map(Self)
            .ok_or(LocateError::NoMonitors)
    }

    pub fn all() -> Result<Vec<Self>> {
        Ok(ScreenSelect::All.get()?.into_iter().map(Self).collect())
    }
}

impl ScreenControls for Screen {
    fn size(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    fn offset(&self) -> Point {
        Point::new(self.x(), self.y())
    }

    fn screenshot(&self) -> Result<MonitorCapture> {
        let capture = self
            .capture_image()
            .map_err(|e| LocateError::Capture(e.to_string()))?;
        let (w, h) = (capture.width(), capture.height());
        let image = RgbaImage::from_raw(w, h, capture.into_raw()).ok_or_else(|| {
            LocateError::Capture(format!("monitor {} returned a short buffer", self.id()))
        })?;

        let mut shot =
            MonitorCapture::new(self.id(), DynamicImage::ImageRgba8(image), self.offset());
        (shot.width, shot.height) = self.size();
        Ok(shot)
    }
}

/// Which monitors a provider captures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScreenSelect {
    #[default]
    All,
    Primary,
    Id(u32),
}

impl ScreenSelect {
    fn is_monitor(&self, monitor: &xcap::Monitor) -> bool {
        match self {
            Self::All => true,
            Self::Primary => monitor.is_primary(),
            Self::Id(id) => *id == monitor.id(),
        }
    }

    pub fn get(&self) -> Result<Vec<xcap::Monitor>> {
        let monitors = Monitor::all().map_err(|e| LocateError::Capture(e.to_string()))?;
        Ok(monitors.into_iter().filter(|m| self.is_monitor(m)).collect())
    }
}

/// Captures the selected physical monitors through `xcap`.
#[derive(Debug, Clone, Copy, Default)]
pub struct XcapProvider {
    pub select: ScreenSelect,
}

impl CaptureProvider for XcapProvider {
    /// Captures every selected monitor, skipping any that fail as long as one succeeds.
    fn capture_all(&self) -> Result<Vec<MonitorCapture>> {
        let monitors = self.select.get()?;
        if monitors.is_empty() {
            return Err(LocateError::NoMonitors);
        }
        keep_successful(monitors.into_iter().map(|monitor| Screen(monitor).screenshot()))
    }
}

fn keep_successful(
    shots: impl IntoIterator<Item = Result<MonitorCapture>>,
) -> Result<Vec<MonitorCapture>> {
    let mut captures = Vec::new();
    let mut last_error = None;
    for shot in shots {
        match shot {
            Ok(capture) => captures.push(capture),
            Err(err) => {
                log::warn!("Skipping monitor: {err}");
                last_error = Some(err);
            }
        }
    }
    match last_error {
        Some(err) if captures.is_empty() => Err(err),
        _ => Ok(captures),
    }
}
