//! Monitor-local match positions to global screen coordinates.

use serde::Serialize;

use super::MonitorCapture;
use crate::types::{Point, Size};

/// Where to click, in global coordinates, plus enough detail to draw or audit the match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MatchLocation {
    /// Center of the matched region in global coordinates
    pub x: i32,
    pub y: i32,
    /// Size of the matched region at the scale that produced it
    pub width: u32,
    pub height: u32,
    pub monitor_id: u32,
    /// Center relative to the monitor's own origin
    pub local_x: i32,
    pub local_y: i32,
    pub top_left: Point,
    pub bottom_right: Point,
}

impl MatchLocation {
    pub fn center(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn local_center(&self) -> Point {
        Point::new(self.local_x, self.local_y)
    }

    /// Top-left corner relative to the monitor's origin.
    pub fn local_top_left(&self) -> Point {
        Point::new(
            self.local_x - (self.width / 2) as i32,
            self.local_y - (self.height / 2) as i32,
        )
    }

    /// Whether the click point lands on one of `monitors`.
    pub fn is_on_screen(&self, monitors: &[MonitorCapture]) -> bool {
        monitors.iter().any(|m| m.contains(self.x, self.y))
    }
}

/// Converts a top-left match position inside `monitor` into a global location.
///
/// Centers use integer halving of the region size, so the global and local centers
/// always differ by exactly the monitor offset.
pub fn map_to_global(local_top_left: Point, size: Size, monitor: &MonitorCapture) -> MatchLocation {
    let half = Point::new((size.width / 2) as i32, (size.height / 2) as i32);
    let local_center = local_top_left.offset(half);
    let center = local_center.offset(monitor.offset);
    let top_left = local_top_left.offset(monitor.offset);

    MatchLocation {
        x: center.x,
        y: center.y,
        width: size.width,
        height: size.height,
        monitor_id: monitor.monitor_id,
        local_x: local_center.x,
        local_y: local_center.y,
        top_left,
        bottom_right: top_left.offset(Point::new(size.width as i32, size.height as i32)),
    }
}
