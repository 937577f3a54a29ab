//! Pointer gestures mapped onto the viewport.
//!
//! Scrolling zooms by `axis_length * delta / 1000`, where positive deltas zoom
//! out. Clicking moves the center to the clicked point; screen Y grows
//! downwards while the imaginary axis grows upwards, hence the sign flip.
use winit::event::MouseScrollDelta;

use crate::types::{Configuration, Point};

/// Wheel units that change the axis length by 100%.
pub const ZOOM_DIVISOR: f64 = 1000.0;

/// Pixels per scroll line, matching a typical browser wheel step.
pub const PIXELS_PER_LINE: f64 = 100.0;

/// Applies a zoom step. Steps that would leave a non-positive or non-finite
/// axis length are ignored; returns whether the view changed.
pub fn apply_zoom(config: &mut Configuration, wheel_delta: f64) -> bool {
    let axis_length = config.axis_length + config.axis_length * (wheel_delta / ZOOM_DIVISOR);
    if !(axis_length.is_finite() && axis_length > 0.0) || axis_length == config.axis_length {
        return false;
    }
    config.axis_length = axis_length;
    true
}

/// Moves the center by a pixel offset measured from the middle of a surface
/// of `surface_size` pixels.
pub fn apply_recenter(config: &mut Configuration, offset: Point, surface_size: (u32, u32)) {
    let width = f64::from(surface_size.0.max(1));
    let height = f64::from(surface_size.1.max(1));
    config.center.x += offset.x / width * config.axis_length;
    config.center.y += -(offset.y / height) * config.axis_length;
}

/// Offset of `position` (pixels from the top-left corner) from the surface
/// center.
pub fn offset_from_center(position: Point, surface_size: (u32, u32)) -> Point {
    Point::new(
        position.x - f64::from(surface_size.0) / 2.0,
        position.y - f64::from(surface_size.1) / 2.0,
    )
}

/// Converts a winit scroll event into wheel units. Scrolling up (away from
/// the user) yields negative deltas, which zoom in.
pub fn wheel_delta(delta: MouseScrollDelta) -> f64 {
    match delta {
        MouseScrollDelta::LineDelta(_, lines) => -f64::from(lines) * PIXELS_PER_LINE,
        MouseScrollDelta::PixelDelta(position) => -position.y,
    }
}

#[cfg(test)]
mod tests {
    use winit::dpi::PhysicalPosition;

    use super::*;

    #[test]
    fn zoom_scales_axis_length() {
        let mut config = Configuration::default();
        assert!(apply_zoom(&mut config, 1000.0));
        assert_eq!(config.axis_length, 8.0);

        let mut config = Configuration::default();
        assert!(apply_zoom(&mut config, -500.0));
        assert_eq!(config.axis_length, 2.0);
    }

    #[test]
    fn zoom_never_collapses_the_view() {
        let mut config = Configuration::default();
        assert!(!apply_zoom(&mut config, -1000.0));
        assert!(!apply_zoom(&mut config, -2500.0));
        assert!(!apply_zoom(&mut config, 0.0));
        assert_eq!(config.axis_length, 4.0);
    }

    #[test]
    fn recenter_inverts_y() {
        let mut config = Configuration::default();
        apply_recenter(&mut config, Point::new(100.0, 50.0), (400, 400));
        assert_eq!(config.center, Point::new(1.0, -0.5));
    }

    #[test]
    fn recenter_uses_each_axis_extent() {
        let mut config = Configuration {
            center: Point::new(-0.5, 0.25),
            axis_length: 2.0,
            ..Configuration::default()
        };
        apply_recenter(&mut config, Point::new(-200.0, -100.0), (800, 400));
        assert_eq!(config.center, Point::new(-1.0, 0.75));
    }

    #[test]
    fn click_position_is_measured_from_center() {
        let offset = offset_from_center(Point::new(300.0, 100.0), (400, 400));
        assert_eq!(offset, Point::new(100.0, -100.0));
    }

    #[test]
    fn scroll_directions_map_to_zoom() {
        assert_eq!(wheel_delta(MouseScrollDelta::LineDelta(0.0, 1.0)), -100.0);
        assert_eq!(wheel_delta(MouseScrollDelta::LineDelta(0.0, -2.0)), 200.0);
        assert_eq!(
            wheel_delta(MouseScrollDelta::PixelDelta(PhysicalPosition::new(0.0, 35.0))),
            -35.0
        );
    }
}
