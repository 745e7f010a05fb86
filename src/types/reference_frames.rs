//! Reference frames for point-cloud subscriptions.
//!
//! A reference frame is a template: every field set in it (to any value) is a
//! field the device should populate in the frames it sends. Smaller templates
//! mean less data on the wire.

use crate::protocol::data::{frame, point};
use crate::protocol::{Frame, Point, Scanline};

fn template(point: Point, ret: point::Return) -> Frame {
    Frame {
        scanlines: vec![Scanline { points: vec![Point { returns: vec![ret], ..point }], ..Default::default() }],
        ..Default::default()
    }
}

fn cartesian() -> point::Return {
    point::Return { cartesian: vec![0.0; 3], ..Default::default() }
}

/// Cartesian coordinates only.
pub fn xyz() -> Frame {
    template(Point::default(), cartesian())
}

/// Cartesian coordinates and intensity.
pub fn xyz_intensity() -> Frame {
    template(Point::default(), point::Return { intensity: Some(0), ..cartesian() })
}

/// Coordinates, intensity and every id.
pub fn xyz_intensity_ids() -> Frame {
    let mut frame = template(
        Point { id: Some(0), ..Default::default() },
        point::Return { id: Some(0), intensity: Some(0), ..cartesian() },
    );
    frame.id = Some(0);
    for line in &mut frame.scanlines {
        line.id = Some(0);
    }
    frame
}

/// Coordinates, intensity and the frame and point timestamps.
pub fn xyz_intensity_timestamps() -> Frame {
    let mut frame = template(
        Point { start_offset_ns: Some(0), ..Default::default() },
        point::Return { intensity: Some(0), ..cartesian() },
    );
    frame.start_time_ns = Some(0);
    frame
}

/// Direction, range and intensity per return; enough to render a depth image.
pub fn depth_map() -> Frame {
    let mut frame = template(
        Point {
            id: Some(0),
            direction: Some(point::Direction { azimuth: Some(0.0), elevation: Some(0.0) }),
            ..Default::default()
        },
        point::Return { id: Some(0), range: Some(0.0), intensity: Some(0), ..Default::default() },
    );
    frame.id = Some(0);
    frame
}

/// Every field the device can report.
pub fn full() -> Frame {
    let mut frame = template(
        Point {
            id: Some(0),
            channel_id: Some(0),
            direction: Some(point::Direction { azimuth: Some(0.0), elevation: Some(0.0) }),
            ambient_light_level: Some(0),
            start_offset_ns: Some(0),
            returns: Vec::new(),
        },
        point::Return { id: Some(0), range: Some(0.0), intensity: Some(0), ..cartesian() },
    );
    frame.id = Some(0);
    frame.start_time_ns = Some(0);
    frame.scan_pattern = Some(Default::default());
    frame.total_number_of_points = Some(0);
    frame.total_number_of_returns = Some(0);
    for line in &mut frame.scanlines {
        line.id = Some(0);
    }
    frame
}

/// Packed columns matching the per-return fields a template requests.
pub fn packed_selection(reference: &Frame) -> frame::Packed {
    let mut selection = frame::Packed { length: Some(0), ..Default::default() };
    let requested = || Some(Vec::new());

    for point in reference.scanlines.iter().flat_map(|line| &line.points) {
        if point.id.is_some() {
            selection.point_id = requested();
        }
        if point.channel_id.is_some() {
            selection.channel_id = requested();
        }
        if point.direction.is_some() {
            selection.direction = requested();
        }
        if point.ambient_light_level.is_some() {
            selection.ambient_light_level = requested();
        }
        if point.start_offset_ns.is_some() {
            selection.start_offset_ns = requested();
        }
        for ret in &point.returns {
            if ret.id.is_some() {
                selection.return_id = requested();
            }
            if !ret.cartesian.is_empty() {
                selection.cartesian = requested();
            }
            if ret.range.is_some() {
                selection.range = requested();
            }
            if ret.intensity.is_some() {
                selection.intensity = requested();
            }
        }
    }
    selection
}

/// Converts a template into its packed request form: frame-level fields stay,
/// per-return fields become column requests.
pub fn to_packed(reference: &Frame) -> Frame {
    Frame {
        scanlines: Vec::new(),
        packed: Some(packed_selection(reference)),
        total_number_of_returns: Some(0),
        ..reference.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xyz_requests_only_cartesian() {
        let selection = packed_selection(&xyz());
        assert!(selection.cartesian.is_some());
        assert!(selection.intensity.is_none());
        assert!(selection.point_id.is_none());
        assert!(selection.range.is_none());
    }

    #[test]
    fn full_requests_every_column() {
        let selection = packed_selection(&full());
        for (name, column) in [
            ("point_id", &selection.point_id),
            ("cartesian", &selection.cartesian),
            ("range", &selection.range),
            ("intensity", &selection.intensity),
            ("ambient_light_level", &selection.ambient_light_level),
            ("direction", &selection.direction),
            ("start_offset_ns", &selection.start_offset_ns),
            ("channel_id", &selection.channel_id),
            ("return_id", &selection.return_id),
        ] {
            assert!(column.is_some(), "{name} not requested");
        }
    }

    #[test]
    fn packed_form_keeps_frame_fields() {
        let packed = to_packed(&xyz_intensity_timestamps());
        assert!(packed.scanlines.is_empty());
        assert_eq!(packed.start_time_ns, Some(0));
        let selection = packed.packed.unwrap();
        assert!(selection.start_offset_ns.is_some());
        assert!(selection.intensity.is_some());
    }
}
