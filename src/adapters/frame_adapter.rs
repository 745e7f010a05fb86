//! Output types a point-cloud stream can decode into.

use crate::protocol::{Frame, Point, Scanline};
use crate::types::{SimpleFrame, SimplePoint};
use crate::Result;

use super::packed::Columns;
use super::scanlines::points_per_scanline;

/// Decodes wire frames into a stream's output type.
///
/// A stream is generic over its adapter; [`Frame`] yields the structured
/// form, [`SimpleFrame`] the flat point list.
pub trait FrameAdapter: Sized + Send + 'static {
    /// Decodes one frame as received from the device or read from a recording.
    fn adapt(frame: &Frame) -> Result<Self>;
}

impl FrameAdapter for Frame {
    fn adapt(frame: &Frame) -> Result<Self> {
        decode_to_structured(frame)
    }
}

impl FrameAdapter for SimpleFrame {
    fn adapt(frame: &Frame) -> Result<Self> {
        decode_to_flat(frame)
    }
}

/// Expands a packed frame into scanlines, points and returns.
///
/// Returns are walked in column order. A new scanline starts whenever the
/// derived scanline id (`point_id / points_per_scanline`) changes, a new
/// point whenever the point id changes. Without a `point_id` column every
/// return lands in a single point of scanline 0, as it does when the points
/// per scanline cannot be derived. Frames without packed data are copied.
pub fn decode_to_structured(wire: &Frame) -> Result<Frame> {
    let Some(packed) = &wire.packed else {
        return Ok(wire.clone());
    };
    let columns = Columns::new(wire, packed)?;
    let per_line = points_per_scanline(wire);

    let mut builder = StructuredBuilder::default();
    let mut current_line = None;
    let mut current_point = None;

    for i in 0..columns.len() {
        let point_id = columns.point_id(i);
        let line_id = match (point_id, per_line) {
            (Some(point_id), Some(per_line)) => point_id / per_line,
            _ => 0,
        };

        if current_line != Some(line_id) {
            builder.open_scanline(line_id);
            current_line = Some(line_id);
            current_point = None;
        }
        if i == 0 || (point_id.is_some() && point_id != current_point) {
            builder.open_point(columns.point_at(i));
            current_point = point_id;
        }
        builder.push_return(columns.return_at(i));
    }

    let (scanlines, points) = builder.finish();
    Ok(Frame {
        id: wire.id,
        start_time_ns: wire.start_time_ns,
        scan_pattern: wire.scan_pattern.clone(),
        total_number_of_points: Some(wire.total_number_of_points.unwrap_or(points)),
        total_number_of_returns: Some(wire.total_number_of_returns.unwrap_or(columns.len() as u32)),
        is_ramp_up_phase: wire.is_ramp_up_phase,
        scanlines,
        packed: None,
    })
}

#[derive(Default)]
struct StructuredBuilder {
    scanlines: Vec<Scanline>,
    line: Option<Scanline>,
    point: Option<Point>,
    points: u32,
}

impl StructuredBuilder {
    fn open_scanline(&mut self, id: u32) {
        self.close_scanline();
        self.line = Some(Scanline { id: Some(id), ..Default::default() });
    }

    fn open_point(&mut self, point: Point) {
        self.close_point();
        self.point = Some(point);
        self.points += 1;
    }

    fn push_return(&mut self, ret: crate::protocol::data::point::Return) {
        self.point.get_or_insert_with(Point::default).returns.push(ret);
    }

    fn close_point(&mut self) {
        if let Some(point) = self.point.take() {
            self.line.get_or_insert_with(Scanline::default).points.push(point);
        }
    }

    fn close_scanline(&mut self) {
        self.close_point();
        if let Some(line) = self.line.take() {
            self.scanlines.push(line);
        }
    }

    fn finish(mut self) -> (Vec<Scanline>, u32) {
        self.close_scanline();
        (self.scanlines, self.points)
    }
}

/// Reduces a frame, packed or structured, to one flat point per return.
///
/// Intensity and ambient light are truncated to 16 bits.
pub fn decode_to_flat(wire: &Frame) -> Result<SimpleFrame> {
    let frame_rate =
        wire.scan_pattern.as_ref().map(|pattern| pattern.maximum_frame_rate() as f32).unwrap_or_default();
    let mut points = Vec::new();

    match &wire.packed {
        Some(packed) => {
            let columns = Columns::new(wire, packed)?;
            points.reserve_exact(columns.len());
            for i in 0..columns.len() {
                let [x, y, z] = columns.cartesian(i).unwrap_or_default();
                points.push(SimplePoint {
                    id: columns.point_id(i).unwrap_or_default(),
                    x,
                    y,
                    z,
                    range: columns.range(i).unwrap_or_default(),
                    intensity: columns.intensity(i).unwrap_or_default() as u16,
                    ambient_light_level: columns.ambient_light_level(i).unwrap_or_default() as u16,
                });
            }
        }
        None => {
            points.reserve_exact(wire.scanlines.iter().flat_map(|line| &line.points).map(|p| p.returns.len()).sum());
            for point in wire.scanlines.iter().flat_map(|line| &line.points) {
                for ret in &point.returns {
                    let axis = |n: usize| ret.cartesian.get(n).copied().unwrap_or_default();
                    points.push(SimplePoint {
                        id: point.id(),
                        x: axis(0),
                        y: axis(1),
                        z: axis(2),
                        range: ret.range(),
                        intensity: ret.intensity() as u16,
                        ambient_light_level: point.ambient_light_level() as u16,
                    });
                }
            }
        }
    }

    Ok(SimpleFrame { id: wire.id(), start_time_ns: wire.start_time_ns(), frame_rate, points })
}
