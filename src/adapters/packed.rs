//! Columnar ("packed") frame and IMU forms.
//!
//! Every column is a big-endian array with one element per return (or per
//! IMU sample). Columns are optional and checked independently; they share
//! indexing, not allocation.

use crate::protocol::data::{Imu, frame, imu, point};
use crate::protocol::{Frame, Point};
use crate::{Result, ScannerError};

/// Borrowed, length-checked view of a frame's packed columns.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Columns<'a> {
    len: usize,
    point_id: Option<&'a [u8]>,
    cartesian: Option<&'a [u8]>,
    range: Option<&'a [u8]>,
    intensity: Option<&'a [u8]>,
    ambient_light_level: Option<&'a [u8]>,
    direction: Option<&'a [u8]>,
    start_offset_ns: Option<&'a [u8]>,
    channel_id: Option<&'a [u8]>,
    return_id: Option<&'a [u8]>,
}

impl<'a> Columns<'a> {
    /// Validates every present column against the element count.
    ///
    /// The count is `packed.length` when set, otherwise the frame's total
    /// return counter. A frame without any column has no elements, whatever
    /// its counters say.
    pub(crate) fn new(frame: &Frame, packed: &'a frame::Packed) -> Result<Self> {
        let declared = match packed.length {
            Some(length) => length as usize,
            None => frame.total_number_of_returns() as usize,
        };
        let len = if has_any_column(packed) { declared } else { 0 };

        Ok(Self {
            len,
            point_id: column("point_id", packed.point_id.as_deref(), len, 4)?,
            cartesian: column("cartesian", packed.cartesian.as_deref(), len, 12)?,
            range: column("range", packed.range.as_deref(), len, 4)?,
            intensity: column("intensity", packed.intensity.as_deref(), len, 4)?,
            ambient_light_level: column(
                "ambient_light_level",
                packed.ambient_light_level.as_deref(),
                len,
                4,
            )?,
            direction: column("direction", packed.direction.as_deref(), len, 8)?,
            start_offset_ns: column("start_offset_ns", packed.start_offset_ns.as_deref(), len, 8)?,
            channel_id: column("channel_id", packed.channel_id.as_deref(), len, 1)?,
            return_id: column("return_id", packed.return_id.as_deref(), len, 1)?,
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn has_point_id(&self) -> bool {
        self.point_id.is_some()
    }

    pub(crate) fn point_id(&self, i: usize) -> Option<u32> {
        self.point_id.map(|bytes| be_u32(bytes, i * 4))
    }

    pub(crate) fn cartesian(&self, i: usize) -> Option<[f32; 3]> {
        self.cartesian.map(|bytes| {
            [be_f32(bytes, i * 12), be_f32(bytes, i * 12 + 4), be_f32(bytes, i * 12 + 8)]
        })
    }

    pub(crate) fn range(&self, i: usize) -> Option<f32> {
        self.range.map(|bytes| be_f32(bytes, i * 4))
    }

    pub(crate) fn intensity(&self, i: usize) -> Option<u32> {
        self.intensity.map(|bytes| be_u32(bytes, i * 4))
    }

    pub(crate) fn ambient_light_level(&self, i: usize) -> Option<u32> {
        self.ambient_light_level.map(|bytes| be_u32(bytes, i * 4))
    }

    pub(crate) fn direction(&self, i: usize) -> Option<point::Direction> {
        self.direction.map(|bytes| point::Direction {
            azimuth: Some(be_f32(bytes, i * 8)),
            elevation: Some(be_f32(bytes, i * 8 + 4)),
        })
    }

    pub(crate) fn start_offset_ns(&self, i: usize) -> Option<u64> {
        self.start_offset_ns.map(|bytes| be_u64(bytes, i * 8))
    }

    pub(crate) fn channel_id(&self, i: usize) -> Option<u32> {
        self.channel_id.map(|bytes| u32::from(bytes[i]))
    }

    pub(crate) fn return_id(&self, i: usize) -> Option<u32> {
        self.return_id.map(|bytes| u32::from(bytes[i]))
    }

    /// The return stored at index `i`.
    pub(crate) fn return_at(&self, i: usize) -> point::Return {
        point::Return {
            id: self.return_id(i),
            cartesian: self.cartesian(i).map(Vec::from).unwrap_or_default(),
            range: self.range(i),
            intensity: self.intensity(i),
        }
    }

    /// A point without returns, carrying the point-level fields at index `i`.
    pub(crate) fn point_at(&self, i: usize) -> Point {
        Point {
            id: self.point_id(i),
            channel_id: self.channel_id(i),
            direction: self.direction(i),
            ambient_light_level: self.ambient_light_level(i),
            start_offset_ns: self.start_offset_ns(i),
            returns: Vec::new(),
        }
    }
}

fn has_any_column(packed: &frame::Packed) -> bool {
    [
        &packed.point_id,
        &packed.cartesian,
        &packed.range,
        &packed.intensity,
        &packed.ambient_light_level,
        &packed.direction,
        &packed.start_offset_ns,
        &packed.channel_id,
        &packed.return_id,
    ]
    .iter()
    .any(|column| column.is_some())
}

fn column<'a>(name: &str, bytes: Option<&'a [u8]>, len: usize, width: usize) -> Result<Option<&'a [u8]>> {
    match bytes {
        Some(bytes) if len.checked_mul(width) != Some(bytes.len()) => Err(ScannerError::decode(
            format!("packed column {}", name),
            format!("expected {} bytes per element for {} elements, found {}", width, len, bytes.len()),
        )),
        other => Ok(other),
    }
}

fn be_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn be_u64(bytes: &[u8], at: usize) -> u64 {
    u64::from_be_bytes([
        bytes[at],
        bytes[at + 1],
        bytes[at + 2],
        bytes[at + 3],
        bytes[at + 4],
        bytes[at + 5],
        bytes[at + 6],
        bytes[at + 7],
    ])
}

fn be_f32(bytes: &[u8], at: usize) -> f32 {
    f32::from_bits(be_u32(bytes, at))
}

/// Packs a structured frame.
///
/// `selection` names the columns to produce: every column that is `Some` in it
/// is filled, whatever its content. Missing source values are written as zero.
/// The returned frame carries no scanlines.
pub fn encode_packed(frame: &Frame, selection: &frame::Packed) -> Frame {
    let capacity = frame.scanlines.iter().flat_map(|line| &line.points).map(|point| point.returns.len()).sum();
    let mut columns = ColumnWriter::new(selection, capacity);

    for scanline in &frame.scanlines {
        for point in &scanline.points {
            for ret in &point.returns {
                columns.push(point, ret);
            }
        }
    }

    let len = columns.len;
    let packed = columns.finish();

    Frame {
        scanlines: Vec::new(),
        packed: Some(packed),
        total_number_of_returns: Some(frame.total_number_of_returns.unwrap_or(len)),
        ..frame.clone()
    }
}

struct ColumnWriter {
    len: u32,
    point_id: Option<Vec<u8>>,
    cartesian: Option<Vec<u8>>,
    range: Option<Vec<u8>>,
    intensity: Option<Vec<u8>>,
    ambient_light_level: Option<Vec<u8>>,
    direction: Option<Vec<u8>>,
    start_offset_ns: Option<Vec<u8>>,
    channel_id: Option<Vec<u8>>,
    return_id: Option<Vec<u8>>,
}

impl ColumnWriter {
    fn new(selection: &frame::Packed, capacity: usize) -> Self {
        let alloc = |present: bool, width: usize| present.then(|| Vec::with_capacity(capacity * width));
        Self {
            len: 0,
            point_id: alloc(selection.point_id.is_some(), 4),
            cartesian: alloc(selection.cartesian.is_some(), 12),
            range: alloc(selection.range.is_some(), 4),
            intensity: alloc(selection.intensity.is_some(), 4),
            ambient_light_level: alloc(selection.ambient_light_level.is_some(), 4),
            direction: alloc(selection.direction.is_some(), 8),
            start_offset_ns: alloc(selection.start_offset_ns.is_some(), 8),
            channel_id: alloc(selection.channel_id.is_some(), 1),
            return_id: alloc(selection.return_id.is_some(), 1),
        }
    }

    fn push(&mut self, point: &Point, ret: &point::Return) {
        self.len += 1;
        if let Some(column) = &mut self.point_id {
            column.extend_from_slice(&point.id().to_be_bytes());
        }
        if let Some(column) = &mut self.cartesian {
            for axis in 0..3 {
                let value = ret.cartesian.get(axis).copied().unwrap_or_default();
                column.extend_from_slice(&value.to_bits().to_be_bytes());
            }
        }
        if let Some(column) = &mut self.range {
            column.extend_from_slice(&ret.range().to_bits().to_be_bytes());
        }
        if let Some(column) = &mut self.intensity {
            column.extend_from_slice(&ret.intensity().to_be_bytes());
        }
        if let Some(column) = &mut self.ambient_light_level {
            column.extend_from_slice(&point.ambient_light_level().to_be_bytes());
        }
        if let Some(column) = &mut self.direction {
            let direction = point.direction.clone().unwrap_or_default();
            column.extend_from_slice(&direction.azimuth().to_bits().to_be_bytes());
            column.extend_from_slice(&direction.elevation().to_bits().to_be_bytes());
        }
        if let Some(column) = &mut self.start_offset_ns {
            column.extend_from_slice(&point.start_offset_ns().to_be_bytes());
        }
        if let Some(column) = &mut self.channel_id {
            column.push(point.channel_id() as u8);
        }
        if let Some(column) = &mut self.return_id {
            column.push(ret.id() as u8);
        }
    }

    fn finish(self) -> frame::Packed {
        frame::Packed {
            length: Some(self.len),
            point_id: self.point_id,
            cartesian: self.cartesian,
            range: self.range,
            intensity: self.intensity,
            ambient_light_level: self.ambient_light_level,
            direction: self.direction,
            start_offset_ns: self.start_offset_ns,
            channel_id: self.channel_id,
            return_id: self.return_id,
        }
    }
}

/// Expands a packed IMU burst into its sample list. Structured bursts are
/// returned unchanged.
pub fn unpack_imu(burst: &Imu) -> Result<Imu> {
    let Some(packed) = &burst.packed else {
        return Ok(burst.clone());
    };

    let len = match packed.length {
        Some(length) => length as usize,
        None => packed
            .start_offset_ns
            .as_ref()
            .map(|bytes| bytes.len() / 8)
            .or_else(|| packed.acceleration.as_ref().map(|bytes| bytes.len() / 12))
            .or_else(|| packed.angular_velocity.as_ref().map(|bytes| bytes.len() / 12))
            .unwrap_or_default(),
    };

    let offsets = column("imu start_offset_ns", packed.start_offset_ns.as_deref(), len, 8)?;
    let acceleration = column("imu acceleration", packed.acceleration.as_deref(), len, 12)?;
    let angular_velocity = column("imu angular_velocity", packed.angular_velocity.as_deref(), len, 12)?;

    let vector = |bytes: Option<&[u8]>, i: usize| -> Vec<f32> {
        bytes
            .map(|bytes| (0..3).map(|axis| be_f32(bytes, i * 12 + axis * 4)).collect())
            .unwrap_or_default()
    };

    let samples = (0..len)
        .map(|i| imu::Sample {
            start_offset_ns: offsets.map(|bytes| be_u64(bytes, i * 8)),
            acceleration: vector(acceleration, i),
            angular_velocity: vector(angular_velocity, i),
        })
        .collect();

    Ok(Imu { start_time_ns: burst.start_time_ns, samples, packed: None })
}

/// Packs every sample of a structured IMU burst.
pub fn encode_packed_imu(burst: &Imu) -> Imu {
    let len = burst.samples.len();
    let mut offsets = Vec::with_capacity(len * 8);
    let mut acceleration = Vec::with_capacity(len * 12);
    let mut angular_velocity = Vec::with_capacity(len * 12);

    for sample in &burst.samples {
        offsets.extend_from_slice(&sample.start_offset_ns().to_be_bytes());
        for axis in 0..3 {
            let a = sample.acceleration.get(axis).copied().unwrap_or_default();
            acceleration.extend_from_slice(&a.to_bits().to_be_bytes());
            let w = sample.angular_velocity.get(axis).copied().unwrap_or_default();
            angular_velocity.extend_from_slice(&w.to_bits().to_be_bytes());
        }
    }

    Imu {
        start_time_ns: burst.start_time_ns,
        samples: Vec::new(),
        packed: Some(imu::Packed {
            length: Some(len as u32),
            start_offset_ns: Some(offsets),
            acceleration: Some(acceleration),
            angular_velocity: Some(angular_velocity),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn be_bytes_u32(values: &[u32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_be_bytes()).collect()
    }

    #[test]
    fn columns_read_big_endian_values() {
        let frame = Frame { total_number_of_returns: Some(2), ..Default::default() };
        let packed = frame::Packed {
            intensity: Some(be_bytes_u32(&[10, 0x0102_0304])),
            range: Some([1.5f32, -2.0].iter().flat_map(|v| v.to_bits().to_be_bytes()).collect()),
            start_offset_ns: Some([7u64, 1 << 40].iter().flat_map(|v| v.to_be_bytes()).collect()),
            channel_id: Some(vec![3, 255]),
            ..Default::default()
        };

        let columns = Columns::new(&frame, &packed).unwrap();
        assert_eq!(columns.len(), 2);
        assert_eq!(columns.intensity(1), Some(0x0102_0304));
        assert_eq!(columns.range(0), Some(1.5));
        assert_eq!(columns.range(1), Some(-2.0));
        assert_eq!(columns.start_offset_ns(1), Some(1 << 40));
        assert_eq!(columns.channel_id(1), Some(255));
        assert_eq!(columns.point_id(0), None);
        assert!(!columns.has_point_id());
    }

    #[test]
    fn packed_length_overrides_return_counter() {
        let frame = Frame { total_number_of_returns: Some(10), ..Default::default() };
        let packed = frame::Packed {
            length: Some(1),
            intensity: Some(be_bytes_u32(&[42])),
            ..Default::default()
        };
        let columns = Columns::new(&frame, &packed).unwrap();
        assert_eq!(columns.len(), 1);
        assert_eq!(columns.intensity(0), Some(42));
    }

    #[test]
    fn counters_without_columns_hold_no_elements() {
        let frame = Frame { total_number_of_returns: Some(u32::MAX), ..Default::default() };
        let packed = frame::Packed { length: Some(u32::MAX), ..Default::default() };

        let columns = Columns::new(&frame, &packed).unwrap();
        assert_eq!(columns.len(), 0);
    }

    #[test]
    fn oversized_counter_is_checked_against_the_columns() {
        let frame = Frame::default();
        let packed = frame::Packed {
            length: Some(u32::MAX),
            channel_id: Some(vec![1, 2]),
            ..Default::default()
        };

        let err = Columns::new(&frame, &packed).unwrap_err();
        assert!(err.to_string().contains("channel_id"));
    }

    #[test]
    fn mismatched_column_is_a_decode_error() {
        let frame = Frame { total_number_of_returns: Some(3), ..Default::default() };
        let packed = frame::Packed { point_id: Some(be_bytes_u32(&[0, 1])), ..Default::default() };

        let err = Columns::new(&frame, &packed).unwrap_err();
        assert!(matches!(err, ScannerError::Decode { .. }));
        assert!(err.to_string().contains("point_id"));
    }

    #[test]
    fn imu_bursts_unpack_every_sample() {
        let burst = Imu {
            start_time_ns: Some(1_000),
            samples: vec![
                imu::Sample {
                    start_offset_ns: Some(0),
                    acceleration: vec![0.0, 0.0, 9.81],
                    angular_velocity: vec![0.1, 0.2, 0.3],
                },
                imu::Sample {
                    start_offset_ns: Some(5_000),
                    acceleration: vec![0.5, -0.5, 9.7],
                    angular_velocity: vec![0.0, 0.0, -0.1],
                },
            ],
            packed: None,
        };

        let packed = encode_packed_imu(&burst);
        assert!(packed.samples.is_empty());
        assert_eq!(unpack_imu(&packed).unwrap(), burst);
    }

    #[test]
    fn truncated_imu_column_is_rejected() {
        let burst = Imu {
            packed: Some(imu::Packed {
                length: Some(2),
                start_offset_ns: Some(vec![0; 8]),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(unpack_imu(&burst).is_err());
    }
}
