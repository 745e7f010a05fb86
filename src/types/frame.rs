//! Flat point-cloud representation.

use serde::{Deserialize, Serialize};

/// One return, detached from its scanline and point grouping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SimplePoint {
    /// Id of the point this return belongs to.
    pub id: u32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub range: f32,
    pub intensity: u16,
    pub ambient_light_level: u16,
}

/// A frame reduced to a list of [`SimplePoint`]s.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimpleFrame {
    pub id: u64,
    pub start_time_ns: u64,
    /// Maximum frame rate of the scan pattern in effect, in Hz.
    pub frame_rate: f32,
    pub points: Vec<SimplePoint>,
}

impl SimpleFrame {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Axis-aligned bounds of all points as `(min, max)`.
    pub fn bounds(&self) -> Option<([f32; 3], [f32; 3])> {
        let first = self.points.first()?;
        let start = ([first.x, first.y, first.z], [first.x, first.y, first.z]);
        Some(self.points.iter().fold(start, |(mut min, mut max), point| {
            for (axis, value) in [point.x, point.y, point.z].into_iter().enumerate() {
                min[axis] = min[axis].min(value);
                max[axis] = max[axis].max(value);
            }
            (min, max)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_cover_every_point() {
        let frame = SimpleFrame {
            points: vec![
                SimplePoint { x: 1.0, y: -2.0, z: 0.5, ..Default::default() },
                SimplePoint { x: -3.0, y: 4.0, z: 0.0, ..Default::default() },
            ],
            ..Default::default()
        };

        assert_eq!(frame.bounds(), Some(([-3.0, -2.0, 0.0], [1.0, 4.0, 0.5])));
        assert_eq!(SimpleFrame::default().bounds(), None);
    }
}
