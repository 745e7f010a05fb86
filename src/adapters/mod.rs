//! Frame decoding: packed columns to structured frames, and frames to flat
//! point lists.
//!
//! Everything here is pure; decoders take a wire frame by reference and
//! return a new value.
//!
//! ```rust
//! use scanlink::adapters::{FrameAdapter, decode_to_flat};
//! use scanlink::protocol::Frame;
//! use scanlink::types::SimpleFrame;
//!
//! let wire = Frame::default();
//! let structured = Frame::adapt(&wire)?;
//! let flat: SimpleFrame = decode_to_flat(&structured)?;
//! assert!(flat.points.is_empty());
//! # Ok::<(), scanlink::ScannerError>(())
//! ```

mod frame_adapter;
mod packed;
mod scanlines;

pub use frame_adapter::{FrameAdapter, decode_to_flat, decode_to_structured};
pub use packed::{encode_packed, encode_packed_imu, unpack_imu};
pub use scanlines::{points_per_scanline, scanline_count};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::config::scan_pattern::{FrameRate, Pulse, Vertical};
    use crate::protocol::data::frame::Packed;
    use crate::protocol::{Frame, FrameMode, ScanPattern};
    use crate::test_utils::{all_columns, structured_frame};
    use crate::types::SimpleFrame;

    fn be<T: Copy, const N: usize>(values: &[T], to_bytes: fn(T) -> [u8; N]) -> Vec<u8> {
        values.iter().flat_map(|v| to_bytes(*v)).collect()
    }

    fn one_scanline_pattern() -> ScanPattern {
        ScanPattern {
            vertical: Some(Vertical { scanlines_up: Some(1), ..Default::default() }),
            pulse: Some(Pulse { frame_mode: Some(FrameMode::OnlyUp as i32), ..Default::default() }),
            frame_rate: Some(FrameRate { target: Some(5.0), maximum: Some(7.5) }),
            ..Default::default()
        }
    }

    fn three_return_frame() -> Frame {
        let cartesian = [1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0];
        Frame {
            id: Some(12),
            start_time_ns: Some(99),
            scan_pattern: Some(one_scanline_pattern()),
            total_number_of_points: Some(2),
            total_number_of_returns: Some(3),
            packed: Some(Packed {
                length: Some(3),
                point_id: Some(be(&[0u32, 0, 1], u32::to_be_bytes)),
                cartesian: Some(be(&cartesian.map(f32::to_bits), u32::to_be_bytes)),
                intensity: Some(be(&[10u32, 20, 30], u32::to_be_bytes)),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn packed_returns_group_into_points() {
        let frame = decode_to_structured(&three_return_frame()).unwrap();

        assert!(frame.packed.is_none());
        assert_eq!(frame.scanlines.len(), 1);
        let line = &frame.scanlines[0];
        assert_eq!(line.id, Some(0));
        assert_eq!(line.points.len(), 2);

        let first = &line.points[0];
        assert_eq!(first.id, Some(0));
        assert_eq!(first.returns.len(), 2);
        assert_eq!(first.returns[0].cartesian, vec![1.0, 2.0, 3.0]);
        assert_eq!(first.returns[0].intensity, Some(10));
        assert_eq!(first.returns[1].cartesian, vec![4.0, 5.0, 6.0]);
        assert_eq!(first.returns[1].intensity, Some(20));

        let second = &line.points[1];
        assert_eq!(second.id, Some(1));
        assert_eq!(second.returns.len(), 1);
        assert_eq!(second.returns[0].cartesian, vec![7.0, 8.0, 9.0]);
        assert_eq!(second.returns[0].intensity, Some(30));
    }

    #[test]
    fn missing_point_ids_yield_one_point() {
        let mut wire = three_return_frame();
        if let Some(packed) = &mut wire.packed {
            packed.point_id = None;
        }

        let frame = decode_to_structured(&wire).unwrap();
        assert_eq!(frame.scanlines.len(), 1);
        assert_eq!(frame.scanlines[0].points.len(), 1);
        assert_eq!(frame.scanlines[0].points[0].returns.len(), 3);
    }

    #[test]
    fn point_ids_split_scanlines() {
        let wire = encode_packed(&structured_frame(1, 4, 3, 2), &all_columns());
        let frame = decode_to_structured(&wire).unwrap();

        let ids: Vec<_> = frame.scanlines.iter().map(|line| line.id()).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
        assert!(frame.scanlines.iter().all(|line| line.points.len() == 3));
    }

    #[test]
    fn structured_frames_pass_through() {
        let wire = structured_frame(3, 2, 2, 1);
        assert_eq!(decode_to_structured(&wire).unwrap(), wire);
    }

    #[test]
    fn flat_form_truncates_to_sixteen_bits() {
        let mut wire = three_return_frame();
        if let Some(packed) = &mut wire.packed {
            packed.intensity = Some(be(&[70_000u32, 65_535, 1], u32::to_be_bytes));
            packed.ambient_light_level = Some(be(&[65_536u32, 2, 3], u32::to_be_bytes));
        }

        let flat = SimpleFrame::adapt(&wire).unwrap();
        assert_eq!(flat.id, 12);
        assert_eq!(flat.start_time_ns, 99);
        assert_eq!(flat.frame_rate, 7.5);
        assert_eq!(flat.points.len(), 3);
        assert_eq!(flat.points[0].intensity, 70_000u32 as u16);
        assert_eq!(flat.points[1].intensity, 65_535);
        assert_eq!(flat.points[0].ambient_light_level, 0);
        assert_eq!(flat.points[2].id, 1);
        assert_eq!((flat.points[2].x, flat.points[2].y, flat.points[2].z), (7.0, 8.0, 9.0));
    }

    #[test]
    fn flat_form_is_identical_for_packed_and_structured_input() {
        let structured = structured_frame(8, 3, 4, 2);
        let packed = encode_packed(&structured, &all_columns());

        let from_structured = decode_to_flat(&structured).unwrap();
        let from_packed = decode_to_flat(&packed).unwrap();
        assert_eq!(from_structured, from_packed);
        assert_eq!(from_structured.points.len(), 24);
    }

    #[test]
    fn inflated_counters_allocate_only_what_the_frame_holds() {
        let empty = Frame { total_number_of_returns: Some(u32::MAX), ..Default::default() };
        assert!(decode_to_flat(&empty).unwrap().points.is_empty());

        let mut structured = structured_frame(3, 2, 2, 1);
        structured.total_number_of_returns = Some(u32::MAX);
        assert_eq!(decode_to_flat(&structured).unwrap().points.len(), 4);
        let repacked = encode_packed(&structured, &all_columns());
        assert_eq!(repacked.packed.and_then(|packed| packed.channel_id).map(|column| column.len()), Some(4));

        let columnless = Frame {
            total_number_of_returns: Some(u32::MAX),
            packed: Some(Packed { length: Some(u32::MAX), ..Default::default() }),
            ..Default::default()
        };
        let decoded = decode_to_structured(&columnless).unwrap();
        assert!(decoded.scanlines.iter().all(|line| line.points.is_empty()));
        assert!(decode_to_flat(&columnless).unwrap().points.is_empty());
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
          #[test]
          fn packing_then_unpacking_restores_the_frame(
            scanlines in 1u32..6,
            points_per_scanline in 1u32..8,
            returns_per_point in 1u32..4,
            id in any::<u64>(),
          ) {
            let structured = structured_frame(id, scanlines, points_per_scanline, returns_per_point);
            let packed = encode_packed(&structured, &all_columns());
            prop_assert!(packed.scanlines.is_empty());

            let decoded = decode_to_structured(&packed).unwrap();
            prop_assert_eq!(&decoded, &structured);

            let returns: usize = decoded
              .scanlines
              .iter()
              .flat_map(|line| &line.points)
              .map(|point| point.returns.len())
              .sum();
            prop_assert_eq!(returns as u32, decoded.total_number_of_returns());
          }
        }
    }
}
