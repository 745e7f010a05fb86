//! Scanline bookkeeping for packed frames.

use crate::protocol::{Frame, FrameMode};

/// Number of scanlines the frame's scan pattern produces per frame.
///
/// Without a scan pattern the populated scanlines are counted instead;
/// `None` means the count is unknown.
pub fn scanline_count(frame: &Frame) -> Option<u32> {
    let Some(pattern) = &frame.scan_pattern else {
        return match frame.scanlines.len() {
            0 => None,
            n => u32::try_from(n).ok(),
        };
    };

    let vertical = pattern.vertical.clone().unwrap_or_default();
    let up = vertical.scanlines_up();
    let down = vertical.scanlines_down();
    let mode = pattern.pulse.as_ref().map(|pulse| pulse.frame_mode()).unwrap_or(FrameMode::CombineUpDown);

    let count = match mode {
        FrameMode::CombineUpDown => up + down,
        FrameMode::OnlyUp => up,
        FrameMode::OnlyDown => down,
        FrameMode::Separate if frame.is_ramp_up_phase() => up,
        FrameMode::Separate => down,
    };
    Some(count)
}

/// Points per scanline, if both the point total and the scanline count are known.
pub fn points_per_scanline(frame: &Frame) -> Option<u32> {
    let scanlines = scanline_count(frame).filter(|count| *count > 0)?;
    let points = frame.total_number_of_points.filter(|points| *points > 0)?;
    Some(points / scanlines).filter(|per_line| *per_line > 0)
}
