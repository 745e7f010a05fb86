//! Running footer statistics and scan-pattern change tracking.

use crate::protocol::config::ValueRange;
use crate::protocol::file::{Footer, footer};
use crate::protocol::{Frame, ScanPattern};

/// Smallest difference treated as a change, whatever the magnitudes.
const ABSOLUTE_TOLERANCE: f64 = 1e-6;

/// Accumulates the footer of a recording while frames are written.
#[derive(Debug, Clone)]
pub struct FooterTracker {
    footer: Footer,
    previous: ScanPattern,
    tolerance: f32,
}

impl FooterTracker {
    /// `tolerance` is the relative difference below which two scan patterns match.
    pub fn new(tolerance: f32) -> Self {
        Self {
            footer: Footer { events: Vec::new(), stats: Some(footer::Stats::default()) },
            previous: ScanPattern::default(),
            tolerance,
        }
    }

    /// Counts `frame` and logs a change event if its scan pattern differs from
    /// the previous frame's.
    pub fn observe(&mut self, frame: &Frame) {
        if let Some(pattern) = &frame.scan_pattern {
            if !scan_patterns_match(pattern, &self.previous, self.tolerance) {
                self.footer.events.push(footer::Event {
                    from_frame_id: frame.id,
                    scan_pattern: Some(pattern.clone()),
                });
                self.previous = pattern.clone();
            }
        }

        let (points, returns) = frame_counts(frame);
        let stats = self.footer.stats.get_or_insert_with(Default::default);
        stats.frames = Some(stats.frames() + 1);
        stats.points = Some(stats.points() + points);
        stats.returns = Some(stats.returns() + returns);
    }

    pub fn footer(&self) -> &Footer {
        &self.footer
    }

    pub fn into_footer(self) -> Footer {
        self.footer
    }
}

/// Point and return counts of a frame; counters win over counting.
fn frame_counts(frame: &Frame) -> (u64, u64) {
    let points = frame.total_number_of_points.map(u64::from).unwrap_or_else(|| {
        frame.scanlines.iter().map(|line| line.points.len() as u64).sum()
    });
    let returns = frame.total_number_of_returns.map(u64::from).unwrap_or_else(|| {
        frame.scanlines.iter().flat_map(|line| &line.points).map(|p| p.returns.len() as u64).sum()
    });
    (points, returns)
}

/// Compares two scan patterns field by field.
///
/// Floating-point fields match within `tolerance` relative to the larger
/// magnitude, with an absolute floor; everything else compares exactly.
/// Absent fields compare as their defaults.
pub fn scan_patterns_match(a: &ScanPattern, b: &ScanPattern, tolerance: f32) -> bool {
    let close = |x: f64, y: f64| approx_eq(x, y, f64::from(tolerance));

    let (ah, bh) = (a.horizontal.clone().unwrap_or_default(), b.horizontal.clone().unwrap_or_default());
    let (av, bv) = (a.vertical.clone().unwrap_or_default(), b.vertical.clone().unwrap_or_default());
    let (ap, bp) = (a.pulse.clone().unwrap_or_default(), b.pulse.clone().unwrap_or_default());
    let (ar, br) = (a.frame_rate.clone().unwrap_or_default(), b.frame_rate.clone().unwrap_or_default());
    let (af, bf) = (a.filter.clone().unwrap_or_default(), b.filter.clone().unwrap_or_default());

    let ranges_match = |x: &Option<ValueRange>, y: &Option<ValueRange>| {
        let (x, y) = (x.clone().unwrap_or_default(), y.clone().unwrap_or_default());
        close(x.minimum().into(), y.minimum().into()) && close(x.maximum().into(), y.maximum().into())
    };

    close(ah.fov().into(), bh.fov().into())
        && close(av.fov().into(), bv.fov().into())
        && av.scanlines_up() == bv.scanlines_up()
        && av.scanlines_down() == bv.scanlines_down()
        && close(ap.angle_spacing().into(), bp.angle_spacing().into())
        && ap.frame_mode() == bp.frame_mode()
        && ap.distortion_correction() == bp.distortion_correction()
        && close(ar.target(), br.target())
        && close(ar.maximum(), br.maximum())
        && af.max_number_of_returns_per_point() == bf.max_number_of_returns_per_point()
        && ranges_match(&af.intensity, &bf.intensity)
        && ranges_match(&af.ambient_light_level, &bf.ambient_light_level)
        && ranges_match(&af.range, &bf.range)
        && af.delete_points_without_returns() == bf.delete_points_without_returns()
}

fn approx_eq(x: f64, y: f64, relative: f64) -> bool {
    if x == y {
        return true;
    }
    let allowed = (relative * x.abs().max(y.abs())).max(ABSOLUTE_TOLERANCE);
    (x - y).abs() <= allowed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::config::scan_pattern::{FrameRate, Vertical};
    use crate::test_utils::{scan_pattern, structured_frame};

    #[test]
    fn float_noise_is_not_a_change() {
        let a = scan_pattern(10, 5.0);
        let mut b = a.clone();
        b.frame_rate = Some(FrameRate { target: Some(5.0 + 1e-9), maximum: Some(5.0) });
        assert!(scan_patterns_match(&a, &b, 1e-5));

        b.frame_rate = Some(FrameRate { target: Some(5.1), maximum: Some(5.0) });
        assert!(!scan_patterns_match(&a, &b, 1e-5));
    }

    #[test]
    fn integer_fields_compare_exactly() {
        let a = scan_pattern(10, 5.0);
        let mut b = a.clone();
        b.vertical = Some(Vertical { scanlines_up: Some(11), ..a.vertical.clone().unwrap_or_default() });
        assert!(!scan_patterns_match(&a, &b, 0.5));
    }

    #[test]
    fn tracker_logs_changes_and_counts() {
        let mut tracker = FooterTracker::new(1e-5);
        let first = structured_frame(0, 2, 3, 1);
        let mut second = structured_frame(1, 2, 3, 2);
        second.scan_pattern = first.scan_pattern.clone();
        let mut third = structured_frame(2, 2, 3, 1);
        third.scan_pattern = Some(scan_pattern(4, 10.0));

        for frame in [&first, &second, &third] {
            tracker.observe(frame);
        }

        let footer = tracker.into_footer();
        let from: Vec<_> = footer.events.iter().map(|event| event.from_frame_id()).collect();
        assert_eq!(from, vec![0, 2]);

        let stats = footer.stats.unwrap();
        assert_eq!(stats.frames(), 3);
        assert_eq!(stats.points(), 18);
        assert_eq!(stats.returns(), 6 + 12 + 6);
    }

    #[test]
    fn counts_fall_back_to_scanlines() {
        let mut frame = structured_frame(0, 2, 2, 3);
        frame.total_number_of_points = None;
        frame.total_number_of_returns = None;
        assert_eq!(frame_counts(&frame), (4, 12));
    }
}
