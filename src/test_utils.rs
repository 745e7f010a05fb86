//! Fixtures shared by unit tests and benchmarks.
//!
//! Frames built here are deterministic: every field is derived from the
//! point and return index, so a frame can be rebuilt and compared after a
//! round trip through the packed form or a recording.

#![cfg(any(test, feature = "benchmark"))]

use prost::Message;
use tokio::io::duplex;
use tokio::net::TcpListener;

use crate::config::RecordingConfig;
use crate::fault::ProtocolFault;
use crate::protocol::config::scan_pattern::{FrameRate, Pulse, Vertical};
use crate::protocol::data::frame::Packed;
use crate::protocol::data::point;
use crate::protocol::{Frame, FrameMode, Point, Request, Response, ScanPattern, Scanline, response};
use crate::recording::Recorder;
use crate::transport::{self, BoxedStream};
use crate::{Result, ScannerError};

/// Scan pattern sweeping `scanlines` lines upwards at `frame_rate` Hz.
pub fn scan_pattern(scanlines: u32, frame_rate: f64) -> ScanPattern {
    ScanPattern {
        vertical: Some(Vertical { fov: Some(30.0), scanlines_up: Some(scanlines), scanlines_down: Some(0) }),
        pulse: Some(Pulse { frame_mode: Some(FrameMode::OnlyUp as i32), ..Default::default() }),
        frame_rate: Some(FrameRate { target: Some(frame_rate), maximum: Some(frame_rate) }),
        ..Default::default()
    }
}

/// A fully populated structured frame.
pub fn structured_frame(id: u64, scanlines: u32, points_per_scanline: u32, returns_per_point: u32) -> Frame {
    let lines = (0..scanlines)
        .map(|line| Scanline {
            id: Some(line),
            start_offset_ns: None,
            points: (0..points_per_scanline)
                .map(|j| structured_point(line * points_per_scanline + j, j, line, returns_per_point))
                .collect(),
        })
        .collect();

    let points = scanlines * points_per_scanline;
    Frame {
        id: Some(id),
        start_time_ns: Some(id.wrapping_mul(100_000_000)),
        scan_pattern: Some(scan_pattern(scanlines, 10.0)),
        total_number_of_points: Some(points),
        total_number_of_returns: Some(points * returns_per_point),
        is_ramp_up_phase: Some(false),
        scanlines: lines,
        packed: None,
    }
}

fn structured_point(id: u32, column: u32, line: u32, returns: u32) -> Point {
    Point {
        id: Some(id),
        channel_id: Some(id % 4),
        direction: Some(point::Direction { azimuth: Some(column as f32 * 0.1), elevation: Some(line as f32 * 0.2) }),
        ambient_light_level: Some(id * 3),
        start_offset_ns: Some(u64::from(id) * 1_000),
        returns: (0..returns)
            .map(|r| point::Return {
                id: Some(r),
                cartesian: vec![id as f32, r as f32, (id + r) as f32 * 0.5],
                range: Some(id as f32 + r as f32 * 0.25),
                intensity: Some(id * 10 + r),
            })
            .collect(),
    }
}

/// Packed selection requesting every column.
pub fn all_columns() -> Packed {
    Packed {
        length: None,
        point_id: Some(Vec::new()),
        cartesian: Some(Vec::new()),
        range: Some(Vec::new()),
        intensity: Some(Vec::new()),
        ambient_light_level: Some(Vec::new()),
        direction: Some(Vec::new()),
        start_offset_ns: Some(Vec::new()),
        channel_id: Some(Vec::new()),
        return_id: Some(Vec::new()),
    }
}

/// A complete recording of `frames` without a device header.
pub fn recording_bytes(frames: &[Frame]) -> Vec<u8> {
    let mut recorder = match Recorder::start(Vec::new(), None, &RecordingConfig::default()) {
        Ok(recorder) => recorder,
        Err(e) => panic!("starting an in-memory recording failed: {e}"),
    };
    for frame in frames {
        if let Err(e) = recorder.record(frame) {
            panic!("recording frame {} failed: {e}", frame.id());
        }
    }
    match recorder.finish() {
        Ok(bytes) => bytes,
        Err(e) => panic!("finishing an in-memory recording failed: {e}"),
    }
}

/// The device end of a connection, driven step by step by a test.
pub struct ScriptedDevice {
    stream: Option<BoxedStream>,
}

impl ScriptedDevice {
    /// An in-memory socket pair: the client end and the scripted device.
    pub fn pair() -> (BoxedStream, Self) {
        let (client, device) = duplex(1 << 20);
        (Box::new(client), Self { stream: Some(Box::new(device)) })
    }

    /// Waits for one client on `listener`.
    pub async fn accept(listener: &TcpListener) -> Result<Self> {
        let (socket, _) = listener
            .accept()
            .await
            .map_err(|e| ScannerError::io("accepting a scripted client", e))?;
        Ok(Self { stream: Some(Box::new(socket)) })
    }

    /// Reads the next request the client sent.
    pub async fn expect_request(&mut self) -> Result<Request> {
        let stream = self.stream()?;
        let payload = transport::read_framed(stream, None).await?;
        Request::decode(payload.as_slice()).map_err(|e| ScannerError::decode("scripted request", e.to_string()))
    }

    pub async fn reply(&mut self, response: Response) -> Result<()> {
        let stream = self.stream()?;
        transport::write_framed(stream, &response.encode_to_vec()).await
    }

    /// Sends an unsolicited event. On the wire this is the same as a reply.
    pub async fn push_event(&mut self, response: Response) -> Result<()> {
        self.reply(response).await
    }

    pub async fn reply_fault(&mut self, fault: ProtocolFault) -> Result<()> {
        self.reply(response::Data::Error(fault.to_envelope()).into()).await
    }

    /// Hangs up; the client sees end of stream.
    pub fn close(&mut self) {
        self.stream = None;
    }

    fn stream(&mut self) -> Result<&mut BoxedStream> {
        self.stream.as_mut().ok_or_else(|| ScannerError::connection_aborted("scripted device already closed"))
    }
}
