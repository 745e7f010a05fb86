//! Writing `.bfpc` recordings.

use std::io::Write;
use std::time::{SystemTime, UNIX_EPOCH};

use flate2::Compression;
use flate2::write::GzEncoder;
use tracing::{debug, info};

use super::footer::FooterTracker;
use super::format::write_message;
use crate::config::RecordingConfig;
use crate::protocol::file::{Data, Footer, Header, Language, header};
use crate::protocol::{DeviceHeader, Frame};
use crate::{Result, ScannerError};

/// Appends frames to a gzip-compressed recording.
///
/// The header is written by [`Recorder::start`]; [`Recorder::finish`] writes
/// the footer and completes the gzip stream. A recorder dropped without
/// `finish` leaves a recording without footer.
pub struct Recorder<W: Write> {
    pub(super) encoder: GzEncoder<W>,
    tracker: FooterTracker,
}

impl<W: Write> Recorder<W> {
    /// Writes the header for `device` and returns a recorder positioned at
    /// the first data message.
    pub fn start(writer: W, device: Option<DeviceHeader>, config: &RecordingConfig) -> Result<Self> {
        let mut encoder = GzEncoder::new(writer, Compression::new(config.compression_level));
        let header = Header { device, client: Some(client_block()) };
        write_message(&mut encoder, &header)?;
        debug!("Recording started with compression level {}", config.compression_level);

        Ok(Self { encoder, tracker: FooterTracker::new(config.scan_pattern_tolerance) })
    }

    /// Appends one frame as received from the device.
    pub fn record(&mut self, frame: &Frame) -> Result<()> {
        self.tracker.observe(frame);
        write_message(&mut self.encoder, &Data::frame(frame.clone()))
    }

    /// Footer as it would be written now.
    pub fn footer(&self) -> &Footer {
        self.tracker.footer()
    }

    /// Writes the footer, completes the gzip stream and flushes the output.
    pub fn finish(mut self) -> Result<W> {
        let footer = self.tracker.into_footer();
        let frames = footer.stats.as_ref().map(|stats| stats.frames()).unwrap_or_default();
        write_message(&mut self.encoder, &Data::footer(footer))?;

        let mut writer = self
            .encoder
            .finish()
            .map_err(|e| ScannerError::io("finishing a recording", e))?;
        writer.flush().map_err(|e| ScannerError::io("flushing a recording", e))?;
        info!("Recording finished after {} frames", frames);
        Ok(writer)
    }
}

fn client_block() -> header::Client {
    let file_time_ns = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos() as u64)
        .unwrap_or_default();
    header::Client {
        library_version: Some(env!("CARGO_PKG_VERSION").to_string()),
        file_time_ns: Some(file_time_ns),
        language: Some(Language::Rust as i32),
    }
}
