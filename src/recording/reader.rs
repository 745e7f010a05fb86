//! Reading `.bfpc` recordings.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use flate2::bufread::MultiGzDecoder;
use tracing::{debug, trace, warn};

use super::format::{decode_body, read_message};
use crate::protocol::Frame;
use crate::protocol::file::{Data, Footer, Header, Metadata, data};
use crate::{Result, ScannerError};

/// Sequential reader over a recording with footer lookup.
///
/// Opening scans the whole recording once to find the footer, then rewinds to
/// the first frame. Offsets are positions in the decompressed stream;
/// rewinding re-inflates from the start of the file.
pub struct RecordingReader<R: Read + Seek> {
    decoder: Option<MultiGzDecoder<BufReader<R>>>,
    position: u64,
    header: Header,
    footer: Option<Footer>,
    data_offset: u64,
    footer_offset: u64,
    buffered: Option<Frame>,
    exhausted: bool,
}

impl RecordingReader<File> {
    /// Opens a recording on disk.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| ScannerError::file_error(path.to_path_buf(), e))?;
        debug!("Opening recording {}", path.display());
        Self::new(file)
    }
}

impl<R: Read + Seek> RecordingReader<R> {
    /// Parses the header, locates the footer and positions on the first frame.
    pub fn new(source: R) -> Result<Self> {
        let mut reader = Self {
            decoder: Some(MultiGzDecoder::new(BufReader::new(source))),
            position: 0,
            header: Header::default(),
            footer: None,
            data_offset: 0,
            footer_offset: 0,
            buffered: None,
            exhausted: false,
        };

        let body = reader
            .read_raw()?
            .ok_or_else(|| ScannerError::stream_corrupted("recording has no header"))?;
        reader.header = decode_body(&body, "recording header")?;
        reader.data_offset = reader.position;

        reader.scan_for_footer()?;
        reader.rewind_to(reader.data_offset)?;
        Ok(reader)
    }

    /// Reads forward to the last message, remembering where it started.
    fn scan_for_footer(&mut self) -> Result<()> {
        let mut footer_offset = self.data_offset;
        let mut last = None;
        let mut messages = 0u64;

        loop {
            let offset = self.position;
            match self.read_raw()? {
                // An empty data message ends the recording.
                Some(body) if body.is_empty() => break,
                Some(body) => {
                    footer_offset = offset;
                    last = Some(body);
                    messages += 1;
                }
                None => break,
            }
        }

        self.footer_offset = footer_offset;
        self.footer = match last {
            Some(body) => match decode_body::<Data>(&body, "recording footer")?.kind {
                Some(data::Kind::Footer(footer)) => Some(footer),
                _ => {
                    warn!("Recording has no footer; it was not finished");
                    None
                }
            },
            None => None,
        };
        debug!("Scanned {} data messages, footer at offset {}", messages, footer_offset);
        Ok(())
    }

    /// Repositions the decompressed stream at `offset`.
    fn rewind_to(&mut self, offset: u64) -> Result<()> {
        let decoder = self
            .decoder
            .take()
            .ok_or_else(|| ScannerError::stream_corrupted("recording source lost after an earlier failure"))?;

        let mut source = decoder.into_inner().into_inner();
        source.seek(SeekFrom::Start(0)).map_err(|e| ScannerError::io("rewinding a recording", e))?;
        let mut decoder = MultiGzDecoder::new(BufReader::new(source));

        let skipped = std::io::copy(&mut (&mut decoder).take(offset), &mut std::io::sink())
            .map_err(|e| ScannerError::io("rewinding a recording", e))?;
        if skipped != offset {
            return Err(ScannerError::stream_corrupted(format!(
                "recording shrank while reading: offset {} beyond end {}",
                offset, skipped
            )));
        }

        self.decoder = Some(decoder);
        self.position = offset;
        trace!("Rewound recording to offset {}", offset);
        Ok(())
    }

    fn read_raw(&mut self) -> Result<Option<Vec<u8>>> {
        let decoder = self
            .decoder
            .as_mut()
            .ok_or_else(|| ScannerError::stream_corrupted("recording source lost after an earlier failure"))?;
        match read_message(decoder)? {
            Some((body, consumed)) => {
                self.position += consumed;
                Ok(Some(body))
            }
            None => Ok(None),
        }
    }

    /// Buffers the next frame unless one is buffered or the stream ended.
    fn fill(&mut self) -> Result<()> {
        if self.buffered.is_some() || self.exhausted {
            return Ok(());
        }
        if self.position >= self.footer_offset && self.footer.is_some() {
            self.exhausted = true;
            return Ok(());
        }

        match self.read_raw()? {
            None => self.exhausted = true,
            Some(body) if body.is_empty() => self.exhausted = true,
            Some(body) => match decode_body::<Data>(&body, "recording data")?.kind {
                Some(data::Kind::Frame(frame)) => self.buffered = Some(frame),
                Some(data::Kind::Footer(_)) => self.exhausted = true,
                None => {
                    return Err(ScannerError::stream_corrupted(
                        "data message carries neither frame nor footer",
                    ));
                }
            },
        }
        Ok(())
    }

    /// Whether every frame was consumed. Reads ahead at most one message and
    /// can be called repeatedly.
    pub fn is_end_of_stream(&mut self) -> Result<bool> {
        self.fill()?;
        Ok(self.buffered.is_none())
    }

    /// Returns the next frame as stored.
    ///
    /// Fails with [`ScannerError::EndOfStream`] once every frame was consumed.
    pub fn next_frame(&mut self) -> Result<Frame> {
        self.fill()?;
        self.buffered.take().ok_or(ScannerError::EndOfStream)
    }

    /// Rewinds to the first frame and buffers it.
    pub fn seek_to_first_frame(&mut self) -> Result<()> {
        self.rewind_to(self.data_offset)?;
        self.buffered = None;
        self.exhausted = false;
        self.fill()
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// `None` when the recording was not finished.
    pub fn footer(&self) -> Option<&Footer> {
        self.footer.as_ref()
    }

    pub fn metadata(&self) -> Metadata {
        Metadata { header: Some(self.header.clone()), footer: self.footer.clone() }
    }

    /// Number of frames according to the footer.
    pub fn frame_count(&self) -> Option<u64> {
        self.footer.as_ref().and_then(|footer| footer.stats.as_ref()).map(|stats| stats.frames())
    }
}

impl<R: Read + Seek> std::fmt::Debug for RecordingReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingReader")
            .field("position", &self.position)
            .field("data_offset", &self.data_offset)
            .field("footer_offset", &self.footer_offset)
            .field("exhausted", &self.exhausted)
            .finish()
    }
}
