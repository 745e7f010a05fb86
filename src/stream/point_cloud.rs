//! Point-cloud stream over a live subscription or a recording.

use std::fs::File;
use std::io::{BufWriter, Read, Seek, Write};
use std::marker::PhantomData;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, warn};

use super::subscription::{self, Subscription};
use crate::adapters::FrameAdapter;
use crate::config::RecordingConfig;
use crate::connection::{CallbackError, Connection, DispatchHandle, EventKind};
use crate::protocol::config::scan_pattern::Filter;
use crate::protocol::file::{Header, Metadata};
use crate::protocol::request::subscribe;
use crate::protocol::{DeviceHeader, Frame, event};
use crate::provider::FrameSource;
use crate::providers::{LiveSource, ReplaySource};
use crate::recording::{Recorder, RecordingReader};
use crate::scanner::Scanner;
use crate::{Result, ScannerError};

/// Seekable byte source a recording can be replayed from.
pub trait RecordingSource: Read + Seek + Send {}

impl<T: Read + Seek + Send> RecordingSource for T {}

type SharedRecorder = Arc<Mutex<Option<Recorder<Box<dyn Write + Send>>>>>;

enum Source {
    Live { source: LiveSource, header: DeviceHeader, recorder: SharedRecorder },
    File(ReplaySource<Box<dyn RecordingSource>>),
    Closed,
}

impl Source {
    fn mode(&self) -> &'static str {
        match self {
            Source::Live { .. } => "live",
            Source::File(_) => "file replay",
            Source::Closed => "closed",
        }
    }
}

/// Frames from a device or a `.bfpc` recording, decoded into `T`.
///
/// `T` is [`Frame`] for the structured form or
/// [`SimpleFrame`](crate::types::SimpleFrame) for the flat point list. Live
/// streams borrow the scanner that opened them and own a dedicated
/// connection; replay streams are independent.
///
/// | operation | live | file replay |
/// |---|---|---|
/// | `receive_next_frame` | yes | yes |
/// | `is_end_of_stream`, `seek_to_first_frame` | | yes |
/// | `subscribe`, `subscribe_stream`, recording | yes | |
pub struct PointCloudStream<'s, T: FrameAdapter = Frame> {
    source: Source,
    recording: RecordingConfig,
    _scanner: PhantomData<&'s Scanner>,
    _output: PhantomData<fn() -> T>,
}

impl<T: FrameAdapter> PointCloudStream<'static, T> {
    /// Opens a recording for replay.
    pub fn open_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| ScannerError::file_error(path.to_path_buf(), e))?;
        info!("Replaying recording {}", path.display());
        Self::from_reader(file)
    }

    /// Replays a recording from any seekable source.
    pub fn from_reader(source: impl RecordingSource + 'static) -> Result<Self> {
        let reader = RecordingReader::new(Box::new(source) as Box<dyn RecordingSource>)?;
        Ok(Self {
            source: Source::File(ReplaySource::new(reader)),
            recording: RecordingConfig::default(),
            _scanner: PhantomData,
            _output: PhantomData,
        })
    }
}

impl<'s, T: FrameAdapter> PointCloudStream<'s, T> {
    /// Subscribes to point clouds on a dedicated connection.
    pub(crate) async fn live(
        connection: Connection,
        reference_frame: Option<Frame>,
        filter: Option<Filter>,
        recording: RecordingConfig,
    ) -> Result<Self> {
        let kind = subscribe::Kind::PointCloud(subscribe::PointCloud { reference_frame, filter });
        let (source, reply) = LiveSource::subscribe(connection, kind).await?;

        let header = match reply.into_event() {
            Some(event::Data::PointCloud(point_cloud)) => point_cloud.header.unwrap_or_default(),
            _ => DeviceHeader::default(),
        };
        debug!(
            "[{}] Point cloud stream open, device {}",
            source.connection().ident(),
            header.serial_number()
        );

        Ok(Self {
            source: Source::Live { source, header, recorder: Arc::new(Mutex::new(None)) },
            recording,
            _scanner: PhantomData,
            _output: PhantomData,
        })
    }

    pub fn is_live(&self) -> bool {
        matches!(self.source, Source::Live { .. })
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.source, Source::Closed)
    }

    /// Device header reported when the subscription started.
    pub fn device_header(&self) -> Option<&DeviceHeader> {
        match &self.source {
            Source::Live { header, .. } => Some(header),
            Source::File(replay) => replay.reader().header().device.as_ref(),
            Source::Closed => None,
        }
    }

    /// Waits for the next frame and decodes it.
    ///
    /// Live frames are appended to an active recording before decoding. On a
    /// recording, fails with [`ScannerError::EndOfStream`] after the last frame.
    pub async fn receive_next_frame(&mut self) -> Result<T> {
        let frame = match &mut self.source {
            Source::Live { source, recorder, .. } => {
                let frame = source.next_frame().await?.ok_or(ScannerError::EndOfStream)?;
                record(recorder, &frame)?;
                frame
            }
            Source::File(replay) => replay.next_frame().await?.ok_or(ScannerError::EndOfStream)?,
            Source::Closed => return Err(self.invalid("receive_next_frame")),
        };
        T::adapt(&frame)
    }

    /// Whether every frame of the recording was consumed. Idempotent.
    pub fn is_end_of_stream(&mut self) -> Result<bool> {
        match &mut self.source {
            Source::File(replay) => replay.reader_mut().is_end_of_stream(),
            _ => Err(self.invalid("is_end_of_stream")),
        }
    }

    /// Restarts replay at the first frame.
    pub fn seek_to_first_frame(&mut self) -> Result<()> {
        match &mut self.source {
            Source::File(replay) => replay.reader_mut().seek_to_first_frame(),
            _ => Err(self.invalid("seek_to_first_frame")),
        }
    }

    /// Delivers every frame to `callback` from the dispatch task.
    ///
    /// Enables async dispatch on the stream's connection; `receive_next_frame`
    /// is no longer available afterwards. Frames stop when the returned handle
    /// (and every clone) is dropped.
    pub async fn subscribe<F>(&self, callback: F) -> Result<DispatchHandle>
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        let Source::Live { source, recorder, .. } = &self.source else {
            return Err(self.invalid("subscribe"));
        };
        let recorder = Arc::clone(recorder);
        subscription::deliver(source.connection(), EventKind::PointCloud, move |event| {
            if let Some(frame) = decode_event::<T>(&recorder, event)? {
                callback(frame);
            }
            Ok(())
        })
        .await
    }

    /// Like [`subscribe`](Self::subscribe), but yields frames as a `Stream`
    /// buffering up to `capacity` frames.
    pub async fn subscribe_stream(&self, capacity: usize) -> Result<Subscription<T>> {
        let Source::Live { source, recorder, .. } = &self.source else {
            return Err(self.invalid("subscribe_stream"));
        };
        let recorder = Arc::clone(recorder);
        subscription::deliver_to_stream(source.connection(), EventKind::PointCloud, capacity, move |event| {
            decode_event::<T>(&recorder, event)
        })
        .await
    }

    /// Starts recording every subsequently received frame to `writer`.
    ///
    /// The header is written immediately. An active recording is finished
    /// first.
    pub fn begin_recording<W>(&mut self, writer: W, compression_level: u32) -> Result<()>
    where
        W: Write + Send + 'static,
    {
        let Source::Live { header, recorder, .. } = &self.source else {
            return Err(self.invalid("begin_recording"));
        };
        let mut slot = lock(recorder);
        if let Some(active) = slot.take() {
            active.finish()?;
            info!("Recording stopped");
        }

        let config = RecordingConfig { compression_level, ..self.recording.clone() };
        let writer: Box<dyn Write + Send> = Box::new(writer);
        *slot = Some(Recorder::start(writer, Some(header.clone()), &config)?);
        info!("Recording started");
        Ok(())
    }

    /// Starts recording to a new file, with the configured compression level.
    pub fn begin_recording_to_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| ScannerError::file_error(path.to_path_buf(), e))?;
        let level = self.recording.compression_level;
        self.begin_recording(BufWriter::new(file), level)
    }

    pub fn is_recording(&self) -> bool {
        match &self.source {
            Source::Live { recorder, .. } => lock(recorder).is_some(),
            _ => false,
        }
    }

    /// Writes the footer and flushes the recording. Does nothing if no
    /// recording is active.
    pub fn stop_recording(&mut self) -> Result<()> {
        let Source::Live { recorder, .. } = &self.source else {
            return Ok(());
        };
        let Some(active) = lock(recorder).take() else {
            return Ok(());
        };
        active.finish()?;
        Ok(())
    }

    /// Header and footer: of the replayed file, or of the active recording.
    pub fn metadata(&self) -> Result<Metadata> {
        match &self.source {
            Source::File(replay) => Ok(replay.reader().metadata()),
            Source::Live { header, recorder, .. } => Ok(Metadata {
                header: Some(Header { device: Some(header.clone()), client: None }),
                footer: lock(recorder).as_ref().map(|active| active.footer().clone()),
            }),
            Source::Closed => Err(self.invalid("metadata")),
        }
    }

    /// Ends the subscription, finishes any recording and closes the stream.
    ///
    /// The stream is closed even if unsubscribing fails.
    pub async fn close(&mut self) -> Result<()> {
        let recording = self.stop_recording();
        let unsubscribe = match std::mem::replace(&mut self.source, Source::Closed) {
            Source::Live { source, .. } => {
                let result = if source.connection().is_closed() {
                    Ok(())
                } else {
                    source.unsubscribe().await
                };
                debug!("[{}] Point cloud stream closed", source.connection().ident());
                result
            }
            _ => Ok(()),
        };
        recording.and(unsubscribe)
    }

    fn invalid(&self, operation: &'static str) -> ScannerError {
        ScannerError::InvalidOperation { operation, mode: self.source.mode() }
    }
}

impl<T: FrameAdapter> Drop for PointCloudStream<'_, T> {
    fn drop(&mut self) {
        if let Err(e) = self.stop_recording() {
            warn!("Failed to finish recording: {}", e);
        }
    }
}

impl<T: FrameAdapter> std::fmt::Debug for PointCloudStream<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PointCloudStream")
            .field("mode", &self.source.mode())
            .field("recording", &self.is_recording())
            .finish()
    }
}

/// Records and decodes the frame of a point-cloud event.
fn decode_event<T: FrameAdapter>(
    recorder: &SharedRecorder,
    event: &event::Data,
) -> Result<Option<T>, CallbackError> {
    let event::Data::PointCloud(point_cloud) = event else {
        return Ok(None);
    };
    let Some(frame) = &point_cloud.frame else {
        return Ok(None);
    };
    record(recorder, frame)?;
    Ok(Some(T::adapt(frame)?))
}

fn record(recorder: &SharedRecorder, frame: &Frame) -> Result<()> {
    match lock(recorder).as_mut() {
        Some(active) => active.record(frame),
        None => Ok(()),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
