//! Replay source for `.bfpc` recordings.

use std::io::{Read, Seek};
use std::time::Duration;

use tracing::{debug, trace};

use crate::protocol::Frame;
use crate::provider::FrameSource;
use crate::recording::RecordingReader;
use crate::Result;

/// Longest pause inserted between two paced frames.
const MAX_FRAME_GAP: Duration = Duration::from_secs(1);

/// Replays the frames of a recording.
///
/// Unpaced replay hands out frames as fast as they are read. Paced replay
/// sleeps for the difference between consecutive frame timestamps, divided by
/// the playback speed.
pub struct ReplaySource<R: Read + Seek> {
    reader: RecordingReader<R>,
    speed: Option<f64>,
    looping: bool,
    last_start_ns: Option<u64>,
    frames: u64,
}

impl<R: Read + Seek> ReplaySource<R> {
    pub fn new(reader: RecordingReader<R>) -> Self {
        Self { reader, speed: None, looping: false, last_start_ns: None, frames: 0 }
    }

    /// Paces replay by frame timestamps; `speed` 1.0 is real time.
    pub fn paced(mut self, speed: f64) -> Self {
        self.speed = Some(speed.clamp(0.1, 10.0));
        self
    }

    /// Restarts from the first frame when the recording ends.
    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn reader(&self) -> &RecordingReader<R> {
        &self.reader
    }

    pub fn reader_mut(&mut self) -> &mut RecordingReader<R> {
        &mut self.reader
    }

    /// Frames handed out so far, across loops.
    pub fn frames_replayed(&self) -> u64 {
        self.frames
    }

    fn delay_before(&mut self, frame: &Frame) -> Option<Duration> {
        let speed = self.speed?;
        let start = frame.start_time_ns?;
        let previous = self.last_start_ns.replace(start)?;
        let gap = Duration::from_nanos(start.checked_sub(previous)?);
        Some(gap.div_f64(speed).min(MAX_FRAME_GAP))
    }
}

#[async_trait::async_trait]
impl<R: Read + Seek + Send> FrameSource for ReplaySource<R> {
    async fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.reader.is_end_of_stream()? {
            if !self.looping {
                debug!("Reached end of recording after {} frames", self.frames);
                return Ok(None);
            }
            self.reader.seek_to_first_frame()?;
            self.last_start_ns = None;
            if self.reader.is_end_of_stream()? {
                return Ok(None);
            }
            debug!("Looping recording");
        }

        let frame = self.reader.next_frame()?;
        if let Some(delay) = self.delay_before(&frame) {
            tokio::time::sleep(delay).await;
        }
        self.frames += 1;
        trace!("Replaying frame {:?}", frame.id);
        Ok(Some(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{recording_bytes, structured_frame};
    use std::io::Cursor;

    fn source(frames: u64) -> ReplaySource<Cursor<Vec<u8>>> {
        let frames: Vec<_> = (0..frames).map(|id| structured_frame(id, 1, 2, 1)).collect();
        ReplaySource::new(RecordingReader::new(Cursor::new(recording_bytes(&frames))).unwrap())
    }

    #[tokio::test]
    async fn replay_ends_after_last_frame() {
        let mut source = source(3);
        for id in 0..3 {
            assert_eq!(source.next_frame().await.unwrap().unwrap().id, Some(id));
        }
        assert!(source.next_frame().await.unwrap().is_none());
        assert!(source.next_frame().await.unwrap().is_none());
        assert_eq!(source.frames_replayed(), 3);
    }

    #[tokio::test]
    async fn looping_restarts_at_first_frame() {
        let mut source = source(2).looping(true);
        let ids: Vec<_> = {
            let mut ids = Vec::new();
            for _ in 0..5 {
                ids.push(source.next_frame().await.unwrap().unwrap().id());
            }
            ids
        };
        assert_eq!(ids, vec![0, 1, 0, 1, 0]);
    }

    #[tokio::test]
    async fn empty_recording_does_not_loop_forever() {
        let mut source = source(0).looping(true);
        assert!(source.next_frame().await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn paced_replay_follows_frame_timestamps() {
        let mut source = source(3).paced(2.0);
        let started = tokio::time::Instant::now();
        while source.next_frame().await.unwrap().is_some() {}

        // Frames are 100 ms apart; at double speed two gaps take 100 ms.
        assert_eq!(started.elapsed(), Duration::from_millis(100));
    }
}
