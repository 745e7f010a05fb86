//! Source trait for point-cloud frames.

use crate::Result;
use crate::protocol::Frame;

/// A sequence of wire frames: a live subscription or a recording.
///
/// Sources hand out frames as received or stored, before decoding; streams
/// decode them into their output type.
#[async_trait::async_trait]
pub trait FrameSource: Send {
    /// Get the next frame
    ///
    /// Returns:
    /// - `Ok(Some(frame))` - Next frame available
    /// - `Ok(None)` - Source ended (normal termination)
    /// - `Err(e)` - Transport or format fault
    ///
    /// Each source handles its own timing:
    /// - Live: Waits for the device to push the next event
    /// - Replay: Reads immediately, or paced by frame timestamps
    async fn next_frame(&mut self) -> Result<Option<Frame>>;
}
