//! Data streams opened from a [`Scanner`](crate::Scanner) or a recording.
//!
//! Each live stream owns a dedicated connection and borrows the scanner that
//! opened it, so it cannot outlive the scanner. A stream can be consumed in
//! two ways:
//!
//! - **Pull**: `receive_next_*` reads the next item from the socket.
//! - **Push**: `subscribe` / `subscribe_stream` switch the stream's connection
//!   to async dispatch; items are then delivered from the dispatch task. Pull
//!   reads are no longer possible afterwards.
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use scanlink::Scanner;
//!
//! # async fn run() -> scanlink::Result<()> {
//! let scanner = Scanner::connect("192.168.26.26").await?;
//! let stream = scanner.simple_point_cloud_stream().await?;
//! let mut frames = stream.subscribe_stream(8).await?;
//! while let Some(frame) = frames.next().await {
//!     println!("frame {} with {} points", frame.id, frame.len());
//! }
//! # Ok(())
//! # }
//! ```

mod imu;
mod point_cloud;
mod status;
mod subscription;

pub use imu::ImuStream;
pub use point_cloud::{PointCloudStream, RecordingSource};
pub use status::StatusStream;
pub use subscription::Subscription;
