//! Client library for networked LiDAR scanners.
//!
//! Scanlink talks to a device over length-prefixed protobuf messages on TCP,
//! optionally wrapped in TLS, and exposes its point clouds, IMU bursts and
//! status reports as typed streams. Point clouds can be recorded to and
//! replayed from gzip `.bfpc` files with the same stream API.
//!
//! # Features
//!
//! - **Request/response**: one outstanding call per connection, with device
//!   errors surfaced as [`ProtocolFault`]s that keep the connection usable.
//! - **Streams**: pull frames one by one, or switch a stream to async
//!   dispatch and receive frames through callbacks or a [`futures::Stream`].
//! - **Frame forms**: structured scanlines, the packed columnar wire form, or
//!   flat [`SimpleFrame`]s, selected through [`FrameAdapter`].
//! - **Recordings**: write while streaming, replay at recorded speed, seek.
//! - **Mockup server**: serve a recording as if it were a device.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use scanlink::Scanner;
//!
//! #[tokio::main]
//! async fn main() -> scanlink::Result<()> {
//!     let scanner = Scanner::connect("192.168.26.26").await?;
//!     println!("connected to {}", scanner.serial_number());
//!
//!     let mut stream = scanner.point_cloud_stream().await?;
//!     for _ in 0..10 {
//!         let frame = stream.receive_next_frame().await?;
//!         println!("frame {}: {} points", frame.id(), frame.total_number_of_points());
//!     }
//!     stream.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Replaying a recording
//!
//! ```rust,no_run
//! use scanlink::{PointCloudStream, SimpleFrame};
//!
//! # async fn run() -> scanlink::Result<()> {
//! let mut stream = PointCloudStream::<SimpleFrame>::open_file("capture.bfpc")?;
//! while !stream.is_end_of_stream()? {
//!     let frame = stream.receive_next_frame().await?;
//!     println!("{} points at {} ns", frame.len(), frame.start_time_ns);
//! }
//! # Ok(())
//! # }
//! ```

// Core types and error handling
pub mod adapters;
pub mod config;
pub mod diagnostics;
mod error;
pub mod fault;
pub mod protocol;
#[cfg_attr(any(test, feature = "benchmark"), path = "test_utils.rs")]
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Device access
pub mod connection;
mod scanner;
pub mod transport;

// Data sources and streams
pub mod provider;
pub mod providers;
pub mod recording;
pub mod stream;

// Offline device
pub mod mockup;

// Core exports
pub use adapters::{FrameAdapter, decode_to_flat, decode_to_structured};
pub use error::*;
pub use fault::ProtocolFault;
pub use types::{SimpleFrame, SimplePoint};

// Main API exports
pub use config::{RecordingConfig, ScannerConfig};
pub use connection::{Connection, DispatchHandle, EventKind};
pub use diagnostics::{LogLevel, LogListeners, LogRecord};
pub use recording::{Recorder, RecordingReader};
pub use scanner::Scanner;
pub use stream::{ImuStream, PointCloudStream, StatusStream, Subscription};

#[cfg(feature = "tls")]
pub use transport::TlsIdentity;
