//! Mockup server that replays a recording as if it were a device.
//!
//! Every client gets its own session. The server answers `hello`, `status`
//! and `get_scan_pattern`, accepts status and point-cloud subscriptions, and
//! replays the recording's frames to point-cloud subscribers. Anything else is
//! answered with a `NotImplemented` fault.
//!
//! ```rust,no_run
//! use scanlink::Scanner;
//! use scanlink::mockup::{MockupConfig, MockupServer};
//!
//! # async fn run() -> scanlink::Result<()> {
//! let server = MockupServer::open("capture.bfpc", MockupConfig::default())?;
//! let handle = server.start().await?;
//!
//! let scanner = Scanner::connect(&handle.address().to_string()).await?;
//! let mut stream = scanner.point_cloud_stream().await?;
//! let frame = stream.receive_next_frame().await?;
//! # drop(frame);
//! # Ok(())
//! # }
//! ```

mod session;

use std::io::Cursor;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::protocol::{DeviceHeader, ScanPattern};
use crate::recording::RecordingReader;
use crate::{Result, ScannerError};

/// Settings of a [`MockupServer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MockupConfig {
    /// Address to listen on; port 0 picks a free port.
    pub bind_address: String,
    /// Reported when the recording does not name a device.
    pub serial_number: String,
    /// Paces replay by frame timestamps at this speed; `None` replays as fast
    /// as the client reads.
    pub speed: Option<f64>,
    /// Restarts at the first frame when the recording ends.
    pub looping: bool,
}

impl Default for MockupConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:0".to_string(),
            serial_number: "MOCKUP".to_string(),
            speed: None,
            looping: false,
        }
    }
}

/// What every session serves.
pub(crate) struct Device {
    pub(crate) recording: Arc<[u8]>,
    pub(crate) header: DeviceHeader,
    pub(crate) scan_pattern: ScanPattern,
    pub(crate) config: MockupConfig,
}

impl Device {
    pub(crate) fn reader(&self) -> Result<RecordingReader<Cursor<Arc<[u8]>>>> {
        RecordingReader::new(Cursor::new(Arc::clone(&self.recording)))
    }
}

/// A recording ready to be served.
pub struct MockupServer {
    device: Arc<Device>,
}

impl MockupServer {
    /// Serves the recording in `bytes`.
    ///
    /// The recording is parsed once up front, so a damaged file fails here
    /// rather than in a client session.
    pub fn new(bytes: impl Into<Vec<u8>>, config: MockupConfig) -> Result<Self> {
        let recording: Arc<[u8]> = Arc::from(bytes.into());
        let mut reader = RecordingReader::new(Cursor::new(Arc::clone(&recording)))?;

        let mut header = reader.header().device.clone().unwrap_or_default();
        if header.serial_number.is_none() {
            header.serial_number = Some(config.serial_number.clone());
        }

        let from_footer = reader
            .footer()
            .and_then(|footer| footer.events.first())
            .and_then(|event| event.scan_pattern.clone());
        let scan_pattern = match from_footer {
            Some(pattern) => pattern,
            None if !reader.is_end_of_stream()? => reader.next_frame()?.scan_pattern.unwrap_or_default(),
            None => ScanPattern::default(),
        };

        debug!(
            "Mockup serves device {} with {:?} frames",
            header.serial_number(),
            reader.frame_count()
        );
        Ok(Self { device: Arc::new(Device { recording, header, scan_pattern, config }) })
    }

    /// Serves a recording on disk.
    pub fn open(path: impl AsRef<Path>, config: MockupConfig) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| ScannerError::file_error(path.to_path_buf(), e))?;
        Self::new(bytes, config)
    }

    pub fn scan_pattern(&self) -> &ScanPattern {
        &self.device.scan_pattern
    }

    /// Binds the listener and accepts clients in the background.
    pub async fn start(self) -> Result<MockupHandle> {
        let bind_address = &self.device.config.bind_address;
        let listener = TcpListener::bind(bind_address)
            .await
            .map_err(|e| ScannerError::io(format!("binding mockup server to {}", bind_address), e))?;
        let address = listener
            .local_addr()
            .map_err(|e| ScannerError::io("reading the mockup server address", e))?;
        info!("Mockup server listening on {}", address);

        let cancel = CancellationToken::new();
        let task = tokio::spawn(accept_loop(listener, self.device, cancel.clone()));
        Ok(MockupHandle { address, cancel, task: Some(task) })
    }
}

async fn accept_loop(listener: TcpListener, device: Arc<Device>, cancel: CancellationToken) {
    loop {
        let accepted = tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer)) => {
                debug!("Mockup client {} connected", peer);
                if let Err(e) = stream.set_nodelay(true) {
                    warn!("Failed to configure socket of {}: {}", peer, e);
                }
                tokio::spawn(session::serve(stream, peer, Arc::clone(&device), cancel.child_token()));
            }
            Err(e) => warn!("Mockup server failed to accept a client: {}", e),
        }
    }
    info!("Mockup server stopped");
}

/// A running mockup server. Dropping the handle stops it and every session.
pub struct MockupHandle {
    address: SocketAddr,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl MockupHandle {
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Stops accepting clients, ends every session and waits for the listener.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for MockupHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for MockupHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockupHandle").field("address", &self.address).finish()
    }
}
