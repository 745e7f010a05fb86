//! Device facade.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::adapters::FrameAdapter;
use crate::config::ScannerConfig;
use crate::connection::Connection;
use crate::diagnostics::{LogLevel, LogListeners};
use crate::protocol::config::scan_pattern::{Filter, FrameRate};
use crate::protocol::file::Language;
use crate::protocol::{
    Advanced, Frame, NamedScanPattern, PROTOCOL_VERSION, ScanPattern, Status, TimeSynchronization,
    request, response,
};
use crate::stream::{ImuStream, PointCloudStream, StatusStream};
use crate::transport::{ConnectOptions, Endpoint};
use crate::types::SimpleFrame;
use crate::{Result, ScannerError};

#[cfg(feature = "tls")]
use crate::transport::TlsIdentity;

/// A connected device.
///
/// Configuration RPCs run on the scanner's own connection. Every stream gets
/// a dedicated connection to the same endpoint and borrows the scanner, so
/// streams are closed before the scanner goes away.
///
/// ```rust,no_run
/// use scanlink::Scanner;
///
/// # async fn run() -> scanlink::Result<()> {
/// let scanner = Scanner::connect("192.168.26.26").await?;
/// println!("connected to {}", scanner.serial_number());
///
/// let mut stream = scanner.point_cloud_stream().await?;
/// let frame = stream.receive_next_frame().await?;
/// println!("frame {} with {} returns", frame.id(), frame.total_number_of_returns());
/// # Ok(())
/// # }
/// ```
pub struct Scanner {
    endpoint: Endpoint,
    options: ConnectOptions,
    config: ScannerConfig,
    diagnostics: LogListeners,
    connection: Connection,
    hello: response::Hello,
}

impl Scanner {
    /// Connects with the default configuration.
    ///
    /// `address` is `host`, `host:port`, `[v6]` or `[v6]:port`.
    pub async fn connect(address: &str) -> Result<Self> {
        Self::connect_with(address, ScannerConfig::default(), LogListeners::default()).await
    }

    /// Connects with an explicit configuration and diagnostics registry.
    pub async fn connect_with(address: &str, config: ScannerConfig, diagnostics: LogListeners) -> Result<Self> {
        config.validate()?;
        let endpoint = Endpoint::parse(address, config.default_port)?;
        let options = ConnectOptions { connect_timeout: Some(config.connect_timeout()), ..Default::default() };
        Self::establish(endpoint, options, config, diagnostics).await
    }

    /// Connects over TLS, using `identity` as client certificate and trust anchor.
    #[cfg(feature = "tls")]
    pub async fn connect_tls(
        address: &str,
        identity: TlsIdentity,
        config: ScannerConfig,
        diagnostics: LogListeners,
    ) -> Result<Self> {
        config.validate()?;
        let endpoint = Endpoint::parse(address, config.default_tls_port)?;
        let options = ConnectOptions { connect_timeout: Some(config.connect_timeout()), tls: Some(identity) };
        Self::establish(endpoint, options, config, diagnostics).await
    }

    async fn establish(
        endpoint: Endpoint,
        options: ConnectOptions,
        config: ScannerConfig,
        diagnostics: LogListeners,
    ) -> Result<Self> {
        diagnostics.set_threshold(config.log_level);
        let (connection, hello) = open_connection(&endpoint, &options, &config, &diagnostics).await?;
        diagnostics.emit(
            &endpoint.to_string(),
            LogLevel::Info,
            format!(
                "Connected to device {} (protocol version {})",
                hello.serial_number(),
                hello.protocol_version()
            ),
        );
        Ok(Self { endpoint, options, config, diagnostics, connection, hello })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    pub fn diagnostics(&self) -> &LogListeners {
        &self.diagnostics
    }

    /// Identity the device reported when connecting.
    pub fn hello(&self) -> &response::Hello {
        &self.hello
    }

    pub fn serial_number(&self) -> &str {
        self.hello.serial_number()
    }

    /// Current device clock, as time since the Unix epoch.
    pub async fn device_timestamp(&self) -> Result<Duration> {
        let reply = self.connection.call(hello_request()).await?;
        match (&reply.data, reply.timestamp_ns) {
            (Some(response::Data::Hello(_)), Some(timestamp_ns)) => Ok(Duration::from_nanos(timestamp_ns)),
            _ => Err(ScannerError::UnexpectedResponse { request: "hello", received: reply.kind_name() }),
        }
    }

    pub async fn get_status(&self) -> Result<Status> {
        match self.request(request::Data::Status(request::Query {})).await? {
            response::Data::Status(status) => Ok(status),
            other => Err(unexpected("status", &other)),
        }
    }

    pub async fn get_scan_pattern(&self) -> Result<ScanPattern> {
        match self.request(request::Data::GetScanPattern(request::Query {})).await? {
            response::Data::GetScanPattern(pattern) => Ok(pattern),
            other => Err(unexpected("get_scan_pattern", &other)),
        }
    }

    /// Lets the device complete a partial scan pattern with its defaults.
    ///
    /// The result can be passed to [`set_scan_pattern`](Self::set_scan_pattern).
    pub async fn fill_scan_pattern(&self, pattern: &ScanPattern) -> Result<ScanPattern> {
        let data = request::Data::FillScanPattern(request::FillScanPattern { config: Some(pattern.clone()) });
        match self.request(data).await? {
            response::Data::FillScanPattern(pattern) => Ok(pattern),
            other => Err(unexpected("fill_scan_pattern", &other)),
        }
    }

    /// Activates `pattern`; with `persist` it survives a power cycle.
    pub async fn set_scan_pattern(&self, pattern: &ScanPattern, persist: bool) -> Result<()> {
        let data = request::Data::SetScanPattern(request::SetScanPattern {
            config: Some(pattern.clone()),
            persist: Some(persist),
            name: None,
        });
        self.acknowledged(data).await
    }

    /// Activates a pattern stored on the device.
    pub async fn set_named_scan_pattern(&self, name: &str, persist: bool) -> Result<()> {
        let data = request::Data::SetScanPattern(request::SetScanPattern {
            config: None,
            persist: Some(persist),
            name: Some(name.to_string()),
        });
        self.acknowledged(data).await
    }

    pub async fn get_named_scan_patterns(&self) -> Result<Vec<NamedScanPattern>> {
        match self.request(request::Data::GetNamedScanPatterns(request::Query {})).await? {
            response::Data::GetNamedScanPatterns(named) => Ok(named.configs),
            other => Err(unexpected("get_named_scan_patterns", &other)),
        }
    }

    pub async fn store_named_scan_pattern(&self, name: &str, pattern: &ScanPattern) -> Result<()> {
        let data = request::Data::StoreNamedScanPattern(request::StoreNamedScanPattern {
            name: Some(name.to_string()),
            config: Some(pattern.clone()),
        });
        self.acknowledged(data).await
    }

    pub async fn delete_named_scan_pattern(&self, name: &str) -> Result<()> {
        let data = request::Data::DeleteNamedScanPattern(request::DeleteNamedScanPattern {
            name: Some(name.to_string()),
        });
        self.acknowledged(data).await
    }

    pub async fn get_advanced_config(&self) -> Result<Advanced> {
        match self.request(request::Data::GetAdvancedConfig(request::Query {})).await? {
            response::Data::GetAdvancedConfig(config) => Ok(config),
            other => Err(unexpected("get_advanced_config", &other)),
        }
    }

    pub async fn set_advanced_config(&self, config: &Advanced, persist: bool) -> Result<()> {
        let data = request::Data::SetAdvancedConfig(request::SetAdvancedConfig {
            config: Some(config.clone()),
            persist: Some(persist),
        });
        self.acknowledged(data).await
    }

    pub async fn set_time_synchronization(&self, config: &TimeSynchronization, persist: bool) -> Result<()> {
        let data = request::Data::SetTimeSynchronization(request::SetTimeSynchronization {
            config: Some(config.clone()),
            persist: Some(persist),
        });
        self.acknowledged(data).await
    }

    /// Runs the device self test and returns whether it passed.
    pub async fn run_self_test(&self) -> Result<bool> {
        match self.request(request::Data::RunSelfTest(request::Query {})).await? {
            response::Data::RunSelfTest(result) => Ok(result.success()),
            other => Err(unexpected("run_self_test", &other)),
        }
    }

    /// Asks an errored device to re-initialize.
    pub async fn attempt_error_recovery(&self) -> Result<()> {
        self.acknowledged(request::Data::AttemptErrorRecovery(request::Query {})).await
    }

    /// Point clouds in the device's default selection, structured.
    pub async fn point_cloud_stream(&self) -> Result<PointCloudStream<'_, Frame>> {
        self.point_cloud_stream_with(None, None).await
    }

    /// Point clouds decoded into `T`.
    ///
    /// Fields populated in `reference_frame` select what the device sends; see
    /// [`reference_frames`](crate::types::reference_frames). `filter` drops
    /// points and returns on the device.
    pub async fn point_cloud_stream_with<T: FrameAdapter>(
        &self,
        reference_frame: Option<Frame>,
        filter: Option<Filter>,
    ) -> Result<PointCloudStream<'_, T>> {
        let connection = self.open_stream_connection().await?;
        PointCloudStream::live(connection, reference_frame, filter, self.config.recording.clone()).await
    }

    /// Point clouds as flat point lists.
    pub async fn simple_point_cloud_stream(&self) -> Result<PointCloudStream<'_, SimpleFrame>> {
        self.point_cloud_stream_with(None, None).await
    }

    /// IMU bursts; `packed` asks the device for the compact encoding.
    pub async fn imu_stream(&self, packed: bool) -> Result<ImuStream<'_>> {
        let connection = self.open_stream_connection().await?;
        ImuStream::live(connection, packed).await
    }

    pub async fn status_stream(&self) -> Result<StatusStream<'_>> {
        let connection = self.open_stream_connection().await?;
        StatusStream::live(connection).await
    }

    /// Makes several devices produce frames at the same time.
    ///
    /// Every device gets `scan_pattern` (completed by the device), or keeps its
    /// current pattern when `None`. The frame rate is the lowest maximum frame
    /// rate among the devices, or `target_frame_rate` if it is lower. Fails
    /// with [`ScannerError::NotSynchronized`] when the device clocks differ by
    /// more than `max_time_difference` afterwards.
    pub async fn sync(
        devices: &[&Scanner],
        scan_pattern: Option<&ScanPattern>,
        target_frame_rate: Option<f64>,
        max_time_difference: Duration,
    ) -> Result<()> {
        let mut patterns = Vec::with_capacity(devices.len());
        for device in devices {
            let pattern = match scan_pattern {
                Some(pattern) => device.fill_scan_pattern(pattern).await?,
                None => device.get_scan_pattern().await?,
            };
            patterns.push(pattern);
        }

        let Some(maximum) = patterns.iter().map(ScanPattern::maximum_frame_rate).reduce(f64::min) else {
            return Ok(());
        };
        let frame_rate = match target_frame_rate {
            Some(target) if target < maximum => target,
            Some(target) => {
                warn!("Target frame rate {:.2} Hz exceeds the common maximum, using {:.2} Hz", target, maximum);
                maximum
            }
            None => maximum,
        };
        info!("Syncing {} devices to {:.2} Hz (maximum {:.2} Hz)", devices.len(), frame_rate, maximum);

        for (device, mut pattern) in devices.iter().zip(patterns) {
            let rate = pattern.frame_rate.get_or_insert_with(FrameRate::default);
            rate.target = Some(frame_rate);
            device.set_scan_pattern(&pattern, false).await?;
        }

        let mut timestamps = Vec::with_capacity(devices.len());
        for device in devices {
            timestamps.push(device.device_timestamp().await?);
        }
        let reference = timestamps[0];
        for (device, timestamp) in devices.iter().zip(&timestamps).skip(1) {
            let difference = timestamp.abs_diff(reference);
            if difference > max_time_difference {
                return Err(ScannerError::NotSynchronized {
                    details: format!(
                        "{} is {:?} apart from {} (allowed {:?})",
                        device.endpoint, difference, devices[0].endpoint, max_time_difference
                    ),
                });
            }
        }
        debug!("Device clocks agree within {:?}", max_time_difference);
        Ok(())
    }

    async fn open_stream_connection(&self) -> Result<Connection> {
        let (connection, _) = open_connection(&self.endpoint, &self.options, &self.config, &self.diagnostics).await?;
        Ok(connection)
    }

    async fn request(&self, data: request::Data) -> Result<response::Data> {
        let name = data.name();
        let reply = self.connection.call(data).await?;
        reply.data.ok_or(ScannerError::UnexpectedResponse { request: name, received: "empty" })
    }

    async fn acknowledged(&self, data: request::Data) -> Result<()> {
        let name = data.name();
        let reply = self.request(data).await?;
        // Every acknowledging reply uses the branch named after its request.
        if reply.name() == name {
            Ok(())
        } else {
            Err(unexpected(name, &reply))
        }
    }
}

impl std::fmt::Debug for Scanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scanner")
            .field("endpoint", &self.endpoint)
            .field("serial_number", &self.serial_number())
            .field("connection", &self.connection)
            .finish()
    }
}

/// Connects and exchanges `hello`.
async fn open_connection(
    endpoint: &Endpoint,
    options: &ConnectOptions,
    config: &ScannerConfig,
    diagnostics: &LogListeners,
) -> Result<(Connection, response::Hello)> {
    let connection = Connection::open(endpoint, options, config.read_timeout(), diagnostics.clone()).await?;
    let reply = connection.call(hello_request()).await?;
    match reply.data {
        Some(response::Data::Hello(hello)) => {
            debug!("[{}] Device {} says hello", endpoint, hello.serial_number());
            Ok((connection, hello))
        }
        _ => Err(ScannerError::UnexpectedResponse { request: "hello", received: reply.kind_name() }),
    }
}

fn hello_request() -> request::Data {
    request::Data::Hello(request::Hello {
        protocol_version: Some(PROTOCOL_VERSION),
        library_version: Some(env!("CARGO_PKG_VERSION").to_string()),
        language: Some(Language::Rust as i32),
    })
}

fn unexpected(request: &'static str, reply: &response::Data) -> ScannerError {
    ScannerError::UnexpectedResponse { request, received: reply.name() }
}
