//! Request/response correlation over one device connection.
//!
//! A [`Connection`] pairs each outgoing request with the next incoming
//! response. It runs in one of two regimes:
//!
//! - **Synchronous** (initial): `call` writes the request and reads the reply
//!   itself. Events read along the way are handed to subscribers and returned.
//! - **Async dispatch** (after [`Connection::enable_async_dispatch`]): a
//!   spawned task owns the read side, routes events to subscribers and stages
//!   every other response for the caller. This mode cannot be left again.
//!
//! Only one call is outstanding per connection; the request lock enforces it.

mod dispatch;
#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::time::Duration;

use prost::Message;
use tokio::io::{ReadHalf, WriteHalf};
use tokio::sync::Mutex;
use tracing::{debug, trace};

use crate::diagnostics::{LogLevel, LogListeners};
use crate::fault::{ProtocolFault, raw_error_branch};
use crate::protocol::{Request, Response, event, request, response};
use crate::transport::{self, BoxedStream, ConnectOptions, Endpoint};
use crate::{Result, ScannerError};

pub use dispatch::{CallbackError, DispatchHandle, EventKind, SubscriberId};
use dispatch::Shared;

/// One socket to a device.
pub struct Connection {
    writer: Mutex<WriteHalf<BoxedStream>>,
    /// Taken by the dispatch task once async dispatch is enabled.
    reader: Mutex<Option<ReadHalf<BoxedStream>>>,
    request_lock: Mutex<()>,
    shared: Arc<Shared>,
    read_timeout: Option<Duration>,
}

impl Connection {
    /// Connects to `endpoint`.
    ///
    /// On failure nothing is left behind; the error is always a transport fault.
    pub async fn open(
        endpoint: &Endpoint,
        options: &ConnectOptions,
        read_timeout: Option<Duration>,
        diagnostics: LogListeners,
    ) -> Result<Self> {
        let stream = transport::connect(endpoint, options).await?;
        let connection = Self::from_stream(stream, endpoint.to_string(), read_timeout, diagnostics);
        connection.shared.diagnostics.emit(
            &connection.shared.ident,
            LogLevel::Verbose,
            "Connection established",
        );
        Ok(connection)
    }

    /// Wraps an already connected byte stream.
    pub fn from_stream(
        stream: BoxedStream,
        ident: impl Into<String>,
        read_timeout: Option<Duration>,
        diagnostics: LogListeners,
    ) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            writer: Mutex::new(writer),
            reader: Mutex::new(Some(reader)),
            request_lock: Mutex::new(()),
            shared: Arc::new(Shared::new(ident.into(), diagnostics)),
            read_timeout,
        }
    }

    /// Name used in diagnostics, usually the device address.
    pub fn ident(&self) -> &str {
        &self.shared.ident
    }

    pub fn diagnostics(&self) -> &LogListeners {
        &self.shared.diagnostics
    }

    pub fn is_async(&self) -> bool {
        self.shared.is_async()
    }

    /// Whether a transport fault made the connection unusable.
    pub fn is_closed(&self) -> bool {
        self.shared.is_aborted()
    }

    /// Sends `request` and returns the matching response.
    ///
    /// A structured error from the device is returned as
    /// [`ScannerError::Protocol`] and leaves the connection usable. Transport
    /// faults close the connection for every later call.
    pub async fn call(&self, request: impl Into<Request>) -> Result<Response> {
        let request = request.into();
        let name = request.data.as_ref().map(request::Data::name).unwrap_or("empty");

        let _guard = self.request_lock.lock().await;
        self.shared.ensure_open()?;
        trace!("[{}] Calling {}", self.shared.ident, name);

        if self.shared.is_async() {
            self.shared.slot.clear();
            self.write_request(&request).await?;
            return transport::within_timeout(name, self.read_timeout, self.shared.slot.wait())
                .await;
        }

        self.write_request(&request).await?;
        self.receive_direct().await
    }

    /// Sends `request` without waiting for a response.
    pub async fn send(&self, request: impl Into<Request>) -> Result<()> {
        let request = request.into();
        let _guard = self.request_lock.lock().await;
        self.shared.ensure_open()?;
        self.write_request(&request).await
    }

    /// Reads the next response, typically a pushed event.
    ///
    /// Only available before async dispatch is enabled; afterwards the
    /// dispatch task owns the read side.
    pub async fn recv(&self) -> Result<Response> {
        if self.shared.is_async() {
            return Err(ScannerError::InvalidOperation {
                operation: "recv",
                mode: "asynchronously dispatched",
            });
        }
        self.shared.ensure_open()?;
        self.receive_direct().await
    }

    /// Registers `callback` for every pushed event of `kind`.
    ///
    /// Callbacks run on the task reading the socket and must not block. A
    /// callback that fails or panics is reported through the diagnostics
    /// listeners; delivery to other subscribers continues.
    pub fn subscribe<F>(&self, kind: EventKind, callback: F) -> SubscriberId
    where
        F: Fn(&event::Data) -> Result<(), CallbackError> + Send + Sync + 'static,
    {
        debug!("[{}] Adding {} subscriber", self.shared.ident, kind);
        self.shared.subscribers.add(kind, Arc::new(callback))
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.shared.subscribers.remove(id)
    }

    /// Switches to async dispatch and returns the handle keeping it alive.
    ///
    /// Calling this again while the loop runs returns another handle to the
    /// same loop.
    pub async fn enable_async_dispatch(&self) -> Result<DispatchHandle> {
        let _guard = self.request_lock.lock().await;
        if let Some(handle) = self.shared.running_dispatch() {
            return Ok(handle);
        }
        self.shared.ensure_open()?;

        let reader = self.reader.lock().await.take().ok_or_else(|| {
            ScannerError::connection_aborted("async dispatch of this connection already ended")
        })?;
        debug!("[{}] Enabling async dispatch", self.shared.ident);
        Ok(self.shared.start_dispatch(reader))
    }

    async fn write_request(&self, request: &Request) -> Result<()> {
        let payload = request.encode_to_vec();
        let mut writer = self.writer.lock().await;
        transport::write_framed(&mut *writer, &payload).await.inspect_err(|e| {
            self.shared.abort(&e.to_string());
        })
    }

    async fn receive_direct(&self) -> Result<Response> {
        let mut reader = self.reader.lock().await;
        let reader = reader.as_mut().ok_or_else(|| ScannerError::InvalidOperation {
            operation: "recv",
            mode: "asynchronously dispatched",
        })?;

        let payload = transport::read_framed(reader, self.read_timeout).await.inspect_err(|e| {
            self.shared.abort(&e.to_string());
        })?;

        match classify(&payload)? {
            Inbound::Event(response) => {
                if let Some(event) = response.event() {
                    self.shared.subscribers.dispatch(
                        event,
                        &self.shared.ident,
                        &self.shared.diagnostics,
                    );
                }
                Ok(response)
            }
            Inbound::Reply(response) => Ok(response),
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.shared.stop_dispatch();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("ident", &self.shared.ident)
            .field("async", &self.shared.is_async())
            .field("closed", &self.shared.is_aborted())
            .finish()
    }
}

pub(crate) enum Inbound {
    Event(Response),
    Reply(Response),
}

/// Applies the response rules in order: a structured error becomes a fault,
/// a response carrying event data is an event, anything else is a reply.
pub(crate) fn classify(payload: &[u8]) -> Result<Inbound> {
    let response = Response::decode(payload)?;

    if let Some(response::Data::Error(envelope)) = &response.data {
        let raw_branch = if envelope.kind.is_none() { raw_error_branch(payload) } else { None };
        return Err(ProtocolFault::from_envelope(envelope, raw_branch).into());
    }

    if response.event().is_some() {
        Ok(Inbound::Event(response))
    } else {
        Ok(Inbound::Reply(response))
    }
}
