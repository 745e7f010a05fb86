use std::marker::PhantomData;

use tracing::debug;

use super::subscription::{self, Subscription};
use crate::connection::{Connection, DispatchHandle, EventKind};
use crate::protocol::request::subscribe;
use crate::protocol::{Status, event};
use crate::providers::LiveSource;
use crate::scanner::Scanner;
use crate::{Result, ScannerError};

/// Status reports pushed by a device whenever its state changes.
pub struct StatusStream<'s> {
    source: Option<LiveSource>,
    initial: Option<Status>,
    _scanner: PhantomData<&'s Scanner>,
}

impl StatusStream<'_> {
    pub(crate) async fn live(connection: Connection) -> Result<Self> {
        let kind = subscribe::Kind::Status(subscribe::Status {});
        let (source, reply) = LiveSource::subscribe(connection, kind).await?;
        debug!("[{}] Status stream open", source.connection().ident());

        let initial = match reply.into_event() {
            Some(event::Data::Status(status)) => Some(status),
            _ => None,
        };
        Ok(Self { source: Some(source), initial, _scanner: PhantomData })
    }

    pub fn is_closed(&self) -> bool {
        self.source.is_none()
    }

    /// Status the device reported when the subscription started.
    pub fn initial_status(&self) -> Option<&Status> {
        self.initial.as_ref()
    }

    /// Waits for the next status report.
    pub async fn receive_next_status(&mut self) -> Result<Status> {
        let source = self.source.as_mut().ok_or(closed("receive_next_status"))?;
        match source.next_event().await? {
            event::Data::Status(status) => Ok(status),
            _ => Err(ScannerError::UnexpectedResponse { request: "subscribe", received: "event" }),
        }
    }

    /// Delivers every report to `callback` from the dispatch task.
    pub async fn subscribe<F>(&self, callback: F) -> Result<DispatchHandle>
    where
        F: Fn(Status) + Send + Sync + 'static,
    {
        let source = self.source.as_ref().ok_or(closed("subscribe"))?;
        subscription::deliver(source.connection(), EventKind::Status, move |event| {
            if let event::Data::Status(status) = event {
                callback(status.clone());
            }
            Ok(())
        })
        .await
    }

    pub async fn subscribe_stream(&self, capacity: usize) -> Result<Subscription<Status>> {
        let source = self.source.as_ref().ok_or(closed("subscribe_stream"))?;
        subscription::deliver_to_stream(source.connection(), EventKind::Status, capacity, |event| {
            match event {
                event::Data::Status(status) => Ok(Some(status.clone())),
                _ => Ok(None),
            }
        })
        .await
    }

    /// Ends the subscription. Later operations fail as invalid.
    pub async fn close(&mut self) -> Result<()> {
        match self.source.take() {
            Some(source) if !source.connection().is_closed() => source.unsubscribe().await,
            _ => Ok(()),
        }
    }
}

impl std::fmt::Debug for StatusStream<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusStream").field("closed", &self.is_closed()).finish()
    }
}

fn closed(operation: &'static str) -> ScannerError {
    ScannerError::InvalidOperation { operation, mode: "closed" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::status::status::Scanner as ScannerStatus;
    use crate::protocol::{Event, ScannerState, request, response};
    use crate::test_utils::ScriptedDevice;
    use std::sync::{Arc, Mutex};

    fn status(state: ScannerState) -> Status {
        Status {
            scanner: Some(ScannerStatus { state: Some(state as i32), error: None }),
            ..Default::default()
        }
    }

    fn status_event(state: ScannerState) -> response::Data {
        response::Data::Event(Event { data: Some(event::Data::Status(status(state))) })
    }

    async fn open() -> (StatusStream<'static>, ScriptedDevice) {
        let (stream, mut device) = ScriptedDevice::pair();
        let connection = Connection::from_stream(stream, "status-test", None, Default::default());

        let device_task = tokio::spawn(async move {
            let request = device.expect_request().await.unwrap();
            assert!(matches!(request.data, Some(request::Data::Subscribe(_))));
            device.reply(status_event(ScannerState::Ready).into()).await.unwrap();
            device
        });

        let stream = StatusStream::live(connection).await.unwrap();
        (stream, device_task.await.unwrap())
    }

    #[tokio::test]
    async fn subscribe_reply_is_the_initial_status() {
        let (mut stream, mut device) = open().await;
        assert_eq!(stream.initial_status(), Some(&status(ScannerState::Ready)));

        device.push_event(status_event(ScannerState::Running).into()).await.unwrap();
        assert_eq!(stream.receive_next_status().await.unwrap(), status(ScannerState::Running));
    }

    #[tokio::test]
    async fn callbacks_receive_pushed_reports() {
        let (stream, mut device) = open().await;
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handle = stream
            .subscribe(move |status| {
                sink.lock().unwrap().push(status.scanner.unwrap().state());
            })
            .await
            .unwrap();

        device.push_event(status_event(ScannerState::Starting).into()).await.unwrap();
        device.push_event(status_event(ScannerState::Running).into()).await.unwrap();
        device.close();
        handle.wait().await;

        assert_eq!(*seen.lock().unwrap(), vec![ScannerState::Starting, ScannerState::Running]);
    }

    #[tokio::test]
    async fn receive_after_peer_close_is_a_transport_fault() {
        let (mut stream, mut device) = open().await;
        device.close();

        let err = stream.receive_next_status().await.unwrap_err();
        assert!(matches!(err, ScannerError::ConnectionAbort { .. }));

        // Closing after the transport failed does not try to unsubscribe.
        stream.close().await.unwrap();
        assert!(stream.is_closed());
    }
}
