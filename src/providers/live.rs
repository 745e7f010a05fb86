//! Live subscription on a dedicated device connection.

use tracing::{debug, trace};

use crate::connection::{Connection, EventKind};
use crate::protocol::request::{self, subscribe};
use crate::protocol::{Frame, Response, event, response};
use crate::provider::FrameSource;
use crate::{Result, ScannerError};

/// An active subscription on a connection that serves nothing else.
pub struct LiveSource {
    connection: Connection,
    kind: subscribe::Kind,
}

impl LiveSource {
    /// Sends the subscribe request and returns the source with the device's reply.
    ///
    /// The device answers a subscription with an event of the subscribed kind;
    /// point-cloud replies carry the device header.
    pub async fn subscribe(connection: Connection, kind: subscribe::Kind) -> Result<(Self, Response)> {
        let expected = event_kind(&kind);
        debug!("[{}] Subscribing to {} events", connection.ident(), expected);

        let reply = connection
            .call(request::Data::Subscribe(request::Subscribe { kind: Some(kind.clone()) }))
            .await?;
        match reply.event() {
            Some(data) if EventKind::of(data) == expected => {}
            _ => {
                return Err(ScannerError::UnexpectedResponse {
                    request: "subscribe",
                    received: reply.kind_name(),
                });
            }
        }

        Ok((Self { connection, kind }, reply))
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn kind(&self) -> EventKind {
        event_kind(&self.kind)
    }

    /// Waits for the next event of the subscribed kind; other events are skipped.
    pub async fn next_event(&mut self) -> Result<event::Data> {
        let expected = self.kind();
        loop {
            let response = self.connection.recv().await?;
            let kind_name = response.kind_name();
            match response.into_event() {
                Some(data) if EventKind::of(&data) == expected => return Ok(data),
                Some(data) => trace!("[{}] Skipping {} event", self.connection.ident(), EventKind::of(&data)),
                None => {
                    return Err(ScannerError::UnexpectedResponse {
                        request: "subscribe",
                        received: kind_name,
                    });
                }
            }
        }
    }

    /// Ends the subscription. The connection stays open.
    pub async fn unsubscribe(&self) -> Result<()> {
        let mut reply = self
            .connection
            .call(request::Data::Unsubscribe(request::Subscribe { kind: Some(self.kind.clone()) }))
            .await?;
        // Events already in flight arrive ahead of the acknowledgement.
        while reply.event().is_some() && !self.connection.is_async() {
            reply = self.connection.recv().await?;
        }
        match reply.data {
            Some(response::Data::Unsubscribe(_)) => {
                debug!("[{}] Unsubscribed from {} events", self.connection.ident(), self.kind());
                Ok(())
            }
            _ => Err(ScannerError::UnexpectedResponse {
                request: "unsubscribe",
                received: reply.kind_name(),
            }),
        }
    }
}

#[async_trait::async_trait]
impl FrameSource for LiveSource {
    async fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.kind() != EventKind::PointCloud {
            return Err(ScannerError::InvalidOperation { operation: "next_frame", mode: "non point-cloud" });
        }
        loop {
            if let event::Data::PointCloud(point_cloud) = self.next_event().await? {
                if let Some(frame) = point_cloud.frame {
                    return Ok(Some(frame));
                }
            }
        }
    }
}

fn event_kind(kind: &subscribe::Kind) -> EventKind {
    match kind {
        subscribe::Kind::PointCloud(_) => EventKind::PointCloud,
        subscribe::Kind::Status(_) => EventKind::Status,
        subscribe::Kind::Imu(_) => EventKind::Imu,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{DeviceHeader, Event};
    use crate::test_utils::{ScriptedDevice, structured_frame};

    fn point_cloud(header: Option<DeviceHeader>, frame: Option<Frame>) -> Response {
        response::Data::Event(Event {
            data: Some(event::Data::PointCloud(event::PointCloud { header, frame })),
        })
        .into()
    }

    fn point_cloud_kind() -> subscribe::Kind {
        subscribe::Kind::PointCloud(subscribe::PointCloud::default())
    }

    #[tokio::test]
    async fn frames_skip_header_only_events() {
        let (stream, mut device) = ScriptedDevice::pair();
        let connection = Connection::from_stream(stream, "live-test", None, Default::default());

        let device_task = tokio::spawn(async move {
            device.expect_request().await.unwrap();
            device.reply(point_cloud(Some(DeviceHeader::default()), None)).await.unwrap();
            device.push_event(point_cloud(None, None)).await.unwrap();
            device.push_event(point_cloud(None, Some(structured_frame(4, 1, 1, 1)))).await.unwrap();
            device
        });

        let (mut source, reply) = LiveSource::subscribe(connection, point_cloud_kind()).await.unwrap();
        assert!(reply.event().is_some());
        let frame = source.next_frame().await.unwrap().unwrap();
        assert_eq!(frame.id(), 4);
        device_task.await.unwrap();
    }

    #[tokio::test]
    async fn subscribe_rejects_a_plain_reply() {
        let (stream, mut device) = ScriptedDevice::pair();
        let connection = Connection::from_stream(stream, "live-test", None, Default::default());

        let device_task = tokio::spawn(async move {
            device.expect_request().await.unwrap();
            device.reply(response::Data::Unsubscribe(response::Ack {}).into()).await.unwrap();
            device
        });

        let err = LiveSource::subscribe(connection, point_cloud_kind()).await.err().unwrap();
        assert!(matches!(err, ScannerError::UnexpectedResponse { request: "subscribe", .. }));
        device_task.await.unwrap();
    }

    #[tokio::test]
    async fn unsubscribe_drains_frames_in_flight() {
        let (stream, mut device) = ScriptedDevice::pair();
        let connection = Connection::from_stream(stream, "live-test", None, Default::default());

        let device_task = tokio::spawn(async move {
            device.expect_request().await.unwrap();
            device.reply(point_cloud(None, None)).await.unwrap();

            let request = device.expect_request().await.unwrap();
            assert!(matches!(request.data, Some(request::Data::Unsubscribe(_))));
            for id in 0..2 {
                device.push_event(point_cloud(None, Some(structured_frame(id, 1, 1, 1)))).await.unwrap();
            }
            device.reply(response::Data::Unsubscribe(response::Ack {}).into()).await.unwrap();
            device
        });

        let (source, _) = LiveSource::subscribe(connection, point_cloud_kind()).await.unwrap();
        source.unsubscribe().await.unwrap();
        assert!(!source.connection().is_closed());
        device_task.await.unwrap();
    }
}
