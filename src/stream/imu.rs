use std::marker::PhantomData;

use tracing::debug;

use super::subscription::{self, Subscription};
use crate::adapters::unpack_imu;
use crate::connection::{Connection, DispatchHandle, EventKind};
use crate::protocol::request::subscribe;
use crate::protocol::{Imu, event};
use crate::providers::LiveSource;
use crate::scanner::Scanner;
use crate::{Result, ScannerError};

/// Inertial bursts pushed by a device.
///
/// Bursts requested in packed form are unpacked before they are handed out,
/// so callers always see the sample list.
pub struct ImuStream<'s> {
    source: Option<LiveSource>,
    _scanner: PhantomData<&'s Scanner>,
}

impl ImuStream<'_> {
    pub(crate) async fn live(connection: Connection, packed: bool) -> Result<Self> {
        let kind = subscribe::Kind::Imu(subscribe::Imu { packed_format: Some(packed) });
        let (source, _) = LiveSource::subscribe(connection, kind).await?;
        debug!("[{}] IMU stream open (packed: {})", source.connection().ident(), packed);
        Ok(Self { source: Some(source), _scanner: PhantomData })
    }

    pub fn is_closed(&self) -> bool {
        self.source.is_none()
    }

    /// Waits for the next burst.
    pub async fn receive_next_burst(&mut self) -> Result<Imu> {
        let source = self.source.as_mut().ok_or(closed("receive_next_burst"))?;
        match source.next_event().await? {
            event::Data::Imu(burst) => unpack_imu(&burst),
            other => Err(ScannerError::UnexpectedResponse {
                request: "subscribe",
                received: kind_name(&other),
            }),
        }
    }

    /// Delivers every burst to `callback` from the dispatch task.
    pub async fn subscribe<F>(&self, callback: F) -> Result<DispatchHandle>
    where
        F: Fn(Imu) + Send + Sync + 'static,
    {
        let source = self.source.as_ref().ok_or(closed("subscribe"))?;
        subscription::deliver(source.connection(), EventKind::Imu, move |event| {
            if let event::Data::Imu(burst) = event {
                callback(unpack_imu(burst)?);
            }
            Ok(())
        })
        .await
    }

    /// Bursts as a `Stream`, buffering up to `capacity` of them.
    pub async fn subscribe_stream(&self, capacity: usize) -> Result<Subscription<Imu>> {
        let source = self.source.as_ref().ok_or(closed("subscribe_stream"))?;
        subscription::deliver_to_stream(source.connection(), EventKind::Imu, capacity, |event| {
            match event {
                event::Data::Imu(burst) => Ok(Some(unpack_imu(burst)?)),
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

impl std::fmt::Debug for ImuStream<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImuStream").field("closed", &self.is_closed()).finish()
    }
}

fn closed(operation: &'static str) -> ScannerError {
    ScannerError::InvalidOperation { operation, mode: "closed" }
}

fn kind_name(event: &event::Data) -> &'static str {
    match event {
        event::Data::PointCloud(_) => "point cloud event",
        event::Data::Status(_) => "status event",
        event::Data::Imu(_) => "imu event",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::encode_packed_imu;
    use crate::protocol::data::imu::Sample;
    use crate::protocol::{Event, Request, Response, request, response};
    use crate::test_utils::ScriptedDevice;
    use futures::StreamExt;

    fn burst(samples: u64) -> Imu {
        Imu {
            start_time_ns: Some(1_000),
            samples: (0..samples)
                .map(|i| Sample {
                    start_offset_ns: Some(i * 10),
                    acceleration: vec![0.0, 0.0, 9.81],
                    angular_velocity: vec![i as f32, 0.0, 0.0],
                })
                .collect(),
            packed: None,
        }
    }

    fn imu_event(burst: Imu) -> Response {
        response::Data::Event(Event { data: Some(event::Data::Imu(burst)) }).into()
    }

    async fn open(packed: bool) -> (ImuStream<'static>, ScriptedDevice) {
        let (stream, mut device) = ScriptedDevice::pair();
        let connection = Connection::from_stream(stream, "imu-test", None, Default::default());

        let device_task = tokio::spawn(async move {
            let request: Request = device.expect_request().await.unwrap();
            let Some(request::Data::Subscribe(subscribe)) = request.data else {
                panic!("expected subscribe, got {request:?}");
            };
            assert_eq!(
                subscribe.kind,
                Some(subscribe::Kind::Imu(subscribe::Imu { packed_format: Some(packed) }))
            );
            device.reply(imu_event(Imu::default())).await.unwrap();
            device
        });

        let stream = ImuStream::live(connection, packed).await.unwrap();
        (stream, device_task.await.unwrap())
    }

    #[tokio::test]
    async fn packed_bursts_are_unpacked() {
        let (mut stream, mut device) = open(true).await;
        device.push_event(imu_event(encode_packed_imu(&burst(3)))).await.unwrap();

        let received = stream.receive_next_burst().await.unwrap();
        assert_eq!(received, burst(3));
    }

    #[tokio::test]
    async fn other_events_are_skipped() {
        let (mut stream, mut device) = open(false).await;
        device
            .push_event(response::Data::Event(Event { data: Some(event::Data::Status(Default::default())) }).into())
            .await
            .unwrap();
        device.push_event(imu_event(burst(1))).await.unwrap();

        assert_eq!(stream.receive_next_burst().await.unwrap(), burst(1));
    }

    #[tokio::test]
    async fn subscription_stream_yields_bursts() {
        let (stream, mut device) = open(false).await;
        let mut bursts = stream.subscribe_stream(4).await.unwrap();

        device.push_event(imu_event(burst(1))).await.unwrap();
        device.push_event(imu_event(encode_packed_imu(&burst(2)))).await.unwrap();

        assert_eq!(bursts.next().await.unwrap(), burst(1));
        assert_eq!(bursts.next().await.unwrap(), burst(2));

        device.close();
        assert!(bursts.next().await.is_none());
    }

    #[tokio::test]
    async fn closed_stream_rejects_operations() {
        let (mut stream, mut device) = open(false).await;
        let device_task = tokio::spawn(async move {
            let request = device.expect_request().await.unwrap();
            assert!(matches!(request.data, Some(request::Data::Unsubscribe(_))));
            device.reply(response::Data::Unsubscribe(response::Ack {}).into()).await.unwrap();
        });

        stream.close().await.unwrap();
        device_task.await.unwrap();

        assert!(stream.is_closed());
        let err = stream.receive_next_burst().await.unwrap_err();
        assert!(matches!(err, ScannerError::InvalidOperation { mode: "closed", .. }));
    }
}
