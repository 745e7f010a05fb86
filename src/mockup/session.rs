//! One client of the mockup server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use prost::Message;
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::Device;
use crate::adapters::{decode_to_structured, encode_packed};
use crate::fault::ProtocolFault;
use crate::protocol::request::subscribe;
use crate::protocol::status::status::Scanner as ScannerStatus;
use crate::protocol::{Event, Frame, PROTOCOL_VERSION, Request, Response, ScannerState, Status, event, request, response};
use crate::provider::FrameSource;
use crate::providers::ReplaySource;
use crate::{Result, transport};

/// Replies and events queued for the client.
const OUTBOX_CAPACITY: usize = 16;

/// The client went away; the session ends.
struct Disconnected;

struct Session {
    peer: SocketAddr,
    device: Arc<Device>,
    outbox: mpsc::Sender<Response>,
    cancel: CancellationToken,
    replay: Option<CancellationToken>,
}

pub(super) async fn serve(stream: TcpStream, peer: SocketAddr, device: Arc<Device>, cancel: CancellationToken) {
    let (mut reader, writer) = stream.into_split();
    let (outbox, queued) = mpsc::channel(OUTBOX_CAPACITY);
    let writer_task = tokio::spawn(write_loop(writer, queued, peer));

    let mut session = Session { peer, device, outbox, cancel, replay: None };
    loop {
        let payload = tokio::select! {
            _ = session.cancel.cancelled() => break,
            payload = transport::read_framed(&mut reader, None) => payload,
        };
        let payload = match payload {
            Ok(payload) => payload,
            Err(e) => {
                debug!("Mockup client {} left: {}", peer, e);
                break;
            }
        };

        let handled = match Request::decode(payload.as_slice()) {
            Ok(request) => session.handle(request).await,
            Err(e) => {
                let fault = ProtocolFault::InvalidRequest { validation_error: e.to_string() };
                session.send(fault_response(&fault)).await
            }
        };
        if handled.is_err() {
            break;
        }
    }

    session.stop_replay();
    drop(session);
    let _ = writer_task.await;
}

async fn write_loop(mut writer: OwnedWriteHalf, mut queued: mpsc::Receiver<Response>, peer: SocketAddr) {
    while let Some(response) = queued.recv().await {
        if let Err(e) = transport::write_framed(&mut writer, &response.encode_to_vec()).await {
            debug!("Mockup client {} stopped reading: {}", peer, e);
            break;
        }
    }
}

impl Session {
    async fn handle(&mut self, request: Request) -> Result<(), Disconnected> {
        let Some(data) = request.data else {
            return self.send(fault_response(&ProtocolFault::Empty)).await;
        };
        trace!("Mockup client {} sent {}", self.peer, data.name());

        match data {
            request::Data::Hello(_) => {
                let hello = response::Hello {
                    protocol_version: Some(PROTOCOL_VERSION),
                    library_version: Some(env!("CARGO_PKG_VERSION").to_string()),
                    serial_number: self.device.header.serial_number.clone(),
                };
                let mut reply = Response::from(response::Data::Hello(hello));
                reply.timestamp_ns = Some(now_ns());
                self.send(reply).await
            }
            request::Data::Status(_) => self.send(response::Data::Status(ready()).into()).await,
            request::Data::GetScanPattern(_) => {
                self.send(response::Data::GetScanPattern(self.device.scan_pattern.clone()).into()).await
            }
            request::Data::Subscribe(request::Subscribe { kind: Some(subscribe::Kind::Status(_)) }) => {
                self.send(event_response(event::Data::Status(ready()))).await
            }
            request::Data::Subscribe(request::Subscribe {
                kind: Some(subscribe::Kind::PointCloud(point_cloud)),
            }) => {
                let header = event::PointCloud { header: Some(self.device.header.clone()), frame: None };
                self.send(event_response(event::Data::PointCloud(header))).await?;
                self.start_replay(point_cloud.reference_frame);
                Ok(())
            }
            request::Data::Unsubscribe(_) => {
                self.stop_replay();
                self.send(response::Data::Unsubscribe(response::Ack {}).into()).await
            }
            other => {
                let fault = ProtocolFault::NotImplemented {
                    reason: format!("{} is not available on the mockup server", other.name()),
                };
                self.send(fault_response(&fault)).await
            }
        }
    }

    async fn send(&self, response: Response) -> Result<(), Disconnected> {
        self.outbox.send(response).await.map_err(|_| Disconnected)
    }

    fn start_replay(&mut self, reference_frame: Option<Frame>) {
        self.stop_replay();
        let cancel = self.cancel.child_token();
        self.replay = Some(cancel.clone());

        let device = Arc::clone(&self.device);
        let outbox = self.outbox.clone();
        let peer = self.peer;
        tokio::spawn(async move {
            match replay(&device, reference_frame, &outbox, &cancel).await {
                Ok(frames) => debug!("Replayed {} frames to {}", frames, peer),
                Err(e) => warn!("Replay to {} failed: {}", peer, e),
            }
        });
    }

    fn stop_replay(&mut self) {
        if let Some(replay) = self.replay.take() {
            replay.cancel();
        }
    }
}

/// Sends every frame of the recording as a point-cloud event.
///
/// Frames are packed with the columns of the reference frame's packed
/// selection when it has one, and structured otherwise.
async fn replay(
    device: &Device,
    reference_frame: Option<Frame>,
    outbox: &mpsc::Sender<Response>,
    cancel: &CancellationToken,
) -> Result<u64> {
    let mut source = ReplaySource::new(device.reader()?).looping(device.config.looping);
    if let Some(speed) = device.config.speed {
        source = source.paced(speed);
    }
    let selection = reference_frame.and_then(|frame| frame.packed);

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break,
            next = source.next_frame() => next?,
        };
        let Some(frame) = next else {
            break;
        };

        let frame = match (&selection, frame.packed.is_some()) {
            (Some(selection), _) => encode_packed(&decode_to_structured(&frame)?, selection),
            (None, true) => decode_to_structured(&frame)?,
            (None, false) => frame,
        };
        let event = event::PointCloud { header: None, frame: Some(frame) };
        if outbox.send(event_response(event::Data::PointCloud(event))).await.is_err() {
            break;
        }
    }
    Ok(source.frames_replayed())
}

fn ready() -> Status {
    Status {
        scanner: Some(ScannerStatus { state: Some(ScannerState::Ready as i32), error: None }),
        ..Default::default()
    }
}

fn event_response(data: event::Data) -> Response {
    response::Data::Event(Event { data: Some(data) }).into()
}

fn fault_response(fault: &ProtocolFault) -> Response {
    response::Data::Error(fault.to_envelope()).into()
}

fn now_ns() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|elapsed| elapsed.as_nanos() as u64).unwrap_or_default()
}
