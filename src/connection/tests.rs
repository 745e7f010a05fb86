use super::*;
use crate::diagnostics::LogRecord;
use crate::protocol::status::status::Scanner as ScannerStatus;
use crate::protocol::{Event, ScannerState, Status};
use crate::test_utils::ScriptedDevice;
use crate::ProtocolFault;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicUsize, Ordering};

fn status(state: ScannerState) -> Status {
    Status {
        scanner: Some(ScannerStatus { state: Some(state as i32), error: None }),
        ..Default::default()
    }
}

fn status_reply(state: ScannerState) -> Response {
    response::Data::Status(status(state)).into()
}

fn status_event(state: ScannerState) -> Response {
    response::Data::Event(Event { data: Some(event::Data::Status(status(state))) }).into()
}

fn status_request() -> request::Data {
    request::Data::Status(request::Query {})
}

fn open(read_timeout: Option<Duration>) -> (Connection, ScriptedDevice, LogListeners) {
    let (stream, device) = ScriptedDevice::pair();
    let diagnostics = LogListeners::new(LogLevel::Debug);
    let connection = Connection::from_stream(stream, "test-device", read_timeout, diagnostics.clone());
    (connection, device, diagnostics)
}

fn capture(diagnostics: &LogListeners) -> Arc<StdMutex<Vec<LogRecord>>> {
    let records = Arc::new(StdMutex::new(Vec::new()));
    let sink = Arc::clone(&records);
    diagnostics.add(move |record| sink.lock().unwrap().push(record.clone()));
    records
}

#[tokio::test]
async fn sync_call_returns_the_reply() {
    let _ = tracing_subscriber::fmt::try_init();
    let (connection, mut device, _) = open(None);

    let device_task = tokio::spawn(async move {
        let request = device.expect_request().await.unwrap();
        assert_eq!(request.data, Some(status_request()));
        device.reply(status_reply(ScannerState::Ready)).await.unwrap();
        device
    });

    let reply = connection.call(status_request()).await.unwrap();
    assert_eq!(reply.data, Some(response::Data::Status(status(ScannerState::Ready))));
    assert!(!connection.is_async());
    device_task.await.unwrap();
}

#[tokio::test]
async fn device_fault_leaves_connection_usable() {
    let (connection, mut device, _) = open(None);

    let device_task = tokio::spawn(async move {
        device.expect_request().await.unwrap();
        device
            .reply_fault(ProtocolFault::NotInRange {
                parameter: "frame_rate".to_string(),
                minimum: 1.0,
                maximum: 10.0,
                requested: 20.0,
                unit: "Hz".to_string(),
            })
            .await
            .unwrap();
        device.expect_request().await.unwrap();
        device.reply(status_reply(ScannerState::Running)).await.unwrap();
        device
    });

    let err = connection.call(status_request()).await.unwrap_err();
    match err.protocol_fault() {
        Some(ProtocolFault::NotInRange { parameter, requested, .. }) => {
            assert_eq!(parameter, "frame_rate");
            assert_eq!(*requested, 20.0);
        }
        other => panic!("expected NotInRange, got {:?}", other),
    }
    assert!(!connection.is_closed());

    let reply = connection.call(status_request()).await.unwrap();
    assert_eq!(reply.data, Some(response::Data::Status(status(ScannerState::Running))));
    device_task.await.unwrap();
}

#[tokio::test]
async fn peer_close_closes_the_connection() {
    let (connection, mut device, diagnostics) = open(None);
    let records = capture(&diagnostics);
    device.close();

    let err = connection.call(status_request()).await.unwrap_err();
    assert!(matches!(err, ScannerError::ConnectionAbort { .. }));
    assert!(connection.is_closed());

    let err = connection.call(status_request()).await.unwrap_err();
    assert!(matches!(err, ScannerError::ConnectionAbort { .. }));

    let lost = records.lock().unwrap().iter().filter(|record| record.message.starts_with("Connection lost")).count();
    assert_eq!(lost, 1);
}

#[tokio::test]
async fn sync_mode_hands_events_to_subscribers() {
    let (connection, mut device, _) = open(None);
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    let id = connection.subscribe(EventKind::Status, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    connection.subscribe(EventKind::PointCloud, |_| panic!("wrong kind"));

    device.push_event(status_event(ScannerState::Starting)).await.unwrap();
    let response = connection.recv().await.unwrap();
    assert!(matches!(response.event(), Some(event::Data::Status(_))));
    assert_eq!(seen.load(Ordering::SeqCst), 1);

    assert!(connection.unsubscribe(id));
    assert!(!connection.unsubscribe(id));
    device.push_event(status_event(ScannerState::Running)).await.unwrap();
    connection.recv().await.unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn async_dispatch_routes_events_around_a_call() {
    let (connection, mut device, diagnostics) = open(None);
    let records = capture(&diagnostics);

    let seen = Arc::new(StdMutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    connection.subscribe(EventKind::Status, |_| Err("subscriber refused the event".into()));
    connection.subscribe(EventKind::Status, |_| panic!("subscriber blew up"));
    connection.subscribe(EventKind::Status, move |event| {
        if let event::Data::Status(status) = event {
            sink.lock().unwrap().push(status.scanner.clone().unwrap_or_default().state());
        }
        Ok(())
    });

    let handle = connection.enable_async_dispatch().await.unwrap();
    assert!(connection.is_async());
    assert!(handle.is_running());

    let device_task = tokio::spawn(async move {
        device.expect_request().await.unwrap();
        device.push_event(status_event(ScannerState::Starting)).await.unwrap();
        device.push_event(status_event(ScannerState::Running)).await.unwrap();
        device.reply(status_reply(ScannerState::Running)).await.unwrap();
        device
    });

    let reply = connection.call(status_request()).await.unwrap();
    assert!(reply.event().is_none());
    assert_eq!(*seen.lock().unwrap(), vec![ScannerState::Starting, ScannerState::Running]);

    let records = records.lock().unwrap();
    let warnings = records.iter().filter(|record| record.level == LogLevel::Warning).count();
    let errors = records.iter().filter(|record| record.level == LogLevel::Error).count();
    assert_eq!(warnings, 2);
    assert_eq!(errors, 2);
    drop(records);

    let mut device = device_task.await.unwrap();
    device.close();
    handle.wait().await;
    assert!(!handle.is_running());
    assert!(connection.is_closed());
}

#[tokio::test]
async fn second_enable_returns_the_running_loop() {
    let (connection, _device, _) = open(None);
    let first = connection.enable_async_dispatch().await.unwrap();
    let second = connection.enable_async_dispatch().await.unwrap();

    first.stop();
    second.wait().await;
    assert!(!second.is_running());
}

#[tokio::test]
async fn dropping_the_handle_stops_dispatch() {
    let (connection, _device, _) = open(None);
    let handle = connection.enable_async_dispatch().await.unwrap();
    drop(handle);

    let err = connection.call(status_request()).await.unwrap_err();
    assert!(matches!(err, ScannerError::ConnectionAbort { .. }));
    assert!(matches!(connection.enable_async_dispatch().await, Err(ScannerError::ConnectionAbort { .. })));
}

#[tokio::test]
async fn recv_is_unavailable_in_async_mode() {
    let (connection, _device, _) = open(None);
    let _handle = connection.enable_async_dispatch().await.unwrap();

    let err = connection.recv().await.unwrap_err();
    assert!(matches!(err, ScannerError::InvalidOperation { operation: "recv", .. }));
}

#[tokio::test]
async fn silent_device_times_out() {
    let (connection, mut device, _) = open(Some(Duration::from_millis(50)));

    let device_task = tokio::spawn(async move {
        device.expect_request().await.unwrap();
        device
    });

    let err = connection.call(status_request()).await.unwrap_err();
    match &err {
        ScannerError::ConnectionAbort { reason, .. } => assert!(reason.contains("timed out"), "{}", reason),
        other => panic!("expected a transport fault, got {:?}", other),
    }
    assert!(connection.is_closed());
    device_task.await.unwrap();
}
