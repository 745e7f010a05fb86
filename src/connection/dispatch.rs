//! Asynchronous event dispatch for a connection.
//!
//! Once enabled, a spawned task owns the read half of the socket. Events are
//! handed to the subscribers registered for their [`EventKind`]; any other
//! response is staged in a single-slot [`ResponseSlot`] that the one
//! outstanding `call` drains.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::io::ReadHalf;
use tokio::sync::{Notify, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use super::{Inbound, classify};
use crate::diagnostics::{LogLevel, LogListeners};
use crate::protocol::{Response, event};
use crate::transport::{self, BoxedStream};
use crate::{Result, ScannerError};

/// Error returned by a subscriber callback.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

type Callback = Arc<dyn Fn(&event::Data) -> Result<(), CallbackError> + Send + Sync>;

/// Category of pushed data a subscriber listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    PointCloud,
    Status,
    Imu,
}

impl EventKind {
    pub fn of(event: &event::Data) -> Self {
        match event {
            event::Data::PointCloud(_) => EventKind::PointCloud,
            event::Data::Status(_) => EventKind::Status,
            event::Data::Imu(_) => EventKind::Imu,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            EventKind::PointCloud => "point cloud",
            EventKind::Status => "status",
            EventKind::Imu => "imu",
        })
    }
}

/// Handle returned by [`Connection::subscribe`](super::Connection::subscribe).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

#[derive(Default)]
struct SubscriberTable {
    next_id: u64,
    entries: Vec<(SubscriberId, EventKind, Callback)>,
}

#[derive(Default)]
pub(crate) struct Subscribers {
    table: Mutex<SubscriberTable>,
}

impl Subscribers {
    pub(crate) fn add(&self, kind: EventKind, callback: Callback) -> SubscriberId {
        let mut table = lock(&self.table);
        let id = SubscriberId(table.next_id);
        table.next_id += 1;
        table.entries.push((id, kind, callback));
        id
    }

    pub(crate) fn remove(&self, id: SubscriberId) -> bool {
        let mut table = lock(&self.table);
        let before = table.entries.len();
        table.entries.retain(|(entry, _, _)| *entry != id);
        table.entries.len() != before
    }

    /// Drops every callback, and with them whatever they captured.
    pub(crate) fn clear(&self) {
        lock(&self.table).entries.clear();
    }

    /// Calls every subscriber of the event's kind. A failing or panicking
    /// subscriber is reported and skipped.
    pub(crate) fn dispatch(&self, event: &event::Data, ident: &str, diagnostics: &LogListeners) {
        let kind = EventKind::of(event);
        let callbacks: Vec<Callback> = lock(&self.table)
            .entries
            .iter()
            .filter(|(_, entry_kind, _)| *entry_kind == kind)
            .map(|(_, _, callback)| Arc::clone(callback))
            .collect();

        if callbacks.is_empty() {
            trace!("[{}] No subscriber for {} event", ident, kind);
            return;
        }

        for callback in callbacks {
            match std::panic::catch_unwind(AssertUnwindSafe(|| callback(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => diagnostics.emit(
                    ident,
                    LogLevel::Warning,
                    format!("{} subscriber failed: {}", kind, e),
                ),
                Err(_) => diagnostics.emit(
                    ident,
                    LogLevel::Error,
                    format!("{} subscriber panicked", kind),
                ),
            }
        }
    }
}

#[derive(Default)]
struct SlotState {
    response: Option<Result<Response>>,
    closed: Option<String>,
}

/// Holds the reply to the single outstanding call while async dispatch runs.
#[derive(Default)]
pub(crate) struct ResponseSlot {
    state: Mutex<SlotState>,
    notify: Notify,
}

impl ResponseSlot {
    pub(crate) fn put(&self, response: Result<Response>) {
        lock(&self.state).response = Some(response);
        self.notify.notify_one();
    }

    pub(crate) fn clear(&self) {
        lock(&self.state).response = None;
    }

    /// Wakes the waiting caller with a transport fault; later waits fail at once.
    pub(crate) fn close(&self, reason: &str) {
        lock(&self.state).closed = Some(reason.to_string());
        self.notify.notify_one();
    }

    pub(crate) async fn wait(&self) -> Result<Response> {
        loop {
            let notified = self.notify.notified();
            {
                let mut state = lock(&self.state);
                if let Some(response) = state.response.take() {
                    return response;
                }
                if let Some(reason) = &state.closed {
                    return Err(ScannerError::connection_aborted(reason.clone()));
                }
            }
            notified.await;
        }
    }
}

/// State shared between a connection and its dispatch task.
pub(crate) struct Shared {
    pub(crate) ident: String,
    pub(crate) subscribers: Subscribers,
    pub(crate) slot: ResponseSlot,
    pub(crate) diagnostics: LogListeners,
    async_mode: AtomicBool,
    aborted: Mutex<Option<String>>,
    dispatch: Mutex<Weak<DispatchGuard>>,
}

impl Shared {
    pub(crate) fn new(ident: String, diagnostics: LogListeners) -> Self {
        Self {
            ident,
            subscribers: Subscribers::default(),
            slot: ResponseSlot::default(),
            diagnostics,
            async_mode: AtomicBool::new(false),
            aborted: Mutex::new(None),
            dispatch: Mutex::new(Weak::new()),
        }
    }

    pub(crate) fn is_async(&self) -> bool {
        self.async_mode.load(Ordering::Acquire)
    }

    pub(crate) fn is_aborted(&self) -> bool {
        lock(&self.aborted).is_some()
    }

    /// Fails if a transport fault already made the connection unusable.
    pub(crate) fn ensure_open(&self) -> Result<()> {
        match lock(&self.aborted).as_ref() {
            Some(reason) => {
                Err(ScannerError::connection_aborted(format!("connection is closed: {}", reason)))
            }
            None => Ok(()),
        }
    }

    /// Marks the connection unusable after a transport fault.
    pub(crate) fn abort(&self, reason: &str) {
        let mut aborted = lock(&self.aborted);
        if aborted.is_none() {
            self.diagnostics.emit(&self.ident, LogLevel::Warning, format!("Connection lost: {}", reason));
            *aborted = Some(reason.to_string());
        }
        drop(aborted);
        self.slot.close(reason);
    }

    pub(crate) fn running_dispatch(&self) -> Option<DispatchHandle> {
        lock(&self.dispatch).upgrade().map(|guard| DispatchHandle { guard })
    }

    pub(crate) fn stop_dispatch(&self) {
        if let Some(guard) = lock(&self.dispatch).upgrade() {
            guard.cancel.cancel();
        }
    }

    /// Starts the dispatch task on `reader`. The caller holds the request lock.
    pub(crate) fn start_dispatch(self: &Arc<Self>, reader: ReadHalf<BoxedStream>) -> DispatchHandle {
        let cancel = CancellationToken::new();
        let (done_tx, done_rx) = watch::channel(false);
        let guard = Arc::new(DispatchGuard { cancel: cancel.clone(), done: done_rx });

        self.async_mode.store(true, Ordering::Release);
        *lock(&self.dispatch) = Arc::downgrade(&guard);

        let shared = Arc::clone(self);
        tokio::spawn(async move {
            dispatch_task(reader, shared, cancel).await;
            let _ = done_tx.send(true);
        });

        DispatchHandle { guard }
    }

    fn dispatch_event(&self, response: &Response) {
        if let Some(event) = response.event() {
            self.subscribers.dispatch(event, &self.ident, &self.diagnostics);
        }
    }
}

/// Read loop: runs until cancelled or the transport fails.
async fn dispatch_task(
    mut reader: ReadHalf<BoxedStream>,
    shared: Arc<Shared>,
    cancel: CancellationToken,
) {
    info!("[{}] Async dispatch started", shared.ident);
    let mut event_count = 0u64;

    let reason = loop {
        let result = tokio::select! {
            _ = cancel.cancelled() => break "async dispatch stopped".to_string(),
            result = transport::read_framed(&mut reader, None) => result,
        };

        let payload = match result {
            Ok(payload) => payload,
            Err(e) => break e.to_string(),
        };

        match classify(&payload) {
            Ok(Inbound::Event(response)) => {
                event_count += 1;
                shared.dispatch_event(&response);
            }
            Ok(Inbound::Reply(response)) => {
                debug!("[{}] Staging {} response", shared.ident, response.kind_name());
                shared.slot.put(Ok(response));
            }
            Err(e) => shared.slot.put(Err(e)),
        }
    };

    shared.abort(&reason);
    // No further events can arrive; release channel senders held by callbacks.
    shared.subscribers.clear();
    info!("[{}] Async dispatch ended after {} events: {}", shared.ident, event_count, reason);
}

struct DispatchGuard {
    cancel: CancellationToken,
    done: watch::Receiver<bool>,
}

impl Drop for DispatchGuard {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Keeps the async dispatch loop of a connection alive.
///
/// Clones share the loop; it stops when the last handle is dropped. Stopping
/// the loop does not close the socket, but the connection can no longer
/// receive, so later calls fail with a transport fault.
#[derive(Clone)]
#[must_use = "dropping the handle stops event delivery"]
pub struct DispatchHandle {
    guard: Arc<DispatchGuard>,
}

impl DispatchHandle {
    pub fn is_running(&self) -> bool {
        !*self.guard.done.borrow()
    }

    /// Waits until the loop ends, e.g. because the device closed the connection.
    pub async fn wait(&self) {
        let mut done = self.guard.done.clone();
        let _ = done.wait_for(|finished| *finished).await;
    }

    /// Stops event delivery for every clone of this handle.
    pub fn stop(self) {
        self.guard.cancel.cancel();
    }
}

impl std::fmt::Debug for DispatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchHandle").field("running", &self.is_running()).finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
