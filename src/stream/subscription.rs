//! Channel-backed `Stream` of items delivered by the async dispatch loop.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use pin_project_lite::pin_project;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_stream::wrappers::ReceiverStream;

use crate::Result;
use crate::connection::{CallbackError, Connection, DispatchHandle, EventKind};
use crate::protocol::event;

pin_project! {
    /// Items pushed by the device, decoded on the dispatch task.
    ///
    /// The stream ends when the connection's dispatch loop ends. Dropping it
    /// releases its dispatch handle. Items arriving while the buffer is full
    /// are dropped and reported through the scanner's diagnostics.
    pub struct Subscription<T> {
        #[pin]
        items: ReceiverStream<T>,
        handle: DispatchHandle,
    }
}

impl<T> Subscription<T> {
    pub fn handle(&self) -> &DispatchHandle {
        &self.handle
    }
}

impl<T> Stream for Subscription<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.project().items.poll_next(cx)
    }
}

impl<T> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("handle", &self.handle).finish()
    }
}

/// Registers `handler` for `kind` and switches the connection to async dispatch.
pub(crate) async fn deliver<F>(connection: &Connection, kind: EventKind, handler: F) -> Result<DispatchHandle>
where
    F: Fn(&event::Data) -> Result<(), CallbackError> + Send + Sync + 'static,
{
    let id = connection.subscribe(kind, handler);
    connection.enable_async_dispatch().await.inspect_err(|_| {
        connection.unsubscribe(id);
    })
}

/// Like [`deliver`], but hands decoded items to a bounded channel.
pub(crate) async fn deliver_to_stream<T, F>(
    connection: &Connection,
    kind: EventKind,
    capacity: usize,
    decode: F,
) -> Result<Subscription<T>>
where
    T: Send + 'static,
    F: Fn(&event::Data) -> Result<Option<T>, CallbackError> + Send + Sync + 'static,
{
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let handle = deliver(connection, kind, move |event| {
        let Some(item) = decode(event)? else {
            return Ok(());
        };
        match tx.try_send(item) {
            Ok(()) | Err(TrySendError::Closed(_)) => Ok(()),
            Err(TrySendError::Full(_)) => Err(format!("{} subscriber is lagging; item dropped", kind).into()),
        }
    })
    .await?;

    Ok(Subscription { items: ReceiverStream::new(rx), handle })
}
