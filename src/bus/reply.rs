//! Request/reply streams

use super::EventBus;
use crate::delegate::Handler;
use crate::error::{EventBusError, Result};
use crate::message::{CloseEvent, Failure, Headers, Message};
use futures::future::BoxFuture;
use futures::stream::{FusedStream, Stream, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tracing::{debug, warn};

type ReplyResult = std::result::Result<Message, Failure>;

/// A request that has not been sent yet
///
/// Each call to [`subscribe`](RxSend::subscribe) sends the request once and
/// returns a stream for that request's reply.
#[derive(Clone)]
pub struct RxSend {
    bus: EventBus,
    address: String,
    body: Value,
    headers: Option<Headers>,
}

impl RxSend {
    pub(crate) fn new(bus: EventBus, address: &str, body: Value, headers: Option<Headers>) -> Self {
        Self {
            bus,
            address: address.to_string(),
            body,
            headers,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Send the request and return the stream of its reply
    pub fn subscribe(&self) -> ReplyStream {
        let tracker = self.bus.tracker();
        let closed = tracker.closed();

        if tracker.is_closed() {
            debug!(address = %self.address, "Connection closed, request not sent");
            return ReplyStream::new(self.bus.clone(), closed, None, None);
        }

        let (tx, rx) = oneshot::channel::<ReplyResult>();
        // One-shot slot: the first callback invocation wins
        let slot = Mutex::new(Some(tx));
        let address = self.address.clone();
        let handler: Handler = Arc::new(move |result: ReplyResult| match slot.lock().take() {
            Some(tx) => {
                let _ = tx.send(result);
            }
            None => warn!(address = %address, "Ignoring duplicate reply"),
        });

        debug!(address = %self.address, "Sending request");
        match self.bus.delegate().send(
            &self.address,
            self.body.clone(),
            self.headers.clone(),
            Some(handler),
        ) {
            Ok(()) => ReplyStream::new(self.bus.clone(), closed, Some(rx), None),
            Err(e) => ReplyStream::new(self.bus.clone(), closed, None, Some(e.into())),
        }
    }

    /// Send the request and wait for its outcome
    ///
    /// Resolves to `Ok(None)` when the connection closes cleanly first.
    pub async fn first(&self) -> Result<Option<Message>> {
        self.subscribe().next().await.transpose()
    }
}

impl fmt::Debug for RxSend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RxSend")
            .field("address", &self.address)
            .field("body", &self.body)
            .field("headers", &self.headers)
            .finish()
    }
}

/// Stream of the single reply to a request
///
/// Yields the reply and ends, or ends with one error: the failure reply, the
/// error raised by the delegate when sending, or the close event of an
/// unclean close. A close that happens before the reply arrives wins over it.
pub struct ReplyStream {
    bus: EventBus,
    closed: BoxFuture<'static, Option<CloseEvent>>,
    reply: Option<oneshot::Receiver<ReplyResult>>,
    error: Option<EventBusError>,
    done: bool,
}

impl ReplyStream {
    fn new(
        bus: EventBus,
        closed: BoxFuture<'static, Option<CloseEvent>>,
        reply: Option<oneshot::Receiver<ReplyResult>>,
        error: Option<EventBusError>,
    ) -> Self {
        Self {
            bus,
            closed,
            reply,
            error,
            done: false,
        }
    }

    fn finish(&mut self) {
        self.done = true;
        self.reply = None;
    }
}

impl Stream for ReplyStream {
    type Item = Result<Message>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        if this.done {
            return Poll::Ready(None);
        }

        if let Some(err) = this.error.take() {
            this.finish();
            return Poll::Ready(Some(Err(err)));
        }

        if let Poll::Ready(unclean) = this.closed.as_mut().poll(cx) {
            this.finish();
            return Poll::Ready(unclean.map(|event| Err(EventBusError::Closed(event))));
        }

        let Some(reply) = this.reply.as_mut() else {
            return Poll::Pending;
        };

        match Pin::new(reply).poll(cx) {
            Poll::Ready(Ok(Ok(message))) => {
                this.finish();
                Poll::Ready(Some(Ok(this.bus.enrich(message))))
            }
            Poll::Ready(Ok(Err(failure))) => {
                this.finish();
                Poll::Ready(Some(Err(EventBusError::Failure(failure))))
            }
            Poll::Ready(Err(_)) => {
                // The delegate dropped the callback, only a close can end this stream now
                warn!("Reply handler dropped without a reply");
                this.reply = None;
                Poll::Pending
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl FusedStream for ReplyStream {
    fn is_terminated(&self) -> bool {
        self.done
    }
}

/// Reply capability attached to a received message
///
/// Always targets the reply address of the message it came with.
#[derive(Clone)]
pub struct Replier {
    bus: EventBus,
    address: String,
}

impl Replier {
    pub(crate) fn new(bus: EventBus, address: String) -> Self {
        Self { bus, address }
    }

    /// The reply address this capability targets
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Reply without expecting an answer
    pub fn reply(&self, body: Value, headers: Option<Headers>) -> Result<()> {
        self.bus.send(&self.address, body, headers)
    }

    /// Reply and expect an answer, continuing the conversation
    pub fn rx_reply(&self, body: Value, headers: Option<Headers>) -> RxSend {
        self.bus.rx_send(&self.address, body, headers)
    }
}

impl fmt::Debug for Replier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Replier")
            .field("address", &self.address)
            .finish()
    }
}
