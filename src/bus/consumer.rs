//! Consumer streams

use super::EventBus;
use crate::delegate::Handler;
use crate::error::{EventBusError, Result};
use crate::message::{CloseEvent, Failure, Headers, Message, State};
use futures::future::BoxFuture;
use futures::stream::{FusedStream, Stream};
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

type Delivery = std::result::Result<Message, Failure>;

/// A consumer that has not been registered yet
#[derive(Clone)]
pub struct RxConsumer {
    bus: EventBus,
    address: String,
    headers: Option<Headers>,
}

impl RxConsumer {
    pub(crate) fn new(bus: EventBus, address: &str, headers: Option<Headers>) -> Self {
        Self {
            bus,
            address: address.to_string(),
            headers,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Register a handler and return the stream of its messages
    pub fn subscribe(&self) -> ConsumerStream {
        let tracker = self.bus.tracker();
        let closed = tracker.closed();
        let mut stream = ConsumerStream {
            bus: self.bus.clone(),
            address: self.address.clone(),
            headers: self.headers.clone(),
            closed,
            closing: None,
            rx: None,
            registration: None,
            error: None,
            done: false,
        };

        if tracker.is_closed() {
            debug!(address = %self.address, "Connection closed, consumer not registered");
            return stream;
        }

        // Unbounded so that messages delivered during registration are kept
        let (tx, rx) = mpsc::unbounded_channel::<Delivery>();
        let gate = tracker.clone();
        let handler: Handler = Arc::new(move |delivery: Delivery| {
            // Close supersedes anything delivered after it
            if !gate.is_closed() {
                let _ = tx.send(delivery);
            }
        });

        debug!(address = %self.address, "Registering consumer");
        match self
            .bus
            .delegate()
            .register_handler(&self.address, self.headers.clone(), handler.clone())
        {
            Ok(()) => {
                stream.rx = Some(rx);
                stream.registration = Some(handler);
            }
            Err(e) => stream.error = Some(e.into()),
        }
        stream
    }
}

impl fmt::Debug for RxConsumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RxConsumer")
            .field("address", &self.address)
            .field("headers", &self.headers)
            .finish()
    }
}

/// Stream of the messages delivered to a registered consumer
///
/// Ends with a failure message, a registration error, or the connection
/// close. Messages delivered before the close are still yielded first. Dropping the stream unregisters the handler if the connection is
/// still open.
pub struct ConsumerStream {
    bus: EventBus,
    address: String,
    headers: Option<Headers>,
    closed: BoxFuture<'static, Option<CloseEvent>>,
    /// Set once the connection closed, holding the unclean close event
    closing: Option<Option<CloseEvent>>,
    rx: Option<mpsc::UnboundedReceiver<Delivery>>,
    registration: Option<Handler>,
    error: Option<EventBusError>,
    done: bool,
}

impl ConsumerStream {
    pub fn address(&self) -> &str {
        &self.address
    }

    fn finish(&mut self) {
        self.done = true;
        self.rx = None;
        self.teardown();
    }

    fn on_delivery(&mut self, delivery: Delivery) -> Result<Message> {
        match delivery {
            Ok(message) => {
                trace!(address = %self.address, "Consumer received message");
                Ok(self.bus.enrich(message))
            }
            Err(failure) => {
                self.finish();
                Err(EventBusError::Failure(failure))
            }
        }
    }

    /// Unregister the handler, at most once, and only on a live connection
    fn teardown(&mut self) {
        let Some(handler) = self.registration.take() else {
            return;
        };

        let delegate = self.bus.delegate();
        if delegate.state() != State::Open {
            trace!(address = %self.address, "Connection not open, skipping unregister");
            return;
        }

        debug!(address = %self.address, "Unregistering consumer");
        if let Err(e) = delegate.unregister_handler(&self.address, self.headers.clone(), &handler) {
            warn!(address = %self.address, error = %e, "Failed to unregister consumer");
        }
    }
}

impl Stream for ConsumerStream {
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

        if this.closing.is_none() {
            if let Poll::Ready(unclean) = this.closed.as_mut().poll(cx) {
                debug!(address = %this.address, "Connection closed, draining consumer");
                this.closing = Some(unclean);
            }
        }

        if let Some(unclean) = this.closing.clone() {
            let queued = this.rx.as_mut().and_then(|rx| rx.try_recv().ok());
            return match queued {
                Some(delivery) => Poll::Ready(Some(this.on_delivery(delivery))),
                None => {
                    this.finish();
                    Poll::Ready(unclean.map(|event| Err(EventBusError::Closed(event))))
                }
            };
        }

        let Some(rx) = this.rx.as_mut() else {
            return Poll::Pending;
        };

        match rx.poll_recv(cx) {
            Poll::Ready(Some(delivery)) => Poll::Ready(Some(this.on_delivery(delivery))),
            Poll::Ready(None) => {
                this.finish();
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl FusedStream for ConsumerStream {
    fn is_terminated(&self) -> bool {
        self.done
    }
}

impl Drop for ConsumerStream {
    fn drop(&mut self) {
        self.teardown();
    }
}
