//! Stream-based façade over a [`Delegate`]

mod consumer;
mod reply;

pub use consumer::{ConsumerStream, RxConsumer};
pub use reply::{Replier, ReplyStream, RxSend};

use crate::config::EventBusConfig;
use crate::delegate::Delegate;
use crate::error::Result;
use crate::message::{CloseEvent, Headers, Message, State};
use crate::state::{StateStream, StateTracker};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

struct BusInner {
    delegate: Arc<dyn Delegate>,
    tracker: StateTracker,
}

/// Event bus adapter
///
/// Wraps one connection of a callback-driven client. Request/reply and
/// consumer operations are exposed as cold stream descriptors whose live
/// streams end together with the connection.
///
/// This struct is cheaply cloneable as it uses an internal Arc.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    /// Wrap a delegate. A new connection needs a new `EventBus`.
    pub fn new(delegate: Arc<dyn Delegate>) -> Self {
        let tracker = StateTracker::attach(delegate.as_ref());
        debug!(state = ?tracker.current(), "Event bus attached");
        Self {
            inner: Arc::new(BusInner { delegate, tracker }),
        }
    }

    /// Wrap a delegate and apply the given configuration to it
    pub fn with_config(delegate: Arc<dyn Delegate>, config: EventBusConfig) -> Self {
        if let Some(headers) = config.default_headers {
            delegate.set_default_headers(headers);
        }
        if let Some(enabled) = config.ping_enabled {
            delegate.set_ping_enabled(enabled);
        }
        Self::new(delegate)
    }

    /// The wrapped client
    pub fn delegate(&self) -> &Arc<dyn Delegate> {
        &self.inner.delegate
    }

    /// Current state as reported by the delegate
    pub fn state(&self) -> State {
        self.inner.delegate.state()
    }

    /// Stream of connection states, starting with the current one
    pub fn state_stream(&self) -> StateStream {
        self.inner.tracker.stream()
    }

    /// Close event of the connection, once it is closed
    pub fn close_event(&self) -> Option<CloseEvent> {
        self.inner.tracker.close_event()
    }

    pub fn default_headers(&self) -> Headers {
        self.inner.delegate.default_headers()
    }

    pub fn set_default_headers(&self, headers: Headers) {
        self.inner.delegate.set_default_headers(headers);
    }

    /// Send a message without expecting a reply
    pub fn send(&self, address: &str, body: Value, headers: Option<Headers>) -> Result<()> {
        debug!(address = %address, "Sending message");
        self.inner.delegate.send(address, body, headers, None)?;
        Ok(())
    }

    /// Send a message and expect a reply
    ///
    /// Nothing is sent until [`RxSend::subscribe`] is called, and every call
    /// to it sends a new request.
    pub fn rx_send(&self, address: &str, body: Value, headers: Option<Headers>) -> RxSend {
        RxSend::new(self.clone(), address, body, headers)
    }

    /// Publish a message to every consumer of `address`
    pub fn publish(&self, address: &str, body: Value, headers: Option<Headers>) -> Result<()> {
        debug!(address = %address, "Publishing message");
        self.inner.delegate.publish(address, body, headers)?;
        Ok(())
    }

    /// Consume messages sent to `address`
    ///
    /// The handler is registered on [`RxConsumer::subscribe`] and unregistered
    /// when the returned stream is dropped while the connection is open.
    pub fn rx_consumer(&self, address: &str, headers: Option<Headers>) -> RxConsumer {
        RxConsumer::new(self.clone(), address, headers)
    }

    /// Close the underlying connection
    pub fn close(&self) {
        debug!("Closing event bus");
        self.inner.delegate.close();
    }

    /// Enable or disable pings on the underlying connection
    pub fn set_ping_enabled(&self, enabled: bool) {
        self.inner.delegate.set_ping_enabled(enabled);
    }

    pub(crate) fn tracker(&self) -> &StateTracker {
        &self.inner.tracker
    }

    /// Attach reply capability when the message carries a reply address
    pub(crate) fn enrich(&self, mut message: Message) -> Message {
        if let Some(address) = message.reply_address.clone() {
            message.replier = Some(Replier::new(self.clone(), address));
        }
        message
    }
}
