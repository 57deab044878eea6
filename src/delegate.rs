//! Capability interface of the wrapped event bus client

use crate::error::DelegateError;
use crate::message::{CloseEvent, Failure, Headers, Message, State};
use serde_json::Value;
use std::sync::Arc;

/// Callback for replies and inbound messages
///
/// Registered handlers are identified by `Arc` pointer, so the same `Handler`
/// given to `register_handler` must be given back to `unregister_handler`.
pub type Handler = Arc<dyn Fn(std::result::Result<Message, Failure>) + Send + Sync>;

/// Listener notified when the connection opens
pub type OpenListener = Box<dyn Fn() + Send + Sync>;

/// Listener notified when the connection closes
pub type CloseListener = Box<dyn Fn(&CloseEvent) + Send + Sync>;

/// The callback-driven client wrapped by [`EventBus`](crate::EventBus)
///
/// Listener registration is additive: adding a listener never removes or
/// replaces listeners added by other consumers of the same client.
pub trait Delegate: Send + Sync + 'static {
    /// Current connection state
    fn state(&self) -> State;

    /// Close event of a connection that already reached `Closed`
    fn close_event(&self) -> Option<CloseEvent> {
        None
    }

    fn add_open_listener(&self, listener: OpenListener);

    fn add_close_listener(&self, listener: CloseListener);

    /// Send a point-to-point message; `reply` is invoked at most once
    fn send(
        &self,
        address: &str,
        body: Value,
        headers: Option<Headers>,
        reply: Option<Handler>,
    ) -> Result<(), DelegateError>;

    /// Publish a message to every handler of `address`
    fn publish(&self, address: &str, body: Value, headers: Option<Headers>)
        -> Result<(), DelegateError>;

    fn register_handler(
        &self,
        address: &str,
        headers: Option<Headers>,
        handler: Handler,
    ) -> Result<(), DelegateError>;

    fn unregister_handler(
        &self,
        address: &str,
        headers: Option<Headers>,
        handler: &Handler,
    ) -> Result<(), DelegateError>;

    /// Initiate shutdown of the connection
    fn close(&self);

    fn set_ping_enabled(&self, enabled: bool);

    fn default_headers(&self) -> Headers;

    fn set_default_headers(&self, headers: Headers);
}
