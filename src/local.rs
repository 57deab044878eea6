//! In-process event bus
//!
//! [`LocalBus`] implements [`Delegate`] without any transport: handlers live
//! in memory and messages are delivered synchronously on the caller's thread.
//! It follows the semantics of a remote bus client closely enough to run the
//! same conversations, including reply addresses and failure replies.

use crate::delegate::{CloseListener, Delegate, Handler, OpenListener};
use crate::error::DelegateError;
use crate::message::{CloseEvent, Failure, Headers, Message, State};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, trace};
use uuid::Uuid;

/// Failure code used when nobody listens on an address
pub const NO_HANDLERS_CODE: i32 = -1;

/// Failure type used when nobody listens on an address
pub const NO_HANDLERS_TYPE: &str = "NO_HANDLERS";

/// Close code of a normal, clean shutdown
pub const NORMAL_CLOSURE: u16 = 1000;

#[derive(Default)]
struct Routes {
    /// Durable handlers by address
    handlers: HashMap<String, Vec<Handler>>,
    /// One-shot reply handlers by reply address
    replies: HashMap<String, Handler>,
    /// Round-robin position for point-to-point sends
    cursors: HashMap<String, usize>,
}

impl Routes {
    fn next_handler(&mut self, address: &str) -> Option<Handler> {
        let handlers = self.handlers.get(address).filter(|h| !h.is_empty())?;
        let cursor = self.cursors.entry(address.to_string()).or_default();
        let handler = handlers[*cursor % handlers.len()].clone();
        *cursor = cursor.wrapping_add(1);
        Some(handler)
    }
}

/// In-memory [`Delegate`]
///
/// Starts in `Connecting`; call [`open`](LocalBus::open) to make it usable.
pub struct LocalBus {
    state: Mutex<State>,
    close_event: Mutex<Option<CloseEvent>>,
    open_listeners: Mutex<Vec<Arc<dyn Fn() + Send + Sync>>>,
    close_listeners: Mutex<Vec<Arc<dyn Fn(&CloseEvent) + Send + Sync>>>,
    routes: Mutex<Routes>,
    default_headers: Mutex<Headers>,
    ping_enabled: AtomicBool,
}

impl LocalBus {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::Connecting),
            close_event: Mutex::new(None),
            open_listeners: Mutex::new(Vec::new()),
            close_listeners: Mutex::new(Vec::new()),
            routes: Mutex::new(Routes::default()),
            default_headers: Mutex::new(Headers::new()),
            ping_enabled: AtomicBool::new(true),
        }
    }

    /// Complete the connection and notify open listeners
    pub fn open(&self) {
        {
            let mut state = self.state.lock();
            if *state != State::Connecting {
                debug!(state = ?*state, "Ignoring open on a bus that is not connecting");
                return;
            }
            *state = State::Open;
        }

        info!("Local bus opened");
        let listeners = self.open_listeners.lock().clone();
        for listener in listeners {
            listener();
        }
    }

    /// Drop the connection uncleanly
    pub fn fail_connection(&self, code: u16, reason: impl Into<String>) {
        self.shutdown(CloseEvent::new(code, reason, false));
    }

    /// Answer a pending request with a failure
    pub fn fail_reply(&self, reply_address: &str, failure: Failure) -> Result<(), DelegateError> {
        self.ensure_open()?;
        let reply = self.routes.lock().replies.remove(reply_address);
        match reply {
            Some(reply) => reply(Err(failure)),
            None => debug!(reply_address = %reply_address, "No pending reply"),
        }
        Ok(())
    }

    pub fn is_ping_enabled(&self) -> bool {
        self.ping_enabled.load(Ordering::SeqCst)
    }

    /// Number of durable handlers registered on `address`
    pub fn handler_count(&self, address: &str) -> usize {
        self.routes
            .lock()
            .handlers
            .get(address)
            .map_or(0, Vec::len)
    }

    fn ensure_open(&self) -> Result<(), DelegateError> {
        match *self.state.lock() {
            State::Open => Ok(()),
            state => Err(DelegateError::InvalidState(state)),
        }
    }

    fn outbound_headers(&self, headers: Option<Headers>) -> Headers {
        let mut merged = self.default_headers.lock().clone();
        if let Some(headers) = headers {
            merged.extend(headers);
        }
        merged
    }

    fn shutdown(&self, event: CloseEvent) {
        {
            let mut state = self.state.lock();
            if *state == State::Closed {
                return;
            }
            *state = State::Closing;
        }

        // Handlers die with the connection
        let routes = std::mem::take(&mut *self.routes.lock());

        *self.close_event.lock() = Some(event.clone());
        *self.state.lock() = State::Closed;
        info!(code = event.code, was_clean = event.was_clean, "Local bus closed");

        let listeners = self.close_listeners.lock().clone();
        for listener in listeners {
            listener(&event);
        }

        drop(routes);
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Delegate for LocalBus {
    fn state(&self) -> State {
        *self.state.lock()
    }

    fn close_event(&self) -> Option<CloseEvent> {
        self.close_event.lock().clone()
    }

    fn add_open_listener(&self, listener: OpenListener) {
        self.open_listeners.lock().push(Arc::from(listener));
    }

    fn add_close_listener(&self, listener: CloseListener) {
        self.close_listeners.lock().push(Arc::from(listener));
    }

    fn send(
        &self,
        address: &str,
        body: Value,
        headers: Option<Headers>,
        reply: Option<Handler>,
    ) -> Result<(), DelegateError> {
        self.ensure_open()?;

        let reply_address = reply.as_ref().map(|_| Uuid::new_v4().to_string());
        let target = {
            let mut routes = self.routes.lock();
            if let (Some(reply_address), Some(reply)) = (&reply_address, reply) {
                routes.replies.insert(reply_address.clone(), reply);
            }
            // A pending reply slot answers once, otherwise one durable handler gets it
            routes
                .replies
                .remove(address)
                .or_else(|| routes.next_handler(address))
        };

        let mut message = Message::new(address, body).with_headers(self.outbound_headers(headers));
        message.reply_address = reply_address.clone();

        match target {
            Some(handler) => {
                trace!(address = %address, "Delivering message");
                handler(Ok(message));
            }
            None => {
                debug!(address = %address, "No handlers for address");
                let reply = reply_address.and_then(|a| self.routes.lock().replies.remove(&a));
                if let Some(reply) = reply {
                    reply(Err(Failure::new(
                        NO_HANDLERS_CODE,
                        NO_HANDLERS_TYPE,
                        format!("No handlers for address {}", address),
                    )));
                }
            }
        }

        Ok(())
    }

    fn publish(
        &self,
        address: &str,
        body: Value,
        headers: Option<Headers>,
    ) -> Result<(), DelegateError> {
        self.ensure_open()?;

        let handlers = self
            .routes
            .lock()
            .handlers
            .get(address)
            .cloned()
            .unwrap_or_default();
        trace!(address = %address, subscriber_count = handlers.len(), "Publishing message");

        let message = Message::new(address, body).with_headers(self.outbound_headers(headers));
        for handler in handlers {
            handler(Ok(message.clone()));
        }

        Ok(())
    }

    fn register_handler(
        &self,
        address: &str,
        _headers: Option<Headers>,
        handler: Handler,
    ) -> Result<(), DelegateError> {
        self.ensure_open()?;
        self.routes
            .lock()
            .handlers
            .entry(address.to_string())
            .or_default()
            .push(handler);
        debug!(address = %address, "Handler registered");
        Ok(())
    }

    fn unregister_handler(
        &self,
        address: &str,
        _headers: Option<Headers>,
        handler: &Handler,
    ) -> Result<(), DelegateError> {
        self.ensure_open()?;
        let mut routes = self.routes.lock();
        if let Some(handlers) = routes.handlers.get_mut(address) {
            handlers.retain(|h| !Arc::ptr_eq(h, handler));
            if handlers.is_empty() {
                routes.handlers.remove(address);
                routes.cursors.remove(address);
            }
        }
        debug!(address = %address, "Handler unregistered");
        Ok(())
    }

    fn close(&self) {
        self.shutdown(CloseEvent::new(NORMAL_CLOSURE, "Normal closure", true));
    }

    fn set_ping_enabled(&self, enabled: bool) {
        self.ping_enabled.store(enabled, Ordering::SeqCst);
    }

    fn default_headers(&self) -> Headers {
        self.default_headers.lock().clone()
    }

    fn set_default_headers(&self, headers: Headers) {
        *self.default_headers.lock() = headers;
    }
}
