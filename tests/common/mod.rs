//! Test double for the wrapped client
//!
//! `FakeDelegate` records every call and lets tests decide how `send` and
//! `register_handler` behave, and when open/close notifications fire.

#![allow(dead_code)]

use eventbus_rx::{
    CloseEvent, CloseListener, Delegate, DelegateError, Failure, Handler, Headers, Message,
    OpenListener, State,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;

pub type Delivery = std::result::Result<Message, Failure>;

/// What `send` does with the reply handler it is given
#[derive(Clone, Default)]
pub enum SendBehavior {
    /// Keep the handler for later use
    #[default]
    Hold,
    /// Invoke the handler synchronously with each delivery
    Respond(Vec<Delivery>),
    /// Fail synchronously
    Throw(DelegateError),
}

/// What `register_handler` does with the handler it is given
#[derive(Clone, Default)]
pub enum RegisterBehavior {
    /// Keep the handler and deliver these synchronously
    #[default]
    Hold,
    Deliver(Vec<Delivery>),
    /// Fail synchronously
    Throw(DelegateError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SendCall {
    pub address: String,
    pub body: Value,
    pub headers: Option<Headers>,
    pub wants_reply: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HandlerCall {
    pub address: String,
    pub headers: Option<Headers>,
}

pub struct FakeDelegate {
    pub state: Mutex<State>,
    pub close_event: Mutex<Option<CloseEvent>>,
    open_listeners: Mutex<Vec<OpenListener>>,
    close_listeners: Mutex<Vec<CloseListener>>,

    pub send_behavior: Mutex<SendBehavior>,
    pub register_behavior: Mutex<RegisterBehavior>,

    pub sends: Mutex<Vec<SendCall>>,
    pub reply_handlers: Mutex<Vec<Handler>>,
    pub publishes: Mutex<Vec<SendCall>>,
    pub registrations: Mutex<Vec<HandlerCall>>,
    pub handlers: Mutex<Vec<Handler>>,
    pub unregistrations: Mutex<Vec<HandlerCall>>,
    pub unregistered_handlers: Mutex<Vec<Handler>>,

    pub close_calls: Mutex<usize>,
    pub ping_calls: Mutex<Vec<bool>>,
    pub default_headers: Mutex<Headers>,
}

impl Default for FakeDelegate {
    fn default() -> Self {
        Self {
            state: Mutex::new(State::Connecting),
            close_event: Mutex::new(None),
            open_listeners: Mutex::new(Vec::new()),
            close_listeners: Mutex::new(Vec::new()),
            send_behavior: Mutex::new(SendBehavior::default()),
            register_behavior: Mutex::new(RegisterBehavior::default()),
            sends: Mutex::new(Vec::new()),
            reply_handlers: Mutex::new(Vec::new()),
            publishes: Mutex::new(Vec::new()),
            registrations: Mutex::new(Vec::new()),
            handlers: Mutex::new(Vec::new()),
            unregistrations: Mutex::new(Vec::new()),
            unregistered_handlers: Mutex::new(Vec::new()),
            close_calls: Mutex::new(0),
            ping_calls: Mutex::new(Vec::new()),
            default_headers: Mutex::new(Headers::new()),
        }
    }
}

impl FakeDelegate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_state(state: State) -> Arc<Self> {
        let delegate = Self::default();
        *delegate.state.lock() = state;
        Arc::new(delegate)
    }

    pub fn set_state(&self, state: State) {
        *self.state.lock() = state;
    }

    pub fn emit_open(&self) {
        for listener in self.open_listeners.lock().iter() {
            listener();
        }
    }

    pub fn emit_close(&self, event: &CloseEvent) {
        for listener in self.close_listeners.lock().iter() {
            listener(event);
        }
    }

    pub fn respond_with(&self, deliveries: Vec<Delivery>) {
        *self.send_behavior.lock() = SendBehavior::Respond(deliveries);
    }

    pub fn deliver_on_register(&self, deliveries: Vec<Delivery>) {
        *self.register_behavior.lock() = RegisterBehavior::Deliver(deliveries);
    }

    /// Push a delivery to every registered handler
    pub fn deliver(&self, delivery: Delivery) {
        let handlers = self.handlers.lock().clone();
        for handler in handlers {
            handler(delivery.clone());
        }
    }

    /// Invoke the reply handler of the most recent send
    pub fn reply(&self, delivery: Delivery) {
        let handler = self.reply_handlers.lock().last().cloned();
        if let Some(handler) = handler {
            handler(delivery);
        }
    }

    pub fn send_count(&self) -> usize {
        self.sends.lock().len()
    }

    pub fn last_send(&self) -> Option<SendCall> {
        self.sends.lock().last().cloned()
    }
}

impl Delegate for FakeDelegate {
    fn state(&self) -> State {
        *self.state.lock()
    }

    fn close_event(&self) -> Option<CloseEvent> {
        self.close_event.lock().clone()
    }

    fn add_open_listener(&self, listener: OpenListener) {
        self.open_listeners.lock().push(listener);
    }

    fn add_close_listener(&self, listener: CloseListener) {
        self.close_listeners.lock().push(listener);
    }

    fn send(
        &self,
        address: &str,
        body: Value,
        headers: Option<Headers>,
        reply: Option<Handler>,
    ) -> Result<(), DelegateError> {
        self.sends.lock().push(SendCall {
            address: address.to_string(),
            body,
            headers,
            wants_reply: reply.is_some(),
        });

        let behavior = self.send_behavior.lock().clone();
        match behavior {
            SendBehavior::Throw(err) => return Err(err),
            SendBehavior::Hold => {
                if let Some(reply) = reply {
                    self.reply_handlers.lock().push(reply);
                }
            }
            SendBehavior::Respond(deliveries) => {
                if let Some(reply) = reply {
                    for delivery in deliveries {
                        reply(delivery);
                    }
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
        self.publishes.lock().push(SendCall {
            address: address.to_string(),
            body,
            headers,
            wants_reply: false,
        });
        Ok(())
    }

    fn register_handler(
        &self,
        address: &str,
        headers: Option<Headers>,
        handler: Handler,
    ) -> Result<(), DelegateError> {
        self.registrations.lock().push(HandlerCall {
            address: address.to_string(),
            headers,
        });

        let behavior = self.register_behavior.lock().clone();
        match behavior {
            RegisterBehavior::Throw(err) => return Err(err),
            RegisterBehavior::Hold => self.handlers.lock().push(handler),
            RegisterBehavior::Deliver(deliveries) => {
                self.handlers.lock().push(handler.clone());
                for delivery in deliveries {
                    handler(delivery);
                }
            }
        }
        Ok(())
    }

    fn unregister_handler(
        &self,
        address: &str,
        headers: Option<Headers>,
        handler: &Handler,
    ) -> Result<(), DelegateError> {
        self.unregistrations.lock().push(HandlerCall {
            address: address.to_string(),
            headers,
        });
        self.unregistered_handlers.lock().push(handler.clone());
        Ok(())
    }

    fn close(&self) {
        *self.close_calls.lock() += 1;
    }

    fn set_ping_enabled(&self, enabled: bool) {
        self.ping_calls.lock().push(enabled);
    }

    fn default_headers(&self) -> Headers {
        self.default_headers.lock().clone()
    }

    fn set_default_headers(&self, headers: Headers) {
        *self.default_headers.lock() = headers;
    }
}

pub fn close_event(was_clean: bool) -> CloseEvent {
    CloseEvent::new(
        12345,
        format!("[dummy close event] wasClean: {}", was_clean),
        was_clean,
    )
}

pub fn headers(pairs: &[(&str, &str)]) -> Headers {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
