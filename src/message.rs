//! Data types exchanged with the event bus
//!
//! Field names follow the vert.x event bus bridge JSON so that delegates
//! speaking that protocol can (de)serialize these types directly.

use crate::bus::Replier;
use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Message headers
pub type Headers = HashMap<String, String>;

/// Connection state of the underlying client
///
/// Moves forward only: `Connecting -> Open -> Closing -> Closed`, or
/// `Connecting -> Closed` when the connection attempt fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum State {
    /// Connection is being established
    Connecting,
    /// Connected and ready
    Open,
    /// Shutdown has been initiated
    Closing,
    /// Connection is gone for good
    Closed,
}

impl State {
    fn rank(self) -> u8 {
        match self {
            State::Connecting => 0,
            State::Open => 1,
            State::Closing => 2,
            State::Closed => 3,
        }
    }

    /// Whether moving from `self` to `next` goes forward
    pub fn precedes(self, next: State) -> bool {
        self.rank() < next.rank()
    }

    /// `Closed` is the only terminal state
    pub fn is_terminal(self) -> bool {
        self == State::Closed
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            State::Connecting => "CONNECTING",
            State::Open => "OPEN",
            State::Closing => "CLOSING",
            State::Closed => "CLOSED",
        };
        f.write_str(name)
    }
}

/// Close notification produced by the transport when the connection ends
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseEvent {
    pub code: u16,
    pub reason: String,
    pub was_clean: bool,
}

impl CloseEvent {
    pub fn new(code: u16, reason: impl Into<String>, was_clean: bool) -> Self {
        Self {
            code,
            reason: reason.into(),
            was_clean,
        }
    }
}

impl fmt::Display for CloseEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} (wasClean: {})", self.code, self.reason, self.was_clean)
    }
}

/// Business-level error reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Failure {
    pub failure_code: i32,
    pub failure_type: String,
    #[serde(default)]
    pub message: Value,
}

impl Failure {
    pub fn new(failure_code: i32, failure_type: impl Into<String>, message: impl Into<Value>) -> Self {
        Self {
            failure_code,
            failure_type: failure_type.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.failure_type, self.failure_code, self.message)
    }
}

/// A message sent over, or received from, the bus
///
/// Messages received through an [`EventBus`](crate::EventBus) that carry a
/// reply address also carry a [`Replier`] bound to that address.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub address: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_address: Option<String>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: Headers,

    #[serde(default)]
    pub body: Value,

    #[serde(skip)]
    pub(crate) replier: Option<Replier>,
}

impl Message {
    pub fn new(address: impl Into<String>, body: impl Into<Value>) -> Self {
        Self {
            address: address.into(),
            reply_address: None,
            headers: Headers::new(),
            body: body.into(),
            replier: None,
        }
    }

    pub fn with_reply_address(mut self, reply_address: impl Into<String>) -> Self {
        self.reply_address = Some(reply_address.into());
        self
    }

    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    /// Reply capability, present only when the sender accepts a reply
    pub fn replier(&self) -> Option<&Replier> {
        self.replier.as_ref()
    }

    /// Decode the body into a typed value
    pub fn body_as<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.body.clone())?)
    }
}
