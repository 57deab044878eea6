//! Configuration for the event bus adapter

use crate::message::Headers;

/// Settings applied to the delegate when an [`EventBus`](crate::EventBus) is
/// created with [`EventBus::with_config`](crate::EventBus::with_config)
///
/// Unset fields leave the delegate's own setting untouched.
#[derive(Debug, Clone, Default)]
pub struct EventBusConfig {
    /// Headers added to every outbound message
    pub default_headers: Option<Headers>,

    /// Whether the delegate should send keepalive pings
    pub ping_enabled: Option<bool>,
}

impl EventBusConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a single default header
    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers
            .get_or_insert_with(Headers::new)
            .insert(name.into(), value.into());
        self
    }

    /// Replace all default headers
    pub fn default_headers(mut self, headers: Headers) -> Self {
        self.default_headers = Some(headers);
        self
    }

    /// Enable or disable keepalive pings
    pub fn ping_enabled(mut self, enabled: bool) -> Self {
        self.ping_enabled = Some(enabled);
        self
    }
}
