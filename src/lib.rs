//! eventbus-rx - stream-based adapter over a callback-driven event bus client
//!
//! [`EventBus`] wraps a [`Delegate`] (the underlying client) and exposes:
//! - the connection state as a stream that replays the current state and ends
//!   when the connection closes
//! - request/reply and consumer registrations as cold streams that start on
//!   `subscribe()`, stop when dropped, and end together with the connection
//! - reply capability on every received message that carries a reply address
//!
//! # Example
//!
//! ```no_run
//! use eventbus_rx::{EventBus, LocalBus};
//! use futures::StreamExt;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn run() -> eventbus_rx::Result<()> {
//! let local = Arc::new(LocalBus::new());
//! let bus = EventBus::new(local.clone());
//! local.open();
//!
//! // Answer every ping with a pong
//! let mut pings = bus.rx_consumer("ping-pong", None).subscribe();
//! tokio::spawn(async move {
//!     while let Some(Ok(msg)) = pings.next().await {
//!         if let Some(replier) = msg.replier() {
//!             let _ = replier.reply(json!("pong"), None);
//!         }
//!     }
//! });
//!
//! let reply = bus.rx_send("ping-pong", json!("ping"), None).first().await?;
//! println!("{:?}", reply.map(|m| m.body));
//!
//! bus.close();
//! # Ok(())
//! # }
//! ```

pub mod bus;
pub mod config;
pub mod delegate;
pub mod error;
pub mod local;
pub mod message;
pub mod state;

pub use bus::{ConsumerStream, EventBus, Replier, ReplyStream, RxConsumer, RxSend};
pub use config::EventBusConfig;
pub use delegate::{CloseListener, Delegate, Handler, OpenListener};
pub use error::{DelegateError, EventBusError, Result};
pub use local::LocalBus;
pub use message::{CloseEvent, Failure, Headers, Message, State};
pub use state::StateStream;
