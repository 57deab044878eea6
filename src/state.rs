//! Connection state tracking
//!
//! The tracker keeps its own view of the connection in a `watch` channel and
//! feeds every accepted transition to each live [`StateStream`]:
//! - listeners are attached to the delegate before the delegate's current
//!   state is read, so no transition can slip in between the two
//! - state only moves forward, and `Closed` is written exactly once
//! - every subscriber to [`StateStream`] starts with the current state and
//!   then sees each later transition in order

use crate::delegate::Delegate;
use crate::error::{EventBusError, Result};
use crate::message::{CloseEvent, State};
use futures::future::BoxFuture;
use futures::stream::{self, BoxStream, StreamExt};
use futures::FutureExt;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

/// Stream of connection states
///
/// Yields the current state first. Ends after `Closed`: cleanly when the
/// close was clean, otherwise with a single `Err(EventBusError::Closed)`.
pub type StateStream = BoxStream<'static, Result<State>>;

#[derive(Debug, Clone, PartialEq)]
struct Snapshot {
    state: State,
    close: Option<CloseEvent>,
}

impl Snapshot {
    /// Apply a transition, returning whether anything changed
    fn advance(&mut self, state: State, close: Option<CloseEvent>) -> bool {
        if !self.state.precedes(state) {
            return false;
        }
        self.state = state;
        if state == State::Closed {
            self.close = close;
        }
        true
    }

    /// The close event when the connection ended uncleanly
    fn unclean_close(&self) -> Option<CloseEvent> {
        self.close.clone().filter(|event| !event.was_clean)
    }
}

/// Shared between the tracker and the delegate listeners
struct Shared {
    tx: watch::Sender<Snapshot>,
    /// One queue per live [`StateStream`], so no transition is skipped
    subscribers: Mutex<Vec<mpsc::UnboundedSender<Snapshot>>>,
}

impl Shared {
    fn transition(&self, state: State, close: Option<CloseEvent>) -> bool {
        // Held across the update so a new stream is seeded either before or after it
        let mut subscribers = self.subscribers.lock();
        if !self.tx.send_if_modified(|snapshot| snapshot.advance(state, close)) {
            return false;
        }

        let snapshot = self.tx.borrow().clone();
        subscribers.retain(|subscriber| subscriber.send(snapshot.clone()).is_ok());
        if snapshot.state.is_terminal() {
            subscribers.clear();
        }
        true
    }
}

#[derive(Clone)]
pub(crate) struct StateTracker {
    shared: Arc<Shared>,
}

impl StateTracker {
    /// Attach to a delegate and capture its current state
    pub(crate) fn attach(delegate: &dyn Delegate) -> Self {
        let (tx, _) = watch::channel(Snapshot {
            state: State::Connecting,
            close: None,
        });
        let shared = Arc::new(Shared {
            tx,
            subscribers: Mutex::new(Vec::new()),
        });

        let on_open = shared.clone();
        delegate.add_open_listener(Box::new(move || {
            if on_open.transition(State::Open, None) {
                debug!(state = ?State::Open, "Connection state changed");
            }
        }));

        let on_close = shared.clone();
        delegate.add_close_listener(Box::new(move |event: &CloseEvent| {
            if on_close.transition(State::Closed, Some(event.clone())) {
                info!(
                    code = event.code,
                    reason = %event.reason,
                    was_clean = event.was_clean,
                    "Connection closed"
                );
            }
        }));

        // Listeners are live, now it is safe to take the snapshot
        let current = delegate.state();
        let close = if current == State::Closed {
            delegate.close_event()
        } else {
            None
        };
        shared.transition(current, close);

        Self { shared }
    }

    pub(crate) fn current(&self) -> State {
        self.shared.tx.borrow().state
    }

    pub(crate) fn close_event(&self) -> Option<CloseEvent> {
        self.shared.tx.borrow().close.clone()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.current().is_terminal()
    }

    /// Resolves once the connection is `Closed`, to the close event if the
    /// close was unclean
    pub(crate) fn closed(&self) -> BoxFuture<'static, Option<CloseEvent>> {
        let mut rx = self.shared.tx.subscribe();
        async move {
            let outcome = rx
                .wait_for(|snapshot| snapshot.state.is_terminal())
                .await
                .map(|snapshot| snapshot.unclean_close());
            match outcome {
                Ok(unclean) => unclean,
                // The tracker is gone, so the connection can never be observed closing
                Err(_) => std::future::pending().await,
            }
        }
        .boxed()
    }

    pub(crate) fn stream(&self) -> StateStream {
        enum Phase {
            Live(mpsc::UnboundedReceiver<Snapshot>),
            Failing(CloseEvent),
            Done,
        }

        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut subscribers = self.shared.subscribers.lock();
            let snapshot = self.shared.tx.borrow().clone();
            let terminal = snapshot.state.is_terminal();
            let _ = tx.send(snapshot);
            if !terminal {
                subscribers.push(tx);
            }
        }

        stream::unfold(Phase::Live(rx), |phase| async move {
            match phase {
                Phase::Live(mut rx) => {
                    let snapshot = rx.recv().await?;
                    if !snapshot.state.is_terminal() {
                        return Some((Ok(snapshot.state), Phase::Live(rx)));
                    }
                    let next = match snapshot.unclean_close() {
                        Some(event) => Phase::Failing(event),
                        None => Phase::Done,
                    };
                    Some((Ok(State::Closed), next))
                }
                Phase::Failing(event) => Some((Err(EventBusError::Closed(event)), Phase::Done)),
                Phase::Done => None,
            }
        })
        .boxed()
    }
}
