use core::fmt;
use core::pin::Pin;
use core::task::{Context, Poll};
use std::sync::{Arc, Mutex, PoisonError};

use futures::Stream;
use tracing::debug;

use crate::error::Error;
use crate::event::RpcEvent;

pub type EventStream = Pin<Box<dyn Stream<Item = Result<RpcEvent, Error>> + Send>>;

type UnsubscribeFn = Box<dyn FnOnce() + Send>;

/// Cancels a subscription. Cloneable and idempotent: the underlying
/// teardown runs exactly once, whichever clone triggers it first.
#[derive(Clone)]
pub struct Unsubscribe {
    action: Arc<Mutex<Option<UnsubscribeFn>>>,
}

impl Unsubscribe {
    pub fn new(action: impl FnOnce() + Send + 'static) -> Self {
        Self {
            action: Arc::new(Mutex::new(Some(Box::new(action)))),
        }
    }

    pub fn cancel(&self) {
        let action = self
            .action
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(action) = action {
            action();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.action
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unsubscribe")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// A lazy, unbounded, non-restartable stream of events matching one query.
///
/// The stream ends once the subscription is cancelled, and dropping it
/// cancels the subscription.
pub struct Subscription {
    query: String,
    stream: EventStream,
    unsubscribe: Unsubscribe,
}

impl Subscription {
    pub fn new(query: String, stream: EventStream, unsubscribe: Unsubscribe) -> Self {
        Self {
            query,
            stream,
            unsubscribe,
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    /// A handle which cancels this subscription from anywhere.
    pub fn cancel_handle(&self) -> Unsubscribe {
        self.unsubscribe.clone()
    }

    pub fn unsubscribe(&self) {
        if !self.unsubscribe.is_cancelled() {
            debug!(query = %self.query, "cancelling subscription");
        }

        self.unsubscribe.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.unsubscribe.is_cancelled()
    }
}

impl Stream for Subscription {
    type Item = Result<RpcEvent, Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if this.unsubscribe.is_cancelled() {
            return Poll::Ready(None);
        }

        this.stream.as_mut().poll_next(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("query", &self.query)
            .field("unsubscribe", &self.unsubscribe)
            .finish_non_exhaustive()
    }
}
