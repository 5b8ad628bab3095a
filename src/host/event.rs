//! One-shot event registrations.
//!
//! Callback-style capabilities (an audio buffer becoming ready, a voice list
//! being populated) are modelled as an [`EventChannel`] that hands out
//! [`Subscription`]s. A subscription is a future resolving to the first event
//! payload; dropping it deregisters the handler, so a source that gave up on
//! the event leaves nothing behind that could write late.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::ProbeError;

/// A capability that fires at most once per registration.
pub trait EventChannel: Send + Sync {
    /// A value that is already available, if the event has effectively fired
    /// before anyone listened.
    fn current(&self) -> Option<String> {
        None
    }

    /// Register a one-shot handler.
    fn subscribe(&self) -> Result<Subscription, ProbeError>;
}

type CancelFn = Box<dyn FnOnce() + Send>;

/// A live one-shot registration.
///
/// Resolves to `Some(payload)` when the event fires, or `None` if the channel
/// was torn down. Dropping it runs the deregistration hook.
pub struct Subscription {
    rx: oneshot::Receiver<String>,
    on_drop: Option<CancelFn>,
}

impl Subscription {
    /// Wrap a receiver and run `cancel` when the subscription is dropped.
    pub fn with_cancel(rx: oneshot::Receiver<String>, cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            rx,
            on_drop: Some(Box::new(cancel)),
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("cancellable", &self.on_drop.is_some())
            .finish()
    }
}

impl Future for Subscription {
    type Output = Option<String>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(Result::ok)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.on_drop.take() {
            cancel();
        }
    }
}

// ---------------------------------------------------------------------------
// ManualEvent
// ---------------------------------------------------------------------------

type Listeners = Arc<Mutex<Vec<(u64, oneshot::Sender<String>)>>>;

/// An in-process event channel fired by hand.
///
/// Embedders bridge their own callbacks into it; tests use it to control
/// exactly when (or whether) an event fires.
#[derive(Default)]
pub struct ManualEvent {
    current: Mutex<Option<String>>,
    listeners: Listeners,
    next_id: AtomicU64,
}

impl ManualEvent {
    /// Create a channel with no listeners and no current value.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `value` available immediately to future probes.
    pub fn set_current(&self, value: impl Into<String>) {
        *self.current.lock() = Some(value.into());
    }

    /// Deliver `payload` to every registered handler, consuming the
    /// registrations. Returns how many handlers received it.
    pub fn fire(&self, payload: impl Into<String>) -> usize {
        let payload = payload.into();
        let listeners = std::mem::take(&mut *self.listeners.lock());
        listeners
            .into_iter()
            .map(|(_, tx)| tx.send(payload.clone()).is_ok())
            .filter(|sent| *sent)
            .count()
    }

    /// Number of handlers still registered.
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }
}

impl std::fmt::Debug for ManualEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualEvent")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl EventChannel for ManualEvent {
    fn current(&self) -> Option<String> {
        self.current.lock().clone()
    }

    fn subscribe(&self) -> Result<Subscription, ProbeError> {
        let (tx, rx) = oneshot::channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().push((id, tx));

        let listeners = Arc::clone(&self.listeners);
        Ok(Subscription::with_cancel(rx, move || {
            listeners.lock().retain(|(other, _)| *other != id);
        }))
    }
}
