//! Timeout and race policy.
//!
//! A bounded source declares how long it is willing to wait and which
//! placeholder stands in when the bound elapses. The race resolves with
//! whichever side finishes first; the losing future is dropped on the spot, so
//! its eventual result can never reach the store.

use std::future::Future;
use std::time::Duration;

use tokio::time::timeout;

use crate::error::ProbeError;
use crate::host::EventChannel;
use crate::signal::Placeholder;

/// Bound and expiry placeholder for one bounded wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutPolicy {
    pub bound: Duration,
    pub placeholder: Placeholder,
}

impl TimeoutPolicy {
    pub const fn new(bound: Duration, placeholder: Placeholder) -> Self {
        Self { bound, placeholder }
    }

    /// A policy that emits [`Placeholder::Timeout`] on expiry.
    pub const fn timeout(bound: Duration) -> Self {
        Self::new(bound, Placeholder::Timeout)
    }
}

/// Outcome of a bounded race.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Raced<T> {
    /// The real result arrived first.
    Completed(T),
    /// The deadline fired first.
    Expired(Placeholder),
}

impl<T> Raced<T> {
    pub fn is_expired(&self) -> bool {
        matches!(self, Raced::Expired(_))
    }

    pub fn completed(self) -> Option<T> {
        match self {
            Raced::Completed(value) => Some(value),
            Raced::Expired(_) => None,
        }
    }
}

/// Race `fut` against the policy's deadline.
pub async fn race<F: Future>(policy: &TimeoutPolicy, fut: F) -> Raced<F::Output> {
    match timeout(policy.bound, fut).await {
        Ok(value) => Raced::Completed(value),
        Err(_) => {
            tracing::debug!(bound_ms = policy.bound.as_millis() as u64, "bounded race expired");
            Raced::Expired(policy.placeholder)
        }
    }
}

/// Wait for the first event on `channel`, or the policy's fallback.
///
/// A value the channel already holds wins immediately. Otherwise a handler is
/// registered and raced against the fallback timer; the handler is
/// deregistered in both cases before this returns. A channel torn down
/// without firing counts as [`Placeholder::NotAvailable`].
pub async fn first_event(
    channel: &dyn EventChannel,
    policy: &TimeoutPolicy,
) -> Result<Raced<String>, ProbeError> {
    if let Some(value) = channel.current() {
        return Ok(Raced::Completed(value));
    }

    let subscription = channel.subscribe()?;
    Ok(match race(policy, subscription).await {
        Raced::Completed(Some(payload)) => Raced::Completed(payload),
        Raced::Completed(None) => Raced::Expired(Placeholder::NotAvailable),
        Raced::Expired(placeholder) => Raced::Expired(placeholder),
    })
}
