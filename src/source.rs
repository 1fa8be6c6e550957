//! Position Source abstraction.
//!
//! The engine never talks to device GPS directly. Anything that can hand out a
//! current fix and a stream of fixes implements [`PositionSource`]; the walk session
//! subscribes while tracking and drops its [`PositionWatch`] to unsubscribe.

use std::fmt;
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use futures::channel::mpsc::{self, UnboundedSender};
use futures::stream::{BoxStream, Stream, StreamExt};
use log::debug;

use crate::{PositionError, PositionSample};

/// One item of a position subscription.
pub type PositionEvent = std::result::Result<PositionSample, PositionError>;

/// Delivery options for position requests.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PositionOptions {
    /// Ask for GPS-grade fixes rather than network/best-effort ones.
    /// Default: true
    pub high_accuracy: bool,

    /// How long to wait for the first fix before reporting `Timeout`.
    /// Default: 10000 ms
    pub timeout_ms: u64,

    /// Accept a cached fix no older than this. Default: 0 (always fresh)
    pub maximum_age_ms: u64,
}

impl Default for PositionOptions {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            timeout_ms: 10_000,
            maximum_age_ms: 0,
        }
    }
}

/// A live position subscription. Dropping it unsubscribes.
pub struct PositionWatch {
    inner: BoxStream<'static, PositionEvent>,
}

impl PositionWatch {
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = PositionEvent> + Send + 'static,
    {
        Self { inner: stream.boxed() }
    }
}

impl Stream for PositionWatch {
    type Item = PositionEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl fmt::Debug for PositionWatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PositionWatch").finish_non_exhaustive()
    }
}

/// Supplies device positions on demand and as a subscription.
pub trait PositionSource: Send + Sync {
    /// One-shot fix.
    fn current_position(&self, options: &PositionOptions) -> std::result::Result<PositionSample, PositionError>;

    /// Subscribe to continuous fixes. Errors here mean no subscription was made.
    fn watch(&self, options: &PositionOptions) -> std::result::Result<PositionWatch, PositionError>;
}

#[derive(Default)]
struct ChannelState {
    subscribers: Vec<UnboundedSender<PositionEvent>>,
    last_fix: Option<PositionSample>,
    failure: Option<PositionError>,
}

/// In-process position source fed by hand.
///
/// Hosts that receive fixes from elsewhere (a browser bridge, a replayed GPX file,
/// a test) push them here and every live watch receives them in order.
#[derive(Default)]
pub struct ChannelPositionSource {
    state: Mutex<ChannelState>,
}

impl ChannelPositionSource {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ChannelState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deliver a fix to every subscriber and remember it for `current_position`.
    pub fn push(&self, sample: PositionSample) {
        let mut state = self.lock();
        state.last_fix = Some(sample);
        Self::broadcast(&mut state, Ok(sample));
    }

    /// Deliver an error event to every subscriber.
    pub fn push_error(&self, error: PositionError) {
        let mut state = self.lock();
        Self::broadcast(&mut state, Err(error));
    }

    /// Make every subsequent request fail with `error` (or clear with `None`).
    pub fn fail_with(&self, error: Option<PositionError>) {
        self.lock().failure = error;
    }

    /// End all current subscriptions.
    pub fn close(&self) {
        self.lock().subscribers.clear();
    }

    /// Number of watches still alive.
    pub fn subscriber_count(&self) -> usize {
        let mut state = self.lock();
        state.subscribers.retain(|tx| !tx.is_closed());
        state.subscribers.len()
    }

    fn broadcast(state: &mut ChannelState, event: PositionEvent) {
        state.subscribers.retain(|tx| tx.unbounded_send(event).is_ok());
    }
}

impl PositionSource for ChannelPositionSource {
    fn current_position(&self, _options: &PositionOptions) -> std::result::Result<PositionSample, PositionError> {
        let state = self.lock();
        if let Some(error) = state.failure {
            return Err(error);
        }
        state.last_fix.ok_or(PositionError::PositionUnavailable)
    }

    fn watch(&self, options: &PositionOptions) -> std::result::Result<PositionWatch, PositionError> {
        let mut state = self.lock();
        if let Some(error) = state.failure {
            return Err(error);
        }
        let (tx, rx) = mpsc::unbounded();
        state.subscribers.push(tx);
        debug!(
            "[ChannelPositionSource] New watch (high_accuracy={}, {} subscribers)",
            options.high_accuracy,
            state.subscribers.len()
        );
        Ok(PositionWatch::new(rx))
    }
}
