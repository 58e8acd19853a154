//! Observer channels for bootstrap events.
//!
//! The service never knows how events leave the process. Anything that can
//! accept a [`BootstrapEvent`] without blocking can be an observer: a tokio
//! channel, a closure, or nothing at all.

use std::panic::{self, AssertUnwindSafe};

use tokio::sync::mpsc;

use super::types::BootstrapEvent;
use crate::error::SinkError;

/// Delivers events to exactly one observer.
///
/// Implementations must not block: events are emitted while the service holds
/// its state lock so that every observer sees mutations in order. A sink that
/// returns an error or panics is detached and receives nothing further.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &BootstrapEvent) -> Result<(), SinkError>;
}

/// Forwards events into an unbounded tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<BootstrapEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<BootstrapEvent>) -> Self {
        Self { tx }
    }

    /// Create a sink together with its receiving end
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<BootstrapEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: &BootstrapEvent) -> Result<(), SinkError> {
        self.tx.send(event.clone()).map_err(|_| SinkError::Closed)
    }
}

/// Calls a closure for every event.
pub struct FnSink<F>(pub F);

impl<F> EventSink for FnSink<F>
where
    F: Fn(&BootstrapEvent) + Send + Sync,
{
    fn emit(&self, event: &BootstrapEvent) -> Result<(), SinkError> {
        (self.0)(event);
        Ok(())
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: &BootstrapEvent) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Emit to a sink, logging (never propagating) delivery failures.
///
/// Returns `false` once the sink should receive no further events: its
/// channel is closed or `emit` panicked.
pub(crate) fn deliver(sink: &dyn EventSink, event: &BootstrapEvent) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(|| sink.emit(event))) {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            tracing::warn!("Dropping bootstrap observer: {}", e);
            false
        }
        Err(_) => {
            tracing::warn!("Dropping bootstrap observer: emit panicked");
            false
        }
    }
}
