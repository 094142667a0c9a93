//! Single-worker event dispatch.
//!
//! Webhook deliveries are queued on a bounded channel owned by the
//! [`Dispatcher`] and drained by exactly one worker task, so lifecycle
//! operations run one at a time in arrival order. A failing or panicking
//! event is logged and the worker moves on to the next one.
//!
//! Shutdown closes the queue: new submissions are refused, and the worker
//! finishes every event it already accepted before exiting.

pub mod handler;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{Instrument, error, info, info_span};

use crate::events::Event;

pub use handler::EventHandler;

/// One accepted delivery.
#[derive(Debug, Clone)]
pub struct Envelope {
    /// `X-GitHub-Delivery` id, or a generated one.
    pub delivery: String,
    pub event: Event,
}

/// Processes one event to completion.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn handle(&self, envelope: &Envelope);
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("event queue is full")]
    Full,
    #[error("event queue is closed")]
    Closed,
}

/// Cloneable producer side of the queue.
#[derive(Debug, Clone)]
pub struct DispatchHandle {
    tx: mpsc::Sender<Envelope>,
}

impl DispatchHandle {
    /// Enqueue without waiting; a full queue is reported, not awaited.
    pub fn submit(&self, delivery: impl Into<String>, event: Event) -> Result<(), SubmitError> {
        let envelope = Envelope {
            delivery: delivery.into(),
            event,
        };
        self.tx.try_send(envelope).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => SubmitError::Full,
            mpsc::error::TrySendError::Closed(_) => SubmitError::Closed,
        })
    }
}

pub struct Dispatcher {
    handle: DispatchHandle,
    close: watch::Sender<bool>,
    worker: JoinHandle<()>,
}

impl Dispatcher {
    /// Spawn the worker. `capacity` bounds the number of queued events.
    pub fn start(handler: Arc<dyn Handler>, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (close, close_rx) = watch::channel(false);
        let worker = tokio::spawn(run_worker(handler, rx, close_rx));
        Self {
            handle: DispatchHandle { tx },
            close,
            worker,
        }
    }

    pub fn handle(&self) -> DispatchHandle {
        self.handle.clone()
    }

    /// Close the queue and wait for the worker to drain it.
    pub async fn shutdown(self) {
        let _ = self.close.send(true);
        drop(self.handle);
        if let Err(err) = self.worker.await {
            error!("Dispatcher worker ended abnormally: {}", err);
        }
    }
}

async fn run_worker(
    handler: Arc<dyn Handler>,
    mut rx: mpsc::Receiver<Envelope>,
    mut close: watch::Receiver<bool>,
) {
    info!("Dispatcher worker started");
    let mut closing = false;
    loop {
        tokio::select! {
            biased;
            _ = close.changed(), if !closing => {
                closing = true;
                rx.close();
                info!("Event queue closed, draining accepted events");
            }
            next = rx.recv() => match next {
                Some(envelope) => process(handler.as_ref(), envelope).await,
                None => break,
            },
        }
    }
    info!("Dispatcher worker stopped");
}

async fn process(handler: &dyn Handler, envelope: Envelope) {
    let span = info_span!(
        "event",
        delivery = %envelope.delivery,
        kind = %envelope.event.kind(),
        branch = envelope.event.branch().unwrap_or("-"),
    );
    let outcome = AssertUnwindSafe(handler.handle(&envelope))
        .catch_unwind()
        .instrument(span)
        .await;
    if outcome.is_err() {
        error!(delivery = %envelope.delivery, "Event handler panicked; continuing with next event");
    }
}
