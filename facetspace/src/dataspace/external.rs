//! Re-entry from outside the dataspace.
//!
//! Code running on other threads or tasks cannot touch the dataspace. It
//! holds an [`ExternalHandle`] instead and sends payloads through an
//! unbounded channel; the driver drains the channel and turns each event
//! into a script on the facet that created the handle.

use crate::dataspace::Turn;
use crate::runtime::ActorResult;
use crate::term::Term;
use crate::types::{ActorId, FacetId};
use std::rc::Rc;
use tokio::sync::mpsc::{
    self, error::TryRecvError, UnboundedReceiver, UnboundedSender, WeakUnboundedSender,
};

pub(crate) type ExternalCallback = Rc<dyn Fn(&mut Turn<'_>, Term) -> ActorResult>;

#[derive(Debug)]
pub(crate) struct ExternalEvent {
    pub handle: u64,
    pub payload: Term,
}

/// Callback registered by [`Turn::wrap_external`].
pub(crate) struct ExternalSlot {
    pub actor: ActorId,
    pub facet: FacetId,
    pub callback: ExternalCallback,
}

/// Thread-safe entry point into one facet.
///
/// Invoking after the facet has stopped is harmless: the event is dropped
/// when the driver picks it up.
#[derive(Debug, Clone)]
pub struct ExternalHandle {
    id: u64,
    tx: UnboundedSender<ExternalEvent>,
}

impl ExternalHandle {
    pub(crate) fn new(id: u64, tx: UnboundedSender<ExternalEvent>) -> Self {
        Self { id, tx }
    }

    /// Queue `payload` for the facet. Returns false once the dataspace
    /// itself is gone.
    pub fn invoke(&self, payload: impl Into<Term>) -> bool {
        self.tx
            .send(ExternalEvent {
                handle: self.id,
                payload: payload.into(),
            })
            .is_ok()
    }
}

/// Keeps [`Ground::run`](crate::runtime::Ground::run) waiting for external
/// events while held.
#[derive(Debug)]
pub struct BackgroundTask {
    _tx: UnboundedSender<ExternalEvent>,
}

impl BackgroundTask {
    pub(crate) fn new(tx: UnboundedSender<ExternalEvent>) -> Self {
        Self { _tx: tx }
    }
}

/// The dataspace's end of the channel.
///
/// Only weak senders are kept here, so the channel closes once every
/// handle and background task has been dropped.
pub(crate) struct ExternalChannel {
    rx: UnboundedReceiver<ExternalEvent>,
    weak: Option<WeakUnboundedSender<ExternalEvent>>,
}

impl ExternalChannel {
    pub fn new() -> Self {
        let (_, rx) = mpsc::unbounded_channel();
        Self { rx, weak: None }
    }

    /// A sender for a new handle, reopening the channel if it has closed.
    pub fn sender(&mut self) -> UnboundedSender<ExternalEvent> {
        if let Some(tx) = self.weak.as_ref().and_then(WeakUnboundedSender::upgrade) {
            return tx;
        }
        let (tx, rx) = mpsc::unbounded_channel();
        // Anything still buffered in the old channel stays deliverable.
        let mut old = std::mem::replace(&mut self.rx, rx);
        while let Ok(event) = old.try_recv() {
            let _ = tx.send(event);
        }
        self.weak = Some(tx.downgrade());
        tx
    }

    pub fn try_drain(&mut self) -> Vec<ExternalEvent> {
        let mut events = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        events
    }

    /// Wait for the next event; `None` once no sender is left.
    pub async fn recv(&mut self) -> Option<ExternalEvent> {
        self.rx.recv().await
    }
}
