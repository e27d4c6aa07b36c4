use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use super::{Model, ObjectId};
use crate::error::{FlightError, Rejection};

type Listener = Box<dyn FnOnce() + Send>;

#[derive(Debug, Clone)]
pub enum ThenableStatus {
    Pending,
    Fulfilled(Model),
    Rejected(Rejection),
}

impl ThenableStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

struct ThenableState {
    status: ThenableStatus,
    listeners: Vec<Listener>,
}

struct ThenableInner {
    id: ObjectId,
    state: Mutex<ThenableState>,
}

/// A value that settles at most once, either fulfilled or rejected.
///
/// Listeners run on the thread that settles the thenable, after the internal
/// lock has been released.
#[derive(Clone)]
pub struct Thenable(Arc<ThenableInner>);

impl Thenable {
    fn with_status(status: ThenableStatus) -> Self {
        Self(Arc::new(ThenableInner {
            id: ObjectId::next(),
            state: Mutex::new(ThenableState { status, listeners: Vec::new() }),
        }))
    }

    pub fn pending() -> Self {
        Self::with_status(ThenableStatus::Pending)
    }

    pub fn fulfilled(value: impl Into<Model>) -> Self {
        Self::with_status(ThenableStatus::Fulfilled(value.into()))
    }

    pub fn rejected(reason: impl Into<Rejection>) -> Self {
        Self::with_status(ThenableStatus::Rejected(reason.into()))
    }

    /// Settles from a future running on the current tokio runtime.
    pub fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = Result<Model, Rejection>> + Send + 'static,
    {
        let thenable = Self::pending();
        let settle = thenable.clone();
        tokio::spawn(async move {
            match future.await {
                Ok(value) => settle.resolve(value),
                Err(reason) => settle.reject(reason),
            }
        });
        thenable
    }

    pub fn id(&self) -> ObjectId {
        self.0.id
    }

    pub fn status(&self) -> ThenableStatus {
        self.0.state.lock().status.clone()
    }

    pub fn is_pending(&self) -> bool {
        self.0.state.lock().status.is_pending()
    }

    /// Fulfils the thenable. Returns false if it had already settled.
    pub fn resolve(&self, value: impl Into<Model>) -> bool {
        self.settle(ThenableStatus::Fulfilled(value.into()))
    }

    /// Rejects the thenable. Returns false if it had already settled.
    pub fn reject(&self, reason: impl Into<Rejection>) -> bool {
        self.settle(ThenableStatus::Rejected(reason.into()))
    }

    fn settle(&self, status: ThenableStatus) -> bool {
        let listeners = {
            let mut state = self.0.state.lock();
            if !state.status.is_pending() {
                return false;
            }
            state.status = status;
            std::mem::take(&mut state.listeners)
        };
        for listener in listeners {
            listener();
        }
        true
    }

    /// Runs `listener` once the thenable settles, or right away if it already has.
    pub(crate) fn subscribe(&self, listener: impl FnOnce() + Send + 'static) {
        {
            let mut state = self.0.state.lock();
            if state.status.is_pending() {
                state.listeners.push(Box::new(listener));
                return;
            }
        }
        listener();
    }

    /// Reads a settled value, turning a rejection or a pending state into an interrupt.
    pub fn read(&self) -> crate::error::Step<Model> {
        match self.status() {
            ThenableStatus::Fulfilled(value) => Ok(value),
            ThenableStatus::Rejected(reason) => Err(reason.into()),
            ThenableStatus::Pending => Err(crate::error::Interrupt::Suspend(self.clone())),
        }
    }
}

impl fmt::Debug for Thenable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thenable").field("id", &self.id()).field("status", &self.status()).finish()
    }
}

impl From<Result<Model, FlightError>> for Thenable {
    fn from(result: Result<Model, FlightError>) -> Self {
        match result {
            Ok(value) => Self::fulfilled(value),
            Err(error) => Self::rejected(error),
        }
    }
}
