use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Why a request was aborted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AbortReason {
    /// A queued handler returned an error.
    TaskFailed { task: String, message: String },
    /// The caller cancelled the request.
    Cancelled,
    /// The configured stream deadline passed.
    Timeout(Duration),
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TaskFailed { task, message } => write!(f, "task '{task}' failed: {message}"),
            Self::Cancelled => write!(f, "cancelled by caller"),
            Self::Timeout(after) => write!(f, "timed out after {after:?}"),
        }
    }
}

/// Lifecycle of a request's abort coordinator.
///
/// `Running -> Aborting -> Aborted`, or `Running -> Completed`. Both
/// `Aborted` and `Completed` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AbortState {
    Running,
    Aborting,
    Aborted,
    Completed,
}

type Observer = Box<dyn FnOnce(&AbortReason) + Send>;

struct Control {
    state: AbortState,
    reason: Option<AbortReason>,
    observers: Vec<Observer>,
}

struct Inner {
    control: Mutex<Control>,
    token: CancellationToken,
}

/// Single cancellation signal for one upload request.
///
/// Cloning shares the signal. Tripping it is terminal: there is no reset.
/// Suspendable operations select on [`token`](Self::token) or
/// [`tripped`](Self::tripped) to stop at their next await point. Callbacks
/// registered via [`on_abort`](Self::on_abort) run at most once.
#[derive(Clone)]
pub struct AbortCoordinator {
    inner: Arc<Inner>,
}

impl AbortCoordinator {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                control: Mutex::new(Control {
                    state: AbortState::Running,
                    reason: None,
                    observers: Vec::new(),
                }),
                token: CancellationToken::new(),
            }),
        }
    }

    /// Trip the signal. Returns `true` only for the call that did so.
    ///
    /// A no-op once the coordinator is aborting, aborted, or completed.
    pub fn abort(&self, reason: AbortReason) -> bool {
        let observers = {
            let mut control = self.inner.control.lock().expect("abort lock poisoned");
            if control.state != AbortState::Running {
                debug!(state = ?control.state, reason = %reason, "abort ignored");
                return false;
            }
            control.state = AbortState::Aborting;
            control.reason = Some(reason.clone());
            std::mem::take(&mut control.observers)
        };

        warn!(reason = %reason, observers = observers.len(), "request aborting");
        self.inner.token.cancel();
        for observer in observers {
            observer(&reason);
        }

        self.inner.control.lock().expect("abort lock poisoned").state = AbortState::Aborted;
        true
    }

    /// Mark the request as successfully completed.
    ///
    /// Only valid from `Running`; returns `false` otherwise. After this,
    /// [`abort`](Self::abort) does nothing.
    pub fn complete(&self) -> bool {
        let mut control = self.inner.control.lock().expect("abort lock poisoned");
        if control.state != AbortState::Running {
            return false;
        }
        control.state = AbortState::Completed;
        control.observers.clear();
        true
    }

    /// Register an observer for the abort signal.
    ///
    /// If the signal has already tripped the observer runs immediately. If the
    /// request completed it is dropped without running.
    pub fn on_abort<F>(&self, observer: F)
    where
        F: FnOnce(&AbortReason) + Send + 'static,
    {
        let mut control = self.inner.control.lock().expect("abort lock poisoned");
        let state = control.state;
        match state {
            AbortState::Running => control.observers.push(Box::new(observer)),
            AbortState::Aborting | AbortState::Aborted => {
                let reason = control.reason.clone();
                drop(control);
                if let Some(reason) = reason {
                    observer(&reason);
                }
            }
            AbortState::Completed => {}
        }
    }

    /// Returns `true` once the signal has tripped.
    pub fn is_tripped(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> AbortState {
        self.inner.control.lock().expect("abort lock poisoned").state
    }

    /// The reason passed to the tripping call, if any.
    pub fn reason(&self) -> Option<AbortReason> {
        self.inner.control.lock().expect("abort lock poisoned").reason.clone()
    }

    /// Token for `select!`-ing suspendable work against the signal.
    pub fn token(&self) -> CancellationToken {
        self.inner.token.clone()
    }

    /// Resolves once the signal trips. Never resolves after completion.
    pub async fn tripped(&self) {
        self.inner.token.cancelled().await
    }
}

impl Default for AbortCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AbortCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AbortCoordinator")
            .field("state", &self.state())
            .finish()
    }
}
