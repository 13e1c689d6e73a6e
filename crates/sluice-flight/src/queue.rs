use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::abort::{AbortCoordinator, AbortReason};
use crate::error::{FlightError, FlightResult};

/// Future returned by a queued task; borrows the request context.
pub type TaskFuture<'a, E> = Pin<Box<dyn Future<Output = Result<(), E>> + Send + 'a>>;

type Task<C, E> = Box<dyn for<'a> FnOnce(&'a mut C) -> TaskFuture<'a, E> + Send>;

struct Job<C, E> {
    seq: u64,
    label: String,
    task: Task<C, E>,
}

#[derive(Default)]
struct QueueShared {
    paused: AtomicBool,
    failed_task: Mutex<Option<String>>,
    submitted: AtomicU64,
}

/// The first task failure recorded by a queue.
#[derive(Debug)]
pub struct QueueFailure<E> {
    /// Label the failing task was enqueued with.
    pub label: String,
    pub error: E,
}

/// What a queue worker hands back once every handle is dropped.
#[derive(Debug)]
pub struct QueueReport<C, E> {
    /// The request context, after the last task that ran.
    pub context: C,
    /// The failure that paused the queue, if any.
    pub failure: Option<QueueFailure<E>>,
    /// Tasks that ran to completion.
    pub executed: u64,
    /// Tasks that were accepted but never ran because the queue was paused.
    pub skipped: u64,
}

/// Producer side of a per-request single-flight queue.
///
/// Tasks run one at a time, in submission order, each with exclusive access
/// to the request context `C`. The first task to fail pauses the queue for
/// good: later tasks are skipped, new submissions are refused, and the
/// request's [`AbortCoordinator`] is tripped.
///
/// The queue is a pair: this handle enqueues, the [`QueueWorker`] executes.
/// The worker finishes once every handle is dropped and the backlog drained.
pub struct SingleFlightQueue<C, E> {
    tx: mpsc::UnboundedSender<Job<C, E>>,
    shared: Arc<QueueShared>,
}

impl<C, E> SingleFlightQueue<C, E>
where
    C: Send,
    E: fmt::Display + Send,
{
    /// Create a queue over `context`, wired to `abort`.
    pub fn new(context: C, abort: AbortCoordinator) -> (Self, QueueWorker<C, E>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(QueueShared::default());
        let worker = QueueWorker {
            rx,
            context,
            abort,
            shared: Arc::clone(&shared),
        };
        (Self { tx, shared }, worker)
    }

    /// Schedule `task` behind everything already submitted.
    pub fn enqueue<F>(&self, label: impl Into<String>, task: F) -> FlightResult<()>
    where
        F: for<'a> FnOnce(&'a mut C) -> TaskFuture<'a, E> + Send + 'static,
    {
        let label = label.into();
        if self.shared.paused.load(Ordering::SeqCst) {
            let failed = self
                .shared
                .failed_task
                .lock()
                .expect("queue lock poisoned")
                .clone()
                .unwrap_or_default();
            debug!(task = %label, failed = %failed, "enqueue refused");
            return Err(FlightError::Paused(failed));
        }
        let seq = self.shared.submitted.fetch_add(1, Ordering::SeqCst);
        self.tx
            .send(Job {
                seq,
                label,
                task: Box::new(task),
            })
            .map_err(|_| FlightError::Closed)
    }

    /// Returns `true` once a task has failed.
    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::SeqCst)
    }

    /// Number of tasks accepted so far.
    pub fn submitted(&self) -> u64 {
        self.shared.submitted.load(Ordering::SeqCst)
    }
}

impl<C, E> Clone for SingleFlightQueue<C, E> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Consumer side of a [`SingleFlightQueue`].
pub struct QueueWorker<C, E> {
    rx: mpsc::UnboundedReceiver<Job<C, E>>,
    context: C,
    abort: AbortCoordinator,
    shared: Arc<QueueShared>,
}

impl<C, E> QueueWorker<C, E>
where
    C: Send,
    E: fmt::Display + Send,
{
    /// Execute tasks until every queue handle is dropped.
    ///
    /// Runs on the caller's task; nothing is spawned. Tasks never overlap
    /// because each one is awaited to completion before the next is received.
    pub async fn run(mut self) -> QueueReport<C, E> {
        let mut failure: Option<QueueFailure<E>> = None;
        let mut executed = 0;
        let mut skipped = 0;

        while let Some(job) = self.rx.recv().await {
            if failure.is_some() {
                skipped += 1;
                debug!(seq = job.seq, task = %job.label, "task skipped, queue paused");
                continue;
            }

            debug!(seq = job.seq, task = %job.label, "task started");
            match (job.task)(&mut self.context).await {
                Ok(()) => {
                    executed += 1;
                    debug!(seq = job.seq, task = %job.label, "task finished");
                }
                Err(error) => {
                    warn!(seq = job.seq, task = %job.label, error = %error, "task failed, pausing queue");
                    self.shared.paused.store(true, Ordering::SeqCst);
                    *self.shared.failed_task.lock().expect("queue lock poisoned") =
                        Some(job.label.clone());
                    // Buffered jobs are still drained (and skipped) below.
                    self.rx.close();
                    self.abort.abort(AbortReason::TaskFailed {
                        task: job.label.clone(),
                        message: error.to_string(),
                    });
                    failure = Some(QueueFailure {
                        label: job.label,
                        error,
                    });
                }
            }
        }

        QueueReport {
            context: self.context,
            failure,
            executed,
            skipped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::abort::AbortState;

    #[derive(Default)]
    struct Trace {
        entries: Vec<String>,
        active: bool,
        overlaps: u32,
    }

    impl Trace {
        async fn step(&mut self, name: &str, pause: Duration) {
            if self.active {
                self.overlaps += 1;
            }
            self.active = true;
            self.entries.push(format!("enter {name}"));
            tokio::time::sleep(pause).await;
            self.entries.push(format!("exit {name}"));
            self.active = false;
        }
    }

    type TestQueue = SingleFlightQueue<Trace, String>;

    fn ok_task(
        name: &'static str,
        pause_ms: u64,
    ) -> impl for<'a> FnOnce(&'a mut Trace) -> TaskFuture<'a, String> + Send + 'static {
        move |trace| {
            Box::pin(async move {
                trace.step(name, Duration::from_millis(pause_ms)).await;
                Ok::<(), String>(())
            })
        }
    }

    #[tokio::test]
    async fn runs_in_submission_order_without_overlap() {
        let (queue, worker): (TestQueue, _) =
            SingleFlightQueue::new(Trace::default(), AbortCoordinator::new());

        // Submit from several producers; the slow first task must still
        // finish before the second begins.
        let producers = async move {
            queue.enqueue("a", ok_task("a", 20)).unwrap();
            let q2 = queue.clone();
            tokio::task::yield_now().await;
            q2.enqueue("b", ok_task("b", 1)).unwrap();
            queue.enqueue("c", ok_task("c", 5)).unwrap();
        };

        let ((), report) = tokio::join!(producers, worker.run());
        assert!(report.failure.is_none());
        assert_eq!(report.executed, 3);
        assert_eq!(report.context.overlaps, 0);
        assert_eq!(
            report.context.entries,
            vec!["enter a", "exit a", "enter b", "exit b", "enter c", "exit c"]
        );
    }

    #[tokio::test]
    async fn first_failure_pauses_and_aborts() {
        let abort = AbortCoordinator::new();
        let (queue, worker): (TestQueue, _) =
            SingleFlightQueue::new(Trace::default(), abort.clone());

        queue.enqueue("started", ok_task("started", 1)).unwrap();
        queue
            .enqueue("errored", |_trace| Box::pin(async { Err::<(), _>("parse error".to_string()) }))
            .unwrap();
        queue.enqueue("finished", ok_task("finished", 1)).unwrap();

        let probe = queue.clone();
        drop(queue);
        let report = worker.run().await;

        let failure = report.failure.expect("failure recorded");
        assert_eq!(failure.label, "errored");
        assert_eq!(failure.error, "parse error");
        assert_eq!(report.executed, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.context.entries, vec!["enter started", "exit started"]);

        assert_eq!(abort.state(), AbortState::Aborted);
        assert!(probe.is_paused());
        assert_eq!(
            probe.enqueue("late", ok_task("late", 1)),
            Err(FlightError::Paused("errored".into()))
        );
    }

    #[tokio::test]
    async fn late_finish_never_runs_after_failure() {
        let abort = AbortCoordinator::new();
        let (queue, worker): (TestQueue, _) =
            SingleFlightQueue::new(Trace::default(), abort.clone());

        let producer = async move {
            queue
                .enqueue("started", |_t| {
                    Box::pin(async {
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        Err::<(), _>("backend reset".to_string())
                    })
                })
                .unwrap();
            // Arrives while the failing task is still running.
            tokio::time::sleep(Duration::from_millis(2)).await;
            queue.enqueue("finished", ok_task("finished", 1)).unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
            queue.enqueue("after", ok_task("after", 1))
        };

        let (late, report) = tokio::join!(producer, worker.run());
        assert!(late.is_err());
        assert_eq!(report.executed, 0);
        assert!(report.context.entries.is_empty());
        assert!(abort.is_tripped());
    }

    #[tokio::test]
    async fn empty_queue_reports_nothing() {
        let (queue, worker): (TestQueue, _) =
            SingleFlightQueue::new(Trace::default(), AbortCoordinator::new());
        assert_eq!(queue.submitted(), 0);
        drop(queue);
        let report = worker.run().await;
        assert_eq!(report.executed, 0);
        assert_eq!(report.skipped, 0);
        assert!(report.failure.is_none());
    }

    #[tokio::test]
    async fn enqueue_after_worker_gone_is_closed() {
        let (queue, worker): (TestQueue, _) =
            SingleFlightQueue::new(Trace::default(), AbortCoordinator::new());
        drop(worker);
        assert_eq!(queue.enqueue("x", ok_task("x", 1)), Err(FlightError::Closed));
    }
}
