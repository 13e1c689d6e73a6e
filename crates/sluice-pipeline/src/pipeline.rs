use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use sluice_flight::{AbortCoordinator, AbortReason, PartEvent, PartEvents, QueueReport, SingleFlightQueue};
use sluice_quota::{QuotaDecision, QuotaGuard};
use sluice_store::BackendConnector;
use sluice_types::{ContentPath, FileDescriptor, UploadRequest};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::alert::{Alert, AlertSink};
use crate::config::IngestConfig;
use crate::context::RequestContext;
use crate::error::StreamError;
use crate::outcome::{FailureKind, UploadOutcome};
use crate::push::PushClient;
use crate::verify::Verifier;

/// Drives one upload from quota check to verified outcome.
///
/// Stateless between requests: every call builds its own abort coordinator,
/// queue, and backend handles. A single pipeline can serve any number of
/// concurrent requests.
#[derive(Clone)]
pub struct UploadPipeline {
    config: IngestConfig,
    connector: Arc<dyn BackendConnector>,
    alerts: Arc<dyn AlertSink>,
    guard: QuotaGuard,
    push: PushClient,
    verifier: Verifier,
}

/// A run that ended in failure, before it is reported.
struct Rejection {
    kind: FailureKind,
    message: String,
    origin: String,
    /// Alert context; only read for kinds that alert.
    context: String,
    code: String,
}

impl Rejection {
    fn new(kind: FailureKind, message: impl Into<String>, origin: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            origin: origin.into(),
            context: kind.to_string(),
            code: "N/A".into(),
        }
    }

    fn alerting(mut self, context: impl Into<String>, code: impl Into<String>) -> Self {
        self.context = context.into();
        self.code = code.into();
        self
    }

    fn aborted(abort: &AbortCoordinator, origin: impl Into<String>) -> Self {
        let reason = abort
            .reason()
            .map(|r| r.to_string())
            .unwrap_or_else(|| "no reason recorded".into());
        Self::new(FailureKind::Aborted, format!("upload aborted: {reason}"), origin)
    }

    fn stream(error: StreamError, label: &str, origin: String, abort: &AbortCoordinator) -> Self {
        if error.is_abort() {
            return Self::aborted(abort, origin);
        }
        let context = format!("{origin} : {label}");
        let code = error.code();
        Self::new(FailureKind::StreamFailure, error.to_string(), origin).alerting(context, code)
    }
}

impl UploadPipeline {
    pub fn new(
        config: IngestConfig,
        connector: Arc<dyn BackendConnector>,
        alerts: Arc<dyn AlertSink>,
    ) -> Self {
        Self {
            guard: QuotaGuard::new(config.quota()),
            push: PushClient::from_config(&config),
            verifier: Verifier::new(Arc::clone(&connector)),
            config,
            connector,
            alerts,
        }
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Run an upload to completion.
    pub async fn run(&self, request: &UploadRequest, parts: PartEvents) -> UploadOutcome {
        self.run_with_abort(request, parts, AbortCoordinator::new()).await
    }

    /// Run an upload under a caller-held abort coordinator.
    ///
    /// Tripping `abort` at any point before verification succeeds yields
    /// [`FailureKind::Aborted`]. Once the outcome is a success the
    /// coordinator is completed and later aborts are no-ops.
    pub async fn run_with_abort(
        &self,
        request: &UploadRequest,
        parts: PartEvents,
        abort: AbortCoordinator,
    ) -> UploadOutcome {
        match self.execute(request, parts, &abort).await {
            Ok((descriptor, content)) => UploadOutcome::Success { descriptor, content },
            Err(rejection) => self.report(request, rejection),
        }
    }

    async fn execute(
        &self,
        request: &UploadRequest,
        parts: PartEvents,
        abort: &AbortCoordinator,
    ) -> Result<(FileDescriptor, ContentPath), Rejection> {
        let principal = request.principal();
        let user = principal.username.as_str();
        let declared = request.declared_size();
        info!(user = %principal, bucket = %request.bucket(), declared, "upload accepted");

        if let QuotaDecision::Deny(denial) = self.guard.check_declared(declared) {
            debug!(user = %principal, "refused before connecting");
            return Err(Rejection::new(FailureKind::QuotaExceeded(denial), denial.to_string(), user));
        }

        let connected = tokio::select! {
            biased;
            _ = abort.tripped() => return Err(Rejection::aborted(abort, user)),
            connected = self.connector.connect(principal, request.bucket()) => connected,
        };
        let backend = match connected {
            Ok(Some(backend)) => backend,
            Ok(None) => {
                return Err(Rejection::new(FailureKind::NoBackend, format!("No buckets for {user}."), user));
            }
            Err(e) => {
                warn!(user = %principal, bucket = %request.bucket(), error = %e, "backend connect failed");
                return Err(Rejection::new(FailureKind::NoBackend, format!("No buckets for {user}."), user));
            }
        };

        let checked = tokio::select! {
            biased;
            _ = abort.tripped() => return Err(Rejection::aborted(abort, user)),
            checked = self.guard.evaluate(backend.as_ref(), request.bucket(), declared) => checked,
        };
        match checked {
            Ok(check) => {
                if let QuotaDecision::Deny(denial) = check.decision {
                    return Err(Rejection::new(FailureKind::QuotaExceeded(denial), denial.to_string(), user));
                }
            }
            Err(e) => return Err(Rejection::new(FailureKind::QuotaCheckFailed, e.to_string(), user)),
        }

        let context = RequestContext::new(request.clone(), backend, self.push.clone(), abort.clone());
        let report = self.stream_phase(context, parts, abort).await;
        let origin = report.context.origin();

        if let Some(failure) = report.failure {
            return Err(Rejection::stream(failure.error, &failure.label, origin, abort));
        }
        if abort.is_tripped() {
            return Err(Rejection::aborted(abort, origin));
        }
        let Some(completion) = report.context.into_completion() else {
            // Event stream ended with neither a finish nor an error.
            return Err(Rejection::stream(StreamError::MissingContentPath, "stream-finished", origin, abort));
        };

        let verified = tokio::select! {
            biased;
            _ = abort.tripped() => return Err(Rejection::aborted(abort, origin)),
            verified = self.verifier.verify(principal, request.bucket(), &completion.path) => verified,
        };
        let metadata = match verified {
            Ok(metadata) => metadata,
            Err(e) if e.is_reconnect() => {
                return Err(Rejection::new(FailureKind::RefreshFailed, e.to_string(), origin));
            }
            Err(e) => {
                let code = e.code();
                return Err(Rejection::new(FailureKind::VerifyFailure, e.to_string(), origin).alerting("verify", code));
            }
        };
        if !abort.complete() {
            return Err(Rejection::aborted(abort, origin));
        }

        let descriptor = completion.descriptor.with_verified_size(metadata.size_bytes);
        info!(origin = %origin, path = %completion.path, size = descriptor.size, "upload succeeded");
        Ok((descriptor, completion.path))
    }

    /// Turn a rejection into the failure outcome, alerting when its kind
    /// calls for it.
    fn report(&self, request: &UploadRequest, rejection: Rejection) -> UploadOutcome {
        let Rejection {
            kind,
            message,
            origin,
            context,
            code,
        } = rejection;
        if kind.alerts() {
            error!(origin = %origin, kind = %kind, error = %message, "upload failed");
            let user = request.principal().username.as_str();
            self.alerts
                .notify(&Alert::new(context, user, message.as_str(), code, origin.as_str()));
        } else {
            warn!(origin = %origin, kind = %kind, reason = %message, "upload refused");
        }
        UploadOutcome::failure(kind, message, origin)
    }

    /// Feed part events through a single-flight queue until the stream ends,
    /// a handler fails, or the request is aborted.
    async fn stream_phase(
        &self,
        context: RequestContext,
        mut parts: PartEvents,
        abort: &AbortCoordinator,
    ) -> QueueReport<RequestContext, StreamError> {
        let (queue, worker) = SingleFlightQueue::new(context, abort.clone());
        let done = CancellationToken::new();

        let producer = async move {
            loop {
                let event = tokio::select! {
                    biased;
                    _ = abort.tripped() => {
                        debug!("abort tripped, detaching inbound stream");
                        break;
                    }
                    event = parts.next() => event,
                };
                let Some(event) = event else { break };
                let label = event.label();
                let terminal = !matches!(event, PartEvent::Started(_));
                let queued = match event {
                    PartEvent::Started(part) => {
                        queue.enqueue(label, move |ctx: &mut RequestContext| Box::pin(ctx.on_part(part)))
                    }
                    PartEvent::Finished => {
                        queue.enqueue(label, |ctx: &mut RequestContext| Box::pin(ctx.on_finish()))
                    }
                    PartEvent::Errored(error) => {
                        queue.enqueue(label, move |ctx: &mut RequestContext| Box::pin(ctx.on_error(error)))
                    }
                };
                if let Err(e) = queued {
                    debug!(event = label, error = %e, "event dropped");
                    break;
                }
                if terminal {
                    break;
                }
            }
            // Dropping the stream here disconnects the inbound source.
            drop(parts);
            drop(queue);
        };

        let worker = async {
            let report = worker.run().await;
            done.cancel();
            report
        };

        let deadline = watchdog(self.config.stream_timeout(), abort, &done);

        let ((), report, ()) = tokio::join!(producer, worker, deadline);
        debug!(executed = report.executed, skipped = report.skipped, "stream phase drained");
        report
    }
}

/// Trips `abort` with [`AbortReason::Timeout`] if the stream phase outlives
/// `limit`. Returns as soon as `done` is cancelled.
async fn watchdog(limit: Option<Duration>, abort: &AbortCoordinator, done: &CancellationToken) {
    let Some(limit) = limit else { return };
    tokio::select! {
        _ = done.cancelled() => {}
        _ = tokio::time::sleep(limit) => {
            abort.abort(AbortReason::Timeout(limit));
        }
    }
}
