//! Scan engine
//!
//! Single coordinator for one station screen. It owns the session (phase,
//! debouncer, continuous queue, task ledger) and turns every decode, timer and
//! network completion into a state change plus operator feedback.
//!
//! Network work is split off as jobs so intake never waits on the service:
//!
//! ```text
//! intake(raw) ──► Ignored | Queued | Dispatch(ScanJob)
//!                                        │ run(ctx)  (spawned)
//!                                        ▼
//!                          complete(ScanReport) ──► settle / block / exit
//! ```
//!
//! Every job carries the session generation it was started under; results
//! from an older generation are dropped in [`ScanEngine::complete`].

use crate::api::{BatchSubmitRequest, ProcessApi, ProductDetails};
use crate::cache::ProductDetailCache;
use crate::error::ScanError;
use crate::pipeline::{submit_single, SubmitOutcome};
use crate::queue::{BatchReport, EnqueueOutcome, UploadBatch};
use crate::session::{AfterSettle, Flight, ScanSession, SessionPhase};
use crate::tasks::{run_task_scan, TaskOutcome};
use ptrack_common::config::ScanTimings;
use ptrack_common::events::{EventBus, ExitReason, ScanEvent, ScanFeedback};
use ptrack_common::time::millis_to_duration;
use ptrack_common::{normalize_code, ProcessType, ScanMode};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Shared handles a job needs to talk to the service
pub struct JobContext<A: ?Sized> {
    pub api: Arc<A>,
    pub cache: Arc<ProductDetailCache>,
    pub operator: Arc<str>,
}

impl<A: ?Sized> Clone for JobContext<A> {
    fn clone(&self) -> Self {
        Self {
            api: Arc::clone(&self.api),
            cache: Arc::clone(&self.cache),
            operator: Arc::clone(&self.operator),
        }
    }
}

/// Why a decode had no effect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    NoSession,
    Blank,
    /// A submission or upload is in flight, a cool-down is running or a
    /// notice is open
    Busy,
    /// Same code again inside the debounce window
    Repeat,
}

/// What intake did with one decode
#[derive(Debug)]
pub enum Intake {
    Ignored(IgnoreReason),
    Queued(EnqueueOutcome),
    /// Network work to run; hand the result to [`ScanEngine::complete`]
    Dispatch(ScanJob),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobKind {
    Submit,
    Task,
    Query,
}

/// One in-flight submission, claim/complete or lookup
#[derive(Debug)]
pub struct ScanJob {
    flight: Flight,
    process: ProcessType,
    kind: JobKind,
}

impl ScanJob {
    pub fn code(&self) -> &str {
        &self.flight.code
    }

    pub async fn run<A: ProcessApi + ?Sized>(self, ctx: JobContext<A>) -> ScanReport {
        let code = self.flight.code.as_str();
        let api = ctx.api.as_ref();
        let outcome = match self.kind {
            JobKind::Submit => JobOutcome::Submit(
                submit_single(api, &ctx.cache, code, self.process, &ctx.operator).await,
            ),
            JobKind::Task => JobOutcome::Task(
                run_task_scan(api, &ctx.cache, code, self.process, &ctx.operator).await,
            ),
            JobKind::Query => JobOutcome::Query(ctx.cache.get(api, code).await),
        };
        ScanReport {
            flight: self.flight,
            outcome,
        }
    }
}

/// Result of a job
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Submit(SubmitOutcome),
    Task(TaskOutcome),
    Query(Option<ProductDetails>),
}

/// Result of [`ScanEngine::scan`]
#[derive(Debug, Clone, PartialEq)]
pub enum ScanStep {
    Ignored(IgnoreReason),
    Queued(EnqueueOutcome),
    Applied(JobOutcome),
    /// The session moved on while the job ran
    Stale,
}

/// Finished job, ready to be applied
#[derive(Debug)]
pub struct ScanReport {
    pub flight: Flight,
    pub outcome: JobOutcome,
}

/// One batch upload in flight
#[derive(Debug)]
pub struct UploadJob {
    session_id: Uuid,
    generation: u64,
    process: ProcessType,
    batch: UploadBatch,
}

impl UploadJob {
    pub fn len(&self) -> usize {
        self.batch.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    /// Submit the batch; a failed call counts every code as failed
    pub async fn run<A: ProcessApi + ?Sized>(self, ctx: JobContext<A>) -> UploadReport {
        let request = BatchSubmitRequest {
            product_codes: self.batch.codes().to_vec(),
            process_type: self.process,
            employee_name: ctx.operator.to_string(),
        };

        let results = match ctx.api.batch_submit(&request).await {
            Ok(items) => items.into_iter().map(|item| (item.code, item.success)).collect(),
            Err(e) => {
                warn!(count = request.product_codes.len(), error = %e, "Batch upload failed");
                request
                    .product_codes
                    .iter()
                    .map(|code| (code.clone(), false))
                    .collect()
            }
        };

        UploadReport {
            session_id: self.session_id,
            generation: self.generation,
            batch: self.batch,
            results,
        }
    }
}

/// Finished upload, ready to be applied
#[derive(Debug)]
pub struct UploadReport {
    session_id: Uuid,
    generation: u64,
    batch: UploadBatch,
    results: Vec<(String, bool)>,
}

/// Coordinator for one operator at one station screen
pub struct ScanEngine<A: ?Sized> {
    ctx: JobContext<A>,
    timings: ScanTimings,
    events: EventBus,
    session: Option<ScanSession>,
    generation: u64,
}

impl<A: ProcessApi + ?Sized> ScanEngine<A> {
    /// Create an engine for `operator`; a blank name is refused
    pub fn new(
        api: Arc<A>,
        cache: Arc<ProductDetailCache>,
        operator: &str,
        timings: ScanTimings,
        events: EventBus,
    ) -> Result<Self, ScanError> {
        let operator = operator.trim();
        if operator.is_empty() {
            return Err(ScanError::NoOperator);
        }
        Ok(Self {
            ctx: JobContext {
                api,
                cache,
                operator: Arc::from(operator),
            },
            timings,
            events,
            session: None,
            generation: 0,
        })
    }

    pub fn context(&self) -> JobContext<A> {
        self.ctx.clone()
    }

    pub fn operator(&self) -> &str {
        &self.ctx.operator
    }

    pub fn cache(&self) -> &Arc<ProductDetailCache> {
        &self.ctx.cache
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn timings(&self) -> &ScanTimings {
        &self.timings
    }

    pub fn session(&self) -> Option<&ScanSession> {
        self.session.as_ref()
    }

    /// Open a session for a station and mode, replacing any previous one
    pub fn start_session(&mut self, process: ProcessType, mode: ScanMode) -> Result<Uuid, ScanError> {
        if mode == ScanMode::Continuous && !process.allows_continuous() {
            return Err(ScanError::ContinuousNotAllowed(process));
        }
        if self.session.as_ref().is_some_and(|s| !s.is_closed()) {
            self.stop_session();
        }

        self.generation += 1;
        let session = ScanSession::new(process, mode, self.generation, self.timings.debounce_window());
        let id = session.id();
        info!(
            session_id = %id,
            process = %process,
            mode = %mode,
            generation = self.generation,
            "Scan session started"
        );
        self.session = Some(session);
        self.emit(ScanFeedback::SessionStarted { process, mode });
        Ok(id)
    }

    /// Leave the scan screen; in-flight jobs finish but their results are ignored
    pub fn stop_session(&mut self) -> Option<ExitReason> {
        let session = self.session.as_mut()?;
        if session.is_closed() {
            return None;
        }
        session.close(ExitReason::Stopped);
        info!(session_id = %session.id(), "Scan session stopped");
        self.emit(ScanFeedback::SessionEnded {
            reason: ExitReason::Stopped,
        });
        Some(ExitReason::Stopped)
    }

    /// Classify one raw decode
    ///
    /// While the session is not idle the decode is dropped before the
    /// debouncer sees it, so it leaves no trace at all.
    pub fn intake(&mut self, raw: &str, now: Instant) -> Intake {
        let Some(session) = self.session.as_mut().filter(|s| !s.is_closed()) else {
            return Intake::Ignored(IgnoreReason::NoSession);
        };

        let code = normalize_code(raw);
        if code.is_empty() {
            return Intake::Ignored(IgnoreReason::Blank);
        }
        if !session.is_idle() {
            debug!(code = %code, phase = ?session.phase(), "Decode ignored, session not idle");
            return Intake::Ignored(IgnoreReason::Busy);
        }
        if session.queue().is_uploading() {
            debug!(code = %code, "Decode ignored, upload in flight");
            return Intake::Ignored(IgnoreReason::Busy);
        }
        if !session.debouncer_mut().accept(code, now) {
            debug!(code = %code, "Repeat decode ignored");
            return Intake::Ignored(IgnoreReason::Repeat);
        }

        let process = session.process();
        let kind = match session.mode() {
            ScanMode::Continuous => {
                let outcome = session.queue_mut().enqueue(code);
                self.emit_enqueue(&outcome);
                return Intake::Queued(outcome);
            }
            ScanMode::Query => JobKind::Query,
            ScanMode::Single if process.requires_claim() => JobKind::Task,
            ScanMode::Single => JobKind::Submit,
        };

        let Some(flight) = session.begin(code, now) else {
            return Intake::Ignored(IgnoreReason::Busy);
        };
        debug!(code = %code, kind = ?kind, "Dispatching scan");
        self.emit(ScanFeedback::Recognized {
            code: code.to_string(),
        });
        Intake::Dispatch(ScanJob {
            flight,
            process,
            kind,
        })
    }

    /// Apply a finished job; `false` when the result was stale and dropped
    pub fn complete(&mut self, report: ScanReport, now: Instant) -> bool {
        let Some(session) = self.session.as_ref().filter(|s| s.owns(&report.flight)) else {
            debug!(
                code = %report.flight.code,
                generation = report.flight.generation,
                "Ignoring result of a finished session"
            );
            return false;
        };
        let process = session.process();
        let code = report.flight.code.clone();

        match report.outcome {
            JobOutcome::Submit(outcome) => self.apply_submit(report.flight, process, outcome, now),
            JobOutcome::Task(outcome) => self.apply_task(report.flight, process, outcome, now),
            JobOutcome::Query(details) => {
                let feedback = match details {
                    Some(details) => ScanFeedback::ProductDetails {
                        code,
                        details: details.fields,
                    },
                    None => ScanFeedback::ProductNotFound { code },
                };
                self.emit(feedback);
                self.settle(report.flight, self.timings.query_settle_ms, AfterSettle::Resume, now);
            }
        }
        true
    }

    fn apply_submit(&mut self, flight: Flight, process: ProcessType, outcome: SubmitOutcome, now: Instant) {
        let code = flight.code.clone();
        match outcome {
            SubmitOutcome::Recorded { created } => {
                self.emit(ScanFeedback::Recorded {
                    code,
                    process,
                    created,
                });
                self.settle(
                    flight,
                    self.timings.success_settle_ms,
                    AfterSettle::Exit(ExitReason::Recorded),
                    now,
                );
            }
            SubmitOutcome::DuplicateOwn => {
                self.emit(ScanFeedback::AlreadyRecordedBySelf { code, process });
                self.settle(flight, self.timings.own_duplicate_settle_ms, AfterSettle::Resume, now);
            }
            SubmitOutcome::DuplicateOther { existing_employee } => {
                self.emit(ScanFeedback::DuplicateOther {
                    code,
                    process,
                    existing_employee,
                });
                if let Some(session) = self.session.as_mut() {
                    session.block(flight);
                }
            }
            SubmitOutcome::Failed { reason } => {
                self.emit(ScanFeedback::SubmitFailed { code, reason });
                self.settle(flight, self.timings.failure_settle_ms, AfterSettle::Resume, now);
            }
        }
    }

    fn apply_task(&mut self, flight: Flight, process: ProcessType, outcome: TaskOutcome, now: Instant) {
        let code = flight.code.clone();
        let wall_now = ptrack_common::time::now();
        let operator = Arc::clone(&self.ctx.operator);
        let remaining = self.session.as_mut().and_then(|session| {
            session.tasks_mut().record(&code, &operator, &outcome, wall_now);
            session.tasks().remaining(&code, wall_now)
        });

        match outcome {
            TaskOutcome::Claimed {
                product_model,
                min_work_minutes,
                can_complete_at,
            } => {
                self.emit(ScanFeedback::TaskClaimed {
                    code,
                    product_model,
                    min_work_minutes,
                    can_complete_at,
                });
                self.settle(flight, self.timings.claim_settle_ms, AfterSettle::Resume, now);
            }
            TaskOutcome::Completed {
                product_model,
                duration_minutes,
            } => {
                self.emit(ScanFeedback::TaskCompleted {
                    code,
                    product_model,
                    duration_minutes,
                });
                self.settle(
                    flight,
                    self.timings.success_settle_ms,
                    AfterSettle::Exit(ExitReason::Recorded),
                    now,
                );
            }
            TaskOutcome::TooEarly { detail } => {
                self.emit(ScanFeedback::TaskTooEarly {
                    code,
                    detail,
                    remaining_secs: remaining.map(|r| r.as_secs()),
                });
                self.settle(flight, self.timings.failure_settle_ms, AfterSettle::Resume, now);
            }
            TaskOutcome::ClaimedByOther { detail } => {
                self.emit(ScanFeedback::TaskClaimedByOther { code, detail });
                self.settle(flight, self.timings.failure_settle_ms, AfterSettle::Resume, now);
            }
            TaskOutcome::Bootstrapped(outcome) => self.apply_submit(flight, process, outcome, now),
            TaskOutcome::Failed { reason } => {
                self.emit(ScanFeedback::SubmitFailed { code, reason });
                self.settle(flight, self.timings.failure_settle_ms, AfterSettle::Resume, now);
            }
        }
    }

    fn settle(&mut self, flight: Flight, delay_ms: u64, then: AfterSettle, now: Instant) {
        if let Some(session) = self.session.as_mut() {
            session.settle(flight, millis_to_duration(delay_ms), then, now);
        }
    }

    /// Operator closed the blocking duplicate notice
    pub fn dismiss(&mut self, now: Instant) -> bool {
        let delay = millis_to_duration(self.timings.dismiss_settle_ms);
        self.session
            .as_mut()
            .is_some_and(|session| session.dismiss(delay, now))
    }

    /// Advance elapsed cool-downs; returns the exit reason when the session ends
    pub fn poll(&mut self, now: Instant) -> Option<ExitReason> {
        let reason = self.session.as_mut()?.poll(now)?;
        info!(reason = ?reason, "Scan session finished");
        self.emit(ScanFeedback::SessionEnded { reason });
        Some(reason)
    }

    /// When [`poll`](Self::poll) next has something to do
    pub fn next_deadline(&self) -> Option<Instant> {
        self.session.as_ref().and_then(ScanSession::deadline)
    }

    fn continuous_session(&mut self) -> Result<&mut ScanSession, ScanError> {
        let session = self
            .session
            .as_mut()
            .filter(|s| !s.is_closed())
            .ok_or(ScanError::NoSession)?;
        if session.mode() != ScanMode::Continuous {
            return Err(ScanError::WrongMode {
                expected: ScanMode::Continuous,
                actual: session.mode(),
            });
        }
        Ok(session)
    }

    /// Enqueue manually entered codes, one per line
    ///
    /// Refused while an upload is in flight.
    pub fn enqueue_lines(&mut self, text: &str) -> Result<Vec<EnqueueOutcome>, ScanError> {
        let queue = self.continuous_session()?.queue_mut();
        if queue.is_uploading() {
            return Err(ScanError::UploadInProgress);
        }
        let outcomes = queue.enqueue_lines(text);
        for outcome in &outcomes {
            self.emit_enqueue(outcome);
        }
        Ok(outcomes)
    }

    /// Take the queue for upload
    pub fn begin_upload(&mut self) -> Result<UploadJob, ScanError> {
        let session = self.continuous_session()?;
        if session.queue().is_uploading() || !matches!(session.phase(), SessionPhase::Idle) {
            return Err(ScanError::UploadInProgress);
        }

        let session_id = session.id();
        let generation = session.generation();
        let process = session.process();
        let Some(batch) = session.queue_mut().begin_upload() else {
            self.emit(ScanFeedback::NothingToUpload);
            return Err(ScanError::NothingToUpload);
        };

        info!(count = batch.len(), process = %process, "Uploading queued codes");
        self.emit(ScanFeedback::UploadStarted { count: batch.len() });
        Ok(UploadJob {
            session_id,
            generation,
            process,
            batch,
        })
    }

    /// Apply a finished upload; `None` when the session has moved on
    pub fn finish_upload(&mut self, report: UploadReport, now: Instant) -> Option<BatchReport> {
        let Some(session) = self
            .session
            .as_mut()
            .filter(|s| s.id() == report.session_id && s.generation() == report.generation)
            .filter(|s| !s.is_closed())
        else {
            debug!(generation = report.generation, "Ignoring upload result of a finished session");
            return None;
        };

        let batch_report = session.queue_mut().finish_upload(report.batch, &report.results);
        session.schedule(
            millis_to_duration(self.timings.batch_exit_ms),
            AfterSettle::Exit(ExitReason::BatchUploaded),
            now,
        );

        info!(
            succeeded = batch_report.succeeded(),
            failed = batch_report.failed(),
            "Batch upload finished"
        );
        self.emit(ScanFeedback::BatchUploaded {
            succeeded: batch_report.succeeded(),
            failed: batch_report.failed(),
            lines: batch_report.lines.clone(),
        });
        Some(batch_report)
    }

    /// Intake a decode and, if it dispatches, run and apply the job inline
    ///
    /// Decodes cannot overlap a job here; for callers driving one scan at a
    /// time.
    pub async fn scan(&mut self, raw: &str, now: Instant) -> ScanStep {
        match self.intake(raw, now) {
            Intake::Ignored(reason) => ScanStep::Ignored(reason),
            Intake::Queued(outcome) => ScanStep::Queued(outcome),
            Intake::Dispatch(job) => {
                let report = job.run(self.context()).await;
                let outcome = report.outcome.clone();
                if self.complete(report, now) {
                    ScanStep::Applied(outcome)
                } else {
                    ScanStep::Stale
                }
            }
        }
    }

    /// Upload the queue and apply the result inline
    pub async fn upload(&mut self, now: Instant) -> Result<BatchReport, ScanError> {
        let job = self.begin_upload()?;
        let report = job.run(self.context()).await;
        self.finish_upload(report, now).ok_or(ScanError::NoSession)
    }

    fn emit_enqueue(&self, outcome: &EnqueueOutcome) {
        match outcome {
            EnqueueOutcome::Added { code, position } => self.emit(ScanFeedback::Queued {
                code: code.clone(),
                position: *position,
            }),
            EnqueueOutcome::AlreadyQueued { code } => {
                self.emit(ScanFeedback::AlreadyQueued { code: code.clone() })
            }
            EnqueueOutcome::Invalid => {}
        }
    }

    fn emit(&self, feedback: ScanFeedback) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        self.events.emit_lossy(ScanEvent {
            session_id: session.id(),
            timestamp: ptrack_common::time::now(),
            feedback,
        });
    }
}
