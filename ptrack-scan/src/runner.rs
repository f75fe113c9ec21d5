//! Session event loop
//!
//! Feeds operator input, job completions and cool-down timers into the
//! [`ScanEngine`] one at a time. Jobs run on a [`JoinSet`] so decodes keep
//! flowing (and keep being dropped) while a submission is in flight.
//!
//! On exit the remaining jobs are detached, not aborted: a request already on
//! the wire may still land on the service, and its result is discarded.

use crate::api::ProcessApi;
use crate::engine::{Intake, ScanEngine, ScanReport, UploadReport};
use ptrack_common::events::ExitReason;
use std::future::pending;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Input from the operator side of a scan screen
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorInput {
    /// Raw text from the decoder
    Decode(String),
    /// Manually entered codes, one per line (continuous mode)
    Lines(String),
    /// Upload the continuous queue
    Upload,
    /// Close the blocking duplicate notice
    Dismiss,
    /// Leave the scan screen
    Stop,
}

enum JobResult {
    Scan(ScanReport),
    Upload(UploadReport),
}

/// Drive the engine's current session until it ends
///
/// Returns why the session ended. A closed input channel or a cancelled
/// token stops the session.
pub async fn run_session<A>(
    engine: &mut ScanEngine<A>,
    mut input: mpsc::Receiver<OperatorInput>,
    cancel_token: CancellationToken,
) -> ExitReason
where
    A: ProcessApi + ?Sized + 'static,
{
    let mut jobs: JoinSet<JobResult> = JoinSet::new();

    let reason = loop {
        let deadline = engine.next_deadline();
        let settle_timer = async move {
            match deadline {
                Some(at) => sleep_until(at).await,
                None => pending::<()>().await,
            }
        };

        tokio::select! {
            _ = cancel_token.cancelled() => {
                info!("Scan session cancelled");
                engine.stop_session();
                break ExitReason::Stopped;
            }

            Some(joined) = jobs.join_next() => {
                match joined {
                    Ok(JobResult::Scan(report)) => {
                        engine.complete(report, Instant::now());
                    }
                    Ok(JobResult::Upload(report)) => {
                        engine.finish_upload(report, Instant::now());
                    }
                    Err(e) => warn!(error = %e, "Scan job did not finish"),
                }
            }

            _ = settle_timer => {
                if let Some(reason) = engine.poll(Instant::now()) {
                    break reason;
                }
            }

            received = input.recv() => {
                let Some(event) = received else {
                    debug!("Operator input closed");
                    engine.stop_session();
                    break ExitReason::Stopped;
                };
                if let Some(reason) = handle_input(engine, &mut jobs, event) {
                    break reason;
                }
            }
        }
    };

    if !jobs.is_empty() {
        debug!(pending = jobs.len(), "Detaching in-flight jobs");
        jobs.detach_all();
    }
    reason
}

fn handle_input<A>(
    engine: &mut ScanEngine<A>,
    jobs: &mut JoinSet<JobResult>,
    event: OperatorInput,
) -> Option<ExitReason>
where
    A: ProcessApi + ?Sized + 'static,
{
    let now = Instant::now();
    match event {
        OperatorInput::Decode(raw) => {
            if let Intake::Dispatch(job) = engine.intake(&raw, now) {
                let ctx = engine.context();
                jobs.spawn(async move { JobResult::Scan(job.run(ctx).await) });
            }
        }
        OperatorInput::Lines(text) => {
            if let Err(e) = engine.enqueue_lines(&text) {
                warn!(error = %e, "Manual entry refused");
            }
        }
        OperatorInput::Upload => match engine.begin_upload() {
            Ok(job) => {
                let ctx = engine.context();
                jobs.spawn(async move { JobResult::Upload(job.run(ctx).await) });
            }
            Err(e) => debug!(error = %e, "Upload not started"),
        },
        OperatorInput::Dismiss => {
            engine.dismiss(now);
        }
        OperatorInput::Stop => {
            engine.stop_session();
            return Some(ExitReason::Stopped);
        }
    }
    None
}
