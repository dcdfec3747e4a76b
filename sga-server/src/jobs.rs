//! The scheduler's worker pool.
//!
//! A poll loop claims due jobs from the durable queue and runs each body on
//! its own task, bounded by a semaphore. Workers hold no state worth
//! preserving: correctness comes from idempotent job bodies and
//! deterministic job ids, so any number of processes may run this loop
//! against the same queue.

use crate::{AppState, settlement};
use sga_core::ports::AuctionStore;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::Semaphore;
use tracing::{Instrument as _, Level, event, span};

/// How often the pool polls for due jobs.
const POLL_INTERVAL: Duration = Duration::from_millis(250);
/// How long a claim hides a job from other workers.
const VISIBILITY: time::Duration = time::Duration::seconds(60);

/// Spawn the worker pool; runs for the process lifetime.
pub fn spawn_workers<T: AuctionStore>(state: AppState<T>) -> tokio::task::JoinHandle<()> {
    let concurrency = state.config.worker_concurrency.max(1);
    tokio::spawn(async move {
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let mut interval = tokio::time::interval(POLL_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            interval.tick().await;

            let free = semaphore.available_permits();
            if free == 0 {
                continue;
            }

            let now = OffsetDateTime::now_utc();
            let jobs = match state.store.claim_due_jobs(now, free, VISIBILITY).await {
                Ok(jobs) => jobs,
                Err(error) => {
                    event!(Level::ERROR, %error, "failed to claim due jobs");
                    continue;
                }
            };

            for job in jobs {
                let permit = semaphore
                    .clone()
                    .acquire_owned()
                    .await
                    .expect("semaphore is never closed");
                let state = state.clone();
                tokio::spawn(async move {
                    let job_span = span!(
                        Level::INFO,
                        "scheduled job",
                        id = %job.job_id,
                        attempt = job.attempts
                    );
                    async {
                        match settlement::execute_job(&state, &job).await {
                            Ok(()) => {
                                if let Err(error) = state.store.complete_job(&job.job_id).await {
                                    event!(Level::ERROR, %error, "failed to complete job");
                                }
                            }
                            Err(error) => {
                                event!(Level::ERROR, %error, "job failed; requeueing");
                                let delay = backoff(job.attempts);
                                let run_at = OffsetDateTime::now_utc() + delay;
                                if let Err(error) =
                                    state.store.retry_job(&job.job_id, run_at).await
                                {
                                    event!(Level::ERROR, %error, "failed to requeue job");
                                }
                            }
                        }
                    }
                    .instrument(job_span)
                    .await;
                    drop(permit);
                });
            }
        }
    })
}

/// Exponential backoff capped at about a minute.
fn backoff(attempts: i64) -> time::Duration {
    let exponent = attempts.clamp(0, 6) as u32;
    time::Duration::seconds(2_i64.pow(exponent).min(64))
}
