use crate::models::JobRecord;
use std::future::Future;
use time::OffsetDateTime;

/// Interface of the durable delayed-job queue behind the scheduler.
///
/// Jobs carry deterministic ids, so `schedule` doubles as deduplication.
/// Multiple servers may poll the same queue: `claim_due` hands a job to at
/// most one worker at a time via a visibility timeout, and job bodies are
/// required to be idempotent because a crashed worker's claim simply
/// expires and the job fires again.
pub trait JobStore: super::Repository {
    /// Enqueue a job unless one with the same id already exists.
    /// Returns whether a new row was written.
    fn schedule_job(
        &self,
        job: &JobRecord,
    ) -> impl Future<Output = Result<bool, Self::Error>> + Send;

    /// Remove a pending job. Returns whether it existed.
    fn cancel_job(
        &self,
        job_id: &str,
    ) -> impl Future<Output = Result<bool, Self::Error>> + Send;

    /// The scheduled fire time of a pending job, if any.
    ///
    /// Anti-snipe derives the *real* remaining time from this, not from the
    /// auction document, to avoid double extensions from stale snapshots.
    fn job_run_at(
        &self,
        job_id: &str,
    ) -> impl Future<Output = Result<Option<OffsetDateTime>, Self::Error>> + Send;

    /// Move a pending job to a new fire time. Returns whether it existed.
    fn reschedule_job(
        &self,
        job_id: &str,
        run_at: OffsetDateTime,
    ) -> impl Future<Output = Result<bool, Self::Error>> + Send;

    /// Claim up to `limit` due jobs, making each invisible to other workers
    /// until `now + visibility`. Increments the attempt counter.
    fn claim_due_jobs(
        &self,
        now: OffsetDateTime,
        limit: usize,
        visibility: time::Duration,
    ) -> impl Future<Output = Result<Vec<JobRecord>, Self::Error>> + Send;

    /// Delete a job after successful execution.
    fn complete_job(
        &self,
        job_id: &str,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Release a failed job back to the queue at a later fire time.
    fn retry_job(
        &self,
        job_id: &str,
        run_at: OffsetDateTime,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;
}
