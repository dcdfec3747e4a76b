use crate::DateTime;
use crate::db::{self, Database};
use rusqlite::{OptionalExtension as _, TransactionBehavior};
use sga_core::models::{JobKind, JobRecord};
use sga_core::ports::JobStore;
use time::OffsetDateTime;

impl JobStore for Database {
    async fn schedule_job(&self, job: &JobRecord) -> Result<bool, db::Error> {
        let ctx = self.connect(true)?;
        let kind = serde_json::to_string(&job.kind)?;
        let changed = ctx.execute(
            "insert into jobs (id, kind, run_at, attempts, locked_until)
             values (?1, ?2, ?3, 0, null)
             on conflict (id) do nothing",
            (&job.job_id, kind, DateTime::from(job.run_at)),
        )?;
        Ok(changed == 1)
    }

    async fn cancel_job(&self, job_id: &str) -> Result<bool, db::Error> {
        let ctx = self.connect(true)?;
        let changed = ctx.execute("delete from jobs where id = ?1", (job_id,))?;
        Ok(changed == 1)
    }

    async fn job_run_at(&self, job_id: &str) -> Result<Option<OffsetDateTime>, db::Error> {
        let ctx = self.connect(false)?;
        let run_at = ctx
            .query_row(
                "select run_at from jobs where id = ?1",
                (job_id,),
                |row| row.get::<_, DateTime>(0),
            )
            .optional()?;
        Ok(run_at.map(Into::into))
    }

    async fn reschedule_job(
        &self,
        job_id: &str,
        run_at: OffsetDateTime,
    ) -> Result<bool, db::Error> {
        let ctx = self.connect(true)?;
        let changed = ctx.execute(
            "update jobs set run_at = ?2, locked_until = null where id = ?1",
            (job_id, DateTime::from(run_at)),
        )?;
        Ok(changed == 1)
    }

    async fn claim_due_jobs(
        &self,
        now: OffsetDateTime,
        limit: usize,
        visibility: time::Duration,
    ) -> Result<Vec<JobRecord>, db::Error> {
        let mut ctx = self.connect(true)?;
        let tx = ctx.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let due = {
            let mut statement = tx.prepare(
                "select id, kind, run_at, attempts from jobs
                 where run_at <= ?1 and (locked_until is null or locked_until <= ?1)
                 order by run_at
                 limit ?2",
            )?;
            statement
                .query_map((DateTime::from(now), limit as i64), |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, DateTime>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?
        };

        let locked_until = DateTime::from(now + visibility);
        let mut claimed = Vec::with_capacity(due.len());
        for (job_id, kind, run_at, attempts) in due {
            tx.execute(
                "update jobs set attempts = attempts + 1, locked_until = ?2 where id = ?1",
                (&job_id, locked_until),
            )?;
            let kind: JobKind = serde_json::from_str(&kind)?;
            claimed.push(JobRecord {
                job_id,
                kind,
                run_at: run_at.into(),
                attempts: attempts + 1,
            });
        }
        tx.commit()?;
        Ok(claimed)
    }

    async fn complete_job(&self, job_id: &str) -> Result<(), db::Error> {
        let ctx = self.connect(true)?;
        ctx.execute("delete from jobs where id = ?1", (job_id,))?;
        Ok(())
    }

    async fn retry_job(&self, job_id: &str, run_at: OffsetDateTime) -> Result<(), db::Error> {
        let ctx = self.connect(true)?;
        ctx.execute(
            "update jobs set run_at = ?2, locked_until = null where id = ?1",
            (job_id, DateTime::from(run_at)),
        )?;
        Ok(())
    }
}
