mod common;

use common::open_db;
use sga_core::models::{AuctionId, JobKind, JobRecord};
use sga_core::ports::JobStore;
use time::{Duration, OffsetDateTime};

fn end_round(auction_id: AuctionId, round: i64, run_at: OffsetDateTime) -> JobRecord {
    JobRecord::new(JobKind::EndRound { auction_id, round }, run_at)
}

#[tokio::test]
async fn deterministic_ids_deduplicate() -> anyhow::Result<()> {
    let db = open_db();
    let auction = AuctionId::generate();
    let at = OffsetDateTime::now_utc() + Duration::seconds(30);

    assert!(db.schedule_job(&end_round(auction, 0, at)).await?);
    assert!(!db.schedule_job(&end_round(auction, 0, at)).await?);
    assert!(db.schedule_job(&end_round(auction, 1, at)).await?);
    Ok(())
}

#[tokio::test]
async fn claims_respect_due_time_and_visibility() -> anyhow::Result<()> {
    let db = open_db();
    let auction = AuctionId::generate();
    let now = OffsetDateTime::now_utc();

    db.schedule_job(&end_round(auction, 0, now - Duration::seconds(1)))
        .await?;
    db.schedule_job(&end_round(auction, 1, now + Duration::minutes(5)))
        .await?;

    // Only the due job is claimable.
    let claimed = db.claim_due_jobs(now, 10, Duration::seconds(30)).await?;
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].attempts, 1);
    assert!(matches!(
        claimed[0].kind,
        JobKind::EndRound { round: 0, .. }
    ));

    // While the visibility timeout holds, nobody else can claim it.
    let claimed = db.claim_due_jobs(now, 10, Duration::seconds(30)).await?;
    assert!(claimed.is_empty());

    // Once it expires, the job fires again with a bumped attempt counter.
    let later = now + Duration::seconds(31);
    let claimed = db.claim_due_jobs(later, 10, Duration::seconds(30)).await?;
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].attempts, 2);

    db.complete_job(&claimed[0].job_id).await?;
    let claimed = db
        .claim_due_jobs(later + Duration::minutes(1), 10, Duration::seconds(30))
        .await?;
    assert!(claimed.is_empty());
    Ok(())
}

#[tokio::test]
async fn reschedule_moves_the_fire_time() -> anyhow::Result<()> {
    let db = open_db();
    let auction = AuctionId::generate();
    let now = OffsetDateTime::now_utc();
    let job = end_round(auction, 0, now + Duration::seconds(3));

    db.schedule_job(&job).await?;
    assert_eq!(
        db.job_run_at(&job.job_id).await?.map(|t| t.unix_timestamp()),
        Some((now + Duration::seconds(3)).unix_timestamp())
    );

    // Anti-snipe pushes the deadline out.
    let extended = now + Duration::seconds(8);
    assert!(db.reschedule_job(&job.job_id, extended).await?);
    let claimed = db.claim_due_jobs(now + Duration::seconds(5), 10, Duration::seconds(30)).await?;
    assert!(claimed.is_empty());
    let claimed = db.claim_due_jobs(now + Duration::seconds(9), 10, Duration::seconds(30)).await?;
    assert_eq!(claimed.len(), 1);

    // Rescheduling an unknown job reports it.
    assert!(!db.reschedule_job("missing-job", now).await?);
    Ok(())
}

#[tokio::test]
async fn retry_releases_with_backoff() -> anyhow::Result<()> {
    let db = open_db();
    let auction = AuctionId::generate();
    let now = OffsetDateTime::now_utc();

    db.schedule_job(&end_round(auction, 0, now)).await?;
    let claimed = db.claim_due_jobs(now, 10, Duration::minutes(5)).await?;
    assert_eq!(claimed.len(), 1);

    db.retry_job(&claimed[0].job_id, now + Duration::seconds(10))
        .await?;
    assert!(db.claim_due_jobs(now + Duration::seconds(5), 10, Duration::minutes(5)).await?.is_empty());
    let retried = db
        .claim_due_jobs(now + Duration::seconds(11), 10, Duration::minutes(5))
        .await?;
    assert_eq!(retried.len(), 1);
    assert_eq!(retried[0].attempts, 2);
    Ok(())
}
