use super::AuctionId;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// What a scheduled job does when it fires.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum JobKind {
    /// Open the auction's first round at its start time
    StartRound {
        /// The auction to start
        auction_id: AuctionId,
        /// The round to open (always 0 today)
        round: i64,
    },
    /// Close and settle a round at its deadline
    EndRound {
        /// The auction whose round ends
        auction_id: AuctionId,
        /// The round to settle
        round: i64,
    },
}

impl JobKind {
    /// The deterministic job id for this kind.
    ///
    /// Ids are pure functions of the auction and round so the queue
    /// deduplicates concurrent enqueues: `{auction}-round-{i}` for a start,
    /// `{auction}-round-{i}-end` for an end.
    pub fn job_id(&self) -> String {
        match self {
            Self::StartRound { auction_id, round } => start_round_job_id(*auction_id, *round),
            Self::EndRound { auction_id, round } => end_round_job_id(*auction_id, *round),
        }
    }
}

/// Deterministic id of the round-start job.
pub fn start_round_job_id(auction_id: AuctionId, round: i64) -> String {
    format!("{auction_id}-round-{round}")
}

/// Deterministic id of the round-end job.
pub fn end_round_job_id(auction_id: AuctionId, round: i64) -> String {
    format!("{auction_id}-round-{round}-end")
}

/// A delayed job as stored in the durable queue.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobRecord {
    /// Deterministic job id
    pub job_id: String,
    /// What to do when the job fires
    pub kind: JobKind,
    /// When the job is due
    #[serde(with = "time::serde::rfc3339")]
    pub run_at: OffsetDateTime,
    /// How many times a worker has claimed this job
    pub attempts: i64,
}

impl JobRecord {
    /// A job scheduled at `run_at`.
    pub fn new(kind: JobKind, run_at: OffsetDateTime) -> Self {
        Self {
            job_id: kind.job_id(),
            kind,
            run_at,
            attempts: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_ids_are_deterministic_per_round() {
        let auction = AuctionId::generate();
        let start = JobKind::StartRound {
            auction_id: auction,
            round: 0,
        };
        let end = JobKind::EndRound {
            auction_id: auction,
            round: 2,
        };
        assert_eq!(start.job_id(), format!("{auction}-round-0"));
        assert_eq!(end.job_id(), format!("{auction}-round-2-end"));
        assert_eq!(end.job_id(), end.job_id());
    }
}
