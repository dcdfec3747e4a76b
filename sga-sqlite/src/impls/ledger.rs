use crate::DateTime;
use crate::db::{self, Database};
use sga_core::models::{
    AuctionId, TransactionKind, TransactionRecord, TransactionStatus, UserId,
};
use sga_core::ports::LedgerRepository;

impl LedgerRepository for Database {
    async fn upsert_transaction(&self, record: &TransactionRecord) -> Result<bool, db::Error> {
        let ctx = self.connect(true)?;
        let changed = ctx.execute(
            "insert into transactions
                 (op_id, kind, status, user_id, auction_id, round,
                  amount, previous_amount, diff, created_at)
             values (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             on conflict (op_id) do nothing",
            (
                &record.op_id,
                record.kind.to_string(),
                record.status.to_string(),
                record.user_id.to_string(),
                record.auction_id.to_string(),
                record.round,
                record.amount,
                record.previous_amount,
                record.diff,
                DateTime::from(record.created_at),
            ),
        )?;
        Ok(changed == 1)
    }

    async fn locked_amount(&self, user_id: UserId) -> Result<i64, db::Error> {
        let ctx = self.connect(false)?;
        // An increase supersedes its predecessor, so the lock is the sum of
        // the *latest* ACTIVE amount per auction, not the sum over rows.
        let locked = ctx.query_row(
            "select coalesce(sum(amount), 0) from (
                 select amount,
                        row_number() over (
                            partition by auction_id
                            order by created_at desc, rowid desc
                        ) as rn
                 from transactions
                 where user_id = ?1
                   and status = 'ACTIVE'
                   and kind in ('BET', 'BET_INCREASE')
             ) where rn = 1",
            (user_id.to_string(),),
            |row| row.get(0),
        )?;
        Ok(locked)
    }

    async fn settle_bid_records(
        &self,
        auction_id: AuctionId,
        user_id: UserId,
        status: TransactionStatus,
    ) -> Result<u64, db::Error> {
        let ctx = self.connect(true)?;
        let changed = ctx.execute(
            "update transactions set status = ?3
             where auction_id = ?1 and user_id = ?2
               and status = 'ACTIVE' and kind in ('BET', 'BET_INCREASE')",
            (auction_id.to_string(), user_id.to_string(), status.to_string()),
        )?;
        Ok(changed as u64)
    }

    async fn transactions_for_user(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<TransactionRecord>, db::Error> {
        let ctx = self.connect(false)?;
        let mut statement = ctx.prepare(
            "select op_id, kind, status, user_id, auction_id, round,
                    amount, previous_amount, diff, created_at
             from transactions
             where user_id = ?1
             order by created_at desc, rowid desc
             limit ?2",
        )?;
        let rows = statement
            .query_map((user_id.to_string(), limit as i64), |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, i64>(5)?,
                    row.get::<_, i64>(6)?,
                    row.get::<_, i64>(7)?,
                    row.get::<_, i64>(8)?,
                    row.get::<_, DateTime>(9)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(
                |(op_id, kind, status, user, auction, round, amount, previous, diff, created)| {
                    Ok(TransactionRecord {
                        op_id,
                        kind: kind.parse::<TransactionKind>().map_err(db::Error::CorruptRow)?,
                        status: status
                            .parse::<TransactionStatus>()
                            .map_err(db::Error::CorruptRow)?,
                        user_id: user
                            .parse()
                            .map_err(|_| db::Error::CorruptRow(user.clone()))?,
                        auction_id: auction
                            .parse()
                            .map_err(|_| db::Error::CorruptRow(auction.clone()))?,
                        round,
                        amount,
                        previous_amount: previous,
                        diff,
                        created_at: created.into(),
                    })
                },
            )
            .collect()
    }
}
