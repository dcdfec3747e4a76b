use crate::DateTime;
use crate::db::{self, Database};
use rusqlite::{Connection, OptionalExtension as _, TransactionBehavior};
use sga_core::models::{Auction, AuctionId, AuctionState, Round, SETTLING_ROUND, UserId, Winner};
use sga_core::ports::AuctionRepository;
use time::OffsetDateTime;

impl AuctionRepository for Database {
    async fn create_auction(&self, auction: &Auction) -> Result<bool, db::Error> {
        let ctx = self.connect(true)?;
        let rounds = serde_json::to_string(&auction.rounds)?;
        let changed = ctx.execute(
            "insert into auctions
                 (id, name, state, current_round, round_end_time, gift_name,
                  gift_count, start_time, author_id, rounds, created_at)
             values (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             on conflict (id) do nothing",
            (
                auction.auction_id.to_string(),
                &auction.name,
                auction.state.to_string(),
                auction.current_round,
                auction.round_end_time.map(DateTime::from),
                &auction.gift_name,
                auction.gift_count,
                DateTime::from(auction.start_time),
                auction.author_id.to_string(),
                rounds,
                DateTime::from(auction.created_at),
            ),
        )?;
        Ok(changed == 1)
    }

    async fn delete_auction(&self, auction_id: AuctionId) -> Result<(), db::Error> {
        let mut ctx = self.connect(true)?;
        let tx = ctx.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
            "delete from winners where auction_id = ?1",
            (auction_id.to_string(),),
        )?;
        tx.execute(
            "delete from auctions where id = ?1",
            (auction_id.to_string(),),
        )?;
        tx.commit()?;
        Ok(())
    }

    async fn get_auction(&self, auction_id: AuctionId) -> Result<Option<Auction>, db::Error> {
        let ctx = self.connect(false)?;
        get_auction(&ctx, auction_id)
    }

    async fn list_open_auctions(&self) -> Result<Vec<Auction>, db::Error> {
        let ctx = self.connect(false)?;
        let ids = {
            let mut statement = ctx.prepare(
                "select id from auctions
                 where state in ('PENDING', 'ACTIVE', 'SETTLING')
                 order by start_time, id",
            )?;
            statement
                .query_map((), |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?
        };

        let mut auctions = Vec::with_capacity(ids.len());
        for id in ids {
            let auction_id: AuctionId =
                id.parse().map_err(|_| db::Error::CorruptRow(id.clone()))?;
            if let Some(auction) = get_auction(&ctx, auction_id)? {
                auctions.push(auction);
            }
        }
        Ok(auctions)
    }

    async fn start_auction(
        &self,
        auction_id: AuctionId,
        round: i64,
        round_end_time: OffsetDateTime,
    ) -> Result<bool, db::Error> {
        let ctx = self.connect(true)?;
        let changed = ctx.execute(
            "update auctions
             set state = 'ACTIVE', current_round = ?2, round_end_time = ?3
             where id = ?1 and state = 'PENDING'",
            (
                auction_id.to_string(),
                round,
                DateTime::from(round_end_time),
            ),
        )?;
        Ok(changed == 1)
    }

    async fn mark_settling(&self, auction_id: AuctionId, round: i64) -> Result<bool, db::Error> {
        let ctx = self.connect(true)?;
        // First fire flips ACTIVE(round) to the settling sentinel; a retry
        // of an interrupted settlement matches the second arm. Anything
        // else is a stale duplicate.
        let changed = ctx.execute(
            "update auctions
             set state = 'SETTLING', current_round = ?3
             where id = ?1
               and ((state = 'ACTIVE' and current_round = ?2) or state = 'SETTLING')",
            (auction_id.to_string(), round, SETTLING_ROUND),
        )?;
        Ok(changed == 1)
    }

    async fn append_winners(
        &self,
        auction_id: AuctionId,
        round: i64,
        winners: &[Winner],
    ) -> Result<bool, db::Error> {
        let mut ctx = self.connect(true)?;
        let tx = ctx.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing: i64 = tx.query_row(
            "select count(*) from winners where auction_id = ?1 and round = ?2",
            (auction_id.to_string(), round),
            |row| row.get(0),
        )?;
        if existing > 0 {
            return Ok(false);
        }

        let now = DateTime::from(OffsetDateTime::now_utc());
        for winner in winners {
            tx.execute(
                "insert into winners
                     (auction_id, round, place, user_id, stars, prize, created_at)
                 values (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                (
                    auction_id.to_string(),
                    winner.round,
                    winner.place,
                    winner.user_id.to_string(),
                    winner.stars,
                    winner.prize,
                    now,
                ),
            )?;
        }
        tx.commit()?;
        Ok(true)
    }

    async fn advance_round(
        &self,
        auction_id: AuctionId,
        next_round: i64,
        round_end_time: OffsetDateTime,
    ) -> Result<(), db::Error> {
        let ctx = self.connect(true)?;
        ctx.execute(
            "update auctions
             set state = 'ACTIVE', current_round = ?2, round_end_time = ?3
             where id = ?1 and state = 'SETTLING'",
            (
                auction_id.to_string(),
                next_round,
                DateTime::from(round_end_time),
            ),
        )?;
        Ok(())
    }

    async fn finish_auction(&self, auction_id: AuctionId) -> Result<(), db::Error> {
        let ctx = self.connect(true)?;
        ctx.execute(
            "update auctions
             set state = 'FINISHED', round_end_time = null
             where id = ?1 and state = 'SETTLING'",
            (auction_id.to_string(),),
        )?;
        Ok(())
    }

    async fn set_round_end_time(
        &self,
        auction_id: AuctionId,
        round_end_time: OffsetDateTime,
    ) -> Result<(), db::Error> {
        let ctx = self.connect(true)?;
        ctx.execute(
            "update auctions set round_end_time = ?2 where id = ?1 and state = 'ACTIVE'",
            (auction_id.to_string(), DateTime::from(round_end_time)),
        )?;
        Ok(())
    }
}

pub(crate) fn get_auction(
    conn: &Connection,
    auction_id: AuctionId,
) -> Result<Option<Auction>, db::Error> {
    struct Row {
        name: String,
        state: String,
        current_round: i64,
        round_end_time: Option<DateTime>,
        gift_name: String,
        gift_count: i64,
        start_time: DateTime,
        author_id: String,
        rounds: String,
        created_at: DateTime,
    }

    let row = conn
        .query_row(
            "select name, state, current_round, round_end_time, gift_name,
                    gift_count, start_time, author_id, rounds, created_at
             from auctions where id = ?1",
            (auction_id.to_string(),),
            |row| {
                Ok(Row {
                    name: row.get(0)?,
                    state: row.get(1)?,
                    current_round: row.get(2)?,
                    round_end_time: row.get(3)?,
                    gift_name: row.get(4)?,
                    gift_count: row.get(5)?,
                    start_time: row.get(6)?,
                    author_id: row.get(7)?,
                    rounds: row.get(8)?,
                    created_at: row.get(9)?,
                })
            },
        )
        .optional()?;

    let Some(row) = row else {
        return Ok(None);
    };

    let state: AuctionState = row.state.parse().map_err(db::Error::CorruptRow)?;
    let author_id: UserId = row
        .author_id
        .parse()
        .map_err(|_| db::Error::CorruptRow(row.author_id.clone()))?;
    let rounds: Vec<Round> = serde_json::from_str(&row.rounds)?;

    let mut statement = conn.prepare(
        "select round, place, user_id, stars, prize
         from winners where auction_id = ?1
         order by round, place",
    )?;
    let winners = statement
        .query_map((auction_id.to_string(),), |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, i64>(4)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .map(|(round, place, user_id, stars, prize)| {
            Ok(Winner {
                round,
                place,
                user_id: user_id
                    .parse()
                    .map_err(|_| db::Error::CorruptRow(user_id.clone()))?,
                stars,
                prize,
            })
        })
        .collect::<Result<Vec<_>, db::Error>>()?;

    Ok(Some(Auction {
        auction_id,
        name: row.name,
        state,
        current_round: row.current_round,
        round_end_time: row.round_end_time.map(Into::into),
        gift_name: row.gift_name,
        gift_count: row.gift_count,
        start_time: row.start_time.into(),
        author_id,
        rounds,
        winners,
        created_at: row.created_at.into(),
    }))
}
