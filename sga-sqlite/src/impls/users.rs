use crate::DateTime;
use crate::db::{self, Database};
use rusqlite::{Connection, OptionalExtension as _};
use sga_core::models::{GiftHolding, UserAccount, UserId};
use sga_core::ports::{GiftDebitFailure, StarsDebitFailure, UserRepository};
use time::OffsetDateTime;

impl UserRepository for Database {
    async fn ensure_user(&self, user_id: UserId) -> Result<(), db::Error> {
        let ctx = self.connect(true)?;
        ctx.execute(
            "insert into users (id, balance, created_at) values (?1, 0, ?2)
             on conflict (id) do nothing",
            (
                user_id.to_string(),
                DateTime::from(OffsetDateTime::now_utc()),
            ),
        )?;
        Ok(())
    }

    async fn get_user(&self, user_id: UserId) -> Result<Option<UserAccount>, db::Error> {
        let ctx = self.connect(false)?;
        get_user(&ctx, user_id)
    }

    async fn credit_stars(&self, user_id: UserId, amount: i64) -> Result<(), db::Error> {
        let ctx = self.connect(true)?;
        let changed = ctx.execute(
            "update users set balance = balance + ?1 where id = ?2",
            (amount, user_id.to_string()),
        )?;
        if changed == 0 {
            return Err(db::Error::UnknownUser(user_id.to_string()));
        }
        Ok(())
    }

    async fn debit_stars(
        &self,
        user_id: UserId,
        amount: i64,
    ) -> Result<Result<(), StarsDebitFailure>, db::Error> {
        let ctx = self.connect(true)?;
        // The predicate carries the never-negative floor; a miss is either
        // an unknown user or an uncovered debit, both insufficient.
        let changed = ctx.execute(
            "update users set balance = balance - ?1 where id = ?2 and balance >= ?1",
            (amount, user_id.to_string()),
        )?;
        if changed == 1 {
            Ok(Ok(()))
        } else {
            Ok(Err(StarsDebitFailure::InsufficientBalance))
        }
    }

    async fn credit_gifts(
        &self,
        user_id: UserId,
        gift_name: &str,
        count: i64,
    ) -> Result<(), db::Error> {
        let ctx = self.connect(true)?;
        ctx.execute(
            "insert into gifts (user_id, name, count) values (?1, ?2, ?3)
             on conflict (user_id, name) do update set count = count + excluded.count",
            (user_id.to_string(), gift_name, count),
        )?;
        Ok(())
    }

    async fn debit_gifts(
        &self,
        user_id: UserId,
        gift_name: &str,
        count: i64,
    ) -> Result<Result<(), GiftDebitFailure>, db::Error> {
        let ctx = self.connect(true)?;
        let changed = ctx.execute(
            "update gifts set count = count - ?3
             where user_id = ?1 and name = ?2 and count >= ?3",
            (user_id.to_string(), gift_name, count),
        )?;
        if changed == 1 {
            Ok(Ok(()))
        } else {
            Ok(Err(GiftDebitFailure::InsufficientGifts))
        }
    }
}

pub(crate) fn get_user(
    conn: &Connection,
    user_id: UserId,
) -> Result<Option<UserAccount>, db::Error> {
    let row = conn
        .query_row(
            "select balance, created_at from users where id = ?1",
            (user_id.to_string(),),
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, DateTime>(1)?)),
        )
        .optional()?;

    let Some((balance, created_at)) = row else {
        return Ok(None);
    };

    let mut statement =
        conn.prepare("select name, count from gifts where user_id = ?1 order by name")?;
    let gifts = statement
        .query_map((user_id.to_string(),), |row| {
            Ok(GiftHolding {
                name: row.get(0)?,
                count: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(UserAccount {
        user_id,
        balance,
        gifts,
        created_at: created_at.into(),
    }))
}
