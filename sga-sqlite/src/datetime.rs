use rusqlite::ToSql;
use rusqlite::types::{FromSql, FromSqlResult, ToSqlOutput, ValueRef};
use std::borrow::Borrow;
use time::OffsetDateTime;

/// Bridge between the core's `OffsetDateTime` and how this store keeps
/// timestamps: integer milliseconds since the Unix epoch, UTC. Whenever a
/// timestamp is read or stored it goes through this wrapper to keep the
/// encoding in one place.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DateTime(i64);

impl DateTime {
    /// The raw epoch-millisecond value.
    pub fn as_millis(&self) -> i64 {
        self.0
    }
}

impl<T: Borrow<OffsetDateTime>> From<T> for DateTime {
    fn from(value: T) -> Self {
        Self((value.borrow().unix_timestamp_nanos() / 1_000_000) as i64)
    }
}

impl From<DateTime> for OffsetDateTime {
    fn from(value: DateTime) -> Self {
        // In-range by construction: the stored value came from an
        // OffsetDateTime in the first place.
        OffsetDateTime::from_unix_timestamp_nanos(value.0 as i128 * 1_000_000)
            .unwrap_or(OffsetDateTime::UNIX_EPOCH)
    }
}

impl ToSql for DateTime {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        self.0.to_sql()
    }
}

impl FromSql for DateTime {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        i64::column_result(value).map(Self)
    }
}
