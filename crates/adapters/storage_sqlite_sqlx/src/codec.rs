//! Column encoding shared by the repositories.
//!
//! Identifiers and enums are stored as text. Timestamps use fixed-width
//! RFC 3339 with nanoseconds so that text order equals time order.

use std::str::FromStr;

use chrono::SecondsFormat;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use dealflow_domain::time::{Date, Timestamp};

pub(crate) fn decode_error<E>(err: E) -> sqlx::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    sqlx::Error::Decode(Box::new(err))
}

pub(crate) fn timestamp(ts: Timestamp) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn date(value: Date) -> String {
    value.format("%Y-%m-%d").to_string()
}

/// Read a text column and parse it with [`FromStr`].
pub(crate) fn parse<T>(row: &SqliteRow, column: &str) -> Result<T, sqlx::Error>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.try_get(column)?;
    raw.parse().map_err(decode_error)
}

/// Nullable variant of [`parse`].
pub(crate) fn parse_opt<T>(row: &SqliteRow, column: &str) -> Result<Option<T>, sqlx::Error>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: Option<String> = row.try_get(column)?;
    raw.map(|value| value.parse().map_err(decode_error))
        .transpose()
}

pub(crate) fn parse_timestamp(row: &SqliteRow, column: &str) -> Result<Timestamp, sqlx::Error> {
    let raw: String = row.try_get(column)?;
    chrono::DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.to_utc())
        .map_err(decode_error)
}

pub(crate) fn parse_timestamp_opt(
    row: &SqliteRow,
    column: &str,
) -> Result<Option<Timestamp>, sqlx::Error> {
    let raw: Option<String> = row.try_get(column)?;
    raw.map(|s| {
        chrono::DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.to_utc())
            .map_err(decode_error)
    })
    .transpose()
}

pub(crate) fn parse_u32(row: &SqliteRow, column: &str) -> Result<u32, sqlx::Error> {
    let raw: i64 = row.try_get(column)?;
    u32::try_from(raw).map_err(decode_error)
}
