//! Timestamps are persisted as Unix milliseconds so the window comparisons
//! (`voting_ends_at > ?now`) run as plain integer comparisons in SQL.

use chrono::{DateTime, Utc};

use crate::StoreError;

pub(crate) fn to_millis(time: DateTime<Utc>) -> i64 {
    time.timestamp_millis()
}

pub(crate) fn from_millis(column: &'static str, millis: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| StoreError::corrupt(column, millis))
}

pub(crate) fn from_optional_millis(
    column: &'static str,
    millis: Option<i64>,
) -> Result<Option<DateTime<Utc>>, StoreError> {
    millis.map(|m| from_millis(column, m)).transpose()
}
