// Repository layer: each domain lives in its own file with `impl ChatRepository`.
//
// This is the persistence collaborator the relay clients talk to over REST:
// conversation listing, pair get-or-create, message history and creation.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePool;
use sync_protocol::{Participant, Sender};

mod conversations;
mod messages;
mod users;

#[cfg(test)]
pub(crate) mod test_helpers;

/// Failures of a single repository operation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Rejected input; nothing was written
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("not a participant of this conversation")]
    Forbidden,

    #[error(transparent)]
    Database(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Database(err.into())
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Clone)]
pub struct ChatRepository {
    pub(crate) pool: SqlitePool,
}

impl ChatRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// A participant pair in the order it is stored: lower id in
/// `participant_a`, higher in `participant_b`.
pub(crate) fn ordered_pair<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b { (a, b) } else { (b, a) }
}

pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

/// Profile for a participant id, tolerating identities that never
/// registered a profile.
pub(crate) fn participant(id: String, name: Option<String>, email: Option<String>) -> Participant {
    Participant {
        id,
        name: name.unwrap_or_default(),
        email,
    }
}

/// Populated sender when a profile exists, bare id otherwise.
pub(crate) fn sender(id: String, name: Option<String>, email: Option<String>) -> Sender {
    match name {
        Some(name) => Sender::Profile(Participant { id, name, email }),
        None => Sender::Id(id),
    }
}
