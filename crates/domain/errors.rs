use diesel::result::{DatabaseErrorKind, Error as DieselError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("invalid request: {0}")]
    BadRequest(String),
    #[error("subscription not found")]
    NotFound,
    /// Natural-key collision. `id` is the row that already owns the
    /// `(user_uuid, service_name)` pair, when it could be resolved.
    #[error("subscription already exists")]
    Conflict { id: Option<i32> },
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl SubscriptionError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        SubscriptionError::BadRequest(message.into())
    }
}

impl From<DieselError> for SubscriptionError {
    fn from(value: DieselError) -> Self {
        match value {
            DieselError::NotFound => SubscriptionError::NotFound,
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                SubscriptionError::Conflict { id: None }
            }
            DieselError::DatabaseError(DatabaseErrorKind::CheckViolation, info) => {
                SubscriptionError::BadRequest(info.message().to_string())
            }
            other => SubscriptionError::Internal(other.into()),
        }
    }
}

pub type RepositoryResult<T> = std::result::Result<T, SubscriptionError>;
