use rusqlite::ErrorCode;

/// Failure taxonomy shared by every engine operation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Duplicate request, already-friends, self-action, unique collisions.
    #[error("{0}")]
    Conflict(String),

    /// The acting user does not own the entity.
    #[error("{0}")]
    Forbidden(String),

    /// Invalid enum value or state transition.
    #[error("{0}")]
    Validation(String),

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl From<crush_types::models::UnknownVariant> for Error {
    fn from(e: crush_types::models::UnknownVariant) -> Self {
        Error::Validation(e.to_string())
    }
}

pub(crate) fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

/// True when the statement failed because a table has not been created.
pub(crate) fn is_missing_table(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(_, Some(msg)) => msg.contains("no such table"),
        _ => false,
    }
}
