//! Service-level error surface.

use crate::db::StoreError;
use crate::mapping::MapError;
use crate::repo::RepoError;
use http::StatusCode;
use thiserror::Error;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Every rule violation of one candidate, with a suggested response status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    messages: Vec<String>,
    status: StatusCode,
}

impl ValidationFailure {
    pub fn new(messages: Vec<String>) -> Self {
        Self::with_status(StatusCode::BAD_REQUEST, messages)
    }

    pub fn with_status(status: StatusCode, messages: Vec<String>) -> Self {
        Self { messages, status }
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl std::fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "validation failed: {}", self.messages.join(" "))
    }
}

impl std::error::Error for ValidationFailure {}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationFailure),
    #[error("`{kind}` with id `{id}` not found")]
    NotFound { kind: &'static str, id: String },
    #[error("no `{kind}` matches the given predicates")]
    NoMatch { kind: &'static str },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Mapping(#[from] MapError),
}

impl ServiceError {
    /// Suggested response status for the boundary layer.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(failure) => failure.status(),
            Self::NotFound { .. } | Self::NoMatch { .. } => StatusCode::NOT_FOUND,
            Self::Store(_) | Self::Mapping(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<RepoError> for ServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound { kind, id } => Self::NotFound { kind, id },
            RepoError::NoMatch { kind } => Self::NoMatch { kind },
            RepoError::Store(err) => Self::Store(err),
        }
    }
}
