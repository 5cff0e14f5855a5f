//! Shared error types for the services crate.

use reqwest::StatusCode;
use thiserror::Error;

use course_core::model::LessonId;
use course_core::navigator::NavigationError;
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by the course service client.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ApiError {
    #[error("request timed out")]
    Timeout,
    #[error("could not reach the course service: {0}")]
    Connect(String),
    #[error("not authorized, log in again")]
    Unauthorized,
    #[error("request rejected with status {status}: {message}")]
    Rejected { status: StatusCode, message: String },
    #[error("request failed with status {0}")]
    HttpStatus(StatusCode),
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
    #[error("invalid base url: {0}")]
    InvalidBaseUrl(String),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl ApiError {
    /// Classify a transport-level failure.
    #[must_use]
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Connect(err.to_string())
        } else if err.is_decode() {
            Self::MalformedPayload(err.to_string())
        } else {
            Self::Http(err)
        }
    }

    /// Whether retrying the same request later may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout | Self::Connect(_) => true,
            Self::HttpStatus(status) | Self::Rejected { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            Self::Http(err) => err.is_timeout() || err.is_connect(),
            Self::Unauthorized | Self::MalformedPayload(_) | Self::InvalidBaseUrl(_) => false,
        }
    }

    /// Status code returned by the server, if the request got that far.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Unauthorized => Some(StatusCode::UNAUTHORIZED),
            Self::HttpStatus(status) | Self::Rejected { status, .. } => Some(*status),
            Self::Http(err) => err.status(),
            _ => None,
        }
    }
}

/// Errors emitted by `CourseSessionService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("failed to load course: {0}")]
    Load(#[source] ApiError),
    #[error("could not mark lesson {lesson} complete: {source}")]
    MarkComplete {
        lesson: LessonId,
        #[source]
        source: ApiError,
    },
    #[error("lesson {0} is not part of this course")]
    UnknownLesson(LessonId),
    #[error("certificate not available yet ({percentage}% complete)")]
    NotEligible { percentage: u8 },
    #[error("certificate request rejected: {0}")]
    CertificateRejected(String),
    #[error("no cached outline for this course")]
    NotCached,
    #[error("session closed before the response arrived")]
    Closed,
    #[error(transparent)]
    Navigation(#[from] NavigationError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `AuthService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Auth(#[from] AuthError),
}
