//! Client for the remote course service.

use async_trait::async_trait;

use course_core::model::{CourseId, LessonId, Outline, ProgressRecord};

use crate::error::ApiError;

mod auth;
mod client;
mod config;
mod payload;

pub use auth::{InMemoryTokenStore, TokenStore};
pub use client::HttpCourseApi;
pub use config::{ApiConfig, DEFAULT_BASE_URL, DEFAULT_TIMEOUT};
pub use payload::{
    CertificateReceipt, LoginOutcome, parse_login, parse_outline, parse_progress,
    resolve_lesson_id,
};

/// Operations the course service exposes to a learner.
///
/// Progress is always that of the authenticated learner.
#[async_trait]
pub trait CourseApi: Send + Sync {
    /// # Errors
    ///
    /// Returns `ApiError` on transport failures, rejections or malformed bodies.
    async fn fetch_outline(&self, course: &CourseId) -> Result<Outline, ApiError>;

    /// # Errors
    ///
    /// Returns `ApiError` on transport failures, rejections or malformed bodies.
    async fn fetch_progress(&self, course: &CourseId) -> Result<ProgressRecord, ApiError>;

    /// # Errors
    ///
    /// Returns `ApiError` if the server did not acknowledge the completion.
    async fn mark_lesson_complete(&self, course: &CourseId, lesson: &LessonId)
    -> Result<(), ApiError>;

    /// # Errors
    ///
    /// Returns `ApiError::Rejected` when the server refuses to issue one.
    async fn request_certificate(&self, course: &CourseId) -> Result<CertificateReceipt, ApiError>;

    /// # Errors
    ///
    /// Returns `ApiError` for bad credentials or malformed responses.
    async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome, ApiError>;
}
