use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde_json::{Value, json};
use tracing::debug;

use course_core::model::{CourseId, LessonId, Outline, ProgressRecord};

use super::auth::TokenStore;
use super::config::ApiConfig;
use super::payload::{self, CertificateReceipt, LoginOutcome};
use super::CourseApi;
use crate::error::ApiError;

/// `CourseApi` over HTTP with JSON bodies and bearer auth.
#[derive(Clone)]
pub struct HttpCourseApi {
    client: Client,
    base: Url,
    tokens: Arc<dyn TokenStore>,
}

impl HttpCourseApi {
    /// Build a client for the configured base URL.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::InvalidBaseUrl` if the base URL cannot carry path
    /// segments, or `ApiError::Http` if the HTTP client cannot be built.
    pub fn new(config: &ApiConfig, tokens: Arc<dyn TokenStore>) -> Result<Self, ApiError> {
        let base = Url::parse(config.base_url.trim())
            .map_err(|e| ApiError::InvalidBaseUrl(format!("{}: {e}", config.base_url)))?;
        if base.cannot_be_a_base() {
            return Err(ApiError::InvalidBaseUrl(config.base_url.clone()));
        }
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            base,
            tokens,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Base URL with `segments` appended, each percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| ApiError::InvalidBaseUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.tokens.get() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Value, ApiError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(ApiError::from_transport)?;
        let status = response.status();
        let body = response.text().await.map_err(ApiError::from_transport)?;

        if !status.is_success() {
            return Err(status_error(status, &body));
        }
        payload::parse_body(&body)
    }
}

/// Map a non-success response to an error, keeping the server's message when
/// it sent one.
pub(crate) fn status_error(status: StatusCode, body: &str) -> ApiError {
    if status == StatusCode::UNAUTHORIZED {
        return ApiError::Unauthorized;
    }
    match payload::error_message(body) {
        Some(message) => ApiError::Rejected { status, message },
        None => ApiError::HttpStatus(status),
    }
}

#[async_trait]
impl CourseApi for HttpCourseApi {
    async fn fetch_outline(&self, course: &CourseId) -> Result<Outline, ApiError> {
        let url = self.endpoint(&["courses", course.as_str(), "outline"])?;
        debug!(%url, "fetching outline");
        let value = self.send(self.client.get(url)).await?;
        payload::parse_outline(course, value)
    }

    async fn fetch_progress(&self, course: &CourseId) -> Result<ProgressRecord, ApiError> {
        let url = self.endpoint(&["courses", course.as_str(), "progress"])?;
        debug!(%url, "fetching progress");
        let value = self.send(self.client.get(url)).await?;
        payload::parse_progress(value)
    }

    async fn mark_lesson_complete(
        &self,
        course: &CourseId,
        lesson: &LessonId,
    ) -> Result<(), ApiError> {
        let url = self.endpoint(&[
            "courses",
            course.as_str(),
            "lessons",
            lesson.as_str(),
            "complete",
        ])?;
        debug!(%url, "marking lesson complete");
        self.send(self.client.post(url)).await?;
        Ok(())
    }

    async fn request_certificate(&self, course: &CourseId) -> Result<CertificateReceipt, ApiError> {
        let url = self.endpoint(&["courses", course.as_str(), "certificate"])?;
        debug!(%url, "requesting certificate");
        let value = self.send(self.client.post(url)).await?;
        Ok(payload::parse_certificate(&value))
    }

    async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome, ApiError> {
        let url = self.endpoint(&["auth", "login"])?;
        debug!(%url, "logging in");
        let body = json!({ "email": email, "password": password });
        let value = self.send(self.client.post(url).json(&body)).await?;
        payload::parse_login(&value)
    }
}
