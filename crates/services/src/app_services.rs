use std::sync::Arc;

use storage::repository::{AuthRecord, Storage};

use crate::Clock;
use crate::api::{ApiConfig, CourseApi, HttpCourseApi, InMemoryTokenStore, TokenStore};
use crate::auth_service::AuthService;
use crate::course_session::CourseSessionService;
use crate::error::AppServicesError;

/// Assembles the services a front end needs around one storage backend and
/// one course service client.
#[derive(Clone)]
pub struct AppServices {
    auth: Arc<AuthService>,
    sessions: Arc<CourseSessionService>,
    stored_login: Option<AuthRecord>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage and the HTTP client.
    ///
    /// A token passed in `token` wins over a stored login.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails, the API
    /// client cannot be built, or the stored login cannot be read.
    pub async fn new_sqlite(
        db_url: &str,
        clock: Clock,
        config: &ApiConfig,
        token: Option<String>,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        let tokens: Arc<dyn TokenStore> = Arc::new(InMemoryTokenStore::new());
        let api: Arc<dyn CourseApi> = Arc::new(HttpCourseApi::new(config, Arc::clone(&tokens))?);
        Self::assemble(clock, storage, api, tokens, token).await
    }

    /// Build services around an arbitrary storage backend and client.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError::Auth` if the stored login cannot be read.
    pub async fn assemble(
        clock: Clock,
        storage: Storage,
        api: Arc<dyn CourseApi>,
        tokens: Arc<dyn TokenStore>,
        token: Option<String>,
    ) -> Result<Self, AppServicesError> {
        let auth = Arc::new(AuthService::new(
            clock,
            Arc::clone(&api),
            Arc::clone(&tokens),
            Arc::clone(&storage.auth),
        ));
        let stored_login = auth.restore().await?;
        if let Some(token) = token {
            tokens.set(token);
        }
        let sessions = Arc::new(CourseSessionService::new(clock, api, storage));

        Ok(Self {
            auth,
            sessions,
            stored_login,
        })
    }

    #[must_use]
    pub fn auth(&self) -> Arc<AuthService> {
        Arc::clone(&self.auth)
    }

    #[must_use]
    pub fn sessions(&self) -> Arc<CourseSessionService> {
        Arc::clone(&self.sessions)
    }

    /// Login restored from storage at startup, if any.
    #[must_use]
    pub fn stored_login(&self) -> Option<&AuthRecord> {
        self.stored_login.as_ref()
    }
}
