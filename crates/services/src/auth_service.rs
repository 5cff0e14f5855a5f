use std::sync::Arc;

use tracing::info;

use storage::repository::{AuthRecord, AuthRepository};

use crate::Clock;
use crate::api::{CourseApi, TokenStore};
use crate::error::AuthError;

/// Logs in against the course service and keeps the token across runs.
#[derive(Clone)]
pub struct AuthService {
    clock: Clock,
    api: Arc<dyn CourseApi>,
    tokens: Arc<dyn TokenStore>,
    auth: Arc<dyn AuthRepository>,
}

impl AuthService {
    #[must_use]
    pub fn new(
        clock: Clock,
        api: Arc<dyn CourseApi>,
        tokens: Arc<dyn TokenStore>,
        auth: Arc<dyn AuthRepository>,
    ) -> Self {
        Self {
            clock,
            api,
            tokens,
            auth,
        }
    }

    /// Log in, then store the token for this process and for later runs.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Api` for rejected credentials and
    /// `AuthError::Storage` if the login cannot be persisted.
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthRecord, AuthError> {
        let outcome = self.api.login(email, password).await?;
        let record = AuthRecord {
            user_id: outcome.user_id,
            token: outcome.token,
            saved_at: self.clock.now(),
        };
        self.auth.save_auth(&record).await?;
        self.tokens.set(record.token.clone());
        info!(user = %record.user_id, "logged in");
        Ok(record)
    }

    /// Forget the token everywhere.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Storage` if the stored login cannot be removed.
    pub async fn logout(&self) -> Result<(), AuthError> {
        self.tokens.clear();
        self.auth.clear_auth().await?;
        info!("logged out");
        Ok(())
    }

    /// Load a previously stored login into the token store.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Storage` on read failures.
    pub async fn restore(&self) -> Result<Option<AuthRecord>, AuthError> {
        let record = self.auth.get_auth().await?;
        if let Some(record) = &record {
            self.tokens.set(record.token.clone());
        }
        Ok(record)
    }
}
