use async_trait::async_trait;
use chrono::{DateTime, Utc};
use course_core::model::{CourseId, LessonId, LessonSync, Outline, ProgressRecord, UserId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Last confirmed progress received from the course service.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    pub record: ProgressRecord,
    pub fetched_at: DateTime<Utc>,
}

/// Journal entry for a locally initiated lesson completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LessonSyncRecord {
    pub lesson_id: LessonId,
    pub state: LessonSync,
    pub updated_at: DateTime<Utc>,
}

/// Stored login for the course service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRecord {
    pub user_id: UserId,
    pub token: String,
    pub saved_at: DateTime<Utc>,
}

#[async_trait]
pub trait OutlineRepository: Send + Sync {
    /// Cache or replace the outline of a course.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the outline cannot be stored.
    async fn upsert_outline(&self, outline: &Outline) -> Result<(), StorageError>;

    /// Fetch a cached outline.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the course was never cached.
    async fn get_outline(&self, course: &CourseId) -> Result<Outline, StorageError>;
}

#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Replace the confirmed progress snapshot for `(user, course)`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the snapshot cannot be stored.
    async fn save_progress(
        &self,
        user: &UserId,
        course: &CourseId,
        snapshot: &ProgressSnapshot,
    ) -> Result<(), StorageError>;

    /// Fetch the confirmed progress snapshot for `(user, course)`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if nothing was saved yet.
    async fn get_progress(
        &self,
        user: &UserId,
        course: &CourseId,
    ) -> Result<ProgressSnapshot, StorageError>;
}

#[async_trait]
pub trait LessonSyncRepository: Send + Sync {
    /// Insert or overwrite the sync state of one lesson.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the entry cannot be stored.
    async fn record_sync(
        &self,
        user: &UserId,
        course: &CourseId,
        record: &LessonSyncRecord,
    ) -> Result<(), StorageError>;

    /// All journal entries for `(user, course)`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on read failures.
    async fn syncs_for(
        &self,
        user: &UserId,
        course: &CourseId,
    ) -> Result<Vec<LessonSyncRecord>, StorageError>;

    /// Drop the entry for one lesson. Missing entries are not an error.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on write failures.
    async fn clear_sync(
        &self,
        user: &UserId,
        course: &CourseId,
        lesson: &LessonId,
    ) -> Result<(), StorageError>;
}

#[async_trait]
pub trait AuthRepository: Send + Sync {
    /// Store the current login, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the record cannot be stored.
    async fn save_auth(&self, record: &AuthRecord) -> Result<(), StorageError>;

    /// The stored login, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on read failures.
    async fn get_auth(&self) -> Result<Option<AuthRecord>, StorageError>;

    /// Forget the stored login.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on write failures.
    async fn clear_auth(&self) -> Result<(), StorageError>;
}

type CourseKey = (UserId, CourseId);

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    outlines: Arc<Mutex<HashMap<CourseId, Outline>>>,
    progress: Arc<Mutex<HashMap<CourseKey, ProgressSnapshot>>>,
    syncs: Arc<Mutex<HashMap<CourseKey, Vec<LessonSyncRecord>>>>,
    auth: Arc<Mutex<Option<AuthRecord>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<E: ToString>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait]
impl OutlineRepository for InMemoryRepository {
    async fn upsert_outline(&self, outline: &Outline) -> Result<(), StorageError> {
        let mut guard = self.outlines.lock().map_err(poisoned)?;
        guard.insert(outline.course_id().clone(), outline.clone());
        Ok(())
    }

    async fn get_outline(&self, course: &CourseId) -> Result<Outline, StorageError> {
        let guard = self.outlines.lock().map_err(poisoned)?;
        guard.get(course).cloned().ok_or(StorageError::NotFound)
    }
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn save_progress(
        &self,
        user: &UserId,
        course: &CourseId,
        snapshot: &ProgressSnapshot,
    ) -> Result<(), StorageError> {
        let mut guard = self.progress.lock().map_err(poisoned)?;
        guard.insert((user.clone(), course.clone()), snapshot.clone());
        Ok(())
    }

    async fn get_progress(
        &self,
        user: &UserId,
        course: &CourseId,
    ) -> Result<ProgressSnapshot, StorageError> {
        let guard = self.progress.lock().map_err(poisoned)?;
        guard
            .get(&(user.clone(), course.clone()))
            .cloned()
            .ok_or(StorageError::NotFound)
    }
}

#[async_trait]
impl LessonSyncRepository for InMemoryRepository {
    async fn record_sync(
        &self,
        user: &UserId,
        course: &CourseId,
        record: &LessonSyncRecord,
    ) -> Result<(), StorageError> {
        let mut guard = self.syncs.lock().map_err(poisoned)?;
        let entries = guard.entry((user.clone(), course.clone())).or_default();
        entries.retain(|r| r.lesson_id != record.lesson_id);
        entries.push(record.clone());
        Ok(())
    }

    async fn syncs_for(
        &self,
        user: &UserId,
        course: &CourseId,
    ) -> Result<Vec<LessonSyncRecord>, StorageError> {
        let guard = self.syncs.lock().map_err(poisoned)?;
        let mut entries = guard
            .get(&(user.clone(), course.clone()))
            .cloned()
            .unwrap_or_default();
        entries.sort_by(|a, b| a.updated_at.cmp(&b.updated_at));
        Ok(entries)
    }

    async fn clear_sync(
        &self,
        user: &UserId,
        course: &CourseId,
        lesson: &LessonId,
    ) -> Result<(), StorageError> {
        let mut guard = self.syncs.lock().map_err(poisoned)?;
        if let Some(entries) = guard.get_mut(&(user.clone(), course.clone())) {
            entries.retain(|r| &r.lesson_id != lesson);
        }
        Ok(())
    }
}

#[async_trait]
impl AuthRepository for InMemoryRepository {
    async fn save_auth(&self, record: &AuthRecord) -> Result<(), StorageError> {
        let mut guard = self.auth.lock().map_err(poisoned)?;
        *guard = Some(record.clone());
        Ok(())
    }

    async fn get_auth(&self) -> Result<Option<AuthRecord>, StorageError> {
        let guard = self.auth.lock().map_err(poisoned)?;
        Ok(guard.clone())
    }

    async fn clear_auth(&self) -> Result<(), StorageError> {
        let mut guard = self.auth.lock().map_err(poisoned)?;
        *guard = None;
        Ok(())
    }
}

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub outlines: Arc<dyn OutlineRepository>,
    pub progress: Arc<dyn ProgressRepository>,
    pub syncs: Arc<dyn LessonSyncRepository>,
    pub auth: Arc<dyn AuthRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_repository(InMemoryRepository::new())
    }

    /// Use one repository value for every concern.
    #[must_use]
    pub fn from_repository<R>(repo: R) -> Self
    where
        R: OutlineRepository
            + ProgressRepository
            + LessonSyncRepository
            + AuthRepository
            + Clone
            + 'static,
    {
        Self {
            outlines: Arc::new(repo.clone()),
            progress: Arc::new(repo.clone()),
            syncs: Arc::new(repo.clone()),
            auth: Arc::new(repo),
        }
    }
}
