use chrono::Utc;
use course_core::model::{CourseId, Outline};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{conn, ser};
use crate::repository::{OutlineRepository, StorageError};

#[async_trait::async_trait]
impl OutlineRepository for SqliteRepository {
    async fn upsert_outline(&self, outline: &Outline) -> Result<(), StorageError> {
        let body = serde_json::to_string(outline).map_err(ser)?;

        sqlx::query(
            r"
            INSERT INTO outlines (course_id, title, body, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(course_id) DO UPDATE SET
                title = excluded.title,
                body = excluded.body,
                updated_at = excluded.updated_at
            ",
        )
        .bind(outline.course_id().as_str())
        .bind(outline.title())
        .bind(body)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }

    async fn get_outline(&self, course: &CourseId) -> Result<Outline, StorageError> {
        let row = sqlx::query("SELECT body FROM outlines WHERE course_id = ?1")
            .bind(course.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?
            .ok_or(StorageError::NotFound)?;

        let body: String = row.try_get("body").map_err(ser)?;
        serde_json::from_str(&body).map_err(ser)
    }
}
