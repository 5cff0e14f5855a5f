use course_core::model::{CourseId, LessonId, UserId};

use super::SqliteRepository;
use super::mapping::{conn, map_sync_row, sync_reason};
use crate::repository::{LessonSyncRecord, LessonSyncRepository, StorageError};

#[async_trait::async_trait]
impl LessonSyncRepository for SqliteRepository {
    async fn record_sync(
        &self,
        user: &UserId,
        course: &CourseId,
        record: &LessonSyncRecord,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO lesson_syncs (user_id, course_id, lesson_id, state, reason, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(user_id, course_id, lesson_id) DO UPDATE SET
                state = excluded.state,
                reason = excluded.reason,
                updated_at = excluded.updated_at
            ",
        )
        .bind(user.as_str())
        .bind(course.as_str())
        .bind(record.lesson_id.as_str())
        .bind(record.state.label())
        .bind(sync_reason(&record.state))
        .bind(record.updated_at)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }

    async fn syncs_for(
        &self,
        user: &UserId,
        course: &CourseId,
    ) -> Result<Vec<LessonSyncRecord>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT lesson_id, state, reason, updated_at
            FROM lesson_syncs
            WHERE user_id = ?1 AND course_id = ?2
            ORDER BY updated_at ASC, lesson_id ASC
            ",
        )
        .bind(user.as_str())
        .bind(course.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_sync_row).collect()
    }

    async fn clear_sync(
        &self,
        user: &UserId,
        course: &CourseId,
        lesson: &LessonId,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "DELETE FROM lesson_syncs WHERE user_id = ?1 AND course_id = ?2 AND lesson_id = ?3",
        )
        .bind(user.as_str())
        .bind(course.as_str())
        .bind(lesson.as_str())
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }
}
