use course_core::model::{CourseId, LessonId, ProgressRecord, UserId};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{conn, map_attempt_row, parse_id, ser};
use crate::repository::{ProgressRepository, ProgressSnapshot, StorageError};

#[async_trait::async_trait]
impl ProgressRepository for SqliteRepository {
    async fn save_progress(
        &self,
        user: &UserId,
        course: &CourseId,
        snapshot: &ProgressSnapshot,
    ) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await.map_err(conn)?;

        sqlx::query(
            r"
            INSERT INTO progress_snapshots (user_id, course_id, fetched_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(user_id, course_id) DO UPDATE SET
                fetched_at = excluded.fetched_at
            ",
        )
        .bind(user.as_str())
        .bind(course.as_str())
        .bind(snapshot.fetched_at)
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        // The server view is authoritative: replace children wholesale.
        sqlx::query("DELETE FROM completed_lessons WHERE user_id = ?1 AND course_id = ?2")
            .bind(user.as_str())
            .bind(course.as_str())
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        sqlx::query("DELETE FROM exam_attempts WHERE user_id = ?1 AND course_id = ?2")
            .bind(user.as_str())
            .bind(course.as_str())
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

        for lesson in snapshot.record.completed() {
            sqlx::query(
                r"
                INSERT INTO completed_lessons (user_id, course_id, lesson_id)
                VALUES (?1, ?2, ?3)
                ",
            )
            .bind(user.as_str())
            .bind(course.as_str())
            .bind(lesson.as_str())
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        }

        for (ordinal, attempt) in snapshot.record.attempts().iter().enumerate() {
            let ordinal = i64::try_from(ordinal)
                .map_err(|_| StorageError::Serialization("attempt ordinal overflow".into()))?;
            sqlx::query(
                r"
                INSERT INTO exam_attempts
                    (user_id, course_id, attempt_id, exam_id, ordinal, created_at, graded, passed, score)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                ON CONFLICT(user_id, course_id, attempt_id) DO UPDATE SET
                    exam_id = excluded.exam_id,
                    ordinal = excluded.ordinal,
                    created_at = excluded.created_at,
                    graded = excluded.graded,
                    passed = excluded.passed,
                    score = excluded.score
                ",
            )
            .bind(user.as_str())
            .bind(course.as_str())
            .bind(attempt.id.as_str())
            .bind(attempt.exam_id.as_str())
            .bind(ordinal)
            .bind(attempt.created_at)
            .bind(i64::from(attempt.graded))
            .bind(i64::from(attempt.passed))
            .bind(attempt.score)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        }

        tx.commit().await.map_err(conn)?;
        Ok(())
    }

    async fn get_progress(
        &self,
        user: &UserId,
        course: &CourseId,
    ) -> Result<ProgressSnapshot, StorageError> {
        let header = sqlx::query(
            "SELECT fetched_at FROM progress_snapshots WHERE user_id = ?1 AND course_id = ?2",
        )
        .bind(user.as_str())
        .bind(course.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?
        .ok_or(StorageError::NotFound)?;

        let lesson_rows = sqlx::query(
            r"
            SELECT lesson_id FROM completed_lessons
            WHERE user_id = ?1 AND course_id = ?2
            ",
        )
        .bind(user.as_str())
        .bind(course.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let attempt_rows = sqlx::query(
            r"
            SELECT attempt_id, exam_id, created_at, graded, passed, score
            FROM exam_attempts
            WHERE user_id = ?1 AND course_id = ?2
            ORDER BY ordinal ASC
            ",
        )
        .bind(user.as_str())
        .bind(course.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let completed = lesson_rows
            .iter()
            .map(|row| parse_id::<LessonId>(row, "lesson_id"))
            .collect::<Result<Vec<_>, _>>()?;
        let attempts = attempt_rows
            .iter()
            .map(map_attempt_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ProgressSnapshot {
            record: ProgressRecord::new(completed, attempts),
            fetched_at: header.try_get("fetched_at").map_err(ser)?,
        })
    }
}
