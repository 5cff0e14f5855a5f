use std::str::FromStr;

use chrono::{DateTime, Utc};
use course_core::model::{AttemptId, ExamAttempt, ExamId, LessonId, LessonSync, ParseIdError};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::repository::{LessonSyncRecord, StorageError};

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn(e: sqlx::Error) -> StorageError {
    StorageError::Connection(e.to_string())
}

pub(crate) fn parse_id<T>(row: &SqliteRow, column: &str) -> Result<T, StorageError>
where
    T: FromStr<Err = ParseIdError>,
{
    row.try_get::<String, _>(column)
        .map_err(ser)?
        .parse()
        .map_err(ser)
}

fn flag(row: &SqliteRow, column: &str) -> Result<bool, StorageError> {
    match row.try_get::<i64, _>(column).map_err(ser)? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(StorageError::Serialization(format!(
            "invalid {column} flag: {other}"
        ))),
    }
}

pub(crate) fn map_attempt_row(row: &SqliteRow) -> Result<ExamAttempt, StorageError> {
    Ok(ExamAttempt::new(
        parse_id::<AttemptId>(row, "attempt_id")?,
        parse_id::<ExamId>(row, "exam_id")?,
        row.try_get::<DateTime<Utc>, _>("created_at").map_err(ser)?,
        flag(row, "graded")?,
        flag(row, "passed")?,
        row.try_get::<Option<f64>, _>("score").map_err(ser)?,
    ))
}

pub(crate) fn map_sync_row(row: &SqliteRow) -> Result<LessonSyncRecord, StorageError> {
    let label: String = row.try_get("state").map_err(ser)?;
    let reason: Option<String> = row.try_get("reason").map_err(ser)?;
    let state = LessonSync::from_label(&label, reason)
        .ok_or_else(|| StorageError::Serialization(format!("invalid sync state: {label}")))?;

    Ok(LessonSyncRecord {
        lesson_id: parse_id::<LessonId>(row, "lesson_id")?,
        state,
        updated_at: row.try_get("updated_at").map_err(ser)?,
    })
}

pub(crate) fn sync_reason(state: &LessonSync) -> Option<&str> {
    match state {
        LessonSync::Failed { reason } => Some(reason.as_str()),
        LessonSync::Pending | LessonSync::Committed => None,
    }
}
