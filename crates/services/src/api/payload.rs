//! Decoding of course service JSON.
//!
//! The backend is loose about shapes: bodies may or may not be wrapped in
//! `{"data": ...}`, references may be bare strings or populated objects, and
//! lesson ids show up under several keys. Everything is normalised here so
//! nothing downstream has to guess.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use course_core::model::{
    AttemptId, Chapter, CourseId, ExamAttempt, ExamId, ExamKind, ExamRef, Lesson, LessonId,
    Outline, ProgressRecord, UserId,
};

use crate::error::ApiError;

/// Keys checked for a lesson id, in priority order.
const LESSON_ID_KEYS: [&str; 3] = ["lessonId", "_id", "id"];

/// Result of a successful login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginOutcome {
    pub user_id: UserId,
    pub token: String,
}

/// What the server hands back for an issued certificate. Both fields are
/// optional because the backend does not always echo them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CertificateReceipt {
    pub id: Option<String>,
    pub url: Option<String>,
}

fn malformed(msg: impl Into<String>) -> ApiError {
    ApiError::MalformedPayload(msg.into())
}

/// Parse a response body, treating an empty body as `null` and stripping a
/// `{"data": ...}` envelope.
pub(crate) fn parse_body(body: &str) -> Result<Value, ApiError> {
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    let value: Value = serde_json::from_str(body).map_err(|e| malformed(e.to_string()))?;
    Ok(unwrap_data(value))
}

pub(crate) fn unwrap_data(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.contains_key("data") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

/// Human-readable message from an error body, if the server sent one.
pub(crate) fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let from = |v: &Value| {
        ["message", "error"]
            .iter()
            .find_map(|k| v.get(*k).and_then(Value::as_str))
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(ToString::to_string)
    };
    from(&value).or_else(|| value.get("data").and_then(from))
}

/// Text of an id-like value: a non-blank string, a number, or an object
/// carrying `_id`.
fn id_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Object(map) => map.get("_id").and_then(id_text),
        _ => None,
    }
}

fn first_id(map: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| map.get(*k).and_then(id_text))
}

/// Resolve a lesson id from a lesson entry.
///
/// Entries are either a bare id string or an object; for objects the first
/// usable value among `lessonId`, `_id` and `id` wins.
///
/// # Errors
///
/// Returns `ApiError::MalformedPayload` when no usable id is present.
pub fn resolve_lesson_id(value: &Value) -> Result<LessonId, ApiError> {
    let raw = match value {
        Value::String(_) | Value::Number(_) => id_text(value),
        Value::Object(map) => first_id(map, &LESSON_ID_KEYS),
        _ => None,
    }
    .ok_or_else(|| malformed(format!("lesson entry without an id: {value}")))?;

    LessonId::new(raw).map_err(|e| malformed(e.to_string()))
}

/// Resolve the exam an attempt belongs to: `exam` (string or populated
/// object) first, then `examId`.
fn resolve_attempt_exam(map: &serde_json::Map<String, Value>) -> Result<ExamId, ApiError> {
    let raw = first_id(map, &["exam", "examId"])
        .or_else(|| {
            map.get("exam")
                .and_then(Value::as_object)
                .and_then(|exam| first_id(exam, &["id"]))
        })
        .ok_or_else(|| malformed("exam attempt without an exam reference"))?;
    ExamId::new(raw).map_err(|e| malformed(e.to_string()))
}

//
// ─── OUTLINE ───────────────────────────────────────────────────────────────────
//

#[derive(Deserialize)]
struct OutlineDto {
    #[serde(default, alias = "name")]
    title: String,
    #[serde(default)]
    chapters: Vec<ChapterDto>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChapterDto {
    #[serde(default, alias = "name")]
    title: String,
    #[serde(default)]
    lessons: Vec<Value>,
    #[serde(default)]
    exam: Option<Value>,
    #[serde(default)]
    exam_id: Option<Value>,
    #[serde(default)]
    exam_type: Option<String>,
}

fn string_field(map: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| map.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

fn parse_lesson(value: &Value) -> Result<Lesson, ApiError> {
    let id = resolve_lesson_id(value)?;
    let (title, video) = match value.as_object() {
        Some(map) => (
            string_field(map, &["title", "name"]),
            string_field(map, &["video", "videoUrl"]),
        ),
        None => (None, None),
    };
    let title = title.unwrap_or_else(|| id.to_string());
    Ok(Lesson::new(id, title, video))
}

fn parse_exam(chapter: &ChapterDto) -> Result<Option<ExamRef>, ApiError> {
    let (id, object_kind) = match &chapter.exam {
        Some(Value::Object(map)) => (
            first_id(map, &["_id", "id"]),
            string_field(map, &["type", "examType"]),
        ),
        Some(other) => (id_text(other), None),
        None => (None, None),
    };
    let id = id.or_else(|| chapter.exam_id.as_ref().and_then(id_text));

    let Some(id) = id else {
        return Ok(None);
    };
    let kind = object_kind
        .or_else(|| chapter.exam_type.clone())
        .map_or(ExamKind::Written, |k| ExamKind::from_backend(&k));
    let id = ExamId::new(id).map_err(|e| malformed(e.to_string()))?;
    Ok(Some(ExamRef::new(id, kind)))
}

/// Decode an outline body for `course`.
///
/// # Errors
///
/// Returns `ApiError::MalformedPayload` for unexpected shapes, missing ids or
/// duplicate lessons.
pub fn parse_outline(course: &CourseId, value: Value) -> Result<Outline, ApiError> {
    let dto: OutlineDto = serde_json::from_value(value).map_err(|e| malformed(e.to_string()))?;

    let mut chapters = Vec::with_capacity(dto.chapters.len());
    for chapter in dto.chapters {
        let lessons = chapter
            .lessons
            .iter()
            .map(parse_lesson)
            .collect::<Result<Vec<_>, _>>()?;
        let exam = parse_exam(&chapter)?;
        chapters.push(Chapter::new(chapter.title, lessons, exam));
    }

    Outline::new(course.clone(), dto.title, chapters).map_err(|e| malformed(e.to_string()))
}

//
// ─── PROGRESS ──────────────────────────────────────────────────────────────────
//

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProgressDto {
    #[serde(default, alias = "completed")]
    completed_lessons: Vec<Value>,
    #[serde(default, alias = "attempts")]
    exam_attempts: Vec<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AttemptDto {
    created_at: DateTime<Utc>,
    #[serde(default)]
    graded: bool,
    #[serde(default)]
    passed: bool,
    #[serde(default)]
    score: Option<f64>,
}

fn parse_attempt(value: Value) -> Result<ExamAttempt, ApiError> {
    let map = value
        .as_object()
        .ok_or_else(|| malformed("exam attempt is not an object"))?;
    let id = first_id(map, &["_id", "id"])
        .ok_or_else(|| malformed("exam attempt without an id"))?;
    let id = AttemptId::new(id).map_err(|e| malformed(e.to_string()))?;
    let exam_id = resolve_attempt_exam(map)?;

    let dto: AttemptDto = serde_json::from_value(value).map_err(|e| malformed(e.to_string()))?;
    Ok(ExamAttempt::new(
        id,
        exam_id,
        dto.created_at,
        dto.graded,
        dto.passed,
        dto.score,
    ))
}

/// Decode a progress body. A `null` body means no progress yet.
///
/// # Errors
///
/// Returns `ApiError::MalformedPayload` for unexpected shapes or missing ids.
pub fn parse_progress(value: Value) -> Result<ProgressRecord, ApiError> {
    if value.is_null() {
        return Ok(ProgressRecord::empty());
    }
    let dto: ProgressDto = serde_json::from_value(value).map_err(|e| malformed(e.to_string()))?;

    let completed = dto
        .completed_lessons
        .iter()
        .map(resolve_lesson_id)
        .collect::<Result<Vec<_>, _>>()?;
    let attempts = dto
        .exam_attempts
        .into_iter()
        .map(parse_attempt)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ProgressRecord::new(completed, attempts))
}

//
// ─── AUTH / CERTIFICATE ────────────────────────────────────────────────────────
//

/// Decode a login response: `token` (or `accessToken`) plus the user id from
/// `user._id`, `user.id` or `userId`.
///
/// # Errors
///
/// Returns `ApiError::MalformedPayload` when the token or user id is missing.
pub fn parse_login(value: &Value) -> Result<LoginOutcome, ApiError> {
    let map = value
        .as_object()
        .ok_or_else(|| malformed("login response is not an object"))?;
    let token = string_field(map, &["token", "accessToken"])
        .ok_or_else(|| malformed("login response without a token"))?;
    let user = map
        .get("user")
        .and_then(Value::as_object)
        .and_then(|user| first_id(user, &["_id", "id"]))
        .or_else(|| first_id(map, &["userId"]))
        .ok_or_else(|| malformed("login response without a user id"))?;
    let user_id = UserId::new(user).map_err(|e| malformed(e.to_string()))?;
    Ok(LoginOutcome { user_id, token })
}

pub(crate) fn parse_certificate(value: &Value) -> CertificateReceipt {
    match value.as_object() {
        Some(map) => CertificateReceipt {
            id: first_id(map, &["_id", "id"]),
            url: string_field(map, &["url", "certificateUrl"]),
        },
        None => CertificateReceipt::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn course() -> CourseId {
        CourseId::new("c1").unwrap()
    }

    #[test]
    fn lesson_id_priority_is_fixed() {
        let all = json!({"lessonId": "L", "_id": "M", "id": "I"});
        assert_eq!(resolve_lesson_id(&all).unwrap().as_str(), "L");

        let no_lesson_id = json!({"_id": "M", "id": "I"});
        assert_eq!(resolve_lesson_id(&no_lesson_id).unwrap().as_str(), "M");

        let only_id = json!({"id": 42});
        assert_eq!(resolve_lesson_id(&only_id).unwrap().as_str(), "42");

        let bare = json!("bare");
        assert_eq!(resolve_lesson_id(&bare).unwrap().as_str(), "bare");

        let populated = json!({"lessonId": {"_id": "P"}});
        assert_eq!(resolve_lesson_id(&populated).unwrap().as_str(), "P");
    }

    #[test]
    fn blank_or_missing_lesson_id_fails_loudly() {
        for value in [json!({"title": "x"}), json!(""), json!({"_id": "  "}), json!(null)] {
            assert!(matches!(
                resolve_lesson_id(&value),
                Err(ApiError::MalformedPayload(_))
            ));
        }
    }

    #[test]
    fn outline_accepts_wrapped_body_and_mixed_shapes() {
        let body = json!({
            "data": {
                "title": "Rust",
                "chapters": [
                    {
                        "title": "Basics",
                        "lessons": ["l1", {"_id": "l2", "title": "Borrowing", "videoUrl": "v.mp4"}],
                        "exam": {"_id": "e1", "type": "quiz"}
                    },
                    {"title": "Empty", "lessons": [], "examId": "e2"},
                    {"name": "Last", "lessons": [{"lessonId": "l3", "name": "Wrap up"}]}
                ]
            }
        })
        .to_string();

        let outline = parse_outline(&course(), parse_body(&body).unwrap()).unwrap();
        assert_eq!(outline.title(), "Rust");
        assert_eq!(outline.lesson_count(), 3);

        let basics = &outline.chapters()[0];
        assert_eq!(basics.lessons()[0].title(), "l1");
        assert_eq!(basics.lessons()[1].video(), Some("v.mp4"));
        assert_eq!(basics.exam().unwrap().kind(), ExamKind::Quiz);

        let empty = &outline.chapters()[1];
        assert_eq!(empty.exam().unwrap().id().as_str(), "e2");
        assert_eq!(empty.exam().unwrap().kind(), ExamKind::Written);

        assert_eq!(outline.chapters()[2].title(), "Last");
        assert!(outline.chapters()[2].exam().is_none());
    }

    #[test]
    fn duplicate_lessons_are_malformed() {
        let body = json!({"chapters": [{"lessons": ["a"]}, {"lessons": ["a"]}]});
        assert!(matches!(
            parse_outline(&course(), body),
            Err(ApiError::MalformedPayload(_))
        ));
    }

    #[test]
    fn progress_resolves_attempt_exam_references() {
        let body = json!({
            "completedLessons": ["l1", {"lessonId": "l2"}],
            "examAttempts": [
                {"_id": "a1", "exam": "e1", "createdAt": "2024-01-01T10:00:00Z", "graded": true, "passed": false},
                {"_id": "a2", "exam": {"_id": "e1"}, "createdAt": "2024-01-02T10:00:00Z", "graded": true, "passed": true, "score": 92.5},
                {"id": "a3", "examId": "e2", "createdAt": "2024-01-03T10:00:00Z"}
            ]
        });

        let record = parse_progress(body).unwrap();
        assert!(record.is_completed(&LessonId::new("l2").unwrap()));
        assert_eq!(record.attempts().len(), 3);
        assert!(record.exam_passed(&ExamId::new("e1").unwrap()));
        // Missing `graded` means not graded yet.
        assert!(!record.exam_passed(&ExamId::new("e2").unwrap()));
        assert_eq!(record.attempts()[1].score, Some(92.5));
    }

    #[test]
    fn attempt_without_exam_is_malformed() {
        let body = json!({"examAttempts": [{"_id": "a1", "createdAt": "2024-01-01T10:00:00Z"}]});
        assert!(matches!(
            parse_progress(body),
            Err(ApiError::MalformedPayload(_))
        ));
    }

    #[test]
    fn empty_progress_body_is_empty_record() {
        let value = parse_body("").unwrap();
        assert_eq!(parse_progress(value).unwrap(), ProgressRecord::empty());
    }

    #[test]
    fn error_message_reads_common_keys() {
        assert_eq!(
            error_message(r#"{"message":"Course not finished"}"#).as_deref(),
            Some("Course not finished")
        );
        assert_eq!(
            error_message(r#"{"data":{"error":"nope"}}"#).as_deref(),
            Some("nope")
        );
        assert_eq!(error_message("<html>"), None);
    }

    #[test]
    fn login_reads_token_and_user() {
        let outcome = parse_login(&json!({"token": "t", "user": {"_id": "u1"}})).unwrap();
        assert_eq!(outcome.user_id.as_str(), "u1");
        assert_eq!(outcome.token, "t");

        let outcome = parse_login(&json!({"accessToken": "t2", "userId": "u2"})).unwrap();
        assert_eq!(outcome.user_id.as_str(), "u2");

        assert!(parse_login(&json!({"user": {"_id": "u1"}})).is_err());
    }

    #[test]
    fn certificate_fields_are_optional() {
        let receipt = parse_certificate(&json!({"_id": "cert", "url": "https://x/c.pdf"}));
        assert_eq!(receipt.id.as_deref(), Some("cert"));
        assert_eq!(receipt.url.as_deref(), Some("https://x/c.pdf"));
        assert_eq!(parse_certificate(&Value::Null), CertificateReceipt::default());
    }
}
