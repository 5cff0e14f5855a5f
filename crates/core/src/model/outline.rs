use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{CourseId, ExamId, LessonId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum OutlineError {
    #[error("lesson {0} appears more than once in the outline")]
    DuplicateLesson(LessonId),
}

//
// ─── LESSON ────────────────────────────────────────────────────────────────────
//

/// A single lesson. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lesson {
    id: LessonId,
    title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    video: Option<String>,
}

impl Lesson {
    #[must_use]
    pub fn new(id: LessonId, title: impl Into<String>, video: Option<String>) -> Self {
        Self {
            id,
            title: title.into(),
            video,
        }
    }

    #[must_use]
    pub fn id(&self) -> &LessonId {
        &self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Reference to the lesson video, if the lesson has one.
    #[must_use]
    pub fn video(&self) -> Option<&str> {
        self.video.as_deref()
    }
}

//
// ─── EXAM ──────────────────────────────────────────────────────────────────────
//

/// How an exam gets graded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExamKind {
    /// Multiple choice, graded by the server on submission.
    Quiz,
    /// Free-form answers that wait for a human grader.
    Written,
}

impl ExamKind {
    /// Maps a backend `type` string. Anything that is not a quiz is treated as
    /// human-graded, which is the conservative choice for gating.
    #[must_use]
    pub fn from_backend(kind: &str) -> Self {
        if kind.trim().eq_ignore_ascii_case("quiz") {
            Self::Quiz
        } else {
            Self::Written
        }
    }

    #[must_use]
    pub fn requires_manual_grading(self) -> bool {
        matches!(self, Self::Written)
    }
}

/// The exam that closes a chapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExamRef {
    id: ExamId,
    kind: ExamKind,
}

impl ExamRef {
    #[must_use]
    pub fn new(id: ExamId, kind: ExamKind) -> Self {
        Self { id, kind }
    }

    #[must_use]
    pub fn id(&self) -> &ExamId {
        &self.id
    }

    #[must_use]
    pub fn kind(&self) -> ExamKind {
        self.kind
    }
}

//
// ─── CHAPTER ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    title: String,
    lessons: Vec<Lesson>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    exam: Option<ExamRef>,
}

impl Chapter {
    #[must_use]
    pub fn new(title: impl Into<String>, lessons: Vec<Lesson>, exam: Option<ExamRef>) -> Self {
        Self {
            title: title.into(),
            lessons,
            exam,
        }
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn lessons(&self) -> &[Lesson] {
        &self.lessons
    }

    #[must_use]
    pub fn exam(&self) -> Option<&ExamRef> {
        self.exam.as_ref()
    }

    #[must_use]
    pub fn lesson(&self, index: usize) -> Option<&Lesson> {
        self.lessons.get(index)
    }
}

//
// ─── OUTLINE ───────────────────────────────────────────────────────────────────
//

/// Static, ordered structure of a course: chapters, their lessons, and the
/// optional exam closing each chapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawOutline")]
pub struct Outline {
    course_id: CourseId,
    title: String,
    chapters: Vec<Chapter>,
}

impl Outline {
    /// Build an outline, checking that lesson ids are unique across chapters.
    ///
    /// # Errors
    ///
    /// Returns `OutlineError::DuplicateLesson` if a lesson id occurs twice.
    pub fn new(
        course_id: CourseId,
        title: impl Into<String>,
        chapters: Vec<Chapter>,
    ) -> Result<Self, OutlineError> {
        let mut seen = HashSet::new();
        for lesson in chapters.iter().flat_map(|c| c.lessons.iter()) {
            if !seen.insert(&lesson.id) {
                return Err(OutlineError::DuplicateLesson(lesson.id.clone()));
            }
        }

        Ok(Self {
            course_id,
            title: title.into(),
            chapters,
        })
    }

    #[must_use]
    pub fn course_id(&self) -> &CourseId {
        &self.course_id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn chapters(&self) -> &[Chapter] {
        &self.chapters
    }

    #[must_use]
    pub fn chapter(&self, index: usize) -> Option<&Chapter> {
        self.chapters.get(index)
    }

    /// Total number of lessons across all chapters.
    #[must_use]
    pub fn lesson_count(&self) -> usize {
        self.chapters.iter().map(|c| c.lessons.len()).sum()
    }

    /// All lessons in document order.
    pub fn lessons(&self) -> impl Iterator<Item = &Lesson> {
        self.chapters.iter().flat_map(|c| c.lessons.iter())
    }

    #[must_use]
    pub fn contains_lesson(&self, id: &LessonId) -> bool {
        self.lessons().any(|l| l.id() == id)
    }

    /// Locate a lesson as `(chapter_index, lesson_index)`.
    #[must_use]
    pub fn locate(&self, id: &LessonId) -> Option<(usize, usize)> {
        self.chapters.iter().enumerate().find_map(|(ci, chapter)| {
            chapter
                .lessons
                .iter()
                .position(|l| l.id() == id)
                .map(|li| (ci, li))
        })
    }
}

#[derive(Deserialize)]
struct RawOutline {
    course_id: CourseId,
    title: String,
    chapters: Vec<Chapter>,
}

impl TryFrom<RawOutline> for Outline {
    type Error = OutlineError;

    fn try_from(raw: RawOutline) -> Result<Self, Self::Error> {
        Outline::new(raw.course_id, raw.title, raw.chapters)
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;

    fn lesson(id: &str) -> Lesson {
        Lesson::new(LessonId::new(id).unwrap(), format!("Lesson {id}"), None)
    }

    fn course() -> CourseId {
        CourseId::new("c1").unwrap()
    }

    #[test]
    fn duplicate_lessons_are_rejected() {
        let chapters = vec![
            Chapter::new("One", vec![lesson("a"), lesson("b")], None),
            Chapter::new("Two", vec![lesson("b")], None),
        ];
        let err = Outline::new(course(), "Course", chapters).unwrap_err();
        assert_eq!(err, OutlineError::DuplicateLesson(LessonId::new("b").unwrap()));
    }

    #[test]
    fn locate_finds_chapter_and_index() {
        let chapters = vec![
            Chapter::new("One", vec![lesson("a")], None),
            Chapter::new("Empty", vec![], None),
            Chapter::new("Three", vec![lesson("b"), lesson("c")], None),
        ];
        let outline = Outline::new(course(), "Course", chapters).unwrap();

        assert_eq!(outline.lesson_count(), 3);
        assert_eq!(outline.locate(&LessonId::new("c").unwrap()), Some((2, 1)));
        assert_eq!(outline.locate(&LessonId::new("zz").unwrap()), None);
    }

    #[test]
    fn exam_kind_defaults_to_manual_grading() {
        assert_eq!(ExamKind::from_backend("Quiz"), ExamKind::Quiz);
        assert_eq!(ExamKind::from_backend("essay"), ExamKind::Written);
        assert!(ExamKind::Written.requires_manual_grading());
        assert!(!ExamKind::Quiz.requires_manual_grading());
    }

    #[test]
    fn deserializing_revalidates_lesson_ids() {
        let json = r#"{
            "course_id": "c1",
            "title": "Course",
            "chapters": [
                {"title": "One", "lessons": [{"id": "a", "title": "A"}]},
                {"title": "Two", "lessons": [{"id": "a", "title": "A again"}]}
            ]
        }"#;
        assert!(serde_json::from_str::<Outline>(json).is_err());
    }
}
