use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ids::{AttemptId, ExamId, LessonId};

//
// ─── EXAM ATTEMPT ──────────────────────────────────────────────────────────────
//

/// One submission of a chapter exam, as reported by the course service.
///
/// Attempts are created and graded server-side; the client only reads them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamAttempt {
    pub id: AttemptId,
    pub exam_id: ExamId,
    pub created_at: DateTime<Utc>,
    pub graded: bool,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl ExamAttempt {
    #[must_use]
    pub fn new(
        id: AttemptId,
        exam_id: ExamId,
        created_at: DateTime<Utc>,
        graded: bool,
        passed: bool,
        score: Option<f64>,
    ) -> Self {
        Self {
            id,
            exam_id,
            created_at,
            graded,
            passed,
            score,
        }
    }

    /// An attempt only counts as a pass once it has been graded.
    #[must_use]
    pub fn counts_as_pass(&self) -> bool {
        self.graded && self.passed
    }
}

/// Most recent attempt for `exam_id`, by creation time.
///
/// When two attempts share a timestamp the one appearing later in `attempts`
/// wins, so a freshly appended attempt always takes precedence.
#[must_use]
pub fn latest_attempt<'a>(exam_id: &ExamId, attempts: &'a [ExamAttempt]) -> Option<&'a ExamAttempt> {
    attempts
        .iter()
        .filter(|a| &a.exam_id == exam_id)
        .fold(None, |best: Option<&ExamAttempt>, a| match best {
            Some(b) if b.created_at > a.created_at => Some(b),
            _ => Some(a),
        })
}

/// Outcome of the latest attempt for an exam. Ungraded or missing attempts
/// never count as a pass.
#[must_use]
pub fn latest_attempt_passed(exam_id: &ExamId, attempts: &[ExamAttempt]) -> bool {
    latest_attempt(exam_id, attempts).is_some_and(ExamAttempt::counts_as_pass)
}

//
// ─── PROGRESS RECORD ───────────────────────────────────────────────────────────
//

/// Per-learner, per-course progress: completed lessons and exam attempts.
///
/// The completed set only grows; there is no way to un-complete a lesson.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProgressRecord {
    completed: BTreeSet<LessonId>,
    attempts: Vec<ExamAttempt>,
}

impl ProgressRecord {
    #[must_use]
    pub fn new(completed: impl IntoIterator<Item = LessonId>, attempts: Vec<ExamAttempt>) -> Self {
        Self {
            completed: completed.into_iter().collect(),
            attempts,
        }
    }

    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_completed(&self, lesson: &LessonId) -> bool {
        self.completed.contains(lesson)
    }

    /// Add a lesson to the completed set. Returns `true` if it was not already
    /// present; marking twice leaves the set unchanged.
    pub fn mark_completed(&mut self, lesson: LessonId) -> bool {
        self.completed.insert(lesson)
    }

    #[must_use]
    pub fn completed(&self) -> &BTreeSet<LessonId> {
        &self.completed
    }

    #[must_use]
    pub fn attempts(&self) -> &[ExamAttempt] {
        &self.attempts
    }

    /// Attempts for one exam, newest first.
    #[must_use]
    pub fn attempts_for(&self, exam_id: &ExamId) -> Vec<&ExamAttempt> {
        let mut attempts: Vec<&ExamAttempt> =
            self.attempts.iter().filter(|a| &a.exam_id == exam_id).collect();
        attempts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        attempts
    }

    #[must_use]
    pub fn exam_passed(&self, exam_id: &ExamId) -> bool {
        latest_attempt_passed(exam_id, &self.attempts)
    }

    /// Union of this record with extra lesson ids, leaving `self` untouched.
    #[must_use]
    pub fn with_completed<'a>(&self, extra: impl IntoIterator<Item = &'a LessonId>) -> Self {
        let mut merged = self.clone();
        merged.completed.extend(extra.into_iter().cloned());
        merged
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;
    use chrono::Duration;

    fn exam(id: &str) -> ExamId {
        ExamId::new(id).unwrap()
    }

    fn attempt(id: &str, exam_id: &str, offset_mins: i64, graded: bool, passed: bool) -> ExamAttempt {
        ExamAttempt::new(
            AttemptId::new(id).unwrap(),
            exam(exam_id),
            fixed_now() + Duration::minutes(offset_mins),
            graded,
            passed,
            None,
        )
    }

    #[test]
    fn latest_attempt_wins_over_earlier_result() {
        let attempts = vec![
            attempt("a2", "e1", 10, true, false),
            attempt("a1", "e1", 0, true, true),
        ];
        assert!(!latest_attempt_passed(&exam("e1"), &attempts));

        let attempts = vec![
            attempt("a1", "e1", 0, true, false),
            attempt("a2", "e1", 10, true, true),
        ];
        assert!(latest_attempt_passed(&exam("e1"), &attempts));
    }

    #[test]
    fn ungraded_attempt_never_passes() {
        let attempts = vec![attempt("a1", "e1", 0, false, true)];
        assert!(!latest_attempt_passed(&exam("e1"), &attempts));
    }

    #[test]
    fn attempts_for_other_exams_are_ignored() {
        let attempts = vec![
            attempt("a1", "e1", 0, true, true),
            attempt("a2", "e2", 60, true, false),
        ];
        assert!(latest_attempt_passed(&exam("e1"), &attempts));
        assert!(!latest_attempt_passed(&exam("e3"), &attempts));
    }

    #[test]
    fn equal_timestamps_prefer_the_later_entry() {
        let attempts = vec![
            attempt("a1", "e1", 5, true, false),
            attempt("a2", "e1", 5, true, true),
        ];
        let latest = latest_attempt(&exam("e1"), &attempts).unwrap();
        assert_eq!(latest.id.as_str(), "a2");
    }

    #[test]
    fn mark_completed_is_idempotent() {
        let mut record = ProgressRecord::empty();
        let id = LessonId::new("l1").unwrap();
        assert!(record.mark_completed(id.clone()));
        assert!(!record.mark_completed(id.clone()));
        assert_eq!(record.completed().len(), 1);
        assert!(record.is_completed(&id));
    }

    #[test]
    fn attempts_for_sorts_newest_first() {
        let record = ProgressRecord::new(
            Vec::<LessonId>::new(),
            vec![
                attempt("a1", "e1", 0, true, false),
                attempt("a3", "e1", 20, false, false),
                attempt("a2", "e1", 10, true, false),
            ],
        );
        let ids: Vec<&str> = record
            .attempts_for(&exam("e1"))
            .iter()
            .map(|a| a.id.as_str())
            .collect();
        assert_eq!(ids, vec!["a3", "a2", "a1"]);
    }
}
