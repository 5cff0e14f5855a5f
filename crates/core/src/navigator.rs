use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{Chapter, ExamRef, Outline, ProgressRecord, latest_attempt};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum NavigationError {
    #[error("position (chapter {chapter}, lesson {lesson}) is outside the outline")]
    OutOfRange { chapter: usize, lesson: usize },
}

//
// ─── POSITION ──────────────────────────────────────────────────────────────────
//

/// Zero-based `(chapter, lesson)` pair inside an outline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    pub chapter: usize,
    pub lesson: usize,
}

impl Position {
    #[must_use]
    pub fn new(chapter: usize, lesson: usize) -> Self {
        Self { chapter, lesson }
    }
}

/// Result of trying to move forward from a lesson.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// The current lesson is not completed yet; nothing moves.
    LessonIncomplete,
    /// The chapter boundary cannot be crossed because an earlier lesson of the
    /// chapter is still open. Points at the first open lesson.
    ChapterIncomplete(Position),
    /// Move to this lesson.
    Moved(Position),
    /// The chapter's exam has to be passed before the next chapter opens.
    ExamRequired(ExamRef),
    /// Every chapter is cleared.
    CourseComplete,
}

//
// ─── SUMMARY ───────────────────────────────────────────────────────────────────
//

/// Gate state of a chapter exam.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExamStatus {
    /// The chapter has no exam.
    NotRequired,
    /// No attempt yet.
    Outstanding,
    /// Latest attempt is waiting for a grader.
    AwaitingGrade,
    /// Latest attempt was graded and failed.
    Failed,
    Passed,
}

impl ExamStatus {
    #[must_use]
    pub fn is_cleared(self) -> bool {
        matches!(self, Self::NotRequired | Self::Passed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterSummary {
    pub title: String,
    pub completed_lessons: usize,
    pub total_lessons: usize,
    pub exam: ExamStatus,
    pub cleared: bool,
}

/// Everything the completion/progress view needs in one value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSummary {
    pub percentage: u8,
    pub completed_lessons: usize,
    pub total_lessons: usize,
    pub next: Option<Position>,
    pub certificate_eligible: bool,
    pub chapters: Vec<ChapterSummary>,
}

//
// ─── NAVIGATOR ─────────────────────────────────────────────────────────────────
//

/// Derives the learner's position and controls forward movement through a
/// course from an outline and a progress record.
///
/// Nothing is stored: every answer is recomputed from the two inputs, so the
/// position can never drift away from the completed set.
///
/// ```
/// use course_core::model::{Chapter, CourseId, Lesson, LessonId, Outline, ProgressRecord};
/// use course_core::navigator::{Navigator, Position};
///
/// let l1 = LessonId::new("l1").unwrap();
/// let l2 = LessonId::new("l2").unwrap();
/// let outline = Outline::new(
///     CourseId::new("c1").unwrap(),
///     "Course",
///     vec![Chapter::new(
///         "Intro",
///         vec![Lesson::new(l1.clone(), "One", None), Lesson::new(l2, "Two", None)],
///         None,
///     )],
/// )
/// .unwrap();
/// let progress = ProgressRecord::new([l1], Vec::new());
///
/// let nav = Navigator::new(&outline, &progress);
/// assert_eq!(nav.resolve_initial_position(), Some(Position::new(0, 1)));
/// assert_eq!(nav.completion_percentage(), 50);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Navigator<'a> {
    outline: &'a Outline,
    progress: &'a ProgressRecord,
}

impl<'a> Navigator<'a> {
    #[must_use]
    pub fn new(outline: &'a Outline, progress: &'a ProgressRecord) -> Self {
        Self { outline, progress }
    }

    #[must_use]
    pub fn outline(&self) -> &'a Outline {
        self.outline
    }

    #[must_use]
    pub fn progress(&self) -> &'a ProgressRecord {
        self.progress
    }

    /// First lesson, in document order, that is not completed. `None` means
    /// every lesson is done. Chapters without lessons are skipped.
    #[must_use]
    pub fn resolve_initial_position(&self) -> Option<Position> {
        self.outline
            .chapters()
            .iter()
            .enumerate()
            .find_map(|(ci, chapter)| {
                self.first_open_lesson(chapter)
                    .map(|li| Position::new(ci, li))
            })
    }

    /// Try to move forward from `from`.
    ///
    /// Exam gating is enforced before any chapter boundary: the next chapter
    /// is never returned while the current chapter's exam is outstanding,
    /// ungraded or failed.
    ///
    /// # Errors
    ///
    /// Returns `NavigationError::OutOfRange` if `from` does not name a lesson.
    pub fn advance(&self, from: Position) -> Result<AdvanceOutcome, NavigationError> {
        let out_of_range = NavigationError::OutOfRange {
            chapter: from.chapter,
            lesson: from.lesson,
        };
        let chapters = self.outline.chapters();
        let chapter = chapters.get(from.chapter).ok_or(out_of_range.clone())?;
        let lesson = chapter.lesson(from.lesson).ok_or(out_of_range)?;

        if !self.progress.is_completed(lesson.id()) {
            return Ok(AdvanceOutcome::LessonIncomplete);
        }

        if from.lesson + 1 < chapter.lessons().len() {
            return Ok(AdvanceOutcome::Moved(Position::new(
                from.chapter,
                from.lesson + 1,
            )));
        }

        if let Some(open) = self.first_open_lesson(chapter) {
            return Ok(AdvanceOutcome::ChapterIncomplete(Position::new(
                from.chapter,
                open,
            )));
        }

        // Walk chapter boundaries. Empty chapters have nothing to complete
        // but their exams still gate.
        let mut index = from.chapter;
        loop {
            if let Some(exam) = chapters[index].exam() {
                if !self.progress.exam_passed(exam.id()) {
                    return Ok(AdvanceOutcome::ExamRequired(exam.clone()));
                }
            }

            index += 1;
            match chapters.get(index) {
                None => return Ok(AdvanceOutcome::CourseComplete),
                Some(next) if !next.lessons().is_empty() => {
                    return Ok(AdvanceOutcome::Moved(Position::new(index, 0)));
                }
                Some(_) => {}
            }
        }
    }

    /// All lessons done and the exam (if any) passed.
    #[must_use]
    pub fn chapter_cleared(&self, index: usize) -> bool {
        self.outline
            .chapter(index)
            .is_some_and(|chapter| self.is_cleared(chapter))
    }

    #[must_use]
    pub fn exam_status(&self, exam: &ExamRef) -> ExamStatus {
        match latest_attempt(exam.id(), self.progress.attempts()) {
            None => ExamStatus::Outstanding,
            Some(a) if !a.graded => ExamStatus::AwaitingGrade,
            Some(a) if a.passed => ExamStatus::Passed,
            Some(_) => ExamStatus::Failed,
        }
    }

    /// Number of outline lessons present in the completed set. Ids that do
    /// not belong to the outline are ignored.
    #[must_use]
    pub fn completed_lessons(&self) -> usize {
        self.outline
            .lessons()
            .filter(|l| self.progress.is_completed(l.id()))
            .count()
    }

    /// Completed lessons over all lessons, as a rounded percentage in
    /// `0..=100`. An outline without lessons reports 0.
    #[must_use]
    pub fn completion_percentage(&self) -> u8 {
        percentage(self.completed_lessons(), self.outline.lesson_count())
    }

    /// Client-side pre-check for the certificate request. The server has the
    /// final say.
    #[must_use]
    pub fn certificate_eligible(&self) -> bool {
        self.completion_percentage() == 100
    }

    #[must_use]
    pub fn summary(&self) -> ProgressSummary {
        let chapters = self
            .outline
            .chapters()
            .iter()
            .map(|chapter| {
                let completed_lessons = chapter
                    .lessons()
                    .iter()
                    .filter(|l| self.progress.is_completed(l.id()))
                    .count();
                let exam = chapter
                    .exam()
                    .map_or(ExamStatus::NotRequired, |e| self.exam_status(e));
                ChapterSummary {
                    title: chapter.title().to_owned(),
                    completed_lessons,
                    total_lessons: chapter.lessons().len(),
                    exam,
                    cleared: completed_lessons == chapter.lessons().len() && exam.is_cleared(),
                }
            })
            .collect();

        ProgressSummary {
            percentage: self.completion_percentage(),
            completed_lessons: self.completed_lessons(),
            total_lessons: self.outline.lesson_count(),
            next: self.resolve_initial_position(),
            certificate_eligible: self.certificate_eligible(),
            chapters,
        }
    }

    fn first_open_lesson(&self, chapter: &Chapter) -> Option<usize> {
        chapter
            .lessons()
            .iter()
            .position(|l| !self.progress.is_completed(l.id()))
    }

    fn is_cleared(&self, chapter: &Chapter) -> bool {
        self.first_open_lesson(chapter).is_none()
            && chapter
                .exam()
                .is_none_or(|exam| self.progress.exam_passed(exam.id()))
    }
}

fn percentage(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let completed = completed.min(total);
    let rounded = (completed * 100 + total / 2) / total;
    u8::try_from(rounded).unwrap_or(100)
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        AttemptId, CourseId, ExamAttempt, ExamId, ExamKind, Lesson, LessonId,
    };
    use crate::time::fixed_now;
    use chrono::Duration;
    use proptest::prelude::*;

    fn lid(id: &str) -> LessonId {
        LessonId::new(id).unwrap()
    }

    fn lessons(ids: &[&str]) -> Vec<Lesson> {
        ids.iter()
            .map(|id| Lesson::new(lid(id), format!("Lesson {id}"), None))
            .collect()
    }

    fn exam(id: &str) -> ExamRef {
        ExamRef::new(ExamId::new(id).unwrap(), ExamKind::Quiz)
    }

    fn outline(chapters: Vec<Chapter>) -> Outline {
        Outline::new(CourseId::new("c1").unwrap(), "Course", chapters).unwrap()
    }

    fn attempt(exam_id: &str, offset_mins: i64, graded: bool, passed: bool) -> ExamAttempt {
        ExamAttempt::new(
            AttemptId::new(format!("{exam_id}-{offset_mins}")).unwrap(),
            ExamId::new(exam_id).unwrap(),
            fixed_now() + Duration::minutes(offset_mins),
            graded,
            passed,
            Some(if passed { 90.0 } else { 40.0 }),
        )
    }

    fn completed(ids: &[&str]) -> ProgressRecord {
        ProgressRecord::new(ids.iter().map(|id| lid(id)), Vec::new())
    }

    fn two_chapters_with_exam() -> Outline {
        outline(vec![
            Chapter::new("One", lessons(&["a1", "a2"]), Some(exam("E1"))),
            Chapter::new("Two", lessons(&["b1", "b2"]), None),
        ])
    }

    // ── scenarios ──

    #[test]
    fn half_done_single_chapter() {
        let outline = outline(vec![Chapter::new("One", lessons(&["l1", "l2"]), None)]);
        let progress = completed(&["l1"]);
        let nav = Navigator::new(&outline, &progress);

        assert_eq!(nav.resolve_initial_position(), Some(Position::new(0, 1)));
        assert_eq!(nav.completion_percentage(), 50);
        assert!(!nav.certificate_eligible());
    }

    #[test]
    fn fully_done_single_chapter() {
        let outline = outline(vec![Chapter::new("One", lessons(&["l1", "l2"]), None)]);
        let progress = completed(&["l1", "l2"]);
        let nav = Navigator::new(&outline, &progress);

        assert_eq!(nav.resolve_initial_position(), None);
        assert_eq!(nav.completion_percentage(), 100);
        assert!(nav.certificate_eligible());
    }

    #[test]
    fn failed_exam_blocks_next_chapter() {
        let outline = two_chapters_with_exam();
        let progress = ProgressRecord::new(
            [lid("a1"), lid("a2")],
            vec![attempt("E1", 0, true, false)],
        );
        let nav = Navigator::new(&outline, &progress);

        let outcome = nav.advance(Position::new(0, 1)).unwrap();
        assert_eq!(outcome, AdvanceOutcome::ExamRequired(exam("E1")));
        assert!(!nav.chapter_cleared(0));
    }

    #[test]
    fn later_pass_opens_next_chapter() {
        let outline = two_chapters_with_exam();
        let progress = ProgressRecord::new(
            [lid("a1"), lid("a2")],
            vec![attempt("E1", 0, true, false), attempt("E1", 30, true, true)],
        );
        let nav = Navigator::new(&outline, &progress);

        assert_eq!(
            nav.advance(Position::new(0, 1)).unwrap(),
            AdvanceOutcome::Moved(Position::new(1, 0))
        );
        assert!(nav.chapter_cleared(0));
    }

    #[test]
    fn ungraded_pass_still_gates() {
        let outline = two_chapters_with_exam();
        let progress = ProgressRecord::new(
            [lid("a1"), lid("a2")],
            vec![attempt("E1", 0, false, true)],
        );
        let nav = Navigator::new(&outline, &progress);

        assert_eq!(
            nav.advance(Position::new(0, 1)).unwrap(),
            AdvanceOutcome::ExamRequired(exam("E1"))
        );
        assert_eq!(nav.exam_status(&exam("E1")), ExamStatus::AwaitingGrade);
    }

    // ── advance ──

    #[test]
    fn incomplete_lesson_refuses_to_advance() {
        let outline = two_chapters_with_exam();
        let progress = completed(&[]);
        let nav = Navigator::new(&outline, &progress);
        assert_eq!(
            nav.advance(Position::new(0, 0)).unwrap(),
            AdvanceOutcome::LessonIncomplete
        );
    }

    #[test]
    fn moves_within_chapter() {
        let outline = two_chapters_with_exam();
        let progress = completed(&["a1"]);
        let nav = Navigator::new(&outline, &progress);
        assert_eq!(
            nav.advance(Position::new(0, 0)).unwrap(),
            AdvanceOutcome::Moved(Position::new(0, 1))
        );
    }

    #[test]
    fn chapter_boundary_requires_every_lesson() {
        let outline = two_chapters_with_exam();
        let progress = ProgressRecord::new([lid("a2")], vec![attempt("E1", 0, true, true)]);
        let nav = Navigator::new(&outline, &progress);
        assert_eq!(
            nav.advance(Position::new(0, 1)).unwrap(),
            AdvanceOutcome::ChapterIncomplete(Position::new(0, 0))
        );
    }

    #[test]
    fn last_chapter_completes_course() {
        let outline = two_chapters_with_exam();
        let progress = ProgressRecord::new(
            [lid("a1"), lid("a2"), lid("b1"), lid("b2")],
            vec![attempt("E1", 0, true, true)],
        );
        let nav = Navigator::new(&outline, &progress);
        assert_eq!(
            nav.advance(Position::new(1, 1)).unwrap(),
            AdvanceOutcome::CourseComplete
        );
    }

    #[test]
    fn final_exam_gates_course_completion() {
        let outline = outline(vec![Chapter::new("Only", lessons(&["a"]), Some(exam("F")))]);
        let progress = completed(&["a"]);
        let nav = Navigator::new(&outline, &progress);
        assert_eq!(
            nav.advance(Position::new(0, 0)).unwrap(),
            AdvanceOutcome::ExamRequired(exam("F"))
        );
    }

    #[test]
    fn empty_chapters_are_skipped_but_keep_their_gate() {
        let outline = outline(vec![
            Chapter::new("One", lessons(&["a"]), None),
            Chapter::new("Interlude", Vec::new(), Some(exam("mid"))),
            Chapter::new("Three", lessons(&["c"]), None),
        ]);

        let progress = completed(&["a"]);
        let nav = Navigator::new(&outline, &progress);
        assert_eq!(nav.resolve_initial_position(), Some(Position::new(2, 0)));
        assert_eq!(
            nav.advance(Position::new(0, 0)).unwrap(),
            AdvanceOutcome::ExamRequired(exam("mid"))
        );

        let progress = ProgressRecord::new([lid("a")], vec![attempt("mid", 0, true, true)]);
        let nav = Navigator::new(&outline, &progress);
        assert_eq!(
            nav.advance(Position::new(0, 0)).unwrap(),
            AdvanceOutcome::Moved(Position::new(2, 0))
        );
    }

    #[test]
    fn out_of_range_position_is_an_error() {
        let outline = two_chapters_with_exam();
        let progress = completed(&[]);
        let nav = Navigator::new(&outline, &progress);
        assert_eq!(
            nav.advance(Position::new(5, 0)).unwrap_err(),
            NavigationError::OutOfRange {
                chapter: 5,
                lesson: 0
            }
        );
        assert!(nav.advance(Position::new(0, 9)).is_err());
    }

    // ── percentage & summary ──

    #[test]
    fn empty_outline_has_zero_percent_and_no_position() {
        let outline = outline(vec![Chapter::new("Empty", Vec::new(), None)]);
        let progress = completed(&[]);
        let nav = Navigator::new(&outline, &progress);
        assert_eq!(nav.completion_percentage(), 0);
        assert_eq!(nav.resolve_initial_position(), None);
        assert!(!nav.certificate_eligible());
    }

    #[test]
    fn stray_completed_ids_do_not_inflate_percentage() {
        let outline = outline(vec![Chapter::new("One", lessons(&["a", "b"]), None)]);
        let progress = completed(&["a", "zzz", "yyy"]);
        let nav = Navigator::new(&outline, &progress);
        assert_eq!(nav.completion_percentage(), 50);
    }

    #[test]
    fn certificate_follows_the_rounded_percentage() {
        let ids: Vec<String> = (0..200).map(|i| format!("l{i}")).collect();
        let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        let outline = outline(vec![Chapter::new("Big", lessons(&refs), None)]);
        let progress = completed(&refs[..199]);
        let nav = Navigator::new(&outline, &progress);

        assert_eq!(nav.completion_percentage(), 100);
        assert!(nav.certificate_eligible());

        let progress = completed(&refs[..198]);
        let nav = Navigator::new(&outline, &progress);
        assert_eq!(nav.completion_percentage(), 99);
        assert!(!nav.certificate_eligible());
    }

    #[test]
    fn summary_reports_exam_states_per_chapter() {
        let outline = outline(vec![
            Chapter::new("One", lessons(&["a1"]), Some(exam("E1"))),
            Chapter::new("Two", lessons(&["b1"]), Some(exam("E2"))),
            Chapter::new("Three", lessons(&["c1"]), None),
        ]);
        let progress = ProgressRecord::new(
            [lid("a1"), lid("b1")],
            vec![attempt("E1", 0, true, true), attempt("E2", 5, true, false)],
        );
        let summary = Navigator::new(&outline, &progress).summary();

        assert_eq!(summary.percentage, 67);
        assert_eq!(summary.next, Some(Position::new(2, 0)));
        let exams: Vec<ExamStatus> = summary.chapters.iter().map(|c| c.exam).collect();
        assert_eq!(
            exams,
            vec![ExamStatus::Passed, ExamStatus::Failed, ExamStatus::NotRequired]
        );
        assert!(summary.chapters[0].cleared);
        assert!(!summary.chapters[1].cleared);
        assert!(!summary.chapters[2].cleared);
    }

    // ── properties ──

    fn arb_course() -> impl Strategy<Value = (Outline, Vec<bool>, Vec<(bool, bool)>)> {
        prop::collection::vec((0usize..4, any::<bool>()), 1..5).prop_flat_map(|shape| {
            let mut next_id = 0;
            let mut chapters = Vec::new();
            for (ci, (len, has_exam)) in shape.iter().enumerate() {
                let ids: Vec<String> = (0..*len)
                    .map(|_| {
                        next_id += 1;
                        format!("l{next_id}")
                    })
                    .collect();
                let lessons = ids
                    .iter()
                    .map(|id| Lesson::new(LessonId::new(id.clone()).unwrap(), id.clone(), None))
                    .collect();
                let exam = has_exam.then(|| exam(&format!("e{ci}")));
                chapters.push(Chapter::new(format!("ch{ci}"), lessons, exam));
            }
            let total = next_id;
            let exams = shape.len();
            let outline = outline(chapters);
            (
                Just(outline),
                prop::collection::vec(any::<bool>(), total),
                prop::collection::vec((any::<bool>(), any::<bool>()), exams),
            )
        })
    }

    fn build_progress(outline: &Outline, done: &[bool], exams: &[(bool, bool)]) -> ProgressRecord {
        let completed = outline
            .lessons()
            .zip(done)
            .filter(|(_, d)| **d)
            .map(|(l, _)| l.id().clone());
        let attempts = exams
            .iter()
            .enumerate()
            .map(|(ci, (graded, passed))| attempt(&format!("e{ci}"), 0, *graded, *passed))
            .collect();
        ProgressRecord::new(completed, attempts)
    }

    proptest! {
        #[test]
        fn initial_position_is_first_open_lesson((outline, done, exams) in arb_course()) {
            let progress = build_progress(&outline, &done, &exams);
            let nav = Navigator::new(&outline, &progress);
            let first = nav.resolve_initial_position();

            prop_assert_eq!(first, nav.resolve_initial_position());
            match first {
                Some(pos) => {
                    let lesson = outline.chapter(pos.chapter).unwrap().lesson(pos.lesson).unwrap();
                    prop_assert!(!progress.is_completed(lesson.id()));
                    let (ci, li) = outline.locate(lesson.id()).unwrap();
                    let earlier_open = outline.chapters().iter().enumerate().any(|(c, ch)| {
                        ch.lessons().iter().enumerate().any(|(l, lesson)| {
                            (c, l) < (ci, li) && !progress.is_completed(lesson.id())
                        })
                    });
                    prop_assert!(!earlier_open);
                }
                None => prop_assert!(outline.lessons().all(|l| progress.is_completed(l.id()))),
            }
        }

        #[test]
        fn percentage_is_bounded_and_monotonic((outline, done, exams) in arb_course(), pick in any::<prop::sample::Index>()) {
            let mut progress = build_progress(&outline, &done, &exams);
            let before = Navigator::new(&outline, &progress).completion_percentage();
            prop_assert!(before <= 100);

            let all: Vec<LessonId> = outline.lessons().map(|l| l.id().clone()).collect();
            if !all.is_empty() {
                let lesson = all[pick.index(all.len())].clone();
                progress.mark_completed(lesson.clone());
                let after = Navigator::new(&outline, &progress).completion_percentage();
                prop_assert!(after >= before);
                prop_assert!(after <= 100);

                let size = progress.completed().len();
                progress.mark_completed(lesson);
                prop_assert_eq!(progress.completed().len(), size);
            }
        }

        #[test]
        fn advance_never_skips_an_uncleared_exam((outline, done, exams) in arb_course()) {
            let progress = build_progress(&outline, &done, &exams);
            let nav = Navigator::new(&outline, &progress);

            for (ci, chapter) in outline.chapters().iter().enumerate() {
                for li in 0..chapter.lessons().len() {
                    if let AdvanceOutcome::Moved(to) = nav.advance(Position::new(ci, li)).unwrap() {
                        for crossed in ci..to.chapter {
                            let gate = outline.chapter(crossed).unwrap().exam();
                            prop_assert!(gate.is_none_or(|e| progress.exam_passed(e.id())));
                        }
                    }
                }
            }
        }
    }
}
