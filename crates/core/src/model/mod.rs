mod ids;
mod outline;
mod progress;
mod sync;

pub use ids::{AttemptId, CourseId, ExamId, LessonId, ParseIdError, UserId};

pub use outline::{Chapter, ExamKind, ExamRef, Lesson, Outline, OutlineError};
pub use progress::{ExamAttempt, ProgressRecord, latest_attempt, latest_attempt_passed};
pub use sync::LessonSync;
