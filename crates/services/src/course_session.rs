use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use course_core::model::{CourseId, LessonId, LessonSync, Outline, ProgressRecord, UserId};
use course_core::navigator::{AdvanceOutcome, Navigator, Position, ProgressSummary};
use storage::repository::{LessonSyncRecord, ProgressSnapshot, Storage, StorageError};

use crate::Clock;
use crate::api::{CertificateReceipt, CourseApi};
use crate::error::{ApiError, SessionError};
use crate::lifetime::SessionLifetime;

/// Reason recorded for completions whose request never got an answer.
const INTERRUPTED: &str = "interrupted before the server confirmed";

//
// ─── SESSION STATE ─────────────────────────────────────────────────────────────
//

/// One learner viewing one course.
///
/// Holds the outline, the confirmed progress and the sync state of every
/// completion initiated from this device. Navigation always runs against the
/// effective record (confirmed plus in-flight completions).
#[derive(Debug)]
pub struct CourseSession {
    user: UserId,
    outline: Outline,
    confirmed: ProgressRecord,
    syncs: BTreeMap<LessonId, LessonSync>,
    effective: ProgressRecord,
    lifetime: SessionLifetime,
}

impl CourseSession {
    fn new(
        user: UserId,
        outline: Outline,
        confirmed: ProgressRecord,
        syncs: BTreeMap<LessonId, LessonSync>,
        lifetime: SessionLifetime,
    ) -> Self {
        let mut session = Self {
            user,
            outline,
            effective: confirmed.clone(),
            confirmed,
            syncs,
            lifetime,
        };
        session.rebuild_effective();
        session
    }

    fn rebuild_effective(&mut self) {
        let in_flight = self
            .syncs
            .iter()
            .filter(|(_, state)| state.counts_as_completed())
            .map(|(lesson, _)| lesson);
        self.effective = self.confirmed.with_completed(in_flight);
    }

    fn set_sync(&mut self, lesson: LessonId, state: LessonSync) {
        self.syncs.insert(lesson, state);
        self.rebuild_effective();
    }

    fn clear_sync(&mut self, lesson: &LessonId) {
        self.syncs.remove(lesson);
        self.rebuild_effective();
    }

    #[must_use]
    pub fn user(&self) -> &UserId {
        &self.user
    }

    #[must_use]
    pub fn course_id(&self) -> &CourseId {
        self.outline.course_id()
    }

    #[must_use]
    pub fn outline(&self) -> &Outline {
        &self.outline
    }

    /// Progress acknowledged by the server.
    #[must_use]
    pub fn confirmed(&self) -> &ProgressRecord {
        &self.confirmed
    }

    /// Confirmed progress plus completions still in flight.
    #[must_use]
    pub fn effective(&self) -> &ProgressRecord {
        &self.effective
    }

    #[must_use]
    pub fn sync_state(&self, lesson: &LessonId) -> Option<&LessonSync> {
        self.syncs.get(lesson)
    }

    /// Lessons whose completion request failed, with the failure reason.
    pub fn failed_lessons(&self) -> impl Iterator<Item = (&LessonId, &str)> {
        self.syncs.iter().filter_map(|(lesson, state)| match state {
            LessonSync::Failed { reason } => Some((lesson, reason.as_str())),
            _ => None,
        })
    }

    #[must_use]
    pub fn navigator(&self) -> Navigator<'_> {
        Navigator::new(&self.outline, &self.effective)
    }

    /// First lesson not yet completed, or `None` when every lesson is done.
    #[must_use]
    pub fn current_position(&self) -> Option<Position> {
        self.navigator().resolve_initial_position()
    }

    #[must_use]
    pub fn summary(&self) -> ProgressSummary {
        self.navigator().summary()
    }

    #[must_use]
    pub fn lifetime(&self) -> &SessionLifetime {
        &self.lifetime
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lifetime.is_closed()
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.is_closed() {
            Err(SessionError::Closed)
        } else {
            Ok(())
        }
    }
}

/// Outcome of `CourseSessionService::retry_failed`.
#[derive(Debug, Default)]
pub struct RetryReport {
    pub committed: Vec<LessonId>,
    pub failed: Vec<(LessonId, ApiError)>,
}

//
// ─── SERVICE ───────────────────────────────────────────────────────────────────
//

/// Loads course sessions, applies completions and requests certificates.
#[derive(Clone)]
pub struct CourseSessionService {
    clock: Clock,
    api: Arc<dyn CourseApi>,
    storage: Storage,
}

impl CourseSessionService {
    #[must_use]
    pub fn new(clock: Clock, api: Arc<dyn CourseApi>, storage: Storage) -> Self {
        Self {
            clock,
            api,
            storage,
        }
    }

    /// Fetch outline and progress together and build a session bound to
    /// `lifetime`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Load` if either fetch fails,
    /// `SessionError::Closed` if the lifetime ends first, or
    /// `SessionError::Storage` if local state cannot be read or written.
    pub async fn open(
        &self,
        user: &UserId,
        course: &CourseId,
        lifetime: SessionLifetime,
    ) -> Result<CourseSession, SessionError> {
        let (outline, fetched) = self.fetch(course, &lifetime).await?;
        let journal = self.storage.syncs.syncs_for(user, course).await?;
        let syncs: BTreeMap<LessonId, LessonSync> = journal
            .into_iter()
            .map(|record| (record.lesson_id, record.state))
            .collect();

        let mut session = CourseSession::new(
            user.clone(),
            outline.clone(),
            ProgressRecord::empty(),
            BTreeMap::new(),
            lifetime,
        );
        self.apply_fetch(&mut session, outline, fetched, syncs).await?;

        info!(
            user = %user,
            course = %course,
            percentage = session.navigator().completion_percentage(),
            "course session opened"
        );
        Ok(session)
    }

    /// Re-fetch outline and progress for an open session.
    ///
    /// # Errors
    ///
    /// Same as [`CourseSessionService::open`]. On error the session keeps its
    /// previous state.
    pub async fn refresh(&self, session: &mut CourseSession) -> Result<(), SessionError> {
        session.ensure_open()?;
        let course = session.course_id().clone();
        let (outline, fetched) = self.fetch(&course, &session.lifetime).await?;
        let syncs = session.syncs.clone();
        let merged = fetched.with_completed(session.confirmed.completed());
        self.apply_fetch(session, outline, merged, syncs).await?;
        debug!(course = %course, "course session refreshed");
        Ok(())
    }

    async fn fetch(
        &self,
        course: &CourseId,
        lifetime: &SessionLifetime,
    ) -> Result<(Outline, ProgressRecord), SessionError> {
        let fetch = async {
            tokio::try_join!(
                self.api.fetch_outline(course),
                self.api.fetch_progress(course)
            )
        };
        lifetime.run(fetch).await?.map_err(|e| {
            warn!(course = %course, error = %e, "failed to load course");
            SessionError::Load(e)
        })
    }

    /// Reconcile the local sync journal with freshly fetched progress and
    /// install the result into `session`.
    ///
    /// Entries the server already reports are dropped. Entries for lessons no
    /// longer in the outline are dropped. `Committed` entries stay in the
    /// confirmed set. `Pending` entries cannot be in flight here, so they are
    /// turned into failures the learner can retry.
    async fn apply_fetch(
        &self,
        session: &mut CourseSession,
        outline: Outline,
        fetched: ProgressRecord,
        syncs: BTreeMap<LessonId, LessonSync>,
    ) -> Result<(), SessionError> {
        let user = session.user.clone();
        let course = outline.course_id().clone();
        let now = self.clock.now();

        let mut confirmed = fetched.clone();
        let mut kept = BTreeMap::new();
        for (lesson, state) in syncs {
            if fetched.is_completed(&lesson) || !outline.contains_lesson(&lesson) {
                self.storage.syncs.clear_sync(&user, &course, &lesson).await?;
                continue;
            }
            let state = match state {
                LessonSync::Committed => {
                    confirmed.mark_completed(lesson.clone());
                    LessonSync::Committed
                }
                LessonSync::Pending => {
                    let failed = LessonSync::Failed {
                        reason: INTERRUPTED.into(),
                    };
                    self.record(&user, &course, &lesson, &failed, now).await?;
                    failed
                }
                failed @ LessonSync::Failed { .. } => failed,
            };
            kept.insert(lesson, state);
        }

        self.storage.outlines.upsert_outline(&outline).await?;
        self.storage
            .progress
            .save_progress(
                &user,
                &course,
                &ProgressSnapshot {
                    record: confirmed.clone(),
                    fetched_at: now,
                },
            )
            .await?;

        session.outline = outline;
        session.confirmed = confirmed;
        session.syncs = kept;
        session.rebuild_effective();
        Ok(())
    }

    async fn record(
        &self,
        user: &UserId,
        course: &CourseId,
        lesson: &LessonId,
        state: &LessonSync,
        at: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), StorageError> {
        self.storage
            .syncs
            .record_sync(
                user,
                course,
                &LessonSyncRecord {
                    lesson_id: lesson.clone(),
                    state: state.clone(),
                    updated_at: at,
                },
            )
            .await
    }

    /// Mark `lesson` complete.
    ///
    /// The lesson counts as completed right away. If the server rejects the
    /// request, or it fails in transit, the lesson is rolled back and kept as
    /// failed for [`CourseSessionService::retry_failed`]. Completing an
    /// already confirmed lesson is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::UnknownLesson` for ids outside the outline,
    /// `SessionError::MarkComplete` when the request fails,
    /// `SessionError::Closed` if the session ended while the request was in
    /// flight, or `SessionError::Storage` if the pending state cannot be
    /// journaled. A failed completion is reported as `MarkComplete` even when
    /// journaling the failure also fails.
    pub async fn mark_complete(
        &self,
        session: &mut CourseSession,
        lesson: &LessonId,
    ) -> Result<(), SessionError> {
        session.ensure_open()?;
        if !session.outline.contains_lesson(lesson) {
            return Err(SessionError::UnknownLesson(lesson.clone()));
        }
        if session.confirmed.is_completed(lesson) {
            debug!(lesson = %lesson, "lesson already completed");
            return Ok(());
        }

        let user = session.user.clone();
        let course = session.course_id().clone();

        let previous = session.syncs.get(lesson).cloned();
        session.set_sync(lesson.clone(), LessonSync::Pending);
        if let Err(e) = self
            .record(&user, &course, lesson, &LessonSync::Pending, self.clock.now())
            .await
        {
            match previous {
                Some(state) => session.set_sync(lesson.clone(), state),
                None => session.clear_sync(lesson),
            }
            return Err(e.into());
        }

        let result = session
            .lifetime
            .run(self.api.mark_lesson_complete(&course, lesson))
            .await?;

        match result {
            Ok(()) => {
                session.confirmed.mark_completed(lesson.clone());
                session.set_sync(lesson.clone(), LessonSync::Committed);
                self.storage
                    .progress
                    .save_progress(
                        &user,
                        &course,
                        &ProgressSnapshot {
                            record: session.confirmed.clone(),
                            fetched_at: self.clock.now(),
                        },
                    )
                    .await?;
                self.storage.syncs.clear_sync(&user, &course, lesson).await?;
                info!(lesson = %lesson, course = %course, "lesson completed");
                Ok(())
            }
            Err(source) => {
                warn!(lesson = %lesson, course = %course, error = %source, "lesson completion failed");
                let failed = LessonSync::Failed {
                    reason: source.to_string(),
                };
                session.set_sync(lesson.clone(), failed.clone());
                if let Err(e) = self
                    .record(&user, &course, lesson, &failed, self.clock.now())
                    .await
                {
                    warn!(lesson = %lesson, error = %e, "could not journal failed completion");
                }
                Err(SessionError::MarkComplete {
                    lesson: lesson.clone(),
                    source,
                })
            }
        }
    }

    /// Re-issue every failed completion, oldest lesson id first.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Closed` if the session ends during the retry,
    /// or `SessionError::Storage` on local write failures. Individual request
    /// failures are collected in the report instead.
    pub async fn retry_failed(
        &self,
        session: &mut CourseSession,
    ) -> Result<RetryReport, SessionError> {
        session.ensure_open()?;
        let failed: Vec<LessonId> = session
            .failed_lessons()
            .map(|(lesson, _)| lesson.clone())
            .collect();

        let mut report = RetryReport::default();
        for lesson in failed {
            match self.mark_complete(session, &lesson).await {
                Ok(()) => report.committed.push(lesson),
                Err(SessionError::MarkComplete { lesson, source }) => {
                    report.failed.push((lesson, source));
                }
                Err(other) => return Err(other),
            }
        }
        Ok(report)
    }

    /// Try to move past `from`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Navigation` when `from` is not in the outline,
    /// or `SessionError::Closed` for a closed session.
    pub fn advance(
        &self,
        session: &CourseSession,
        from: Position,
    ) -> Result<AdvanceOutcome, SessionError> {
        session.ensure_open()?;
        let outcome = session.navigator().advance(from)?;
        debug!(?from, ?outcome, "advance");
        Ok(outcome)
    }

    /// Ask the server for a certificate once every lesson is complete.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotEligible` if lessons remain,
    /// `SessionError::CertificateRejected` when the server refuses, or
    /// `SessionError::Api` / `SessionError::Closed` for other failures.
    pub async fn request_certificate(
        &self,
        session: &CourseSession,
    ) -> Result<CertificateReceipt, SessionError> {
        session.ensure_open()?;
        let navigator = Navigator::new(&session.outline, &session.confirmed);
        if !navigator.certificate_eligible() {
            return Err(SessionError::NotEligible {
                percentage: navigator.completion_percentage(),
            });
        }

        let course = session.course_id();
        match session
            .lifetime
            .run(self.api.request_certificate(course))
            .await?
        {
            Ok(receipt) => {
                info!(course = %course, "certificate issued");
                Ok(receipt)
            }
            Err(ApiError::Rejected { message, .. }) => {
                warn!(course = %course, %message, "certificate rejected");
                Err(SessionError::CertificateRejected(message))
            }
            Err(other) => Err(SessionError::Api(other)),
        }
    }

    /// Summary built from local state only, for offline display.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotCached` if the outline was never fetched,
    /// or `SessionError::Storage` on read failures.
    pub async fn cached_summary(
        &self,
        user: &UserId,
        course: &CourseId,
    ) -> Result<ProgressSummary, SessionError> {
        let outline = match self.storage.outlines.get_outline(course).await {
            Ok(outline) => outline,
            Err(StorageError::NotFound) => return Err(SessionError::NotCached),
            Err(e) => return Err(e.into()),
        };
        let confirmed = match self.storage.progress.get_progress(user, course).await {
            Ok(snapshot) => snapshot.record,
            Err(StorageError::NotFound) => ProgressRecord::empty(),
            Err(e) => return Err(e.into()),
        };
        // A leftover `Pending` entry is an interrupted request; only
        // acknowledged completions count offline.
        let journal = self.storage.syncs.syncs_for(user, course).await?;
        let committed: Vec<LessonId> = journal
            .into_iter()
            .filter(|r| r.state == LessonSync::Committed)
            .map(|r| r.lesson_id)
            .collect();

        let effective = confirmed.with_completed(&committed);
        Ok(Navigator::new(&outline, &effective).summary())
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use course_core::model::{Chapter, Lesson};

    fn lesson(id: &str) -> LessonId {
        LessonId::new(id).unwrap()
    }

    fn outline() -> Outline {
        Outline::new(
            CourseId::new("c1").unwrap(),
            "Course",
            vec![Chapter::new(
                "One",
                vec![
                    Lesson::new(lesson("a"), "A", None),
                    Lesson::new(lesson("b"), "B", None),
                ],
                None,
            )],
        )
        .unwrap()
    }

    #[test]
    fn effective_record_includes_in_flight_but_not_failed() {
        let (_closer, lifetime) = SessionLifetime::channel();
        let mut syncs = BTreeMap::new();
        syncs.insert(lesson("a"), LessonSync::Pending);
        syncs.insert(
            lesson("b"),
            LessonSync::Failed {
                reason: "offline".into(),
            },
        );
        let session = CourseSession::new(
            UserId::new("u1").unwrap(),
            outline(),
            ProgressRecord::empty(),
            syncs,
            lifetime,
        );

        assert!(session.effective().is_completed(&lesson("a")));
        assert!(!session.effective().is_completed(&lesson("b")));
        assert!(session.confirmed().completed().is_empty());
        assert_eq!(session.current_position(), Some(Position::new(0, 1)));
        let failed: Vec<_> = session.failed_lessons().collect();
        assert_eq!(failed, vec![(&lesson("b"), "offline")]);
    }
}
