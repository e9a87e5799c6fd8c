use crate::collaborators::{AnswerValidator, QuestionSource};
use crate::config::QuizSettings;
use crate::error::QuizError;
use crate::mapper::to_original_index;
use crate::models::AnswerResult;
use crate::randomizer::{randomize, ShuffledQuestion};
use crate::scoring::{summarize, ScoreSummary};
use crate::storage::SessionStore;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

pub fn storage_key(module: &str) -> String {
    format!("quiz-session:{module}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionPhase {
    Uninitialized,
    Loading,
    Active,
    Completed,
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerFeedback {
    pub is_correct: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(default)]
    pub provisional: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizSession {
    pub schema_version: u32,
    pub session_id: Uuid,
    pub module: String,
    pub questions: Vec<ShuffledQuestion>,
    pub position: usize,
    /// Display index picked for the current question.
    pub selection: Option<usize>,
    pub feedback: Option<AnswerFeedback>,
    pub score: usize,
    pub results: Vec<Option<bool>>,
    pub generation: u64,
    /// Bumped by every submission; only the latest one may land.
    #[serde(default)]
    pub submit_seq: u64,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("snapshot is not valid json: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("snapshot schema version {found:?} is not supported (expected {expected})")]
    Version { found: Option<u32>, expected: u32 },
    #[error("snapshot is inconsistent: {0}")]
    Inconsistent(String),
}

#[derive(Deserialize)]
struct VersionProbe {
    #[serde(rename = "schemaVersion")]
    schema_version: Option<u32>,
}

impl QuizSession {
    pub fn new(module: impl Into<String>, questions: Vec<ShuffledQuestion>) -> Self {
        let now = Utc::now();
        Self {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            session_id: Uuid::new_v4(),
            module: module.into(),
            results: vec![None; questions.len()],
            questions,
            position: 0,
            selection: None,
            feedback: None,
            score: 0,
            generation: 0,
            submit_seq: 0,
            started_at: now,
            updated_at: now,
        }
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn is_completed(&self) -> bool {
        self.position >= self.questions.len()
    }

    pub fn phase(&self) -> SessionPhase {
        if self.is_completed() {
            SessionPhase::Completed
        } else {
            SessionPhase::Active
        }
    }

    pub fn current(&self) -> Option<&ShuffledQuestion> {
        self.questions.get(self.position)
    }

    pub fn answered_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_some()).count()
    }

    fn current_answered(&self) -> bool {
        self.results.get(self.position).copied().flatten().is_some()
    }

    fn in_flight(&self) -> bool {
        self.feedback.as_ref().is_some_and(|f| f.provisional)
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn to_snapshot(&self) -> Result<String, QuizError> {
        serde_json::to_string(self).map_err(|e| QuizError::Storage(format!("cannot serialize session: {e}")))
    }

    pub fn from_snapshot(raw: &str) -> Result<Self, SnapshotError> {
        let probe: VersionProbe = serde_json::from_str(raw)?;
        if probe.schema_version != Some(SNAPSHOT_SCHEMA_VERSION) {
            return Err(SnapshotError::Version {
                found: probe.schema_version,
                expected: SNAPSHOT_SCHEMA_VERSION,
            });
        }
        let session: QuizSession = serde_json::from_str(raw)?;
        session.check_integrity().map_err(SnapshotError::Inconsistent)?;
        Ok(session)
    }

    pub fn check_integrity(&self) -> Result<(), String> {
        let n = self.questions.len();
        if n == 0 {
            return Err("session has no questions".into());
        }
        if self.results.len() != n {
            return Err(format!("{} results for {} questions", self.results.len(), n));
        }
        if self.position > n {
            return Err(format!("position {} past end of {} questions", self.position, n));
        }
        if let Some(q) = self.questions.iter().find(|q| !q.has_valid_permutation()) {
            return Err(format!("question {} has an invalid choice permutation", q.question.id));
        }
        if self.results[..self.position].iter().any(Option::is_none) {
            return Err("unanswered question behind current position".into());
        }
        let correct = self.results.iter().filter(|r| **r == Some(true)).count();
        if self.score != correct {
            return Err(format!("score {} does not match {} correct results", self.score, correct));
        }
        if let (Some(display), Some(q)) = (self.selection, self.current()) {
            if q.choice_count() > 0 && display >= q.choice_count() {
                return Err(format!("selection {display} out of range"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Transient,
    Permanent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&QuizError> for SessionError {
    fn from(err: &QuizError) -> Self {
        let kind = if err.is_retryable() {
            ErrorKind::Transient
        } else {
            ErrorKind::Permanent
        };
        Self {
            kind,
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAnswer {
    pub session_id: Uuid,
    pub generation: u64,
    pub position: usize,
    pub submit_seq: u64,
    pub question_id: i64,
    pub answer_index: Option<usize>,
}

impl PendingAnswer {
    fn matches(&self, session: &QuizSession) -> bool {
        self.session_id == session.session_id
            && self.generation == session.generation
            && self.position == session.position
            && self.submit_seq == session.submit_seq
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Answered(AnswerFeedback),
    /// Validation failed; the question can be submitted again.
    Failed(SessionError),
    Stale,
}

fn invariant(message: impl Into<String>) -> QuizError {
    let message = message.into();
    warn!(%message, "quiz invariant violated");
    QuizError::Invariant(message)
}

pub struct QuizRunner {
    module: String,
    settings: QuizSettings,
    source: Arc<dyn QuestionSource>,
    validator: Arc<dyn AnswerValidator>,
    store: Arc<dyn SessionStore>,
    rng: Box<dyn RngCore + Send>,
    phase: SessionPhase,
    session: Option<QuizSession>,
    last_error: Option<SessionError>,
    fetch_attempts: u32,
    next_generation: u64,
}

impl QuizRunner {
    pub fn new(
        module: impl Into<String>,
        settings: QuizSettings,
        source: Arc<dyn QuestionSource>,
        validator: Arc<dyn AnswerValidator>,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            module: module.into(),
            settings,
            source,
            validator,
            store,
            rng: Box::new(StdRng::from_entropy()),
            phase: SessionPhase::Uninitialized,
            session: None,
            last_error: None,
            fetch_attempts: 0,
            next_generation: 0,
        }
    }

    pub fn with_rng(mut self, rng: impl RngCore + Send + 'static) -> Self {
        self.rng = Box::new(rng);
        self
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn session(&self) -> Option<&QuizSession> {
        self.session.as_ref()
    }

    pub fn current_question(&self) -> Option<&ShuffledQuestion> {
        match self.phase {
            SessionPhase::Active => self.session.as_ref()?.current(),
            _ => None,
        }
    }

    pub fn selection(&self) -> Option<usize> {
        self.session.as_ref()?.selection
    }

    pub fn feedback(&self) -> Option<&AnswerFeedback> {
        self.session.as_ref()?.feedback.as_ref()
    }

    pub fn last_error(&self) -> Option<&SessionError> {
        self.last_error.as_ref()
    }

    pub fn fetch_attempts(&self) -> u32 {
        self.fetch_attempts
    }

    pub fn summary(&self) -> Option<ScoreSummary> {
        self.session
            .as_ref()
            .map(|s| summarize(s, self.settings.pass_percent))
    }

    /// Restores the persisted session or builds a new one from the pool.
    pub async fn start(&mut self) -> Result<SessionPhase, QuizError> {
        match self.phase {
            SessionPhase::Active | SessionPhase::Completed | SessionPhase::Empty => return Ok(self.phase),
            SessionPhase::Uninitialized => {
                match self.restore().await {
                    Ok(Some(session)) => {
                        info!(
                            module = %self.module,
                            session_id = %session.session_id,
                            position = session.position,
                            score = session.score,
                            "quiz session restored"
                        );
                        self.phase = session.phase();
                        self.session = Some(session);
                        self.last_error = None;
                        return Ok(self.phase);
                    }
                    Ok(None) => {}
                    Err(err) => {
                        // the snapshot may still be fine; never overwrite it unread
                        warn!(module = %self.module, "cannot read persisted session: {}", err);
                        self.last_error = Some(SessionError::from(&err));
                        return Ok(self.phase);
                    }
                }
                self.phase = SessionPhase::Loading;
            }
            SessionPhase::Loading => {}
        }

        self.fetch_attempts += 1;
        let pool = match self.source.fetch_pool(&self.module).await {
            Ok(pool) => pool,
            Err(err) => {
                warn!(module = %self.module, attempt = self.fetch_attempts, "question pool fetch failed: {}", err);
                self.last_error = Some(SessionError::from(&err));
                return Ok(self.phase);
            }
        };
        self.last_error = None;

        if pool.is_empty() {
            info!(module = %self.module, "no questions available");
            self.phase = SessionPhase::Empty;
            return Ok(self.phase);
        }

        let questions = randomize(&pool, self.settings.question_count, &mut *self.rng);
        let mut session = QuizSession::new(self.module.clone(), questions);
        session.generation = self.next_generation;
        let (session_id, len) = (session.session_id, session.len());
        if let Err(err) = self.commit(session).await {
            self.last_error = Some(SessionError::from(&err));
            return Err(err);
        }
        info!(
            module = %self.module,
            %session_id,
            questions = len,
            pool = pool.len(),
            "quiz session created"
        );
        Ok(self.phase)
    }

    async fn restore(&self) -> Result<Option<QuizSession>, QuizError> {
        let key = storage_key(&self.module);
        let Some(raw) = self.store.load(&key).await? else {
            return Ok(None);
        };
        let reason = match QuizSession::from_snapshot(&raw) {
            Ok(mut session) if session.module == self.module => {
                if session.in_flight() {
                    session.feedback = None;
                }
                return Ok(Some(session));
            }
            Ok(session) => format!("snapshot belongs to module {}", session.module),
            Err(err) => err.to_string(),
        };
        warn!(module = %self.module, "discarding persisted session: {}", reason);
        if let Err(err) = self.store.clear(&key).await {
            warn!(module = %self.module, "cannot clear persisted session: {}", err);
        }
        Ok(None)
    }

    async fn commit(&mut self, session: QuizSession) -> Result<(), QuizError> {
        let raw = session.to_snapshot()?;
        self.store.save(&storage_key(&self.module), raw).await?;
        self.phase = session.phase();
        self.session = Some(session);
        Ok(())
    }

    fn active_session(&self) -> Result<&QuizSession, QuizError> {
        if self.phase != SessionPhase::Active {
            return Err(invariant(format!("no active question (phase {:?})", self.phase)));
        }
        self.session
            .as_ref()
            .ok_or_else(|| invariant("active phase without a session"))
    }

    fn drop_provisional(&mut self) {
        if let Some(session) = self.session.as_mut().filter(|s| s.in_flight()) {
            session.feedback = None;
        }
    }

    /// Picking again while an answer is in flight abandons that answer.
    pub async fn select(&mut self, display: usize) -> Result<(), QuizError> {
        let mut next = self.active_session()?.clone();
        if next.current_answered() {
            return Err(invariant("selection changed after submit"));
        }
        let choices = next.current().map(|q| q.choice_count()).unwrap_or(0);
        if choices > 0 && display >= choices {
            return Err(invariant(format!("display index {display} out of range for {choices} choices")));
        }
        if next.in_flight() {
            debug!(module = %self.module, position = next.position, "abandoning in-flight answer");
            next.feedback = None;
            next.submit_seq += 1;
        }
        next.selection = Some(display);
        next.touch();
        self.commit(next).await
    }

    /// Maps the selection to its original index and marks the question as in
    /// flight. A newer call supersedes an earlier pending answer.
    pub fn begin_submit(&mut self) -> Result<PendingAnswer, QuizError> {
        let session = self.active_session()?;
        if session.current_answered() {
            return Err(invariant("question already answered"));
        }
        let Some(question) = session.current() else {
            return Err(invariant("no current question"));
        };
        let answer_index = match session.selection {
            Some(display) => Some(to_original_index(question, display).map_err(|e| {
                warn!("{}", e);
                e
            })?),
            None if question.choice_count() == 0 => None,
            None => return Err(invariant("submit without a selection")),
        };
        if session.in_flight() {
            debug!(module = %self.module, position = session.position, "superseding unfinished submission");
        }
        let question_id = question.question.id;

        let Some(session) = self.session.as_mut() else {
            return Err(invariant("active phase without a session"));
        };
        session.submit_seq += 1;
        session.feedback = Some(AnswerFeedback {
            is_correct: false,
            explanation: None,
            provisional: true,
        });
        Ok(PendingAnswer {
            session_id: session.session_id,
            generation: session.generation,
            position: session.position,
            submit_seq: session.submit_seq,
            question_id,
            answer_index,
        })
    }

    pub async fn complete_submit(
        &mut self,
        pending: PendingAnswer,
        result: Result<AnswerResult, QuizError>,
    ) -> Result<SubmitOutcome, QuizError> {
        let live = self.phase == SessionPhase::Active;
        let Some(current) = self.session.as_ref().filter(|s| live && pending.matches(s)) else {
            debug!(
                module = %self.module,
                question_id = pending.question_id,
                position = pending.position,
                "discarding stale answer result"
            );
            return Ok(SubmitOutcome::Stale);
        };

        match result {
            Ok(answer) => {
                let mut next = current.clone();
                if next.results[pending.position].is_none() {
                    next.results[pending.position] = Some(answer.is_correct);
                    if answer.is_correct {
                        next.score += 1;
                    }
                }
                let feedback = AnswerFeedback {
                    is_correct: answer.is_correct,
                    explanation: answer.explanation,
                    provisional: false,
                };
                next.feedback = Some(feedback.clone());
                next.touch();
                let score = next.score;
                if let Err(err) = self.commit(next).await {
                    self.drop_provisional();
                    return Err(err);
                }
                info!(
                    module = %self.module,
                    question_id = pending.question_id,
                    correct = feedback.is_correct,
                    score,
                    "answer validated"
                );
                self.last_error = None;
                Ok(SubmitOutcome::Answered(feedback))
            }
            Err(err) => {
                self.drop_provisional();
                let error = SessionError::from(&err);
                warn!(module = %self.module, question_id = pending.question_id, "answer validation failed: {}", err);
                self.last_error = Some(error.clone());
                Ok(SubmitOutcome::Failed(error))
            }
        }
    }

    pub async fn submit(&mut self) -> Result<SubmitOutcome, QuizError> {
        let pending = self.begin_submit()?;
        let result = self
            .validator
            .validate(&self.module, pending.question_id, pending.answer_index)
            .await;
        self.complete_submit(pending, result).await
    }

    pub async fn next(&mut self) -> Result<SessionPhase, QuizError> {
        let mut next = self.active_session()?.clone();
        if !next.current_answered() {
            return Err(invariant("advance before the answer was validated"));
        }
        next.position += 1;
        next.selection = None;
        next.feedback = None;
        next.generation += 1;
        next.touch();
        let (score, total) = (next.score, next.len());
        self.commit(next).await?;
        if self.phase == SessionPhase::Completed {
            info!(module = %self.module, score, total, "quiz session completed");
        }
        Ok(self.phase)
    }

    pub async fn restart(&mut self) -> Result<SessionPhase, QuizError> {
        self.reset().await?;
        self.start().await
    }

    pub async fn acknowledge_completion(&mut self) -> Result<(), QuizError> {
        if self.phase != SessionPhase::Completed {
            return Err(invariant("acknowledge before completion"));
        }
        self.reset().await
    }

    async fn reset(&mut self) -> Result<(), QuizError> {
        self.store.clear(&storage_key(&self.module)).await?;
        if let Some(session) = self.session.take() {
            self.next_generation = session.generation + 1;
            info!(module = %self.module, session_id = %session.session_id, "quiz session reset");
        }
        self.phase = SessionPhase::Uninitialized;
        self.last_error = None;
        Ok(())
    }
}
