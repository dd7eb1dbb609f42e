//! Guided reflection: a 10-question interview on a chosen theme, closed
//! out by a structured analysis of the answers.

use chrono::Utc;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::db::{Store, StoreError};
use crate::gateway::{CompletionGateway, GatewayError, RoleMessage};
use crate::logging;
use crate::parser::{parse_analysis, Analysis};
use crate::prompts;

pub const TOTAL_QUESTIONS: i64 = 10;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ReflectionTheme {
    pub id: String,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub order: i64,
}

static THEMES: Lazy<Vec<ReflectionTheme>> = Lazy::new(|| {
    let themes = [
        ("gratitude", "Gratitude", "🌻", "What you appreciate, and how noticing it changes your days."),
        ("self-discovery", "Self-Discovery", "🧭", "Who you are underneath the routines - values, quirks, and quiet wishes."),
        ("stress", "Stress & Anxiety", "🌊", "What weighs on you, how it shows up, and what helps you set it down."),
        ("relationships", "Relationships", "🤝", "The people in your life and the shapes your connections take."),
        ("growth", "Growth", "🌱", "How you've changed, what you're practicing, and what growth costs you."),
        ("purpose", "Purpose", "⭐", "What pulls you forward and what makes your effort feel worthwhile."),
    ];

    themes
        .into_iter()
        .enumerate()
        .map(|(i, (id, name, icon, description))| ReflectionTheme {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            icon: icon.to_string(),
            order: i as i64 + 1,
        })
        .collect()
});

/// The fixed set of themes a session can be started on.
pub fn theme_catalog() -> &'static [ReflectionTheme] {
    &THEMES
}

fn theme_description(theme_id: &str) -> &'static str {
    theme_catalog()
        .iter()
        .find(|t| t.id == theme_id)
        .map(|t| t.description.as_str())
        .unwrap_or("")
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ReflectionQuestion {
    pub id: String,
    pub question: String,
    pub theme_id: String,
    pub order: i64,
    pub created_at: String,
    pub answer: Option<String>,
}

impl ReflectionQuestion {
    fn new(theme_id: &str, question: &str, order: i64) -> Self {
        ReflectionQuestion {
            id: Uuid::new_v4().to_string(),
            question: question.to_string(),
            theme_id: theme_id.to_string(),
            order,
            created_at: Utc::now().to_rfc3339(),
            answer: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    InProgress,
    Completed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::InProgress => "in_progress",
            SessionStatus::Completed => "completed",
        }
    }

    pub fn parse(raw: &str) -> SessionStatus {
        if raw == "completed" {
            SessionStatus::Completed
        } else {
            SessionStatus::InProgress
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ReflectionSession {
    pub id: String,
    pub user_id: String,
    pub theme_id: String,
    pub theme_name: String,
    pub questions: Vec<ReflectionQuestion>,
    /// Index into `questions` of the question awaiting an answer.
    pub current_question_index: i64,
    pub status: SessionStatus,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub analysis: Option<Analysis>,
}

#[derive(Debug, Error)]
pub enum ReflectionError {
    #[error("I couldn't start your reflection session. Please try again.")]
    Start(#[source] GatewayError),
    #[error("I'm having trouble generating your next question. Please try again.")]
    Question(#[source] GatewayError),
    #[error("I'm having trouble putting your reflection together. Please try again.")]
    Analysis(#[source] GatewayError),
    #[error("There's no reflection session in progress.")]
    NoActiveSession,
    #[error("I couldn't find that reflection session.")]
    SessionNotFound,
    #[error("This reflection session is already complete.")]
    SessionComplete,
    #[error(transparent)]
    Store(#[from] StoreError),
}

type CompletionCallback = Box<dyn Fn(&ReflectionSession) + Send + Sync>;

/// Runs reflection sessions one question at a time.
///
/// Questions are generated on demand: answering question N produces
/// question N+1, and the tenth answer produces the analysis instead. Every
/// accepted answer is persisted before the in-memory session advances, and
/// a failed generation leaves both untouched so the same answer can simply
/// be submitted again.
pub struct ReflectionOrchestrator {
    store: Arc<Store>,
    gateway: CompletionGateway,
    user_id: String,
    session: Mutex<Option<ReflectionSession>>,
    on_complete: Option<CompletionCallback>,
}

impl ReflectionOrchestrator {
    pub fn new(store: Arc<Store>, gateway: CompletionGateway, user_id: impl Into<String>) -> Self {
        ReflectionOrchestrator {
            store,
            gateway,
            user_id: user_id.into(),
            session: Mutex::new(None),
            on_complete: None,
        }
    }

    /// Register a callback fired once when a session completes, after the
    /// completed session has been persisted.
    pub fn with_on_complete(
        mut self,
        callback: impl Fn(&ReflectionSession) + Send + Sync + 'static,
    ) -> Self {
        self.on_complete = Some(Box::new(callback));
        self
    }

    /// Start a session on a theme: generate the opening question and seed
    /// a new persisted session with it. Any previously active session is
    /// left as it was in storage and simply stops being the active one.
    pub async fn start(&self, theme: &ReflectionTheme) -> Result<ReflectionSession, ReflectionError> {
        let mut slot = self.session.lock().await;

        let request = vec![
            RoleMessage::system(prompts::next_question_system(&theme.name, &theme.description)),
            RoleMessage::user("Please ask the first question."),
        ];
        let question_text = self.gateway.complete(&request).await.map_err(|e| {
            logging::log_error(None, &format!("Opening question generation failed: {}", e));
            ReflectionError::Start(e)
        })?;

        let session = ReflectionSession {
            id: Uuid::new_v4().to_string(),
            user_id: self.user_id.clone(),
            theme_id: theme.id.clone(),
            theme_name: theme.name.clone(),
            questions: vec![ReflectionQuestion::new(&theme.id, question_text.trim(), 1)],
            current_question_index: 0,
            status: SessionStatus::InProgress,
            started_at: Utc::now().to_rfc3339(),
            completed_at: None,
            analysis: None,
        };
        self.store.upsert_reflection_session(&session)?;
        logging::log_reflection(
            Some(&session.id),
            &format!("Started session on theme '{}'", theme.name),
        );

        *slot = Some(session.clone());
        Ok(session)
    }

    /// Record the answer to the current question.
    ///
    /// For questions 1-9 this generates the next question; the tenth
    /// answer closes the interview and generates the analysis. Blank
    /// answers are ignored. On a generation failure nothing is recorded:
    /// the caller can retry with the same answer.
    pub async fn answer(&self, text: &str) -> Result<ReflectionSession, ReflectionError> {
        let mut slot = self.session.lock().await;
        let session = slot.as_ref().ok_or(ReflectionError::NoActiveSession)?;

        if matches!(session.status, SessionStatus::Completed) {
            return Err(ReflectionError::SessionComplete);
        }

        let answer = text.trim();
        if answer.is_empty() {
            return Ok(session.clone());
        }

        let index = session.current_question_index as usize;
        let transcript = build_transcript(session, index, answer);
        let is_final = session.current_question_index + 1 >= TOTAL_QUESTIONS;

        if is_final {
            let request = vec![
                RoleMessage::system(prompts::analysis_system(&session.theme_name)),
                RoleMessage::user(transcript),
            ];
            let raw = self.gateway.complete(&request).await.map_err(|e| {
                logging::log_error(Some(&session.id), &format!("Analysis generation failed: {}", e));
                ReflectionError::Analysis(e)
            })?;

            let analysis = parse_analysis(&raw);
            let defaults = Analysis::default();
            let fallback_sections = [
                analysis.negative_patterns == defaults.negative_patterns,
                analysis.positive_patterns == defaults.positive_patterns,
                analysis.affirmations == defaults.affirmations,
                analysis.actionable_steps == defaults.actionable_steps,
            ]
            .into_iter()
            .filter(|fell_back| *fell_back)
            .count();
            if fallback_sections > 0 {
                logging::log_reflection(
                    Some(&session.id),
                    &format!("Analysis used fallbacks for {} section(s)", fallback_sections),
                );
            }

            let mut updated = session.clone();
            if let Some(question) = updated.questions.get_mut(index) {
                question.answer = Some(answer.to_string());
            }
            updated.status = SessionStatus::Completed;
            updated.completed_at = Some(Utc::now().to_rfc3339());
            updated.analysis = Some(analysis);
            self.store.upsert_reflection_session(&updated)?;
            logging::log_reflection(Some(&updated.id), "Session completed");

            *slot = Some(updated.clone());
            if let Some(callback) = &self.on_complete {
                callback(&updated);
            }
            Ok(updated)
        } else {
            let next_order = session.current_question_index + 2;
            let request = vec![
                RoleMessage::system(prompts::next_question_system(
                    &session.theme_name,
                    theme_description(&session.theme_id),
                )),
                RoleMessage::user(format!(
                    "Here is the interview so far:\n\n{}\n\nAsk question {} of {}.",
                    transcript, next_order, TOTAL_QUESTIONS
                )),
            ];
            let question_text = self.gateway.complete(&request).await.map_err(|e| {
                logging::log_error(Some(&session.id), &format!("Next question generation failed: {}", e));
                ReflectionError::Question(e)
            })?;

            let mut updated = session.clone();
            if let Some(question) = updated.questions.get_mut(index) {
                question.answer = Some(answer.to_string());
            }
            updated
                .questions
                .push(ReflectionQuestion::new(&updated.theme_id, question_text.trim(), next_order));
            updated.current_question_index += 1;
            self.store.upsert_reflection_session(&updated)?;
            logging::log_reflection(
                Some(&updated.id),
                &format!("Answer {} recorded, question {} ready", index + 1, next_order),
            );

            *slot = Some(updated.clone());
            Ok(updated)
        }
    }

    /// Make a previously started, still-in-progress session the active one.
    pub async fn resume(&self, session_id: &str) -> Result<ReflectionSession, ReflectionError> {
        let mut slot = self.session.lock().await;

        let session = self
            .store
            .get_reflection_session(session_id)?
            .ok_or(ReflectionError::SessionNotFound)?;
        if matches!(session.status, SessionStatus::Completed) {
            return Err(ReflectionError::SessionComplete);
        }

        logging::log_reflection(Some(&session.id), "Resumed session");
        *slot = Some(session.clone());
        Ok(session)
    }

    pub async fn active_session(&self) -> Option<ReflectionSession> {
        self.session.lock().await.clone()
    }

    pub fn list_sessions(&self) -> Result<Vec<ReflectionSession>, ReflectionError> {
        Ok(self.store.list_reflection_sessions(&self.user_id)?)
    }
}

/// Q/A transcript including the not-yet-recorded answer to the question at
/// `pending_index`.
fn build_transcript(session: &ReflectionSession, pending_index: usize, pending_answer: &str) -> String {
    let mut lines: Vec<String> = Vec::new();

    for (i, question) in session.questions.iter().enumerate() {
        lines.push(format!("Q{}: {}", question.order, question.question));
        if let Some(answer) = &question.answer {
            lines.push(format!("A{}: {}", question.order, answer));
        } else if i == pending_index {
            lines.push(format!("A{}: {}", question.order, pending_answer));
        }
    }

    lines.join("\n")
}
