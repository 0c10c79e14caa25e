//! Clarification state machine
//!
//! `Idle -> AwaitingAnswer(question) -> Idle`. At most one question is live.

use crate::protocol::{ClarificationEvent, QuestionType};
use tracing::{debug, warn};

/// A question from the agent team that is blocking normal input
#[derive(Debug, Clone, PartialEq)]
pub struct PendingQuestion {
    pub question_id: String,
    pub project_id: Option<String>,
    pub asking_agent: String,
    pub content: String,
    pub question_type: QuestionType,
    pub options: Vec<String>,
}

impl From<&ClarificationEvent> for PendingQuestion {
    fn from(event: &ClarificationEvent) -> Self {
        Self {
            question_id: event.question_id.clone(),
            project_id: event.project_id.clone().filter(|id| !id.is_empty()),
            asking_agent: event.agent.clone(),
            content: event.content.clone(),
            question_type: event.question_type,
            options: event.options.clone(),
        }
    }
}

impl PendingQuestion {
    /// Resolve a 1-based option number typed by the user into the option text.
    /// Anything else is returned unchanged as a free-text answer.
    pub fn resolve_answer(&self, input: &str) -> String {
        let trimmed = input.trim();
        trimmed
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| self.options.get(i))
            .cloned()
            .unwrap_or_else(|| trimmed.to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum ClarificationState {
    #[default]
    Idle,
    AwaitingAnswer(PendingQuestion),
}

impl ClarificationState {
    pub fn pending(&self) -> Option<&PendingQuestion> {
        match self {
            Self::Idle => None,
            Self::AwaitingAnswer(q) => Some(q),
        }
    }

    pub fn is_awaiting(&self) -> bool {
        matches!(self, Self::AwaitingAnswer(_))
    }

    /// Install a new question. A question that was still pending is replaced.
    pub fn install(&mut self, question: PendingQuestion) {
        if let Self::AwaitingAnswer(previous) = self {
            warn!(
                "Question {} replaced by {} before it was answered",
                previous.question_id, question.question_id
            );
        }
        *self = Self::AwaitingAnswer(question);
    }

    /// Take the pending question for an answer or a skip. Leaves the state `Idle`.
    pub fn take(&mut self) -> Option<PendingQuestion> {
        match std::mem::take(self) {
            Self::Idle => None,
            Self::AwaitingAnswer(q) => Some(q),
        }
    }

    /// Server-side resolution (acknowledgement or timeout) of `question_id`.
    /// Returns true if it was the pending question.
    pub fn resolve(&mut self, question_id: &str) -> bool {
        match self {
            Self::AwaitingAnswer(q) if q.question_id == question_id => {
                *self = Self::Idle;
                true
            }
            _ => {
                debug!("Resolution for {} does not match the pending question", question_id);
                false
            }
        }
    }

    pub fn clear(&mut self) {
        *self = Self::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(id: &str) -> PendingQuestion {
        PendingQuestion {
            question_id: id.to_string(),
            project_id: Some("p1".to_string()),
            asking_agent: "Emma".to_string(),
            content: "Which database?".to_string(),
            question_type: QuestionType::Inline,
            options: vec!["SQLite".to_string(), "Postgres".to_string()],
        }
    }

    #[test]
    fn test_install_take() {
        let mut state = ClarificationState::default();
        assert!(!state.is_awaiting());

        state.install(question("q-1"));
        assert!(state.is_awaiting());

        let taken = state.take().unwrap();
        assert_eq!(taken.question_id, "q-1");
        assert_eq!(state, ClarificationState::Idle);
        assert!(state.take().is_none());
    }

    #[test]
    fn test_resolve_only_matching() {
        let mut state = ClarificationState::default();
        state.install(question("q-2"));

        assert!(!state.resolve("q-1"));
        assert!(state.is_awaiting());

        assert!(state.resolve("q-2"));
        assert!(!state.is_awaiting());
    }

    #[test]
    fn test_resolve_answer_option_number() {
        let q = question("q-1");
        assert_eq!(q.resolve_answer("2"), "Postgres");
        assert_eq!(q.resolve_answer("0"), "0");
        assert_eq!(q.resolve_answer("9"), "9");
        assert_eq!(q.resolve_answer("  MySQL "), "MySQL");
    }
}
