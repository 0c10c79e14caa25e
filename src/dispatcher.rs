//! Command dispatcher
//!
//! Turns user intents into [`OutboundCommand`]s. Every intent checks its
//! preconditions against the [`Session`], records the local side of the
//! exchange in the timeline, and only then hands the command to the sink.

use crate::protocol::OutboundCommand;
use crate::session::{Message, MessageKind, ProjectStatus, Session, USER_AGENT};
use thiserror::Error;
use tracing::{debug, info};

/// Timeline text recorded when the user skips a question
pub const SKIPPED_ANSWER: &str = "[Skipped question - using default]";

/// Why an intent was refused
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Not connected to the server")]
    NotConnected,

    #[error("A generation is already running")]
    GenerationInFlight,

    #[error("No project selected")]
    NoCurrentProject,

    #[error("No question is waiting for an answer")]
    NoPendingQuestion,

    #[error("Message is empty")]
    EmptyMessage,
}

/// Where dispatched commands go. The live implementation is the
/// transport handle; tests record commands instead.
pub trait CommandSink {
    fn is_open(&self) -> bool;

    /// Fire-and-forget
    fn send(&self, command: OutboundCommand);

    /// Credentials for later connections. Sinks without any ignore it.
    fn set_auth_token(&self, _token: Option<String>) {}
}

/// Derive a project name from the requirement text: the first
/// `max_chars` characters, with an ellipsis if anything was cut.
pub fn derive_project_name(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut name: String = text.chars().take(max_chars).collect();
    name.push_str("...");
    name
}

pub struct Dispatcher<S: CommandSink> {
    sink: S,
    name_max_chars: usize,
}

impl<S: CommandSink> Dispatcher<S> {
    pub fn new(sink: S, name_max_chars: usize) -> Self {
        Self {
            sink,
            name_max_chars,
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    fn ensure_open(&self) -> Result<(), DispatchError> {
        if self.sink.is_open() {
            Ok(())
        } else {
            Err(DispatchError::NotConnected)
        }
    }

    fn ensure_idle(session: &Session) -> Result<(), DispatchError> {
        if session.is_generating() {
            Err(DispatchError::GenerationInFlight)
        } else {
            Ok(())
        }
    }

    fn dispatch(&self, command: OutboundCommand) -> OutboundCommand {
        debug!("Dispatching {:?}", command);
        self.sink.send(command.clone());
        command
    }

    /// Free text from the input box. Answers the pending question if there is
    /// one, continues a completed project, or starts a new one.
    pub fn send_message(
        &self,
        session: &mut Session,
        text: &str,
    ) -> Result<OutboundCommand, DispatchError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(DispatchError::EmptyMessage);
        }
        self.ensure_open()?;
        if session.clarification.is_awaiting() {
            return self.answer_question(session, text);
        }
        Self::ensure_idle(session)?;

        let command = match session.identity.current() {
            Some(project) if project.status == ProjectStatus::Completed => {
                let project_id = project.id.clone();
                info!("Continuing conversation on {}", project_id);
                // Follow-up rounds stream into the project being viewed
                session.identity.set_active(&project_id, ProjectStatus::Running);
                OutboundCommand::ContinueConversation {
                    project_id,
                    message: text.to_string(),
                }
            }
            _ => OutboundCommand::CreateProject {
                name: derive_project_name(text, self.name_max_chars),
                requirement: text.to_string(),
            },
        };

        session.timeline.append(Message::local_user(text));
        session.begin_run();
        Ok(self.dispatch(command))
    }

    /// Answer the pending question. `input` may be an option number.
    pub fn answer_question(
        &self,
        session: &mut Session,
        input: &str,
    ) -> Result<OutboundCommand, DispatchError> {
        self.ensure_open()?;
        if input.trim().is_empty() {
            return Err(DispatchError::EmptyMessage);
        }
        let question = session
            .clarification
            .take()
            .ok_or(DispatchError::NoPendingQuestion)?;
        let response = question.resolve_answer(input);
        let project_id = question
            .project_id
            .clone()
            .or_else(|| session.active_project_id().map(String::from))
            .unwrap_or_default();

        let mut message = Message::new(MessageKind::UserResponse, USER_AGENT, response.clone())
            .with_project(Some(project_id.clone()));
        message.question_id = Some(question.question_id.clone());
        message.local = true;
        session.timeline.append(message);

        Ok(self.dispatch(OutboundCommand::UserResponse {
            question_id: question.question_id,
            project_id,
            response,
        }))
    }

    /// Let the agent team proceed with its default for the pending question.
    pub fn skip_question(&self, session: &mut Session) -> Result<OutboundCommand, DispatchError> {
        self.ensure_open()?;
        let question = session
            .clarification
            .take()
            .ok_or(DispatchError::NoPendingQuestion)?;

        let mut message = Message::new(MessageKind::UserResponse, USER_AGENT, SKIPPED_ANSWER)
            .with_project(question.project_id.clone());
        message.question_id = Some(question.question_id.clone());
        message.skipped = true;
        message.local = true;
        session.timeline.append(message);

        Ok(self.dispatch(OutboundCommand::SkipQuestion {
            question_id: question.question_id,
        }))
    }

    pub fn regenerate_project(
        &self,
        session: &mut Session,
    ) -> Result<OutboundCommand, DispatchError> {
        self.ensure_open()?;
        Self::ensure_idle(session)?;
        let project_id = session
            .identity
            .current()
            .map(|p| p.id.clone())
            .ok_or(DispatchError::NoCurrentProject)?;

        session.reset_run_state();
        session.identity.set_active(&project_id, ProjectStatus::Running);
        session
            .timeline
            .append(Message::local_status("Regenerating project...").with_project(Some(project_id.clone())));
        session.begin_run();
        Ok(self.dispatch(OutboundCommand::RegenerateProject { project_id }))
    }

    /// Retry `project_id`, or the last retryable failure when none is given.
    pub fn retry_project(
        &self,
        session: &mut Session,
        project_id: Option<&str>,
    ) -> Result<OutboundCommand, DispatchError> {
        self.ensure_open()?;
        Self::ensure_idle(session)?;
        let project_id = project_id
            .map(String::from)
            .or_else(|| session.failed_project.clone())
            .ok_or(DispatchError::NoCurrentProject)?;

        session.failed_project = None;
        session.reset_run_state();
        session.identity.set_active(&project_id, ProjectStatus::Running);
        session
            .timeline
            .append(Message::local_status("Retrying project...").with_project(Some(project_id.clone())));
        session.begin_run();
        Ok(self.dispatch(OutboundCommand::RetryProject { project_id }))
    }

    pub fn create_from_template(
        &self,
        session: &mut Session,
        template_id: &str,
        name: &str,
        features: Vec<String>,
        custom_requirements: &str,
    ) -> Result<OutboundCommand, DispatchError> {
        self.ensure_open()?;
        Self::ensure_idle(session)?;

        let mut summary = format!("Create \"{}\" from template {}", name, template_id);
        if !features.is_empty() {
            summary.push_str(&format!("\nFeatures: {}", features.join(", ")));
        }
        if !custom_requirements.trim().is_empty() {
            summary.push_str(&format!("\n{}", custom_requirements.trim()));
        }
        session.timeline.append(Message::local_user(summary));
        session.begin_run();

        Ok(self.dispatch(OutboundCommand::CreateFromTemplate {
            template_id: template_id.to_string(),
            name: name.to_string(),
            features,
            custom_requirements: custom_requirements.trim().to_string(),
        }))
    }

    /// Start over with an empty view. Nothing is sent.
    pub fn new_chat(&self, session: &mut Session) {
        session.new_chat();
    }

    /// Mark `project_id` as the one the caller is about to load.
    pub fn select_project(&self, session: &mut Session, project_id: &str) {
        session.select_project(project_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ProjectRef;
    use std::cell::{Cell, RefCell};

    #[derive(Default)]
    struct RecordingSink {
        closed: Cell<bool>,
        sent: RefCell<Vec<OutboundCommand>>,
    }

    impl CommandSink for &RecordingSink {
        fn is_open(&self) -> bool {
            !self.closed.get()
        }

        fn send(&self, command: OutboundCommand) {
            self.sent.borrow_mut().push(command);
        }
    }

    #[test]
    fn test_derive_project_name() {
        assert_eq!(derive_project_name("Build a todo app", 30), "Build a todo app");
        let long = "Build a snake game with a leaderboard and sounds";
        assert_eq!(
            derive_project_name(long, 30),
            "Build a snake game with a lead..."
        );
        assert_eq!(derive_project_name("ééééé", 3), "ééé...");
    }

    #[test]
    fn test_refused_when_closed() {
        let sink = RecordingSink::default();
        sink.closed.set(true);
        let dispatcher = Dispatcher::new(&sink, 30);
        let mut session = Session::new();
        assert_eq!(
            dispatcher.send_message(&mut session, "hello"),
            Err(DispatchError::NotConnected)
        );
        assert!(session.messages().is_empty());
        assert!(sink.sent.borrow().is_empty());
    }

    #[test]
    fn test_empty_message() {
        let sink = RecordingSink::default();
        let dispatcher = Dispatcher::new(&sink, 30);
        let mut session = Session::new();
        assert_eq!(
            dispatcher.send_message(&mut session, "   "),
            Err(DispatchError::EmptyMessage)
        );
    }

    #[test]
    fn test_no_second_run_while_generating() {
        let sink = RecordingSink::default();
        let dispatcher = Dispatcher::new(&sink, 30);
        let mut session = Session::new();
        dispatcher.send_message(&mut session, "first").unwrap();
        assert!(session.is_generating());
        assert_eq!(
            dispatcher.send_message(&mut session, "second"),
            Err(DispatchError::GenerationInFlight)
        );
        assert_eq!(sink.sent.borrow().len(), 1);
    }

    #[test]
    fn test_regenerate_needs_project() {
        let sink = RecordingSink::default();
        let dispatcher = Dispatcher::new(&sink, 30);
        let mut session = Session::new();
        assert_eq!(
            dispatcher.regenerate_project(&mut session),
            Err(DispatchError::NoCurrentProject)
        );

        session
            .identity
            .set_displayed(ProjectRef::new("p1", ProjectStatus::Completed));
        let cmd = dispatcher.regenerate_project(&mut session).unwrap();
        assert_eq!(
            cmd,
            OutboundCommand::RegenerateProject {
                project_id: "p1".to_string()
            }
        );
        assert!(session.is_generating());
        assert_eq!(session.active_project_id(), Some("p1"));
        assert_eq!(session.messages().last().unwrap().content, "Regenerating project...");
    }

    #[test]
    fn test_skip_without_question() {
        let sink = RecordingSink::default();
        let dispatcher = Dispatcher::new(&sink, 30);
        let mut session = Session::new();
        assert_eq!(
            dispatcher.skip_question(&mut session),
            Err(DispatchError::NoPendingQuestion)
        );
    }

    #[test]
    fn test_template_creation() {
        let sink = RecordingSink::default();
        let dispatcher = Dispatcher::new(&sink, 30);
        let mut session = Session::new();
        let cmd = dispatcher
            .create_from_template(
                &mut session,
                "todo-app",
                "Groceries",
                vec!["dark mode".to_string()],
                "  sync with phone ",
            )
            .unwrap();
        assert_eq!(
            cmd,
            OutboundCommand::CreateFromTemplate {
                template_id: "todo-app".to_string(),
                name: "Groceries".to_string(),
                features: vec!["dark mode".to_string()],
                custom_requirements: "sync with phone".to_string(),
            }
        );
        assert!(session.messages()[0].is_local_user());
        assert!(session.is_generating());
    }
}
