//! Event classifier and router
//!
//! Applies one decoded [`InboundEvent`] to the [`Session`]. The run-state
//! kinds (progress, roster, task, clarification bookkeeping) are handled
//! first and never fall through to chat handling. Side effects the session
//! cannot perform itself are returned as [`Effect`]s for the front end.

use crate::protocol::{
    AgentStatusEvent, ChatEvent, ClarificationEvent, CompleteEvent, ErrorEvent, InboundEvent,
    ProgressEvent, QuestionTimeoutEvent, ResponseReceivedEvent, RunStatus, StatusEvent,
    TaskUpdateEvent, MAX_INSTRUCTION_CHARS,
};
use crate::session::{
    Message, MessageKind, PendingQuestion, ProgressSnapshot, ProjectStatus, Session, SYSTEM_AGENT,
};
use tracing::{debug, info, warn};

/// Timeline text used when the server's timeout event carries none
pub const DEFAULT_TIMEOUT_NOTICE: &str = "Question timed out, using default behavior";

/// Work the front end performs on behalf of the router
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Re-fetch the project list
    RefreshProjectList,
    /// Re-fetch the full detail of a project and apply it
    ReloadProject { project_id: String },
    /// Show a blocking dialog for the pending question
    OpenQuestionDialog { question_id: String },
    /// The server rejected the session's credentials
    AuthRequired,
}

impl Session {
    /// Apply one inbound event, in arrival order.
    pub fn apply_event(&mut self, event: InboundEvent) -> Vec<Effect> {
        debug!("Inbound {} (project {:?})", event.kind(), event.project_id());
        match event {
            InboundEvent::Progress(e) => {
                self.on_progress(e);
                Vec::new()
            }
            InboundEvent::AgentStatus(e) => {
                self.on_agent_status(e);
                Vec::new()
            }
            InboundEvent::TaskUpdate(e) => {
                self.on_task_update(e);
                Vec::new()
            }
            InboundEvent::Clarification(e) => self.on_clarification(e),
            InboundEvent::ResponseReceived(e) => {
                self.on_response_received(e);
                Vec::new()
            }
            InboundEvent::QuestionTimeout(e) => {
                self.on_question_timeout(e);
                Vec::new()
            }
            InboundEvent::AgentMessage(e) => {
                self.on_chat(MessageKind::AgentMessage, e);
                Vec::new()
            }
            InboundEvent::ReplyToHuman(e) => {
                self.on_chat(MessageKind::ReplyToHuman, e);
                Vec::new()
            }
            InboundEvent::Status(e) => {
                self.on_status(e);
                Vec::new()
            }
            InboundEvent::Complete(e) => self.on_complete(e),
            InboundEvent::Error(e) => self.on_error(e),
            InboundEvent::Pong => Vec::new(),
            InboundEvent::Unknown => {
                debug!("Ignoring event of unknown kind");
                Vec::new()
            }
        }
    }

    // ─── Run-state kinds (no timeline append) ────────────────────────

    fn on_progress(&mut self, event: ProgressEvent) {
        if self.identity.is_foreign(event.project_id.as_deref()) {
            debug!("Dropping progress for background project {:?}", event.project_id);
            return;
        }
        if let Some(payload) = &event.progress {
            let mut snapshot = ProgressSnapshot::from_payload(payload);
            // Task text only arrives via task_update; keep it across progress ticks
            snapshot.current_task_description = self
                .progress
                .as_ref()
                .and_then(|p| p.current_task_description.clone());
            self.progress = Some(snapshot);
        }
        if let Some(states) = &event.agent_states {
            self.roster.replace(states);
        }
    }

    fn on_agent_status(&mut self, event: AgentStatusEvent) {
        if self.identity.is_foreign(event.project_id.as_deref()) {
            debug!("Dropping agent_status for background project {:?}", event.project_id);
            return;
        }
        self.roster.replace(&event.agent_states);
    }

    fn on_task_update(&mut self, event: TaskUpdateEvent) {
        if self.identity.is_foreign(event.project_id.as_deref()) {
            debug!("Dropping task_update for background project {:?}", event.project_id);
            return;
        }
        let mut snapshot = match &event.progress {
            Some(payload) => {
                let mut fresh = ProgressSnapshot::from_payload(payload);
                if fresh.current_agent_name.is_none() {
                    fresh.current_agent_name = self
                        .progress
                        .as_ref()
                        .and_then(|p| p.current_agent_name.clone());
                }
                fresh
            }
            None => self.progress.clone().unwrap_or_default(),
        };
        if let Some(assignee) = event.current_assignee.filter(|a| !a.is_empty()) {
            snapshot.current_agent_name = Some(assignee);
        }
        if let Some(instruction) = event.instruction.filter(|i| !i.is_empty()) {
            snapshot.current_task_description =
                Some(instruction.chars().take(MAX_INSTRUCTION_CHARS).collect());
        }
        self.progress = Some(snapshot);
        if let Some(states) = &event.agent_states {
            self.roster.replace(states);
        }
    }

    // ─── Clarification ───────────────────────────────────────────────

    fn on_clarification(&mut self, event: ClarificationEvent) -> Vec<Effect> {
        if self.identity.is_foreign(event.project_id.as_deref()) {
            warn!(
                "Question {} belongs to background project {:?}; not shown",
                event.question_id, event.project_id
            );
            return Vec::new();
        }
        let question = PendingQuestion::from(&event);
        let modal = question.question_type == crate::protocol::QuestionType::Modal;

        let mut message = Message::new(MessageKind::Clarification, event.agent, event.content)
            .with_project(event.project_id);
        message.question_id = Some(event.question_id.clone());
        message.question_type = Some(event.question_type);
        message.options = event.options;
        self.timeline.append(message);
        self.clarification.install(question);

        if modal {
            vec![Effect::OpenQuestionDialog {
                question_id: event.question_id,
            }]
        } else {
            Vec::new()
        }
    }

    fn on_response_received(&mut self, event: ResponseReceivedEvent) {
        if self.clarification.resolve(&event.question_id) {
            debug!(
                "Question {} acknowledged{}",
                event.question_id,
                if event.skipped { " (skipped)" } else { "" }
            );
        }
    }

    fn on_question_timeout(&mut self, event: QuestionTimeoutEvent) {
        if self.identity.is_foreign(event.project_id.as_deref()) {
            debug!("Dropping question_timeout for background project {:?}", event.project_id);
            return;
        }
        self.clarification.resolve(&event.question_id);
        let content = if event.content.is_empty() {
            DEFAULT_TIMEOUT_NOTICE.to_string()
        } else {
            event.content
        };
        let mut message = Message::system(content).with_project(event.project_id);
        message.question_id = Some(event.question_id);
        self.timeline.append(message);
    }

    // ─── Chat and status ─────────────────────────────────────────────

    fn on_chat(&mut self, kind: MessageKind, event: ChatEvent) {
        if self.identity.is_foreign(event.project_id.as_deref()) {
            debug!("Discarding {} from background project {:?}", kind, event.project_id);
            return;
        }
        let message = Message::new(kind, event.agent, event.content)
            .with_project(event.project_id)
            .with_round(event.conversation_round);
        self.timeline.append(message);
    }

    fn on_status(&mut self, event: StatusEvent) {
        let project_id = event.project_id.clone().filter(|id| !id.is_empty());
        let status = event.status.clone();
        let message = Message::new(MessageKind::Status, SYSTEM_AGENT, event.content)
            .with_project(event.project_id)
            .with_round(event.conversation_round);

        match status {
            Some(run) if run.starts_run() => {
                match &project_id {
                    Some(id) => self.identity.set_active(id, ProjectStatus::Running),
                    None => warn!("status {:?} without a project id", run),
                }
                self.begin_run();
                if run == RunStatus::Created {
                    info!("New project {:?}; resetting the timeline", project_id);
                    self.timeline.reset_to_new_run(message);
                } else {
                    self.timeline.append(message);
                }
            }
            _ => {
                if self.identity.is_foreign(project_id.as_deref()) {
                    debug!("Discarding status from background project {:?}", project_id);
                    return;
                }
                self.timeline.append(message);
            }
        }
    }

    // ─── Completion and errors ───────────────────────────────────────

    fn on_complete(&mut self, event: CompleteEvent) -> Vec<Effect> {
        let project_id = event.project_id.clone().filter(|id| !id.is_empty());
        if self.identity.is_foreign(project_id.as_deref()) {
            info!("Background project {:?} completed", project_id);
            return vec![Effect::RefreshProjectList];
        }

        let mut message = Message::new(MessageKind::Complete, SYSTEM_AGENT, event.content)
            .with_project(event.project_id)
            .with_round(event.conversation_round);
        message.workspace_path = event.workspace_path;
        self.timeline.append(message);

        self.reset_run_state();
        self.failed_project = None;
        self.clarification.clear();
        self.generating = false;

        let mut effects = vec![Effect::RefreshProjectList];
        if let Some(id) = project_id {
            self.identity.mark_status(&id, ProjectStatus::Completed);
            effects.push(Effect::ReloadProject { project_id: id });
        }
        effects
    }

    fn on_error(&mut self, event: ErrorEvent) -> Vec<Effect> {
        let project_id = event.project_id.clone().filter(|id| !id.is_empty());
        if self.identity.is_foreign(project_id.as_deref()) {
            warn!("Background project {:?} failed: {}", project_id, event.content);
            return vec![Effect::RefreshProjectList];
        }

        warn!("Server error: {}", event.content);
        let mut message = Message::new(MessageKind::Error, SYSTEM_AGENT, event.content)
            .with_project(event.project_id);
        message.can_retry = event.can_retry;
        message.question_id = event.question_id;
        self.timeline.append(message);

        self.reset_run_state();
        self.clarification.clear();
        self.generating = false;

        if event.can_retry {
            if let Some(id) = &project_id {
                self.failed_project = Some(id.clone());
                self.identity.mark_status(id, ProjectStatus::Failed);
            }
        }

        if event.auth_required {
            vec![Effect::AuthRequired]
        } else {
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::decode_event;
    use pretty_assertions::assert_eq;

    fn apply(session: &mut Session, raw: &str) -> Vec<Effect> {
        session.apply_event(decode_event(raw).unwrap())
    }

    fn running(project_id: &str) -> Session {
        let mut session = Session::new();
        session.identity.set_active(project_id, ProjectStatus::Running);
        session.begin_run();
        session
    }

    #[test]
    fn test_progress_does_not_touch_timeline() {
        let mut session = running("p1");
        apply(
            &mut session,
            r#"{"type":"progress","project_id":"p1","progress":{"current":1,"total":4,"percentage":25,"current_agent":"Emma"},
                "agent_states":[{"name":"Emma","state":"active","description":"PM"}]}"#,
        );
        let progress = session.progress().unwrap();
        assert_eq!(progress.percentage, 25);
        assert_eq!(progress.current_agent_name.as_deref(), Some("Emma"));
        assert_eq!(session.roster().entries().len(), 1);
        assert!(session.messages().is_empty());
    }

    #[test]
    fn test_task_update_sets_agent_and_task() {
        let mut session = running("p1");
        let long = "x".repeat(300);
        apply(
            &mut session,
            &format!(
                r#"{{"type":"task_update","project_id":"p1","current_task_id":"2","current_assignee":"Alex","instruction":"{long}"}}"#
            ),
        );
        let progress = session.progress().unwrap();
        assert_eq!(progress.current_agent_name.as_deref(), Some("Alex"));
        assert_eq!(
            progress.current_task_description.as_ref().unwrap().chars().count(),
            MAX_INSTRUCTION_CHARS
        );

        // A later progress tick keeps the task text
        apply(
            &mut session,
            r#"{"type":"progress","project_id":"p1","progress":{"current":3,"total":4,"percentage":75}}"#,
        );
        assert!(session.progress().unwrap().current_task_description.is_some());
        assert!(session.messages().is_empty());
    }

    #[test]
    fn test_foreign_progress_is_ignored() {
        let mut session = running("p1");
        apply(
            &mut session,
            r#"{"type":"progress","project_id":"p2","progress":{"current":1,"total":2,"percentage":50}}"#,
        );
        assert!(session.progress().is_none());
    }

    #[test]
    fn test_modal_clarification_opens_dialog() {
        let mut session = running("p1");
        let effects = apply(
            &mut session,
            r#"{"type":"clarification","question_id":"q-1","project_id":"p1","agent":"Emma",
                "content":"Which database?","question_type":"modal","options":["SQLite","Postgres"]}"#,
        );
        assert_eq!(
            effects,
            vec![Effect::OpenQuestionDialog {
                question_id: "q-1".to_string()
            }]
        );
        assert!(session.clarification().is_awaiting());
        assert!(session.input_enabled());
        let msg = session.messages().last().unwrap();
        assert_eq!(msg.kind, MessageKind::Clarification);
        assert_eq!(msg.options, vec!["SQLite", "Postgres"]);
    }

    #[test]
    fn test_mismatched_ack_keeps_question() {
        let mut session = running("p1");
        apply(
            &mut session,
            r#"{"type":"clarification","question_id":"q-2","project_id":"p1","agent":"Emma","content":"?"}"#,
        );
        apply(&mut session, r#"{"type":"response_received","question_id":"q-1"}"#);
        assert!(session.clarification().is_awaiting());
        apply(
            &mut session,
            r#"{"type":"response_received","question_id":"q-2","skipped":true}"#,
        );
        assert!(!session.clarification().is_awaiting());
    }

    #[test]
    fn test_timeout_without_content_uses_default_notice() {
        let mut session = running("p1");
        apply(
            &mut session,
            r#"{"type":"clarification","question_id":"q-1","project_id":"p1","agent":"Emma","content":"?"}"#,
        );
        apply(&mut session, r#"{"type":"question_timeout","question_id":"q-1"}"#);
        assert!(!session.clarification().is_awaiting());
        let last = session.messages().last().unwrap();
        assert_eq!(last.kind, MessageKind::System);
        assert_eq!(last.content, DEFAULT_TIMEOUT_NOTICE);
    }

    #[test]
    fn test_status_continuing_appends() {
        let mut session = Session::new();
        session.timeline.append(Message::local_user("first"));
        apply(
            &mut session,
            r#"{"type":"status","content":"Continuing...","project_id":"p1","status":"continuing","conversation_round":2}"#,
        );
        assert_eq!(session.messages().len(), 2);
        assert_eq!(session.active_project_id(), Some("p1"));
        assert!(session.is_generating());
    }

    #[test]
    fn test_unrecognised_status_for_active_project_appends() {
        let mut session = running("p1");
        apply(
            &mut session,
            r#"{"type":"status","content":"Writing files","project_id":"p1","status":"saving"}"#,
        );
        apply(&mut session, r#"{"type":"status","content":"Writing files","project_id":"p9"}"#);
        assert_eq!(session.messages().len(), 1);
        assert!(session.is_generating());
    }

    #[test]
    fn test_complete_effects_and_status() {
        let mut session = running("p1");
        session.failed_project = Some("p1".to_string());
        let effects = apply(
            &mut session,
            r#"{"type":"complete","content":"Done","project_id":"p1","workspace_path":"/ws/p1","conversation_round":1}"#,
        );
        assert_eq!(
            effects,
            vec![
                Effect::RefreshProjectList,
                Effect::ReloadProject {
                    project_id: "p1".to_string()
                }
            ]
        );
        assert!(!session.is_generating());
        assert!(session.failed_project_id().is_none());
        assert_eq!(session.active_project_id(), Some("p1"));
        assert_eq!(
            session.identity().active().unwrap().status,
            ProjectStatus::Completed
        );
        assert_eq!(
            session.messages().last().unwrap().workspace_path.as_deref(),
            Some("/ws/p1")
        );
    }

    #[test]
    fn test_foreign_complete_only_refreshes_list() {
        let mut session = running("p1");
        let effects = apply(&mut session, r#"{"type":"complete","content":"Done","project_id":"p2"}"#);
        assert_eq!(effects, vec![Effect::RefreshProjectList]);
        assert!(session.is_generating());
        assert!(session.messages().is_empty());
    }

    #[test]
    fn test_error_without_retry() {
        let mut session = running("p1");
        apply(
            &mut session,
            r#"{"type":"progress","project_id":"p1","progress":{"current":1,"total":2,"percentage":50},
                "agent_states":[{"name":"Alex","state":"active","description":"Engineer"}]}"#,
        );
        assert_eq!(session.roster().entries().len(), 1);
        let effects = apply(&mut session, r#"{"type":"error","content":"boom","project_id":"p1"}"#);
        assert!(effects.is_empty());
        assert!(session.progress().is_none());
        assert!(session.roster().is_empty());
        assert!(session.failed_project_id().is_none());
        assert_eq!(session.active_project_id(), Some("p1"));
        assert!(!session.messages().last().unwrap().can_retry);
    }

    #[test]
    fn test_auth_required_error() {
        let mut session = Session::new();
        let effects = apply(
            &mut session,
            r#"{"type":"error","content":"Authentication required","auth_required":true}"#,
        );
        assert_eq!(effects, vec![Effect::AuthRequired]);
        assert_eq!(session.messages().len(), 1);
    }

    #[test]
    fn test_pong_and_unknown_are_silent() {
        let mut session = running("p1");
        assert!(apply(&mut session, r#"{"type":"pong"}"#).is_empty());
        assert!(apply(&mut session, r#"{"type":"heartbeat"}"#).is_empty());
        assert!(session.messages().is_empty());
    }
}
