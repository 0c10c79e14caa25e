//! Session state
//!
//! One explicit object owns everything the view derives from: active vs.
//! displayed project, the timeline, the pending question, progress, roster
//! and the retryable failure. Inbound events mutate it through
//! [`Session::apply_event`](crate::router), user intents through the
//! [`Dispatcher`](crate::Dispatcher); nothing touches it from socket callbacks.

mod clarification;
mod identity;
mod message;
mod progress;
mod timeline;

pub use clarification::{ClarificationState, PendingQuestion};
pub use identity::{IdentityTracker, ProjectRef, ProjectStatus};
pub use message::{next_message_id, Message, MessageKind, SYSTEM_AGENT, USER_AGENT};
pub use progress::{AgentRoster, AgentRosterEntry, ProgressSnapshot};
pub use timeline::{round_markers, RoundMarker, Timeline};

use crate::api::ProjectDetail;
use tracing::{debug, info};

/// Outcome of applying a fetched project detail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailApplied {
    /// Timeline replaced; project is now active and displayed
    Replaced,
    /// A run is in flight; only the displayed project changed
    DisplayOnly,
    /// The user has since asked for a different project; ignored
    Stale,
}

#[derive(Debug, Clone, Default)]
pub struct Session {
    pub(crate) identity: IdentityTracker,
    pub(crate) timeline: Timeline,
    pub(crate) clarification: ClarificationState,
    pub(crate) progress: Option<ProgressSnapshot>,
    pub(crate) roster: AgentRoster,
    pub(crate) failed_project: Option<String>,
    pub(crate) generating: bool,
    /// Project the user most recently selected and whose detail is still loading
    pub(crate) requested_detail: Option<String>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn identity(&self) -> &IdentityTracker {
        &self.identity
    }

    pub fn active_project_id(&self) -> Option<&str> {
        self.identity.active_id()
    }

    pub fn displayed_project(&self) -> Option<&ProjectRef> {
        self.identity.displayed()
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn messages(&self) -> &[Message] {
        self.timeline.messages()
    }

    pub fn clarification(&self) -> &ClarificationState {
        &self.clarification
    }

    pub fn pending_question(&self) -> Option<&PendingQuestion> {
        self.clarification.pending()
    }

    pub fn progress(&self) -> Option<&ProgressSnapshot> {
        self.progress.as_ref()
    }

    pub fn roster(&self) -> &AgentRoster {
        &self.roster
    }

    pub fn failed_project_id(&self) -> Option<&str> {
        self.failed_project.as_deref()
    }

    pub fn is_generating(&self) -> bool {
        self.generating
    }

    /// Input accepts text when idle, or while a question is pending even mid-run.
    pub fn input_enabled(&self) -> bool {
        !self.generating || self.clarification.is_awaiting()
    }

    pub(crate) fn begin_run(&mut self) {
        self.generating = true;
    }

    pub(crate) fn reset_run_state(&mut self) {
        self.progress = None;
        self.roster.clear();
    }

    /// "New chat": forget everything, including any background run.
    pub fn new_chat(&mut self) {
        if self.generating {
            info!("New chat while a run is in flight; its events will no longer be shown");
        }
        self.identity.clear();
        self.timeline.clear();
        self.clarification.clear();
        self.reset_run_state();
        self.failed_project = None;
        self.generating = false;
        self.requested_detail = None;
    }

    /// The user picked a project from the list; its detail fetch is about to start.
    pub fn select_project(&mut self, project_id: &str) {
        self.requested_detail = Some(project_id.to_string());
    }

    /// A detail fetch failed; free the slot if it was the one requested.
    pub fn detail_failed(&mut self, project_id: &str) {
        if self.requested_detail.as_deref() == Some(project_id) {
            self.requested_detail = None;
        }
    }

    /// Reconcile a fetched project detail with the live view.
    ///
    /// The requirement becomes a synthetic round-1 user message ahead of the
    /// persisted history. The live timeline is only replaced when no run is
    /// in flight; otherwise just the displayed project changes.
    pub fn apply_project_detail(&mut self, detail: ProjectDetail) -> DetailApplied {
        let project_id = detail.project.id.clone();
        if let Some(requested) = &self.requested_detail {
            if *requested != project_id {
                debug!(
                    "Ignoring detail for {}; {} was selected since",
                    project_id, requested
                );
                return DetailApplied::Stale;
            }
        }
        self.requested_detail = None;

        let status = detail.project.status;
        self.identity.set_displayed(ProjectRef {
            id: project_id.clone(),
            name: Some(detail.project.name.clone()),
            status,
        });

        if self.generating {
            debug!("Run in flight; not replacing the timeline with {}", project_id);
            return DetailApplied::DisplayOnly;
        }

        let mut messages = Vec::with_capacity(detail.messages.len() + 1);
        let mut requirement = Message::new(MessageKind::User, USER_AGENT, detail.project.requirement.clone())
            .with_project(Some(project_id.clone()))
            .with_round(Some(1));
        if let Some(created_at) = detail.project.created_time() {
            requirement = requirement.with_timestamp(created_at);
        }
        messages.push(requirement);
        messages.extend(detail.messages.iter().map(|m| m.to_message()));

        self.timeline.replace(messages);
        self.identity.set_active(&project_id, status);
        DetailApplied::Replaced
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{PersistedMessage, ProjectInfo};

    fn detail(id: &str, status: ProjectStatus) -> ProjectDetail {
        ProjectDetail {
            project: ProjectInfo {
                id: id.to_string(),
                name: "Todo".to_string(),
                requirement: "Build a todo app".to_string(),
                status,
                workspace_path: None,
                created_at: None,
                updated_at: None,
            },
            messages: vec![PersistedMessage {
                id: Some("m1".to_string()),
                project_id: Some(id.to_string()),
                agent: "Mike".to_string(),
                content: "Plan ready".to_string(),
                message_type: "agent_message".to_string(),
                conversation_round: Some(1),
                created_at: None,
            }],
        }
    }

    #[test]
    fn test_detail_replaces_when_idle() {
        let mut session = Session::new();
        session.select_project("p1");
        let applied = session.apply_project_detail(detail("p1", ProjectStatus::Completed));
        assert_eq!(applied, DetailApplied::Replaced);
        assert_eq!(session.active_project_id(), Some("p1"));
        assert_eq!(session.displayed_project().unwrap().id, "p1");
        assert_eq!(session.messages().len(), 2);
        assert_eq!(session.messages()[0].content, "Build a todo app");
        assert_eq!(session.messages()[0].conversation_round, Some(1));
    }

    #[test]
    fn test_detail_does_not_clobber_live_run() {
        let mut session = Session::new();
        session.identity.set_active("live", ProjectStatus::Running);
        session.timeline.append(Message::local_user("live requirement"));
        session.begin_run();

        session.select_project("old");
        let applied = session.apply_project_detail(detail("old", ProjectStatus::Completed));
        assert_eq!(applied, DetailApplied::DisplayOnly);
        assert_eq!(session.active_project_id(), Some("live"));
        assert_eq!(session.displayed_project().unwrap().id, "old");
        assert_eq!(session.messages().len(), 1);
    }

    #[test]
    fn test_stale_detail_is_ignored() {
        let mut session = Session::new();
        session.select_project("p1");
        session.select_project("p2");
        let applied = session.apply_project_detail(detail("p1", ProjectStatus::Completed));
        assert_eq!(applied, DetailApplied::Stale);
        assert!(session.displayed_project().is_none());
    }

    #[test]
    fn test_failed_detail_frees_the_slot() {
        let mut session = Session::new();
        session.select_project("old");
        session.detail_failed("other");
        assert_eq!(session.requested_detail.as_deref(), Some("old"));

        session.detail_failed("old");
        assert!(session.requested_detail.is_none());
        let applied = session.apply_project_detail(detail("p1", ProjectStatus::Completed));
        assert_eq!(applied, DetailApplied::Replaced);
    }

    #[test]
    fn test_new_chat_clears_everything() {
        let mut session = Session::new();
        session.apply_project_detail(detail("p1", ProjectStatus::Completed));
        session.failed_project = Some("p1".to_string());
        session.begin_run();

        session.new_chat();
        assert!(session.active_project_id().is_none());
        assert!(session.displayed_project().is_none());
        assert!(session.messages().is_empty());
        assert!(session.failed_project_id().is_none());
        assert!(!session.is_generating());
        assert!(session.input_enabled());
    }
}
