//! Protocol definitions for the generation server's chat socket
//!
//! Every frame is a JSON object discriminated by its `type` field. Inbound
//! frames are decoded once, here, into [`InboundEvent`]; the rest of the crate
//! pattern-matches on the enum and never looks at raw JSON again.

use crate::{Result, TeamforgeError};
use serde::{Deserialize, Serialize};

/// Inbound event kinds (server -> client)
pub mod kinds {
    pub const PROGRESS: &str = "progress";
    pub const AGENT_STATUS: &str = "agent_status";
    pub const TASK_UPDATE: &str = "task_update";
    pub const CLARIFICATION: &str = "clarification";
    pub const RESPONSE_RECEIVED: &str = "response_received";
    pub const QUESTION_TIMEOUT: &str = "question_timeout";
    pub const AGENT_MESSAGE: &str = "agent_message";
    pub const REPLY_TO_HUMAN: &str = "reply_to_human";
    pub const STATUS: &str = "status";
    pub const COMPLETE: &str = "complete";
    pub const ERROR: &str = "error";
    pub const PONG: &str = "pong";
}

/// Maximum length the server uses for task instructions
pub const MAX_INSTRUCTION_CHARS: usize = 200;

// ─── Shared payloads ─────────────────────────────────────────────────

/// Progress block as sent by the server
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressPayload {
    #[serde(default)]
    pub current: u32,
    #[serde(default)]
    pub total: u32,
    #[serde(default)]
    pub percentage: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_agent: Option<String>,
}

/// Activity state of a roster entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", rename_all = "lowercase")]
pub enum AgentActivity {
    Pending,
    Active,
    Completed,
}

impl From<String> for AgentActivity {
    fn from(value: String) -> Self {
        match value.as_str() {
            "active" => Self::Active,
            "completed" => Self::Completed,
            _ => Self::Pending,
        }
    }
}

impl std::fmt::Display for AgentActivity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Active => write!(f, "active"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

/// One entry of `agent_states`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStatePayload {
    pub name: String,
    pub state: AgentActivity,
    #[serde(default)]
    pub description: String,
}

/// How a clarification question wants to be presented
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", rename_all = "lowercase")]
pub enum QuestionType {
    #[default]
    Inline,
    Modal,
}

impl From<String> for QuestionType {
    fn from(value: String) -> Self {
        if value == "modal" {
            Self::Modal
        } else {
            Self::Inline
        }
    }
}

/// Sub-value of a `status` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RunStatus {
    Created,
    Continuing,
    Regenerating,
    Retrying,
    Other(String),
}

impl RunStatus {
    /// Statuses that (re)attribute the live stream to the event's project
    pub fn starts_run(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl From<String> for RunStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "created" => Self::Created,
            "continuing" => Self::Continuing,
            "regenerating" => Self::Regenerating,
            "retrying" => Self::Retrying,
            _ => Self::Other(value),
        }
    }
}

impl From<RunStatus> for String {
    fn from(value: RunStatus) -> Self {
        match value {
            RunStatus::Created => "created".to_string(),
            RunStatus::Continuing => "continuing".to_string(),
            RunStatus::Regenerating => "regenerating".to_string(),
            RunStatus::Retrying => "retrying".to_string(),
            RunStatus::Other(s) => s,
        }
    }
}

// ─── Inbound events ──────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub progress: Option<ProgressPayload>,
    #[serde(default)]
    pub agent_states: Option<Vec<AgentStatePayload>>,
    #[serde(default)]
    pub conversation_round: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentStatusEvent {
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub agent_states: Vec<AgentStatePayload>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskUpdateEvent {
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub current_task_id: Option<String>,
    #[serde(default)]
    pub current_assignee: Option<String>,
    #[serde(default)]
    pub instruction: Option<String>,
    #[serde(default)]
    pub progress: Option<ProgressPayload>,
    #[serde(default)]
    pub agent_states: Option<Vec<AgentStatePayload>>,
    #[serde(default)]
    pub conversation_round: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClarificationEvent {
    pub question_id: String,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub agent: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub question_type: QuestionType,
    #[serde(default)]
    pub options: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseReceivedEvent {
    pub question_id: String,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub skipped: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuestionTimeoutEvent {
    pub question_id: String,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub content: String,
}

/// Chat narration: `agent_message` and `reply_to_human`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatEvent {
    #[serde(default)]
    pub agent: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub conversation_round: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEvent {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub status: Option<RunStatus>,
    #[serde(default)]
    pub conversation_round: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompleteEvent {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub workspace_path: Option<String>,
    #[serde(default)]
    pub conversation_round: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorEvent {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub can_retry: bool,
    #[serde(default)]
    pub auth_required: bool,
    #[serde(default)]
    pub question_id: Option<String>,
}

/// A decoded server frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    Progress(ProgressEvent),
    AgentStatus(AgentStatusEvent),
    TaskUpdate(TaskUpdateEvent),
    Clarification(ClarificationEvent),
    ResponseReceived(ResponseReceivedEvent),
    QuestionTimeout(QuestionTimeoutEvent),
    AgentMessage(ChatEvent),
    ReplyToHuman(ChatEvent),
    Status(StatusEvent),
    Complete(CompleteEvent),
    Error(ErrorEvent),
    Pong,
    /// Any `type` this client does not know about
    #[serde(other)]
    Unknown,
}

impl InboundEvent {
    /// Wire name of this event's kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Progress(_) => kinds::PROGRESS,
            Self::AgentStatus(_) => kinds::AGENT_STATUS,
            Self::TaskUpdate(_) => kinds::TASK_UPDATE,
            Self::Clarification(_) => kinds::CLARIFICATION,
            Self::ResponseReceived(_) => kinds::RESPONSE_RECEIVED,
            Self::QuestionTimeout(_) => kinds::QUESTION_TIMEOUT,
            Self::AgentMessage(_) => kinds::AGENT_MESSAGE,
            Self::ReplyToHuman(_) => kinds::REPLY_TO_HUMAN,
            Self::Status(_) => kinds::STATUS,
            Self::Complete(_) => kinds::COMPLETE,
            Self::Error(_) => kinds::ERROR,
            Self::Pong => kinds::PONG,
            Self::Unknown => "unknown",
        }
    }

    /// Project the event is tagged with, if any (empty strings count as none)
    pub fn project_id(&self) -> Option<&str> {
        let id = match self {
            Self::Progress(e) => e.project_id.as_deref(),
            Self::AgentStatus(e) => e.project_id.as_deref(),
            Self::TaskUpdate(e) => e.project_id.as_deref(),
            Self::Clarification(e) => e.project_id.as_deref(),
            Self::ResponseReceived(e) => e.project_id.as_deref(),
            Self::QuestionTimeout(e) => e.project_id.as_deref(),
            Self::AgentMessage(e) | Self::ReplyToHuman(e) => e.project_id.as_deref(),
            Self::Status(e) => e.project_id.as_deref(),
            Self::Complete(e) => e.project_id.as_deref(),
            Self::Error(e) => e.project_id.as_deref(),
            Self::Pong | Self::Unknown => None,
        };
        id.filter(|s| !s.is_empty())
    }
}

/// Decode one raw text frame.
pub fn decode_event(raw: &str) -> Result<InboundEvent> {
    serde_json::from_str(raw).map_err(|e| {
        let preview: String = raw.chars().take(120).collect();
        TeamforgeError::Protocol(format!("{e} in frame: {preview}"))
    })
}

// ─── Outbound commands ───────────────────────────────────────────────

/// A client command (client -> server)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundCommand {
    CreateProject {
        name: String,
        requirement: String,
    },
    CreateFromTemplate {
        template_id: String,
        name: String,
        features: Vec<String>,
        custom_requirements: String,
    },
    ContinueConversation {
        project_id: String,
        message: String,
    },
    RegenerateProject {
        project_id: String,
    },
    RetryProject {
        project_id: String,
    },
    UserResponse {
        question_id: String,
        project_id: String,
        response: String,
    },
    SkipQuestion {
        question_id: String,
    },
    Ping,
}

impl OutboundCommand {
    /// Whether this command kicks off a generation run
    pub fn starts_run(&self) -> bool {
        matches!(
            self,
            Self::CreateProject { .. }
                | Self::CreateFromTemplate { .. }
                | Self::ContinueConversation { .. }
                | Self::RegenerateProject { .. }
                | Self::RetryProject { .. }
        )
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_decode_status_created() {
        let event = decode_event(
            r#"{"type":"status","content":"Project created, starting generation...","project_id":"p1","status":"created"}"#,
        )
        .unwrap();
        match event {
            InboundEvent::Status(s) => {
                assert_eq!(s.status, Some(RunStatus::Created));
                assert_eq!(s.project_id.as_deref(), Some("p1"));
            }
            other => panic!("Expected status, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_task_update_with_nested_progress() {
        let raw = r#"{
            "type": "task_update",
            "project_id": "p1",
            "current_task_id": "3",
            "current_assignee": "Alex",
            "instruction": "Write the game loop",
            "progress": {"current": 2, "total": 5, "percentage": 40, "current_agent": "Alex"},
            "agent_states": [{"name": "Mike", "state": "completed", "description": "Team lead"}],
            "conversation_round": 2
        }"#;
        let event = decode_event(raw).unwrap();
        let InboundEvent::TaskUpdate(task) = event else {
            panic!("Expected task_update");
        };
        let progress = task.progress.unwrap();
        assert_eq!(progress.current, 2);
        assert_eq!(progress.percentage, 40.0);
        assert_eq!(task.agent_states.unwrap()[0].state, AgentActivity::Completed);
        assert_eq!(task.conversation_round, Some(2));
    }

    #[test]
    fn test_unknown_kind_decodes_to_unknown() {
        let event = decode_event(r#"{"type":"something_new","x":1}"#).unwrap();
        assert_eq!(event, InboundEvent::Unknown);
    }

    #[test]
    fn test_malformed_frames_are_errors() {
        assert!(decode_event("not json").is_err());
        // Known kind, missing required field
        assert!(decode_event(r#"{"type":"clarification","content":"?"}"#).is_err());
        // No discriminator
        assert!(decode_event(r#"{"content":"hi"}"#).is_err());
    }

    #[test]
    fn test_lenient_enums() {
        let event = decode_event(
            r#"{"type":"clarification","question_id":"q-1","question_type":"popup","agent":"Emma","content":"Which DB?"}"#,
        )
        .unwrap();
        let InboundEvent::Clarification(q) = event else {
            panic!("Expected clarification");
        };
        assert_eq!(q.question_type, QuestionType::Inline);

        let roster: AgentStatePayload =
            serde_json::from_str(r#"{"name":"Bob","state":"sleeping"}"#).unwrap();
        assert_eq!(roster.state, AgentActivity::Pending);
    }

    #[test]
    fn test_empty_project_id_is_none() {
        let event = decode_event(r#"{"type":"agent_message","agent":"Mike","content":"hi","project_id":""}"#)
            .unwrap();
        assert_eq!(event.project_id(), None);
        assert_eq!(event.kind(), kinds::AGENT_MESSAGE);
    }

    #[test]
    fn test_outbound_wire_shape() {
        let cmd = OutboundCommand::UserResponse {
            question_id: "q-1".to_string(),
            project_id: "p1".to_string(),
            response: "Postgres".to_string(),
        };
        let value: serde_json::Value = serde_json::from_str(&cmd.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "type": "user_response",
                "question_id": "q-1",
                "project_id": "p1",
                "response": "Postgres"
            })
        );

        let ping: serde_json::Value =
            serde_json::from_str(&OutboundCommand::Ping.to_json().unwrap()).unwrap();
        assert_eq!(ping, serde_json::json!({"type": "ping"}));
        assert!(!OutboundCommand::Ping.starts_run());
    }
}
