//! Timeline messages

use crate::protocol::QuestionType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Agent name used for locally originated user messages
pub const USER_AGENT: &str = "User";

/// Agent name used for client and server system lines
pub const SYSTEM_AGENT: &str = "System";

static MESSAGE_SEQ: AtomicU64 = AtomicU64::new(0);

/// Generate a unique, roughly time-ordered client-side message id.
pub fn next_message_id() -> String {
    let seq = MESSAGE_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("msg-{}-{}", Utc::now().timestamp_millis(), seq)
}

/// What a timeline entry represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    User,
    AgentMessage,
    ReplyToHuman,
    Status,
    Clarification,
    UserResponse,
    Complete,
    Error,
    /// Client-side informational line (timeouts and similar)
    System,
}

impl MessageKind {
    /// Map a persisted `message_type` onto a kind. Unknown types render as agent chat.
    pub fn from_wire(message_type: &str) -> Self {
        match message_type {
            "user" => Self::User,
            "agent_message" => Self::AgentMessage,
            "reply_to_human" => Self::ReplyToHuman,
            "status" => Self::Status,
            "clarification" => Self::Clarification,
            "user_response" => Self::UserResponse,
            "complete" => Self::Complete,
            "error" => Self::Error,
            "system" => Self::System,
            _ => Self::AgentMessage,
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::User => "user",
            Self::AgentMessage => "agent_message",
            Self::ReplyToHuman => "reply_to_human",
            Self::Status => "status",
            Self::Clarification => "clarification",
            Self::UserResponse => "user_response",
            Self::Complete => "complete",
            Self::Error => "error",
            Self::System => "system",
        };
        write!(f, "{}", s)
    }
}

/// One entry of the conversation timeline. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub kind: MessageKind,
    pub agent: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub project_id: Option<String>,
    pub conversation_round: Option<u32>,
    #[serde(default)]
    pub can_retry: bool,
    pub question_id: Option<String>,
    pub question_type: Option<QuestionType>,
    #[serde(default)]
    pub options: Vec<String>,
    /// The user skipped the question this message answers
    #[serde(default)]
    pub skipped: bool,
    /// Created by this client rather than received from the server
    #[serde(default)]
    pub local: bool,
    pub workspace_path: Option<String>,
}

impl Message {
    pub fn new(kind: MessageKind, agent: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: next_message_id(),
            kind,
            agent: agent.into(),
            content: content.into(),
            timestamp: Utc::now(),
            project_id: None,
            conversation_round: None,
            can_retry: false,
            question_id: None,
            question_type: None,
            options: Vec::new(),
            skipped: false,
            local: false,
            workspace_path: None,
        }
    }

    /// A message typed by the user in this client
    pub fn local_user(content: impl Into<String>) -> Self {
        let mut msg = Self::new(MessageKind::User, USER_AGENT, content);
        msg.local = true;
        msg
    }

    /// A client-originated status line (regenerate/retry audit)
    pub fn local_status(content: impl Into<String>) -> Self {
        let mut msg = Self::new(MessageKind::Status, SYSTEM_AGENT, content);
        msg.local = true;
        msg
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageKind::System, SYSTEM_AGENT, content)
    }

    pub fn with_project(mut self, project_id: Option<String>) -> Self {
        self.project_id = project_id.filter(|id| !id.is_empty());
        self
    }

    pub fn with_round(mut self, round: Option<u32>) -> Self {
        self.conversation_round = round;
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn is_local_user(&self) -> bool {
        self.local && self.kind == MessageKind::User
    }
}
