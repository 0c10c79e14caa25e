//! Conversation timeline
//!
//! Append-only log of exchanged messages. The only destructive operations are
//! the reset at the start of a brand-new project and the wholesale replace
//! when a persisted history is loaded while no run is in flight.

use super::message::Message;
use tracing::warn;

/// Position in the timeline where the round number changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundMarker {
    /// Draw a separator before `index`; a new round starts there
    Separator { index: usize, round: u32 },
    /// `round` at `index` is lower than the message before it
    Anomaly { index: usize, previous: u32, round: u32 },
}

/// Compute round markers for a sequence of (optional) round numbers.
///
/// Only adjacent pairs where both rounds are known are compared.
pub fn round_markers(rounds: &[Option<u32>]) -> Vec<RoundMarker> {
    let mut markers = Vec::new();
    for index in 1..rounds.len() {
        if let (Some(previous), Some(round)) = (rounds[index - 1], rounds[index]) {
            if round > previous {
                markers.push(RoundMarker::Separator { index, round });
            } else if round < previous {
                markers.push(RoundMarker::Anomaly {
                    index,
                    previous,
                    round,
                });
            }
        }
    }
    markers
}

/// Ordered, append-only message log
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    messages: Vec<Message>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Append a message. A round lower than the previous message's is logged.
    pub fn append(&mut self, message: Message) {
        if let (Some(previous), Some(round)) = (
            self.messages.last().and_then(|m| m.conversation_round),
            message.conversation_round,
        ) {
            if round < previous {
                warn!(
                    "conversation_round went backwards ({} -> {}) at timeline index {}",
                    previous,
                    round,
                    self.messages.len()
                );
            }
        }
        self.messages.push(message);
    }

    /// The most recent message the user typed in this client
    pub fn last_local_user_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.is_local_user())
    }

    /// Start a brand-new project's view: keep only the requirement the user
    /// just sent, followed by `status`.
    pub fn reset_to_new_run(&mut self, status: Message) {
        let trigger = self.last_local_user_message().cloned();
        self.messages.clear();
        if let Some(trigger) = trigger {
            self.messages.push(trigger);
        }
        self.messages.push(status);
    }

    /// Replace everything with a persisted history.
    pub fn replace(&mut self, messages: Vec<Message>) {
        self.messages = messages;
        for marker in self.round_markers() {
            if let RoundMarker::Anomaly {
                index,
                previous,
                round,
            } = marker
            {
                warn!(
                    "Loaded history has decreasing conversation_round ({} -> {}) at index {}",
                    previous, round, index
                );
            }
        }
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn round_markers(&self) -> Vec<RoundMarker> {
        let rounds: Vec<Option<u32>> = self
            .messages
            .iter()
            .map(|m| m.conversation_round)
            .collect();
        round_markers(&rounds)
    }

    /// Whether a round separator belongs immediately before `index`
    pub fn separator_before(&self, index: usize) -> bool {
        if index == 0 || index >= self.messages.len() {
            return false;
        }
        matches!(
            (
                self.messages[index - 1].conversation_round,
                self.messages[index].conversation_round,
            ),
            (Some(previous), Some(round)) if round > previous
        )
    }
}
