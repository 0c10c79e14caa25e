//! Live progress snapshot and agent roster

use crate::protocol::{AgentActivity, AgentStatePayload, ProgressPayload};

/// Transient progress of the current run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressSnapshot {
    pub current: u32,
    pub total: u32,
    /// 0–100
    pub percentage: u8,
    pub current_agent_name: Option<String>,
    pub current_task_description: Option<String>,
}

impl ProgressSnapshot {
    pub fn from_payload(payload: &ProgressPayload) -> Self {
        Self {
            current: payload.current,
            total: payload.total,
            percentage: clamp_percentage(payload.percentage),
            current_agent_name: payload.current_agent.clone().filter(|s| !s.is_empty()),
            current_task_description: None,
        }
    }
}

fn clamp_percentage(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.round().clamp(0.0, 100.0) as u8
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgentRosterEntry {
    pub name: String,
    pub activity: AgentActivity,
    pub description: String,
}

impl From<&AgentStatePayload> for AgentRosterEntry {
    fn from(state: &AgentStatePayload) -> Self {
        Self {
            name: state.name.clone(),
            activity: state.state,
            description: state.description.clone(),
        }
    }
}

/// Agents the orchestration engine has assigned work to
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentRoster {
    entries: Vec<AgentRosterEntry>,
}

impl AgentRoster {
    pub fn entries(&self) -> &[AgentRosterEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replace the roster with the server's full list
    pub fn replace(&mut self, states: &[AgentStatePayload]) {
        self.entries = states.iter().map(AgentRosterEntry::from).collect();
    }

    pub fn active(&self) -> Option<&AgentRosterEntry> {
        self.entries
            .iter()
            .find(|e| e.activity == AgentActivity::Active)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_payload_maps_and_clamps() {
        let snapshot = ProgressSnapshot::from_payload(&ProgressPayload {
            current: 6,
            total: 5,
            percentage: 120.0,
            current_agent: Some("Alex".to_string()),
        });
        assert_eq!(snapshot.percentage, 100);
        assert_eq!(snapshot.current_agent_name.as_deref(), Some("Alex"));

        let snapshot = ProgressSnapshot::from_payload(&ProgressPayload {
            percentage: -3.0,
            current_agent: Some(String::new()),
            ..Default::default()
        });
        assert_eq!(snapshot.percentage, 0);
        assert_eq!(snapshot.current_agent_name, None);
    }

    #[test]
    fn test_roster_replace() {
        let mut roster = AgentRoster::default();
        roster.replace(&[
            AgentStatePayload {
                name: "Mike".to_string(),
                state: AgentActivity::Completed,
                description: "Team lead".to_string(),
            },
            AgentStatePayload {
                name: "Alex".to_string(),
                state: AgentActivity::Active,
                description: "Engineer".to_string(),
            },
        ]);
        assert_eq!(roster.entries().len(), 2);
        assert_eq!(roster.active().unwrap().name, "Alex");

        roster.clear();
        assert!(roster.is_empty());
    }
}
