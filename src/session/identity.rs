//! Session identity: which project receives live events vs. which one is shown
//!
//! The two diverge when the user browses a finished project while a run
//! continues in the background.

use serde::{Deserialize, Serialize};

/// Persisted lifecycle status of a project
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", rename_all = "lowercase")]
pub enum ProjectStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

impl From<String> for ProjectStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "running" => Self::Running,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            _ => Self::Pending,
        }
    }
}

impl std::fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// A project reference together with its last known status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectRef {
    pub id: String,
    pub name: Option<String>,
    pub status: ProjectStatus,
}

impl ProjectRef {
    pub fn new(id: impl Into<String>, status: ProjectStatus) -> Self {
        Self {
            id: id.into(),
            name: None,
            status,
        }
    }
}

/// Tracks ActiveProjectId and DisplayedProject
#[derive(Debug, Clone, Default)]
pub struct IdentityTracker {
    active: Option<ProjectRef>,
    displayed: Option<ProjectRef>,
}

impl IdentityTracker {
    pub fn active(&self) -> Option<&ProjectRef> {
        self.active.as_ref()
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active.as_ref().map(|p| p.id.as_str())
    }

    pub fn displayed(&self) -> Option<&ProjectRef> {
        self.displayed.as_ref()
    }

    /// Attribute the live stream to `project_id`.
    pub fn set_active(&mut self, project_id: &str, status: ProjectStatus) {
        match &mut self.active {
            Some(active) if active.id == project_id => active.status = status,
            _ => self.active = Some(ProjectRef::new(project_id, status)),
        }
    }

    pub fn set_displayed(&mut self, project: ProjectRef) {
        self.displayed = Some(project);
    }

    /// Record a status change for `project_id` wherever it is tracked.
    pub fn mark_status(&mut self, project_id: &str, status: ProjectStatus) {
        for project in [&mut self.active, &mut self.displayed].into_iter().flatten() {
            if project.id == project_id {
                project.status = status;
            }
        }
    }

    /// The project a follow-up action applies to: the displayed one, else the active one.
    pub fn current(&self) -> Option<&ProjectRef> {
        self.displayed.as_ref().or(self.active.as_ref())
    }

    /// True when an event tagged with `project_id` belongs to a run the user is not watching.
    pub fn is_foreign(&self, project_id: Option<&str>) -> bool {
        match project_id.filter(|id| !id.is_empty()) {
            None => false,
            Some(id) => self.active_id() != Some(id),
        }
    }

    /// "New chat": forget both projects.
    pub fn clear(&mut self) {
        self.active = None;
        self.displayed = None;
    }
}
