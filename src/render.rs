//! Plain-text rendering of the session for a line-oriented terminal

use crate::api::{FileListing, ProjectInfo, ShareInfo, TemplateInfo};
use crate::protocol::{AgentActivity, QuestionType};
use crate::session::{AgentRoster, Message, MessageKind, ProgressSnapshot, Session, Timeline};

pub fn round_separator(round: u32) -> String {
    format!("──────── Round {} ────────", round)
}

pub fn render_message(msg: &Message) -> String {
    let time = msg.timestamp.format("%H:%M");
    let mut out = match msg.kind {
        MessageKind::User => format!("[{}] You: {}", time, msg.content),
        MessageKind::UserResponse if msg.skipped => format!("[{}] You skipped the question", time),
        MessageKind::UserResponse => format!("[{}] You answered: {}", time, msg.content),
        MessageKind::Status | MessageKind::System => format!("[{}] · {}", time, msg.content),
        MessageKind::Clarification => format!("[{}] {} asks: {}", time, msg.agent, msg.content),
        MessageKind::Complete => format!("[{}] ✓ {}", time, msg.content),
        MessageKind::Error => format!("[{}] ✗ {}", time, msg.content),
        MessageKind::AgentMessage | MessageKind::ReplyToHuman => {
            format!("[{}] {}: {}", time, msg.agent, msg.content)
        }
    };

    if msg.kind == MessageKind::Clarification {
        for (i, option) in msg.options.iter().enumerate() {
            out.push_str(&format!("\n    {}) {}", i + 1, option));
        }
        let hint = match msg.question_type {
            Some(QuestionType::Modal) => "answer required",
            _ => "type an answer",
        };
        out.push_str(&format!("\n    ({}, or /skip)", hint));
    }
    if let Some(path) = &msg.workspace_path {
        out.push_str(&format!("\n    workspace: {}", path));
    }
    if msg.kind == MessageKind::Error && msg.can_retry {
        out.push_str("\n    (use /retry to try again)");
    }
    out
}

/// Render messages from `start` on, with round separators where the round increases.
pub fn render_timeline_from(timeline: &Timeline, start: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for (index, msg) in timeline.messages().iter().enumerate().skip(start) {
        if timeline.separator_before(index) {
            if let Some(round) = msg.conversation_round {
                lines.push(round_separator(round));
            }
        }
        lines.push(render_message(msg));
    }
    lines
}

fn progress_bar(percentage: u8, width: usize) -> String {
    let filled = (percentage as usize * width) / 100;
    format!("[{}{}]", "#".repeat(filled), "-".repeat(width - filled))
}

pub fn render_progress(progress: &ProgressSnapshot) -> String {
    let mut out = format!(
        "{} {:>3}% ({}/{})",
        progress_bar(progress.percentage, 20),
        progress.percentage,
        progress.current,
        progress.total
    );
    if let Some(agent) = &progress.current_agent_name {
        out.push_str(&format!(" {}", agent));
    }
    if let Some(task) = &progress.current_task_description {
        out.push_str(&format!(": {}", task));
    }
    out
}

pub fn render_roster(roster: &AgentRoster) -> String {
    roster
        .entries()
        .iter()
        .map(|entry| {
            let marker = match entry.activity {
                AgentActivity::Active => "▶",
                AgentActivity::Completed => "✓",
                AgentActivity::Pending => "·",
            };
            format!("{} {}", marker, entry.name)
        })
        .collect::<Vec<_>>()
        .join("  ")
}

pub fn render_status(session: &Session, connected: bool) -> String {
    let mut lines = vec![format!(
        "connection: {}",
        if connected { "open" } else { "reconnecting" }
    )];
    match session.identity().active() {
        Some(p) => lines.push(format!("active: {} ({})", p.id, p.status)),
        None => lines.push("active: none".to_string()),
    }
    if let Some(p) = session.displayed_project() {
        lines.push(format!(
            "viewing: {} {} ({})",
            p.id,
            p.name.as_deref().unwrap_or(""),
            p.status
        ));
    }
    if session.is_generating() {
        lines.push("generating: yes".to_string());
    }
    if let Some(progress) = session.progress() {
        lines.push(render_progress(progress));
    }
    if !session.roster().is_empty() {
        lines.push(render_roster(session.roster()));
    }
    if let Some(q) = session.pending_question() {
        lines.push(format!("waiting for your answer to {}: {}", q.asking_agent, q.content));
    }
    if let Some(id) = session.failed_project_id() {
        lines.push(format!("failed: {} (/retry)", id));
    }
    lines.join("\n")
}

pub fn render_project_list(projects: &[ProjectInfo], total: usize) -> String {
    if projects.is_empty() {
        return "No projects yet.".to_string();
    }
    let mut lines: Vec<String> = projects
        .iter()
        .map(|p| {
            let created = p
                .created_time()
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default();
            format!("  {:<38} {:<10} {:<16} {}", p.id, p.status.to_string(), created, p.name)
        })
        .collect();
    if total > projects.len() {
        lines.push(format!("  ... {} more", total - projects.len()));
    }
    lines.join("\n")
}

pub fn render_files(listing: &FileListing) -> String {
    if listing.files.is_empty() {
        return "No files.".to_string();
    }
    let mut lines: Vec<String> = listing
        .files
        .iter()
        .map(|f| format!("  {:>8}  {}", f.size, f.path))
        .collect();
    if listing.truncated {
        lines.push(format!("  (showing {} of {})", listing.files.len(), listing.total));
    }
    lines.join("\n")
}

pub fn render_share(share: &ShareInfo) -> String {
    format!("{} ({} views)", share.share_url, share.view_count)
}

pub fn render_templates(templates: &[TemplateInfo]) -> String {
    if templates.is_empty() {
        return "No templates.".to_string();
    }
    templates
        .iter()
        .map(|t| {
            let mut line = format!("  {:<20} {}", t.id, t.name);
            if !t.description.is_empty() {
                line.push_str(&format!(" - {}", t.description));
            }
            if !t.suggested_features.is_empty() {
                line.push_str(&format!("\n      features: {}", t.suggested_features.join(", ")));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(round: u32) -> Message {
        Message::new(MessageKind::AgentMessage, "Mike", format!("round {}", round))
            .with_round(Some(round))
    }

    #[test]
    fn test_separators_in_rendered_timeline() {
        let mut timeline = Timeline::new();
        for round in [1, 1, 2, 2, 2, 1] {
            timeline.append(msg(round));
        }
        let lines = render_timeline_from(&timeline, 0);
        let separators: Vec<usize> = lines
            .iter()
            .enumerate()
            .filter(|(_, l)| l.contains("Round"))
            .map(|(i, _)| i)
            .collect();
        // One separator, just before the first round-2 message
        assert_eq!(separators, vec![2]);
        assert_eq!(lines.len(), 7);

        // Rendering a tail still honours the separator at its first line
        let tail = render_timeline_from(&timeline, 2);
        assert_eq!(tail[0], round_separator(2));
    }

    #[test]
    fn test_clarification_lists_options() {
        let mut m = Message::new(MessageKind::Clarification, "Emma", "Which database?");
        m.options = vec!["SQLite".to_string(), "Postgres".to_string()];
        let out = render_message(&m);
        assert!(out.contains("Emma asks: Which database?"));
        assert!(out.contains("1) SQLite"));
        assert!(out.contains("2) Postgres"));
    }

    #[test]
    fn test_retryable_error_hint() {
        let mut m = Message::new(MessageKind::Error, "System", "Generation failed");
        assert!(!render_message(&m).contains("/retry"));
        m.can_retry = true;
        assert!(render_message(&m).contains("/retry"));
    }

    #[test]
    fn test_progress_line() {
        let progress = ProgressSnapshot {
            current: 2,
            total: 4,
            percentage: 50,
            current_agent_name: Some("Alex".to_string()),
            current_task_description: Some("Write the API".to_string()),
        };
        assert_eq!(
            render_progress(&progress),
            "[##########----------]  50% (2/4) Alex: Write the API"
        );
    }
}
