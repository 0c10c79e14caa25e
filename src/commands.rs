//! Slash commands for the interactive front end
//!
//! Plain text goes to the dispatcher as a message; `/xxx` is handled locally.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlashCommand {
    Help,
    New,
    Projects,
    Open,
    Regen,
    Retry,
    Answer,
    Skip,
    Templates,
    Template,
    Files,
    File,
    Share,
    Status,
    Token,
    Quit,
}

impl SlashCommand {
    pub fn all() -> &'static [SlashCommand] {
        &[
            SlashCommand::Help,
            SlashCommand::New,
            SlashCommand::Projects,
            SlashCommand::Open,
            SlashCommand::Regen,
            SlashCommand::Retry,
            SlashCommand::Answer,
            SlashCommand::Skip,
            SlashCommand::Templates,
            SlashCommand::Template,
            SlashCommand::Files,
            SlashCommand::File,
            SlashCommand::Share,
            SlashCommand::Status,
            SlashCommand::Token,
            SlashCommand::Quit,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            SlashCommand::Help => "help",
            SlashCommand::New => "new",
            SlashCommand::Projects => "projects",
            SlashCommand::Open => "open",
            SlashCommand::Regen => "regen",
            SlashCommand::Retry => "retry",
            SlashCommand::Answer => "answer",
            SlashCommand::Skip => "skip",
            SlashCommand::Templates => "templates",
            SlashCommand::Template => "template",
            SlashCommand::Files => "files",
            SlashCommand::File => "file",
            SlashCommand::Share => "share",
            SlashCommand::Status => "status",
            SlashCommand::Token => "token",
            SlashCommand::Quit => "quit",
        }
    }

    pub fn usage(&self) -> &'static str {
        match self {
            SlashCommand::Open => "/open <project-id>",
            SlashCommand::Retry => "/retry [project-id]",
            SlashCommand::Answer => "/answer <option number | text>",
            SlashCommand::Template => "/template <id> <name> [| feature, feature [| extra requirements]]",
            SlashCommand::File => "/file <path>",
            SlashCommand::Token => "/token <value>",
            _ => "",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            SlashCommand::Help => "Show commands",
            SlashCommand::New => "Start a new chat",
            SlashCommand::Projects => "List projects",
            SlashCommand::Open => "Open a project and its history",
            SlashCommand::Regen => "Regenerate the current project",
            SlashCommand::Retry => "Retry the failed project",
            SlashCommand::Answer => "Answer the pending question",
            SlashCommand::Skip => "Skip the pending question",
            SlashCommand::Templates => "List project templates",
            SlashCommand::Template => "Create a project from a template",
            SlashCommand::Files => "List the current project's files",
            SlashCommand::File => "Show one file of the current project",
            SlashCommand::Share => "Create or show the share link",
            SlashCommand::Status => "Show connection, project and progress",
            SlashCommand::Token => "Set the auth token for requests and the next reconnect",
            SlashCommand::Quit => "Quit",
        }
    }

    pub fn takes_args(&self) -> bool {
        matches!(
            self,
            SlashCommand::Open
                | SlashCommand::Retry
                | SlashCommand::Answer
                | SlashCommand::Template
                | SlashCommand::File
                | SlashCommand::Token
        )
    }

    pub fn matches(prefix: &str) -> Vec<SlashCommand> {
        let prefix = prefix.to_lowercase();
        Self::all()
            .iter()
            .filter(|cmd| cmd.name().starts_with(&prefix))
            .copied()
            .collect()
    }

    pub fn parse(name: &str) -> Option<SlashCommand> {
        let name = name.to_lowercase();
        match name.as_str() {
            "exit" => return Some(SlashCommand::Quit),
            "regenerate" => return Some(SlashCommand::Regen),
            _ => {}
        }
        Self::all().iter().find(|cmd| cmd.name() == name).copied()
    }
}

impl fmt::Display for SlashCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.name())
    }
}

/// One line of user input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedInput {
    Empty,
    /// Free text for the dispatcher
    Text(String),
    Command(SlashCommand, String),
    Unknown(String),
}

pub fn parse_input(input: &str) -> ParsedInput {
    let input = input.trim();
    if input.is_empty() {
        return ParsedInput::Empty;
    }
    // A doubled slash sends the text literally
    if let Some(rest) = input.strip_prefix("//") {
        return ParsedInput::Text(format!("/{}", rest));
    }
    let Some(rest) = input.strip_prefix('/') else {
        return ParsedInput::Text(input.to_string());
    };

    let (name, args) = match rest.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (rest, ""),
    };
    match SlashCommand::parse(name) {
        Some(cmd) => ParsedInput::Command(cmd, args.to_string()),
        None => ParsedInput::Unknown(name.to_string()),
    }
}

/// Arguments of `/template`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateArgs {
    pub template_id: String,
    pub name: String,
    pub features: Vec<String>,
    pub custom_requirements: String,
}

/// Parse `<id> <name> [| feature, feature [| extra requirements]]`.
pub fn parse_template_args(args: &str) -> Option<TemplateArgs> {
    let mut sections = args.splitn(3, '|');
    let head = sections.next()?.trim();
    let (template_id, name) = head.split_once(char::is_whitespace)?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    let features = sections
        .next()
        .map(|list| {
            list.split(',')
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();
    let custom_requirements = sections.next().map(str::trim).unwrap_or("").to_string();

    Some(TemplateArgs {
        template_id: template_id.to_string(),
        name: name.to_string(),
        features,
        custom_requirements,
    })
}

/// Text for `/help`
pub fn help_text() -> String {
    let mut out = String::from("Type a message to start or continue a project. Commands:\n");
    for cmd in SlashCommand::all() {
        let usage = if cmd.usage().is_empty() {
            cmd.to_string()
        } else {
            cmd.usage().to_string()
        };
        out.push_str(&format!("  {:<40} {}\n", usage, cmd.description()));
    }
    out
}
