//! Line-oriented front end
//!
//! One task owns the [`Session`]. Transport events, user input and finished
//! background fetches all arrive over channels and are applied one at a time,
//! so event order is preserved and nothing mutates the session concurrently.

use crate::api::{
    ApiClient, FileContent, FileListing, ProjectDetail, ProjectList, ShareInfo, TemplateInfo,
};
use crate::commands::{help_text, parse_input, parse_template_args, ParsedInput, SlashCommand};
use crate::dispatcher::{CommandSink, DispatchError, Dispatcher};
use crate::render;
use crate::router::Effect;
use crate::session::{DetailApplied, Session};
use crate::transport::TransportEvent;
use crate::{Result, TeamforgeConfig};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Page size for `/projects`
const PROJECT_PAGE: usize = 20;

/// Result of a background REST call
#[derive(Debug)]
pub enum Fetched {
    Projects {
        list: Result<ProjectList>,
        show: bool,
    },
    Detail {
        project_id: String,
        detail: Result<ProjectDetail>,
    },
    Files(Result<FileListing>),
    File(Result<FileContent>),
    Share(Result<ShareInfo>),
    Templates(Result<Vec<TemplateInfo>>),
}

/// Whether the input loop should keep going
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct App<S: CommandSink> {
    session: Session,
    dispatcher: Dispatcher<S>,
    api: ApiClient,
    output: mpsc::UnboundedSender<String>,
    fetched_tx: mpsc::UnboundedSender<Fetched>,
    fetched_rx: Option<mpsc::UnboundedReceiver<Fetched>>,
    /// Number of timeline messages already printed, and the id of the last one
    rendered: usize,
    last_rendered_id: Option<String>,
    /// Sent as a message once the socket first opens
    initial_prompt: Option<String>,
}

impl<S: CommandSink> App<S> {
    pub fn new(
        config: &TeamforgeConfig,
        sink: S,
        api: ApiClient,
        output: mpsc::UnboundedSender<String>,
    ) -> Self {
        let (fetched_tx, fetched_rx) = mpsc::unbounded_channel();
        Self {
            session: Session::new(),
            dispatcher: Dispatcher::new(sink, config.name_max_chars),
            api,
            output,
            fetched_tx,
            fetched_rx: Some(fetched_rx),
            rendered: 0,
            last_rendered_id: None,
            initial_prompt: None,
        }
    }

    pub fn with_initial_prompt(mut self, prompt: Option<String>) -> Self {
        self.initial_prompt = prompt.filter(|p| !p.trim().is_empty());
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    fn print(&self, text: impl Into<String>) {
        let _ = self.output.send(text.into());
    }

    /// Run until the user quits or input/transport channels close.
    pub async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<TransportEvent>,
        mut input: mpsc::Receiver<String>,
    ) -> Result<()> {
        let Some(mut fetched) = self.fetched_rx.take() else {
            return Ok(());
        };
        self.print(help_text());

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.handle_transport_event(event),
                    None => {
                        debug!("Transport event channel closed");
                        break;
                    }
                },
                line = input.recv() => match line {
                    Some(line) => {
                        if self.handle_input(&line) == Flow::Quit {
                            break;
                        }
                    }
                    None => {
                        debug!("Input closed");
                        break;
                    }
                },
                Some(result) = fetched.recv() => self.handle_fetched(result),
            }
        }
        info!("Leaving");
        Ok(())
    }

    // ─── Transport ───────────────────────────────────────────────────

    pub fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Open => {
                info!("Connected");
                self.spawn_project_list(false);
                if let Some(prompt) = self.initial_prompt.take() {
                    self.handle_input(&prompt);
                }
            }
            TransportEvent::Closed => warn!("Connection lost; reconnecting"),
            TransportEvent::Message(event) => {
                let effects = self.session.apply_event(event);
                self.flush_timeline();
                for effect in effects {
                    self.handle_effect(effect);
                }
            }
        }
    }

    fn handle_effect(&mut self, effect: Effect) {
        match effect {
            Effect::RefreshProjectList => self.spawn_project_list(false),
            Effect::ReloadProject { project_id } => {
                // A project the user picked in the meantime takes precedence
                if self.session.requested_detail.is_none() {
                    self.dispatcher.select_project(&mut self.session, &project_id);
                }
                self.spawn_detail(project_id);
            }
            Effect::OpenQuestionDialog { question_id } => {
                debug!("Blocking question {}", question_id);
                self.print("An answer is required before the team can continue.");
            }
            Effect::AuthRequired => {
                self.print("Authentication required: run /token <value>, set TEAMFORGE_TOKEN or pass --token.");
            }
        }
    }

    /// Print timeline messages not shown yet. A reset or replaced timeline is
    /// printed again from the top.
    fn flush_timeline(&mut self) {
        let timeline = self.session.timeline();
        let still_prefix = self.rendered <= timeline.len()
            && (self.rendered == 0
                || timeline.messages()[self.rendered - 1].id.as_str()
                    == self.last_rendered_id.as_deref().unwrap_or(""));
        let start = if still_prefix {
            self.rendered
        } else {
            self.print("────────────────────────────────");
            0
        };
        for line in render::render_timeline_from(timeline, start) {
            self.print(line);
        }
        self.rendered = timeline.len();
        self.last_rendered_id = timeline.last().map(|m| m.id.clone());
    }

    // ─── Input ───────────────────────────────────────────────────────

    pub fn handle_input(&mut self, line: &str) -> Flow {
        let result = match parse_input(line) {
            ParsedInput::Empty => Ok(()),
            ParsedInput::Text(text) => self
                .dispatcher
                .send_message(&mut self.session, &text)
                .map(|_| ()),
            ParsedInput::Unknown(name) => {
                self.print(format!("Unknown command /{} (try /help)", name));
                Ok(())
            }
            ParsedInput::Command(SlashCommand::Quit, _) => return Flow::Quit,
            ParsedInput::Command(cmd, args) => self.handle_command(cmd, &args),
        };
        if let Err(e) = result {
            self.print(format!("! {}", e));
        }
        self.flush_timeline();
        Flow::Continue
    }

    fn handle_command(&mut self, cmd: SlashCommand, args: &str) -> std::result::Result<(), DispatchError> {
        match cmd {
            SlashCommand::Help => self.print(help_text()),
            SlashCommand::New => {
                self.dispatcher.new_chat(&mut self.session);
                self.rendered = 0;
                self.last_rendered_id = None;
                self.print("New chat. Describe the project you want.");
            }
            SlashCommand::Projects => self.spawn_project_list(true),
            SlashCommand::Token => {
                if args.is_empty() {
                    self.print(format!("usage: {}", cmd.usage()));
                } else {
                    let token = Some(args.to_string());
                    self.api.set_auth_token(token.clone());
                    self.dispatcher.sink().set_auth_token(token);
                    info!("Auth token updated");
                    self.print("Token set; the socket uses it from the next reconnect.");
                }
            }
            SlashCommand::Open => {
                if args.is_empty() {
                    self.print(format!("usage: {}", cmd.usage()));
                } else {
                    self.dispatcher.select_project(&mut self.session, args);
                    self.spawn_detail(args.to_string());
                }
            }
            SlashCommand::Regen => {
                self.dispatcher.regenerate_project(&mut self.session)?;
            }
            SlashCommand::Retry => {
                let id = Some(args).filter(|a| !a.is_empty());
                self.dispatcher.retry_project(&mut self.session, id)?;
            }
            SlashCommand::Answer => {
                self.dispatcher.answer_question(&mut self.session, args)?;
            }
            SlashCommand::Skip => {
                self.dispatcher.skip_question(&mut self.session)?;
            }
            SlashCommand::Templates => self.spawn_templates(),
            SlashCommand::Template => match parse_template_args(args) {
                Some(t) => {
                    self.dispatcher.create_from_template(
                        &mut self.session,
                        &t.template_id,
                        &t.name,
                        t.features,
                        &t.custom_requirements,
                    )?;
                }
                None => self.print(format!("usage: {}", cmd.usage())),
            },
            SlashCommand::Files => {
                let project_id = self.current_project_id()?;
                let api = self.api.clone();
                self.spawn(async move { Fetched::Files(api.list_files(&project_id).await) });
            }
            SlashCommand::File => {
                if args.is_empty() {
                    self.print(format!("usage: {}", cmd.usage()));
                    return Ok(());
                }
                let project_id = self.current_project_id()?;
                let api = self.api.clone();
                let path = args.to_string();
                self.spawn(async move { Fetched::File(api.file_content(&project_id, &path).await) });
            }
            SlashCommand::Share => {
                let project_id = self.current_project_id()?;
                let api = self.api.clone();
                self.spawn(async move {
                    let share = match api.share_info(&project_id).await {
                        Ok(Some(existing)) => Ok(existing),
                        Ok(None) => api.create_share(&project_id).await,
                        Err(e) => Err(e),
                    };
                    Fetched::Share(share)
                });
            }
            SlashCommand::Status => {
                let open = self.dispatcher.sink().is_open();
                self.print(render::render_status(&self.session, open));
            }
            SlashCommand::Quit => {}
        }
        Ok(())
    }

    fn current_project_id(&self) -> std::result::Result<String, DispatchError> {
        self.session
            .identity()
            .current()
            .map(|p| p.id.clone())
            .ok_or(DispatchError::NoCurrentProject)
    }

    // ─── Background fetches ──────────────────────────────────────────

    fn spawn<F>(&self, fetch: F)
    where
        F: std::future::Future<Output = Fetched> + Send + 'static,
    {
        let tx = self.fetched_tx.clone();
        tokio::spawn(async move {
            let _ = tx.send(fetch.await);
        });
    }

    fn spawn_project_list(&self, show: bool) {
        let api = self.api.clone();
        self.spawn(async move {
            Fetched::Projects {
                list: api.list_projects(0, PROJECT_PAGE).await,
                show,
            }
        });
    }

    fn spawn_detail(&self, project_id: String) {
        let api = self.api.clone();
        self.spawn(async move {
            let detail = api.load_project_detail(&project_id).await;
            Fetched::Detail { project_id, detail }
        });
    }

    fn spawn_templates(&self) {
        let api = self.api.clone();
        self.spawn(async move { Fetched::Templates(api.list_templates().await) });
    }

    pub fn handle_fetched(&mut self, fetched: Fetched) {
        match fetched {
            Fetched::Projects { list, show } => match list {
                Ok(list) if show => {
                    self.print(render::render_project_list(&list.projects, list.total))
                }
                Ok(list) => debug!("Project list refreshed ({} projects)", list.total),
                Err(e) if show => self.print(format!("! Could not list projects: {}", e)),
                Err(e) => warn!("Project list refresh failed: {}", e),
            },
            Fetched::Detail { project_id, detail } => match detail {
                Ok(detail) => {
                    let name = detail.project.name.clone();
                    match self.session.apply_project_detail(detail) {
                        DetailApplied::Replaced => {
                            self.flush_timeline();
                            self.print(format!("Viewing {} ({})", name, project_id));
                        }
                        DetailApplied::DisplayOnly => self.print(format!(
                            "Viewing {} ({}); the running generation keeps streaming here",
                            name, project_id
                        )),
                        DetailApplied::Stale => {}
                    }
                }
                Err(e) => {
                    self.session.detail_failed(&project_id);
                    self.print(format!("! Could not load project {}: {}", project_id, e));
                }
            },
            Fetched::Files(Ok(listing)) => self.print(render::render_files(&listing)),
            Fetched::File(Ok(file)) => {
                if file.binary {
                    self.print(format!("{} is a binary file", file.path));
                } else {
                    self.print(format!("── {} ──\n{}", file.path, file.content));
                }
            }
            Fetched::Share(Ok(share)) => self.print(render::render_share(&share)),
            Fetched::Templates(Ok(templates)) => self.print(render::render_templates(&templates)),
            Fetched::Files(Err(e))
            | Fetched::File(Err(e))
            | Fetched::Share(Err(e))
            | Fetched::Templates(Err(e)) => self.print(format!("! {}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{decode_event, OutboundCommand};
    use crate::session::ProjectStatus;
    use crate::TeamforgeError;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedSink {
        closed: Arc<AtomicBool>,
        sent: Arc<Mutex<Vec<OutboundCommand>>>,
        token: Arc<Mutex<Option<String>>>,
    }

    impl CommandSink for SharedSink {
        fn is_open(&self) -> bool {
            !self.closed.load(Ordering::SeqCst)
        }

        fn send(&self, command: OutboundCommand) {
            self.sent.lock().unwrap().push(command);
        }

        fn set_auth_token(&self, token: Option<String>) {
            *self.token.lock().unwrap() = token;
        }
    }

    fn app() -> (App<SharedSink>, SharedSink, mpsc::UnboundedReceiver<String>) {
        let config = TeamforgeConfig::default();
        let sink = SharedSink::default();
        let api = ApiClient::new(&config).unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        (App::new(&config, sink.clone(), api, tx), sink, rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<String> {
        let mut lines = Vec::new();
        while let Ok(line) = rx.try_recv() {
            lines.push(line);
        }
        lines
    }

    fn event(raw: &str) -> TransportEvent {
        TransportEvent::Message(decode_event(raw).unwrap())
    }

    #[test]
    fn test_text_input_creates_project() {
        let (mut app, sink, mut out) = app();
        assert_eq!(app.handle_input("Build a todo app"), Flow::Continue);
        assert_eq!(
            sink.sent.lock().unwrap().as_slice(),
            &[OutboundCommand::CreateProject {
                name: "Build a todo app".to_string(),
                requirement: "Build a todo app".to_string(),
            }]
        );
        let lines = drain(&mut out);
        assert!(lines.iter().any(|l| l.contains("You: Build a todo app")));
    }

    #[test]
    fn test_refusals_are_printed() {
        let (mut app, sink, mut out) = app();
        sink.closed.store(true, Ordering::SeqCst);
        app.handle_input("hello");
        let lines = drain(&mut out);
        assert_eq!(lines, vec![format!("! {}", DispatchError::NotConnected)]);
    }

    #[test]
    fn test_reset_reprints_from_top() {
        let (mut app, _sink, mut out) = app();
        app.handle_transport_event(event(
            r#"{"type":"agent_message","agent":"Mike","content":"old chatter"}"#,
        ));
        app.handle_input("Build a todo app");
        drain(&mut out);

        app.handle_transport_event(event(
            r#"{"type":"status","content":"Project created","project_id":"p1","status":"created"}"#,
        ));
        let lines = drain(&mut out);
        assert!(lines[0].starts_with("────"));
        assert!(lines[1].contains("You: Build a todo app"));
        assert!(lines[2].contains("Project created"));
        assert_eq!(lines.len(), 3);
    }

    #[tokio::test]
    async fn test_failed_open_does_not_block_completion_reload() {
        let (mut app, _sink, mut out) = app();
        app.handle_input("Build a todo app");
        app.handle_transport_event(event(
            r#"{"type":"status","content":"Project created","project_id":"p1","status":"created"}"#,
        ));
        app.handle_input("/open old");
        app.handle_fetched(Fetched::Detail {
            project_id: "old".to_string(),
            detail: Err(TeamforgeError::Api("HTTP 404: Project not found".to_string())),
        });
        assert!(app.session().requested_detail.is_none());

        app.handle_transport_event(event(
            r#"{"type":"complete","content":"Done","project_id":"p1"}"#,
        ));
        assert_eq!(app.session().requested_detail.as_deref(), Some("p1"));
        drain(&mut out);

        app.handle_fetched(Fetched::Detail {
            project_id: "p1".to_string(),
            detail: Ok(ProjectDetail {
                project: crate::api::ProjectInfo {
                    id: "p1".to_string(),
                    name: "Todo".to_string(),
                    requirement: "Build a todo app".to_string(),
                    status: ProjectStatus::Completed,
                    workspace_path: None,
                    created_at: None,
                    updated_at: None,
                },
                messages: Vec::new(),
            }),
        });
        assert_eq!(app.session().displayed_project().unwrap().id, "p1");
        assert!(drain(&mut out).iter().any(|l| l.contains("Viewing Todo (p1)")));
    }

    #[test]
    fn test_quit_and_unknown() {
        let (mut app, _sink, mut out) = app();
        assert_eq!(app.handle_input("/bogus"), Flow::Continue);
        assert!(drain(&mut out)[0].contains("Unknown command /bogus"));
        assert_eq!(app.handle_input("/quit"), Flow::Quit);
    }

    #[test]
    fn test_token_updates_socket_credentials() {
        let (mut app, sink, mut out) = app();
        app.handle_input("/token");
        assert!(drain(&mut out)[0].contains("usage: /token <value>"));
        assert!(sink.token.lock().unwrap().is_none());

        app.handle_input("/token s3cret");
        assert_eq!(sink.token.lock().unwrap().as_deref(), Some("s3cret"));
        assert!(drain(&mut out).iter().any(|l| l.contains("next reconnect")));
    }

    #[test]
    fn test_files_needs_project() {
        let (mut app, _sink, mut out) = app();
        app.handle_input("/files");
        assert_eq!(
            drain(&mut out),
            vec![format!("! {}", DispatchError::NoCurrentProject)]
        );
    }
}
