//! Transport channel: a reconnecting WebSocket to `/ws/chat/{client_id}`
//!
//! Each `connect` call is tagged with a liveness token. Shutting down (or
//! connecting again on the same [`Transport`]) retires the token, after which
//! the old loop emits nothing and exits at its next wakeup. Connection drops
//! are retried after a fixed delay with the same client id, indefinitely.

use crate::dispatcher::CommandSink;
use crate::protocol::{decode_event, InboundEvent, OutboundCommand};
use crate::{Result, TeamforgeConfig, TeamforgeError};
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// What the transport reports to its owner
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Open,
    Message(InboundEvent),
    Closed,
}

/// Token identifying one `connect` call. Stale once the shared generation moves on.
#[derive(Debug, Clone)]
struct Liveness {
    generation: Arc<AtomicU64>,
    token: u64,
}

impl Liveness {
    fn is_live(&self) -> bool {
        self.generation.load(Ordering::SeqCst) == self.token
    }

    /// Retire this token. Succeeds for exactly one caller.
    fn retire(&self) -> bool {
        self.generation
            .compare_exchange(
                self.token,
                self.token.wrapping_add(1),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }
}

/// Factory for chat socket connections
pub struct Transport {
    config: TeamforgeConfig,
    generation: Arc<AtomicU64>,
}

impl Transport {
    pub fn new(config: TeamforgeConfig) -> Self {
        Self {
            config,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// `{server_url}/ws/chat/{client_id}`, without credentials
    pub fn chat_url(&self, client_id: &str) -> Result<Url> {
        let mut url = Url::parse(&self.config.server_url)?;
        url.path_segments_mut()
            .map_err(|_| {
                TeamforgeError::Transport(format!(
                    "server URL cannot carry a path: {}",
                    self.config.server_url
                ))
            })?
            .pop_if_empty()
            .extend(["ws", "chat", client_id]);
        Ok(url)
    }

    /// Start the connection loop. Must be called inside a tokio runtime.
    ///
    /// Any loop previously started from this `Transport` is superseded.
    pub fn connect(
        &self,
        client_id: &str,
        auth_token: Option<String>,
    ) -> Result<(TransportHandle, mpsc::UnboundedReceiver<TransportEvent>)> {
        let url = self.chat_url(client_id)?;
        let token = self.generation.fetch_add(1, Ordering::SeqCst).wrapping_add(1);
        let liveness = Liveness {
            generation: self.generation.clone(),
            token,
        };

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (token_tx, token_rx) = watch::channel(auth_token);
        let open = Arc::new(AtomicBool::new(false));

        let connection = ConnectionLoop {
            url,
            auth_token: token_rx,
            liveness: liveness.clone(),
            open: open.clone(),
            events: events_tx,
            commands: commands_rx,
            shutdown: shutdown_rx,
            reconnect_delay: self.config.reconnect_delay,
            ping_interval: self.config.ping_interval,
        };
        tokio::spawn(connection.run());

        let handle = TransportHandle {
            commands: commands_tx,
            open,
            liveness,
            shutdown: Arc::new(shutdown_tx),
            auth_token: Arc::new(token_tx),
        };
        Ok((handle, events_rx))
    }
}

/// Cloneable handle to a running connection loop
#[derive(Debug, Clone)]
pub struct TransportHandle {
    commands: mpsc::UnboundedSender<OutboundCommand>,
    open: Arc<AtomicBool>,
    liveness: Liveness,
    shutdown: Arc<watch::Sender<bool>>,
    auth_token: Arc<watch::Sender<Option<String>>>,
}

impl TransportHandle {
    pub fn is_open(&self) -> bool {
        self.liveness.is_live() && self.open.load(Ordering::SeqCst)
    }

    /// False once this handle's loop was shut down or superseded
    pub fn is_live(&self) -> bool {
        self.liveness.is_live()
    }

    /// Queue a command for the socket. No delivery confirmation.
    pub fn try_send(&self, command: OutboundCommand) -> Result<()> {
        if !self.is_open() {
            return Err(TeamforgeError::Transport("socket is not open".to_string()));
        }
        self.commands
            .send(command)
            .map_err(|_| TeamforgeError::Transport("connection loop has stopped".to_string()))
    }

    /// Token used from the next (re)connect onwards
    pub fn set_auth_token(&self, token: Option<String>) {
        self.auth_token.send_replace(token);
    }

    /// Tear the loop down. Returns true only for the call that actually did it.
    pub fn shutdown(&self) -> bool {
        if !self.liveness.retire() {
            return false;
        }
        self.open.store(false, Ordering::SeqCst);
        self.shutdown.send_replace(true);
        info!("Transport shut down");
        true
    }
}

impl CommandSink for TransportHandle {
    fn is_open(&self) -> bool {
        TransportHandle::is_open(self)
    }

    fn send(&self, command: OutboundCommand) {
        if let Err(e) = self.try_send(command) {
            warn!("Command not sent: {}", e);
        }
    }

    fn set_auth_token(&self, token: Option<String>) {
        TransportHandle::set_auth_token(self, token);
    }
}

// ─── Connection loop ─────────────────────────────────────────────────

struct ConnectionLoop {
    url: Url,
    auth_token: watch::Receiver<Option<String>>,
    liveness: Liveness,
    open: Arc<AtomicBool>,
    events: mpsc::UnboundedSender<TransportEvent>,
    commands: mpsc::UnboundedReceiver<OutboundCommand>,
    shutdown: watch::Receiver<bool>,
    reconnect_delay: Duration,
    ping_interval: Duration,
}

/// Why one socket session ended
enum Ended {
    Dropped,
    Stop,
}

/// Drop commands written for a socket that is gone, so a reconnect never replays them.
fn discard_queued(commands: &mut mpsc::UnboundedReceiver<OutboundCommand>) -> usize {
    let mut discarded = 0;
    while let Ok(command) = commands.try_recv() {
        warn!("Discarding {:?} queued before the socket dropped", command);
        discarded += 1;
    }
    discarded
}

impl ConnectionLoop {
    fn stopping(&self) -> bool {
        !self.liveness.is_live() || *self.shutdown.borrow()
    }

    fn emit(&self, event: TransportEvent) {
        if self.liveness.is_live() {
            let _ = self.events.send(event);
        }
    }

    fn authenticated_url(&self) -> Url {
        let mut url = self.url.clone();
        if let Some(token) = self.auth_token.borrow().as_deref().filter(|t| !t.is_empty()) {
            url.query_pairs_mut().append_pair("token", token);
        }
        url
    }

    async fn run(mut self) {
        while !self.stopping() {
            let url = self.authenticated_url();
            match connect_async(url.as_str()).await {
                Ok((socket, _)) => {
                    if self.stopping() {
                        let mut socket = socket;
                        let _ = socket.close(None).await;
                        break;
                    }
                    info!("Connected to {}", self.url);
                    self.open.store(true, Ordering::SeqCst);
                    self.emit(TransportEvent::Open);

                    let ended = self.pump(socket).await;

                    self.open.store(false, Ordering::SeqCst);
                    self.emit(TransportEvent::Closed);
                    if matches!(ended, Ended::Stop) {
                        break;
                    }
                    discard_queued(&mut self.commands);
                    info!("Disconnected; reconnecting in {:?}", self.reconnect_delay);
                }
                Err(e) => {
                    warn!("Connecting to {} failed: {}", self.url, e);
                }
            }

            if self.stopping() {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(self.reconnect_delay) => {}
                _ = self.shutdown.changed() => break,
            }
        }
        debug!("Connection loop for {} exited", self.url);
    }

    async fn pump(&mut self, socket: Socket) -> Ended {
        let (mut write, mut read) = socket.split();
        let mut ping = tokio::time::interval(self.ping_interval.max(Duration::from_secs(1)));
        ping.tick().await;

        loop {
            if !self.liveness.is_live() {
                let _ = write.send(WsMessage::Close(None)).await;
                return Ended::Stop;
            }
            tokio::select! {
                // Only ever flips to true, or the sender is gone: either way, stop
                _ = self.shutdown.changed() => {
                    let _ = write.send(WsMessage::Close(None)).await;
                    return Ended::Stop;
                }
                frame = read.next() => match frame {
                    Some(Ok(WsMessage::Text(text))) => match decode_event(&text) {
                        Ok(event) => self.emit(TransportEvent::Message(event)),
                        Err(e) => warn!("Dropping frame: {}", e),
                    },
                    Some(Ok(WsMessage::Close(frame))) => {
                        debug!("Server closed the socket: {:?}", frame);
                        return Ended::Dropped;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("Socket error: {}", e);
                        return Ended::Dropped;
                    }
                    None => return Ended::Dropped,
                },
                command = self.commands.recv() => match command {
                    Some(command) => {
                        let json = match command.to_json() {
                            Ok(json) => json,
                            Err(e) => {
                                warn!("Could not encode {:?}: {}", command, e);
                                continue;
                            }
                        };
                        if let Err(e) = write.send(WsMessage::Text(json)).await {
                            warn!("Send failed: {}", e);
                            return Ended::Dropped;
                        }
                    }
                    None => {
                        debug!("All transport handles dropped");
                        return Ended::Stop;
                    }
                },
                _ = ping.tick() => {
                    if let Ok(json) = OutboundCommand::Ping.to_json() {
                        if let Err(e) = write.send(WsMessage::Text(json)).await {
                            warn!("Keepalive failed: {}", e);
                            return Ended::Dropped;
                        }
                    }
                }
            }
        }
    }
}
