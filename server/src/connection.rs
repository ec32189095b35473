//! Per-connection protocol loop.
//!
//! Every WebSocket connection runs two tasks sharing one [`Scope`]:
//!
//! ### Command loop
//! Takes a token from the connection's [`RateLimiter`], reads frames until a
//! command arrives and routes it through the connection's [`Router`]. A rule
//! violation is answered with an `Error` event on this connection only. Pongs
//! push the read deadline forward; a client that stops answering pings is
//! dropped once the deadline passes.
//!
//! ### Event loop
//! Forwards queued events as text frames and pings the client every heartbeat
//! interval. Once the scope is cancelled it sends a close frame whose code
//! reflects the first recorded [`CloseCause`].
//!
//! Whichever loop stops first cancels the scope and the other one follows.
//! Server shutdown cancels every scope without a cause, which closes
//! connections normally.

use crate::config::ServerConfig;
use crate::limiter::RateLimiter;
use crate::registry::{Registry, Router};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use shared::{Command, Event};
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::time::{interval_at, timeout, timeout_at, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;

/// Close frame reasons are limited to 123 bytes.
const MAX_CLOSE_REASON: usize = 123;

/// Why a connection is being closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseCause {
    Normal,
    /// The client closed the connection or went away.
    Away,
    Failed(String),
}

impl CloseCause {
    pub fn code(&self) -> CloseCode {
        match self {
            CloseCause::Normal => CloseCode::Normal,
            CloseCause::Away => CloseCode::Away,
            CloseCause::Failed(_) => CloseCode::Error,
        }
    }

    pub fn reason(&self) -> String {
        match self {
            CloseCause::Normal | CloseCause::Away => String::new(),
            CloseCause::Failed(reason) => {
                let mut end = reason.len().min(MAX_CLOSE_REASON);
                while !reason.is_char_boundary(end) {
                    end -= 1;
                }
                reason[..end].to_string()
            }
        }
    }
}

/// Cancellation shared by both loops of a connection. The first recorded
/// cause wins.
#[derive(Debug, Clone)]
pub struct Scope {
    token: CancellationToken,
    cause: Arc<OnceLock<CloseCause>>,
}

impl Scope {
    /// Creates a scope that is also cancelled by `parent`.
    pub fn new(parent: &CancellationToken) -> Self {
        Self {
            token: parent.child_token(),
            cause: Arc::new(OnceLock::new()),
        }
    }

    pub fn cancel(&self, cause: CloseCause) {
        let _ = self.cause.set(cause);
        self.token.cancel();
    }

    /// Recorded cause, `Normal` when cancelled from the parent.
    pub fn cause(&self) -> CloseCause {
        self.cause.get().cloned().unwrap_or(CloseCause::Normal)
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}

/// Serves one accepted WebSocket until either side closes it.
pub async fn serve<S>(
    ws: WebSocketStream<S>,
    peer: SocketAddr,
    registry: Arc<Registry>,
    config: Arc<ServerConfig>,
    shutdown: CancellationToken,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let scope = Scope::new(&shutdown);
    let (sink, stream) = ws.split();
    let (queue, events) = mpsc::channel(config.queue_capacity);
    let router = Router::new(registry, queue.clone(), scope.token().clone());

    info!("Connection from {} opened", peer);

    let commands = tokio::spawn(command_loop(
        stream,
        router,
        queue,
        Arc::clone(&config),
        scope.clone(),
        peer,
    ));
    let outbound = tokio::spawn(event_loop(sink, events, config, scope.clone(), peer));

    let (commands, outbound) = tokio::join!(commands, outbound);
    if let Err(e) = commands.and(outbound) {
        warn!("Connection task for {} failed: {}", peer, e);
    }

    info!("Connection from {} closed ({:?})", peer, scope.cause());
}

async fn command_loop<S>(
    mut stream: SplitStream<WebSocketStream<S>>,
    mut router: Router,
    queue: mpsc::Sender<Event>,
    config: Arc<ServerConfig>,
    scope: Scope,
    peer: SocketAddr,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut limiter = RateLimiter::new(config.rate_interval, config.rate_burst);
    let mut deadline = Instant::now() + config.read_deadline();

    loop {
        tokio::select! {
            _ = scope.cancelled() => break,
            _ = limiter.acquire() => {}
        }

        let command = tokio::select! {
            _ = scope.cancelled() => break,
            command = read_command(&mut stream, &mut deadline, config.read_deadline()) => command,
        };

        let command = match command {
            Ok(command) => command,
            Err(cause) => {
                debug!("Command loop for {} stopping: {:?}", peer, cause);
                scope.cancel(cause);
                break;
            }
        };

        let kind = command.kind();
        let result = tokio::select! {
            _ = scope.cancelled() => break,
            result = router.route_command(command) => result,
        };

        if let Err(e) = result {
            debug!("{} from {} refused: {}", kind, peer, e);
            let event = Event::Error {
                message: e.to_string(),
            };
            if queue.try_send(event).is_err() {
                warn!("Could not queue error event for {}", peer);
            }
        }
    }

    router.close();
}

/// Reads frames until one carries a command.
async fn read_command<S>(
    stream: &mut SplitStream<WebSocketStream<S>>,
    deadline: &mut Instant,
    window: Duration,
) -> Result<Command, CloseCause>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let frame = match timeout_at(*deadline, stream.next()).await {
            Err(_) => return Err(CloseCause::Failed("pong not received in time".to_string())),
            Ok(None) => return Err(CloseCause::Away),
            Ok(Some(Err(e))) => return Err(CloseCause::Failed(format!("read failed: {}", e))),
            Ok(Some(Ok(frame))) => frame,
        };

        match frame {
            Message::Text(text) => return decode(text.as_bytes()),
            Message::Binary(data) => return decode(&data),
            Message::Pong(_) => *deadline = Instant::now() + window,
            Message::Close(_) => return Err(CloseCause::Away),
            Message::Ping(_) | Message::Frame(_) => {}
        }
    }
}

fn decode(bytes: &[u8]) -> Result<Command, CloseCause> {
    serde_json::from_slice(bytes).map_err(|e| CloseCause::Failed(format!("invalid command: {}", e)))
}

async fn event_loop<S>(
    mut sink: SplitSink<WebSocketStream<S>, Message>,
    mut events: mpsc::Receiver<Event>,
    config: Arc<ServerConfig>,
    scope: Scope,
    peer: SocketAddr,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut heartbeat = interval_at(Instant::now() + config.heartbeat, config.heartbeat);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let write_timeout = config.write_timeout();

    let cause = loop {
        tokio::select! {
            _ = scope.cancelled() => break scope.cause(),
            event = events.recv() => {
                let Some(event) = event else {
                    break CloseCause::Normal;
                };
                let text = match serde_json::to_string(&event) {
                    Ok(text) => text,
                    Err(e) => break CloseCause::Failed(format!("encode failed: {}", e)),
                };
                if let Err(cause) = write(&mut sink, Message::Text(text.into()), write_timeout).await {
                    break cause;
                }
            }
            _ = heartbeat.tick() => {
                if let Err(cause) = write(&mut sink, Message::Ping(Default::default()), write_timeout).await {
                    break cause;
                }
            }
        }
    };

    scope.cancel(cause);
    let cause = scope.cause();
    debug!("Closing connection to {} with {:?}", peer, cause);

    let frame = CloseFrame {
        code: cause.code(),
        reason: cause.reason().into(),
    };
    match timeout(config.control_timeout, sink.send(Message::Close(Some(frame)))).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!("Close frame to {} not sent: {}", peer, e),
        Err(_) => debug!("Close frame to {} timed out", peer),
    }
}

async fn write<S>(
    sink: &mut SplitSink<WebSocketStream<S>, Message>,
    message: Message,
    limit: Duration,
) -> Result<(), CloseCause>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match timeout(limit, sink.send(message)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(CloseCause::Failed(format!("write failed: {}", e))),
        Err(_) => Err(CloseCause::Failed("write timed out".to_string())),
    }
}
