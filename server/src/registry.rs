//! Running sessions by game id, and per-connection command routing.

use crate::config::ServerConfig;
use crate::error::Error;
use crate::session::{Caller, SessionHandle};
use crate::store::Storer;
use log::{debug, info};
use shared::{Command, Event, GameData, GameId, PlayerName};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

pub struct Registry {
    store: Arc<dyn Storer>,
    sessions: RwLock<HashMap<GameId, SessionHandle>>,
    config: Arc<ServerConfig>,
    shutdown: CancellationToken,
}

impl Registry {
    /// Sessions stop when `shutdown` fires.
    pub fn new(store: Arc<dyn Storer>, config: Arc<ServerConfig>, shutdown: CancellationToken) -> Self {
        Self {
            store,
            sessions: RwLock::new(HashMap::new()),
            config,
            shutdown,
        }
    }

    pub fn store(&self) -> &Arc<dyn Storer> {
        &self.store
    }

    /// Stores a new game and starts its session.
    pub async fn create_session(
        &self,
        data: GameData,
        admin_password: Option<String>,
    ) -> Result<SessionHandle, Error> {
        let game_id = self.store.create_game(data, admin_password)?;
        self.open_session(game_id).await
    }

    /// Starts the session of a game that is already stored.
    pub async fn open_session(&self, game_id: GameId) -> Result<SessionHandle, Error> {
        let data = self.store.game_definition(&game_id)?;

        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&game_id) {
            return Err(Error::SessionExists(game_id));
        }

        let session = SessionHandle::spawn(
            game_id.clone(),
            data,
            Arc::clone(&self.store),
            self.config.session_inbox,
            self.shutdown.child_token(),
        )?;
        sessions.insert(game_id, session.clone());
        Ok(session)
    }

    pub async fn session(&self, game_id: &GameId) -> Option<SessionHandle> {
        self.sessions.read().await.get(game_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

/// Routes the commands of one connection. The connection is bound to a
/// session only after its JoinGame succeeds.
pub struct Router {
    registry: Arc<Registry>,
    queue: mpsc::Sender<Event>,
    cancel: CancellationToken,
    bound: Option<(SessionHandle, Caller)>,
}

impl Router {
    /// Events for this connection are delivered to `queue`.
    pub fn new(registry: Arc<Registry>, queue: mpsc::Sender<Event>, cancel: CancellationToken) -> Self {
        Self {
            registry,
            queue,
            cancel,
            bound: None,
        }
    }

    pub async fn route_command(&mut self, command: Command) -> Result<(), Error> {
        if let Some((session, caller)) = &mut self.bound {
            return session.handle_command(caller, command).await;
        }

        let Command::JoinGame { game_id, .. } = &command else {
            return Err(Error::MustJoinFirst);
        };

        let session = self
            .registry
            .session(game_id)
            .await
            .ok_or_else(|| Error::UnknownGame(game_id.clone()))?;

        // The session links the caller only once the join is applied.
        let mut caller = session.connect(self.queue.clone(), self.cancel.clone());
        session.handle_command(&mut caller, command).await?;

        info!(
            "{} joined game {}",
            caller.player.as_deref().unwrap_or_default(),
            session.id()
        );
        self.bound = Some((session, caller));
        Ok(())
    }

    pub fn game_id(&self) -> Option<&GameId> {
        self.bound.as_ref().map(|(session, _)| session.id())
    }

    pub fn player(&self) -> Option<&PlayerName> {
        self.bound.as_ref().and_then(|(_, caller)| caller.player.as_ref())
    }

    /// Unlinks the connection from its session, if bound.
    pub fn close(&mut self) {
        if let Some((session, mut caller)) = self.bound.take() {
            session.disconnect(&mut caller);
            debug!("Router for game {} closed", session.id());
        }
    }
}

impl Drop for Router {
    fn drop(&mut self) {
        self.close();
    }
}
