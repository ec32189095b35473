//! One actor task per game session.
//!
//! The actor owns the game's [`GameMachine`] and [`Game`] and applies commands
//! one at a time from a bounded inbox. Receiving a request enters the machine
//! and replying leaves it, so no two commands ever touch a game at once. The
//! reply carries the updated [`Caller`] back to the connection.
//!
//! Every connection gets its own sub-publisher. It is linked under the session
//! publisher by the actor itself, right before the connection's JoinGame is
//! applied, and unlinked again if the join fails. A connection therefore sees
//! no game events until it has joined. Broadcasts reach all linked connections
//! while reactors can still address a single caller through [`Caller::send`].

use crate::error::Error;
use crate::game::{apply_command, rules, Game, GameMachine};
use crate::pubsub::{Publisher, SubscriptionId, Target};
use crate::store::Storer;
use log::{debug, info};
use shared::{Command, Event, GameData, GameId, PlayerName};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// Identity of the connection issuing a command.
#[derive(Debug, Clone)]
pub struct Caller {
    /// Set once a JoinGame succeeds.
    pub player: Option<PlayerName>,
    events: Arc<Publisher>,
    link: Option<SubscriptionId>,
    cancel: CancellationToken,
}

impl Caller {
    /// Creates an unlinked caller feeding `queue`.
    pub(crate) fn new(queue: mpsc::Sender<Event>, cancel: CancellationToken) -> Self {
        let events = Arc::new(Publisher::new());
        events.subscribe(Target::Queue(queue));

        Self {
            player: None,
            events,
            link: None,
            cancel,
        }
    }

    /// Starts receiving the broadcasts of `session`.
    pub(crate) fn link(&mut self, session: &Arc<Publisher>) {
        if self.link.is_none() {
            self.link = Some(session.subscribe(Target::Publisher(Arc::clone(&self.events))));
        }
    }

    pub(crate) fn unlink(&mut self, session: &Publisher) {
        if let Some(link) = self.link.take() {
            session.unsubscribe(link);
        }
    }

    pub fn is_linked(&self) -> bool {
        self.link.is_some()
    }

    /// Delivers an event to this caller only.
    pub fn send(&self, event: Event) -> usize {
        self.events.publish(&event, &self.cancel)
    }
}

struct Request {
    caller: Caller,
    command: Command,
    reply: oneshot::Sender<(Caller, Result<(), Error>)>,
}

/// Cloneable handle to a running session.
#[derive(Clone)]
pub struct SessionHandle {
    id: GameId,
    requests: mpsc::Sender<Request>,
    events: Arc<Publisher>,
}

impl SessionHandle {
    /// Starts the session actor. It runs until `cancel` fires or every handle
    /// is dropped.
    pub fn spawn(
        id: GameId,
        data: GameData,
        store: Arc<dyn Storer>,
        inbox: usize,
        cancel: CancellationToken,
    ) -> Result<Self, Error> {
        let events = Arc::new(Publisher::new());
        let game = Game::new(id.clone(), data, store, Arc::clone(&events), cancel.clone());

        let mut machine = rules();
        machine.start(&game)?;

        let (requests, inbox) = mpsc::channel(inbox);
        tokio::spawn(run(machine, game, inbox, cancel));
        info!("Session {} started", id);

        Ok(Self {
            id,
            requests,
            events,
        })
    }

    pub fn id(&self) -> &GameId {
        &self.id
    }

    /// Applies `command` on behalf of `caller` and waits for the outcome.
    /// The caller is updated in place, e.g. once it joins.
    pub async fn handle_command(&self, caller: &mut Caller, command: Command) -> Result<(), Error> {
        let (reply, outcome) = oneshot::channel();
        let request = Request {
            caller: caller.clone(),
            command,
            reply,
        };

        self.requests
            .send(request)
            .await
            .map_err(|_| Error::SessionClosed)?;

        let (updated, result) = outcome.await.map_err(|_| Error::SessionClosed)?;
        *caller = updated;
        result
    }

    /// Creates a caller whose events are delivered to `queue`. It receives
    /// nothing until its JoinGame succeeds.
    pub fn connect(&self, queue: mpsc::Sender<Event>, cancel: CancellationToken) -> Caller {
        Caller::new(queue, cancel)
    }

    pub fn disconnect(&self, caller: &mut Caller) {
        caller.unlink(&self.events);
        debug!("Session {}: {} disconnected", self.id, caller.player.as_deref().unwrap_or("caller"));
    }

    pub fn is_closed(&self) -> bool {
        self.requests.is_closed()
    }
}

async fn run(
    mut machine: GameMachine,
    mut game: Game,
    mut inbox: mpsc::Receiver<Request>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            request = inbox.recv() => {
                let Some(Request { mut caller, command, reply }) = request else {
                    break;
                };

                let kind = command.kind();
                let result = apply_command(&mut machine, &mut game, &mut caller, command)
                    .map(|_| ())
                    .map_err(Error::from);

                if let Err(e) = &result {
                    debug!("Session {}: {} rejected: {}", game.id(), kind, e);
                }

                // The connection may have gone away while waiting.
                let _ = reply.send((caller, result));

                if machine.is_finished() {
                    debug!("Session {}: game over, still answering late commands", game.id());
                }
            }
        }
    }

    info!("Session {} stopped", game.id());
}
