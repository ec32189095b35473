//! Quiz rules expressed as handlers and reactors of a [`Machine`].
//!
//! A game moves through a lobby where players join, then turns in which the
//! chooser picks a question, contestants buzz in and an admin judges the
//! answer. Handlers validate the caller and mutate [`GameState`]; reactors turn
//! the committed transitions into [`Event`]s.
//!
//! ## Turn flow
//! - `JoinGame` keeps the lobby open: `{JoinGame, BeginGame}`
//! - `BeginGame` hands the first turn to the first contestant in join order
//! - `ChooseQuestion` opens a question: `{PressButton}`
//! - `PressButton` waits for the admin: `{PlayerJudgment}`
//! - `PlayerJudgment` either reopens the buzzer, starts the next turn or ends
//!   the game once every question has been answered correctly
//!
//! An incorrect judgment leaves the question unanswered. The judged player
//! cannot buzz again for it, everyone else can. When nobody is left to buzz the
//! question closes and can be picked again later.

use crate::error::GameError;
use crate::machine::{Input, Machine, MachineError, Next, NextStates};
use crate::pubsub::Publisher;
use crate::session::Caller;
use crate::store::Storer;
use log::{debug, info};
use shared::{
    is_valid_player_name, AnsweredQuestion, Command, CommandKind, Event, GameData, GameId,
    LeaderboardEntry, PlayerName,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub type GameMachine = Machine<Game, Caller, Command, GameError>;

impl Input for Command {
    type Kind = CommandKind;

    fn kind(&self) -> CommandKind {
        Command::kind(self)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayerState {
    pub score: f64,
    /// Pressed the button for the current question.
    pub pressed: bool,
    pub is_admin: bool,
}

#[derive(Debug, Clone, Default)]
pub struct GameState {
    pub players: HashMap<PlayerName, PlayerState>,
    /// Player names in the order they first joined.
    pub order: Vec<PlayerName>,
    /// Correctly answered questions keyed by (category, question).
    pub answered: BTreeMap<(usize, usize), PlayerName>,
    pub chooser: Option<PlayerName>,
    pub answering: Option<PlayerName>,
    pub current: Option<(usize, usize)>,
}

impl GameState {
    fn in_join_order(&self) -> impl Iterator<Item = (&PlayerName, &PlayerState)> + '_ {
        self.order
            .iter()
            .filter_map(|name| self.players.get(name).map(|player| (name, player)))
    }

    fn contestants(&self) -> impl Iterator<Item = (&PlayerName, &PlayerState)> + '_ {
        self.in_join_order().filter(|(_, player)| !player.is_admin)
    }

    /// Contestants that may still buzz in for the current question.
    pub fn remaining_players(&self) -> Vec<PlayerName> {
        self.contestants()
            .filter(|(_, player)| !player.pressed)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// All players by descending score. Equal scores keep join order.
    pub fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        let mut leaderboard: Vec<LeaderboardEntry> = self
            .in_join_order()
            .map(|(name, player)| LeaderboardEntry {
                player_name: name.clone(),
                score: player.score,
            })
            .collect();

        leaderboard.sort_by(|a, b| b.score.total_cmp(&a.score));
        leaderboard
    }

    pub fn answered_questions(&self) -> Vec<AnsweredQuestion> {
        self.answered
            .iter()
            .map(|(&(category, question), player)| AnsweredQuestion {
                category,
                question,
                player: player.clone(),
            })
            .collect()
    }

    fn end_question(&mut self) {
        for player in self.players.values_mut() {
            player.pressed = false;
        }
        self.current = None;
        self.answering = None;
    }
}

/// One running game: its definition, its state and the publisher every
/// connected player listens on.
pub struct Game {
    id: GameId,
    data: GameData,
    store: Arc<dyn Storer>,
    events: Arc<Publisher>,
    cancel: CancellationToken,
    state: GameState,
}

impl Game {
    pub fn new(
        id: GameId,
        data: GameData,
        store: Arc<dyn Storer>,
        events: Arc<Publisher>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            data,
            store,
            events,
            cancel,
            state: GameState::default(),
        }
    }

    pub fn id(&self) -> &GameId {
        &self.id
    }

    pub fn data(&self) -> &GameData {
        &self.data
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn events(&self) -> &Arc<Publisher> {
        &self.events
    }

    fn broadcast(&self, event: Event) {
        let reached = self.events.publish(&event, &self.cancel);
        debug!("Game {}: {} reached {} players", self.id, event.name(), reached);
    }

    /// Next legal inputs once a handler is done with the current question.
    fn advance_turn(&mut self) -> NextStates<CommandKind> {
        if self.state.current.is_some() && !self.state.remaining_players().is_empty() {
            return NextStates::of([CommandKind::PressButton]);
        }

        self.state.end_question();

        if self.state.answered.len() < self.data.total_questions() {
            NextStates::of([CommandKind::ChooseQuestion])
        } else {
            info!("Game {}: all questions answered", self.id);
            NextStates::end()
        }
    }
}

/// Builds the machine enforcing the quiz rules.
pub fn rules() -> GameMachine {
    use CommandKind::*;

    Machine::new(|_: &Game| NextStates::of([JoinGame]))
        .on(JoinGame, join_game)
        .on(BeginGame, begin_game)
        .on(ChooseQuestion, choose_question)
        .on(PressButton, press_button)
        .on(PlayerJudgment, player_judgment)
        .react(Some(JoinGame), Next::Any, send_joined_game)
        .react(Some(JoinGame), Next::Any, announce_player)
        .react(Some(BeginGame), Next::Any, announce_start)
        .react(None, Next::Kind(ChooseQuestion), announce_turn)
        .react(Some(ChooseQuestion), Next::Any, announce_question)
        .react(Some(PressButton), Next::Any, announce_button)
        .react(Some(PlayerJudgment), Next::Kind(PressButton), resume_button)
        .react(None, Next::End, announce_end)
}

type Outcome = Result<NextStates<CommandKind>, GameError>;

/// Applies one command on behalf of `caller`. A caller that is not linked to
/// the game yet is linked right before its JoinGame and unlinked again if the
/// join fails, so it never sees events from before it joined.
pub(crate) fn apply_command(
    machine: &mut GameMachine,
    game: &mut Game,
    caller: &mut Caller,
    command: Command,
) -> Result<NextStates<CommandKind>, MachineError<CommandKind, GameError>> {
    let joining = command.kind() == CommandKind::JoinGame && !caller.is_linked();
    if joining {
        caller.link(&game.events);
    }

    let result = machine.change(game, caller, command);
    if joining && result.is_err() {
        caller.unlink(&game.events);
    }
    result
}

fn joined_player<'a>(game: &'a Game, caller: &'a Caller) -> Result<(&'a PlayerName, &'a PlayerState), GameError> {
    let name = caller.player.as_ref().ok_or(GameError::NotJoined)?;
    let player = game.state.players.get(name).ok_or(GameError::NotJoined)?;
    Ok((name, player))
}

fn require_admin(game: &Game, caller: &Caller, action: &'static str) -> Result<(), GameError> {
    let (_, player) = joined_player(game, caller)?;
    if player.is_admin {
        Ok(())
    } else {
        Err(GameError::Unauthorized(action))
    }
}

fn join_game(game: &mut Game, caller: &mut Caller, command: &Command) -> Outcome {
    let Command::JoinGame {
        player_name,
        admin_password,
        ..
    } = command
    else {
        return Err(GameError::UnexpectedCommand(command.kind()));
    };

    if caller.player.is_some() {
        return Err(GameError::AlreadyJoined);
    }

    let name = player_name.trim();
    if !is_valid_player_name(name) {
        return Err(GameError::InvalidPlayerName(player_name.clone()));
    }

    let is_admin = match admin_password {
        Some(password) => {
            if !game.store.compare_game_password(&game.id, password)? {
                return Err(GameError::InvalidCredentials);
            }
            true
        }
        None => false,
    };

    match game.state.players.get(name) {
        Some(existing) if existing.is_admin && !is_admin => {
            return Err(GameError::Unauthorized("rejoining as an admin needs the admin password"));
        }
        Some(_) => info!("Game {}: {} rejoined", game.id, name),
        None => {
            game.state.players.insert(
                name.to_string(),
                PlayerState {
                    is_admin,
                    ..Default::default()
                },
            );
            game.state.order.push(name.to_string());
            info!("Game {}: {} joined (admin: {})", game.id, name, is_admin);
        }
    }

    caller.player = Some(name.to_string());
    Ok(NextStates::of([CommandKind::JoinGame, CommandKind::BeginGame]))
}

fn begin_game(game: &mut Game, caller: &mut Caller, _: &Command) -> Outcome {
    require_admin(game, caller, "only admins can begin the game")?;

    let chooser = game
        .state
        .contestants()
        .next()
        .map(|(name, _)| name.clone())
        .ok_or(GameError::NoPlayers)?;
    info!("Game {}: started, {} chooses first", game.id, chooser);
    game.state.chooser = Some(chooser);

    Ok(game.advance_turn())
}

fn choose_question(game: &mut Game, caller: &mut Caller, command: &Command) -> Outcome {
    let &Command::ChooseQuestion { category, question } = command else {
        return Err(GameError::UnexpectedCommand(command.kind()));
    };

    let (name, _) = joined_player(game, caller)?;
    if game.state.chooser.as_ref() != Some(name) {
        return Err(GameError::NotYourTurn);
    }

    let invalid = GameError::InvalidQuestion { category, question };
    let (Ok(c), Ok(q)) = (usize::try_from(category), usize::try_from(question)) else {
        return Err(invalid);
    };
    if game.data.question_at(c, q).is_none() || game.state.answered.contains_key(&(c, q)) {
        return Err(invalid);
    }

    game.state.current = Some((c, q));
    game.state.answering = None;
    Ok(NextStates::of([CommandKind::PressButton]))
}

fn press_button(game: &mut Game, caller: &mut Caller, _: &Command) -> Outcome {
    let name = caller.player.as_ref().ok_or(GameError::NotJoined)?;
    let player = game
        .state
        .players
        .get_mut(name)
        .ok_or(GameError::NotJoined)?;

    if player.is_admin {
        return Err(GameError::Unauthorized("admins cannot press the button"));
    }
    if player.pressed {
        return Err(GameError::AlreadyPressed);
    }

    player.pressed = true;
    game.state.answering = Some(name.clone());
    Ok(NextStates::of([CommandKind::PlayerJudgment]))
}

fn player_judgment(game: &mut Game, caller: &mut Caller, command: &Command) -> Outcome {
    let &Command::PlayerJudgment { correct } = command else {
        return Err(GameError::UnexpectedCommand(command.kind()));
    };

    require_admin(game, caller, "only admins can judge players")?;

    let (Some(answering), Some((category, question))) =
        (game.state.answering.clone(), game.state.current)
    else {
        return Ok(game.advance_turn());
    };

    if correct {
        let points = game.data.question_points(question);
        if let Some(player) = game.state.players.get_mut(&answering) {
            player.score += points;
        }
        info!(
            "Game {}: {} answered ({}, {}) for {} points",
            game.id, answering, category, question, points
        );

        game.state.answered.insert((category, question), answering.clone());
        game.state.chooser = Some(answering);
        game.state.end_question();
    } else {
        debug!("Game {}: {} answered ({}, {}) incorrectly", game.id, answering, category, question);
        game.state.answering = None;
    }

    Ok(game.advance_turn())
}

fn send_joined_game(game: &Game, caller: &Caller, _: &Command) -> Result<(), GameError> {
    let (_, player) = joined_player(game, caller)?;
    let data = game.store.game_definition(&game.id)?;

    caller.send(Event::JoinedGame {
        game_id: game.id.clone(),
        is_admin: player.is_admin,
        game_info: data.info(),
        game_data: player.is_admin.then_some(data),
    });
    Ok(())
}

fn announce_player(game: &Game, caller: &Caller, _: &Command) -> Result<(), GameError> {
    let (name, _) = joined_player(game, caller)?;

    game.broadcast(Event::PlayerJoined {
        player_name: name.clone(),
    });

    for other in game.state.order.iter().filter(|other| *other != name) {
        caller.send(Event::PlayerJoined {
            player_name: other.clone(),
        });
    }
    Ok(())
}

fn announce_start(game: &Game, _: &Caller, _: &Command) -> Result<(), GameError> {
    game.broadcast(Event::GameStarted);
    Ok(())
}

fn announce_turn(game: &Game, _: &Caller, _: &Command) -> Result<(), GameError> {
    game.broadcast(Event::TurnEnded {
        chooser: game.state.chooser.clone().unwrap_or_default(),
        answered: game.state.answered_questions(),
        leaderboard: game.state.leaderboard(),
    });
    Ok(())
}

fn announce_question(game: &Game, _: &Caller, command: &Command) -> Result<(), GameError> {
    let Some((category, question)) = game.state.current else {
        return Err(GameError::UnexpectedCommand(command.kind()));
    };
    let data = game.store.game_definition(&game.id)?;
    let text = data
        .question_at(category, question)
        .map(|q| q.question.clone())
        .unwrap_or_default();

    game.broadcast(Event::BeginQuestion {
        chooser: game.state.chooser.clone().unwrap_or_default(),
        category,
        question: text,
        points: data.question_points(question),
    });
    Ok(())
}

fn announce_button(game: &Game, caller: &Caller, _: &Command) -> Result<(), GameError> {
    let (name, _) = joined_player(game, caller)?;
    game.broadcast(Event::ButtonPressed {
        player_name: name.clone(),
    });
    Ok(())
}

fn resume_button(game: &Game, _: &Caller, _: &Command) -> Result<(), GameError> {
    game.broadcast(Event::ResumeButton {
        remaining_players: game.state.remaining_players(),
    });
    Ok(())
}

fn announce_end(game: &Game, _: &Caller, _: &Command) -> Result<(), GameError> {
    game.broadcast(Event::GameEnded {
        leaderboard: game.state.leaderboard(),
    });
    Ok(())
}
