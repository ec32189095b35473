//! Error types shared by the session layer.

use crate::machine::MachineError;
use crate::store::StoreError;
use shared::{CommandKind, GameId};

/// Reasons a command is refused by the quiz rules.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GameError {
    #[error("unauthorized: {0}")]
    Unauthorized(&'static str),
    #[error("it is not your turn")]
    NotYourTurn,
    #[error("you already pressed the button for this question")]
    AlreadyPressed,
    #[error("invalid question {question} in category {category}")]
    InvalidQuestion { category: i32, question: i32 },
    #[error("invalid admin password")]
    InvalidCredentials,
    #[error("invalid player name {0:?}")]
    InvalidPlayerName(String),
    #[error("already joined the game")]
    AlreadyJoined,
    #[error("join the game first")]
    NotJoined,
    #[error("no players to start the game with")]
    NoPlayers,
    #[error("unexpected {0} command")]
    UnexpectedCommand(CommandKind),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Transition(#[from] MachineError<CommandKind, GameError>),
    #[error("the first command must be JoinGame")]
    MustJoinFirst,
    #[error("unknown game {0}")]
    UnknownGame(GameId),
    #[error("game {0} already has a session")]
    SessionExists(GameId),
    #[error("game session has closed")]
    SessionClosed,
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl Error {
    pub fn is_illegal_transition(&self) -> bool {
        matches!(
            self,
            Error::Transition(MachineError::IllegalTransition { .. })
        )
    }

    /// The rule violation behind this error, if any.
    pub fn game_error(&self) -> Option<&GameError> {
        match self {
            Error::Transition(MachineError::Rejected(err))
            | Error::Transition(MachineError::Reactor { source: err, .. }) => Some(err),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::NextStates;

    #[test]
    fn test_game_error_lookup() {
        let err = Error::from(MachineError::Rejected(GameError::NotYourTurn));
        assert_eq!(err.game_error(), Some(&GameError::NotYourTurn));
        assert!(!err.is_illegal_transition());
        assert_eq!(err.to_string(), "it is not your turn");
    }

    #[test]
    fn test_illegal_transition_lookup() {
        let err = Error::from(MachineError::IllegalTransition {
            kind: CommandKind::PressButton,
            expected: NextStates::of([CommandKind::ChooseQuestion]),
        });
        assert!(err.is_illegal_transition());
        assert!(err.game_error().is_none());
        assert_eq!(
            err.to_string(),
            "PressButton is not allowed now, expected one of {ChooseQuestion}"
        );
    }

    #[test]
    fn test_routing_errors() {
        assert!(Error::MustJoinFirst.game_error().is_none());
        assert_eq!(
            Error::UnknownGame("abc".to_string()).to_string(),
            "unknown game abc"
        );
    }
}
