use rand::distributions::Alphanumeric;
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

mod data;

pub use data::{
    AnsweredQuestion, Category, GameData, GameInfo, LeaderboardEntry, Question,
    DEFAULT_SCORE_MULTIPLIER,
};

pub const GAME_ID_LEN: usize = 8;
pub const MAX_PLAYER_NAME_LEN: usize = 32;

pub type GameId = String;
pub type PlayerName = String;

pub fn generate_game_id() -> GameId {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(GAME_ID_LEN)
        .map(char::from)
        .collect()
}

/// Player names are 1 to 32 letters, digits, spaces or `_.'-`, starting with a
/// letter or digit and without surrounding whitespace.
pub fn is_valid_player_name(name: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"^[\p{L}\p{N}][\p{L}\p{N} _.'-]*$").expect("player name pattern is valid")
    });

    name == name.trim()
        && name.chars().count() <= MAX_PLAYER_NAME_LEN
        && pattern.is_match(name)
}

/// Commands sent by players, one per text frame.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum Command {
    #[serde(rename_all = "camelCase")]
    JoinGame {
        #[serde(rename = "gameID")]
        game_id: GameId,
        player_name: PlayerName,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        admin_password: Option<String>,
    },
    BeginGame,
    ChooseQuestion {
        category: i32,
        question: i32,
    },
    PressButton,
    PlayerJudgment {
        correct: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CommandKind {
    JoinGame,
    BeginGame,
    ChooseQuestion,
    PressButton,
    PlayerJudgment,
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::JoinGame { .. } => CommandKind::JoinGame,
            Command::BeginGame => CommandKind::BeginGame,
            Command::ChooseQuestion { .. } => CommandKind::ChooseQuestion,
            Command::PressButton => CommandKind::PressButton,
            Command::PlayerJudgment { .. } => CommandKind::PlayerJudgment,
        }
    }
}

impl CommandKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CommandKind::JoinGame => "JoinGame",
            CommandKind::BeginGame => "BeginGame",
            CommandKind::ChooseQuestion => "ChooseQuestion",
            CommandKind::PressButton => "PressButton",
            CommandKind::PlayerJudgment => "PlayerJudgment",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events pushed to players, one per text frame.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum Event {
    /// Sent only to the player that joined.
    #[serde(rename_all = "camelCase")]
    JoinedGame {
        #[serde(rename = "gameID")]
        game_id: GameId,
        is_admin: bool,
        game_info: GameInfo,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        game_data: Option<GameData>,
    },
    #[serde(rename_all = "camelCase")]
    PlayerJoined {
        player_name: PlayerName,
    },
    GameStarted,
    TurnEnded {
        chooser: PlayerName,
        answered: Vec<AnsweredQuestion>,
        leaderboard: Vec<LeaderboardEntry>,
    },
    BeginQuestion {
        chooser: PlayerName,
        category: usize,
        question: String,
        points: f64,
    },
    #[serde(rename_all = "camelCase")]
    ButtonPressed {
        player_name: PlayerName,
    },
    #[serde(rename_all = "camelCase")]
    ResumeButton {
        remaining_players: Vec<PlayerName>,
    },
    GameEnded {
        leaderboard: Vec<LeaderboardEntry>,
    },
    Error {
        message: String,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::JoinedGame { .. } => "JoinedGame",
            Event::PlayerJoined { .. } => "PlayerJoined",
            Event::GameStarted => "GameStarted",
            Event::TurnEnded { .. } => "TurnEnded",
            Event::BeginQuestion { .. } => "BeginQuestion",
            Event::ButtonPressed { .. } => "ButtonPressed",
            Event::ResumeButton { .. } => "ResumeButton",
            Event::GameEnded { .. } => "GameEnded",
            Event::Error { .. } => "Error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use serde_json::json;

    fn board() -> GameData {
        GameData {
            categories: vec![
                Category {
                    name: "Lorem Ipsum 1".to_string(),
                    questions: vec![
                        Question {
                            question: "1".to_string(),
                            answers: vec![],
                        },
                        Question {
                            question: "2".to_string(),
                            answers: vec!["two".to_string()],
                        },
                    ],
                },
                Category {
                    name: "Lorem Ipsum 2".to_string(),
                    questions: vec![Question {
                        question: "3".to_string(),
                        answers: vec![],
                    }],
                },
            ],
            score_multiplier: None,
        }
    }

    #[test]
    fn test_join_game_wire_format() {
        let cmd: Command = serde_json::from_value(json!({
            "type": "JoinGame",
            "gameID": "abc123",
            "playerName": "Player 1",
        }))
        .unwrap();

        assert_eq!(
            cmd,
            Command::JoinGame {
                game_id: "abc123".to_string(),
                player_name: "Player 1".to_string(),
                admin_password: None,
            }
        );
        assert_eq!(cmd.kind(), CommandKind::JoinGame);
    }

    #[test]
    fn test_unit_commands_only_need_a_tag() {
        let begin: Command = serde_json::from_str(r#"{"type":"BeginGame"}"#).unwrap();
        let press: Command = serde_json::from_str(r#"{"type":"PressButton"}"#).unwrap();

        assert_eq!(begin, Command::BeginGame);
        assert_eq!(press, Command::PressButton);
        assert_eq!(
            serde_json::to_value(Command::BeginGame).unwrap(),
            json!({"type": "BeginGame"})
        );
    }

    #[test]
    fn test_unknown_command_is_rejected() {
        let result = serde_json::from_str::<Command>(r#"{"type":"StealPoints"}"#);
        assert!(result.is_err());

        let result = serde_json::from_str::<Command>(r#"{"type":"ChooseQuestion"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_event_wire_format() {
        let event = Event::ButtonPressed {
            player_name: "Player 1".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"type": "ButtonPressed", "playerName": "Player 1"})
        );

        let event = Event::JoinedGame {
            game_id: "abc123".to_string(),
            is_admin: false,
            game_info: board().info(),
            game_data: None,
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "type": "JoinedGame",
                "gameID": "abc123",
                "isAdmin": false,
                "gameInfo": {
                    "categories": ["Lorem Ipsum 1", "Lorem Ipsum 2"],
                    "numQuestions": 2,
                    "scoreMultiplier": 100.0,
                },
            })
        );
    }

    #[test]
    fn test_admin_only_answers_are_omitted_when_empty() {
        let value = serde_json::to_value(board()).unwrap();
        assert!(value["categories"][0]["questions"][0].get("answers").is_none());
        assert_eq!(value["categories"][0]["questions"][1]["answers"], json!(["two"]));
    }

    #[test]
    fn test_question_points() {
        let mut data = board();
        assert_approx_eq!(data.question_points(0), 100.0);
        assert_approx_eq!(data.question_points(1), 200.0);

        data.score_multiplier = Some(50.0);
        assert_approx_eq!(data.question_points(2), 150.0);
    }

    #[test]
    fn test_question_lookup() {
        let data = board();
        assert_eq!(data.total_questions(), 3);
        assert_eq!(data.question_at(0, 1).map(|q| q.question.as_str()), Some("2"));
        assert!(data.question_at(1, 1).is_none());
        assert!(data.question_at(2, 0).is_none());
    }

    #[test]
    fn test_player_names() {
        assert!(is_valid_player_name("Player 1"));
        assert!(is_valid_player_name("Admin"));
        assert!(is_valid_player_name("Zoë_O'Neil-2"));

        assert!(!is_valid_player_name(""));
        assert!(!is_valid_player_name(" Player"));
        assert!(!is_valid_player_name("Player "));
        assert!(!is_valid_player_name("_underscore"));
        assert!(!is_valid_player_name("<script>"));
        assert!(!is_valid_player_name(&"a".repeat(MAX_PLAYER_NAME_LEN + 1)));
        assert!(is_valid_player_name(&"a".repeat(MAX_PLAYER_NAME_LEN)));
    }

    #[test]
    fn test_game_ids() {
        let a = generate_game_id();
        let b = generate_game_id();

        assert_eq!(a.len(), GAME_ID_LEN);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }
}
