//! Storage of game definitions and admin passwords.

use dashmap::DashMap;
use log::info;
use shared::{generate_game_id, GameData, GameId};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("game {0} not found")]
    NotFound(GameId),
    #[error("storage failure: {0}")]
    Backend(String),
}

/// Synchronous access to stored games. Implementations may fail; callers
/// surface the failure instead of retrying.
pub trait Storer: Send + Sync {
    /// Returns whether `password` is the admin password of the game. A game
    /// without a password never grants admin rights.
    fn compare_game_password(&self, game_id: &GameId, password: &str) -> Result<bool, StoreError>;

    fn game_definition(&self, game_id: &GameId) -> Result<GameData, StoreError>;

    /// Stores a new game and allocates its id.
    fn create_game(&self, data: GameData, admin_password: Option<String>) -> Result<GameId, StoreError>;
}

struct StoredGame {
    data: GameData,
    admin_password: Option<String>,
}

/// In-process store, lost on restart.
#[derive(Default)]
pub struct MemoryStore {
    games: DashMap<GameId, StoredGame>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.games.len()
    }

    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }
}

impl Storer for MemoryStore {
    fn compare_game_password(&self, game_id: &GameId, password: &str) -> Result<bool, StoreError> {
        let game = self
            .games
            .get(game_id)
            .ok_or_else(|| StoreError::NotFound(game_id.clone()))?;

        Ok(game.admin_password.as_deref() == Some(password))
    }

    fn game_definition(&self, game_id: &GameId) -> Result<GameData, StoreError> {
        self.games
            .get(game_id)
            .map(|game| game.data.clone())
            .ok_or_else(|| StoreError::NotFound(game_id.clone()))
    }

    fn create_game(&self, data: GameData, admin_password: Option<String>) -> Result<GameId, StoreError> {
        loop {
            let game_id = generate_game_id();
            if let dashmap::mapref::entry::Entry::Vacant(slot) = self.games.entry(game_id.clone()) {
                slot.insert(StoredGame {
                    data,
                    admin_password,
                });
                info!("Stored game {}", game_id);
                return Ok(game_id);
            }
        }
    }
}
