//! # Quiz Session Server Library
//!
//! This library provides the realtime session layer of a multiplayer,
//! turn-based quiz game. Players connect over WebSocket, send commands, and
//! receive the events that describe how the game evolves.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Game State
//! Each game runs in a single session actor that owns its state. Commands are
//! applied one at a time and only when they are the currently legal move, so
//! every player observes the same sequence of transitions.
//!
//! ### Event Fan-out
//! State changes become events that are pushed to every connected player
//! without ever blocking the session. A player whose queue overflows is dropped
//! rather than slowing down the game for everybody else.
//!
//! ### Connection Lifecycle
//! Each connection is served by a command loop and an event loop. They enforce
//! rate limits and heartbeats and close the socket with a code that tells the
//! client why.
//!
//! ## Module Organization
//!
//! ### Machine Module (`machine`)
//! Generic transition engine:
//! - Handlers registered per command kind
//! - Legal next inputs recomputed on every transition
//! - Reactors filtered on the previous kind and the resulting set
//!
//! ### Game and Session Modules (`game`, `session`)
//! Quiz rules and the actor that serves them:
//! - Joining, starting, choosing, buzzing in and judging
//! - Leaderboard and turn order
//! - One bounded inbox per session
//!
//! ### Pub/Sub Module (`pubsub`)
//! Non-blocking, nestable publishers with drop-on-full subscribers.
//!
//! ### Registry Module (`registry`)
//! Running sessions by game id, plus the per-connection router that requires a
//! JoinGame first.
//!
//! ### Connection and Network Modules (`connection`, `network`)
//! WebSocket accept loop, per-connection protocol loop, token bucket limiter
//! (`limiter`) and graceful shutdown.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//! use server::store::MemoryStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig {
//!         addr: "127.0.0.1:8080".to_string(),
//!         ..Default::default()
//!     };
//!     let server = Server::bind(config, Arc::new(MemoryStore::new())).await?;
//!
//!     // Games must be registered before players can join them
//!     let data = serde_json::from_str(&std::fs::read_to_string("game.json")?)?;
//!     let session = server
//!         .registry()
//!         .create_session(data, Some("admin".to_string()))
//!         .await?;
//!     println!("Join game {}", session.id());
//!
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod game;
pub mod limiter;
pub mod machine;
pub mod network;
pub mod pubsub;
pub mod registry;
pub mod session;
pub mod store;

pub use error::{Error, GameError};
