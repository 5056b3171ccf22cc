//! # bearoff — an authoritative backgammon server
//!
//! The rules engine (`types`, `movegen`, `game`) has no dependency on the
//! network layer and can be exercised as a plain library — `ws` is the only
//! module that reaches for `actix-web`/`actix-web-actors`.
//!
//! ## Wire protocol
//!
//! A single websocket endpoint carries JSON envelopes of the shape
//! `{ "event": "...", "payload": { ... } }`. See `ws` for the full event
//! table (register, create-room, join-room, quick-match, roll-dice,
//! make-move, offer-double, respond-double, reconnect-to-game, leave-room,
//! list-players, ...).
//!
//! ## Configuration
//!
//! No subcommands, no flags — configuration is environment-variable only:
//!
//! - `BEAROFF_PORT` (default 3001)
//! - `BEAROFF_ALLOWED_ORIGIN` (default `http://localhost:3000`)
//! - `BEAROFF_DATA_DIR` (default `data`)
//! - `BEAROFF_DISCONNECT_GRACE_SECS` (default 30)
//! - `RUST_LOG`, consumed by `env_logger`

pub mod config;
pub mod game;
pub mod identity;
pub mod movegen;
pub mod rooms;
pub mod storage;
pub mod types;
pub mod ws;
