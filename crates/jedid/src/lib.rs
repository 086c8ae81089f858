//! JediChat server - session roster and broadcast relay
//!
//! This crate provides the server side of the chat relay:
//! - `server` - TCP listener, per-connection reader tasks, operator commands
//! - `roster` - Ordered set of Active sessions
//! - `broadcast` - Linearized fan-out of chat lines to the roster
//! - `session` - Per-connection state and the serialized write half
//! - `console` - Line-based operator console
//! - `display` - Presentation hook for chat lines and roster changes
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       jedid server                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │   ChatServer    │◀────│     Operator console        │   │
//! │  │ (TcpListener)   │     │  start/stop/kick/list       │   │
//! │  └────────┬────────┘     └─────────────────────────────┘   │
//! │           │ connections                                     │
//! │           ▼                                                 │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │ConnectionHandler│────▶│   Broadcaster (one lane)    │   │
//! │  │  (per client)   │     │   Roster ─▶ SessionHandle   │   │
//! │  └─────────────────┘     └──────────────┬──────────────┘   │
//! │                                         │                   │
//! │                                         ▼                   │
//! │                                  ChatDisplay                │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - A failure in one session never affects another

pub mod broadcast;
pub mod config;
pub mod console;
pub mod display;
pub mod roster;
pub mod server;
pub mod session;
