// snake_relay: matchmaking and relay server for two-player snake.
//
// The relay pairs clients into two-seat sessions and forwards each player's
// moves and food placements to the opponent. It never runs the game: both
// clients simulate locally and the relay only sequences lifecycle signals
// (ready, start, game over, restart) and tears sessions down when a player
// goes away.
//
// Module overview:
// - `session.rs`:    One pairing. Two slots, per-seat dialect, lifecycle state.
// - `registry.rs`:   All live sessions. Find-or-create seating, seat index,
//                    removal of emptied sessions.
// - `dispatcher.rs`: Decision logic. Maps each inbound event to registry
//                    mutations plus `Action`s (send, close). No I/O.
// - `transport.rs`:  `ClientId` and the `FrameSink` write halves for TCP and
//                    UDP peers.
// - `server.rs`:     Listener and reader threads plus the relay thread that
//                    owns the dispatcher. Uses `std::net` with a
//                    thread-per-reader architecture and an `mpsc` channel to
//                    serialize every state change.
// - `config.rs`:     `RelayConfig`, loaded from JSON and overridden by CLI
//                    flags in `main.rs`.
// - `client.rs`:     Blocking TCP client core for game front ends and tests.
// - `error.rs`:      `SessionError` and `RelayError`.
//
// Dependencies: `snake_relay_protocol` (wire format and framing).
//
// The relay can run as a standalone binary (`main.rs`) or be embedded in a
// game process via the library API (`start_relay`).

pub mod client;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod registry;
pub mod server;
pub mod session;
pub mod transport;

pub use client::{ClientEvent, NetClient, SessionListener};
pub use config::{RelayConfig, TransportKind};
pub use error::{RelayError, SessionError};
pub use server::{RelayHandle, start_relay};
