// snake_relay_protocol: wire protocol for the two-player snake relay.
//
// This crate defines the text command format, typed payloads, and stream
// framing shared by the relay server (`snake_relay`) and game clients. It has
// no networking of its own and no dependency on the relay.
//
// Module overview:
// - `message.rs`: `CommandKind` (closed set of wire tokens) and `Command`
//                 (`KIND|payload` encode/decode).
// - `types.rs`:   Typed payloads (`Role`, `Direction`, `GameSignal`,
//                 `FoodPosition`), decoded once at the protocol boundary.
// - `framing.rs`: Newline-delimited framing over any `BufRead`/`Write`.
// - `error.rs`:   `ProtocolError` for malformed frames and payloads.
//
// Design decisions:
// - **Text, not JSON.** The game clients already speak `KIND|payload` over
//   both UDP and TCP; the relay must stay wire-compatible with them.
// - **Payloads kept verbatim.** Relayed commands leave the server exactly as
//   they arrived. Parsing into typed payloads validates without rewriting.
// - **No async runtime.** Framing uses `std::io` traits and works with
//   blocking sockets and buffered wrappers alike.

pub mod error;
pub mod framing;
pub mod message;
pub mod types;

pub use error::ProtocolError;
pub use framing::{MAX_FRAME_LEN, read_frame, write_frame};
pub use message::{Command, CommandKind};
pub use types::{Direction, FoodPosition, GameSignal, Role};
