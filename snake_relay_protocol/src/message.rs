// Protocol commands for client-relay communication.
//
// Every frame on the wire is `KIND|payload`. `CommandKind` is the closed set
// of kinds, one variant per wire token. Both client families of the game are
// covered, so alias pairs exist: the console client speaks `GAME`, `MOVE` and
// `LEAVE`, the lobby client speaks `GAMESTATE`, `DIRECTION` and `DISCONNECT`.
// Aliases stay distinct variants so the relay can forward a command under the
// token it arrived with; `is_movement`/`is_lifecycle`/`is_departure` group
// them for dispatch.
//
// `Command` pairs a kind with its payload. The payload is kept as the original
// string (the relay forwards it verbatim); typed views are available through
// `payload_as` and the types in `types.rs`.

use std::fmt;
use std::str::FromStr;

use crate::ProtocolError;
use crate::types::{Direction, FoodPosition, GameSignal, Role};

/// Separator between the kind and the payload of a frame.
pub const FIELD_SEPARATOR: char = '|';

/// Every command type understood by the relay or its clients.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// Client asks to be seated (payload: player name).
    Join,
    /// Server tells a console client its role (payload: `Player1`/`Player2`).
    AssignRole,
    /// Lifecycle signal, console spelling.
    Game,
    /// Lifecycle signal, lobby spelling.
    GameState,
    /// Movement intent, console spelling.
    Move,
    /// Movement intent, lobby spelling.
    Direction,
    /// Food placement (payload: `x_y`).
    FoodPosition,
    /// Client departure, console spelling.
    Leave,
    /// Client departure, lobby spelling.
    Disconnect,
    /// Server tells a lobby client its slot index.
    YourId,
    /// Server ends the session (payload: free-text reason).
    End,
    /// Console host asks to start the game (payload ignored).
    Start,
}

impl CommandKind {
    pub const ALL: [CommandKind; 12] = [
        CommandKind::Join,
        CommandKind::AssignRole,
        CommandKind::Game,
        CommandKind::GameState,
        CommandKind::Move,
        CommandKind::Direction,
        CommandKind::FoodPosition,
        CommandKind::Leave,
        CommandKind::Disconnect,
        CommandKind::YourId,
        CommandKind::End,
        CommandKind::Start,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CommandKind::Join => "JOIN",
            CommandKind::AssignRole => "ASSIGN_ROLE",
            CommandKind::Game => "GAME",
            CommandKind::GameState => "GAMESTATE",
            CommandKind::Move => "MOVE",
            CommandKind::Direction => "DIRECTION",
            CommandKind::FoodPosition => "FOOD_POSITION",
            CommandKind::Leave => "LEAVE",
            CommandKind::Disconnect => "DISCONNECT",
            CommandKind::YourId => "YOUR_ID",
            CommandKind::End => "END",
            CommandKind::Start => "START",
        }
    }

    /// `MOVE` or `DIRECTION`.
    pub fn is_movement(self) -> bool {
        matches!(self, CommandKind::Move | CommandKind::Direction)
    }

    /// `GAME` or `GAMESTATE`.
    pub fn is_lifecycle(self) -> bool {
        matches!(self, CommandKind::Game | CommandKind::GameState)
    }

    /// `LEAVE` or `DISCONNECT`.
    pub fn is_departure(self) -> bool {
        matches!(self, CommandKind::Leave | CommandKind::Disconnect)
    }

    /// Kinds only the server is supposed to send.
    pub fn is_server_only(self) -> bool {
        matches!(
            self,
            CommandKind::AssignRole | CommandKind::YourId | CommandKind::End
        )
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandKind {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CommandKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ProtocolError::UnknownKind(s.to_owned()))
    }
}

/// One protocol message: a kind and its (untyped) payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Command {
    pub kind: CommandKind,
    pub payload: String,
}

impl Command {
    pub fn new(kind: CommandKind, payload: impl Into<String>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }

    pub fn join(player_name: &str) -> Self {
        Self::new(CommandKind::Join, player_name)
    }

    pub fn assign_role(role: Role) -> Self {
        Self::new(CommandKind::AssignRole, role.as_str())
    }

    pub fn your_id(slot: usize) -> Self {
        Self::new(CommandKind::YourId, slot.to_string())
    }

    pub fn game(signal: GameSignal) -> Self {
        Self::new(CommandKind::Game, signal.as_str())
    }

    pub fn game_state(signal: GameSignal) -> Self {
        Self::new(CommandKind::GameState, signal.as_str())
    }

    pub fn movement(direction: Direction) -> Self {
        Self::new(CommandKind::Move, direction.as_str())
    }

    pub fn food_position(position: FoodPosition) -> Self {
        Self::new(CommandKind::FoodPosition, position.to_string())
    }

    pub fn leave() -> Self {
        Self::new(CommandKind::Leave, "")
    }

    pub fn start() -> Self {
        Self::new(CommandKind::Start, "NOW")
    }

    pub fn end(reason: &str) -> Self {
        Self::new(CommandKind::End, reason)
    }

    /// Parse the payload as one of the typed payloads in `types.rs`.
    pub fn payload_as<T>(&self) -> Result<T, ProtocolError>
    where
        T: FromStr<Err = ProtocolError>,
    {
        self.payload.parse()
    }

    /// Render as wire text, without any frame terminator.
    pub fn encode(&self) -> String {
        self.to_string()
    }

    /// Decode one frame. Splits on the first separator only, so the payload
    /// may itself contain `|`. Trailing CR/LF is ignored.
    pub fn decode(frame: &[u8]) -> Result<Self, ProtocolError> {
        let text = std::str::from_utf8(frame)
            .map_err(|_| ProtocolError::Malformed(String::from_utf8_lossy(frame).into_owned()))?;
        let text = text.trim_end_matches(['\r', '\n']);
        let (kind, payload) = text
            .split_once(FIELD_SEPARATOR)
            .ok_or_else(|| ProtocolError::Malformed(text.to_owned()))?;
        Ok(Self {
            kind: kind.parse()?,
            payload: payload.to_owned(),
        })
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{FIELD_SEPARATOR}{}", self.kind, self.payload)
    }
}
