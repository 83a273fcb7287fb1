// Typed payloads carried inside protocol commands.
//
// The wire format is plain text (`KIND|payload`), but the relay and the client
// never compare raw payload strings. Each payload family is decoded once at the
// protocol boundary into one of these types via `FromStr`, and rendered back
// with `Display` using the exact wire spelling.
//
// - `Role`:         host/guest role names (`Player1`, `Player2`), mapped to
//                   session slot indices 0 and 1.
// - `Direction`:    relayed movement intent.
// - `GameSignal`:   lifecycle notifications (`GAME`/`GAMESTATE` payloads),
//                   including the two client-issued requests.
// - `FoodPosition`: `x_y` integer coordinates.

use std::fmt;
use std::str::FromStr;

use crate::ProtocolError;

/// Player role within a two-player session. Slot 0 is always the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    Player1,
    Player2,
}

impl Role {
    /// Role for a session slot index. Only slots 0 and 1 exist.
    pub fn from_slot(slot: usize) -> Option<Self> {
        match slot {
            0 => Some(Role::Player1),
            1 => Some(Role::Player2),
            _ => None,
        }
    }

    pub fn slot(self) -> usize {
        match self {
            Role::Player1 => 0,
            Role::Player2 => 1,
        }
    }

    pub fn is_host(self) -> bool {
        self == Role::Player1
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Player1 => "Player1",
            Role::Player2 => "Player2",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Player1" => Ok(Role::Player1),
            "Player2" => Ok(Role::Player2),
            other => Err(ProtocolError::invalid_payload("role", other)),
        }
    }
}

/// Snake heading, relayed between peers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Up => "UP",
            Direction::Down => "DOWN",
            Direction::Left => "LEFT",
            Direction::Right => "RIGHT",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = ProtocolError;

    /// Accepts the lobby client's `MOVE_` prefix (`MOVE_UP`) as well.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.strip_prefix("MOVE_").unwrap_or(s) {
            "UP" => Ok(Direction::Up),
            "DOWN" => Ok(Direction::Down),
            "LEFT" => Ok(Direction::Left),
            "RIGHT" => Ok(Direction::Right),
            other => Err(ProtocolError::invalid_payload("direction", other)),
        }
    }
}

/// Session lifecycle signal, the payload of `GAME` and `GAMESTATE` frames.
///
/// `PressStart` and `PressRestart` are only ever sent by clients; the relay
/// answers them with `Start` and `Restart` broadcasts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GameSignal {
    Ready,
    Start,
    Wait,
    Restart,
    GameOver,
    PlayerDisconnected,
    PressStart,
    PressRestart,
}

impl GameSignal {
    pub fn as_str(self) -> &'static str {
        match self {
            GameSignal::Ready => "READY",
            GameSignal::Start => "START",
            GameSignal::Wait => "WAIT",
            GameSignal::Restart => "RESTART",
            GameSignal::GameOver => "GAME_OVER",
            GameSignal::PlayerDisconnected => "PLAYER_DISCONNECTED",
            GameSignal::PressStart => "PRESS_START",
            GameSignal::PressRestart => "PRESS_RESTART",
        }
    }
}

impl fmt::Display for GameSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GameSignal {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "READY" => Ok(GameSignal::Ready),
            "START" => Ok(GameSignal::Start),
            "WAIT" => Ok(GameSignal::Wait),
            "RESTART" => Ok(GameSignal::Restart),
            "GAME_OVER" => Ok(GameSignal::GameOver),
            "PLAYER_DISCONNECTED" => Ok(GameSignal::PlayerDisconnected),
            "PRESS_START" => Ok(GameSignal::PressStart),
            "PRESS_RESTART" => Ok(GameSignal::PressRestart),
            other => Err(ProtocolError::invalid_payload("game signal", other)),
        }
    }
}

/// Food cell on the shared board, encoded as `x_y`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FoodPosition {
    pub x: i32,
    pub y: i32,
}

impl fmt::Display for FoodPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.x, self.y)
    }
}

impl FromStr for FoodPosition {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ProtocolError::invalid_payload("food position", s);
        let (x, y) = s.split_once('_').ok_or_else(invalid)?;
        let x = x.parse().map_err(|_| invalid())?;
        let y = y.parse().map_err(|_| invalid())?;
        Ok(FoodPosition { x, y })
    }
}
