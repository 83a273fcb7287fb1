// One two-player pairing.
//
// A `Session` has exactly two slots. Slot 0 is the host (`Player1`), slot 1 the
// guest (`Player2`), and seats are handed out strictly in arrival order: the
// first free slot wins, so a fresh session always fills slot 0 before slot 1.
// The session owns no sockets; occupants are `ClientId`s and all writes go
// through the dispatcher's `Action`s.
//
// Each seat remembers the `Dialect` its client speaks. The console client
// expects `ASSIGN_ROLE`/`GAME`/`END`; the lobby client expects
// `YOUR_ID`/`GAMESTATE`. Notifications are rendered per recipient so both
// families can share a session.
//
// Lifecycle (`SessionState`):
//   WaitingForSecond --second seat--> Ready --host start--> InGame
//   InGame --game over--> Ready
//   any --departure--> Closed (then removed from the registry)

use std::fmt;

use snake_relay_protocol::{Command, GameSignal, Role};
use uuid::Uuid;

use crate::error::SessionError;
use crate::transport::ClientId;

/// Number of seats in a session.
pub const SLOT_COUNT: usize = 2;

/// Unique session identifier, generated at creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn generate() -> Self {
        SessionId(Uuid::new_v4())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    WaitingForSecond,
    Ready,
    InGame,
    Closed,
}

/// Which client family a seat speaks to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dialect {
    /// Joins explicitly; receives `ASSIGN_ROLE`, `GAME|…`, `END`.
    Console,
    /// Seated on connect; receives `YOUR_ID`, `GAMESTATE|…`.
    Lobby,
}

impl Dialect {
    /// Notification telling a client which seat it got.
    pub fn seat_assignment(self, role: Role) -> Command {
        match self {
            Dialect::Console => Command::assign_role(role),
            Dialect::Lobby => Command::your_id(role.slot()),
        }
    }

    pub fn signal(self, signal: GameSignal) -> Command {
        match self {
            Dialect::Console => Command::game(signal),
            Dialect::Lobby => Command::game_state(signal),
        }
    }

    /// Notification sent to the survivor when the opponent goes away.
    pub fn opponent_left(self) -> Command {
        match self {
            Dialect::Console => Command::end("Opponent left"),
            Dialect::Lobby => Command::game_state(GameSignal::PlayerDisconnected),
        }
    }
}

#[derive(Clone, Debug)]
struct Seat {
    client: ClientId,
    dialect: Dialect,
    name: String,
}

/// A two-player pairing.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    slots: [Option<Seat>; SLOT_COUNT],
    state: SessionState,
}

impl Session {
    /// New session with `host` in slot 0, waiting for a second player.
    pub fn new(host: ClientId, dialect: Dialect, name: String) -> Self {
        Self {
            id: SessionId::generate(),
            slots: [
                Some(Seat {
                    client: host,
                    dialect,
                    name,
                }),
                None,
            ],
            state: SessionState::WaitingForSecond,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn set_state(&mut self, state: SessionState) {
        self.state = state;
    }

    /// Seat a client in the first free slot and return its index.
    pub fn add_player(
        &mut self,
        client: ClientId,
        dialect: Dialect,
        name: String,
    ) -> Result<usize, SessionError> {
        if self.slot_of(client).is_some() {
            return Err(SessionError::AlreadySeated(client));
        }
        let slot = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(SessionError::SessionFull)?;
        self.slots[slot] = Some(Seat {
            client,
            dialect,
            name,
        });
        Ok(slot)
    }

    /// Clear the slot holding `client`. Returns the slot index, or `None` if
    /// the client wasn't seated here.
    pub fn remove_player(&mut self, client: ClientId) -> Option<usize> {
        let slot = self.slot_of(client)?;
        self.slots[slot] = None;
        Some(slot)
    }

    /// The occupant of the other slot. `None` if that slot is empty or
    /// `client` isn't seated here.
    pub fn opponent_of(&self, client: ClientId) -> Option<ClientId> {
        let slot = self.slot_of(client)?;
        self.occupant(SLOT_COUNT - 1 - slot)
    }

    pub fn slot_of(&self, client: ClientId) -> Option<usize> {
        self.slots
            .iter()
            .position(|seat| seat.as_ref().is_some_and(|s| s.client == client))
    }

    pub fn role_of(&self, client: ClientId) -> Option<Role> {
        self.slot_of(client).and_then(Role::from_slot)
    }

    pub fn occupant(&self, slot: usize) -> Option<ClientId> {
        self.slots.get(slot)?.as_ref().map(|s| s.client)
    }

    /// Occupants in slot order.
    pub fn occupants(&self) -> impl Iterator<Item = ClientId> {
        self.slots.iter().flatten().map(|s| s.client)
    }

    pub fn dialect_of(&self, client: ClientId) -> Option<Dialect> {
        self.seat(client).map(|s| s.dialect)
    }

    pub fn player_name(&self, client: ClientId) -> Option<&str> {
        self.seat(client).map(|s| s.name.as_str())
    }

    pub fn occupied_count(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn is_full(&self) -> bool {
        self.occupied_count() == SLOT_COUNT
    }

    pub fn is_empty(&self) -> bool {
        self.occupied_count() == 0
    }

    pub fn contains(&self, client: ClientId) -> bool {
        self.slot_of(client).is_some()
    }

    fn seat(&self, client: ClientId) -> Option<&Seat> {
        self.slots.iter().flatten().find(|s| s.client == client)
    }
}
