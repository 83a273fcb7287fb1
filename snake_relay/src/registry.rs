// The set of live sessions.
//
// `Registry` is the single source of truth for which sessions exist and which
// client sits where. Sessions are kept in creation order so matchmaking is
// deterministic: `find_open_session` returns the oldest session with a free
// slot. A `ClientId -> SessionId` index answers "where is this client" without
// scanning every session.
//
// Invariants maintained here:
// - A client is seated in at most one session (`seat` refuses a second seat).
// - Every stored session has at least one occupant; `unseat` removes a session
//   in the same call that empties it.
// - The seat index and the sessions' slots always agree.
//
// The registry does no I/O. It's owned by the dispatcher, which is in turn
// owned by the relay thread, so every check-then-mutate sequence here runs
// without interleaving.

use std::collections::HashMap;

use crate::error::SessionError;
use crate::session::{Dialect, Session, SessionId};
use crate::transport::ClientId;

/// Where `seat` put a client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Seating {
    pub session: SessionId,
    pub slot: usize,
    /// True if a new session was created for this client.
    pub created: bool,
}

/// Where `unseat` took a client from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Unseated {
    pub session: SessionId,
    pub slot: usize,
    /// True if the session became empty and was removed.
    pub removed: bool,
}

#[derive(Debug, Default)]
pub struct Registry {
    sessions: Vec<Session>,
    seats: HashMap<ClientId, SessionId>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Oldest session with a free slot.
    pub fn find_open_session(&self) -> Option<&Session> {
        self.sessions.iter().find(|s| !s.is_full())
    }

    /// Create a session with `client` as host and register it.
    pub fn create_session(&mut self, client: ClientId, dialect: Dialect, name: String) -> SessionId {
        let session = Session::new(client, dialect, name);
        let id = session.id();
        self.seats.insert(client, id);
        self.sessions.push(session);
        id
    }

    pub fn find_session_for(&self, client: ClientId) -> Option<&Session> {
        let id = self.seats.get(&client)?;
        self.get(*id)
    }

    pub fn find_session_for_mut(&mut self, client: ClientId) -> Option<&mut Session> {
        let id = *self.seats.get(&client)?;
        self.get_mut(id)
    }

    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.sessions.iter().find(|s| s.id() == id)
    }

    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut Session> {
        self.sessions.iter_mut().find(|s| s.id() == id)
    }

    /// Delete a session and forget all of its occupants.
    pub fn remove(&mut self, id: SessionId) -> Option<Session> {
        let index = self.sessions.iter().position(|s| s.id() == id)?;
        let session = self.sessions.remove(index);
        for client in session.occupants() {
            self.seats.remove(&client);
        }
        Some(session)
    }

    /// Find-or-create: seat `client` in the oldest open session, or in a new
    /// one if every session is full.
    pub fn seat(
        &mut self,
        client: ClientId,
        dialect: Dialect,
        name: String,
    ) -> Result<Seating, SessionError> {
        if self.seats.contains_key(&client) {
            return Err(SessionError::AlreadySeated(client));
        }

        let open = self.find_open_session().map(Session::id);
        match open.and_then(|id| self.get_mut(id)) {
            Some(session) => {
                let slot = session.add_player(client, dialect, name)?;
                let id = session.id();
                self.seats.insert(client, id);
                Ok(Seating {
                    session: id,
                    slot,
                    created: false,
                })
            }
            None => {
                let id = self.create_session(client, dialect, name);
                Ok(Seating {
                    session: id,
                    slot: 0,
                    created: true,
                })
            }
        }
    }

    /// Take `client` out of its session, removing the session if that left
    /// it empty. `None` if the client wasn't seated.
    pub fn unseat(&mut self, client: ClientId) -> Option<Unseated> {
        let id = self.seats.remove(&client)?;
        let session = self.get_mut(id)?;
        let slot = session.remove_player(client)?;
        let removed = session.is_empty();
        if removed {
            self.remove(id);
        }
        Some(Unseated {
            session: id,
            slot,
            removed,
        })
    }

    pub fn is_seated(&self, client: ClientId) -> bool {
        self.seats.contains_key(&client)
    }

    /// Sessions in creation order.
    pub fn sessions(&self) -> impl Iterator<Item = &Session> {
        self.sessions.iter()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
