// Command dispatch: the relay's decision logic.
//
// `Dispatcher` owns the `Registry` and turns each inbound event into registry
// mutations plus a list of `Action`s for the transport layer to carry out. It
// never touches a socket, which keeps every rule here testable without I/O.
//
// Inbound events:
// - `connect`:    a stream client was accepted with auto-join enabled; it is
//                 seated immediately in the lobby dialect.
// - `handle`:     one decoded command from a client.
// - `disconnect`: the client's transport closed or failed. Treated exactly
//                 like an explicit `LEAVE`.
//
// Session rules:
// - `JOIN` seats the client (find-or-create). The host gets its role plus a
//   WAIT notice; when the guest arrives it gets its role and both peers get
//   READY.
// - `MOVE`/`DIRECTION` and `FOOD_POSITION` are forwarded verbatim to the
//   opponent only. Payloads are never interpreted; the lobby client's
//   `MOVE_UP` spelling passes through like `UP` does.
// - START (console `START|…` or lobby `GAMESTATE|PRESS_START`) is honoured
//   only from the host of a Ready session.
// - Any departure closes the session: the survivor, if any, is told the
//   opponent left and is unseated too, and the session is removed. Lobby
//   survivors are disconnected since their client cannot re-join on the same
//   connection.
//
// State errors (commands from unseated clients, guest START, server-only kinds
// sent by a client) are logged and ignored. Only a capacity violation, which
// find-or-create should make impossible, comes back as an `Err`.

use log::{debug, info, warn};
use snake_relay_protocol::{Command, CommandKind, Direction, FoodPosition, GameSignal, Role};

use crate::error::SessionError;
use crate::registry::Registry;
use crate::session::{Dialect, Session, SessionId, SessionState};
use crate::transport::ClientId;

/// Something the transport layer must do as a result of dispatch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    Send { to: ClientId, command: Command },
    Close { client: ClientId },
}

impl Action {
    fn send(to: ClientId, command: Command) -> Self {
        Action::Send { to, command }
    }
}

#[derive(Debug, Default)]
pub struct Dispatcher {
    registry: Registry,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Seat a freshly accepted client without waiting for `JOIN`.
    pub fn connect(&mut self, client: ClientId) -> Result<Vec<Action>, SessionError> {
        self.join(client, Dialect::Lobby, String::new())
    }

    /// Apply one command from `client`.
    pub fn handle(
        &mut self,
        client: ClientId,
        command: Command,
    ) -> Result<Vec<Action>, SessionError> {
        let kind = command.kind;
        let actions = match kind {
            CommandKind::Join => return self.join(client, Dialect::Console, command.payload),
            CommandKind::Start => self.start_game(client),
            CommandKind::FoodPosition => {
                if let Err(e) = command.payload_as::<FoodPosition>() {
                    debug!("{client}: {e}, relayed as-is");
                }
                self.relay(client, command)
            }
            k if k.is_movement() => {
                if let Err(e) = command.payload_as::<Direction>() {
                    debug!("{client}: {e}, relayed as-is");
                }
                self.relay(client, command)
            }
            k if k.is_lifecycle() => match command.payload_as::<GameSignal>() {
                Ok(signal) => self.lifecycle(client, signal),
                Err(e) => {
                    warn!("{client}: {e}, dropped");
                    Vec::new()
                }
            },
            k if k.is_departure() => self.depart(client),
            k if k.is_server_only() => {
                warn!("{client} sent server-only command {kind}, ignored");
                Vec::new()
            }
            _ => {
                warn!("{client} sent unhandled command {kind}, ignored");
                Vec::new()
            }
        };
        Ok(actions)
    }

    /// The client's transport went away.
    pub fn disconnect(&mut self, client: ClientId) -> Vec<Action> {
        self.depart(client)
    }

    fn join(
        &mut self,
        client: ClientId,
        dialect: Dialect,
        name: String,
    ) -> Result<Vec<Action>, SessionError> {
        let seating = match self.registry.seat(client, dialect, name) {
            Ok(seating) => seating,
            Err(SessionError::AlreadySeated(_)) => {
                warn!("{client} sent JOIN but is already seated, ignored");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        let mut actions = Vec::new();
        let Some(session) = self.registry.get_mut(seating.session) else {
            return Ok(actions);
        };
        let Some(role) = Role::from_slot(seating.slot) else {
            return Err(SessionError::SessionFull);
        };
        actions.push(Action::send(client, dialect.seat_assignment(role)));

        if session.is_full() {
            session.set_state(SessionState::Ready);
            info!(
                "{client} joined session {} as {role}; session ready",
                session.id()
            );
            broadcast(session, GameSignal::Ready, &mut actions);
        } else {
            if seating.created {
                info!("{client} created session {} as {role}", session.id());
            } else {
                info!("{client} joined session {} as {role}", session.id());
            }
            actions.push(Action::send(client, dialect.signal(GameSignal::Wait)));
        }
        Ok(actions)
    }

    /// Forward a gameplay command to the sender's opponent, unchanged.
    fn relay(&self, client: ClientId, command: Command) -> Vec<Action> {
        let Some(session) = self.registry.find_session_for(client) else {
            warn!("{client} sent {} without a session, ignored", command.kind);
            return Vec::new();
        };
        match session.opponent_of(client) {
            Some(opponent) => {
                debug!("relay {command} {client} -> {opponent}");
                vec![Action::send(opponent, command)]
            }
            None => {
                debug!("{client} has no opponent, {command} dropped");
                Vec::new()
            }
        }
    }

    fn lifecycle(&mut self, client: ClientId, signal: GameSignal) -> Vec<Action> {
        match signal {
            GameSignal::PressStart => self.start_game(client),
            GameSignal::PressRestart => self.restart_game(client),
            GameSignal::GameOver => self.game_over(client),
            GameSignal::Ready => {
                debug!("{client} reports ready");
                Vec::new()
            }
            other => {
                warn!("{client} sent server-only signal {other}, ignored");
                Vec::new()
            }
        }
    }

    fn start_game(&mut self, client: ClientId) -> Vec<Action> {
        let Some(session) = self.session_of(client, "START") else {
            return Vec::new();
        };
        if session.role_of(client) != Some(Role::Player1) {
            warn!("{client} is not the host of {}, START ignored", session.id());
            return Vec::new();
        }
        if session.state() != SessionState::Ready {
            warn!(
                "session {} is {:?}, START ignored",
                session.id(),
                session.state()
            );
            return Vec::new();
        }

        session.set_state(SessionState::InGame);
        info!("session {} started by {client}", session.id());
        let mut actions = Vec::new();
        broadcast(session, GameSignal::Start, &mut actions);
        actions
    }

    fn restart_game(&mut self, client: ClientId) -> Vec<Action> {
        let Some(session) = self.session_of(client, "RESTART") else {
            return Vec::new();
        };
        if !matches!(session.state(), SessionState::Ready | SessionState::InGame) {
            warn!(
                "session {} is {:?}, RESTART ignored",
                session.id(),
                session.state()
            );
            return Vec::new();
        }

        session.set_state(SessionState::InGame);
        info!("session {} restarted by {client}", session.id());
        let mut actions = Vec::new();
        broadcast(session, GameSignal::Restart, &mut actions);
        actions
    }

    fn game_over(&mut self, client: ClientId) -> Vec<Action> {
        let Some(session) = self.session_of(client, "GAME_OVER") else {
            return Vec::new();
        };
        if session.state() != SessionState::InGame {
            warn!(
                "session {} is {:?}, GAME_OVER ignored",
                session.id(),
                session.state()
            );
            return Vec::new();
        }

        session.set_state(SessionState::Ready);
        info!("session {} game over, reported by {client}", session.id());
        let mut actions = Vec::new();
        broadcast(session, GameSignal::GameOver, &mut actions);
        actions
    }

    /// Close the client's session. Safe to call for unseated clients.
    fn depart(&mut self, client: ClientId) -> Vec<Action> {
        let Some(session) = self.registry.find_session_for_mut(client) else {
            debug!("{client} left without a session");
            return Vec::new();
        };
        session.set_state(SessionState::Closed);
        let id = session.id();
        let survivor = session
            .opponent_of(client)
            .map(|s| (s, session.dialect_of(s).unwrap_or(Dialect::Console)));

        self.close_session(id);

        let mut actions = Vec::new();
        match survivor {
            Some((survivor, dialect)) => {
                info!("{client} left session {id}; notifying {survivor}");
                actions.push(Action::send(survivor, dialect.opponent_left()));
                if dialect == Dialect::Lobby {
                    actions.push(Action::Close { client: survivor });
                }
            }
            None => info!("{client} left session {id}; session removed"),
        }
        actions
    }

    fn close_session(&mut self, id: SessionId) {
        if self.registry.remove(id).is_some() {
            debug!("session {id} removed, {} remaining", self.registry.len());
        }
    }

    /// The client's session, or a logged `None` if it isn't seated.
    fn session_of(&mut self, client: ClientId, what: &str) -> Option<&mut Session> {
        let session = self.registry.find_session_for_mut(client);
        if session.is_none() {
            warn!("{client} sent {what} without a session, ignored");
        }
        session
    }
}

/// Send `signal` to every occupant, each in its own dialect.
fn broadcast(session: &Session, signal: GameSignal, actions: &mut Vec<Action>) {
    for client in session.occupants() {
        let dialect = session.dialect_of(client).unwrap_or(Dialect::Console);
        actions.push(Action::send(client, dialect.signal(signal)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const X: ClientId = ClientId(1);
    const Y: ClientId = ClientId(2);
    const Z: ClientId = ClientId(3);

    fn frame(text: &str) -> Command {
        Command::decode(text.as_bytes()).unwrap()
    }

    fn dispatch(d: &mut Dispatcher, client: ClientId, text: &str) -> Vec<Action> {
        d.handle(client, frame(text)).unwrap()
    }

    /// Flatten sends into `(recipient, wire text)` pairs.
    fn sends(actions: &[Action]) -> Vec<(ClientId, String)> {
        actions
            .iter()
            .filter_map(|a| match a {
                Action::Send { to, command } => Some((*to, command.encode())),
                Action::Close { .. } => None,
            })
            .collect()
    }

    fn paired() -> Dispatcher {
        let mut d = Dispatcher::new();
        dispatch(&mut d, X, "JOIN|P1");
        dispatch(&mut d, Y, "JOIN|P2");
        d
    }

    #[test]
    fn first_join_creates_session_and_assigns_host() {
        let mut d = Dispatcher::new();
        let actions = dispatch(&mut d, X, "JOIN|P1");
        assert_eq!(
            sends(&actions),
            vec![
                (X, "ASSIGN_ROLE|Player1".to_string()),
                (X, "GAME|WAIT".to_string()),
            ]
        );
        let session = d.registry().find_session_for(X).unwrap();
        assert_eq!(session.state(), SessionState::WaitingForSecond);
        assert_eq!(session.player_name(X), Some("P1"));
    }

    #[test]
    fn second_join_assigns_guest_and_readies_both() {
        let mut d = Dispatcher::new();
        dispatch(&mut d, X, "JOIN|P1");
        let actions = dispatch(&mut d, Y, "JOIN|P2");
        assert_eq!(
            sends(&actions),
            vec![
                (Y, "ASSIGN_ROLE|Player2".to_string()),
                (X, "GAME|READY".to_string()),
                (Y, "GAME|READY".to_string()),
            ]
        );
        let session = d.registry().find_session_for(Y).unwrap();
        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(session.occupant(0), Some(X));
        assert_eq!(session.occupant(1), Some(Y));
    }

    #[test]
    fn join_while_seated_is_ignored() {
        let mut d = paired();
        let actions = dispatch(&mut d, X, "JOIN|again");
        assert!(actions.is_empty());
        assert_eq!(d.registry().len(), 1);
    }

    #[test]
    fn role_follows_arrival_not_payload() {
        let mut d = Dispatcher::new();
        let actions = dispatch(&mut d, X, "JOIN|Player2");
        assert_eq!(sends(&actions)[0], (X, "ASSIGN_ROLE|Player1".to_string()));
    }

    #[test]
    fn move_is_relayed_to_opponent_only() {
        let mut d = paired();
        assert_eq!(
            sends(&dispatch(&mut d, X, "MOVE|UP")),
            vec![(Y, "MOVE|UP".to_string())]
        );
        assert_eq!(
            sends(&dispatch(&mut d, Y, "MOVE|DOWN")),
            vec![(X, "MOVE|DOWN".to_string())]
        );
    }

    #[test]
    fn direction_keeps_lobby_token() {
        let mut d = paired();
        assert_eq!(
            sends(&dispatch(&mut d, X, "DIRECTION|LEFT")),
            vec![(Y, "DIRECTION|LEFT".to_string())]
        );
    }

    #[test]
    fn food_position_is_relayed_verbatim() {
        let mut d = paired();
        assert_eq!(
            sends(&dispatch(&mut d, X, "FOOD_POSITION|12_7")),
            vec![(Y, "FOOD_POSITION|12_7".to_string())]
        );
    }

    #[test]
    fn gameplay_payloads_are_relayed_uninterpreted() {
        let mut d = paired();
        assert_eq!(
            sends(&dispatch(&mut d, X, "DIRECTION|MOVE_UP")),
            vec![(Y, "DIRECTION|MOVE_UP".to_string())]
        );
        assert_eq!(
            sends(&dispatch(&mut d, Y, "MOVE|DIAGONAL")),
            vec![(X, "MOVE|DIAGONAL".to_string())]
        );
        assert_eq!(
            sends(&dispatch(&mut d, X, "FOOD_POSITION|here|there")),
            vec![(Y, "FOOD_POSITION|here|there".to_string())]
        );
    }

    #[test]
    fn unknown_lifecycle_signal_is_dropped() {
        let mut d = paired();
        assert!(dispatch(&mut d, X, "GAME|DANCE").is_empty());
    }

    #[test]
    fn lobby_direction_is_relayed() {
        let mut d = Dispatcher::new();
        d.connect(X).unwrap();
        d.connect(Y).unwrap();
        assert_eq!(
            sends(&dispatch(&mut d, X, "DIRECTION|MOVE_UP")),
            vec![(Y, "DIRECTION|MOVE_UP".to_string())]
        );
    }

    #[test]
    fn move_from_unseated_client_is_ignored() {
        let mut d = paired();
        assert!(dispatch(&mut d, Z, "MOVE|UP").is_empty());
    }

    #[test]
    fn move_without_opponent_is_dropped() {
        let mut d = Dispatcher::new();
        dispatch(&mut d, X, "JOIN|P1");
        assert!(dispatch(&mut d, X, "MOVE|UP").is_empty());
    }

    #[test]
    fn host_start_broadcasts_and_enters_game() {
        let mut d = paired();
        let actions = dispatch(&mut d, X, "START|NOW");
        assert_eq!(
            sends(&actions),
            vec![(X, "GAME|START".to_string()), (Y, "GAME|START".to_string())]
        );
        assert_eq!(
            d.registry().find_session_for(X).unwrap().state(),
            SessionState::InGame
        );
    }

    #[test]
    fn guest_start_is_ignored() {
        let mut d = paired();
        assert!(dispatch(&mut d, Y, "START|NOW").is_empty());
        assert!(dispatch(&mut d, Y, "GAMESTATE|PRESS_START").is_empty());
        assert_eq!(
            d.registry().find_session_for(X).unwrap().state(),
            SessionState::Ready
        );
    }

    #[test]
    fn start_before_opponent_arrives_is_ignored() {
        let mut d = Dispatcher::new();
        dispatch(&mut d, X, "JOIN|P1");
        assert!(dispatch(&mut d, X, "START|NOW").is_empty());
    }

    #[test]
    fn start_only_once() {
        let mut d = paired();
        dispatch(&mut d, X, "START|NOW");
        assert!(dispatch(&mut d, X, "START|NOW").is_empty());
    }

    #[test]
    fn game_over_then_restart() {
        let mut d = paired();
        dispatch(&mut d, X, "GAMESTATE|PRESS_START");

        let over = dispatch(&mut d, Y, "GAMESTATE|GAME_OVER");
        assert_eq!(
            sends(&over),
            vec![
                (X, "GAME|GAME_OVER".to_string()),
                (Y, "GAME|GAME_OVER".to_string())
            ]
        );
        assert_eq!(
            d.registry().find_session_for(X).unwrap().state(),
            SessionState::Ready
        );

        let restart = dispatch(&mut d, Y, "GAMESTATE|PRESS_RESTART");
        assert_eq!(sends(&restart).len(), 2);
        assert_eq!(
            d.registry().find_session_for(X).unwrap().state(),
            SessionState::InGame
        );
    }

    #[test]
    fn restart_needs_an_opponent() {
        let mut d = Dispatcher::new();
        dispatch(&mut d, X, "JOIN|P1");
        assert!(dispatch(&mut d, X, "GAMESTATE|PRESS_RESTART").is_empty());
    }

    #[test]
    fn server_only_commands_from_clients_are_ignored() {
        let mut d = paired();
        assert!(dispatch(&mut d, X, "ASSIGN_ROLE|Player2").is_empty());
        assert!(dispatch(&mut d, X, "YOUR_ID|1").is_empty());
        assert!(dispatch(&mut d, X, "END|bye").is_empty());
        assert!(dispatch(&mut d, X, "GAME|READY").is_empty());
        assert_eq!(d.registry().find_session_for(X).unwrap().role_of(X), Some(Role::Player1));
    }

    #[test]
    fn leave_notifies_survivor_and_removes_session() {
        let mut d = paired();
        dispatch(&mut d, X, "START|NOW");
        let old_id = d.registry().find_session_for(X).unwrap().id();

        let actions = dispatch(&mut d, X, "LEAVE|");
        assert_eq!(sends(&actions), vec![(Y, "END|Opponent left".to_string())]);
        assert!(d.registry().is_empty());
        assert!(d.registry().get(old_id).is_none());
        assert!(!d.registry().is_seated(Y));

        // A newcomer gets a brand new session.
        let actions = dispatch(&mut d, Z, "JOIN|P3");
        assert_eq!(sends(&actions)[0], (Z, "ASSIGN_ROLE|Player1".to_string()));
        assert_ne!(d.registry().find_session_for(Z).unwrap().id(), old_id);
    }

    #[test]
    fn survivor_can_join_again() {
        let mut d = paired();
        d.disconnect(Y);
        let actions = dispatch(&mut d, X, "JOIN|P1");
        assert_eq!(sends(&actions)[0], (X, "ASSIGN_ROLE|Player1".to_string()));
    }

    #[test]
    fn lone_host_leaving_is_silent() {
        let mut d = Dispatcher::new();
        dispatch(&mut d, X, "JOIN|P1");
        assert!(d.disconnect(X).is_empty());
        assert!(d.registry().is_empty());
    }

    #[test]
    fn repeated_leave_has_no_effect() {
        let mut d = paired();
        dispatch(&mut d, X, "LEAVE|");
        assert!(dispatch(&mut d, X, "LEAVE|").is_empty());
        assert!(dispatch(&mut d, X, "DISCONNECT|").is_empty());
        assert!(d.disconnect(X).is_empty());
        assert!(d.disconnect(Z).is_empty());
    }

    #[test]
    fn lobby_clients_are_seated_on_connect() {
        let mut d = Dispatcher::new();
        let first = d.connect(X).unwrap();
        assert_eq!(
            sends(&first),
            vec![
                (X, "YOUR_ID|0".to_string()),
                (X, "GAMESTATE|WAIT".to_string())
            ]
        );

        let second = d.connect(Y).unwrap();
        assert_eq!(
            sends(&second),
            vec![
                (Y, "YOUR_ID|1".to_string()),
                (X, "GAMESTATE|READY".to_string()),
                (Y, "GAMESTATE|READY".to_string()),
            ]
        );
    }

    #[test]
    fn lobby_survivor_is_notified_and_closed() {
        let mut d = Dispatcher::new();
        d.connect(X).unwrap();
        d.connect(Y).unwrap();

        let actions = d.disconnect(X);
        assert_eq!(
            actions,
            vec![
                Action::send(Y, Command::game_state(GameSignal::PlayerDisconnected)),
                Action::Close { client: Y },
            ]
        );
    }

    #[test]
    fn mixed_dialects_get_their_own_notifications() {
        let mut d = Dispatcher::new();
        d.connect(X).unwrap();
        let actions = dispatch(&mut d, Y, "JOIN|P2");
        assert_eq!(
            sends(&actions),
            vec![
                (Y, "ASSIGN_ROLE|Player2".to_string()),
                (X, "GAMESTATE|READY".to_string()),
                (Y, "GAME|READY".to_string()),
            ]
        );
    }

    #[test]
    fn pairing_scales_across_many_joins() {
        let mut d = Dispatcher::new();
        for id in 0..10 {
            dispatch(&mut d, ClientId(id), "JOIN|P");
        }
        assert_eq!(d.registry().len(), 5);
        for pair in 0..5u64 {
            let host = ClientId(pair * 2);
            let guest = ClientId(pair * 2 + 1);
            let session = d.registry().find_session_for(host).unwrap();
            assert_eq!(session.occupant(0), Some(host));
            assert_eq!(session.occupant(1), Some(guest));
        }
    }
}
