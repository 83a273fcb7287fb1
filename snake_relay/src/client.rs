// TCP client for connecting to the snake relay.
//
// Provides a non-blocking interface for a game front end's main loop.
// Architecture:
// - `connect()` opens the TCP connection on the calling thread, then spawns a
//   background reader thread.
// - The reader thread calls `read_frame()` in a loop, decodes each frame into
//   a `ClientEvent`, and pushes it into an `mpsc` channel. When the connection
//   ends it pushes a final `ClientEvent::ConnectionClosed`.
// - The main thread holds a `BufWriter<TcpStream>` for sending.
// - `poll()` drains the inbox non-blocking; `dispatch()` does the same and
//   routes each event to a `SessionListener`.
//
// The client speaks whichever dialect the server uses for it: `ASSIGN_ROLE`
// and `YOUR_ID` both surface as seat events, `GAME` and `GAMESTATE` both as
// state changes, `MOVE` and `DIRECTION` both as opponent turns.

use std::io::{self, BufReader, BufWriter};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::debug;
use snake_relay_protocol::{
    Command, CommandKind, Direction, FoodPosition, GameSignal, ProtocolError, Role, read_frame,
    write_frame,
};

/// A server notification, decoded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientEvent {
    /// `ASSIGN_ROLE|Player1` / `ASSIGN_ROLE|Player2`.
    RoleAssigned(Role),
    /// `YOUR_ID|n` (lobby dialect).
    SlotAssigned(usize),
    OpponentDirection(Direction),
    FoodPosition(FoodPosition),
    /// `GAME|…` or `GAMESTATE|…`, except the disconnect notice.
    StateChanged(GameSignal),
    /// `END|reason` or `GAMESTATE|PLAYER_DISCONNECTED`.
    SessionEnded(String),
    /// The connection to the relay is gone. Always the last event.
    ConnectionClosed,
}

impl ClientEvent {
    /// Interpret a command received from the relay. Commands a server never
    /// sends yield `Ok(None)`.
    pub fn from_command(command: &Command) -> Result<Option<Self>, ProtocolError> {
        let event = match command.kind {
            CommandKind::AssignRole => ClientEvent::RoleAssigned(command.payload_as()?),
            CommandKind::YourId => {
                let slot = command
                    .payload
                    .trim()
                    .parse()
                    .map_err(|_| ProtocolError::invalid_payload("slot", &command.payload))?;
                ClientEvent::SlotAssigned(slot)
            }
            CommandKind::Move | CommandKind::Direction => {
                ClientEvent::OpponentDirection(command.payload_as()?)
            }
            CommandKind::FoodPosition => ClientEvent::FoodPosition(command.payload_as()?),
            CommandKind::Game | CommandKind::GameState => match command.payload_as()? {
                GameSignal::PlayerDisconnected => {
                    ClientEvent::SessionEnded(GameSignal::PlayerDisconnected.to_string())
                }
                signal => ClientEvent::StateChanged(signal),
            },
            CommandKind::End => ClientEvent::SessionEnded(command.payload.clone()),
            CommandKind::Join
            | CommandKind::Start
            | CommandKind::Leave
            | CommandKind::Disconnect => return Ok(None),
        };
        Ok(Some(event))
    }

    /// Invoke the matching listener callback.
    pub fn deliver(self, listener: &mut impl SessionListener) {
        match self {
            ClientEvent::RoleAssigned(role) => listener.on_role_assigned(role),
            ClientEvent::SlotAssigned(slot) => listener.on_slot_assigned(slot),
            ClientEvent::OpponentDirection(direction) => listener.on_opponent_direction(direction),
            ClientEvent::FoodPosition(position) => listener.on_food_position(position),
            ClientEvent::StateChanged(signal) => listener.on_session_state_changed(signal),
            ClientEvent::SessionEnded(reason) => listener.on_session_ended(&reason),
            ClientEvent::ConnectionClosed => listener.on_connection_closed(),
        }
    }
}

/// Callbacks for game front ends. Every method defaults to doing nothing.
pub trait SessionListener {
    fn on_role_assigned(&mut self, _role: Role) {}
    fn on_slot_assigned(&mut self, _slot: usize) {}
    fn on_opponent_direction(&mut self, _direction: Direction) {}
    fn on_session_state_changed(&mut self, _signal: GameSignal) {}
    fn on_food_position(&mut self, _position: FoodPosition) {}
    fn on_session_ended(&mut self, _reason: &str) {}
    fn on_connection_closed(&mut self) {}
}

/// TCP client for relay communication.
pub struct NetClient {
    writer: BufWriter<TcpStream>,
    inbox: Receiver<ClientEvent>,
    _reader_thread: JoinHandle<()>,
}

impl NetClient {
    /// Connect to a relay server and spawn the reader thread. Nothing is sent;
    /// on a lobby relay the seat notification arrives by itself, otherwise
    /// call `send_join`.
    pub fn connect(addr: impl ToSocketAddrs) -> io::Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        let reader = BufReader::new(stream.try_clone()?);

        let (tx, rx) = mpsc::channel();
        let reader_thread = thread::spawn(move || reader_loop(reader, tx));

        Ok(Self {
            writer: BufWriter::new(stream),
            inbox: rx,
            _reader_thread: reader_thread,
        })
    }

    pub fn send_join(&mut self, player_name: &str) -> io::Result<()> {
        self.send(&Command::join(player_name))
    }

    pub fn send_direction(&mut self, direction: Direction) -> io::Result<()> {
        self.send(&Command::movement(direction))
    }

    pub fn send_food_position(&mut self, position: FoodPosition) -> io::Result<()> {
        self.send(&Command::food_position(position))
    }

    /// Ask to start the game (host only; ignored by the relay otherwise).
    pub fn send_start(&mut self) -> io::Result<()> {
        self.send(&Command::start())
    }

    pub fn send_game_over(&mut self) -> io::Result<()> {
        self.send(&Command::game(GameSignal::GameOver))
    }

    pub fn send_restart(&mut self) -> io::Result<()> {
        self.send(&Command::game(GameSignal::PressRestart))
    }

    /// Leave the session. The relay closes the connection afterwards.
    pub fn send_leave(&mut self) -> io::Result<()> {
        self.send(&Command::leave())
    }

    /// Send any command as-is.
    pub fn send(&mut self, command: &Command) -> io::Result<()> {
        write_frame(&mut self.writer, command.encode().as_bytes())
    }

    /// Close the connection. The relay treats this like a `LEAVE`.
    pub fn disconnect(&mut self) {
        let _ = self.writer.get_ref().shutdown(Shutdown::Both);
    }

    /// Drain all queued events (non-blocking).
    pub fn poll(&self) -> Vec<ClientEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.inbox.try_recv() {
            events.push(event);
        }
        events
    }

    /// Wait up to `timeout` for the next event.
    pub fn next_event(&self, timeout: Duration) -> Option<ClientEvent> {
        self.inbox.recv_timeout(timeout).ok()
    }

    /// Drain queued events into `listener`. Returns how many were delivered.
    pub fn dispatch(&self, listener: &mut impl SessionListener) -> usize {
        let events = self.poll();
        let count = events.len();
        for event in events {
            event.deliver(listener);
        }
        count
    }
}

/// Reader thread: read frames in a loop, push decoded events to the channel.
fn reader_loop(mut reader: BufReader<TcpStream>, tx: Sender<ClientEvent>) {
    while let Ok(frame) = read_frame(&mut reader) {
        let event = Command::decode(&frame).and_then(|command| ClientEvent::from_command(&command));
        match event {
            Ok(Some(event)) => {
                if tx.send(event).is_err() {
                    return; // Main thread dropped the receiver.
                }
            }
            Ok(None) => {}
            Err(e) => debug!("ignoring relay frame: {e}"),
        }
    }
    let _ = tx.send(ClientEvent::ConnectionClosed);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(text: &str) -> Option<ClientEvent> {
        let command = Command::decode(text.as_bytes()).unwrap();
        ClientEvent::from_command(&command).unwrap()
    }

    #[test]
    fn both_dialects_map_to_the_same_events() {
        assert_eq!(
            event("ASSIGN_ROLE|Player2"),
            Some(ClientEvent::RoleAssigned(Role::Player2))
        );
        assert_eq!(event("YOUR_ID|1"), Some(ClientEvent::SlotAssigned(1)));
        assert_eq!(
            event("GAME|READY"),
            Some(ClientEvent::StateChanged(GameSignal::Ready))
        );
        assert_eq!(
            event("GAMESTATE|READY"),
            Some(ClientEvent::StateChanged(GameSignal::Ready))
        );
        assert_eq!(
            event("MOVE|LEFT"),
            Some(ClientEvent::OpponentDirection(Direction::Left))
        );
        assert_eq!(
            event("DIRECTION|LEFT"),
            Some(ClientEvent::OpponentDirection(Direction::Left))
        );
        assert_eq!(
            event("DIRECTION|MOVE_UP"),
            Some(ClientEvent::OpponentDirection(Direction::Up))
        );
    }

    #[test]
    fn departure_notices_end_the_session() {
        assert_eq!(
            event("END|Opponent left"),
            Some(ClientEvent::SessionEnded("Opponent left".into()))
        );
        assert!(matches!(
            event("GAMESTATE|PLAYER_DISCONNECTED"),
            Some(ClientEvent::SessionEnded(_))
        ));
    }

    #[test]
    fn client_to_server_kinds_are_not_events() {
        assert_eq!(event("JOIN|Alice"), None);
        assert_eq!(event("LEAVE|"), None);
        assert_eq!(event("START|NOW"), None);
    }

    #[test]
    fn bad_payloads_are_errors() {
        let command = Command::decode(b"YOUR_ID|two").unwrap();
        assert!(ClientEvent::from_command(&command).is_err());
        let command = Command::decode(b"FOOD_POSITION|3").unwrap();
        assert!(ClientEvent::from_command(&command).is_err());
    }

    #[derive(Default)]
    struct Recorder {
        calls: Vec<String>,
    }

    impl SessionListener for Recorder {
        fn on_role_assigned(&mut self, role: Role) {
            self.calls.push(format!("role {role}"));
        }
        fn on_food_position(&mut self, position: FoodPosition) {
            self.calls.push(format!("food {position}"));
        }
        fn on_session_ended(&mut self, reason: &str) {
            self.calls.push(format!("ended {reason}"));
        }
    }

    #[test]
    fn deliver_routes_to_listener() {
        let mut recorder = Recorder::default();
        ClientEvent::RoleAssigned(Role::Player1).deliver(&mut recorder);
        ClientEvent::FoodPosition(FoodPosition { x: 3, y: 9 }).deliver(&mut recorder);
        // No override: default no-op.
        ClientEvent::StateChanged(GameSignal::Wait).deliver(&mut recorder);
        ClientEvent::SessionEnded("Opponent left".into()).deliver(&mut recorder);
        assert_eq!(
            recorder.calls,
            vec!["role Player1", "food 3_9", "ended Opponent left"]
        );
    }
}
