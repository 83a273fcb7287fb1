// Network front end and main event loop for the relay.
//
// Architecture: thread-per-reader with a central `mpsc` channel.
//
// - **Listener thread**: for TCP, a non-blocking `accept()` loop that assigns
//   each connection a `ClientId`, hands its write half to the relay thread as
//   `InternalEvent::NewConnection`, then spawns a reader thread for it. For
//   UDP, a single `recv_from` loop that plays both roles: a datagram from an
//   unseen address registers a new client, and every datagram is one frame.
// - **Reader threads** (TCP, one per client): call `read_frame()` in a loop,
//   decode each frame into a `Command`, and send
//   `InternalEvent::CommandFrom` to the relay thread. On EOF, I/O error, idle
//   timeout, or after forwarding a departure command, send
//   `InternalEvent::Disconnected` and exit.
// - **Relay thread**: owns the `Dispatcher` (and through it the `Registry`)
//   plus every client's `FrameSink`. It applies events one at a time, so each
//   find-or-create and teardown sequence runs to completion before the next
//   event is looked at. No locks are needed around session state.
//
// Frames from one client travel through one channel in order, so relays in a
// single direction are never reordered. Nothing orders the two directions of
// a session relative to each other.
//
// Writes to a TCP client time out after `WRITE_TIMEOUT`. A failed write drops
// that client exactly like a read error would, so a peer that stops reading
// cannot stall the relay thread. A datagram peer is forgotten after it sends
// a departure command; its next datagram registers it as a new client.
//
// Protocol errors are logged at the reader and the frame is dropped; the
// connection stays open. Shutdown: `RelayHandle::stop` clears `keep_running`;
// the relay thread closes every sink (which unblocks the reader threads with
// EOF) and exits, and the listener notices on its next poll.

use std::collections::HashMap;
use std::io::{self, BufReader};
use std::net::{SocketAddr, TcpListener, TcpStream, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error, info, warn};
use snake_relay_protocol::{Command, MAX_FRAME_LEN, ProtocolError, read_frame};

use crate::config::{RelayConfig, TransportKind};
use crate::dispatcher::{Action, Dispatcher};
use crate::error::{RelayError, SessionError};
use crate::transport::{ClientId, FrameSink, TcpSink, UdpSink};

/// How often blocked loops wake up to check `keep_running`.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Longest a write to one TCP client may block the relay thread. A client
/// that stops reading is dropped once its socket buffer stays full this long.
const WRITE_TIMEOUT: Duration = Duration::from_secs(2);

/// Events sent from listener/reader threads to the relay thread.
enum InternalEvent {
    NewConnection {
        client: ClientId,
        sink: Box<dyn FrameSink>,
        seat_on_connect: bool,
    },
    CommandFrom {
        client: ClientId,
        command: Command,
    },
    Disconnected {
        client: ClientId,
    },
}

/// Handle returned by `start_relay` to control the running server.
pub struct RelayHandle {
    keep_running: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
}

impl RelayHandle {
    /// Signal the relay to stop and wait for it to shut down.
    pub fn stop(self) {
        self.keep_running.store(false, Ordering::SeqCst);
        for thread in self.threads {
            let _ = thread.join();
        }
    }
}

/// Start the relay on background threads. Returns a handle for stopping it
/// and the actual bound address (useful when port 0 is used to let the OS
/// pick a free port).
pub fn start_relay(config: RelayConfig) -> Result<(RelayHandle, SocketAddr), RelayError> {
    let listen_addr = config.listen_addr()?;
    let keep_running = Arc::new(AtomicBool::new(true));
    let (tx, rx): (Sender<InternalEvent>, Receiver<InternalEvent>) = mpsc::channel();

    let (listener_thread, local_addr) = match config.transport {
        TransportKind::Tcp => {
            let listener = TcpListener::bind(listen_addr)?;
            let local_addr = listener.local_addr()?;
            // Non-blocking so the accept loop can check keep_running.
            listener.set_nonblocking(true)?;
            let options = TcpOptions {
                seat_on_connect: config.auto_join,
                idle_timeout: config.idle_timeout(),
            };
            let keep_running = keep_running.clone();
            let thread = thread::spawn(move || accept_loop(listener, options, tx, keep_running));
            (thread, local_addr)
        }
        TransportKind::Udp => {
            let socket = UdpSocket::bind(listen_addr)?;
            let local_addr = socket.local_addr()?;
            socket.set_read_timeout(Some(POLL_INTERVAL))?;
            let keep_running = keep_running.clone();
            let socket = Arc::new(socket);
            let thread = thread::spawn(move || datagram_loop(socket, tx, keep_running));
            (thread, local_addr)
        }
    };
    info!(
        "relay listening on {local_addr} ({:?}, auto_join={})",
        config.transport, config.auto_join
    );

    let keep_running_relay = keep_running.clone();
    let relay_thread = thread::spawn(move || run_relay(rx, keep_running_relay));

    Ok((
        RelayHandle {
            keep_running,
            threads: vec![relay_thread, listener_thread],
        },
        local_addr,
    ))
}

/// Relay thread: apply events until stopped or every sender is gone.
fn run_relay(rx: Receiver<InternalEvent>, keep_running: Arc<AtomicBool>) {
    let mut relay = Relay::default();

    while keep_running.load(Ordering::SeqCst) {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(event) => {
                relay.handle_event(event);
                // Drain any additional events that arrived during handling.
                while let Ok(event) = rx.try_recv() {
                    relay.handle_event(event);
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    relay.shutdown();
}

/// State owned by the relay thread.
#[derive(Default)]
struct Relay {
    dispatcher: Dispatcher,
    sinks: HashMap<ClientId, Box<dyn FrameSink>>,
}

impl Relay {
    fn handle_event(&mut self, event: InternalEvent) {
        match event {
            InternalEvent::NewConnection {
                client,
                sink,
                seat_on_connect,
            } => {
                info!("{client} connected from {}", sink.peer_addr());
                self.sinks.insert(client, sink);
                if seat_on_connect {
                    let result = self.dispatcher.connect(client);
                    self.apply(client, result);
                }
            }
            InternalEvent::CommandFrom { client, command } => {
                debug!("{client} -> {command}");
                let result = self.dispatcher.handle(client, command);
                self.apply(client, result);
            }
            InternalEvent::Disconnected { client } => {
                let actions = self.dispatcher.disconnect(client);
                self.perform(actions);
                self.drop_client(client);
                info!("{client} disconnected");
            }
        }
    }

    /// Carry out dispatch results. A capacity error means session state
    /// would be corrupted by going on, so the client is dropped instead.
    fn apply(&mut self, client: ClientId, result: Result<Vec<Action>, SessionError>) {
        match result {
            Ok(actions) => self.perform(actions),
            Err(e) => {
                error!("{client}: {e}; dropping connection");
                let actions = self.dispatcher.disconnect(client);
                self.perform(actions);
                self.drop_client(client);
            }
        }
    }

    /// A failed send counts as that client's transport failing: it is
    /// dropped and its session torn down like on `LEAVE`.
    fn perform(&mut self, actions: Vec<Action>) {
        let mut failed = Vec::new();
        for action in actions {
            match action {
                Action::Send { to, command } => {
                    let Some(sink) = self.sinks.get_mut(&to) else {
                        debug!("{to} has no connection, {command} dropped");
                        continue;
                    };
                    if let Err(e) = sink.send(&command) {
                        warn!("send {command} to {to} failed: {e}; dropping connection");
                        self.drop_client(to);
                        failed.push(to);
                    }
                }
                Action::Close { client } => self.drop_client(client),
            }
        }
        for client in failed {
            let actions = self.dispatcher.disconnect(client);
            self.perform(actions);
        }
    }

    fn drop_client(&mut self, client: ClientId) {
        if let Some(mut sink) = self.sinks.remove(&client) {
            sink.close();
        }
    }

    fn shutdown(&mut self) {
        info!("relay shutting down, closing {} connections", self.sinks.len());
        for (_, mut sink) in self.sinks.drain() {
            sink.close();
        }
    }
}

#[derive(Clone, Copy)]
struct TcpOptions {
    seat_on_connect: bool,
    idle_timeout: Option<Duration>,
}

/// Listener thread for TCP: accept connections until stopped.
fn accept_loop(
    listener: TcpListener,
    options: TcpOptions,
    tx: Sender<InternalEvent>,
    keep_running: Arc<AtomicBool>,
) {
    let mut next_id = 0u64;
    while keep_running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                let client = ClientId(next_id);
                next_id += 1;
                if let Err(e) = register_stream(stream, peer, client, options, &tx, &keep_running) {
                    warn!("failed to set up connection from {peer}: {e}");
                }
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(POLL_INTERVAL);
            }
            Err(e) => {
                error!("accept failed: {e}; listener stopped");
                break;
            }
        }
    }
}

/// Hand the write half to the relay thread and spawn the reader thread.
fn register_stream(
    stream: TcpStream,
    peer: SocketAddr,
    client: ClientId,
    options: TcpOptions,
    tx: &Sender<InternalEvent>,
    keep_running: &Arc<AtomicBool>,
) -> io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(options.idle_timeout)?;
    let write_stream = stream.try_clone()?;
    write_stream.set_write_timeout(Some(WRITE_TIMEOUT))?;

    // Sent before the reader exists, so it always precedes the client's
    // first command in the channel.
    let event = InternalEvent::NewConnection {
        client,
        sink: Box::new(TcpSink::new(write_stream, peer)),
        seat_on_connect: options.seat_on_connect,
    };
    if tx.send(event).is_err() {
        return Ok(());
    }

    let tx_reader = tx.clone();
    let keep_running_reader = keep_running.clone();
    thread::spawn(move || {
        reader_loop(BufReader::new(stream), client, tx_reader, keep_running_reader);
    });
    Ok(())
}

/// Reader loop for a single TCP client. Runs in its own thread.
fn reader_loop(
    mut reader: BufReader<TcpStream>,
    client: ClientId,
    tx: Sender<InternalEvent>,
    keep_running: Arc<AtomicBool>,
) {
    while keep_running.load(Ordering::SeqCst) {
        match read_frame(&mut reader) {
            Ok(frame) => match Command::decode(&frame) {
                Ok(command) => {
                    let departing = command.kind.is_departure();
                    if tx.send(InternalEvent::CommandFrom { client, command }).is_err() {
                        return; // Relay thread is gone.
                    }
                    if departing {
                        break;
                    }
                }
                Err(e) => log_protocol_error(client, &e),
            },
            Err(e) => {
                match e.kind() {
                    io::ErrorKind::UnexpectedEof => debug!("{client} closed the connection"),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => {
                        info!("{client} idle timeout");
                    }
                    _ => debug!("{client} read failed: {e}"),
                }
                break;
            }
        }
    }
    let _ = tx.send(InternalEvent::Disconnected { client });
}

/// Address book for datagram peers. An address keeps its `ClientId` until
/// the peer departs; its next datagram then registers a fresh client.
#[derive(Default)]
struct DatagramPeers {
    clients: HashMap<SocketAddr, ClientId>,
    next_id: u64,
}

impl DatagramPeers {
    /// The client for `peer`, and whether it was just registered.
    fn client_for(&mut self, peer: SocketAddr) -> (ClientId, bool) {
        if let Some(client) = self.clients.get(&peer) {
            return (*client, false);
        }
        let client = ClientId(self.next_id);
        self.next_id += 1;
        self.clients.insert(peer, client);
        (client, true)
    }

    fn forget(&mut self, peer: SocketAddr) -> Option<ClientId> {
        self.clients.remove(&peer)
    }

    fn len(&self) -> usize {
        self.clients.len()
    }
}

/// Listener thread for UDP: every datagram is one frame.
fn datagram_loop(socket: Arc<UdpSocket>, tx: Sender<InternalEvent>, keep_running: Arc<AtomicBool>) {
    let mut peers = DatagramPeers::default();
    // One spare byte for a trailing newline some senders append.
    let mut buf = vec![0u8; MAX_FRAME_LEN + 1];

    while keep_running.load(Ordering::SeqCst) {
        let (len, peer) = match socket.recv_from(&mut buf) {
            Ok(received) => received,
            Err(ref e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                ) =>
            {
                continue;
            }
            Err(e) => {
                // ICMP unreachable from an earlier send can surface here on
                // some platforms; it doesn't affect the socket.
                debug!("recv_from failed: {e}");
                continue;
            }
        };

        let (client, registered) = peers.client_for(peer);
        if registered {
            let event = InternalEvent::NewConnection {
                client,
                sink: Box::new(UdpSink::new(socket.clone(), peer)),
                seat_on_connect: false,
            };
            if tx.send(event).is_err() {
                return;
            }
        }

        match Command::decode(&buf[..len]) {
            Ok(command) => {
                let departing = command.kind.is_departure();
                if tx.send(InternalEvent::CommandFrom { client, command }).is_err() {
                    return;
                }
                // Same teardown as a stream reader ending after a departure.
                if departing {
                    peers.forget(peer);
                    if tx.send(InternalEvent::Disconnected { client }).is_err() {
                        return;
                    }
                    debug!("{peer} forgotten, {} datagram peers left", peers.len());
                }
            }
            Err(e) => log_protocol_error(client, &e),
        }
    }
}

fn log_protocol_error(client: ClientId, err: &ProtocolError) {
    match err {
        ProtocolError::UnknownKind(kind) => warn!("{client} sent unknown command {kind:?}, ignored"),
        other => debug!("{client}: {other}, frame dropped"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    const X: ClientId = ClientId(1);
    const Y: ClientId = ClientId(2);
    const Z: ClientId = ClientId(3);

    /// Records what the relay writes; `broken` sinks fail every send.
    struct TestSink {
        sent: Arc<Mutex<Vec<String>>>,
        closed: Arc<AtomicBool>,
        broken: bool,
    }

    impl FrameSink for TestSink {
        fn send(&mut self, command: &Command) -> io::Result<()> {
            if self.broken {
                return Err(io::Error::new(io::ErrorKind::WouldBlock, "send buffer full"));
            }
            self.sent.lock().unwrap().push(command.encode());
            Ok(())
        }

        fn close(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
        }

        fn peer_addr(&self) -> SocketAddr {
            SocketAddr::from(([127, 0, 0, 1], 9))
        }
    }

    struct Endpoint {
        sent: Arc<Mutex<Vec<String>>>,
        closed: Arc<AtomicBool>,
    }

    impl Endpoint {
        fn sent(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }
    }

    fn attach(relay: &mut Relay, client: ClientId, broken: bool) -> Endpoint {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        relay.handle_event(InternalEvent::NewConnection {
            client,
            sink: Box::new(TestSink {
                sent: sent.clone(),
                closed: closed.clone(),
                broken,
            }),
            seat_on_connect: false,
        });
        Endpoint { sent, closed }
    }

    fn command(relay: &mut Relay, client: ClientId, text: &str) {
        let command = Command::decode(text.as_bytes()).unwrap();
        relay.handle_event(InternalEvent::CommandFrom { client, command });
    }

    #[test]
    fn failed_send_drops_client_and_ends_its_session() {
        let mut relay = Relay::default();
        let x = attach(&mut relay, X, false);
        let y = attach(&mut relay, Y, true);

        command(&mut relay, X, "JOIN|P1");
        command(&mut relay, Y, "JOIN|P2");

        assert_eq!(
            x.sent(),
            vec![
                "ASSIGN_ROLE|Player1",
                "GAME|WAIT",
                "GAME|READY",
                "END|Opponent left",
            ]
        );
        assert!(y.closed.load(Ordering::SeqCst));
        assert!(!relay.sinks.contains_key(&Y));
        assert!(relay.sinks.contains_key(&X));
        assert!(relay.dispatcher.registry().is_empty());

        // The survivor's later moves go nowhere and nothing breaks.
        command(&mut relay, X, "MOVE|UP");
        assert_eq!(x.sent().len(), 4);
    }

    #[test]
    fn departed_client_releases_its_sink() {
        let mut relay = Relay::default();
        let x = attach(&mut relay, X, false);
        let _y = attach(&mut relay, Y, false);
        command(&mut relay, X, "JOIN|P1");
        command(&mut relay, Y, "JOIN|P2");

        command(&mut relay, Y, "LEAVE|");
        relay.handle_event(InternalEvent::Disconnected { client: Y });
        assert_eq!(relay.sinks.len(), 1);
        assert_eq!(x.sent().last().map(String::as_str), Some("END|Opponent left"));

        // The same peer coming back under a new id joins normally.
        let z = attach(&mut relay, Z, false);
        command(&mut relay, Z, "JOIN|P2");
        assert_eq!(z.sent(), vec!["ASSIGN_ROLE|Player1", "GAME|WAIT"]);
        assert_eq!(relay.sinks.len(), 2);
    }

    #[test]
    fn datagram_peers_are_forgotten_after_departure() {
        let mut peers = DatagramPeers::default();
        let a = SocketAddr::from(([127, 0, 0, 1], 4000));
        let b = SocketAddr::from(([127, 0, 0, 1], 4001));

        let (first, registered) = peers.client_for(a);
        assert!(registered);
        assert_eq!(peers.client_for(a), (first, false));
        let (other, _) = peers.client_for(b);
        assert_ne!(first, other);

        assert_eq!(peers.forget(a), Some(first));
        assert_eq!(peers.len(), 1);
        let (again, registered) = peers.client_for(a);
        assert!(registered);
        assert_ne!(again, first);
        assert_eq!(peers.len(), 2);

        // Repeated join/leave cycles don't grow the table.
        for _ in 0..10 {
            peers.forget(a);
            peers.client_for(a);
        }
        assert_eq!(peers.len(), 2);
    }
}
