// Per-client transport endpoints.
//
// `ClientId` is the relay's handle for one connected peer. The listener
// allocates them monotonically; nothing else about a peer (address, socket)
// leaks into the session logic.
//
// `FrameSink` is the write half of a client's channel. The relay thread owns
// one sink per client and is the only writer, so sinks need no locking.
// - `TcpSink`: newline-framed writes on a cloned `TcpStream`. `close` shuts the
//   socket down, which also wakes the client's reader thread with EOF.
// - `UdpSink`: one datagram per command to a fixed peer address over a shared
//   socket. There is no connection to close.

use std::fmt;
use std::io::{self, BufWriter};
use std::net::{Shutdown, SocketAddr, TcpStream, UdpSocket};
use std::sync::Arc;

use snake_relay_protocol::{Command, write_frame};

/// Relay-assigned handle for one connected client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client#{}", self.0)
    }
}

/// Write half of a client connection.
pub trait FrameSink: Send {
    fn send(&mut self, command: &Command) -> io::Result<()>;

    /// Tear the connection down. Further sends may fail.
    fn close(&mut self) {}

    fn peer_addr(&self) -> SocketAddr;
}

pub struct TcpSink {
    writer: BufWriter<TcpStream>,
    peer: SocketAddr,
}

impl TcpSink {
    pub fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            writer: BufWriter::new(stream),
            peer,
        }
    }
}

impl FrameSink for TcpSink {
    fn send(&mut self, command: &Command) -> io::Result<()> {
        write_frame(&mut self.writer, command.encode().as_bytes())
    }

    fn close(&mut self) {
        let _ = self.writer.get_ref().shutdown(Shutdown::Both);
    }

    fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}

pub struct UdpSink {
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
}

impl UdpSink {
    pub fn new(socket: Arc<UdpSocket>, peer: SocketAddr) -> Self {
        Self { socket, peer }
    }
}

impl FrameSink for UdpSink {
    fn send(&mut self, command: &Command) -> io::Result<()> {
        self.socket.send_to(command.encode().as_bytes(), self.peer)?;
        Ok(())
    }

    fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}
