//! Benchmark session: socket ownership and lifecycle.
//!
//! A session moves through
//!
//! ```text
//! Uninitialized --init--> Initialized --listen/connect--> Connected
//!       ^                                                     |
//!       +------------------------- quit ----------------------+
//! ```
//!
//! The listener passes through `Listening` while blocked in accept. Every
//! failed operation leaves the session in the state it started from, except
//! a failed accept or connect, which leaves it initialized; `quit` is
//! always the way out.

use std::fmt;
use std::net::{Shutdown, SocketAddr};

use socket2::Socket;
use tracing::{debug, info, warn};

use crate::buffer::ByteBuffer;
use crate::error::{BenchError, Result};
use crate::protocol::TransferReport;
use crate::role::Role;
use crate::transport;

/// Largest chunk the session will move in one call.
pub const MAX_BUFFER: usize = 1000;

/// Well-known application port.
pub const APP_PORT: u16 = 2424;

/// Bytes of the payload buffer shown in debug logs.
const PREVIEW_LEN: usize = 16;

/// Addresses used to establish the connection.
#[derive(Debug, Clone)]
pub struct Endpoints {
    /// Listener bind address.
    pub bind: SocketAddr,
    /// Connector target.
    pub peer: SocketAddr,
    /// Listen backlog.
    pub backlog: i32,
}

/// Coarse session state, derived from the handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No socket allocated.
    Uninitialized,
    /// Socket allocated, not bound or connected.
    Initialized,
    /// Bound and listening, no peer yet.
    Listening,
    /// Peer connection established.
    Connected,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Initialized => "initialized",
            SessionState::Listening => "listening",
            SessionState::Connected => "connected",
        };
        f.write_str(name)
    }
}

/// Result of a successful `init`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitOutcome {
    /// Buffer size now in effect.
    pub buffer_size: usize,
    /// The requested size was above `MAX_BUFFER` and was lowered.
    pub clamped: bool,
}

/// One benchmark participant.
pub struct Session {
    role: Role,
    endpoints: Endpoints,
    /// Listening socket (listener) or connecting socket (connector).
    listening: Option<Socket>,
    /// The listening socket has been bound.
    bound: bool,
    /// Accepted or connected data socket.
    peer: Option<Socket>,
    buffer_size: usize,
    buffer: ByteBuffer,
}

impl Session {
    pub fn new(role: Role, endpoints: Endpoints) -> Self {
        Self {
            role,
            endpoints,
            listening: None,
            bound: false,
            peer: None,
            buffer_size: MAX_BUFFER,
            buffer: ByteBuffer::new(MAX_BUFFER, role.sentinel()),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn state(&self) -> SessionState {
        match (&self.listening, &self.peer) {
            (None, _) => SessionState::Uninitialized,
            (Some(_), Some(_)) => SessionState::Connected,
            (Some(_), None) if self.bound => SessionState::Listening,
            (Some(_), None) => SessionState::Initialized,
        }
    }

    /// Allocate the session socket and set the buffer size.
    ///
    /// Sizes above `MAX_BUFFER` are clamped; `None` selects `MAX_BUFFER`.
    pub fn init(&mut self, requested: Option<i64>) -> Result<InitOutcome> {
        if self.peer.is_some() {
            return Err(BenchError::AlreadyConnected);
        }
        if self.listening.is_some() {
            return Err(BenchError::AlreadyInitialized);
        }

        let (buffer_size, clamped) = match requested {
            None => (MAX_BUFFER, false),
            Some(n) if n <= 0 => return Err(BenchError::InvalidBufferSize(n)),
            Some(n) if n as u64 > MAX_BUFFER as u64 => {
                warn!(requested = n, max = MAX_BUFFER, "Buffer size clamped");
                (MAX_BUFFER, true)
            }
            Some(n) => (n as usize, false),
        };

        let addr = match self.role {
            Role::Listener => self.endpoints.bind,
            Role::Connector => self.endpoints.peer,
        };
        let socket = transport::open_socket(&addr)?;

        self.listening = Some(socket);
        self.bound = false;
        self.buffer_size = buffer_size;
        self.buffer.reset();

        info!(role = %self.role, buffer_size, "Session initialized");
        debug!(
            sentinel = %char::from(self.buffer.sentinel()),
            preview = %self.buffer.preview(PREVIEW_LEN),
            "Buffer filled"
        );

        Ok(InitOutcome {
            buffer_size,
            clamped,
        })
    }

    /// Bind and listen without accepting. Returns the bound address.
    ///
    /// `listen` does this itself; calling it first lets a caller learn an
    /// ephemeral port before blocking in accept.
    pub fn bind_and_listen(&mut self) -> Result<Option<SocketAddr>> {
        self.require_role(Role::Listener, "listen")?;
        let socket = self.listening.as_ref().ok_or(BenchError::NotInitialized)?;
        if self.peer.is_some() {
            return Err(BenchError::AlreadyConnected);
        }

        if !self.bound {
            transport::bind_and_listen(socket, &self.endpoints.bind, self.endpoints.backlog)?;
            self.bound = true;
        }

        let local = transport::local_addr(socket)?;
        info!(addr = ?local, backlog = self.endpoints.backlog, "Listening");
        Ok(local)
    }

    /// Bind if needed, then block until a peer connects.
    ///
    /// There is no timeout.
    pub fn listen(&mut self) -> Result<Option<SocketAddr>> {
        self.bind_and_listen()?;
        let socket = self.listening.as_ref().ok_or(BenchError::NotInitialized)?;

        info!("Waiting for connection");
        let (conn, peer_addr) = transport::accept(socket)?;
        self.peer = Some(conn);

        info!(peer = ?peer_addr, "Accepted connection");
        Ok(peer_addr)
    }

    /// Connect to the configured peer.
    pub fn connect(&mut self) -> Result<SocketAddr> {
        self.require_role(Role::Connector, "connect")?;
        let socket = self.listening.as_ref().ok_or(BenchError::NotInitialized)?;
        if self.peer.is_some() {
            return Err(BenchError::AlreadyConnected);
        }

        let target = self.endpoints.peer;
        info!(peer = %target, "Connecting");
        transport::connect(socket, &target)?;

        let conn = socket
            .try_clone()
            .map_err(|source| BenchError::ResourceExhausted { source })?;
        self.peer = Some(conn);

        info!(peer = %target, "Connected");
        Ok(target)
    }

    /// Send a benchmark payload (connector).
    pub fn benchmark_send(&mut self, total_bytes: Option<i64>) -> Result<TransferReport> {
        self.require_role(Role::Connector, "benchmark_send")?;
        self.benchmark(total_bytes)
    }

    /// Receive a benchmark payload (listener).
    pub fn benchmark_recv(&mut self) -> Result<TransferReport> {
        self.require_role(Role::Listener, "benchmark_recv")?;
        self.benchmark(None)
    }

    /// Run this role's half of the protocol over the peer connection.
    pub fn benchmark(&mut self, total_bytes: Option<i64>) -> Result<TransferReport> {
        if self.listening.is_none() {
            return Err(BenchError::NotInitialized);
        }
        let peer = self.peer.as_mut().ok_or(BenchError::NotConnected)?;

        let mut protocol = self.role.protocol(total_bytes)?;
        if self.role == Role::Connector {
            self.buffer.reset();
        }
        debug!(role = %protocol.role(), buffer_size = self.buffer_size, "Benchmark starting");

        let result = protocol.run(peer, &mut self.buffer, self.buffer_size);
        match &result {
            Ok(report) => info!(
                total_bytes = report.total_bytes,
                chunk_size = report.chunk_size,
                chunks = report.chunks,
                "Benchmark finished"
            ),
            Err(e) => warn!(error = %e, phase = ?protocol.phase(), "Benchmark failed"),
        }
        result
    }

    /// Close the peer handle, then the session socket.
    pub fn quit(&mut self) -> Result<()> {
        if self.listening.is_none() {
            return Err(BenchError::NotInitialized);
        }

        if let Some(peer) = self.peer.take() {
            if let Err(e) = peer.shutdown(Shutdown::Both) {
                debug!(error = %e, "Peer shutdown failed");
            }
            drop(peer);
        }
        self.listening = None;
        self.bound = false;

        info!("Session closed");
        Ok(())
    }

    fn require_role(&self, role: Role, operation: &'static str) -> Result<()> {
        if self.role == role {
            Ok(())
        } else {
            Err(BenchError::UnsupportedForRole {
                operation,
                role: self.role,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::wire::{decode, encode, WORD_LEN};
    use crate::protocol::Goodput;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    fn endpoints(peer: SocketAddr) -> Endpoints {
        Endpoints {
            bind: "127.0.0.1:0".parse().unwrap(),
            peer,
            backlog: 1,
        }
    }

    fn listener() -> Session {
        Session::new(Role::Listener, endpoints("127.0.0.1:1".parse().unwrap()))
    }

    fn connector(peer: SocketAddr) -> Session {
        Session::new(Role::Connector, endpoints(peer))
    }

    /// Start a listener session on an ephemeral port. The thread accepts,
    /// runs one receive, and quits.
    fn spawn_receiver(
        buffer_size: Option<i64>,
    ) -> (SocketAddr, thread::JoinHandle<Result<TransferReport>>) {
        let mut session = listener();
        session.init(buffer_size).unwrap();
        let addr = session.bind_and_listen().unwrap().unwrap();
        assert_eq!(session.state(), SessionState::Listening);

        let handle = thread::spawn(move || {
            session.listen()?;
            let report = session.benchmark_recv();
            session.quit()?;
            report
        });
        (addr, handle)
    }

    #[test]
    fn test_init_rejects_non_positive_size() {
        let mut session = listener();
        assert!(matches!(
            session.init(Some(0)),
            Err(BenchError::InvalidBufferSize(0))
        ));
        assert!(matches!(
            session.init(Some(-4)),
            Err(BenchError::InvalidBufferSize(-4))
        ));
        assert_eq!(session.state(), SessionState::Uninitialized);
    }

    #[test]
    fn test_init_clamps_large_size() {
        let mut session = listener();
        let outcome = session.init(Some(5000)).unwrap();
        assert_eq!(
            outcome,
            InitOutcome {
                buffer_size: MAX_BUFFER,
                clamped: true
            }
        );
        assert_eq!(session.buffer_size(), MAX_BUFFER);
    }

    #[test]
    fn test_init_accepts_valid_sizes() {
        let mut session = listener();
        for size in [1, 2, 500, MAX_BUFFER as i64 - 1, MAX_BUFFER as i64] {
            let outcome = session.init(Some(size)).unwrap();
            assert_eq!(outcome.buffer_size, size as usize);
            assert!(!outcome.clamped);
            session.quit().unwrap();
        }
        assert_eq!(session.init(None).unwrap().buffer_size, MAX_BUFFER);
    }

    #[test]
    fn test_double_init() {
        let mut session = listener();
        session.init(Some(100)).unwrap();
        assert!(matches!(
            session.init(Some(200)),
            Err(BenchError::AlreadyInitialized)
        ));
        assert_eq!(session.buffer_size(), 100);
        assert_eq!(session.state(), SessionState::Initialized);
    }

    #[test]
    fn test_quit_without_init() {
        let mut session = listener();
        assert!(matches!(session.quit(), Err(BenchError::NotInitialized)));
        assert_eq!(session.state(), SessionState::Uninitialized);
    }

    #[test]
    fn test_quit_is_single_use() {
        let mut session = listener();
        session.init(None).unwrap();
        session.quit().unwrap();
        assert!(matches!(session.quit(), Err(BenchError::NotInitialized)));
    }

    #[test]
    fn test_operations_need_init() {
        let mut session = listener();
        assert!(matches!(session.listen(), Err(BenchError::NotInitialized)));
        assert!(matches!(
            session.benchmark_recv(),
            Err(BenchError::NotInitialized)
        ));

        let mut session = connector("127.0.0.1:1".parse().unwrap());
        assert!(matches!(session.connect(), Err(BenchError::NotInitialized)));
    }

    #[test]
    fn test_role_gating() {
        let mut session = listener();
        session.init(None).unwrap();
        assert!(matches!(
            session.connect(),
            Err(BenchError::UnsupportedForRole {
                operation: "connect",
                role: Role::Listener
            })
        ));
        assert!(matches!(
            session.benchmark_send(Some(10)),
            Err(BenchError::UnsupportedForRole { .. })
        ));

        let mut session = connector("127.0.0.1:1".parse().unwrap());
        session.init(None).unwrap();
        assert!(matches!(
            session.listen(),
            Err(BenchError::UnsupportedForRole { .. })
        ));
    }

    #[test]
    fn test_benchmark_needs_connection() {
        let mut session = listener();
        session.init(None).unwrap();
        assert!(matches!(
            session.benchmark_recv(),
            Err(BenchError::NotConnected)
        ));
    }

    #[test]
    fn test_scenario_two_chunks() {
        let (addr, receiver) = spawn_receiver(Some(1000));

        let mut session = connector(addr);
        session.init(Some(1000)).unwrap();
        session.connect().unwrap();
        assert_eq!(session.state(), SessionState::Connected);

        let report = session.benchmark_send(Some(2000)).unwrap();
        assert_eq!(report.bytes_transferred, 2000);
        assert_eq!(report.chunk_size, 1000);
        assert_eq!(report.chunks, 2);
        assert!(report.goodput.map_or(false, |g| g > Goodput::default()));

        let received = receiver.join().unwrap().unwrap();
        assert_eq!(received.total_bytes, 2000);
        assert_eq!(received.bytes_transferred, 2000);

        // The session-level size survives the run.
        assert_eq!(session.buffer_size(), 1000);
        session.quit().unwrap();
        assert_eq!(session.state(), SessionState::Uninitialized);
    }

    #[test]
    fn test_scenario_short_run_narrows_chunk() {
        let (addr, receiver) = spawn_receiver(Some(1000));

        let mut session = connector(addr);
        session.init(Some(1000)).unwrap();
        session.connect().unwrap();

        let report = session.benchmark_send(Some(500)).unwrap();
        assert_eq!(report.chunk_size, 500);
        assert_eq!(report.chunks, 1);
        assert_eq!(session.buffer_size(), 1000);

        let received = receiver.join().unwrap().unwrap();
        assert_eq!(received.bytes_transferred, 500);
        assert_eq!(received.chunk_size, 500);
        session.quit().unwrap();
    }

    #[test]
    fn test_round_trip_odd_sizes() {
        for (buffer, total) in [(1, 7), (64, 10_000), (1000, 123_457)] {
            let (addr, receiver) = spawn_receiver(Some(buffer));

            let mut session = connector(addr);
            session.init(Some(buffer)).unwrap();
            session.connect().unwrap();

            let report = session.benchmark_send(Some(total)).unwrap();
            assert_eq!(report.bytes_transferred, total);
            let received = receiver.join().unwrap().unwrap();
            assert_eq!(received.bytes_transferred, total);
            session.quit().unwrap();
        }
    }

    #[test]
    fn test_double_init_when_connected() {
        let (addr, receiver) = spawn_receiver(None);

        let mut session = connector(addr);
        session.init(None).unwrap();
        session.connect().unwrap();
        assert!(matches!(
            session.init(None),
            Err(BenchError::AlreadyConnected)
        ));
        assert!(matches!(
            session.connect(),
            Err(BenchError::AlreadyConnected)
        ));
        assert_eq!(session.state(), SessionState::Connected);

        // Handles are intact: the run still completes.
        session.benchmark_send(Some(10)).unwrap();
        receiver.join().unwrap().unwrap();
        session.quit().unwrap();
    }

    #[test]
    fn test_receiver_sees_premature_close() {
        let (addr, receiver) = spawn_receiver(None);

        let mut peer = TcpStream::connect(addr).unwrap();
        peer.write_all(&encode(2000)).unwrap();
        let mut echo = [0u8; WORD_LEN];
        peer.read_exact(&mut echo).unwrap();
        assert_eq!(decode(&echo), 2000);
        peer.write_all(&[b'x'; 100]).unwrap();
        drop(peer);

        match receiver.join().unwrap() {
            Err(BenchError::PeerClosed {
                transferred,
                expected,
            }) => {
                assert_eq!(transferred, 100);
                assert_eq!(expected, 2000);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_sender_detects_short_acknowledgement() {
        let fake = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = fake.local_addr().unwrap();
        let peer = thread::spawn(move || {
            let (mut conn, _) = fake.accept().unwrap();
            let mut word = [0u8; WORD_LEN];
            conn.read_exact(&mut word).unwrap();
            conn.write_all(&word).unwrap();
            let mut payload = vec![0u8; decode(&word) as usize];
            conn.read_exact(&mut payload).unwrap();
            conn.write_all(&encode(1999)).unwrap();
        });

        let mut session = connector(addr);
        session.init(None).unwrap();
        session.connect().unwrap();
        assert!(matches!(
            session.benchmark_send(Some(2000)),
            Err(BenchError::IntegrityMismatch {
                expected: 2000,
                acknowledged: 1999
            })
        ));
        // The failed run leaves the connection in place.
        assert_eq!(session.state(), SessionState::Connected);
        peer.join().unwrap();
        session.quit().unwrap();
    }

    #[test]
    fn test_invalid_request_size_keeps_connection() {
        let (addr, receiver) = spawn_receiver(None);

        let mut session = connector(addr);
        session.init(None).unwrap();
        session.connect().unwrap();
        assert!(matches!(
            session.benchmark_send(Some(0)),
            Err(BenchError::InvalidRequestSize(0))
        ));
        assert_eq!(session.state(), SessionState::Connected);

        session.benchmark_send(Some(64)).unwrap();
        receiver.join().unwrap().unwrap();
        session.quit().unwrap();
    }

    #[test]
    fn test_connect_refused_is_transport_error() {
        // Grab a free port, then close it so nothing is listening there.
        let addr = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap();

        let mut session = connector(addr);
        session.init(None).unwrap();
        assert!(matches!(
            session.connect(),
            Err(BenchError::Transport { .. })
        ));
        assert_eq!(session.state(), SessionState::Initialized);
        session.quit().unwrap();
    }

    #[test]
    fn test_accept_blocks_without_peer() {
        let mut session = listener();
        session.init(None).unwrap();
        let addr = session.bind_and_listen().unwrap().unwrap();

        let (done_tx, done_rx) = mpsc::channel();
        let handle = thread::spawn(move || {
            let result = session.listen();
            let _ = done_tx.send(());
            result.map(|_| session)
        });

        // Still blocked in accept: no implicit timeout.
        assert!(done_rx.recv_timeout(Duration::from_millis(300)).is_err());

        let _peer = TcpStream::connect(addr).unwrap();
        done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        let mut session = handle.join().unwrap().unwrap();
        assert_eq!(session.state(), SessionState::Connected);
        session.quit().unwrap();
    }
}
