//! Blocking socket primitives.
//!
//! Thin wrappers over `socket2` that map I/O failures onto `BenchError`.
//! Sends and receives are single calls: a partial result is returned as-is
//! and looping is left to the protocol layer.

use std::io::{self, Read, Write};
use std::net::SocketAddr;

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tracing::trace;

use crate::error::{BenchError, Result};

/// A bidirectional byte stream the protocol roles can drive.
///
/// Implemented for sockets and for any in-memory `Read + Write` type.
pub trait Stream: Read + Write {}

impl<T: Read + Write + ?Sized> Stream for T {}

/// Allocate a blocking TCP socket for the family of `addr`.
pub fn open_socket(addr: &SocketAddr) -> Result<Socket> {
    Socket::new(
        Domain::for_address(*addr),
        Type::STREAM,
        Some(Protocol::TCP),
    )
    .map_err(|source| BenchError::ResourceExhausted { source })
}

/// Bind `socket` to `addr` and start listening.
pub fn bind_and_listen(socket: &Socket, addr: &SocketAddr, backlog: i32) -> Result<()> {
    socket
        .set_reuse_address(true)
        .map_err(BenchError::transport)?;
    socket.bind(&(*addr).into()).map_err(BenchError::transport)?;
    socket.listen(backlog).map_err(BenchError::transport)?;
    Ok(())
}

/// Block until a peer connects. Returns the data socket and peer address.
pub fn accept(socket: &Socket) -> Result<(Socket, Option<SocketAddr>)> {
    let (conn, addr) = socket.accept().map_err(BenchError::transport)?;
    Ok((conn, sock_addr(&addr)))
}

/// Connect `socket` to `addr`, blocking until established or refused.
pub fn connect(socket: &Socket, addr: &SocketAddr) -> Result<()> {
    socket.connect(&(*addr).into()).map_err(BenchError::transport)
}

/// Local address of a bound socket.
pub fn local_addr(socket: &Socket) -> Result<Option<SocketAddr>> {
    let addr = socket.local_addr().map_err(BenchError::transport)?;
    Ok(sock_addr(&addr))
}

fn sock_addr(addr: &SockAddr) -> Option<SocketAddr> {
    addr.as_socket()
}

/// Issue one send of `buf`. Returns the number of bytes the call accepted,
/// which may be fewer than `buf.len()` and may be zero.
pub fn accumulate_send(stream: &mut dyn Stream, buf: &[u8]) -> Result<usize> {
    loop {
        match stream.write(buf) {
            Ok(n) => {
                trace!(requested = buf.len(), sent = n, "send");
                return Ok(n);
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(BenchError::transport(e)),
        }
    }
}

/// Issue one receive into `buf`. Returns the number of bytes read; zero
/// means the peer has closed its side.
pub fn accumulate_recv(stream: &mut dyn Stream, buf: &mut [u8]) -> Result<usize> {
    loop {
        match stream.read(buf) {
            Ok(n) => {
                trace!(requested = buf.len(), received = n, "recv");
                return Ok(n);
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(BenchError::transport(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Writer that accepts at most `limit` bytes per call.
    struct Trickle {
        limit: usize,
        written: Vec<u8>,
        interrupts: usize,
    }

    impl Read for Trickle {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::from_raw_os_error(libc::ECONNRESET))
        }
    }

    impl Write for Trickle {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.interrupts > 0 {
                self.interrupts -= 1;
                return Err(io::ErrorKind::Interrupted.into());
            }
            let n = buf.len().min(self.limit);
            self.written.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_send_is_single_call() {
        let mut stream = Trickle {
            limit: 3,
            written: Vec::new(),
            interrupts: 2,
        };
        let sent = accumulate_send(&mut stream, b"hello").unwrap();
        assert_eq!(sent, 3);
        assert_eq!(stream.written, b"hel");
    }

    #[test]
    fn test_recv_error_is_transport() {
        let mut stream = Trickle {
            limit: 0,
            written: Vec::new(),
            interrupts: 0,
        };
        let mut buf = [0u8; 4];
        match accumulate_recv(&mut stream, &mut buf) {
            Err(BenchError::Transport { code, .. }) => assert_eq!(code, libc::ECONNRESET),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_recv_eof_is_zero() {
        let mut stream = Cursor::new(Vec::new());
        let mut buf = [0u8; 4];
        assert_eq!(accumulate_recv(&mut stream, &mut buf).unwrap(), 0);
    }

    #[test]
    fn test_listen_and_connect_loopback() {
        let bind: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let listener = open_socket(&bind).unwrap();
        bind_and_listen(&listener, &bind, 1).unwrap();
        let addr = local_addr(&listener).unwrap().unwrap();

        let client = open_socket(&addr).unwrap();
        connect(&client, &addr).unwrap();

        let (mut conn, peer) = accept(&listener).unwrap();
        assert!(peer.is_some());

        let mut client = client;
        assert_eq!(accumulate_send(&mut client, b"ping").unwrap(), 4);
        let mut buf = [0u8; 4];
        let mut got = 0;
        while got < 4 {
            got += accumulate_recv(&mut conn, &mut buf[got..]).unwrap();
        }
        assert_eq!(&buf, b"ping");
    }
}
