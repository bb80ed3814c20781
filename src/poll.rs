//! The readiness-poll primitive (spec §6: `ready_2_transfer(fd, timeout_ms,
//! ops_bitmask)`). The engine never blocks inside the provider; every
//! suspension point goes through here instead (spec §5).

use std::os::unix::io::RawFd;

use crate::error::{EngineError, Result};

bitflags::bitflags! {
    /// Which direction(s) the caller wants the socket to become ready for.
    pub struct Interest: u8 {
        const READABLE = 0b01;
        const WRITABLE = 0b10;
    }
}

/// The readiness-poll collaborator. Implementations block the calling
/// thread until `fd` is ready for (at least one of) `interest`, `timeout`
/// elapses, or an error occurs.
pub trait ReadinessPoll: Send + Sync {
    /// `timeout_ms < 0` waits forever; `0` polls once without blocking.
    fn poll(&self, fd: RawFd, interest: Interest, timeout_ms: i32) -> Result<PollOutcome>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Ready,
    TimedOut,
}

/// Default [`ReadinessPoll`] backed by `libc::poll`.
#[derive(Default)]
pub struct PollFd;

impl ReadinessPoll for PollFd {
    fn poll(&self, fd: RawFd, interest: Interest, timeout_ms: i32) -> Result<PollOutcome> {
        let mut events: libc::c_short = 0;
        if interest.contains(Interest::READABLE) {
            events |= libc::POLLIN;
        }
        if interest.contains(Interest::WRITABLE) {
            events |= libc::POLLOUT;
        }

        let mut pfd = libc::pollfd {
            fd,
            events,
            revents: 0,
        };

        let rc = unsafe { libc::poll(&mut pfd as *mut libc::pollfd, 1, timeout_ms) };

        if rc < 0 {
            return Err(EngineError::from(std::io::Error::last_os_error()));
        }
        if rc == 0 {
            return Ok(PollOutcome::TimedOut);
        }
        if pfd.revents & (libc::POLLERR | libc::POLLNVAL) != 0 {
            return Err(EngineError::Unknown);
        }

        Ok(PollOutcome::Ready)
    }
}

/// Waits until `fd` is ready for *both* reading and writing, the shape
/// the handshake orchestrator needs while driving `WANT_READ`/`WANT_WRITE`
/// (spec §4.F step 7).
pub(crate) fn wait_read_and_write(
    poller: &dyn ReadinessPoll,
    fd: RawFd,
    timeout_ms: i32,
) -> Result<()> {
    match poller.poll(fd, Interest::READABLE | Interest::WRITABLE, timeout_ms)? {
        PollOutcome::Ready => Ok(()),
        PollOutcome::TimedOut => Err(EngineError::Timeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{TcpListener, TcpStream};
    use std::os::unix::io::AsRawFd;

    fn connected_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        (client, server)
    }

    #[test]
    fn writable_socket_is_immediately_ready() {
        let (client, _server) = connected_pair();
        let outcome = PollFd
            .poll(client.as_raw_fd(), Interest::WRITABLE, 1000)
            .unwrap();
        assert_eq!(outcome, PollOutcome::Ready);
    }

    #[test]
    fn idle_socket_times_out_waiting_to_read() {
        let (client, _server) = connected_pair();
        let outcome = PollFd
            .poll(client.as_raw_fd(), Interest::READABLE, 50)
            .unwrap();
        assert_eq!(outcome, PollOutcome::TimedOut);
    }

    #[test]
    fn becomes_readable_once_peer_writes() {
        use std::io::Write;
        let (client, mut server) = connected_pair();
        server.write_all(b"x").unwrap();
        let outcome = PollFd
            .poll(client.as_raw_fd(), Interest::READABLE, 1000)
            .unwrap();
        assert_eq!(outcome, PollOutcome::Ready);
    }

    #[test]
    fn wait_read_and_write_surfaces_timeout_as_engine_error() {
        let (client, _server) = connected_pair();
        let poller = PollFd;
        let err = wait_read_and_write(&poller, client.as_raw_fd(), 50).unwrap_err();
        assert!(matches!(err, EngineError::Timeout));
    }
}
