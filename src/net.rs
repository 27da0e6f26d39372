use crate::error::{Error, Result};
use crate::interrupt::Interrupt;
use crate::protocol::timeouts;
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread;
use std::time::{Duration, Instant};

// Socket tuning: disable Nagle and enable keepalive so a vanished peer is noticed
fn tune_socket(stream: &TcpStream) {
    let _ = stream.set_nodelay(true);
    #[cfg(unix)]
    {
        use std::os::fd::AsRawFd;
        let fd = stream.as_raw_fd();
        unsafe {
            let keepalive: libc::c_int = 1;
            let _ = libc::setsockopt(
                fd,
                libc::SOL_SOCKET,
                libc::SO_KEEPALIVE,
                &keepalive as *const _ as *const libc::c_void,
                std::mem::size_of_val(&keepalive) as libc::socklen_t,
            );

            #[cfg(target_os = "linux")]
            {
                let keepidle: libc::c_int = 30; // Start probes after 30s idle
                let keepintvl: libc::c_int = 10; // 10s between probes
                let keepcnt: libc::c_int = 3; // 3 probes before failure
                let _ = libc::setsockopt(
                    fd,
                    libc::IPPROTO_TCP,
                    libc::TCP_KEEPIDLE,
                    &keepidle as *const _ as *const libc::c_void,
                    std::mem::size_of_val(&keepidle) as libc::socklen_t,
                );
                let _ = libc::setsockopt(
                    fd,
                    libc::IPPROTO_TCP,
                    libc::TCP_KEEPINTVL,
                    &keepintvl as *const _ as *const libc::c_void,
                    std::mem::size_of_val(&keepintvl) as libc::socklen_t,
                );
                let _ = libc::setsockopt(
                    fd,
                    libc::IPPROTO_TCP,
                    libc::TCP_KEEPCNT,
                    &keepcnt as *const _ as *const libc::c_void,
                    std::mem::size_of_val(&keepcnt) as libc::socklen_t,
                );
            }
        }
    }
}

/// Connect to `addr`, retrying every window until it succeeds.
///
/// Each attempt gets the same fixed window; refusals wait out the rest of
/// it so an absent listener is not hammered. Only an interrupt ends the loop.
pub fn connect(addr: &SocketAddr, interrupt: &Interrupt) -> Result<TcpStream> {
    let window = Duration::from_millis(timeouts::CONNECT_MS);
    loop {
        if interrupt.is_set() {
            return Err(Error::Interrupted);
        }
        let started = Instant::now();
        match TcpStream::connect_timeout(addr, window) {
            Ok(stream) => {
                tune_socket(&stream);
                return Ok(stream);
            }
            Err(_) => {
                let spent = started.elapsed();
                if spent < window {
                    thread::sleep(window - spent);
                }
            }
        }
    }
}

/// Listening side of the connection: polls `accept` so interrupts are seen.
pub struct Acceptor {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Acceptor {
    pub fn bind(addr: &str) -> Result<Self> {
        let bind_err = |source| Error::Bind {
            addr: addr.to_string(),
            source,
        };
        let listener = TcpListener::bind(addr).map_err(bind_err)?;
        listener.set_nonblocking(true).map_err(bind_err)?;
        let local_addr = listener.local_addr().map_err(bind_err)?;
        Ok(Self {
            listener,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn accept(&self, interrupt: &Interrupt) -> Result<(TcpStream, SocketAddr)> {
        let poll = Duration::from_millis(timeouts::ACCEPT_POLL_MS);
        loop {
            if interrupt.is_set() {
                return Err(Error::Interrupted);
            }
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    stream.set_nonblocking(false)?;
                    tune_socket(&stream);
                    return Ok((stream, peer));
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(poll),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::Transfer(e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_and_accept_on_loopback() {
        let acceptor = Acceptor::bind("127.0.0.1:0").unwrap();
        let addr = acceptor.local_addr();
        let interrupt = Interrupt::new();

        let client = thread::spawn(move || connect(&addr, &Interrupt::new()));
        let (stream, peer) = acceptor.accept(&interrupt).unwrap();
        assert!(peer.ip().is_loopback());
        let client = client.join().unwrap().unwrap();

        // Both ends come back tuned; sessions rely on that
        assert!(stream.nodelay().unwrap());
        assert!(client.nodelay().unwrap());
    }

    #[test]
    fn interrupted_accept_returns() {
        let acceptor = Acceptor::bind("127.0.0.1:0").unwrap();
        let interrupt = Interrupt::new();
        interrupt.trigger();
        assert!(matches!(acceptor.accept(&interrupt), Err(Error::Interrupted)));
    }

    #[test]
    fn interrupted_connect_returns() {
        let interrupt = Interrupt::new();
        interrupt.trigger();
        let addr: SocketAddr = "127.0.0.1:9".parse().unwrap();
        assert!(matches!(connect(&addr, &interrupt), Err(Error::Interrupted)));
    }

    #[test]
    fn bind_failure_is_reported() {
        let first = Acceptor::bind("127.0.0.1:0").unwrap();
        let taken = first.local_addr().to_string();
        assert!(matches!(Acceptor::bind(&taken), Err(Error::Bind { .. })));
    }
}
