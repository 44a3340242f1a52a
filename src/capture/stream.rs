use std::fmt;
use std::io::{self, ErrorKind, Read};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::str::FromStr;
use std::thread;
use std::time::{Duration, Instant};
use log::trace;
use crate::Error;

const RETRY: Duration = Duration::from_millis(25);

/// Where the engine publishes its frame stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Endpoint {
    Unix(PathBuf),
    Tcp(SocketAddr),
}

#[derive(Debug)]
pub enum Stream {
    Unix(UnixStream),
    Tcp(TcpStream),
}

impl Endpoint {
    /// Connect, retrying while the engine has not opened the endpoint yet.
    /// Gives up with `ConnectTimeout` once `timeout` has passed.
    pub fn connect(&self, timeout: Duration) -> Result<Stream, Error> {
        let deadline = Instant::now() + timeout;

        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            if left == Duration::from_secs(0) {
                return Err(Error::ConnectTimeout(timeout));
            }

            let result = match self {
                Endpoint::Unix(path) => UnixStream::connect(path).map(Stream::Unix),
                Endpoint::Tcp(addr)  => TcpStream::connect_timeout(addr, left).map(Stream::Tcp),
            };

            match result {
                Ok(stream)              => return Ok(stream),
                Err(e) if pending(&e)   => trace!("{} not ready: {}", self, e),
                Err(e)                  => return Err(e.into()),
            }

            thread::sleep(RETRY.min(left));
        }
    }
}

fn pending(e: &io::Error) -> bool {
    matches!(e.kind(), ErrorKind::NotFound
                     | ErrorKind::ConnectionRefused
                     | ErrorKind::TimedOut
                     | ErrorKind::WouldBlock)
}

/// Whether a read error means the peer is gone rather than a transient fault.
pub fn disconnected(e: &io::Error) -> bool {
    matches!(e.kind(), ErrorKind::UnexpectedEof
                     | ErrorKind::ConnectionReset
                     | ErrorKind::ConnectionAborted
                     | ErrorKind::BrokenPipe
                     | ErrorKind::NotConnected)
}

impl Stream {
    pub fn try_clone(&self) -> io::Result<Self> {
        Ok(match self {
            Stream::Unix(s) => Stream::Unix(s.try_clone()?),
            Stream::Tcp(s)  => Stream::Tcp(s.try_clone()?),
        })
    }

    /// Close both directions, which ends any read blocked on another handle
    /// to the same connection.
    pub fn shutdown(&self) -> io::Result<()> {
        let result = match self {
            Stream::Unix(s) => s.shutdown(Shutdown::Both),
            Stream::Tcp(s)  => s.shutdown(Shutdown::Both),
        };
        match result {
            Err(e) if e.kind() == ErrorKind::NotConnected => Ok(()),
            other                                         => other,
        }
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Stream::Unix(s) => s.read(buf),
            Stream::Tcp(s)  => s.read(buf),
        }
    }
}

impl FromStr for Endpoint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.strip_prefix("tcp://") {
            Some(addr) => addr.parse().map(Endpoint::Tcp).map_err(|e| {
                format!("invalid address '{}': {}", addr, e)
            }),
            None => Ok(Endpoint::Unix(s.trim_start_matches("unix://").into())),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Endpoint::Unix(path) => write!(f, "unix://{}", path.display()),
            Endpoint::Tcp(addr)  => write!(f, "tcp://{}", addr),
        }
    }
}
