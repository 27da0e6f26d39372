//! Error types for folan.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for transfer operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The peer ended the stream.
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// Malformed or truncated header, or a bad acknowledgement.
    #[error("protocol error: {message}")]
    Protocol { message: String },

    /// Generic I/O failure on the connection during send/receive.
    #[error("transfer error: {0}")]
    Transfer(#[source] io::Error),

    /// Bad user configuration, detected before any connection attempt.
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// The user asked to stop.
    #[error("interrupted by user")]
    Interrupted,

    /// Receiver refuses to overwrite an existing file.
    #[error("{} already exists", .0.display())]
    DestinationExists(PathBuf),

    /// Receiver cannot create or write its destination.
    #[error("cannot write {}: {source}", path.display())]
    Destination {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Sender cannot open or read a local file.
    #[error("cannot read {}: {source}", path.display())]
    Source {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// File does not fit the 32-bit size field.
    #[error("{} is {size} bytes; the wire format carries at most {max} bytes", path.display())]
    TooLarge { path: PathBuf, size: u64, max: u64 },

    /// Cannot open the listening socket.
    #[error("cannot listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
}

impl Error {
    pub fn protocol(message: impl Into<String>) -> Self {
        Error::Protocol {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Error::Configuration {
            message: message.into(),
        }
    }

    /// Errors that end the current connection but not the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::ConnectionClosed | Error::Protocol { .. } | Error::Transfer(_)
        )
    }

    /// Errors tied to a single source file; the sender skips that file.
    pub fn is_skippable(&self) -> bool {
        matches!(self, Error::Source { .. } | Error::TooLarge { .. })
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe => Error::ConnectionClosed,
            _ => Error::Transfer(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_loss_maps_to_connection_closed() {
        for kind in [
            io::ErrorKind::UnexpectedEof,
            io::ErrorKind::ConnectionReset,
            io::ErrorKind::BrokenPipe,
        ] {
            let e: Error = io::Error::new(kind, "gone").into();
            assert!(matches!(e, Error::ConnectionClosed));
        }
        let e: Error = io::Error::new(io::ErrorKind::TimedOut, "slow").into();
        assert!(matches!(e, Error::Transfer(_)));
    }

    #[test]
    fn only_connection_level_errors_reconnect() {
        assert!(Error::ConnectionClosed.is_recoverable());
        assert!(Error::protocol("bad header").is_recoverable());
        assert!(Error::Transfer(io::Error::other("x")).is_recoverable());
        assert!(!Error::config("bad limit").is_recoverable());
        assert!(!Error::Interrupted.is_recoverable());
        assert!(!Error::DestinationExists(PathBuf::from("a")).is_recoverable());
    }
}
