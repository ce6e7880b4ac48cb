//! The error taxonomy used throughout the crate.

use std::fmt;
use std::io;

/// Everything that can go wrong constructing, registering with, or driving
/// a reactor.
///
/// This replaces the POSIX "last-error slot" convention with a value
/// returned directly from the failing call. [`ReactorError::Kernel`] wraps
/// the underlying [`io::Error`] so callers who only care about `errno`-style
/// propagation can still use `?` against an `io::Result`.
#[derive(Debug)]
pub enum ReactorError {
    /// A malformed address, an unrecognized scheme, an invalid flag
    /// combination, a non-positive descriptor, a null callback, or a
    /// zero/negative event capacity.
    Argument(&'static str),
    /// A host, port, or socket path exceeded its length limit.
    NameTooLong,
    /// A system call reported failure; the wrapped error carries `errno`.
    Kernel(io::Error),
    /// `run_forever`/`run_once` was called on a loop that is already running.
    AlreadyRunning,
}

impl fmt::Display for ReactorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReactorError::Argument(msg) => write!(f, "invalid argument: {msg}"),
            ReactorError::NameTooLong => write!(f, "address name too long"),
            ReactorError::Kernel(err) => write!(f, "kernel call failed: {err}"),
            ReactorError::AlreadyRunning => write!(f, "loop is already running"),
        }
    }
}

impl std::error::Error for ReactorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReactorError::Kernel(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for ReactorError {
    fn from(err: io::Error) -> Self {
        ReactorError::Kernel(err)
    }
}

impl From<ReactorError> for io::Error {
    fn from(err: ReactorError) -> Self {
        match err {
            ReactorError::Argument(msg) => io::Error::new(io::ErrorKind::InvalidInput, msg),
            ReactorError::NameTooLong => {
                io::Error::new(io::ErrorKind::InvalidInput, "name too long")
            }
            ReactorError::Kernel(err) => err,
            ReactorError::AlreadyRunning => {
                io::Error::new(io::ErrorKind::AlreadyExists, "loop is already running")
            }
        }
    }
}

/// Convenience alias used throughout the crate's public API.
pub type Result<T> = std::result::Result<T, ReactorError>;
