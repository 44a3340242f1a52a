use std::fmt;
use std::io;
use std::time::Duration;
use crate::capture::DecodeError;

#[derive(Debug)]
pub enum Error {
    ConnectTimeout(Duration),
    DeviceEnumerationTimeout(Duration),
    EngineUnavailable(String),
    ShutdownTimeout(Duration),
    Decode(DecodeError),
    Closed,
    Io(io::Error),
}

impl Error {
    pub fn engine<E: fmt::Display>(err: E) -> Self {
        Error::EngineUnavailable(err.to_string())
    }

    pub fn retryable(&self) -> bool {
        matches!(self, Error::ConnectTimeout(_) | Error::DeviceEnumerationTimeout(_))
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<DecodeError> for Error {
    fn from(err: DecodeError) -> Self {
        Error::Decode(err)
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::EngineUnavailable(err.to_string())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Decode(e) => Some(e),
            Error::Io(e)     => Some(e),
            _                => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        match self {
            Error::ConnectTimeout(t)           => write!(f, "no capture stream after {:?}", t),
            Error::DeviceEnumerationTimeout(t) => write!(f, "device enumeration timed out after {:?}", t),
            Error::EngineUnavailable(e)        => write!(f, "capture engine unavailable: {}", e),
            Error::ShutdownTimeout(t)          => write!(f, "reader did not exit within {:?}", t),
            Error::Decode(e)                   => write!(f, "{}", e),
            Error::Closed                      => write!(f, "channel closed"),
            Error::Io(e)                       => write!(f, "{}", e),
        }
    }
}
