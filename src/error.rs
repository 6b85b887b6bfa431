use std::fmt;

/// Failure taxonomy for talking to a NeoHub.
///
/// `Unreachable` and `NoResponse` are normal runtime conditions for an
/// embedded hub on a home network (power-cycled, busy, briefly offline)
/// and are expected to be handled, not crash the caller.
#[derive(Debug, Clone)]
pub enum Error {
    /// Connect refused, host unreachable, or connect timed out.
    Unreachable(String),
    /// Connected, but the hub sent no bytes before the read timeout.
    NoResponse,
    /// Bytes received but not parseable JSON, or missing expected keys.
    MalformedResponse(String),
    /// Valid JSON reply containing an `error` key.
    HubError(String),
    /// Caller-supplied value rejected before any socket was opened.
    Validation(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Unreachable(reason) => write!(f, "hub unreachable: {reason}"),
            Error::NoResponse => write!(f, "hub connected but sent no response"),
            Error::MalformedResponse(msg) => write!(f, "malformed response: {msg}"),
            Error::HubError(msg) => write!(f, "hub error: {msg}"),
            Error::Validation(msg) => write!(f, "invalid argument: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;
