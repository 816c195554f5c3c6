use std::fmt;
use std::io;

use bondtun_session::{ConfigError, SessionError};
use bondtun_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    CliError::new(io_exit_code(&err), format!("{context}: {err}"))
}

fn io_exit_code(err: &io::Error) -> i32 {
    match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound => USAGE,
        _ => INTERNAL,
    }
}

pub fn config_error(context: &str, err: ConfigError) -> CliError {
    CliError::new(DATA_INVALID, format!("{context}: {err}"))
}

fn transport_exit_code(err: &TransportError) -> i32 {
    match err {
        TransportError::Bind { source, .. }
        | TransportError::Connect { source, .. }
        | TransportError::Accept(source)
        | TransportError::Io(source) => match source.kind() {
            io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
            io::ErrorKind::TimedOut => TIMEOUT,
            _ => TRANSPORT_ERROR,
        },
        TransportError::Resolve { .. } | TransportError::NoAddress { .. } => TRANSPORT_ERROR,
    }
}

/// Exit code for a session that ended with `err`.
///
/// Setup failures carry the transport's code; anything that ends a running
/// session is a plain failure.
pub fn session_exit_code(err: &SessionError) -> i32 {
    match err {
        SessionError::Config(_) => DATA_INVALID,
        SessionError::Bind(source)
        | SessionError::EndpointSetup(source)
        | SessionError::LinkSetup { source, .. } => transport_exit_code(source),
        SessionError::UnitFailed { .. } => INTERNAL,
        SessionError::Link { .. }
        | SessionError::EndpointClosed
        | SessionError::EndpointIo(_)
        | SessionError::QueueClosed => FAILURE,
    }
}
