use std::error::Error;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientErrorKind {
    Config,
    AuthResolution,
    Dial,
    Session,
    Transfer,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct ClientError {
    pub kind: ClientErrorKind,
    pub code: String,
    pub message: String,
    pub hint: Option<String>,
}

impl ClientError {
    pub fn new(kind: ClientErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: code.into(),
            message: message.into(),
            hint: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ClientErrorKind::Config, "CONFIG", message)
    }

    pub fn auth_resolution(message: impl Into<String>) -> Self {
        Self::new(ClientErrorKind::AuthResolution, "AUTH_RESOLUTION", message)
    }

    pub fn dial(message: impl Into<String>) -> Self {
        Self::new(ClientErrorKind::Dial, "DIAL", message)
    }

    pub fn session(message: impl Into<String>) -> Self {
        Self::new(ClientErrorKind::Session, "SESSION", message)
    }

    pub fn transfer(message: impl Into<String>) -> Self {
        Self::new(ClientErrorKind::Transfer, "TRANSFER", message)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(ClientErrorKind::Cancelled, "CANCELLED", message)
    }

    /// The server refused every auth method offered and password was not one of them.
    pub fn is_auth_exhausted_without_password(&self) -> bool {
        self.kind == ClientErrorKind::Dial
            && self.message.contains("no supported methods remain")
            && !self.message.contains("password")
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.hint.as_deref() {
            Some(hint) => write!(f, "{} ({})", self.message, hint),
            None => write!(f, "{}", self.message),
        }
    }
}

impl Error for ClientError {}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        ClientError::session(err.to_string())
    }
}

pub(crate) fn map_ssh_error(kind: ClientErrorKind, err: ssh2::Error) -> ClientError {
    let io_err: std::io::Error = err.into();
    match io_err.kind() {
        std::io::ErrorKind::TimedOut => {
            ClientError::new(kind, "TIMEOUT", "SSH operation timed out")
        }
        _ => ClientError::new(kind, "SSH", format!("SSH error: {}", io_err)),
    }
}
