use thiserror::Error;

use crate::model::Expect;

#[derive(Debug, Error)]
pub enum NntpError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Unexpected response {code} (wanted {expected}): {message}")]
    UnexpectedStatus {
        code: u16,
        message: String,
        expected: Expect,
    },

    #[error("Authentication failed ({code}): {message}")]
    AuthFailed { code: u16, message: String },

    #[error("Cannot connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: Box<NntpError>,
    },
}

impl NntpError {
    /// Status code carried by the error, if the server sent one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            NntpError::UnexpectedStatus { code, .. } | NntpError::AuthFailed { code, .. } => {
                Some(*code)
            }
            NntpError::Connect { source, .. } => source.status_code(),
            _ => None,
        }
    }
}
