use std::fmt;

/// The five wire-tagged error kinds the text protocol distinguishes.
///
/// `wire_line()` is the single source of truth for the bytes sent back to a
/// client; the encoder and the connection handler both call through it
/// rather than formatting error text themselves.
#[derive(Debug, thiserror::Error)]
pub enum ProtoError {
    #[error("ERROR")]
    BadCommand,
    #[error("CLIENT_ERROR {0}")]
    Client(String),
    #[error("SERVER_ERROR {0}")]
    Server(String),
    #[error("NOT_FOUND")]
    NotFound,
    /// Not a wire error at all — the handler's signal to close the connection.
    #[error("quit")]
    Quit,
}

impl ProtoError {
    pub fn client(msg: impl fmt::Display) -> Self {
        ProtoError::Client(msg.to_string())
    }

    pub fn server(msg: impl fmt::Display) -> Self {
        ProtoError::Server(msg.to_string())
    }

    /// The exact line to write to the client, `\r\n` excluded. `None` for
    /// `Quit`, which never produces wire output.
    pub fn wire_line(&self) -> Option<String> {
        match self {
            ProtoError::Quit => None,
            other => Some(other.to_string()),
        }
    }
}
