use sync_protocol::ProtocolError;
use tokio_tungstenite::tungstenite;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Rejected locally before anything was sent
    #[error("{0}")]
    Validation(String),

    #[error("no conversation is open")]
    NoActiveConversation,

    #[error("server is unavailable")]
    Unavailable,

    /// The persistence collaborator answered with a non-success status
    #[error("server rejected request ({status}): {message}")]
    Backend { status: u16, message: String },

    #[error("http error: {0}")]
    Http(#[source] reqwest::Error),

    #[error("relay transport error: {0}")]
    Transport(#[source] tungstenite::Error),

    #[error("relay connection closed")]
    RelayClosed,

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("invalid client configuration: {0}")]
    Config(#[from] figment::Error),
}

impl ClientError {
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_connect() {
            Self::Unavailable
        } else {
            Self::Http(err)
        }
    }

    pub fn from_tungstenite(err: tungstenite::Error) -> Self {
        let is_connect = match &err {
            tungstenite::Error::Io(io_err) => matches!(
                io_err.kind(),
                std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
            ),
            _ => false,
        };
        if is_connect {
            Self::Unavailable
        } else {
            Self::Transport(err)
        }
    }

    /// Status code for errors the server produced.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Backend { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
