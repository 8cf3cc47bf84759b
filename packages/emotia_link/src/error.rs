use tokio_tungstenite::tungstenite;

/// Errors surfaced by the link layer.
///
/// Every variant maps to a passive, human-readable notice through
/// [`LinkError::notice`]; none of them is fatal to the process.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("server is unavailable")]
    Unavailable,

    #[error("request failed ({status}): {detail}")]
    Api { status: u16, detail: String },

    #[error("capture source unavailable: {0}")]
    CaptureUnavailable(String),

    #[error("frame encoding failed: {0}")]
    Encode(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T, E = LinkError> = std::result::Result<T, E>;

impl LinkError {
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_connect() {
            Self::Unavailable
        } else {
            Self::Other(err.into())
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
            Self::Other(err.into())
        }
    }

    /// Text for a passive UI notice.
    pub fn notice(&self) -> String {
        match self {
            Self::Unavailable => "Could not reach the server.".to_string(),
            Self::Api { detail, .. } => detail.clone(),
            Self::CaptureUnavailable(reason) => format!("Camera unavailable: {reason}"),
            Self::Encode(_) | Self::Other(_) => format!("Error: {self}"),
            Self::InvalidInput(msg) => msg.clone(),
        }
    }

    /// True for a 404 from the REST side.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Api { status: 404, .. })
    }
}
