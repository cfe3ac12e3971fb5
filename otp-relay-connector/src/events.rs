/// The credential object owned by the transport. It is treated as opaque JSON:
/// the connector only merges, serializes and persists it.
pub type Credentials = serde_json::Value;

/// The connection phase reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Opening,
    Open,
    Closed,
}

/// The transport's classification of why a connection was closed.
///
/// The classification is the transport's responsibility; the controller only
/// maps each class to a reconnect policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The paired device was logged out. Terminal: requires a new pairing.
    LoggedOut,
    /// A stream-protocol error; the server asked for a restart of the stream.
    StreamErrored,
    /// The server rejected the session's authorization.
    Unauthorized,
    /// Any other recoverable failure (network loss, timeouts, replaced connection, ...).
    Other,
}

/// Details attached to a `Closed` connection update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseCause {
    pub reason: DisconnectReason,
    /// The raw status code reported by the server, when there is one.
    pub status_code: Option<u16>,
    pub message: String,
}

impl CloseCause {
    pub fn new(reason: DisconnectReason, status_code: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            reason,
            status_code,
            message: message.into(),
        }
    }

    pub fn is_logout(&self) -> bool {
        self.reason == DisconnectReason::LoggedOut
    }
}

/// A single update emitted by a transport session.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A new pairing challenge to be rendered as a QR code.
    Qr(String),
    /// The connection changed phase. `cause` is only meaningful for `Closed`.
    Connection {
        status: ConnectionStatus,
        cause: Option<CloseCause>,
    },
    /// The credential object changed and must be persisted.
    CredentialsChanged(Credentials),
}

impl TransportEvent {
    pub fn opened() -> Self {
        TransportEvent::Connection {
            status: ConnectionStatus::Open,
            cause: None,
        }
    }

    pub fn closed(cause: CloseCause) -> Self {
        TransportEvent::Connection {
            status: ConnectionStatus::Closed,
            cause: Some(cause),
        }
    }
}
