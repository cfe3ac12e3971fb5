use crate::storage::StoreStats;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The lifecycle phase of the messaging session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    LoggedOut,
}

/// A point-in-time view of the controller, published on every state change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControllerStatus {
    pub state: ConnectionState,
    /// The pending pairing challenge, if any. Always `None` while connected.
    pub qr_code: Option<String>,
    /// The last credential write failure, cleared by the next successful write.
    pub last_credential_error: Option<String>,
}

impl ControllerStatus {
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn has_qr(&self) -> bool {
        self.qr_code.is_some()
    }
}

/// The status surface exposed to the API layer.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct StatusReport {
    pub connected: bool,
    pub connection_state: ConnectionState,
    pub has_qr: bool,
    pub current_qr_code: Option<String>,
    pub auth_stats: StoreStats,
}

impl StatusReport {
    pub fn new(status: ControllerStatus, auth_stats: StoreStats) -> Self {
        Self {
            connected: status.is_connected(),
            connection_state: status.state,
            has_qr: status.has_qr(),
            current_qr_code: status.qr_code,
            auth_stats,
        }
    }
}
