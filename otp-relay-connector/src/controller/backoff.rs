use crate::{
    config::ReconnectConfig,
    events::{CloseCause, DisconnectReason},
};
use std::time::Duration;

/// Picks the delay before the next session open after a close.
///
/// Returns `None` when the close is terminal (the device was logged out) and no
/// reconnect may be scheduled. A close without a cause is treated as an ordinary
/// recoverable failure.
pub fn reconnect_delay(cause: Option<&CloseCause>, policy: &ReconnectConfig) -> Option<Duration> {
    let reason = cause.map_or(DisconnectReason::Other, |c| c.reason);
    match reason {
        DisconnectReason::LoggedOut => None,
        DisconnectReason::StreamErrored => Some(policy.stream_error_delay()),
        DisconnectReason::Unauthorized => Some(policy.unauthorized_delay()),
        DisconnectReason::Other => Some(policy.default_delay()),
    }
}
