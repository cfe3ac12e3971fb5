use crate::error::ControllerError;
use tokio::sync::oneshot;

/// Defines commands that can be sent to the controller task.
#[derive(Debug)]
pub(crate) enum ControllerCommand {
    /// Open a session now, superseding any pending reconnect.
    Connect,
    /// A scheduled (re)connect. Ignored unless `generation` is still current.
    Init { generation: u64 },
    SendMessage {
        recipient: String,
        payload: String,
        reply: oneshot::Sender<Result<bool, ControllerError>>,
    },
    Restart {
        reply: oneshot::Sender<()>,
    },
    Logout {
        reply: oneshot::Sender<Result<(), ControllerError>>,
    },
    ClearAuthData {
        reply: oneshot::Sender<Result<u64, ControllerError>>,
    },
    Shutdown,
}
