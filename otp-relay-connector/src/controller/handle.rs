use super::{
    command::ControllerCommand,
    status::{ConnectionState, ControllerStatus, StatusReport},
};
use crate::{
    error::ControllerError,
    storage::{category_pattern, AuthStore, StoreStats},
};
use std::{fmt, sync::Arc};
use tokio::sync::{mpsc, oneshot, watch};

/// A clonable, thread-safe handle for interacting with the [`ConnectionController`](super::ConnectionController).
///
/// Status reads are served from the latest published snapshot and never wait on
/// the controller. Operations that touch the session are queued on the controller
/// and therefore never race each other.
#[derive(Clone)]
pub struct ControllerHandle {
    command_tx: mpsc::Sender<ControllerCommand>,
    status_rx: watch::Receiver<ControllerStatus>,
    store: Arc<dyn AuthStore>,
}

impl fmt::Debug for ControllerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerHandle")
            .field("status", &*self.status_rx.borrow())
            .finish_non_exhaustive()
    }
}

impl ControllerHandle {
    pub(super) fn new(
        command_tx: mpsc::Sender<ControllerCommand>,
        status_rx: watch::Receiver<ControllerStatus>,
        store: Arc<dyn AuthStore>,
    ) -> Self {
        Self {
            command_tx,
            status_rx,
            store,
        }
    }

    /// Returns the latest status snapshot.
    pub fn status(&self) -> ControllerStatus {
        self.status_rx.borrow().clone()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.status_rx.borrow().state
    }

    pub fn is_connected(&self) -> bool {
        self.status_rx.borrow().is_connected()
    }

    pub fn has_qr(&self) -> bool {
        self.status_rx.borrow().has_qr()
    }

    /// The pending pairing challenge. `None` simply means no pairing is in progress.
    pub fn current_qr_code(&self) -> Option<String> {
        self.status_rx.borrow().qr_code.clone()
    }

    /// Subscribes to status changes.
    pub fn subscribe(&self) -> watch::Receiver<ControllerStatus> {
        self.status_rx.clone()
    }

    /// Builds the full status surface, including storage statistics.
    pub async fn status_report(&self) -> StatusReport {
        let status = self.status();
        StatusReport::new(status, self.store.stats().await)
    }

    pub async fn auth_stats(&self) -> StoreStats {
        self.store.stats().await
    }

    /// Lists the stored pre-key record names.
    pub async fn pre_keys(&self) -> Vec<String> {
        self.store.list_keys_by_prefix(&category_pattern("pre-key")).await
    }

    /// Lists the stored per-peer session record names.
    pub async fn sessions(&self) -> Vec<String> {
        self.store.list_keys_by_prefix(&category_pattern("session")).await
    }

    /// Asks the controller to open a session now.
    pub async fn connect(&self) -> Result<(), ControllerError> {
        self.command_tx
            .send(ControllerCommand::Connect)
            .await
            .map_err(|_| ControllerError::Stopped)
    }

    /// Sends `payload` to `recipient`.
    ///
    /// Fails with [`ControllerError::NotConnected`] without touching the transport
    /// when no session is connected. An ordinary delivery failure is reported as
    /// `Ok(false)`.
    pub async fn send_message(
        &self,
        recipient: impl Into<String>,
        payload: impl Into<String>,
    ) -> Result<bool, ControllerError> {
        if !self.is_connected() {
            return Err(ControllerError::NotConnected);
        }
        let (recipient, payload) = (recipient.into(), payload.into());
        self.request(|reply| ControllerCommand::SendMessage {
            recipient,
            payload,
            reply,
        })
        .await?
    }

    /// Tears down the current session and schedules a fresh one.
    pub async fn restart(&self) -> Result<(), ControllerError> {
        self.request(|reply| ControllerCommand::Restart { reply }).await
    }

    /// Logs the device out and purges all stored auth state.
    pub async fn logout(&self) -> Result<(), ControllerError> {
        self.request(|reply| ControllerCommand::Logout { reply }).await?
    }

    /// Ends the session and purges all stored auth state, returning the number of records removed.
    pub async fn clear_auth_data(&self) -> Result<u64, ControllerError> {
        self.request(|reply| ControllerCommand::ClearAuthData { reply })
            .await?
    }

    /// Sends a shutdown signal to the controller.
    pub async fn stop(&self) {
        if self
            .command_tx
            .send(ControllerCommand::Shutdown)
            .await
            .is_err()
        {
            tracing::warn!("Failed to send shutdown to controller: it may already be down");
        }
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> ControllerCommand,
    ) -> Result<T, ControllerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(command(reply_tx))
            .await
            .map_err(|_| ControllerError::Stopped)?;
        reply_rx.await.map_err(|_| ControllerError::Stopped)
    }
}
