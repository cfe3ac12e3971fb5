//! # Connection Lifecycle Controller
//!
//! This module defines the [`ConnectionController`], the single owner of the live
//! transport session, and its [`ControllerHandle`].
//!
//! ## Core Components
//!
//! - [`ConnectionController`]: a background task that owns the session, consumes the
//!   session's event stream and the command queue one item at a time, and drives the
//!   `disconnected -> connecting -> connected` state machine. It is consumed when its
//!   `run` method is called.
//! - [`ControllerHandle`]: a clonable, thread-safe handle that provides the public API
//!   (status reads, `send_message`, `restart`, `logout`, ...).
//!
//! ## Reconnects
//!
//! Every scheduled reconnect carries a generation number. `restart`, `logout`,
//! `clear_auth_data` and every new schedule bump the generation and abort the pending
//! timer, so a reconnect that was superseded can never open a session.

mod backoff;
mod command;
mod handle;
mod status;

pub use backoff::reconnect_delay;
pub use handle::ControllerHandle;
pub use status::{ConnectionState, ControllerStatus, StatusReport};

use crate::{
    address::normalize_recipient,
    auth_state::{build_auth_state, CredentialStore},
    config::ConnectorConfig,
    error::ControllerError,
    events::{CloseCause, ConnectionStatus, Credentials, TransportEvent},
    storage::AuthStore,
    transport::{Session, SessionHandle, Transport},
};
use command::ControllerCommand;
use futures::{stream::BoxStream, StreamExt};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};

/// The background task owning the transport session.
///
/// It is created once, its [`run()`](ConnectionController::run) method is spawned as a
/// background task, and it is then consumed, leaving the [`ControllerHandle`] as the
/// only way to interact with it.
pub struct ConnectionController {
    config: Arc<ConnectorConfig>,
    transport: Arc<dyn Transport>,
    store: Arc<dyn AuthStore>,
    credentials: CredentialStore,
    command_rx: mpsc::Receiver<ControllerCommand>,
    /// Weak so that the controller exits once every handle is dropped.
    command_tx: mpsc::WeakSender<ControllerCommand>,
    status_tx: watch::Sender<ControllerStatus>,
    session: Option<Arc<dyn SessionHandle>>,
    events: Option<BoxStream<'static, TransportEvent>>,
    generation: u64,
    pending_init: Option<JoinHandle<()>>,
    /// Set when the purge after a logout failed; the stored credentials are stale.
    purge_pending: bool,
}

impl ConnectionController {
    /// Creates a new controller and its associated [`ControllerHandle`].
    ///
    /// The controller starts in `disconnected` and does nothing until it is run and
    /// asked to [`connect`](ControllerHandle::connect).
    pub fn new(
        config: Arc<ConnectorConfig>,
        transport: Arc<dyn Transport>,
        store: Arc<dyn AuthStore>,
    ) -> (Self, ControllerHandle) {
        let (command_tx, command_rx) = mpsc::channel(config.channels.command_buffer.max(1));
        let (status_tx, status_rx) = watch::channel(ControllerStatus::default());

        let credentials = CredentialStore::new(store.clone(), config.credentials.clone());
        let controller = Self {
            config,
            transport,
            store: store.clone(),
            credentials,
            command_rx,
            command_tx: command_tx.downgrade(),
            status_tx,
            session: None,
            events: None,
            generation: 0,
            pending_init: None,
            purge_pending: false,
        };
        let handle = ControllerHandle::new(command_tx, status_rx, store);
        (controller, handle)
    }

    /// Runs the controller's event loop.
    ///
    /// Commands and transport events are handled strictly one at a time. The loop
    /// ends on [`ControllerHandle::stop()`] or once every handle has been dropped;
    /// the live session (if any) is then ended.
    pub async fn run(mut self) -> anyhow::Result<()> {
        tracing::info!("Connection controller started.");
        loop {
            tokio::select! {
                command = self.command_rx.recv() => match command {
                    Some(command) => {
                        if self.handle_command(command).await {
                            break;
                        }
                    }
                    None => {
                        tracing::info!("All controller handles dropped. Shutting down.");
                        break;
                    }
                },
                event = next_event(&mut self.events), if self.events.is_some() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => {
                        tracing::warn!("Transport event stream ended without a close update.");
                        self.on_connection_closed(None);
                    }
                },
            }
        }

        self.cancel_pending_init();
        self.end_session().await;
        tracing::info!("Connection controller stopped.");
        Ok(())
    }

    /// Handles an incoming command. Returns `true` if the controller should shut down.
    async fn handle_command(&mut self, command: ControllerCommand) -> bool {
        match command {
            ControllerCommand::Connect => {
                if self.session.is_some() && self.status_tx.borrow().is_connected() {
                    tracing::debug!("Connect requested while already connected. Ignoring.");
                } else {
                    self.supersede_pending_init();
                    self.initialize().await;
                }
            }
            ControllerCommand::Init { generation } => self.handle_scheduled_init(generation).await,
            ControllerCommand::SendMessage {
                recipient,
                payload,
                reply,
            } => {
                let result = self.send_message(&recipient, &payload).await;
                let _ = reply.send(result);
            }
            ControllerCommand::Restart { reply } => {
                self.restart().await;
                let _ = reply.send(());
            }
            ControllerCommand::Logout { reply } => {
                let result = self.logout().await;
                let _ = reply.send(result);
            }
            ControllerCommand::ClearAuthData { reply } => {
                let result = self.clear_auth_data().await;
                let _ = reply.send(result);
            }
            ControllerCommand::Shutdown => {
                tracing::info!("Received shutdown command. Exiting.");
                return true;
            }
        }
        false
    }

    async fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Qr(token) => {
                tracing::info!("New pairing QR code received.");
                self.update_status(|status| {
                    status.qr_code = Some(token);
                    if status.state == ConnectionState::Connected {
                        status.state = ConnectionState::Connecting;
                    }
                });
            }
            TransportEvent::Connection { status, cause } => match status {
                ConnectionStatus::Opening => {
                    tracing::info!("Connecting to the messaging network...");
                    self.set_state(ConnectionState::Connecting);
                }
                ConnectionStatus::Open => {
                    tracing::info!("Messaging connection opened successfully.");
                    self.update_status(|status| {
                        status.state = ConnectionState::Connected;
                        status.qr_code = None;
                    });
                }
                ConnectionStatus::Closed => self.on_connection_closed(cause),
            },
            TransportEvent::CredentialsChanged(creds) => self.persist_credentials(&creds).await,
        }
    }

    /// Saves inline so credential writes stay ordered with events. Retries hold the
    /// loop for at most the sum of the configured backoffs.
    async fn persist_credentials(&mut self, creds: &Credentials) {
        match self.credentials.save(creds).await {
            Ok(()) => {
                tracing::debug!("Credentials persisted.");
                if self.status_tx.borrow().last_credential_error.is_some() {
                    self.update_status(|status| status.last_credential_error = None);
                }
            }
            Err(e) => {
                tracing::error!("Credential update was not persisted: {}", e);
                let message = e.to_string();
                self.update_status(|status| status.last_credential_error = Some(message));
            }
        }
    }

    fn on_connection_closed(&mut self, cause: Option<CloseCause>) {
        match &cause {
            Some(cause) => tracing::warn!(
                status_code = ?cause.status_code,
                reason = ?cause.reason,
                "Connection closed: {}",
                cause.message
            ),
            None => tracing::warn!("Connection closed: unknown cause"),
        }

        // The closed session is finished; its stream and handle are not reused.
        self.session = None;
        self.events = None;

        match reconnect_delay(cause.as_ref(), &self.config.reconnect) {
            Some(delay) => {
                self.update_status(|status| {
                    status.state = ConnectionState::Connecting;
                    status.qr_code = None;
                });
                tracing::info!(delay_ms = delay.as_millis() as u64, "Scheduling reconnect.");
                self.schedule_init(delay);
            }
            None => {
                self.supersede_pending_init();
                self.update_status(|status| {
                    status.state = ConnectionState::LoggedOut;
                    status.qr_code = None;
                });
                tracing::info!("Not reconnecting: the device was logged out.");
            }
        }
    }

    async fn handle_scheduled_init(&mut self, generation: u64) {
        if generation != self.generation {
            tracing::debug!(generation, current = self.generation, "Ignoring stale reconnect.");
            return;
        }
        let state = self.status_tx.borrow().state;
        if matches!(state, ConnectionState::LoggedOut | ConnectionState::Connected) {
            tracing::debug!(?state, "Ignoring reconnect in current state.");
            return;
        }
        self.pending_init = None;
        tracing::info!("Attempting to reconnect...");
        self.initialize().await;
    }

    /// Opens a new transport session bound to the persisted auth state.
    async fn initialize(&mut self) {
        self.set_state(ConnectionState::Connecting);
        self.end_session().await;

        let fresh = self.transport.fresh_credentials();
        let creds = if self.retry_purge().await {
            self.credentials.load(fresh).await
        } else {
            tracing::warn!("Stale auth state could not be purged, pairing with fresh credentials.");
            fresh
        };
        let auth = build_auth_state(self.store.clone(), creds);

        match self.transport.open(auth).await {
            Ok(Session { handle, events }) => {
                tracing::info!("Transport session opened, waiting for connection updates.");
                self.session = Some(handle);
                self.events = Some(events);
            }
            Err(e) => {
                let delay = self.config.reconnect.init_retry_delay();
                tracing::error!(
                    retry_in_ms = delay.as_millis() as u64,
                    "Failed to open transport session: {}",
                    e
                );
                self.set_state(ConnectionState::Disconnected);
                self.schedule_init(delay);
            }
        }
    }

    async fn send_message(&mut self, recipient: &str, payload: &str) -> Result<bool, ControllerError> {
        let session = match &self.session {
            Some(session) if self.status_tx.borrow().is_connected() => session.clone(),
            _ => return Err(ControllerError::NotConnected),
        };

        let address = normalize_recipient(recipient, &self.config.addressing)?;
        tracing::info!(address = %address, "Sending message...");

        match session.check_registered(&address).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(address = %address, "Recipient is not registered, proceeding anyway.")
            }
            Err(e) => {
                tracing::warn!(address = %address, "Could not verify recipient, proceeding anyway: {}", e)
            }
        }

        match session.send(&address, payload).await {
            Ok(()) => {
                tracing::info!(address = %address, "Message sent successfully.");
                Ok(true)
            }
            Err(e) => {
                tracing::error!(address = %address, "Failed to send message: {}", e);
                Ok(false)
            }
        }
    }

    async fn restart(&mut self) {
        tracing::info!("Restarting messaging session.");
        self.end_session().await;
        self.update_status(|status| {
            status.state = ConnectionState::Connecting;
            status.qr_code = None;
        });
        self.schedule_init(self.config.reconnect.restart_delay());
    }

    async fn logout(&mut self) -> Result<(), ControllerError> {
        let session = match &self.session {
            Some(session) if self.status_tx.borrow().is_connected() => session.clone(),
            _ => return Err(ControllerError::NotConnected),
        };

        session.logout().await?;
        self.supersede_pending_init();
        self.end_session().await;
        self.update_status(|status| {
            status.state = ConnectionState::LoggedOut;
            status.qr_code = None;
        });

        match self.store.clear_all().await {
            Ok(removed) => {
                tracing::info!(removed, "Logged out and purged stored auth state.");
                Ok(())
            }
            Err(e) => {
                tracing::error!("Logged out but failed to purge stored auth state: {}", e);
                self.purge_pending = true;
                Err(e.into())
            }
        }
    }

    /// Retries a purge left over from a failed logout. Returns `false` while the
    /// stored auth state is still stale.
    async fn retry_purge(&mut self) -> bool {
        if !self.purge_pending {
            return true;
        }
        match self.store.clear_all().await {
            Ok(removed) => {
                tracing::info!(removed, "Purged auth state left over from logout.");
                self.purge_pending = false;
                true
            }
            Err(e) => {
                tracing::error!("Failed to purge auth state left over from logout: {}", e);
                false
            }
        }
    }

    async fn clear_auth_data(&mut self) -> Result<u64, ControllerError> {
        self.supersede_pending_init();
        self.end_session().await;
        self.update_status(|status| {
            status.state = ConnectionState::Disconnected;
            status.qr_code = None;
        });

        let removed = self.store.clear_all().await?;
        self.purge_pending = false;
        tracing::info!(removed, "Cleared stored auth state.");
        Ok(removed)
    }

    /// Schedules an init after `delay`, replacing any pending one.
    fn schedule_init(&mut self, delay: Duration) {
        self.supersede_pending_init();
        let generation = self.generation;
        let command_tx = self.command_tx.clone();

        self.pending_init = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(command_tx) = command_tx.upgrade() {
                if command_tx
                    .send(ControllerCommand::Init { generation })
                    .await
                    .is_err()
                {
                    tracing::warn!("Failed to deliver scheduled reconnect: controller is down");
                }
            }
        }));
    }

    /// Invalidates every previously scheduled init.
    fn supersede_pending_init(&mut self) {
        self.cancel_pending_init();
        self.generation += 1;
    }

    fn cancel_pending_init(&mut self) {
        if let Some(pending) = self.pending_init.take() {
            pending.abort();
        }
    }

    /// Ends the live session, if any. Best-effort: `end` cannot fail.
    async fn end_session(&mut self) {
        self.events = None;
        if let Some(session) = self.session.take() {
            session.end().await;
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.update_status(|status| {
            status.state = state;
            if state == ConnectionState::Connected {
                status.qr_code = None;
            }
        });
    }

    fn update_status(&self, apply: impl FnOnce(&mut ControllerStatus)) {
        self.status_tx.send_modify(apply);
    }
}

async fn next_event(events: &mut Option<BoxStream<'static, TransportEvent>>) -> Option<TransportEvent> {
    match events {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}
