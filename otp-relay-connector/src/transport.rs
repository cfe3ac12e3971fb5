//! # Transport Abstraction
//!
//! The chat protocol itself (wire format, handshake, encryption) lives outside this
//! crate. The controller talks to it only through the traits defined here:
//!
//! - [`Transport`]: a factory that opens one session at a time.
//! - [`SessionHandle`]: the operations available on a live session.
//! - [`KeyStore`]: the key-material storage the connector hands to the transport.

use crate::{
    error::{AuthStateError, TransportError},
    events::{Credentials, TransportEvent},
};
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::{collections::HashMap, fmt, sync::Arc};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Key material returned by a [`KeyStore`] lookup, indexed by id.
pub type KeyMaterial = HashMap<String, serde_json::Value>;

/// A key-material update: `category -> id -> value`. A `None` value deletes the record.
pub type KeyUpdate = HashMap<String, HashMap<String, Option<serde_json::Value>>>;

/// Storage for auxiliary cryptographic key material (pre-keys, sessions, sender keys, ...).
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Fetches the values stored for `ids` within `category`. Missing or unreadable ids are omitted.
    async fn get(&self, category: &str, ids: &[String]) -> KeyMaterial;

    /// Applies an update atomically: every upsert and every deletion lands together or not at all.
    async fn set(&self, data: KeyUpdate) -> Result<(), AuthStateError>;
}

/// Everything a transport needs to resume (or start) a paired session.
#[derive(Clone)]
pub struct AuthState {
    pub creds: Credentials,
    pub keys: Arc<dyn KeyStore>,
}

impl fmt::Debug for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthState").finish_non_exhaustive()
    }
}

/// Operations on a live transport session.
#[async_trait]
pub trait SessionHandle: Send + Sync {
    /// Sends a text payload to a fully-qualified transport address.
    async fn send(&self, address: &str, payload: &str) -> Result<(), TransportError>;

    /// Asks the network whether `address` belongs to a registered account.
    async fn check_registered(&self, address: &str) -> Result<bool, TransportError>;

    /// Closes the session without invalidating the pairing.
    async fn end(&self);

    /// Invalidates the pairing on the server side.
    async fn logout(&self) -> Result<(), TransportError>;
}

/// A freshly opened session: its handle plus the ordered stream of its events.
pub struct Session {
    pub handle: Arc<dyn SessionHandle>,
    pub events: BoxStream<'static, TransportEvent>,
}

impl Session {
    pub fn new(handle: Arc<dyn SessionHandle>, events: BoxStream<'static, TransportEvent>) -> Self {
        Self { handle, events }
    }

    /// Builds a session whose events are fed through an `mpsc` channel.
    pub fn from_receiver(handle: Arc<dyn SessionHandle>, events: mpsc::Receiver<TransportEvent>) -> Self {
        Self::new(handle, Box::pin(ReceiverStream::new(events)))
    }
}

/// Opens sessions against the messaging network.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Returns a newly initialized credential object for an unpaired device.
    fn fresh_credentials(&self) -> Credentials;

    /// Opens a new session bound to the given auth state.
    async fn open(&self, auth: AuthState) -> Result<Session, TransportError>;
}
