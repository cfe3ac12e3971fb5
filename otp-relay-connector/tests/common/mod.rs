#![allow(dead_code)]

use async_trait::async_trait;
use otp_relay_connector::{
    config::ConnectorConfig,
    controller::{ConnectionController, ConnectionState, ControllerHandle},
    error::{StoreError, TransportError},
    events::{Credentials, TransportEvent},
    storage::{AuthStore, StoreStats},
    transport::{AuthState, Session, SessionHandle, Transport},
};
use serde_json::json;
use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};

#[derive(Clone)]
struct Record {
    blob: String,
    updated: u64,
}

/// An in-memory `AuthStore` with failure injection for the write path.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<BTreeMap<String, Record>>,
    clock: AtomicU64,
    failing_writes: AtomicU32,
    failing_deletes: AtomicBool,
    put_attempts: AtomicU32,
}

impl MemoryStore {
    /// Makes the next `count` write operations fail.
    pub fn fail_next_writes(&self, count: u32) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    /// Makes every later batch fail while applying its deletions, after its upserts were staged.
    pub fn fail_deletes(&self) {
        self.failing_deletes.store(true, Ordering::SeqCst);
    }

    pub fn put_attempts(&self) -> u32 {
        self.put_attempts.load(Ordering::SeqCst)
    }

    pub fn blob(&self, key: &str) -> Option<String> {
        self.records.lock().unwrap().get(key).map(|r| r.blob.clone())
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn insert(&self, key: &str, blob: &str) {
        let updated = self.clock.fetch_add(1, Ordering::SeqCst);
        self.records.lock().unwrap().insert(
            key.to_string(),
            Record {
                blob: blob.to_string(),
                updated,
            },
        );
    }

    fn check_write(&self) -> Result<(), StoreError> {
        let remaining = self.failing_writes.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_writes.store(remaining - 1, Ordering::SeqCst);
            return Err(StoreError::backend(std::io::Error::other("injected write failure")));
        }
        Ok(())
    }

    fn ordered_keys(&self, filter: impl Fn(&str) -> bool) -> Vec<String> {
        let records = self.records.lock().unwrap();
        let mut keys: Vec<(&String, u64)> = records
            .iter()
            .filter(|(key, _)| filter(key))
            .map(|(key, record)| (key, record.updated))
            .collect();
        keys.sort_by_key(|(key, updated)| (*updated, (*key).clone()));
        keys.into_iter().map(|(key, _)| key.clone()).collect()
    }
}

#[async_trait]
impl AuthStore for MemoryStore {
    async fn put(&self, key: &str, blob: &str) -> Result<(), StoreError> {
        self.put_attempts.fetch_add(1, Ordering::SeqCst);
        self.check_write()?;
        self.insert(key, blob);
        Ok(())
    }

    async fn put_batch(&self, entries: &[(String, String)]) -> Result<(), StoreError> {
        self.check_write()?;
        for (key, blob) in entries {
            self.insert(key, blob);
        }
        Ok(())
    }

    async fn apply_batch(&self, upserts: &[(String, String)], deletions: &[String]) -> Result<(), StoreError> {
        self.check_write()?;
        let mut records = self.records.lock().unwrap();
        let mut staged = records.clone();
        for (key, blob) in upserts {
            let updated = self.clock.fetch_add(1, Ordering::SeqCst);
            staged.insert(
                key.clone(),
                Record {
                    blob: blob.clone(),
                    updated,
                },
            );
        }
        if !deletions.is_empty() && self.failing_deletes.load(Ordering::SeqCst) {
            return Err(StoreError::Closed);
        }
        for key in deletions {
            staged.remove(key);
        }
        *records = staged;
        Ok(())
    }

    async fn get(&self, key: &str) -> Option<String> {
        self.blob(key)
    }

    async fn get_batch(&self, keys: &[String]) -> HashMap<String, String> {
        keys.iter()
            .filter_map(|key| self.blob(key).map(|blob| (key.clone(), blob)))
            .collect()
    }

    async fn remove(&self, key: &str) -> Result<bool, StoreError> {
        self.check_write()?;
        Ok(self.records.lock().unwrap().remove(key).is_some())
    }

    async fn remove_batch(&self, keys: &[String]) -> Result<u64, StoreError> {
        self.check_write()?;
        let mut records = self.records.lock().unwrap();
        Ok(keys.iter().filter(|key| records.remove(*key).is_some()).count() as u64)
    }

    async fn list_keys(&self, limit: Option<u32>, offset: Option<u32>) -> Vec<String> {
        self.ordered_keys(|_| true)
            .into_iter()
            .skip(offset.unwrap_or(0) as usize)
            .take(limit.map_or(usize::MAX, |l| l as usize))
            .collect()
    }

    async fn list_keys_by_prefix(&self, pattern: &str) -> Vec<String> {
        match pattern.strip_suffix('%') {
            Some(prefix) => self.ordered_keys(|key| key.starts_with(prefix)),
            None => self.ordered_keys(|key| key == pattern),
        }
    }

    async fn clear_all(&self) -> Result<u64, StoreError> {
        self.check_write()?;
        let mut records = self.records.lock().unwrap();
        let count = records.len() as u64;
        records.clear();
        Ok(count)
    }

    async fn stats(&self) -> StoreStats {
        let records = self.records.lock().unwrap();
        StoreStats {
            total_keys: records.len() as u64,
            approximate_byte_size: records.values().map(|r| r.blob.len() as u64).sum(),
            storage_location: ":memory:".to_string(),
        }
    }
}

/// A scripted session: records every call and fails on demand.
#[derive(Default)]
pub struct FakeSession {
    pub sent: Mutex<Vec<(String, String)>>,
    pub registration_checks: AtomicUsize,
    pub registered: AtomicBool,
    pub fail_check: AtomicBool,
    pub fail_send: AtomicBool,
    pub ended: AtomicBool,
    pub logged_out: AtomicBool,
}

impl FakeSession {
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn was_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionHandle for FakeSession {
    async fn send(&self, address: &str, payload: &str) -> Result<(), TransportError> {
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(TransportError::Failed("ack timeout".to_string()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((address.to_string(), payload.to_string()));
        Ok(())
    }

    async fn check_registered(&self, _address: &str) -> Result<bool, TransportError> {
        self.registration_checks.fetch_add(1, Ordering::SeqCst);
        if self.fail_check.load(Ordering::SeqCst) {
            return Err(TransportError::Failed("usync query failed".to_string()));
        }
        Ok(self.registered.load(Ordering::SeqCst))
    }

    async fn end(&self) {
        self.ended.store(true, Ordering::SeqCst);
    }

    async fn logout(&self) -> Result<(), TransportError> {
        self.logged_out.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// A transport that hands out `FakeSession`s and lets the test push their events.
pub struct FakeTransport {
    opens: watch::Sender<usize>,
    failing_opens: AtomicU32,
    sessions: Mutex<Vec<(Arc<FakeSession>, Option<mpsc::Sender<TransportEvent>>)>>,
    auth_states: Mutex<Vec<AuthState>>,
}

impl Default for FakeTransport {
    fn default() -> Self {
        Self {
            opens: watch::channel(0).0,
            failing_opens: AtomicU32::new(0),
            sessions: Mutex::new(Vec::new()),
            auth_states: Mutex::new(Vec::new()),
        }
    }
}

impl FakeTransport {
    pub fn fresh() -> Credentials {
        json!({ "registrationId": 0, "noiseKey": "fresh" })
    }

    /// Makes the next `count` session opens fail.
    pub fn fail_next_opens(&self, count: u32) {
        self.failing_opens.store(count, Ordering::SeqCst);
    }

    /// Number of sessions successfully opened so far.
    pub fn open_count(&self) -> usize {
        *self.opens.borrow()
    }

    pub async fn wait_for_opens(&self, count: usize) {
        let mut opens = self.opens.subscribe();
        opens
            .wait_for(|n| *n >= count)
            .await
            .expect("transport dropped");
    }

    pub fn session(&self, index: usize) -> Arc<FakeSession> {
        self.sessions.lock().unwrap()[index].0.clone()
    }

    pub fn latest_session(&self) -> Arc<FakeSession> {
        let sessions = self.sessions.lock().unwrap();
        sessions.last().expect("no session opened").0.clone()
    }

    pub fn latest_auth(&self) -> AuthState {
        let auth_states = self.auth_states.lock().unwrap();
        auth_states.last().expect("no session opened").clone()
    }

    /// Pushes an event onto the most recently opened session's stream.
    pub async fn emit(&self, event: TransportEvent) {
        let tx = {
            let sessions = self.sessions.lock().unwrap();
            let latest = sessions.last().expect("no session opened");
            latest.1.clone().expect("session stream already ended")
        };
        tx.send(event).await.expect("controller dropped the session stream");
    }

    /// Ends the latest session's event stream without a close update.
    pub fn end_stream(&self) {
        let mut sessions = self.sessions.lock().unwrap();
        sessions.last_mut().expect("no session opened").1 = None;
    }
}

#[async_trait]
impl Transport for FakeTransport {
    fn fresh_credentials(&self) -> Credentials {
        Self::fresh()
    }

    async fn open(&self, auth: AuthState) -> Result<Session, TransportError> {
        let remaining = self.failing_opens.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_opens.store(remaining - 1, Ordering::SeqCst);
            return Err(TransportError::Failed("handshake refused".to_string()));
        }

        let (tx, rx) = mpsc::channel(16);
        let session = Arc::new(FakeSession::default());
        self.sessions.lock().unwrap().push((session.clone(), Some(tx)));
        self.auth_states.lock().unwrap().push(auth);
        self.opens.send_modify(|n| *n += 1);

        Ok(Session::from_receiver(session, rx))
    }
}

/// A running controller wired to fakes.
pub struct Harness {
    pub handle: ControllerHandle,
    pub transport: Arc<FakeTransport>,
    pub store: Arc<MemoryStore>,
    pub task: JoinHandle<anyhow::Result<()>>,
}

impl Harness {
    /// Spawns a controller without connecting it.
    pub fn spawn(store: Arc<MemoryStore>) -> Self {
        let transport = Arc::new(FakeTransport::default());
        let (controller, handle) = ConnectionController::new(
            Arc::new(ConnectorConfig::default()),
            transport.clone(),
            store.clone(),
        );
        let task = tokio::spawn(controller.run());
        Self {
            handle,
            transport,
            store,
            task,
        }
    }

    /// Spawns a controller and waits until its first session is open.
    pub async fn connecting() -> Self {
        Self::connecting_with(Arc::new(MemoryStore::default())).await
    }

    pub async fn connecting_with(store: Arc<MemoryStore>) -> Self {
        let harness = Self::spawn(store);
        harness.handle.connect().await.expect("controller is running");
        harness.transport.wait_for_opens(1).await;
        harness
    }

    /// Spawns a controller whose first session reported `open`.
    pub async fn connected() -> Self {
        let harness = Self::connecting().await;
        harness.transport.emit(TransportEvent::opened()).await;
        harness.wait_for_state(ConnectionState::Connected).await;
        harness
    }

    pub async fn wait_for_state(&self, state: ConnectionState) {
        let mut status = self.handle.subscribe();
        status
            .wait_for(|s| s.state == state)
            .await
            .expect("controller stopped");
    }
}

/// Polls `condition` on the (paused) test clock until it holds.
pub async fn eventually(condition: impl Fn() -> bool) {
    for _ in 0..1_000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("condition not reached");
}
