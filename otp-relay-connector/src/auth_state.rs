//! # Auth-State Adapter
//!
//! Binds an [`AuthStore`] to the storage contract the transport expects:
//!
//! - [`SignalKeyStore`] maps `(category, id)` key material onto `"<category>-<id>"`
//!   records, batching every lookup and every update.
//! - [`CredentialStore`] loads and persists the single `"creds"` record. Loading is
//!   best-effort; saving retries a bounded number of times and then surfaces the failure.

use crate::{
    config::CredentialsConfig,
    error::AuthStateError,
    events::Credentials,
    storage::{category_key, AuthStore, CREDS_KEY},
    transport::{AuthState, KeyMaterial, KeyStore, KeyUpdate},
};
use async_trait::async_trait;
use std::sync::Arc;

/// Builds the auth state handed to the transport when a session is opened.
pub fn build_auth_state(store: Arc<dyn AuthStore>, creds: Credentials) -> AuthState {
    AuthState {
        creds,
        keys: Arc::new(SignalKeyStore::new(store)),
    }
}

/// Shallow-merges `stored` into `base`: every top-level field of `stored` replaces
/// the field of the same name in `base`. A stored value that is not an object is ignored.
pub fn merge_credentials(base: &mut Credentials, stored: Credentials) {
    let stored_fields = match stored {
        serde_json::Value::Object(fields) => fields,
        other => {
            tracing::warn!("Stored credentials are not an object ({}), ignoring them", type_name(&other));
            return;
        }
    };

    if let Some(base_fields) = base.as_object_mut() {
        base_fields.extend(stored_fields);
        return;
    }
    *base = serde_json::Value::Object(stored_fields);
}

fn type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// A [`KeyStore`] backed by an [`AuthStore`].
#[derive(Clone)]
pub struct SignalKeyStore {
    store: Arc<dyn AuthStore>,
}

impl SignalKeyStore {
    pub fn new(store: Arc<dyn AuthStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl KeyStore for SignalKeyStore {
    async fn get(&self, category: &str, ids: &[String]) -> KeyMaterial {
        let keys: Vec<String> = ids.iter().map(|id| category_key(category, id)).collect();
        let mut rows = self.store.get_batch(&keys).await;

        let mut material = KeyMaterial::with_capacity(rows.len());
        for (id, key) in ids.iter().zip(keys) {
            let Some(blob) = rows.remove(&key) else {
                continue;
            };
            match serde_json::from_str(&blob) {
                Ok(value) => {
                    material.insert(id.clone(), value);
                }
                Err(e) => {
                    tracing::error!(key = %key, "Failed to parse stored key material: {}", e);
                }
            }
        }
        material
    }

    async fn set(&self, data: KeyUpdate) -> Result<(), AuthStateError> {
        let mut upserts = Vec::new();
        let mut deletions = Vec::new();

        for (category, entries) in data {
            for (id, value) in entries {
                let key = category_key(&category, &id);
                match value {
                    Some(value) => upserts.push((key, serde_json::to_string(&value)?)),
                    None => deletions.push(key),
                }
            }
        }

        if !upserts.is_empty() || !deletions.is_empty() {
            self.store.apply_batch(&upserts, &deletions).await?;
        }

        tracing::debug!(
            written = upserts.len(),
            deleted = deletions.len(),
            "Applied key material update"
        );
        Ok(())
    }
}

/// Loads and persists the `"creds"` record.
#[derive(Clone)]
pub struct CredentialStore {
    store: Arc<dyn AuthStore>,
    policy: CredentialsConfig,
}

impl CredentialStore {
    pub fn new(store: Arc<dyn AuthStore>, policy: CredentialsConfig) -> Self {
        Self { store, policy }
    }

    /// Merges the persisted credentials (if any) into `fresh`.
    ///
    /// A missing, unreadable or corrupt record leaves `fresh` untouched; the
    /// failure is logged and never propagated.
    pub async fn load(&self, mut fresh: Credentials) -> Credentials {
        let Some(blob) = self.store.get(CREDS_KEY).await else {
            tracing::info!("No stored credentials found, a new pairing will be required");
            return fresh;
        };

        match serde_json::from_str::<Credentials>(&blob) {
            Ok(stored) => {
                merge_credentials(&mut fresh, stored);
                tracing::info!("Loaded stored credentials");
            }
            Err(e) => {
                tracing::error!("Failed to parse stored credentials, starting fresh: {}", e);
            }
        }
        fresh
    }

    /// Serializes `creds` and writes it to the `"creds"` record.
    ///
    /// Each failed attempt is retried after a linearly growing backoff; once the
    /// configured attempts are exhausted the last store error is returned.
    pub async fn save(&self, creds: &Credentials) -> Result<(), AuthStateError> {
        let blob = serde_json::to_string(creds)?;
        let attempts = self.policy.attempts();

        let mut attempt = 1;
        loop {
            match self.store.put(CREDS_KEY, &blob).await {
                Ok(()) => return Ok(()),
                Err(source) if attempt >= attempts => {
                    return Err(AuthStateError::CredentialWrite { attempts, source });
                }
                Err(e) => {
                    tracing::warn!(attempt, attempts, "Failed to save credentials, retrying: {}", e);
                    tokio::time::sleep(self.policy.backoff_for(attempt)).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stored_fields_override_fresh_ones() {
        let mut fresh = json!({ "registrationId": 1, "noiseKey": "fresh", "platform": "web" });
        merge_credentials(&mut fresh, json!({ "registrationId": 42, "me": { "id": "6281@s.whatsapp.net" } }));

        assert_eq!(fresh["registrationId"], 42);
        assert_eq!(fresh["noiseKey"], "fresh");
        assert_eq!(fresh["me"]["id"], "6281@s.whatsapp.net");
    }

    #[test]
    fn non_object_stored_value_is_ignored() {
        let mut fresh = json!({ "registrationId": 1 });
        merge_credentials(&mut fresh, json!("garbage"));
        assert_eq!(fresh, json!({ "registrationId": 1 }));
    }
}
