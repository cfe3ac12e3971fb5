use crate::error::StoreError;
use async_trait::async_trait;
use std::collections::HashMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The record key holding the long-lived session credentials.
pub const CREDS_KEY: &str = "creds";

/// Builds the record key for a piece of category-prefixed key material,
/// e.g. `pre-key-17` or `session-4471@s.whatsapp.net.0`.
pub fn category_key(category: &str, id: &str) -> String {
    format!("{category}-{id}")
}

/// Builds a `LIKE` pattern matching every record of the given category.
pub fn category_pattern(category: &str) -> String {
    format!("{category}-%")
}

/// Size and usage figures reported by a store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct StoreStats {
    pub total_keys: u64,
    pub approximate_byte_size: u64,
    pub storage_location: String,
}

/// A trait defining the required functionality for the persistent auth-state backend.
///
/// Records are opaque string blobs addressed by string keys. Implementations must
/// give upsert semantics (one record per key) and run every batch write in a
/// single transaction.
///
/// The read path never fails: a storage-layer error is logged by the
/// implementation and degraded to an empty or absent result, so that a damaged
/// store cannot prevent the controller from attempting a fresh connection. The
/// write path returns [`StoreError`].
#[async_trait]
pub trait AuthStore: Send + Sync {
    /// Inserts or replaces a single record.
    async fn put(&self, key: &str, blob: &str) -> Result<(), StoreError>;

    /// Inserts or replaces all entries atomically. Either every entry lands or none does.
    async fn put_batch(&self, entries: &[(String, String)]) -> Result<(), StoreError>;

    /// Writes `upserts` and deletes `deletions` in one transaction. Either the whole
    /// change lands or none of it does.
    async fn apply_batch(&self, upserts: &[(String, String)], deletions: &[String]) -> Result<(), StoreError>;

    /// Point lookup. Returns `None` for a missing key.
    async fn get(&self, key: &str) -> Option<String>;

    /// Batched lookup. Missing keys are omitted from the result.
    async fn get_batch(&self, keys: &[String]) -> HashMap<String, String>;

    /// Deletes a single record, returning whether it existed.
    async fn remove(&self, key: &str) -> Result<bool, StoreError>;

    /// Deletes all listed records atomically, returning how many existed.
    async fn remove_batch(&self, keys: &[String]) -> Result<u64, StoreError>;

    /// Lists keys ordered by last update, oldest first.
    async fn list_keys(&self, limit: Option<u32>, offset: Option<u32>) -> Vec<String>;

    /// Lists keys matching a `LIKE` pattern (e.g. `pre-key-%`), oldest update first.
    async fn list_keys_by_prefix(&self, pattern: &str) -> Vec<String>;

    /// Deletes every record and reclaims space. Returns the number of records removed.
    async fn clear_all(&self) -> Result<u64, StoreError>;

    /// Reports record count, approximate on-disk size and storage location.
    async fn stats(&self) -> StoreStats;
}
