//! Encrypted third-party API key management.
//!
//! Composes the [`CipherVault`] with the credential store: keys are sealed
//! before they reach the store and opened only transiently on read. This path
//! is independent of the session-token machinery.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::crypto::CipherVault;
use crate::db::CredentialStore;
use crate::errors::Result;

/// Public projection of a stored key: everything except the secret material.
#[derive(Debug, Clone, Serialize)]
pub struct ApiKeySummary {
    pub platform: String,
    pub is_active: bool,
    pub updated_at: DateTime<Utc>,
}

/// Stores and retrieves per-platform API keys, encrypted at rest.
pub struct ApiKeyService {
    store: Arc<dyn CredentialStore>,
    vault: CipherVault,
}

impl ApiKeyService {
    pub fn new(store: Arc<dyn CredentialStore>, vault: CipherVault) -> Self {
        Self { store, vault }
    }

    /// Encrypt and upsert the key for a platform (e.g. "youtube", "rapidapi").
    #[tracing::instrument(skip(self, key))]
    pub async fn set_api_key(&self, platform: &str, key: &str) -> Result<ApiKeySummary> {
        let sealed = self.vault.encrypt(key)?;
        let record = self.store.upsert_api_key(platform, &sealed).await?;

        tracing::info!(platform = %record.platform, "API key stored");

        Ok(ApiKeySummary {
            platform: record.platform,
            is_active: record.is_active,
            updated_at: record.updated_at,
        })
    }

    /// Decrypt every active key, keyed by platform.
    ///
    /// A key that fails to decrypt (corrupted or sealed under an older
    /// encryption key) is logged and omitted; one bad platform never fails
    /// the whole batch.
    #[tracing::instrument(skip(self))]
    pub async fn get_api_keys(&self) -> Result<HashMap<String, String>> {
        let records = self.store.list_active_api_keys().await?;

        let mut keys = HashMap::new();
        for record in records {
            match self.vault.decrypt(&record.sealed()) {
                Ok(plaintext) => {
                    keys.insert(record.platform, plaintext);
                }
                Err(e) => {
                    tracing::error!(platform = %record.platform, error = %e, "failed to decrypt API key, skipping");
                }
            }
        }

        Ok(keys)
    }

    /// Which platforms currently hold an active key. Touches no ciphertext.
    #[tracing::instrument(skip(self))]
    pub async fn get_api_keys_status(&self) -> Result<HashMap<String, bool>> {
        let records = self.store.list_active_api_keys().await?;

        Ok(records.into_iter().map(|r| (r.platform, true)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStore;

    const TEST_KEY: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

    fn service() -> ApiKeyService {
        ApiKeyService::new(
            Arc::new(MemoryStore::new()),
            CipherVault::new(TEST_KEY).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_set_and_get_roundtrip() {
        let service = service();

        let summary = service.set_api_key("youtube", "yt-key-material").await.unwrap();
        assert_eq!(summary.platform, "youtube");
        assert!(summary.is_active);

        let keys = service.get_api_keys().await.unwrap();
        assert_eq!(keys.get("youtube").map(String::as_str), Some("yt-key-material"));
    }

    #[tokio::test]
    async fn test_upsert_replaces_existing_key() {
        let service = service();

        service.set_api_key("rapidapi", "old").await.unwrap();
        service.set_api_key("rapidapi", "new").await.unwrap();

        let keys = service.get_api_keys().await.unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys.get("rapidapi").map(String::as_str), Some("new"));
    }

    #[tokio::test]
    async fn test_corrupted_key_is_omitted_not_fatal() {
        let store = Arc::new(MemoryStore::new());
        let vault = CipherVault::new(TEST_KEY).unwrap();

        // One healthy entry, one with a flipped bit in its tag
        let healthy = vault.encrypt("yt-key").unwrap();
        store.upsert_api_key("youtube", &healthy).await.unwrap();

        let mut corrupted = vault.encrypt("rapid-key").unwrap();
        let mut tag = hex::decode(&corrupted.auth_tag).unwrap();
        tag[0] ^= 0x01;
        corrupted.auth_tag = hex::encode(tag);
        store.upsert_api_key("rapidapi", &corrupted).await.unwrap();

        let service = ApiKeyService::new(store, vault);
        let keys = service.get_api_keys().await.unwrap();

        assert_eq!(keys.get("youtube").map(String::as_str), Some("yt-key"));
        assert!(!keys.contains_key("rapidapi"));

        // Status reporting is independent of decryptability
        let status = service.get_api_keys_status().await.unwrap();
        assert_eq!(status.get("rapidapi"), Some(&true));
    }

    #[tokio::test]
    async fn test_status_for_missing_platform() {
        let service = service();
        service.set_api_key("youtube", "key").await.unwrap();

        let status = service.get_api_keys_status().await.unwrap();
        assert_eq!(status.get("youtube"), Some(&true));
        assert!(!status.contains_key("rapidapi"));
    }
}
