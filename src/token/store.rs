use std::sync::Arc;

use jiff::Timestamp;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::errors::Error;

use super::record::timestamp_from_millis;
use super::storage::{
    ACCESS_TOKEN_KEY, ALL_KEYS, EXPIRES_KEY, MemoryStorage, REFRESH_EXPIRES_KEY,
    REFRESH_TOKEN_KEY, TOKEN_TYPE_KEY, TokenStorage,
};
use super::{RefreshTokenCipher, TokenMeta, TokenRecord};

/// Single source of truth for the current credentials.
///
/// Readers never observe a half-written pair: `set_tokens` and `clear` swap the whole
/// record under one write lock. Every mutation is written through to the storage
/// surface as a single `set_many` on the blocking pool; the refresh token is
/// encrypted there when a cipher is configured.
pub struct TokenStore {
    record: RwLock<Option<TokenRecord>>,
    storage: Arc<dyn TokenStorage>,
    cipher: Option<RefreshTokenCipher>,
}

impl TokenStore {
    pub fn new(storage: Arc<dyn TokenStorage>, cipher: Option<RefreshTokenCipher>) -> Self {
        Self {
            record: RwLock::new(None),
            storage,
            cipher,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()), None)
    }

    /// Builds a store primed with whatever the storage surface already holds.
    pub fn load(
        storage: Arc<dyn TokenStorage>,
        cipher: Option<RefreshTokenCipher>,
    ) -> Result<Self, Error> {
        let mut store = Self::new(storage, cipher);
        let record = store.read_persisted()?;
        debug!(restored = record.is_some(), "token.load");
        *store.record.get_mut() = record;
        Ok(store)
    }

    pub async fn access_token(&self) -> Option<String> {
        self.record
            .read()
            .await
            .as_ref()
            .map(|r| r.access_token.clone())
            .filter(|t| !t.is_empty())
    }

    pub async fn refresh_token(&self) -> Option<String> {
        self.record
            .read()
            .await
            .as_ref()
            .map(|r| r.refresh_token.clone())
            .filter(|t| !t.is_empty())
    }

    pub async fn token_type(&self) -> Option<String> {
        self.record
            .read()
            .await
            .as_ref()
            .map(|r| r.meta.token_type.clone())
    }

    /// `<type> <access>` for the `Authorization` header, when a token is held.
    pub async fn authorization(&self) -> Option<String> {
        self.record
            .read()
            .await
            .as_ref()
            .filter(|r| !r.access_token.is_empty())
            .map(TokenRecord::authorization)
    }

    pub async fn snapshot(&self) -> Option<TokenRecord> {
        self.record.read().await.clone()
    }

    pub async fn is_access_token_expired(&self) -> bool {
        match self.record.read().await.as_ref() {
            Some(record) => record.is_access_expired(Timestamp::now()),
            None => true,
        }
    }

    /// Replaces the held credentials. The in-memory record is updated even when
    /// persisting fails; the persistence error is returned.
    pub async fn set_tokens(
        &self,
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        meta: TokenMeta,
    ) -> Result<(), Error> {
        let record = TokenRecord::new(access_token.into(), refresh_token.into(), meta);
        let entries = self.entries_for(&record);
        let mut writer = self.record.write().await;
        *writer = Some(record);
        // later mutations queue behind this guard until the write lands
        let _reader = writer.downgrade();
        let persisted = self.persist(entries).await;
        if let Err(err) = &persisted {
            warn!(error = %err, "token.persist_failed");
        }
        persisted
    }

    pub async fn clear(&self) -> Result<(), Error> {
        let entries = ALL_KEYS.iter().map(|key| (*key, None)).collect();
        let mut writer = self.record.write().await;
        *writer = None;
        let _reader = writer.downgrade();
        let result = self.persist(entries).await;
        if let Err(err) = &result {
            warn!(error = %err, "token.clear_failed");
        }
        result
    }

    fn entries_for(&self, record: &TokenRecord) -> Vec<(&'static str, Option<String>)> {
        let refresh = match &self.cipher {
            Some(cipher) if !record.refresh_token.is_empty() => {
                cipher.encrypt(&record.refresh_token)
            }
            _ => record.refresh_token.clone(),
        };
        vec![
            (ACCESS_TOKEN_KEY, Some(record.access_token.clone())),
            (REFRESH_TOKEN_KEY, Some(refresh)),
            (TOKEN_TYPE_KEY, Some(record.meta.token_type.clone())),
            (
                EXPIRES_KEY,
                record.meta.expires_at.map(|t| t.as_millisecond().to_string()),
            ),
            (
                REFRESH_EXPIRES_KEY,
                record
                    .meta
                    .refresh_expires_at
                    .map(|t| t.as_millisecond().to_string()),
            ),
        ]
    }

    async fn persist(&self, entries: Vec<(&'static str, Option<String>)>) -> Result<(), Error> {
        let storage = Arc::clone(&self.storage);
        tokio::task::spawn_blocking(move || storage.set_many(&entries))
            .await
            .map_err(|err| Error::Io(std::io::Error::other(err)))?
    }

    fn read_persisted(&self) -> Result<Option<TokenRecord>, Error> {
        let Some(access_token) = self.storage.get(ACCESS_TOKEN_KEY)? else {
            return Ok(None);
        };
        let refresh_token = match (self.storage.get(REFRESH_TOKEN_KEY)?, &self.cipher) {
            (Some(stored), Some(cipher)) if !stored.is_empty() => cipher.decrypt(&stored)?,
            (Some(stored), _) => stored,
            (None, _) => String::new(),
        };
        let mut meta = TokenMeta::default();
        if let Some(token_type) = self.storage.get(TOKEN_TYPE_KEY)? {
            meta.token_type = token_type;
        }
        meta.expires_at = read_timestamp(self.storage.as_ref(), EXPIRES_KEY)?;
        meta.refresh_expires_at = read_timestamp(self.storage.as_ref(), REFRESH_EXPIRES_KEY)?;
        Ok(Some(TokenRecord::new(access_token, refresh_token, meta)))
    }
}

fn read_timestamp(storage: &dyn TokenStorage, key: &str) -> Result<Option<Timestamp>, Error> {
    match storage.get(key)? {
        Some(raw) => {
            let ms = raw
                .trim()
                .parse::<i64>()
                .map_err(|_| Error::Config(format!("stored {key} is not a timestamp: '{raw}'")))?;
            timestamp_from_millis(ms).map(Some)
        }
        None => Ok(None),
    }
}
