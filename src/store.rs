//! Persistent store for the three message collections.
//!
//! Each collection (messages, contacts, conversations) lives under one key as a
//! JSON array and is always read and written whole. A write serializes first,
//! then replaces the key with a single `put` and flushes. A serialization or
//! `put` failure therefore leaves the previous value in place, and the error
//! propagates to the caller. Writes touching several collections are not
//! atomic as a group.

use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::StorageConfig;
use crate::error::{Result, VmgError};
use crate::models::{Contact, Conversation, Message};

/// Key-value byte storage underneath the [`Store`]
#[cfg_attr(test, mockall::automock)]
pub trait StorageBackend {
    /// Read the value under `key`
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;
    /// Replace the value under `key`
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;
    /// Delete `key` if present
    fn remove(&self, key: &[u8]) -> Result<()>;
    /// Make earlier writes durable
    fn flush(&self) -> Result<()>;
}

/// Ephemeral storage for tests and throwaway sessions
#[derive(Debug, Default)]
pub struct MemoryBackend {
    data: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryBackend {
    /// Create an empty backend
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> VmgError {
    VmgError::Storage("memory backend lock poisoned".to_string())
}

impl StorageBackend for MemoryBackend {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.data.read().map_err(poisoned)?.get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.data
            .write()
            .map_err(poisoned)?
            .insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &[u8]) -> Result<()> {
        self.data.write().map_err(poisoned)?.remove(key);
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Durable storage in a sled database directory
pub struct SledBackend {
    db: sled::Db,
}

impl SledBackend {
    /// Open or create the database at `path`
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = sled::open(path)?;
        debug!(path = %path.display(), "Opened sled store");
        Ok(Self { db })
    }
}

impl StorageBackend for SledBackend {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.db.get(key)?.map(|value| value.to_vec()))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.db.insert(key, value)?;
        Ok(())
    }

    fn remove(&self, key: &[u8]) -> Result<()> {
        self.db.remove(key)?;
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}

/// The three logical collections
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    /// Decoded messages
    Messages,
    /// Derived contacts
    Contacts,
    /// Derived conversation aggregates
    Conversations,
}

impl Collection {
    /// Every collection, in storage order
    pub const ALL: [Self; 3] = [Self::Messages, Self::Contacts, Self::Conversations];

    /// Storage key of this collection
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Messages => "vmg_messages",
            Self::Contacts => "vmg_contacts",
            Self::Conversations => "vmg_conversations",
        }
    }
}

const EMPTY_COLLECTION: &[u8] = b"[]";

/// Whole-collection load/save over a [`StorageBackend`]
pub struct Store {
    backend: Box<dyn StorageBackend>,
}

impl Store {
    /// Wrap a backend. Call [`Store::initialize`] before use.
    #[must_use]
    pub fn new(backend: Box<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Store over a fresh [`MemoryBackend`], already initialized
    pub fn in_memory() -> Result<Self> {
        let store = Self::new(Box::new(MemoryBackend::new()));
        store.initialize()?;
        Ok(store)
    }

    /// Open the backend named by the configuration and initialize it
    pub fn open(config: &StorageConfig) -> Result<Self> {
        let backend: Box<dyn StorageBackend> = match config.backend.as_str() {
            "sled" => Box::new(SledBackend::open(Path::new(&config.path))?),
            "memory" => Box::new(MemoryBackend::new()),
            other => {
                return Err(VmgError::InvalidConfig(format!(
                    "unknown storage backend `{other}`; expected sled|memory"
                )))
            }
        };
        let store = Self::new(backend);
        store.initialize()?;
        Ok(store)
    }

    /// Seed absent collections with an empty list. Safe to call repeatedly.
    pub fn initialize(&self) -> Result<()> {
        for collection in Collection::ALL {
            let key = collection.key().as_bytes();
            if self.backend.get(key)?.is_none() {
                self.backend.put(key, EMPTY_COLLECTION)?;
            }
        }
        self.backend.flush()
    }

    /// Remove every collection, then re-seed them empty
    pub fn clear(&self) -> Result<()> {
        for collection in Collection::ALL {
            self.backend.remove(collection.key().as_bytes())?;
        }
        info!("Cleared all collections");
        self.initialize()
    }

    fn load<T: DeserializeOwned>(&self, collection: Collection) -> Result<Vec<T>> {
        match self.backend.get(collection.key().as_bytes())? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(Vec::new()),
        }
    }

    fn save<T: Serialize>(&self, collection: Collection, items: &[T]) -> Result<()> {
        let bytes = serde_json::to_vec(items)?;
        self.backend.put(collection.key().as_bytes(), &bytes)?;
        self.backend.flush()?;
        debug!(collection = collection.key(), count = items.len(), bytes = bytes.len(), "Wrote collection");
        Ok(())
    }

    /// Serialized length of a collection in bytes
    pub fn serialized_len(&self, collection: Collection) -> Result<usize> {
        Ok(self
            .backend
            .get(collection.key().as_bytes())?
            .map_or(0, |bytes| bytes.len()))
    }

    /// Read all messages
    pub fn load_messages(&self) -> Result<Vec<Message>> {
        self.load(Collection::Messages)
    }

    /// Replace all messages
    pub fn save_messages(&self, messages: &[Message]) -> Result<()> {
        self.save(Collection::Messages, messages)
    }

    /// Read all contacts
    pub fn load_contacts(&self) -> Result<Vec<Contact>> {
        self.load(Collection::Contacts)
    }

    /// Replace all contacts
    pub fn save_contacts(&self, contacts: &[Contact]) -> Result<()> {
        self.save(Collection::Contacts, contacts)
    }

    /// Read all conversations
    pub fn load_conversations(&self) -> Result<Vec<Conversation>> {
        self.load(Collection::Conversations)
    }

    /// Replace all conversations
    pub fn save_conversations(&self, conversations: &[Conversation]) -> Result<()> {
        self.save(Collection::Conversations, conversations)
    }
}
