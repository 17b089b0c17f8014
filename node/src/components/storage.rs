//! Message storage.
//!
//! The consensus core keeps its index in memory and persists every message it accepts through a
//! [`MessageStore`]. The store is append-only: a message is stored under its hash, and storing
//! the same hash twice is a no-op. On restart the index is rebuilt from
//! [`MessageStore::hashes`] and [`MessageStore::get`].
//!
//! Two implementations are provided: [`InMemStore`] for tests and ephemeral nodes, and
//! [`LmdbStore`], which keeps bincode-encoded messages in a single LMDB file.

mod config;
mod error;
mod in_mem_store;
mod lmdb_store;

use crate::types::{Message, MessageHash};

pub use config::Config;
pub use error::{Error, Result};
pub use in_mem_store::InMemStore;
pub use lmdb_store::LmdbStore;

/// Trait defining the API for a message store.
pub trait MessageStore: Send + Sync {
    /// Stores `message` under `hash`.  Returns `true` if no entry previously existed.
    fn put(&self, hash: MessageHash, message: &Message) -> Result<bool>;

    /// Returns the message stored under `hash`, if any.
    fn get(&self, hash: &MessageHash) -> Result<Option<Message>>;

    /// Returns the hashes of all stored messages, in no particular order.
    fn hashes(&self) -> Result<Vec<MessageHash>>;

    /// Closes the store.  Every later call fails with [`Error::Closed`].
    fn close(&self) -> Result<()>;
}
