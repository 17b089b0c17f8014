use std::{
    collections::{hash_map::Entry, HashMap},
    sync::{
        atomic::{AtomicBool, Ordering},
        RwLock,
    },
};

use super::{Error, MessageStore, Result};
use crate::types::{Message, MessageHash};

/// In-memory version of a message store.
#[derive(Debug, Default)]
pub struct InMemStore {
    inner: RwLock<HashMap<MessageHash, Message>>,
    closed: AtomicBool,
}

impl InMemStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        InMemStore::default()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Closed);
        }
        Ok(())
    }
}

impl MessageStore for InMemStore {
    fn put(&self, hash: MessageHash, message: &Message) -> Result<bool> {
        self.ensure_open()?;
        if let Entry::Vacant(entry) = self.inner.write().expect("should lock").entry(hash) {
            entry.insert(message.clone());
            return Ok(true);
        }
        Ok(false)
    }

    fn get(&self, hash: &MessageHash) -> Result<Option<Message>> {
        self.ensure_open()?;
        Ok(self.inner.read().expect("should lock").get(hash).cloned())
    }

    fn hashes(&self) -> Result<Vec<MessageHash>> {
        self.ensure_open()?;
        Ok(self
            .inner
            .read()
            .expect("should lock")
            .keys()
            .cloned()
            .collect())
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
