use std::{
    convert::TryFrom,
    fmt::{self, Debug, Formatter},
    fs,
    sync::atomic::{AtomicBool, Ordering},
};

use lmdb::{
    self, Cursor, Database, DatabaseFlags, Environment, EnvironmentFlags, Transaction, WriteFlags,
};
use tracing::info;

use highway_types::Digest;

use super::{Config, Error, MessageStore, Result};
use crate::types::{Message, MessageHash};

/// Filename for the LMDB database created by the message store.
const STORAGE_DB_FILENAME: &str = "messages.lmdb";

/// OS-specific lmdb flags.
#[cfg(not(target_os = "macos"))]
const OS_FLAGS: EnvironmentFlags = EnvironmentFlags::WRITE_MAP;

/// OS-specific lmdb flags.
///
/// Mac OS X exhibits performance regressions when `WRITE_MAP` is used.
#[cfg(target_os = "macos")]
const OS_FLAGS: EnvironmentFlags = EnvironmentFlags::empty();

/// LMDB version of a message store.
pub struct LmdbStore {
    env: Environment,
    db: Database,
    closed: AtomicBool,
}

impl LmdbStore {
    /// Opens the store at `config.path`, creating the directory and database file if needed.
    pub fn new(config: &Config) -> Result<Self> {
        fs::create_dir_all(&config.path)
            .map_err(|error| Error::CreateDatabaseDirectory(config.path.clone(), error))?;
        let db_path = config.path.join(STORAGE_DB_FILENAME);
        let env = Environment::new()
            .set_flags(
                OS_FLAGS
                // We manage our own directory.
                | EnvironmentFlags::NO_SUB_DIR,
            )
            .set_max_dbs(1)
            .set_map_size(config.max_message_store_size)
            .open(&db_path)?;
        let db = env.create_db(Some("messages"), DatabaseFlags::empty())?;

        info!("opened DB at {}", db_path.display());

        Ok(LmdbStore {
            env,
            db,
            closed: AtomicBool::new(false),
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Closed);
        }
        Ok(())
    }
}

impl Debug for LmdbStore {
    fn fmt(&self, formatter: &mut Formatter) -> fmt::Result {
        formatter
            .debug_struct("LmdbStore")
            .field("closed", &self.closed)
            .finish()
    }
}

impl MessageStore for LmdbStore {
    fn put(&self, hash: MessageHash, message: &Message) -> Result<bool> {
        self.ensure_open()?;
        let serialized_value = bincode::serialize(message)?;
        let mut txn = self.env.begin_rw_txn()?;
        let result = match txn.put(self.db, &hash, &serialized_value, WriteFlags::NO_OVERWRITE) {
            Ok(()) => true,
            Err(lmdb::Error::KeyExist) => false,
            Err(error) => return Err(error.into()),
        };
        txn.commit()?;
        Ok(result)
    }

    fn get(&self, hash: &MessageHash) -> Result<Option<Message>> {
        self.ensure_open()?;
        let txn = self.env.begin_ro_txn()?;
        let message = match txn.get(self.db, hash) {
            Ok(serialized_value) => Some(bincode::deserialize(serialized_value)?),
            Err(lmdb::Error::NotFound) => None,
            Err(error) => return Err(error.into()),
        };
        txn.commit()?;
        Ok(message)
    }

    fn hashes(&self) -> Result<Vec<MessageHash>> {
        self.ensure_open()?;
        let txn = self.env.begin_ro_txn()?;
        let mut hashes = vec![];
        {
            let mut cursor = txn.open_ro_cursor(self.db)?;
            for (key, _value) in cursor.iter() {
                let digest = Digest::try_from(key).map_err(|_| Error::InvalidKey(key.len()))?;
                hashes.push(MessageHash::new(digest));
            }
        }
        txn.commit()?;
        Ok(hashes)
    }

    fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.env.sync(true)?;
        }
        Ok(())
    }
}
