//! redb-backed event store
//!
//! Entries are postcard-encoded under their id. Two index tables keep the
//! hot queries off full scans:
//!
//! - `guild_timeline`: `guild ++ created_at ++ id`, for the newest-first read path
//! - `pending_by_target`: `guild ++ target ++ created_at ++ id`, entries still
//!   waiting for their actor, grouped by the object they concern
//!
//! Every mutation (including the guarded patch) runs in a single write
//! transaction, so a stale patch never reaches disk. redb calls block on disk
//! I/O, so each one runs on the blocking pool.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use modlog_core::{ActionType, EntryId, EventEntry, GuildId};
use redb::{Database, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, trace};

use crate::error::StorageError;
use crate::{EntryPatch, EventStore, PatchOutcome, oldest_first};

// Key: entry id (16 bytes), Value: postcard EventEntry
const ENTRIES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("event_entries");

// Key: guild (8) ++ created_at (8) ++ entry id (16), Value: empty
const GUILD_TIMELINE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("guild_timeline");

// Key: guild (8) ++ target len (2) ++ target ++ created_at (8) ++ entry id (16), Value: empty
const PENDING_BY_TARGET: TableDefinition<&[u8], &[u8]> = TableDefinition::new("pending_by_target");

const EMPTY: &[u8] = &[];

/// created_at ++ id
const KEY_SUFFIX_LEN: usize = 24;

/// Configuration for the redb event store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedbStoreConfig {
    /// Path to the database file
    pub db_path: PathBuf,
}

impl Default for RedbStoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/modlog.redb"),
        }
    }
}

/// Persistent implementation of [`EventStore`]
#[derive(Clone)]
pub struct RedbEventStore {
    db: Arc<Database>,
    config: RedbStoreConfig,
}

fn db_err(e: impl std::fmt::Display) -> StorageError {
    StorageError::Database(e.to_string())
}

/// Created-at as a big-endian sortable key (sign bit flipped)
fn time_key(at: DateTime<Utc>) -> [u8; 8] {
    ((at.timestamp_micros() as u64) ^ (1 << 63)).to_be_bytes()
}

fn timeline_key(entry: &EventEntry) -> Vec<u8> {
    let mut key = Vec::with_capacity(8 + KEY_SUFFIX_LEN);
    key.extend_from_slice(&entry.guild_id.get().to_be_bytes());
    key.extend_from_slice(&time_key(entry.created_at));
    key.extend_from_slice(entry.id.as_bytes());
    key
}

/// `guild ++ target len ++ target`, shared by every pending key of one target
///
/// The length prefix keeps targets like `5` and `55` in disjoint ranges.
fn target_prefix(guild: GuildId, target_id: &str) -> Result<Vec<u8>, StorageError> {
    let len = u16::try_from(target_id.len())
        .map_err(|_| StorageError::Encode(format!("target id too long: {}", target_id.len())))?;
    let mut key = Vec::with_capacity(10 + target_id.len() + KEY_SUFFIX_LEN);
    key.extend_from_slice(&guild.get().to_be_bytes());
    key.extend_from_slice(&len.to_be_bytes());
    key.extend_from_slice(target_id.as_bytes());
    Ok(key)
}

fn pending_key(entry: &EventEntry) -> Result<Vec<u8>, StorageError> {
    let mut key = target_prefix(entry.guild_id, &entry.target_id)?;
    key.extend_from_slice(&time_key(entry.created_at));
    key.extend_from_slice(entry.id.as_bytes());
    Ok(key)
}

/// Inclusive key bounds covering every `prefix ++ suffix` key
fn prefix_bounds(prefix: &[u8], suffix_len: usize) -> (Vec<u8>, Vec<u8>) {
    let lower = prefix.to_vec();
    let mut upper = prefix.to_vec();
    upper.extend(std::iter::repeat_n(0xFF, suffix_len));
    (lower, upper)
}

/// Entry id stored in the trailing 16 bytes of an index key
fn trailing_id(key: &[u8]) -> Result<EntryId, StorageError> {
    let start = key
        .len()
        .checked_sub(16)
        .ok_or_else(|| StorageError::decode("index key too short"))?;
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&key[start..]);
    Ok(EntryId::from_bytes(bytes))
}

fn encode(entry: &EventEntry) -> Result<Vec<u8>, StorageError> {
    postcard::to_allocvec(entry).map_err(|e| StorageError::Encode(e.to_string()))
}

fn decode(bytes: &[u8]) -> Result<EventEntry, StorageError> {
    Ok(postcard::from_bytes(bytes)?)
}

impl RedbEventStore {
    /// Open or create the database
    #[instrument(skip(config), fields(path = %config.db_path.display()))]
    pub fn open(config: RedbStoreConfig) -> Result<Self, StorageError> {
        if let Some(parent) = config.db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::create(&config.db_path).map_err(db_err)?;
        info!("Opened event store");

        let store = Self {
            db: Arc::new(db),
            config,
        };
        store.init_tables()?;
        Ok(store)
    }

    fn init_tables(&self) -> Result<(), StorageError> {
        let write_txn = self.db.begin_write().map_err(db_err)?;
        write_txn.open_table(ENTRIES).map_err(db_err)?;
        write_txn.open_table(GUILD_TIMELINE).map_err(db_err)?;
        write_txn.open_table(PENDING_BY_TARGET).map_err(db_err)?;
        write_txn.commit().map_err(db_err)?;

        debug!("Initialized event store tables");
        Ok(())
    }

    /// Get the configuration
    pub fn config(&self) -> &RedbStoreConfig {
        &self.config
    }

    /// Run `op` against the database on the blocking pool
    async fn blocking<T, F>(&self, op: F) -> Result<T, StorageError>
    where
        F: FnOnce(&Database) -> Result<T, StorageError> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || op(db.as_ref()))
            .await
            .map_err(|e| StorageError::Database(format!("blocking task failed: {e}")))?
    }
}

fn insert_entry(db: &Database, entry: &EventEntry) -> Result<(), StorageError> {
    let value = encode(entry)?;
    let write_txn = db.begin_write().map_err(db_err)?;
    {
        let mut entries = write_txn.open_table(ENTRIES).map_err(db_err)?;
        if entries
            .get(entry.id.as_bytes().as_slice())
            .map_err(db_err)?
            .is_some()
        {
            return Err(StorageError::Duplicate(entry.id));
        }
        entries
            .insert(entry.id.as_bytes().as_slice(), value.as_slice())
            .map_err(db_err)?;

        let mut timeline = write_txn.open_table(GUILD_TIMELINE).map_err(db_err)?;
        timeline
            .insert(timeline_key(entry).as_slice(), EMPTY)
            .map_err(db_err)?;

        if entry.waiting_for_backfill {
            let mut pending = write_txn.open_table(PENDING_BY_TARGET).map_err(db_err)?;
            pending
                .insert(pending_key(entry)?.as_slice(), EMPTY)
                .map_err(db_err)?;
        }
    }
    write_txn.commit().map_err(db_err)
}

fn pending_for_target(
    db: &Database,
    guild: GuildId,
    target_id: &str,
    actions: &[ActionType],
) -> Result<Vec<EventEntry>, StorageError> {
    let read_txn = db.begin_read().map_err(db_err)?;
    let pending = read_txn.open_table(PENDING_BY_TARGET).map_err(db_err)?;
    let entries = read_txn.open_table(ENTRIES).map_err(db_err)?;

    let (lower, upper) = prefix_bounds(&target_prefix(guild, target_id)?, KEY_SUFFIX_LEN);
    let mut matches = Vec::new();
    for item in pending
        .range(lower.as_slice()..=upper.as_slice())
        .map_err(db_err)?
    {
        let (key, _) = item.map_err(db_err)?;
        let id = trailing_id(key.value())?;
        let Some(bytes) = entries.get(id.as_bytes().as_slice()).map_err(db_err)? else {
            continue;
        };
        let entry = decode(bytes.value())?;
        if entry.waiting_for_backfill && actions.contains(&entry.action_type) {
            matches.push(entry);
        }
    }

    // keys order by microsecond; finish ties on the full timestamp
    matches.sort_by(oldest_first);
    Ok(matches)
}

fn patch_entry(
    db: &Database,
    id: EntryId,
    patch: &EntryPatch,
) -> Result<PatchOutcome, StorageError> {
    let write_txn = db.begin_write().map_err(db_err)?;
    let outcome = {
        let mut entries = write_txn.open_table(ENTRIES).map_err(db_err)?;
        let mut entry = match entries.get(id.as_bytes().as_slice()).map_err(db_err)? {
            Some(bytes) => decode(bytes.value())?,
            None => return Err(StorageError::NotFound(id)),
        };

        let outcome = patch.apply_to(&mut entry);
        if outcome.is_applied() {
            let value = encode(&entry)?;
            entries
                .insert(id.as_bytes().as_slice(), value.as_slice())
                .map_err(db_err)?;

            if patch.complete_backfill {
                let mut pending = write_txn.open_table(PENDING_BY_TARGET).map_err(db_err)?;
                pending
                    .remove(pending_key(&entry)?.as_slice())
                    .map_err(db_err)?;
            }
        }
        outcome
    };

    match outcome {
        PatchOutcome::Applied => write_txn.commit().map_err(db_err)?,
        PatchOutcome::Stale => write_txn.abort().map_err(db_err)?,
    }
    Ok(outcome)
}

fn load_entry(db: &Database, id: EntryId) -> Result<Option<EventEntry>, StorageError> {
    let read_txn = db.begin_read().map_err(db_err)?;
    let table = read_txn.open_table(ENTRIES).map_err(db_err)?;
    match table.get(id.as_bytes().as_slice()).map_err(db_err)? {
        Some(bytes) => Ok(Some(decode(bytes.value())?)),
        None => Ok(None),
    }
}

fn newest_for_guild(
    db: &Database,
    guild: GuildId,
    limit: usize,
) -> Result<Vec<EventEntry>, StorageError> {
    let read_txn = db.begin_read().map_err(db_err)?;
    let timeline = read_txn.open_table(GUILD_TIMELINE).map_err(db_err)?;
    let entries = read_txn.open_table(ENTRIES).map_err(db_err)?;

    let (lower, upper) = prefix_bounds(&guild.get().to_be_bytes(), KEY_SUFFIX_LEN);
    let mut listed = Vec::new();
    for item in timeline
        .range(lower.as_slice()..=upper.as_slice())
        .map_err(db_err)?
        .rev()
    {
        if listed.len() >= limit {
            break;
        }
        let (key, _) = item.map_err(db_err)?;
        let id = trailing_id(key.value())?;
        if let Some(bytes) = entries.get(id.as_bytes().as_slice()).map_err(db_err)? {
            listed.push(decode(bytes.value())?);
        }
    }
    Ok(listed)
}

#[async_trait]
impl EventStore for RedbEventStore {
    async fn insert(&self, entry: EventEntry) -> Result<(), StorageError> {
        let (id, guild) = (entry.id, entry.guild_id);
        self.blocking(move |db| insert_entry(db, &entry)).await?;
        trace!(entry = %id, guild = %guild, "Inserted entry");
        Ok(())
    }

    async fn find_pending(
        &self,
        guild: GuildId,
        target_id: &str,
        actions: &[ActionType],
    ) -> Result<Vec<EventEntry>, StorageError> {
        let target_id = target_id.to_owned();
        let actions = actions.to_vec();
        self.blocking(move |db| pending_for_target(db, guild, &target_id, &actions)).await
    }

    async fn patch(&self, id: EntryId, patch: EntryPatch) -> Result<PatchOutcome, StorageError> {
        let outcome = self.blocking(move |db| patch_entry(db, id, &patch)).await?;
        trace!(entry = %id, ?outcome, "Patched entry");
        Ok(outcome)
    }

    async fn get(&self, id: EntryId) -> Result<Option<EventEntry>, StorageError> {
        self.blocking(move |db| load_entry(db, id)).await
    }

    async fn list_for_guild(
        &self,
        guild: GuildId,
        limit: usize,
    ) -> Result<Vec<EventEntry>, StorageError> {
        self.blocking(move |db| newest_for_guild(db, guild, limit)).await
    }
}
