use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use dashmap::DashMap;
use futures::future::BoxFuture;
use thiserror::Error;

use crate::dao::{
    models::SessionEntity,
    room_store::RoomStore,
    storage::{StorageError, StorageResult, ensure_record_key},
};

const KEY_PREFIX: &str = "hue_party_room_";

/// Failure injected by [`MemoryRoomStore::reject_writes`].
#[derive(Debug, Error)]
#[error("writes are currently rejected by the in-memory store")]
pub struct WritesRejected;

/// Process-local room store holding JSON text per key.
///
/// Clones share the same slots, so several clients in one process see each
/// other's writes exactly like browser tabs sharing local storage.
#[derive(Clone, Default)]
pub struct MemoryRoomStore {
    slots: Arc<DashMap<String, String>>,
    reject_writes: Arc<AtomicBool>,
    writes: Arc<AtomicUsize>,
}

impl MemoryRoomStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `put` fail until switched back off.
    pub fn reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    /// Number of successful writes since creation.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Overwrite a slot with arbitrary text, bypassing encoding.
    pub fn put_raw(&self, session_id: &str, text: impl Into<String>) {
        self.slots.insert(slot_key(session_id), text.into());
    }

    /// Raw text currently stored for a room.
    pub fn raw(&self, session_id: &str) -> Option<String> {
        self.slots
            .get(&slot_key(session_id))
            .map(|entry| entry.value().clone())
    }

    fn put_now(&self, session_id: &str, record: &SessionEntity) -> StorageResult<()> {
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(StorageError::unavailable(
                format!("cannot write room `{session_id}`"),
                WritesRejected,
            ));
        }
        ensure_record_key(session_id, record)?;
        let text = serde_json::to_string(record)
            .map_err(|source| StorageError::malformed(session_id, source))?;
        self.slots.insert(slot_key(session_id), text);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn get_now(&self, session_id: &str) -> StorageResult<Option<SessionEntity>> {
        let Some(text) = self.raw(session_id) else {
            return Ok(None);
        };
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|source| StorageError::malformed(session_id, source))
    }
}

impl RoomStore for MemoryRoomStore {
    fn put(&self, session_id: &str, record: SessionEntity) -> BoxFuture<'static, StorageResult<()>> {
        let result = self.put_now(session_id, &record);
        Box::pin(async move { result })
    }

    fn get(&self, session_id: &str) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let result = self.get_now(session_id);
        Box::pin(async move { result })
    }

    fn delete(&self, session_id: &str) -> BoxFuture<'static, StorageResult<()>> {
        self.slots.remove(&slot_key(session_id));
        Box::pin(async { Ok(()) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

fn slot_key(session_id: &str) -> String {
    format!("{KEY_PREFIX}{session_id}")
}
