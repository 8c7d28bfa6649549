#[cfg(feature = "couch-store")]
pub mod couchdb;
pub mod memory;

use crate::dao::models::SessionEntity;
use crate::dao::storage::StorageResult;
use futures::future::BoxFuture;

pub use memory::MemoryRoomStore;

/// Shared key-value slot every client reads and writes, one record per room.
///
/// The store offers last-write-wins per key and nothing else: no locking, no
/// compare-and-swap, no ordering between keys.
pub trait RoomStore: Send + Sync {
    fn put(&self, session_id: &str, record: SessionEntity) -> BoxFuture<'static, StorageResult<()>>;
    fn get(&self, session_id: &str) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>>;
    fn delete(&self, session_id: &str) -> BoxFuture<'static, StorageResult<()>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
}
