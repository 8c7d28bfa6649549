/// Persisted record shapes shared by every room store.
pub mod models;
/// Shared key-value slot holding one record per room.
pub mod room_store;
/// Storage error types.
pub mod storage;
