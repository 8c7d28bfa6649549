/// Scripted players driving a client through its UI events.
pub mod autopilot;
/// Task that multiplexes commands, timers and polls for one client.
pub mod client_runtime;
/// Per-client turn engine.
pub mod coordinator;
/// Room lifecycle operations against the shared store.
pub mod room_service;
/// Reconciliation of polled room records with local state.
pub mod sync_service;
/// UI event construction and broadcasting.
pub mod ui_events;
