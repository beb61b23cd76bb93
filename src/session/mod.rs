//! C13 SessionCoordinator and its actor-model home: one actor per session,
//! single-writer discipline over that session's state (§5).

pub mod coordinator;
