/// Session module
///
/// The stateful half of the credential system: the session store contract
/// and its implementations, plus the rotation engine that enforces one-shot
/// refresh semantics and reuse detection.

pub mod memory;
pub mod postgres;
pub mod rotation;
pub mod store;

pub use memory::InMemorySessionStore;
pub use postgres::PgSessionStore;
pub use rotation::RotationEngine;
pub use store::{SessionRecord, SessionStore, SessionStoreError};
