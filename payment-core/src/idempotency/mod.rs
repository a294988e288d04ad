//! Idempotent execution keyed by a merchant/operation/client-key triple
//! (spec §4.4). Built on the named-lock primitive in [`crate::locking`].

pub mod engine;
pub mod record;
pub mod store;

pub use engine::{fingerprint, IdempotencyEngine, IdempotencyError};
pub use record::{IdempotencyRecord, IdempotencyState};
pub use store::{IdempotencyStore, InMemoryIdempotencyStore};
