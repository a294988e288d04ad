pub mod entry;
pub mod publisher;
pub mod store;

pub use entry::{OutboxEntry, OutboxStatus};
pub use publisher::{OutboxPublisher, OutboxPublisherHandle};
pub use store::{InMemoryOutboxStore, OutboxStore};
