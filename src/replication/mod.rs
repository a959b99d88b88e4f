//! Cross-server replication through a shared pub/sub + key-value store.

mod backoff;
mod channel;
mod error;
mod event;
mod link;
mod memory;
mod redis_store;
mod store;

pub use backoff::Backoff;
pub use channel::Channel;
pub use error::{StoreError, StoreErrorKind};
pub use event::{SyncEvent, SyncMessage};
pub use link::{PayloadStream, StoreConnector, StoreLink};
pub use memory::{MemoryEndpoint, MemoryHub};
pub use redis_store::{RedisConnector, RedisLink};
pub use store::{Delivery, ReplicationSettings, ReplicationStore, Subscription};
