mod actor;
pub mod credentials;
mod store;

pub use actor::{keys, RedisActor, RedisActorHandle, RedisCommand};
pub use store::{KeyValueStore, MemoryStore};
