// Adapters layer: concrete implementations of the domain ports, plus the
// outbound clients the probe CLI uses.

pub mod export;
pub mod memory_store;
pub mod rest_store;
pub mod storage;
pub mod webhook_client;

pub use memory_store::MemoryStore;
pub use rest_store::RestStore;
pub use storage::{CacheStorage, LocalStorage, MemoryStorage};
pub use webhook_client::{DeliveryAuth, WebhookClient};
