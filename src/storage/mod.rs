use std::sync::Arc;

use tracing::{info, warn};

use crate::config::StaticConfig;
use crate::errors::Result;

pub mod backend;
pub mod cache;
pub mod memory;
pub mod models;
pub mod traits;

pub use backend::SeaOrmStore;
pub use cache::CachedLinkStore;
pub use memory::{MemoryEventStore, MemoryLinkStore};
pub use models::*;
pub use traits::{EventStore, LinkStore};

/// `database_url` 取该值时使用进程内存储
pub const MEMORY_URL: &str = "memory://";

/// Event store + cached link store sharing one backend
#[derive(Clone)]
pub struct Stores {
    pub events: Arc<dyn EventStore>,
    pub links: Arc<dyn LinkStore>,
}

pub struct StorageFactory;

impl StorageFactory {
    pub async fn create(config: &StaticConfig) -> Result<Stores> {
        let (events, links): (Arc<dyn EventStore>, Arc<dyn LinkStore>) =
            if config.database.database_url.trim() == MEMORY_URL {
                warn!("Using in-memory event store; events are lost on restart");
                (
                    Arc::new(MemoryEventStore::new()),
                    Arc::new(MemoryLinkStore::new()),
                )
            } else {
                let store = Arc::new(SeaOrmStore::connect(&config.database).await?);
                (store.clone(), store)
            };

        info!("Event store backend: {}", events.backend_name());
        Ok(Stores {
            events,
            links: Arc::new(CachedLinkStore::new(links, &config.links)),
        })
    }
}
