//! Queue registry: one store per queue name for the life of the process.

use std::collections::HashMap;
use std::sync::Arc;

use clip_models::QueueName;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info};

use crate::error::{QueueError, QueueResult};
use crate::store::{JobStore, StoreConnector};

/// Handle to one named queue.
///
/// Cheap to clone through `Arc`; every clone talks to the same store.
pub struct Queue {
    name: QueueName,
    store: Arc<dyn JobStore>,
}

impl Queue {
    pub fn new(name: QueueName, store: Arc<dyn JobStore>) -> Self {
        Self { name, store }
    }

    pub fn name(&self) -> QueueName {
        self.name
    }

    pub fn store(&self) -> &dyn JobStore {
        self.store.as_ref()
    }
}

impl std::fmt::Debug for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue").field("name", &self.name).finish()
    }
}

/// Lazily opened, process-wide queue handles.
///
/// Owned by the composition root and shared by every producer. Each name
/// has its own once-cell: concurrent first calls for the same name open
/// exactly one connection, while other names stay available during a slow
/// connect.
pub struct QueueRegistry {
    connector: Arc<dyn StoreConnector>,
    queues: Mutex<HashMap<QueueName, Arc<OnceCell<Arc<Queue>>>>>,
}

impl QueueRegistry {
    pub fn new(connector: Arc<dyn StoreConnector>) -> Self {
        Self {
            connector,
            queues: Mutex::new(HashMap::new()),
        }
    }

    /// Cached handle for `name`, opening the store on first use.
    ///
    /// A failed open is not cached; the next call tries again.
    pub async fn get_or_create(&self, name: QueueName) -> QueueResult<Arc<Queue>> {
        let cell = {
            let mut queues = self.queues.lock().await;
            Arc::clone(queues.entry(name).or_default())
        };

        let queue = cell
            .get_or_try_init(|| async {
                debug!(queue = %name, "Opening queue");
                let store = self.connector.connect(name).await?;
                info!(queue = %name, "Queue registered");
                Ok::<_, QueueError>(Arc::new(Queue::new(name, store)))
            })
            .await?;

        Ok(Arc::clone(queue))
    }

    /// Already-opened handle, without opening anything.
    pub async fn cached(&self, name: QueueName) -> Option<Arc<Queue>> {
        self.queues.lock().await.get(&name)?.get().cloned()
    }

    /// Names of the queues opened so far.
    pub async fn open_queues(&self) -> Vec<QueueName> {
        let mut names: Vec<_> = self
            .queues
            .lock()
            .await
            .iter()
            .filter(|(_, cell)| cell.initialized())
            .map(|(name, _)| *name)
            .collect();
        names.sort();
        names
    }
}
