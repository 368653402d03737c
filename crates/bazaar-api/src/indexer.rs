use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use bazaar_types::models::Ad;

use crate::search::SearchIndex;

/// Change to mirror into the hosted search index.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    Upsert(Ad),
    Delete(Uuid),
}

/// Handle for queueing index updates. Handlers never wait on the index;
/// a background task drains the queue.
#[derive(Clone)]
pub struct Indexer {
    tx: Option<mpsc::UnboundedSender<SyncEvent>>,
}

impl Indexer {
    /// Spawn the sync task for `index`. Must be called inside a Tokio runtime.
    pub fn spawn(index: SearchIndex) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        info!("Search index sync enabled for index '{}'", index.index_name());
        tokio::spawn(run_sync_loop(index, rx));
        Self { tx: Some(tx) }
    }

    /// No index configured: events are dropped.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn enqueue(&self, event: SyncEvent) {
        match &self.tx {
            Some(tx) => {
                if tx.send(event).is_err() {
                    warn!("Search index sync task has stopped; dropping event");
                }
            }
            None => debug!("Search index not configured; skipping {:?}", event_id(&event)),
        }
    }
}

fn event_id(event: &SyncEvent) -> Uuid {
    match event {
        SyncEvent::Upsert(ad) => ad.id,
        SyncEvent::Delete(id) => *id,
    }
}

/// Apply events one at a time, in order. Failures are logged and the event
/// is dropped.
async fn run_sync_loop(index: SearchIndex, mut rx: mpsc::UnboundedReceiver<SyncEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            SyncEvent::Upsert(ad) => match index.save(&ad).await {
                Ok(()) => debug!("Indexed ad {}", ad.id),
                Err(e) => warn!("Failed to index ad {}: {:#}", ad.id, e),
            },
            SyncEvent::Delete(id) => match index.delete(id).await {
                Ok(()) => debug!("Removed ad {} from index", id),
                Err(e) => warn!("Failed to remove ad {} from index: {:#}", id, e),
            },
        }
    }
    info!("Search index sync task exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_indexer_drops_events() {
        let indexer = Indexer::disabled();
        indexer.enqueue(SyncEvent::Delete(Uuid::new_v4()));
        assert!(indexer.tx.is_none());
    }

    #[tokio::test]
    async fn closed_queue_is_not_fatal() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let indexer = Indexer { tx: Some(tx) };
        indexer.enqueue(SyncEvent::Delete(Uuid::new_v4()));
    }
}
