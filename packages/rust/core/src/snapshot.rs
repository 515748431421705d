//! Stored snapshot of a dataset collection.

use std::collections::HashMap;

use tracing::{info, warn};

use newsmirror_shared::{Dataset, Item, ItemId, NewsMirrorError, Result};
use newsmirror_storage::{DocHandle, DocumentStore};

/// Items currently stored for a dataset, plus the store handle of each.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub items: Vec<Item>,
    pub handles: HashMap<ItemId, DocHandle>,
}

impl Snapshot {
    /// Stored ids, in store order.
    pub fn ids(&self) -> Vec<ItemId> {
        self.items.iter().map(|item| item.id).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Read every document of `dataset`'s collection and decode it as an [`Item`].
///
/// A document that does not decode fails the whole load. A second document
/// carrying an already seen id is ignored with a warning.
pub async fn load_snapshot<S: DocumentStore>(store: &S, dataset: Dataset) -> Result<Snapshot> {
    let documents = store.list_documents(dataset.collection()).await?;

    let mut snapshot = Snapshot::default();
    for doc in documents {
        let item: Item = serde_json::from_value(doc.body).map_err(|e| {
            NewsMirrorError::parse(format!(
                "stored document {} in '{}' is not a valid item: {e}",
                doc.handle,
                dataset.collection()
            ))
        })?;

        if snapshot.handles.contains_key(&item.id) {
            warn!(id = %item.id, handle = %doc.handle, "duplicate stored item, ignoring");
            continue;
        }
        snapshot.handles.insert(item.id, doc.handle);
        snapshot.items.push(item);
    }

    info!(%dataset, stored = snapshot.len(), "loaded stored snapshot");
    Ok(snapshot)
}
