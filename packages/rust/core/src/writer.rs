//! Persistence writer: the three per-run write batches.
//!
//! Each function builds one [`WriteBatch`] and commits it atomically. Empty
//! inputs never reach the store.

use std::collections::HashMap;

use tracing::info;

use newsmirror_shared::{Dataset, Item, ItemId, NewsMirrorError, Result};
use newsmirror_storage::{DocHandle, DocumentStore, WriteBatch};

/// Delete the documents of `ids`. Every id must have a handle.
pub async fn delete_batch<S: DocumentStore>(
    store: &S,
    dataset: Dataset,
    ids: &[ItemId],
    handles: &HashMap<ItemId, DocHandle>,
) -> Result<usize> {
    if ids.is_empty() {
        return Ok(0);
    }

    let mut batch = WriteBatch::new(dataset.collection());
    for id in ids {
        batch.delete(handle_for(*id, handles)?);
    }

    let applied = store.commit(batch).await?;
    info!(%dataset, deleted = applied, "delete batch committed");
    Ok(applied)
}

/// Overwrite the stored documents of `items`. Every item must have a handle.
pub async fn update_batch<S: DocumentStore>(
    store: &S,
    dataset: Dataset,
    items: &[Item],
    handles: &HashMap<ItemId, DocHandle>,
) -> Result<usize> {
    if items.is_empty() {
        return Ok(0);
    }

    let mut batch = WriteBatch::new(dataset.collection());
    for item in items {
        batch.update(handle_for(item.id, handles)?, encode(item)?);
    }

    let applied = store.commit(batch).await?;
    info!(%dataset, updated = applied, "update batch committed");
    Ok(applied)
}

/// Create one new document per item.
pub async fn insert_batch<S: DocumentStore>(
    store: &S,
    dataset: Dataset,
    items: &[Item],
) -> Result<usize> {
    if items.is_empty() {
        return Ok(0);
    }

    let mut batch = WriteBatch::new(dataset.collection());
    for item in items {
        batch.insert(encode(item)?);
    }

    let applied = store.commit(batch).await?;
    info!(%dataset, inserted = applied, "insert batch committed");
    Ok(applied)
}

fn handle_for(id: ItemId, handles: &HashMap<ItemId, DocHandle>) -> Result<DocHandle> {
    handles
        .get(&id)
        .cloned()
        .ok_or_else(|| NewsMirrorError::Persistence(format!("no stored handle for item {id}")))
}

fn encode(item: &Item) -> Result<serde_json::Value> {
    serde_json::to_value(item).map_err(|e| {
        NewsMirrorError::Persistence(format!("failed to encode item {}: {e}", item.id))
    })
}
