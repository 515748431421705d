//! Reconciliation of the stored snapshot against a fresh ranking.
//!
//! [`diff`] partitions ids into removed / new / changed. [`Reconciler`] then
//! fetches and normalizes the new and changed items, one `Result<Item, Skip>`
//! per id, and aggregates the successes into a [`Reconciliation`].

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use newsmirror_shared::{Item, ItemId};
use newsmirror_source::HnClient;

use crate::normalize::Normalizer;
use crate::pipeline::ProgressReporter;

// ---------------------------------------------------------------------------
// Partition
// ---------------------------------------------------------------------------

/// Id-level classification of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partition {
    /// Fresh ranking with duplicates collapsed to their first occurrence.
    pub fresh: Vec<ItemId>,
    /// Stored but no longer ranked, in store order.
    pub removed: Vec<ItemId>,
    /// Ranked but not stored, in ranking order.
    pub new: Vec<ItemId>,
    /// Stored and still ranked, in ranking order.
    pub changed: Vec<ItemId>,
}

impl Partition {
    /// Zero-based position of `id` in the fresh ranking.
    pub fn positions(&self) -> HashMap<ItemId, usize> {
        self.fresh
            .iter()
            .enumerate()
            .map(|(index, id)| (*id, index))
            .collect()
    }
}

/// Classify stored and fresh ids.
pub fn diff(stored: &[ItemId], fresh: &[ItemId]) -> Partition {
    let mut seen = HashSet::with_capacity(fresh.len());
    let fresh: Vec<ItemId> = fresh.iter().copied().filter(|id| seen.insert(*id)).collect();

    let stored_set: HashSet<ItemId> = stored.iter().copied().collect();
    let fresh_set: HashSet<ItemId> = fresh.iter().copied().collect();

    let mut removed_seen = HashSet::new();
    let removed = stored
        .iter()
        .copied()
        .filter(|id| !fresh_set.contains(id) && removed_seen.insert(*id))
        .collect();
    let new = fresh
        .iter()
        .copied()
        .filter(|id| !stored_set.contains(id))
        .collect();
    let changed = fresh
        .iter()
        .copied()
        .filter(|id| stored_set.contains(id))
        .collect();

    Partition {
        fresh,
        removed,
        new,
        changed,
    }
}

// ---------------------------------------------------------------------------
// Reconciliation
// ---------------------------------------------------------------------------

/// An id whose payload could not be turned into an item this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skip {
    pub id: ItemId,
    pub reason: String,
}

/// The write plan for one run. The three write sets are disjoint.
#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    pub to_delete: Vec<ItemId>,
    pub to_update: Vec<Item>,
    pub to_insert: Vec<Item>,
    pub skipped: Vec<Skip>,
}

/// Fetches and normalizes the new and changed partitions.
pub struct Reconciler<'a> {
    client: &'a HnClient,
    normalizer: &'a Normalizer,
    concurrency: usize,
}

impl<'a> Reconciler<'a> {
    pub fn new(client: &'a HnClient, normalizer: &'a Normalizer, concurrency: usize) -> Self {
        Self {
            client,
            normalizer,
            concurrency: concurrency.max(1),
        }
    }

    /// Build the write plan. Per-item failures become [`Skip`]s; nothing here
    /// aborts the run.
    pub async fn reconcile(
        &self,
        stored: &[Item],
        partition: Partition,
        now: DateTime<Utc>,
        progress: &dyn ProgressReporter,
    ) -> Reconciliation {
        let positions = partition.positions();
        let stored_by_id: HashMap<ItemId, &Item> =
            stored.iter().map(|item| (item.id, item)).collect();

        let total = partition.new.len() + partition.changed.len();

        let new_results: Vec<Result<Item, Skip>> = stream::iter(partition.new.iter().copied())
            .map(|id| self.fetch_new(id, &positions, now))
            .buffered(self.concurrency)
            .enumerate()
            .map(|(i, result)| {
                progress.item_fetched(i + 1, total);
                result
            })
            .collect()
            .await;

        let offset = partition.new.len();
        let changed_results: Vec<Result<Item, Skip>> = stream::iter(
            partition
                .changed
                .iter()
                .filter_map(|id| stored_by_id.get(id).copied()),
        )
        .map(|previous| self.fetch_changed(previous, &positions, now))
        .buffered(self.concurrency)
        .enumerate()
        .map(|(i, result)| {
            progress.item_fetched(offset + i + 1, total);
            result
        })
        .collect()
        .await;

        let mut skipped = Vec::new();
        let to_insert = aggregate("new", new_results, &mut skipped);
        let to_update = aggregate("changed", changed_results, &mut skipped);

        info!(
            delete = partition.removed.len(),
            update = to_update.len(),
            insert = to_insert.len(),
            skipped = skipped.len(),
            "reconciled"
        );

        Reconciliation {
            to_delete: partition.removed,
            to_update,
            to_insert,
            skipped,
        }
    }

    /// Fetch, enrich and stamp a first-seen item.
    async fn fetch_new(
        &self,
        id: ItemId,
        positions: &HashMap<ItemId, usize>,
        now: DateTime<Utc>,
    ) -> Result<Item, Skip> {
        let index = position_of(id, positions)?;
        let raw = self.client.fetch_payload(id).await.map_err(|e| Skip {
            id,
            reason: e.to_string(),
        })?;
        let draft = self.normalizer.normalize(&raw, true).await;
        Ok(draft.into_item(index, now, now))
    }

    /// Re-fetch a stored item, keeping its image and creation time.
    async fn fetch_changed(
        &self,
        previous: &Item,
        positions: &HashMap<ItemId, usize>,
        now: DateTime<Utc>,
    ) -> Result<Item, Skip> {
        let id = previous.id;
        let index = position_of(id, positions)?;
        let raw = self.client.fetch_payload(id).await.map_err(|e| Skip {
            id,
            reason: e.to_string(),
        })?;
        let mut draft = self.normalizer.normalize(&raw, false).await;
        draft.image = previous.image.clone();
        Ok(draft.into_item(index, previous.created_at, now))
    }
}

fn position_of(id: ItemId, positions: &HashMap<ItemId, usize>) -> Result<usize, Skip> {
    positions.get(&id).copied().ok_or_else(|| Skip {
        id,
        reason: "not present in fresh ranking".into(),
    })
}

/// Split per-item results: log and collect skips, forward items in order.
fn aggregate(
    partition: &str,
    results: Vec<Result<Item, Skip>>,
    skipped: &mut Vec<Skip>,
) -> Vec<Item> {
    let mut items = Vec::with_capacity(results.len());
    for result in results {
        match result {
            Ok(item) => items.push(item),
            Err(skip) => {
                warn!(id = %skip.id, partition, reason = %skip.reason, "item fetch failed, skipping");
                skipped.push(skip);
            }
        }
    }
    items
}
