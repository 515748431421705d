//! Core reconciliation pipeline for newsmirror.
//!
//! This crate ties the remote source, the metadata enricher and the document
//! store together into one run per dataset: load the stored snapshot, fetch
//! the fresh ranking, diff the two, normalize the delta and commit it as
//! delete, update and insert batches.

pub mod normalize;
pub mod pipeline;
pub mod reconcile;
pub mod snapshot;
pub mod writer;

#[cfg(test)]
pub(crate) mod test_support;

pub use normalize::{ItemDraft, Normalizer, html_to_text};
pub use pipeline::{
    BatchReport, PartitionCounts, Pipeline, ProgressReporter, RunOutcome, RunReport,
    SilentProgress, Stage,
};
pub use reconcile::{Partition, Reconciler, Reconciliation, Skip, diff};
pub use snapshot::{Snapshot, load_snapshot};
pub use writer::{delete_batch, insert_batch, update_batch};
