//! Document handles and write batches.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Opaque store-assigned identifier of a document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocHandle(String);

impl DocHandle {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DocHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A document as read back from a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub handle: DocHandle,
    pub body: Value,
}

/// One mutation inside a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Insert { body: Value },
    Update { handle: DocHandle, body: Value },
    Delete { handle: DocHandle },
}

/// A set of mutations against one collection, applied all-or-nothing.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteBatch {
    collection: String,
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            ops: Vec::new(),
        }
    }

    pub fn insert(&mut self, body: Value) -> &mut Self {
        self.ops.push(WriteOp::Insert { body });
        self
    }

    pub fn update(&mut self, handle: DocHandle, body: Value) -> &mut Self {
        self.ops.push(WriteOp::Update { handle, body });
        self
    }

    pub fn delete(&mut self, handle: DocHandle) -> &mut Self {
        self.ops.push(WriteOp::Delete { handle });
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}
