//! Test fixtures shared by the core modules.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::DateTime;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use newsmirror_shared::{ImageDescriptor, Item, ItemId, NewsMirrorError, Result, SizeClass};
use newsmirror_storage::{DocumentStore, Storage, StoredDocument, WriteBatch, WriteOp};

/// Temp-file libSQL store.
pub(crate) async fn test_storage() -> Storage {
    let tmp = std::env::temp_dir().join(format!("nm_core_test_{}.db", Uuid::now_v7()));
    Storage::open(&tmp).await.expect("open test db")
}

/// A previously stored item with an image and old timestamps.
pub(crate) fn sample_item(id: u64, index: usize) -> Item {
    let created = DateTime::from_timestamp(1_600_000_000, 0).expect("valid timestamp");
    Item {
        id: ItemId(id),
        title: Some(format!("Item {id}")),
        author: Some("someone".into()),
        points: Some(10),
        comment_count: 1,
        url: format!("https://example.com/{id}"),
        description: None,
        image: Some(ImageDescriptor {
            url: format!("https://example.com/{id}.png"),
            width: 320,
            height: 200,
            file_extension: "png".into(),
            size_class: SizeClass::Normal,
        }),
        date: Some(created),
        unix_time: Some(1_600_000_000),
        index,
        created_at: created,
        updated_at: created,
    }
}

/// Serve a ranking file under `/v0/`.
pub(crate) async fn mount_ranking(server: &MockServer, file: &str, ids: &[u64]) {
    let body = serde_json::to_string(ids).expect("encode ranking");
    Mock::given(method("GET"))
        .and(path(format!("/v0/{file}")))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

/// Serve one item payload.
pub(crate) async fn mock_item(server: &MockServer, id: u64, body: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/v0/item/{id}.json")))
        .respond_with(ResponseTemplate::new(200).set_body_string(body.to_string()))
        .mount(server)
        .await;
}

/// Store wrapper that records commits and can be told to reject deletes.
pub(crate) struct RecordingStore {
    inner: Storage,
    commits: Mutex<Vec<&'static str>>,
    lists: AtomicUsize,
    fail_deletes: bool,
}

impl RecordingStore {
    pub(crate) fn new(inner: Storage) -> Self {
        Self {
            inner,
            commits: Mutex::new(Vec::new()),
            lists: AtomicUsize::new(0),
            fail_deletes: false,
        }
    }

    pub(crate) fn failing_deletes(mut self) -> Self {
        self.fail_deletes = true;
        self
    }

    /// Kind of each committed batch, in order.
    pub(crate) fn commits(&self) -> Vec<&'static str> {
        self.commits.lock().expect("commit log").clone()
    }

    pub(crate) fn clear_commits(&self) {
        self.commits.lock().expect("commit log").clear();
    }

    pub(crate) fn lists(&self) -> usize {
        self.lists.load(Ordering::SeqCst)
    }
}

impl DocumentStore for RecordingStore {
    async fn list_documents(&self, collection: &str) -> Result<Vec<StoredDocument>> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        self.inner.list_documents(collection).await
    }

    async fn commit(&self, batch: WriteBatch) -> Result<usize> {
        let kind = match batch.ops().first() {
            Some(WriteOp::Delete { .. }) => "delete",
            Some(WriteOp::Update { .. }) => "update",
            Some(WriteOp::Insert { .. }) => "insert",
            None => "empty",
        };
        if self.fail_deletes && kind == "delete" {
            return Err(NewsMirrorError::Persistence("injected delete failure".into()));
        }
        self.commits.lock().expect("commit log").push(kind);
        self.inner.commit(batch).await
    }
}
