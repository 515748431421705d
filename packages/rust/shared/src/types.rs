//! Core domain types for mirrored items.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{NewsMirrorError, Result};

/// Images at least this wide are rendered as "expanded" previews.
pub const EXPANDED_WIDTH_THRESHOLD: u32 = 600;

// ---------------------------------------------------------------------------
// ItemId
// ---------------------------------------------------------------------------

/// Remote-assigned item identifier, unique within a dataset.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ItemId(pub u64);

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ItemId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

impl From<u64> for ItemId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

// ---------------------------------------------------------------------------
// Dataset
// ---------------------------------------------------------------------------

/// One of the named content streams, each with its own remote ranking and
/// store collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dataset {
    Jobs,
    Stories,
}

impl Dataset {
    /// Every known dataset, in scheduling order.
    pub const ALL: [Dataset; 2] = [Dataset::Jobs, Dataset::Stories];

    /// Name used on the command line and in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Jobs => "jobs",
            Self::Stories => "stories",
        }
    }

    /// Store collection holding this dataset's items.
    pub fn collection(&self) -> &'static str {
        self.name()
    }

    /// Ranking endpoint, relative to the API base URL.
    pub fn ranking_path(&self) -> &'static str {
        match self {
            Self::Jobs => "jobstories.json",
            Self::Stories => "topstories.json",
        }
    }
}

impl std::fmt::Display for Dataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Dataset {
    type Err = NewsMirrorError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "jobs" => Ok(Self::Jobs),
            "stories" => Ok(Self::Stories),
            other => Err(NewsMirrorError::InvalidDatasetName {
                name: other.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// ImageDescriptor
// ---------------------------------------------------------------------------

/// Rendering hint derived from an image's width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeClass {
    Normal,
    Expanded,
}

impl SizeClass {
    pub fn from_width(width: u32) -> Self {
        if width < EXPANDED_WIDTH_THRESHOLD {
            Self::Normal
        } else {
            Self::Expanded
        }
    }
}

/// Representative preview image for an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageDescriptor {
    pub url: String,
    pub width: u32,
    pub height: u32,
    /// Lowercase format name, e.g. `png` or `jpg`.
    pub file_extension: String,
    pub size_class: SizeClass,
}

// ---------------------------------------------------------------------------
// Item
// ---------------------------------------------------------------------------

/// Canonical content record as stored in a dataset collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: ItemId,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub points: Option<i64>,
    #[serde(default)]
    pub comment_count: usize,
    pub url: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image: Option<ImageDescriptor>,
    /// Submission time of the remote item.
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub unix_time: Option<i64>,
    /// Position in the most recently fetched ranking.
    pub index: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// RawItem
// ---------------------------------------------------------------------------

/// Item payload as returned by the remote API.
///
/// Only `id` is guaranteed; every other field depends on the item type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawItem {
    pub id: ItemId,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub by: Option<String>,
    /// Creation time in Unix seconds.
    #[serde(default)]
    pub time: Option<i64>,
    /// HTML body (Ask HN text, job descriptions).
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub score: Option<i64>,
    #[serde(default)]
    pub kids: Option<Vec<ItemId>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dataset_parsing() {
        assert_eq!("jobs".parse::<Dataset>().unwrap(), Dataset::Jobs);
        assert_eq!("stories".parse::<Dataset>().unwrap(), Dataset::Stories);

        let err = "Stories".parse::<Dataset>().unwrap_err();
        assert!(matches!(err, NewsMirrorError::InvalidDatasetName { .. }));
    }

    #[test]
    fn dataset_endpoints() {
        assert_eq!(Dataset::Stories.ranking_path(), "topstories.json");
        assert_eq!(Dataset::Jobs.ranking_path(), "jobstories.json");
        assert_eq!(Dataset::Jobs.collection(), "jobs");
    }

    #[test]
    fn size_class_threshold() {
        assert_eq!(SizeClass::from_width(0), SizeClass::Normal);
        assert_eq!(SizeClass::from_width(599), SizeClass::Normal);
        assert_eq!(SizeClass::from_width(600), SizeClass::Expanded);
        assert_eq!(SizeClass::from_width(1200), SizeClass::Expanded);
    }

    #[test]
    fn item_serializes_camel_case() {
        let now = Utc::now();
        let item = Item {
            id: ItemId(42),
            title: Some("Show HN: a thing".into()),
            author: Some("pg".into()),
            points: Some(100),
            comment_count: 3,
            url: "https://example.com".into(),
            description: None,
            image: Some(ImageDescriptor {
                url: "https://example.com/a.png".into(),
                width: 800,
                height: 400,
                file_extension: "png".into(),
                size_class: SizeClass::Expanded,
            }),
            date: None,
            unix_time: None,
            index: 7,
            created_at: now,
            updated_at: now,
        };

        let json = serde_json::to_value(&item).expect("serialize");
        assert_eq!(json["id"], 42);
        assert_eq!(json["commentCount"], 3);
        assert_eq!(json["image"]["sizeClass"], "expanded");
        assert_eq!(json["image"]["fileExtension"], "png");
        assert!(json.get("createdAt").is_some());
    }

    #[test]
    fn raw_item_tolerates_sparse_payloads() {
        let raw: RawItem =
            serde_json::from_str(r#"{"id": 8863, "type": "job", "time": 1175714200}"#)
                .expect("parse");
        assert_eq!(raw.id, ItemId(8863));
        assert_eq!(raw.kind.as_deref(), Some("job"));
        assert!(raw.kids.is_none());
        assert!(raw.url.is_none());
    }
}
