//! Payload normalization: raw API payload → [`ItemDraft`] → [`Item`].

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use scraper::{ElementRef, Html, Node};

use newsmirror_enricher::{Enricher, Enrichment};
use newsmirror_shared::{ImageDescriptor, Item, ItemId, RawItem};

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

// ---------------------------------------------------------------------------
// ItemDraft
// ---------------------------------------------------------------------------

/// An item before it is placed in a ranking and stamped with write times.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemDraft {
    pub id: ItemId,
    pub title: Option<String>,
    pub author: Option<String>,
    pub points: Option<i64>,
    pub comment_count: usize,
    pub url: String,
    pub description: Option<String>,
    pub image: Option<ImageDescriptor>,
    pub date: Option<DateTime<Utc>>,
    pub unix_time: Option<i64>,
}

impl ItemDraft {
    /// Map payload fields onto a draft. `item_link_base` builds the fallback
    /// discussion link for items without an explicit URL.
    pub fn from_raw(raw: &RawItem, item_link_base: &str) -> Self {
        let url = raw
            .url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(String::from)
            .unwrap_or_else(|| format!("{item_link_base}{}", raw.id));

        Self {
            id: raw.id,
            title: raw.title.clone(),
            author: raw.by.clone(),
            points: raw.score,
            comment_count: raw.kids.as_ref().map_or(0, Vec::len),
            url,
            description: raw.text.as_deref().and_then(html_to_text),
            image: None,
            date: raw.time.and_then(|t| DateTime::from_timestamp(t, 0)),
            unix_time: raw.time,
        }
    }

    /// Fold in page metadata. The payload's own description wins; the image
    /// always comes from the page.
    pub fn adopt(&mut self, enrichment: Enrichment) {
        if self.description.is_none() {
            self.description = enrichment.description;
        }
        self.image = enrichment.image;
    }

    /// Complete the draft into a storable item.
    pub fn into_item(
        self,
        index: usize,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Item {
        Item {
            id: self.id,
            title: self.title,
            author: self.author,
            points: self.points,
            comment_count: self.comment_count,
            url: self.url,
            description: self.description,
            image: self.image,
            date: self.date,
            unix_time: self.unix_time,
            index,
            created_at,
            updated_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Normalizer
// ---------------------------------------------------------------------------

/// Turns raw payloads into drafts, enriching new items on request.
#[derive(Debug, Clone)]
pub struct Normalizer {
    item_link_base: String,
    /// `None` when enrichment is disabled.
    enricher: Option<Enricher>,
}

impl Normalizer {
    pub fn new(item_link_base: impl Into<String>, enricher: Option<Enricher>) -> Self {
        Self {
            item_link_base: item_link_base.into(),
            enricher,
        }
    }

    /// Whether new items get page metadata.
    pub fn enriches(&self) -> bool {
        self.enricher.is_some()
    }

    /// Normalize a payload. With `enrich`, the item's page is scraped for a
    /// description and preview image; that step never fails.
    pub async fn normalize(&self, raw: &RawItem, enrich: bool) -> ItemDraft {
        let mut draft = ItemDraft::from_raw(raw, &self.item_link_base);

        if enrich {
            if let Some(enricher) = &self.enricher {
                let enrichment = enricher.enrich(&draft.url).await;
                draft.adopt(enrichment);
            }
        }

        draft
    }
}

// ---------------------------------------------------------------------------
// HTML → text
// ---------------------------------------------------------------------------

/// Convert an HTML fragment to plain text.
///
/// Paragraphs become blank-line separated blocks, `<br>` a line break,
/// entities are decoded and runs of whitespace collapse to one space.
/// `<pre>` blocks keep their line breaks and indentation.
/// Returns `None` when nothing but whitespace remains.
pub fn html_to_text(html: &str) -> Option<String> {
    let fragment = Html::parse_fragment(html);
    let mut text = TextBlocks::default();
    text.walk(fragment.root_element());

    let blocks = text.finish();
    if blocks.is_empty() {
        None
    } else {
        Some(blocks.join("\n\n"))
    }
}

/// Paragraph accumulator for [`html_to_text`].
#[derive(Default)]
struct TextBlocks {
    blocks: Vec<String>,
    /// Flowing text not yet split into paragraphs.
    flow: String,
}

impl TextBlocks {
    fn walk(&mut self, element: ElementRef<'_>) {
        for child in element.children() {
            match child.value() {
                Node::Text(text) => self.flow.push_str(&WHITESPACE.replace_all(text, " ")),
                Node::Element(_) => {
                    let Some(child) = ElementRef::wrap(child) else {
                        continue;
                    };
                    match child.value().name() {
                        "br" => self.flow.push('\n'),
                        "pre" => {
                            self.flush();
                            let raw: String = child.text().collect();
                            let code = raw.trim_matches('\n').trim_end();
                            if !code.trim().is_empty() {
                                self.blocks.push(code.to_string());
                            }
                        }
                        "p" | "div" | "blockquote" => {
                            self.flow.push_str("\n\n");
                            self.walk(child);
                            self.flow.push_str("\n\n");
                        }
                        "li" => {
                            self.flow.push('\n');
                            self.walk(child);
                            self.flow.push('\n');
                        }
                        "script" | "style" => {}
                        _ => self.walk(child),
                    }
                }
                _ => {}
            }
        }
    }

    /// Split pending flow text into trimmed paragraphs.
    fn flush(&mut self) {
        let flow = std::mem::take(&mut self.flow);
        let mut lines: Vec<&str> = Vec::new();
        for line in flow.split('\n') {
            let line = line.trim();
            if line.is_empty() {
                if !lines.is_empty() {
                    self.blocks.push(lines.join("\n"));
                    lines.clear();
                }
            } else {
                lines.push(line);
            }
        }
        if !lines.is_empty() {
            self.blocks.push(lines.join("\n"));
        }
    }

    fn finish(mut self) -> Vec<String> {
        self.flush();
        self.blocks
    }
}
