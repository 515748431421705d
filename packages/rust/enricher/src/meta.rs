//! Social-preview metadata extraction from page markup.

use std::sync::LazyLock;

use scraper::{Html, Selector};

static OG_DESCRIPTION: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"meta[property="og:description"]"#).expect("valid selector"));
static OG_IMAGE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"meta[property="og:image"]"#).expect("valid selector"));
static TWITTER_DESCRIPTION: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"meta[name="twitter:description"]"#).expect("valid selector")
});
static TWITTER_IMAGE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"meta[name="twitter:image"]"#).expect("valid selector"));

/// Preview metadata found in a page's `<meta>` tags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageMetadata {
    pub description: Option<String>,
    /// Image URL exactly as written in the markup (may be relative).
    pub image_url: Option<String>,
}

/// Read the Open Graph description and image, falling back to Twitter card tags.
pub fn extract_meta(html: &str) -> PageMetadata {
    let doc = Html::parse_document(html);

    PageMetadata {
        description: meta_content(&doc, &OG_DESCRIPTION)
            .or_else(|| meta_content(&doc, &TWITTER_DESCRIPTION)),
        image_url: meta_content(&doc, &OG_IMAGE).or_else(|| meta_content(&doc, &TWITTER_IMAGE)),
    }
}

/// First non-empty `content` attribute among elements matching `selector`.
fn meta_content(doc: &Html, selector: &Selector) -> Option<String> {
    doc.select(selector)
        .filter_map(|el| el.value().attr("content"))
        .map(str::trim)
        .find(|content| !content.is_empty())
        .map(String::from)
}
