//! Record extraction from page payloads
//!
//! Two payload shapes are supported:
//! - HTML book listings (`ul.subject-list` → `div.info` → link/score/description)
//! - JSON question feeds (`data[].target.question.title` + `data[].target.content`)
//!
//! Malformed items are skipped and counted, never synthesized. A payload of
//! the wrong kind altogether is an [`ExtractError`].

use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Payload format of a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExtractMode {
    HtmlListing,
    JsonFeed,
}

impl fmt::Display for ExtractMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HtmlListing => f.write_str("html-listing"),
            Self::JsonFeed => f.write_str("json-feed"),
        }
    }
}

/// One book entry of a listing page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookRecord {
    pub title: String,
    pub href: String,
    pub score: Option<String>,
    pub description: Option<String>,
}

/// One question/answer pair of a feed page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaRecord {
    pub question: String,
    pub answer: String,
}

/// An extracted record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Record {
    Book(BookRecord),
    Qa(QaRecord),
}

impl From<BookRecord> for Record {
    fn from(book: BookRecord) -> Self {
        Self::Book(book)
    }
}

impl From<QaRecord> for Record {
    fn from(qa: QaRecord) -> Self {
        Self::Qa(qa)
    }
}

/// Records of one payload plus the number of malformed items dropped
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    pub records: Vec<Record>,
    pub skipped: usize,
}

/// The payload does not have the shape the mode expects
#[derive(Debug, Error)]
#[error("{mode} payload rejected: {message}")]
pub struct ExtractError {
    pub mode: ExtractMode,
    pub message: String,
}

impl ExtractError {
    fn new(mode: ExtractMode, message: impl Into<String>) -> Self {
        Self {
            mode,
            message: message.into(),
        }
    }
}

/// Parses a raw payload into records
///
/// # Example
///
/// ```
/// use shelf_sweep::crawler::{extract, ExtractMode};
///
/// let html = r#"<ul class="subject-list"><li><div class="info">
///     <h2><a href="https://book.douban.com/subject/1/" title="Dune">Dune</a></h2>
/// </div></li></ul>"#;
/// let extraction = extract(html.as_bytes(), ExtractMode::HtmlListing).unwrap();
/// assert_eq!(extraction.records.len(), 1);
/// ```
pub fn extract(payload: &[u8], mode: ExtractMode) -> Result<Extraction, ExtractError> {
    match mode {
        ExtractMode::HtmlListing => extract_listing(payload),
        ExtractMode::JsonFeed => extract_feed(payload),
    }
}

fn selector(css: &str) -> Result<Selector, ExtractError> {
    Selector::parse(css).map_err(|e| {
        ExtractError::new(
            ExtractMode::HtmlListing,
            format!("bad selector '{}': {:?}", css, e),
        )
    })
}

fn extract_listing(payload: &[u8]) -> Result<Extraction, ExtractError> {
    // HttpFetcher already decodes by charset; other fetchers may hand over
    // raw bytes, which are decoded lossily
    let decoded = String::from_utf8_lossy(payload);
    let html = decoded.trim_start_matches('\u{feff}');

    if looks_like_json_document(html) {
        return Err(ExtractError::new(
            ExtractMode::HtmlListing,
            "payload is a JSON document, not HTML",
        ));
    }

    let item_selector = selector("ul.subject-list div.info")?;
    let link_selector = selector("a[href]")?;
    let score_selector = selector("span.rating_nums")?;
    let description_selector = selector("p")?;

    let document = Html::parse_document(html);
    let mut extraction = Extraction::default();

    for info in document.select(&item_selector) {
        let book = info.select(&link_selector).next().and_then(|link| {
            let href = link.value().attr("href")?.trim();
            let title = link
                .value()
                .attr("title")
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .or_else(|| text_of(link))?;

            if href.is_empty() {
                return None;
            }

            Some(BookRecord {
                title,
                href: href.to_string(),
                score: info.select(&score_selector).next().and_then(text_of),
                description: info.select(&description_selector).next().and_then(text_of),
            })
        });

        match book {
            Some(book) => extraction.records.push(book.into()),
            None => extraction.skipped += 1,
        }
    }

    Ok(extraction)
}

fn looks_like_json_document(text: &str) -> bool {
    let trimmed = text.trim();
    (trimmed.starts_with('{') || trimmed.starts_with('['))
        && serde_json::from_str::<Value>(trimmed).is_ok()
}

/// Collapsed, trimmed text content; `None` when empty
fn text_of(element: ElementRef<'_>) -> Option<String> {
    let text = element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ");

    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn extract_feed(payload: &[u8]) -> Result<Extraction, ExtractError> {
    let document: Value = serde_json::from_slice(payload)
        .map_err(|e| ExtractError::new(ExtractMode::JsonFeed, format!("invalid JSON: {}", e)))?;

    let items = document
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| ExtractError::new(ExtractMode::JsonFeed, "missing `data` array"))?;

    let mut extraction = Extraction::default();
    walk_feed_items(items, &mut extraction);
    Ok(extraction)
}

fn walk_feed_items(items: &[Value], extraction: &mut Extraction) {
    for item in items {
        let target = item.get("target");

        // Sticky modules wrap a second level of feed items
        if target.and_then(|t| t.get("type")).and_then(Value::as_str) == Some("topic_sticky_module")
        {
            if let Some(inner) = target.and_then(|t| t.get("data")).and_then(Value::as_array) {
                walk_feed_items(inner, extraction);
                continue;
            }
        }

        match target.and_then(qa_from_target) {
            Some(qa) => extraction.records.push(qa.into()),
            None => {
                tracing::debug!("Skipping feed item without target.question.title/content");
                extraction.skipped += 1;
            }
        }
    }
}

fn qa_from_target(target: &Value) -> Option<QaRecord> {
    let question = target
        .get("question")?
        .get("title")?
        .as_str()?
        .trim();
    let answer = target.get("content")?.as_str()?.trim();

    if question.is_empty() || answer.is_empty() {
        return None;
    }

    Some(QaRecord {
        question: question.to_string(),
        answer: answer.to_string(),
    })
}
