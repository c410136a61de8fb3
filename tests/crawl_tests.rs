//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and test
//! the full fetch-extract-store cycle end-to-end.

use async_trait::async_trait;
use serde_json::{json, Value};
use shelf_sweep::config::{Config, CrawlerConfig, HeaderProfile, OutputConfig, SourceConfig};
use shelf_sweep::crawler::{Coordinator, FetchResult, PageAddress, PageFetcher};
use shelf_sweep::storage::CategoryWriter;
use shelf_sweep::{CrawlPhase, ErrorKind, ExtractMode, Record};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration with one source
fn create_test_config(mode: ExtractMode, base: String, pages: u32, page_size: u32) -> Config {
    Config {
        crawler: CrawlerConfig {
            concurrency: 4,
            timeout_secs: 5,
            max_retries: 1,
            retry_delay_ms: 0,
            deadline_secs: None,
        },
        headers: HeaderProfile {
            user_agent: "TestAgent/1.0".to_string(),
            referer: String::new(),
            cookie: None,
            keep_alive: false,
        },
        output: OutputConfig::default(),
        sources: vec![SourceConfig {
            mode,
            base,
            category: None,
            pages,
            page_size,
            offset_param: None,
            limit_param: None,
        }],
    }
}

/// Listing page with two books named after the page index
fn listing_page(page: u64) -> String {
    let items: String = (1..=2)
        .map(|n| {
            format!(
                r#"<li class="subject-item"><div class="info">
                    <h2><a href="https://book.example.com/subject/{page}{n}/" title="Book {page}-{n}">Book {page}-{n}</a></h2>
                    <div class="star"><span class="rating_nums">8.{n}</span></div>
                    <p>Description {page}-{n}</p>
                </div></li>"#,
                page = page,
                n = n
            )
        })
        .collect();

    format!(
        r#"<html><body><div id="subject_list"><ul class="subject-list">{}</ul></div></body></html>"#,
        items
    )
}

fn feed_item(question: &str, answer: &str) -> Value {
    json!({
        "target": {
            "question": { "title": question },
            "content": answer
        }
    })
}

fn feed_page(page: u64) -> Vec<u8> {
    let payload = json!({
        "data": [
            feed_item(&format!("Question {}", page), &format!("Answer {}", page)),
        ]
    });
    serde_json::to_vec(&payload).unwrap()
}

fn book_titles(records: &[Record]) -> HashSet<String> {
    records
        .iter()
        .filter_map(|record| match record {
            Record::Book(book) => Some(book.title.clone()),
            Record::Qa(_) => None,
        })
        .collect()
}

async fn mount_listing(mock_server: &MockServer, pages: u64, failing: &[u64]) {
    for page in 0..pages {
        let response = if failing.contains(&page) {
            ResponseTemplate::new(500)
        } else {
            ResponseTemplate::new(200).set_body_string(listing_page(page))
        };

        Mock::given(method("GET"))
            .and(path("/tag/fiction"))
            .and(query_param("start", (page * 20).to_string().as_str()))
            .respond_with(response)
            .mount(mock_server)
            .await;
    }
}

async fn run_http(config: &Config, output: &Path) -> shelf_sweep::CrawlReport {
    Coordinator::with_http(config, output)
        .expect("Failed to create coordinator")
        .run()
        .await
        .expect("Crawl failed")
}

#[tokio::test]
async fn test_full_crawl_html_listing() {
    let mock_server = MockServer::start().await;
    mount_listing(&mock_server, 3, &[]).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(
        ExtractMode::HtmlListing,
        format!("{}/tag/fiction", mock_server.uri()),
        3,
        20,
    );

    let report = run_http(&config, dir.path()).await;

    assert_eq!(report.pages_attempted, 3);
    assert_eq!(report.pages_failed, 0);
    assert_eq!(report.pages_skipped, 0);
    assert_eq!(report.records_written_per_category.get("fiction"), Some(&6));
    assert!(!report.is_partial());

    // The category file is a single valid JSON array
    let content = std::fs::read_to_string(dir.path().join("fiction.json")).unwrap();
    let value: Value = serde_json::from_str(&content).unwrap();
    let books = value.as_array().expect("category file should be an array");
    assert_eq!(books.len(), 6);

    let first = books
        .iter()
        .find(|book| book["title"] == "Book 0-1")
        .expect("Book 0-1 missing");
    assert_eq!(first["href"], "https://book.example.com/subject/01/");
    assert_eq!(first["score"], "8.1");
    assert_eq!(first["description"], "Description 0-1");

    let requests = mock_server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 3);
}

#[tokio::test]
async fn test_failed_pages_do_not_stop_siblings() {
    let mock_server = MockServer::start().await;
    mount_listing(&mock_server, 10, &[3, 7]).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(
        ExtractMode::HtmlListing,
        format!("{}/tag/fiction", mock_server.uri()),
        10,
        20,
    );

    let report = run_http(&config, dir.path()).await;

    assert_eq!(report.pages_attempted, 10);
    assert_eq!(report.pages_failed, 2);
    assert_eq!(report.pages_succeeded(), 8);
    assert_eq!(report.failures_by_kind.get(&ErrorKind::Http), Some(&2));
    assert_eq!(report.failures_per_category.get("fiction"), Some(&2));
    assert_eq!(report.records_written_per_category.get("fiction"), Some(&16));
    assert!(report.is_partial());

    let writer = CategoryWriter::new(dir.path()).unwrap();
    let titles = book_titles(&writer.read("fiction").await.unwrap());
    assert_eq!(titles.len(), 16);
    for page in (0..10).filter(|page| *page != 3 && *page != 7) {
        assert!(titles.contains(&format!("Book {}-1", page)));
        assert!(titles.contains(&format!("Book {}-2", page)));
    }
    assert!(!titles.contains("Book 3-1"));
    assert!(!titles.contains("Book 7-2"));
}

#[tokio::test]
async fn test_json_feed_crawl() {
    let mock_server = MockServer::start().await;

    let first = json!({
        "data": [
            feed_item("What is ownership?", "Move semantics."),
            {
                "target": {
                    "type": "topic_sticky_module",
                    "data": [feed_item("Pinned question", "Pinned answer")]
                }
            },
            { "target": { "content": "Answer without a question" } }
        ]
    });
    let second = json!({
        "data": [feed_item("What is borrowing?", "References.")]
    });

    Mock::given(method("GET"))
        .and(path("/api/v4/topics/rust/feeds/top_activity"))
        .and(query_param("limit", "10"))
        .and(query_param("offset", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(first))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v4/topics/rust/feeds/top_activity"))
        .and(query_param("limit", "10"))
        .and(query_param("offset", "10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(second))
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(
        ExtractMode::JsonFeed,
        format!("{}/api/v4/topics/rust/feeds/top_activity", mock_server.uri()),
        2,
        10,
    );
    config.sources[0].category = Some("rust".to_string());

    let report = run_http(&config, dir.path()).await;

    assert_eq!(report.pages_attempted, 2);
    assert_eq!(report.pages_failed, 0);
    assert_eq!(report.items_skipped, 1);
    assert_eq!(report.records_written_per_category.get("rust"), Some(&3));

    let content = std::fs::read_to_string(dir.path().join("rust.json")).unwrap();
    let value: Value = serde_json::from_str(&content).unwrap();
    assert_eq!(value["What is ownership?"], "Move semantics.");
    assert_eq!(value["Pinned question"], "Pinned answer");
    assert_eq!(value["What is borrowing?"], "References.");
}

#[tokio::test]
async fn test_unparseable_page_is_parse_failure() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/feed"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>login required</html>"))
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(
        ExtractMode::JsonFeed,
        format!("{}/feed", mock_server.uri()),
        1,
        10,
    );
    config.sources[0].category = Some("rust".to_string());

    let report = run_http(&config, dir.path()).await;

    assert_eq!(report.pages_failed, 1);
    assert_eq!(report.failures_by_kind.get(&ErrorKind::Parse), Some(&1));
    assert!(report.records_written_per_category.is_empty());
    assert!(!dir.path().join("rust.json").exists());

    // Parse failures are not retried
    let requests = mock_server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
}

#[tokio::test]
async fn test_rerun_duplicates_listing_records() {
    let mock_server = MockServer::start().await;
    mount_listing(&mock_server, 2, &[]).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(
        ExtractMode::HtmlListing,
        format!("{}/tag/fiction", mock_server.uri()),
        2,
        20,
    );

    let first = run_http(&config, dir.path()).await;
    let second = run_http(&config, dir.path()).await;
    assert_eq!(first.records_written_per_category.get("fiction"), Some(&4));
    assert_eq!(second.records_written_per_category.get("fiction"), Some(&4));
    assert_eq!(second.records_stored_per_category.get("fiction"), Some(&8));

    // Listing records are appended again on every run
    let writer = CategoryWriter::new(dir.path()).unwrap();
    let records = writer.read("fiction").await.unwrap();
    assert_eq!(records.len(), 8);
    assert_eq!(book_titles(&records).len(), 4);
}

#[tokio::test]
async fn test_storage_failure_is_isolated_to_its_category() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/tag/books"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_page(0)))
        .mount(&mock_server)
        .await;
    for page in 0..2u64 {
        Mock::given(method("GET"))
            .and(path("/feed"))
            .and(query_param("offset", (page * 10).to_string().as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(feed_page(page)))
            .mount(&mock_server)
            .await;
    }

    let dir = TempDir::new().unwrap();
    // A feed-shaped file under a listing category cannot take book records
    std::fs::write(dir.path().join("books.json"), "{}").unwrap();

    let mut config = create_test_config(
        ExtractMode::HtmlListing,
        format!("{}/tag/books", mock_server.uri()),
        3,
        20,
    );
    config.sources.push(SourceConfig {
        mode: ExtractMode::JsonFeed,
        base: format!("{}/feed", mock_server.uri()),
        category: Some("rust".to_string()),
        pages: 2,
        page_size: 10,
        offset_param: None,
        limit_param: None,
    });

    let report = run_http(&config, dir.path()).await;

    assert_eq!(report.pages_attempted, 5);
    assert_eq!(report.pages_failed, 3);
    assert_eq!(report.failures_by_kind.get(&ErrorKind::Io), Some(&3));
    assert_eq!(report.failures_per_category.get("books"), Some(&3));
    assert_eq!(report.failures_per_category.get("rust"), None);
    assert_eq!(report.records_written_per_category.get("books"), None);
    assert_eq!(report.records_written_per_category.get("rust"), Some(&2));

    // The seeded file is left as it was
    let books = std::fs::read_to_string(dir.path().join("books.json")).unwrap();
    assert_eq!(books, "{}");

    let writer = CategoryWriter::new(dir.path()).unwrap();
    let feed = writer.read("rust").await.unwrap();
    assert_eq!(feed.len(), 2);
    assert!(feed.contains(&Record::Qa(shelf_sweep::QaRecord {
        question: "Question 1".to_string(),
        answer: "Answer 1".to_string(),
    })));
}

/// Serves feed pages from memory, failing a fixed set of page indices
struct StubFetcher {
    page_size: u64,
    failing: Vec<u64>,
    delay: Duration,
}

#[async_trait]
impl PageFetcher for StubFetcher {
    async fn fetch(&self, address: &PageAddress) -> FetchResult {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let page = address.offset / self.page_size;
        if self.failing.contains(&page) {
            return FetchResult::network(format!("connection reset on page {}", page));
        }

        FetchResult::Success {
            payload: feed_page(page),
            status: 200,
        }
    }
}

#[tokio::test]
async fn test_stub_failures_are_isolated() {
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(
        ExtractMode::JsonFeed,
        "https://feeds.example.com/topics/rust".to_string(),
        10,
        10,
    );
    config.crawler.max_retries = 0;

    let fetcher = StubFetcher {
        page_size: 10,
        failing: vec![3, 7],
        delay: Duration::ZERO,
    };
    let coordinator =
        Coordinator::new(&config, fetcher, CategoryWriter::new(dir.path()).unwrap()).unwrap();
    assert_eq!(coordinator.phase(), CrawlPhase::Idle);
    let writer = coordinator.writer();

    let report = coordinator.run().await.unwrap();

    assert_eq!(report.pages_attempted, 10);
    assert_eq!(report.pages_failed, 2);
    assert_eq!(report.failures_by_kind.get(&ErrorKind::Network), Some(&2));

    let records = writer.read("rust").await.unwrap();
    assert_eq!(records.len(), 8);
    for page in (0..10).filter(|page| *page != 3 && *page != 7) {
        let expected = Record::Qa(shelf_sweep::QaRecord {
            question: format!("Question {}", page),
            answer: format!("Answer {}", page),
        });
        assert!(records.contains(&expected), "page {} missing", page);
    }
}

#[tokio::test]
async fn test_deadline_leaves_pages_undispatched() {
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(
        ExtractMode::JsonFeed,
        "https://feeds.example.com/topics/rust".to_string(),
        10,
        10,
    );
    config.crawler.concurrency = 1;
    config.crawler.deadline_secs = Some(1);

    let fetcher = StubFetcher {
        page_size: 10,
        failing: vec![],
        delay: Duration::from_millis(400),
    };
    let coordinator =
        Coordinator::new(&config, fetcher, CategoryWriter::new(dir.path()).unwrap()).unwrap();

    let report = coordinator.run().await.unwrap();

    assert!(report.pages_attempted >= 1);
    assert!(report.pages_attempted < 10);
    assert_eq!(report.pages_attempted + report.pages_skipped, 10);
    assert_eq!(report.pages_failed, 0);
    assert!(report.is_partial());
    assert_eq!(
        report.records_written_per_category.get("rust"),
        Some(&report.pages_attempted)
    );
}
