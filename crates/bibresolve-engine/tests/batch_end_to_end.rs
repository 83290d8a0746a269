use std::sync::Mutex;

use bibresolve_core::AppConfig;
use bibresolve_core::config::SourcesConfig;
use bibresolve_engine::{BatchProcessor, EngineError, ProgressEvent};
use mockito::{Matcher, Server, ServerGuard};
use tokio_util::sync::CancellationToken;

const DOE_RECORD: &str = " @article{Doe_2020, title={On Things}, author={Doe,  Jane and Roe, Rick}, \
journal={J. Test}, year={2020}, pages={1--10}, DOI={10.1/abc} }";

fn config(server: &ServerGuard) -> AppConfig {
    let base = server.url();
    let mut cfg = AppConfig::default();
    cfg.sources = SourcesConfig {
        crossref_base: format!("{base}/crossref"),
        datacite_base: format!("{base}/datacite"),
        resolver_base: format!("{base}/resolver"),
    };
    cfg.network.max_retries = 0;
    cfg.network.base_backoff_ms = 1;
    cfg.network.max_backoff_ms = 1;
    cfg.network.timeout_secs = 5;
    cfg.network.rate_limit.requests = 1_000;
    cfg.cache.memory_enabled = false;
    cfg.cache.disk_enabled = false;
    cfg.processing.validate_identifiers = false;
    cfg
}

fn crossref_path(doi: &str) -> String {
    format!("/crossref/works/{doi}/transform/application/x-bibtex")
}

#[tokio::test]
async fn duplicate_identifiers_collapse_to_one_entry() {
    let mut server = Server::new_async().await;
    let _m = server
        .mock("GET", crossref_path("10.1/abc").as_str())
        .with_status(200)
        .with_body(DOE_RECORD)
        .create_async()
        .await;

    let processor = BatchProcessor::new(&config(&server)).unwrap();
    let result = processor.process(["10.1/abc", "10.1/abc"]).await;

    assert_eq!(result.successful, 1);
    assert_eq!(result.failed, 0);
    assert_eq!(result.duplicates_removed, 1);
    assert_eq!(result.entries.len(), 1);

    let entry = &result.entries[0];
    assert_eq!(entry.key, "doe2020");
    assert_eq!(entry.metadata.source.as_deref(), Some("Crossref"));
    assert_eq!(
        entry.content,
        "@article{doe2020,\n  title = {On Things},\n  author = {Doe,  Jane and Roe, Rick},\n  \
journal = {J. Test},\n  pages = {1--10},\n  year = {2020},\n  DOI = {10.1/abc}\n}"
    );
    assert_eq!(entry.metadata.fields.get("author"), Some("Doe, Jane and Roe, Rick"));
    assert_eq!(result.analytics.total_entries, 1);
}

#[tokio::test]
async fn all_sources_missing_fails_the_identifier() {
    let mut server = Server::new_async().await;
    let m = server
        .mock("GET", Matcher::Any)
        .with_status(404)
        .expect(3)
        .create_async()
        .await;

    let processor = BatchProcessor::new(&config(&server)).unwrap();
    let result = processor.process(["10.1000/missing"]).await;

    assert_eq!(result.successful, 0);
    assert_eq!(result.failed, 1);
    assert_eq!(result.failed_identifiers, vec!["10.1000/missing"]);
    assert_eq!(result.success_rate(), 0.0);

    let entry = &result.entries[0];
    assert_eq!(entry.key, "unknown");
    assert!(entry.content.starts_with("Error: 10.1000/missing → DOI not found"));
    let message = entry.error_message().unwrap();
    assert!(message.contains("Crossref: not found"));
    assert!(message.contains("DataCite: not found"));
    assert!(message.contains("DOI.org: not found"));
    m.assert_async().await;
}

#[tokio::test]
async fn colliding_keys_are_disambiguated() {
    let mut server = Server::new_async().await;
    let _a = server
        .mock("GET", crossref_path("10.1000/first").as_str())
        .with_status(200)
        .with_body("@article{x1, title={First}, author={Doe, Jane}, year={2020}, pages={1}}")
        .create_async()
        .await;
    let _b = server
        .mock("GET", crossref_path("10.1000/second").as_str())
        .with_status(200)
        .with_body("@article{x2, title={Second}, author={Doe, John}, year={2020}, pages={2}}")
        .create_async()
        .await;

    let processor = BatchProcessor::new(&config(&server)).unwrap();
    let result = processor.process(["10.1000/first", "10.1000/second"]).await;

    assert_eq!(result.citation_keys(), vec!["doe2020", "doe2020a"]);
    assert!(result.entries[1].content.starts_with("@article{doe2020a,\n"));
    assert_eq!(result.entries[1].metadata.fields.get("key"), Some("doe2020a"));
}

#[tokio::test]
async fn concurrent_batch_keeps_input_order() {
    let mut server = Server::new_async().await;
    let ids: Vec<String> = (0..6).map(|i| format!("10.5555/item{i}")).collect();
    let mut mocks = Vec::new();
    for (i, id) in ids.iter().enumerate() {
        let body = format!("@article{{k{i}, title={{Item {i}}}, author={{Doe, Jane}}, year={{2020}}, pages={{{i}}}}}");
        mocks.push(
            server
                .mock("GET", crossref_path(id).as_str())
                .with_status(200)
                .with_body(body)
                .create_async()
                .await,
        );
    }

    let mut cfg = config(&server);
    cfg.processing.concurrency = 4;
    let processor = BatchProcessor::new(&cfg).unwrap();
    let result = processor.process(&ids).await;

    assert_eq!(result.successful, 6);
    let order: Vec<&str> = result.entries.iter().map(|e| e.identifier()).collect();
    assert_eq!(order, ids.iter().map(String::as_str).collect::<Vec<_>>());

    let mut keys = result.citation_keys();
    keys.sort_unstable();
    keys.dedup();
    assert_eq!(keys.len(), 6);
}

#[tokio::test]
async fn crossref_enrichment_is_merged_into_the_record() {
    let mut server = Server::new_async().await;
    let _bib = server
        .mock("GET", crossref_path("10.1038/nature14539").as_str())
        .with_status(200)
        .with_body(
            " @article{Mnih_2015, title={Human-level control}, author={Mnih, Volodymyr}, \
journal={Nature}, year={2015}, DOI={10.1038/nature14539} }",
        )
        .create_async()
        .await;
    let _json = server
        .mock("GET", "/crossref/works/10.1038/nature14539")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"status": "ok", "message": {
                "abstract": "<jats:p>We did it.</jats:p>",
                "container-title": ["Nature"],
                "short-container-title": ["Nat."],
                "ISSN": ["0028-0836"],
                "URL": "http://dx.doi.org/10.1038/nature14539",
                "published-print": {"date-parts": [[2015, 2, 26]]},
                "page": "529-533"
            }}"#,
        )
        .create_async()
        .await;

    let mut cfg = config(&server);
    cfg.processing.fetch_abstracts = true;
    cfg.processing.include_abstracts = true;
    cfg.processing.use_abbrev_journal = true;
    let processor = BatchProcessor::new(&cfg).unwrap();
    let result = processor.process(["https://doi.org/10.1038/nature14539"]).await;

    let entry = &result.entries[0];
    assert!(entry.is_ok(), "{:?}", entry.error_message());
    assert_eq!(entry.identifier(), "10.1038/nature14539");
    assert_eq!(
        entry.content,
        "@article{mnih2015,\n  title = {Human-level control},\n  author = {Mnih, Volodymyr},\n  \
journal = {Nat.},\n  pages = {529-533},\n  year = {2015},\n  DOI = {10.1038/nature14539},\n  \
abstract = {We did it.}\n}"
    );
    let fields = &entry.metadata.fields;
    assert_eq!(fields.get("month"), Some("feb"));
    assert_eq!(fields.get("issn"), Some("0028-0836"));
    assert_eq!(fields.get("journal_full"), Some("Nature"));
}

#[tokio::test]
async fn invalid_identifier_never_reaches_the_network() {
    let mut server = Server::new_async().await;
    let m = server
        .mock("GET", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let mut cfg = config(&server);
    cfg.processing.validate_identifiers = true;
    let processor = BatchProcessor::new(&cfg).unwrap();
    let result = processor.process(["not-a-doi", "10.1/abc"]).await;

    assert_eq!(result.failed, 2);
    assert_eq!(result.failed_identifiers, vec!["not-a-doi", "10.1/abc"]);
    assert!(result.entries[0].error_message().unwrap().starts_with("invalid DOI"));
    m.assert_async().await;
}

#[tokio::test]
async fn cancellation_stops_scheduling() {
    let mut server = Server::new_async().await;
    let m = server
        .mock("GET", crossref_path("10.1/abc").as_str())
        .with_status(200)
        .with_body(DOE_RECORD)
        .expect(1)
        .create_async()
        .await;

    let processor = BatchProcessor::new(&config(&server)).unwrap();
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let stop_after_first = move |event: ProgressEvent| {
        if let ProgressEvent::Finished { .. } = event {
            token.cancel();
        }
    };

    let result = processor
        .process_with(["10.1/abc", "10.1/def", "10.1/ghi"], &stop_after_first, &cancel)
        .await;

    assert_eq!(result.successful, 1);
    assert_eq!(result.failed, 2);
    assert_eq!(result.successful + result.failed, 3);
    assert!(result.entries[2].error_message().unwrap().contains("cancelled"));
    m.assert_async().await;
}

#[tokio::test]
async fn progress_reports_every_identifier() {
    let mut server = Server::new_async().await;
    let _m = server
        .mock("GET", crossref_path("10.1/abc").as_str())
        .with_status(200)
        .with_body(DOE_RECORD)
        .create_async()
        .await;
    let _missing = server
        .mock("GET", Matcher::Regex("zzz".to_string()))
        .with_status(404)
        .create_async()
        .await;

    let processor = BatchProcessor::new(&config(&server)).unwrap();
    let events = Mutex::new(Vec::new());
    let record = |event: ProgressEvent| events.lock().unwrap().push(event);

    let result = processor
        .process_with(
            ["10.1/abc", "10.1/zzz", "10.1/abc"],
            &record,
            &CancellationToken::new(),
        )
        .await;
    assert_eq!(result.successful + result.failed + result.duplicates_removed, 3);

    let events = events.into_inner().unwrap();
    let finished = events
        .iter()
        .filter(|e| matches!(e, ProgressEvent::Finished { .. }))
        .count();
    assert_eq!(finished, 3);
    assert!(events.contains(&ProgressEvent::DuplicatesRemoved { count: 1 }));
    assert!(matches!(
        events.iter().rev().nth(1),
        Some(ProgressEvent::Finished { completed: 3, total: 3, .. })
    ));
}

#[tokio::test]
async fn invalid_config_is_rejected_up_front() {
    let server = Server::new_async().await;
    let mut cfg = config(&server);
    cfg.processing.concurrency = 0;
    assert!(matches!(
        BatchProcessor::new(&cfg),
        Err(EngineError::Config(_))
    ));
}

#[tokio::test]
async fn empty_batch_is_empty() {
    let server = Server::new_async().await;
    let processor = BatchProcessor::new(&config(&server)).unwrap();
    let result = processor.process(Vec::<String>::new()).await;
    assert_eq!(result.total_count(), 0);
    assert!(result.entries.is_empty());
}
