//! Integration tests for the harvester
//!
//! The synthetic service checks completeness and restart behavior against a
//! known population. wiremock stands in for the search API to test the full
//! configured harvest end-to-end.

use bisect_harvest::config::{
    ApiConfig, Config, KeyType, OutputConfig, QuotaConfig, QuotaResource, SearchConfig,
    SearchEndpoint, UserAgentConfig,
};
use bisect_harvest::crawler::{
    harvest, run_self_test, CrawlSettings, Crawler, QueueSnapshot, QuotaGate, WorkQueue,
};
use bisect_harvest::partition::PartitionKey;
use bisect_harvest::source::{Entity, SyntheticClock, SyntheticService};
use bisect_harvest::storage::MemorySink;
use chrono::NaiveDate;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

type SyntheticCrawler<K> =
    Crawler<K, SyntheticService<K>, SyntheticService<K>, SyntheticClock<K>>;

/// Builds a crawler over `service` writing into fresh memory sinks
fn synthetic_crawler<K: PartitionKey>(
    service: &SyntheticService<K>,
    window: u64,
    merge_near_fits: bool,
) -> (
    SyntheticCrawler<K>,
    MemorySink<Entity>,
    MemorySink<QueueSnapshot>,
) {
    let output = MemorySink::new();
    let checkpoint = MemorySink::new();
    let gate = QuotaGate::new(
        service.clone(),
        service.clock(),
        10,
        Duration::from_secs(600),
    );
    let crawler = Crawler::new(
        service.clone(),
        gate,
        Box::new(output.clone()),
        Box::new(checkpoint.clone()),
        CrawlSettings {
            window,
            merge_near_fits,
        },
    );
    (crawler, output, checkpoint)
}

fn stored_ids(output: &MemorySink<Entity>) -> Vec<String> {
    output
        .stored()
        .iter()
        .filter_map(|e| e.get("id").and_then(Value::as_str).map(str::to_string))
        .collect()
}

#[tokio::test]
async fn test_synthetic_harvest_is_complete() {
    let service = SyntheticService::new(1000, 300)
        .with_items(None, (0i64..10100).map(|k| (k, 7 * (1 + (k as u64) % 3))))
        .strict();
    let (mut crawler, output, checkpoint) = synthetic_crawler(&service, 1000, false);

    let queue = WorkQueue::seeded(&[], 10, 10000).unwrap();
    let report = crawler.run(queue).await.unwrap();

    let expected: HashSet<String> = service.expected_ids(None, 10, 10000).into_iter().collect();
    let stored: HashSet<String> = stored_ids(&output).into_iter().collect();

    assert_eq!(stored, expected);
    assert_eq!(output.len(), expected.len());
    assert!(report.is_complete());
    assert!(report.bisections > 0);
    assert!(service.sleeps() > 0, "quota should have run out at least once");
    assert!(checkpoint.is_empty());
}

#[tokio::test]
async fn test_completeness_across_windows_and_densities() {
    for window in [3u64, 10, 50] {
        for per_key in [1u64, 2] {
            let service = SyntheticService::new(window, 50)
                .with_items(None, (0i64..400).map(|k| (k, per_key + (k as u64) % 2)))
                .strict();
            let (mut crawler, output, _) = synthetic_crawler(&service, window, false);

            let queue = WorkQueue::seeded(&[], 0, 399).unwrap();
            let report = crawler.run(queue).await.unwrap();

            let stored = stored_ids(&output);
            let unique: HashSet<&String> = stored.iter().collect();
            assert_eq!(unique.len(), stored.len(), "window {} per_key {}", window, per_key);
            assert_eq!(
                stored.len(),
                service.expected_ids(None, 0, 399).len(),
                "window {} per_key {}",
                window,
                per_key
            );
            assert!(report.is_complete());
        }
    }
}

#[tokio::test]
async fn test_strict_service_is_never_over_iterated() {
    // A strict service turns any read of an oversized result into a fatal
    // error, so finishing proves the crawler never tried.
    let service = SyntheticService::new(20, 1000)
        .with_items(None, (0i64..200).map(|k| (k, 3)))
        .strict();
    let (mut crawler, output, _) = synthetic_crawler(&service, 20, false);

    let queue = WorkQueue::seeded(&[], 0, 199).unwrap();
    crawler.run(queue).await.unwrap();

    assert_eq!(output.len(), 600);
}

#[tokio::test]
async fn test_irreducible_keys_are_reported_and_rest_harvested() {
    let service = SyntheticService::new(10, 1000).with_items(
        None,
        (0i64..50).map(|k| (k, if k == 25 { 40 } else { 2 })),
    );
    let (mut crawler, output, _) = synthetic_crawler(&service, 10, true);

    let queue = WorkQueue::seeded(&[], 0, 49).unwrap();
    let report = crawler.run(queue).await.unwrap();

    assert!(!report.is_complete());
    assert_eq!(report.irreducible.len(), 1);
    assert_eq!(report.irreducible[0].key, "25");
    assert_eq!(report.irreducible[0].total, 40);

    let stored: HashSet<String> = stored_ids(&output).into_iter().collect();
    for key in (0i64..50).filter(|k| *k != 25) {
        assert!(stored.contains(&format!("{}/0", key)));
        assert!(stored.contains(&format!("{}/1", key)));
    }
}

#[tokio::test]
async fn test_restart_from_checkpoint_finishes_the_harvest() {
    let service = SyntheticService::new(25, 200)
        .with_items(None, (0i64..300).map(|k| (k, 1 + (k as u64) % 4)))
        .strict();

    // First run: a handful of steps, then "crash"
    let (mut first, first_output, checkpoint) = synthetic_crawler(&service, 25, false);
    let mut queue = WorkQueue::seeded(&[], 0, 299).unwrap();
    for _ in 0..6 {
        queue = first.step(queue).await.unwrap();
    }
    drop(first);

    let restored = WorkQueue::<i64>::load(&checkpoint).unwrap().unwrap();
    assert_eq!(restored.to_snapshot(), queue.to_snapshot());
    assert!(!restored.is_empty());

    // Second run resumes from the checkpoint only
    let (mut second, second_output, _) = synthetic_crawler(&service, 25, false);
    second.run(restored).await.unwrap();

    let mut stored: HashSet<String> = stored_ids(&first_output).into_iter().collect();
    stored.extend(stored_ids(&second_output));
    let expected: HashSet<String> = service.expected_ids(None, 0, 299).into_iter().collect();
    assert_eq!(stored, expected);
}

#[tokio::test]
async fn test_labelled_date_harvest() {
    let start = NaiveDate::from_ymd_opt(2013, 1, 1).unwrap();
    let end = NaiveDate::from_ymd_opt(2013, 12, 31).unwrap();
    let days: Vec<NaiveDate> = start.iter_days().take_while(|d| *d <= end).collect();

    let service = SyntheticService::new(30, 500)
        .with_items(Some("bug"), days.iter().map(|d| (*d, 2)))
        .with_items(Some("question"), days.iter().step_by(3).map(|d| (*d, 1)));
    let (mut crawler, output, _) = synthetic_crawler(&service, 30, true);

    let labels = vec!["bug".to_string(), "question".to_string()];
    let queue = WorkQueue::seeded(&labels, start, end).unwrap();
    let report = crawler.run(queue).await.unwrap();

    let mut expected: HashSet<String> =
        service.expected_ids(Some("bug"), start, end).into_iter().collect();
    expected.extend(service.expected_ids(Some("question"), start, end));
    let stored: HashSet<String> = stored_ids(&output).into_iter().collect();

    assert_eq!(stored, expected);
    assert!(report.is_complete());
    assert!(stored.contains("bug/2013-06-15/1"));
    assert!(report.merges > 0);
}

#[tokio::test]
async fn test_self_test_passes() {
    let outcome = run_self_test().await.unwrap();
    assert!(outcome.passed());
    assert_eq!(outcome.expected, 9991 * 7);
    assert!(outcome.report.is_complete());
}

/// Creates a configuration harvesting `stars:1..4` from a mock server
fn create_test_config(base_url: &str, dir: &Path, window: u64) -> Config {
    Config {
        api: ApiConfig {
            base_url: base_url.to_string(),
            status_url: None,
            page_size: 2,
            timeout_secs: 5,
            complete_entities: false,
        },
        user_agent: UserAgentConfig {
            crawler_name: "TestBot".to_string(),
            crawler_version: "1.0.0".to_string(),
            contact_url: "https://example.com/contact".to_string(),
            contact_email: "test@example.com".to_string(),
        },
        quota: QuotaConfig {
            threshold: 10,
            wait_secs: 1,
            resource: QuotaResource::Search,
        },
        search: SearchConfig {
            endpoint: SearchEndpoint::Repositories,
            field: "stars".to_string(),
            key_type: KeyType::Integer,
            lower: "1".to_string(),
            upper: "4".to_string(),
            labels: Vec::new(),
            qualifiers: None,
            sort: None,
            window,
            merge_near_fits: true,
        },
        output: OutputConfig {
            directory: dir.join("collection").display().to_string(),
            prefix: "repos".to_string(),
            queue_path: dir.join("collection/queue").display().to_string(),
            log_path: None,
        },
    }
}

async fn mount_rate_limit(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/rate_limit"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "resources": {
                "core": { "limit": 5000, "remaining": 4999 },
                "search": { "limit": 30, "remaining": 30 }
            }
        })))
        .mount(server)
        .await;
}

async fn mount_search_page(server: &MockServer, q: &str, order: &str, page: &str, body: Value) {
    Mock::given(method("GET"))
        .and(path("/search/repositories"))
        .and(query_param("q", q))
        .and(query_param("order", order))
        .and(query_param("page", page))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Reads back every entity written to the run files in the output directory
fn read_output(dir: &Path) -> Vec<Value> {
    let mut entities = Vec::new();
    for entry in std::fs::read_dir(dir.join("collection")).unwrap() {
        let path = entry.unwrap().path();
        if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
            continue;
        }
        let content = std::fs::read_to_string(&path).unwrap();
        for line in content.lines().filter(|l| !l.is_empty()) {
            entities.push(serde_json::from_str(line).unwrap());
        }
    }
    entities
}

fn names(entities: &[Value]) -> HashSet<String> {
    entities
        .iter()
        .filter_map(|e| e.get("name").and_then(Value::as_str).map(str::to_string))
        .collect()
}

#[tokio::test]
async fn test_harvest_pages_through_search_api() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_rate_limit(&server).await;

    mount_search_page(
        &server,
        "stars:1..4",
        "asc",
        "1",
        json!({ "total_count": 3, "incomplete_results": false,
                "items": [{ "name": "a" }, { "name": "b" }] }),
    )
    .await;
    mount_search_page(
        &server,
        "stars:1..4",
        "asc",
        "2",
        json!({ "total_count": 3, "incomplete_results": false,
                "items": [{ "name": "c" }] }),
    )
    .await;

    let config = create_test_config(&server.uri(), dir.path(), 10);
    let report = harvest(&config, Some("secret".to_string()), false)
        .await
        .unwrap();

    assert_eq!(report.entities_stored, 3);
    assert_eq!(report.queries, 1);
    assert!(report.is_complete());
    assert_eq!(
        names(&read_output(dir.path())),
        ["a", "b", "c"].iter().map(|s| s.to_string()).collect()
    );
    assert!(!dir.path().join("collection/queue").exists());
    assert!(dir
        .path()
        .join("collection/repos.latest")
        .symlink_metadata()
        .is_ok());
}

#[tokio::test]
async fn test_harvest_retries_failed_page_fetch() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_rate_limit(&server).await;

    mount_search_page(
        &server,
        "stars:1..4",
        "asc",
        "1",
        json!({ "total_count": 3, "items": [{ "name": "a" }, { "name": "b" }] }),
    )
    .await;
    // The first request for page 2 fails, the retry succeeds
    Mock::given(method("GET"))
        .and(path("/search/repositories"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_search_page(
        &server,
        "stars:1..4",
        "asc",
        "2",
        json!({ "total_count": 3, "items": [{ "name": "c" }] }),
    )
    .await;

    let config = create_test_config(&server.uri(), dir.path(), 10);
    let report = harvest(&config, None, false).await.unwrap();

    assert_eq!(report.retries, 1);
    assert_eq!(report.entities_stored, 3);
    assert_eq!(
        names(&read_output(dir.path())),
        ["a", "b", "c"].iter().map(|s| s.to_string()).collect()
    );
}

#[tokio::test]
async fn test_harvest_merges_near_fit_from_both_ends() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_rate_limit(&server).await;

    mount_search_page(
        &server,
        "stars:1..4",
        "asc",
        "1",
        json!({ "total_count": 3, "items": [{ "name": "a" }, { "name": "b" }] }),
    )
    .await;
    mount_search_page(
        &server,
        "stars:1..4",
        "desc",
        "1",
        json!({ "total_count": 3, "items": [{ "name": "c" }, { "name": "b" }] }),
    )
    .await;

    let config = create_test_config(&server.uri(), dir.path(), 2);
    let report = harvest(&config, None, false).await.unwrap();

    assert_eq!(report.merges, 1);
    assert_eq!(report.queries, 2);
    assert_eq!(report.entities_stored, 3);
    assert_eq!(
        names(&read_output(dir.path())),
        ["a", "b", "c"].iter().map(|s| s.to_string()).collect()
    );
}

#[tokio::test]
async fn test_harvest_skips_gone_entities_when_completing() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let base = server.uri();
    mount_rate_limit(&server).await;

    mount_search_page(
        &server,
        "stars:1..4",
        "asc",
        "1",
        json!({ "total_count": 2, "items": [
            { "name": "kept", "url": format!("{}/repos/kept", base) },
            { "name": "deleted", "url": format!("{}/repos/deleted", base) }
        ] }),
    )
    .await;
    mount_search_page(
        &server,
        "stars:1..4",
        "asc",
        "2",
        json!({ "total_count": 2, "items": [] }),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/repos/kept"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "name": "kept", "full": true })),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/deleted"))
        .respond_with(
            ResponseTemplate::new(410).set_body_json(json!({ "message": "Repository deleted" })),
        )
        .mount(&server)
        .await;

    let mut config = create_test_config(&base, dir.path(), 10);
    config.api.complete_entities = true;
    let report = harvest(&config, None, false).await.unwrap();

    assert_eq!(report.entities_stored, 1);
    assert_eq!(report.entities_skipped, 1);

    let entities = read_output(dir.path());
    assert_eq!(entities.len(), 1);
    assert_eq!(entities[0]["full"], json!(true));
}

#[tokio::test]
async fn test_harvest_resumes_from_queue_checkpoint() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_rate_limit(&server).await;

    mount_search_page(
        &server,
        "stars:3..4",
        "asc",
        "1",
        json!({ "total_count": 1, "items": [{ "name": "resumed" }] }),
    )
    .await;

    let queue_path = dir.path().join("collection/queue");
    std::fs::create_dir_all(queue_path.parent().unwrap()).unwrap();
    std::fs::write(&queue_path, r#"[[null,"3","4"]]"#).unwrap();

    let config = create_test_config(&server.uri(), dir.path(), 10);
    let report = harvest(&config, None, false).await.unwrap();

    assert_eq!(report.partitions_resolved, 1);
    assert_eq!(names(&read_output(dir.path())), HashSet::from(["resumed".to_string()]));
    assert!(!queue_path.exists());
}

#[tokio::test]
async fn test_harvest_fresh_ignores_queue_checkpoint() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_rate_limit(&server).await;

    mount_search_page(
        &server,
        "stars:1..4",
        "asc",
        "1",
        json!({ "total_count": 1, "items": [{ "name": "seeded" }] }),
    )
    .await;

    let queue_path = dir.path().join("collection/queue");
    std::fs::create_dir_all(queue_path.parent().unwrap()).unwrap();
    std::fs::write(&queue_path, r#"[[null,"3","4"]]"#).unwrap();

    let config = create_test_config(&server.uri(), dir.path(), 10);
    let report = harvest(&config, None, true).await.unwrap();

    assert_eq!(report.partitions_resolved, 1);
    assert_eq!(names(&read_output(dir.path())), HashSet::from(["seeded".to_string()]));
}

#[tokio::test]
async fn test_harvest_stops_on_unexpected_status() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_rate_limit(&server).await;

    Mock::given(method("GET"))
        .and(path("/search/repositories"))
        .respond_with(
            ResponseTemplate::new(422).set_body_json(json!({ "message": "Validation Failed" })),
        )
        .mount(&server)
        .await;

    let config = create_test_config(&server.uri(), dir.path(), 10);
    let result = harvest(&config, None, false).await;

    assert!(result.is_err());
    // The seeded queue stays checkpointed for a later retry
    let checkpoint = std::fs::read_to_string(dir.path().join("collection/queue")).unwrap();
    assert_eq!(checkpoint, r#"[[null,"1","4"]]"#);
}
