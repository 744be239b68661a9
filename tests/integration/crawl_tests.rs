//! Integration tests for the crawler
//!
//! Most tests replay a recorded catalog through the scripted driver and
//! check the final crawl state. The last test drives the HTML driver against
//! a wiremock server.

use facet_crawl::catalog::Locator;
use facet_crawl::checkpoint::{
    open_store, CheckpointError, CheckpointResult, CheckpointStore, JsonCheckpoint, Snapshot,
};
use facet_crawl::collector::{CrawlState, Item};
use facet_crawl::config::{parse_config, Config};
use facet_crawl::crawler::{crawl, Coordinator, CrawlReport};
use facet_crawl::driver::{
    Operation, RawFacetOption, ScriptedCatalog, ScriptedDriverFactory, ScriptedFailure,
};
use serde_json::{json, Map};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

type AssociationSet = BTreeSet<(String, Vec<String>)>;

fn swatch(label: &str) -> RawFacetOption {
    RawFacetOption::Swatch {
        label: Some(label.to_string()),
        code: format!("code-{}", label),
        disabled: false,
    }
}

fn item(id: &str, position: u32) -> Item {
    let mut fields = Map::new();
    fields.insert("name".to_string(), json!(format!("Product {}", id)));
    fields.insert("position".to_string(), json!(position));
    Item::new(id, fields)
}

/// Category(tops, bottoms) > Color(red, blue); nothing below Color
fn scenario_catalog() -> ScriptedCatalog {
    ScriptedCatalog::new(["Category", "Color", "Size"])
        .with_listing(
            &[],
            "Category",
            vec![
                swatch("tops"),
                swatch("bottoms"),
                RawFacetOption::Swatch {
                    label: Some("shoes".to_string()),
                    code: "code-shoes".to_string(),
                    disabled: true,
                },
            ],
        )
        .with_listing(&["tops"], "Color", vec![swatch("red"), swatch("blue")])
        .with_listing(&["bottoms"], "Color", vec![])
        .with_page(&["tops"], vec![item("A", 1)])
        .with_page(&["tops", "red"], vec![item("B", 1), item("A", 2)])
        .with_page(&["tops", "blue"], vec![item("C", 1)])
        .with_page(&["bottoms"], vec![item("D", 1)])
}

fn expected_associations() -> AssociationSet {
    [
        ("A", vec!["tops"]),
        ("A", vec!["tops", "red"]),
        ("B", vec!["tops", "red"]),
        ("C", vec!["tops", "blue"]),
        ("D", vec!["bottoms"]),
    ]
    .into_iter()
    .map(|(id, path)| {
        (
            id.to_string(),
            path.into_iter().map(String::from).collect(),
        )
    })
    .collect()
}

fn item_ids(state: &CrawlState) -> BTreeSet<String> {
    state.item_ids()
}

fn associations(state: &CrawlState) -> AssociationSet {
    state
        .associations()
        .iter()
        .map(|a| {
            (
                a.item_id.clone(),
                a.selection.iter().map(|v| v.value_name.clone()).collect(),
            )
        })
        .collect()
}

fn ids(list: &[&str]) -> BTreeSet<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// Creates a test configuration for the scripted driver
fn create_test_config(checkpoint: &Path, contexts: u32, retries: u32, timeout_ms: u64) -> Config {
    parse_config(&format!(
        r#"
[crawler]
max-concurrent-contexts = {}
max-retries = {}
task-timeout-ms = {}

[catalog]
root-url = "https://shop.example.com/men/all"
facets = ["Category", "Color"]

[checkpoint]
path = "{}"

[driver]
kind = "fixture"
fixture-path = "catalog.json"
"#,
        contexts,
        retries,
        timeout_ms,
        checkpoint.display()
    ))
    .unwrap()
}

async fn run_scripted(
    catalog: ScriptedCatalog,
    config: Config,
    store: Box<dyn CheckpointStore>,
) -> (CrawlReport, CrawlState, ScriptedDriverFactory) {
    let factory = ScriptedDriverFactory::new(catalog);
    let coordinator =
        Coordinator::with_components(config, Arc::new(factory.clone()), store, false).unwrap();
    let report = coordinator.run().await.unwrap();
    let state = coordinator.collector().snapshot();
    (report, state, factory)
}

#[tokio::test]
async fn test_end_to_end_scenario() {
    let dir = TempDir::new().unwrap();
    let ckpt = dir.path().join("ckpt");
    let config = create_test_config(&ckpt, 4, 2, 5_000);
    let store = Box::new(JsonCheckpoint::new(&ckpt).unwrap());

    let (report, state, _) = run_scripted(scenario_catalog(), config, store).await;

    assert_eq!(item_ids(&state), ids(&["A", "B", "C", "D"]));
    assert_eq!(associations(&state), expected_associations());
    assert_eq!(report.tasks_abandoned, 0);
    assert_eq!(report.field_mismatches, 0);
    assert!(report.complete);

    // the checkpoint on disk holds the same state
    let saved = JsonCheckpoint::new(&ckpt).unwrap().load().unwrap().unwrap();
    assert_eq!(associations(&saved.state), expected_associations());
}

#[tokio::test]
async fn test_applied_locators_match_selection() {
    let dir = TempDir::new().unwrap();
    let ckpt = dir.path().join("ckpt");
    // one context so every task reuses the previous task's session
    let config = create_test_config(&ckpt, 1, 0, 5_000);
    let store = Box::new(JsonCheckpoint::new(&ckpt).unwrap());

    let (_, _, factory) = run_scripted(scenario_catalog(), config, store).await;

    let extractions = factory.extractions();
    assert_eq!(extractions.len(), 4);
    for extraction in extractions {
        let expected: Vec<Locator> = extraction
            .path
            .iter()
            .map(|name| Locator::Code {
                code: format!("code-{}", name),
            })
            .collect();
        assert_eq!(extraction.applied, expected);
    }
    assert_eq!(factory.contexts_opened(), 2);
}

#[tokio::test]
async fn test_selections_follow_facet_order() {
    let dir = TempDir::new().unwrap();
    let ckpt = dir.path().join("ckpt");
    let config = create_test_config(&ckpt, 2, 0, 5_000);
    let store = Box::new(JsonCheckpoint::new(&ckpt).unwrap());

    let (_, state, _) = run_scripted(scenario_catalog(), config, store).await;

    let order = ["Category", "Color"];
    for association in state.associations() {
        let titles: Vec<&str> = association
            .selection
            .iter()
            .map(|v| v.facet_title.as_str())
            .collect();
        assert_eq!(titles.as_slice(), &order[..titles.len()]);
    }
}

#[tokio::test]
async fn test_divergent_item_keeps_first_sighting() {
    let dir = TempDir::new().unwrap();
    let ckpt = dir.path().join("ckpt");
    let config = create_test_config(&ckpt, 1, 0, 5_000);
    let store = Box::new(JsonCheckpoint::new(&ckpt).unwrap());

    let mut renamed = item("A", 3);
    renamed
        .fields
        .insert("name".to_string(), json!("Renamed product"));
    let mut catalog = scenario_catalog();
    for page in catalog.pages.iter_mut() {
        if page.path == ["tops", "blue"] {
            page.items = vec![renamed.clone()];
        }
    }

    let (report, state, _) = run_scripted(catalog, config, store).await;

    assert_eq!(report.field_mismatches, 1);
    assert_eq!(state.item("A").unwrap().fields["name"], "Product A");
    assert_eq!(state.selections_for("A").len(), 3);
}

#[tokio::test]
async fn test_retry_within_budget_succeeds() {
    let dir = TempDir::new().unwrap();
    let ckpt = dir.path().join("ckpt");
    let config = create_test_config(&ckpt, 2, 2, 5_000);
    let store = Box::new(JsonCheckpoint::new(&ckpt).unwrap());
    let catalog = scenario_catalog().with_failure(ScriptedFailure {
        path: vec!["tops".to_string(), "red".to_string()],
        operation: Operation::Extract,
        times: Some(2),
        delay_ms: None,
    });

    let (report, state, _) = run_scripted(catalog, config, store).await;

    assert_eq!(report.retries, 2);
    assert_eq!(report.tasks_abandoned, 0);
    assert_eq!(associations(&state), expected_associations());
    assert!(report.complete);
}

#[tokio::test]
async fn test_retry_budget_exhausted_abandons_subtree() {
    let dir = TempDir::new().unwrap();
    let ckpt = dir.path().join("ckpt");
    let config = create_test_config(&ckpt, 2, 2, 5_000);
    let store = Box::new(JsonCheckpoint::new(&ckpt).unwrap());
    let catalog = scenario_catalog().with_failure(ScriptedFailure {
        path: vec!["tops".to_string()],
        operation: Operation::Apply,
        times: Some(3),
        delay_ms: None,
    });

    let (report, state, factory) = run_scripted(catalog, config, store).await;

    assert_eq!(report.tasks_abandoned, 1);
    assert_eq!(report.retries, 2);
    assert!(!report.complete);
    assert_eq!(item_ids(&state), ids(&["D"]));
    // no descendant of tops ever ran
    assert!(factory
        .extractions()
        .iter()
        .all(|e| e.path.first().map(String::as_str) != Some("tops")));

    // bottoms finished, tops and the crawl as a whole did not
    let finished = state.finished();
    assert!(finished.iter().any(|k| k.len() == 1 && k[0].value_name == "bottoms"));
    assert!(!finished.iter().any(|k| k.first().map(|v| v.value_name.as_str()) == Some("tops")));
    assert!(!finished.iter().any(|k| k.is_empty()));
}

#[tokio::test]
async fn test_rerun_backfills_abandoned_subtree() {
    let dir = TempDir::new().unwrap();
    let ckpt = dir.path().join("ckpt");
    let failing = scenario_catalog().with_failure(ScriptedFailure {
        path: vec!["tops".to_string()],
        operation: Operation::Apply,
        times: None,
        delay_ms: None,
    });

    let (first, _, _) = run_scripted(
        failing,
        create_test_config(&ckpt, 2, 1, 5_000),
        Box::new(JsonCheckpoint::new(&ckpt).unwrap()),
    )
    .await;
    assert_eq!(first.tasks_abandoned, 1);

    let (second, state, factory) = run_scripted(
        scenario_catalog(),
        create_test_config(&ckpt, 2, 1, 5_000),
        Box::new(JsonCheckpoint::new(&ckpt).unwrap()),
    )
    .await;

    assert!(second.complete);
    assert_eq!(second.tasks_skipped, 1);
    assert_eq!(associations(&state), expected_associations());
    assert!(factory
        .extractions()
        .iter()
        .all(|e| e.path.first().map(String::as_str) == Some("tops")));
}

#[tokio::test]
async fn test_timeout_is_retried() {
    let dir = TempDir::new().unwrap();
    let ckpt = dir.path().join("ckpt");
    let config = create_test_config(&ckpt, 2, 1, 200);
    let store = Box::new(JsonCheckpoint::new(&ckpt).unwrap());
    let catalog = scenario_catalog().with_failure(ScriptedFailure {
        path: vec!["bottoms".to_string()],
        operation: Operation::Extract,
        times: Some(1),
        delay_ms: Some(2_000),
    });

    let (report, state, _) = run_scripted(catalog, config, store).await;

    assert_eq!(report.retries, 1);
    assert_eq!(report.tasks_abandoned, 0);
    assert!(item_ids(&state).contains("D"));
}

/// Stops persisting after a fixed number of saves, like a process that died
struct CrashingStore {
    inner: JsonCheckpoint,
    saves_left: Arc<AtomicUsize>,
}

impl CheckpointStore for CrashingStore {
    fn load(&self) -> CheckpointResult<Option<Snapshot>> {
        self.inner.load()
    }

    fn save(&mut self, snapshot: &Snapshot) -> CheckpointResult<()> {
        let left = self.saves_left.load(Ordering::SeqCst);
        if left == 0 {
            return Err(CheckpointError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "simulated crash",
            )));
        }
        self.saves_left.store(left - 1, Ordering::SeqCst);
        self.inner.save(snapshot)
    }

    fn clear(&mut self) -> CheckpointResult<()> {
        self.inner.clear()
    }
}

#[tokio::test]
async fn test_resume_after_crash_matches_uninterrupted_run() {
    let reference_dir = TempDir::new().unwrap();
    let reference_ckpt = reference_dir.path().join("ckpt");
    let (_, reference, _) = run_scripted(
        scenario_catalog(),
        create_test_config(&reference_ckpt, 1, 0, 5_000),
        Box::new(JsonCheckpoint::new(&reference_ckpt).unwrap()),
    )
    .await;

    for crash_after in [1, 4, 7] {
        let dir = TempDir::new().unwrap();
        let ckpt = dir.path().join("ckpt");

        let crashing = CrashingStore {
            inner: JsonCheckpoint::new(&ckpt).unwrap(),
            saves_left: Arc::new(AtomicUsize::new(crash_after)),
        };
        let (crashed, _, _) = run_scripted(
            scenario_catalog(),
            create_test_config(&ckpt, 1, 0, 5_000),
            Box::new(crashing),
        )
        .await;
        assert!(crashed.checkpoint_failures > 0);

        let (resumed, state, _) = run_scripted(
            scenario_catalog(),
            create_test_config(&ckpt, 1, 0, 5_000),
            Box::new(JsonCheckpoint::new(&ckpt).unwrap()),
        )
        .await;

        assert!(resumed.complete, "resume after {} saves", crash_after);
        assert_eq!(item_ids(&state), item_ids(&reference));
        assert_eq!(associations(&state), associations(&reference));
        if crash_after >= 4 {
            assert!(resumed.tasks_skipped > 0);
        }
    }
}

#[tokio::test]
async fn test_crawl_from_fixture_file_writes_resolved_export() {
    let dir = TempDir::new().unwrap();
    let fixture = dir.path().join("catalog.json");
    std::fs::write(
        &fixture,
        serde_json::to_vec_pretty(&scenario_catalog()).unwrap(),
    )
    .unwrap();
    let resolved = dir.path().join("data.json");

    let config = parse_config(&format!(
        r#"
[catalog]
root-url = "https://shop.example.com/men/all"
facets = ["Category", "Color"]

[checkpoint]
backend = "sqlite"
path = "{}"
resolved-path = "{}"

[driver]
kind = "fixture"
fixture-path = "{}"
"#,
        dir.path().join("crawl.db").display(),
        resolved.display(),
        fixture.display()
    ))
    .unwrap();

    let report = crawl(config.clone(), true).await.unwrap();
    assert!(report.complete);
    assert_eq!(report.items, 4);

    let snapshot = open_store(&config.checkpoint).unwrap().load().unwrap().unwrap();
    assert_eq!(associations(&snapshot.state), expected_associations());

    let export: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&resolved).unwrap()).unwrap();
    let a = export
        .as_array()
        .unwrap()
        .iter()
        .find(|i| i["id"] == "A")
        .unwrap();
    assert_eq!(a["selections"].as_array().unwrap().len(), 2);
    assert_eq!(a["filters"].as_array().unwrap().len(), 2);
}

mod html {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn page(color_options: &str, tiles: &[(&str, &str)]) -> String {
        let tiles: String = tiles
            .iter()
            .map(|(id, name)| {
                format!(
                    r#"<li><div class="product-item" data-product='{{"cod10":"{}","title":"{}"}}'></div></li>"#,
                    id, name
                )
            })
            .collect();
        format!(
            r#"<html><body>
            <ul class="filterGroups">
              <li class="filterGroup">
                <div class="title">Category</div>
                <ul class="refinements">
                  <li><a href="/tops"><span class="text">Tops</span></a></li>
                  <li class="disabled"><a href="/shoes"><span class="text">Shoes</span></a></li>
                </ul>
              </li>
              <li class="filterGroup">
                <div class="title">Color</div>
                <ul class="refinements">{}</ul>
              </li>
            </ul>
            <span class="count">{} results</span>
            <ul class="products">{}</ul>
            </body></html>"#,
            color_options,
            tiles.len(),
            tiles
        )
    }

    async fn mount(server: &MockServer, at: &str, body: String) {
        Mock::given(method("GET"))
            .and(path(at))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(body)
                    .insert_header("content-type", "text/html"),
            )
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_full_crawl_against_html_catalog() {
        let server = MockServer::start().await;
        let red = r#"<li><a href="/tops-red"><span class="text">Red</span></a></li>"#;

        mount(
            &server,
            "/all",
            page("", &[("A", "Tee"), ("B", "Tank"), ("C", "Jeans")]),
        )
        .await;
        mount(&server, "/tops", page(red, &[("A", "Tee"), ("B", "Tank")])).await;
        mount(&server, "/tops-red", page(red, &[("A", "Tee")])).await;

        let dir = TempDir::new().unwrap();
        let config = parse_config(&format!(
            r#"
[crawler]
max-concurrent-contexts = 2

[catalog]
root-url = "{}/all"
facets = ["Category", "Color"]

[checkpoint]
backend = "sqlite"
path = "{}"

[driver]
kind = "html"

[driver.selectors]
facet-group = "ul.filterGroups > li.filterGroup"
facet-title = "div.title"
facet-option = ".refinements > li"
option-label = "a > span.text"
item = "ul.products > li > div.product-item"
item-data-attribute = "data-product"
item-id-field = "cod10"
result-count = "span.count"

[user-agent]
crawler-name = "FacetCrawlTest"
crawler-version = "1.0"
contact-url = "https://example.com/about"
contact-email = "test@example.com"
"#,
            server.uri(),
            dir.path().join("crawl.db").display()
        ))
        .unwrap();

        let report = crawl(config.clone(), true).await.unwrap();

        assert!(report.complete);
        assert_eq!(report.count_mismatches, 0);
        let snapshot = open_store(&config.checkpoint).unwrap().load().unwrap().unwrap();
        assert_eq!(item_ids(&snapshot.state), ids(&["A", "B"]));

        let expected: AssociationSet = [
            ("A", vec!["Tops"]),
            ("B", vec!["Tops"]),
            ("A", vec!["Tops", "Red"]),
        ]
        .into_iter()
        .map(|(id, p)| (id.to_string(), p.into_iter().map(String::from).collect()))
        .collect();
        assert_eq!(associations(&snapshot.state), expected);
    }
}
