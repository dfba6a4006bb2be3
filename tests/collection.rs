use std::path::{Path, PathBuf};
use std::time::Duration;

use skin_price_collector::checkpoint::CheckpointStore;
use skin_price_collector::schema::{PriceStatus, WorkUnitId};
use skin_price_collector::{run, CollectorError, Config, Shutdown};
use tempfile::TempDir;
use tokio::time::timeout;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FOUND_BODY: &str = r#"{"success":true,"lowest_price":"$4.20","volume":"12","median_price":"$4.00"}"#;

/// Two skins, all five wears, StatTrak available on both.
const CATALOG: &str = r#"{"skins":[
    {"id":1,"weapon":"AK-47","skin_name":"Redline","category":"Rifle","introduced":"2013-12-18","stattrak":true},
    {"id":2,"weapon":"AWP","skin_name":"Asiimov","category":"Sniper Rifle","introduced":"2014-02-20","stattrak":true}
]}"#;

struct Fixture {
    _dir: TempDir,
    server: MockServer,
    catalog: PathBuf,
    checkpoint: PathBuf,
}

impl Fixture {
    async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let catalog = dir.path().join("skins.json");
        std::fs::write(&catalog, CATALOG).unwrap();
        let checkpoint = dir.path().join("checkpoint.json");

        Self {
            server: MockServer::start().await,
            catalog,
            checkpoint,
            _dir: dir,
        }
    }

    fn config(&self) -> Config {
        Config {
            catalog_path: self.catalog.clone(),
            checkpoint_path: self.checkpoint.clone(),
            market_endpoint: format!("{}/priceoverview/", self.server.uri()),
            rate_limit_count: 1000,
            rate_limit_backoff_seconds: 0,
            retry_delay_seconds: 0,
            request_timeout_seconds: 5,
            ignore_stat_trak: true,
            ..Config::default()
        }
    }

    async fn requests(&self) -> usize {
        self.server.received_requests().await.unwrap().len()
    }

    async fn mount_found(&self) {
        Mock::given(method("GET"))
            .and(path("/priceoverview/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(FOUND_BODY))
            .mount(&self.server)
            .await;
    }

    async fn checkpoint(&self) -> CheckpointStore {
        CheckpointStore::load(&self.checkpoint, true).await.unwrap()
    }
}

#[tokio::test]
async fn limit_caps_processed_units_and_sets_resume_index() {
    let fx = Fixture::new().await;
    fx.mount_found().await;

    let config = Config {
        limit: Some(5),
        ..fx.config()
    };
    let summary = run(config, Shutdown::new()).await.unwrap();

    assert_eq!(summary.work_set_size, 10);
    assert_eq!(summary.processed, 5);
    assert_eq!(summary.found, 5);
    assert_eq!(summary.last_processed_index, 5);
    assert_eq!(fx.requests().await, 5);

    let store = fx.checkpoint().await;
    assert_eq!(store.last_processed_index(), 5);
    assert_eq!(store.state().completed.len(), 5);
    // newest skin first
    assert!(store.is_found(&WorkUnitId::from("AWP | Asiimov (Factory New)")));
}

#[tokio::test]
async fn resumed_run_continues_where_the_last_one_stopped() {
    let fx = Fixture::new().await;
    fx.mount_found().await;

    let first = Config {
        limit: Some(4),
        ..fx.config()
    };
    run(first, Shutdown::new()).await.unwrap();

    let summary = run(fx.config(), Shutdown::new()).await.unwrap();
    assert_eq!(summary.start_index, 4);
    assert_eq!(summary.processed, 6);
    assert_eq!(fx.requests().await, 10);
    assert_eq!(fx.checkpoint().await.state().completed.len(), 10);
}

#[tokio::test]
async fn resume_after_completion_makes_no_requests() {
    let fx = Fixture::new().await;
    fx.mount_found().await;

    run(fx.config(), Shutdown::new()).await.unwrap();
    assert_eq!(fx.requests().await, 10);

    let summary = run(fx.config(), Shutdown::new()).await.unwrap();
    assert_eq!(summary.processed, 0);
    assert_eq!(fx.requests().await, 10);
}

#[tokio::test]
async fn no_resume_starts_over() {
    let fx = Fixture::new().await;
    fx.mount_found().await;

    run(fx.config(), Shutdown::new()).await.unwrap();

    let config = Config {
        resume: false,
        ..fx.config()
    };
    let summary = run(config, Shutdown::new()).await.unwrap();
    assert_eq!(summary.processed, 10);
    assert_eq!(fx.requests().await, 20);
}

#[tokio::test]
async fn missing_only_revisits_only_units_without_a_price() {
    let fx = Fixture::new().await;
    Mock::given(method("GET"))
        .and(query_param("market_hash_name", "AK-47 | Redline (Battle-Scarred)"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"success":false}"#))
        .with_priority(1)
        .mount(&fx.server)
        .await;
    fx.mount_found().await;

    let config = Config {
        missing_only: true,
        ..fx.config()
    };

    let first = run(config.clone(), Shutdown::new()).await.unwrap();
    assert_eq!(first.found, 9);
    assert_eq!(first.not_found, 1);
    assert_eq!(fx.requests().await, 10);

    // new pass: only the NotFound unit goes out again
    let second = run(config.clone(), Shutdown::new()).await.unwrap();
    assert_eq!(second.start_index, 0);
    assert_eq!(second.processed, 1);
    assert_eq!(second.skipped, 9);
    assert_eq!(fx.requests().await, 11);
}

#[tokio::test]
async fn missing_only_is_idempotent_on_a_fully_found_checkpoint() {
    let fx = Fixture::new().await;
    fx.mount_found().await;

    let config = Config {
        missing_only: true,
        ..fx.config()
    };
    run(config.clone(), Shutdown::new()).await.unwrap();
    run(config.clone(), Shutdown::new()).await.unwrap();
    let before = fx.requests().await;

    let summary = run(config, Shutdown::new()).await.unwrap();
    assert_eq!(summary.processed, 0);
    assert_eq!(fx.requests().await, before);
    assert_eq!(before, 10);
}

#[tokio::test]
async fn rate_limited_unit_is_recorded_unavailable_and_the_run_continues() {
    let fx = Fixture::new().await;
    Mock::given(method("GET"))
        .and(query_param("market_hash_name", "AWP | Asiimov (Minimal Wear)"))
        .respond_with(ResponseTemplate::new(429))
        .with_priority(1)
        .expect(3)
        .mount(&fx.server)
        .await;
    fx.mount_found().await;

    let summary = run(fx.config(), Shutdown::new()).await.unwrap();
    assert_eq!(summary.processed, 10);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.found, 9);

    let store = fx.checkpoint().await;
    let result = store
        .result(&WorkUnitId::from("AWP | Asiimov (Minimal Wear)"))
        .unwrap();
    assert_eq!(result.status, PriceStatus::Unavailable);
    assert_eq!(result.price, None);
    assert_eq!(store.last_processed_index(), 10);

    // the placeholder keeps a plain resume from retrying it
    run(fx.config(), Shutdown::new()).await.unwrap();
    assert_eq!(fx.requests().await, 12);
}

#[tokio::test]
async fn including_stattrak_later_only_fetches_the_new_units() {
    let fx = Fixture::new().await;
    fx.mount_found().await;

    run(fx.config(), Shutdown::new()).await.unwrap();
    assert_eq!(fx.requests().await, 10);

    let config = Config {
        ignore_stat_trak: false,
        ..fx.config()
    };
    let summary = run(config, Shutdown::new()).await.unwrap();
    assert_eq!(summary.work_set_size, 20);
    assert_eq!(summary.processed, 10);
    assert_eq!(fx.requests().await, 20);

    let store = fx.checkpoint().await;
    assert!(store.is_found(&WorkUnitId::from("StatTrak™ AK-47 | Redline (Well-Worn)")));
    assert_eq!(store.last_processed_index(), 20);
}

#[tokio::test]
async fn broken_catalog_aborts_before_any_request() {
    let fx = Fixture::new().await;
    fx.mount_found().await;

    let missing = Config {
        catalog_path: Path::new("/nonexistent/skins.json").to_path_buf(),
        ..fx.config()
    };
    let err = run(missing, Shutdown::new()).await.unwrap_err();
    assert!(matches!(err, CollectorError::CatalogIo { .. }));

    std::fs::write(&fx.catalog, "{\"skins\": [").unwrap();
    let err = run(fx.config(), Shutdown::new()).await.unwrap_err();
    assert!(matches!(err, CollectorError::CatalogParse { .. }));

    assert_eq!(fx.requests().await, 0);
    assert!(!fx.checkpoint.exists());
}

#[tokio::test]
async fn corrupt_checkpoint_requires_no_resume() {
    let fx = Fixture::new().await;
    fx.mount_found().await;
    std::fs::write(&fx.checkpoint, "garbage").unwrap();

    let err = run(fx.config(), Shutdown::new()).await.unwrap_err();
    assert!(matches!(err, CollectorError::CheckpointCorrupt { .. }));
    assert_eq!(fx.requests().await, 0);

    let config = Config {
        resume: false,
        ..fx.config()
    };
    let summary = run(config, Shutdown::new()).await.unwrap();
    assert_eq!(summary.processed, 10);
    assert_eq!(fx.checkpoint().await.state().completed.len(), 10);
}

#[tokio::test]
async fn interrupted_run_stops_cleanly() {
    let fx = Fixture::new().await;
    fx.mount_found().await;

    let shutdown = Shutdown::new();
    shutdown.trigger();

    let summary = run(fx.config(), shutdown).await.unwrap();
    assert!(summary.interrupted);
    assert_eq!(summary.processed, 0);
    assert_eq!(fx.requests().await, 0);

    // checkpoint still written and loadable
    assert_eq!(fx.checkpoint().await.last_processed_index(), 0);
}

#[tokio::test]
async fn stattrak_switch_keeps_skipping_completed_units_on_later_runs() {
    let fx = Fixture::new().await;
    fx.mount_found().await;

    run(fx.config(), Shutdown::new()).await.unwrap();
    assert_eq!(fx.requests().await, 10);

    let with_stattrak = Config {
        ignore_stat_trak: false,
        ..fx.config()
    };
    let second = Config {
        limit: Some(2),
        ..with_stattrak.clone()
    };
    let summary = run(second, Shutdown::new()).await.unwrap();
    assert_eq!(summary.processed, 2);
    assert_eq!(fx.requests().await, 12);

    // same filter now, yet the normal units from the first run stay done
    let summary = run(with_stattrak, Shutdown::new()).await.unwrap();
    assert_eq!(summary.processed, 8);
    assert_eq!(fx.requests().await, 20);

    let store = fx.checkpoint().await;
    assert_eq!(store.state().completed.len(), 20);
    assert_eq!(store.last_processed_index(), 20);
}

#[tokio::test]
async fn limited_missing_only_pass_keeps_the_resume_index() {
    let fx = Fixture::new().await;
    for name in ["AWP | Asiimov (Factory New)", "AK-47 | Redline (Battle-Scarred)"] {
        Mock::given(method("GET"))
            .and(query_param("market_hash_name", name))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"success":false}"#))
            .with_priority(1)
            .mount(&fx.server)
            .await;
    }
    fx.mount_found().await;

    let first = run(fx.config(), Shutdown::new()).await.unwrap();
    assert_eq!(first.not_found, 2);
    assert_eq!(fx.requests().await, 10);

    let missing = Config {
        missing_only: true,
        ..fx.config()
    };
    let limited = Config {
        limit: Some(1),
        ..missing.clone()
    };
    let pass = run(limited, Shutdown::new()).await.unwrap();
    assert_eq!(pass.processed, 1);
    assert_eq!(pass.last_processed_index, 10);
    assert_eq!(fx.requests().await, 11);

    let store = fx.checkpoint().await;
    assert_eq!(store.last_processed_index(), 10);
    assert_eq!(store.missing_pass_index(), Some(9));

    // a plain resume is still past the end
    let plain = run(fx.config(), Shutdown::new()).await.unwrap();
    assert_eq!(plain.processed, 0);
    assert_eq!(fx.requests().await, 11);

    // the pass picks up at its own cursor and closes
    let rest = run(missing, Shutdown::new()).await.unwrap();
    assert_eq!(rest.start_index, 9);
    assert_eq!(rest.processed, 1);
    assert_eq!(fx.requests().await, 12);
    assert_eq!(fx.checkpoint().await.state().missing_pass_index, None);
}

fn trigger_after(shutdown: &Shutdown, delay: Duration) {
    let shutdown = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        shutdown.trigger();
    });
}

#[tokio::test]
async fn interrupt_during_limiter_wait_leaves_the_unit_for_resume() {
    let fx = Fixture::new().await;
    fx.mount_found().await;

    // two slots per minute: the third unit has to wait
    let config = Config {
        rate_limit_count: 2,
        ..fx.config()
    };
    let shutdown = Shutdown::new();
    trigger_after(&shutdown, Duration::from_millis(500));

    let summary = timeout(Duration::from_secs(10), run(config, shutdown))
        .await
        .expect("interrupt did not cancel the limiter wait")
        .unwrap();
    assert!(summary.interrupted);
    assert_eq!(summary.processed, 2);
    assert_eq!(summary.requests_sent, 2);
    assert_eq!(summary.last_processed_index, 2);
    assert_eq!(fx.requests().await, 2);

    let store = fx.checkpoint().await;
    assert_eq!(store.last_processed_index(), 2);
    assert!(!store.is_completed(&WorkUnitId::from("AWP | Asiimov (Field-Tested)")));
}

#[tokio::test]
async fn interrupt_during_rate_limit_cooldown_leaves_the_unit_for_resume() {
    let fx = Fixture::new().await;
    Mock::given(method("GET"))
        .and(query_param("market_hash_name", "AWP | Asiimov (Field-Tested)"))
        .respond_with(ResponseTemplate::new(429))
        .with_priority(1)
        .mount(&fx.server)
        .await;
    fx.mount_found().await;

    let config = Config {
        rate_limit_backoff_seconds: 60,
        ..fx.config()
    };
    let shutdown = Shutdown::new();
    trigger_after(&shutdown, Duration::from_millis(500));

    let summary = timeout(Duration::from_secs(10), run(config, shutdown))
        .await
        .expect("interrupt did not cancel the cooldown")
        .unwrap();
    assert!(summary.interrupted);
    assert_eq!(summary.processed, 2);
    assert_eq!(summary.requests_sent, 3);
    assert_eq!(summary.failed, 0);

    let store = fx.checkpoint().await;
    assert_eq!(store.last_processed_index(), 2);
    assert!(!store.is_completed(&WorkUnitId::from("AWP | Asiimov (Field-Tested)")));
    assert_eq!(store.state().completed.len(), 2);
}
