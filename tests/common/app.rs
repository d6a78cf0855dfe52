use std::sync::Arc;

use axum::Router;
use tempfile::TempDir;
use tokio::sync::broadcast;

use monitor_backend::config::Config;
use monitor_backend::routes::build_router;
use monitor_backend::state::AppState;
use monitor_backend::store::Store;

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub config: Config,
    _temp_dir: TempDir,
}

async fn spawn_with_limits(api_limit: u64) -> TestApp {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let sled_path = temp_dir.path().join("monitor-test.sled");

    // Config is constructed directly; set_var would race with parallel tests.
    let config = Config {
        host: std::net::IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1)),
        port: 3000,
        log_level: "info".to_string(),
        enable_file_logs: false,
        log_dir: "./logs".to_string(),
        sled_path: sled_path.to_string_lossy().to_string(),
        cors_origin: "http://localhost:5173".to_string(),
        trust_proxy: false,
        rate_limit: monitor_backend::config::RateLimitConfig {
            window_secs: 60,
            max_requests: api_limit,
        },
        worker: monitor_backend::config::WorkerConfig {
            is_leader: false,
            enable_rollups: false,
            enable_retention: false,
        },
        engine: monitor_backend::config::EngineConfig {
            extra_generic_kinds: vec![],
            n_plus_one_threshold: 5,
            n_plus_one_historical_count: 100,
            n_plus_one_cheap_ceiling_ms: 50.0,
            incident_percentile: "p95".to_string(),
            incident_warning_ms: 500.0,
            incident_critical_ms: 2000.0,
            incident_warmup_buckets: 3,
            incident_cooldown_secs: 600,
            retention_days: 30,
        },
        notifier: monitor_backend::config::NotifierConfig {
            mode: "log".to_string(),
            webhook_url: String::new(),
            timeout_secs: 1,
            max_attempts: 1,
        },
    };

    let store = Arc::new(Store::open(&config.sled_path).expect("open store"));
    store.run_migrations().expect("run migrations");

    let (shutdown_tx, _) = broadcast::channel::<()>(8);
    let state = AppState::new(store, &config, shutdown_tx);

    let app = build_router(state.clone());

    TestApp {
        app,
        state,
        config,
        _temp_dir: temp_dir,
    }
}

pub async fn spawn_test_server() -> TestApp {
    spawn_with_limits(100).await
}

pub async fn spawn_test_server_with_limits(api_limit: u64) -> TestApp {
    spawn_with_limits(api_limit).await
}
