use std::env;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use std::fmt;

#[derive(Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub log_level: String,
    pub enable_file_logs: bool,
    pub log_dir: String,
    pub sled_path: String,
    pub cors_origin: String,
    pub trust_proxy: bool,
    pub rate_limit: RateLimitConfig,
    pub worker: WorkerConfig,
    pub engine: EngineConfig,
    pub notifier: NotifierConfig,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub window_secs: u64,
    pub max_requests: u64,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub is_leader: bool,
    pub enable_rollups: bool,
    pub enable_retention: bool,
}

/// Tunables for fingerprinting, detection, rollups and incidents.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Extra exception kinds (comma separated env) grouped without call path,
    /// merged with the built-in framework-generic set.
    pub extra_generic_kinds: Vec<String>,
    pub n_plus_one_threshold: usize,
    pub n_plus_one_historical_count: u64,
    pub n_plus_one_cheap_ceiling_ms: f64,
    /// Which rollup percentile drives incident transitions: "p95" or "p99".
    pub incident_percentile: String,
    pub incident_warning_ms: f64,
    pub incident_critical_ms: f64,
    pub incident_warmup_buckets: usize,
    pub incident_cooldown_secs: i64,
    pub retention_days: i64,
}

#[derive(Clone)]
pub struct NotifierConfig {
    /// "log" or "webhook".
    pub mode: String,
    pub webhook_url: String,
    pub timeout_secs: u64,
    pub max_attempts: u32,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("log_level", &self.log_level)
            .field("enable_file_logs", &self.enable_file_logs)
            .field("log_dir", &self.log_dir)
            .field("sled_path", &self.sled_path)
            .field("cors_origin", &self.cors_origin)
            .field("trust_proxy", &self.trust_proxy)
            .field("rate_limit", &self.rate_limit)
            .field("worker", &self.worker)
            .field("engine", &self.engine)
            .field("notifier", &self.notifier)
            .finish()
    }
}

impl fmt::Debug for NotifierConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotifierConfig")
            .field("mode", &self.mode)
            .field("webhook_url", &"***REDACTED***")
            .field("timeout_secs", &self.timeout_secs)
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            host: env_or_parse("HOST", IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))),
            port: env_or_parse("PORT", 3000_u16),
            log_level: env_or("RUST_LOG", "info"),
            enable_file_logs: env_or_bool("ENABLE_FILE_LOGS", false),
            log_dir: env_or("LOG_DIR", "./logs"),
            sled_path: env_or("SLED_PATH", "./data/monitor.sled"),
            cors_origin: env_or("CORS_ORIGIN", "http://localhost:5173"),
            trust_proxy: env_or_bool("TRUST_PROXY", false),
            rate_limit: RateLimitConfig {
                window_secs: env_or_parse("RATE_LIMIT_WINDOW_SECS", 60_u64),
                max_requests: env_or_parse("RATE_LIMIT_MAX", 1000_u64),
            },
            worker: WorkerConfig {
                is_leader: env_or_bool("WORKER_LEADER", true),
                enable_rollups: env_or_bool("ENABLE_ROLLUP_WORKERS", true),
                enable_retention: env_or_bool("ENABLE_RETENTION_WORKER", true),
            },
            engine: EngineConfig {
                extra_generic_kinds: env_or("FINGERPRINT_GENERIC_KINDS", "")
                    .split(',')
                    .map(|s| s.trim().to_lowercase())
                    .filter(|s| !s.is_empty())
                    .collect(),
                n_plus_one_threshold: env_or_parse("N_PLUS_ONE_THRESHOLD", 5_usize),
                n_plus_one_historical_count: env_or_parse("N_PLUS_ONE_HISTORICAL_COUNT", 100_u64),
                n_plus_one_cheap_ceiling_ms: env_or_parse("N_PLUS_ONE_CHEAP_CEILING_MS", 50.0_f64),
                incident_percentile: env_or("INCIDENT_PERCENTILE", "p95"),
                incident_warning_ms: env_or_parse("INCIDENT_WARNING_MS", 500.0_f64),
                incident_critical_ms: env_or_parse("INCIDENT_CRITICAL_MS", 2000.0_f64),
                incident_warmup_buckets: env_or_parse("INCIDENT_WARMUP_BUCKETS", 3_usize),
                incident_cooldown_secs: env_or_parse("INCIDENT_COOLDOWN_SECS", 600_i64),
                retention_days: env_or_parse("EVENT_RETENTION_DAYS", 30_i64),
            },
            notifier: NotifierConfig {
                mode: env_or("NOTIFIER_MODE", "log"),
                webhook_url: env_or("NOTIFIER_WEBHOOK_URL", ""),
                timeout_secs: env_or_parse("NOTIFIER_TIMEOUT_SECS", 10_u64),
                max_attempts: env_or_parse("NOTIFIER_MAX_ATTEMPTS", 3_u32),
            },
        }
    }
}

pub fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

pub fn env_or_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy,
{
    match env::var(key) {
        Ok(raw) => match raw.parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(
                    key,
                    value = %raw,
                    "Failed to parse env var, using default"
                );
                default
            }
        },
        Err(_) => default,
    }
}

pub fn env_or_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Mutex, OnceLock};

    use super::*;

    fn env_lock() -> &'static Mutex<()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
    }

    fn managed_keys() -> &'static [&'static str] {
        &[
            "HOST",
            "PORT",
            "RUST_LOG",
            "RATE_LIMIT_MAX",
            "N_PLUS_ONE_THRESHOLD",
            "INCIDENT_WARMUP_BUCKETS",
            "FINGERPRINT_GENERIC_KINDS",
            "NOTIFIER_MODE",
        ]
    }

    fn clear_keys(keys: &[&str]) {
        for key in keys {
            env::remove_var(key);
        }
    }

    #[test]
    fn loads_defaults_when_missing() {
        let _guard = env_lock().lock().expect("env lock");
        clear_keys(managed_keys());

        let cfg = Config::from_env();
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.engine.n_plus_one_threshold, 5);
        assert_eq!(cfg.engine.incident_percentile, "p95");
        assert_eq!(cfg.notifier.mode, "log");
        assert!(cfg.engine.extra_generic_kinds.is_empty());
    }

    #[test]
    fn parses_numeric_values() {
        let _guard = env_lock().lock().expect("env lock");
        clear_keys(managed_keys());

        env::set_var("PORT", "4000");
        env::set_var("RATE_LIMIT_MAX", "100");
        env::set_var("INCIDENT_WARMUP_BUCKETS", "5");

        let cfg = Config::from_env();
        assert_eq!(cfg.port, 4000);
        assert_eq!(cfg.rate_limit.max_requests, 100);
        assert_eq!(cfg.engine.incident_warmup_buckets, 5);
    }

    #[test]
    fn invalid_values_fall_back() {
        let _guard = env_lock().lock().expect("env lock");
        clear_keys(managed_keys());

        env::set_var("PORT", "bad");
        env::set_var("N_PLUS_ONE_THRESHOLD", "x");

        let cfg = Config::from_env();
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.engine.n_plus_one_threshold, 5);
    }

    #[test]
    fn generic_kinds_are_split_and_lowercased() {
        let _guard = env_lock().lock().expect("env lock");
        clear_keys(managed_keys());

        env::set_var("FINGERPRINT_GENERIC_KINDS", "Timeout Error, Stale Object ,");

        let cfg = Config::from_env();
        assert_eq!(
            cfg.engine.extra_generic_kinds,
            vec!["timeout error".to_string(), "stale object".to_string()]
        );
    }
}
