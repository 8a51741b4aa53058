use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_host: String,
    pub bind_port: u16,
    pub whois_timeout_seconds: u64,
    pub whois_connect_timeout_seconds: u64,
    pub rdap_timeout_seconds: u64,
    pub lookup_deadline_seconds: u64,
    pub max_referrals: usize,
    pub max_response_size: usize,
    pub concurrent_whois_queries: usize,
    pub concurrent_rdap_queries: usize,
    pub cache_ttl_seconds: u64,
    pub cache_max_entries: usize,
    pub cache_cleanup_interval_seconds: u64,
    pub negative_cache_ttl_seconds: u64,
    pub global_rate_limit_per_second: f64,
    pub global_rate_limit_burst: u32,
    pub client_rate_limit_per_second: f64,
    pub client_rate_limit_burst: u32,
    pub client_idle_seconds: u64,
    pub log_level: String,
    pub rdap_bootstrap_file: Option<String>,
    pub start_time: Instant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConfigData {
    pub bind_host: String,
    pub bind_port: u16,
    pub whois_timeout_seconds: u64,
    pub whois_connect_timeout_seconds: u64,
    pub rdap_timeout_seconds: u64,
    pub lookup_deadline_seconds: u64,
    pub max_referrals: usize,
    pub max_response_size: usize,
    pub concurrent_whois_queries: usize,
    pub concurrent_rdap_queries: usize,
    pub cache_ttl_seconds: u64,
    pub cache_max_entries: usize,
    pub cache_cleanup_interval_seconds: u64,
    pub negative_cache_ttl_seconds: u64,
    pub global_rate_limit_per_second: f64,
    pub global_rate_limit_burst: u32,
    pub client_rate_limit_per_second: f64,
    pub client_rate_limit_burst: u32,
    pub client_idle_seconds: u64,
    pub log_level: String,
    #[serde(default)]
    pub rdap_bootstrap_file: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        let cpu_cores = Self::get_cpu_cores();

        Self {
            bind_host: "127.0.0.1".to_string(),
            bind_port: 5001,
            whois_timeout_seconds: 30,
            whois_connect_timeout_seconds: 10,
            rdap_timeout_seconds: 30,
            lookup_deadline_seconds: 60,
            max_referrals: 2,
            max_response_size: 1024 * 1024,
            // Whois servers ban aggressive clients, keep this modest
            concurrent_whois_queries: (cpu_cores * 2).min(16),
            concurrent_rdap_queries: (cpu_cores * 4).min(32),
            cache_ttl_seconds: 3600,
            cache_max_entries: 1000,
            cache_cleanup_interval_seconds: 300,
            negative_cache_ttl_seconds: 60,
            global_rate_limit_per_second: 10.0,
            global_rate_limit_burst: 50,
            client_rate_limit_per_second: 2.0,
            client_rate_limit_burst: 10,
            client_idle_seconds: 3600,
            log_level: "info".to_string(),
            rdap_bootstrap_file: None,
            start_time: Instant::now(),
        }
    }
}

impl Config {
    /// Defaults, then `.env`, then process environment.
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let mut settings = config::Config::builder()
            .set_default("bind_host", defaults.bind_host.clone())?
            .set_default("bind_port", i64::from(defaults.bind_port))?
            .set_default("whois_timeout_seconds", defaults.whois_timeout_seconds as i64)?
            .set_default("whois_connect_timeout_seconds", defaults.whois_connect_timeout_seconds as i64)?
            .set_default("rdap_timeout_seconds", defaults.rdap_timeout_seconds as i64)?
            .set_default("lookup_deadline_seconds", defaults.lookup_deadline_seconds as i64)?
            .set_default("max_referrals", defaults.max_referrals as i64)?
            .set_default("max_response_size", defaults.max_response_size as i64)?
            .set_default("concurrent_whois_queries", defaults.concurrent_whois_queries as i64)?
            .set_default("concurrent_rdap_queries", defaults.concurrent_rdap_queries as i64)?
            .set_default("cache_ttl_seconds", defaults.cache_ttl_seconds as i64)?
            .set_default("cache_max_entries", defaults.cache_max_entries as i64)?
            .set_default("cache_cleanup_interval_seconds", defaults.cache_cleanup_interval_seconds as i64)?
            .set_default("negative_cache_ttl_seconds", defaults.negative_cache_ttl_seconds as i64)?
            .set_default("global_rate_limit_per_second", defaults.global_rate_limit_per_second)?
            .set_default("global_rate_limit_burst", i64::from(defaults.global_rate_limit_burst))?
            .set_default("client_rate_limit_per_second", defaults.client_rate_limit_per_second)?
            .set_default("client_rate_limit_burst", i64::from(defaults.client_rate_limit_burst))?
            .set_default("client_idle_seconds", defaults.client_idle_seconds as i64)?
            .set_default("log_level", defaults.log_level.clone())?;

        settings = Self::apply_env_overrides(settings)?;

        let data: ConfigData = settings.build()?.try_deserialize()?;
        let config = Self::from_data(data);
        config.validate()?;

        Ok(config)
    }

    fn from_data(data: ConfigData) -> Self {
        Config {
            bind_host: data.bind_host,
            bind_port: data.bind_port,
            whois_timeout_seconds: data.whois_timeout_seconds,
            whois_connect_timeout_seconds: data.whois_connect_timeout_seconds,
            rdap_timeout_seconds: data.rdap_timeout_seconds,
            lookup_deadline_seconds: data.lookup_deadline_seconds,
            max_referrals: data.max_referrals,
            max_response_size: data.max_response_size,
            concurrent_whois_queries: data.concurrent_whois_queries,
            concurrent_rdap_queries: data.concurrent_rdap_queries,
            cache_ttl_seconds: data.cache_ttl_seconds,
            cache_max_entries: data.cache_max_entries,
            cache_cleanup_interval_seconds: data.cache_cleanup_interval_seconds,
            negative_cache_ttl_seconds: data.negative_cache_ttl_seconds,
            global_rate_limit_per_second: data.global_rate_limit_per_second,
            global_rate_limit_burst: data.global_rate_limit_burst,
            client_rate_limit_per_second: data.client_rate_limit_per_second,
            client_rate_limit_burst: data.client_rate_limit_burst,
            client_idle_seconds: data.client_idle_seconds,
            log_level: data.log_level.to_lowercase(),
            rdap_bootstrap_file: data.rdap_bootstrap_file.filter(|p| !p.trim().is_empty()),
            start_time: Instant::now(),
        }
    }

    pub fn validate(&self) -> Result<(), config::ConfigError> {
        let invalid = |msg: String| Err(config::ConfigError::Message(msg));

        if self.bind_port == 0 {
            return invalid("bind_port must be between 1 and 65535".to_string());
        }
        if self.whois_timeout_seconds == 0 || self.whois_connect_timeout_seconds == 0 {
            return invalid("whois timeouts must be positive".to_string());
        }
        if self.rdap_timeout_seconds == 0 {
            return invalid("rdap_timeout_seconds must be positive".to_string());
        }
        if self.lookup_deadline_seconds == 0 {
            return invalid("lookup_deadline_seconds must be positive".to_string());
        }
        if self.concurrent_whois_queries == 0 || self.concurrent_rdap_queries == 0 {
            return invalid("concurrency limits must be positive".to_string());
        }
        if self.max_response_size == 0 {
            return invalid("max_response_size must be positive".to_string());
        }
        if self.cache_ttl_seconds == 0 || self.cache_max_entries == 0 {
            return invalid(format!(
                "invalid cache settings: ttl={} max_entries={}",
                self.cache_ttl_seconds, self.cache_max_entries
            ));
        }
        if self.cache_cleanup_interval_seconds == 0 {
            return invalid("cache_cleanup_interval_seconds must be positive".to_string());
        }
        if !(self.global_rate_limit_per_second > 0.0) || self.global_rate_limit_burst == 0 {
            return invalid(format!(
                "invalid global rate limit: {}/s burst {}",
                self.global_rate_limit_per_second, self.global_rate_limit_burst
            ));
        }
        if !(self.client_rate_limit_per_second > 0.0) || self.client_rate_limit_burst == 0 {
            return invalid(format!(
                "invalid client rate limit: {}/s burst {}",
                self.client_rate_limit_per_second, self.client_rate_limit_burst
            ));
        }
        if self.client_idle_seconds == 0 {
            return invalid("client_idle_seconds must be positive".to_string());
        }
        if !LOG_LEVELS.contains(&self.log_level.as_str()) {
            return invalid(format!("invalid log level: {}", self.log_level));
        }

        Ok(())
    }

    pub fn whois_timeout(&self) -> Duration {
        Duration::from_secs(self.whois_timeout_seconds)
    }

    pub fn whois_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.whois_connect_timeout_seconds)
    }

    pub fn rdap_timeout(&self) -> Duration {
        Duration::from_secs(self.rdap_timeout_seconds)
    }

    pub fn lookup_deadline(&self) -> Duration {
        Duration::from_secs(self.lookup_deadline_seconds)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }

    pub fn cache_cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cache_cleanup_interval_seconds)
    }

    pub fn client_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.client_idle_seconds)
    }

    fn get_cpu_cores() -> usize {
        std::thread::available_parallelism()
            .map(|p| p.get())
            .unwrap_or(4) // Default to 4 cores
    }

    fn apply_env_overrides(
        mut settings: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, config::ConfigError> {
        let env_mappings = [
            ("BIND_HOST", "bind_host"),
            ("PORT", "bind_port"),
            ("BIND_PORT", "bind_port"),
            ("WHOIS_TIMEOUT", "whois_timeout_seconds"),
            ("WHOIS_TIMEOUT_SECONDS", "whois_timeout_seconds"),
            ("WHOIS_CONNECT_TIMEOUT", "whois_connect_timeout_seconds"),
            ("RDAP_TIMEOUT", "rdap_timeout_seconds"),
            ("RDAP_TIMEOUT_SECONDS", "rdap_timeout_seconds"),
            ("LOOKUP_DEADLINE", "lookup_deadline_seconds"),
            ("MAX_REFERRALS", "max_referrals"),
            ("MAX_RESPONSE_SIZE", "max_response_size"),
            ("CONCURRENT_WHOIS_QUERIES", "concurrent_whois_queries"),
            ("CONCURRENT_RDAP_QUERIES", "concurrent_rdap_queries"),
            ("CACHE_TTL", "cache_ttl_seconds"),
            ("CACHE_MAX_SIZE", "cache_max_entries"),
            ("CACHE_CLEANUP_INTERVAL", "cache_cleanup_interval_seconds"),
            ("NEGATIVE_CACHE_TTL", "negative_cache_ttl_seconds"),
            ("GLOBAL_RATE_LIMIT_PER_SECOND", "global_rate_limit_per_second"),
            ("GLOBAL_RATE_LIMIT_BURST", "global_rate_limit_burst"),
            ("CLIENT_RATE_LIMIT_PER_SECOND", "client_rate_limit_per_second"),
            ("CLIENT_RATE_LIMIT_BURST", "client_rate_limit_burst"),
            ("CLIENT_IDLE_TIMEOUT", "client_idle_seconds"),
            ("LOG_LEVEL", "log_level"),
            ("RDAP_BOOTSTRAP_FILE", "rdap_bootstrap_file"),
        ];

        for (env_var, config_key) in env_mappings {
            if let Ok(value) = std::env::var(env_var) {
                settings = settings.set_override(config_key, value)?;
            }
        }

        Ok(settings)
    }
}
