use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::net::SocketAddr;
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub scraper: ScraperConfig,
    pub scheduler: SchedulerConfig,
    pub notifications: NotificationsConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout: u64,
    /// Connection attempts at startup before giving up.
    pub connect_retries: usize,
    /// Seconds a writer waits for the database lock before failing.
    pub busy_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    pub request_timeout: u64,
    /// Minimum gap between two requests to the listing site.
    pub request_delay_ms: u64,
    pub max_concurrent_fetches: usize,
    pub max_pages: u32,
    /// Extra fetches of an empty result page before accepting it as the end.
    pub empty_page_confirmations: u32,
    pub user_agent: String,
    pub accept_language: String,
    pub allowed_host_suffix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub tick_interval_secs: u64,
    pub default_polling_interval_secs: i64,
    pub min_polling_interval_secs: i64,
    /// Syncs after a settings change that always report, even without news.
    pub liveness_notifications: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    pub telegram: TelegramConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub token: Option<String>,
    pub api_base_url: String,
    #[serde(default)]
    pub authorized_users: Vec<i64>,
}

impl TelegramConfig {
    /// The configured bot token, ignoring blank values such as an empty
    /// `LISTING_WATCH__NOTIFICATIONS__TELEGRAM__TOKEN`.
    pub fn bot_token(&self) -> Option<&str> {
        self.token.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub directory: Option<String>,
    pub json: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub listen_address: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Self::with_defaults(Config::builder())?
            // Add file configuration, all optional
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Add local config (ignored by git)
            .add_source(File::with_name("config/local").required(false))
            // Add environment variables with prefix "LISTING_WATCH__"
            .add_source(
                Environment::with_prefix("LISTING_WATCH")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("notifications.telegram.authorized_users"),
            )
            .build()?;

        let config: AppConfig = s.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn with_defaults(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        builder
            .set_default("database.url", "sqlite://data/listing-watch.db?mode=rwc")?
            .set_default("database.max_connections", 5_i64)?
            .set_default("database.acquire_timeout", 30_i64)?
            .set_default("database.connect_retries", 5_i64)?
            .set_default("database.busy_timeout", 30_i64)?
            .set_default("scraper.request_timeout", 30_i64)?
            .set_default("scraper.request_delay_ms", 500_i64)?
            .set_default("scraper.max_concurrent_fetches", 8_i64)?
            .set_default("scraper.max_pages", 500_i64)?
            .set_default("scraper.empty_page_confirmations", 0_i64)?
            .set_default(
                "scraper.user_agent",
                "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36",
            )?
            .set_default("scraper.accept_language", "nl-NL,nl;q=0.9,en;q=0.8")?
            .set_default("scraper.allowed_host_suffix", "funda.nl")?
            .set_default("scheduler.tick_interval_secs", 10_i64)?
            .set_default("scheduler.default_polling_interval_secs", 3600_i64)?
            .set_default("scheduler.min_polling_interval_secs", 60_i64)?
            .set_default("scheduler.liveness_notifications", 3_i64)?
            .set_default("notifications.telegram.api_base_url", "https://api.telegram.org")?
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("metrics.enabled", false)?
            .set_default("metrics.listen_address", "0.0.0.0:9000")
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        // Validate database configuration
        if self.database.url.is_empty() {
            return Err(ConfigError::Message("Database url must not be empty".into()));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::Message("Database max_connections must be greater than 0".into()));
        }

        if self.database.connect_retries == 0 {
            return Err(ConfigError::Message("Database connect_retries must be greater than 0".into()));
        }

        // Validate scraper configuration
        if self.scraper.max_concurrent_fetches == 0 {
            return Err(ConfigError::Message("Scraper max_concurrent_fetches must be greater than 0".into()));
        }

        if self.scraper.max_pages == 0 {
            return Err(ConfigError::Message("Scraper max_pages must be greater than 0".into()));
        }

        if self.scraper.request_timeout == 0 {
            return Err(ConfigError::Message("Scraper request_timeout must be greater than 0".into()));
        }

        if self.scraper.allowed_host_suffix.trim().is_empty() {
            return Err(ConfigError::Message("Scraper allowed_host_suffix must not be empty".into()));
        }

        // Validate scheduler configuration
        if self.scheduler.tick_interval_secs == 0 {
            return Err(ConfigError::Message("Scheduler tick_interval_secs must be greater than 0".into()));
        }

        if self.scheduler.min_polling_interval_secs <= 0 {
            return Err(ConfigError::Message("Scheduler min_polling_interval_secs must be greater than 0".into()));
        }

        if self.scheduler.default_polling_interval_secs < self.scheduler.min_polling_interval_secs {
            return Err(ConfigError::Message(
                "Scheduler default_polling_interval_secs cannot be below min_polling_interval_secs".into(),
            ));
        }

        if self.scheduler.liveness_notifications < 0 {
            return Err(ConfigError::Message("Scheduler liveness_notifications cannot be negative".into()));
        }

        // Validate notification configuration
        if Url::parse(&self.notifications.telegram.api_base_url).is_err() {
            return Err(ConfigError::Message("Invalid Telegram api_base_url format".into()));
        }

        // Validate metrics configuration
        if self.metrics.enabled && self.metrics.listen_address.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::Message("Metrics listen_address must be a socket address".into()));
        }

        Ok(())
    }
}
