use serde::Deserialize;
use config::{Config, ConfigError, Environment, File};

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub marketplace: MarketplaceConfig,
    #[serde(default)]
    pub stripe: StripeConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Tunables for the booking lifecycle and settlement rules. These are
/// deliberately configuration, not code: the commission rate and the
/// confirmation window get adjusted by operations without a deploy.
#[derive(Debug, Deserialize, Clone)]
pub struct MarketplaceConfig {
    /// Platform cut of every settled payment, in [0, 1].
    pub commission_rate: f64,
    /// How long both parties have to confirm a new booking.
    pub confirmation_window_minutes: i64,
    /// Cadence of the background sweep that expires unconfirmed bookings.
    pub expiry_sweep_interval_seconds: u64,
    pub currency: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct StripeConfig {
    pub secret_key: Option<String>,
    pub webhook_secret: Option<String>,
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct NotificationConfig {
    /// Optional URL that receives every notification as a JSON POST.
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub log_enabled: bool,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("database.max_connections", 10)?
            .set_default("marketplace.commission_rate", 0.12)?
            .set_default("marketplace.confirmation_window_minutes", 30)?
            .set_default("marketplace.expiry_sweep_interval_seconds", 60)?
            .set_default("marketplace.currency", "usd")?
            .set_default("stripe.enabled", false)?
            .set_default("notifications.log_enabled", true)?

            // Add config file if it exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))

            // Add environment variables (with GARAGELINK__ prefix, double underscore separates levels)
            .add_source(Environment::with_prefix("GARAGELINK").separator("__"))

            .build()?;

        config.try_deserialize()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                url: "sqlite://garagelink.db".to_string(),
                max_connections: 10,
            },
            marketplace: MarketplaceConfig::default(),
            stripe: StripeConfig {
                secret_key: None,
                webhook_secret: None,
                enabled: false,
            },
            notifications: NotificationConfig {
                webhook_url: None,
                log_enabled: true,
            },
        }
    }
}

impl Default for MarketplaceConfig {
    fn default() -> Self {
        Self {
            commission_rate: 0.12,
            confirmation_window_minutes: 30,
            expiry_sweep_interval_seconds: 60,
            currency: "usd".to_string(),
        }
    }
}
