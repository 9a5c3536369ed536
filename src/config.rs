use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub internal: InternalConfig,
    pub credits: CreditsConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    #[serde(default = "default_access_token_expiration_minutes")]
    pub access_token_expiration_minutes: u64,
}

fn default_access_token_expiration_minutes() -> u64 {
    15
}

/// Shared secret for billing hooks and cron jobs. Unset rejects every call.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InternalConfig {
    #[serde(default)]
    pub secret: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreditsConfig {
    #[serde(default = "default_registration_bonus")]
    pub registration_bonus: i32,
    /// Days until granted credits expire; `None` keeps them forever
    #[serde(default)]
    pub expiry_days: Option<i64>,
    #[serde(default = "default_packages")]
    pub packages: Vec<CreditPackage>,
    /// Plan name -> credits granted per monthly period
    #[serde(default)]
    pub subscription_plans: HashMap<String, i32>,
}

fn default_registration_bonus() -> i32 {
    200
}

fn default_packages() -> Vec<CreditPackage> {
    vec![
        CreditPackage {
            id: "starter".to_string(),
            name: "Starter".to_string(),
            credits: 3000,
            price_cents: 300,
            popular: false,
            description: "For a quick study session".to_string(),
        },
        CreditPackage {
            id: "standard".to_string(),
            name: "Standard".to_string(),
            credits: 8000,
            price_cents: 800,
            popular: true,
            description: "Most popular top-up".to_string(),
        },
        CreditPackage {
            id: "premium".to_string(),
            name: "Premium".to_string(),
            credits: 20000,
            price_cents: 1800,
            popular: false,
            description: "Best value credit pack".to_string(),
        },
    ]
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct CreditPackage {
    pub id: String,
    pub name: String,
    pub credits: i32,
    pub price_cents: i64,
    #[serde(default)]
    pub popular: bool,
    #[serde(default)]
    pub description: String,
}

/// Upper bound for `credits.expiry_days`
pub const MAX_EXPIRY_DAYS: i64 = 36_500;

impl CreditsConfig {
    /// Reject settings that would mint already-expired or unrepresentable batches
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if let Some(days) = self.expiry_days {
            if !(1..=MAX_EXPIRY_DAYS).contains(&days) {
                return Err(config::ConfigError::Message(format!(
                    "credits.expiry_days must be between 1 and {}, got {}",
                    MAX_EXPIRY_DAYS, days
                )));
            }
        }

        Ok(())
    }

    /// Expiry timestamp for a grant issued at `issued_at`
    pub fn expires_at(&self, issued_at: time::OffsetDateTime) -> Option<time::OffsetDateTime> {
        self.expiry_days
            .map(|days| issued_at + time::Duration::days(days))
    }

    pub fn package(&self, id: &str) -> Option<&CreditPackage> {
        self.packages.iter().find(|p| p.id == id)
    }

    pub fn monthly_credits_for_plan(&self, plan: &str) -> Option<i32> {
        self.subscription_plans
            .get(&plan.to_lowercase())
            .copied()
            .filter(|credits| *credits > 0)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobsConfig {
    /// Interval of the in-process expiry sweep; 0 disables it
    #[serde(default)]
    pub expiry_interval_secs: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub json: bool,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        // Load .env file if it exists (for environment variable overrides)
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name("config").required(true))
            .add_source(
                config::Environment::with_prefix("CREDITS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.credits.validate()?;

        Ok(config)
    }
}
