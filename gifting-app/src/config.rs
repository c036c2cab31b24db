//! Configuration loading from environment.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;

use gifting_hex::ServiceConfig;
use gifting_hex::outbound::GatewaySettings;
use gifting_repo::security::DEFAULT_TOLERANCE_SECS;
use gifting_types::Currency;

/// Where to deliver outbound notifications.
pub struct NotifySettings {
    pub url: String,
    pub secret: String,
}

/// Application configuration.
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub rate_limit_per_minute: u32,
    pub service: ServiceConfig,
    pub gateway: GatewaySettings,
    /// `None` when `NOTIFY_URL` is unset: notifications are only logged.
    pub notify: Option<NotifySettings>,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key: &str| env::var(key).ok())
    }

    /// The store URL alone, for commands that never serve traffic.
    pub fn database_url_from_env() -> anyhow::Result<String> {
        required(&|key: &str| env::var(key).ok(), "DATABASE_URL")
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let port = parsed_or(&lookup, "PORT", 3000)?;
        let database_url = required(&lookup, "DATABASE_URL")?;
        let rate_limit_per_minute = parsed_or(&lookup, "RATE_LIMIT_PER_MINUTE", 100)?;
        let gateway_timeout =
            Duration::from_secs(parsed_or(&lookup, "GATEWAY_TIMEOUT_SECS", 10)?);

        let service = ServiceConfig {
            currency: parsed_or(&lookup, "BASE_CURRENCY", Currency::USD)?,
            cents_per_credit: parsed_or(&lookup, "CENTS_PER_CREDIT", 20)?,
            max_checkout_amount: parsed_or(&lookup, "MAX_CHECKOUT_AMOUNT", 100_000)?,
            gateway_timeout,
            webhook_secret: required(&lookup, "WEBHOOK_SECRET")?,
            webhook_tolerance_secs: parsed_or(
                &lookup,
                "WEBHOOK_TOLERANCE_SECS",
                DEFAULT_TOLERANCE_SECS,
            )?,
        };
        if service.cents_per_credit <= 0 {
            anyhow::bail!("CENTS_PER_CREDIT must be positive");
        }

        let gateway = GatewaySettings {
            base_url: required(&lookup, "GATEWAY_API_URL")?,
            api_key: required(&lookup, "GATEWAY_API_KEY")?,
            success_url: required(&lookup, "CHECKOUT_SUCCESS_URL")?,
            cancel_url: required(&lookup, "CHECKOUT_CANCEL_URL")?,
            timeout: gateway_timeout,
        };

        let notify = match lookup("NOTIFY_URL").filter(|url| !url.is_empty()) {
            Some(url) => Some(NotifySettings {
                url,
                secret: required(&lookup, "NOTIFY_SECRET")?,
            }),
            None => None,
        };

        Ok(Self {
            port,
            database_url,
            rate_limit_per_minute,
            service,
            gateway,
            notify,
        })
    }
}

fn required(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> anyhow::Result<String> {
    lookup(key)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| anyhow::anyhow!("{} environment variable is required", key))
}

fn parsed_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {}: {:?}", key, raw)),
        None => Ok(default),
    }
}
