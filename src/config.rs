//! Runtime configuration loaded from the environment (and `.env` via dotenvy).

use std::env;
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::pricing::ShippingPolicy;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Environment variable '{0}' is required but not set")]
    MissingEnvVar(String),

    #[error("Failed to parse environment variable '{key}': {details}")]
    ParseError { key: String, details: String },
}

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub nats_url: Option<String>,
    pub auth: AuthSettings,
    pub store: StoreSettings,
    pub payment_secret: String,
    pub admin_seed: Option<AdminSeed>,
}

#[derive(Clone, Debug)]
pub struct AuthSettings {
    pub jwt_secret: String,
    pub token_ttl: chrono::Duration,
}

/// Storefront business settings.
#[derive(Clone, Debug)]
pub struct StoreSettings {
    pub currency: String,
    pub shipping: ShippingPolicy,
    pub payment_window: chrono::Duration,
    pub sweep_interval: Duration,
    pub max_line_quantity: u32,
    pub low_stock_threshold: u32,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            currency: "INR".into(),
            shipping: ShippingPolicy { flat_fee: Decimal::from(79), free_threshold: Decimal::from(999) },
            payment_window: chrono::Duration::minutes(15),
            sweep_interval: Duration::from_secs(30),
            max_line_quantity: 10,
            low_stock_threshold: 5,
        }
    }
}

#[derive(Clone, Debug)]
pub struct AdminSeed { pub email: String, pub password: String }

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let jwt_secret = required("JWT_SECRET")?;
        if jwt_secret.len() < 16 {
            return Err(ConfigError::ParseError { key: "JWT_SECRET".into(), details: "must be at least 16 bytes".into() });
        }
        let defaults = StoreSettings::default();
        let store = StoreSettings {
            currency: env::var("STORE_CURRENCY").unwrap_or(defaults.currency).to_uppercase(),
            shipping: ShippingPolicy {
                flat_fee: parsed("FLAT_SHIPPING_FEE", defaults.shipping.flat_fee)?,
                free_threshold: parsed("FREE_SHIPPING_THRESHOLD", defaults.shipping.free_threshold)?,
            },
            payment_window: chrono::Duration::minutes(parsed("PAYMENT_WINDOW_MINUTES", 15i64)?),
            sweep_interval: Duration::from_secs(parsed("RESERVATION_SWEEP_SECS", 30u64)?),
            max_line_quantity: parsed("MAX_LINE_QUANTITY", defaults.max_line_quantity)?,
            low_stock_threshold: parsed("LOW_STOCK_THRESHOLD", defaults.low_stock_threshold)?,
        };
        let admin_seed = match (env::var("ADMIN_EMAIL").ok(), env::var("ADMIN_PASSWORD").ok()) {
            (Some(email), Some(password)) => Some(AdminSeed { email, password }),
            _ => None,
        };
        Ok(Self {
            port: parsed("PORT", 8083u16)?,
            database_url: env::var("DATABASE_URL").ok().filter(|v| !v.is_empty()),
            database_max_connections: parsed("DATABASE_MAX_CONNECTIONS", 10u32)?,
            nats_url: env::var("NATS_URL").ok().filter(|v| !v.is_empty()),
            auth: AuthSettings { jwt_secret, token_ttl: chrono::Duration::hours(parsed("JWT_TTL_HOURS", 72i64)?) },
            store,
            payment_secret: required("PAYMENT_SECRET")?,
            admin_seed,
        })
    }
}

fn required(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

fn parsed<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::ParseError { key: key.to_string(), details: e.to_string() }),
        Err(_) => Ok(default),
    }
}
