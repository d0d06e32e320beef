//! Runtime configuration.
//!
//! Everything is read from the environment once, at startup, and handed to the
//! services through `AppState`. Request handlers never touch `std::env`.

use std::{env, time::Duration};

use anyhow::{Context, Result, anyhow};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub payments: PaymentConfig,
    pub admin: Option<AdminSeed>,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub access_token_secret: String,
    pub access_token_ttl: Duration,
    pub refresh_token_secret: String,
    pub refresh_token_ttl: Duration,
    pub cookie_secure: bool,
    pub bcrypt_cost: u32,
}

#[derive(Clone, Debug)]
pub struct PaymentConfig {
    pub key_id: String,
    pub key_secret: String,
    pub api_url: String,
    pub currency: String,
    pub timeout: Duration,
}

/// Optional admin account created on boot when all three variables are set.
#[derive(Clone, Debug)]
pub struct AdminSeed {
    pub name: String,
    pub email: String,
    pub password: String,
}

pub fn load() -> Result<AppConfig> {
    let admin = match (
        optional("ADMIN_NAME"),
        optional("ADMIN_EMAIL"),
        optional("ADMIN_PASSWORD"),
    ) {
        (Some(name), Some(email), Some(password)) => Some(AdminSeed {
            name,
            email,
            password,
        }),
        _ => None,
    };

    Ok(AppConfig {
        server: ServerConfig {
            host: optional("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or("PORT", 3000)?,
        },
        database: DatabaseConfig {
            url: required("DATABASE_URL")?,
        },
        auth: AuthConfig {
            access_token_secret: required("ACCESS_TOKEN_SECRET")?,
            access_token_ttl: ttl_or("ACCESS_TOKEN_EXPIRY", "1d")?,
            refresh_token_secret: required("REFRESH_TOKEN_SECRET")?,
            refresh_token_ttl: ttl_or("REFRESH_TOKEN_EXPIRY", "10d")?,
            cookie_secure: parse_or("COOKIE_SECURE", false)?,
            bcrypt_cost: parse_or("BCRYPT_COST", bcrypt::DEFAULT_COST)?,
        },
        payments: PaymentConfig {
            key_id: required("RAZORPAY_KEY_ID")?,
            key_secret: required("RAZORPAY_KEY_SECRET")?,
            api_url: optional("RAZORPAY_API_URL")
                .unwrap_or_else(|| "https://api.razorpay.com".to_string()),
            currency: optional("PAYMENT_CURRENCY").unwrap_or_else(|| "INR".to_string()),
            timeout: Duration::from_secs(parse_or("PAYMENT_GATEWAY_TIMEOUT_SECS", 10)?),
        },
        admin,
    })
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn required(key: &str) -> Result<String> {
    optional(key).with_context(|| format!("{key} must be set"))
}

fn parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match optional(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|err| anyhow!("{key} has an invalid value {raw:?}: {err}")),
        None => Ok(default),
    }
}

fn ttl_or(key: &str, default: &str) -> Result<Duration> {
    let raw = optional(key).unwrap_or_else(|| default.to_string());
    parse_ttl(&raw).with_context(|| format!("{key} has an invalid duration {raw:?}"))
}

/// Parses `"900"`, `"15m"`, `"12h"`, `"1d"` style durations.
pub fn parse_ttl(raw: &str) -> Result<Duration> {
    let raw = raw.trim();
    let (digits, unit) = match raw.char_indices().find(|(_, c)| !c.is_ascii_digit()) {
        Some((idx, _)) => raw.split_at(idx),
        None => (raw, "s"),
    };

    let amount: u64 = digits
        .parse()
        .map_err(|_| anyhow!("expected a number followed by s, m, h or d"))?;
    let multiplier = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 24 * 60 * 60,
        other => return Err(anyhow!("unknown duration unit {other:?}")),
    };

    let seconds = amount
        .checked_mul(multiplier)
        .ok_or_else(|| anyhow!("duration is too large"))?;
    if seconds == 0 {
        return Err(anyhow!("duration must be positive"));
    }

    Ok(Duration::from_secs(seconds))
}
