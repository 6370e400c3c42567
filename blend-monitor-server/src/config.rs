use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::alerts::AlertThresholds;
use crate::api::auth::{Principal, Role};
use crate::retry::RetryPolicy;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// A bearer token accepted by the API, bound to the identity it acts as.
#[derive(Clone, Debug, PartialEq)]
pub struct ApiToken {
    pub token: String,
    pub principal: Principal,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub database_tls: bool,
    pub host: String,
    pub port: u16,
    pub package_name: String,
    pub registry_url: String,
    pub downloads_url: String,
    pub trend_days: i64,
    pub api_tokens: Vec<ApiToken>,
    pub retry: RetryPolicy,
    pub thresholds: AlertThresholds,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let defaults = AlertThresholds::default();

        Ok(Config {
            database_url: env::var("DATABASE_URL").map_err(|_| ConfigError::Missing("DATABASE_URL"))?,
            database_tls: parse_var("DB_TLS", false)?,
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: parse_var("PORT", 8080)?,
            package_name: env::var("NPM_PACKAGE_NAME")
                .unwrap_or_else(|_| "@juspay/blend-design-system".to_string()),
            registry_url: env::var("NPM_REGISTRY_URL")
                .unwrap_or_else(|_| "https://registry.npmjs.org".to_string()),
            downloads_url: env::var("NPM_DOWNLOADS_URL")
                .unwrap_or_else(|_| "https://api.npmjs.org".to_string()),
            trend_days: parse_var("TREND_DAYS", 30)?,
            api_tokens: parse_tokens(&env::var("AUTH_TOKENS").unwrap_or_default())?,
            retry: RetryPolicy {
                max_attempts: parse_var("RETRY_MAX_ATTEMPTS", 3)?,
                base_delay: Duration::from_millis(parse_var("RETRY_BASE_DELAY_MS", 1000)?),
            },
            thresholds: AlertThresholds {
                usage_warning_pct: parse_var("ALERT_USAGE_WARNING_PCT", defaults.usage_warning_pct)?,
                billing_warning_pct: parse_var("ALERT_BILLING_WARNING_PCT", defaults.billing_warning_pct)?,
                billing_critical_pct: parse_var("ALERT_BILLING_CRITICAL_PCT", defaults.billing_critical_pct)?,
            },
        })
        .and_then(Config::validate)
    }

    fn validate(self) -> Result<Self, ConfigError> {
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                var: "RETRY_MAX_ATTEMPTS",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.thresholds.billing_warning_pct > self.thresholds.billing_critical_pct {
            return Err(ConfigError::Invalid {
                var: "ALERT_BILLING_WARNING_PCT",
                reason: "must not exceed ALERT_BILLING_CRITICAL_PCT".to_string(),
            });
        }
        if self.trend_days < 1 {
            return Err(ConfigError::Invalid {
                var: "TREND_DAYS",
                reason: "must be positive".to_string(),
            });
        }
        Ok(self)
    }
}

fn parse_var<T>(var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(raw) if !raw.trim().is_empty() => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
        }),
        _ => Ok(default),
    }
}

/// Parses `user_id:role:token` entries separated by commas.
pub fn parse_tokens(raw: &str) -> Result<Vec<ApiToken>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let mut parts = entry.splitn(3, ':');
            match (parts.next(), parts.next(), parts.next()) {
                (Some(user_id), Some(role), Some(token)) if !user_id.is_empty() && !token.is_empty() => {
                    let role = role.parse::<Role>().map_err(|reason| ConfigError::Invalid {
                        var: "AUTH_TOKENS",
                        reason,
                    })?;
                    Ok(ApiToken {
                        token: token.to_string(),
                        principal: Principal {
                            user_id: user_id.to_string(),
                            role,
                        },
                    })
                }
                _ => Err(ConfigError::Invalid {
                    var: "AUTH_TOKENS",
                    reason: format!("expected user_id:role:token, got '{}'", entry),
                }),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_token_entries() {
        let tokens = parse_tokens("alice:admin:s3cret, bob:viewer:abc").unwrap();
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].principal.user_id, "alice");
        assert_eq!(tokens[0].principal.role, Role::Admin);
        assert_eq!(tokens[1].token, "abc");
    }

    #[test]
    fn token_may_contain_colons() {
        let tokens = parse_tokens("ci:developer:a:b:c").unwrap();
        assert_eq!(tokens[0].token, "a:b:c");
    }

    #[test]
    fn rejects_malformed_entries() {
        assert!(parse_tokens("justatoken").is_err());
        assert!(parse_tokens("alice:root:tok").is_err());
        assert!(parse_tokens("").unwrap().is_empty());
    }
}
