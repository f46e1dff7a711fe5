//! Environment-driven configuration for the combined server.

use std::path::PathBuf;
use std::str::FromStr;

use courier_gateway::GatewayConfig;
use courier_relay::RelayConfig;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value}")]
    InvalidValue { var: String, value: String },
}

/// Relay and gateway settings plus the optional user seed file.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub relay: RelayConfig,
    pub gateway: GatewayConfig,
    pub user_seed: Option<PathBuf>,
}

impl ServerConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let relay_defaults = RelayConfig::default();
        let relay = RelayConfig {
            bind_addr: lookup("RELAY_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string()),
            heartbeat_interval_secs: parse_or(
                &lookup,
                "RELAY_HEARTBEAT_SECS",
                relay_defaults.heartbeat_interval_secs,
            )?,
            idle_timeout_secs: parse_or(
                &lookup,
                "RELAY_IDLE_TIMEOUT_SECS",
                relay_defaults.idle_timeout_secs,
            )?,
        };
        for (var, secs) in [
            ("RELAY_HEARTBEAT_SECS", relay.heartbeat_interval_secs),
            ("RELAY_IDLE_TIMEOUT_SECS", relay.idle_timeout_secs),
        ] {
            if secs == 0 {
                return Err(ConfigError::InvalidValue {
                    var: var.to_string(),
                    value: secs.to_string(),
                });
            }
        }

        let gateway_defaults = GatewayConfig::default();
        let port: u16 = parse_or(&lookup, "PORT", 6001)?;
        let jwt_secret = match lookup("JWT_SECRET") {
            Some(secret) if !secret.is_empty() => secret,
            _ => {
                log::warn!("JWT_SECRET is not set, using an insecure default");
                gateway_defaults.jwt_secret.clone()
            }
        };
        let gateway = GatewayConfig {
            bind_addr: format!("0.0.0.0:{port}"),
            assets_dir: lookup("ASSETS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| gateway_defaults.assets_dir.clone()),
            jwt_secret,
            ..gateway_defaults
        };

        Ok(Self {
            relay,
            gateway,
            user_seed: lookup("USER_SEED")
                .filter(|path| !path.is_empty())
                .map(PathBuf::from),
        })
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(var) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::InvalidValue {
            var: var.to_string(),
            value,
        }),
    }
}
