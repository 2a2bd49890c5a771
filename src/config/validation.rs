//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (fee rate > 0, timeouts > 0, split sizes)
//! - Check wallet definitions (key variables named, exactly one default)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RelayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::RelayConfig;

/// One semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &RelayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new("server.bind_address", "not a socket address"));
    }
    if config.server.request_timeout_secs == 0 {
        errors.push(ValidationError::new("server.request_timeout_secs", "must be > 0"));
    }

    if url::Url::parse(&config.chain.base_url).is_err() {
        errors.push(ValidationError::new("chain.base_url", "not a valid URL"));
    }
    for (i, u) in config.chain.failover_urls.iter().enumerate() {
        if url::Url::parse(u).is_err() {
            errors.push(ValidationError::new(
                format!("chain.failover_urls[{}]", i),
                "not a valid URL",
            ));
        }
    }
    if config.chain.timeout_secs == 0 {
        errors.push(ValidationError::new("chain.timeout_secs", "must be > 0"));
    }

    if url::Url::parse(&config.builder.url_prefix).is_err() {
        errors.push(ValidationError::new("builder.url_prefix", "not a valid URL"));
    }
    if config.builder.timeout_secs == 0 {
        errors.push(ValidationError::new("builder.timeout_secs", "must be > 0"));
    }

    if !(config.fees.fee_rate.is_finite() && config.fees.fee_rate > 0.0) {
        errors.push(ValidationError::new("fees.fee_rate", "must be a positive number"));
    }
    if config.fees.genesis_budget == 0 {
        errors.push(ValidationError::new("fees.genesis_budget", "must be > 0"));
    }

    if config.pool.max_split_outputs == 0 {
        errors.push(ValidationError::new("pool.max_split_outputs", "must be > 0"));
    }
    if config.pool.max_selection_attempts == 0 {
        errors.push(ValidationError::new("pool.max_selection_attempts", "must be > 0"));
    }

    if config.wallets.is_empty() {
        errors.push(ValidationError::new("wallets", "at least one fee wallet is required"));
    }
    let mut seen = HashSet::new();
    for (i, wallet) in config.wallets.iter().enumerate() {
        if wallet.key_env.trim().is_empty() {
            errors.push(ValidationError::new(format!("wallets[{}].key_env", i), "must not be empty"));
        } else if !seen.insert(wallet.key_env.as_str()) {
            errors.push(ValidationError::new(
                format!("wallets[{}].key_env", i),
                format!("'{}' is used by more than one wallet", wallet.key_env),
            ));
        }
        if wallet.unit_satoshis <= config.pool.dust_satoshis {
            errors.push(ValidationError::new(
                format!("wallets[{}].unit_satoshis", i),
                "must exceed pool.dust_satoshis",
            ));
        }
    }
    if config.wallets.iter().filter(|w| w.default).count() > 1 {
        errors.push(ValidationError::new("wallets", "more than one wallet marked default"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "not a socket address",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
