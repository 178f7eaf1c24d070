//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate bind addresses and value ranges
//! - Detect listeners that would collide on one address
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashMap;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ServerConfig;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field}: invalid socket address {value:?}")]
    InvalidAddress { field: &'static str, value: String },
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("accept.min_sleep_ms ({min}) exceeds accept.max_sleep_ms ({max})")]
    BackoffRange { min: u64, max: u64 },
    #[error("pipe.name must not be empty")]
    EmptyPipeName,
    #[error("lame_duck.grace_period_ms must not exceed lame_duck.duration_ms")]
    LameDuckWindow,
    #[error("{first} and {second} share address {address}")]
    DuplicateAddress {
        first: &'static str,
        second: &'static str,
        address: String,
    },
}

/// Check `config` for semantic errors.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let mut bound: Vec<(&'static str, &str)> =
        vec![("listener.bind_address", config.listener.bind_address.as_str())];
    let cluster = [
        ("cluster.routes", &config.cluster.routes),
        ("cluster.gateways", &config.cluster.gateways),
        ("cluster.leafnodes", &config.cluster.leafnodes),
    ];
    for (field, address) in cluster {
        if let Some(address) = address {
            bound.push((field, address.as_str()));
        }
    }

    let mut seen: HashMap<SocketAddr, &'static str> = HashMap::new();
    for (field, value) in bound {
        match value.parse::<SocketAddr>() {
            // Port 0 asks the OS for a fresh port each time.
            Ok(addr) if addr.port() == 0 => {}
            Ok(addr) => {
                if let Some(first) = seen.insert(addr, field) {
                    errors.push(ValidationError::DuplicateAddress {
                        first,
                        second: field,
                        address: addr.to_string(),
                    });
                }
            }
            Err(_) => errors.push(ValidationError::InvalidAddress {
                field,
                value: value.to_string(),
            }),
        }
    }

    if config.listener.max_connections == 0 {
        errors.push(ValidationError::Zero("listener.max_connections"));
    }

    if config.pipe.enabled {
        if config.pipe.name.trim().is_empty() {
            errors.push(ValidationError::EmptyPipeName);
        }
        if config.pipe.max_accept_queue == 0 {
            errors.push(ValidationError::Zero("pipe.max_accept_queue"));
        }
        if config.pipe.max_pipe_buffer == 0 {
            errors.push(ValidationError::Zero("pipe.max_pipe_buffer"));
        }
    }

    if config.accept.min_sleep_ms == 0 {
        errors.push(ValidationError::Zero("accept.min_sleep_ms"));
    }
    if config.accept.min_sleep_ms > config.accept.max_sleep_ms {
        errors.push(ValidationError::BackoffRange {
            min: config.accept.min_sleep_ms,
            max: config.accept.max_sleep_ms,
        });
    }

    if config.lame_duck.grace_period_ms > config.lame_duck.duration_ms {
        errors.push(ValidationError::LameDuckWindow);
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
