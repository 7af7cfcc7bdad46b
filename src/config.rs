// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 Aleksandr Ptakhin

//! Process configuration, read once from the environment at startup.

use crate::services::logging::LogFormat;
use crate::services::rate_limit::{RateLimitConfig, RateLimitConfigError};
use crate::services::upstream::{UpstreamConfig, UpstreamConfigError};
use axum::http::HeaderName;
use std::env;
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_CLIENT_IP_HEADER: &str = "x-forwarded-for";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("PORT must be a valid port number, got '{0}'")]
    InvalidPort(String),
    #[error("CLIENT_IP_HEADER is not a valid header name: '{0}'")]
    InvalidClientIpHeader(String),
    #[error(transparent)]
    Upstream(#[from] UpstreamConfigError),
    #[error(transparent)]
    RateLimit(#[from] RateLimitConfigError),
}

/// CORS origin policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedOrigin {
    Any,
    Exact(String),
}

impl AllowedOrigin {
    fn parse(value: &str) -> Self {
        match value.trim() {
            "" | "*" => AllowedOrigin::Any,
            origin => AllowedOrigin::Exact(origin.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub allowed_origin: AllowedOrigin,
    /// Trusted header carrying the original client address
    pub client_ip_header: HeaderName,
    pub log_format: LogFormat,
    pub upstream: UpstreamConfig,
    pub rate_limit: RateLimitConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = match env::var("PORT") {
            Ok(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidPort(raw))?,
            Err(_) => DEFAULT_PORT,
        };

        let allowed_origin = AllowedOrigin::parse(&env::var("ALLOWED_ORIGIN").unwrap_or_default());

        let client_ip_header = parse_client_ip_header(
            &env::var("CLIENT_IP_HEADER").unwrap_or_else(|_| DEFAULT_CLIENT_IP_HEADER.to_string()),
        )?;

        Ok(Self {
            port,
            allowed_origin,
            client_ip_header,
            log_format: LogFormat::from_env(),
            upstream: UpstreamConfig::from_env()?,
            rate_limit: RateLimitConfig::from_env()?,
        })
    }
}

fn parse_client_ip_header(raw: &str) -> Result<HeaderName, ConfigError> {
    HeaderName::from_bytes(raw.trim().to_ascii_lowercase().as_bytes())
        .map_err(|_| ConfigError::InvalidClientIpHeader(raw.to_string()))
}
