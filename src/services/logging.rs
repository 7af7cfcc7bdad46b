// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 Aleksandr Ptakhin

//! Logging setup and redaction helpers for user-supplied lookup values.

use std::env;
use tracing_subscriber::EnvFilter;

/// Number of leading reference characters kept in logs.
const REFERENCE_VISIBLE_CHARS: usize = 4;

/// Default filter when `RUST_LOG` is not set.
const DEFAULT_LOG_FILTER: &str = "firearm_status=info,tower_http=info";

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    /// Read `LOG_FORMAT`; anything other than `json` means pretty output.
    pub fn from_env() -> Self {
        Self::parse(&env::var("LOG_FORMAT").unwrap_or_default())
    }

    fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        }
    }
}

/// Install the global tracing subscriber. Safe to call more than once.
pub fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.try_init(),
    };

    if let Err(e) = result {
        eprintln!("Tracing subscriber already installed: {}", e);
    }
}

/// Mask a reference number for logging.
/// Shows the first four characters only: "ABCD…"
pub fn mask_reference(reference: &str) -> String {
    let trimmed = reference.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }
    let visible: String = trimmed.chars().take(REFERENCE_VISIBLE_CHARS).collect();
    format!("{}…", visible)
}

/// Describe a serial number for logging without revealing it.
pub fn describe_serial(serial: Option<&str>) -> String {
    match serial.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => format!("<{} chars>", s.chars().count()),
        None => "<none>".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_reference() {
        assert_eq!(mask_reference("ABCD1234/2024"), "ABCD…");
        assert_eq!(mask_reference("  XYZ98765 "), "XYZ9…");
    }

    #[test]
    fn test_mask_reference_short() {
        assert_eq!(mask_reference("AB"), "AB…");
    }

    #[test]
    fn test_mask_reference_empty() {
        assert_eq!(mask_reference("   "), "<empty>");
    }

    #[test]
    fn test_mask_reference_multibyte() {
        assert_eq!(mask_reference("ÀÉÎÕÜ"), "ÀÉÎÕ…");
    }

    #[test]
    fn test_describe_serial() {
        assert_eq!(describe_serial(Some("SN12345")), "<7 chars>");
        assert_eq!(describe_serial(Some("  ")), "<none>");
        assert_eq!(describe_serial(None), "<none>");
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::parse("pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::parse(""), LogFormat::Pretty);
    }
}
