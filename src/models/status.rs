// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 Aleksandr Ptakhin

use crate::models::record::FirearmRecord;
use serde::{Deserialize, Serialize};

/// Stable machine-readable reason for a failed lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureCode {
    InvalidInput,
    UpstreamOffline,
    InvalidReference,
    InvalidReferenceAndSerial,
    #[serde(rename = "PARSE_ERROR")]
    FormatChanged,
}

impl std::fmt::Display for FailureCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureCode::InvalidInput => write!(f, "INVALID_INPUT"),
            FailureCode::UpstreamOffline => write!(f, "UPSTREAM_OFFLINE"),
            FailureCode::InvalidReference => write!(f, "INVALID_REFERENCE"),
            FailureCode::InvalidReferenceAndSerial => write!(f, "INVALID_REFERENCE_AND_SERIAL"),
            FailureCode::FormatChanged => write!(f, "PARSE_ERROR"),
        }
    }
}

/// User-facing failure: a code plus a message safe to show as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusFailure {
    pub code: FailureCode,
    pub message: String,
}

impl StatusFailure {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self {
            code: FailureCode::InvalidInput,
            message: message.into(),
        }
    }

    pub fn upstream_offline() -> Self {
        Self {
            code: FailureCode::UpstreamOffline,
            message: "SAPS servers appear to be offline or not responding. Please try again later."
                .to_string(),
        }
    }

    pub fn invalid_reference(reference: &str) -> Self {
        Self {
            code: FailureCode::InvalidReference,
            message: format!("No records found for Reference Number {reference}"),
        }
    }

    pub fn invalid_reference_and_serial(reference: &str, serial: &str) -> Self {
        Self {
            code: FailureCode::InvalidReferenceAndSerial,
            message: format!(
                "No records found for Reference Number {reference} and Serial Number {serial}"
            ),
        }
    }

    pub fn format_changed() -> Self {
        Self {
            code: FailureCode::FormatChanged,
            message: "Failed to parse results. The SAPS website may have changed format."
                .to_string(),
        }
    }
}

/// What the user sees after submitting a lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum StatusOutcome {
    Found {
        records: Vec<FirearmRecord>,
        fetched_at: String,
        /// Served from the local cache without contacting the proxy
        cached: bool,
    },
    Failed(StatusFailure),
}

impl StatusOutcome {
    pub fn failure(&self) -> Option<&StatusFailure> {
        match self {
            StatusOutcome::Failed(failure) => Some(failure),
            StatusOutcome::Found { .. } => None,
        }
    }
}
