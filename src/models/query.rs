// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 Aleksandr Ptakhin

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Maximum accepted length (in characters) of the reference and serial inputs.
pub const MAX_FIELD_LEN: usize = 40;

/// Request body accepted by the proxy endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FirearmStatusRequest {
    /// Application reference number
    pub fsref: String,
    /// Optional firearm serial number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fserial: Option<String>,
}

/// Why a lookup was refused before contacting upstream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryValidationError {
    #[error("reference number is required")]
    MissingReference,
    #[error("reference number is {0} characters, maximum is {MAX_FIELD_LEN}")]
    ReferenceTooLong(usize),
    #[error("serial number is {0} characters, maximum is {MAX_FIELD_LEN}")]
    SerialTooLong(usize),
}

/// A validated, trimmed lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub reference: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,
}

impl Query {
    /// Validate raw user input and normalise it.
    ///
    /// Lengths are checked on the raw input; the stored values are trimmed and a
    /// blank serial becomes `None`.
    pub fn new(reference: &str, serial: Option<&str>) -> Result<Self, QueryValidationError> {
        if reference.trim().is_empty() {
            return Err(QueryValidationError::MissingReference);
        }
        let reference_len = reference.chars().count();
        if reference_len > MAX_FIELD_LEN {
            return Err(QueryValidationError::ReferenceTooLong(reference_len));
        }
        if let Some(serial) = serial {
            let serial_len = serial.chars().count();
            if serial_len > MAX_FIELD_LEN {
                return Err(QueryValidationError::SerialTooLong(serial_len));
            }
        }

        let serial = serial
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Ok(Self {
            reference: reference.trim().to_string(),
            serial,
        })
    }

    /// Key used by the local result cache: `reference:serial`.
    pub fn cache_key(&self) -> String {
        format!("{}:{}", self.reference, self.serial.as_deref().unwrap_or(""))
    }
}

impl TryFrom<&FirearmStatusRequest> for Query {
    type Error = QueryValidationError;

    fn try_from(request: &FirearmStatusRequest) -> Result<Self, Self::Error> {
        Query::new(&request.fsref, request.fserial.as_deref())
    }
}

/// Echo of the submitted lookup in a proxy response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QueryEcho {
    pub fsref: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fserial: Option<String>,
}

impl From<&Query> for QueryEcho {
    fn from(query: &Query) -> Self {
        Self {
            fsref: query.reference.clone(),
            fserial: query.serial.clone(),
        }
    }
}

/// Successful proxy response: the raw upstream page and when it was fetched.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FirearmStatusResponse {
    pub html: String,
    /// ISO-8601 fetch timestamp
    pub fetched_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<QueryEcho>,
}

/// Error body returned by every failing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_trims_inputs() {
        let query = Query::new("  REF1 ", Some(" SER1 ")).unwrap();
        assert_eq!(query.reference, "REF1");
        assert_eq!(query.serial.as_deref(), Some("SER1"));
    }

    #[test]
    fn test_blank_serial_becomes_none() {
        let query = Query::new("REF1", Some("   ")).unwrap();
        assert_eq!(query.serial, None);
    }

    #[test]
    fn test_blank_reference_rejected() {
        assert_eq!(
            Query::new("   ", None),
            Err(QueryValidationError::MissingReference)
        );
        assert_eq!(Query::new("", None), Err(QueryValidationError::MissingReference));
    }

    #[test]
    fn test_reference_length_boundary() {
        let ok = "A".repeat(MAX_FIELD_LEN);
        assert!(Query::new(&ok, None).is_ok());

        let too_long = "A".repeat(MAX_FIELD_LEN + 1);
        assert_eq!(
            Query::new(&too_long, None),
            Err(QueryValidationError::ReferenceTooLong(41))
        );
    }

    #[test]
    fn test_serial_length_boundary() {
        let ok = "S".repeat(MAX_FIELD_LEN);
        assert!(Query::new("REF1", Some(&ok)).is_ok());

        let too_long = "S".repeat(MAX_FIELD_LEN + 1);
        assert_eq!(
            Query::new("REF1", Some(&too_long)),
            Err(QueryValidationError::SerialTooLong(41))
        );
    }

    #[test]
    fn test_length_counts_characters_not_bytes() {
        let accented = "é".repeat(MAX_FIELD_LEN);
        assert!(Query::new(&accented, None).is_ok());
    }

    #[test]
    fn test_cache_key_format() {
        assert_eq!(Query::new("REF1", None).unwrap().cache_key(), "REF1:");
        assert_eq!(
            Query::new("REF1", Some("SER1")).unwrap().cache_key(),
            "REF1:SER1"
        );
    }

    #[test]
    fn test_request_deserializes_without_serial() {
        let request: FirearmStatusRequest = serde_json::from_str(r#"{"fsref":"REF1"}"#).unwrap();
        assert_eq!(request.fsref, "REF1");
        assert!(request.fserial.is_none());
    }

    #[test]
    fn test_request_field_names_are_case_sensitive() {
        let result: Result<FirearmStatusRequest, _> = serde_json::from_str(r#"{"FSREF":"REF1"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_response_uses_fetched_at_camel_case() {
        let response = FirearmStatusResponse {
            html: "<p></p>".to_string(),
            fetched_at: "2026-01-01T00:00:00.000Z".to_string(),
            query: None,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["fetchedAt"], "2026-01-01T00:00:00.000Z");
        assert!(json.get("query").is_none());
    }
}
