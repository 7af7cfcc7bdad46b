// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 Aleksandr Ptakhin

//! Lookup orchestration on the client side of the proxy: validate, consult the
//! local cache, call the proxy, parse, and classify the result for the user.

use crate::models::query::{FirearmStatusRequest, FirearmStatusResponse, Query, QueryValidationError};
use crate::models::record::{NoRecordsScope, ParseOutcome};
use crate::models::status::{StatusFailure, StatusOutcome};
use crate::services::cache::QueryCache;
use crate::services::logging::mask_reference;
use crate::services::parser::parse_status_html;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

/// Path of the proxy endpoint relative to the API base URL.
pub const STATUS_ENDPOINT_PATH: &str = "api/firearm-status";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid API base URL: {0}")]
    InvalidBaseUrl(#[from] url::ParseError),
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Talks to the proxy and turns its answers into [`StatusOutcome`]s.
pub struct StatusClient {
    http: reqwest::Client,
    endpoint: Url,
}

impl StatusClient {
    pub fn new(api_base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let mut base = Url::parse(api_base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let endpoint = base.join(STATUS_ENDPOINT_PATH)?;
        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self { http, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Run one lookup end to end.
    ///
    /// Never fails: every problem becomes a [`StatusOutcome::Failed`] with a
    /// message fit for display.
    pub async fn query(
        &self,
        reference: &str,
        serial: Option<&str>,
        cache: &mut QueryCache,
    ) -> StatusOutcome {
        let query = match Query::new(reference, serial) {
            Ok(query) => query,
            Err(e) => {
                warn!(error = %e, "Lookup rejected before sending");
                return StatusOutcome::Failed(invalid_input_failure(&e));
            }
        };

        cache.set_last_query(&query);

        if let Some(entry) = cache.get(&query) {
            debug!(reference = %mask_reference(&query.reference), "Serving lookup from cache");
            return StatusOutcome::Found {
                records: entry.records.clone(),
                fetched_at: entry.fetched_at.clone(),
                cached: true,
            };
        }

        let response = match self.fetch(&query).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Proxy request failed");
                return StatusOutcome::Failed(StatusFailure::upstream_offline());
            }
        };

        let outcome = classify(parse_status_html(&response.html), response.fetched_at);
        if let StatusOutcome::Found { records, fetched_at, .. } = &outcome {
            info!(
                reference = %mask_reference(&query.reference),
                record_count = records.len(),
                "Lookup successful"
            );
            cache.put(&query, records.clone(), fetched_at.clone());
        }
        outcome
    }

    async fn fetch(&self, query: &Query) -> Result<FirearmStatusResponse, reqwest::Error> {
        let request = FirearmStatusRequest {
            fsref: query.reference.clone(),
            fserial: query.serial.clone(),
        };

        self.http
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json::<FirearmStatusResponse>()
            .await
    }
}

/// Map a parsed page to what the user should see.
pub fn classify(outcome: ParseOutcome, fetched_at: String) -> StatusOutcome {
    match outcome {
        ParseOutcome::Records { records } => StatusOutcome::Found {
            records,
            fetched_at,
            cached: false,
        },
        ParseOutcome::NoRecords {
            scope: NoRecordsScope::RefOnly,
            reference,
            ..
        } => StatusOutcome::Failed(StatusFailure::invalid_reference(&reference)),
        ParseOutcome::NoRecords {
            scope: NoRecordsScope::RefAndSerial,
            reference,
            serial,
        } => StatusOutcome::Failed(StatusFailure::invalid_reference_and_serial(
            &reference,
            serial.as_deref().unwrap_or(""),
        )),
        ParseOutcome::Empty => {
            warn!("Status page had no results table and no no-records message");
            StatusOutcome::Failed(StatusFailure::format_changed())
        }
    }
}

fn invalid_input_failure(error: &QueryValidationError) -> StatusFailure {
    let message = match error {
        QueryValidationError::MissingReference => "Reference Number is required",
        QueryValidationError::ReferenceTooLong(_) => "Reference Number exceeds maximum length",
        QueryValidationError::SerialTooLong(_) => "Serial Number exceeds maximum length",
    };
    StatusFailure::invalid_input(message)
}
