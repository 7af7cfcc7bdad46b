// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 Aleksandr Ptakhin

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Number of cells a results row must carry to become a record.
pub const RECORD_CELL_COUNT: usize = 9;

/// One row of the upstream status table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FirearmRecord {
    pub application_type: String,
    pub application_number: String,
    pub calibre: String,
    pub make: String,
    pub serial_number: String,
    pub status_date: String,
    pub status: String,
    pub status_description: String,
    pub next_step: String,
}

impl FirearmRecord {
    /// Build a record from positional cell text.
    /// Returns `None` when the row is too short to be a results row.
    pub fn from_cells(cells: &[String]) -> Option<Self> {
        if cells.len() < RECORD_CELL_COUNT {
            return None;
        }
        let cell = |i: usize| cells.get(i).cloned().unwrap_or_default();
        Some(Self {
            application_type: cell(0),
            application_number: cell(1),
            calibre: cell(2),
            make: cell(3),
            serial_number: cell(4),
            status_date: cell(5),
            status: cell(6),
            status_description: cell(7),
            next_step: cell(8),
        })
    }
}

/// Which inputs the upstream "no records" message referred to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NoRecordsScope {
    RefOnly,
    RefAndSerial,
}

/// Result of reading an upstream status page.
///
/// `NoRecords` is a legitimate negative answer from upstream, while `Empty`
/// means the page had neither the message nor a usable results table, which
/// usually signals that the page layout changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParseOutcome {
    Records {
        records: Vec<FirearmRecord>,
    },
    NoRecords {
        scope: NoRecordsScope,
        reference: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        serial: Option<String>,
    },
    Empty,
}
