// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 Aleksandr Ptakhin

//! Extraction of status records from the upstream enquiry page.
//!
//! The upstream page is scraped, not an API, so every step here is tolerant:
//! missing pieces degrade to [`ParseOutcome::Empty`] instead of errors.

use crate::models::record::{FirearmRecord, NoRecordsScope, ParseOutcome};
use regex::Regex;
use scraper::{Html, Selector};
use std::sync::LazyLock;

/// Class tokens that identify the results table, in any order.
const RESULTS_TABLE_CLASSES: [&str; 4] = ["table", "table-bordered", "table-hover", "table-striped"];

static NO_RECORDS_REF_AND_SERIAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)no\s+records\s+to\s+retrieve\s+for\s+your\s+selected\s+reference\s+number\s*\(([^)]*)\)\s*and\s+serial\s+number\s*\(([^)]*)\)",
    )
    .expect("ref+serial pattern is valid")
});

static NO_RECORDS_REF_ONLY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)no\s+records\s+to\s+retrieve\s+for\s+your\s+selected\s+reference\s+number\s*\(([^)]*)\)",
    )
    .expect("ref-only pattern is valid")
});

static MARKUP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("markup pattern is valid"));

static TABLE_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<table(?:\s[^>]*)?>").expect("table pattern is valid"));

static TABLE_CLOSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</table\s*>").expect("table close pattern is valid"));

static ROW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<tr(?:\s[^>]*)?>(.*?)</tr\s*>").expect("row pattern is valid")
});

static CELL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<t[dh](?:\s[^>]*)?>(.*?)</t[dh]\s*>").expect("cell pattern is valid")
});

static BASIC_ENTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)&(nbsp|lt|gt|amp);").expect("entity pattern is valid"));

/// Parse an upstream status page.
///
/// Priority: an explicit "no records" message wins over whatever table the page
/// also renders, then the results table, then `Empty`.
pub fn parse_status_html(html: &str) -> ParseOutcome {
    if html.trim().is_empty() {
        return ParseOutcome::Empty;
    }

    if let Some(outcome) = detect_no_records(html) {
        return outcome;
    }

    let records = extract_records(html);
    if records.is_empty() {
        ParseOutcome::Empty
    } else {
        ParseOutcome::Records { records }
    }
}

/// Look for upstream's "No records to retrieve ..." message.
fn detect_no_records(html: &str) -> Option<ParseOutcome> {
    if let Some(caps) = NO_RECORDS_REF_AND_SERIAL.captures(html) {
        return Some(ParseOutcome::NoRecords {
            scope: NoRecordsScope::RefAndSerial,
            reference: caps[1].trim().to_string(),
            serial: Some(caps[2].trim().to_string()),
        });
    }

    NO_RECORDS_REF_ONLY
        .captures(html)
        .map(|caps| ParseOutcome::NoRecords {
            scope: NoRecordsScope::RefOnly,
            reference: caps[1].trim().to_string(),
            serial: None,
        })
}

/// Pull records out of the results table, skipping its header row.
/// Rows with fewer than nine cells are dropped.
///
/// Rows and cells are cut from the raw page source so that cell text keeps
/// every entity except the four decoded in [`clean_cell`].
fn extract_records(html: &str) -> Vec<FirearmRecord> {
    let Some(table) = results_table_source(html) else {
        return Vec::new();
    };

    ROW.captures_iter(table)
        .skip(1)
        .filter_map(|row| FirearmRecord::from_cells(&row_cells(&row[1])))
        .collect()
}

/// Source between the results table's opening tag and the next `</table>`.
fn results_table_source(html: &str) -> Option<&str> {
    let open = TABLE_TAG
        .find_iter(html)
        .find(|tag| is_results_table(tag.as_str()))?;
    let rest = &html[open.end()..];
    let end = TABLE_CLOSE.find(rest).map_or(rest.len(), |close| close.start());
    Some(&rest[..end])
}

/// Reads the class list of a `<table ...>` opening tag.
fn is_results_table(open_tag: &str) -> bool {
    let Ok(selector) = Selector::parse("table") else {
        return false;
    };
    let fragment = Html::parse_fragment(&format!("{open_tag}</table>"));

    fragment.select(&selector).next().is_some_and(|table| {
        let classes: Vec<&str> = table.value().classes().collect();
        RESULTS_TABLE_CLASSES
            .iter()
            .all(|required| classes.contains(required))
    })
}

/// Cleaned text of each `td`/`th` cell in a row's source, in order.
fn row_cells(row: &str) -> Vec<String> {
    CELL.captures_iter(row)
        .map(|cell| clean_cell(&cell[1]))
        .collect()
}

/// Strip nested markup, decode `&nbsp; &lt; &gt; &amp;` and trim.
fn clean_cell(markup: &str) -> String {
    let text = MARKUP.replace_all(markup, "");
    unescape_basic_entities(&text).trim().to_string()
}

/// Decodes only the four entities the results table uses, in a single pass so
/// `&amp;lt;` stays a literal `&lt;`. Everything else is left as written.
fn unescape_basic_entities(text: &str) -> String {
    BASIC_ENTITY
        .replace_all(text, |caps: &regex::Captures| {
            match caps[1].to_ascii_lowercase().as_str() {
                "nbsp" => " ",
                "lt" => "<",
                "gt" => ">",
                _ => "&",
            }
        })
        .into_owned()
}
