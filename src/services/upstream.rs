// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 Aleksandr Ptakhin

//! Client for the upstream firearm status enquiry form.

use crate::models::query::Query;
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, CONTENT_TYPE,
    COOKIE, ORIGIN, REFERER, UPGRADE_INSECURE_REQUESTS, USER_AGENT,
};
use std::env;
use std::time::Duration;
use thiserror::Error;
use url::{form_urlencoded, Url};

/// Public enquiry form scraped by default.
pub const DEFAULT_UPSTREAM_URL: &str =
    "https://www.saps.gov.za/services/firearm_status_enquiry.php";

const DEFAULT_TIMEOUT_MS: u64 = 15_000;

const BROWSER_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7";
const BROWSER_ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 18_5 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.5 Mobile/15E148 Safari/604.1";

#[derive(Debug, Error)]
pub enum UpstreamConfigError {
    #[error("UPSTREAM_URL is not a valid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("CSRF_TOKEN environment variable must be set")]
    MissingCsrfToken,
    #[error("UPSTREAM_TIMEOUT_MS must be a positive integer, got '{0}'")]
    InvalidTimeout(String),
    #[error("CSRF token contains characters not allowed in a header")]
    InvalidToken,
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Why an upstream lookup produced no page.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("upstream request timed out after {0:?}")]
    Timeout(Duration),
    #[error("upstream request failed: {0}")]
    Network(#[source] reqwest::Error),
    #[error("upstream returned HTTP {0}")]
    Status(u16),
}

/// Where and how to reach the upstream form.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub url: Url,
    /// Replayed in the form body and the session cookie
    pub csrf_token: String,
    pub timeout: Duration,
}

impl UpstreamConfig {
    /// Load from `UPSTREAM_URL`, `CSRF_TOKEN` and `UPSTREAM_TIMEOUT_MS`.
    pub fn from_env() -> Result<Self, UpstreamConfigError> {
        let url = env::var("UPSTREAM_URL").unwrap_or_else(|_| DEFAULT_UPSTREAM_URL.to_string());
        let csrf_token = env::var("CSRF_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or(UpstreamConfigError::MissingCsrfToken)?;
        let timeout = match env::var("UPSTREAM_TIMEOUT_MS") {
            Ok(raw) => parse_timeout(&raw)?,
            Err(_) => Duration::from_millis(DEFAULT_TIMEOUT_MS),
        };

        Ok(Self {
            url: Url::parse(&url)?,
            csrf_token: csrf_token.trim().to_string(),
            timeout,
        })
    }
}

fn parse_timeout(raw: &str) -> Result<Duration, UpstreamConfigError> {
    match raw.trim().parse::<u64>() {
        Ok(ms) if ms > 0 => Ok(Duration::from_millis(ms)),
        _ => Err(UpstreamConfigError::InvalidTimeout(raw.to_string())),
    }
}

/// HTTP client for the upstream form, built once and shared across requests.
pub struct UpstreamClient {
    client: reqwest::Client,
    config: UpstreamConfig,
    headers: HeaderMap,
}

impl UpstreamClient {
    pub fn new(config: UpstreamConfig) -> Result<Self, UpstreamConfigError> {
        // The timeout covers connect, headers and body; on expiry reqwest drops
        // the in-flight connection.
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        let headers = browser_headers(&config)?;

        Ok(Self {
            client,
            config,
            headers,
        })
    }

    pub fn config(&self) -> &UpstreamConfig {
        &self.config
    }

    /// Submit the enquiry form and return the page HTML.
    pub async fn fetch_status(&self, query: &Query) -> Result<String, UpstreamError> {
        let body = encode_form(&self.config.csrf_token, query);

        let response = self
            .client
            .post(self.config.url.clone())
            .headers(self.headers.clone())
            .body(body)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Status(status.as_u16()));
        }

        response.text().await.map_err(|e| self.classify(e))
    }

    fn classify(&self, error: reqwest::Error) -> UpstreamError {
        if error.is_timeout() {
            UpstreamError::Timeout(self.config.timeout)
        } else {
            UpstreamError::Network(error)
        }
    }
}

/// Form body: `csrf_token`, trimmed `fsref`, and `fserial` (empty when absent).
fn encode_form(csrf_token: &str, query: &Query) -> String {
    form_urlencoded::Serializer::new(String::new())
        .append_pair("csrf_token", csrf_token)
        .append_pair("fsref", query.reference.trim())
        .append_pair("fserial", query.serial.as_deref().map(str::trim).unwrap_or(""))
        .finish()
}

/// Headers a mobile browser would send when submitting the form; upstream
/// rejects requests that look automated.
fn browser_headers(config: &UpstreamConfig) -> Result<HeaderMap, UpstreamConfigError> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static(BROWSER_ACCEPT));
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(BROWSER_ACCEPT_LANGUAGE));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("max-age=0"));
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/x-www-form-urlencoded"),
    );
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
    headers.insert(UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));
    headers.insert(
        HeaderName::from_static("sec-fetch-dest"),
        HeaderValue::from_static("document"),
    );
    headers.insert(
        HeaderName::from_static("sec-fetch-mode"),
        HeaderValue::from_static("navigate"),
    );
    headers.insert(
        HeaderName::from_static("sec-fetch-site"),
        HeaderValue::from_static("same-origin"),
    );
    headers.insert(
        HeaderName::from_static("sec-fetch-user"),
        HeaderValue::from_static("?1"),
    );

    let cookie = format!("csrf_token={}", config.csrf_token);
    headers.insert(
        COOKIE,
        HeaderValue::from_str(&cookie).map_err(|_| UpstreamConfigError::InvalidToken)?,
    );

    let origin = config.url.origin().ascii_serialization();
    if let Ok(value) = HeaderValue::from_str(&origin) {
        headers.insert(ORIGIN, value);
    }
    if let Ok(value) = HeaderValue::from_str(config.url.as_str()) {
        headers.insert(REFERER, value);
    }

    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> UpstreamConfig {
        UpstreamConfig {
            url: Url::parse(DEFAULT_UPSTREAM_URL).unwrap(),
            csrf_token: "tok123".to_string(),
            timeout: Duration::from_secs(15),
        }
    }

    #[test]
    fn test_encode_form_with_serial() {
        let query = Query::new("1234/2024", Some("SN 1")).unwrap();
        assert_eq!(
            encode_form("tok", &query),
            "csrf_token=tok&fsref=1234%2F2024&fserial=SN+1"
        );
    }

    #[test]
    fn test_encode_form_without_serial_sends_empty_field() {
        let query = Query::new("REF1", None).unwrap();
        assert_eq!(encode_form("tok", &query), "csrf_token=tok&fsref=REF1&fserial=");
    }

    #[test]
    fn test_browser_headers_carry_token_cookie() {
        let headers = browser_headers(&config()).unwrap();
        assert_eq!(headers.get(COOKIE).unwrap(), "csrf_token=tok123");
        assert_eq!(
            headers.get(CONTENT_TYPE).unwrap(),
            "application/x-www-form-urlencoded"
        );
        assert!(headers
            .get(USER_AGENT)
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("Mozilla/5.0"));
    }

    #[test]
    fn test_browser_headers_origin_and_referer_follow_url() {
        let headers = browser_headers(&config()).unwrap();
        assert_eq!(headers.get(ORIGIN).unwrap(), "https://www.saps.gov.za");
        assert_eq!(headers.get(REFERER).unwrap(), DEFAULT_UPSTREAM_URL);
    }

    #[test]
    fn test_token_with_newline_rejected() {
        let mut config = config();
        config.csrf_token = "bad\ntoken".to_string();
        assert!(matches!(
            browser_headers(&config),
            Err(UpstreamConfigError::InvalidToken)
        ));
    }

    #[test]
    fn test_parse_timeout() {
        assert_eq!(parse_timeout("2500").unwrap(), Duration::from_millis(2500));
        assert!(parse_timeout("0").is_err());
        assert!(parse_timeout("soon").is_err());
    }
}
