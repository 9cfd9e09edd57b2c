//! Web page fetching as a document source.
//!
//! Pages are fetched over plain HTTP (no JavaScript rendering), restricted to
//! a [`DomainAllowlist`], and reduced to readable text with [`extract_text`].
//! A [`ScrapeResult`] can be turned into a [`Document`] and ingested like any
//! loaded file.

mod allowlist;
mod extract;

pub use allowlist::DomainAllowlist;
pub use extract::extract_text;

use crate::config::WebConfig;
use crate::rag::Document;
use reqwest::redirect::Policy;
use reqwest::Url;
use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum WebError {
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Domain not allowed: {domain}")]
    DomainNotAllowed { domain: String },

    #[error("HTTP request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
}

impl WebError {
    /// True for errors caused by the requested URL itself or by a redirect
    /// leaving the allowed domains.
    pub fn is_configuration(&self) -> bool {
        matches!(self, WebError::InvalidUrl { .. } | WebError::DomainNotAllowed { .. })
    }
}

pub type Result<T> = std::result::Result<T, WebError>;

const MAX_REDIRECTS: usize = 10;

/// Raised inside the redirect policy when the next hop is not allowed.
#[derive(Debug)]
struct RedirectBlocked {
    host: String,
}

impl fmt::Display for RedirectBlocked {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "redirect to disallowed host '{}'", self.host)
    }
}

impl StdError for RedirectBlocked {}

/// Follows at most [`MAX_REDIRECTS`] hops, each to a permitted host.
fn redirect_policy(allowlist: DomainAllowlist) -> Policy {
    Policy::custom(move |attempt| {
        if attempt.previous().len() > MAX_REDIRECTS {
            return attempt.error("too many redirects");
        }
        let host = attempt.url().host_str().unwrap_or_default().to_ascii_lowercase();
        if allowlist.permits(&host) {
            attempt.follow()
        } else {
            attempt.error(RedirectBlocked { host })
        }
    })
}

impl From<reqwest::Error> for WebError {
    fn from(err: reqwest::Error) -> Self {
        let mut source = err.source();
        while let Some(cause) = source {
            if let Some(blocked) = cause.downcast_ref::<RedirectBlocked>() {
                return WebError::DomainNotAllowed {
                    domain: blocked.host.clone(),
                };
            }
            source = cause.source();
        }
        WebError::Request(err)
    }
}

/// A fetched page and its extracted text.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapeResult {
    /// URL as requested
    pub url: String,
    /// URL after redirects
    pub final_url: String,
    pub html: String,
    pub text: String,
}

impl ScrapeResult {
    /// Converts the page into a document whose `source` is the final URL.
    pub fn into_document(self) -> Document {
        Document::new(&self.final_url, self.text)
            .with_metadata("source", self.final_url)
            .with_metadata("url", self.url)
    }
}

/// Fetches pages from permitted domains.
#[derive(Debug, Clone)]
pub struct WebScraper {
    client: reqwest::Client,
    allowlist: DomainAllowlist,
}

impl WebScraper {
    /// Creates a scraper with the configured timeout, user agent and allowlist.
    ///
    /// Redirects are checked against the allowlist before they are followed.
    pub fn new(config: &WebConfig) -> Result<Self> {
        let allowlist = DomainAllowlist::new(&config.allowed_domains);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.as_str())
            .redirect(redirect_policy(allowlist.clone()))
            .build()?;

        Ok(Self { client, allowlist })
    }

    pub fn allowlist(&self) -> &DomainAllowlist {
        &self.allowlist
    }

    /// Validates `url` against the allowlist without touching the network.
    pub fn check_url(&self, url: &str) -> Result<Url> {
        let parsed = Url::parse(url).map_err(|e| WebError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(WebError::InvalidUrl {
                url: url.to_string(),
                reason: format!("unsupported scheme '{}'", parsed.scheme()),
            });
        }

        let host = parsed.host_str().ok_or_else(|| WebError::InvalidUrl {
            url: url.to_string(),
            reason: "missing host".to_string(),
        })?;
        self.allowlist.check(host)?;

        Ok(parsed)
    }

    /// Fetches `url` and extracts its readable text.
    ///
    /// # Errors
    ///
    /// - [`WebError::InvalidUrl`] or [`WebError::DomainNotAllowed`] before any request
    /// - [`WebError::DomainNotAllowed`] if a redirect points outside the allowed
    ///   domains, before that host is contacted
    /// - [`WebError::Request`] on connection failures and timeouts
    /// - [`WebError::Status`] for non-success HTTP statuses
    pub async fn scrape(&self, url: &str) -> Result<ScrapeResult> {
        let parsed = self.check_url(url)?;

        debug!(url = %parsed, "Fetching page");
        let response = self.client.get(parsed).send().await?;

        let final_url = response.url().clone();
        let status = response.status();
        if !status.is_success() {
            return Err(WebError::Status {
                url: final_url.to_string(),
                status: status.as_u16(),
            });
        }

        let html = response.text().await?;
        let text = extract_text(&html);
        info!(
            url = %final_url,
            html_bytes = html.len(),
            text_chars = text.chars().count(),
            "Fetched page"
        );

        Ok(ScrapeResult {
            url: url.to_string(),
            final_url: final_url.to_string(),
            html,
            text,
        })
    }
}
