// src/fetch/mod.rs

pub mod raw;
pub mod source;

use chrono::NaiveDate;
use encoding_rs::Encoding;
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, CACHE_CONTROL, IF_MODIFIED_SINCE, PRAGMA},
    Client,
};
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::config::{Endpoints, FetchConfig};

pub use raw::{parse_records, RawRecord, TpexRow, TwseRow};
pub use source::{PayloadKind, Source};

/// Why a source produced no data. Callers treat every variant as an empty
/// dataset and carry on.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{feed}: HTTP {status} from {url}")]
    Status { feed: Source, url: String, status: u16 },

    #[error("{feed}: request failed: {error}")]
    Transport {
        feed: Source,
        #[source]
        error: reqwest::Error,
    },

    #[error("{feed}: malformed body: {reason}")]
    Malformed { feed: Source, reason: String },

    #[error("{feed}: element {index} is missing required key `{key}`")]
    MissingField {
        feed: Source,
        index: usize,
        key: &'static str,
    },

    #[error("{feed}: invalid endpoint `{url}`: {error}")]
    Endpoint {
        feed: Source,
        url: String,
        #[source]
        error: url::ParseError,
    },

    #[error("{feed}: unknown text encoding `{label}`")]
    Encoding { feed: Source, label: String },

    #[error("building HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

/// What a source returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawPayload {
    /// Validated OpenAPI records.
    Records(Vec<RawRecord>),
    /// A decoded CSV download and the encoding it was declared in.
    Text { text: String, encoding: &'static str },
}

impl RawPayload {
    pub fn len(&self) -> usize {
        match self {
            RawPayload::Records(r) => r.len(),
            RawPayload::Text { text, .. } => text.lines().count(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Single-request HTTP fetcher for the exchange feeds.
pub struct Fetcher {
    client: Client,
    endpoints: Endpoints,
    max_retries: u32,
    retry_delay: Duration,
}

fn cache_busting_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        IF_MODIFIED_SINCE,
        HeaderValue::from_static("Mon, 26 Jul 1997 05:00:00 GMT"),
    );
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
    headers
}

impl Fetcher {
    pub fn new(config: &FetchConfig, endpoints: Endpoints) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.as_str())
            .default_headers(cache_busting_headers())
            .build()
            .map_err(FetchError::Client)?;
        Ok(Self {
            client,
            endpoints,
            max_retries: config.max_retries,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        })
    }

    /// Fetch one source for `date`. JSON feeds are validated into typed
    /// records; CSV feeds are decoded with their declared encoding.
    #[instrument(level = "info", skip(self), fields(feed = %feed))]
    pub async fn fetch(&self, feed: Source, date: NaiveDate) -> Result<RawPayload, FetchError> {
        let url = self.url_for(feed, date)?;
        let body = self.get_bytes_with_retry(feed, &url).await?;

        let payload = match feed.kind() {
            PayloadKind::Json => RawPayload::Records(parse_records(feed, &body)?),
            PayloadKind::Csv => {
                let label = self.endpoints.encoding_label(feed);
                let encoding = Encoding::for_label(label.as_bytes()).ok_or_else(|| {
                    FetchError::Encoding {
                        feed,
                        label: label.to_string(),
                    }
                })?;
                let (text, used, had_errors) = encoding.decode(&body);
                if had_errors {
                    warn!(feed = %feed, encoding = used.name(), "body contained undecodable bytes");
                }
                RawPayload::Text {
                    text: text.into_owned(),
                    encoding: used.name(),
                }
            }
        };
        info!(feed = %feed, items = payload.len(), "fetched");
        Ok(payload)
    }

    fn url_for(&self, feed: Source, date: NaiveDate) -> Result<Url, FetchError> {
        let base = self.endpoints.base_url(feed);
        let query = feed.query(date);
        let parsed = if query.is_empty() {
            Url::parse(base)
        } else {
            Url::parse_with_params(base, query.iter().map(|(k, v)| (*k, v.as_str())))
        };
        parsed.map_err(|error| FetchError::Endpoint {
            feed,
            url: base.to_string(),
            error,
        })
    }

    async fn get_bytes(&self, feed: Source, url: &Url) -> Result<Vec<u8>, FetchError> {
        debug!(%url, "GET");
        let resp = self
            .client
            .get(url.clone())
            .header(ACCEPT, feed.accept())
            .send()
            .await
            .map_err(|error| FetchError::Transport { feed, error })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                feed,
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|error| FetchError::Transport { feed, error })?;
        Ok(bytes.to_vec())
    }

    async fn get_bytes_with_retry(&self, feed: Source, url: &Url) -> Result<Vec<u8>, FetchError> {
        let mut attempts = 0;
        loop {
            match self.get_bytes(feed, url).await {
                Ok(b) => return Ok(b),
                Err(e) if attempts < self.max_retries => {
                    attempts += 1;
                    warn!(%url, attempt = attempts, delay_ms = self.retry_delay.as_millis() as u64, error = %e, "retrying");
                    sleep(self.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
