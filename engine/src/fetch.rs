use crate::{config::EngineConfig, error::EngineError};
use bytes::Bytes;
use reqwest::StatusCode;
use std::error::Error as _;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// Status was exactly 200.
    Success(Bytes),
    NonSuccessStatus(u16),
    /// DNS failure, refused connection or a domain that does not exist.
    ConnectionFailure(String),
    Timeout,
    OtherFailure(String),
}

/// Retrieves page bytes for a URL.
pub trait PageFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> impl Future<Output = FetchOutcome> + Send;
}

/// `reqwest` based fetcher.
///
/// Certificate checks are off by default: phishing pages routinely serve
/// broken certificates and still need to be analysed.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, timeout: Duration, accept_invalid_certs: bool) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()?;
        Ok(Self { client })
    }

    pub fn from_config(config: &EngineConfig) -> Result<Self, EngineError> {
        Self::new(
            &config.user_agent,
            Duration::from_secs(config.fetch_timeout_secs),
            config.accept_invalid_certs,
        )
    }
}

impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> FetchOutcome {
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => return classify_error(&e),
        };

        let status = response.status();
        if status != StatusCode::OK {
            debug!("{} answered with status {}", url, status);
            return FetchOutcome::NonSuccessStatus(status.as_u16());
        }

        match response.bytes().await {
            Ok(body) => {
                debug!("Fetched {} bytes from {}", body.len(), url);
                FetchOutcome::Success(body)
            }
            Err(e) => classify_error(&e),
        }
    }
}

fn classify_error(err: &reqwest::Error) -> FetchOutcome {
    let detail = describe(err);
    if err.is_timeout() {
        warn!("Fetch timed out: {}", detail);
        FetchOutcome::Timeout
    } else if err.is_connect() {
        warn!("Connection failed: {}", detail);
        FetchOutcome::ConnectionFailure(detail)
    } else {
        warn!("Fetch failed: {}", detail);
        FetchOutcome::OtherFailure(detail)
    }
}

/// Error message followed by its source chain.
fn describe(err: &reqwest::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
