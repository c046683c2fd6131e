use reqwest::Url;
use thiserror::Error;

use crate::metrics::{Metric, MetricEvent};

#[derive(Debug, Error, PartialEq)]
pub enum IngestUrlError {
    #[error("invalid ingest url: {0}")]
    Parse(#[from] url::ParseError),
    #[error("ingest url must be http or https, got `{0}`")]
    UnsupportedScheme(String),
}

/// Sends metrics to a vector http ingest endpoint
#[derive(Clone)]
pub struct VectorDbMetricTx {
    client: reqwest::Client,
    ingest_url: Url,
}

impl VectorDbMetricTx {
    pub fn new(ingest_url: Url) -> Self {
        Self {
            client: reqwest::Client::new(),
            ingest_url,
        }
    }

    /// Parses `ingest_url`, accepting only http(s) endpoints.
    pub fn from_url_str(ingest_url: &str) -> Result<Self, IngestUrlError> {
        let url = Url::parse(ingest_url)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(IngestUrlError::UnsupportedScheme(url.scheme().to_string()));
        }
        Ok(Self::new(url))
    }

    pub fn ingest_url(&self) -> &Url {
        &self.ingest_url
    }
}

impl super::MetricEventTx for VectorDbMetricTx {
    type Error = reqwest::Error;

    async fn push<M: Metric + Send + 'static>(&self, ev: MetricEvent<M>) -> Result<(), Self::Error> {
        self.client
            .post(self.ingest_url.clone())
            .json(&ev)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_http_endpoints() {
        let tx = VectorDbMetricTx::from_url_str("https://vector.example.com/ingest").unwrap();
        assert_eq!(tx.ingest_url().as_str(), "https://vector.example.com/ingest");
    }

    #[test]
    fn rejects_unusable_endpoints() {
        assert!(matches!(
            VectorDbMetricTx::from_url_str("not a url"),
            Err(IngestUrlError::Parse(_))
        ));
        assert_eq!(
            VectorDbMetricTx::from_url_str("ftp://vector.example.com/").err(),
            Some(IngestUrlError::UnsupportedScheme("ftp".into()))
        );
    }
}
