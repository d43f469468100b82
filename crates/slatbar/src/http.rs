//! HTTP collaborator seam for polled widgets.
//!
//! One request in, raw body or failure out. No retry or backoff here -
//! callers apply their own cadence through the poll loop.

use std::time::Duration;

use crate::errors::WidgetError;

/// Request timeout. Well under any sane refresh interval so a hung
/// endpoint cannot stall a cycle past its cadence.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Issues a single HTTP GET and returns the raw response body.
pub trait HttpFetch: Send {
    fn get(&self, url: &str) -> Result<String, WidgetError>;
}

/// `reqwest`-backed fetcher. Each polled widget owns its own instance,
/// so no connection state is shared across workers.
pub struct BlockingHttp {
    client: reqwest::blocking::Client,
}

impl BlockingHttp {
    pub fn new() -> Result<Self, WidgetError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| WidgetError::Configuration(format!("http client: {e}")))?;
        Ok(Self { client })
    }
}

impl HttpFetch for BlockingHttp {
    fn get(&self, url: &str) -> Result<String, WidgetError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| WidgetError::Collaborator(format!("GET {url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(WidgetError::Collaborator(format!("GET {url}: {status}")));
        }

        response
            .text()
            .map_err(|e| WidgetError::Collaborator(format!("GET {url}: {e}")))
    }
}
