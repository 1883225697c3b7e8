//! Link openers for a headless deployment.
//!
//! On a phone, `sms:` and `tel:` URIs go to the OS. A server has no composer
//! or dialer, so it either records the URI in its logs or relays it to a
//! webhook (an SMS/voice gateway, a pager bridge, ...).

use serde::Serialize;
use tracing::{info, warn};

use crate::alert::SystemLinker;
use crate::error::{Error, Result};

/// Writes every URI to the log and reports success.
#[derive(Debug, Clone, Default)]
pub struct LogLinker;

impl SystemLinker for LogLinker {
    async fn open(&self, uri: &str) -> Result<()> {
        // Only the scheme at info; the body carries contact details
        let scheme = uri.split(':').next().unwrap_or_default();
        info!(scheme, "Opening link");
        tracing::debug!(uri, "Link target");
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct LinkPayload<'a> {
    uri: &'a str,
}

/// POSTs `{"uri": ...}` to a configured endpoint.
#[derive(Clone)]
pub struct WebhookLinker {
    client: reqwest::Client,
    url: String,
}

impl WebhookLinker {
    pub fn new(url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.to_string(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl SystemLinker for WebhookLinker {
    async fn open(&self, uri: &str) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(&LinkPayload { uri })
            .send()
            .await
            .map_err(|e| Error::LinkOpenFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "Link webhook rejected request");
            return Err(Error::LinkOpenFailed(format!("webhook returned {status}")));
        }

        Ok(())
    }
}

/// The opener chosen at startup.
#[derive(Clone)]
pub enum AppLinker {
    Log(LogLinker),
    Webhook(WebhookLinker),
}

impl AppLinker {
    /// A webhook relay when a URL is configured, log-only otherwise.
    pub fn from_webhook(url: Option<&str>) -> Self {
        match url {
            Some(url) => AppLinker::Webhook(WebhookLinker::new(url)),
            None => AppLinker::Log(LogLinker),
        }
    }
}

impl SystemLinker for AppLinker {
    async fn open(&self, uri: &str) -> Result<()> {
        match self {
            AppLinker::Log(linker) => linker.open(uri).await,
            AppLinker::Webhook(linker) => linker.open(uri).await,
        }
    }
}
