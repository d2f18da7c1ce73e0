//! Acquisition backends that turn a URL into markup

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::crawler::error::AcquisitionError;

/// Per-call settings for a render
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    /// Page load timeout
    pub timeout: Duration,

    /// Fixed wait after the page has loaded
    pub settle_delay: Duration,
}

/// Markup and incidental metadata captured while rendering a page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedPage {
    /// Raw markup of the page
    pub html: String,

    /// Title reported by the renderer, if it captured one
    pub title: Option<String>,

    /// Description reported by the renderer, if it captured one
    pub description: Option<String>,
}

/// A stateful resource able to render pages, such as a browser session.
///
/// Implementations are only ever driven by one caller at a time; the
/// orchestrator holds them behind a lock. The session is opened lazily by
/// `render` and released by `close`.
#[async_trait]
pub trait Acquisition: Send + Sync {
    /// Render `url` and return its markup
    async fn render(
        &mut self,
        url: &str,
        options: &RenderOptions,
    ) -> Result<RenderedPage, AcquisitionError>;

    /// Release the underlying session, if one is open
    async fn close(&mut self) -> Result<(), AcquisitionError>;

    /// Whether a session is currently open
    fn is_open(&self) -> bool;
}

/// Acquisition backend that fetches markup over plain HTTP.
///
/// It does not execute scripts, so pages that build their content client-side
/// come back as their server-rendered shell.
#[derive(Debug)]
pub struct HttpRenderer {
    user_agent: String,
    client: Option<reqwest::Client>,
}

impl HttpRenderer {
    /// Create a renderer that identifies itself with `user_agent`
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
            client: None,
        }
    }

    fn session(&mut self) -> Result<&reqwest::Client, AcquisitionError> {
        if self.client.is_none() {
            info!("Opening HTTP session");
            let client = reqwest::Client::builder()
                .user_agent(self.user_agent.clone())
                .build()
                .map_err(|e| AcquisitionError::Unavailable(e.to_string()))?;
            self.client = Some(client);
        }

        self.client
            .as_ref()
            .ok_or_else(|| AcquisitionError::Unavailable("HTTP session not open".to_string()))
    }
}

#[async_trait]
impl Acquisition for HttpRenderer {
    #[instrument(skip(self, options))]
    async fn render(
        &mut self,
        url: &str,
        options: &RenderOptions,
    ) -> Result<RenderedPage, AcquisitionError> {
        let client = self.session()?.clone();

        let response = client
            .get(url)
            .timeout(options.timeout)
            .send()
            .await
            .map_err(|e| timeout_or_http(e, options.timeout))?;

        let status = response.status();
        if !status.is_success() {
            warn!("Navigation to {} returned {}", url, status);
            return Err(AcquisitionError::Navigation {
                status: status.as_u16(),
            });
        }

        let html = response
            .text()
            .await
            .map_err(|e| timeout_or_http(e, options.timeout))?;

        if !options.settle_delay.is_zero() {
            debug!("Waiting {:?} for page to settle", options.settle_delay);
            tokio::time::sleep(options.settle_delay).await;
        }

        debug!("Fetched {} bytes from {}", html.len(), url);
        Ok(RenderedPage {
            html,
            title: None,
            description: None,
        })
    }

    async fn close(&mut self) -> Result<(), AcquisitionError> {
        if self.client.take().is_some() {
            info!("HTTP session closed");
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.client.is_some()
    }
}

fn timeout_or_http(err: reqwest::Error, timeout: Duration) -> AcquisitionError {
    if err.is_timeout() {
        AcquisitionError::Timeout(timeout.as_secs())
    } else {
        AcquisitionError::Http(err)
    }
}
