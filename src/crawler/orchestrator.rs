//! # Crawl Orchestrator
//!
//! Coordinates one `obtain` call: check the store, decide freshness, acquire a
//! new render when needed, extract and normalize, then persist.
//!
//! The acquisition backend sits behind a single async mutex. Only the render
//! call runs under it, so cache hits and the post-processing of other requests
//! never wait on a page load.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::crawler::acquisition::{Acquisition, RenderedPage};
use crate::crawler::config::CrawlerConfig;
use crate::crawler::content_extraction::extract;
use crate::crawler::error::{AcquisitionError, CrawlError};
use crate::crawler::freshness::is_stale;
use crate::crawler::normalize::TextNormalizer;
use crate::store::{PageRecord, PageStore, PageUpdate};

/// Outcome of a successful `obtain`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Obtained {
    /// The stored record for the requested URL
    pub record: PageRecord,

    /// True when the record was fresh and no acquisition happened
    pub served_from_cache: bool,
}

/// Serves pages from the store, refreshing them through an acquisition
/// backend when they are missing or stale
pub struct CrawlOrchestrator<A> {
    store: PageStore,
    acquisition: Mutex<A>,
    config: RwLock<CrawlerConfig>,
    shut_down: AtomicBool,
}

impl<A: Acquisition> CrawlOrchestrator<A> {
    /// Create an orchestrator over `store` using `acquisition` to render pages
    pub fn new(store: PageStore, acquisition: A, config: CrawlerConfig) -> Self {
        Self {
            store,
            acquisition: Mutex::new(acquisition),
            config: RwLock::new(config),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Return the record for `url`, acquiring a new copy when the stored one
    /// is missing or stale.
    ///
    /// A failed acquisition leaves any stored record untouched. Failures are
    /// not retried.
    #[instrument(skip(self))]
    pub async fn obtain(&self, url: &str) -> Result<Obtained, CrawlError> {
        if self.is_shut_down() {
            return Err(CrawlError::ShutDown);
        }

        let url = canonicalize_url(url)?;
        let config = self.config().await;

        if let Some(existing) = self.store.find_by_url(&url).await? {
            if !is_stale(Some(existing.last_refreshed_at), config.threshold_days) {
                debug!("Serving {} from cache", url);
                return Ok(Obtained {
                    record: existing,
                    served_from_cache: true,
                });
            }
            info!(
                "Stored copy of {} from {} is stale, refreshing",
                url, existing.last_refreshed_at
            );
        } else {
            info!("No stored copy of {}, acquiring", url);
        }

        let rendered = self.render(&url, &config).await?;

        let extraction = extract(&rendered.html);
        if let Some(failure) = &extraction.failure {
            warn!("Extraction degraded for {}: {}", url, failure);
        }
        let page = extraction
            .page
            .merge_rendered(rendered.title.as_deref(), rendered.description.as_deref());

        let normalizer = TextNormalizer::new(config.lang);
        let update = PageUpdate {
            title: normalizer.normalize(&page.title),
            description: normalizer.normalize(&page.description),
            content: normalizer.normalize(&page.content),
            raw_markup: rendered.html,
            url,
        };

        let record = self.store.upsert(&update).await?;
        info!("Stored {} ({} chars of content)", record.url, record.content.len());

        Ok(Obtained {
            record,
            served_from_cache: false,
        })
    }

    async fn render(&self, url: &str, config: &CrawlerConfig) -> Result<RenderedPage, CrawlError> {
        let options = config.render_options();
        let limit = options.timeout.saturating_add(options.settle_delay);

        let mut acquisition = self.acquisition.lock().await;
        // Shutdown may have happened while waiting for the session
        if self.is_shut_down() {
            return Err(CrawlError::ShutDown);
        }

        let result = match tokio::time::timeout(limit, acquisition.render(url, &options)).await {
            Ok(result) => result,
            Err(_) => Err(AcquisitionError::Timeout(limit.as_secs())),
        };

        result.map_err(|source| {
            warn!("Acquisition of {} failed: {}", url, source);
            CrawlError::AcquisitionFailed {
                url: url.to_string(),
                source,
            }
        })
    }

    /// Whether the orchestrator accepts `obtain` calls
    pub fn is_ready(&self) -> bool {
        !self.is_shut_down()
    }

    /// Whether the acquisition session is currently open. A session busy
    /// rendering counts as open.
    pub fn session_open(&self) -> bool {
        self.acquisition
            .try_lock()
            .map(|acquisition| acquisition.is_open())
            .unwrap_or(true)
    }

    /// Close the acquisition session. The next acquisition reopens it.
    pub async fn release_session(&self) -> Result<(), AcquisitionError> {
        let mut acquisition = self.acquisition.lock().await;
        if acquisition.is_open() {
            acquisition.close().await?;
            info!("Acquisition session released");
        }
        Ok(())
    }

    /// Release the acquisition session and refuse further `obtain` calls
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Shutting down crawl orchestrator");
        if let Err(e) = self.release_session().await {
            warn!("Failed to release acquisition session: {}", e);
        }
    }

    fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Snapshot of the current configuration
    pub async fn config(&self) -> CrawlerConfig {
        self.config.read().await.clone()
    }

    /// Replace the configuration used by subsequent calls
    pub async fn set_config(&self, config: CrawlerConfig) {
        let mut current = self.config.write().await;
        if current.database_path != config.database_path {
            warn!(
                "database_path changed to {}; the open store keeps using {}",
                config.database_path, current.database_path
            );
        }
        *current = config;
    }

    /// Re-read the configuration file at `path` and apply it
    pub async fn reload_config(&self, path: impl AsRef<Path>) -> crate::error::Result<()> {
        let config = CrawlerConfig::read_config(path.as_ref()).await?;
        info!("Reloaded configuration from {}", path.as_ref().display());
        self.set_config(config).await;
        Ok(())
    }

    /// The page store behind this orchestrator
    pub fn store(&self) -> &PageStore {
        &self.store
    }
}

/// Parse `url` and return its canonical form. Only http and https are
/// crawlable.
fn canonicalize_url(url: &str) -> Result<String, CrawlError> {
    let parsed = Url::parse(url.trim())?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed.to_string()),
        other => Err(CrawlError::InvalidUrl(format!(
            "unsupported scheme '{}' in {}",
            other, url
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::acquisition::RenderOptions;
    use crate::store::PageFilter;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tempfile::tempdir;

    /// Shared view into a fake acquisition backend
    #[derive(Default)]
    struct Probe {
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        closes: AtomicUsize,
        failing: AtomicBool,
    }

    struct FakeAcquisition {
        html: String,
        title: Option<String>,
        delay: Duration,
        open: bool,
        probe: Arc<Probe>,
    }

    impl FakeAcquisition {
        fn new(html: &str) -> (Self, Arc<Probe>) {
            let probe = Arc::new(Probe::default());
            let fake = Self {
                html: html.to_string(),
                title: None,
                delay: Duration::ZERO,
                open: false,
                probe: probe.clone(),
            };
            (fake, probe)
        }
    }

    #[async_trait]
    impl Acquisition for FakeAcquisition {
        async fn render(
            &mut self,
            _url: &str,
            _options: &RenderOptions,
        ) -> Result<RenderedPage, AcquisitionError> {
            self.open = true;
            self.probe.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.probe.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.probe.max_in_flight.fetch_max(now, Ordering::SeqCst);

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.probe.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.probe.failing.load(Ordering::SeqCst) {
                return Err(AcquisitionError::Navigation { status: 503 });
            }
            Ok(RenderedPage {
                html: self.html.clone(),
                title: self.title.clone(),
                description: None,
            })
        }

        async fn close(&mut self) -> Result<(), AcquisitionError> {
            self.open = false;
            self.probe.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn is_open(&self) -> bool {
            self.open
        }
    }

    const EXAMPLE_HTML: &str = r#"<html>
        <head>
            <title>Example</title>
            <meta name="description" content="A summary">
        </head>
        <body><p>Hello world</p></body>
    </html>"#;

    async fn setup(
        acquisition: FakeAcquisition,
    ) -> (CrawlOrchestrator<FakeAcquisition>, tempfile::TempDir) {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir
            .path()
            .join("pages.db")
            .to_string_lossy()
            .to_string();
        let store = PageStore::open(&db_path).await.unwrap();
        let config = CrawlerConfig::builder()
            .database_path(db_path)
            .settle_delay_secs(0)
            .build();
        (CrawlOrchestrator::new(store, acquisition, config), temp_dir)
    }

    #[tokio::test]
    async fn test_obtain_acquires_and_stores() {
        let (fake, probe) = FakeAcquisition::new(EXAMPLE_HTML);
        let (orchestrator, _temp_dir) = setup(fake).await;

        let obtained = orchestrator.obtain("https://example.com").await.unwrap();

        assert!(!obtained.served_from_cache);
        assert_eq!(obtained.record.url, "https://example.com/");
        assert_eq!(obtained.record.title, "Example");
        assert_eq!(obtained.record.description, "A summary");
        assert_eq!(obtained.record.content, "Hello world");
        assert_eq!(obtained.record.raw_markup, EXAMPLE_HTML);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fresh_record_served_from_cache() {
        let (fake, probe) = FakeAcquisition::new(EXAMPLE_HTML);
        let (orchestrator, _temp_dir) = setup(fake).await;

        let first = orchestrator.obtain("https://example.com/").await.unwrap();
        let second = orchestrator.obtain("https://example.com/").await.unwrap();

        assert!(second.served_from_cache);
        assert_eq!(second.record, first.record);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stale_record_is_refreshed() {
        let (fake, probe) = FakeAcquisition::new(EXAMPLE_HTML);
        let (orchestrator, _temp_dir) = setup(fake).await;

        let first = orchestrator.obtain("https://example.com/").await.unwrap();
        orchestrator
            .set_config(CrawlerConfig::builder().threshold_days(0).build())
            .await;
        tokio::time::sleep(Duration::from_millis(2)).await;
        let second = orchestrator.obtain("https://example.com/").await.unwrap();

        assert!(!second.served_from_cache);
        assert_eq!(second.record.id, first.record.id);
        assert!(second.record.last_refreshed_at > first.record.last_refreshed_at);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_acquisition_keeps_stale_record() {
        let (fake, probe) = FakeAcquisition::new(EXAMPLE_HTML);
        let (orchestrator, _temp_dir) = setup(fake).await;

        let stored = orchestrator.obtain("https://example.com/").await.unwrap();
        orchestrator
            .set_config(CrawlerConfig::builder().threshold_days(0).build())
            .await;
        probe.failing.store(true, Ordering::SeqCst);

        let result = orchestrator.obtain("https://example.com/").await;
        assert!(matches!(
            result,
            Err(CrawlError::AcquisitionFailed {
                source: AcquisitionError::Navigation { status: 503 },
                ..
            })
        ));

        let unchanged = orchestrator
            .store()
            .find_by_url("https://example.com/")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(unchanged, stored.record);
    }

    #[tokio::test]
    async fn test_failed_first_acquisition_stores_nothing() {
        let (fake, probe) = FakeAcquisition::new(EXAMPLE_HTML);
        probe.failing.store(true, Ordering::SeqCst);
        let (orchestrator, _temp_dir) = setup(fake).await;

        assert!(orchestrator.obtain("https://example.com/").await.is_err());

        let listing = orchestrator
            .store()
            .list(&PageFilter::default(), 1, 10)
            .await
            .unwrap();
        assert_eq!(listing.total_count, 0);
    }

    #[tokio::test]
    async fn test_rendered_title_wins_over_markup() {
        let (mut fake, _probe) = FakeAcquisition::new(EXAMPLE_HTML);
        fake.title = Some("Rendered Title".to_string());
        let (orchestrator, _temp_dir) = setup(fake).await;

        let obtained = orchestrator.obtain("https://example.com/").await.unwrap();
        assert_eq!(obtained.record.title, "Rendered Title");
        assert_eq!(obtained.record.description, "A summary");
    }

    #[tokio::test]
    async fn test_empty_markup_still_stored() {
        let (fake, _probe) = FakeAcquisition::new("");
        let (orchestrator, _temp_dir) = setup(fake).await;

        let obtained = orchestrator.obtain("https://example.com/empty").await.unwrap();
        assert_eq!(obtained.record.title, "");
        assert_eq!(obtained.record.content, "");
    }

    #[tokio::test]
    async fn test_content_is_normalized() {
        let html = r#"<html><body><article>He said  "hi" ( quietly ) .</article></body></html>"#;
        let (fake, _probe) = FakeAcquisition::new(html);
        let (orchestrator, _temp_dir) = setup(fake).await;

        let obtained = orchestrator.obtain("https://example.com/").await.unwrap();
        assert!(!obtained.record.content.contains('"'));
        assert!(!obtained.record.content.contains("( "));
    }

    #[tokio::test]
    async fn test_concurrent_obtains_serialize_acquisition() {
        let (mut fake, probe) = FakeAcquisition::new(EXAMPLE_HTML);
        fake.delay = Duration::from_millis(20);
        let (orchestrator, _temp_dir) = setup(fake).await;

        let urls: Vec<String> = (0..4)
            .map(|i| format!("https://example.com/{}", i))
            .collect();
        let results =
            futures::future::join_all(urls.iter().map(|url| orchestrator.obtain(url))).await;

        for result in results {
            assert!(!result.unwrap().served_from_cache);
        }
        assert_eq!(probe.calls.load(Ordering::SeqCst), 4);
        assert_eq!(probe.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cache_hit_does_not_wait_for_render() {
        let (mut fake, probe) = FakeAcquisition::new(EXAMPLE_HTML);
        fake.delay = Duration::from_millis(500);
        let (orchestrator, _temp_dir) = setup(fake).await;

        orchestrator
            .store()
            .upsert(&PageUpdate {
                url: "https://example.com/a".to_string(),
                title: "Stored".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        let slow = orchestrator.obtain("https://example.com/b");
        let fast = async {
            // Give the slow render time to take the session
            tokio::time::sleep(Duration::from_millis(50)).await;
            let cached = tokio::time::timeout(
                Duration::from_millis(250),
                orchestrator.obtain("https://example.com/a"),
            )
            .await;
            (cached, probe.in_flight.load(Ordering::SeqCst))
        };

        let (slow, (cached, in_flight)) = tokio::join!(slow, fast);

        let cached = cached
            .expect("cache hit waited on the render")
            .unwrap();
        assert!(cached.served_from_cache);
        assert_eq!(cached.record.title, "Stored");
        assert_eq!(in_flight, 1);
        assert!(!slow.unwrap().served_from_cache);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_render_timeout() {
        let (mut fake, _probe) = FakeAcquisition::new(EXAMPLE_HTML);
        fake.delay = Duration::from_secs(5);
        let (orchestrator, _temp_dir) = setup(fake).await;
        orchestrator
            .set_config(
                CrawlerConfig::builder()
                    .browser_timeout_secs(1)
                    .settle_delay_secs(0)
                    .build(),
            )
            .await;

        let result = orchestrator.obtain("https://example.com/slow").await;
        assert!(matches!(
            result,
            Err(CrawlError::AcquisitionFailed {
                source: AcquisitionError::Timeout(1),
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_unvalidated_huge_timeout_does_not_overflow() {
        let (fake, probe) = FakeAcquisition::new(EXAMPLE_HTML);
        let (orchestrator, _temp_dir) = setup(fake).await;
        orchestrator
            .set_config(
                CrawlerConfig::builder()
                    .browser_timeout_secs(u64::MAX)
                    .settle_delay_secs(1)
                    .build(),
            )
            .await;

        let obtained = orchestrator.obtain("https://example.com/").await.unwrap();
        assert!(!obtained.served_from_cache);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalid_urls_rejected() {
        let (fake, probe) = FakeAcquisition::new(EXAMPLE_HTML);
        let (orchestrator, _temp_dir) = setup(fake).await;

        assert!(matches!(
            orchestrator.obtain("ftp://example.com/file").await,
            Err(CrawlError::InvalidUrl(_))
        ));
        assert!(matches!(
            orchestrator.obtain("not a url").await,
            Err(CrawlError::UrlParse(_))
        ));
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_release_session_and_reopen() {
        let (fake, probe) = FakeAcquisition::new(EXAMPLE_HTML);
        let (orchestrator, _temp_dir) = setup(fake).await;

        assert!(!orchestrator.session_open());
        orchestrator.obtain("https://example.com/a").await.unwrap();
        assert!(orchestrator.session_open());

        orchestrator.release_session().await.unwrap();
        assert!(!orchestrator.session_open());
        assert_eq!(probe.closes.load(Ordering::SeqCst), 1);

        orchestrator.obtain("https://example.com/b").await.unwrap();
        assert!(orchestrator.session_open());
        assert!(orchestrator.is_ready());
    }

    #[tokio::test]
    async fn test_shutdown_refuses_obtain() {
        let (fake, probe) = FakeAcquisition::new(EXAMPLE_HTML);
        let (orchestrator, _temp_dir) = setup(fake).await;

        orchestrator.obtain("https://example.com/").await.unwrap();
        orchestrator.shutdown().await;
        orchestrator.shutdown().await;

        assert!(!orchestrator.is_ready());
        assert_eq!(probe.closes.load(Ordering::SeqCst), 1);
        assert!(matches!(
            orchestrator.obtain("https://example.com/").await,
            Err(CrawlError::ShutDown)
        ));
    }

    #[tokio::test]
    async fn test_reload_config() {
        let (fake, _probe) = FakeAcquisition::new(EXAMPLE_HTML);
        let (orchestrator, temp_dir) = setup(fake).await;

        let path = temp_dir.path().join("pagekeep.json");
        tokio::fs::write(&path, r#"{"threshold_days": 7}"#)
            .await
            .unwrap();

        orchestrator.reload_config(&path).await.unwrap();
        assert_eq!(orchestrator.config().await.threshold_days, 7);
    }

    #[tokio::test]
    async fn test_reload_rejects_oversized_timeout() {
        let (fake, _probe) = FakeAcquisition::new(EXAMPLE_HTML);
        let (orchestrator, temp_dir) = setup(fake).await;
        let before = orchestrator.config().await;

        let path = temp_dir.path().join("pagekeep.json");
        tokio::fs::write(&path, r#"{"browser_timeout_secs": 18446744073709551615}"#)
            .await
            .unwrap();

        assert!(orchestrator.reload_config(&path).await.is_err());
        assert_eq!(orchestrator.config().await, before);
        orchestrator.obtain("https://example.com/").await.unwrap();
    }

    #[test]
    fn test_canonicalize_url() {
        assert_eq!(
            canonicalize_url(" https://Example.com ").unwrap(),
            "https://example.com/"
        );
        assert_eq!(
            canonicalize_url("http://example.com/a?b=1").unwrap(),
            "http://example.com/a?b=1"
        );
        assert!(canonicalize_url("mailto:someone@example.com").is_err());
    }
}
