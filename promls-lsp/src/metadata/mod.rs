//! Metric metadata and label lookups against a Prometheus server.
//!
//! Prometheus grew a dedicated metadata API in 2.15. Older servers only expose metadata per
//! scrape target, so [`MetadataClient`] probes the server once and picks the matching
//! implementation. Without a configured server every lookup comes back empty.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Deserialize;

use crate::Error;

mod http;
mod legacy;
mod modern;

use http::Http;

/// Metadata Prometheus keeps for a metric.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Metadata {
    /// `counter`, `gauge`, `histogram`, `summary`, ...
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub help: String,
    #[serde(default)]
    pub unit: String,
}

/// Label name / value pairs restricting which series are considered.
pub type Selection = [(String, String)];

#[async_trait]
pub trait MetadataService: Send + Sync {
    async fn metric_metadata(&self, metric: &str) -> Result<Option<Metadata>, Error>;

    /// Every known metric name with its metadata. Names without metadata map to an empty list.
    async fn all_metric_metadata(&self) -> Result<HashMap<String, Vec<Metadata>>, Error>;

    async fn label_names(&self, selection: &Selection) -> Result<Vec<String>, Error>;

    async fn label_values(&self, label: &str, selection: &Selection)
    -> Result<Vec<String>, Error>;
}

/// Used when no Prometheus URL is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct Disconnected;

#[async_trait]
impl MetadataService for Disconnected {
    async fn metric_metadata(&self, _metric: &str) -> Result<Option<Metadata>, Error> {
        Ok(None)
    }

    async fn all_metric_metadata(&self) -> Result<HashMap<String, Vec<Metadata>>, Error> {
        Ok(HashMap::new())
    }

    async fn label_names(&self, _selection: &Selection) -> Result<Vec<String>, Error> {
        Ok(Vec::new())
    }

    async fn label_values(
        &self,
        _label: &str,
        _selection: &Selection,
    ) -> Result<Vec<String>, Error> {
        Ok(Vec::new())
    }
}

/// First Prometheus release with `/api/v1/metadata`.
const MODERN_SINCE: (u64, u64, u64) = (2, 15, 0);

/// Owns the active [`MetadataService`] and swaps it when the data source changes.
pub struct MetadataClient {
    service: RwLock<Arc<dyn MetadataService>>,
    url: RwLock<Option<String>>,
    /// Milliseconds, shared with the HTTP implementations.
    lookback: Arc<AtomicU64>,
    timeout: Duration,
}

impl std::fmt::Debug for MetadataClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataClient")
            .field("url", &*self.url.read())
            .field("lookback", &self.lookback)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl MetadataClient {
    /// A client answering every lookup with empty results until a data source is set.
    #[must_use]
    pub fn new(lookback: Duration, timeout: Duration) -> Self {
        Self {
            service: RwLock::new(Arc::new(Disconnected)),
            url: RwLock::new(None),
            lookback: Arc::new(AtomicU64::new(duration_millis(lookback))),
            timeout,
        }
    }

    /// A client using a fixed service, bypassing the version probe.
    #[must_use]
    pub fn with_service(service: Arc<dyn MetadataService>) -> Self {
        let client = Self::new(Duration::ZERO, Duration::ZERO);
        *client.service.write() = service;
        client
    }

    /// Point the client at another Prometheus server, or disconnect it with `None`.
    ///
    /// The server is probed before anything is swapped, so a failing probe leaves the
    /// previous service in place.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Upstream`] if the server cannot be reached or answers with something
    /// that is not build information, and [`Error::Protocol`] for an invalid URL.
    pub async fn change_data_source(&self, url: Option<&str>) -> Result<(), Error> {
        let Some(url) = url.map(str::trim).filter(|url| !url.is_empty()) else {
            *self.service.write() = Arc::new(Disconnected);
            *self.url.write() = None;
            tracing::info!("metadata lookups disabled, no Prometheus URL configured");
            return Ok(());
        };
        tower_lsp::lsp_types::Url::parse(url)
            .map_err(|err| Error::Protocol(format!("invalid Prometheus URL {url:?}: {err}")))?;

        let http = Http::new(url, self.timeout, Arc::clone(&self.lookback));
        let service: Arc<dyn MetadataService> = match http.build_version().await? {
            None => {
                tracing::info!("{url} has no build information endpoint, using the legacy API");
                Arc::new(legacy::Legacy::new(http))
            }
            Some(version) if is_modern(&version) => {
                tracing::info!("connected to Prometheus {version} at {url}");
                Arc::new(modern::Modern::new(http))
            }
            Some(version) => {
                tracing::info!("connected to Prometheus {version} at {url}, using the legacy API");
                Arc::new(legacy::Legacy::new(http))
            }
        };
        *self.service.write() = service;
        *self.url.write() = Some(url.to_string());
        Ok(())
    }

    pub fn set_lookback_interval(&self, lookback: Duration) {
        self.lookback
            .store(duration_millis(lookback), Ordering::Relaxed);
    }

    #[must_use]
    pub fn lookback_interval(&self) -> Duration {
        Duration::from_millis(self.lookback.load(Ordering::Relaxed))
    }

    /// URL of the current data source.
    #[must_use]
    pub fn url(&self) -> Option<String> {
        self.url.read().clone()
    }

    fn current(&self) -> Arc<dyn MetadataService> {
        Arc::clone(&self.service.read())
    }
}

#[async_trait]
impl MetadataService for MetadataClient {
    async fn metric_metadata(&self, metric: &str) -> Result<Option<Metadata>, Error> {
        self.current().metric_metadata(metric).await
    }

    async fn all_metric_metadata(&self) -> Result<HashMap<String, Vec<Metadata>>, Error> {
        self.current().all_metric_metadata().await
    }

    async fn label_names(&self, selection: &Selection) -> Result<Vec<String>, Error> {
        self.current().label_names(selection).await
    }

    async fn label_values(
        &self,
        label: &str,
        selection: &Selection,
    ) -> Result<Vec<String>, Error> {
        if label.is_empty() {
            return Ok(Vec::new());
        }
        self.current().label_values(label, selection).await
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Versions that cannot be parsed are assumed to be recent builds.
fn is_modern(version: &str) -> bool {
    let core = version
        .trim_start_matches('v')
        .split(['-', '+'])
        .next()
        .unwrap_or_default();
    let parts: Result<Vec<u64>, _> = core.split('.').map(str::parse).collect();
    match parts.as_deref() {
        Ok([major, minor, patch]) => (*major, *minor, *patch) >= MODERN_SINCE,
        Ok(_) | Err(_) => true,
    }
}
