//! Thin JSON client for the Prometheus HTTP API.

use std::{
    collections::{BTreeSet, HashMap},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use serde::{Deserialize, de::DeserializeOwned};

use crate::{Error, metadata::Selection};

type Params = Vec<(String, String)>;

/// Every API response is wrapped in this envelope.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: String,
    data: Option<T>,
    #[serde(default)]
    error: String,
}

#[derive(Debug, Deserialize)]
struct BuildInfo {
    version: String,
}

#[derive(Debug, Clone)]
pub(super) struct Http {
    agent: ureq::Agent,
    base: String,
    lookback: Arc<AtomicU64>,
}

impl Http {
    pub(super) fn new(url: &str, timeout: Duration, lookback: Arc<AtomicU64>) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global((!timeout.is_zero()).then_some(timeout))
            .build();
        Self {
            agent: config.into(),
            base: url.trim_end_matches('/').to_string(),
            lookback,
        }
    }

    /// `start` and `end` parameters covering the lookback interval up to now.
    pub(super) fn window(&self) -> Params {
        let end = chrono::Utc::now();
        let lookback = i64::try_from(self.lookback.load(Ordering::Relaxed))
            .ok()
            .and_then(chrono::TimeDelta::try_milliseconds)
            .unwrap_or(chrono::TimeDelta::MAX);
        let start = end
            .checked_sub_signed(lookback)
            .unwrap_or(chrono::DateTime::<chrono::Utc>::MIN_UTC);
        vec![
            ("start".to_string(), start.timestamp().to_string()),
            ("end".to_string(), end.timestamp().to_string()),
        ]
    }

    /// Version reported by `/api/v1/status/buildinfo`, `None` if the endpoint does not exist.
    pub(super) async fn build_version(&self) -> Result<Option<String>, Error> {
        Ok(self
            .fetch::<BuildInfo>("/api/v1/status/buildinfo", Vec::new())
            .await?
            .map(|info| info.version))
    }

    pub(super) async fn get<T>(&self, path: &str, params: Params) -> Result<T, Error>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.fetch(path, params)
            .await?
            .ok_or_else(|| Error::Upstream(format!("{}{path} does not exist", self.base)))
    }

    /// Series matching `selection`, optionally restricted to the lookback interval.
    pub(super) async fn series(
        &self,
        selection: &Selection,
        windowed: bool,
    ) -> Result<Vec<HashMap<String, String>>, Error> {
        let mut params = vec![("match[]".to_string(), selector(selection))];
        if windowed {
            params.extend(self.window());
        }
        self.get("/api/v1/series", params).await
    }

    /// `None` when the server answers 404.
    async fn fetch<T>(&self, path: &str, params: Params) -> Result<Option<T>, Error>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let url = format!("{}{path}", self.base);
        tracing::debug!("GET {url} {params:?}");
        let agent = self.agent.clone();
        let body = tokio::task::spawn_blocking(move || {
            let request = params
                .iter()
                .fold(agent.get(url.as_str()), |request, (key, value)| {
                    request.query(key, value)
                });
            match request.call() {
                Ok(mut response) => response.body_mut().read_to_string().map(Some),
                Err(ureq::Error::StatusCode(404)) => Ok(None),
                Err(err) => Err(err),
            }
        })
        .await??;

        let Some(body) = body else {
            return Ok(None);
        };
        let envelope: Envelope<T> = serde_json::from_str(&body)
            .map_err(|err| Error::Upstream(format!("invalid response from {path}: {err}")))?;
        if envelope.status != "success" {
            return Err(Error::Upstream(format!(
                "{path} answered {}: {}",
                envelope.status, envelope.error
            )));
        }
        envelope
            .data
            .map(Some)
            .ok_or_else(|| Error::Upstream(format!("{path} answered without data")))
    }
}

/// `{name="value",...}` series selector.
pub(super) fn selector(selection: &Selection) -> String {
    let matchers = selection
        .iter()
        .map(|(name, value)| {
            let escaped = value
                .replace('\\', "\\\\")
                .replace('"', "\\\"")
                .replace('\n', "\\n");
            format!("{name}=\"{escaped}\"")
        })
        .collect::<Vec<_>>()
        .join(",");
    format!("{{{matchers}}}")
}

/// Sorted label names used by any of the series.
pub(super) fn label_names_of(series: &[HashMap<String, String>]) -> Vec<String> {
    series
        .iter()
        .flat_map(HashMap::keys)
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Sorted distinct values of `label` across the series.
pub(super) fn label_values_of(series: &[HashMap<String, String>], label: &str) -> Vec<String> {
    series
        .iter()
        .filter_map(|labels| labels.get(label))
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
