//! Servers older than 2.15, which only know metadata per scrape target and do not bound
//! label lookups in time.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;

use crate::{
    Error,
    metadata::{
        Metadata, MetadataService, Selection,
        http::{Http, label_names_of, label_values_of},
    },
};

/// One entry of `/api/v1/targets/metadata`.
#[derive(Debug, Deserialize)]
struct TargetMetadata {
    /// Absent when the request filtered on a metric.
    #[serde(default)]
    metric: String,
    #[serde(flatten)]
    metadata: Metadata,
}

#[derive(Debug, Clone)]
pub(super) struct Legacy {
    http: Http,
}

impl Legacy {
    pub(super) fn new(http: Http) -> Self {
        Self { http }
    }
}

#[async_trait]
impl MetadataService for Legacy {
    async fn metric_metadata(&self, metric: &str) -> Result<Option<Metadata>, Error> {
        let params = vec![("metric".to_string(), metric.to_string())];
        let targets: Vec<TargetMetadata> =
            self.http.get("/api/v1/targets/metadata", params).await?;
        Ok(targets.into_iter().next().map(|target| target.metadata))
    }

    async fn all_metric_metadata(&self) -> Result<HashMap<String, Vec<Metadata>>, Error> {
        let names: Vec<String> = self
            .http
            .get("/api/v1/label/__name__/values", Vec::new())
            .await?;
        let mut all: HashMap<String, Vec<Metadata>> =
            names.into_iter().map(|name| (name, Vec::new())).collect();

        let targets: Vec<TargetMetadata> = self
            .http
            .get("/api/v1/targets/metadata", Vec::new())
            .await?;
        for target in targets {
            let entries = all.entry(target.metric).or_default();
            // Targets scraping the same metric usually agree on its metadata.
            if !entries.contains(&target.metadata) {
                entries.push(target.metadata);
            }
        }
        all.remove("");
        Ok(all)
    }

    async fn label_names(&self, selection: &Selection) -> Result<Vec<String>, Error> {
        if selection.is_empty() {
            return self.http.get("/api/v1/labels", Vec::new()).await;
        }
        let series = self.http.series(selection, false).await?;
        Ok(label_names_of(&series))
    }

    async fn label_values(
        &self,
        label: &str,
        selection: &Selection,
    ) -> Result<Vec<String>, Error> {
        if selection.is_empty() {
            let path = format!("/api/v1/label/{label}/values");
            return self.http.get(&path, Vec::new()).await;
        }
        let series = self.http.series(selection, false).await?;
        Ok(label_values_of(&series, label))
    }
}
