//! Prometheus 2.15 and later.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::{
    Error,
    metadata::{
        Metadata, MetadataService, Selection,
        http::{Http, label_names_of, label_values_of},
    },
};

#[derive(Debug, Clone)]
pub(super) struct Modern {
    http: Http,
}

impl Modern {
    pub(super) fn new(http: Http) -> Self {
        Self { http }
    }
}

#[async_trait]
impl MetadataService for Modern {
    async fn metric_metadata(&self, metric: &str) -> Result<Option<Metadata>, Error> {
        let params = vec![
            ("metric".to_string(), metric.to_string()),
            ("limit".to_string(), "1".to_string()),
        ];
        let mut metadata: HashMap<String, Vec<Metadata>> =
            self.http.get("/api/v1/metadata", params).await?;
        Ok(metadata
            .remove(metric)
            .and_then(|entries| entries.into_iter().next()))
    }

    async fn all_metric_metadata(&self) -> Result<HashMap<String, Vec<Metadata>>, Error> {
        self.http.get("/api/v1/metadata", Vec::new()).await
    }

    async fn label_names(&self, selection: &Selection) -> Result<Vec<String>, Error> {
        if selection.is_empty() {
            return self.http.get("/api/v1/labels", self.http.window()).await;
        }
        let series = self.http.series(selection, true).await?;
        Ok(label_names_of(&series))
    }

    async fn label_values(
        &self,
        label: &str,
        selection: &Selection,
    ) -> Result<Vec<String>, Error> {
        if selection.is_empty() {
            let path = format!("/api/v1/label/{label}/values");
            return self.http.get(&path, self.http.window()).await;
        }
        let series = self.http.series(selection, true).await?;
        Ok(label_values_of(&series, label))
    }
}
