//! Purview retention labels (Graph `security/labels/retentionLabels`)

use crate::api::RestClient;
use crate::error::Result;
use serde_json::Value;

pub struct PurviewClient<'a> {
    client: &'a RestClient,
}

impl<'a> PurviewClient<'a> {
    pub fn new(client: &'a RestClient) -> Self {
        Self { client }
    }

    fn labels_url(&self, id: Option<&str>) -> String {
        match id {
            Some(id) => self
                .client
                .graph_url(&format!("security/labels/retentionLabels/{}", id)),
            None => self.client.graph_url("security/labels/retentionLabels"),
        }
    }

    pub async fn list_retention_labels(&self) -> Result<Vec<Value>> {
        self.client.get_all_items(&self.labels_url(None)).await
    }

    pub async fn get_retention_label(&self, id: &str) -> Result<Value> {
        self.client.get(&self.labels_url(Some(id))).await
    }

    pub async fn delete_retention_label(&self, id: &str) -> Result<()> {
        self.client.delete(&self.labels_url(Some(id))).await
    }
}
