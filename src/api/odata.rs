//! OData collection paging
//!
//! Graph returns `@odata.nextLink`, SharePoint REST (nometadata) returns
//! `odata.nextLink` and the Power Platform APIs return `nextLink`. All of them
//! carry an absolute URL that is requested as-is until no link remains.

use crate::api::RestClient;
use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use tracing::debug;

/// One page of an OData collection
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: DeserializeOwned"))]
pub struct ODataPage<T> {
    #[serde(default = "Vec::new", deserialize_with = "null_as_empty")]
    pub value: Vec<T>,

    #[serde(
        default,
        rename = "@odata.nextLink",
        alias = "odata.nextLink",
        alias = "nextLink"
    )]
    pub next_link: Option<String>,

    #[serde(default, rename = "@odata.count")]
    pub count: Option<i64>,
}

/// `"value": null` is an empty page, same as a missing `value`
fn null_as_empty<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

impl RestClient {
    /// Fetch every page of a collection, following next links until none is returned
    ///
    /// ```ignore
    /// let users: Vec<serde_json::Value> = client.get_all_items(&client.graph_url("users")).await?;
    /// ```
    pub async fn get_all_items<T: DeserializeOwned>(&self, url: &str) -> Result<Vec<T>> {
        self.get_all_items_with_headers(url, &[]).await
    }

    /// Same as [`RestClient::get_all_items`] with extra headers on every page request
    pub async fn get_all_items_with_headers<T: DeserializeOwned>(
        &self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<Vec<T>> {
        let mut all_items: Vec<T> = Vec::new();
        let mut current_url = url.to_string();
        let mut page_count = 0;

        loop {
            let page: ODataPage<T> = self.get_with_headers(&current_url, headers).await?;
            page_count += 1;
            all_items.extend(page.value);

            match page.next_link {
                Some(next) if !next.is_empty() => current_url = next,
                _ => break,
            }
        }

        debug!(url, pages = page_count, items = all_items.len(), "Retrieved collection");
        Ok(all_items)
    }
}
