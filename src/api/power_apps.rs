//! Power Apps listing and package export
//!
//! Export is a three step BAP flow: `listPackageResources` describes what the
//! package will contain, `exportPackage` starts the export and answers with a
//! `Location` header, and polling that location eventually yields a
//! `packageLink` to download.

use crate::api::RestClient;
use crate::api::operation::{OperationState, OperationStatus, PollSettings};
use crate::error::{M365Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

const POWERAPPS_API_VERSION: &str = "2016-11-01";
const PACKAGE_API_VERSION: &str = "2016-11-01";

/// Export job as returned by the operation location
#[derive(Debug, Deserialize, Serialize)]
pub struct PackageExport {
    #[serde(default)]
    pub properties: PackageExportProperties,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageExportProperties {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub package_link: Option<PackageLink>,
    #[serde(default)]
    pub error: Option<Value>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct PackageLink {
    pub value: String,
}

impl OperationStatus for PackageExport {
    fn state(&self) -> OperationState {
        match self.properties.status.as_deref() {
            Some("Succeeded") => OperationState::Succeeded,
            Some("Failed") => OperationState::Failed(
                self.properties
                    .error
                    .as_ref()
                    .and_then(|e| e["message"].as_str())
                    .unwrap_or("Package export failed")
                    .to_string(),
            ),
            _ => OperationState::Running,
        }
    }
}

/// Package metadata written into the export
#[derive(Debug, Clone)]
pub struct PackageDetails {
    pub display_name: String,
    pub description: Option<String>,
    pub creator: Option<String>,
    pub source_environment: Option<String>,
}

pub struct PowerAppsClient<'a> {
    client: &'a RestClient,
}

impl<'a> PowerAppsClient<'a> {
    pub fn new(client: &'a RestClient) -> Self {
        Self { client }
    }

    /// Apps of the current user, or of an environment as admin
    pub async fn list_apps(&self, environment: Option<&str>, as_admin: bool) -> Result<Vec<Value>> {
        let path = match (environment, as_admin) {
            (Some(env), true) => format!(
                "providers/Microsoft.PowerApps/scopes/admin/environments/{}/apps",
                env
            ),
            (Some(env), false) => format!(
                "providers/Microsoft.PowerApps/apps?$filter=environment eq '{}'",
                env
            ),
            (None, _) => "providers/Microsoft.PowerApps/apps".to_string(),
        };

        let separator = if path.contains('?') { '&' } else { '?' };
        let url = self.client.powerapps_url(&format!(
            "{}{}api-version={}",
            path, separator, POWERAPPS_API_VERSION
        ));

        self.client.get_all_items(&url).await
    }

    fn package_url(&self, environment: &str, action: &str) -> String {
        self.client.bap_url(&format!(
            "providers/Microsoft.BusinessAppPlatform/environments/{}/{}?api-version={}",
            environment, action, PACKAGE_API_VERSION
        ))
    }

    /// Export an app as a package and return the zip content
    pub async fn export_app(
        &self,
        environment: &str,
        app_name: &str,
        details: &PackageDetails,
        settings: PollSettings,
    ) -> Result<Vec<u8>> {
        let app_resource_id = format!("/providers/Microsoft.PowerApps/apps/{}", app_name);

        let listed: Value = self
            .client
            .post(
                &self.package_url(environment, "listPackageResources"),
                &json!({ "baseResourceIds": [app_resource_id] }),
            )
            .await?;
        let resources = prepare_resources(listed["resources"].clone());

        let included: Vec<String> = resources
            .as_object()
            .map(|r| r.keys().cloned().collect())
            .unwrap_or_default();

        let response = self
            .client
            .post_raw(
                &self.package_url(environment, "exportPackage"),
                &json!({
                    "includedResourceIds": included,
                    "details": {
                        "displayName": details.display_name,
                        "description": details.description,
                        "creator": details.creator,
                        "sourceEnvironment": details.source_environment,
                    },
                    "resources": resources,
                }),
                &[],
            )
            .await?;

        let location = response
            .headers()
            .get("Location")
            .and_then(|v| v.to_str().ok())
            .map(String::from)
            .ok_or_else(|| {
                M365Error::OperationFailed("Export response did not include a Location".into())
            })?;
        debug!(location = %location, "Package export started");

        let export: PackageExport = self
            .client
            .poll_operation(&location, settings, &[])
            .await?;

        let link = export.properties.package_link.ok_or_else(|| {
            M365Error::OperationFailed("Export finished without a package link".into())
        })?;

        self.client.download(&link.value).await
    }
}

/// Mark the app as "Update" and its dependencies as "Existing" so the package can be reimported
fn prepare_resources(mut resources: Value) -> Value {
    if let Some(map) = resources.as_object_mut() {
        for resource in map.values_mut() {
            let creation_type = if resource["type"] == "Microsoft.PowerApps/apps" {
                "Update"
            } else {
                "Existing"
            };
            if let Some(obj) = resource.as_object_mut() {
                obj.insert("suggestedCreationType".into(), json!(creation_type));
            }
        }
    }
    resources
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_export_state() {
        let running: PackageExport =
            serde_json::from_value(json!({"properties": {"status": "Running"}})).unwrap();
        assert_eq!(running.state(), OperationState::Running);

        let done: PackageExport = serde_json::from_value(json!({
            "properties": {"status": "Succeeded", "packageLink": {"value": "https://blob/x.zip"}}
        }))
        .unwrap();
        assert_eq!(done.state(), OperationState::Succeeded);

        let failed: PackageExport = serde_json::from_value(json!({
            "properties": {"status": "Failed", "error": {"message": "Missing connection"}}
        }))
        .unwrap();
        assert_eq!(
            failed.state(),
            OperationState::Failed("Missing connection".into())
        );
    }

    #[test]
    fn test_prepare_resources() {
        let resources = prepare_resources(json!({
            "L1": {"type": "Microsoft.PowerApps/apps", "id": "/providers/Microsoft.PowerApps/apps/abc"},
            "L2": {"type": "Microsoft.PowerApps/apis/connections"}
        }));
        assert_eq!(resources["L1"]["suggestedCreationType"], "Update");
        assert_eq!(resources["L2"]["suggestedCreationType"], "Existing");
    }
}
