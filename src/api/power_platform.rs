//! Power Platform admin (BAP) and Dataverse integration
//!
//! Environments come from `api.bap.microsoft.com`. Solutions live in each
//! environment's Dataverse instance, whose URL is read from the environment's
//! `linkedEnvironmentMetadata.instanceApiUrl`.

use crate::api::operation::{OperationState, OperationStatus, PollSettings};
use crate::api::RestClient;
use crate::error::{M365Error, Result};
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

const BAP_API_VERSION: &str = "2020-10-01";
const DATAVERSE_API: &str = "api/data/v9.0";

/// Dataverse `asyncoperation` state codes
const ASYNC_STATE_COMPLETED: i64 = 3;
const ASYNC_STATUS_SUCCEEDED: i64 = 30;

/// Status of a Dataverse `asyncoperations(id)` record
#[derive(Debug, Deserialize, Serialize)]
pub struct AsyncOperation {
    #[serde(default)]
    pub asyncoperationid: Option<String>,
    pub statecode: i64,
    #[serde(default)]
    pub statuscode: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub friendlymessage: Option<String>,
}

impl OperationStatus for AsyncOperation {
    fn state(&self) -> OperationState {
        if self.statecode != ASYNC_STATE_COMPLETED {
            return OperationState::Running;
        }

        if self.statuscode == Some(ASYNC_STATUS_SUCCEEDED) {
            OperationState::Succeeded
        } else {
            OperationState::Failed(
                self.friendlymessage
                    .clone()
                    .or_else(|| self.message.clone())
                    .unwrap_or_else(|| format!("status code {:?}", self.statuscode)),
            )
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ExportSolutionAsyncResponse {
    async_operation_id: String,
    export_job_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ExportSolutionFile {
    export_solution_file: String,
}

pub struct PowerPlatformClient<'a> {
    client: &'a RestClient,
}

impl<'a> PowerPlatformClient<'a> {
    pub fn new(client: &'a RestClient) -> Self {
        Self { client }
    }

    fn environments_url(&self, as_admin: bool, name: Option<&str>) -> String {
        let scope = if as_admin { "scopes/admin/" } else { "" };
        let name = name.map(|n| format!("/{}", n)).unwrap_or_default();
        self.client.bap_url(&format!(
            "providers/Microsoft.BusinessAppPlatform/{}environments{}?api-version={}",
            scope, name, BAP_API_VERSION
        ))
    }

    pub async fn list_environments(&self, as_admin: bool) -> Result<Vec<Value>> {
        self.client
            .get_all_items(&self.environments_url(as_admin, None))
            .await
    }

    pub async fn get_environment(&self, name: &str, as_admin: bool) -> Result<Value> {
        self.client
            .get(&self.environments_url(as_admin, Some(name)))
            .await
    }

    /// Dataverse Web API URL of an environment, e.g. `https://org.crm4.dynamics.com`
    pub async fn dynamics_api_url(&self, environment: &str, as_admin: bool) -> Result<String> {
        let env = self.get_environment(environment, as_admin).await?;
        let url = env["properties"]["linkedEnvironmentMetadata"]["instanceApiUrl"]
            .as_str()
            .ok_or_else(|| {
                M365Error::ValidationError(format!(
                    "Environment '{}' has no Dataverse database",
                    environment
                ))
            })?;

        debug!(environment, url, "Resolved Dataverse instance");
        Ok(url.trim_end_matches('/').to_string())
    }

    /// Visible solutions of a Dataverse instance
    pub async fn list_solutions(&self, instance_url: &str) -> Result<Vec<Value>> {
        let url = format!(
            "{}/{}/solutions?$filter=isvisible eq true&$expand=publisherid($select=friendlyname)&$select=solutionid,uniquename,version,publisherid,installedon,solutionpackageversion,friendlyname,versionnumber&api-version=9.1",
            instance_url, DATAVERSE_API
        );
        self.client.get_all_items(&url).await
    }

    /// Export a solution asynchronously and return the zip file content
    pub async fn export_solution(
        &self,
        instance_url: &str,
        solution_name: &str,
        managed: bool,
        settings: PollSettings,
    ) -> Result<Vec<u8>> {
        let started: ExportSolutionAsyncResponse = self
            .client
            .post(
                &format!("{}/{}/ExportSolutionAsync", instance_url, DATAVERSE_API),
                &serde_json::json!({
                    "SolutionName": solution_name,
                    "Managed": managed,
                }),
            )
            .await?;
        debug!(
            operation = %started.async_operation_id,
            job = %started.export_job_id,
            "Solution export started"
        );

        let status_url = format!(
            "{}/{}/asyncoperations({})?$select=asyncoperationid,statecode,statuscode,message,friendlymessage",
            instance_url, DATAVERSE_API, started.async_operation_id
        );
        self.client
            .poll_operation::<AsyncOperation>(&status_url, settings, &[])
            .await?;

        let file: ExportSolutionFile = self
            .client
            .post(
                &format!("{}/{}/DownloadSolutionExportData", instance_url, DATAVERSE_API),
                &serde_json::json!({ "ExportJobId": started.export_job_id }),
            )
            .await?;

        base64::engine::general_purpose::STANDARD
            .decode(file.export_solution_file.as_bytes())
            .map_err(|e| M365Error::OperationFailed(format!("Invalid solution file: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn operation(statecode: i64, statuscode: Option<i64>) -> AsyncOperation {
        AsyncOperation {
            asyncoperationid: None,
            statecode,
            statuscode,
            message: Some("raw".into()),
            friendlymessage: None,
        }
    }

    #[test]
    fn test_async_operation_states() {
        assert_eq!(operation(0, Some(0)).state(), OperationState::Running);
        assert_eq!(operation(2, Some(20)).state(), OperationState::Running);
        assert_eq!(operation(3, Some(30)).state(), OperationState::Succeeded);
        assert_eq!(
            operation(3, Some(31)).state(),
            OperationState::Failed("raw".into())
        );
    }

    #[test]
    fn test_environments_url() {
        let client = RestClient::with_token("t", crate::api::Endpoints::default()).unwrap();
        let pp = PowerPlatformClient::new(&client);
        assert_eq!(
            pp.environments_url(true, Some("Default-1")),
            "https://api.bap.microsoft.com/providers/Microsoft.BusinessAppPlatform/scopes/admin/environments/Default-1?api-version=2020-10-01"
        );
        assert_eq!(
            pp.environments_url(false, None),
            "https://api.bap.microsoft.com/providers/Microsoft.BusinessAppPlatform/environments?api-version=2020-10-01"
        );
    }
}
