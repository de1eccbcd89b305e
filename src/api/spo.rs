//! SharePoint REST and CSOM (ClientSvc) integration
//!
//! REST calls ask for `odata=nometadata` JSON. CSOM calls post an XML query to
//! `_vti_bin/client.svc/ProcessQuery` on the tenant admin site with a form
//! digest, and report failures in the first element's `ErrorInfo`, even on
//! HTTP 200.

use crate::api::operation::{OperationState, OperationStatus, PollSettings, poll_until};
use crate::api::{Body, RestClient, SPO_NOMETADATA, origin};
use crate::error::{M365Error, Result};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const CLIENT_QUERY_NS: &str = "http://schemas.microsoft.com/sharepoint/clientquery/2009";
/// TypeId of `Microsoft.Online.SharePoint.TenantAdministration.Tenant`
const TENANT_TYPE_ID: &str = "{268004ae-ef6b-4e9b-8425-127220d84719}";

/// Site designs available for communication sites
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteDesign {
    Topic,
    Showcase,
    Blank,
}

impl SiteDesign {
    pub const ALL: &'static [&'static str] = &["Topic", "Showcase", "Blank"];

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "topic" => Some(SiteDesign::Topic),
            "showcase" => Some(SiteDesign::Showcase),
            "blank" => Some(SiteDesign::Blank),
            _ => None,
        }
    }

    pub fn id(&self) -> &'static str {
        match self {
            SiteDesign::Topic => "96c933ac-3698-44c7-9f4a-5fd17d71af9e",
            SiteDesign::Showcase => "6142d2a0-63a5-4ba0-aede-d9fefca2c767",
            SiteDesign::Blank => "f6cc5403-0d63-442e-96c0-285923709ffc",
        }
    }
}

/// Body of `_api/SPSiteManager/create`
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateSiteRequest {
    pub title: String,
    pub url: String,
    pub lcid: u32,
    pub web_template: String,
    pub site_design_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

/// Response of SPSiteManager create/status
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SiteCreationStatus {
    #[serde(default)]
    pub site_id: Option<String>,
    pub site_status: u8,
    #[serde(default)]
    pub site_url: Option<String>,
}

impl OperationStatus for SiteCreationStatus {
    fn state(&self) -> OperationState {
        match self.site_status {
            1 => OperationState::Running,
            2 => OperationState::Succeeded,
            0 => OperationState::Failed("Site not found".into()),
            _ => OperationState::Failed("Site creation failed".into()),
        }
    }
}

/// Tenant administration operation returned by CSOM
#[derive(Debug, Serialize, Deserialize)]
pub struct SpoOperation {
    #[serde(rename = "_ObjectIdentity_", default)]
    pub object_identity: Option<String>,
    #[serde(rename = "IsComplete", default)]
    pub is_complete: bool,
    /// Milliseconds to wait before asking again
    #[serde(rename = "PollingInterval", default)]
    pub polling_interval: u64,
}

impl OperationStatus for SpoOperation {
    fn state(&self) -> OperationState {
        if self.is_complete {
            OperationState::Succeeded
        } else {
            OperationState::Running
        }
    }

    fn next_interval(&self) -> Option<Duration> {
        (self.polling_interval > 0).then(|| Duration::from_millis(self.polling_interval))
    }
}

#[derive(Debug, Deserialize)]
struct ContextInfo {
    #[serde(rename = "FormDigestValue")]
    form_digest_value: String,
}

/// Tenant admin site of any SharePoint URL, e.g.
/// `https://contoso.sharepoint.com/sites/x` → `https://contoso-admin.sharepoint.com`
///
/// URLs outside `*.sharepoint.com` map to their own origin.
pub fn tenant_admin_url(url: &str) -> Result<String> {
    let base = origin(url)
        .ok_or_else(|| M365Error::ValidationError(format!("'{}' is not a valid URL", url)))?;

    let Some((scheme, host)) = base.split_once("://") else {
        return Ok(base);
    };

    match host.split_once('.') {
        Some((tenant, domain))
            if domain.starts_with("sharepoint.") && !tenant.ends_with("-admin") =>
        {
            let tenant = tenant.trim_end_matches("-my");
            Ok(format!("{}://{}-admin.{}", scheme, tenant, domain))
        }
        _ => Ok(base),
    }
}

/// Escape text for an XML element or attribute value
pub fn xml_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            '\n' => escaped.push_str("&#xA;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn client_query(actions: &str, object_paths: &str) -> String {
    format!(
        r#"<Request AddExpandoFieldTypeSuffix="true" SchemaVersion="15.0.0.0" LibraryVersion="16.0.0.0" ApplicationName="m365-cli" xmlns="{}"><Actions>{}</Actions><ObjectPaths>{}</ObjectPaths></Request>"#,
        CLIENT_QUERY_NS, actions, object_paths
    )
}

/// CSOM query calling `Tenant.RemoveSite(url)` and returning the SpoOperation
pub fn remove_site_query(site_url: &str) -> String {
    client_query(
        r#"<ObjectPath Id="55" ObjectPathId="54"/><ObjectPath Id="57" ObjectPathId="56"/><Query Id="58" ObjectPathId="56"><Query SelectAllProperties="true"><Properties/></Query></Query>"#,
        &format!(
            r#"<Constructor Id="54" TypeId="{}"/><Method Id="56" ParentId="54" Name="RemoveSite"><Parameters><Parameter Type="String">{}</Parameter></Parameters></Method>"#,
            TENANT_TYPE_ID,
            xml_escape(site_url)
        ),
    )
}

/// CSOM query re-reading an SpoOperation by identity
pub fn operation_status_query(object_identity: &str) -> String {
    client_query(
        r#"<Query Id="188" ObjectPathId="184"><Query SelectAllProperties="false"><Properties><Property Name="IsComplete" ScalarProperty="true"/><Property Name="PollingInterval" ScalarProperty="true"/></Properties></Query></Query>"#,
        &format!(
            r#"<Identity Id="184" Name="{}"/>"#,
            xml_escape(object_identity)
        ),
    )
}

/// SharePoint operations
pub struct SpoClient<'a> {
    client: &'a RestClient,
}

impl<'a> SpoClient<'a> {
    pub fn new(client: &'a RestClient) -> Self {
        Self { client }
    }

    fn api_url(web_url: &str, path: &str) -> String {
        format!(
            "{}/_api/{}",
            web_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// GET `_api/web` of a site
    pub async fn get_web(&self, web_url: &str) -> Result<serde_json::Value> {
        self.client
            .get_with_headers(
                &Self::api_url(web_url, "web"),
                &[("accept", SPO_NOMETADATA)],
            )
            .await
    }

    /// All lists of a web, following `odata.nextLink`
    pub async fn list_lists(
        &self,
        web_url: &str,
        select: Option<&str>,
    ) -> Result<Vec<serde_json::Value>> {
        let mut url = Self::api_url(web_url, "web/lists");
        if let Some(select) = select {
            url.push_str(&format!("?$select={}", urlencoding::encode(select)));
        }

        self.client
            .get_all_items_with_headers(&url, &[("accept", SPO_NOMETADATA)])
            .await
    }

    /// Request digest needed by CSOM and some POST endpoints
    pub async fn form_digest(&self, site_url: &str) -> Result<String> {
        let info: ContextInfo = self
            .client
            .post_with_headers(
                &Self::api_url(site_url, "contextinfo"),
                &serde_json::json!({}),
                &[("accept", SPO_NOMETADATA)],
            )
            .await?;
        Ok(info.form_digest_value)
    }

    /// Execute a CSOM query and return the response array
    pub async fn process_query(
        &self,
        site_url: &str,
        xml: &str,
        form_digest: &str,
    ) -> Result<Vec<serde_json::Value>> {
        let url = format!(
            "{}/_vti_bin/client.svc/ProcessQuery",
            site_url.trim_end_matches('/')
        );

        let response = self
            .client
            .execute(
                Method::POST,
                &url,
                Body::Text(xml, "text/xml"),
                &[("X-RequestDigest", form_digest)],
            )
            .await?;
        let text = response.text().await?;

        if let Some((_, message)) = crate::error::upstream_message(&text) {
            return Err(M365Error::ApiError {
                status: 200,
                message,
            });
        }

        let items: Vec<serde_json::Value> = serde_json::from_str(&text)?;
        Ok(items)
    }

    /// Create a communication site through SPSiteManager
    pub async fn create_site(
        &self,
        admin_or_root_url: &str,
        request: &CreateSiteRequest,
    ) -> Result<SiteCreationStatus> {
        self.client
            .post_with_headers(
                &Self::api_url(admin_or_root_url, "SPSiteManager/create"),
                &serde_json::json!({ "request": request }),
                &[("accept", SPO_NOMETADATA)],
            )
            .await
    }

    /// Wait until SPSiteManager reports the site as ready
    pub async fn wait_for_site(
        &self,
        root_url: &str,
        site_url: &str,
        settings: PollSettings,
    ) -> Result<SiteCreationStatus> {
        let status_url = format!(
            "{}?url='{}'",
            Self::api_url(root_url, "SPSiteManager/status"),
            urlencoding::encode(site_url)
        );

        let client = self.client;
        let status_url = status_url.as_str();
        poll_until(settings, site_url, move || {
            client.get_with_headers::<SiteCreationStatus>(status_url, &[("accept", SPO_NOMETADATA)])
        })
        .await
    }

    /// Send a site to the tenant recycle bin; returns the CSOM operation
    pub async fn remove_site(&self, admin_url: &str, site_url: &str) -> Result<SpoOperation> {
        let digest = self.form_digest(admin_url).await?;
        let response = self
            .process_query(admin_url, &remove_site_query(site_url), &digest)
            .await?;
        last_object(response)
    }

    /// Poll an SpoOperation until `IsComplete`, waiting the `PollingInterval` of the latest answer
    pub async fn wait_for_operation(
        &self,
        admin_url: &str,
        operation: SpoOperation,
        max_attempts: u32,
    ) -> Result<SpoOperation> {
        if operation.is_complete {
            return Ok(operation);
        }

        let identity = operation.object_identity.clone().ok_or_else(|| {
            M365Error::OperationFailed("Operation has no object identity to poll".into())
        })?;
        let interval = Duration::from_millis(operation.polling_interval.max(1));
        debug!(identity = %identity, ?interval, "Waiting for SharePoint operation");

        tokio::time::sleep(interval).await;

        let query = operation_status_query(&identity);
        let query = query.as_str();
        let this = self;
        poll_until(
            PollSettings::new(interval, max_attempts),
            "SharePoint operation",
            move || async move {
                // The digest may expire during long operations, so fetch one per poll
                let digest = this.form_digest(admin_url).await?;
                let response = this.process_query(admin_url, query, &digest).await?;
                last_object::<SpoOperation>(response)
            },
        )
        .await
    }
}

/// The last element of a CSOM response holds the queried object
fn last_object<T: serde::de::DeserializeOwned>(response: Vec<serde_json::Value>) -> Result<T> {
    let last = response
        .into_iter()
        .next_back()
        .filter(|v| v.is_object())
        .ok_or_else(|| M365Error::OperationFailed("Unexpected ClientSvc response".into()))?;
    Ok(serde_json::from_value(last)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tenant_admin_url() {
        assert_eq!(
            tenant_admin_url("https://contoso.sharepoint.com/sites/marketing").unwrap(),
            "https://contoso-admin.sharepoint.com"
        );
        assert_eq!(
            tenant_admin_url("https://contoso-admin.sharepoint.com").unwrap(),
            "https://contoso-admin.sharepoint.com"
        );
        assert_eq!(
            tenant_admin_url("https://contoso-my.sharepoint.com/personal/x").unwrap(),
            "https://contoso-admin.sharepoint.com"
        );
        assert_eq!(
            tenant_admin_url("https://contoso.sharepoint.us/sites/x").unwrap(),
            "https://contoso-admin.sharepoint.us"
        );
        assert_eq!(
            tenant_admin_url("http://127.0.0.1:9000/sites/x").unwrap(),
            "http://127.0.0.1:9000"
        );
        assert!(tenant_admin_url("contoso").is_err());
    }

    #[test]
    fn test_xml_escape() {
        assert_eq!(
            xml_escape("a&b<c>\"d'\ne"),
            "a&amp;b&lt;c&gt;&quot;d&apos;&#xA;e"
        );
    }

    #[test]
    fn test_remove_site_query_contains_escaped_url() {
        let query = remove_site_query("https://contoso.sharepoint.com/sites/r&d");
        assert!(query.contains(r#"Name="RemoveSite""#));
        assert!(query.contains("https://contoso.sharepoint.com/sites/r&amp;d"));
        assert!(query.contains(TENANT_TYPE_ID));
    }

    #[test]
    fn test_spo_operation_state() {
        let operation: SpoOperation = serde_json::from_str(
            r#"{"_ObjectType_":"Microsoft.Online.SharePoint.TenantAdministration.SpoOperation","_ObjectIdentity_":"abc\n123","IsComplete":false,"PollingInterval":15000}"#,
        )
        .unwrap();
        assert_eq!(operation.state(), OperationState::Running);
        assert_eq!(operation.polling_interval, 15000);
        assert_eq!(operation.next_interval(), Some(Duration::from_millis(15000)));
        assert!(operation_status_query(operation.object_identity.as_deref().unwrap())
            .contains("abc&#xA;123"));
    }

    #[test]
    fn test_spo_operation_without_interval_uses_settings() {
        let operation: SpoOperation =
            serde_json::from_str(r#"{"_ObjectIdentity_":"id","IsComplete":false}"#).unwrap();
        assert_eq!(operation.next_interval(), None);
    }

    #[test]
    fn test_site_creation_status() {
        let status = |s| SiteCreationStatus {
            site_id: None,
            site_status: s,
            site_url: None,
        };
        assert_eq!(status(1).state(), OperationState::Running);
        assert_eq!(status(2).state(), OperationState::Succeeded);
        assert!(matches!(status(3).state(), OperationState::Failed(_)));
        assert!(matches!(status(0).state(), OperationState::Failed(_)));
    }

    #[test]
    fn test_site_design() {
        assert_eq!(SiteDesign::parse("showcase"), Some(SiteDesign::Showcase));
        assert_eq!(SiteDesign::parse("Topic").unwrap().id(), "96c933ac-3698-44c7-9f4a-5fd17d71af9e");
        assert!(SiteDesign::parse("team").is_none());
    }

    #[test]
    fn test_last_object() {
        let response: Vec<serde_json::Value> = serde_json::from_str(
            r#"[{"SchemaVersion":"15.0.0.0","ErrorInfo":null},55,{"IsNull":false},58,{"_ObjectIdentity_":"id","IsComplete":true,"PollingInterval":1000}]"#,
        )
        .unwrap();
        let operation: SpoOperation = last_object(response).unwrap();
        assert!(operation.is_complete);
    }
}
