pub mod auth;
pub mod entra;
pub mod odata;
pub mod operation;
pub mod power_apps;
pub mod power_platform;
pub mod purview;
pub mod spo;

use crate::config::{ConfigManager, TenantConfig};
use crate::error::{M365Error, Result};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Method, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

pub const GRAPH_RESOURCE: &str = "https://graph.microsoft.com";
pub const BAP_RESOURCE: &str = "https://api.bap.microsoft.com";
pub const POWERAPPS_API: &str = "https://api.powerapps.com";
pub const POWERAPPS_RESOURCE: &str = "https://service.powerapps.com/";

/// Accept header SharePoint REST needs to return plain JSON
pub const SPO_NOMETADATA: &str = "application/json;odata=nometadata";

/// Base URLs of the services we call; overridable so tests can point at a mock server
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub graph: String,
    pub bap: String,
    pub powerapps: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            graph: GRAPH_RESOURCE.to_string(),
            bap: BAP_RESOURCE.to_string(),
            powerapps: POWERAPPS_API.to_string(),
        }
    }
}

impl Endpoints {
    /// Point every service at the same base URL
    pub fn single(base_url: &str) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        Self {
            graph: base_url.clone(),
            bap: base_url.clone(),
            powerapps: base_url,
        }
    }
}

/// Where access tokens come from
#[derive(Debug, Clone)]
pub enum TokenSource {
    /// A fixed bearer token used for every resource
    Static(String),
    /// Tokens acquired and cached per resource for a tenant profile
    Tenant {
        config: ConfigManager,
        tenant: TenantConfig,
    },
}

/// Request body variants
#[derive(Debug, Clone, Copy)]
pub enum Body<'a> {
    Empty,
    Json(&'a serde_json::Value),
    Text(&'a str, &'a str),
}

/// REST client shared by Graph, SharePoint and Power Platform calls
#[derive(Debug, Clone)]
pub struct RestClient {
    client: Client,
    tokens: TokenSource,
    endpoints: Endpoints,
}

impl RestClient {
    pub fn new(tokens: TokenSource, endpoints: Endpoints) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("m365-cli/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            tokens,
            endpoints,
        })
    }

    /// Client using a fixed access token
    pub fn with_token(token: impl Into<String>, endpoints: Endpoints) -> Result<Self> {
        Self::new(TokenSource::Static(token.into()), endpoints)
    }

    /// Graph v1.0 URL for a relative path
    pub fn graph_url(&self, path: &str) -> String {
        format!(
            "{}/v1.0/{}",
            self.endpoints.graph.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub fn bap_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.endpoints.bap.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub fn powerapps_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.endpoints.powerapps.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Token audience for a request URL
    fn resource_for(&self, url: &str) -> String {
        if url.starts_with(&self.endpoints.graph) {
            GRAPH_RESOURCE.to_string()
        } else if url.starts_with(&self.endpoints.bap) {
            BAP_RESOURCE.to_string()
        } else if url.starts_with(&self.endpoints.powerapps) {
            POWERAPPS_RESOURCE.to_string()
        } else {
            origin(url).unwrap_or_else(|| url.to_string())
        }
    }

    async fn access_token(&self, url: &str) -> Result<String> {
        match &self.tokens {
            TokenSource::Static(token) => Ok(token.clone()),
            TokenSource::Tenant { config, tenant } => {
                let resource = self.resource_for(url);
                auth::Authenticator::new(config.clone())
                    .access_token(tenant, &resource)
                    .await
            }
        }
    }

    /// Send one request and turn a non-success status into the upstream error
    pub async fn execute(
        &self,
        method: Method,
        url: &str,
        body: Body<'_>,
        headers: &[(&str, &str)],
    ) -> Result<Response> {
        let token = self.access_token(url).await?;
        let mut request = self.client.request(method.clone(), url).bearer_auth(&token);

        if !headers
            .iter()
            .any(|(name, _)| name.eq_ignore_ascii_case(ACCEPT.as_str()))
        {
            request = request.header(ACCEPT, "application/json");
        }
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        request = match body {
            Body::Empty => request,
            Body::Json(json) => request.json(json),
            Body::Text(text, content_type) => request
                .header(CONTENT_TYPE, content_type)
                .body(text.to_string()),
        };

        debug!(%method, url, "Sending request");
        let response = request.send().await?;
        let status = response.status();
        debug!(%method, url, status = status.as_u16(), "Received response");

        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!(url, "Request throttled by the service");
        }

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            debug!(url, body = %error_text, "Request failed");
            return Err(M365Error::from_response(status.as_u16(), &error_text));
        }

        Ok(response)
    }

    /// GET a JSON resource
    pub async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        self.get_with_headers(url, &[]).await
    }

    pub async fn get_with_headers<T: DeserializeOwned>(
        &self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<T> {
        let response = self.execute(Method::GET, url, Body::Empty, headers).await?;
        parse_json(response).await
    }

    /// POST a JSON body and parse the JSON response
    pub async fn post<B: Serialize, R: DeserializeOwned>(&self, url: &str, body: &B) -> Result<R> {
        self.post_with_headers(url, body, &[]).await
    }

    pub async fn post_with_headers<B: Serialize, R: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
        headers: &[(&str, &str)],
    ) -> Result<R> {
        let body = serde_json::to_value(body)?;
        let response = self
            .execute(Method::POST, url, Body::Json(&body), headers)
            .await?;
        parse_json(response).await
    }

    /// POST and hand back the raw response (for Location headers of long-running operations)
    pub async fn post_raw(
        &self,
        url: &str,
        body: &impl Serialize,
        headers: &[(&str, &str)],
    ) -> Result<Response> {
        let body = serde_json::to_value(body)?;
        self.execute(Method::POST, url, Body::Json(&body), headers)
            .await
    }

    pub async fn delete(&self, url: &str) -> Result<()> {
        self.execute(Method::DELETE, url, Body::Empty, &[]).await?;
        Ok(())
    }

    /// Download a pre-signed blob (package links carry their own SAS token)
    pub async fn download(&self, url: &str) -> Result<Vec<u8>> {
        debug!(url, "Downloading file");
        let response = self.client.get(url).send().await?;
        let status = response.status();

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(M365Error::from_response(status.as_u16(), &error_text));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

/// Deserialize a response body, treating an empty body as JSON `null`
async fn parse_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let text = response.text().await?;
    let text = if text.trim().is_empty() { "null" } else { &text };
    Ok(serde_json::from_str(text)?)
}

/// `scheme://host[:port]` of an absolute URL
pub fn origin(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    Some(match parsed.port() {
        Some(port) => format!("{}://{}:{}", parsed.scheme(), host, port),
        None => format!("{}://{}", parsed.scheme(), host),
    })
}

/// Escape a value for use inside an OData string literal (`'...'`)
pub fn odata_string(value: &str) -> String {
    value.replace('\'', "''")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin() {
        assert_eq!(
            origin("https://contoso.sharepoint.com/sites/marketing").as_deref(),
            Some("https://contoso.sharepoint.com")
        );
        assert_eq!(
            origin("http://127.0.0.1:8080/x").as_deref(),
            Some("http://127.0.0.1:8080")
        );
        assert!(origin("not a url").is_none());
    }

    #[test]
    fn test_resource_for_url() {
        let client = RestClient::with_token("t", Endpoints::default()).unwrap();
        assert_eq!(
            client.resource_for("https://graph.microsoft.com/v1.0/users"),
            GRAPH_RESOURCE
        );
        assert_eq!(
            client.resource_for(
                "https://api.bap.microsoft.com/providers/Microsoft.BusinessAppPlatform/environments"
            ),
            BAP_RESOURCE
        );
        assert_eq!(
            client.resource_for("https://api.powerapps.com/providers/Microsoft.PowerApps/apps"),
            POWERAPPS_RESOURCE
        );
        assert_eq!(
            client.resource_for("https://contoso.crm4.dynamics.com/api/data/v9.0/solutions"),
            "https://contoso.crm4.dynamics.com"
        );
    }

    #[test]
    fn test_graph_urls() {
        let client = RestClient::with_token("t", Endpoints::single("http://localhost:1/")).unwrap();
        assert_eq!(client.graph_url("/users"), "http://localhost:1/v1.0/users");
        assert_eq!(
            client.bap_url("providers/x"),
            "http://localhost:1/providers/x"
        );
    }

    #[test]
    fn test_odata_string_escapes_quotes() {
        assert_eq!(odata_string("O'Brien"), "O''Brien");
    }
}
