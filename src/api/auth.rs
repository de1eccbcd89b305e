use crate::api::GRAPH_RESOURCE;
use crate::config::{AuthType, ConfigManager, TenantConfig, TokenCache};
use crate::error::{M365Error, Result};
use colored::Colorize;
use oauth2::{
    AuthUrl, ClientId, ClientSecret, DeviceAuthorizationUrl, EmptyExtraDeviceAuthorizationFields,
    RefreshToken, Scope, TokenResponse, TokenUrl, basic::BasicClient, basic::BasicTokenResponse,
    reqwest::async_http_client,
};
use std::time::Duration;
use tracing::{debug, info};

const MICROSOFT_AUTHORITY: &str = "https://login.microsoftonline.com";
const OFFLINE_ACCESS: &str = "offline_access";

/// `.default` scope of a resource, e.g. `https://graph.microsoft.com/.default`
pub fn default_scope(resource: &str) -> String {
    format!("{}/.default", resource.trim_end_matches('/'))
}

/// Acquires and caches access tokens per tenant profile and resource
pub struct Authenticator {
    config_manager: ConfigManager,
}

impl Authenticator {
    pub fn new(config_manager: ConfigManager) -> Self {
        Self { config_manager }
    }

    fn oauth_client(tenant: &TenantConfig) -> Result<BasicClient> {
        let auth_url = AuthUrl::new(format!(
            "{}/{}/oauth2/v2.0/authorize",
            MICROSOFT_AUTHORITY, tenant.tenant_id
        ))
        .map_err(|e| M365Error::AuthError(format!("Invalid auth URL: {}", e)))?;

        let token_url = TokenUrl::new(format!(
            "{}/{}/oauth2/v2.0/token",
            MICROSOFT_AUTHORITY, tenant.tenant_id
        ))
        .map_err(|e| M365Error::AuthError(format!("Invalid token URL: {}", e)))?;

        let client_secret = tenant.client_secret.clone().map(ClientSecret::new);

        Ok(BasicClient::new(
            ClientId::new(tenant.client_id.clone()),
            client_secret,
            auth_url,
            Some(token_url),
        )
        .set_auth_type(oauth2::AuthType::RequestBody))
    }

    fn store(
        &self,
        tenant: &TenantConfig,
        resource: &str,
        token: &BasicTokenResponse,
        fallback_refresh: Option<String>,
    ) -> Result<TokenCache> {
        let expires_in = token.expires_in().unwrap_or(Duration::from_secs(3600));
        let token_cache = TokenCache {
            access_token: token.access_token().secret().clone(),
            refresh_token: token
                .refresh_token()
                .map(|t| t.secret().clone())
                .or(fallback_refresh),
            expires_at: chrono::Utc::now() + chrono::Duration::seconds(expires_in.as_secs() as i64),
            tenant_id: tenant.tenant_id.clone(),
            resource: resource.to_string(),
        };

        self.config_manager.save_token(&tenant.name, &token_cache)?;
        Ok(token_cache)
    }

    /// Authenticate using device code flow (interactive)
    pub async fn login_device_code(&self, tenant: &TenantConfig) -> Result<TokenCache> {
        eprintln!(
            "Starting device code authentication for tenant '{}'...",
            tenant.name
        );

        let device_auth_url = DeviceAuthorizationUrl::new(format!(
            "{}/{}/oauth2/v2.0/devicecode",
            MICROSOFT_AUTHORITY, tenant.tenant_id
        ))
        .map_err(|e| M365Error::AuthError(format!("Invalid device auth URL: {}", e)))?;

        let client = Self::oauth_client(tenant)?.set_device_authorization_url(device_auth_url);

        let details: oauth2::DeviceAuthorizationResponse<EmptyExtraDeviceAuthorizationFields> =
            client
                .exchange_device_code()
                .map_err(|e| M365Error::AuthError(format!("Device code exchange failed: {}", e)))?
                .add_scope(Scope::new(default_scope(GRAPH_RESOURCE)))
                .add_scope(Scope::new(OFFLINE_ACCESS.to_string()))
                .request_async(async_http_client)
                .await
                .map_err(|e| {
                    M365Error::AuthError(format!("Device authorization request failed: {}", e))
                })?;

        eprintln!(
            "\nTo sign in, visit {} and enter the code {}\n",
            details.verification_uri().as_str().cyan(),
            details.user_code().secret().bold()
        );

        let token = client
            .exchange_device_access_token(&details)
            .request_async(async_http_client, tokio::time::sleep, None)
            .await
            .map_err(|e| M365Error::AuthError(format!("Token exchange failed: {}", e)))?;

        let token_cache = self.store(tenant, GRAPH_RESOURCE, &token, None)?;
        info!(tenant = %tenant.name, "Device code authentication succeeded");
        Ok(token_cache)
    }

    /// Authenticate using client credentials flow (non-interactive)
    pub async fn login_client_credentials(
        &self,
        tenant: &TenantConfig,
        resource: &str,
    ) -> Result<TokenCache> {
        if tenant.client_secret.is_none() {
            return Err(M365Error::AuthError(
                "Client secret required for client credentials flow".into(),
            ));
        }

        debug!(tenant = %tenant.name, resource, "Requesting client credentials token");

        let token = Self::oauth_client(tenant)?
            .exchange_client_credentials()
            .add_scope(Scope::new(default_scope(resource)))
            .request_async(async_http_client)
            .await
            .map_err(|e| {
                M365Error::AuthError(format!("Client credentials exchange failed: {}", e))
            })?;

        self.store(tenant, resource, &token, None)
    }

    /// Exchange a refresh token for an access token scoped to `resource`
    async fn refresh(
        &self,
        tenant: &TenantConfig,
        refresh_token: String,
        resource: &str,
    ) -> Result<TokenCache> {
        debug!(tenant = %tenant.name, resource, "Refreshing access token");

        let token = Self::oauth_client(tenant)?
            .exchange_refresh_token(&RefreshToken::new(refresh_token.clone()))
            .add_scope(Scope::new(default_scope(resource)))
            .add_scope(Scope::new(OFFLINE_ACCESS.to_string()))
            .request_async(async_http_client)
            .await
            .map_err(|e| M365Error::AuthError(format!("Token refresh failed: {}", e)))?;

        self.store(tenant, resource, &token, Some(refresh_token))
    }

    /// Get a valid access token for `resource` (cache, then client credentials or refresh)
    pub async fn access_token(&self, tenant: &TenantConfig, resource: &str) -> Result<String> {
        match self.config_manager.load_token(&tenant.name, resource) {
            Ok(token) => return Ok(token.access_token),
            Err(M365Error::TokenNotFound) | Err(M365Error::AuthError(_)) => {}
            Err(e) => return Err(e),
        }

        let token = match tenant.auth_type {
            AuthType::ClientCredentials => self.login_client_credentials(tenant, resource).await?,
            AuthType::DeviceCode => {
                let refresh_token = self
                    .find_refresh_token(&tenant.name, resource)?
                    .ok_or(M365Error::TokenNotFound)?;
                self.refresh(tenant, refresh_token, resource).await?
            }
        };

        Ok(token.access_token)
    }

    /// Refresh token of the same resource, else of Graph, else of any cached resource
    fn find_refresh_token(&self, tenant_name: &str, resource: &str) -> Result<Option<String>> {
        for candidate in [resource, GRAPH_RESOURCE] {
            if let Some(token) = self.config_manager.read_token(tenant_name, candidate)? {
                if token.refresh_token.is_some() {
                    return Ok(token.refresh_token);
                }
            }
        }

        Ok(self
            .config_manager
            .cached_tokens(tenant_name)?
            .into_iter()
            .find_map(|t| t.refresh_token))
    }

    /// Logout (delete every cached token of the tenant)
    pub fn logout(&self, tenant_name: &str) -> Result<()> {
        self.config_manager.delete_tokens(tenant_name)?;
        info!(tenant = tenant_name, "Deleted cached tokens");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_scope() {
        assert_eq!(
            default_scope("https://graph.microsoft.com"),
            "https://graph.microsoft.com/.default"
        );
        assert_eq!(
            default_scope("https://service.powerapps.com/"),
            "https://service.powerapps.com/.default"
        );
    }

    #[tokio::test]
    async fn test_cached_token_is_used() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConfigManager::with_dir(dir.path()).unwrap();
        let tenant = TenantConfig {
            name: "contoso".into(),
            tenant_id: "tid".into(),
            client_id: "cid".into(),
            client_secret: None,
            auth_type: AuthType::DeviceCode,
            description: None,
            spo_url: None,
        };
        config
            .save_token(
                "contoso",
                &TokenCache {
                    access_token: "cached".into(),
                    refresh_token: None,
                    expires_at: chrono::Utc::now() + chrono::Duration::hours(1),
                    tenant_id: "tid".into(),
                    resource: GRAPH_RESOURCE.into(),
                },
            )
            .unwrap();

        let auth = Authenticator::new(config);
        assert_eq!(
            auth.access_token(&tenant, GRAPH_RESOURCE).await.unwrap(),
            "cached"
        );
        // No refresh token anywhere: the user has to log in again
        assert!(matches!(
            auth.access_token(&tenant, "https://api.bap.microsoft.com").await,
            Err(M365Error::TokenNotFound)
        ));
    }
}
