//! Entra ID (Azure AD) Graph integration: users, groups, app registrations, policies

use crate::api::{RestClient, odata_string};
use crate::error::{M365Error, Result};
use serde_json::Value;

/// Group flavors as Entra ID reports them through `groupTypes`/`mailEnabled`/`securityEnabled`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupType {
    Microsoft365,
    Security,
    Distribution,
    MailEnabledSecurity,
}

impl GroupType {
    pub const ALL: &'static [&'static str] = &[
        "microsoft365",
        "security",
        "distribution",
        "mailEnabledSecurity",
    ];

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "microsoft365" => Some(GroupType::Microsoft365),
            "security" => Some(GroupType::Security),
            "distribution" => Some(GroupType::Distribution),
            "mailenabledsecurity" => Some(GroupType::MailEnabledSecurity),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            GroupType::Microsoft365 => "Microsoft 365",
            GroupType::Security => "Security",
            GroupType::Distribution => "Distribution",
            GroupType::MailEnabledSecurity => "Mail enabled security",
        }
    }

    /// Type of a Graph group object, if it is one of the known flavors
    pub fn of(group: &Value) -> Option<Self> {
        [
            GroupType::Microsoft365,
            GroupType::Security,
            GroupType::Distribution,
            GroupType::MailEnabledSecurity,
        ]
        .into_iter()
        .find(|t| t.matches(group))
    }

    /// Whether a Graph group object is of this type
    pub fn matches(&self, group: &Value) -> bool {
        let unified = group["groupTypes"]
            .as_array()
            .is_some_and(|types| types.iter().any(|t| t == "Unified"));
        let mail_enabled = group["mailEnabled"].as_bool().unwrap_or(false);
        let security_enabled = group["securityEnabled"].as_bool().unwrap_or(false);

        match self {
            GroupType::Microsoft365 => unified,
            GroupType::Security => !unified && security_enabled && !mail_enabled,
            GroupType::Distribution => !unified && mail_enabled && !security_enabled,
            GroupType::MailEnabledSecurity => !unified && mail_enabled && security_enabled,
        }
    }
}

/// Entra ID policy kinds and whether Graph returns a single object or a collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyType {
    ActivityBasedTimeout,
    Authorization,
    AuthenticationMethods,
    ClaimsMapping,
    HomeRealmDiscovery,
    IdentitySecurityDefaultsEnforcement,
    TokenIssuance,
    TokenLifetime,
}

impl PolicyType {
    pub const ALL: &'static [PolicyType] = &[
        PolicyType::ActivityBasedTimeout,
        PolicyType::Authorization,
        PolicyType::AuthenticationMethods,
        PolicyType::ClaimsMapping,
        PolicyType::HomeRealmDiscovery,
        PolicyType::IdentitySecurityDefaultsEnforcement,
        PolicyType::TokenIssuance,
        PolicyType::TokenLifetime,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PolicyType::ActivityBasedTimeout => "activityBasedTimeout",
            PolicyType::Authorization => "authorization",
            PolicyType::AuthenticationMethods => "authenticationMethods",
            PolicyType::ClaimsMapping => "claimsMapping",
            PolicyType::HomeRealmDiscovery => "homeRealmDiscovery",
            PolicyType::IdentitySecurityDefaultsEnforcement => {
                "identitySecurityDefaultsEnforcement"
            }
            PolicyType::TokenIssuance => "tokenIssuance",
            PolicyType::TokenLifetime => "tokenLifetime",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.name().eq_ignore_ascii_case(value))
    }

    /// Path under `policies/`
    pub fn endpoint(&self) -> &'static str {
        match self {
            PolicyType::ActivityBasedTimeout => "activityBasedTimeoutPolicies",
            PolicyType::Authorization => "authorizationPolicy",
            PolicyType::AuthenticationMethods => "authenticationMethodsPolicy",
            PolicyType::ClaimsMapping => "claimsMappingPolicies",
            PolicyType::HomeRealmDiscovery => "homeRealmDiscoveryPolicies",
            PolicyType::IdentitySecurityDefaultsEnforcement => {
                "identitySecurityDefaultsEnforcementPolicy"
            }
            PolicyType::TokenIssuance => "tokenIssuancePolicies",
            PolicyType::TokenLifetime => "tokenLifetimePolicies",
        }
    }

    /// Singleton policies come back as one object instead of a `value` collection
    pub fn is_singleton(&self) -> bool {
        matches!(
            self,
            PolicyType::Authorization
                | PolicyType::AuthenticationMethods
                | PolicyType::IdentitySecurityDefaultsEnforcement
        )
    }
}

/// Entra ID operations
pub struct EntraClient<'a> {
    client: &'a RestClient,
}

impl<'a> EntraClient<'a> {
    pub fn new(client: &'a RestClient) -> Self {
        Self { client }
    }

    pub async fn list_users(
        &self,
        properties: Option<&str>,
        filter: Option<&str>,
    ) -> Result<Vec<Value>> {
        let mut query = Vec::new();
        if let Some(properties) = properties {
            query.push(format!("$select={}", urlencoding::encode(properties)));
        }
        if let Some(filter) = filter {
            query.push(format!("$filter={}", urlencoding::encode(filter)));
        }

        let mut url = self.client.graph_url("users");
        if !query.is_empty() {
            url = format!("{}?{}", url, query.join("&"));
        }

        self.client.get_all_items(&url).await
    }

    /// Get a user by object id or user principal name
    pub async fn get_user(&self, id_or_upn: &str, properties: Option<&str>) -> Result<Value> {
        let mut url = self
            .client
            .graph_url(&format!("users/{}", urlencoding::encode(id_or_upn)));
        if let Some(properties) = properties {
            url = format!("{}?$select={}", url, urlencoding::encode(properties));
        }
        self.client.get(&url).await
    }

    pub async fn list_groups(&self, group_type: Option<GroupType>) -> Result<Vec<Value>> {
        let groups: Vec<Value> = self
            .client
            .get_all_items(&self.client.graph_url("groups"))
            .await?;

        Ok(match group_type {
            Some(group_type) => groups.into_iter().filter(|g| group_type.matches(g)).collect(),
            None => groups,
        })
    }

    pub async fn get_group(&self, id: &str) -> Result<Value> {
        self.client
            .get(&self.client.graph_url(&format!("groups/{}", id)))
            .await
    }

    /// Resolve a group by display name; exactly one group must match
    pub async fn get_group_by_name(&self, display_name: &str) -> Result<Value> {
        self.single_by_display_name("groups", "group", display_name)
            .await
    }

    pub async fn delete_group(&self, id: &str) -> Result<()> {
        self.client
            .delete(&self.client.graph_url(&format!("groups/{}", id)))
            .await
    }

    pub async fn list_apps(&self) -> Result<Vec<Value>> {
        self.client
            .get_all_items(&self.client.graph_url("applications"))
            .await
    }

    /// App registration by object id
    pub async fn get_app(&self, object_id: &str) -> Result<Value> {
        self.client
            .get(&self.client.graph_url(&format!("applications/{}", object_id)))
            .await
    }

    /// App registration by application (client) id
    pub async fn get_app_by_app_id(&self, app_id: &str) -> Result<Value> {
        self.client
            .get(
                &self
                    .client
                    .graph_url(&format!("applications(appId='{}')", app_id)),
            )
            .await
    }

    pub async fn get_app_by_name(&self, name: &str) -> Result<Value> {
        self.single_by_display_name("applications", "application", name)
            .await
    }

    /// Policies of one type; singleton policies are returned as a one-item list
    pub async fn list_policies(&self, policy_type: PolicyType) -> Result<Vec<Value>> {
        let url = self
            .client
            .graph_url(&format!("policies/{}", policy_type.endpoint()));

        if policy_type.is_singleton() {
            let policy: Value = self.client.get(&url).await?;
            Ok(vec![policy])
        } else {
            self.client.get_all_items(&url).await
        }
    }

    async fn single_by_display_name(
        &self,
        collection: &str,
        kind: &str,
        display_name: &str,
    ) -> Result<Value> {
        let filter = format!("displayName eq '{}'", odata_string(display_name));
        let url = format!(
            "{}?$filter={}",
            self.client.graph_url(collection),
            urlencoding::encode(&filter)
        );

        let mut matches: Vec<Value> = self.client.get_all_items(&url).await?;
        match matches.len() {
            0 => Err(M365Error::ValidationError(format!(
                "The specified {} '{}' does not exist",
                kind, display_name
            ))),
            1 => Ok(matches.remove(0)),
            _ => {
                let ids: Vec<&str> = matches.iter().filter_map(|m| m["id"].as_str()).collect();
                Err(M365Error::ValidationError(format!(
                    "Multiple {}s with name '{}' found: {}",
                    kind,
                    display_name,
                    ids.join(", ")
                )))
            }
        }
    }
}
