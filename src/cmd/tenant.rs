use crate::cmd::{Command, CommandContext, run_command};
use crate::config::{AuthType, TenantConfig};
use crate::error::{M365Error, Result};
use crate::validation::{validate_guid, validate_sharepoint_url};
use clap::{Args, Subcommand};
use colored::Colorize;
use serde_json::{Value, json};

#[derive(Subcommand, Debug)]
pub enum TenantCommands {
    /// Add a new tenant configuration
    Add(TenantAddArgs),
    /// List all configured tenants
    List(TenantListArgs),
    /// Switch the active tenant
    Switch(TenantSwitchArgs),
    /// Remove a tenant configuration and its cached tokens
    Remove(TenantRemoveArgs),
}

pub async fn run(command: TenantCommands, ctx: &CommandContext) -> Result<()> {
    match command {
        TenantCommands::Add(c) => run_command(&c, ctx).await,
        TenantCommands::List(c) => run_command(&c, ctx).await,
        TenantCommands::Switch(c) => run_command(&c, ctx).await,
        TenantCommands::Remove(c) => run_command(&c, ctx).await,
    }
}

#[derive(Args, Debug)]
pub struct TenantAddArgs {
    /// Tenant name
    pub name: String,

    /// Tenant ID (Entra ID tenant ID)
    #[arg(long)]
    pub tenant_id: String,

    /// Client ID (Application ID)
    #[arg(long)]
    pub client_id: String,

    /// Client secret (for client credentials flow)
    #[arg(long)]
    pub client_secret: Option<String>,

    /// SharePoint Online root URL, e.g. https://contoso.sharepoint.com
    #[arg(long)]
    pub spo_url: Option<String>,

    /// Tenant description
    #[arg(long)]
    pub description: Option<String>,
}

#[derive(Args, Debug)]
pub struct TenantListArgs {}

#[derive(Args, Debug)]
pub struct TenantSwitchArgs {
    /// Tenant name to switch to
    pub name: String,
}

#[derive(Args, Debug)]
pub struct TenantRemoveArgs {
    /// Tenant name to remove
    pub name: String,

    /// Don't ask for confirmation
    #[arg(short, long)]
    pub force: bool,
}

impl Command for TenantAddArgs {
    const NAME: &'static str = "tenant add";

    async fn validate(&self, _ctx: &CommandContext) -> Result<()> {
        validate_guid("tenant-id", &self.tenant_id)?;
        validate_guid("client-id", &self.client_id)?;
        if let Some(url) = &self.spo_url {
            validate_sharepoint_url("spo-url", url)?;
        }
        Ok(())
    }

    async fn action(&self, ctx: &CommandContext) -> Result<()> {
        let tenant = TenantConfig {
            name: self.name.clone(),
            tenant_id: self.tenant_id.clone(),
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            auth_type: if self.client_secret.is_some() {
                AuthType::ClientCredentials
            } else {
                AuthType::DeviceCode
            },
            description: self.description.clone(),
            spo_url: self.spo_url.clone(),
        };

        ctx.config.add_tenant(tenant)?;

        eprintln!("{} Tenant '{}' added successfully", "✓".green(), self.name);
        eprintln!(
            "{} Run {} to authenticate",
            "→".cyan(),
            format!("m365 login {}", self.name).bold()
        );
        Ok(())
    }
}

impl Command for TenantListArgs {
    const NAME: &'static str = "tenant list";
    const DEFAULT_PROPERTIES: &'static [&'static str] = &["name", "active", "authType", "status"];

    async fn action(&self, ctx: &CommandContext) -> Result<()> {
        let tenants = ctx.config.load_tenants()?;
        let current = ctx.config.load_config()?.current_tenant;

        let mut items = Vec::with_capacity(tenants.len());
        for tenant in &tenants {
            // Authenticated when a Graph token is still valid
            let status = match ctx.config.load_token(&tenant.name, crate::api::GRAPH_RESOURCE) {
                Ok(_) => "Authenticated",
                Err(_) => "Not authenticated",
            };

            items.push(json!({
                "name": tenant.name,
                "active": current.as_deref() == Some(tenant.name.as_str()),
                "tenantId": tenant.tenant_id,
                "clientId": tenant.client_id,
                "authType": match tenant.auth_type {
                    AuthType::DeviceCode => "deviceCode",
                    AuthType::ClientCredentials => "clientCredentials",
                },
                "description": tenant.description,
                "spoUrl": tenant.spo_url,
                "status": status,
            }));
        }

        ctx.print(&Value::Array(items), Self::DEFAULT_PROPERTIES)
    }
}

impl Command for TenantSwitchArgs {
    const NAME: &'static str = "tenant switch";

    async fn action(&self, ctx: &CommandContext) -> Result<()> {
        ctx.config.set_active_tenant(&self.name)?;
        eprintln!("{} Switched to tenant '{}'", "✓".green(), self.name);
        Ok(())
    }
}

impl Command for TenantRemoveArgs {
    const NAME: &'static str = "tenant remove";

    async fn action(&self, ctx: &CommandContext) -> Result<()> {
        if !ctx.config.load_tenants()?.iter().any(|t| t.name == self.name) {
            return Err(M365Error::TenantNotFound(self.name.clone()));
        }

        if !ctx.confirm(
            self.force,
            &format!("Are you sure you want to remove tenant '{}'?", self.name),
        )? {
            return Ok(());
        }

        ctx.config.remove_tenant(&self.name)?;
        eprintln!("{} Tenant '{}' removed", "✓".green(), self.name);
        Ok(())
    }
}
