use crate::api::GRAPH_RESOURCE;
use crate::api::auth::Authenticator;
use crate::cmd::{Command, CommandContext, run_command};
use crate::config::{AuthType, TenantConfig};
use crate::error::{M365Error, Result};
use crate::telemetry::{TelemetryProperties, used};
use crate::validation::validate_guid;
use clap::Args;
use colored::Colorize;
use serde_json::{Value, json};

/// Safely truncate a string to n characters (not bytes) to prevent panics on non-ASCII
fn truncate_chars(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

#[derive(Args, Debug)]
pub struct LoginArgs {
    /// Tenant profile name
    /// Will check for existing config, then <config dir>/{name}.env
    #[arg(index = 1)]
    pub name: Option<String>,

    /// Tenant profile name - alias for positional
    #[arg(short, long)]
    pub tenant: Option<String>,

    /// Tenant ID (Entra ID tenant ID)
    #[arg(long)]
    pub tenant_id: Option<String>,

    /// Client ID (Application ID)
    #[arg(long)]
    pub client_id: Option<String>,

    /// Client secret (for client credentials flow)
    #[arg(long)]
    pub client_secret: Option<String>,

    /// Tenant description
    #[arg(long)]
    pub description: Option<String>,
}

#[derive(Args, Debug)]
pub struct LogoutArgs {
    /// Tenant name
    #[arg(short, long)]
    pub tenant: Option<String>,

    /// Logout from all tenants
    #[arg(long)]
    pub all: bool,
}

#[derive(Args, Debug)]
pub struct StatusArgs {}

pub async fn login(args: LoginArgs, ctx: &CommandContext) -> Result<()> {
    run_command(&args, ctx).await
}

pub async fn logout(args: LogoutArgs, ctx: &CommandContext) -> Result<()> {
    run_command(&args, ctx).await
}

pub async fn status(args: StatusArgs, ctx: &CommandContext) -> Result<()> {
    run_command(&args, ctx).await
}

impl LoginArgs {
    fn resolve_tenant(&self, ctx: &CommandContext) -> Result<TenantConfig> {
        // Resolve tenant name from positional arg or --tenant flag
        let tenant_name = self.name.as_ref().or(self.tenant.as_ref());

        if let (Some(tenant_id), Some(client_id)) = (&self.tenant_id, &self.client_id) {
            // Quick setup: create the tenant profile on the fly
            let name = tenant_name.cloned().unwrap_or_else(|| {
                let auto_name = tenant_id
                    .split('-')
                    .next()
                    .unwrap_or("my-tenant")
                    .to_string();
                eprintln!(
                    "{} Auto-generated tenant name: {}",
                    "→".cyan(),
                    auto_name.bold()
                );
                auto_name
            });

            let tenant = TenantConfig {
                name: name.clone(),
                tenant_id: tenant_id.clone(),
                client_id: client_id.clone(),
                client_secret: self.client_secret.clone(),
                auth_type: if self.client_secret.is_some() {
                    AuthType::ClientCredentials
                } else {
                    AuthType::DeviceCode
                },
                description: self.description.clone(),
                spo_url: None,
            };

            ctx.config.add_tenant(tenant.clone())?;
            eprintln!("{} Tenant '{}' configuration saved", "✓".green(), name);
            return Ok(tenant);
        }

        if let Some(name) = tenant_name {
            // Try tenants.toml, then {name}.env
            return ctx.config.get_tenant_or_env(name).map_err(|_| {
                M365Error::ConfigError(format!(
                    "Tenant '{}' not found.\n\n\
                    Options:\n\
                    1. m365 tenant add {} --tenant-id <id> --client-id <id>\n\
                    2. Create {} with:\n   \
                       TENANT_ID=your-tenant-id\n   \
                       CLIENT_ID=your-client-id\n   \
                       CLIENT_SECRET=your-secret",
                    name,
                    name,
                    ctx.config
                        .config_dir()
                        .join(format!("{}.env", name.to_lowercase()))
                        .display()
                ))
            });
        }

        if let Some(tenant) = ctx.config.get_active_tenant()? {
            return Ok(tenant);
        }

        Err(M365Error::ValidationError(
            "Usage:\n  \
            m365 login NAME             # Use a tenant profile or NAME.env\n  \
            m365 login --tenant-id ID --client-id ID  # Quick setup"
                .into(),
        ))
    }
}

impl Command for LoginArgs {
    const NAME: &'static str = "login";

    async fn validate(&self, _ctx: &CommandContext) -> Result<()> {
        if let Some(tenant_id) = &self.tenant_id {
            validate_guid("tenant-id", tenant_id)?;
        }
        if let Some(client_id) = &self.client_id {
            validate_guid("client-id", client_id)?;
        }
        if self.tenant_id.is_some() != self.client_id.is_some() {
            return Err(M365Error::ValidationError(
                "Specify both tenant-id and client-id for quick setup".into(),
            ));
        }
        Ok(())
    }

    fn telemetry_properties(&self) -> TelemetryProperties {
        TelemetryProperties::from([
            ("tenantId".into(), used(&self.tenant_id)),
            ("clientSecret".into(), used(&self.client_secret)),
        ])
    }

    async fn action(&self, ctx: &CommandContext) -> Result<()> {
        let tenant = self.resolve_tenant(ctx)?;

        eprintln!(
            "{} Tenant: {} ({}...)",
            "→".cyan(),
            tenant.name.bold(),
            truncate_chars(&tenant.tenant_id, 8)
        );

        let auth = Authenticator::new(ctx.config.clone());
        match tenant.auth_type {
            AuthType::DeviceCode => auth.login_device_code(&tenant).await?,
            AuthType::ClientCredentials => {
                auth.login_client_credentials(&tenant, GRAPH_RESOURCE)
                    .await?
            }
        };

        ctx.config.set_active_tenant(&tenant.name)?;
        eprintln!("{} Active tenant: {}", "✓".green(), tenant.name.bold());
        Ok(())
    }
}

impl Command for LogoutArgs {
    const NAME: &'static str = "logout";

    fn telemetry_properties(&self) -> TelemetryProperties {
        TelemetryProperties::from([
            ("tenant".into(), used(&self.tenant)),
            ("all".into(), Value::Bool(self.all)),
        ])
    }

    async fn action(&self, ctx: &CommandContext) -> Result<()> {
        let auth = Authenticator::new(ctx.config.clone());

        if self.all {
            for tenant in ctx.config.load_tenants()? {
                auth.logout(&tenant.name)?;
            }
            eprintln!("{} Logged out from all tenants", "✓".green());
        } else if let Some(tenant_name) = &self.tenant {
            ctx.config.get_tenant(tenant_name)?;
            auth.logout(tenant_name)?;
            eprintln!("{} Logged out from '{}'", "✓".green(), tenant_name);
        } else if let Some(current) = ctx.config.load_config()?.current_tenant {
            auth.logout(&current)?;
            eprintln!("{} Logged out from '{}'", "✓".green(), current);
        } else {
            eprintln!("{} No active tenant", "!".yellow());
        }

        Ok(())
    }
}

impl Command for StatusArgs {
    const NAME: &'static str = "status";

    async fn action(&self, ctx: &CommandContext) -> Result<()> {
        let Some(tenant) = ctx.config.get_active_tenant()? else {
            eprintln!("Logged out");
            return Ok(());
        };

        let tokens: Vec<Value> = ctx
            .config
            .cached_tokens(&tenant.name)?
            .iter()
            .map(|token| {
                json!({
                    "resource": token.resource,
                    "expiresAt": token.expires_at.to_rfc3339(),
                    "expired": token.is_expired(),
                })
            })
            .collect();

        ctx.print(
            &json!({
                "tenant": tenant.name,
                "tenantId": tenant.tenant_id,
                "clientId": tenant.client_id,
                "authType": match tenant.auth_type {
                    AuthType::DeviceCode => "deviceCode",
                    AuthType::ClientCredentials => "clientCredentials",
                },
                "spoUrl": tenant.spo_url,
                "tokens": tokens,
            }),
            Self::DEFAULT_PROPERTIES,
        )
    }
}
