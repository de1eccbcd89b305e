use crate::api::operation::{OperationState, OperationStatus, PollSettings};
use crate::api::origin;
use crate::api::spo::{CreateSiteRequest, SiteDesign, SpoClient, tenant_admin_url};
use crate::cmd::options::OptionSet;
use crate::cmd::{Command, CommandContext, run_command};
use crate::error::{M365Error, Result};
use crate::telemetry::{TelemetryProperties, used};
use crate::validation::{
    validate_enum, validate_guid, validate_positive_integer, validate_sharepoint_url,
};
use clap::{Args, Subcommand};
use colored::Colorize;
use serde_json::{Value, json};
use tracing::info;

/// Web template of communication sites
const COMMUNICATION_SITE_TEMPLATE: &str = "SITEPAGEPUBLISHING#0";
const DEFAULT_LCID: u32 = 1033;

#[derive(Subcommand, Debug)]
pub enum SpoCommands {
    /// Store the SharePoint Online root URL on the active tenant
    SetUrl(SetUrl),
    /// Get information about a site's root web
    GetWeb(GetWeb),
    /// List lists of a site
    ListLists(ListLists),
    /// Create a communication site
    AddSite(AddSite),
    /// Send a site to the recycle bin
    RemoveSite(RemoveSite),
}

pub async fn run(command: SpoCommands, ctx: &CommandContext) -> Result<()> {
    match command {
        SpoCommands::SetUrl(c) => run_command(&c, ctx).await,
        SpoCommands::GetWeb(c) => run_command(&c, ctx).await,
        SpoCommands::ListLists(c) => run_command(&c, ctx).await,
        SpoCommands::AddSite(c) => run_command(&c, ctx).await,
        SpoCommands::RemoveSite(c) => run_command(&c, ctx).await,
    }
}

#[derive(Args, Debug)]
pub struct SetUrl {
    /// Root URL, e.g. https://contoso.sharepoint.com
    #[arg(short, long)]
    pub url: String,
}

impl Command for SetUrl {
    const NAME: &'static str = "spo set-url";

    async fn validate(&self, _ctx: &CommandContext) -> Result<()> {
        validate_sharepoint_url("url", &self.url)
    }

    async fn action(&self, ctx: &CommandContext) -> Result<()> {
        let mut tenant = ctx.config.get_active_tenant()?.ok_or_else(|| {
            M365Error::ConfigError(
                "No active tenant. Run 'm365 login' or 'm365 tenant switch <name>' first.".into(),
            )
        })?;

        let url = origin(&self.url).unwrap_or_else(|| self.url.clone());
        tenant.spo_url = Some(url.clone());
        ctx.config.add_tenant(tenant.clone())?;

        eprintln!(
            "{} SharePoint URL for tenant '{}' set to {}",
            "✓".green(),
            tenant.name,
            url
        );
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct GetWeb {
    /// URL of the site
    #[arg(short = 'u', long)]
    pub web_url: String,
}

impl Command for GetWeb {
    const NAME: &'static str = "spo get-web";

    async fn validate(&self, _ctx: &CommandContext) -> Result<()> {
        validate_sharepoint_url("web-url", &self.web_url)
    }

    async fn action(&self, ctx: &CommandContext) -> Result<()> {
        let client = ctx.rest_client()?;
        let web = SpoClient::new(&client).get_web(&self.web_url).await?;
        ctx.print(&web, Self::DEFAULT_PROPERTIES)
    }
}

#[derive(Args, Debug)]
pub struct ListLists {
    /// URL of the site
    #[arg(short = 'u', long)]
    pub web_url: String,

    /// Comma-separated properties to retrieve
    #[arg(short, long)]
    pub properties: Option<String>,
}

impl Command for ListLists {
    const NAME: &'static str = "spo list-lists";
    const DEFAULT_PROPERTIES: &'static [&'static str] = &["Title", "Id"];

    async fn validate(&self, _ctx: &CommandContext) -> Result<()> {
        validate_sharepoint_url("web-url", &self.web_url)
    }

    fn telemetry_properties(&self) -> TelemetryProperties {
        TelemetryProperties::from([("properties".into(), used(&self.properties))])
    }

    async fn action(&self, ctx: &CommandContext) -> Result<()> {
        let client = ctx.rest_client()?;
        let lists = SpoClient::new(&client)
            .list_lists(&self.web_url, self.properties.as_deref())
            .await?;
        ctx.print(&Value::Array(lists), Self::DEFAULT_PROPERTIES)
    }
}

#[derive(Args, Debug)]
pub struct AddSite {
    /// Site title
    #[arg(short, long)]
    pub title: String,

    /// Absolute URL of the new site
    #[arg(short, long)]
    pub url: String,

    /// Site design: Topic, Showcase or Blank
    #[arg(long)]
    pub site_design: Option<String>,

    /// Id of a custom site design
    #[arg(long)]
    pub site_design_id: Option<String>,

    /// Site language, e.g. 1033
    #[arg(long)]
    pub lcid: Option<i64>,

    /// Site description
    #[arg(short, long)]
    pub description: Option<String>,

    /// Owner of the site (user principal name)
    #[arg(long)]
    pub owner: Option<String>,

    /// Wait until the site is provisioned
    #[arg(long)]
    pub wait: bool,
}

impl AddSite {
    fn design_id(&self) -> String {
        match (&self.site_design_id, self.site_design.as_deref()) {
            (Some(id), _) => id.clone(),
            (None, design) => design
                .and_then(SiteDesign::parse)
                .unwrap_or(SiteDesign::Topic)
                .id()
                .to_string(),
        }
    }

    fn request(&self) -> CreateSiteRequest {
        CreateSiteRequest {
            title: self.title.clone(),
            url: self.url.clone(),
            lcid: self
                .lcid
                .and_then(|l| u32::try_from(l).ok())
                .unwrap_or(DEFAULT_LCID),
            web_template: COMMUNICATION_SITE_TEMPLATE.to_string(),
            site_design_id: self.design_id(),
            description: self.description.clone(),
            owner: self.owner.clone(),
        }
    }
}

impl Command for AddSite {
    const NAME: &'static str = "spo add-site";

    fn option_sets(&self) -> Vec<OptionSet> {
        let design_given = self.site_design.is_some() || self.site_design_id.is_some();
        vec![
            OptionSet::new()
                .option("site-design", self.site_design.is_some())
                .option("site-design-id", self.site_design_id.is_some())
                .run_when(design_given),
        ]
    }

    async fn validate(&self, _ctx: &CommandContext) -> Result<()> {
        validate_sharepoint_url("url", &self.url)?;
        if let Some(design) = &self.site_design {
            validate_enum("site-design", design, SiteDesign::ALL)?;
        }
        if let Some(id) = &self.site_design_id {
            validate_guid("site-design-id", id)?;
        }
        if let Some(lcid) = self.lcid {
            validate_positive_integer("lcid", lcid)?;
        }
        Ok(())
    }

    fn telemetry_properties(&self) -> TelemetryProperties {
        TelemetryProperties::from([
            ("siteDesign".into(), used(&self.site_design)),
            ("siteDesignId".into(), used(&self.site_design_id)),
            ("lcid".into(), used(&self.lcid)),
            ("description".into(), used(&self.description)),
            ("owner".into(), used(&self.owner)),
            ("wait".into(), Value::Bool(self.wait)),
        ])
    }

    async fn action(&self, ctx: &CommandContext) -> Result<()> {
        let client = ctx.rest_client()?;
        let spo = SpoClient::new(&client);
        let root_url = origin(&self.url).unwrap_or_else(|| self.url.clone());

        info!(url = %self.url, "Creating site");
        let mut status = spo.create_site(&root_url, &self.request()).await?;

        match status.state() {
            OperationState::Failed(message) => return Err(M365Error::OperationFailed(message)),
            OperationState::Running if self.wait => {
                status = spo
                    .wait_for_site(&root_url, &self.url, PollSettings::default())
                    .await?;
            }
            _ => {}
        }

        ctx.print(
            &json!({
                "siteId": status.site_id,
                "siteStatus": status.site_status,
                "siteUrl": status.site_url.unwrap_or_else(|| self.url.clone()),
            }),
            Self::DEFAULT_PROPERTIES,
        )
    }
}

#[derive(Args, Debug)]
pub struct RemoveSite {
    /// Absolute URL of the site
    #[arg(short, long)]
    pub url: String,

    /// Don't ask for confirmation
    #[arg(short, long)]
    pub force: bool,

    /// Wait until the site is removed
    #[arg(long)]
    pub wait: bool,
}

impl Command for RemoveSite {
    const NAME: &'static str = "spo remove-site";

    async fn validate(&self, _ctx: &CommandContext) -> Result<()> {
        validate_sharepoint_url("url", &self.url)
    }

    fn telemetry_properties(&self) -> TelemetryProperties {
        TelemetryProperties::from([
            ("force".into(), Value::Bool(self.force)),
            ("wait".into(), Value::Bool(self.wait)),
        ])
    }

    async fn action(&self, ctx: &CommandContext) -> Result<()> {
        if !ctx.confirm(
            self.force,
            &format!("Are you sure you want to remove site '{}'?", self.url),
        )? {
            return Ok(());
        }

        let client = ctx.rest_client()?;
        let spo = SpoClient::new(&client);
        let admin_url = tenant_admin_url(&self.url)?;

        info!(url = %self.url, admin = %admin_url, "Removing site");
        let operation = spo.remove_site(&admin_url, &self.url).await?;

        if self.wait {
            spo.wait_for_operation(
                &admin_url,
                operation,
                PollSettings::default().max_attempts,
            )
            .await?;
        }

        if ctx.verbose {
            eprintln!("{} Site '{}' removed", "✓".green(), self.url);
        }
        Ok(())
    }
}
