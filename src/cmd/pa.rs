use crate::api::operation::PollSettings;
use crate::api::power_apps::{PackageDetails, PowerAppsClient};
use crate::cmd::pp::{export_path, validate_export_path, with_display_name};
use crate::cmd::{Command, CommandContext, run_command};
use crate::error::{M365Error, Result};
use crate::telemetry::{TelemetryProperties, used};
use crate::validation::validate_guid;
use clap::{Args, Subcommand};
use serde_json::{Value, json};
use std::path::PathBuf;
use tracing::info;

#[derive(Subcommand, Debug)]
pub enum PaCommands {
    /// List Power Apps
    ListApps(ListApps),
    /// Export a Power App as a package
    ExportApp(ExportApp),
}

pub async fn run(command: PaCommands, ctx: &CommandContext) -> Result<()> {
    match command {
        PaCommands::ListApps(c) => run_command(&c, ctx).await,
        PaCommands::ExportApp(c) => run_command(&c, ctx).await,
    }
}

#[derive(Args, Debug)]
pub struct ListApps {
    /// Environment name (id)
    #[arg(short, long)]
    pub environment_name: Option<String>,

    /// List all apps of the environment as administrator
    #[arg(long)]
    pub as_admin: bool,
}

impl Command for ListApps {
    const NAME: &'static str = "pa list-apps";
    const DEFAULT_PROPERTIES: &'static [&'static str] = &["name", "displayName"];

    async fn validate(&self, _ctx: &CommandContext) -> Result<()> {
        if self.as_admin && self.environment_name.is_none() {
            return Err(M365Error::ValidationError(
                "When specifying the as-admin option, the environment-name option is required as well"
                    .into(),
            ));
        }
        Ok(())
    }

    fn telemetry_properties(&self) -> TelemetryProperties {
        TelemetryProperties::from([
            ("environmentName".into(), used(&self.environment_name)),
            ("asAdmin".into(), Value::Bool(self.as_admin)),
        ])
    }

    async fn action(&self, ctx: &CommandContext) -> Result<()> {
        let client = ctx.rest_client()?;
        let apps = PowerAppsClient::new(&client)
            .list_apps(self.environment_name.as_deref(), self.as_admin)
            .await?
            .into_iter()
            .map(with_display_name)
            .collect();
        ctx.print(&Value::Array(apps), Self::DEFAULT_PROPERTIES)
    }
}

#[derive(Args, Debug)]
pub struct ExportApp {
    /// Environment name (id)
    #[arg(short, long)]
    pub environment_name: String,

    /// Name (id) of the app
    #[arg(short, long)]
    pub name: String,

    /// Display name of the package
    #[arg(long)]
    pub package_display_name: Option<String>,

    /// Description of the package
    #[arg(long)]
    pub package_description: Option<String>,

    /// Creator recorded in the package
    #[arg(long)]
    pub package_created_by: Option<String>,

    /// Source environment recorded in the package
    #[arg(long)]
    pub package_source_environment: Option<String>,

    /// Where to write the zip file (default: ./<name>.zip)
    #[arg(short, long)]
    pub path: Option<PathBuf>,
}

impl Command for ExportApp {
    const NAME: &'static str = "pa export-app";

    async fn validate(&self, _ctx: &CommandContext) -> Result<()> {
        validate_guid("name", &self.name)?;
        validate_export_path(self.path.as_deref())
    }

    fn telemetry_properties(&self) -> TelemetryProperties {
        TelemetryProperties::from([
            ("packageDisplayName".into(), used(&self.package_display_name)),
            ("packageDescription".into(), used(&self.package_description)),
            ("packageCreatedBy".into(), used(&self.package_created_by)),
            (
                "packageSourceEnvironment".into(),
                used(&self.package_source_environment),
            ),
            ("path".into(), used(&self.path)),
        ])
    }

    async fn action(&self, ctx: &CommandContext) -> Result<()> {
        let client = ctx.rest_client()?;
        let details = PackageDetails {
            display_name: self
                .package_display_name
                .clone()
                .unwrap_or_else(|| self.name.clone()),
            description: self.package_description.clone(),
            creator: self.package_created_by.clone(),
            source_environment: self.package_source_environment.clone(),
        };

        info!(app = %self.name, "Exporting app");
        let content = PowerAppsClient::new(&client)
            .export_app(
                &self.environment_name,
                &self.name,
                &details,
                PollSettings::default(),
            )
            .await?;

        let path = export_path(self.path.as_deref(), &self.name);
        std::fs::write(&path, content)?;
        ctx.print(&json!(path.display().to_string()), Self::DEFAULT_PROPERTIES)
    }
}
