use crate::api::operation::PollSettings;
use crate::api::power_platform::PowerPlatformClient;
use crate::cmd::{Command, CommandContext, run_command};
use crate::error::{M365Error, Result};
use crate::telemetry::{TelemetryProperties, used};
use clap::{Args, Subcommand};
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Subcommand, Debug)]
pub enum PpCommands {
    /// List Power Platform environments
    ListEnvironments(ListEnvironments),
    /// Get a Power Platform environment
    GetEnvironment(GetEnvironment),
    /// List solutions of an environment
    ListSolutions(ListSolutions),
    /// Export a solution to a zip file
    ExportSolution(ExportSolution),
}

pub async fn run(command: PpCommands, ctx: &CommandContext) -> Result<()> {
    match command {
        PpCommands::ListEnvironments(c) => run_command(&c, ctx).await,
        PpCommands::GetEnvironment(c) => run_command(&c, ctx).await,
        PpCommands::ListSolutions(c) => run_command(&c, ctx).await,
        PpCommands::ExportSolution(c) => run_command(&c, ctx).await,
    }
}

/// Lift `properties.displayName` to the top level so it can be shown as a column
pub(crate) fn with_display_name(mut item: Value) -> Value {
    let display_name = item["properties"]["displayName"].clone();
    if let Some(obj) = item.as_object_mut() {
        obj.entry("displayName").or_insert(display_name);
    }
    item
}

/// Zip file path for an export, defaulting to `./<name>.zip`
pub(crate) fn export_path(path: Option<&Path>, name: &str) -> PathBuf {
    path.map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(format!("{}.zip", name)))
}

/// The directory an export is written to must already exist
pub(crate) fn validate_export_path(path: Option<&Path>) -> Result<()> {
    let Some(path) = path else {
        return Ok(());
    };

    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.is_dir() => {
            Err(M365Error::ValidationError(format!(
                "The directory '{}' does not exist",
                parent.display()
            )))
        }
        _ => Ok(()),
    }
}

#[derive(Args, Debug)]
pub struct ListEnvironments {
    /// List all environments in the tenant as administrator
    #[arg(long)]
    pub as_admin: bool,
}

impl Command for ListEnvironments {
    const NAME: &'static str = "pp list-environments";
    const DEFAULT_PROPERTIES: &'static [&'static str] = &["name", "displayName"];

    fn telemetry_properties(&self) -> TelemetryProperties {
        TelemetryProperties::from([("asAdmin".into(), Value::Bool(self.as_admin))])
    }

    async fn action(&self, ctx: &CommandContext) -> Result<()> {
        let client = ctx.rest_client()?;
        let environments = PowerPlatformClient::new(&client)
            .list_environments(self.as_admin)
            .await?
            .into_iter()
            .map(with_display_name)
            .collect();
        ctx.print(&Value::Array(environments), Self::DEFAULT_PROPERTIES)
    }
}

#[derive(Args, Debug)]
pub struct GetEnvironment {
    /// Environment name (id)
    #[arg(short, long)]
    pub name: String,

    /// Look the environment up as administrator
    #[arg(long)]
    pub as_admin: bool,
}

impl Command for GetEnvironment {
    const NAME: &'static str = "pp get-environment";

    fn telemetry_properties(&self) -> TelemetryProperties {
        TelemetryProperties::from([("asAdmin".into(), Value::Bool(self.as_admin))])
    }

    async fn action(&self, ctx: &CommandContext) -> Result<()> {
        let client = ctx.rest_client()?;
        let environment = PowerPlatformClient::new(&client)
            .get_environment(&self.name, self.as_admin)
            .await?;
        ctx.print(&with_display_name(environment), Self::DEFAULT_PROPERTIES)
    }
}

#[derive(Args, Debug)]
pub struct ListSolutions {
    /// Environment name (id)
    #[arg(short, long)]
    pub environment_name: String,

    /// Resolve the environment as administrator
    #[arg(long)]
    pub as_admin: bool,
}

impl Command for ListSolutions {
    const NAME: &'static str = "pp list-solutions";
    const DEFAULT_PROPERTIES: &'static [&'static str] =
        &["uniquename", "version", "publisher"];

    fn telemetry_properties(&self) -> TelemetryProperties {
        TelemetryProperties::from([("asAdmin".into(), Value::Bool(self.as_admin))])
    }

    async fn action(&self, ctx: &CommandContext) -> Result<()> {
        let client = ctx.rest_client()?;
        let pp = PowerPlatformClient::new(&client);
        let instance_url = pp
            .dynamics_api_url(&self.environment_name, self.as_admin)
            .await?;

        let solutions = pp
            .list_solutions(&instance_url)
            .await?
            .into_iter()
            .map(|mut solution| {
                let publisher = solution["publisherid"]["friendlyname"].clone();
                if let Some(obj) = solution.as_object_mut() {
                    obj.insert("publisher".into(), publisher);
                }
                solution
            })
            .collect();

        ctx.print(&Value::Array(solutions), Self::DEFAULT_PROPERTIES)
    }
}

#[derive(Args, Debug)]
pub struct ExportSolution {
    /// Environment name (id)
    #[arg(short, long)]
    pub environment_name: String,

    /// Unique name of the solution
    #[arg(short, long)]
    pub name: String,

    /// Where to write the zip file (default: ./<name>.zip)
    #[arg(short, long)]
    pub path: Option<PathBuf>,

    /// Export as a managed solution
    #[arg(long)]
    pub managed: bool,

    /// Resolve the environment as administrator
    #[arg(long)]
    pub as_admin: bool,
}

impl Command for ExportSolution {
    const NAME: &'static str = "pp export-solution";

    async fn validate(&self, _ctx: &CommandContext) -> Result<()> {
        validate_export_path(self.path.as_deref())
    }

    fn telemetry_properties(&self) -> TelemetryProperties {
        TelemetryProperties::from([
            ("path".into(), used(&self.path)),
            ("managed".into(), Value::Bool(self.managed)),
            ("asAdmin".into(), Value::Bool(self.as_admin)),
        ])
    }

    async fn action(&self, ctx: &CommandContext) -> Result<()> {
        let client = ctx.rest_client()?;
        let pp = PowerPlatformClient::new(&client);
        let instance_url = pp
            .dynamics_api_url(&self.environment_name, self.as_admin)
            .await?;

        info!(solution = %self.name, "Exporting solution");
        let content = pp
            .export_solution(&instance_url, &self.name, self.managed, PollSettings::default())
            .await?;

        let path = export_path(self.path.as_deref(), &self.name);
        std::fs::write(&path, content)?;
        ctx.print(&json!(path.display().to_string()), Self::DEFAULT_PROPERTIES)
    }
}
