use crate::api::purview::PurviewClient;
use crate::cmd::{Command, CommandContext, run_command};
use crate::error::Result;
use crate::telemetry::TelemetryProperties;
use crate::validation::validate_guid;
use clap::{Args, Subcommand};
use colored::Colorize;
use serde_json::Value;

#[derive(Subcommand, Debug)]
pub enum PurviewCommands {
    /// List retention labels
    ListRetentionLabels(ListRetentionLabels),
    /// Get a retention label
    GetRetentionLabel(GetRetentionLabel),
    /// Remove a retention label
    RemoveRetentionLabel(RemoveRetentionLabel),
}

pub async fn run(command: PurviewCommands, ctx: &CommandContext) -> Result<()> {
    match command {
        PurviewCommands::ListRetentionLabels(c) => run_command(&c, ctx).await,
        PurviewCommands::GetRetentionLabel(c) => run_command(&c, ctx).await,
        PurviewCommands::RemoveRetentionLabel(c) => run_command(&c, ctx).await,
    }
}

#[derive(Args, Debug)]
pub struct ListRetentionLabels {}

impl Command for ListRetentionLabels {
    const NAME: &'static str = "purview list-retention-labels";
    const DEFAULT_PROPERTIES: &'static [&'static str] =
        &["id", "displayName", "isInUse", "retentionDuration"];

    async fn action(&self, ctx: &CommandContext) -> Result<()> {
        let client = ctx.rest_client()?;
        let labels = PurviewClient::new(&client).list_retention_labels().await?;
        ctx.print(&Value::Array(labels), Self::DEFAULT_PROPERTIES)
    }
}

#[derive(Args, Debug)]
pub struct GetRetentionLabel {
    /// Id of the retention label
    #[arg(short, long)]
    pub id: String,
}

impl Command for GetRetentionLabel {
    const NAME: &'static str = "purview get-retention-label";

    async fn validate(&self, _ctx: &CommandContext) -> Result<()> {
        validate_guid("id", &self.id)
    }

    async fn action(&self, ctx: &CommandContext) -> Result<()> {
        let client = ctx.rest_client()?;
        let label = PurviewClient::new(&client)
            .get_retention_label(&self.id)
            .await?;
        ctx.print(&label, Self::DEFAULT_PROPERTIES)
    }
}

#[derive(Args, Debug)]
pub struct RemoveRetentionLabel {
    /// Id of the retention label
    #[arg(short, long)]
    pub id: String,

    /// Don't ask for confirmation
    #[arg(short, long)]
    pub force: bool,
}

impl Command for RemoveRetentionLabel {
    const NAME: &'static str = "purview remove-retention-label";

    async fn validate(&self, _ctx: &CommandContext) -> Result<()> {
        validate_guid("id", &self.id)
    }

    fn telemetry_properties(&self) -> TelemetryProperties {
        TelemetryProperties::from([("force".into(), Value::Bool(self.force))])
    }

    async fn action(&self, ctx: &CommandContext) -> Result<()> {
        if !ctx.confirm(
            self.force,
            &format!(
                "Are you sure you want to remove retention label '{}'?",
                self.id
            ),
        )? {
            return Ok(());
        }

        let client = ctx.rest_client()?;
        PurviewClient::new(&client)
            .delete_retention_label(&self.id)
            .await?;

        if ctx.verbose {
            eprintln!("{} Retention label '{}' removed", "✓".green(), self.id);
        }
        Ok(())
    }
}
