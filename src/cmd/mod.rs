pub mod cli;
pub mod entra;
pub mod login;
pub mod options;
pub mod pa;
pub mod pp;
pub mod purview;
pub mod spo;
pub mod tenant;

use crate::api::{Endpoints, RestClient, TokenSource};
use crate::config::{ConfigManager, Settings, TenantConfig};
use crate::error::Result;
use crate::output::{self, OutputFormat, OutputSink};
use crate::telemetry::{self, TelemetryProperties};
use clap::Args;
use options::{OptionSet, validate_option_sets};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

/// Options accepted by every command
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalOptions {
    /// Output format (defaults to the `output` setting, else json)
    #[arg(short, long, global = true, value_enum)]
    pub output: Option<OutputFormat>,

    /// JMESPath query applied to the command result
    #[arg(long, global = true)]
    pub query: Option<String>,

    /// Log every request and response to stderr
    #[arg(long, global = true)]
    pub debug: bool,

    /// Log progress messages to stderr
    #[arg(long, global = true)]
    pub verbose: bool,
}

/// Everything a command needs besides its own options
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub config: ConfigManager,
    pub settings: Settings,
    pub output: OutputFormat,
    pub query: Option<String>,
    pub debug: bool,
    pub verbose: bool,
    pub sink: OutputSink,
    pub endpoints: Endpoints,
    /// Fixed bearer token instead of the tenant token cache
    pub token: Option<String>,
}

impl CommandContext {
    pub fn new(config: ConfigManager, global: &GlobalOptions) -> Result<Self> {
        let settings = config.load_config()?.settings;

        let output = match (global.output, settings.output.as_deref()) {
            (Some(output), _) => output,
            (None, Some(configured)) => OutputFormat::parse(configured)?,
            (None, None) => OutputFormat::default(),
        };

        Ok(Self {
            config,
            settings,
            output,
            query: global.query.clone(),
            debug: global.debug,
            verbose: global.verbose,
            sink: OutputSink::Stdout,
            endpoints: Endpoints::default(),
            token: None,
        })
    }

    /// Tenant whose tokens are used for API calls
    pub fn active_tenant(&self) -> Result<TenantConfig> {
        self.config.require_active_tenant()
    }

    pub fn rest_client(&self) -> Result<RestClient> {
        let tokens = match &self.token {
            Some(token) => TokenSource::Static(token.clone()),
            None => TokenSource::Tenant {
                config: self.config.clone(),
                tenant: self.active_tenant()?,
            },
        };
        RestClient::new(tokens, self.endpoints.clone())
    }

    /// Print a result in the requested output format
    pub fn print(&self, value: &Value, default_properties: &[&str]) -> Result<()> {
        if let Some(text) =
            output::render(value, self.output, self.query.as_deref(), default_properties)?
        {
            self.sink.write(&text)?;
        }
        Ok(())
    }

    pub fn print_serialize<T: Serialize>(
        &self,
        value: &T,
        default_properties: &[&str],
    ) -> Result<()> {
        self.print(&serde_json::to_value(value)?, default_properties)
    }

    /// Ask before a destructive action unless `--force` or prompting is turned off
    pub fn confirm(&self, force: bool, message: &str) -> Result<bool> {
        if force || !self.settings.prompt {
            return Ok(true);
        }

        Ok(dialoguer::Confirm::new()
            .with_prompt(message)
            .default(false)
            .interact()?)
    }

    fn global_properties(&self) -> TelemetryProperties {
        let mut properties = TelemetryProperties::new();
        properties.insert(
            "output".into(),
            Value::String(format!("{:?}", self.output).to_lowercase()),
        );
        properties.insert("query".into(), telemetry::used(&self.query));
        properties.insert("debug".into(), Value::Bool(self.debug));
        properties.insert("verbose".into(), Value::Bool(self.verbose));
        properties
    }
}

/// A CLI command: declarative validation plus an async action
#[allow(async_fn_in_trait)]
pub trait Command {
    /// Full command name, e.g. `entra get-group`
    const NAME: &'static str;

    /// Columns shown for list results in text, csv and md output
    const DEFAULT_PROPERTIES: &'static [&'static str] = &[];

    fn option_sets(&self) -> Vec<OptionSet> {
        Vec::new()
    }

    /// Checks that need state or remote lookups
    async fn validate(&self, _ctx: &CommandContext) -> Result<()> {
        Ok(())
    }

    fn telemetry_properties(&self) -> TelemetryProperties {
        TelemetryProperties::new()
    }

    async fn action(&self, ctx: &CommandContext) -> Result<()>;
}

/// Validate, record telemetry, then run the command
pub async fn run_command<C: Command>(command: &C, ctx: &CommandContext) -> Result<()> {
    validate_option_sets(&command.option_sets())?;
    command.validate(ctx).await?;

    let mut properties = ctx.global_properties();
    properties.extend(command.telemetry_properties());
    telemetry::track(C::NAME, properties, ctx.settings.disable_telemetry);

    debug!(command = C::NAME, "Executing command");
    command.action(ctx).await
}
