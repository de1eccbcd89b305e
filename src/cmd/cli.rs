use crate::cmd::{Command, CommandContext, run_command};
use crate::config::Settings;
use crate::error::Result;
use crate::validation::validate_enum;
use clap::{Args, Subcommand};
use colored::Colorize;

#[derive(Subcommand, Debug)]
pub enum CliCommands {
    /// Show CLI settings, or a single setting
    GetConfig(GetConfig),
    /// Change a CLI setting
    SetConfig(SetConfig),
    /// Reset one or all CLI settings to their defaults
    ResetConfig(ResetConfig),
}

pub async fn run(command: CliCommands, ctx: &CommandContext) -> Result<()> {
    match command {
        CliCommands::GetConfig(c) => run_command(&c, ctx).await,
        CliCommands::SetConfig(c) => run_command(&c, ctx).await,
        CliCommands::ResetConfig(c) => run_command(&c, ctx).await,
    }
}

#[derive(Args, Debug)]
pub struct GetConfig {
    /// Setting name
    #[arg(short, long)]
    pub key: Option<String>,
}

impl Command for GetConfig {
    const NAME: &'static str = "cli get-config";

    async fn validate(&self, _ctx: &CommandContext) -> Result<()> {
        if let Some(key) = &self.key {
            validate_enum("key", key, Settings::KEYS)?;
        }
        Ok(())
    }

    async fn action(&self, ctx: &CommandContext) -> Result<()> {
        let settings = ctx.config.load_config()?.settings;
        let value = match &self.key {
            Some(key) => settings.get(validate_enum("key", key, Settings::KEYS)?)?,
            None => settings.to_json(),
        };
        ctx.print(&value, Self::DEFAULT_PROPERTIES)
    }
}

#[derive(Args, Debug)]
pub struct SetConfig {
    /// Setting name
    #[arg(short, long)]
    pub key: String,

    /// New value
    #[arg(short, long)]
    pub value: String,
}

impl Command for SetConfig {
    const NAME: &'static str = "cli set-config";

    async fn validate(&self, _ctx: &CommandContext) -> Result<()> {
        let key = validate_enum("key", &self.key, Settings::KEYS)?;
        Settings::default().set(key, &self.value)
    }

    async fn action(&self, ctx: &CommandContext) -> Result<()> {
        let key = validate_enum("key", &self.key, Settings::KEYS)?;
        let mut config = ctx.config.load_config()?;
        config.settings.set(key, &self.value)?;
        ctx.config.save_config(&config)?;

        if ctx.verbose {
            eprintln!("{} {} set to {}", "✓".green(), key, self.value);
        }
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct ResetConfig {
    /// Setting to reset; all settings when omitted
    #[arg(short, long)]
    pub key: Option<String>,
}

impl Command for ResetConfig {
    const NAME: &'static str = "cli reset-config";

    async fn validate(&self, _ctx: &CommandContext) -> Result<()> {
        if let Some(key) = &self.key {
            validate_enum("key", key, Settings::KEYS)?;
        }
        Ok(())
    }

    async fn action(&self, ctx: &CommandContext) -> Result<()> {
        let mut config = ctx.config.load_config()?;
        let defaults = Settings::default();

        let key = match &self.key {
            Some(key) => Some(validate_enum("key", key, Settings::KEYS)?),
            None => None,
        };

        match key {
            Some("output") => config.settings.output = defaults.output,
            Some("disable_telemetry") => {
                config.settings.disable_telemetry = defaults.disable_telemetry
            }
            Some("prompt") => config.settings.prompt = defaults.prompt,
            _ => config.settings = defaults,
        }

        ctx.config.save_config(&config)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::GlobalOptions;
    use crate::config::ConfigManager;
    use crate::output::OutputSink;

    fn context(dir: &std::path::Path) -> CommandContext {
        let mut ctx =
            CommandContext::new(ConfigManager::with_dir(dir).unwrap(), &GlobalOptions::default())
                .unwrap();
        ctx.sink = OutputSink::buffer();
        ctx
    }

    #[tokio::test]
    async fn test_set_get_and_reset() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());

        let set = SetConfig {
            key: "output".into(),
            value: "Text".into(),
        };
        run_command(&set, &ctx).await.unwrap();

        let get = GetConfig {
            key: Some("output".into()),
        };
        run_command(&get, &ctx).await.unwrap();
        assert_eq!(ctx.sink.contents().trim(), "\"text\"");

        run_command(&ResetConfig { key: None }, &ctx).await.unwrap();
        assert_eq!(ctx.config.load_config().unwrap().settings, Settings::default());
    }

    #[tokio::test]
    async fn test_set_rejects_invalid_value() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());

        let set = SetConfig {
            key: "prompt".into(),
            value: "maybe".into(),
        };
        assert!(run_command(&set, &ctx).await.is_err());

        let unknown = SetConfig {
            key: "color".into(),
            value: "true".into(),
        };
        assert!(run_command(&unknown, &ctx).await.is_err());
    }
}
