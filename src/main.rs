use clap::{Parser, Subcommand};
use colored::Colorize;
use m365_cli::cmd::{self, CommandContext, GlobalOptions};
use m365_cli::config::ConfigManager;
use m365_cli::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "m365",
    about = "Manage Microsoft 365 from the command line",
    version,
    long_about = "Manage Microsoft 365 from the command line\n\n\
                  Entra ID, Purview, SharePoint Online and Power Platform.\n\
                  Commands follow `m365 <area> <verb>-<noun>`."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOptions,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sign in to a Microsoft 365 tenant
    Login(cmd::login::LoginArgs),

    /// Sign out and clear cached tokens
    Logout(cmd::login::LogoutArgs),

    /// Show the active tenant and cached tokens
    Status(cmd::login::StatusArgs),

    /// Manage tenant profiles
    #[command(subcommand)]
    Tenant(cmd::tenant::TenantCommands),

    /// Manage CLI settings
    #[command(subcommand)]
    Cli(cmd::cli::CliCommands),

    /// Entra ID users, groups, app registrations and policies
    #[command(subcommand)]
    Entra(cmd::entra::EntraCommands),

    /// Microsoft Purview retention labels
    #[command(subcommand)]
    Purview(cmd::purview::PurviewCommands),

    /// SharePoint Online sites and lists
    #[command(subcommand)]
    Spo(cmd::spo::SpoCommands),

    /// Power Platform environments and solutions
    #[command(subcommand)]
    Pp(cmd::pp::PpCommands),

    /// Power Apps
    #[command(subcommand)]
    Pa(cmd::pa::PaCommands),
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

/// Logs go to stderr so stdout only carries command output
fn init_logging(global: &GlobalOptions) {
    let default_filter = if global.debug {
        "m365_cli=debug,m365=debug"
    } else if global.verbose {
        "m365_cli=info"
    } else {
        "m365_cli=warn"
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> error::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.global);

    let ctx = CommandContext::new(ConfigManager::new()?, &cli.global)?;

    match cli.command {
        Commands::Login(args) => cmd::login::login(args, &ctx).await?,
        Commands::Logout(args) => cmd::login::logout(args, &ctx).await?,
        Commands::Status(args) => cmd::login::status(args, &ctx).await?,
        Commands::Tenant(command) => cmd::tenant::run(command, &ctx).await?,
        Commands::Cli(command) => cmd::cli::run(command, &ctx).await?,
        Commands::Entra(command) => cmd::entra::run(command, &ctx).await?,
        Commands::Purview(command) => cmd::purview::run(command, &ctx).await?,
        Commands::Spo(command) => cmd::spo::run(command, &ctx).await?,
        Commands::Pp(command) => cmd::pp::run(command, &ctx).await?,
        Commands::Pa(command) => cmd::pa::run(command, &ctx).await?,
    }

    Ok(())
}
