mod commands;
mod config;
mod logging;

use std::path::PathBuf;
use std::sync::Arc;
use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use stagehand_migrate::{connect_source, DirFs, Environment, Migrator, MigratorConfig};
use commands::migrate::Selection;
use config::CliConfig;

#[derive(Parser)]
#[command(name = "stagehand")]
#[command(about = "Apply, roll back and refresh staged SQL migrations")]
#[command(version)]
struct Cli {
    /// Database connection URL
    #[arg(long, global = true, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,

    /// Migrations directory (overrides MIGRATIONS_DIR)
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    /// Migration file extension (overrides MIGRATIONS_EXT)
    #[arg(long, global = true)]
    ext: Option<String>,

    /// History table name (overrides MIGRATIONS_TABLE)
    #[arg(long, global = true)]
    table: Option<String>,

    /// Environment: development, testing or production (overrides ENVIRONMENT)
    #[arg(long, global = true)]
    env: Option<Environment>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone)]
struct SelectionArgs {
    /// Stages to run, in order (defaults to MIGRATIONS_STAGES)
    stages: Vec<String>,

    /// Only run the named migration files
    #[arg(long = "name", short = 'n')]
    only: Vec<String>,

    /// Skip the named migration files
    #[arg(long)]
    skip: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending migrations
    Up(SelectionArgs),

    /// Roll back applied migrations
    Down(SelectionArgs),

    /// Roll back then re-apply migrations
    Refresh(SelectionArgs),

    /// Show applied migrations grouped by stage
    Summary {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Create a new migration file
    New {
        /// Migration name, optionally prefixed by a sub-directory
        name: String,

        /// Stages to declare (defaults to MIGRATIONS_STAGES)
        #[arg(long = "stage", short = 's')]
        stages: Vec<String>,
    },
}

fn migrator_config(cli: &Cli) -> anyhow::Result<MigratorConfig> {
    let mut config = MigratorConfig::from_env().context("invalid migration settings")?;

    if let Some(dir) = &cli.dir {
        config = config.with_root(dir);
    }
    if let Some(ext) = &cli.ext {
        config = config.with_extension(ext);
    }
    if let Some(table) = &cli.table {
        config = config.with_table(table);
    }
    if let Some(environment) = cli.env {
        config = config.with_environment(environment);
    }

    config.validate()?;
    Ok(config)
}

async fn connect(cli: &Cli, config: MigratorConfig) -> anyhow::Result<Migrator> {
    let Some(database_url) = cli.database_url.as_deref() else {
        bail!("no database configured; pass --database-url or set DATABASE_URL");
    };

    let source = connect_source(database_url).await?;
    let migrator = Migrator::new(source, Arc::new(DirFs::new()), config).await?;
    Ok(migrator)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = CliConfig::from_env();
    logging::init_logging(&settings.log_level, settings.log_json)?;

    let config = migrator_config(&cli)?;

    match &cli.command {
        Commands::New { name, stages } => {
            if !settings.new_allowed(config.environment) {
                bail!(
                    "creating migrations is disabled in {}; set MIGRATIONS_ALLOW_NEW=true to enable it",
                    config.environment
                );
            }
            let stages = settings.stages_or_default(stages);
            commands::new::create(&config.root, name, &config.extension, &stages)?;
        }
        Commands::Summary { json } => {
            let migrator = connect(&cli, config).await?;
            commands::migrate::summary(&migrator, *json).await?;
        }
        Commands::Up(args) => {
            let selection = selection(args, settings.stages_or_default(&args.stages));
            let migrator = connect(&cli, config).await?;
            commands::migrate::up(&migrator, &selection).await?;
        }
        Commands::Down(args) => {
            let selection = selection(args, settings.stages_or_default(&args.stages));
            let migrator = connect(&cli, config).await?;
            commands::migrate::down(&migrator, &selection).await?;
        }
        Commands::Refresh(args) => {
            let selection = selection(args, settings.refresh_stages_or_default(&args.stages));
            let migrator = connect(&cli, config).await?;
            commands::migrate::refresh(&migrator, &selection).await?;
        }
    }

    Ok(())
}

fn selection(args: &SelectionArgs, stages: Vec<String>) -> Selection {
    Selection {
        stages,
        only: args.only.clone(),
        skip: args.skip.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_up_with_filters() {
        let cli = Cli::try_parse_from([
            "stagehand", "up", "table", "index", "--name", "001_users", "--skip", "002_posts", "--env", "prod",
        ])
        .unwrap();

        assert_eq!(cli.env, Some(Environment::Production));
        match cli.command {
            Commands::Up(args) => {
                assert_eq!(args.stages, vec!["table", "index"]);
                assert_eq!(args.only, vec!["001_users"]);
                assert_eq!(args.skip, vec!["002_posts"]);
            }
            _ => panic!("expected up"),
        }
    }

    #[test]
    fn test_parse_new() {
        let cli = Cli::try_parse_from(["stagehand", "new", "billing/create invoices", "-s", "table", "--dir", "db"]).unwrap();
        assert_eq!(cli.dir, Some(PathBuf::from("db")));
        match cli.command {
            Commands::New { name, stages } => {
                assert_eq!(name, "billing/create invoices");
                assert_eq!(stages, vec!["table"]);
            }
            _ => panic!("expected new"),
        }
    }

    #[test]
    fn test_invalid_environment_is_rejected() {
        assert!(Cli::try_parse_from(["stagehand", "summary", "--env", "staging"]).is_err());
    }
}
