mod accounts;
mod db;
mod orders;
mod sessions;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use accounts::AccountsCommands;
use db::DbCommands;
use orders::OrdersCommands;
use sessions::SessionsCommands;

#[derive(Debug, Parser)]
#[command(name = "greatkart-cli")]
#[command(about = "GreatKart storefront operator tools")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Database connectivity, migrations and catalog seeding
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Account administration
    Accounts {
        #[command(subcommand)]
        command: AccountsCommands,
    },
    /// Order inspection and fulfilment status
    Orders {
        #[command(subcommand)]
        command: OrdersCommands,
    },
    /// Session housekeeping
    Sessions {
        #[command(subcommand)]
        command: SessionsCommands,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        println!("greatkart-cli: no command given; run with --help to list commands");
        return Ok(());
    };

    let config = greatkart_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = greatkart_db::PoolConfig::from_app_config(&config);
    let pool = greatkart_db::connect_pool(&config.database_url, pool_config).await?;

    match command {
        Commands::Db { command } => match command {
            DbCommands::Ping => db::run_ping(&pool).await?,
            DbCommands::Migrate => db::run_migrate(&pool).await?,
            DbCommands::Seed { path } => {
                let path = path.unwrap_or_else(|| config.catalog_path.clone());
                db::run_seed(&pool, &path).await?;
            }
        },
        Commands::Accounts { command } => match command {
            AccountsCommands::CreateSuperuser {
                username,
                email,
                password,
            } => accounts::run_create_superuser(&pool, username, email, password).await?,
        },
        Commands::Orders { command } => match command {
            OrdersCommands::List { limit } => orders::run_list(&pool, limit).await?,
            OrdersCommands::SetStatus {
                order_number,
                status,
            } => orders::run_set_status(&pool, &order_number, status).await?,
        },
        Commands::Sessions { command } => match command {
            SessionsCommands::Purge => sessions::run_purge(&pool).await?,
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests;
