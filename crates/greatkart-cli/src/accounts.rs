use clap::Subcommand;
use greatkart_core::accounts::Registration;
use greatkart_db::AccountRole;

/// Sub-commands available under `accounts`.
#[derive(Debug, Subcommand)]
pub enum AccountsCommands {
    /// Create an active staff account with every privilege
    CreateSuperuser {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        /// Read from `GREATKART_SUPERUSER_PASSWORD` when not given
        #[arg(long, env = "GREATKART_SUPERUSER_PASSWORD", hide_env_values = true)]
        password: String,
    },
}

pub(crate) async fn run_create_superuser(
    pool: &sqlx::PgPool,
    username: String,
    email: String,
    password: String,
) -> anyhow::Result<()> {
    let registration = Registration {
        username,
        email,
        confirm_password: password.clone(),
        password,
    }
    .validate()?;

    let account = greatkart_db::create_account(pool, &registration, AccountRole::Superuser).await?;

    tracing::info!(account_id = account.id, "superuser created");
    println!(
        "created superuser {} <{}> (id {})",
        account.username, account.email, account.id
    );
    Ok(())
}
