use clap::Subcommand;

/// Sub-commands available under `sessions`.
#[derive(Debug, Subcommand)]
pub enum SessionsCommands {
    /// Delete expired sessions (guest carts are kept)
    Purge,
}

pub(crate) async fn run_purge(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    let purged = greatkart_db::purge_expired_sessions(pool).await?;
    tracing::info!(purged, "expired sessions purged");
    println!("purged {purged} expired sessions");
    Ok(())
}
