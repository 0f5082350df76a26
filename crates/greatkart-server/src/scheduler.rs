//! Background job scheduler.
//!
//! Initialises a [`JobScheduler`] at server startup and registers the
//! expired-session sweep.

use std::sync::Arc;

use sqlx::PgPool;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

/// Builds and starts the background job scheduler.
///
/// Returns the running [`JobScheduler`] handle, which must be kept alive for
/// the lifetime of the process. Dropping it shuts down all scheduled jobs.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised, the
/// sweep schedule is not a valid cron expression, or the scheduler fails to
/// start.
pub async fn build_scheduler(
    pool: PgPool,
    config: Arc<greatkart_core::AppConfig>,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    register_session_sweep(&scheduler, pool, &config.session_sweep_cron).await?;

    scheduler.start().await?;
    Ok(scheduler)
}

/// Register the expired-session purge on `schedule` (six-field cron, UTC).
///
/// Guest carts keyed by purged sessions are left alone.
async fn register_session_sweep(
    scheduler: &JobScheduler,
    pool: PgPool,
    schedule: &str,
) -> Result<(), JobSchedulerError> {
    let pool = Arc::new(pool);

    let job = Job::new_async(schedule, move |_uuid, _lock| {
        let pool = Arc::clone(&pool);

        Box::pin(async move {
            match greatkart_db::purge_expired_sessions(&pool).await {
                Ok(purged) => tracing::info!(purged, "scheduler: expired sessions purged"),
                Err(e) => tracing::error!(error = %e, "scheduler: session purge failed"),
            }
        })
    })?;

    scheduler.add(job).await?;
    tracing::info!(schedule, "scheduler: session sweep registered");
    Ok(())
}
