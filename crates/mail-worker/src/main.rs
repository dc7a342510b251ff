//! Casefile Mail Worker
//!
//! Delivers queued notification emails:
//! 1. Claims a batch of PENDING rows from `email_queue`
//! 2. Sends each through the configured mailer
//! 3. Marks rows SENT, or schedules a retry until attempts run out

mod worker;

use anyhow::Context;
use casefile_common::{
    config::AppConfig,
    db::DbPool,
    mail::create_mailer,
    metrics,
    queue::EmailQueueProcessor,
    telemetry, Mailer, Repository, VERSION,
};
use tokio::signal;
use tracing::info;

use crate::worker::MailWorker;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;

    telemetry::init_tracing(&config.observability);
    info!("Starting Casefile Mail Worker v{}", VERSION);

    metrics::install_exporter(config.observability.metrics_port)?;

    let db = DbPool::new(&config.database).await?;
    if config.database.run_migrations {
        db.migrate().await?;
    }

    let mailer = create_mailer(&config.mail)?;
    info!(
        provider = mailer.provider(),
        batch_size = config.mail.batch_size,
        max_attempts = config.mail.max_attempts,
        interval_secs = config.mail_interval().as_secs(),
        sending_lease_secs = config.mail.sending_lease_secs,
        "Mailer initialized"
    );

    let processor = EmailQueueProcessor::new(
        Repository::new(db),
        mailer,
        config.mail.batch_size,
        config.mail.max_attempts,
    )
    .with_sending_lease(config.sending_lease());

    MailWorker::new(processor)
        .run(config.mail_interval(), shutdown_signal())
        .await;

    info!("Mail worker shutting down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
