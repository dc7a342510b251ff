//! Casefile API Gateway
//!
//! The main entry point for all external API requests.
//! Handles:
//! - Authentication and authorization
//! - Rate limiting
//! - Request routing
//! - Observability (logging, metrics)

mod extract;
mod handlers;
mod middleware;

use anyhow::Context;
use axum::{
    extract::FromRef,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post, put},
    Router,
};
use casefile_common::{
    auth::JwtManager,
    config::AppConfig,
    db::{DbPool, Repository},
    mail::{create_mailer, Mailer},
    metrics,
    notifications::Notifier,
    telemetry,
};
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DbPool,
    pub jwt: Arc<JwtManager>,
    pub mailer: Arc<dyn Mailer>,
    pub notifier: Notifier,
}

impl AppState {
    pub fn repo(&self) -> Repository {
        Repository::new(self.db.clone())
    }
}

impl FromRef<AppState> for Arc<JwtManager> {
    fn from_ref(state: &AppState) -> Self {
        state.jwt.clone()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load().context("Failed to load configuration")?;
    let config = Arc::new(config);

    telemetry::init_tracing(&config.observability);
    info!("Starting Casefile API Gateway v{}", casefile_common::VERSION);

    metrics::install_exporter(config.observability.metrics_port)?;

    // Initialize database connection
    let db = DbPool::new(&config.database).await?;
    if config.database.run_migrations {
        db.migrate().await?;
    }

    let mailer = create_mailer(&config.mail)?;
    let notifier = Notifier::new(
        Repository::new(db.clone()),
        config.mail.public_base_url.clone(),
    );

    // Create app state
    let state = AppState {
        config: config.clone(),
        jwt: Arc::new(JwtManager::new(
            &config.auth.jwt_secret,
            config.auth.jwt_expiration_secs,
        )),
        db,
        mailer,
        notifier,
    };

    // Build the router
    let app = create_router(state);

    // Start the server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server.host / server.port")?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    let (draining_tx, draining_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = draining_tx.send(());
        })
        .into_future();
    tokio::pin!(server);

    // In-flight requests get `shutdown_timeout` to finish once draining starts
    let grace = config.shutdown_timeout();
    tokio::select! {
        result = &mut server => result?,
        _ = async {
            if draining_rx.await.is_ok() {
                tokio::time::sleep(grace).await;
            } else {
                std::future::pending::<()>().await;
            }
        } => {
            warn!(grace_secs = grace.as_secs(), "Graceful shutdown timed out, dropping open connections");
        }
    }

    info!("Server shutdown complete");
    Ok(())
}

/// API routes, mounted under `/api`
fn api_routes() -> Router<AppState> {
    Router::new()
        // Health endpoints (no auth)
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))

        // Auth
        .route("/auth/register", post(handlers::auth::register))
        .route("/auth/login", post(handlers::auth::login))

        // Cases
        .route("/cases", get(handlers::cases::list_cases).post(handlers::cases::create_case))
        .route("/cases/by-slug/{slug}", get(handlers::cases::get_case_by_slug))
        .route(
            "/cases/{id}",
            get(handlers::cases::get_case)
                .put(handlers::cases::update_case)
                .delete(handlers::cases::delete_case),
        )
        .route("/cases/{id}/timeline", post(handlers::cases::add_timeline_event))
        .route("/cases/{id}/sources", post(handlers::cases::add_source))
        .route("/cases/{id}/updates", post(handlers::cases::add_update))
        .route("/cases/{id}/comments", post(handlers::cases::add_comment))
        .route(
            "/cases/{id}/subscription",
            post(handlers::cases::subscribe).delete(handlers::cases::unsubscribe),
        )

        // Documents
        .route(
            "/documents",
            get(handlers::documents::list_documents).post(handlers::documents::create_document),
        )
        .route("/documents/download/{id}", get(handlers::documents::download_document))
        .route(
            "/documents/{id}",
            get(handlers::documents::get_document)
                .put(handlers::documents::update_document)
                .delete(handlers::documents::delete_document),
        )

        // Journalists
        .route("/journalists", get(handlers::journalists::list_journalists))
        .route(
            "/journalists/me",
            get(handlers::journalists::get_my_profile).put(handlers::journalists::update_my_profile),
        )
        .route(
            "/journalists/{id}",
            get(handlers::journalists::get_journalist).put(handlers::journalists::update_journalist),
        )

        // Verifications
        .route(
            "/verifications",
            get(handlers::verifications::list_verifications)
                .post(handlers::verifications::create_verification),
        )

        // Notifications
        .route(
            "/notifications",
            get(handlers::notifications::list_notifications)
                .post(handlers::notifications::create_notification),
        )
        .route("/notifications/mark-all-read", post(handlers::notifications::mark_all_as_read))
        .route(
            "/notifications/subscribe",
            get(handlers::notifications::subscription_status)
                .post(handlers::notifications::subscribe),
        )
        .route(
            "/notifications/{id}",
            put(handlers::notifications::mark_as_read)
                .delete(handlers::notifications::delete_notification),
        )

        // Admin
        .route("/admin/dashboard", get(handlers::admin::dashboard))
        .route(
            "/admin/email-queue",
            get(handlers::admin::email_queue_stats).post(handlers::admin::process_email_queue),
        )
        .route(
            "/admin/journalists/{id}/verification",
            put(handlers::journalists::set_verification),
        )
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    let mut api = api_routes();

    if state.config.rate_limit.enabled {
        let limiter = middleware::rate_limit::create_rate_limiter(
            state.config.rate_limit.requests_per_second,
            state.config.rate_limit.burst,
        );
        api = api.layer(from_fn_with_state(limiter, middleware::rate_limit::rate_limit));
    }

    // Compose the app
    Router::new()
        .nest("/api", api)
        .layer(from_fn(middleware::metrics::track_metrics))
        .layer(TimeoutLayer::new(state.config.request_timeout()))
        .layer(ConcurrencyLimitLayer::new(
            state.config.server.max_concurrent_requests.max(1),
        ))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(propagate_id)
        .layer(request_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
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
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
