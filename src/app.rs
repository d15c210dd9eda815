use crate::config::Config;
use crate::data::PgStore;
use crate::shopify::AdminApi;
use crate::state::AppState;
use crate::sync::cache::SystemClock;
use crate::sync::entity::EntityType;
use crate::sync::fetcher::Fetcher;
use crate::sync::reconcile::Reconciler;
use crate::sync::runner::{RunOptions, RunSettings, SyncRunner};
use crate::utils::fmt_duration;
use anyhow::Context;
use sqlx::ConnectOptions;
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Main application struct: configuration plus the wired-up sync engine.
pub struct App {
    config: Config,
    app_state: AppState,
}

impl App {
    /// Connect to the database, run migrations and build the engine.
    pub async fn new(config: Config) -> Result<Self, anyhow::Error> {
        let slow_threshold = Duration::from_millis(500);
        let connect_options = sqlx::postgres::PgConnectOptions::from_str(&config.database_url)
            .context("Failed to parse database URL")?
            .log_statements(tracing::log::LevelFilter::Debug)
            .log_slow_statements(tracing::log::LevelFilter::Warn, Duration::from_secs(1));

        let db_pool = PgPoolOptions::new()
            .min_connections(0)
            .max_connections(4)
            .acquire_slow_threshold(slow_threshold)
            .acquire_timeout(Duration::from_secs(4))
            .idle_timeout(Duration::from_secs(60 * 2))
            .max_lifetime(Duration::from_secs(60 * 30))
            .connect_with(connect_options)
            .await
            .context("Failed to create database pool")?;

        info!(
            max_connections = 4,
            acquire_slow_threshold = fmt_duration(slow_threshold),
            "database pool established"
        );

        info!("Running database migrations...");
        sqlx::migrate!("./migrations")
            .run(&db_pool)
            .await
            .context("Failed to run database migrations")?;
        info!("Database migrations completed successfully");

        let admin_api = AdminApi::new(
            config.shopify_graphql_url.clone(),
            config.shopify_access_token.clone(),
            config.upstream_timeout,
            config.upstream_rate_limit,
        )
        .context("Failed to create Admin API client")?;

        let store = Arc::new(PgStore::new(db_pool));
        let runner = SyncRunner::new(
            Fetcher::new(Arc::new(admin_api)),
            Reconciler::new(store.clone()),
            store.clone(),
            Arc::new(SystemClock),
            config.cache_ttl,
            RunSettings {
                page_size: config.sync_page_size,
                run_timeout: config.sync_run_timeout,
            },
        );

        info!(
            cache_ttl = fmt_duration(config.cache_ttl),
            page_size = config.sync_page_size,
            run_timeout = fmt_duration(config.sync_run_timeout),
            "sync engine ready"
        );

        let app_state = AppState::new(
            Arc::new(runner),
            store.clone(),
            store,
            CancellationToken::new(),
        );

        Ok(App { config, app_state })
    }

    /// Serve HTTP until a shutdown signal arrives.
    ///
    /// On shutdown the run token is cancelled first, so in-flight syncs stop
    /// at the next item and respond with what they have.
    pub async fn serve(self) -> ExitCode {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.port));
        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(e) => {
                error!(%addr, error = %e, "failed to bind listener");
                return ExitCode::FAILURE;
            }
        };
        info!(%addr, "listening");

        let shutdown = self.app_state.shutdown.clone();
        let router = crate::web::create_router(self.app_state);
        let server = tokio::spawn(
            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown.clone().cancelled_owned())
                .into_future(),
        );

        shutdown_signal().await;
        shutdown.cancel();
        info!(
            timeout = fmt_duration(self.config.shutdown_timeout),
            "shutting down"
        );

        match tokio::time::timeout(self.config.shutdown_timeout, server).await {
            Ok(Ok(Ok(()))) => {
                info!("graceful shutdown complete");
                ExitCode::SUCCESS
            }
            Ok(Ok(Err(e))) => {
                error!(error = %e, "server error during shutdown");
                ExitCode::FAILURE
            }
            Ok(Err(e)) => {
                error!(error = %e, "server task panicked");
                ExitCode::FAILURE
            }
            Err(_) => {
                warn!("shutdown timed out; exiting with requests still in flight");
                ExitCode::FAILURE
            }
        }
    }

    /// Run one sync (or all of them) and print the JSON result to stdout.
    pub async fn sync_once(&self, target: &str, force: bool, limit: Option<u32>) -> ExitCode {
        let options = RunOptions {
            force_refresh: force,
            limit,
        };
        let runner = &self.app_state.runner;
        let cancel = self.app_state.shutdown.clone();
        let ctrl_c = cancel.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            ctrl_c.cancel();
        });

        let outcomes = if target.eq_ignore_ascii_case("all") {
            runner.run_all(options, &cancel).await
        } else {
            let entity_type = match target.parse::<EntityType>() {
                Ok(entity_type) => entity_type,
                Err(e) => {
                    error!(error = %e, "cannot start sync");
                    return ExitCode::FAILURE;
                }
            };
            vec![(entity_type, runner.run(entity_type, options, &cancel).await)]
        };

        let mut failed = false;
        let rendered: Vec<serde_json::Value> = outcomes
            .into_iter()
            .map(|(entity_type, outcome)| match outcome {
                Ok(result) => serde_json::json!({ "success": true, "result": result }),
                Err(e) => {
                    failed = true;
                    serde_json::json!({
                        "entityType": entity_type,
                        "success": false,
                        "error": e.to_string(),
                    })
                }
            })
            .collect();

        match serde_json::to_string_pretty(&rendered) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                error!(error = %e, "failed to render sync result");
                return ExitCode::FAILURE;
            }
        }

        if failed {
            ExitCode::FAILURE
        } else {
            ExitCode::SUCCESS
        }
    }
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl-C"),
        _ = terminate => info!("received SIGTERM"),
    }
}
