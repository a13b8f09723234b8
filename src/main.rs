use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod db;
mod error;
mod routes;
mod services;

use config::Config;
use services::init;
use services::reminders::ReminderNotifier;

pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub config: Config,
    pub notifier: Arc<dyn ReminderNotifier>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "appointment_reminders=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!("Starting Appointment Reminders Service");

    // Initialize database
    let pool = init::init_db(&config).await?;

    // Construct the configured delivery channel
    let notifier = init::build_notifier(&config)?;

    let app_state = Arc::new(AppState {
        db: pool,
        config: config.clone(),
        notifier,
    });

    // Create shutdown notifier for the reminder workers
    let (shutdown_tx, _shutdown_rx) = tokio::sync::broadcast::channel::<()>(1);

    // Spawn the two reminder workers (returns JoinHandles so we can await shutdown)
    let worker_handles = init::spawn_reminder_workers(app_state.clone(), shutdown_tx.clone());

    // Build router
    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .with_state(app_state.clone())
        .layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let server_fut = axum::serve(listener, app);

    let shutdown_tx_clone = shutdown_tx.clone();
    let signal_fut = async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            let mut term =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("Failed to bind SIGTERM");
            tokio::select! {
                _ = ctrl_c => {},
                _ = term.recv() => {},
            }
        }

        #[cfg(not(unix))]
        {
            ctrl_c.await.expect("Failed to bind Ctrl+C");
        }

        tracing::info!("Shutdown signal received, notifying reminder workers");
        let _ = shutdown_tx_clone.send(());
    };

    tokio::select! {
        res = server_fut => {
            if let Err(e) = res {
                tracing::error!("Server error: {}", e);
            }
        }
        _ = signal_fut => {
            tracing::info!("Signal handler completed; server future dropped to stop accepting new connections");
        }
    }

    // Give the workers some time to finish the tick in flight.
    let shutdown_wait = Duration::from_secs(15);
    tracing::info!(
        "Waiting up to {}s for reminder workers to exit",
        shutdown_wait.as_secs()
    );

    let workers_done = async {
        for handle in worker_handles {
            let _ = handle.await;
        }
    };
    let _ = tokio::time::timeout(shutdown_wait, workers_done).await;

    tracing::info!("Shutdown complete");
    Ok(())
}
