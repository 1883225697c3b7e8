//! Bondguard - Panic alerts and an admin console for bail-bond client apps.
//!
//! # API Endpoints
//!
//! - `POST /session/login`, `POST /session/signup`, `POST /session/logout`
//! - `GET|PUT|DELETE /session` - Current user, profile edit, account deletion
//! - `POST /panic` - Send an emergency alert
//! - `GET /panic`, `POST /panic/cancel`, `POST /panic/call`
//! - `GET /admin/users`, `PUT|DELETE /admin/users/:id`
//! - `GET|POST /admin/recipients`, `PUT /admin/recipients/primary`,
//!   `DELETE /admin/recipients/:id`
//! - `GET /admin/metrics?period=7d|30d|all`
//! - `GET /health` - Health check
//!
//! # Configuration
//!
//! See [`bondguard::config::Config`]. Without `BONDGUARD_DATABASE_URL` the
//! server runs on the seeded in-memory demo store.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use bondguard::alert::PanicFlow;
use bondguard::api::{AppState, router};
use bondguard::config::Config;
use bondguard::demo::DemoStore;
use bondguard::linker::AppLinker;
use bondguard::storage::Storage;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing with environment filter
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("bondguard=info".parse()?))
        .init();

    let config = Config::from_env();

    info!(
        port = config.port,
        persistent = config.database_url.is_some(),
        platform = ?config.panic.platform,
        webhook = config.link_webhook.is_some(),
        "Starting Bondguard server"
    );

    let linker = AppLinker::from_webhook(config.link_webhook.as_deref());
    let panic = Arc::new(PanicFlow::new(linker, config.panic.clone()));

    let app: Router = match &config.database_url {
        Some(db_url) => {
            let store = Storage::new(db_url).await?;
            info!("Database initialized");
            router(AppState { store, panic })
        }
        None => {
            let store = DemoStore::seeded().with_latency(config.metrics_latency);
            info!("Using in-memory demo store");
            router(AppState { store, panic })
        }
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;

    info!(%addr, "Bondguard is listening");

    axum::serve(listener, app).await?;

    Ok(())
}
