use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::AppState;
use clinic_core::{
    CoreConfig, DEFAULT_REST_ADDR, Document, DocumentStore, InMemoryStore, NotificationReconciler,
    ReconcilerHandle,
};

/// Main entry point for the clinic notification service
///
/// Seeds an in-memory document store, starts one reconciler over the configured view and
/// serves the REST API on top of it.
///
/// # Environment Variables
/// - `CLINIC_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `CLINIC_SCOPE`: department name or scope tag; unset or `all` for the super-admin view
/// - `CLINIC_ALERTS`: whether new unread notifications raise an alert (default: true)
/// - `CLINIC_SEED_FILE`: JSON array of notification documents loaded at startup
/// - `API_KEY`: API key required on `/notifications` routes
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("clinic_run=info".parse()?)
                .add_directive("clinic_core=info".parse()?)
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr: SocketAddr = std::env::var("CLINIC_REST_ADDR")
        .unwrap_or_else(|_| DEFAULT_REST_ADDR.into())
        .parse()?;

    let cfg = CoreConfig::from_env_values(
        std::env::var("CLINIC_SCOPE").ok(),
        std::env::var("CLINIC_ALERTS").ok(),
    )?;

    let api_key: Option<Arc<str>> = std::env::var("API_KEY")
        .ok()
        .filter(|k| !k.is_empty())
        .map(Arc::from);
    if api_key.is_none() {
        tracing::warn!("API_KEY is not set; notification routes are open");
    }

    let store = InMemoryStore::new();
    if let Ok(path) = std::env::var("CLINIC_SEED_FILE") {
        let count = seed_store(&store, Path::new(&path))?;
        tracing::info!("seeded {} notifications from {}", count, path);
    }
    let store: Arc<dyn DocumentStore> = Arc::new(store);

    let reconciler = NotificationReconciler::new(store.clone(), &cfg)
        .on_new_unread(|n| {
            tracing::info!(
                "new notification for {}: {} ({})",
                n.scope.as_deref().unwrap_or("all departments"),
                n.message,
                n.kind.as_str()
            );
        })
        .on_error(|e| tracing::warn!("notification view is stale: {}", e));
    let (handle, reconciler_task) = ReconcilerHandle::spawn(reconciler).await?;

    tracing::info!(
        "++ Watching notifications for {}",
        cfg.scope().unwrap_or("all departments")
    );
    tracing::info!("++ Starting clinic REST on {}", rest_addr);

    let rest_app = api_rest::router(AppState {
        handle: handle.clone(),
        store,
        api_key,
    });

    let listener = tokio::net::TcpListener::bind(rest_addr).await?;
    serve(listener, rest_app, handle, reconciler_task, shutdown_signal()).await
}

/// Serves `app` until `shutdown` resolves, then stops the reconciler task.
async fn serve(
    listener: tokio::net::TcpListener,
    app: axum::Router,
    handle: ReconcilerHandle,
    reconciler_task: tokio::task::JoinHandle<()>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    handle.shutdown().await;
    reconciler_task.await?;
    Ok(())
}

/// Resolves on ctrl-c. If the handler cannot be installed the server runs until killed.
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("-- Shutting down clinic REST"),
        Err(e) => {
            tracing::error!("failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

fn seed_store(store: &InMemoryStore, path: &Path) -> anyhow::Result<usize> {
    let raw = std::fs::read_to_string(path)?;
    let docs: Vec<Document> = serde_json::from_str(&raw)?;
    let count = docs.len();
    store.seed(docs)?;
    Ok(count)
}
