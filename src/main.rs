use std::sync::Arc;
use tracing::info;

mod api;
mod chat;
mod journal;
mod store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    if let Err(e) = dotenvy::dotenv() {
        // It's not fatal if .env doesn't exist, but good to know
        info!("No .env file found or failed to load: {}", e);
    }

    // Initialize logging with default filter if RUST_LOG is not set
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    info!("Palaver daemon starting...");

    // Initialize the Store
    // Defaults to ~/.palaver/palaver.db unless PALAVER_DB overrides it
    let home_dir = std::env::var("HOME").unwrap_or_else(|_| ".".into());
    let db_path = match std::env::var("PALAVER_DB") {
        Ok(path) => std::path::PathBuf::from(path),
        Err(_) => std::path::Path::new(&home_dir)
            .join(".palaver")
            .join("palaver.db"),
    };

    info!("Initializing store at {}", db_path.display());
    let store = store::Store::new(&db_path).await?;
    store.init().await?;

    // The operation journal lives next to the database by default
    let log_path = match std::env::var("PALAVER_LOG") {
        Ok(path) => std::path::PathBuf::from(path),
        Err(_) => db_path.with_file_name("logs.log"),
    };
    let journal = journal::Journal::new(log_path);

    let state = Arc::new(api::AppState { store, journal });
    let app = api::router(state);

    let port: u16 = std::env::var("PALAVER_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000);
    info!("Starting API server on port {}", port);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        res = axum::serve(listener, app) => {
            if let Err(e) = res {
                info!("Server stopped with error: {}", e);
            }
        }
    }

    Ok(())
}
