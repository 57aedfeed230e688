pub mod api;
pub mod config;
pub mod error;
pub mod logic;
pub mod model;
pub mod store;

// Export API types
pub use api::{build_app, create_router, handlers, routes, AppState};

pub use config::{AppConfig, ServerSettings};
pub use error::{ApiError, ErrorResponse};

// Export all model types
pub use model::*;

// Export store types
pub use store::{Instance, MemoryStore, StoreError};

use tokio::net::TcpListener;

/// Serve `state` on an already bound listener until its shutdown token fires
pub async fn serve<I: store::Instance>(listener: TcpListener, state: AppState<I>) -> anyhow::Result<()> {
    let shutdown = state.shutdown.clone();
    let app = build_app(state);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    Ok(())
}

/// Start the server described by `config` on an in-memory instance and run
/// until Ctrl-C.
pub async fn run_server(config: &AppConfig) -> anyhow::Result<()> {
    let store = if config.store.load_seed_data {
        log::info!("loading seed data");
        MemoryStore::seeded()
    } else {
        MemoryStore::new()
    };

    let state = AppState::new(store, ServerSettings::from(config));
    let shutdown = state.shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("shutting down");
            shutdown.cancel();
        }
    });

    let bind_address = config.server_address();
    let listener = TcpListener::bind(&bind_address).await?;
    log::info!(
        "dataset gateway listening on http://{} (read_only={}, api_version={})",
        bind_address,
        config.server.read_only,
        config.server.api_version
    );

    serve(listener, state).await
}
