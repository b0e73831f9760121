//! BrainRush Back binary entrypoint wiring REST, WebSocket, MongoDB, and the
//! daily scheduler together.

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use brainrush_back::{
    clock::SystemClock,
    config::AppConfig,
    coordinator::{Coordinator, CoordinatorHandle, memory::MemoryCoordinator},
    dao::quiz_store::{
        QuizStore,
        mongodb::{MongoConfig, MongoQuizStore},
    },
    routes,
    services::{scheduler, storage_supervisor},
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::from_env().context("loading configuration")?;
    let port = config.server_port;

    let coordinator = build_coordinator(&config).await?;
    let app_state = AppState::new(config, Arc::new(SystemClock), coordinator);

    spawn_storage_supervisor(app_state.clone()).await?;
    tokio::spawn(scheduler::run(app_state.clone()));

    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Select the coordinator backend. A configured URI selects the shared
/// MongoDB counters; startup aborts when it is unreachable because fences
/// must fail closed rather than silently degrade to process-local state.
async fn build_coordinator(config: &AppConfig) -> anyhow::Result<Arc<CoordinatorHandle>> {
    let backend: Arc<dyn Coordinator> = match &config.coordinator_uri {
        Some(uri) => {
            let coordinator =
                brainrush_back::coordinator::mongodb::MongoCoordinator::connect(uri, &config.store_db)
                    .await
                    .context("connecting coordinator")?;
            info!("using shared coordinator backend");
            Arc::new(coordinator)
        }
        None => {
            info!("no coordinator configured; using in-process counters");
            Arc::new(MemoryCoordinator::new())
        }
    };
    Ok(Arc::new(CoordinatorHandle::new(backend)))
}

/// Launch the storage supervisor task responsible for maintaining the
/// MongoDB connection.
async fn spawn_storage_supervisor(state: SharedState) -> anyhow::Result<()> {
    let mongo_config = Arc::new(
        MongoConfig::from_uri(&state.config().store_uri, &state.config().store_db)
            .await
            .context("parsing store URI")?,
    );

    tokio::spawn(storage_supervisor::run(state, {
        move || {
            let cfg = mongo_config.clone();
            async move {
                let store = MongoQuizStore::connect((*cfg).clone()).await?;
                Ok::<Arc<dyn QuizStore>, _>(Arc::new(store))
            }
        }
    }));

    Ok(())
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
