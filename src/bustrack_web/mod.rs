use std::fmt::Display;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use axum::routing::{get, patch, post};
use axum::{middleware, Router};
use tokio::net::ToSocketAddrs;
use tokio::signal;
use tokio::task::AbortHandle;
use tower_http::compression::CompressionLayer;
use tower_http::services::ServeDir;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tower_http::CompressionLevel;
use tracing::{info, Level};

use bustrack_geo::Geocoder;

use crate::bustrack::store::BusStore;

mod auth;
mod handlers;

#[cfg(test)]
pub(crate) mod testing;

pub struct Options<A> {
    pub store: BusStore,
    pub geocoder: Geocoder,
    pub operator_key: Option<String>,
    pub static_dir: Option<PathBuf>,
    pub addr: A,

    // aborted once the server shuts down
    pub background: Vec<AbortHandle>,
}

#[derive(Clone)]
pub struct AppState {
    pub store: BusStore,
    pub geocoder: Geocoder,
    pub operator_key: Option<Arc<str>>,
}

pub fn router(state: AppState, static_dir: Option<PathBuf>) -> Router {
    let operator_only = middleware::from_fn_with_state(state.clone(), auth::require_api_key);

    let app = Router::new()
        .route("/buses", get(handlers::buses::handle_buses_get))
        .route("/buses/{bus_id}", get(handlers::buses::handle_bus_get))
        .route(
            "/buses/{bus_id}/location",
            get(handlers::buses::handle_location_get)
                .merge(patch(handlers::buses::handle_location_patch).route_layer(operator_only.clone())),
        )
        .route(
            "/buses/{bus_id}/status",
            get(handlers::buses::handle_status_get)
                .merge(patch(handlers::buses::handle_status_patch).route_layer(operator_only)),
        )
        .route("/routes", get(handlers::routes::handle_routes_get))
        .route("/routes/{route_id}", get(handlers::routes::handle_route_get))
        .route("/routes/{route_id}/schedule", get(handlers::routes::handle_schedule_get))
        .route("/geocode", get(handlers::geocode::handle_geocode_get))
        .route("/geocode/batch", post(handlers::geocode::handle_geocode_batch_post))
        .layer(CompressionLayer::new().gzip(true).quality(CompressionLevel::Fastest));

    let app = match static_dir {
        Some(dir) => {
            info!("Serve static files from {:?}", dir);
            app.fallback_service(ServeDir::new(dir))
        }

        None => app,
    };

    app
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}

pub async fn serve<A>(opts: Options<A>) -> Result<()>
where
    A: ToSocketAddrs + Display,
{
    let state = AppState {
        store: opts.store,
        geocoder: opts.geocoder,
        operator_key: opts.operator_key.map(Arc::from),
    };

    if state.operator_key.is_none() {
        info!("No operator api key configured, bus updates are disabled");
    }

    let app = router(state, opts.static_dir);

    info!("Starting webserver on http://{}/", opts.addr);
    let listener = tokio::net::TcpListener::bind(opts.addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(opts.background))
        .await?;

    Ok(())
}

async fn shutdown_signal(background: Vec<AbortHandle>) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {:?}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }

            Err(err) => {
                tracing::error!("Failed to install signal handler: {:?}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => (),
        _ = terminate => (),
    }

    info!("Shutting down");

    for handle in background {
        handle.abort();
    }
}
