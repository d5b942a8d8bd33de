//! HTTP API.
//!
//! JSON routes under `/api`, one submodule per resource. Handlers hand their
//! storage work to [`AppState::run`], which executes it on the blocking pool
//! behind a single mutex; SQLite serializes writers anyway.

mod apartments;
mod billing;
mod dashboard;
mod donations;
mod error;
mod extract;
mod import;
mod incidents;
mod notifications;
mod residents;
mod vehicles;
mod visits;

use std::sync::{Arc, Mutex};

use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderName, HeaderValue, Method};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::Page;
use crate::storage::Storage;

pub use extract::{Actor, ACTOR_HEADER};

/// Shared state handed to every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    storage: Arc<Mutex<Storage>>,
    config: Arc<Config>,
}

impl AppState {
    /// Wrap an open storage and the configuration it was opened with.
    #[must_use]
    pub fn new(storage: Storage, config: Config) -> Self {
        Self {
            storage: Arc::new(Mutex::new(storage)),
            config: Arc::new(config),
        }
    }

    /// The configuration in force.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run a storage operation on the blocking pool.
    ///
    /// # Errors
    ///
    /// Returns whatever the operation returns, or an internal error if the
    /// task panicked or the lock is poisoned.
    pub async fn run<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&mut Storage) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let storage = Arc::clone(&self.storage);
        tokio::task::spawn_blocking(move || {
            let mut guard = storage
                .lock()
                .map_err(|_| Error::internal("storage lock poisoned"))?;
            op(&mut guard)
        })
        .await
        .map_err(|e| Error::internal(format!("storage task failed: {e}")))?
    }

    /// Resolve paging parameters against the configured sizes.
    #[must_use]
    pub fn page(&self, params: &PageParams) -> Page {
        let server = &self.config.server;
        let limit = params
            .limit
            .unwrap_or_else(|| i64::from(server.default_page_size))
            .clamp(1, i64::from(server.max_page_size));
        Page::new(limit, params.offset.unwrap_or(0))
    }
}

/// `limit` and `offset` query parameters.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageParams {
    /// Requested page size.
    pub limit: Option<i64>,
    /// Rows to skip.
    pub offset: Option<i64>,
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.server.cors_allowed_origins);

    let api = Router::new()
        .merge(apartments::routes())
        .merge(residents::routes())
        .merge(billing::routes())
        .merge(vehicles::routes())
        .merge(visits::routes())
        .merge(incidents::routes())
        .merge(notifications::routes())
        .merge(donations::routes())
        .merge(dashboard::routes())
        .merge(import::routes());

    Router::new()
        .route("/health", get(health))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        let parsed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!("Ignoring invalid CORS origin: {}", origin);
                    None
                }
            })
            .collect();
        AllowOrigin::list(parsed)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([CONTENT_TYPE, HeaderName::from_static(ACTOR_HEADER)])
}

/// Serve the API until Ctrl-C or SIGTERM.
///
/// # Errors
///
/// Returns an error if the listen address is invalid, the port cannot be
/// bound, or the server fails while running.
pub async fn serve(config: Config, storage: Storage) -> Result<()> {
    let addr = config.listen_addr()?;
    let app = router(AppState::new(storage, config));

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| Error::server(format!("failed to bind {addr}: {e}")))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| Error::server(e.to_string()))?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, shutting down");
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> AppState {
        AppState::new(Storage::open_in_memory().unwrap(), Config::default())
    }

    #[test]
    fn test_page_defaults() {
        let page = state().page(&PageParams::default());
        assert_eq!(page, Page::new(50, 0));
    }

    #[test]
    fn test_page_is_clamped() {
        let state = state();
        let page = state.page(&PageParams {
            limit: Some(10_000),
            offset: Some(-4),
        });
        assert_eq!(page, Page::new(500, 0));

        let page = state.page(&PageParams {
            limit: Some(0),
            offset: Some(20),
        });
        assert_eq!(page, Page::new(1, 20));
    }

    #[tokio::test]
    async fn test_run_returns_operation_result() {
        let state = state();
        let stats = state.run(|s| s.stats()).await.unwrap();
        assert_eq!(stats.rows["apartments"], 0);

        let err = state.run(|s| s.get_apartment(3)).await.unwrap_err();
        assert!(err.is_not_found());
    }
}
