//! HTTP server implementation for the replication target

use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        Method,
    },
    routing::{get, post, put},
    Router,
};
use std::future::Future;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;

use super::handlers;
use crate::core::{AppState, Result};
use crate::storage::StorageImpl;

/// Creates the main application router with all routes and middleware
pub fn create_router<S: StorageImpl>(app_state: Arc<AppState<S>>) -> Router {
    let config = &app_state.config;

    let database = put(handlers::create_database::<S>)
        .get(handlers::database_info::<S>)
        .delete(handlers::delete_database::<S>);

    let mut router = Router::new()
        // Server routes
        .route("/", get(handlers::root_handler))
        .route("/_up", get(handlers::up_handler))
        .route("/_all_dbs", get(handlers::all_dbs::<S>))

        // Database routes
        .route("/{db}", database.clone())
        .route("/{db}/", database)
        .route("/{db}/_revs_diff", post(handlers::revs_diff::<S>))
        .route("/{db}/_bulk_docs", post(handlers::bulk_docs::<S>))
        .route("/{db}/_ensure_full_commit", post(handlers::ensure_full_commit::<S>))
        .route("/{db}/_changes", get(handlers::changes::<S>))

        // Document routes
        .route(
            "/{db}/_design/{docid}",
            get(handlers::get_design_document::<S>)
                .put(handlers::put_design_document::<S>)
                .delete(handlers::delete_design_document::<S>),
        )
        .route(
            "/{db}/_local/{docid}",
            get(handlers::get_local_document::<S>)
                .put(handlers::put_local_document::<S>)
                .delete(handlers::delete_local_document::<S>),
        )
        .route(
            "/{db}/{docid}",
            get(handlers::get_document::<S>)
                .put(handlers::put_document::<S>)
                .delete(handlers::delete_document::<S>),
        );

    if config.metrics.enable_prometheus {
        router = router.route(&config.metrics.endpoint, get(handlers::metrics_handler));
    }

    let mut router = router.fallback(handlers::fallback_handler).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(TimeoutLayer::new(config.server.request_timeout))
            .layer(DefaultBodyLimit::max(config.server.max_request_size)),
    );

    if config.server.enable_cors {
        let cors = CorsLayer::new()
            .allow_methods([
                Method::GET,
                Method::HEAD,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([CONTENT_TYPE, AUTHORIZATION, ACCEPT])
            .allow_origin(Any)
            .allow_credentials(false);
        router = router.layer(cors);
    }

    router.with_state(app_state)
}

/// Bind the configured address and serve until `shutdown` resolves
pub async fn start_server<S, F>(app_state: Arc<AppState<S>>, shutdown: F) -> Result<()>
where
    S: StorageImpl,
    F: Future<Output = ()> + Send + 'static,
{
    let addr = app_state.config.server.http_addr;
    let app = create_router(app_state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Server stopped");
    Ok(())
}
