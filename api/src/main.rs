use api::routes;
use axum::routing::{get, post};
use catalog::service::CatalogService;
use common::cache::ResultCache;
use common::config::CONFIG;
use common::logging::setup_logging;
use common::persistence::PG_POOL;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

#[tokio::main]
async fn main() {
    setup_logging("api");
    info!("starting app");
    let cancellation_token = CancellationToken::new();

    let service = Arc::new(CatalogService::new(
        PG_POOL.clone(),
        ResultCache::from_config(),
    ));
    let app = axum::Router::new()
        .route("/catalog", get(routes::catalog::page))
        .route("/catalog/count", get(routes::catalog::count))
        .route("/catalog/total", get(routes::catalog::total))
        .route("/lot", post(routes::lot::ingest))
        .route(
            "/lot/{id}",
            get(routes::lot::by_id).delete(routes::lot::delete),
        )
        .route(
            "/lot/{id}/move-historical",
            post(routes::lot::move_historical),
        )
        .with_state(service);
    let listener = tokio::net::TcpListener::bind(&CONFIG.api.bind)
        .await
        .expect("failed to bind");
    let app_done = serve(listener, app, cancellation_token.clone());

    tokio::signal::ctrl_c()
        .await
        .expect("failed to listen for ctrl c event");
    info!("exiting");
    cancellation_token.cancel();
    app_done.notified().await;
    info!("exited");
}

fn serve(
    listener: tokio::net::TcpListener,
    app: axum::Router,
    cancellation_token: CancellationToken,
) -> Arc<Notify> {
    let done = Arc::new(Notify::new());

    tokio::spawn({
        let done = done.clone();
        async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    cancellation_token.cancelled().await;
                    info!("gracefully shutting down app");
                    done.notify_waiters();
                })
                .await
                .expect("failed to serve");
        }
    });

    done
}
