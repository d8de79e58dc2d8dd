use crate::{
    axum_http::{default_routers, error_responses::ErrorResponse, routers},
    config::config_model::{BackendServer, DotEnvyConfig},
};
use anyhow::Result;
use axum::{
    Json, Router,
    http::{Method, StatusCode, header::CONTENT_TYPE},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use crates::infra::{
    cache::redis_connection::RedisConnection,
    db::postgres::postgres_connection::PgPoolSquad,
};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{net::TcpListener, sync::Notify};
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{error, info, warn};

/// Mounts `subscriptions` under `/subscriptions` together with the health
/// check, the fallback and the request layers.
pub fn app(server: &BackendServer, subscriptions: Router) -> Result<Router> {
    let app = Router::new()
        .fallback(default_routers::not_found)
        .nest("/subscriptions", subscriptions)
        .route("/health-check", get(default_routers::health_check))
        .layer(TimeoutLayer::new(Duration::from_secs(server.timeout)))
        .layer(RequestBodyLimitLayer::new(
            (server.body_limit * 1024 * 1024).try_into()?,
        ))
        .layer(middleware::map_response(json_rejection_body))
        .layer(
            CorsLayer::new()
                .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
                .allow_headers([CONTENT_TYPE])
                .allow_origin(Any),
        )
        .layer(TraceLayer::new_for_http());

    Ok(app)
}

/// Timeout and body-limit rejections come back without a JSON body; give
/// them the same shape as every other error.
async fn json_rejection_body(response: Response) -> Response {
    let status = response.status();
    if !matches!(
        status,
        StatusCode::REQUEST_TIMEOUT | StatusCode::PAYLOAD_TOO_LARGE
    ) {
        return response;
    }

    let is_json = response
        .headers()
        .get(CONTENT_TYPE)
        .is_some_and(|value| value.as_bytes().starts_with(b"application/json"));
    if is_json {
        return response;
    }

    (
        status,
        Json(ErrorResponse {
            code: status.as_u16(),
            message: status
                .canonical_reason()
                .unwrap_or("Request rejected")
                .to_string(),
            detail: None,
            id: None,
        }),
    )
        .into_response()
}

pub async fn start(
    config: Arc<DotEnvyConfig>,
    db_pool: Arc<PgPoolSquad>,
    redis_connection: RedisConnection,
) -> Result<()> {
    let subscriptions = routers::subscriptions::routes(
        Arc::clone(&db_pool),
        redis_connection,
        Duration::from_secs(config.cache.ttl * 60),
    );
    let app = app(&config.backend_server, subscriptions)?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.backend_server.port));
    let listener = TcpListener::bind(addr).await?;

    info!("Server is running on port {}", config.backend_server.port);

    let shutdown = Arc::new(Notify::new());
    let server_shutdown = Arc::clone(&shutdown);
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_shutdown.notified().await })
            .await
    });

    tokio::select! {
        served = &mut server => {
            served??;
            return Ok(());
        }
        _ = shutdown_signal() => {}
    }

    let grace = Duration::from_secs(config.backend_server.shutdown_grace);
    info!(grace_secs = grace.as_secs(), "Draining in-flight requests");
    shutdown.notify_one();

    match tokio::time::timeout(grace, &mut server).await {
        Ok(served) => served??,
        Err(_) => {
            warn!("Shutdown grace period elapsed, aborting remaining requests");
            server.abort();
        }
    }

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = ?err, "Failed to install CTRL+C signal handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(error = ?err, "Failed to install SIGTERM signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received ctrl+C signal"),
        _ = terminate => info!("Received terminate signal"),
    }
}
