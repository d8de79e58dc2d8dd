use anyhow::Result;
use backend::axum_http::http_serve;
use backend::config::config_loader;
use crates::infra::{
    cache::redis_connection,
    db::postgres::postgres_connection::{self, PostgresSettings},
};
use std::{sync::Arc, time::Duration};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        error!("Backend exited with error: {:#}", error);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    crates::observability::init_observability("backend")?;

    let dotenvy_env = config_loader::load()?;
    info!("ENV has been loaded");

    let postgres_pool = postgres_connection::establish_connection(
        &dotenvy_env.database.url,
        &PostgresSettings {
            max_connections: dotenvy_env.database.max_connections,
            statement_timeout: Duration::from_secs(dotenvy_env.backend_server.timeout),
        },
    )?;
    info!("Postgres connection has been established");

    let redis_connection = redis_connection::establish_connection(&dotenvy_env.cache.url).await?;
    info!("Redis connection has been established");

    http_serve::start(
        Arc::new(dotenvy_env),
        Arc::new(postgres_pool),
        redis_connection,
    )
    .await?;

    info!("Postgres pool and Redis connection released");
    Ok(())
}
