use anyhow::Result;
use redis::{Client, aio::ConnectionManager};

/// Multiplexed, auto-reconnecting connection; clone it per call.
pub type RedisConnection = ConnectionManager;

pub async fn establish_connection(redis_url: &str) -> Result<RedisConnection> {
    let client = Client::open(redis_url)?;
    let connection = ConnectionManager::new(client).await?;
    Ok(connection)
}
