use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::debug;
use uuid::Uuid;

use crate::{
    domain::{
        repositories::cache::SubscriptionCache,
        value_objects::subscriptions::{
            SubscriptionIdentifier, SubscriptionLookup, SubscriptionModel,
        },
    },
    infra::cache::redis_connection::RedisConnection,
};

pub struct SubscriptionRedis {
    connection: RedisConnection,
    ttl: Duration,
}

impl SubscriptionRedis {
    pub fn new(connection: RedisConnection, ttl: Duration) -> Self {
        Self { connection, ttl }
    }
}

fn id_key(id: i32) -> String {
    format!("sub:{id}")
}

fn natural_key(user_uuid: Uuid, service_name: &str) -> String {
    format!("sub:{user_uuid}:{service_name}")
}

fn lookup_key(lookup: &SubscriptionLookup) -> String {
    match lookup {
        SubscriptionLookup::Id(id) => id_key(*id),
        SubscriptionLookup::NaturalKey {
            user_uuid,
            service_name,
        } => natural_key(*user_uuid, service_name),
    }
}

/// Every key form the identifier addresses.
fn invalidation_keys(identifier: &SubscriptionIdentifier) -> Vec<String> {
    identifier
        .surrogate_id()
        .map(id_key)
        .into_iter()
        .chain(
            identifier
                .natural_key()
                .map(|(user_uuid, service_name)| natural_key(user_uuid, service_name)),
        )
        .collect()
}

#[async_trait]
impl SubscriptionCache for SubscriptionRedis {
    async fn set_subscription(&self, subscription: SubscriptionModel) -> Result<()> {
        let payload = serde_json::to_string(&subscription)?;
        let ttl = self.ttl.as_secs().max(1);
        let mut conn = self.connection.clone();

        let () = redis::pipe()
            .atomic()
            .set_ex(id_key(subscription.id), &payload, ttl)
            .ignore()
            .set_ex(
                natural_key(subscription.user_uuid, &subscription.service_name),
                &payload,
                ttl,
            )
            .ignore()
            .query_async(&mut conn)
            .await?;

        debug!(id = subscription.id, ttl, "cache: subscription stored");
        Ok(())
    }

    async fn get_subscription(
        &self,
        identifier: SubscriptionIdentifier,
    ) -> Result<Option<SubscriptionModel>> {
        let Some(lookup) = identifier.lookup() else {
            return Ok(None);
        };
        let mut conn = self.connection.clone();

        let payload: Option<String> = conn.get(lookup_key(&lookup)).await?;
        match payload {
            Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    async fn delete_subscription(&self, identifier: SubscriptionIdentifier) -> Result<()> {
        let keys = invalidation_keys(&identifier);
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.connection.clone();

        let removed: usize = conn.del(&keys).await?;
        debug!(?keys, removed, "cache: subscription keys invalidated");
        Ok(())
    }
}
