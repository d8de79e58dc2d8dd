use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;

use crate::domain::value_objects::subscriptions::{SubscriptionIdentifier, SubscriptionModel};

/// Volatile projection of subscriptions, addressable by id and by natural
/// key. Entries expire on their own; nothing here is authoritative.
#[async_trait]
#[automock]
pub trait SubscriptionCache {
    /// Writes the subscription under both of its keys.
    async fn set_subscription(&self, subscription: SubscriptionModel) -> Result<()>;

    /// `Ok(None)` on a miss.
    async fn get_subscription(
        &self,
        identifier: SubscriptionIdentifier,
    ) -> Result<Option<SubscriptionModel>>;

    /// Drops every key form the identifier can produce.
    async fn delete_subscription(&self, identifier: SubscriptionIdentifier) -> Result<()>;
}
