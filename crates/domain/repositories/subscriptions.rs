use async_trait::async_trait;
use mockall::automock;

use crate::domain::{
    entities::subscriptions::{InsertSubscriptionEntity, SubscriptionEntity},
    errors::RepositoryResult,
    value_objects::subscriptions::{
        SubscriptionIdentifier, SubscriptionsWithinPeriod, SummaryModel,
    },
};

/// Authoritative store for subscriptions.
#[async_trait]
#[automock]
pub trait SubscriptionRepository {
    /// Inserts a row unless another one already owns the natural key, in
    /// which case `Conflict` carries that row's id.
    async fn create(
        &self,
        insert_subscription_entity: InsertSubscriptionEntity,
    ) -> RepositoryResult<SubscriptionEntity>;

    async fn read(
        &self,
        identifier: SubscriptionIdentifier,
    ) -> RepositoryResult<SubscriptionEntity>;

    /// Overwrites every mutable column of row `id` and bumps `updated_at`.
    async fn update(
        &self,
        id: i32,
        insert_subscription_entity: InsertSubscriptionEntity,
    ) -> RepositoryResult<()>;

    /// Removes the addressed row and hands it back.
    async fn delete(
        &self,
        identifier: SubscriptionIdentifier,
    ) -> RepositoryResult<SubscriptionEntity>;

    async fn list(
        &self,
        filter: SubscriptionsWithinPeriod,
    ) -> RepositoryResult<Vec<SubscriptionEntity>>;

    /// Requires both period bounds.
    async fn summary(&self, filter: SubscriptionsWithinPeriod) -> RepositoryResult<SummaryModel>;
}
