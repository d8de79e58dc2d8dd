use std::sync::Arc;

use crates::domain::{
    entities::subscriptions::{InsertSubscriptionEntity, SubscriptionEntity},
    errors::SubscriptionError,
    repositories::{cache::SubscriptionCache, subscriptions::SubscriptionRepository},
    value_objects::subscriptions::{
        SubscriptionIdentifier, SubscriptionModel, SubscriptionPatch, SubscriptionsWithinPeriod,
        SummaryModel,
    },
};
use tracing::{debug, error, info, warn};

pub const MAX_LIST_LIMIT: i64 = 100;

pub type UseCaseResult<T> = std::result::Result<T, SubscriptionError>;

pub struct SubscriptionUseCase<R, C>
where
    R: SubscriptionRepository + Send + Sync + 'static,
    C: SubscriptionCache + Send + Sync + 'static,
{
    subscription_repo: Arc<R>,
    subscription_cache: Arc<C>,
}

/// Checks a full subscription and converts it into the persisted column set.
pub fn validate_subscription(
    subscription: &SubscriptionModel,
) -> UseCaseResult<InsertSubscriptionEntity> {
    if subscription.user_uuid.is_nil() {
        return Err(SubscriptionError::bad_request("user_uuid is required"));
    }
    if subscription.service_name.trim().is_empty() {
        return Err(SubscriptionError::bad_request("service_name is required"));
    }
    if subscription.price <= 0 {
        return Err(SubscriptionError::bad_request("price must be positive"));
    }
    let Some(start_date) = subscription.start_date else {
        return Err(SubscriptionError::bad_request("start_date is required"));
    };
    if let Some(end_date) = subscription.end_date {
        if end_date < start_date {
            return Err(SubscriptionError::bad_request(
                "end_date must not be before start_date",
            ));
        }
    }

    Ok(InsertSubscriptionEntity {
        service_name: subscription.service_name.clone(),
        price: subscription.price,
        user_uuid: subscription.user_uuid,
        start_date: start_date.to_datetime(),
        end_date: subscription.end_date.map(|end_date| end_date.to_datetime()),
    })
}

fn require_lookup(identifier: &SubscriptionIdentifier) -> UseCaseResult<()> {
    match identifier.lookup() {
        Some(_) => Ok(()),
        None => Err(SubscriptionError::bad_request(
            "id or user_uuid with service_name is required",
        )),
    }
}

fn check_bounds(filter: &SubscriptionsWithinPeriod) -> UseCaseResult<()> {
    if filter.has_inverted_bounds() {
        return Err(SubscriptionError::bad_request(
            "end_date must not be before start_date",
        ));
    }
    Ok(())
}

impl<R, C> SubscriptionUseCase<R, C>
where
    R: SubscriptionRepository + Send + Sync + 'static,
    C: SubscriptionCache + Send + Sync + 'static,
{
    pub fn new(subscription_repo: Arc<R>, subscription_cache: Arc<C>) -> Self {
        Self {
            subscription_repo,
            subscription_cache,
        }
    }

    pub async fn create(&self, subscription: SubscriptionModel) -> UseCaseResult<i32> {
        let insert_subscription_entity = validate_subscription(&subscription)?;

        info!(
            user_uuid = %insert_subscription_entity.user_uuid,
            service_name = %insert_subscription_entity.service_name,
            "subscriptions: creating subscription"
        );

        let created = match self
            .subscription_repo
            .create(insert_subscription_entity)
            .await
        {
            Ok(created) => created,
            Err(SubscriptionError::Conflict { id }) => {
                info!(conflicting_id = ?id, "subscriptions: natural key already taken");
                return Err(SubscriptionError::Conflict { id });
            }
            Err(err) => {
                error!(db_error = ?err, "subscriptions: failed to create subscription");
                return Err(err);
            }
        };

        let id = created.id;
        self.fill_cache(created).await;

        info!(id, "subscriptions: subscription created");
        Ok(id)
    }

    pub async fn read(&self, identifier: SubscriptionIdentifier) -> UseCaseResult<SubscriptionModel> {
        require_lookup(&identifier)?;

        match self
            .subscription_cache
            .get_subscription(identifier.clone())
            .await
        {
            Ok(Some(cached)) => {
                debug!(id = cached.id, "subscriptions: cache hit");
                return Ok(cached);
            }
            Ok(None) => debug!("subscriptions: cache miss"),
            Err(err) => warn!(cache_error = ?err, "subscriptions: cache read failed"),
        }

        let found = self.subscription_repo.read(identifier).await.map_err(|err| {
            if !matches!(err, SubscriptionError::NotFound) {
                error!(db_error = ?err, "subscriptions: failed to read subscription");
            }
            err
        })?;

        // Misses are not written back; create is the only cache fill.
        Ok(SubscriptionModel::from(found))
    }

    /// Replaces every mutable field of subscription `subscription.id`.
    pub async fn update(&self, subscription: SubscriptionModel) -> UseCaseResult<()> {
        let insert_subscription_entity = validate_subscription(&subscription)?;
        let existing = self.existing(subscription.id).await?;

        self.overwrite(existing, insert_subscription_entity).await
    }

    /// Changes only the fields present in `patch`.
    pub async fn patch(&self, patch: SubscriptionPatch) -> UseCaseResult<()> {
        let existing = self.existing(patch.id).await?;

        let merged = patch.apply_to(SubscriptionModel::from(existing.clone()));
        let insert_subscription_entity = validate_subscription(&merged)?;

        self.overwrite(existing, insert_subscription_entity).await
    }

    pub async fn delete(&self, identifier: SubscriptionIdentifier) -> UseCaseResult<()> {
        require_lookup(&identifier)?;

        info!(?identifier, "subscriptions: deleting subscription");

        match self.subscription_repo.delete(identifier.clone()).await {
            Ok(removed) => {
                self.invalidate(SubscriptionIdentifier::from(&removed)).await;
                info!(id = removed.id, "subscriptions: subscription deleted");
                Ok(())
            }
            Err(err) => {
                self.invalidate(identifier).await;
                if !matches!(err, SubscriptionError::NotFound) {
                    error!(db_error = ?err, "subscriptions: failed to delete subscription");
                }
                Err(err)
            }
        }
    }

    pub async fn list(
        &self,
        filter: SubscriptionsWithinPeriod,
    ) -> UseCaseResult<Vec<SubscriptionModel>> {
        check_bounds(&filter)?;
        if !(1..=MAX_LIST_LIMIT).contains(&filter.limit) {
            return Err(SubscriptionError::bad_request(format!(
                "limit must be between 1 and {MAX_LIST_LIMIT}"
            )));
        }
        if filter.offset < 0 {
            return Err(SubscriptionError::bad_request("offset must not be negative"));
        }

        let rows = self.subscription_repo.list(filter).await.map_err(|err| {
            error!(db_error = ?err, "subscriptions: failed to list subscriptions");
            err
        })?;

        debug!(count = rows.len(), "subscriptions: list loaded");
        Ok(rows.into_iter().map(SubscriptionModel::from).collect())
    }

    pub async fn summary(&self, filter: SubscriptionsWithinPeriod) -> UseCaseResult<SummaryModel> {
        if filter.start_date.is_none() || filter.end_date.is_none() {
            return Err(SubscriptionError::bad_request(
                "start_date and end_date are required",
            ));
        }
        check_bounds(&filter)?;

        let summary = self.subscription_repo.summary(filter).await.map_err(|err| {
            error!(db_error = ?err, "subscriptions: failed to compute summary");
            err
        })?;

        info!(
            amount = summary.amount,
            months = summary.months,
            total = summary.total,
            "subscriptions: summary computed"
        );
        Ok(summary)
    }

    async fn existing(&self, id: i32) -> UseCaseResult<SubscriptionEntity> {
        if id <= 0 {
            return Err(SubscriptionError::bad_request("id must be positive"));
        }

        self.subscription_repo
            .read(SubscriptionIdentifier::by_id(id))
            .await
    }

    /// Persists new column values for `existing` and drops every cache key
    /// the row was reachable under before the write.
    async fn overwrite(
        &self,
        existing: SubscriptionEntity,
        insert_subscription_entity: InsertSubscriptionEntity,
    ) -> UseCaseResult<()> {
        info!(id = existing.id, "subscriptions: updating subscription");

        let result = self
            .subscription_repo
            .update(existing.id, insert_subscription_entity)
            .await;

        self.invalidate(SubscriptionIdentifier::from(&existing)).await;

        match result {
            Ok(()) => {
                info!(id = existing.id, "subscriptions: subscription updated");
                Ok(())
            }
            Err(err) => {
                if matches!(err, SubscriptionError::Internal(_)) {
                    error!(db_error = ?err, id = existing.id, "subscriptions: failed to update subscription");
                }
                Err(err)
            }
        }
    }

    async fn fill_cache(&self, entity: SubscriptionEntity) {
        let id = entity.id;
        if let Err(err) = self
            .subscription_cache
            .set_subscription(SubscriptionModel::from(entity))
            .await
        {
            warn!(id, cache_error = ?err, "subscriptions: cache fill failed");
        }
    }

    async fn invalidate(&self, identifier: SubscriptionIdentifier) {
        if let Err(err) = self
            .subscription_cache
            .delete_subscription(identifier)
            .await
        {
            warn!(cache_error = ?err, "subscriptions: cache invalidation failed");
        }
    }
}
