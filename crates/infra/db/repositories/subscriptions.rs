use async_trait::async_trait;
use chrono::Utc;
use diesel::{PgConnection, RunQueryDsl, delete, insert_into, prelude::*, update};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    domain,
    infra::db::postgres::{postgres_connection::PgPoolSquad, schema::subscriptions},
};
use domain::{
    entities::subscriptions::{InsertSubscriptionEntity, SubscriptionEntity},
    errors::{RepositoryResult, SubscriptionError},
    repositories::subscriptions::SubscriptionRepository,
    value_objects::subscriptions::{
        SubscriptionIdentifier, SubscriptionLookup, SubscriptionsWithinPeriod, SummaryModel,
    },
};

pub struct SubscriptionPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl SubscriptionPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }

    /// Runs blocking diesel work on the blocking pool with a pooled connection.
    async fn with_conn<T, F>(&self, work: F) -> RepositoryResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut PgConnection) -> RepositoryResult<T> + Send + 'static,
    {
        let db_pool = Arc::clone(&self.db_pool);

        tokio::task::spawn_blocking(move || {
            let mut conn = db_pool.get().map_err(anyhow::Error::from)?;
            work(&mut conn)
        })
        .await
        .map_err(|err| SubscriptionError::Internal(err.into()))?
    }
}

fn resolve(identifier: &SubscriptionIdentifier) -> RepositoryResult<SubscriptionLookup> {
    identifier.lookup().ok_or_else(|| {
        SubscriptionError::bad_request("id or user_uuid with service_name is required")
    })
}

fn find(
    conn: &mut PgConnection,
    lookup: &SubscriptionLookup,
) -> QueryResult<Option<SubscriptionEntity>> {
    let query = subscriptions::table
        .select(SubscriptionEntity::as_select())
        .into_boxed();

    let query = match lookup {
        SubscriptionLookup::Id(id) => query.filter(subscriptions::id.eq(*id)),
        SubscriptionLookup::NaturalKey {
            user_uuid,
            service_name,
        } => query
            .filter(subscriptions::user_uuid.eq(*user_uuid))
            .filter(subscriptions::service_name.eq(service_name.as_str())),
    };

    query.first::<SubscriptionEntity>(conn).optional()
}

fn find_owner(
    conn: &mut PgConnection,
    user_uuid: Uuid,
    service_name: &str,
) -> QueryResult<Option<i32>> {
    subscriptions::table
        .filter(subscriptions::user_uuid.eq(user_uuid))
        .filter(subscriptions::service_name.eq(service_name))
        .select(subscriptions::id)
        .first::<i32>(conn)
        .optional()
}

/// A unique violation means a concurrent writer won the natural key between
/// our probe and our write; report whoever holds it now.
fn with_conflicting_id(
    conn: &mut PgConnection,
    err: diesel::result::Error,
    entity: &InsertSubscriptionEntity,
) -> SubscriptionError {
    match SubscriptionError::from(err) {
        SubscriptionError::Conflict { id: None } => SubscriptionError::Conflict {
            id: find_owner(conn, entity.user_uuid, &entity.service_name)
                .ok()
                .flatten(),
        },
        other => other,
    }
}

/// Rows matching the user/service filter whose active period intersects
/// the filter bounds. Unset filter fields match everything.
fn load_matching(
    conn: &mut PgConnection,
    filter: &SubscriptionsWithinPeriod,
    paginate: bool,
) -> QueryResult<Vec<SubscriptionEntity>> {
    let mut query = subscriptions::table
        .select(SubscriptionEntity::as_select())
        .into_boxed();

    if let Some(user_uuid) = filter.user_uuid.filter(|uuid| !uuid.is_nil()) {
        query = query.filter(subscriptions::user_uuid.eq(user_uuid));
    }

    if let Some(service_name) = filter.service_name.as_deref().filter(|name| !name.is_empty()) {
        query = query.filter(subscriptions::service_name.eq(service_name.to_string()));
    }

    if let Some(end_date) = filter.end_date {
        query = query.filter(subscriptions::start_date.le(end_date.to_datetime()));
    }

    if let Some(start_date) = filter.start_date {
        query = query.filter(
            subscriptions::end_date
                .is_null()
                .or(subscriptions::end_date.ge(start_date.to_datetime())),
        );
    }

    query = query.order(subscriptions::id.asc());

    if paginate {
        query = query.limit(filter.limit).offset(filter.offset);
    }

    query.load::<SubscriptionEntity>(conn)
}

#[async_trait]
impl SubscriptionRepository for SubscriptionPostgres {
    async fn create(
        &self,
        insert_subscription_entity: InsertSubscriptionEntity,
    ) -> RepositoryResult<SubscriptionEntity> {
        self.with_conn(move |conn| {
            if let Some(id) = find_owner(
                conn,
                insert_subscription_entity.user_uuid,
                &insert_subscription_entity.service_name,
            )? {
                return Err(SubscriptionError::Conflict { id: Some(id) });
            }

            insert_into(subscriptions::table)
                .values(&insert_subscription_entity)
                .returning(SubscriptionEntity::as_returning())
                .get_result::<SubscriptionEntity>(conn)
                .map_err(|err| with_conflicting_id(conn, err, &insert_subscription_entity))
        })
        .await
    }

    async fn read(
        &self,
        identifier: SubscriptionIdentifier,
    ) -> RepositoryResult<SubscriptionEntity> {
        let lookup = resolve(&identifier)?;

        self.with_conn(move |conn| find(conn, &lookup)?.ok_or(SubscriptionError::NotFound))
            .await
    }

    async fn update(
        &self,
        id: i32,
        insert_subscription_entity: InsertSubscriptionEntity,
    ) -> RepositoryResult<()> {
        self.with_conn(move |conn| {
            let owner = find_owner(
                conn,
                insert_subscription_entity.user_uuid,
                &insert_subscription_entity.service_name,
            )?;
            if let Some(owner) = owner.filter(|owner| *owner != id) {
                return Err(SubscriptionError::Conflict { id: Some(owner) });
            }

            let affected = update(subscriptions::table.find(id))
                .set((
                    &insert_subscription_entity,
                    subscriptions::updated_at.eq(Utc::now()),
                ))
                .execute(conn)
                .map_err(|err| with_conflicting_id(conn, err, &insert_subscription_entity))?;

            if affected == 0 {
                return Err(SubscriptionError::NotFound);
            }

            Ok(())
        })
        .await
    }

    async fn delete(
        &self,
        identifier: SubscriptionIdentifier,
    ) -> RepositoryResult<SubscriptionEntity> {
        let lookup = resolve(&identifier)?;

        self.with_conn(move |conn| {
            let deleted = match lookup {
                SubscriptionLookup::Id(id) => delete(subscriptions::table.find(id))
                    .returning(SubscriptionEntity::as_returning())
                    .get_result::<SubscriptionEntity>(conn)
                    .optional()?,
                SubscriptionLookup::NaturalKey {
                    user_uuid,
                    service_name,
                } => delete(
                    subscriptions::table
                        .filter(subscriptions::user_uuid.eq(user_uuid))
                        .filter(subscriptions::service_name.eq(service_name)),
                )
                .returning(SubscriptionEntity::as_returning())
                .get_result::<SubscriptionEntity>(conn)
                .optional()?,
            };

            deleted.ok_or(SubscriptionError::NotFound)
        })
        .await
    }

    async fn list(
        &self,
        filter: SubscriptionsWithinPeriod,
    ) -> RepositoryResult<Vec<SubscriptionEntity>> {
        self.with_conn(move |conn| Ok(load_matching(conn, &filter, true)?))
            .await
    }

    async fn summary(&self, filter: SubscriptionsWithinPeriod) -> RepositoryResult<SummaryModel> {
        let window = filter.billing_window().ok_or_else(|| {
            SubscriptionError::bad_request("summary requires start_date <= end_date")
        })?;

        self.with_conn(move |conn| {
            let rows = load_matching(conn, &filter, false)?;
            Ok(window.summarize(
                rows.into_iter()
                    .map(|row| (row.price, row.start_date, row.end_date)),
            ))
        })
        .await
    }
}
