use std::{str::FromStr, sync::Arc, time::Duration};

use axum::{
    Json, Router,
    extract::{
        Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post, put},
};
use crates::{
    domain::{
        repositories::{cache::SubscriptionCache, subscriptions::SubscriptionRepository},
        value_objects::{
            month_year::MonthYear,
            subscriptions::{
                DEFAULT_LIST_LIMIT, IdResponse, SubscriptionIdentifier, SubscriptionModel,
                SubscriptionPatch, SubscriptionsWithinPeriod,
            },
        },
    },
    infra::{
        cache::{redis_connection::RedisConnection, subscriptions::SubscriptionRedis},
        db::{
            postgres::postgres_connection::PgPoolSquad,
            repositories::subscriptions::SubscriptionPostgres,
        },
    },
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{axum_http::error_responses::AppError, usecases::subscriptions::SubscriptionUseCase};

pub fn routes(db_pool: Arc<PgPoolSquad>, redis_connection: RedisConnection, ttl: Duration) -> Router {
    let subscriptions_repository = SubscriptionPostgres::new(Arc::clone(&db_pool));
    let subscriptions_cache = SubscriptionRedis::new(redis_connection, ttl);
    let subscriptions_usecase = SubscriptionUseCase::new(
        Arc::new(subscriptions_repository),
        Arc::new(subscriptions_cache),
    );

    routes_with_usecase(Arc::new(subscriptions_usecase))
}

pub fn routes_with_usecase<R, C>(subscriptions_usecase: Arc<SubscriptionUseCase<R, C>>) -> Router
where
    R: SubscriptionRepository + Send + Sync + 'static,
    C: SubscriptionCache + Send + Sync + 'static,
{
    Router::new()
        .route("/create", post(create::<R, C>))
        .route("/read", get(read::<R, C>))
        .route("/update", put(update::<R, C>))
        .route("/patch", put(patch::<R, C>))
        .route("/delete", delete(remove::<R, C>))
        .route("/list", get(list::<R, C>))
        .route("/summary", get(summary::<R, C>))
        .with_state(subscriptions_usecase)
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    fn new(message: &str) -> Json<Self> {
        Json(Self {
            message: message.to_string(),
        })
    }
}

/// `id`, `user_uuid` and `service_name` as they arrive in the query string.
#[derive(Debug, Default, Deserialize)]
pub struct IdentifierQuery {
    pub id: Option<String>,
    pub user_uuid: Option<String>,
    pub service_name: Option<String>,
}

impl TryFrom<IdentifierQuery> for SubscriptionIdentifier {
    type Error = AppError;

    fn try_from(value: IdentifierQuery) -> Result<Self, Self::Error> {
        Ok(SubscriptionIdentifier {
            id: parse_field("id", value.id)?,
            user_uuid: parse_uuid(value.user_uuid)?,
            service_name: non_empty(value.service_name),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PeriodQuery {
    pub user_uuid: Option<String>,
    pub service_name: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
}

impl TryFrom<PeriodQuery> for SubscriptionsWithinPeriod {
    type Error = AppError;

    fn try_from(value: PeriodQuery) -> Result<Self, Self::Error> {
        Ok(SubscriptionsWithinPeriod {
            user_uuid: parse_uuid(value.user_uuid)?,
            service_name: non_empty(value.service_name),
            start_date: parse_field::<MonthYear>("start_date", value.start_date)?,
            end_date: parse_field::<MonthYear>("end_date", value.end_date)?,
            limit: parse_field("limit", value.limit)?.unwrap_or(DEFAULT_LIST_LIMIT),
            offset: parse_field("offset", value.offset)?.unwrap_or(0),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.is_empty())
}

fn parse_field<T>(name: &str, value: Option<String>) -> Result<Option<T>, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    non_empty(value)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|err| AppError::BadRequest(format!("{name}: {err}")))
        })
        .transpose()
}

/// The nil UUID is the "any user" wildcard.
fn parse_uuid(value: Option<String>) -> Result<Option<Uuid>, AppError> {
    Ok(parse_field::<Uuid>("user_uuid", value)?.filter(|uuid| !uuid.is_nil()))
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| AppError::BadRequest(rejection.body_text()))
}

fn query_params<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, AppError> {
    query
        .map(|Query(value)| value)
        .map_err(|rejection| AppError::BadRequest(rejection.body_text()))
}

pub async fn create<R, C>(
    State(subscriptions_usecase): State<Arc<SubscriptionUseCase<R, C>>>,
    payload: Result<Json<SubscriptionModel>, JsonRejection>,
) -> Result<impl IntoResponse, AppError>
where
    R: SubscriptionRepository + Send + Sync + 'static,
    C: SubscriptionCache + Send + Sync + 'static,
{
    let subscription = json_body(payload)?;
    let id = subscriptions_usecase.create(subscription).await?;

    Ok((StatusCode::CREATED, Json(IdResponse { id })))
}

pub async fn read<R, C>(
    State(subscriptions_usecase): State<Arc<SubscriptionUseCase<R, C>>>,
    query: Result<Query<IdentifierQuery>, QueryRejection>,
) -> Result<impl IntoResponse, AppError>
where
    R: SubscriptionRepository + Send + Sync + 'static,
    C: SubscriptionCache + Send + Sync + 'static,
{
    let identifier = SubscriptionIdentifier::try_from(query_params(query)?)?;
    let subscription = subscriptions_usecase.read(identifier).await?;

    Ok(Json(subscription))
}

pub async fn update<R, C>(
    State(subscriptions_usecase): State<Arc<SubscriptionUseCase<R, C>>>,
    payload: Result<Json<SubscriptionModel>, JsonRejection>,
) -> Result<impl IntoResponse, AppError>
where
    R: SubscriptionRepository + Send + Sync + 'static,
    C: SubscriptionCache + Send + Sync + 'static,
{
    let subscription = json_body(payload)?;
    subscriptions_usecase.update(subscription).await?;

    Ok(MessageResponse::new("subscription updated"))
}

pub async fn patch<R, C>(
    State(subscriptions_usecase): State<Arc<SubscriptionUseCase<R, C>>>,
    payload: Result<Json<SubscriptionPatch>, JsonRejection>,
) -> Result<impl IntoResponse, AppError>
where
    R: SubscriptionRepository + Send + Sync + 'static,
    C: SubscriptionCache + Send + Sync + 'static,
{
    let subscription_patch = json_body(payload)?;
    subscriptions_usecase.patch(subscription_patch).await?;

    Ok(MessageResponse::new("subscription patched"))
}

pub async fn remove<R, C>(
    State(subscriptions_usecase): State<Arc<SubscriptionUseCase<R, C>>>,
    query: Result<Query<IdentifierQuery>, QueryRejection>,
) -> Result<impl IntoResponse, AppError>
where
    R: SubscriptionRepository + Send + Sync + 'static,
    C: SubscriptionCache + Send + Sync + 'static,
{
    let identifier = SubscriptionIdentifier::try_from(query_params(query)?)?;
    subscriptions_usecase.delete(identifier).await?;

    Ok(MessageResponse::new("subscription deleted"))
}

pub async fn list<R, C>(
    State(subscriptions_usecase): State<Arc<SubscriptionUseCase<R, C>>>,
    query: Result<Query<PeriodQuery>, QueryRejection>,
) -> Result<impl IntoResponse, AppError>
where
    R: SubscriptionRepository + Send + Sync + 'static,
    C: SubscriptionCache + Send + Sync + 'static,
{
    let filter = SubscriptionsWithinPeriod::try_from(query_params(query)?)?;
    let subscriptions = subscriptions_usecase.list(filter).await?;

    Ok(Json(subscriptions))
}

pub async fn summary<R, C>(
    State(subscriptions_usecase): State<Arc<SubscriptionUseCase<R, C>>>,
    query: Result<Query<PeriodQuery>, QueryRejection>,
) -> Result<impl IntoResponse, AppError>
where
    R: SubscriptionRepository + Send + Sync + 'static,
    C: SubscriptionCache + Send + Sync + 'static,
{
    let filter = SubscriptionsWithinPeriod::try_from(query_params(query)?)?;
    let summary = subscriptions_usecase.summary(filter).await?;

    Ok(Json(summary))
}
