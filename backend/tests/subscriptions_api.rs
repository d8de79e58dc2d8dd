use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use anyhow::Result;
use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode},
};
use backend::{
    axum_http::{http_serve, routers::subscriptions::routes_with_usecase},
    config::config_model::BackendServer,
    usecases::subscriptions::SubscriptionUseCase,
};
use chrono::Utc;
use crates::domain::{
    entities::subscriptions::{InsertSubscriptionEntity, SubscriptionEntity},
    errors::{RepositoryResult, SubscriptionError},
    repositories::{cache::SubscriptionCache, subscriptions::SubscriptionRepository},
    value_objects::subscriptions::{
        SubscriptionIdentifier, SubscriptionLookup, SubscriptionModel, SubscriptionsWithinPeriod,
        SummaryModel,
    },
};
use serde_json::{Value, json};
use tokio::sync::Notify;
use tower::ServiceExt;
use uuid::Uuid;

#[derive(Default)]
struct InMemoryRepository {
    rows: Mutex<Vec<SubscriptionEntity>>,
}

impl InMemoryRepository {
    fn matches(row: &SubscriptionEntity, lookup: &SubscriptionLookup) -> bool {
        match lookup {
            SubscriptionLookup::Id(id) => row.id == *id,
            SubscriptionLookup::NaturalKey {
                user_uuid,
                service_name,
            } => row.user_uuid == *user_uuid && row.service_name == *service_name,
        }
    }

    fn owner(rows: &[SubscriptionEntity], entity: &InsertSubscriptionEntity) -> Option<i32> {
        rows.iter()
            .find(|row| row.user_uuid == entity.user_uuid && row.service_name == entity.service_name)
            .map(|row| row.id)
    }

    fn matching(&self, filter: &SubscriptionsWithinPeriod) -> Vec<SubscriptionEntity> {
        let rows = self.rows.lock().unwrap();
        let mut matching: Vec<_> = rows
            .iter()
            .filter(|row| filter.user_uuid.is_none_or(|uuid| row.user_uuid == uuid))
            .filter(|row| {
                filter
                    .service_name
                    .as_ref()
                    .is_none_or(|name| &row.service_name == name)
            })
            .filter(|row| {
                filter
                    .end_date
                    .is_none_or(|end| row.start_date <= end.to_datetime())
            })
            .filter(|row| {
                filter.start_date.is_none_or(|start| {
                    row.end_date
                        .is_none_or(|row_end| row_end >= start.to_datetime())
                })
            })
            .cloned()
            .collect();
        matching.sort_by_key(|row| row.id);
        matching
    }
}

#[async_trait]
impl SubscriptionRepository for InMemoryRepository {
    async fn create(
        &self,
        insert_subscription_entity: InsertSubscriptionEntity,
    ) -> RepositoryResult<SubscriptionEntity> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(id) = Self::owner(&rows, &insert_subscription_entity) {
            return Err(SubscriptionError::Conflict { id: Some(id) });
        }

        let now = Utc::now();
        let entity = SubscriptionEntity {
            id: rows.iter().map(|row| row.id).max().unwrap_or(0) + 1,
            service_name: insert_subscription_entity.service_name,
            price: insert_subscription_entity.price,
            user_uuid: insert_subscription_entity.user_uuid,
            start_date: insert_subscription_entity.start_date,
            end_date: insert_subscription_entity.end_date,
            created_at: now,
            updated_at: now,
        };
        rows.push(entity.clone());
        Ok(entity)
    }

    async fn read(&self, identifier: SubscriptionIdentifier) -> RepositoryResult<SubscriptionEntity> {
        let lookup = identifier
            .lookup()
            .ok_or_else(|| SubscriptionError::bad_request("no usable identifier"))?;
        self.rows
            .lock()
            .unwrap()
            .iter()
            .find(|row| Self::matches(row, &lookup))
            .cloned()
            .ok_or(SubscriptionError::NotFound)
    }

    async fn update(
        &self,
        id: i32,
        insert_subscription_entity: InsertSubscriptionEntity,
    ) -> RepositoryResult<()> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(owner) = Self::owner(&rows, &insert_subscription_entity).filter(|owner| *owner != id) {
            return Err(SubscriptionError::Conflict { id: Some(owner) });
        }

        let row = rows
            .iter_mut()
            .find(|row| row.id == id)
            .ok_or(SubscriptionError::NotFound)?;
        row.service_name = insert_subscription_entity.service_name;
        row.price = insert_subscription_entity.price;
        row.user_uuid = insert_subscription_entity.user_uuid;
        row.start_date = insert_subscription_entity.start_date;
        row.end_date = insert_subscription_entity.end_date;
        row.updated_at = Utc::now();
        Ok(())
    }

    async fn delete(&self, identifier: SubscriptionIdentifier) -> RepositoryResult<SubscriptionEntity> {
        let lookup = identifier
            .lookup()
            .ok_or_else(|| SubscriptionError::bad_request("no usable identifier"))?;
        let mut rows = self.rows.lock().unwrap();
        let position = rows
            .iter()
            .position(|row| Self::matches(row, &lookup))
            .ok_or(SubscriptionError::NotFound)?;
        Ok(rows.remove(position))
    }

    async fn list(
        &self,
        filter: SubscriptionsWithinPeriod,
    ) -> RepositoryResult<Vec<SubscriptionEntity>> {
        Ok(self
            .matching(&filter)
            .into_iter()
            .skip(filter.offset as usize)
            .take(filter.limit as usize)
            .collect())
    }

    async fn summary(&self, filter: SubscriptionsWithinPeriod) -> RepositoryResult<SummaryModel> {
        let window = filter
            .billing_window()
            .ok_or_else(|| SubscriptionError::bad_request("bounds required"))?;
        Ok(window.summarize(
            self.matching(&filter)
                .into_iter()
                .map(|row| (row.price, row.start_date, row.end_date)),
        ))
    }
}

#[derive(Default)]
struct InMemoryCache {
    entries: Mutex<HashMap<String, SubscriptionModel>>,
}

impl InMemoryCache {
    fn keys(identifier: &SubscriptionIdentifier) -> Vec<String> {
        let mut keys = Vec::new();
        if let Some(id) = identifier.surrogate_id() {
            keys.push(format!("sub:{id}"));
        }
        if let Some((user_uuid, service_name)) = identifier.natural_key() {
            keys.push(format!("sub:{user_uuid}:{service_name}"));
        }
        keys
    }

    fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

#[async_trait]
impl SubscriptionCache for InMemoryCache {
    async fn set_subscription(&self, subscription: SubscriptionModel) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        for key in Self::keys(&SubscriptionIdentifier::from(&subscription)) {
            entries.insert(key, subscription.clone());
        }
        Ok(())
    }

    async fn get_subscription(
        &self,
        identifier: SubscriptionIdentifier,
    ) -> Result<Option<SubscriptionModel>> {
        let key = match identifier.lookup() {
            Some(SubscriptionLookup::Id(id)) => format!("sub:{id}"),
            Some(SubscriptionLookup::NaturalKey {
                user_uuid,
                service_name,
            }) => format!("sub:{user_uuid}:{service_name}"),
            None => return Ok(None),
        };
        Ok(self.entries.lock().unwrap().get(&key).cloned())
    }

    async fn delete_subscription(&self, identifier: SubscriptionIdentifier) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        for key in Self::keys(&identifier) {
            entries.remove(&key);
        }
        Ok(())
    }
}

struct TestApp {
    router: Router,
    cache: Arc<InMemoryCache>,
}

fn test_app() -> TestApp {
    let repository = Arc::new(InMemoryRepository::default());
    let cache = Arc::new(InMemoryCache::default());
    let usecase = SubscriptionUseCase::new(Arc::clone(&repository), Arc::clone(&cache));

    let server = BackendServer {
        port: 0,
        body_limit: 1,
        timeout: 30,
        shutdown_grace: 1,
    };
    let router = http_serve::app(&server, routes_with_usecase(Arc::new(usecase))).unwrap();

    TestApp { router, cache }
}

impl TestApp {
    async fn send(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    async fn create(&self, body: Value) -> (StatusCode, Value) {
        self.send(Method::POST, "/subscriptions/create", Some(body))
            .await
    }
}

fn subscription(user_uuid: Uuid, service_name: &str, price: i32, start: &str, end: Option<&str>) -> Value {
    json!({
        "service_name": service_name,
        "price": price,
        "user_uuid": user_uuid,
        "start_date": start,
        "end_date": end,
    })
}

#[tokio::test]
async fn create_read_delete_round_trip() {
    let app = test_app();
    let user_uuid = Uuid::new_v4();

    let (status, body) = app
        .create(subscription(user_uuid, "Yandex Plus", 400, "07-2025", None))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["id"].as_i64().unwrap();
    assert_eq!(app.cache.len(), 2);

    let (status, body) = app
        .send(Method::GET, &format!("/subscriptions/read?id={id}"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service_name"], "Yandex Plus");
    assert_eq!(body["start_date"], "07-2025");
    assert_eq!(body["end_date"], Value::Null);

    let (status, body) = app
        .send(
            Method::GET,
            &format!("/subscriptions/read?user_uuid={user_uuid}&service_name=Yandex%20Plus"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"].as_i64(), Some(id));

    let (status, _) = app
        .send(Method::DELETE, &format!("/subscriptions/delete?id={id}"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.cache.len(), 0);

    let (status, body) = app
        .send(Method::GET, &format!("/subscriptions/read?id={id}"), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], 404);
}

#[tokio::test]
async fn duplicate_natural_key_is_a_conflict_with_id() {
    let app = test_app();
    let user_uuid = Uuid::new_v4();

    let (_, body) = app
        .create(subscription(user_uuid, "Netflix", 300, "01-2025", None))
        .await;
    let first_id = body["id"].clone();

    let (status, body) = app
        .create(subscription(user_uuid, "Netflix", 999, "03-2025", None))
        .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["id"], first_id);
}

#[tokio::test]
async fn invalid_payloads_are_bad_requests() {
    let app = test_app();
    let user_uuid = Uuid::new_v4();

    for body in [
        subscription(user_uuid, "Netflix", 0, "01-2025", None),
        subscription(Uuid::nil(), "Netflix", 100, "01-2025", None),
        subscription(user_uuid, "", 100, "01-2025", None),
        subscription(user_uuid, "Netflix", 100, "2025-01", None),
        subscription(user_uuid, "Netflix", 100, "05-2025", Some("04-2025")),
        json!({ "service_name": "Netflix", "price": 100, "user_uuid": user_uuid }),
    ] {
        let (status, body) = app.create(body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], 400);
    }

    let (status, _) = app.send(Method::GET, "/subscriptions/read", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn list_paginates_in_id_order() {
    let app = test_app();
    let user_uuid = Uuid::new_v4();

    for n in 0..25 {
        let (status, _) = app
            .create(subscription(user_uuid, &format!("service-{n}"), 100, "01-2025", None))
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, body) = app
        .send(Method::GET, "/subscriptions/list?limit=10&offset=0", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<i64> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|row| row["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, (1..=10).collect::<Vec<i64>>());

    let (_, body) = app
        .send(Method::GET, "/subscriptions/list?limit=10&offset=20", None)
        .await;
    assert_eq!(body.as_array().unwrap().len(), 5);

    let (status, _) = app
        .send(Method::GET, "/subscriptions/list?limit=0", None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn summary_counts_overlapping_months() {
    let app = test_app();
    let user_uuid = Uuid::new_v4();

    app.create(subscription(user_uuid, "A", 400, "07-2025", None))
        .await;
    app.create(subscription(user_uuid, "B", 250, "08-2025", Some("08-2025")))
        .await;
    app.create(subscription(user_uuid, "C", 999, "01-2024", Some("12-2024")))
        .await;

    let (status, body) = app
        .send(
            Method::GET,
            &format!("/subscriptions/summary?user_uuid={user_uuid}&start_date=07-2025&end_date=08-2025"),
            None,
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "amount": 2, "months": 2, "total": 1050 }));

    let (status, _) = app
        .send(Method::GET, "/subscriptions/summary?start_date=07-2025", None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send(
            Method::GET,
            "/subscriptions/summary?start_date=09-2025&end_date=08-2025",
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn patch_keeps_absent_fields_and_refreshes_cache() {
    let app = test_app();
    let user_uuid = Uuid::new_v4();

    let (_, body) = app
        .create(subscription(user_uuid, "Spotify", 200, "02-2025", Some("12-2025")))
        .await;
    let id = body["id"].as_i64().unwrap();

    let (status, _) = app
        .send(
            Method::PUT,
            "/subscriptions/patch",
            Some(json!({ "id": id, "price": 350 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = app
        .send(Method::GET, &format!("/subscriptions/read?id={id}"), None)
        .await;
    assert_eq!(body["price"], 350);
    assert_eq!(body["service_name"], "Spotify");
    assert_eq!(body["end_date"], "12-2025");

    let (status, _) = app
        .send(
            Method::PUT,
            "/subscriptions/patch",
            Some(json!({ "id": id, "end_date": null })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = app
        .send(Method::GET, &format!("/subscriptions/read?id={id}"), None)
        .await;
    assert_eq!(body["end_date"], Value::Null);
    assert_eq!(body["price"], 350);

    let (status, _) = app
        .send(
            Method::PUT,
            "/subscriptions/patch",
            Some(json!({ "id": id, "price": null })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn update_renaming_drops_the_old_natural_key_entry() {
    let app = test_app();
    let user_uuid = Uuid::new_v4();

    let (_, body) = app
        .create(subscription(user_uuid, "Old Name", 100, "01-2025", None))
        .await;
    let id = body["id"].as_i64().unwrap();

    let mut renamed = subscription(user_uuid, "New Name", 100, "01-2025", None);
    renamed["id"] = json!(id);
    let (status, _) = app
        .send(Method::PUT, "/subscriptions/update", Some(renamed))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .send(
            Method::GET,
            &format!("/subscriptions/read?user_uuid={user_uuid}&service_name=Old%20Name"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let mut missing = subscription(user_uuid, "Other", 100, "01-2025", None);
    missing["id"] = json!(999);
    let (status, _) = app
        .send(Method::PUT, "/subscriptions/update", Some(missing))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn patch_of_missing_id_is_not_found() {
    let app = test_app();

    let (status, body) = app
        .send(
            Method::PUT,
            "/subscriptions/patch",
            Some(json!({ "id": 999, "price": 1 })),
        )
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], 404);
}

/// Pauses the next `read` after it has loaded its row, until released.
#[derive(Default)]
struct PausingRepository {
    inner: InMemoryRepository,
    pause_next_read: AtomicBool,
    loaded: Notify,
    release: Notify,
}

#[async_trait]
impl SubscriptionRepository for PausingRepository {
    async fn create(
        &self,
        insert_subscription_entity: InsertSubscriptionEntity,
    ) -> RepositoryResult<SubscriptionEntity> {
        self.inner.create(insert_subscription_entity).await
    }

    async fn read(&self, identifier: SubscriptionIdentifier) -> RepositoryResult<SubscriptionEntity> {
        let row = self.inner.read(identifier).await?;
        if self.pause_next_read.swap(false, Ordering::SeqCst) {
            self.loaded.notify_one();
            self.release.notified().await;
        }
        Ok(row)
    }

    async fn update(
        &self,
        id: i32,
        insert_subscription_entity: InsertSubscriptionEntity,
    ) -> RepositoryResult<()> {
        self.inner.update(id, insert_subscription_entity).await
    }

    async fn delete(&self, identifier: SubscriptionIdentifier) -> RepositoryResult<SubscriptionEntity> {
        self.inner.delete(identifier).await
    }

    async fn list(
        &self,
        filter: SubscriptionsWithinPeriod,
    ) -> RepositoryResult<Vec<SubscriptionEntity>> {
        self.inner.list(filter).await
    }

    async fn summary(&self, filter: SubscriptionsWithinPeriod) -> RepositoryResult<SummaryModel> {
        self.inner.summary(filter).await
    }
}

#[tokio::test]
async fn read_overlapping_an_update_does_not_cache_the_old_row() {
    let repository = Arc::new(PausingRepository::default());
    let cache = Arc::new(InMemoryCache::default());
    let usecase = Arc::new(SubscriptionUseCase::new(
        Arc::clone(&repository),
        Arc::clone(&cache),
    ));
    let user_uuid = Uuid::new_v4();

    let base: SubscriptionModel =
        serde_json::from_value(subscription(user_uuid, "Kinopoisk", 100, "01-2025", None)).unwrap();
    let id = usecase.create(base.clone()).await.unwrap();
    cache
        .delete_subscription(SubscriptionIdentifier::by_id(id))
        .await
        .unwrap();

    repository.pause_next_read.store(true, Ordering::SeqCst);
    let reader = tokio::spawn({
        let usecase = Arc::clone(&usecase);
        async move { usecase.read(SubscriptionIdentifier::by_id(id)).await }
    });
    repository.loaded.notified().await;

    usecase
        .update(SubscriptionModel {
            id,
            price: 200,
            ..base
        })
        .await
        .unwrap();
    repository.release.notify_one();

    let in_flight = reader.await.unwrap().unwrap();
    assert_eq!(in_flight.price, 100);

    let served = usecase
        .read(SubscriptionIdentifier::by_id(id))
        .await
        .unwrap();
    assert_eq!(served.price, 200);
}
