use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::domain::{
    entities::subscriptions::SubscriptionEntity, value_objects::month_year::MonthYear,
};

/// Wire and cache representation of a subscription.
///
/// Every field defaults when missing so that an incomplete request body
/// reaches validation and is rejected with a meaningful message.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SubscriptionModel {
    #[serde(default)]
    pub id: i32,
    #[serde(default)]
    pub service_name: String,
    #[serde(default)]
    pub price: i32,
    #[serde(default)]
    pub user_uuid: Uuid,
    #[serde(default)]
    pub start_date: Option<MonthYear>,
    #[serde(default)]
    pub end_date: Option<MonthYear>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<SubscriptionEntity> for SubscriptionModel {
    fn from(value: SubscriptionEntity) -> Self {
        Self {
            id: value.id,
            service_name: value.service_name,
            price: value.price,
            user_uuid: value.user_uuid,
            start_date: Some(MonthYear::from_datetime(value.start_date)),
            end_date: value.end_date.map(MonthYear::from_datetime),
            created_at: Some(value.created_at),
            updated_at: Some(value.updated_at),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct IdResponse {
    pub id: i32,
}

/// How an identifier resolves to exactly one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionLookup {
    Id(i32),
    NaturalKey { user_uuid: Uuid, service_name: String },
}

/// A subscription address as supplied by a caller: the surrogate id, the
/// natural key, or both. The id wins when both are usable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionIdentifier {
    pub id: Option<i32>,
    pub user_uuid: Option<Uuid>,
    pub service_name: Option<String>,
}

impl SubscriptionIdentifier {
    pub fn by_id(id: i32) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    pub fn by_natural_key(user_uuid: Uuid, service_name: impl Into<String>) -> Self {
        Self {
            id: None,
            user_uuid: Some(user_uuid),
            service_name: Some(service_name.into()),
        }
    }

    pub fn lookup(&self) -> Option<SubscriptionLookup> {
        if let Some(id) = self.id.filter(|id| *id > 0) {
            return Some(SubscriptionLookup::Id(id));
        }

        match (self.natural_user_uuid(), self.natural_service_name()) {
            (Some(user_uuid), Some(service_name)) => Some(SubscriptionLookup::NaturalKey {
                user_uuid,
                service_name: service_name.to_string(),
            }),
            _ => None,
        }
    }

    /// Set, positive id.
    pub fn surrogate_id(&self) -> Option<i32> {
        self.id.filter(|id| *id > 0)
    }

    /// The natural key, when both halves are set.
    pub fn natural_key(&self) -> Option<(Uuid, &str)> {
        Some((self.natural_user_uuid()?, self.natural_service_name()?))
    }

    fn natural_user_uuid(&self) -> Option<Uuid> {
        self.user_uuid.filter(|uuid| !uuid.is_nil())
    }

    fn natural_service_name(&self) -> Option<&str> {
        self.service_name.as_deref().filter(|name| !name.is_empty())
    }
}

impl From<&SubscriptionModel> for SubscriptionIdentifier {
    fn from(value: &SubscriptionModel) -> Self {
        Self {
            id: Some(value.id),
            user_uuid: Some(value.user_uuid),
            service_name: Some(value.service_name.clone()),
        }
    }
}

impl From<&SubscriptionEntity> for SubscriptionIdentifier {
    fn from(value: &SubscriptionEntity) -> Self {
        Self {
            id: Some(value.id),
            user_uuid: Some(value.user_uuid),
            service_name: Some(value.service_name.clone()),
        }
    }
}

/// One field of a partial update. A field missing from the payload is
/// `Absent`; anything present, including JSON `null` where `T` is an
/// `Option`, is `Present`.
#[derive(Debug, Clone, PartialEq)]
pub enum Patch<T> {
    Absent,
    Present(T),
}

impl<T> Patch<T> {
    pub fn unwrap_or(self, current: T) -> T {
        match self {
            Patch::Present(value) => value,
            Patch::Absent => current,
        }
    }
}

impl<T> Default for Patch<T> {
    fn default() -> Self {
        Patch::Absent
    }
}

impl<'de, T> Deserialize<'de> for Patch<T>
where
    T: Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        T::deserialize(deserializer).map(Patch::Present)
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct SubscriptionPatch {
    #[serde(default)]
    pub id: i32,
    #[serde(default)]
    pub service_name: Patch<String>,
    #[serde(default)]
    pub price: Patch<i32>,
    #[serde(default)]
    pub user_uuid: Patch<Uuid>,
    #[serde(default)]
    pub start_date: Patch<Option<MonthYear>>,
    #[serde(default)]
    pub end_date: Patch<Option<MonthYear>>,
}

impl SubscriptionPatch {
    /// Overlays the present fields onto `current`. Identity and timestamps
    /// are never touched.
    pub fn apply_to(self, current: SubscriptionModel) -> SubscriptionModel {
        SubscriptionModel {
            id: current.id,
            service_name: self.service_name.unwrap_or(current.service_name),
            price: self.price.unwrap_or(current.price),
            user_uuid: self.user_uuid.unwrap_or(current.user_uuid),
            start_date: self.start_date.unwrap_or(current.start_date),
            end_date: self.end_date.unwrap_or(current.end_date),
            created_at: current.created_at,
            updated_at: current.updated_at,
        }
    }
}

pub const DEFAULT_LIST_LIMIT: i64 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionsWithinPeriod {
    pub user_uuid: Option<Uuid>,
    pub service_name: Option<String>,
    pub start_date: Option<MonthYear>,
    pub end_date: Option<MonthYear>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for SubscriptionsWithinPeriod {
    fn default() -> Self {
        Self {
            user_uuid: None,
            service_name: None,
            start_date: None,
            end_date: None,
            limit: DEFAULT_LIST_LIMIT,
            offset: 0,
        }
    }
}

impl SubscriptionsWithinPeriod {
    pub fn has_inverted_bounds(&self) -> bool {
        matches!((self.start_date, self.end_date), (Some(start), Some(end)) if end < start)
    }

    pub fn billing_window(&self) -> Option<BillingWindow> {
        BillingWindow::new(self.start_date?, self.end_date?)
    }
}

/// Closed month interval a summary is computed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BillingWindow {
    start: MonthYear,
    end: MonthYear,
}

impl BillingWindow {
    pub fn new(start: MonthYear, end: MonthYear) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    pub fn months(&self) -> i64 {
        self.start.months_through(self.end)
    }

    /// Billed months of a subscription active from `start` until `end`
    /// (open-ended when `None`) that fall inside the window.
    pub fn overlap_months(&self, start: MonthYear, end: Option<MonthYear>) -> i64 {
        let effective_start = start.max(self.start);
        let effective_end = end.unwrap_or(self.end).min(self.end);
        effective_start.months_through(effective_end).max(0)
    }

    /// Folds matching rows `(price, start_date, end_date)` into a summary.
    /// Rows that do not overlap the window are skipped.
    pub fn summarize<I>(&self, rows: I) -> SummaryModel
    where
        I: IntoIterator<Item = (i32, NaiveDateTime, Option<NaiveDateTime>)>,
    {
        rows.into_iter().fold(
            SummaryModel {
                amount: 0,
                months: self.months(),
                total: 0,
            },
            |mut summary, (price, start_date, end_date)| {
                let overlap = self.overlap_months(
                    MonthYear::from_datetime(start_date),
                    end_date.map(MonthYear::from_datetime),
                );
                if overlap > 0 {
                    summary.amount += 1;
                    summary.total += i64::from(price) * overlap;
                }
                summary
            },
        )
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SummaryModel {
    pub amount: i64,
    pub months: i64,
    pub total: i64,
}
