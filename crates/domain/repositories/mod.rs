pub mod cache;
pub mod subscriptions;
