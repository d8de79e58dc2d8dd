pub mod redis_connection;
pub mod subscriptions;
