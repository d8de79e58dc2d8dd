pub mod cache;
pub mod db;
