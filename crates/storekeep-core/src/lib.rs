pub mod api;
pub mod backup;
pub mod config;
pub mod models;
pub mod persistence;
pub mod sqlite;
pub mod sync;
