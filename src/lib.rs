pub mod attendance;
pub mod config;
pub mod data;
pub mod sqlite;
