pub mod api;
pub mod config;
pub mod database;
pub mod errors;
pub mod generation;
pub mod models;
