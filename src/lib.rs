pub mod boundary;
pub mod cache;
pub mod config;
pub mod db;
pub mod handlers;
pub mod library;
pub mod models;
pub mod settings;
pub mod state;
pub mod store;
pub mod sync;
pub mod utils;
