pub mod bidding;
pub mod cache;
pub mod closer;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod scheduler;
pub mod store;
pub mod transfer;
