pub mod api;
pub mod config;
pub mod detector;
pub mod error;
pub mod metrics;
