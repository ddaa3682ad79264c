pub mod batch;
pub mod cache;
pub mod client;
pub mod config;
pub mod cost;
pub mod fingerprint;
pub mod models;
pub mod parser;
pub mod progress;
pub mod project_log;
pub mod prompt;
pub mod rate_limit;
pub mod report;
