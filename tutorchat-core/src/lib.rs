pub mod config;
pub mod error;
pub mod history;
pub mod http_client;
pub mod model;
pub mod normalizer;
pub mod reducer;
pub mod session;
pub mod sse;
pub mod store;
pub mod telemetry;
