// Library for tests to access modules

pub mod config;
pub mod consumer;
pub mod dashboard;
pub mod docker_repo;
pub mod error;
pub mod log_tail;
pub mod models;
pub mod paginator;
pub mod registry;
pub mod session;
pub mod telemetry_session;
