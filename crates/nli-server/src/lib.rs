//! NLI HTTP service: configuration, lifecycle, request orchestration, routes.

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod routes;
pub mod startup;
pub mod state;

pub use config::Config;
pub use error::ServiceError;
pub use orchestrator::{Engine, MAX_PAIRS_PER_REQUEST};
pub use routes::router;
pub use state::ServiceState;
