pub mod auth;
pub mod config;
pub mod db;
pub mod drive;
pub mod error;
pub mod google_oauth;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod service;
pub mod types;
pub mod upstream;

pub use config::Config;
pub use error::GatewayError;
pub use router::{GatewayState, gateway_router};
