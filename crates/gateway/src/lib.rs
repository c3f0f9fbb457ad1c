pub mod config;
pub mod error;
pub mod logging;
pub mod relay;
pub mod service;
pub mod staging;
pub mod state;

pub use crate::config::{Config, get_configuration};
pub use error::RelayError;
pub use state::AppState;
