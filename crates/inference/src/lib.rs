pub mod backend;
pub mod config;
pub mod error;
pub mod labels;
pub mod logging;
pub mod metrics;
pub mod processing;
pub mod service;
pub mod store;

// Re-export commonly used types for convenience
pub use backend::{InferenceBackend, InferenceOutput};
pub use config::InferenceConfig;
pub use error::PredictError;
pub use labels::LabelVocabulary;
pub use service::{AppState, InferenceService};
pub use store::ResultStore;
