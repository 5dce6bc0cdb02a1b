//! Blocking client for the lab of a remote data-science platform.
//!
//! Configure ML tasks (split, features, algorithms, metric), start training
//! and ensembling, deploy models to the Flow and read trained model details.
//! Every computation happens server side; this crate shapes requests and
//! responses.

/// Application directory resolution.
pub mod app_dirs;
/// Entry point producing task and saved-model handles.
pub mod client;
/// TOML client configuration.
pub mod config;
/// Crate-wide error type.
pub mod error;
/// Shared HTTP agent helpers.
mod http_client;
/// ML task settings, training, deployment and model details.
pub mod lab;
/// Tracing subscriber setup.
pub mod logging;
/// Deployed saved models.
pub mod saved_model;
/// Request primitives and the HTTP transport.
pub mod transport;

pub use client::LabClient;
pub use config::ClientConfig;
pub use error::{LabError, LabResult};
