pub mod api;
pub mod clients;
pub mod config;
pub mod error;
pub mod models;
pub mod service;

pub use config::AppConfig;
pub use error::EngineError;
pub use service::{ComposerSession, SessionSetup};
