pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod service;
pub mod storage;

pub use api::BackendClient;
pub use config::AppConfig;
pub use error::{AppError, Result};
pub use service::{EmailCampaign, ReportGenerator, SessionStore};
