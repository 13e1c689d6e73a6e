//! HTTP ingestion server for sluice.
//!
//! Accepts raw file uploads authenticated by API key and runs each through
//! the upload pipeline. The request body is the file; its name and type
//! travel in the `x-file-name` and `content-type` headers, and
//! `content-length` is the declared size used for the quota check.

pub mod auth;
pub mod config;
pub mod error;
pub mod handler;
pub mod router;
pub mod server;

pub use auth::{AllowAllKeys, KeyResolver, StaticKeys};
pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::AppState;
pub use server::SluiceServer;
