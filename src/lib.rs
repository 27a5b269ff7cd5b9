//! har-relay - HTTP exchange telemetry for axum services
//!
//! This library captures each request/response pair passing through a tower
//! middleware, groups it with a user-supplied function, buffers the records
//! and posts them in HAR form to a telemetry endpoint. A companion login
//! handler redirects signed-in users into the dashboard with a signed token.
//!
//! # Modules
//!
//! - [`middleware`] - the `metrics` layer and its builder
//! - [`capture`] - per-exchange records and their HAR rendering
//! - [`buffer`] - bounded buffer that releases records in batches
//! - [`flusher`] - background upload of batches
//! - [`login`] - session redirect into the dashboard
//! - [`config`] - TOML and environment configuration

pub mod buffer;
pub mod capture;
pub mod cli;
pub mod config;
pub mod flusher;
pub mod logging;
pub mod login;
pub mod middleware;

pub use login::login;
pub use middleware::metrics;
