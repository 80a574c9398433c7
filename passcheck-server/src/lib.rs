//! Password checking service.
//!
//! Scores passwords with a five-rule heuristic, looks them up in a breach set
//! built by `breach-builder`, and generates random passwords from the OS
//! CSPRNG. [`handler`] holds the operations; [`http`] binds them to routes.

pub mod config;
pub mod error;
pub mod generator;
pub mod handler;
pub mod http;
pub mod server;
pub mod strength;

pub use config::Config;
pub use error::{ApiError, ServerError};
pub use generator::{GenerateOptions, generate};
pub use handler::{BREACH_WARNING, CheckResponse, GenerateResponse};
pub use http::{AppState, Cors, MAX_BODY_BYTES, route};
pub use server::{serve, spawn_reloader};
pub use strength::{Category, Strength, evaluate};
