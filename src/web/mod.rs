//! HTTP surface of the admin backend.

pub mod articles;
pub mod auth;
pub mod error;
pub mod middleware;
pub mod operation_logs;
pub mod provenance;
pub mod questions;
pub mod routes;
pub mod status;

pub use routes::*;
