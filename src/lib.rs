//! Blog administration backend: audited batch state transitions and the operation log.

pub mod app;
pub mod audit;
pub mod batch;
pub mod cli;
pub mod config;
pub mod data;
pub mod logging;
pub mod state;
pub mod utils;
pub mod web;
