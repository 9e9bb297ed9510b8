//! Winforge Library
//!
//! Core modules for the Winforge configuration and deployment server.

pub mod app;
pub mod assist;
pub mod config;
pub mod deploy;
pub mod errors;
pub mod generate;
pub mod logs;
pub mod rollback;
pub mod server;
pub mod utils;
