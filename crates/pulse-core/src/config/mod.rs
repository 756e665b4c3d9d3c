//! Configuration
//!
//! This module defines configuration types and default values:
//! - `app_config`: Server and client configuration structures
//! - `defaults`: Default configuration values

pub mod app_config;
pub mod defaults;

pub use app_config::{ClientConfig, ServerConfig};
