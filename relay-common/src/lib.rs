//! Relay Common - Shared configuration, errors, and logging for the Relay services.
//!
//! This crate provides:
//! - Configuration types, loading, and environment overrides
//! - The unified error type
//! - Logging setup with noise filtering

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;

pub use config::{
    Config, DispatcherConfig, ModelBinding, ObservabilityConfig, ProviderConfig, TelegramConfig,
};
pub use error::{Error, Result};
pub use logging::LogFormat;
