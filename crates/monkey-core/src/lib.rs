//! # Monkey Core
//!
//! Core types for the Monkey application framework.
//!
//! This crate provides the pieces every Monkey application is assembled from:
//!
//! - [`di`] - Modules, bindings, the commit-once
//!   [`ModuleRegistry`](di::ModuleRegistry) and the [`Injector`](di::Injector)
//! - [`lifecycle`] - The [`LifecycleContainer`](lifecycle::LifecycleContainer)
//!   start/stop state machine
//! - [`health`] - Named health checks and the startup warning listener
//! - [`metrics`] - Named metric registry over the `metrics` facade
//! - [`http`] - Handler contracts, routing table and validation status mapping
//! - [`Environment`] - The per-run owner of all of the above
//! - [`Mode`] - Run mode resolved from `MONKEY_MODE`

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod di;
mod environment;
mod error;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod metrics;
mod mode;

pub use environment::Environment;
pub use error::{StateError, StateResult};
pub use mode::{Mode, MODE_ENV_VAR};
