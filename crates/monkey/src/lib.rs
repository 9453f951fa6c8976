//! # Monkey
//!
//! **Application bootstrap framework**
//!
//! Monkey wires an application together in a fixed sequence and runs it as
//! a command-line program:
//!
//! ```text
//! initialize(bootstrap) → parse CLI → load configuration → bundles run
//!     → application run → commit DI graph → build server → start lifecycle
//!     → wait for shutdown → stop lifecycle
//! ```
//!
//! - [`Application`] and [`Bundle`]/[`ConfiguredBundle`] register modules,
//!   routes, health checks and managed components on the [`Environment`]
//! - [`Bootstrap`] holds what exists before configuration: bundles,
//!   commands, shared registries, configuration source settings
//! - [`command`] provides the `server` and `check` commands
//! - [`Runner`] parses the command line with `clap` and maps results to
//!   exit codes
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use monkey::prelude::*;
//!
//! struct Greeting(String);
//!
//! struct HelloApp;
//!
//! impl Application<BaseConfig> for HelloApp {
//!     fn name(&self) -> &str {
//!         "hello"
//!     }
//!
//!     fn run(&self, _config: &BaseConfig, env: &mut Environment) -> anyhow::Result<()> {
//!         env.modules().register_instance(Arc::new(Greeting("hello".to_string())))?;
//!         env.routes().add(Method::GET, "/hello", |_req: HttpRequest| async {
//!             HttpResponse::text(StatusCode::OK, "hello")
//!         });
//!         Ok(())
//!     }
//! }
//!
//! fn main() -> std::process::ExitCode {
//!     monkey::run(HelloApp)
//! }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod application;
mod bootstrap;
mod bundle;
mod cli;
pub mod command;
mod error;

pub use crate::application::Application;
pub use crate::bootstrap::{Bootstrap, DEFAULT_ENV_PREFIX};
pub use crate::bundle::{Bundle, ConfiguredBundle};
pub use crate::cli::{run, Runner, FAILURE_EXIT_CODE};
pub use crate::error::MonkeyError;

// Re-export the component crates
pub use monkey_config as config;
pub use monkey_core as core;
pub use monkey_server as server;
pub use monkey_telemetry as telemetry;

pub use monkey_core::{Environment, Mode};

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use monkey::prelude::*;
/// ```
pub mod prelude {
    pub use crate::command::{CheckCommand, Command, ServerCommand};
    pub use crate::{Application, Bootstrap, Bundle, ConfiguredBundle, MonkeyError, Runner};

    pub use monkey_config::{BaseConfig, ConfigError, Configuration};
    pub use monkey_core::di::{Binder, Inject, InjectionError, Injectable, Injector, Module, Stage};
    pub use monkey_core::health::{HealthCheck, HealthCheckResult};
    pub use monkey_core::http::{HttpRequest, HttpResponse};
    pub use monkey_core::lifecycle::{LifeCycle, Managed};
    pub use monkey_core::{Environment, Mode};

    pub use http::{Method, StatusCode};
}
