//! HTTP serving for Monkey applications.
//!
//! The server is a lifecycle child: the `server` command builds it from the
//! configured [`ServerFactory`] after the environment is committed, attaches
//! it to the environment's lifecycle container and starts the container.
//!
//! # Modules
//!
//! - [`factory`] - `default`, `simple` and `noop` server factories
//! - [`server`] - [`HttpServer`], hyper connections on a dedicated runtime
//! - [`connector`] - listening addresses and their routing tables
//! - [`admin`] - `/ping`, `/healthcheck` and `/metrics`
//! - [`shutdown`] - shutdown signal and connection draining

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod admin;
pub mod connector;
mod error;
pub mod factory;
pub mod server;
pub mod shutdown;

pub use crate::connector::Connector;
pub use crate::error::ServerError;
pub use crate::factory::{
    server_factory, DefaultServerFactory, NoopServerFactory, ServerFactory, SimpleServerFactory,
};
pub use crate::server::HttpServer;
pub use crate::shutdown::{wait_for_os_signal, ShutdownSignal};
