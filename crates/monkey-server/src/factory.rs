//! Server factories, selected by the `server.type` configuration key.
//!
//! | Type | Connectors |
//! |------|------------|
//! | `default` | application routes on `application_addr`, admin routes on `admin_addr` |
//! | `simple` | one connector; admin routes mounted under `admin_context_path` |
//! | `noop` | none |

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use monkey_config::{DefaultServerConfig, ServerFactoryConfig, SimpleServerConfig};
use monkey_core::Environment;

use crate::admin::register_admin_routes;
use crate::connector::{Connector, ADMIN_CONNECTOR, APPLICATION_CONNECTOR};
use crate::error::ServerError;
use crate::server::HttpServer;

/// Builds the HTTP server for an environment.
pub trait ServerFactory: Send + Sync {
    /// The factory name as written in configuration.
    fn kind(&self) -> &'static str;

    /// Builds a stopped server serving the environment's routes.
    ///
    /// Factories that expose admin endpoints add them to the environment's
    /// admin routes.
    fn build(&self, environment: &Environment) -> Result<HttpServer, ServerError>;
}

/// Returns the factory selected by `config`.
pub fn server_factory(config: &ServerFactoryConfig) -> Box<dyn ServerFactory> {
    match config {
        ServerFactoryConfig::Default(config) => Box::new(DefaultServerFactory::new(config.clone())),
        ServerFactoryConfig::Simple(config) => Box::new(SimpleServerFactory::new(config.clone())),
        ServerFactoryConfig::Noop => Box::new(NoopServerFactory),
    }
}

fn parse_addr(value: &str) -> Result<SocketAddr, ServerError> {
    value
        .parse()
        .map_err(|e| ServerError::invalid_address(value, e))
}

fn register_admin(environment: &Environment) {
    register_admin_routes(
        environment.admin_routes(),
        Arc::clone(environment.health_checks()),
        Arc::clone(environment.metrics()),
    );
}

/// Separate application and admin connectors.
#[derive(Debug, Clone)]
pub struct DefaultServerFactory {
    config: DefaultServerConfig,
}

impl DefaultServerFactory {
    /// Creates the factory.
    pub fn new(config: DefaultServerConfig) -> Self {
        Self { config }
    }
}

impl ServerFactory for DefaultServerFactory {
    fn kind(&self) -> &'static str {
        "default"
    }

    fn build(&self, environment: &Environment) -> Result<HttpServer, ServerError> {
        let application_addr = parse_addr(&self.config.application_addr)?;
        let admin_addr = parse_addr(&self.config.admin_addr)?;
        register_admin(environment);

        tracing::debug!(
            application = %environment.name(),
            %application_addr,
            %admin_addr,
            "Building default server"
        );
        Ok(HttpServer::new(
            vec![
                Connector::new(
                    APPLICATION_CONNECTOR,
                    application_addr,
                    Arc::clone(environment.routes()),
                ),
                Connector::new(
                    ADMIN_CONNECTOR,
                    admin_addr,
                    Arc::clone(environment.admin_routes()),
                ),
            ],
            Duration::from_secs(self.config.shutdown_timeout_secs),
        ))
    }
}

/// A single connector with the admin routes under a path prefix.
#[derive(Debug, Clone)]
pub struct SimpleServerFactory {
    config: SimpleServerConfig,
}

impl SimpleServerFactory {
    /// Creates the factory.
    pub fn new(config: SimpleServerConfig) -> Self {
        Self { config }
    }
}

impl ServerFactory for SimpleServerFactory {
    fn kind(&self) -> &'static str {
        "simple"
    }

    fn build(&self, environment: &Environment) -> Result<HttpServer, ServerError> {
        let addr = parse_addr(&self.config.addr)?;
        register_admin(environment);

        tracing::debug!(
            application = %environment.name(),
            %addr,
            admin_context_path = %self.config.admin_context_path,
            "Building simple server"
        );
        let routes = Arc::clone(environment.routes());
        let connector = Connector::new(APPLICATION_CONNECTOR, addr, routes)
            .with_mount(
                self.config.admin_context_path.clone(),
                Arc::clone(environment.admin_routes()),
            );
        Ok(HttpServer::new(
            vec![connector],
            Duration::from_secs(self.config.shutdown_timeout_secs),
        ))
    }
}

/// Builds a server without connectors.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopServerFactory;

impl ServerFactory for NoopServerFactory {
    fn kind(&self) -> &'static str {
        "noop"
    }

    fn build(&self, environment: &Environment) -> Result<HttpServer, ServerError> {
        tracing::debug!(application = %environment.name(), "Building noop server");
        Ok(HttpServer::new(Vec::new(), Duration::ZERO))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use monkey_core::Mode;

    fn environment() -> Environment {
        Environment::new("orders", Mode::Test)
    }

    #[test]
    fn test_factory_selection() {
        assert_eq!(server_factory(&ServerFactoryConfig::default()).kind(), "default");
        assert_eq!(
            server_factory(&ServerFactoryConfig::Simple(SimpleServerConfig::default())).kind(),
            "simple"
        );
        assert_eq!(server_factory(&ServerFactoryConfig::Noop).kind(), "noop");
    }

    #[test]
    fn test_default_factory_connectors() {
        let env = environment();
        let server = DefaultServerFactory::new(DefaultServerConfig::default())
            .build(&env)
            .unwrap();

        let names: Vec<_> = server.connectors().map(Connector::name).collect();
        assert_eq!(names, vec![APPLICATION_CONNECTOR, ADMIN_CONNECTOR]);
        assert_eq!(server.shutdown_timeout(), Duration::from_secs(30));
        assert!(env.admin_routes().has_path("/healthcheck"));
    }

    #[test]
    fn test_simple_factory_mounts_admin() {
        let env = environment();
        let server = SimpleServerFactory::new(SimpleServerConfig::default())
            .build(&env)
            .unwrap();

        let connectors: Vec<_> = server.connectors().collect();
        assert_eq!(connectors.len(), 1);
        assert_eq!(connectors[0].mount_prefix(), Some("/admin"));
        assert!(env.admin_routes().has_path("/ping"));
    }

    #[test]
    fn test_noop_factory() {
        let env = environment();
        let server = NoopServerFactory.build(&env).unwrap();
        assert_eq!(server.connectors().count(), 0);
        assert!(env.admin_routes().is_empty());
    }

    #[test]
    fn test_invalid_address() {
        let config = DefaultServerConfig {
            admin_addr: "localhost".to_string(),
            ..DefaultServerConfig::default()
        };
        let err = DefaultServerFactory::new(config)
            .build(&environment())
            .unwrap_err();
        assert!(matches!(err, ServerError::InvalidAddress { addr, .. } if addr == "localhost"));
    }
}
