//! The HTTP server lifecycle child.
//!
//! An [`HttpServer`] owns a set of [`Connector`]s and, while running, a
//! dedicated multi-threaded Tokio runtime. Starting binds every listener
//! before any connection is accepted, so a bind failure leaves nothing
//! running. Stopping triggers the shared shutdown signal, lets open
//! connections finish their in-flight requests for up to the configured
//! timeout, then shuts the runtime down.
//!
//! ```rust,ignore
//! let server = Arc::new(factory.build(&environment)?);
//! environment.lifecycle().attach_shared(server.clone());
//! environment.lifecycle().start()?;
//! ```

use std::convert::Infallible;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http::{Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use monkey_core::http::HttpResponse;
use monkey_core::lifecycle::LifeCycle;
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;

use crate::connector::Connector;
use crate::error::ServerError;
use crate::shutdown::{ConnectionTracker, ShutdownSignal};

/// Type alias for the HTTP response body.
pub type ResponseBody = Full<Bytes>;

const RUNTIME_SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

struct Running {
    runtime: Runtime,
    shutdown: ShutdownSignal,
    tracker: ConnectionTracker,
    accept_loops: Vec<JoinHandle<()>>,
    bound: Vec<(&'static str, SocketAddr)>,
}

/// An HTTP server started and stopped by the lifecycle container.
pub struct HttpServer {
    connectors: Vec<Arc<Connector>>,
    shutdown_timeout: Duration,
    running: Mutex<Option<Running>>,
}

impl fmt::Debug for HttpServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpServer")
            .field("connectors", &self.connectors)
            .field("shutdown_timeout", &self.shutdown_timeout)
            .field("running", &self.is_running())
            .finish()
    }
}

impl HttpServer {
    /// Creates a stopped server.
    pub fn new(connectors: Vec<Connector>, shutdown_timeout: Duration) -> Self {
        Self {
            connectors: connectors.into_iter().map(Arc::new).collect(),
            shutdown_timeout,
            running: Mutex::new(None),
        }
    }

    /// The server's connectors.
    pub fn connectors(&self) -> impl Iterator<Item = &Connector> {
        self.connectors.iter().map(AsRef::as_ref)
    }

    /// Grace period given to open connections on stop.
    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    /// Returns `true` between a successful start and the next stop.
    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// The address a running connector is bound to.
    pub fn local_addr(&self, connector: &str) -> Option<SocketAddr> {
        self.running
            .lock()
            .as_ref()?
            .bound
            .iter()
            .find(|(name, _)| *name == connector)
            .map(|(_, addr)| *addr)
    }

    /// Binds every connector and starts accepting connections.
    ///
    /// A server without connectors starts without creating a runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::AlreadyRunning`] if started twice, and
    /// [`ServerError::Bind`] or [`ServerError::Runtime`] on I/O failures.
    pub fn start_server(&self) -> Result<(), ServerError> {
        let mut running = self.running.lock();
        if running.is_some() {
            return Err(ServerError::AlreadyRunning);
        }
        if self.connectors.is_empty() {
            tracing::info!("No connectors configured, not listening");
            return Ok(());
        }

        let mut listeners = Vec::with_capacity(self.connectors.len());
        for connector in &self.connectors {
            let bind_error = |source| ServerError::Bind {
                connector: connector.name(),
                addr: connector.addr(),
                source,
            };
            let listener = std::net::TcpListener::bind(connector.addr()).map_err(bind_error)?;
            listener.set_nonblocking(true).map_err(bind_error)?;
            let local = listener.local_addr().map_err(bind_error)?;
            listeners.push((Arc::clone(connector), listener, local));
        }

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("monkey-http")
            .build()
            .map_err(ServerError::Runtime)?;

        let shutdown = ShutdownSignal::new();
        let tracker = ConnectionTracker::new();
        let mut accept_loops = Vec::with_capacity(listeners.len());
        let mut bound = Vec::with_capacity(listeners.len());

        let guard = runtime.enter();
        for (connector, listener, local) in listeners {
            let listener = TcpListener::from_std(listener).map_err(|source| ServerError::Bind {
                connector: connector.name(),
                addr: connector.addr(),
                source,
            })?;
            tracing::info!(connector = connector.name(), addr = %local, "Connector listening");
            bound.push((connector.name(), local));
            accept_loops.push(runtime.spawn(accept_loop(
                connector,
                listener,
                shutdown.clone(),
                tracker.clone(),
            )));
        }
        drop(guard);

        *running = Some(Running {
            runtime,
            shutdown,
            tracker,
            accept_loops,
            bound,
        });
        Ok(())
    }

    /// Stops accepting, drains open connections and shuts the runtime down.
    ///
    /// Does nothing if the server is not running. Must not be called from
    /// inside an async context.
    pub fn stop_server(&self) {
        let Some(running) = self.running.lock().take() else {
            return;
        };
        let Running {
            runtime,
            shutdown,
            tracker,
            accept_loops,
            ..
        } = running;

        shutdown.trigger();
        let timeout = self.shutdown_timeout;
        runtime.block_on(async move {
            for handle in accept_loops {
                let _ = handle.await;
            }

            tracing::info!(
                timeout = ?timeout,
                connections = tracker.active_connections(),
                "Waiting for connections to close"
            );
            tokio::select! {
                () = tracker.wait_for_drain() => {
                    tracing::info!("All connections closed");
                }
                () = tokio::time::sleep(timeout) => {
                    tracing::warn!(
                        connections = tracker.active_connections(),
                        "Shutdown timeout reached, dropping remaining connections"
                    );
                }
            }
        });
        runtime.shutdown_timeout(RUNTIME_SHUTDOWN_GRACE);
        tracing::info!("Server stopped");
    }
}

impl LifeCycle for HttpServer {
    fn name(&self) -> &str {
        "http-server"
    }

    fn start(&self) -> anyhow::Result<()> {
        self.start_server()?;
        Ok(())
    }

    fn stop(&self) -> anyhow::Result<()> {
        self.stop_server();
        Ok(())
    }
}

impl Drop for HttpServer {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            running.shutdown.trigger();
            running.runtime.shutdown_background();
        }
    }
}

async fn accept_loop(
    connector: Arc<Connector>,
    listener: TcpListener,
    shutdown: ShutdownSignal,
    tracker: ConnectionTracker,
) {
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, remote_addr)) => {
                        let connector = Arc::clone(&connector);
                        let token = tracker.acquire();
                        let shutdown = shutdown.clone();

                        tokio::spawn(async move {
                            if let Err(e) = serve_connection(connector, stream, shutdown).await {
                                tracing::debug!(%remote_addr, error = %e, "Connection error");
                            }
                            drop(token);
                        });
                    }
                    Err(e) => {
                        tracing::error!(
                            connector = connector.name(),
                            error = %e,
                            "Failed to accept connection"
                        );
                    }
                }
            }
            () = shutdown.recv() => {
                tracing::debug!(connector = connector.name(), "Accept loop stopped");
                break;
            }
        }
    }
}

async fn serve_connection(
    connector: Arc<Connector>,
    stream: TcpStream,
    shutdown: ShutdownSignal,
) -> Result<(), hyper::Error> {
    let io = TokioIo::new(stream);
    let service = service_fn(move |req: Request<Incoming>| {
        let connector = Arc::clone(&connector);
        async move { Ok::<_, Infallible>(handle_request(&connector, req).await) }
    });

    let conn = http1::Builder::new().serve_connection(io, service);
    tokio::pin!(conn);

    tokio::select! {
        result = conn.as_mut() => result,
        () = shutdown.recv() => {
            // Finish the in-flight request, then close.
            conn.as_mut().graceful_shutdown();
            conn.await
        }
    }
}

async fn handle_request(connector: &Connector, req: Request<Incoming>) -> Response<ResponseBody> {
    let started = Instant::now();
    let (parts, body) = req.into_parts();
    let method = parts.method.to_string();

    monkey_telemetry::metrics::increment_in_flight(connector.name());
    let response = match body.collect().await {
        Ok(collected) => {
            connector
                .dispatch(parts.method, &parts.uri, parts.headers, collected.to_bytes())
                .await
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read request body");
            HttpResponse::error(
                StatusCode::BAD_REQUEST,
                "BODY_READ_ERROR",
                format!("Failed to read request body: {e}"),
            )
        }
    };
    monkey_telemetry::metrics::decrement_in_flight(connector.name());
    monkey_telemetry::metrics::record_request(
        connector.name(),
        &method,
        response.status().as_u16(),
        started.elapsed(),
    );

    into_hyper(response)
}

fn into_hyper(response: HttpResponse) -> Response<ResponseBody> {
    let (status, headers, body) = response.into_parts();
    let mut hyper_response = Response::new(Full::new(body));
    *hyper_response.status_mut() = status;
    *hyper_response.headers_mut() = headers;
    hyper_response
}
