//! Listening endpoints of an HTTP server.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderMap, Method, Uri};
use monkey_core::http::{HandlerFuture, HttpRequest, RouteRegistry};

/// Name of the connector serving application routes.
pub const APPLICATION_CONNECTOR: &str = "application";
/// Name of the connector serving admin routes.
pub const ADMIN_CONNECTOR: &str = "admin";

/// One listening address and the routes it serves.
///
/// A connector may additionally mount a second routing table under a path
/// prefix; the `simple` server uses this to serve admin endpoints under
/// `/admin` next to the application.
pub struct Connector {
    name: &'static str,
    addr: SocketAddr,
    routes: Arc<RouteRegistry>,
    mount: Option<(String, Arc<RouteRegistry>)>,
}

impl fmt::Debug for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connector")
            .field("name", &self.name)
            .field("addr", &self.addr)
            .field("mount", &self.mount.as_ref().map(|(prefix, _)| prefix))
            .finish_non_exhaustive()
    }
}

impl Connector {
    /// Creates a connector serving `routes` on `addr`.
    pub fn new(name: &'static str, addr: SocketAddr, routes: Arc<RouteRegistry>) -> Self {
        Self {
            name,
            addr,
            routes,
            mount: None,
        }
    }

    /// Serves `routes` under `prefix`, with the prefix stripped.
    #[must_use]
    pub fn with_mount(mut self, prefix: impl Into<String>, routes: Arc<RouteRegistry>) -> Self {
        let prefix = prefix.into().trim_end_matches('/').to_string();
        self.mount = Some((prefix, routes));
        self
    }

    /// Connector name, used in logs and metric labels.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Configured address. Port 0 binds an ephemeral port.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Mount prefix, if any.
    pub fn mount_prefix(&self) -> Option<&str> {
        self.mount.as_ref().map(|(prefix, _)| prefix.as_str())
    }

    /// Routes a request to the matching table and dispatches it.
    pub fn dispatch(
        &self,
        method: Method,
        uri: &Uri,
        headers: HeaderMap,
        body: Bytes,
    ) -> HandlerFuture {
        let (routes, path) = self.resolve(uri.path());
        tracing::debug!(connector = self.name, method = %method, path, "Dispatching request");

        let mut request = HttpRequest::new(method, path)
            .with_headers(headers)
            .with_body(body);
        if let Some(query) = uri.query() {
            request = request.with_query(query);
        }
        routes.dispatch(request)
    }

    fn resolve<'a>(&'a self, path: &'a str) -> (&'a RouteRegistry, &'a str) {
        if let Some((prefix, mounted)) = &self.mount {
            match path.strip_prefix(prefix.as_str()) {
                Some("") => return (mounted.as_ref(), "/"),
                Some(rest) if rest.starts_with('/') => return (mounted.as_ref(), rest),
                _ => {}
            }
        }
        (self.routes.as_ref(), path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use monkey_core::http::HttpResponse;

    fn tables() -> (Arc<RouteRegistry>, Arc<RouteRegistry>) {
        let app = Arc::new(RouteRegistry::new());
        app.add(Method::GET, "/orders", |_req: HttpRequest| async {
            HttpResponse::text(StatusCode::OK, "orders")
        });
        app.add(Method::GET, "/administrator", |_req: HttpRequest| async {
            HttpResponse::text(StatusCode::OK, "not admin")
        });

        let admin = Arc::new(RouteRegistry::new());
        admin.add(Method::GET, "/ping", |_req: HttpRequest| async {
            HttpResponse::text(StatusCode::OK, "pong")
        });
        admin.add(Method::GET, "/", |_req: HttpRequest| async {
            HttpResponse::text(StatusCode::OK, "admin index")
        });
        (app, admin)
    }

    fn get(connector: &Connector, uri: &str) -> HttpResponse {
        let uri: Uri = uri.parse().unwrap();
        tokio_test::block_on(connector.dispatch(Method::GET, &uri, HeaderMap::new(), Bytes::new()))
    }

    #[test]
    fn test_plain_connector() {
        let (app, _) = tables();
        let connector = Connector::new(APPLICATION_CONNECTOR, "127.0.0.1:0".parse().unwrap(), app);

        assert_eq!(get(&connector, "/orders").body().as_ref(), b"orders");
        assert_eq!(get(&connector, "/ping").status(), StatusCode::NOT_FOUND);
        assert_eq!(connector.mount_prefix(), None);
    }

    #[test]
    fn test_mounted_routes() {
        let (app, admin) = tables();
        let connector = Connector::new(APPLICATION_CONNECTOR, "127.0.0.1:0".parse().unwrap(), app)
            .with_mount("/admin/", admin);

        assert_eq!(connector.mount_prefix(), Some("/admin"));
        assert_eq!(get(&connector, "/admin/ping").body().as_ref(), b"pong");
        assert_eq!(get(&connector, "/admin").body().as_ref(), b"admin index");
        assert_eq!(get(&connector, "/administrator").body().as_ref(), b"not admin");
        assert_eq!(get(&connector, "/orders?page=2").body().as_ref(), b"orders");
    }

    #[test]
    fn test_query_is_forwarded() {
        let app = Arc::new(RouteRegistry::new());
        app.add(Method::GET, "/search", |req: HttpRequest| async move {
            HttpResponse::text(StatusCode::OK, req.query().unwrap_or_default().to_string())
        });
        let connector = Connector::new(APPLICATION_CONNECTOR, "127.0.0.1:0".parse().unwrap(), app);

        assert_eq!(get(&connector, "/search?q=bananas").body().as_ref(), b"q=bananas");
    }
}
