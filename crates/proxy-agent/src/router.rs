//! Request routing.
//!
//! The agent owns its router; nothing is registered globally. Routes are
//! exact path matches since none of the endpoints take path parameters.
//!
//! ```rust
//! use http::Method;
//! use proxy_agent::router::{Operation, RouteOutcome, Router};
//!
//! let router = Router::agent();
//! assert_eq!(router.route(&Method::POST, "/start"), RouteOutcome::Found(Operation::Start));
//! assert!(matches!(router.route(&Method::GET, "/start"), RouteOutcome::MethodNotAllowed { .. }));
//! assert_eq!(router.route(&Method::POST, "/restart"), RouteOutcome::NotFound);
//! ```

use std::fmt;

use http::Method;

/// An endpoint the agent serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Start a sidecar proxy.
    Start,
    /// Stop a sidecar proxy.
    Stop,
    /// Probe sidecar proxy readiness.
    Readiness,
    /// Agent liveness.
    Health,
    /// Agent version.
    Version,
}

impl Operation {
    /// Label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Readiness => "readiness",
            Self::Health => "healthz",
            Self::Version => "version",
        }
    }

    /// Whether the operation is forwarded to the runtime backend.
    pub fn is_backend_call(&self) -> bool {
        matches!(self, Self::Start | Self::Stop | Self::Readiness)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of routing a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// A route matched.
    Found(Operation),
    /// The path exists but not for this method.
    MethodNotAllowed {
        /// Methods registered for the path.
        allowed: Vec<Method>,
    },
    /// No route has this path.
    NotFound,
}

#[derive(Debug, Clone)]
struct Route {
    method: Method,
    path: String,
    operation: Operation,
}

/// Maps `(method, path)` to an [`Operation`].
#[derive(Debug, Clone, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    /// Creates an empty router.
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    /// Router with the agent's endpoints registered.
    pub fn agent() -> Self {
        let mut router = Self::new();
        router.add_route(Method::POST, "/start", Operation::Start);
        router.add_route(Method::POST, "/stop", Operation::Stop);
        router.add_route(Method::POST, "/readiness", Operation::Readiness);
        router.add_route(Method::GET, "/healthz", Operation::Health);
        router.add_route(Method::GET, "/version", Operation::Version);
        router
    }

    /// Adds a route. Earlier routes win on duplicates.
    pub fn add_route(&mut self, method: Method, path: impl Into<String>, operation: Operation) {
        self.routes.push(Route {
            method,
            path: path.into(),
            operation,
        });
    }

    /// Returns the number of registered routes.
    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// Routes a request.
    pub fn route(&self, method: &Method, path: &str) -> RouteOutcome {
        let mut allowed = Vec::new();

        for route in self.routes.iter().filter(|r| r.path == path) {
            if route.method == *method {
                return RouteOutcome::Found(route.operation);
            }
            allowed.push(route.method.clone());
        }

        if allowed.is_empty() {
            RouteOutcome::NotFound
        } else {
            RouteOutcome::MethodNotAllowed { allowed }
        }
    }
}
