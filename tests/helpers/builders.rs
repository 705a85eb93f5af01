use std::sync::Arc;

use axum::body::{self, Body};
use axum::http::{Method, Request, StatusCode};
use axum::routing::any;
use axum::Router;
use bouncer::authz::web::{self, Bouncer, BouncerBuilder};
use bouncer::settings::Authz;
use tower::util::ServiceExt; // for `oneshot`

pub const TEST_BODY: &str = "Test content";

/// Builder for a router whose routes answer every method with `TEST_BODY`,
/// all behind a bouncer.
pub struct AppBuilder {
    settings: Authz,
    paths: Vec<String>,
}

impl AppBuilder {
    pub fn new() -> Self {
        Self {
            settings: Authz::default(),
            paths: Vec::new(),
        }
    }

    pub fn with_settings(mut self, settings: Authz) -> Self {
        self.settings = settings;
        self
    }

    pub fn route(mut self, path: &str) -> Self {
        self.paths.push(path.to_string());
        self
    }

    /// Builds the router; `configure` receives the bouncer builder so each
    /// test can add rules and a deny strategy.
    pub fn build<F>(self, configure: F) -> Router
    where
        F: FnOnce(BouncerBuilder) -> BouncerBuilder,
    {
        let bouncer = configure(Bouncer::builder(self.settings))
            .build()
            .expect("Failed to build bouncer");

        let router = self
            .paths
            .iter()
            .fold(Router::new(), |router, path| {
                router.route(path, any(|| async { TEST_BODY }))
            });
        web::protect(router, Arc::new(bouncer))
    }
}

/// Builder for test requests
pub struct RequestBuilder {
    method: Method,
    path: String,
    headers: Vec<(String, String)>,
}

impl RequestBuilder {
    pub fn new(method: Method, path: &str) -> Self {
        Self {
            method,
            path: path.to_string(),
            headers: Vec::new(),
        }
    }

    pub fn get(path: &str) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn build(self) -> Request<Body> {
        let mut builder = Request::builder().method(self.method).uri(self.path);
        for (name, value) in self.headers {
            builder = builder.header(name, value);
        }
        builder.body(Body::empty()).expect("Failed to build request")
    }
}

/// Sends one request through the router and returns status and body.
pub async fn send(app: &Router, request: RequestBuilder) -> (StatusCode, String) {
    let resp = app
        .clone()
        .oneshot(request.build())
        .await
        .expect("router is infallible");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), 1_048_576)
        .await
        .expect("Failed to read body");
    (status, String::from_utf8_lossy(&bytes).into_owned())
}
