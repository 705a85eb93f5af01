use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::request::Parts;
use axum::http::{Extensions, HeaderMap, Method};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::Router;

use crate::authz::engine::{DenyStrategy, PolicyEngine, Rules};
use crate::authz::errors::BouncerError;
use crate::settings::{Authz, Deployment, Enforcement};

/// What rule conditions see of the request being authorized.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: Method,
    /// Request path as matched against grants (lowercased when
    /// `case_insensitive_paths` is on).
    pub path: String,
    pub headers: HeaderMap,
    pub extensions: Extensions,
}

impl RequestContext {
    pub fn from_parts(parts: &Parts, lowercase_path: bool) -> Self {
        let path = parts.uri.path();
        Self {
            method: parts.method.clone(),
            path: if lowercase_path {
                path.to_lowercase()
            } else {
                path.to_string()
            },
            headers: parts.headers.clone(),
            extensions: parts.extensions.clone(),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

pub type Engine = PolicyEngine<RequestContext>;

/// Request guard: holds the rules and hands each request an engine to be
/// judged by.
pub struct Bouncer {
    settings: Authz,
    rules: Rules<RequestContext>,
    deny: Option<DenyStrategy<RequestContext>>,
    /// Built at startup. Serves every request in declare-once mode.
    shared: Arc<Engine>,
}

pub struct BouncerBuilder {
    settings: Authz,
    rules: Option<Rules<RequestContext>>,
    deny: Option<DenyStrategy<RequestContext>>,
}

impl BouncerBuilder {
    pub fn rules<F>(mut self, rules: F) -> Self
    where
        F: Fn(&mut Engine) -> Result<(), BouncerError> + Send + Sync + 'static,
    {
        self.rules = Some(Arc::new(rules));
        self
    }

    pub fn deny_with<F>(mut self, strategy: F) -> Self
    where
        F: Fn(&RequestContext) -> Response + Send + Sync + 'static,
    {
        self.deny = Some(Arc::new(strategy));
        self
    }

    /// Declares the rules once, so declaration errors surface at startup in
    /// both deployment modes.
    pub fn build(self) -> Result<Bouncer, BouncerError> {
        let rules: Rules<RequestContext> = match self.rules {
            Some(rules) => rules,
            None => Arc::new(|_: &mut Engine| -> Result<(), BouncerError> { Ok(()) }),
        };
        let shared = Arc::new(fresh_engine(&rules, self.deny.as_ref())?);

        tracing::info!(
            deployment = ?self.settings.deployment,
            enforcement = ?self.settings.enforcement,
            enabled = self.settings.enabled,
            "Request authorization ready"
        );

        Ok(Bouncer {
            settings: self.settings,
            rules,
            deny: self.deny,
            shared,
        })
    }
}

fn fresh_engine(
    rules: &Rules<RequestContext>,
    deny: Option<&DenyStrategy<RequestContext>>,
) -> Result<Engine, BouncerError> {
    let mut engine = Engine::new();
    if let Some(strategy) = deny {
        engine.set_shared_deny_strategy(Arc::clone(strategy));
    }
    engine.redeclare(rules)?;
    Ok(engine)
}

impl Bouncer {
    pub fn builder(settings: Authz) -> BouncerBuilder {
        BouncerBuilder {
            settings,
            rules: None,
            deny: None,
        }
    }

    pub fn settings(&self) -> &Authz {
        &self.settings
    }

    /// The engine that judges the next request: the shared one, or in
    /// per-request mode a newly declared one owned by that request.
    pub fn engine(&self) -> Result<Arc<Engine>, BouncerError> {
        match self.settings.deployment {
            Deployment::DeclareOnce => Ok(Arc::clone(&self.shared)),
            Deployment::PerRequest => Ok(Arc::new(fresh_engine(&self.rules, self.deny.as_ref())?)),
        }
    }

    /// `None` lets the request through; `Some` is the response to send
    /// instead.
    pub fn check(&self, ctx: &RequestContext) -> Result<Option<Response>, BouncerError> {
        let engine = self.engine()?;
        if engine.authorize_request(&ctx.method, &ctx.path, ctx)? {
            return Ok(None);
        }

        match self.settings.enforcement {
            Enforcement::Advisory => {
                tracing::warn!(
                    method = %ctx.method,
                    path = %ctx.path,
                    "request would be denied (advisory mode)"
                );
                Ok(None)
            }
            Enforcement::Strict => {
                tracing::debug!(method = %ctx.method, path = %ctx.path, "request denied");
                Ok(Some(engine.on_deny(ctx)))
            }
        }
    }
}

/// Middleware run before every route of the protected router.
pub async fn guard(State(bouncer): State<Arc<Bouncer>>, request: Request, next: Next) -> Response {
    if !bouncer.settings.enabled {
        return next.run(request).await;
    }

    let (parts, body) = request.into_parts();
    let ctx = RequestContext::from_parts(&parts, bouncer.settings.case_insensitive_paths);

    match bouncer.check(&ctx) {
        Ok(None) => next.run(Request::from_parts(parts, body)).await,
        Ok(Some(denied)) => denied,
        Err(e) => {
            tracing::error!(
                method = %ctx.method,
                path = %ctx.path,
                error = %e,
                "authorization failed"
            );
            e.into_response()
        }
    }
}

/// Puts every route of `router` behind the bouncer.
pub fn protect<S>(router: Router<S>, bouncer: Arc<Bouncer>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.layer(middleware::from_fn_with_state(bouncer, guard))
}
