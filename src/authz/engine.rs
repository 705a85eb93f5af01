use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::authz::condition::{Condition, IntoRuling};
use crate::authz::errors::BouncerError;
use crate::authz::role::Role;
use crate::authz::types::HttpMethod;

/// Identifier of the role every engine is seeded with. Its base condition
/// always passes, so grants made on it are open to everyone.
pub const DEFAULT_ROLE: &str = "anyone";

/// Called with the request context when a request is denied.
pub type DenyStrategy<C> = Arc<dyn Fn(&C) -> Response + Send + Sync>;

/// A reusable declaration block, for hosts that rebuild the rules per request.
pub type Rules<C> = Arc<dyn Fn(&mut PolicyEngine<C>) -> Result<(), BouncerError> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Roles may be declared; no declaration block has run yet.
    Uninitialized,
    /// A declaration block is running.
    Declaring,
    /// Declaration finished and validated. Roles are read-only.
    Ready,
}

pub struct PolicyEngine<C> {
    /// Declaration order; the default role is always first.
    roles: Vec<Role<C>>,
    index: HashMap<String, usize>,
    deny: Option<DenyStrategy<C>>,
    state: EngineState,
}

impl<C> PolicyEngine<C> {
    pub fn new() -> Self {
        let mut engine = Self {
            roles: Vec::new(),
            index: HashMap::new(),
            deny: None,
            state: EngineState::Uninitialized,
        };
        engine.seed();
        engine
    }

    fn seed(&mut self) {
        self.index.insert(DEFAULT_ROLE.to_string(), self.roles.len());
        self.roles.push(Role::new(DEFAULT_ROLE, Condition::always()));
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    fn ensure_mutable(&self) -> Result<(), BouncerError> {
        if self.state == EngineState::Ready {
            return Err(BouncerError::AlreadyDeclared);
        }
        Ok(())
    }

    /// Creates and registers a role whose base condition is `condition`.
    #[track_caller]
    pub fn declare_role<F, R>(
        &mut self,
        identifier: impl Into<String>,
        condition: F,
    ) -> Result<&mut Role<C>, BouncerError>
    where
        F: Fn(&C) -> R + Send + Sync + 'static,
        R: IntoRuling,
    {
        self.declare_role_with(identifier, Condition::new(condition))
    }

    pub fn declare_role_with(
        &mut self,
        identifier: impl Into<String>,
        condition: Condition<C>,
    ) -> Result<&mut Role<C>, BouncerError> {
        self.ensure_mutable()?;

        let identifier = identifier.into();
        if identifier.trim().is_empty() {
            return Err(BouncerError::MissingRoleIdentifier);
        }
        if self.index.contains_key(&identifier) {
            return Err(BouncerError::DuplicateRole(identifier));
        }

        let slot = self.roles.len();
        self.index.insert(identifier.clone(), slot);
        self.roles.push(Role::new(identifier, condition));
        Ok(&mut self.roles[slot])
    }

    /// Looks up a declared role by identifier.
    pub fn role(&mut self, identifier: &str) -> Result<&mut Role<C>, BouncerError> {
        self.ensure_mutable()?;
        let slot = *self
            .index
            .get(identifier)
            .ok_or_else(|| BouncerError::UndefinedRole(identifier.to_string()))?;
        Ok(&mut self.roles[slot])
    }

    /// The seeded default role.
    pub fn anyone(&mut self) -> Result<&mut Role<C>, BouncerError> {
        self.role(DEFAULT_ROLE)
    }

    pub fn roles(&self) -> impl Iterator<Item = &Role<C>> {
        self.roles.iter()
    }

    /// Runs the declaration block once, then checks that every declared role
    /// received at least one grant. The default role is exempt, so an empty
    /// block is valid and denies everything.
    ///
    /// On error the engine is reset, so no half-declared rule set is served.
    pub fn declare<F>(&mut self, block: F) -> Result<(), BouncerError>
    where
        F: FnOnce(&mut Self) -> Result<(), BouncerError>,
    {
        if self.state != EngineState::Uninitialized {
            return Err(BouncerError::AlreadyDeclared);
        }

        self.state = EngineState::Declaring;
        if let Err(e) = block(self).and_then(|()| self.validate()) {
            self.reset();
            return Err(e);
        }
        self.state = EngineState::Ready;

        tracing::info!(
            roles = self.roles.len(),
            grants = self.roles.iter().map(Role::grant_count).sum::<usize>(),
            "Declared authorization rules"
        );
        Ok(())
    }

    /// Re-runs a stored declaration block from a clean slate.
    pub fn redeclare(&mut self, rules: &Rules<C>) -> Result<(), BouncerError> {
        self.reset();
        self.declare(|engine| rules(engine))
    }

    fn validate(&self) -> Result<(), BouncerError> {
        match self
            .roles
            .iter()
            .skip(1)
            .find(|role| role.is_incomplete())
        {
            Some(role) => Err(BouncerError::IncompleteRole(role.identifier().to_string())),
            None => Ok(()),
        }
    }

    /// Discards every declared role and reseeds the default one. The deny
    /// strategy is kept.
    pub fn reset(&mut self) {
        self.roles.clear();
        self.index.clear();
        self.seed();
        self.state = EngineState::Uninitialized;
    }

    /// True if any role grants `method` on `path` for `ctx`. Every role is
    /// consulted until one grants; with no granting role the answer is no.
    pub fn authorize(&self, method: HttpMethod, path: &str, ctx: &C) -> Result<bool, BouncerError> {
        for role in &self.roles {
            if role.authorize(method, path, ctx)? {
                tracing::debug!(
                    %method,
                    path,
                    role = role.identifier(),
                    "request granted"
                );
                return Ok(true);
            }
        }

        tracing::debug!(%method, path, "no role grants request");
        Ok(false)
    }

    /// [`PolicyEngine::authorize`] for a raw request method. Methods outside
    /// the grant vocabulary are only granted by `any_method` grants.
    pub fn authorize_request(&self, method: &Method, path: &str, ctx: &C) -> Result<bool, BouncerError> {
        let method = HttpMethod::from_http(method).unwrap_or(HttpMethod::Any);
        self.authorize(method, path, ctx)
    }

    pub fn set_deny_strategy<F>(&mut self, strategy: F)
    where
        F: Fn(&C) -> Response + Send + Sync + 'static,
    {
        self.deny = Some(Arc::new(strategy));
    }

    pub fn set_shared_deny_strategy(&mut self, strategy: DenyStrategy<C>) {
        self.deny = Some(strategy);
    }

    /// The response for a denied request: the registered strategy's, or a
    /// bare `403 Forbidden`.
    pub fn on_deny(&self, ctx: &C) -> Response {
        match &self.deny {
            Some(strategy) => strategy(ctx),
            None => StatusCode::FORBIDDEN.into_response(),
        }
    }
}

impl<C> Default for PolicyEngine<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for PolicyEngine<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyEngine")
            .field("roles", &self.roles)
            .field("deny_strategy", &self.deny.is_some())
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::role::Grants;
    use axum::response::Redirect;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[test]
    fn test_default_engine_denies() {
        let engine: PolicyEngine<()> = PolicyEngine::new();
        assert!(!engine.authorize(HttpMethod::Get, "/x", &()).unwrap());
        assert_eq!(engine.roles().count(), 1);
        assert_eq!(engine.state(), EngineState::Uninitialized);
    }

    #[test]
    fn test_empty_declaration_is_valid() {
        let mut engine: PolicyEngine<()> = PolicyEngine::new();
        engine.declare(|_| Ok(())).unwrap();
        assert_eq!(engine.state(), EngineState::Ready);
        for method in HttpMethod::ALL {
            assert!(!engine.authorize(method, "/test", &()).unwrap());
        }
    }

    #[test]
    fn test_anyone_grant_always() {
        let mut engine: PolicyEngine<()> = PolicyEngine::new();
        engine
            .declare(|rules| {
                rules.anyone()?.grant_always(Grants::new().on("get", "/admin"))?;
                Ok(())
            })
            .unwrap();

        assert!(engine.authorize(HttpMethod::Get, "/admin", &()).unwrap());
        assert!(!engine.authorize(HttpMethod::Post, "/admin", &()).unwrap());
    }

    #[test]
    fn test_multiple_methods_in_one_grant() {
        let mut engine: PolicyEngine<()> = PolicyEngine::new();
        engine
            .declare(|rules| {
                rules.anyone()?.grant_always(
                    Grants::new()
                        .on("get", "/admin/dashboard")
                        .on("post", "/admin/dashboard"),
                )?;
                Ok(())
            })
            .unwrap();

        assert!(engine.authorize(HttpMethod::Get, "/admin/dashboard", &()).unwrap());
        assert!(engine.authorize(HttpMethod::Post, "/admin/dashboard", &()).unwrap());
        assert!(!engine.authorize(HttpMethod::Delete, "/admin/dashboard", &()).unwrap());
    }

    #[test]
    fn test_toggled_condition() {
        let open = Arc::new(AtomicBool::new(false));
        let flag = open.clone();

        let mut engine: PolicyEngine<()> = PolicyEngine::new();
        engine
            .declare(move |rules| {
                rules
                    .anyone()?
                    .grant(Grants::new().on("post", "/a").when(move |_| flag.load(Ordering::SeqCst)))?;
                Ok(())
            })
            .unwrap();

        assert!(!engine.authorize(HttpMethod::Post, "/a", &()).unwrap());
        open.store(true, Ordering::SeqCst);
        assert!(engine.authorize(HttpMethod::Post, "/a", &()).unwrap());
    }

    #[test]
    fn test_wildcard_directory() {
        let mut engine: PolicyEngine<()> = PolicyEngine::new();
        engine
            .declare(|rules| {
                rules
                    .anyone()?
                    .grant(Grants::new().on("get", "/dir/*").when(|_| true))?;
                Ok(())
            })
            .unwrap();

        assert!(engine.authorize(HttpMethod::Get, "/dir/one", &()).unwrap());
        assert!(!engine.authorize(HttpMethod::Get, "/dir/", &()).unwrap());
    }

    #[test]
    fn test_head_granted_by_get_only() {
        let mut engine: PolicyEngine<()> = PolicyEngine::new();
        engine
            .declare(|rules| {
                rules.anyone()?.grant_always(Grants::new().on("get", "/page"))?;
                rules.anyone()?.grant_always(Grants::new().on("head", "/probe"))?;
                Ok(())
            })
            .unwrap();

        assert!(engine.authorize(HttpMethod::Head, "/page", &()).unwrap());
        assert!(engine.authorize(HttpMethod::Head, "/probe", &()).unwrap());
        assert!(!engine.authorize(HttpMethod::Get, "/probe", &()).unwrap());
    }

    #[test]
    fn test_incomplete_role_is_rejected() {
        let mut engine: PolicyEngine<Value> = PolicyEngine::new();
        let err = engine
            .declare(|rules| {
                rules.declare_role("admin", |ctx: &Value| ctx["admin"] == true)?;
                Ok(())
            })
            .unwrap_err();

        assert!(matches!(err, BouncerError::IncompleteRole(ref id) if id == "admin"));
        assert!(err.to_string().contains("missing a `grant` or `grant_always` call"));
        // the failed declaration leaves nothing behind
        assert_eq!(engine.state(), EngineState::Uninitialized);
        assert_eq!(engine.roles().count(), 1);
    }

    #[test]
    fn test_named_role_ors_with_anyone() {
        let mut engine: PolicyEngine<Value> = PolicyEngine::new();
        engine
            .declare(|rules| {
                rules.anyone()?.grant_always(Grants::new().on("get", "/"))?;
                rules
                    .declare_role("admin", |ctx: &Value| ctx["admin"] == true)?
                    .grant_always(Grants::new().on("any_method", "/admin/*"))?;
                Ok(())
            })
            .unwrap();

        let admin = json!({"admin": true});
        let guest = json!({});

        assert!(engine.authorize(HttpMethod::Get, "/", &guest).unwrap());
        assert!(engine.authorize(HttpMethod::Delete, "/admin/users", &admin).unwrap());
        assert!(!engine.authorize(HttpMethod::Delete, "/admin/users", &guest).unwrap());
    }

    #[test]
    fn test_role_lookup_inside_block() {
        let mut engine: PolicyEngine<()> = PolicyEngine::new();
        engine
            .declare(|rules| {
                rules.declare_role("staff", |_| true)?;
                rules.role("staff")?.grant_always(Grants::new().on("get", "/staff"))?;
                Ok(())
            })
            .unwrap();
        assert!(engine.authorize(HttpMethod::Get, "/staff", &()).unwrap());
    }

    #[test]
    fn test_undefined_role() {
        let mut engine: PolicyEngine<()> = PolicyEngine::new();
        let err = engine.role("ghost").unwrap_err();
        assert!(matches!(err, BouncerError::UndefinedRole(ref id) if id == "ghost"));
    }

    #[test]
    fn test_declare_role_errors() {
        let mut engine: PolicyEngine<()> = PolicyEngine::new();

        let err = engine.declare_role("", |_| true).unwrap_err();
        assert!(matches!(err, BouncerError::MissingRoleIdentifier));

        let err = engine.declare_role(DEFAULT_ROLE, |_| true).unwrap_err();
        assert!(matches!(err, BouncerError::DuplicateRole(ref id) if id == "anyone"));

        engine.declare_role("admin", |_| true).unwrap();
        let err = engine.declare_role("admin", |_| false).unwrap_err();
        assert!(matches!(err, BouncerError::DuplicateRole(ref id) if id == "admin"));
    }

    #[test]
    fn test_non_boolean_condition_raises() {
        let mut engine: PolicyEngine<()> = PolicyEngine::new();
        engine
            .declare(|rules| {
                rules
                    .anyone()?
                    .grant(Grants::new().on("get", "/admin/dashboard").when(|_| json!(5)))?;
                Ok(())
            })
            .unwrap();

        let err = engine
            .authorize(HttpMethod::Get, "/admin/dashboard", &())
            .unwrap_err();
        assert!(err.is_contract_violation());
        assert!(err.to_string().contains("engine.rs"));
    }

    #[test]
    fn test_falsy_condition_is_not_an_error() {
        let mut engine: PolicyEngine<()> = PolicyEngine::new();
        engine
            .declare(|rules| {
                rules
                    .anyone()?
                    .grant(Grants::new().on("get", "/admin/dashboard").when(|_| Value::Null))?;
                Ok(())
            })
            .unwrap();

        assert!(!engine
            .authorize(HttpMethod::Get, "/admin/dashboard", &())
            .unwrap());
    }

    #[test]
    fn test_authorize_is_idempotent() {
        let mut engine: PolicyEngine<u32> = PolicyEngine::new();
        engine
            .declare(|rules| {
                rules
                    .anyone()?
                    .grant(Grants::new().on("get", "/count").when(|n: &u32| *n < 10))?;
                Ok(())
            })
            .unwrap();

        for _ in 0..3 {
            assert!(engine.authorize(HttpMethod::Get, "/count", &3).unwrap());
            assert!(!engine.authorize(HttpMethod::Get, "/count", &30).unwrap());
        }
    }

    #[test]
    fn test_declare_twice_requires_reset() {
        let mut engine: PolicyEngine<()> = PolicyEngine::new();
        engine.declare(|_| Ok(())).unwrap();

        assert!(matches!(
            engine.declare(|_| Ok(())),
            Err(BouncerError::AlreadyDeclared)
        ));
        assert!(matches!(engine.anyone(), Err(BouncerError::AlreadyDeclared)));

        engine.reset();
        engine.declare(|_| Ok(())).unwrap();
    }

    #[test]
    fn test_redeclare_runs_block_each_time() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let rules: Rules<()> = Arc::new(move |engine: &mut PolicyEngine<()>| {
            counter.fetch_add(1, Ordering::SeqCst);
            engine.anyone()?.grant_always(Grants::new().on("get", "/"))?;
            Ok(())
        });

        let mut engine = PolicyEngine::new();
        engine.redeclare(&rules).unwrap();
        engine.redeclare(&rules).unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 2);
        let anyone = engine.roles().next().unwrap();
        assert_eq!(anyone.grant_count(), 1);
    }

    #[test]
    fn test_authorize_request_method_mapping() {
        let mut engine: PolicyEngine<()> = PolicyEngine::new();
        engine
            .declare(|rules| {
                rules.anyone()?.grant_always(Grants::new().on("get", "/a"))?;
                rules.anyone()?.grant_always(Grants::new().on("any_method", "/b"))?;
                Ok(())
            })
            .unwrap();

        assert!(engine.authorize_request(&Method::GET, "/a", &()).unwrap());
        assert!(!engine.authorize_request(&Method::TRACE, "/a", &()).unwrap());
        assert!(engine.authorize_request(&Method::TRACE, "/b", &()).unwrap());
    }

    #[test]
    fn test_default_deny_is_forbidden() {
        let engine: PolicyEngine<()> = PolicyEngine::new();
        assert_eq!(engine.on_deny(&()).status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_custom_deny_strategy_sees_context() {
        let mut engine: PolicyEngine<String> = PolicyEngine::new();
        engine.set_deny_strategy(|ctx: &String| Redirect::to(ctx).into_response());

        let resp = engine.on_deny(&"/login".to_string());
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(resp.headers()["location"], "/login");

        // survives a reset
        engine.reset();
        assert_eq!(engine.on_deny(&"/login".to_string()).status(), StatusCode::SEE_OTHER);
    }
}
