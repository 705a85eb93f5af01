use std::collections::HashMap;
use std::fmt;

use crate::authz::condition::{Condition, IntoRuling};
use crate::authz::errors::BouncerError;
use crate::authz::types::{HttpMethod, PathPattern, PathSet};

/// A batch of method/path grants, optionally gated by one condition.
///
/// Method keys are kept as raw tokens and only validated when the batch is
/// handed to [`Role::grant`] or [`Role::grant_always`].
///
/// ```
/// use bouncer::authz::role::Grants;
///
/// let grants: Grants<()> = Grants::new()
///     .on("get", ["/admin/dashboard", "/admin/settings"])
///     .on("post", "/admin/settings")
///     .when(|_| true);
/// ```
pub struct Grants<C> {
    entries: Vec<(String, PathSet)>,
    condition: Option<Condition<C>>,
}

impl<C> Grants<C> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            condition: None,
        }
    }

    pub fn on(mut self, method: impl AsRef<str>, paths: impl Into<PathSet>) -> Self {
        self.entries
            .push((method.as_ref().to_string(), paths.into()));
        self
    }

    #[track_caller]
    pub fn when<F, R>(self, predicate: F) -> Self
    where
        F: Fn(&C) -> R + Send + Sync + 'static,
        R: IntoRuling,
    {
        self.with_condition(Condition::new(predicate))
    }

    pub fn with_condition(mut self, condition: Condition<C>) -> Self {
        self.condition = Some(condition);
        self
    }

    fn validate(entries: Vec<(String, PathSet)>) -> Result<Vec<(HttpMethod, PathSet)>, BouncerError> {
        entries
            .into_iter()
            .map(|(key, paths)| Ok((key.parse::<HttpMethod>()?, paths)))
            .collect()
    }
}

impl<C> Default for Grants<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// A named rule: an AND-chain of conditions and the method/path pairs it
/// grants.
pub struct Role<C> {
    identifier: String,
    conditions: Vec<Condition<C>>,
    grants: HashMap<HttpMethod, Vec<PathPattern>>,
}

impl<C> Role<C> {
    pub fn new(identifier: impl Into<String>, base: Condition<C>) -> Self {
        Self {
            identifier: identifier.into(),
            conditions: vec![base],
            grants: HashMap::new(),
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Records every method/path pair in `grants` and appends its condition
    /// to this role's chain.
    ///
    /// The chain belongs to the role, not to the grant: a condition attached
    /// here also gates every other grant of the same role, including ones
    /// declared earlier.
    pub fn grant(&mut self, grants: Grants<C>) -> Result<&mut Self, BouncerError> {
        let Grants { entries, condition } = grants;
        let condition = condition.ok_or(BouncerError::MissingCondition)?;
        self.record(entries, condition)
    }

    /// Like [`Role::grant`] with a condition that always passes.
    #[track_caller]
    pub fn grant_always(&mut self, grants: Grants<C>) -> Result<&mut Self, BouncerError> {
        let Grants { entries, condition } = grants;
        if condition.is_some() {
            return Err(BouncerError::UnexpectedCondition);
        }
        self.record(entries, Condition::always())
    }

    fn record(
        &mut self,
        entries: Vec<(String, PathSet)>,
        condition: Condition<C>,
    ) -> Result<&mut Self, BouncerError> {
        // Validate every key before touching the role so a bad batch leaves
        // no partial grants behind.
        for (method, paths) in Grants::<C>::validate(entries)? {
            self.grants
                .entry(method)
                .or_default()
                .extend(paths.into_patterns());
        }
        self.conditions.push(condition);
        Ok(self)
    }

    pub fn is_incomplete(&self) -> bool {
        self.grants.values().all(|patterns| patterns.is_empty())
    }

    pub fn grant_count(&self) -> usize {
        self.grants.values().map(|patterns| patterns.len()).sum()
    }

    pub fn condition_count(&self) -> usize {
        self.conditions.len()
    }

    /// Patterns consulted for a request with `method`. `HEAD` also sees
    /// `GET` grants. [`HttpMethod::Any`] as the query method stands for a
    /// method outside the closed set and only sees `any_method` grants.
    fn patterns_for(&self, method: HttpMethod) -> impl Iterator<Item = &PathPattern> {
        let mut keys = vec![HttpMethod::Any];
        if method != HttpMethod::Any {
            keys.push(method);
        }
        if method == HttpMethod::Head {
            keys.push(HttpMethod::Get);
        }
        keys.into_iter()
            .filter_map(move |key| self.grants.get(&key))
            .flatten()
    }

    /// True if a grant covers `method` and `path` and every condition in the
    /// chain passes for `ctx`. Conditions are not run when no grant matches.
    pub fn authorize(&self, method: HttpMethod, path: &str, ctx: &C) -> Result<bool, BouncerError> {
        if !self.patterns_for(method).any(|pattern| pattern.matches(path)) {
            return Ok(false);
        }

        for condition in &self.conditions {
            if !condition.check(ctx)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl<C> fmt::Debug for Role<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Role")
            .field("identifier", &self.identifier)
            .field("conditions", &self.conditions)
            .field("grants", &self.grants)
            .finish()
    }
}
