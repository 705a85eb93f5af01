//! Rule conditions and the boolean contract.
//!
//! A condition is a predicate over the request context. Its result must be a
//! clean boolean: `true` passes, `false` or an absent value fails, and
//! anything else is rejected with [`BouncerError::NonBooleanRuling`] instead
//! of being coerced into a verdict.

use std::fmt;
use std::panic::Location;
use std::sync::Arc;

use serde_json::Value;

use crate::authz::errors::BouncerError;

/// What a condition said about a request, before the contract is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ruling {
    Pass,
    Fail,
    /// Description of a value that is neither a boolean nor absent.
    Invalid(String),
}

/// Values a condition may return.
pub trait IntoRuling {
    fn into_ruling(self) -> Ruling;
}

impl IntoRuling for Ruling {
    fn into_ruling(self) -> Ruling {
        self
    }
}

impl IntoRuling for bool {
    fn into_ruling(self) -> Ruling {
        if self {
            Ruling::Pass
        } else {
            Ruling::Fail
        }
    }
}

impl IntoRuling for Option<bool> {
    fn into_ruling(self) -> Ruling {
        self.unwrap_or(false).into_ruling()
    }
}

impl IntoRuling for () {
    fn into_ruling(self) -> Ruling {
        Ruling::Fail
    }
}

impl IntoRuling for Value {
    fn into_ruling(self) -> Ruling {
        match self {
            Value::Bool(b) => b.into_ruling(),
            Value::Null => Ruling::Fail,
            Value::Number(n) => Ruling::Invalid(format!("number {n}")),
            Value::String(s) => Ruling::Invalid(format!("string {s:?}")),
            Value::Array(_) => Ruling::Invalid("array".into()),
            Value::Object(_) => Ruling::Invalid("object".into()),
        }
    }
}

type Predicate<C> = dyn Fn(&C) -> Ruling + Send + Sync;

/// A shared predicate over the request context `C`, tagged with the source
/// location that declared it.
pub struct Condition<C> {
    predicate: Arc<Predicate<C>>,
    location: &'static Location<'static>,
}

impl<C> Condition<C> {
    #[track_caller]
    pub fn new<F, R>(predicate: F) -> Self
    where
        F: Fn(&C) -> R + Send + Sync + 'static,
        R: IntoRuling,
    {
        Self {
            predicate: Arc::new(move |ctx: &C| predicate(ctx).into_ruling()),
            location: Location::caller(),
        }
    }

    /// The condition attached by `grant_always` and by the default role.
    #[track_caller]
    pub fn always() -> Self {
        Self::new(|_: &C| true)
    }

    /// Where the condition was declared, as `file:line:column`.
    pub fn location(&self) -> String {
        format!(
            "{}:{}:{}",
            self.location.file(),
            self.location.line(),
            self.location.column()
        )
    }

    /// Runs the predicate and enforces the boolean contract.
    pub fn check(&self, ctx: &C) -> Result<bool, BouncerError> {
        match (self.predicate)(ctx) {
            Ruling::Pass => Ok(true),
            Ruling::Fail => Ok(false),
            Ruling::Invalid(found) => Err(BouncerError::NonBooleanRuling {
                found,
                location: self.location(),
            }),
        }
    }
}

impl<C> Clone for Condition<C> {
    fn clone(&self) -> Self {
        Self {
            predicate: Arc::clone(&self.predicate),
            location: self.location,
        }
    }
}

impl<C> fmt::Debug for Condition<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Condition")
            .field("location", &self.location())
            .finish_non_exhaustive()
    }
}
