//! Request authorization: roles, method/path grants and rule conditions.
//!
//! Rules are declared once into a [`PolicyEngine`](engine::PolicyEngine) and
//! then answer, per request, whether any role grants the request's method
//! and path. Every condition a role carries must pass, and every condition
//! must return an explicit boolean.

pub mod condition;
pub mod engine;
pub mod errors;
pub mod path;
pub mod role;
pub mod types;
pub mod web;

pub use condition::{Condition, IntoRuling, Ruling};
pub use engine::{EngineState, PolicyEngine, Rules, DEFAULT_ROLE};
pub use errors::BouncerError;
pub use role::{Grants, Role};
pub use types::{HttpMethod, PathPattern, PathSet, Segment};
pub use web::{Bouncer, RequestContext};
