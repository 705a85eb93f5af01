//! Bouncer - declarative request authorization for axum
//!
//! Roles grant HTTP methods on path patterns, optionally gated by conditions
//! over the request. A request is let through only if some role grants it.

pub mod authz;
pub mod settings;
