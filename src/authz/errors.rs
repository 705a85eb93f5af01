use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use miette::Diagnostic;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum BouncerError {
    #[error("must provide a role identifier to `declare_role`")]
    #[diagnostic(
        code(bouncer::authz::missing_role_identifier),
        help("Call declare_role(\"<name>\", |ctx| ...) with a non-empty identifier")
    )]
    MissingRoleIdentifier,

    #[error("role called `{0}` already defined")]
    #[diagnostic(
        code(bouncer::authz::duplicate_role),
        help("Role identifiers are unique per engine, and `anyone` is reserved for the default role")
    )]
    DuplicateRole(String),

    #[error("Undefined role `{0}`")]
    #[diagnostic(
        code(bouncer::authz::undefined_role),
        help("Declare the role first with declare_role(\"<name>\", |ctx| ...)")
    )]
    UndefinedRole(String),

    #[error("unknown HTTP method key `{key}` in grant (valid keys: {valid})")]
    #[diagnostic(
        code(bouncer::authz::unknown_method),
        help("Use a lowercase HTTP method name, or `any_method` to match every method")
    )]
    UnknownMethod { key: String, valid: String },

    #[error("You must provide a condition to `grant`. If you wish to always allow, use `grant_always` instead.")]
    #[diagnostic(code(bouncer::authz::missing_condition))]
    MissingCondition,

    #[error("You cannot provide a condition to `grant_always`. If you wish to conditionally allow, use `grant` instead.")]
    #[diagnostic(code(bouncer::authz::unexpected_condition))]
    UnexpectedCondition,

    #[error("rules block error: role `{0}` is missing a `grant` or `grant_always` call")]
    #[diagnostic(
        code(bouncer::authz::incomplete_role),
        help("Every declared role needs at least one method/path grant")
    )]
    IncompleteRole(String),

    #[error("rules have already been declared on this engine")]
    #[diagnostic(
        code(bouncer::authz::already_declared),
        help("Call reset() before running another declaration block")
    )]
    AlreadyDeclared,

    #[error("Rule condition does not return explicit true/false (got {found}). Source: {location}")]
    #[diagnostic(
        code(bouncer::authz::non_boolean_ruling),
        help("Rules must return explicit true or false to prevent accidental truthy values")
    )]
    NonBooleanRuling { found: String, location: String },
}

impl BouncerError {
    /// True for errors raised while a request is being evaluated, as opposed
    /// to errors in the declaration of the rules themselves.
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, BouncerError::NonBooleanRuling { .. })
    }
}

impl IntoResponse for BouncerError {
    fn into_response(self) -> Response {
        let body = json!({ "error": self.to_string() });
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}
