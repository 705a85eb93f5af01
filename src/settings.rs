use miette::{IntoDiagnostic, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    pub server: Server,
    pub authz: Authz,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub host: String,
    pub port: u16,
}

/// When the rules are declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Deployment {
    /// Once at startup; the engine is shared read-only by every request.
    #[default]
    DeclareOnce,
    /// Before every request, on an engine owned by that request.
    PerRequest,
}

/// What happens to a request no role grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Enforcement {
    /// Run the deny strategy
    #[default]
    Strict,
    /// Log the denial and let the request through (rollout mode)
    Advisory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Authz {
    /// If false, every request is let through without consulting the rules.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub deployment: Deployment,
    #[serde(default)]
    pub enforcement: Enforcement,
    /// Lowercase request paths before matching them against grants.
    #[serde(default = "default_case_insensitive_paths")]
    pub case_insensitive_paths: bool,
}

fn default_enabled() -> bool {
    true
}

fn default_case_insensitive_paths() -> bool {
    true
}

impl Default for Server {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for Authz {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            deployment: Deployment::default(),
            enforcement: Enforcement::default(),
            case_insensitive_paths: default_case_insensitive_paths(),
        }
    }
}

impl Settings {
    pub fn load(path: &str) -> Result<Self> {
        let mut builder = config::Config::builder()
            .set_default("server.host", Server::default().host)
            .into_diagnostic()?
            .set_default("server.port", Server::default().port)
            .into_diagnostic()?
            .set_default("authz.enabled", default_enabled())
            .into_diagnostic()?
            .set_default("authz.deployment", "declare_once")
            .into_diagnostic()?
            .set_default("authz.enforcement", "strict")
            .into_diagnostic()?
            .set_default("authz.case_insensitive_paths", default_case_insensitive_paths())
            .into_diagnostic()?;

        // Optional file
        if Path::new(path).exists() {
            builder = builder.add_source(config::File::with_name(path));
        }

        // Environment overrides: BOUNCER__SERVER__PORT=9090, etc.
        builder = builder.add_source(config::Environment::with_prefix("BOUNCER").separator("__"));

        let cfg = builder.build().into_diagnostic()?;
        cfg.try_deserialize().into_diagnostic()
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
