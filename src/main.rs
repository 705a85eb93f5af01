use std::sync::Arc;

use axum::response::{IntoResponse, Redirect};
use axum::routing::get;
use axum::Router;
use bouncer::authz::web::{self, Bouncer, RequestContext};
use bouncer::authz::{Grants, PathPattern};
use bouncer::settings::Settings;
use clap::Parser;
use miette::{IntoDiagnostic, Result};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "bouncer",
    version,
    about = "Demo server guarded by declarative request authorization"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // logging
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    let settings = Settings::load(&cli.config)?;
    tracing::info!(?settings, "Loaded configuration");

    let bouncer = Bouncer::builder(settings.authz.clone())
        .rules(|rules| {
            rules
                .anyone()?
                .grant_always(Grants::new().on("get", ["/", "/login"]))?;
            rules
                .declare_role("admin", |ctx: &RequestContext| {
                    ctx.header("x-role") == Some("admin")
                })?
                .grant_always(Grants::new().on("any_method", PathPattern::all()))?;
            rules
                .declare_role("analyst", |ctx: &RequestContext| {
                    ctx.header("x-role") == Some("analyst")
                })?
                .grant(
                    Grants::new()
                        .on("get", "/reports/*")
                        .when(|ctx: &RequestContext| ctx.header("x-mfa").is_some()),
                )?;
            Ok(())
        })
        .deny_with(|_| Redirect::to("/login").into_response())
        .build()?;

    let app = Router::new()
        .route("/", get(|| async { "welcome" }))
        .route("/login", get(|| async { "please sign in" }))
        .route("/admin/dashboard", get(|| async { "admin dashboard" }))
        .route("/reports/{name}", get(|| async { "report" }));
    let app = web::protect(app, Arc::new(bouncer));

    let addr = settings.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await.into_diagnostic()?;
    tracing::info!(%addr, "Listening");
    axum::serve(listener, app).await.into_diagnostic()?;
    Ok(())
}
