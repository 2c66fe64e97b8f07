//! docgate - session administration for a docgate database.
//!
//! Usage: `docgate <config.toml> <command> <tenant-domain> [args]`
//!
//! Commands:
//! - `sessions`: list active sessions, deleting expired ones
//! - `logout-others <session-id>`: delete every session but one
//! - `logout-sid <sid>`: delete the sessions of an identity provider session
//!
//! The tenant's session secret is read from `DOCGATE_SESSION_SECRET`.

use anyhow::{Context, bail};
use docgate::Authority;
use docgate::config::Config;
use docgate::db::Database;
use docgate::lock::MemoryLocks;
use docgate::telemetry::spans;
use docgate::tenant::Tenant;
use std::sync::Arc;
use tracing::{Instrument, error, info, warn};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: docgate <config.toml> <sessions|logout-others|logout-sid> <tenant-domain> [arg]";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let [config_path, command, domain, rest @ ..] = args.as_slice() else {
        bail!(USAGE);
    };

    let config = Config::load(config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "Failed to load config");
        e
    })?;

    let secret = std::env::var("DOCGATE_SESSION_SECRET").unwrap_or_default();
    if secret.is_empty() {
        warn!("DOCGATE_SESSION_SECRET is not set; session cookies cannot be verified");
    }
    let tenant = Tenant::from_domain(domain, secret.into_bytes());

    let db = Database::new(&config.database.path)
        .await
        .with_context(|| format!("opening database {}", config.database.path))?;
    let authority = Authority::from_config(&config, Arc::new(db.store()), Arc::new(MemoryLocks::new()));

    info!(tenant = %tenant.domain(), command = %command, "Running command");
    run(&authority, &tenant, command, rest)
        .instrument(spans::tenant(tenant.domain()))
        .await
}

async fn run(authority: &Authority, tenant: &Tenant, command: &str, rest: &[String]) -> anyhow::Result<()> {
    let sessions = authority.sessions();
    match (command, rest) {
        ("sessions", []) => {
            for session in sessions.list_active(tenant).await? {
                println!(
                    "{}\tcreated={}\tlast_seen={}\t{:?}\t{}",
                    session.id,
                    session.created_at.to_rfc3339(),
                    session.last_seen.to_rfc3339(),
                    session.duration(),
                    session.sid.as_deref().unwrap_or("-"),
                );
            }
        }
        ("logout-others", [keep]) => {
            let deleted = sessions.revoke_others(tenant, keep).await?;
            println!("{deleted} session(s) deleted");
        }
        ("logout-sid", [sid]) => {
            let deleted = sessions.revoke_by_sid(tenant, sid).await?;
            println!("{deleted} session(s) deleted");
        }
        _ => bail!(USAGE),
    }
    Ok(())
}
