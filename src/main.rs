//!
//! kvguard server binary
//! ---------------------
//! Starts the HTTP API. Configuration comes from `KVGUARD_*` environment variables and
//! command-line flags (flags win).

use tracing_subscriber::{EnvFilter, fmt};
use tracing::info;

use kvguard::config::{self, ServerConfig};

fn print_usage() {
    println!("kvguard server\n\nUSAGE:\n  kvguard [--port N] [--bind ADDR] [--snapshot FILE] [--save-on-exit]\n\nOPTIONS:\n  --port N           HTTP port (env: KVGUARD_HTTP_PORT, default 7878)\n  --bind ADDR        Bind address (env: KVGUARD_BIND, default 0.0.0.0)\n  --snapshot FILE    JSON snapshot of tables loaded at start (env: KVGUARD_SNAPSHOT)\n  --save-on-exit     Write the store back to the snapshot on shutdown (env: KVGUARD_SAVE_ON_EXIT)\n\nENVIRONMENT:\n  KVGUARD_SESSION_TTL_SECS         bearer token lifetime (default 3600)\n  KVGUARD_ROLE_LOOKUP_TIMEOUT_MS   bound on each role lookup (default 2000)\n  KVGUARD_ADMIN_PASSWORD           password of the bootstrap admin user (default admin)\n  RUST_LOG                         log filter (default info)\n");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))?;
    fmt().with_env_filter(filter).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if config::has_flag(&args, "--help") || config::has_flag(&args, "-h") {
        print_usage();
        return Ok(());
    }
    let cfg = ServerConfig::from_env_and_args(&args)?;

    // Startup banner at info level so something always prints at default verbosity
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    info!(
        target: "startup",
        "kvguard starting: RUST_LOG='{}', addr={}, session_ttl_secs={}, role_lookup_timeout_ms={}, snapshot={:?}",
        rust_log, cfg.addr(), cfg.session_ttl.as_secs(), cfg.role_lookup_timeout.as_millis(), cfg.snapshot
    );

    kvguard::server::run(cfg).await
}
