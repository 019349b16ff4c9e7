//!
//! kvguard configuration
//! ---------------------
//! Environment variables with command-line overrides, parsed by hand. Flags win over
//! environment, environment wins over defaults.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Result};

pub const DEFAULT_HTTP_PORT: u16 = 7878;
pub const DEFAULT_BIND: &str = "0.0.0.0";
pub const DEFAULT_SESSION_TTL_SECS: u64 = 3600;
pub const DEFAULT_ROLE_LOOKUP_TIMEOUT_MS: u64 = 2000;
pub const DEFAULT_ADMIN_PASSWORD: &str = "admin";

pub fn parse_port(val: &str) -> Option<u16> { val.trim().parse::<u16>().ok() }

pub fn parse_bool(val: &str) -> Option<bool> {
    match val.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn env_lookup(name: &str) -> Option<String> { std::env::var(name).ok() }

/// Value following `flag`, if present. A flag given as the last argument is an error.
pub fn flag_value(args: &[String], flag: &str) -> Result<Option<String>> {
    let mut i = 0;
    while i < args.len() {
        if args[i] == flag {
            return match args.get(i + 1) {
                Some(v) => Ok(Some(v.clone())),
                None => Err(anyhow!("{} requires a value", flag)),
            };
        }
        i += 1;
    }
    Ok(None)
}

pub fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

fn millis_or(raw: Option<String>, default: u64, what: &str) -> Result<Duration> {
    match raw {
        None => Ok(Duration::from_millis(default)),
        Some(v) => v.trim().parse::<u64>().map(Duration::from_millis).map_err(|_| anyhow!("invalid {}: '{}'", what, v)),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind: String,
    pub http_port: u16,
    pub session_ttl: Duration,
    pub role_lookup_timeout: Duration,
    pub admin_password: String,
    pub snapshot: Option<PathBuf>,
    /// Write the store back to `snapshot` on shutdown.
    pub save_on_exit: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            http_port: DEFAULT_HTTP_PORT,
            session_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
            role_lookup_timeout: Duration::from_millis(DEFAULT_ROLE_LOOKUP_TIMEOUT_MS),
            admin_password: DEFAULT_ADMIN_PASSWORD.to_string(),
            snapshot: None,
            save_on_exit: false,
        }
    }
}

impl ServerConfig {
    pub fn from_env_and_args(args: &[String]) -> Result<Self> { Self::from_sources(args, env_lookup) }

    pub fn from_sources(args: &[String], env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut cfg = ServerConfig::default();
        if let Some(p) = env("KVGUARD_HTTP_PORT") {
            cfg.http_port = parse_port(&p).ok_or_else(|| anyhow!("invalid KVGUARD_HTTP_PORT: '{}'", p))?;
        }
        if let Some(p) = flag_value(args, "--port")? {
            cfg.http_port = parse_port(&p).ok_or_else(|| anyhow!("invalid --port: '{}'", p))?;
        }
        if let Some(b) = flag_value(args, "--bind")?.or_else(|| env("KVGUARD_BIND")) { cfg.bind = b; }
        if let Some(s) = env("KVGUARD_SESSION_TTL_SECS") {
            let secs = s.trim().parse::<u64>().map_err(|_| anyhow!("invalid KVGUARD_SESSION_TTL_SECS: '{}'", s))?;
            cfg.session_ttl = Duration::from_secs(secs);
        }
        cfg.role_lookup_timeout = millis_or(env("KVGUARD_ROLE_LOOKUP_TIMEOUT_MS"), DEFAULT_ROLE_LOOKUP_TIMEOUT_MS, "KVGUARD_ROLE_LOOKUP_TIMEOUT_MS")?;
        if let Some(pw) = env("KVGUARD_ADMIN_PASSWORD") { cfg.admin_password = pw; }
        cfg.snapshot = flag_value(args, "--snapshot")?.or_else(|| env("KVGUARD_SNAPSHOT")).map(PathBuf::from);
        cfg.save_on_exit = has_flag(args, "--save-on-exit")
            || env("KVGUARD_SAVE_ON_EXIT").as_deref().and_then(parse_bool).unwrap_or(false);
        Ok(cfg)
    }

    pub fn addr(&self) -> String { format!("{}:{}", self.bind, self.http_port) }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CliConfig {
    pub connect: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub command: Option<String>,
    pub snapshot: Option<PathBuf>,
    pub role_lookup_timeout: Duration,
    pub admin_password: String,
    pub help: bool,
}

impl CliConfig {
    pub fn from_env_and_args(args: &[String]) -> Result<Self> { Self::from_sources(args, env_lookup) }

    pub fn from_sources(args: &[String], env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        const KNOWN: [&str; 5] = ["--connect", "--user", "--password", "--command", "--snapshot"];
        let mut i = 0;
        while i < args.len() {
            let a = args[i].as_str();
            if KNOWN.contains(&a) { i += 2; continue; }
            if a == "-h" || a == "--help" { i += 1; continue; }
            return Err(anyhow!("unrecognized argument: {}", a));
        }
        Ok(Self {
            connect: flag_value(args, "--connect")?,
            user: flag_value(args, "--user")?,
            password: flag_value(args, "--password")?,
            command: flag_value(args, "--command")?,
            snapshot: flag_value(args, "--snapshot")?.or_else(|| env("KVGUARD_SNAPSHOT")).map(PathBuf::from),
            role_lookup_timeout: millis_or(env("KVGUARD_ROLE_LOOKUP_TIMEOUT_MS"), DEFAULT_ROLE_LOOKUP_TIMEOUT_MS, "KVGUARD_ROLE_LOOKUP_TIMEOUT_MS")?,
            admin_password: env("KVGUARD_ADMIN_PASSWORD").unwrap_or_else(|| DEFAULT_ADMIN_PASSWORD.to_string()),
            help: has_flag(args, "-h") || has_flag(args, "--help"),
        })
    }
}
