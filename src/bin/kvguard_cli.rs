//!
//! kvguard command client
//! ----------------------
//! Interactive client for `dynamodb <operation> ...` commands, authorized per command.
//! Runs against an in-process store (optionally loaded from a snapshot) or a remote
//! kvguard server with `--connect`.

use anyhow::{Context, Result};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use kvguard::cli::render;
use kvguard::cli::session::{ClientSession, LineOutcome, LocalBackend};
use kvguard::config::CliConfig;
use kvguard::storage::SharedStore;

fn print_usage(program: &str) {
    eprintln!(
        "Usage:\n  {program} [--snapshot <file>] [--user <u>] [--password <p>]\n  {program} --connect <url> [--user <u>] [--password <p>]\n  {program} [--connect <url>] --user <u> --password <p> --command \"dynamodb <operation> ...\"\n\nFlags:\n  --connect <url>      Use a kvguard HTTP server instead of an in-process store\n  --snapshot <file>    Load tables from a JSON snapshot (local mode; env KVGUARD_SNAPSHOT)\n  --user <u>           Username (prompted when omitted in interactive mode)\n  --password <p>       Password (prompted when omitted in interactive mode)\n  --command <cmd>      Run one command and exit: 0 allowed, 3 denied, 2 usage error, 1 other failure\n  -h, --help           Show this help\n\n{}",
        kvguard::cli::usage()
    );
}

fn open_local(cfg: &CliConfig) -> Result<LocalBackend> {
    let store = SharedStore::new();
    if let Some(path) = &cfg.snapshot {
        let n = store.load_snapshot(path).with_context(|| format!("loading snapshot {}", path.display()))?;
        tracing::info!(target: "kvguard::cli", tables = n, path = %path.display(), "snapshot loaded");
    }
    LocalBackend::new(store, &cfg.admin_password, cfg.role_lookup_timeout)
}

async fn sign_in(cfg: &CliConfig, user: &str, password: &str) -> Result<ClientSession> {
    match &cfg.connect {
        Some(url) => ClientSession::remote(url, user, password).await,
        None => Ok(ClientSession::local(open_local(cfg)?, user, password)?),
    }
}

fn prompt_credentials(rl: &mut DefaultEditor, cfg: &CliConfig) -> Result<(String, String)> {
    let user = match &cfg.user {
        Some(u) => u.clone(),
        None => rl.readline("Username: ")?.trim().to_string(),
    };
    let password = match &cfg.password {
        Some(p) => p.clone(),
        None => rl.readline("Password: ")?,
    };
    Ok((user, password))
}

fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .try_init();

    let mut args: Vec<String> = std::env::args().collect();
    let program = args.remove(0);
    let cfg = match CliConfig::from_env_and_args(&args) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}", e);
            print_usage(&program);
            std::process::exit(2);
        }
    };
    if cfg.help {
        print_usage(&program);
        return Ok(());
    }

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build Tokio runtime")?;

    // One-shot mode
    if let Some(command) = cfg.command.clone() {
        let (Some(user), Some(password)) = (cfg.user.clone(), cfg.password.clone()) else {
            eprintln!("--command requires --user and --password");
            std::process::exit(2);
        };
        let code = rt.block_on(async {
            let session = match sign_in(&cfg, &user, &password).await {
                Ok(s) => s,
                Err(e) => {
                    eprintln!("authentication failed: {:#}", e);
                    return 1;
                }
            };
            let outcome = session.handle_line(&command).await;
            for line in outcome.lines(session.principal()) {
                if outcome.exit_code() == 0 { println!("{}", line); } else { eprintln!("{}", line); }
            }
            let code = outcome.exit_code();
            session.close().await;
            code
        });
        std::process::exit(code);
    }

    // Interactive mode
    let mut rl = DefaultEditor::new().context("Failed to create line editor")?;
    println!("kvguard command client. Type 'help' for commands, 'exit' to leave.");
    let (user, password) = match prompt_credentials(&mut rl, &cfg) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };
    let session = match rt.block_on(sign_in(&cfg, &user, &password)) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("authentication failed: {:#}", e);
            std::process::exit(1);
        }
    };
    println!("signed in as {} (role: {})", session.principal().identity, session.principal().role);

    loop {
        match rl.readline(&session.prompt()) {
            Ok(line) => {
                let outcome = rt.block_on(session.handle_line(&line));
                match &outcome {
                    LineOutcome::Exit => break,
                    LineOutcome::Empty => continue,
                    LineOutcome::Failed(e) => eprintln!("{}", render::render_error(e)),
                    other => {
                        for l in other.lines(session.principal()) { println!("{}", l); }
                    }
                }
                let _ = rl.add_history_entry(line.as_str());
            }
            // Ctrl+C clears the line
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                tracing::error!(target: "kvguard::cli", "readline error: {e}");
                break;
            }
        }
    }
    rt.block_on(session.close());
    println!("bye");
    Ok(())
}
