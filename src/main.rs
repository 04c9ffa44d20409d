mod cli;

use std::io::{IsTerminal, Read as _};
use std::net::SocketAddr;

use anyhow::{bail, Context, Result};
use chrono::Duration;
use clap::Parser;
use rand::Rng;

use cli::{Cli, Command, ServeArgs};
use taskwiki::auth::{self, Auth};
use taskwiki::db::Db;
use taskwiki::server::{self, AppState};

fn setup_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Some(Command::HashPassword { password }) => hash_password(password),
        None => {
            setup_logging();
            let runtime = tokio::runtime::Runtime::new().context("failed to start runtime")?;
            runtime.block_on(serve(cli.serve))
        }
    }
}

fn hash_password(password: Option<String>) -> Result<()> {
    let password = match password {
        Some(p) => p,
        None => {
            if std::io::stdin().is_terminal() {
                eprintln!("Reading password from stdin (end with Ctrl-D)...");
            }
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read password from stdin")?;
            buf.trim_end_matches(['\r', '\n']).to_string()
        }
    };
    if password.is_empty() {
        bail!("password must not be empty");
    }
    let hash =
        auth::hash_password(&password, auth::DEFAULT_COST).context("failed to hash password")?;
    println!("{hash}");
    Ok(())
}

fn random_secret() -> Vec<u8> {
    let mut secret = vec![0u8; 32];
    rand::rng().fill(&mut secret[..]);
    secret
}

async fn serve(args: ServeArgs) -> Result<()> {
    let Some(password_hash) = args.password_hash.filter(|h| !h.trim().is_empty()) else {
        bail!("PASSWORD_HASH is empty; generate one with `taskwiki hash-password`");
    };
    if args.session_days <= 0 {
        bail!("session lifetime must be at least one day");
    }
    let secret = match args.jwt_secret {
        Some(s) if !s.is_empty() => s.into_bytes(),
        _ => {
            log::warn!("JWT_SECRET not set; sessions will not survive a restart");
            random_secret()
        }
    };
    let auth = Auth::new(&password_hash, &secret, Duration::days(args.session_days))
        .context("invalid PASSWORD_HASH or JWT_SECRET")?;

    let db = Db::open_path(&args.db)
        .with_context(|| format!("failed to open database {}", args.db.display()))?;
    log::info!("using database {}", args.db.display());

    let web_dir = if args.web_dir.is_dir() {
        log::info!("serving web client from {}", args.web_dir.display());
        Some(args.web_dir.as_path())
    } else {
        log::info!(
            "web client directory {} not found; serving API only",
            args.web_dir.display()
        );
        None
    };

    let state = AppState::new(db, auth, args.secure_cookie);
    let app = server::router(state, web_dir);
    server::serve(SocketAddr::new(args.bind, args.port), app)
        .await
        .context("server error")
}
