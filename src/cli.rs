use std::net::IpAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "taskwiki",
    about = "Single-user task tree and wiki server",
    version,
    args_conflicts_with_subcommands = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub serve: ServeArgs,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print a bcrypt PASSWORD_HASH value for a password
    #[command(name = "hash-password")]
    HashPassword {
        /// Password to hash (read from stdin if omitted)
        password: Option<String>,
    },
}

/// Options for running the server (the default command).
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to listen on
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0")]
    pub bind: IpAddr,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 3050)]
    pub port: u16,

    /// Path to the SQLite database
    #[arg(long, env = "DB_PATH", default_value = "./data/tasks.db")]
    pub db: PathBuf,

    /// bcrypt hash of the login password (see `hash-password`)
    #[arg(long, env = "PASSWORD_HASH", hide_env_values = true)]
    pub password_hash: Option<String>,

    /// Secret for signing session tokens [default: random per process]
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: Option<String>,

    /// Session lifetime in days
    #[arg(long, env = "SESSION_DAYS", default_value_t = 30)]
    pub session_days: i64,

    /// Mark the session cookie Secure (serve over HTTPS)
    #[arg(long, env = "SECURE_COOKIE")]
    pub secure_cookie: bool,

    /// Directory with the built web client; skipped if missing
    #[arg(long, env = "WEB_DIR", default_value = "../web/dist")]
    pub web_dir: PathBuf,
}
