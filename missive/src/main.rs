mod config;
mod server;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use config::Config;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(subcommand)]
    command: Command,

    /// A special mode dedicated to developers, NOT INTENDED FOR PRODUCTION
    #[clap(long)]
    dev: bool,

    /// Path to the main Missive configuration file
    #[clap(short, long, env = "MISSIVE_CONFIG", default_value = "missive.toml")]
    config_file: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the IMAP server daemon
    Daemon,

    /// Hash a password for the static user list
    PasswordHash {
        #[clap(env = "MISSIVE_PASSWORD")]
        maybe_password: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "missive=info,missive_proto=info")
    }
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    match args.command {
        Command::Daemon => {
            let config = if args.dev {
                Config::dev()
            } else {
                config::read_config(args.config_file)?
            };
            server::new(config).await?.run().await?;
        }
        Command::PasswordHash { maybe_password } => {
            let password = match maybe_password {
                Some(password) => password,
                None => {
                    let mut line = String::new();
                    std::io::stdin().read_line(&mut line)?;
                    line.trim_end().to_string()
                }
            };
            println!("{}", missive_backend::login::hash_password(&password)?);
        }
    }

    Ok(())
}
