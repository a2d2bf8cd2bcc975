use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::env;

use crate::services::reconcile::MAX_DELETE_BATCH;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// HMAC key for upload checksums.
    pub secret: String,
    pub delete_batch_size: usize,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Serve the upload signing API (default)
    Serve,
    /// Run migrations and exit
    Migrate,
    /// Report objects no file field references; delete them with --force
    DeleteUnused {
        /// Delete the unreferenced objects instead of only listing them
        #[arg(long)]
        force: bool,
    },
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "File field storage for S3-compatible buckets")]
pub struct Args {
    /// Host to bind to (overrides FIELD_STORAGE_HOST)
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Port to bind to (overrides FIELD_STORAGE_PORT)
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Database URL (overrides FIELD_STORAGE_DATABASE_URL)
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    /// Objects per delete request (overrides FIELD_STORAGE_DELETE_BATCH_SIZE)
    #[arg(long, global = true)]
    pub delete_batch_size: Option<usize>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and the command to run.
    pub fn from_env_and_args() -> Result<(Self, Command)> {
        let args = Args::parse();
        let command = args.command.clone().unwrap_or(Command::Serve);
        let cfg = Self::merge(args, |name| env::var(name))?;
        Ok((cfg, command))
    }

    fn merge(
        args: Args,
        var: impl Fn(&str) -> Result<String, env::VarError>,
    ) -> Result<Self> {
        let env_host = var("FIELD_STORAGE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = parse_var(&var, "FIELD_STORAGE_PORT", 3000u16)?;
        let env_db = var("FIELD_STORAGE_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/field_storage.db".into());
        let env_batch = parse_var(&var, "FIELD_STORAGE_DELETE_BATCH_SIZE", MAX_DELETE_BATCH)?;

        let secret = match var("FIELD_STORAGE_SECRET") {
            Ok(secret) if !secret.is_empty() => secret,
            Ok(_) | Err(env::VarError::NotPresent) => {
                bail!("FIELD_STORAGE_SECRET must be set to a non-empty value")
            }
            Err(err) => return Err(err).context("reading FIELD_STORAGE_SECRET"),
        };

        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            database_url: args.database_url.unwrap_or(env_db),
            secret,
            delete_batch_size: args
                .delete_batch_size
                .unwrap_or(env_batch)
                .clamp(1, MAX_DELETE_BATCH),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<T>(
    var: &impl Fn(&str) -> Result<String, env::VarError>,
    name: &str,
    default: T,
) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(name) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}
