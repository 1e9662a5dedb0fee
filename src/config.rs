use anyhow::{Context, Result};
use clap::Parser;
use std::env;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub chunks_dir: String,
    pub files_dir: String,
    pub database_url: String,
    pub keep_chunks: bool,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Chunked upload assembly with content-addressed deduplication")]
pub struct Args {
    /// Host to bind to (overrides UPLOAD_ASSEMBLER_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides UPLOAD_ASSEMBLER_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory for chunks awaiting assembly (overrides UPLOAD_ASSEMBLER_CHUNKS_DIR)
    #[arg(long)]
    pub chunks_dir: Option<String>,

    /// Directory for assembled files (overrides UPLOAD_ASSEMBLER_FILES_DIR)
    #[arg(long)]
    pub files_dir: Option<String>,

    /// Database URL (overrides UPLOAD_ASSEMBLER_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Keep chunk files after a successful merge (overrides UPLOAD_ASSEMBLER_KEEP_CHUNKS)
    #[arg(long)]
    pub keep_chunks: bool,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        Ok((Self::from_args(args)?, migrate))
    }

    /// Merge parsed CLI args over environment variables over defaults.
    pub fn from_args(args: Args) -> Result<Self> {
        // --- Environment fallback ---
        let env_host = env::var("UPLOAD_ASSEMBLER_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = match env::var("UPLOAD_ASSEMBLER_PORT") {
            Ok(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing UPLOAD_ASSEMBLER_PORT value `{}`", value))?,
            Err(env::VarError::NotPresent) => 3000,
            Err(err) => return Err(err).context("reading UPLOAD_ASSEMBLER_PORT"),
        };
        let env_chunks =
            env::var("UPLOAD_ASSEMBLER_CHUNKS_DIR").unwrap_or_else(|_| "./data/chunks".into());
        let env_files =
            env::var("UPLOAD_ASSEMBLER_FILES_DIR").unwrap_or_else(|_| "./data/files".into());
        let env_db = env::var("UPLOAD_ASSEMBLER_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/catalog.db".into());
        let env_keep = match env::var("UPLOAD_ASSEMBLER_KEEP_CHUNKS") {
            Ok(value) => parse_flag(&value)
                .with_context(|| format!("parsing UPLOAD_ASSEMBLER_KEEP_CHUNKS value `{}`", value))?,
            Err(env::VarError::NotPresent) => false,
            Err(err) => return Err(err).context("reading UPLOAD_ASSEMBLER_KEEP_CHUNKS"),
        };

        // --- Merge ---
        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            chunks_dir: args.chunks_dir.unwrap_or(env_chunks),
            files_dir: args.files_dir.unwrap_or(env_files),
            database_url: args.database_url.unwrap_or(env_db),
            keep_chunks: args.keep_chunks || env_keep,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => anyhow::bail!("expected a boolean, got `{}`", other),
    }
}
