use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "sluice",
    about = "Sluice: quota-checked, verified uploads into content-addressed storage",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the HTTP ingestion server over an in-memory backend
    Serve(ServeArgs),
    /// Push one file through the full pipeline against an in-memory backend
    Upload(UploadArgs),
    /// Evaluate the quota check for a declared size
    Quota(QuotaArgs),
}

#[derive(Args)]
pub struct ServeArgs {
    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Override the bind address from the configuration
    #[arg(long)]
    pub bind: Option<String>,
}

#[derive(Args)]
pub struct UploadArgs {
    pub path: PathBuf,
    #[arg(long, default_value = "data")]
    pub bucket: String,
    #[arg(long, default_value = "local")]
    pub user: String,
    /// MIME type recorded on the file descriptor
    #[arg(long)]
    pub mime: Option<String>,
    /// Bucket capacity in bytes
    #[arg(long)]
    pub limit: Option<u64>,
    /// Bytes already occupied in the bucket
    #[arg(long, default_value = "0")]
    pub used: u64,
    /// Abort the transfer after this many seconds
    #[arg(long)]
    pub timeout: Option<u64>,
}

#[derive(Args)]
pub struct QuotaArgs {
    /// Declared upload size in bytes
    pub declared: u64,
    /// Bytes already occupied in the bucket
    #[arg(long)]
    pub used: u64,
    /// Bucket capacity in bytes
    #[arg(long)]
    pub limit: Option<u64>,
}
