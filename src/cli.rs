use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "stratus",
    version,
    about = "A keyboard-driven terminal browser for AWS resources."
)]
pub struct CliArgs {
    /// AWS profile to start in
    #[arg(short, long)]
    pub profile: Option<String>,

    /// AWS region to start in
    #[arg(short, long)]
    pub region: Option<String>,

    /// Resources requested per page
    #[arg(long)]
    pub page_size: Option<usize>,

    /// Path to a config file (overrides discovery)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// tracing filter (for example: info,debug,trace)
    #[arg(long, default_value = "info")]
    pub log_filter: String,

    /// Write logs to this file instead of discarding them
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}
