use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Directory whose files are served
    #[arg(short, long, env = "FIXTURE_BASE_DIR")]
    pub base_dir: Option<PathBuf>,

    /// Port to listen on, 0 picks a free one
    #[arg(short, long, env = "FIXTURE_PORT")]
    pub port: Option<u16>,

    /// Address to bind
    #[arg(long, env = "FIXTURE_BIND_ADDRESS")]
    pub bind: Option<String>,

    /// TOML file with succeed/redirect/fail rules to apply at startup
    #[arg(short, long)]
    pub rules: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long)]
    pub quiet: bool,
}
