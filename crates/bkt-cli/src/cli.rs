use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "bkt",
    about = "Nested key/value buckets served as an HTTP resource tree",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Serve a database over HTTP
    Serve(ServeArgs),
    /// Check that every value has a metadata record and vice versa
    Check(CheckArgs),
}

#[derive(Args)]
pub struct ServeArgs {
    /// Database file (overrides the config file)
    #[arg(long)]
    pub db: Option<PathBuf>,
    /// Address to listen on (overrides the config file)
    #[arg(long, conflicts_with = "port")]
    pub bind: Option<SocketAddr>,
    /// Port to listen on, on all interfaces
    #[arg(long)]
    pub port: Option<u16>,
    /// TOML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Args)]
pub struct CheckArgs {
    /// Database file to inspect
    #[arg(long, default_value = "bkt.db")]
    pub db: PathBuf,
}
