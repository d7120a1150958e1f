use std::net::SocketAddr;

use anyhow::{bail, Context};
use colored::Colorize;

use bkt_server::{verify_db, BktServer, Inconsistency, ServerConfig};
use bkt_store::Db;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Serve(args) => cmd_serve(args),
        Command::Check(args) => cmd_check(args),
    }
}

/// File config first, then flags on top.
fn resolve_config(args: &ServeArgs) -> anyhow::Result<ServerConfig> {
    let mut config = match &args.config {
        Some(path) => ServerConfig::from_file(path)?,
        None => ServerConfig::default(),
    };
    if let Some(db) = &args.db {
        config.db_path = db.clone();
    }
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if let Some(port) = args.port {
        config.bind_addr = SocketAddr::from(([0, 0, 0, 0], port));
    }
    Ok(config)
}

fn cmd_serve(args: ServeArgs) -> anyhow::Result<()> {
    let config = resolve_config(&args)?;
    let server = BktServer::open(config.clone())
        .with_context(|| format!("couldn't open database {}", config.db_path.display()))?;
    println!(
        "bkt serving {} on {}",
        config.db_path.display().to_string().bold(),
        config.bind_addr.to_string().cyan()
    );
    let runtime = tokio::runtime::Runtime::new().context("couldn't start runtime")?;
    runtime.block_on(server.serve())?;
    Ok(())
}

fn report(problems: &[Inconsistency]) {
    for problem in problems {
        println!("  {} {}", "✗".red(), problem);
    }
}

fn cmd_check(args: CheckArgs) -> anyhow::Result<()> {
    if !args.db.exists() {
        bail!("database {} does not exist", args.db.display());
    }
    let db = Db::open(&args.db)
        .with_context(|| format!("couldn't open database {}", args.db.display()))?;
    let problems = verify_db(&db);
    if problems.is_empty() {
        println!("{} {} is consistent.", "✓".green().bold(), args.db.display());
        return Ok(());
    }
    report(&problems);
    bail!("{} inconsistencies found in {}", problems.len(), args.db.display())
}
